//! Incremental build cache.
//!
//! Remembers, per task namespace, the content fingerprint of every file that
//! was last processed and written successfully. Development pipelines consult
//! it to skip unchanged inputs. Nothing is persisted; the cache lives as long
//! as the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Content fingerprint of a processed file.
pub type Fingerprint = blake3::Hash;

/// Fingerprint some file contents.
pub fn fingerprint(contents: &[u8]) -> Fingerprint {
    blake3::hash(contents)
}

// =============================================================================
// Namespaces
// =============================================================================

#[derive(Debug, Default)]
struct Namespace {
    /// Source path -> fingerprint of the last successfully written content.
    entries: HashMap<PathBuf, Fingerprint>,
    /// Build mode (or other variant label) the namespace was last used with.
    variant: Option<String>,
}

type Namespaces = Arc<Mutex<HashMap<String, Namespace>>>;

fn lock(namespaces: &Namespaces) -> MutexGuard<'_, HashMap<String, Namespace>> {
    namespaces.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Cache store
// =============================================================================

/// Owner of every cache namespace in the process.
///
/// Cloning is cheap and yields a view of the same store.
#[derive(Debug, Clone, Default)]
pub struct CacheStore {
    namespaces: Namespaces,
}

impl CacheStore {
    /// Create a new empty cache store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the handle for one task's namespace, creating it on first use.
    pub fn handle(&self, namespace: impl Into<String>) -> CacheHandle {
        CacheHandle {
            namespaces: Arc::clone(&self.namespaces),
            namespace: namespace.into(),
        }
    }
}

// =============================================================================
// Cache handle
// =============================================================================

/// A task's view of the cache, restricted to its own namespace.
#[derive(Debug, Clone)]
pub struct CacheHandle {
    namespaces: Namespaces,
    namespace: String,
}

impl CacheHandle {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Fingerprint stored for a path, if any.
    pub fn get(&self, path: &Path) -> Option<Fingerprint> {
        lock(&self.namespaces)
            .get(&self.namespace)
            .and_then(|ns| ns.entries.get(path).copied())
    }

    /// Whether `fingerprint` matches the stored entry for `path`.
    pub fn is_fresh(&self, path: &Path, fingerprint: &Fingerprint) -> bool {
        self.get(path).is_some_and(|stored| stored == *fingerprint)
    }

    /// Record the fingerprint of a successfully written file.
    pub fn put(&self, path: impl Into<PathBuf>, fingerprint: Fingerprint) {
        lock(&self.namespaces)
            .entry(self.namespace.clone())
            .or_default()
            .entries
            .insert(path.into(), fingerprint);
    }

    /// Remove every entry whose path satisfies `predicate`.
    ///
    /// Returns the number of evicted entries.
    pub fn evict_matching(&self, predicate: impl Fn(&Path) -> bool) -> usize {
        let mut namespaces = lock(&self.namespaces);
        let Some(ns) = namespaces.get_mut(&self.namespace) else {
            return 0;
        };
        let before = ns.entries.len();
        ns.entries.retain(|path, _| !predicate(path));
        before - ns.entries.len()
    }

    /// Number of entries in this namespace.
    pub fn len(&self) -> usize {
        lock(&self.namespaces)
            .get(&self.namespace)
            .map_or(0, |ns| ns.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry of this namespace.
    pub fn clear(&self) {
        if let Some(ns) = lock(&self.namespaces).get_mut(&self.namespace) {
            ns.entries.clear();
        }
    }

    /// Record the variant this namespace is about to be used with.
    ///
    /// Returns `true` when a different variant was recorded before, meaning
    /// entries built for the previous variant may be stale.
    pub fn switch_variant(&self, variant: &str) -> bool {
        let mut namespaces = lock(&self.namespaces);
        let ns = namespaces.entry(self.namespace.clone()).or_default();
        let changed = ns.variant.as_deref().is_some_and(|prev| prev != variant);
        ns.variant = Some(variant.to_string());
        changed
    }
}
