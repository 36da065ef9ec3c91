//! File watching and change-triggered task sequences.
//!
//! Uses `notify-debouncer-full` to watch the source directories. Debounced
//! events are pushed into a channel consumed by one dispatcher loop, which
//! maps changed paths to task sequences through [`WatchRule`]s.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use glob::{Pattern, PatternError};
use notify::event::ModifyKind;
use notify::{
    Config as NotifyConfig, EventKind, PollWatcher, RecommendedWatcher, RecursiveMode, Watcher,
};
use notify_debouncer_full::{
    DebounceEventResult, Debouncer, RecommendedCache, new_debouncer, new_debouncer_opt,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::config::{TriggerPolicy, WatchConfig};
use crate::tasks::{Sequencer, TaskRegistry};
use crate::util::slash_path;

// =============================================================================
// Errors
// =============================================================================

#[derive(thiserror::Error, Debug)]
pub enum WatchError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("invalid watch pattern: {0}")]
    Pattern(#[from] PatternError),
}

// =============================================================================
// Watch events
// =============================================================================

/// Events sent from the file watcher.
#[derive(Debug)]
pub enum WatchEvent {
    /// Files were created, modified, renamed or removed.
    FilesChanged(Vec<PathBuf>),
    /// Watcher error occurred.
    Error(String),
}

// =============================================================================
// Rules
// =============================================================================

/// Maps changed paths below `root` to a task sequence.
#[derive(Debug, Clone)]
pub struct WatchRule {
    pub name: String,
    pub root: PathBuf,
    pub sequence: Vec<String>,
    patterns: Vec<Pattern>,
}

impl WatchRule {
    /// `patterns` are relative to `root`.
    pub fn new(
        name: &str,
        root: &Path,
        patterns: &[PathBuf],
        sequence: &[&str],
    ) -> Result<Self, PatternError> {
        let base = Pattern::escape(&slash_path(root));
        let base = base.trim_end_matches('/');
        let patterns = patterns
            .iter()
            .map(|p| Pattern::new(&format!("{base}/{}", slash_path(p))))
            .collect::<Result<_, _>>()?;

        Ok(Self {
            name: name.to_string(),
            root: root.to_path_buf(),
            sequence: sequence.iter().map(|s| s.to_string()).collect(),
            patterns,
        })
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.patterns.iter().any(|p| p.matches_path(path))
    }
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Runs the task sequence of every rule matching incoming change events.
///
/// Sequence failures are logged and never stop the loop.
pub struct WatchController<C> {
    registry: Arc<TaskRegistry<C>>,
    ctx: C,
    rules: Vec<WatchRule>,
    policy: TriggerPolicy,
    on_success: Arc<dyn Fn() + Send + Sync>,
}

impl<C> WatchController<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new(
        registry: Arc<TaskRegistry<C>>,
        ctx: C,
        rules: Vec<WatchRule>,
        policy: TriggerPolicy,
    ) -> Self {
        Self {
            registry,
            ctx,
            rules,
            policy,
            on_success: Arc::new(|| {}),
        }
    }

    /// Continuation invoked after every successful sequence.
    pub fn on_success(mut self, continuation: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_success = Arc::new(continuation);
        self
    }

    /// Rules matching any of `paths`, in rule order, one per distinct sequence.
    pub fn matching(&self, paths: &[PathBuf]) -> Vec<&WatchRule> {
        let mut matched: Vec<&WatchRule> = Vec::new();
        for rule in &self.rules {
            if paths.iter().any(|p| rule.matches(p))
                && !matched.iter().any(|m| m.sequence == rule.sequence)
            {
                matched.push(rule);
            }
        }
        matched
    }

    /// Consume events until the channel closes.
    pub async fn run(self, mut events: mpsc::Receiver<WatchEvent>) {
        while let Some(event) = events.recv().await {
            let mut paths = match event {
                WatchEvent::FilesChanged(paths) => paths,
                WatchEvent::Error(e) => {
                    warn!("watch error: {e}");
                    continue;
                }
            };

            if self.policy == TriggerPolicy::Coalesce {
                while let Ok(queued) = events.try_recv() {
                    match queued {
                        WatchEvent::FilesChanged(more) => paths.extend(more),
                        WatchEvent::Error(e) => warn!("watch error: {e}"),
                    }
                }
            }

            debug!(changes = paths.len(), "files changed");
            for rule in self.matching(&paths) {
                self.trigger(rule).await;
            }
        }
        debug!("watch loop stopped");
    }

    async fn trigger(&self, rule: &WatchRule) {
        let sequencer = Sequencer::new(&self.registry, rule.sequence.clone());
        info!(rule = %rule.name, sequence = ?sequencer.steps(), "change detected");
        let on_success = Arc::clone(&self.on_success);
        match sequencer
            .run_then(self.ctx.clone(), || async move { on_success() })
            .await
        {
            Ok(()) => info!(rule = %rule.name, "sequence complete"),
            Err(e) => error!(rule = %rule.name, "sequence failed: {e}"),
        }
    }
}

// =============================================================================
// File watcher
// =============================================================================

/// A file watcher that can use either native or polling backend.
///
/// Dropping it stops watching.
pub enum FileWatcher {
    /// Native file system watcher (recommended for local development).
    Native {
        _debouncer: Debouncer<RecommendedWatcher, RecommendedCache>,
    },
    /// Polling-based watcher (for network filesystems, Docker, etc.).
    Polling {
        _debouncer: Debouncer<PollWatcher, RecommendedCache>,
    },
}

impl FileWatcher {
    /// Watch every existing directory in `roots` recursively, sending
    /// debounced changes into `tx`.
    pub fn new(
        config: &WatchConfig,
        roots: &[PathBuf],
        tx: mpsc::Sender<WatchEvent>,
    ) -> Result<Self, WatchError> {
        let debounce_timeout = Duration::from_millis(config.debounce_ms);

        // Runs on the debouncer's thread, outside the async runtime.
        let callback = move |result: DebounceEventResult| match result {
            Ok(events) => {
                let mut changed: Vec<PathBuf> = Vec::new();
                for event in events.iter().filter(|e| is_relevant_event(&e.kind)) {
                    for path in &event.paths {
                        if !is_hidden(path) && !changed.contains(path) {
                            changed.push(path.clone());
                        }
                    }
                }
                if !changed.is_empty() {
                    let _ = tx.blocking_send(WatchEvent::FilesChanged(changed));
                }
            }
            Err(errors) => {
                for e in errors {
                    let _ = tx.blocking_send(WatchEvent::Error(e.to_string()));
                }
            }
        };

        if config.poll {
            let poll_interval = Duration::from_millis(config.poll_interval_ms);
            let notify_config = NotifyConfig::default().with_poll_interval(poll_interval);

            let mut debouncer = new_debouncer_opt::<_, PollWatcher, RecommendedCache>(
                debounce_timeout,
                None,
                callback,
                RecommendedCache::default(),
                notify_config,
            )?;
            watch_roots(&mut debouncer, roots)?;

            Ok(FileWatcher::Polling {
                _debouncer: debouncer,
            })
        } else {
            let mut debouncer = new_debouncer(debounce_timeout, None, callback)?;
            watch_roots(&mut debouncer, roots)?;

            Ok(FileWatcher::Native {
                _debouncer: debouncer,
            })
        }
    }
}

fn watch_roots<W: Watcher, C: notify_debouncer_full::FileIdCache>(
    debouncer: &mut Debouncer<W, C>,
    roots: &[PathBuf],
) -> Result<(), WatchError> {
    let mut watched: Vec<&PathBuf> = Vec::new();
    for root in roots {
        if !root.exists() {
            warn!(path = %root.display(), "watch root does not exist, skipped");
            continue;
        }
        if watched.iter().any(|w| root.starts_with(w)) {
            continue;
        }
        debouncer.watch(root, RecursiveMode::Recursive)?;
        watched.push(root);
    }
    Ok(())
}

/// Editor swap files and dotfiles never trigger rebuilds.
fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy())
        .is_some_and(|n| n.starts_with('.') || n.ends_with('~'))
}

/// Check if an event kind is relevant for rebuilds.
fn is_relevant_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Remove(_)
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Name(_))
            | EventKind::Modify(ModifyKind::Any)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Log = Arc<Mutex<Vec<String>>>;

    fn registry() -> Arc<TaskRegistry<Log>> {
        let mut registry = TaskRegistry::<Log>::new();
        for name in ["refresh", "pages", "inline", "images"] {
            registry
                .register(name, &[], move |log: Log| async move {
                    log.lock().unwrap().push(name.to_string());
                    Ok(())
                })
                .unwrap();
        }
        registry
            .register("broken", &[], |_log: Log| async { anyhow::bail!("bad scss") })
            .unwrap();
        Arc::new(registry)
    }

    fn rules() -> Vec<WatchRule> {
        let root = Path::new("/src");
        vec![
            WatchRule::new("pages", root, &["pages/**/*.hbs".into()], &["pages", "inline"]).unwrap(),
            WatchRule::new(
                "layouts",
                root,
                &["layouts/**/*".into(), "partials/**/*".into()],
                &["refresh", "pages", "inline"],
            )
            .unwrap(),
            WatchRule::new("images", root, &["img/**/*".into()], &["images"]).unwrap(),
            WatchRule::new("styles", root, &["scss/**/*.scss".into()], &["broken"]).unwrap(),
        ]
    }

    fn changed(paths: &[&str]) -> WatchEvent {
        WatchEvent::FilesChanged(paths.iter().map(PathBuf::from).collect())
    }

    async fn dispatch(policy: TriggerPolicy, events: Vec<WatchEvent>) -> (Vec<String>, usize) {
        let log = Log::default();
        let successes = Arc::new(AtomicUsize::new(0));
        let counter = successes.clone();
        let controller = WatchController::new(registry(), log.clone(), rules(), policy)
            .on_success(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let (tx, rx) = mpsc::channel(16);
        for event in events {
            tx.send(event).await.unwrap();
        }
        drop(tx);
        controller.run(rx).await;

        let entries = log.lock().unwrap().clone();
        (entries, successes.load(Ordering::SeqCst))
    }

    #[test]
    fn test_rule_matching() {
        let rules = rules();
        assert!(rules[0].matches(Path::new("/src/pages/welcome.blade.php.hbs")));
        assert!(rules[0].matches(Path::new("/src/pages/account/reset.hbs")));
        assert!(!rules[0].matches(Path::new("/src/layouts/default.html")));
        assert!(rules[1].matches(Path::new("/src/partials/header.hbs")));
        assert!(!rules[2].matches(Path::new("/other/img/logo.png")));
    }

    #[test]
    fn test_root_is_escaped() {
        let rule = WatchRule::new("x", Path::new("/tmp/[draft]"), &["*.scss".into()], &["x"]).unwrap();
        assert!(rule.matches(Path::new("/tmp/[draft]/app.scss")));
    }

    #[tokio::test]
    async fn test_page_change_runs_page_sequence() {
        let (log, successes) = dispatch(
            TriggerPolicy::RunEach,
            vec![changed(&["/src/pages/welcome.blade.php.hbs"])],
        )
        .await;
        assert_eq!(log, vec!["pages", "inline"]);
        assert_eq!(successes, 1);
    }

    #[tokio::test]
    async fn test_layout_change_refreshes_first() {
        let (log, _) =
            dispatch(TriggerPolicy::RunEach, vec![changed(&["/src/layouts/default.html"])]).await;
        assert_eq!(log, vec!["refresh", "pages", "inline"]);
    }

    #[tokio::test]
    async fn test_image_change_only_copies_images() {
        let (log, _) = dispatch(TriggerPolicy::RunEach, vec![changed(&["/src/img/logo.png"])]).await;
        assert_eq!(log, vec!["images"]);
    }

    #[tokio::test]
    async fn test_unmatched_paths_are_ignored() {
        let (log, successes) =
            dispatch(TriggerPolicy::RunEach, vec![changed(&["/elsewhere/readme.md"])]).await;
        assert!(log.is_empty());
        assert_eq!(successes, 0);
    }

    #[tokio::test]
    async fn test_run_each_repeats_sequences() {
        let (log, successes) = dispatch(
            TriggerPolicy::RunEach,
            vec![
                changed(&["/src/pages/a.hbs"]),
                changed(&["/src/pages/b.hbs"]),
            ],
        )
        .await;
        assert_eq!(log, vec!["pages", "inline", "pages", "inline"]);
        assert_eq!(successes, 2);
    }

    #[tokio::test]
    async fn test_coalesce_dedupes_queued_events() {
        let (log, successes) = dispatch(
            TriggerPolicy::Coalesce,
            vec![
                changed(&["/src/pages/a.hbs"]),
                changed(&["/src/pages/b.hbs"]),
                changed(&["/src/img/logo.png"]),
            ],
        )
        .await;
        assert_eq!(log, vec!["pages", "inline", "images"]);
        assert_eq!(successes, 2);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_loop() {
        let (log, successes) = dispatch(
            TriggerPolicy::RunEach,
            vec![
                changed(&["/src/scss/app.scss"]),
                WatchEvent::Error("inotify overflow".to_string()),
                changed(&["/src/img/logo.png"]),
            ],
        )
        .await;
        assert_eq!(log, vec!["images"]);
        assert_eq!(successes, 1);
    }

    #[test]
    fn test_hidden_files() {
        assert!(is_hidden(Path::new("/src/pages/.welcome.hbs.swp")));
        assert!(is_hidden(Path::new("/src/pages/welcome.hbs~")));
        assert!(!is_hidden(Path::new("/src/pages/welcome.hbs")));
    }
}
