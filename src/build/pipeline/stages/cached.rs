//! Incremental cache filter.

use crate::build::cache::{CacheHandle, fingerprint};
use crate::build::pipeline::{FileRecord, PendingEntry, PipelineContext, PipelineError, Stage};

/// Drops records whose content is unchanged since the last successful write
/// in this task's namespace.
///
/// Surviving records are marked so their fingerprint is stored once they have
/// been written. Production builds bypass the cache entirely.
pub struct Cached {
    handle: CacheHandle,
}

impl Cached {
    pub fn new(handle: CacheHandle) -> Self {
        Self { handle }
    }
}

impl Stage for Cached {
    fn name(&self) -> &'static str {
        "cached"
    }

    fn process(
        &self,
        files: &mut Vec<FileRecord>,
        ctx: &mut PipelineContext,
    ) -> Result<(), PipelineError> {
        if ctx.mode.is_production() {
            return Ok(());
        }

        files.retain_mut(|file| {
            let fp = fingerprint(&file.contents);
            if self.handle.is_fresh(&file.origin, &fp) {
                return false;
            }
            file.pending.push(PendingEntry {
                handle: self.handle.clone(),
                key: file.origin.clone(),
                fingerprint: fp,
            });
            true
        });
        Ok(())
    }
}
