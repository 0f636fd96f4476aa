/// Observer for scan progress.
///
/// The CLI implements this with indicatif; library callers that do not care
/// pass [`SilentReporter`]. All methods have default no-op implementations.
/// Progress is observable only; nothing here affects a scan's result.
pub trait ProgressReporter {
    fn on_scan_start(&self) {}
    fn on_scan_progress(&self, _files_found: usize) {}
    fn on_scan_complete(&self, _total_files: usize) {}
    fn on_hash_start(&self, _total_candidates: usize) {}
    fn on_hash_progress(&self, _files_hashed: usize, _total_candidates: usize) {}
    fn on_hash_complete(&self, _duplicate_groups: usize) {}
}

/// No-op progress reporter for silent operation.
pub struct SilentReporter;

impl ProgressReporter for SilentReporter {}
