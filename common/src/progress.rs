//! The outbound reporting contract between the copy engine and whatever is
//! displaying progress. The engine invokes it from the traversal task, the
//! pre-scan task and every file worker, so implementations synchronize
//! internally.

/// Asynchronous status updates and errors from a copy run.
///
/// No ordering is guaranteed between calls except that a file's
/// [`file_start`](Progress::file_start) precedes its
/// [`file_done`](Progress::file_done). In particular `progress` may arrive
/// before `max`; consumers must tolerate the running total transiently
/// exceeding the announced maximum.
pub trait Progress: Send + Sync {
    /// Sets the total number of work units for the run. Called exactly once,
    /// from the size pre-scan.
    fn max(&self, total: u64);

    /// Reports that `n` additional work units have completed.
    fn progress(&self, n: u64);

    /// Reports that `src` is about to be copied to `dst`. Only called for
    /// regular files, not directories or symlinks.
    fn file_start(&self, src: &str, dst: &str);

    /// Reports that a regular file finished copying (`err` is `None`), or
    /// that copying an entry failed. Directories and symlinks show up here
    /// only on error; their successes are a bare `progress(1)`.
    fn file_done(&self, src: &str, err: Option<anyhow::Error>);
}
