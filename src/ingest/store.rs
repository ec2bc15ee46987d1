//! The persistence seam the ingestion engine talks to.

use crate::error::Result;
use crate::ingest::SessionRecord;

/// Handle of a checkpoint row; sessions are attached to it
pub type InstanceId = i64;

/// Checkpoints and session rows, keyed by full file path.
///
/// The two `commit_*` methods are the only writes the runner performs. Each
/// must apply its checkpoint change and its session inserts together, or not
/// at all, so that a failed commit leaves the file eligible for a retry of the
/// exact same line range.
pub trait CheckpointStore {
    fn is_file_known(&self, path: &str) -> Result<bool>;

    /// Lines already committed for `path`, 0 when unknown
    fn checkpoint_line_count(&self, path: &str) -> Result<u64>;

    fn instance_handle(&self, path: &str) -> Result<Option<InstanceId>>;

    /// Create the checkpoint for a file seen for the first time and store its
    /// sessions. Fails with a checkpoint conflict if `path` is already known.
    fn commit_new_file(
        &self,
        file_name: &str,
        path: &str,
        line_count: u64,
        records: &[SessionRecord],
    ) -> Result<InstanceId>;

    /// Advance an existing checkpoint from `expected_line_count` to
    /// `new_line_count` and append the sessions parsed from that range.
    /// Fails with a checkpoint conflict, writing nothing, if the stored count
    /// no longer equals `expected_line_count`.
    fn commit_growth(
        &self,
        path: &str,
        expected_line_count: u64,
        new_line_count: u64,
        records: &[SessionRecord],
    ) -> Result<()>;

    /// Re-key every checkpoint under directory `old_dir` to the same relative
    /// path under `new_dir`, keeping line counts and sessions. Returns how many
    /// checkpoints moved.
    fn move_checkpoints(&self, old_dir: &str, new_dir: &str) -> Result<usize>;

    /// Remove every checkpoint and session
    fn clear_all(&self) -> Result<()>;
}
