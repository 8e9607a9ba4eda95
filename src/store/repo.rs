use std::path::PathBuf;

use crate::domain::checkpoint::Checkpoint;
use crate::error::CheckpointError;

pub trait CheckpointRepository {
    /// Latest recoverable checkpoint, or an empty one at count 0.
    fn discover_latest(&mut self) -> Result<Checkpoint, CheckpointError>;

    /// Durably records `checkpoint`, then retires the previous one.
    fn persist(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError>;

    /// Rewrites the current checkpoint in normalized form once scanning is done.
    fn compact(&mut self, checkpoint: &Checkpoint) -> Result<PathBuf, CheckpointError>;
}
