use thiserror::Error;

use weekgrid_core::CoreError;
use weekgrid_storage::StorageError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),
}
