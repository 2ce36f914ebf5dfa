use std::sync::Arc;

use crate::progress::Phase;

/// A pipeline stage failed. Cloneable so every caller awaiting the same
/// in-flight stage receives the same failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{stage} failed: {cause:#}")]
pub struct StageError {
    pub stage: Phase,
    cause: Arc<anyhow::Error>,
}

impl StageError {
    pub fn new(stage: Phase, cause: anyhow::Error) -> Self {
        Self {
            stage,
            cause: Arc::new(cause),
        }
    }

    pub fn cause(&self) -> &anyhow::Error {
        &self.cause
    }
}

/// Tags a stage body's `anyhow` error with the stage it came from.
pub trait StageContext<T> {
    fn in_stage(self, stage: Phase) -> Result<T, StageError>;
}

impl<T> StageContext<T> for anyhow::Result<T> {
    fn in_stage(self, stage: Phase) -> Result<T, StageError> {
        self.map_err(|err| StageError::new(stage, err))
    }
}
