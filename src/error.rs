#![forbid(unsafe_code)]

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TaskgoError {
    #[error("task {0} not found")]
    NotFound(u64),

    #[error("invalid duration '{0}' (examples: 30m, 2h, 1h30m, none)")]
    InvalidDuration(String),

    #[error("invalid status '{0}' (use: todo, in-progress, completed)")]
    InvalidStatus(String),

    #[error("task title must not be empty")]
    EmptyTitle,

    #[error("flow name must not be empty")]
    EmptyFlowName,

    #[error("flow '{0}' already exists")]
    FlowExists(String),

    #[error("flow '{0}' not found")]
    FlowNotFound(String),

    #[error("storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: StorageError,
    },

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid config key '{0}'")]
    InvalidConfigKey(String),

    #[error("invalid config value for '{key}': {msg}")]
    InvalidConfigValue { key: String, msg: String },
}

/// Underlying cause of a failed load or save.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("malformed data: {0}")]
    Format(#[from] serde_json::Error),
}

impl TaskgoError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: impl Into<StorageError>) -> Self {
        Self::Storage {
            path: path.into(),
            source: source.into(),
        }
    }

    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage { .. })
    }
}
