use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("An installation with id {0} is already registered")]
    DuplicateId(Uuid),

    #[error("No installation with id {0} is registered")]
    EntryNotFound(Uuid),

    #[error("Failed to access registry file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse registry file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to serialize registry: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("Failed to watch registry file: {0}")]
    Watch(#[from] notify::Error),

    #[error("Watching the registry requires a running tokio runtime")]
    NoRuntime,
}

pub type Result<T> = std::result::Result<T, RegistryError>;
