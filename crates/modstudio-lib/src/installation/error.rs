use super::pe::PeError;

/// Why an installation directory could not be classified.
///
/// Every variant carries a stable code (see [`ClassificationError::code`]) so callers can log
/// a machine-readable identifier next to the human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassificationError {
    #[error("Installation directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("No executable with a matching data directory found in {path}")]
    DataDirectoryNotFound { path: String },

    #[error("Multiple executables with a data directory found: {}", .candidates.join(", "))]
    AmbiguousDataDirectory { candidates: Vec<String> },

    #[error("Managed directory not found in {path}")]
    ManagedDirectoryNotFound { path: String },

    #[error("Core runtime assembly {name} not found in {path}")]
    CoreAssemblyMissing { name: String, path: String },

    #[error("Unrecognized target framework (core assembly version {major}.{minor})")]
    UnknownTargetFramework { major: u16, minor: u16 },

    #[error("Failed to classify installation: {message}")]
    Unexpected { message: String },
}

impl ClassificationError {
    pub fn code(&self) -> &'static str {
        match self {
            ClassificationError::Unexpected { .. } => "CLS0000",
            ClassificationError::DirectoryNotFound { .. } => "CLS0001",
            ClassificationError::DataDirectoryNotFound { .. } => "CLS0002",
            ClassificationError::AmbiguousDataDirectory { .. } => "CLS0003",
            ClassificationError::ManagedDirectoryNotFound { .. } => "CLS0004",
            ClassificationError::CoreAssemblyMissing { .. } => "CLS0005",
            ClassificationError::UnknownTargetFramework { .. } => "CLS0006",
        }
    }
}

impl From<std::io::Error> for ClassificationError {
    fn from(err: std::io::Error) -> Self {
        ClassificationError::Unexpected {
            message: err.to_string(),
        }
    }
}

impl From<PeError> for ClassificationError {
    fn from(err: PeError) -> Self {
        ClassificationError::Unexpected {
            message: err.to_string(),
        }
    }
}
