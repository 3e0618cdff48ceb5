//! Centralized settings.
//! Layout constants for installations and the runtime configuration of the registry.

use directories::ProjectDirs;
use std::path::PathBuf;
use std::time::Duration;

/// File name of the registry document inside the data directory
pub const REGISTRY_FILE_NAME: &str = "installations.json";

/// Publisher / product name metadata file inside an installation's data directory
pub const METADATA_FILE_NAME: &str = "app.info";

/// Directory holding managed assemblies inside the data directory
pub const MANAGED_DIR_NAME: &str = "Managed";

/// `<executable>_Data` naming convention for the data directory
pub const DATA_DIR_SUFFIX: &str = "_Data";

/// Core runtime assembly whose version drives framework classification
pub const CORE_ASSEMBLY_NAME: &str = "mscorlib.dll";

pub const EXECUTABLE_EXTENSION: &str = "exe";
pub const ASSEMBLY_EXTENSION: &str = "dll";

/// Pending file-change notifications buffered between the watcher thread and the reload task
pub const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Quiet period after a change notification before the registry is reloaded
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(50);

pub const ENV_REGISTRY_PATH: &str = "MODSTUDIO_REGISTRY_PATH";
pub const ENV_REGISTRY_WATCH: &str = "MODSTUDIO_REGISTRY_WATCH";

/// Runtime configuration for a registry store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    /// Backing file of the registry
    pub registry_path: PathBuf,

    /// Reload automatically when another process edits the backing file
    pub watch: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            watch: false,
        }
    }
}

impl RegistryConfig {
    pub fn new(registry_path: impl Into<PathBuf>) -> Self {
        Self {
            registry_path: registry_path.into(),
            watch: false,
        }
    }

    /// Defaults overlaid with `MODSTUDIO_REGISTRY_PATH` / `MODSTUDIO_REGISTRY_WATCH`
    pub fn from_env() -> Self {
        Self::default().with_overrides(
            std::env::var(ENV_REGISTRY_PATH).ok(),
            std::env::var(ENV_REGISTRY_WATCH).ok(),
        )
    }

    fn with_overrides(mut self, path: Option<String>, watch: Option<String>) -> Self {
        if let Some(path) = path.filter(|p| !p.trim().is_empty()) {
            self.registry_path = PathBuf::from(path);
        }

        if let Some(watch) = watch {
            self.watch = parse_flag(&watch);
        }

        self
    }
}

/// Per-user data directory location of the registry document
pub fn default_registry_path() -> PathBuf {
    match ProjectDirs::from("com", "modstudio", "modstudio") {
        Some(dirs) => dirs.data_dir().join(REGISTRY_FILE_NAME),
        None => {
            log::warn!("Could not determine user data directory, using working directory for registry");
            PathBuf::from(REGISTRY_FILE_NAME)
        }
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
