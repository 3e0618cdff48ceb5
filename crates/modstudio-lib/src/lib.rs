//! Installation registry for game mod tooling: classify game installations, order their
//! version strings and keep a persistent, watchable registry of them.

pub mod config;
pub mod installation;
pub mod registry;
pub mod utils;

pub use config::RegistryConfig;
pub use installation::{classify, ClassificationError, InstallationProfile};
pub use registry::{Entry, EntryQuery, MatchResult, RegistryError, RegistryStore};
pub use utils::{compare_versions, Version};
