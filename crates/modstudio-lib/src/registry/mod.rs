/// Registry of known game installations: persistence, file watching and matching
pub mod enrich;
pub mod entry;
pub mod error;
pub mod matching;
pub mod store;
mod watcher;

pub use enrich::{enrich_entry, FilesystemResolver, InstallationResolver};
pub use entry::{DebugHookMode, DeploymentMode, Entry};
pub use error::RegistryError;
pub use matching::{find_matching, EntryQuery, MatchResult};
pub use store::RegistryStore;
