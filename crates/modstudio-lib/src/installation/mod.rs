/// Installation classification: turn a game directory into an [`InstallationProfile`]
pub mod classifier;
pub mod error;
pub mod pe;
pub mod profile;

#[cfg(test)]
mod fixtures;
#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use classifier::classify;
pub use error::ClassificationError;
pub use pe::{FixedVersion, PeError, PeImage, VersionInfo};
pub use profile::{profile_label, Architecture, InstallationProfile, UNKNOWN_PROFILE_LABEL};
