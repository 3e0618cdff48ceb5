//! Copies classification results into registry entries.

use super::entry::Entry;
use crate::installation::{classify, ClassificationError, InstallationProfile};
use std::path::Path;

/// Resolves an installation directory into a profile
pub trait InstallationResolver: Send + Sync {
    fn resolve(&self, path: &Path) -> Result<InstallationProfile, ClassificationError>;
}

/// Classifies installations on the local filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemResolver;

impl InstallationResolver for FilesystemResolver {
    fn resolve(&self, path: &Path) -> Result<InstallationProfile, ClassificationError> {
        classify(path)
    }
}

/// Fill in the profile-derived fields of `entry`.
///
/// Returns `Ok(false)` without consulting the resolver when the entry is already enriched.
pub fn enrich_entry(
    entry: &mut Entry,
    resolver: &dyn InstallationResolver,
) -> Result<bool, ClassificationError> {
    if !entry.needs_enrichment() {
        return Ok(false);
    }

    let profile = resolver.resolve(Path::new(&entry.path))?;
    entry.apply_profile(&profile);
    log::debug!(
        "[Registry] Enriched {} as {} ({})",
        entry.display_name,
        profile.runtime_family(),
        profile.target_moniker
    );
    Ok(true)
}
