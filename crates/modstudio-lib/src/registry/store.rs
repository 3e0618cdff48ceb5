/// Persistent registry of known game installations
use super::enrich::{enrich_entry, InstallationResolver};
use super::entry::Entry;
use super::error::{RegistryError, Result};
use super::matching::{find_matching, names_equal, EntryQuery, MatchResult};
use super::watcher::WatchController;
use crate::config::{RegistryConfig, WATCH_DEBOUNCE};
use crate::utils::compare_versions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// On-disk shape of the registry file
#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistryDocument {
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Serialize)]
struct RegistryDocumentRef<'a> {
    entries: &'a [Entry],
}

pub(super) struct StoreInner {
    path: PathBuf,

    /// Insertion ordered; removal keeps the order of the rest
    entries: RwLock<Vec<Entry>>,

    /// Serializes loads and saves; holds the document last read from or written to disk
    synced: Mutex<Option<String>>,

    watch: WatchController,
}

impl StoreInner {
    pub(super) fn path(&self) -> &Path {
        &self.path
    }

    pub(super) async fn load(&self) -> Result<usize> {
        let mut synced = self.synced.lock().await;

        let contents = self.read().await?;
        let entries = match &contents {
            Some(contents) => parse_document(&self.path, contents)?,
            None => {
                log::debug!("[Registry] {:?} does not exist yet", self.path);
                Vec::new()
            }
        };
        *synced = contents;
        Ok(self.apply(entries).await)
    }

    /// Reload after an external change, once the file has stopped changing.
    ///
    /// A writer that truncates before writing leaves a blank or half-written file behind for a
    /// moment; such a state is skipped so the in-memory registry is never wiped by it. Returns
    /// `None` when the reload was skipped.
    pub(super) async fn reload_settled(&self) -> Result<Option<usize>> {
        let mut synced = self.synced.lock().await;

        let first = self.read().await?;
        tokio::time::sleep(WATCH_DEBOUNCE).await;
        let second = self.read().await?;

        if first != second {
            log::debug!("[Registry] {:?} is still being written, skipping reload", self.path);
            return Ok(None);
        }

        if second.is_some() && second == *synced {
            log::debug!("[Registry] {:?} is unchanged since last sync", self.path);
            return Ok(None);
        }

        let entries = match &second {
            Some(contents) if contents.trim().is_empty() => {
                log::debug!("[Registry] {:?} is blank, keeping current entries", self.path);
                return Ok(None);
            }
            Some(contents) => parse_document(&self.path, contents)?,
            None => Vec::new(),
        };
        *synced = second;
        Ok(Some(self.apply(entries).await))
    }

    /// `None` when the file does not exist
    async fn read(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(RegistryError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }

    async fn apply(&self, entries: Vec<Entry>) -> usize {
        let count = entries.len();
        *self.entries.write().await = entries;

        log::info!("[Registry] Loaded {} installations from {:?}", count, self.path);
        count
    }
}

/// A missing or blank document is an empty registry
fn parse_document(path: &Path, contents: &str) -> Result<Vec<Entry>> {
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }

    let document: RegistryDocument =
        serde_json::from_str(contents).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(document.entries)
}

/// Write through a sibling temporary file so readers never see a partial document
async fn write_atomic(path: &Path, contents: String) -> Result<()> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source: std::io::Error| RegistryError::Io { path, source }
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_err(parent))?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

    fs::write(&temp_path, contents)
        .await
        .map_err(io_err(&temp_path))?;

    if let Err(source) = fs::rename(&temp_path, path).await {
        let _ = fs::remove_file(&temp_path).await;
        return Err(RegistryError::Io {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(())
}

/// In-memory collection of [`Entry`] records backed by a single JSON file.
///
/// Cloning is cheap and every clone refers to the same collection. Changes only reach disk on
/// [`RegistryStore::save`].
#[derive(Clone)]
pub struct RegistryStore {
    inner: Arc<StoreInner>,
}

impl RegistryStore {
    /// Create an empty store backed by `path`; nothing is read until [`RegistryStore::load`]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let inner = Arc::new_cyclic(|weak| StoreInner {
            watch: WatchController::new(weak.clone(), path.clone()),
            path,
            entries: RwLock::new(Vec::new()),
            synced: Mutex::new(None),
        });
        Self { inner }
    }

    /// Create a store from configuration, load it and start watching if requested
    pub async fn open(config: &RegistryConfig) -> Result<Self> {
        let store = Self::new(config.registry_path.clone());
        store.load().await?;
        if config.watch {
            store.set_watch(true)?;
        }
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Register a new entry
    pub async fn add(&self, entry: Entry) -> Result<()> {
        let mut entries = self.inner.entries.write().await;
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(RegistryError::DuplicateId(entry.id));
        }

        log::info!("[Registry] Adding installation: {} ({})", entry.display_name, entry.id);
        entries.push(entry);
        Ok(())
    }

    /// Remove an entry by id, returning it if it was registered
    pub async fn remove(&self, id: Uuid) -> Option<Entry> {
        let mut entries = self.inner.entries.write().await;
        let index = entries.iter().position(|e| e.id == id)?;
        let removed = entries.remove(index);
        log::info!("[Registry] Removed installation: {} ({})", removed.display_name, id);
        Some(removed)
    }

    /// Replace the entry with the same id in place
    pub async fn update(&self, entry: Entry) -> Result<()> {
        let mut entries = self.inner.entries.write().await;
        let slot = entries
            .iter_mut()
            .find(|e| e.id == entry.id)
            .ok_or(RegistryError::EntryNotFound(entry.id))?;
        *slot = entry;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Option<Entry> {
        let entries = self.inner.entries.read().await;
        entries.iter().find(|e| e.id == id).cloned()
    }

    /// First entry whose display name matches, ignoring case
    pub async fn find_by_display_name(&self, name: &str) -> Option<Entry> {
        let entries = self.inner.entries.read().await;
        entries
            .iter()
            .find(|e| names_equal(&e.display_name, name))
            .cloned()
    }

    /// Match by `id`, `displayName`, `gameName` and `version` properties
    pub async fn find_by_properties(
        &self,
        properties: &HashMap<String, String>,
        strict: bool,
    ) -> MatchResult {
        self.find(&EntryQuery::from_properties(properties), strict)
            .await
    }

    pub async fn find(&self, query: &EntryQuery, strict: bool) -> MatchResult {
        let entries = self.inner.entries.read().await;
        find_matching(&entries, query, strict)
    }

    /// Highest-versioned entry of a game; unversioned entries rank lowest
    pub async fn find_latest_by_game_name(&self, game_name: &str) -> Option<Entry> {
        let entries = self.inner.entries.read().await;
        entries
            .iter()
            .filter(|e| e.runtime_family.as_deref() == Some(game_name))
            .max_by(|a, b| compare_versions(a.version.as_deref(), b.version.as_deref()))
            .cloned()
    }

    /// Snapshot of all entries in iteration order
    pub async fn entries(&self) -> Vec<Entry> {
        self.inner.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.entries.read().await.is_empty()
    }

    /// Replace the in-memory collection with the file contents, returning the entry count
    pub async fn load(&self) -> Result<usize> {
        self.inner.load().await
    }

    /// Write every entry to the backing file, overwriting it
    pub async fn save(&self) -> Result<()> {
        let _suspension = self.inner.watch.suspend();
        let mut synced = self.inner.synced.lock().await;

        let contents = {
            let entries = self.inner.entries.read().await;
            serde_json::to_string_pretty(&RegistryDocumentRef { entries: &entries })
                .map_err(RegistryError::Serialize)?
        };

        write_atomic(&self.inner.path, contents.clone()).await?;
        // A late change event for this write must not replace newer in-memory edits
        *synced = Some(contents);
        log::info!("[Registry] Saved registry to {:?}", self.inner.path);
        Ok(())
    }

    /// Reload automatically when the backing file changes on disk
    pub fn set_watch(&self, enabled: bool) -> Result<()> {
        self.inner.watch.set_enabled(enabled)
    }

    pub fn is_watching(&self) -> bool {
        self.inner.watch.is_enabled()
    }

    /// Enrich every entry that still lacks profile data.
    ///
    /// Entries that fail to resolve are logged and left untouched. Returns how many were
    /// enriched.
    pub async fn enrich_all(&self, resolver: &dyn InstallationResolver) -> usize {
        let pending: Vec<Entry> = {
            let entries = self.inner.entries.read().await;
            entries.iter().filter(|e| e.needs_enrichment()).cloned().collect()
        };

        let mut enriched = Vec::new();
        for mut entry in pending {
            match enrich_entry(&mut entry, resolver) {
                Ok(true) => enriched.push(entry),
                Ok(false) => {}
                Err(e) => log::warn!(
                    "[Registry] Could not enrich {} from {:?}: {} [{}]",
                    entry.display_name,
                    entry.path,
                    e,
                    e.code()
                ),
            }
        }

        // Entries removed while resolving are not re-added
        let mut entries = self.inner.entries.write().await;
        let mut count = 0;
        for update in enriched {
            if let Some(slot) = entries.iter_mut().find(|e| e.id == update.id) {
                *slot = update;
                count += 1;
            }
        }
        count
    }
}
