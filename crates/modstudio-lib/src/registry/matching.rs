//! Multi-criteria lookup over registry entries.
//!
//! Criteria are tried from most to least specific: id, display name, then game name plus
//! version. In strict mode an unmatched id or display name ends the query; in loose mode it is
//! ignored and the next criterion is tried.

use super::entry::Entry;
use std::collections::HashMap;
use uuid::Uuid;

pub const PROPERTY_ID: &str = "id";
pub const PROPERTY_DISPLAY_NAME: &str = "displayName";
pub const PROPERTY_GAME_NAME: &str = "gameName";
pub const PROPERTY_VERSION: &str = "version";

/// Outcome of a lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    NoMatch,
    Match(Entry),
    Ambiguous { entries: Vec<Entry>, message: String },
}

impl MatchResult {
    fn from_candidates(mut candidates: Vec<Entry>) -> Self {
        match candidates.len() {
            0 => MatchResult::NoMatch,
            1 => MatchResult::Match(candidates.remove(0)),
            _ => {
                let names: Vec<&str> = candidates.iter().map(|e| e.display_name.as_str()).collect();
                let message = format!(
                    "Multiple installations match the given criteria: {}",
                    names.join(", ")
                );
                MatchResult::Ambiguous {
                    entries: candidates,
                    message,
                }
            }
        }
    }

    pub fn entry(&self) -> Option<&Entry> {
        match self {
            MatchResult::Match(entry) => Some(entry),
            _ => None,
        }
    }

    pub fn is_match(&self) -> bool {
        matches!(self, MatchResult::Match(_))
    }
}

/// Whatever identity information the caller has about an installation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    /// Raw id; a value that is not a UUID matches nothing
    pub id: Option<String>,
    pub display_name: Option<String>,
    pub game_name: Option<String>,
    pub version: Option<String>,
}

impl EntryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys are matched case-insensitively; unknown keys are ignored
    /// Keys match case-insensitively. When several spellings of one key are present the exact
    /// spelling wins, then the lexicographically smallest.
    pub fn from_properties(properties: &HashMap<String, String>) -> Self {
        let lookup = |name: &str| {
            properties.get(name).cloned().or_else(|| {
                properties
                    .iter()
                    .filter(|(key, _)| key.eq_ignore_ascii_case(name))
                    .min_by(|(a, _), (b, _)| a.cmp(b))
                    .map(|(_, value)| value.clone())
            })
        };

        Self {
            id: lookup(PROPERTY_ID),
            display_name: lookup(PROPERTY_DISPLAY_NAME),
            game_name: lookup(PROPERTY_GAME_NAME),
            version: lookup(PROPERTY_VERSION),
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id.to_string());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_game_name(mut self, name: impl Into<String>) -> Self {
        self.game_name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

/// Case-insensitive comparison used for display names
pub(crate) fn names_equal(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

pub fn find_matching(entries: &[Entry], query: &EntryQuery, strict: bool) -> MatchResult {
    if let Some(id) = &query.id {
        let found = Uuid::parse_str(id.trim())
            .ok()
            .and_then(|id| entries.iter().find(|e| e.id == id));

        match found {
            Some(entry) => return MatchResult::Match(entry.clone()),
            None if strict => return MatchResult::NoMatch,
            None => {}
        }
    }

    if let Some(name) = &query.display_name {
        let candidates: Vec<Entry> = entries
            .iter()
            .filter(|e| names_equal(&e.display_name, name))
            .cloned()
            .collect();

        if !candidates.is_empty() || strict {
            return MatchResult::from_candidates(candidates);
        }
    }

    if let Some(game_name) = &query.game_name {
        let version = query.version.as_deref().filter(|v| !v.is_empty());

        let mut candidates: Vec<Entry> = entries
            .iter()
            .filter(|e| e.runtime_family.as_deref() == Some(game_name.as_str()))
            .filter(|e| version.map_or(true, |v| e.version.as_deref() == Some(v)))
            .cloned()
            .collect();

        // Entries registered before versions were tracked have none
        if candidates.len() > 1 && version.is_none() && !strict {
            let unversioned: Vec<Entry> = candidates
                .iter()
                .filter(|e| e.version.as_deref().map_or(true, str::is_empty))
                .cloned()
                .collect();
            if !unversioned.is_empty() {
                candidates = unversioned;
            }
        }

        if !candidates.is_empty() {
            return MatchResult::from_candidates(candidates);
        }
    }

    MatchResult::NoMatch
}
