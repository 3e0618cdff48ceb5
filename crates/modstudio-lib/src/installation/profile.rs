use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Label rendered for monikers that match no known family
pub const UNKNOWN_PROFILE_LABEL: &str = "<unknown>";

static LEGACY_MONIKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^legacy-(\d+)\.(\d+)$").expect("valid legacy moniker regex"));
static STANDARD_MONIKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^standard-(\d+)\.(\d+)$").expect("valid standard moniker regex"));

/// CPU architecture of the game executable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Architecture {
    X86,
    X64,
    Arm,
    Arm64,
    Unknown,
}

impl Architecture {
    /// Map an `IMAGE_FILE_HEADER.Machine` value
    pub fn from_machine(machine: u16) -> Self {
        match machine {
            0x014c => Architecture::X86,
            0x8664 => Architecture::X64,
            0x01c0 | 0x01c4 => Architecture::Arm,
            0xAA64 => Architecture::Arm64,
            _ => Architecture::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Architecture::X86 => "x86",
            Architecture::X64 => "x64",
            Architecture::Arm => "arm",
            Architecture::Arm64 => "arm64",
            Architecture::Unknown => "unknown",
        }
    }
}

/// Runtime characteristics of a game installation, derived by classification
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationProfile {
    /// Product name from the metadata file
    pub display_name: Option<String>,

    /// Publisher from the metadata file
    pub publisher: Option<String>,

    pub architecture: Architecture,

    /// The game's own version, from the executable's version resource
    pub runtime_version: String,

    /// Framework identifier, e.g. "legacy-4.6" or "standard-2.0"
    pub target_moniker: String,

    /// Installation ships the reduced ("subset") companion assembly set
    pub is_reduced_profile: bool,

    pub root_directory: PathBuf,
    pub executable_file: PathBuf,
    pub data_directory: PathBuf,

    /// Runtime (base class library) assemblies
    pub framework_assemblies: BTreeSet<PathBuf>,

    /// Everything else in the managed directory
    pub game_assemblies: BTreeSet<PathBuf>,
}

impl InstallationProfile {
    pub fn profile_label(&self) -> String {
        profile_label(&self.target_moniker, self.is_reduced_profile)
    }

    /// Game name: the product name if known, otherwise the executable's base name
    pub fn runtime_family(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.executable_base_name())
    }

    pub fn executable_file_name(&self) -> String {
        self.executable_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    fn executable_base_name(&self) -> String {
        self.executable_file
            .file_stem()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Human-readable rendering of a target moniker.
///
/// Never fails: persisted entries may carry monikers from older classification
/// tables, so anything unrecognized renders as [`UNKNOWN_PROFILE_LABEL`].
pub fn profile_label(target_moniker: &str, is_reduced_profile: bool) -> String {
    let moniker = target_moniker.trim().to_ascii_lowercase();

    let family = if let Some(caps) = LEGACY_MONIKER.captures(&moniker) {
        format!("Legacy {}.{}", &caps[1], &caps[2])
    } else if let Some(caps) = STANDARD_MONIKER.captures(&moniker) {
        format!("Standard {}.{}", &caps[1], &caps[2])
    } else {
        return UNKNOWN_PROFILE_LABEL.to_string();
    };

    if is_reduced_profile {
        format!("{family} Subset")
    } else {
        family
    }
}
