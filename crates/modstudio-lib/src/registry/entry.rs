use crate::installation::{Architecture, InstallationProfile};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How mod output is placed into the game directory
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentMode {
    #[default]
    Copy,
    Link,
}

/// Whether the injected debug hook waits for a debugger on startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DebugHookMode {
    #[default]
    Disabled,
    Enabled,
    WaitForDebugger,
}

/// A known game installation and its mod deployment preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: Uuid,
    pub display_name: String,
    pub path: String,

    /// Mods folder relative to `path`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mods_sub_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default)]
    pub deployment_mode: DeploymentMode,
    #[serde(default)]
    pub deploy_source_code: bool,
    #[serde(default)]
    pub debug_hook_mode: DebugHookMode,
    #[serde(default)]
    pub use_alternate_hook_name: bool,

    // Mirrored from the installation profile by enrichment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_family: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub architecture: Option<Architecture>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_moniker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_label: Option<String>,
}

impl Entry {
    /// New entry with a fresh id and default preferences
    pub fn new(display_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            display_name: display_name.into(),
            path: path.into(),
            mods_sub_path: None,
            version: None,
            deployment_mode: DeploymentMode::default(),
            deploy_source_code: false,
            debug_hook_mode: DebugHookMode::default(),
            use_alternate_hook_name: false,
            runtime_family: None,
            executable_file_name: None,
            architecture: None,
            runtime_version: None,
            target_moniker: None,
            profile_label: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// True while any profile-derived field is still missing
    pub fn needs_enrichment(&self) -> bool {
        self.runtime_family.is_none()
            || self.executable_file_name.is_none()
            || self.architecture.is_none()
            || self.runtime_version.is_none()
            || self.target_moniker.is_none()
            || self.profile_label.is_none()
    }

    pub fn apply_profile(&mut self, profile: &InstallationProfile) {
        self.runtime_family = Some(profile.runtime_family());
        self.executable_file_name = Some(profile.executable_file_name());
        self.architecture = Some(profile.architecture);
        self.runtime_version = Some(profile.runtime_version.clone());
        self.target_moniker = Some(profile.target_moniker.clone());
        self.profile_label = Some(profile.profile_label());
    }
}
