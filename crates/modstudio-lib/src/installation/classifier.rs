//! Installation classification: locate the data and managed directories, read the core
//! assembly version and map it to a target framework through an ordered rule table.

use super::error::ClassificationError;
use super::pe::PeImage;
use super::profile::InstallationProfile;
use crate::config::{
    ASSEMBLY_EXTENSION, CORE_ASSEMBLY_NAME, DATA_DIR_SUFFIX, EXECUTABLE_EXTENSION,
    MANAGED_DIR_NAME, METADATA_FILE_NAME,
};
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const NETSTANDARD: &str = "netstandard.dll";
const SYSTEM_CORE: &str = "System.Core.dll";
const SYSTEM_XML_LINQ: &str = "System.Xml.Linq.dll";

/// One row of the framework decision table
#[derive(Debug)]
struct FrameworkRule {
    major: u16,
    /// `None` matches any minor version
    minor: Option<u16>,
    /// Companion assemblies that must all be present
    requires: &'static [&'static str],
    moniker: &'static str,
    reduced: bool,
}

/// Evaluated top to bottom, first match wins. Append new runtime generations at the end of
/// their major-version group.
#[rustfmt::skip]
const FRAMEWORK_RULES: &[FrameworkRule] = &[
    FrameworkRule { major: 4, minor: None, requires: &[NETSTANDARD], moniker: "standard-2.0", reduced: false },
    FrameworkRule { major: 4, minor: None, requires: &[], moniker: "legacy-4.6", reduced: false },
    FrameworkRule { major: 3, minor: None, requires: &[SYSTEM_CORE], moniker: "legacy-3.5", reduced: true },
    FrameworkRule { major: 3, minor: None, requires: &[], moniker: "legacy-2.0", reduced: true },
    FrameworkRule { major: 2, minor: None, requires: &[SYSTEM_CORE, SYSTEM_XML_LINQ], moniker: "legacy-3.5", reduced: false },
    FrameworkRule { major: 2, minor: None, requires: &[SYSTEM_CORE], moniker: "legacy-3.5", reduced: true },
    FrameworkRule { major: 2, minor: None, requires: &[], moniker: "legacy-2.0", reduced: false },
];

/// Base class library shipped with the legacy runtimes
const LEGACY_FRAMEWORK_ASSEMBLIES: &[&str] = &[
    "mscorlib.dll",
    "System.dll",
    "System.Core.dll",
    "System.Xml.dll",
    "System.Xml.Linq.dll",
    "System.Data.dll",
    "System.Data.DataSetExtensions.dll",
    "System.Configuration.dll",
    "System.Security.dll",
    "System.Drawing.dll",
    "System.Transactions.dll",
    "System.EnterpriseServices.dll",
    "System.Numerics.dll",
    "System.Runtime.Serialization.dll",
    "System.ServiceModel.dll",
    "System.ServiceModel.Internals.dll",
    "System.Web.dll",
    "System.Web.Services.dll",
    "System.Net.Http.dll",
    "System.IO.Compression.dll",
    "System.IO.Compression.FileSystem.dll",
    "System.ComponentModel.Composition.dll",
    "System.ComponentModel.DataAnnotations.dll",
    "Microsoft.CSharp.dll",
    "Mono.Security.dll",
    "Mono.Posix.dll",
    "Mono.Data.Tds.dll",
    "Mono.Messaging.dll",
];

/// Facades added on top of the legacy set when the standard companion ships
const STANDARD_FACADE_ASSEMBLIES: &[&str] = &[
    "netstandard.dll",
    "System.Runtime.dll",
    "System.Collections.dll",
    "System.Collections.Concurrent.dll",
    "System.Linq.dll",
    "System.Linq.Expressions.dll",
    "System.Reflection.dll",
    "System.Threading.dll",
    "System.Threading.Tasks.dll",
    "System.Text.Encoding.dll",
    "System.Text.RegularExpressions.dll",
    "System.Globalization.dll",
    "System.Diagnostics.Debug.dll",
    "System.Runtime.Extensions.dll",
    "System.Runtime.InteropServices.dll",
    "System.ValueTuple.dll",
    "System.Memory.dll",
    "System.Buffers.dll",
];

/// Classify the installation rooted at `root`.
///
/// Data-shape problems come back as their dedicated [`ClassificationError`] variant; any other
/// I/O or parsing fault is reported as [`ClassificationError::Unexpected`].
pub fn classify(root: impl AsRef<Path>) -> Result<InstallationProfile, ClassificationError> {
    let root = root.as_ref();
    if !root.is_dir() {
        return Err(ClassificationError::DirectoryNotFound {
            path: root.display().to_string(),
        });
    }

    log::debug!("[Classifier] Classifying installation at {:?}", root);

    match classify_directory(root) {
        Ok(profile) => {
            log::info!(
                "[Classifier] {:?}: {} ({}, {})",
                root,
                profile.runtime_family(),
                profile.profile_label(),
                profile.architecture.as_str()
            );
            Ok(profile)
        }
        Err(e) => {
            log::warn!("[Classifier] {:?}: {} [{}]", root, e, e.code());
            Err(e)
        }
    }
}

fn classify_directory(root: &Path) -> Result<InstallationProfile, ClassificationError> {
    let root = dunce::canonicalize(root)?;
    let (executable_file, data_directory) = locate_data_directory(&root)?;
    let managed_dir = locate_managed_directory(&data_directory)?;

    let assemblies = list_files(&managed_dir, ASSEMBLY_EXTENSION)?;
    let core_assembly = assemblies
        .iter()
        .find(|path| file_name_eq(path, CORE_ASSEMBLY_NAME))
        .ok_or_else(|| ClassificationError::CoreAssemblyMissing {
            name: CORE_ASSEMBLY_NAME.to_string(),
            path: managed_dir.display().to_string(),
        })?;

    let core_version = PeImage::open(core_assembly)?
        .version_info()?
        .file_version
        .ok_or_else(|| ClassificationError::Unexpected {
            message: format!("{} has no file version", CORE_ASSEMBLY_NAME),
        })?;

    let present: HashSet<String> = assemblies.iter().filter_map(|p| lower_file_name(p)).collect();
    let rule = select_framework(core_version.major, core_version.minor, &present).ok_or(
        ClassificationError::UnknownTargetFramework {
            major: core_version.major,
            minor: core_version.minor,
        },
    )?;

    let (framework_assemblies, game_assemblies) =
        partition_assemblies(assemblies, present.contains(&NETSTANDARD.to_ascii_lowercase()));

    let (publisher, display_name) = read_metadata(&data_directory)?;

    let executable = PeImage::open(&executable_file)?;
    let runtime_version = executable
        .version_info()?
        .product_version()
        .ok_or_else(|| ClassificationError::Unexpected {
            message: format!("{:?} has no product version", executable_file),
        })?;

    Ok(InstallationProfile {
        display_name,
        publisher,
        architecture: executable.architecture(),
        runtime_version,
        target_moniker: rule.moniker.to_string(),
        is_reduced_profile: rule.reduced,
        root_directory: root,
        executable_file,
        data_directory,
        framework_assemblies,
        game_assemblies,
    })
}

/// Find the single `<exe>` / `<exe>_Data` pair directly under `root`
fn locate_data_directory(root: &Path) -> Result<(PathBuf, PathBuf), ClassificationError> {
    let mut pairs = Vec::new();

    for executable in list_files(root, EXECUTABLE_EXTENSION)? {
        let Some(stem) = executable.file_stem() else {
            continue;
        };
        let data_dir = root.join(format!("{}{}", stem.to_string_lossy(), DATA_DIR_SUFFIX));
        if data_dir.is_dir() {
            pairs.push((executable, data_dir));
        }
    }

    match pairs.len() {
        0 => Err(ClassificationError::DataDirectoryNotFound {
            path: root.display().to_string(),
        }),
        1 => Ok(pairs.remove(0)),
        _ => Err(ClassificationError::AmbiguousDataDirectory {
            candidates: pairs
                .iter()
                .map(|(_, data)| data.display().to_string())
                .collect(),
        }),
    }
}

/// The managed directory must be named exactly `Managed`
fn locate_managed_directory(data_dir: &Path) -> Result<PathBuf, ClassificationError> {
    for entry in std::fs::read_dir(data_dir)? {
        let entry = entry?;
        // `Path::is_dir` follows links, matching the `_Data` sibling check
        if entry.file_name() == MANAGED_DIR_NAME && entry.path().is_dir() {
            return Ok(entry.path());
        }
    }

    Err(ClassificationError::ManagedDirectoryNotFound {
        path: data_dir.display().to_string(),
    })
}

fn select_framework(
    major: u16,
    minor: u16,
    present: &HashSet<String>,
) -> Option<&'static FrameworkRule> {
    FRAMEWORK_RULES.iter().find(|rule| {
        rule.major == major
            && rule.minor.map_or(true, |m| m == minor)
            && rule
                .requires
                .iter()
                .all(|name| present.contains(&name.to_ascii_lowercase()))
    })
}

/// Split assemblies into runtime and game sets; the two are disjoint and cover the input
fn partition_assemblies(
    assemblies: Vec<PathBuf>,
    has_standard: bool,
) -> (BTreeSet<PathBuf>, BTreeSet<PathBuf>) {
    let mut names: HashSet<String> = LEGACY_FRAMEWORK_ASSEMBLIES
        .iter()
        .map(|n| n.to_ascii_lowercase())
        .collect();
    if has_standard {
        names.extend(STANDARD_FACADE_ASSEMBLIES.iter().map(|n| n.to_ascii_lowercase()));
    }

    assemblies.into_iter().partition(|path| {
        lower_file_name(path)
            .map(|name| names.contains(&name))
            .unwrap_or(false)
    })
}

/// First line is the publisher, second the product name; both optional
fn read_metadata(data_dir: &Path) -> Result<(Option<String>, Option<String>), ClassificationError> {
    let path = data_dir.join(METADATA_FILE_NAME);
    if !path.is_file() {
        return Ok((None, None));
    }

    // Older installations write this file in the system code page
    let bytes = std::fs::read(&path)?;
    let contents = String::from_utf8_lossy(&bytes);
    let mut lines = contents
        .lines()
        .map(|l| Some(l.trim().to_string()).filter(|l| !l.is_empty()));

    let publisher = lines.next().flatten();
    let display_name = lines.next().flatten();
    Ok((publisher, display_name))
}

/// Regular files directly inside `dir` with the given extension, sorted by name
fn list_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>, ClassificationError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(std::io::Error::from)?;
        let matches_extension = entry
            .path()
            .extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false);

        if entry.file_type().is_file() && matches_extension {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}

fn lower_file_name(path: &Path) -> Option<String> {
    path.file_name()
        .map(|n| n.to_string_lossy().to_ascii_lowercase())
}

fn file_name_eq(path: &Path, name: &str) -> bool {
    path.file_name()
        .map(|n| n.to_string_lossy().eq_ignore_ascii_case(name))
        .unwrap_or(false)
}
