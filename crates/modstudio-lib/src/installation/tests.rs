use super::classify;
use super::error::ClassificationError;
use super::fixtures::{InstallationFixture, PeBuilder};
use super::profile::Architecture;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;

const X64: u16 = 0x8664;
const X86: u16 = 0x014c;

/// A complete "standard" installation with a couple of game assemblies
fn standard_installation() -> InstallationFixture {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "2019.4.31f1");
    fixture.core_assembly("Foo", [4, 0, 0, 0]);
    fixture.assemblies(
        "Foo",
        &[
            "netstandard.dll",
            "System.dll",
            "System.Core.dll",
            "System.Runtime.dll",
            "Assembly-CSharp.dll",
            "UnityEngine.dll",
        ],
    );
    fixture.app_info("Foo", "Foo Studios\nFoo Game\n");
    fixture
}

#[test]
fn classifies_standard_installation() {
    let fixture = standard_installation();
    let profile = classify(fixture.root()).unwrap();

    assert_eq!(profile.target_moniker, "standard-2.0");
    assert!(!profile.is_reduced_profile);
    assert_eq!(profile.profile_label(), "Standard 2.0");
    assert_eq!(profile.architecture, Architecture::X64);
    assert_eq!(profile.runtime_version, "2019.4.31f1");
    assert_eq!(profile.publisher.as_deref(), Some("Foo Studios"));
    assert_eq!(profile.display_name.as_deref(), Some("Foo Game"));
    assert_eq!(profile.runtime_family(), "Foo Game");
    assert_eq!(profile.executable_file_name(), "Foo.exe");
    assert!(profile.data_directory.ends_with("Foo_Data"));

    let game: Vec<String> = profile
        .game_assemblies
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
        .collect();
    assert_eq!(game, vec!["Assembly-CSharp.dll", "UnityEngine.dll"]);
    assert_eq!(profile.framework_assemblies.len(), 5);
}

#[test]
fn classification_is_idempotent() {
    let fixture = standard_installation();
    let first = classify(fixture.root()).unwrap();
    let second = classify(fixture.root()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn assemblies_are_partitioned() {
    let fixture = standard_installation();
    let profile = classify(fixture.root()).unwrap();

    assert!(profile
        .framework_assemblies
        .is_disjoint(&profile.game_assemblies));

    let on_disk: BTreeSet<PathBuf> = fs::read_dir(fixture.managed_dir("Foo"))
        .unwrap()
        .map(|e| dunce::canonicalize(e.unwrap().path()).unwrap())
        .collect();
    let union: BTreeSet<PathBuf> = profile
        .framework_assemblies
        .union(&profile.game_assemblies)
        .cloned()
        .collect();
    assert_eq!(union, on_disk);
}

#[test]
fn facades_are_game_assemblies_without_standard_companion() {
    let fixture = InstallationFixture::new();
    fixture.game("Bar", X86, "5.6.7f1");
    fixture.core_assembly("Bar", [4, 0, 0, 0]);
    fixture.assemblies("Bar", &["System.Runtime.dll", "System.Xml.dll"]);

    let profile = classify(fixture.root()).unwrap();
    assert_eq!(profile.target_moniker, "legacy-4.6");
    assert_eq!(profile.architecture, Architecture::X86);
    assert!(profile
        .game_assemblies
        .iter()
        .any(|p| p.ends_with("System.Runtime.dll")));
    assert!(profile
        .framework_assemblies
        .iter()
        .any(|p| p.ends_with("System.Xml.dll")));
}

#[test]
fn legacy_runtime_rows() {
    let cases: &[(u16, &[&str], &str, bool)] = &[
        (2, &["System.Core.dll", "System.Xml.Linq.dll"], "legacy-3.5", false),
        (2, &["System.Core.dll"], "legacy-3.5", true),
        (2, &[], "legacy-2.0", false),
        (3, &["System.Core.dll"], "legacy-3.5", true),
        (3, &[], "legacy-2.0", true),
    ];

    for (major, companions, moniker, reduced) in cases {
        let fixture = InstallationFixture::new();
        fixture.game("Old", X86, "4.7.2f1");
        fixture.core_assembly("Old", [*major, 0, 0, 0]);
        fixture.assemblies("Old", companions);

        let profile = classify(fixture.root()).unwrap();
        assert_eq!(&profile.target_moniker, moniker, "major {major} {companions:?}");
        assert_eq!(profile.is_reduced_profile, *reduced, "major {major} {companions:?}");
    }
}

#[test]
fn companion_names_match_case_insensitively() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");
    fixture.core_assembly("Foo", [4, 0, 0, 0]);
    fixture.assemblies("Foo", &["NetStandard.dll"]);

    let profile = classify(fixture.root()).unwrap();
    assert_eq!(profile.target_moniker, "standard-2.0");
}

#[test]
fn missing_directory() {
    let fixture = InstallationFixture::new();
    let err = classify(fixture.root().join("nope")).unwrap_err();
    assert!(matches!(err, ClassificationError::DirectoryNotFound { .. }));
    assert_eq!(err.code(), "CLS0001");
}

#[test]
fn missing_data_directory() {
    let fixture = InstallationFixture::new();
    fs::write(
        fixture.root().join("Foo.exe"),
        PeBuilder::new(X64).string("ProductVersion", "1.0").build(),
    )
    .unwrap();
    fs::create_dir(fixture.root().join("Data")).unwrap();

    let err = classify(fixture.root()).unwrap_err();
    assert_eq!(err.code(), "CLS0002");
}

#[test]
fn unrelated_executables_are_ignored() {
    let fixture = standard_installation();
    fs::write(
        fixture.root().join("CrashHandler64.exe"),
        PeBuilder::new(X64).build(),
    )
    .unwrap();

    let profile = classify(fixture.root()).unwrap();
    assert_eq!(profile.executable_file_name(), "Foo.exe");
}

#[test]
fn ambiguous_data_directory() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");
    fixture.game("FooServer", X64, "1.0");

    match classify(fixture.root()).unwrap_err() {
        ClassificationError::AmbiguousDataDirectory { candidates } => {
            assert_eq!(candidates.len(), 2);
            assert!(candidates[0].ends_with("Foo_Data"));
            assert!(candidates[1].ends_with("FooServer_Data"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn missing_managed_directory() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");
    fs::remove_dir(fixture.managed_dir("Foo")).unwrap();
    fs::create_dir(fixture.data_dir("Foo").join("Managed.bak")).unwrap();

    let err = classify(fixture.root()).unwrap_err();
    assert!(matches!(err, ClassificationError::ManagedDirectoryNotFound { .. }));
    assert_eq!(err.code(), "CLS0004");
}

#[test]
fn missing_core_assembly() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");
    fixture.assemblies("Foo", &["System.dll", "Assembly-CSharp.dll"]);

    let err = classify(fixture.root()).unwrap_err();
    assert_eq!(err.code(), "CLS0005");
    assert!(err.to_string().contains("mscorlib.dll"));
}

#[test]
fn unknown_target_framework() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");
    fixture.core_assembly("Foo", [5, 1, 0, 0]);

    let err = classify(fixture.root()).unwrap_err();
    assert_eq!(
        err,
        ClassificationError::UnknownTargetFramework { major: 5, minor: 1 }
    );
    assert_eq!(err.code(), "CLS0006");
}

#[test]
fn corrupt_core_assembly_is_unexpected() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");
    fs::write(fixture.managed_dir("Foo").join("mscorlib.dll"), b"not a binary").unwrap();

    let err = classify(fixture.root()).unwrap_err();
    assert!(matches!(err, ClassificationError::Unexpected { .. }));
    assert_eq!(err.code(), "CLS0000");
}

#[test]
fn metadata_file_is_optional() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");
    fixture.core_assembly("Foo", [4, 0, 0, 0]);

    let profile = classify(fixture.root()).unwrap();
    assert_eq!(profile.publisher, None);
    assert_eq!(profile.display_name, None);
    assert_eq!(profile.runtime_family(), "Foo");
}

#[test]
fn metadata_file_with_publisher_only() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");
    fixture.core_assembly("Foo", [4, 0, 0, 0]);
    fixture.app_info("Foo", "  Foo Studios  ");

    let profile = classify(fixture.root()).unwrap();
    assert_eq!(profile.publisher.as_deref(), Some("Foo Studios"));
    assert_eq!(profile.display_name, None);
}

#[test]
fn metadata_file_in_legacy_code_page() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");
    fixture.core_assembly("Foo", [4, 0, 0, 0]);
    fs::write(
        fixture.data_dir("Foo").join(crate::config::METADATA_FILE_NAME),
        b"Caf\xe9 Studios\nFoo\n",
    )
    .unwrap();

    let profile = classify(fixture.root()).unwrap();
    let publisher = profile.publisher.unwrap();
    assert!(publisher.starts_with("Caf"));
    assert!(publisher.ends_with("Studios"));
    assert_eq!(profile.display_name.as_deref(), Some("Foo"));
}

#[cfg(unix)]
#[test]
fn linked_core_assembly_is_found() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");
    fixture.assemblies("Foo", &["Assembly-CSharp.dll"]);

    // Shared runtime files linked into the install, as package managers lay them out
    let shared = tempfile::tempdir().unwrap();
    let target = shared.path().join(crate::config::CORE_ASSEMBLY_NAME);
    fs::write(
        &target,
        PeBuilder::new(X86).pe32().file_version([4, 0, 0, 0]).build(),
    )
    .unwrap();
    std::os::unix::fs::symlink(
        &target,
        fixture.managed_dir("Foo").join(crate::config::CORE_ASSEMBLY_NAME),
    )
    .unwrap();

    let profile = classify(fixture.root()).unwrap();
    assert_eq!(profile.target_moniker, "legacy-4.6");
    assert!(profile
        .framework_assemblies
        .iter()
        .any(|p| p.ends_with(crate::config::CORE_ASSEMBLY_NAME)));
    assert_eq!(profile.game_assemblies.len(), 1);
}

#[cfg(unix)]
#[test]
fn linked_managed_directory_is_found() {
    let fixture = InstallationFixture::new();
    fixture.game("Foo", X64, "1.0");

    let shared = tempfile::tempdir().unwrap();
    fs::remove_dir(fixture.managed_dir("Foo")).unwrap();
    std::os::unix::fs::symlink(shared.path(), fixture.managed_dir("Foo")).unwrap();
    fixture.core_assembly("Foo", [2, 0, 0, 0]);

    let profile = classify(fixture.root()).unwrap();
    assert_eq!(profile.target_moniker, "legacy-2.0");
    assert_eq!(profile.framework_assemblies.len(), 1);
}
