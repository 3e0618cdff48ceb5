//! Test fixtures: a minimal PE writer and on-disk installation layouts.

use crate::config::{CORE_ASSEMBLY_NAME, DATA_DIR_SUFFIX, MANAGED_DIR_NAME, METADATA_FILE_NAME};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const HEADERS_SIZE: usize = 0x200;
const RESOURCE_RVA: u32 = 0x1000;
const PE_HEADER_OFFSET: usize = 0x40;

/// Builds just enough of a PE image for [`super::pe::PeImage`] to read
pub(crate) struct PeBuilder {
    machine: u16,
    pe32_plus: bool,
    file_version: Option<[u16; 4]>,
    strings: Vec<(String, String)>,
}

impl PeBuilder {
    pub(crate) fn new(machine: u16) -> Self {
        Self {
            machine,
            pe32_plus: true,
            file_version: None,
            strings: Vec::new(),
        }
    }

    pub(crate) fn pe32(mut self) -> Self {
        self.pe32_plus = false;
        self
    }

    pub(crate) fn file_version(mut self, version: [u16; 4]) -> Self {
        self.file_version = Some(version);
        self
    }

    pub(crate) fn string(mut self, key: &str, value: &str) -> Self {
        self.strings.push((key.to_string(), value.to_string()));
        self
    }

    pub(crate) fn build(&self) -> Vec<u8> {
        let resources = (self.file_version.is_some() || !self.strings.is_empty())
            .then(|| resource_section(&self.version_info()));

        let mut out = vec![0u8; HEADERS_SIZE];
        out[..2].copy_from_slice(b"MZ");
        put_u32(&mut out, 0x3C, PE_HEADER_OFFSET as u32);
        out[PE_HEADER_OFFSET..PE_HEADER_OFFSET + 4].copy_from_slice(b"PE\0\0");

        let coff = PE_HEADER_OFFSET + 4;
        let optional_size: u16 = if self.pe32_plus { 0xF0 } else { 0xE0 };
        put_u16(&mut out, coff, self.machine);
        put_u16(&mut out, coff + 2, u16::from(resources.is_some()));
        put_u16(&mut out, coff + 16, optional_size);
        put_u16(&mut out, coff + 18, 0x0102);

        let optional = coff + 20;
        let (magic, count_offset, directories_offset) = if self.pe32_plus {
            (0x20b, 108, 112)
        } else {
            (0x10b, 92, 96)
        };
        put_u16(&mut out, optional, magic);
        put_u32(&mut out, optional + count_offset, 16);

        if let Some(resources) = resources {
            let directory = optional + directories_offset + 2 * 8;
            put_u32(&mut out, directory, RESOURCE_RVA);
            put_u32(&mut out, directory + 4, resources.len() as u32);

            let section = optional + optional_size as usize;
            out[section..section + 5].copy_from_slice(b".rsrc");
            put_u32(&mut out, section + 8, resources.len() as u32);
            put_u32(&mut out, section + 12, RESOURCE_RVA);
            put_u32(&mut out, section + 16, resources.len() as u32);
            put_u32(&mut out, section + 20, HEADERS_SIZE as u32);

            out.extend_from_slice(&resources);
        }

        out
    }

    fn version_info(&self) -> Vec<u8> {
        let fixed = self.file_version.map(|[major, minor, build, revision]| {
            let ms = (u32::from(major) << 16) | u32::from(minor);
            let ls = (u32::from(build) << 16) | u32::from(revision);
            let mut bytes = Vec::new();
            for value in [
                0xFEEF_04BD,
                0x0001_0000,
                ms,
                ls,
                ms,
                ls,
                0x3F,
                0,
                0x0004_0004,
                1,
                0,
                0,
                0,
            ] {
                bytes.extend_from_slice(&u32::to_le_bytes(value));
            }
            bytes
        });

        let mut children = Vec::new();
        if !self.strings.is_empty() {
            let strings: Vec<Vec<u8>> = self
                .strings
                .iter()
                .map(|(key, value)| {
                    let text = utf16z(value);
                    version_block(key, &text, (text.len() / 2) as u16, true, &[])
                })
                .collect();
            let table = version_block("040904b0", &[], 0, true, &strings);
            children.push(version_block("StringFileInfo", &[], 0, true, &[table]));
        }

        let fixed = fixed.unwrap_or_default();
        version_block("VS_VERSION_INFO", &fixed, fixed.len() as u16, false, &children)
    }
}

/// Resource tree with a single `RT_VERSION` / id 1 / language 0x409 leaf
fn resource_section(version_info: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();

    let directory = |out: &mut Vec<u8>, id: u32, offset: u32| {
        out.extend_from_slice(&[0u8; 12]);
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&1u16.to_le_bytes());
        out.extend_from_slice(&id.to_le_bytes());
        out.extend_from_slice(&offset.to_le_bytes());
    };

    directory(&mut out, 16, 0x8000_0000 | 24);
    directory(&mut out, 1, 0x8000_0000 | 48);
    directory(&mut out, 0x409, 72);

    // data entry at 72, payload at 88
    out.extend_from_slice(&(RESOURCE_RVA + 88).to_le_bytes());
    out.extend_from_slice(&(version_info.len() as u32).to_le_bytes());
    out.extend_from_slice(&[0u8; 8]);
    out.extend_from_slice(version_info);
    out
}

fn version_block(key: &str, value: &[u8], value_length: u16, is_text: bool, children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&value_length.to_le_bytes());
    out.extend_from_slice(&u16::from(is_text).to_le_bytes());
    out.extend_from_slice(&utf16z(key));
    pad4(&mut out);
    out.extend_from_slice(value);
    for child in children {
        pad4(&mut out);
        out.extend_from_slice(child);
    }
    let length = out.len() as u16;
    out[..2].copy_from_slice(&length.to_le_bytes());
    out
}

fn utf16z(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(std::iter::once(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

fn pad4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn put_u16(out: &mut [u8], offset: usize, value: u16) {
    out[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut [u8], offset: usize, value: u32) {
    out[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// A fake game installation in a temporary directory
pub(crate) struct InstallationFixture {
    dir: TempDir,
}

impl InstallationFixture {
    pub(crate) fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub(crate) fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Game executable plus its `<name>_Data/Managed` directory
    pub(crate) fn game(&self, name: &str, machine: u16, product_version: &str) -> PathBuf {
        let exe = self.root().join(format!("{name}.exe"));
        fs::write(
            &exe,
            PeBuilder::new(machine)
                .file_version([2019, 4, 31, 0])
                .string("ProductVersion", product_version)
                .build(),
        )
        .unwrap();

        let managed = self.data_dir(name).join(MANAGED_DIR_NAME);
        fs::create_dir_all(&managed).unwrap();
        exe
    }

    pub(crate) fn data_dir(&self, name: &str) -> PathBuf {
        self.root().join(format!("{name}{DATA_DIR_SUFFIX}"))
    }

    pub(crate) fn managed_dir(&self, name: &str) -> PathBuf {
        self.data_dir(name).join(MANAGED_DIR_NAME)
    }

    pub(crate) fn core_assembly(&self, name: &str, version: [u16; 4]) {
        fs::write(
            self.managed_dir(name).join(CORE_ASSEMBLY_NAME),
            PeBuilder::new(0x14c).pe32().file_version(version).build(),
        )
        .unwrap();
    }

    /// Dummy assemblies; their contents are never read
    pub(crate) fn assemblies(&self, name: &str, files: &[&str]) {
        for file in files {
            fs::write(self.managed_dir(name).join(file), b"MZ").unwrap();
        }
    }

    pub(crate) fn app_info(&self, name: &str, contents: &str) {
        fs::write(self.data_dir(name).join(METADATA_FILE_NAME), contents).unwrap();
    }
}
