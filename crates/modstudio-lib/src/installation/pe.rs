//! Portable-executable header and version-resource reading.
//!
//! Only what classification needs is decoded: the COFF machine field and the
//! `RT_VERSION` resource (fixed file info plus the `StringFileInfo` table).
//! Every read is bounds-checked; malformed images produce a [`PeError`].

use super::profile::Architecture;
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

const DOS_MAGIC: &[u8] = b"MZ";
const PE_MAGIC: &[u8] = b"PE\0\0";
const E_LFANEW_OFFSET: usize = 0x3C;

const OPTIONAL_MAGIC_PE32: u16 = 0x10b;
const OPTIONAL_MAGIC_PE32_PLUS: u16 = 0x20b;

const RESOURCE_DIRECTORY_INDEX: usize = 2;
const SECTION_HEADER_SIZE: usize = 40;

const RT_VERSION: u32 = 16;
const RESOURCE_SUBDIRECTORY_FLAG: u32 = 0x8000_0000;
const RESOURCE_NAME_FLAG: u32 = 0x8000_0000;

const VERSION_INFO_KEY: &str = "VS_VERSION_INFO";
const STRING_FILE_INFO_KEY: &str = "StringFileInfo";
const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF_04BD;
const FIXED_FILE_INFO_SIZE: usize = 52;
const MAX_BLOCK_DEPTH: usize = 8;

#[derive(Debug, thiserror::Error)]
pub enum PeError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image truncated at offset {offset:#x}")]
    Truncated { offset: usize },

    #[error("Invalid {0} signature")]
    BadSignature(&'static str),

    #[error("Image has no version resource")]
    NoVersionResource,

    #[error("Malformed resource data: {0}")]
    MalformedResource(String),
}

/// Section header fields needed to map RVAs to file offsets
#[derive(Debug, Clone)]
struct SectionInfo {
    virtual_address: u32,
    virtual_size: u32,
    pointer_to_raw_data: u32,
    size_of_raw_data: u32,
}

/// A parsed PE image held in memory
#[derive(Debug)]
pub struct PeImage {
    data: Vec<u8>,
    machine: u16,
    sections: Vec<SectionInfo>,
    resource_rva: Option<u32>,
}

impl PeImage {
    pub fn open(path: &Path) -> Result<Self, PeError> {
        Self::parse(std::fs::read(path)?)
    }

    pub fn parse(data: Vec<u8>) -> Result<Self, PeError> {
        if data.get(..DOS_MAGIC.len()) != Some(DOS_MAGIC) {
            return Err(PeError::BadSignature("DOS"));
        }

        let e_lfanew = read_u32(&data, E_LFANEW_OFFSET)? as usize;
        if data.get(e_lfanew..e_lfanew + PE_MAGIC.len()) != Some(PE_MAGIC) {
            return Err(PeError::BadSignature("PE"));
        }

        let coff = e_lfanew + PE_MAGIC.len();
        let machine = read_u16(&data, coff)?;
        let number_of_sections = read_u16(&data, coff + 2)? as usize;
        let size_of_optional_header = read_u16(&data, coff + 16)? as usize;

        let optional = coff + 20;
        let resource_rva = if size_of_optional_header == 0 {
            None
        } else {
            let (count_offset, directories_offset) = match read_u16(&data, optional)? {
                OPTIONAL_MAGIC_PE32 => (92, 96),
                OPTIONAL_MAGIC_PE32_PLUS => (108, 112),
                _ => return Err(PeError::BadSignature("optional header")),
            };

            let directory_count = read_u32(&data, optional + count_offset)? as usize;
            if directory_count > RESOURCE_DIRECTORY_INDEX {
                let entry = optional + directories_offset + RESOURCE_DIRECTORY_INDEX * 8;
                Some(read_u32(&data, entry)?).filter(|rva| *rva != 0)
            } else {
                None
            }
        };

        let section_table = optional + size_of_optional_header;
        let mut sections = Vec::with_capacity(number_of_sections);
        for i in 0..number_of_sections {
            let base = section_table + i * SECTION_HEADER_SIZE;
            sections.push(SectionInfo {
                virtual_size: read_u32(&data, base + 8)?,
                virtual_address: read_u32(&data, base + 12)?,
                size_of_raw_data: read_u32(&data, base + 16)?,
                pointer_to_raw_data: read_u32(&data, base + 20)?,
            });
        }

        Ok(Self {
            data,
            machine,
            sections,
            resource_rva,
        })
    }

    pub fn machine(&self) -> u16 {
        self.machine
    }

    pub fn architecture(&self) -> Architecture {
        Architecture::from_machine(self.machine)
    }

    /// Decode the `RT_VERSION` resource
    pub fn version_info(&self) -> Result<VersionInfo, PeError> {
        let resource_rva = self.resource_rva.ok_or(PeError::NoVersionResource)?;
        let root = self
            .rva_to_offset(resource_rva)
            .ok_or_else(|| PeError::MalformedResource("resource directory is not mapped".into()))?;

        // type -> name -> language -> data entry
        let mut directory = root;
        let mut wanted = Some(RT_VERSION);
        for _ in 0..2 {
            let offset = self
                .find_resource_entry(directory, wanted)?
                .ok_or(PeError::NoVersionResource)?;
            if offset & RESOURCE_SUBDIRECTORY_FLAG == 0 {
                return Err(PeError::MalformedResource(
                    "expected resource subdirectory".into(),
                ));
            }
            directory = root + (offset & !RESOURCE_SUBDIRECTORY_FLAG) as usize;
            wanted = None;
        }

        // `directory` is now the language level; its first entry points at the data
        let data_entry = self
            .find_resource_entry(directory, None)?
            .ok_or(PeError::NoVersionResource)?;
        if data_entry & RESOURCE_SUBDIRECTORY_FLAG != 0 {
            return Err(PeError::MalformedResource(
                "expected resource data entry".into(),
            ));
        }

        let data_entry = root + data_entry as usize;
        let data_rva = read_u32(&self.data, data_entry)?;
        let size = read_u32(&self.data, data_entry + 4)? as usize;
        let start = self
            .rva_to_offset(data_rva)
            .ok_or_else(|| PeError::MalformedResource("version data is not mapped".into()))?;
        let block = self
            .data
            .get(start..start + size)
            .ok_or(PeError::Truncated { offset: start })?;

        VersionInfo::parse(block)
    }

    fn rva_to_offset(&self, rva: u32) -> Option<usize> {
        self.sections.iter().find_map(|section| {
            let span = section.virtual_size.max(section.size_of_raw_data);
            let relative = rva.checked_sub(section.virtual_address)?;
            (relative < span && relative < section.size_of_raw_data)
                .then(|| section.pointer_to_raw_data as usize + relative as usize)
        })
    }

    /// Returns the `OffsetToData` of the first entry matching `id` (or simply the first entry)
    fn find_resource_entry(&self, directory: usize, id: Option<u32>) -> Result<Option<u32>, PeError> {
        let named = read_u16(&self.data, directory + 12)? as usize;
        let ids = read_u16(&self.data, directory + 14)? as usize;

        for i in 0..named + ids {
            let entry = directory + 16 + i * 8;
            let name = read_u32(&self.data, entry)?;
            let offset = read_u32(&self.data, entry + 4)?;

            match id {
                Some(id) if name & RESOURCE_NAME_FLAG == 0 && name == id => return Ok(Some(offset)),
                Some(_) => continue,
                None => return Ok(Some(offset)),
            }
        }

        Ok(None)
    }
}

/// Four-part numeric version from `VS_FIXEDFILEINFO`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FixedVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}

impl FixedVersion {
    fn from_parts(ms: u32, ls: u32) -> Self {
        Self {
            major: (ms >> 16) as u16,
            minor: (ms & 0xFFFF) as u16,
            build: (ls >> 16) as u16,
            revision: (ls & 0xFFFF) as u16,
        }
    }
}

impl fmt::Display for FixedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// Decoded version resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionInfo {
    pub file_version: Option<FixedVersion>,
    pub product_version_fixed: Option<FixedVersion>,
    pub strings: HashMap<String, String>,
}

impl VersionInfo {
    /// `ProductVersion` string if present, otherwise the fixed product version
    pub fn product_version(&self) -> Option<String> {
        self.strings
            .get("ProductVersion")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .or_else(|| self.product_version_fixed.map(|v| v.to_string()))
    }

    fn parse(block: &[u8]) -> Result<Self, PeError> {
        let (root, _) = VersionBlock::parse(block, 0, 0)?;
        if root.key != VERSION_INFO_KEY {
            return Err(PeError::MalformedResource(format!(
                "unexpected root key {:?}",
                root.key
            )));
        }

        let mut info = VersionInfo::default();

        if root.value.len() >= FIXED_FILE_INFO_SIZE
            && read_u32(root.value, 0)? == FIXED_FILE_INFO_SIGNATURE
        {
            info.file_version = Some(FixedVersion::from_parts(
                read_u32(root.value, 8)?,
                read_u32(root.value, 12)?,
            ));
            info.product_version_fixed = Some(FixedVersion::from_parts(
                read_u32(root.value, 16)?,
                read_u32(root.value, 20)?,
            ));
        }

        for table in root
            .children
            .iter()
            .filter(|c| c.key == STRING_FILE_INFO_KEY)
            .flat_map(|c| c.children.iter())
        {
            for string in &table.children {
                info.strings
                    .entry(string.key.clone())
                    .or_insert_with(|| decode_utf16z(string.value));
            }
        }

        Ok(info)
    }
}

/// Generic `{ wLength, wValueLength, wType, szKey, Value, Children }` block
#[derive(Debug)]
struct VersionBlock<'a> {
    key: String,
    value: &'a [u8],
    children: Vec<VersionBlock<'a>>,
}

impl<'a> VersionBlock<'a> {
    fn parse(buf: &'a [u8], start: usize, depth: usize) -> Result<(Self, usize), PeError> {
        if depth > MAX_BLOCK_DEPTH {
            return Err(PeError::MalformedResource("version blocks nested too deeply".into()));
        }

        let length = read_u16(buf, start)? as usize;
        let value_length = read_u16(buf, start + 2)? as usize;
        let is_text = read_u16(buf, start + 4)? == 1;
        if length < 6 {
            return Err(PeError::MalformedResource(format!(
                "block at {start:#x} has length {length}"
            )));
        }
        let end = (start + length).min(buf.len());

        let (key, after_key) = read_utf16z(buf, start + 6, end);
        let mut pos = align4(after_key);

        let value_bytes = if is_text { value_length * 2 } else { value_length };
        let value_end = (pos + value_bytes).min(end);
        let value = buf.get(pos..value_end).unwrap_or(&[]);
        pos = align4(value_end);

        let mut children = Vec::new();
        while pos + 6 <= end {
            let (child, child_length) = Self::parse(buf, pos, depth + 1)?;
            children.push(child);
            pos = align4(pos + child_length);
        }

        Ok((
            Self {
                key,
                value,
                children,
            },
            length,
        ))
    }
}

fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Reads a NUL-terminated UTF-16LE string, returning it and the offset after the terminator
fn read_utf16z(buf: &[u8], start: usize, end: usize) -> (String, usize) {
    let mut units = Vec::new();
    let mut pos = start;
    while pos + 2 <= end {
        let unit = u16::from_le_bytes([buf[pos], buf[pos + 1]]);
        pos += 2;
        if unit == 0 {
            break;
        }
        units.push(unit);
    }
    (String::from_utf16_lossy(&units), pos)
}

fn decode_utf16z(bytes: &[u8]) -> String {
    read_utf16z(bytes, 0, bytes.len()).0
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, PeError> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .ok_or(PeError::Truncated { offset })
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, PeError> {
    data.get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or(PeError::Truncated { offset })
}
