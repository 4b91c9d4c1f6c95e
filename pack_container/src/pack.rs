use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

use thiserror::Error;

pub const PACK_MAGIC: &[u8; 4] = b"PACK";
pub const HEADER_LEN: usize = 12;
pub const DIR_ENTRY_LEN: usize = 64;
pub const NAME_FIELD_LEN: usize = 56;
/// Longest entry name that fits the name field with its trailing NUL.
pub const MAX_ENTRY_NAME_LEN: usize = NAME_FIELD_LEN - 1;
pub const MAX_PACK_ENTRIES: usize = 100_000;

#[derive(Debug, Error)]
pub enum PackError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid pack header")]
    InvalidHeader,
    #[error("pack directory out of bounds")]
    DirectoryOutOfBounds,
    #[error("pack directory size is not a multiple of {DIR_ENTRY_LEN}")]
    DirectorySizeNotMultiple,
    #[error("pack directory has too many entries: {entries}")]
    TooManyEntries { entries: usize },
    #[error("pack entry out of bounds: {name}")]
    EntryOutOfBounds { name: String },
    #[error("pack entry name is not utf-8")]
    NameNotUtf8,
    #[error("pack entry name is too long ({len} bytes): {name}")]
    NameTooLong { name: String, len: usize },
    #[error("pack entry path is unsafe: {0}")]
    UnsafePath(String),
    #[error("pack is too large to address with 32-bit offsets")]
    TooLarge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackEntry {
    pub name: String,
    pub offset: u32,
    pub size: u32,
}

/// Parsed, immutable view over the bytes of one PACK file.
#[derive(Debug)]
pub struct PackFile {
    data: Vec<u8>,
    entries: Vec<PackEntry>,
}

impl PackFile {
    pub fn entries(&self) -> &[PackEntry] {
        &self.entries
    }

    pub fn entry_by_name(&self, name: &str) -> Option<&PackEntry> {
        let needle = sanitize_name(name);
        self.entries.iter().find(|entry| entry.name == needle)
    }

    pub fn entry_data(&self, name: &str) -> Result<Option<&[u8]>, PackError> {
        let entry = match self.entry_by_name(name) {
            Some(entry) => entry,
            None => return Ok(None),
        };
        self.slice(entry).map(Some)
    }

    pub fn extract_all(&self, out_dir: &Path) -> Result<(), PackError> {
        fs::create_dir_all(out_dir)?;
        for entry in &self.entries {
            let out_path = safe_join(out_dir, &entry.name)?;
            if let Some(parent) = out_path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&out_path, self.slice(entry)?)?;
        }
        Ok(())
    }

    /// Consumes the view and returns every entry with its own copy of the payload.
    pub fn into_owned_entries(self) -> Result<Vec<(String, Vec<u8>)>, PackError> {
        let mut owned = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            owned.push((entry.name.clone(), self.slice(entry)?.to_vec()));
        }
        Ok(owned)
    }

    fn slice(&self, entry: &PackEntry) -> Result<&[u8], PackError> {
        let offset = entry.offset as usize;
        let end = offset
            .checked_add(entry.size as usize)
            .ok_or_else(|| PackError::EntryOutOfBounds {
                name: entry.name.clone(),
            })?;
        if end > self.data.len() {
            return Err(PackError::EntryOutOfBounds {
                name: entry.name.clone(),
            });
        }
        Ok(&self.data[offset..end])
    }
}

pub fn read_pack(path: &Path) -> Result<PackFile, PackError> {
    let data = fs::read(path)?;
    parse_pack(data)
}

pub fn parse_pack(data: Vec<u8>) -> Result<PackFile, PackError> {
    if data.len() < HEADER_LEN {
        return Err(PackError::InvalidHeader);
    }
    if &data[0..4] != PACK_MAGIC {
        return Err(PackError::InvalidHeader);
    }

    let dir_offset = read_u32_le(&data[4..8]) as usize;
    let dir_size = read_u32_le(&data[8..12]) as usize;
    if dir_size % DIR_ENTRY_LEN != 0 {
        return Err(PackError::DirectorySizeNotMultiple);
    }
    let dir_end = dir_offset
        .checked_add(dir_size)
        .ok_or(PackError::DirectoryOutOfBounds)?;
    if dir_end > data.len() {
        return Err(PackError::DirectoryOutOfBounds);
    }

    let entry_count = dir_size / DIR_ENTRY_LEN;
    if entry_count > MAX_PACK_ENTRIES {
        return Err(PackError::TooManyEntries {
            entries: entry_count,
        });
    }
    let mut entries = Vec::with_capacity(entry_count);
    for i in 0..entry_count {
        let base = dir_offset + i * DIR_ENTRY_LEN;
        let name_bytes = &data[base..base + NAME_FIELD_LEN];
        let name_len = name_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(name_bytes.len());
        let name = std::str::from_utf8(&name_bytes[..name_len])
            .map_err(|_| PackError::NameNotUtf8)?;
        let name = sanitize_name(name);
        validate_entry_name(&name)?;

        let offset = read_u32_le(&data[base + 56..base + 60]);
        let size = read_u32_le(&data[base + 60..base + 64]);

        let end = (offset as usize)
            .checked_add(size as usize)
            .ok_or_else(|| PackError::EntryOutOfBounds { name: name.clone() })?;
        if end > data.len() {
            return Err(PackError::EntryOutOfBounds { name });
        }

        entries.push(PackEntry { name, offset, size });
    }

    Ok(PackFile { data, entries })
}

/// Serialises entries as a PACK image: header, payloads, then the directory.
pub fn build_pack<N, D>(entries: &[(N, D)]) -> Result<Vec<u8>, PackError>
where
    N: AsRef<str>,
    D: AsRef<[u8]>,
{
    if entries.len() > MAX_PACK_ENTRIES {
        return Err(PackError::TooManyEntries {
            entries: entries.len(),
        });
    }
    let payload_len: usize = entries.iter().map(|(_, data)| data.as_ref().len()).sum();
    let dir_size = entries.len() * DIR_ENTRY_LEN;
    let total = HEADER_LEN + payload_len + dir_size;
    if u32::try_from(total).is_err() {
        return Err(PackError::TooLarge);
    }

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(PACK_MAGIC);
    out.extend_from_slice(&((HEADER_LEN + payload_len) as u32).to_le_bytes());
    out.extend_from_slice(&(dir_size as u32).to_le_bytes());

    let mut directory = Vec::with_capacity(dir_size);
    for (name, data) in entries {
        let name = sanitize_name(name.as_ref());
        validate_entry_name(&name)?;
        let data = data.as_ref();
        let offset = out.len() as u32;
        out.extend_from_slice(data);

        let mut field = [0u8; NAME_FIELD_LEN];
        field[..name.len()].copy_from_slice(name.as_bytes());
        directory.extend_from_slice(&field);
        directory.extend_from_slice(&offset.to_le_bytes());
        directory.extend_from_slice(&(data.len() as u32).to_le_bytes());
    }
    out.extend_from_slice(&directory);
    Ok(out)
}

/// Entry names are relative '/'-separated paths that fit the 56-byte name field
/// with a trailing NUL.
pub fn validate_entry_name(name: &str) -> Result<(), PackError> {
    if name.is_empty() {
        return Err(PackError::UnsafePath(name.to_string()));
    }
    if name.len() > MAX_ENTRY_NAME_LEN {
        return Err(PackError::NameTooLong {
            name: name.to_string(),
            len: name.len(),
        });
    }
    if name.starts_with('/') || name.contains(':') {
        return Err(PackError::UnsafePath(name.to_string()));
    }
    for part in name.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return Err(PackError::UnsafePath(name.to_string()));
        }
    }
    Ok(())
}

pub(crate) fn sanitize_name(name: &str) -> String {
    let trimmed = name.trim_matches(char::from(0));
    trimmed.replace('\\', "/")
}

fn read_u32_le(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

pub(crate) fn safe_join(base: &Path, entry: &str) -> Result<PathBuf, PackError> {
    let rel = Path::new(entry);
    let mut safe = PathBuf::from(base);
    for component in rel.components() {
        match component {
            Component::Normal(part) => safe.push(part),
            Component::CurDir => {}
            _ => return Err(PackError::UnsafePath(entry.to_string())),
        }
    }

    if safe.file_name() == Some(OsStr::new("")) {
        return Err(PackError::UnsafePath(entry.to_string()));
    }

    Ok(safe)
}
