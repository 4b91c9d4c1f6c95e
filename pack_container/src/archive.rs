use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::pack::{self, PackError};

/// File-backed PACK container that can be mutated in place.
///
/// Entries are held in memory in directory order. Every mutation rewrites the
/// whole archive through a temporary sibling followed by a rename, so readers
/// only ever observe the previous or the next complete image.
#[derive(Debug)]
pub struct PackArchive {
    path: PathBuf,
    entries: Vec<(String, Vec<u8>)>,
}

impl PackArchive {
    /// Creates an empty archive on disk, replacing anything already at `path`.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, PackError> {
        let archive = Self {
            path: path.into(),
            entries: Vec::new(),
        };
        archive.flush()?;
        Ok(archive)
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, PackError> {
        let path = path.into();
        let entries = pack::read_pack(&path)?.into_owned_entries()?;
        Ok(Self { path, entries })
    }

    pub fn open_or_create(path: impl Into<PathBuf>) -> Result<Self, PackError> {
        let path = path.into();
        if path.is_file() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn read_entry(&self, name: &str) -> Option<&[u8]> {
        self.position(name)
            .map(|index| self.entries[index].1.as_slice())
    }

    /// Inserts or replaces an entry and persists the archive.
    pub fn write_entry(&mut self, name: &str, data: Vec<u8>) -> Result<(), PackError> {
        let name = pack::sanitize_name(name);
        pack::validate_entry_name(&name)?;
        let previous = match self.position(&name) {
            Some(index) => Some(std::mem::replace(&mut self.entries[index].1, data)),
            None => {
                self.entries.push((name.clone(), data));
                None
            }
        };
        if let Err(err) = self.flush() {
            // keep memory in step with what is still on disk
            match previous {
                Some(old) => {
                    if let Some(index) = self.position(&name) {
                        self.entries[index].1 = old;
                    }
                }
                None => {
                    self.entries.pop();
                }
            }
            return Err(err);
        }
        Ok(())
    }

    /// Removes an entry; returns `false` when no such entry exists.
    pub fn delete_entry(&mut self, name: &str) -> Result<bool, PackError> {
        let Some(index) = self.position(name) else {
            return Ok(false);
        };
        let removed = self.entries.remove(index);
        if let Err(err) = self.flush() {
            self.entries.insert(index, removed);
            return Err(err);
        }
        Ok(true)
    }

    /// Copies one entry out to `dest`; returns `false` when no such entry exists.
    pub fn save_entry_as(&self, name: &str, dest: &Path) -> Result<bool, PackError> {
        let Some(data) = self.read_entry(name) else {
            return Ok(false);
        };
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomically(dest, data)?;
        Ok(true)
    }

    fn position(&self, name: &str) -> Option<usize> {
        let needle = pack::sanitize_name(name);
        self.entries.iter().position(|(entry, _)| *entry == needle)
    }

    fn flush(&self) -> Result<(), PackError> {
        let image = pack::build_pack(&self.entries)?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        write_atomically(&self.path, &image)
    }
}

/// Writes `data` to a temporary sibling of `dest`, syncs it and renames it over `dest`.
pub fn write_atomically(dest: &Path, data: &[u8]) -> Result<(), PackError> {
    let mut tmp_name = dest
        .file_name()
        .map(|name| name.to_os_string())
        .ok_or_else(|| PackError::UnsafePath(dest.display().to_string()))?;
    tmp_name.push(".tmp");
    let tmp_path = dest.with_file_name(tmp_name);
    {
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
    }
    if let Err(err) = fs::rename(&tmp_path, dest) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
