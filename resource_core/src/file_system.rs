//! Named containers that pack many resources into one file.
//!
//! The checker only sees the [`FileSystem`] and [`FileSystemManager`] traits;
//! [`PackFileSystemManager`] backs them with PACK archives below the
//! read-write root.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use pack_container::{PackArchive, PackError};
use thiserror::Error;

use crate::paths;

#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("container {container}: {source}")]
    Pack {
        container: String,
        #[source]
        source: PackError,
    },
    #[error("invalid container name: {0}")]
    InvalidName(String),
}

pub trait FileSystem {
    fn name(&self) -> &str;

    fn file_count(&self) -> usize;

    fn has_file(&self, entry: &str) -> bool;

    /// Copies the file at `source` into the container as `entry`.
    fn write_file(&mut self, entry: &str, source: &Path) -> Result<bool, FileSystemError>;

    /// Copies `entry` out of the container to `dest`.
    fn save_as_file(&mut self, entry: &str, dest: &Path) -> Result<bool, FileSystemError>;

    fn delete_file(&mut self, entry: &str) -> Result<bool, FileSystemError>;
}

pub trait FileSystemManager {
    /// Names of every container currently present.
    fn container_names(&self) -> Vec<String>;

    /// Opens a container, creating it first when `create` is set. Returns
    /// `None` for a missing container when not creating.
    fn open(
        &mut self,
        name: &str,
        create: bool,
    ) -> Result<Option<&mut dyn FileSystem>, FileSystemError>;

    /// Deletes a container and its backing storage.
    fn destroy(&mut self, name: &str) -> Result<(), FileSystemError>;
}

#[derive(Debug)]
pub struct PackFileSystem {
    name: String,
    archive: PackArchive,
}

impl PackFileSystem {
    pub fn open_or_create(name: impl Into<String>, path: &Path) -> Result<Self, FileSystemError> {
        let name = name.into();
        let archive = PackArchive::open_or_create(path).map_err(|source| FileSystemError::Pack {
            container: name.clone(),
            source,
        })?;
        Ok(Self { name, archive })
    }

    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    fn pack_error(&self, source: PackError) -> FileSystemError {
        FileSystemError::Pack {
            container: self.name.clone(),
            source,
        }
    }
}

impl FileSystem for PackFileSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn file_count(&self) -> usize {
        self.archive.entry_count()
    }

    fn has_file(&self, entry: &str) -> bool {
        self.archive.contains(entry)
    }

    fn write_file(&mut self, entry: &str, source: &Path) -> Result<bool, FileSystemError> {
        if !source.is_file() {
            return Ok(false);
        }
        let data = fs::read(source)?;
        self.archive
            .write_entry(entry, data)
            .map_err(|err| self.pack_error(err))?;
        Ok(true)
    }

    fn save_as_file(&mut self, entry: &str, dest: &Path) -> Result<bool, FileSystemError> {
        self.archive
            .save_entry_as(entry, dest)
            .map_err(|err| self.pack_error(err))
    }

    fn delete_file(&mut self, entry: &str) -> Result<bool, FileSystemError> {
        self.archive
            .delete_entry(entry)
            .map_err(|err| self.pack_error(err))
    }
}

/// Containers stored as `{root}/{name}.{extension}`.
#[derive(Debug)]
pub struct PackFileSystemManager {
    root: PathBuf,
    extension: String,
    known: BTreeMap<String, Option<PackFileSystem>>,
}

impl PackFileSystemManager {
    /// Scans `root` recursively for existing containers; archives are only
    /// parsed when first opened.
    pub fn new(root: impl Into<PathBuf>, extension: impl Into<String>) -> Result<Self, FileSystemError> {
        let root = root.into();
        let extension = extension.into();
        let mut known = BTreeMap::new();
        if root.is_dir() {
            let mut found = Vec::new();
            scan_containers(&root, &root, &extension, &mut found)?;
            for name in found {
                known.insert(name, None);
            }
        }
        Ok(Self {
            root,
            extension,
            known,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn container_path(&self, name: &str) -> Result<PathBuf, FileSystemError> {
        paths::container_path(&self.root, name, &self.extension)
            .ok_or_else(|| FileSystemError::InvalidName(name.to_string()))
    }
}

impl FileSystemManager for PackFileSystemManager {
    fn container_names(&self) -> Vec<String> {
        self.known.keys().cloned().collect()
    }

    fn open(
        &mut self,
        name: &str,
        create: bool,
    ) -> Result<Option<&mut dyn FileSystem>, FileSystemError> {
        let path = self.container_path(name)?;
        if !self.known.contains_key(name) {
            if !create && !path.is_file() {
                return Ok(None);
            }
            self.known.insert(name.to_string(), None);
        }
        let Some(slot) = self.known.get_mut(name) else {
            return Ok(None);
        };
        if slot.is_none() {
            *slot = Some(PackFileSystem::open_or_create(name, &path)?);
        }
        Ok(slot.as_mut().map(|fs| fs as &mut dyn FileSystem))
    }

    fn destroy(&mut self, name: &str) -> Result<(), FileSystemError> {
        let path = self.container_path(name)?;
        self.known.remove(name);
        paths::remove_file_if_exists(&path)?;
        Ok(())
    }
}

fn scan_containers(
    root: &Path,
    dir: &Path,
    extension: &str,
    found: &mut Vec<String>,
) -> Result<(), FileSystemError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            scan_containers(root, &path, extension, found)?;
            continue;
        }
        if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
            continue;
        }
        let Ok(rel) = path.with_extension("").strip_prefix(root).map(Path::to_path_buf) else {
            continue;
        };
        let name = rel
            .components()
            .map(|part| part.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        if !name.is_empty() {
            found.push(name);
        }
    }
    Ok(())
}
