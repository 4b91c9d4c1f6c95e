#![allow(dead_code)]

use std::fs;
use std::path::PathBuf;

use pack_container::PackArchive;
use resource_core::codec::{encode_local, encode_remote};
use resource_core::file_system::PackFileSystemManager;
use resource_core::loader::FileByteLoader;
use resource_core::manifest::{LocalManifestBuilder, RemoteManifestBuilder};
use resource_core::{
    CheckContext, CheckError, CheckEvents, CheckSummary, CheckerOptions, LoadType, ResourceChecker,
    ResourceName, ResourceTables,
};
use tempfile::TempDir;

pub fn rn(name: &str) -> ResourceName {
    ResourceName::new(name, None::<&str>, "dat").unwrap()
}

pub fn rn_variant(name: &str, variant: &str) -> ResourceName {
    ResourceName::new(name, Some(variant), "dat").unwrap()
}

/// `(name, container, length, hash)`; compressed fields derive from these.
pub type RemoteEntry<'a> = (ResourceName, Option<&'a str>, u32, u32);

/// `(name, container, length, hash)`.
pub type LocalEntry<'a> = (ResourceName, Option<&'a str>, u32, u32);

pub fn remote_manifest_bytes(entries: &[RemoteEntry<'_>]) -> Vec<u8> {
    let mut builder = RemoteManifestBuilder::new("1.4.0", 7);
    let mut containers: Vec<(&str, Vec<_>)> = Vec::new();
    for (name, container, length, hash) in entries {
        let id = builder.add_resource(
            name.clone(),
            LoadType::LoadFromFile,
            *length,
            *hash,
            length / 2,
            hash ^ 0xFFFF,
        );
        if let Some(container) = container {
            match containers.iter_mut().find(|(existing, _)| existing == container) {
                Some((_, ids)) => ids.push(id),
                None => containers.push((*container, vec![id])),
            }
        }
    }
    for (container, ids) in &containers {
        builder.add_container(*container, ids);
    }
    encode_remote(&builder.build().unwrap()).unwrap()
}

pub fn local_manifest_bytes(entries: &[LocalEntry<'_>]) -> Vec<u8> {
    let mut builder = LocalManifestBuilder::new();
    let mut containers: Vec<(&str, Vec<_>)> = Vec::new();
    for (name, container, length, hash) in entries {
        let id = builder.add_resource(name.clone(), LoadType::LoadFromFile, *length, *hash);
        if let Some(container) = container {
            match containers.iter_mut().find(|(existing, _)| existing == container) {
                Some((_, ids)) => ids.push(id),
                None => containers.push((*container, vec![id])),
            }
        }
    }
    for (container, ids) in &containers {
        builder.add_container(*container, ids);
    }
    encode_local(&builder.build().unwrap()).unwrap()
}

/// Remote, read-only and read-write locations laid out in one temp dir.
pub struct Layout {
    pub dir: TempDir,
}

impl Layout {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("remote")).unwrap();
        fs::create_dir_all(dir.path().join("package")).unwrap();
        fs::create_dir_all(dir.path().join("cache")).unwrap();
        Self { dir }
    }

    pub fn remote_manifest(&self) -> PathBuf {
        self.dir.path().join("remote/ResourceVersion.dat")
    }

    pub fn read_only_manifest(&self) -> PathBuf {
        self.dir.path().join("package/ResourceList.dat")
    }

    pub fn read_write_root(&self) -> PathBuf {
        self.dir.path().join("cache")
    }

    pub fn read_write_manifest(&self) -> PathBuf {
        self.read_write_root().join("ResourceList.dat")
    }

    pub fn options(&self) -> CheckerOptions {
        CheckerOptions {
            remote_manifest_uri: format!("file://{}", self.remote_manifest().display()),
            read_only_manifest_uri: self.read_only_manifest().to_string_lossy().into_owned(),
            read_write_manifest_uri: self.read_write_manifest().to_string_lossy().into_owned(),
            read_write_root: self.read_write_root(),
            read_write_manifest_path: Some(self.read_write_manifest()),
        }
    }

    pub fn write_remote(&self, entries: &[RemoteEntry<'_>]) {
        fs::write(self.remote_manifest(), remote_manifest_bytes(entries)).unwrap();
    }

    pub fn write_read_only(&self, entries: &[LocalEntry<'_>]) {
        fs::write(self.read_only_manifest(), local_manifest_bytes(entries)).unwrap();
    }

    pub fn write_read_write(&self, entries: &[LocalEntry<'_>]) {
        fs::write(self.read_write_manifest(), local_manifest_bytes(entries)).unwrap();
    }

    pub fn loose_file(&self, name: &ResourceName) -> PathBuf {
        resource_core::paths::loose_path(&self.read_write_root(), name)
    }

    pub fn put_loose(&self, name: &ResourceName, data: &[u8]) {
        let path = self.loose_file(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    pub fn container_file(&self, container: &str) -> PathBuf {
        self.read_write_root().join(format!("{}.pak", container))
    }

    pub fn put_in_container(&self, container: &str, name: &ResourceName, data: &[u8]) {
        let path = self.container_file(container);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut archive = PackArchive::open_or_create(path).unwrap();
        archive.write_entry(&name.full_name(), data.to_vec()).unwrap();
    }

    pub fn container_entries(&self, container: &str) -> Vec<String> {
        let archive = PackArchive::open(self.container_file(container)).unwrap();
        archive.names().map(str::to_string).collect()
    }
}

pub struct CycleOutcome {
    pub checker: ResourceChecker,
    pub tables: ResourceTables,
    pub events: CheckEvents,
    pub result: Result<CheckSummary, CheckError>,
}

/// Runs one full cycle with an inline file loader.
pub fn run_cycle(layout: &Layout, variant: Option<&str>, ignore_other_variant: bool) -> CycleOutcome {
    run_cycle_into(layout, variant, ignore_other_variant, ResourceTables::new())
}

pub fn run_cycle_into(
    layout: &Layout,
    variant: Option<&str>,
    ignore_other_variant: bool,
    mut tables: ResourceTables,
) -> CycleOutcome {
    let mut checker = ResourceChecker::new(layout.options());
    let loader = FileByteLoader::inline();
    let mut file_systems = PackFileSystemManager::new(layout.read_write_root(), "pak").unwrap();
    let mut events = CheckEvents::default();

    let result = checker
        .check_resources(&loader, variant, ignore_other_variant)
        .and_then(|()| {
            let mut ctx = CheckContext {
                file_systems: &mut file_systems,
                tables: &mut tables,
                listener: &mut events,
            };
            checker.pump(&mut ctx)
        })
        .and_then(|summary| summary.ok_or(CheckError::CycleInactive));
    CycleOutcome {
        checker,
        tables,
        events,
        result,
    }
}
