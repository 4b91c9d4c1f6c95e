use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use crate::manifest::{LoadType, LocalManifest, LocalManifestBuilder, ManifestError};
use crate::resource_name::ResourceName;

/// Final decision for one resource after a check cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceInfo {
    /// `None` means a loose file.
    pub container_name: Option<String>,
    pub load_type: LoadType,
    pub length: u32,
    pub hash: u32,
    pub compressed_length: u32,
    pub is_read_only: bool,
    pub is_present_on_disk: bool,
}

/// A resource the writable cache holds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadWriteResourceInfo {
    pub container_name: Option<String>,
    pub load_type: LoadType,
    pub length: u32,
    pub hash: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssetInfo {
    pub name: String,
    pub resource: ResourceName,
    pub dependencies: Vec<String>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GroupProgress {
    pub total_count: usize,
    pub ready_count: usize,
    pub total_length: u64,
    pub ready_length: u64,
}

impl GroupProgress {
    pub fn is_ready(&self) -> bool {
        self.ready_count == self.total_count
    }
}

/// Resource state published by a completed check cycle.
#[derive(Clone, Debug, Default)]
pub struct ResourceTables {
    pub applicable_game_version: String,
    pub internal_resource_version: u32,
    pub resource_infos: HashMap<ResourceName, ResourceInfo>,
    pub read_write_infos: BTreeMap<ResourceName, ReadWriteResourceInfo>,
    pub asset_infos: HashMap<String, AssetInfo>,
    pub resource_groups: BTreeMap<String, Vec<ResourceName>>,
}

impl ResourceTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resource_info(&self, name: &ResourceName) -> Option<&ResourceInfo> {
        self.resource_infos.get(name)
    }

    pub fn asset_info(&self, name: &str) -> Option<&AssetInfo> {
        self.asset_infos.get(name)
    }

    /// Transitive dependencies of an asset, nearest first, each listed once.
    pub fn asset_dependencies(&self, name: &str) -> Vec<String> {
        let mut result = Vec::new();
        let mut seen = HashSet::new();
        seen.insert(name.to_string());
        let mut queue = VecDeque::new();
        queue.push_back(name.to_string());
        while let Some(current) = queue.pop_front() {
            let Some(info) = self.asset_infos.get(&current) else {
                continue;
            };
            for dependency in &info.dependencies {
                if seen.insert(dependency.clone()) {
                    result.push(dependency.clone());
                    queue.push_back(dependency.clone());
                }
            }
        }
        result
    }

    pub fn group_progress(&self, group: &str) -> Option<GroupProgress> {
        let members = self.resource_groups.get(group)?;
        let mut progress = GroupProgress::default();
        for name in members {
            let Some(info) = self.resource_infos.get(name) else {
                continue;
            };
            progress.total_count += 1;
            progress.total_length += u64::from(info.length);
            if info.is_present_on_disk {
                progress.ready_count += 1;
                progress.ready_length += u64::from(info.length);
            }
        }
        Some(progress)
    }

    /// Records that a downloader has placed the target form of `name` in the
    /// writable cache. Returns `false` for unknown or read-only resources.
    pub fn apply_update(&mut self, name: &ResourceName) -> bool {
        let Some(info) = self.resource_infos.get_mut(name) else {
            return false;
        };
        if info.is_read_only {
            return false;
        }
        info.is_present_on_disk = true;
        self.read_write_infos.insert(
            name.clone(),
            ReadWriteResourceInfo {
                container_name: info.container_name.clone(),
                load_type: info.load_type,
                length: info.length,
                hash: info.hash,
            },
        );
        true
    }

    /// Local manifest describing the writable cache as recorded in this table.
    pub fn read_write_manifest(&self) -> Result<LocalManifest, ManifestError> {
        read_write_manifest(&self.read_write_infos)
    }
}

pub(crate) fn read_write_manifest(
    infos: &BTreeMap<ResourceName, ReadWriteResourceInfo>,
) -> Result<LocalManifest, ManifestError> {
    let mut builder = LocalManifestBuilder::new();
    let mut containers: BTreeMap<&str, Vec<_>> = BTreeMap::new();
    for (name, info) in infos {
        let id = builder.add_resource(name.clone(), info.load_type, info.length, info.hash);
        if let Some(container) = &info.container_name {
            containers.entry(container.as_str()).or_default().push(id);
        }
    }
    for (container, ids) in containers {
        builder.add_container(container, &ids);
    }
    builder.build()
}
