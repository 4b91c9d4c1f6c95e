//! Decoded manifest contents.
//!
//! Cross references (asset → dependency assets, resource → assets,
//! container/group → resources) are validated once when a manifest is built and
//! stored as typed handles, so every accessor below can index without checks.

use std::collections::HashSet;
use std::fmt;

use pack_container::MAX_ENTRY_NAME_LEN;
use thiserror::Error;

use crate::resource_name::{ResourceName, ResourceNameError};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("manifest truncated at byte {offset} (needed {needed} more)")]
    Truncated { offset: usize, needed: usize },
    #[error("manifest magic mismatch (expected {expected:?}, found {found:?})")]
    BadMagic { expected: [u8; 4], found: Vec<u8> },
    #[error("manifest has {remaining} trailing bytes")]
    TrailingBytes { remaining: usize },
    #[error("manifest string at byte {offset} is not utf-8")]
    InvalidUtf8 { offset: usize },
    #[error("manifest string of {len} bytes cannot be encoded")]
    StringTooLong { len: usize },
    #[error("manifest list of {len} entries cannot be encoded")]
    ListTooLong { len: usize },
    #[error("invalid load type {0}")]
    InvalidLoadType(u8),
    #[error("invalid presence flag {0}")]
    InvalidFlag(u8),
    #[error(transparent)]
    InvalidResourceName(#[from] ResourceNameError),
    #[error("{what} index {index} out of range (len {len})")]
    IndexOutOfRange {
        what: &'static str,
        index: u32,
        len: usize,
    },
    #[error("duplicate resource {0}")]
    DuplicateResource(String),
    #[error("duplicate asset {0}")]
    DuplicateAsset(String),
    #[error("asset {asset} is owned by {owners} resources (expected exactly one)")]
    AssetOwnership { asset: String, owners: usize },
    #[error("resource {resource} is packed in more than one container")]
    ResourceInMultipleContainers { resource: String },
    #[error("resource {resource} in container {container} has a {len}-byte name (container entries allow {max})")]
    ContainerEntryNameTooLong {
        resource: String,
        container: String,
        len: usize,
        max: usize,
    },
}

/// How the client is expected to load a resource once it is on disk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LoadType {
    LoadFromFile = 0,
    LoadFromMemory = 1,
    LoadFromMemoryAndQuickDecrypt = 2,
    LoadFromMemoryAndDecrypt = 3,
    LoadFromBinary = 4,
    LoadFromBinaryAndQuickDecrypt = 5,
    LoadFromBinaryAndDecrypt = 6,
}

impl LoadType {
    pub fn from_u8(value: u8) -> Result<Self, ManifestError> {
        let load_type = match value {
            0 => LoadType::LoadFromFile,
            1 => LoadType::LoadFromMemory,
            2 => LoadType::LoadFromMemoryAndQuickDecrypt,
            3 => LoadType::LoadFromMemoryAndDecrypt,
            4 => LoadType::LoadFromBinary,
            5 => LoadType::LoadFromBinaryAndQuickDecrypt,
            6 => LoadType::LoadFromBinaryAndDecrypt,
            other => return Err(ManifestError::InvalidLoadType(other)),
        };
        Ok(load_type)
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoadType::LoadFromFile => "file",
            LoadType::LoadFromMemory => "memory",
            LoadType::LoadFromMemoryAndQuickDecrypt => "memory+quick-decrypt",
            LoadType::LoadFromMemoryAndDecrypt => "memory+decrypt",
            LoadType::LoadFromBinary => "binary",
            LoadType::LoadFromBinaryAndQuickDecrypt => "binary+quick-decrypt",
            LoadType::LoadFromBinaryAndDecrypt => "binary+decrypt",
        }
    }
}

impl fmt::Display for LoadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AssetId(u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u32);

impl AssetId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

impl ResourceId {
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn raw(self) -> u32 {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub dependencies: Vec<AssetId>,
    pub resource: ResourceId,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteResource {
    pub name: ResourceName,
    pub load_type: LoadType,
    pub length: u32,
    pub hash: u32,
    pub compressed_length: u32,
    pub compressed_hash: u32,
    pub assets: Vec<AssetId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalResource {
    pub name: ResourceName,
    pub load_type: LoadType,
    pub length: u32,
    pub hash: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ContainerEntry {
    pub name: String,
    pub resources: Vec<ResourceId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceGroup {
    pub name: String,
    pub resources: Vec<ResourceId>,
}

/// Index-based form of the remote manifest, as it sits on the wire.
#[derive(Clone, Debug, Default)]
pub struct RawRemoteManifest {
    pub applicable_game_version: String,
    pub internal_resource_version: u32,
    pub assets: Vec<RawAsset>,
    pub resources: Vec<RawRemoteResource>,
    pub containers: Vec<RawIndexList>,
    pub resource_groups: Vec<RawIndexList>,
}

#[derive(Clone, Debug)]
pub struct RawAsset {
    pub name: String,
    pub dependency_indexes: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct RawRemoteResource {
    pub name: ResourceName,
    pub load_type: LoadType,
    pub length: u32,
    pub hash: u32,
    pub compressed_length: u32,
    pub compressed_hash: u32,
    pub asset_indexes: Vec<u32>,
}

#[derive(Clone, Debug)]
pub struct RawIndexList {
    pub name: String,
    pub indexes: Vec<u32>,
}

/// Index-based form of a read-only or read-write manifest.
#[derive(Clone, Debug, Default)]
pub struct RawLocalManifest {
    pub resources: Vec<LocalResource>,
    pub containers: Vec<RawIndexList>,
}

/// Target state published by the server.
#[derive(Clone, Debug)]
pub struct RemoteManifest {
    applicable_game_version: String,
    internal_resource_version: u32,
    assets: Vec<Asset>,
    resources: Vec<RemoteResource>,
    containers: Vec<ContainerEntry>,
    resource_groups: Vec<ResourceGroup>,
    placement: Vec<Option<usize>>,
}

impl RemoteManifest {
    pub fn from_raw(raw: RawRemoteManifest) -> Result<Self, ManifestError> {
        let asset_count = raw.assets.len();
        let resource_count = raw.resources.len();

        let mut seen_resources = HashSet::new();
        for resource in &raw.resources {
            if !seen_resources.insert(&resource.name) {
                return Err(ManifestError::DuplicateResource(resource.name.to_string()));
            }
        }
        let mut seen_assets = HashSet::new();
        for asset in &raw.assets {
            if !seen_assets.insert(asset.name.as_str()) {
                return Err(ManifestError::DuplicateAsset(asset.name.clone()));
            }
        }

        let mut owners: Vec<Vec<ResourceId>> = vec![Vec::new(); asset_count];
        let mut resources = Vec::with_capacity(resource_count);
        for (index, resource) in raw.resources.into_iter().enumerate() {
            let assets = asset_ids(&resource.asset_indexes, asset_count, "asset")?;
            for asset in &assets {
                owners[asset.index()].push(ResourceId(index as u32));
            }
            resources.push(RemoteResource {
                name: resource.name,
                load_type: resource.load_type,
                length: resource.length,
                hash: resource.hash,
                compressed_length: resource.compressed_length,
                compressed_hash: resource.compressed_hash,
                assets,
            });
        }

        let mut assets = Vec::with_capacity(asset_count);
        for (asset, owned_by) in raw.assets.into_iter().zip(owners) {
            if owned_by.len() != 1 {
                return Err(ManifestError::AssetOwnership {
                    asset: asset.name,
                    owners: owned_by.len(),
                });
            }
            let dependencies =
                asset_ids(&asset.dependency_indexes, asset_count, "dependency asset")?;
            assets.push(Asset {
                name: asset.name,
                dependencies,
                resource: owned_by[0],
            });
        }

        let containers = index_lists(raw.containers, resource_count, "container resource")?
            .into_iter()
            .map(|(name, resources)| ContainerEntry { name, resources })
            .collect::<Vec<_>>();
        let resource_groups = index_lists(raw.resource_groups, resource_count, "group resource")?
            .into_iter()
            .map(|(name, resources)| ResourceGroup { name, resources })
            .collect();
        let placement = placement(&containers, resource_count, |id| {
            resources[id.index()].name.to_string()
        })?;

        Ok(Self {
            applicable_game_version: raw.applicable_game_version,
            internal_resource_version: raw.internal_resource_version,
            assets,
            resources,
            containers,
            resource_groups,
            placement,
        })
    }

    pub fn to_raw(&self) -> RawRemoteManifest {
        RawRemoteManifest {
            applicable_game_version: self.applicable_game_version.clone(),
            internal_resource_version: self.internal_resource_version,
            assets: self
                .assets
                .iter()
                .map(|asset| RawAsset {
                    name: asset.name.clone(),
                    dependency_indexes: asset.dependencies.iter().map(|id| id.raw()).collect(),
                })
                .collect(),
            resources: self
                .resources
                .iter()
                .map(|resource| RawRemoteResource {
                    name: resource.name.clone(),
                    load_type: resource.load_type,
                    length: resource.length,
                    hash: resource.hash,
                    compressed_length: resource.compressed_length,
                    compressed_hash: resource.compressed_hash,
                    asset_indexes: resource.assets.iter().map(|id| id.raw()).collect(),
                })
                .collect(),
            containers: raw_lists(self.containers.iter().map(|c| (&c.name, &c.resources))),
            resource_groups: raw_lists(
                self.resource_groups
                    .iter()
                    .map(|g| (&g.name, &g.resources)),
            ),
        }
    }

    pub fn applicable_game_version(&self) -> &str {
        &self.applicable_game_version
    }

    pub fn internal_resource_version(&self) -> u32 {
        self.internal_resource_version
    }

    pub fn assets(&self) -> &[Asset] {
        &self.assets
    }

    pub fn resources(&self) -> &[RemoteResource] {
        &self.resources
    }

    pub fn containers(&self) -> &[ContainerEntry] {
        &self.containers
    }

    pub fn resource_groups(&self) -> &[ResourceGroup] {
        &self.resource_groups
    }

    pub fn resource_entries(&self) -> impl Iterator<Item = (ResourceId, &RemoteResource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(index, resource)| (ResourceId(index as u32), resource))
    }

    pub fn asset(&self, id: AssetId) -> &Asset {
        &self.assets[id.index()]
    }

    pub fn resource(&self, id: ResourceId) -> &RemoteResource {
        &self.resources[id.index()]
    }

    /// Container holding the resource, `None` for a loose file.
    pub fn container_of(&self, id: ResourceId) -> Option<&str> {
        self.placement[id.index()].map(|container| self.containers[container].name.as_str())
    }
}

/// Resources a local store claims to hold, in exactly the listed form.
#[derive(Clone, Debug, Default)]
pub struct LocalManifest {
    resources: Vec<LocalResource>,
    containers: Vec<ContainerEntry>,
    placement: Vec<Option<usize>>,
}

impl LocalManifest {
    pub fn from_raw(raw: RawLocalManifest) -> Result<Self, ManifestError> {
        let mut seen = HashSet::new();
        for resource in &raw.resources {
            if !seen.insert(&resource.name) {
                return Err(ManifestError::DuplicateResource(resource.name.to_string()));
            }
        }
        let resource_count = raw.resources.len();
        let containers = index_lists(raw.containers, resource_count, "container resource")?
            .into_iter()
            .map(|(name, resources)| ContainerEntry { name, resources })
            .collect::<Vec<_>>();
        let placement = placement(&containers, resource_count, |id| {
            raw.resources[id.index()].name.to_string()
        })?;
        Ok(Self {
            resources: raw.resources,
            containers,
            placement,
        })
    }

    pub fn to_raw(&self) -> RawLocalManifest {
        RawLocalManifest {
            resources: self.resources.clone(),
            containers: raw_lists(self.containers.iter().map(|c| (&c.name, &c.resources))),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    pub fn resources(&self) -> &[LocalResource] {
        &self.resources
    }

    pub fn containers(&self) -> &[ContainerEntry] {
        &self.containers
    }

    pub fn resource_entries(&self) -> impl Iterator<Item = (ResourceId, &LocalResource)> {
        self.resources
            .iter()
            .enumerate()
            .map(|(index, resource)| (ResourceId(index as u32), resource))
    }

    pub fn resource(&self, id: ResourceId) -> &LocalResource {
        &self.resources[id.index()]
    }

    pub fn container_of(&self, id: ResourceId) -> Option<&str> {
        self.placement[id.index()].map(|container| self.containers[container].name.as_str())
    }
}

/// Assembles a remote manifest entity by entity; handles returned by the
/// `add_*` methods are valid for this builder only.
#[derive(Debug, Default)]
pub struct RemoteManifestBuilder {
    raw: RawRemoteManifest,
}

impl RemoteManifestBuilder {
    pub fn new(applicable_game_version: impl Into<String>, internal_resource_version: u32) -> Self {
        Self {
            raw: RawRemoteManifest {
                applicable_game_version: applicable_game_version.into(),
                internal_resource_version,
                ..RawRemoteManifest::default()
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn add_resource(
        &mut self,
        name: ResourceName,
        load_type: LoadType,
        length: u32,
        hash: u32,
        compressed_length: u32,
        compressed_hash: u32,
    ) -> ResourceId {
        let id = ResourceId(self.raw.resources.len() as u32);
        self.raw.resources.push(RawRemoteResource {
            name,
            load_type,
            length,
            hash,
            compressed_length,
            compressed_hash,
            asset_indexes: Vec::new(),
        });
        id
    }

    pub fn add_asset(
        &mut self,
        name: impl Into<String>,
        resource: ResourceId,
        dependencies: &[AssetId],
    ) -> AssetId {
        let id = AssetId(self.raw.assets.len() as u32);
        self.raw.assets.push(RawAsset {
            name: name.into(),
            dependency_indexes: dependencies.iter().map(|dep| dep.raw()).collect(),
        });
        if let Some(resource) = self.raw.resources.get_mut(resource.index()) {
            resource.asset_indexes.push(id.raw());
        }
        id
    }

    pub fn add_container(&mut self, name: impl Into<String>, resources: &[ResourceId]) {
        self.raw.containers.push(RawIndexList {
            name: name.into(),
            indexes: resources.iter().map(|id| id.raw()).collect(),
        });
    }

    pub fn add_resource_group(&mut self, name: impl Into<String>, resources: &[ResourceId]) {
        self.raw.resource_groups.push(RawIndexList {
            name: name.into(),
            indexes: resources.iter().map(|id| id.raw()).collect(),
        });
    }

    pub fn build(self) -> Result<RemoteManifest, ManifestError> {
        RemoteManifest::from_raw(self.raw)
    }
}

#[derive(Debug, Default)]
pub struct LocalManifestBuilder {
    raw: RawLocalManifest,
}

impl LocalManifestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_resource(
        &mut self,
        name: ResourceName,
        load_type: LoadType,
        length: u32,
        hash: u32,
    ) -> ResourceId {
        let id = ResourceId(self.raw.resources.len() as u32);
        self.raw.resources.push(LocalResource {
            name,
            load_type,
            length,
            hash,
        });
        id
    }

    pub fn add_container(&mut self, name: impl Into<String>, resources: &[ResourceId]) {
        self.raw.containers.push(RawIndexList {
            name: name.into(),
            indexes: resources.iter().map(|id| id.raw()).collect(),
        });
    }

    pub fn build(self) -> Result<LocalManifest, ManifestError> {
        LocalManifest::from_raw(self.raw)
    }
}

fn asset_ids(indexes: &[u32], len: usize, what: &'static str) -> Result<Vec<AssetId>, ManifestError> {
    indexes
        .iter()
        .map(|&index| {
            if (index as usize) < len {
                Ok(AssetId(index))
            } else {
                Err(ManifestError::IndexOutOfRange { what, index, len })
            }
        })
        .collect()
}

fn index_lists(
    lists: Vec<RawIndexList>,
    len: usize,
    what: &'static str,
) -> Result<Vec<(String, Vec<ResourceId>)>, ManifestError> {
    lists
        .into_iter()
        .map(|list| {
            let ids = list
                .indexes
                .iter()
                .map(|&index| {
                    if (index as usize) < len {
                        Ok(ResourceId(index))
                    } else {
                        Err(ManifestError::IndexOutOfRange { what, index, len })
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok((list.name, ids))
        })
        .collect()
}

/// Maps each resource to its container. Container members must fit a PACK
/// entry name.
fn placement(
    containers: &[ContainerEntry],
    resource_count: usize,
    full_name: impl Fn(ResourceId) -> String,
) -> Result<Vec<Option<usize>>, ManifestError> {
    let mut placement = vec![None; resource_count];
    for (container_index, container) in containers.iter().enumerate() {
        for id in &container.resources {
            let name = full_name(*id);
            if name.len() > MAX_ENTRY_NAME_LEN {
                return Err(ManifestError::ContainerEntryNameTooLong {
                    len: name.len(),
                    resource: name,
                    container: container.name.clone(),
                    max: MAX_ENTRY_NAME_LEN,
                });
            }
            let slot = &mut placement[id.index()];
            if slot.is_some_and(|existing| existing != container_index) {
                return Err(ManifestError::ResourceInMultipleContainers { resource: name });
            }
            *slot = Some(container_index);
        }
    }
    Ok(placement)
}

fn raw_lists<'a>(
    lists: impl Iterator<Item = (&'a String, &'a Vec<ResourceId>)>,
) -> Vec<RawIndexList> {
    lists
        .map(|(name, ids)| RawIndexList {
            name: name.clone(),
            indexes: ids.iter().map(|id| id.raw()).collect(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rn(name: &str) -> ResourceName {
        ResourceName::new(name, None::<&str>, "dat").unwrap()
    }

    #[test]
    fn builder_resolves_assets_and_placement() {
        let mut builder = RemoteManifestBuilder::new("1.0.0", 7);
        let ui = builder.add_resource(rn("ui"), LoadType::LoadFromFile, 100, 0xAA, 60, 0x1);
        let fonts = builder.add_resource(rn("fonts"), LoadType::LoadFromMemory, 20, 0xBB, 10, 0x2);
        let font = builder.add_asset("fonts/main.ttf", fonts, &[]);
        let menu = builder.add_asset("ui/menu.prefab", ui, &[font]);
        builder.add_container("shared", &[fonts]);
        builder.add_resource_group("boot", &[ui, fonts]);
        let manifest = builder.build().unwrap();

        assert_eq!(manifest.internal_resource_version(), 7);
        assert_eq!(manifest.asset(menu).resource, ui);
        assert_eq!(manifest.asset(menu).dependencies, vec![font]);
        assert_eq!(manifest.resource(ui).assets, vec![menu]);
        assert_eq!(manifest.container_of(fonts), Some("shared"));
        assert_eq!(manifest.container_of(ui), None);
        assert_eq!(manifest.resource_groups()[0].resources.len(), 2);
    }

    #[test]
    fn out_of_range_index_is_rejected() {
        let mut raw = RawLocalManifest::default();
        raw.resources.push(LocalResource {
            name: rn("a"),
            load_type: LoadType::LoadFromFile,
            length: 1,
            hash: 1,
        });
        raw.containers.push(RawIndexList {
            name: "c".to_string(),
            indexes: vec![0, 3],
        });
        let err = LocalManifest::from_raw(raw).unwrap_err();
        assert!(matches!(
            err,
            ManifestError::IndexOutOfRange { index: 3, len: 1, .. }
        ));
    }

    #[test]
    fn duplicate_resource_is_rejected() {
        let mut builder = LocalManifestBuilder::new();
        builder.add_resource(rn("a"), LoadType::LoadFromFile, 1, 1);
        builder.add_resource(rn("a"), LoadType::LoadFromFile, 2, 2);
        assert!(matches!(
            builder.build(),
            Err(ManifestError::DuplicateResource(_))
        ));
    }

    #[test]
    fn resource_in_two_containers_is_rejected() {
        let mut builder = LocalManifestBuilder::new();
        let a = builder.add_resource(rn("a"), LoadType::LoadFromFile, 1, 1);
        builder.add_container("one", &[a]);
        builder.add_container("two", &[a]);
        assert!(matches!(
            builder.build(),
            Err(ManifestError::ResourceInMultipleContainers { .. })
        ));
    }

    #[test]
    fn container_member_name_must_fit_a_pack_entry() {
        // 62 bytes with the extension
        let long = rn("textures/environment/forest_ground_diffuse_high_resolution");
        assert_eq!(long.full_name().len(), 62);

        let mut builder = RemoteManifestBuilder::new("1.0.0", 1);
        let id = builder.add_resource(long.clone(), LoadType::LoadFromFile, 1, 1, 1, 1);
        builder.add_container("cA", &[id]);
        match builder.build() {
            Err(ManifestError::ContainerEntryNameTooLong { container, len, max, .. }) => {
                assert_eq!(container, "cA");
                assert_eq!(len, 62);
                assert_eq!(max, MAX_ENTRY_NAME_LEN);
            }
            other => panic!("expected long name rejection, got {:?}", other.map(|_| ())),
        }

        // the same name is fine as a loose file
        let mut builder = LocalManifestBuilder::new();
        builder.add_resource(long, LoadType::LoadFromFile, 1, 1);
        assert!(builder.build().is_ok());
    }

    #[test]
    fn orphan_asset_is_rejected() {
        let mut raw = RawRemoteManifest::default();
        raw.assets.push(RawAsset {
            name: "lonely".to_string(),
            dependency_indexes: Vec::new(),
        });
        assert!(matches!(
            RemoteManifest::from_raw(raw),
            Err(ManifestError::AssetOwnership { owners: 0, .. })
        ));
    }
}
