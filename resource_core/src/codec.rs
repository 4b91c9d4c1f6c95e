//! Binary form of the remote and local manifests.
//!
//! Little-endian throughout. Strings are a `u16` byte length followed by UTF-8,
//! nullable strings carry a leading `u8` presence flag, lists a `u32` count.

use crate::manifest::{
    LoadType, LocalManifest, LocalResource, ManifestError, RawAsset, RawIndexList,
    RawLocalManifest, RawRemoteManifest, RawRemoteResource, RemoteManifest,
};
use crate::resource_name::ResourceName;

pub const REMOTE_MAGIC: [u8; 4] = *b"RVL\x01";
pub const LOCAL_MAGIC: [u8; 4] = *b"LVL\x01";

// Smallest encodings, used to reject absurd counts before allocating.
const MIN_ASSET_LEN: usize = 2 + 4;
const MIN_REMOTE_RESOURCE_LEN: usize = 2 + 1 + 2 + 1 + 4 * 4 + 4;
const MIN_LOCAL_RESOURCE_LEN: usize = 2 + 1 + 2 + 1 + 4 * 2;
const MIN_INDEX_LIST_LEN: usize = 2 + 4;

pub fn decode_remote(bytes: &[u8]) -> Result<RemoteManifest, ManifestError> {
    let mut reader = Reader::new(bytes);
    reader.expect_magic(REMOTE_MAGIC)?;
    let applicable_game_version = reader.string()?;
    let internal_resource_version = reader.u32()?;

    let asset_count = reader.count(MIN_ASSET_LEN)?;
    let mut assets = Vec::with_capacity(asset_count);
    for _ in 0..asset_count {
        let name = reader.string()?;
        let dependency_indexes = reader.index_list()?;
        assets.push(RawAsset {
            name,
            dependency_indexes,
        });
    }

    let resource_count = reader.count(MIN_REMOTE_RESOURCE_LEN)?;
    let mut resources = Vec::with_capacity(resource_count);
    for _ in 0..resource_count {
        let name = reader.resource_name()?;
        let load_type = LoadType::from_u8(reader.u8()?)?;
        let length = reader.u32()?;
        let hash = reader.u32()?;
        let compressed_length = reader.u32()?;
        let compressed_hash = reader.u32()?;
        let asset_indexes = reader.index_list()?;
        resources.push(RawRemoteResource {
            name,
            load_type,
            length,
            hash,
            compressed_length,
            compressed_hash,
            asset_indexes,
        });
    }

    let containers = reader.named_index_lists()?;
    let resource_groups = reader.named_index_lists()?;
    reader.finish()?;

    RemoteManifest::from_raw(RawRemoteManifest {
        applicable_game_version,
        internal_resource_version,
        assets,
        resources,
        containers,
        resource_groups,
    })
}

pub fn decode_local(bytes: &[u8]) -> Result<LocalManifest, ManifestError> {
    let mut reader = Reader::new(bytes);
    reader.expect_magic(LOCAL_MAGIC)?;

    let resource_count = reader.count(MIN_LOCAL_RESOURCE_LEN)?;
    let mut resources = Vec::with_capacity(resource_count);
    for _ in 0..resource_count {
        let name = reader.resource_name()?;
        let load_type = LoadType::from_u8(reader.u8()?)?;
        let length = reader.u32()?;
        let hash = reader.u32()?;
        resources.push(LocalResource {
            name,
            load_type,
            length,
            hash,
        });
    }
    let containers = reader.named_index_lists()?;
    reader.finish()?;

    LocalManifest::from_raw(RawLocalManifest {
        resources,
        containers,
    })
}

pub fn encode_remote(manifest: &RemoteManifest) -> Result<Vec<u8>, ManifestError> {
    let raw = manifest.to_raw();
    let mut writer = Writer::default();
    writer.bytes(&REMOTE_MAGIC);
    writer.string(&raw.applicable_game_version)?;
    writer.u32(raw.internal_resource_version);

    writer.count(raw.assets.len())?;
    for asset in &raw.assets {
        writer.string(&asset.name)?;
        writer.index_list(&asset.dependency_indexes)?;
    }

    writer.count(raw.resources.len())?;
    for resource in &raw.resources {
        writer.resource_name(&resource.name)?;
        writer.u8(resource.load_type.as_u8());
        writer.u32(resource.length);
        writer.u32(resource.hash);
        writer.u32(resource.compressed_length);
        writer.u32(resource.compressed_hash);
        writer.index_list(&resource.asset_indexes)?;
    }

    writer.named_index_lists(&raw.containers)?;
    writer.named_index_lists(&raw.resource_groups)?;
    Ok(writer.into_bytes())
}

pub fn encode_local(manifest: &LocalManifest) -> Result<Vec<u8>, ManifestError> {
    let raw = manifest.to_raw();
    let mut writer = Writer::default();
    writer.bytes(&LOCAL_MAGIC);
    writer.count(raw.resources.len())?;
    for resource in &raw.resources {
        writer.resource_name(&resource.name)?;
        writer.u8(resource.load_type.as_u8());
        writer.u32(resource.length);
        writer.u32(resource.hash);
    }
    writer.named_index_lists(&raw.containers)?;
    Ok(writer.into_bytes())
}

struct Reader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], ManifestError> {
        let remaining = self.data.len() - self.offset;
        if len > remaining {
            return Err(ManifestError::Truncated {
                offset: self.offset,
                needed: len - remaining,
            });
        }
        let slice = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn expect_magic(&mut self, expected: [u8; 4]) -> Result<(), ManifestError> {
        let found = self.take(4).map_err(|_| ManifestError::BadMagic {
            expected,
            found: self.data.to_vec(),
        })?;
        if found != expected {
            return Err(ManifestError::BadMagic {
                expected,
                found: found.to_vec(),
            });
        }
        Ok(())
    }

    fn u8(&mut self) -> Result<u8, ManifestError> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16, ManifestError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn u32(&mut self) -> Result<u32, ManifestError> {
        let bytes = self.take(4)?;
        Ok(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a list length and checks the remaining input could hold that many
    /// entries of at least `min_entry_len` bytes.
    fn count(&mut self, min_entry_len: usize) -> Result<usize, ManifestError> {
        let offset = self.offset;
        let count = self.u32()? as usize;
        let remaining = self.data.len() - self.offset;
        let needed = count.saturating_mul(min_entry_len);
        if needed > remaining {
            return Err(ManifestError::Truncated {
                offset,
                needed: needed - remaining,
            });
        }
        Ok(count)
    }

    fn string(&mut self) -> Result<String, ManifestError> {
        let len = self.u16()? as usize;
        let offset = self.offset;
        let bytes = self.take(len)?;
        std::str::from_utf8(bytes)
            .map(str::to_string)
            .map_err(|_| ManifestError::InvalidUtf8 { offset })
    }

    fn optional_string(&mut self) -> Result<Option<String>, ManifestError> {
        match self.u8()? {
            0 => Ok(None),
            1 => self.string().map(Some),
            other => Err(ManifestError::InvalidFlag(other)),
        }
    }

    fn resource_name(&mut self) -> Result<ResourceName, ManifestError> {
        let name = self.string()?;
        let variant = self.optional_string()?;
        let extension = self.string()?;
        Ok(ResourceName::new(name, variant, extension)?)
    }

    fn index_list(&mut self) -> Result<Vec<u32>, ManifestError> {
        let count = self.count(4)?;
        let mut indexes = Vec::with_capacity(count);
        for _ in 0..count {
            indexes.push(self.u32()?);
        }
        Ok(indexes)
    }

    fn named_index_lists(&mut self) -> Result<Vec<RawIndexList>, ManifestError> {
        let count = self.count(MIN_INDEX_LIST_LEN)?;
        let mut lists = Vec::with_capacity(count);
        for _ in 0..count {
            let name = self.string()?;
            let indexes = self.index_list()?;
            lists.push(RawIndexList { name, indexes });
        }
        Ok(lists)
    }

    fn finish(self) -> Result<(), ManifestError> {
        let remaining = self.data.len() - self.offset;
        if remaining != 0 {
            return Err(ManifestError::TrailingBytes { remaining });
        }
        Ok(())
    }
}

#[derive(Default)]
struct Writer {
    out: Vec<u8>,
}

impl Writer {
    fn into_bytes(self) -> Vec<u8> {
        self.out
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.out.extend_from_slice(bytes);
    }

    fn u8(&mut self, value: u8) {
        self.out.push(value);
    }

    fn u32(&mut self, value: u32) {
        self.out.extend_from_slice(&value.to_le_bytes());
    }

    fn count(&mut self, len: usize) -> Result<(), ManifestError> {
        let len = u32::try_from(len).map_err(|_| ManifestError::ListTooLong { len })?;
        self.u32(len);
        Ok(())
    }

    fn string(&mut self, value: &str) -> Result<(), ManifestError> {
        let len = u16::try_from(value.len())
            .map_err(|_| ManifestError::StringTooLong { len: value.len() })?;
        self.out.extend_from_slice(&len.to_le_bytes());
        self.out.extend_from_slice(value.as_bytes());
        Ok(())
    }

    fn resource_name(&mut self, name: &ResourceName) -> Result<(), ManifestError> {
        self.string(name.name())?;
        match name.variant() {
            Some(variant) => {
                self.u8(1);
                self.string(variant)?;
            }
            None => self.u8(0),
        }
        self.string(name.extension())
    }

    fn index_list(&mut self, indexes: &[u32]) -> Result<(), ManifestError> {
        self.count(indexes.len())?;
        for index in indexes {
            self.u32(*index);
        }
        Ok(())
    }

    fn named_index_lists(&mut self, lists: &[RawIndexList]) -> Result<(), ManifestError> {
        self.count(lists.len())?;
        for list in lists {
            self.string(&list.name)?;
            self.index_list(&list.indexes)?;
        }
        Ok(())
    }
}
