//! Per-resource check records.
//!
//! A [`CheckInfo`] collects what the remote, read-only and read-write
//! manifests say about one resource and derives its [`CheckStatus`] and the
//! storage moves that status needs.

use std::fmt;

use crate::manifest::LoadType;
use crate::resource_name::ResourceName;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CheckStatus {
    Unknown,
    StorageInReadOnly,
    StorageInReadWrite,
    Update,
    Unavailable,
    Disuse,
}

impl CheckStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckStatus::Unknown => "unknown",
            CheckStatus::StorageInReadOnly => "read-only",
            CheckStatus::StorageInReadWrite => "read-write",
            CheckStatus::Update => "update",
            CheckStatus::Unavailable => "unavailable",
            CheckStatus::Disuse => "disuse",
        }
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the remote manifest wants for one resource.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RemoteInfo {
    pub container: Option<String>,
    pub load_type: LoadType,
    pub length: u32,
    pub hash: u32,
    pub compressed_length: u32,
    pub compressed_hash: u32,
}

/// What a local store (read-only or read-write) claims to hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalInfo {
    pub container: Option<String>,
    pub load_type: LoadType,
    pub length: u32,
    pub hash: u32,
}

impl LocalInfo {
    fn matches(&self, remote: &RemoteInfo) -> bool {
        self.load_type == remote.load_type
            && self.length == remote.length
            && self.hash == remote.hash
    }
}

/// Per-resource reconciliation record for one check cycle.
#[derive(Clone, Debug)]
pub struct CheckInfo {
    name: ResourceName,
    cached_container_name: Option<String>,
    remote: Option<RemoteInfo>,
    read_only: Option<LocalInfo>,
    read_write: Option<LocalInfo>,
    status: CheckStatus,
    preserved: bool,
    needs_move_to_disk: bool,
    needs_move_to_container: bool,
    needs_remove: bool,
}

impl CheckInfo {
    pub fn new(name: ResourceName) -> Self {
        Self {
            name,
            cached_container_name: None,
            remote: None,
            read_only: None,
            read_write: None,
            status: CheckStatus::Unknown,
            preserved: false,
            needs_move_to_disk: false,
            needs_move_to_container: false,
            needs_remove: false,
        }
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    /// Last container any source reported for this resource. Sources report in
    /// load-completion order, so this is order dependent; status decisions use
    /// the per-source placements instead.
    pub fn cached_container_name(&self) -> Option<&str> {
        self.cached_container_name.as_deref()
    }

    pub fn set_cached_container_name(&mut self, container: impl Into<String>) {
        self.cached_container_name = Some(container.into());
    }

    pub fn remote(&self) -> Option<&RemoteInfo> {
        self.remote.as_ref()
    }

    pub fn read_only(&self) -> Option<&LocalInfo> {
        self.read_only.as_ref()
    }

    pub fn read_write(&self) -> Option<&LocalInfo> {
        self.read_write.as_ref()
    }

    pub fn set_remote(&mut self, info: RemoteInfo) {
        self.remote = Some(info);
    }

    pub fn set_read_only(&mut self, info: LocalInfo) {
        self.read_only = Some(info);
    }

    pub fn set_read_write(&mut self, info: LocalInfo) {
        self.read_write = Some(info);
    }

    pub fn status(&self) -> CheckStatus {
        self.status
    }

    /// Set for other-variant resources while other variants are being kept;
    /// such records get no status and are never migrated or removed.
    pub fn is_preserved(&self) -> bool {
        self.preserved
    }

    pub fn needs_move_to_disk(&self) -> bool {
        self.needs_move_to_disk
    }

    pub fn needs_move_to_container(&self) -> bool {
        self.needs_move_to_container
    }

    pub fn needs_remove(&self) -> bool {
        self.needs_remove
    }

    pub fn uses_container_in_read_write(&self) -> bool {
        self.read_write
            .as_ref()
            .is_some_and(|info| info.container.is_some())
    }

    /// Container the resource currently occupies in the read-write store.
    pub fn read_write_container(&self) -> Option<&str> {
        self.read_write.as_ref()?.container.as_deref()
    }

    /// Container the remote manifest wants the resource in.
    pub fn target_container(&self) -> Option<&str> {
        self.remote.as_ref()?.container.as_deref()
    }

    pub fn refresh_status(&mut self, current_variant: Option<&str>, ignore_other_variant: bool) {
        self.status = CheckStatus::Unknown;
        self.preserved = false;
        self.needs_move_to_disk = false;
        self.needs_move_to_container = false;
        self.needs_remove = false;

        let variant_matches = self.name.matches_variant(current_variant);
        if !variant_matches && ignore_other_variant {
            self.preserved = true;
            return;
        }

        let has_read_write = self.read_write.is_some();
        let Some(remote) = &self.remote else {
            self.status = CheckStatus::Unavailable;
            self.needs_remove = has_read_write;
            return;
        };

        if !variant_matches {
            self.status = CheckStatus::Disuse;
            self.needs_remove = has_read_write;
            return;
        }

        if let Some(read_write) = self.read_write.as_ref().filter(|rw| rw.matches(remote)) {
            self.status = CheckStatus::StorageInReadWrite;
            if read_write.container != remote.container {
                if remote.container.is_some() {
                    self.needs_move_to_container = true;
                } else {
                    self.needs_move_to_disk = true;
                }
            }
            return;
        }

        if self
            .read_only
            .as_ref()
            .is_some_and(|read_only| read_only.matches(remote))
        {
            self.status = CheckStatus::StorageInReadOnly;
            // a mismatched writable copy would otherwise linger unreferenced
            self.needs_remove = has_read_write;
            return;
        }

        self.status = CheckStatus::Update;
    }
}
