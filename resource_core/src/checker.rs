//! Check cycle driver.
//!
//! A cycle issues three manifest loads, folds each completion into per-resource
//! [`CheckInfo`] records and, once all three sources have reported, runs the
//! reconciliation pass exactly once. Loader callbacks only post into a channel;
//! all state changes happen on the thread that calls [`ResourceChecker::pump`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::mem;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};

use tracing::{debug, info, warn};

use crate::check_info::{CheckInfo, CheckStatus, LocalInfo, RemoteInfo};
use crate::codec;
use crate::error::{CheckError, ManifestSource};
use crate::file_system::FileSystemManager;
use crate::loader::{ByteLoader, LoadResult};
use crate::manifest::{LoadType, LocalManifest, RemoteManifest};
use crate::migration::{MigrationStats, Migrator};
use crate::resource_name::ResourceName;
use crate::tables::{self, AssetInfo, ReadWriteResourceInfo, ResourceInfo, ResourceTables};

#[derive(Clone, Debug)]
pub struct CheckerOptions {
    pub remote_manifest_uri: String,
    pub read_only_manifest_uri: String,
    pub read_write_manifest_uri: String,
    pub read_write_root: PathBuf,
    /// Where the read-write manifest is rewritten after a migration; `None`
    /// leaves it untouched.
    pub read_write_manifest_path: Option<PathBuf>,
}

impl CheckerOptions {
    fn uri(&self, source: ManifestSource) -> &str {
        match source {
            ManifestSource::Remote => &self.remote_manifest_uri,
            ManifestSource::ReadOnly => &self.read_only_manifest_uri,
            ManifestSource::ReadWrite => &self.read_write_manifest_uri,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Pending,
    PartiallyReady,
    Ready,
}

/// Tracks which manifests have been delivered in the current cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadinessGate {
    remote: bool,
    read_only: bool,
    read_write: bool,
}

impl ReadinessGate {
    pub fn is_ready(&self, source: ManifestSource) -> bool {
        match source {
            ManifestSource::Remote => self.remote,
            ManifestSource::ReadOnly => self.read_only,
            ManifestSource::ReadWrite => self.read_write,
        }
    }

    /// Flags `source` as delivered; each source may be flagged once per cycle.
    pub fn mark_ready(&mut self, source: ManifestSource) -> Result<GateState, CheckError> {
        let flag = match source {
            ManifestSource::Remote => &mut self.remote,
            ManifestSource::ReadOnly => &mut self.read_only,
            ManifestSource::ReadWrite => &mut self.read_write,
        };
        if *flag {
            return Err(CheckError::DuplicateManifest(source));
        }
        *flag = true;
        Ok(self.state())
    }

    pub fn state(&self) -> GateState {
        match (self.remote, self.read_only, self.read_write) {
            (true, true, true) => GateState::Ready,
            (false, false, false) => GateState::Pending,
            _ => GateState::PartiallyReady,
        }
    }
}

/// A resource that has no matching local copy and must be downloaded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceUpdate {
    pub name: ResourceName,
    pub container_name: Option<String>,
    pub load_type: LoadType,
    pub length: u32,
    pub hash: u32,
    pub compressed_length: u32,
    pub compressed_hash: u32,
}

/// The single completion signal of a check cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CheckSummary {
    pub moved: usize,
    pub removed: usize,
    pub update_count: usize,
    pub update_total_length: u64,
    pub update_total_compressed_length: u64,
}

pub trait CheckListener {
    fn on_resource_needs_update(&mut self, _update: &ResourceUpdate) {}

    fn on_check_complete(&mut self, _summary: &CheckSummary) {}
}

impl CheckListener for () {}

/// Listener that records everything it is told.
#[derive(Clone, Debug, Default)]
pub struct CheckEvents {
    pub updates: Vec<ResourceUpdate>,
    pub completed: Vec<CheckSummary>,
}

impl CheckListener for CheckEvents {
    fn on_resource_needs_update(&mut self, update: &ResourceUpdate) {
        self.updates.push(update.clone());
    }

    fn on_check_complete(&mut self, summary: &CheckSummary) {
        self.completed.push(*summary);
    }
}

/// Collaborators a reconciliation pass works against.
pub struct CheckContext<'a> {
    pub file_systems: &'a mut dyn FileSystemManager,
    pub tables: &'a mut ResourceTables,
    pub listener: &'a mut dyn CheckListener,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Loading,
    Reconciled,
    Failed,
}

struct Completion {
    serial: u64,
    source: ManifestSource,
    result: LoadResult,
}

pub struct ResourceChecker {
    options: CheckerOptions,
    phase: Phase,
    serial: u64,
    gate: ReadinessGate,
    current_variant: Option<String>,
    ignore_other_variant: bool,
    records: BTreeMap<ResourceName, CheckInfo>,
    applicable_game_version: String,
    internal_resource_version: u32,
    asset_infos: HashMap<String, AssetInfo>,
    resource_groups: BTreeMap<String, Vec<ResourceName>>,
    missing_local_manifests: Vec<ManifestSource>,
    last_migration: MigrationStats,
    sender: Sender<Completion>,
    receiver: Receiver<Completion>,
}

impl ResourceChecker {
    pub fn new(options: CheckerOptions) -> Self {
        let (sender, receiver) = mpsc::channel();
        Self {
            options,
            phase: Phase::Idle,
            serial: 0,
            gate: ReadinessGate::default(),
            current_variant: None,
            ignore_other_variant: false,
            records: BTreeMap::new(),
            applicable_game_version: String::new(),
            internal_resource_version: 0,
            asset_infos: HashMap::new(),
            resource_groups: BTreeMap::new(),
            missing_local_manifests: Vec::new(),
            last_migration: MigrationStats::default(),
            sender,
            receiver,
        }
    }

    pub fn options(&self) -> &CheckerOptions {
        &self.options
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn gate(&self) -> ReadinessGate {
        self.gate
    }

    /// Records of the latest cycle, kept for inspection until the next one.
    pub fn check_info(&self, name: &ResourceName) -> Option<&CheckInfo> {
        self.records.get(name)
    }

    pub fn check_infos(&self) -> impl Iterator<Item = &CheckInfo> {
        self.records.values()
    }

    /// Local manifests that failed to load in the latest cycle and were
    /// treated as empty.
    pub fn missing_local_manifests(&self) -> &[ManifestSource] {
        &self.missing_local_manifests
    }

    pub fn last_migration(&self) -> MigrationStats {
        self.last_migration
    }

    /// Starts a cycle by issuing the three manifest loads.
    pub fn check_resources(
        &mut self,
        loader: &dyn ByteLoader,
        current_variant: Option<&str>,
        ignore_other_variant: bool,
    ) -> Result<(), CheckError> {
        if self.phase == Phase::Loading {
            return Err(CheckError::CycleInProgress);
        }
        self.reset();
        self.serial += 1;
        self.phase = Phase::Loading;
        self.current_variant = current_variant.map(str::to_string);
        self.ignore_other_variant = ignore_other_variant;
        info!(
            cycle = self.serial,
            variant = ?self.current_variant,
            ignore_other_variant,
            "check cycle started"
        );

        for source in ManifestSource::ALL {
            let sender = self.sender.clone();
            let serial = self.serial;
            let uri = self.options.uri(source).to_string();
            debug!(%source, %uri, "requesting manifest");
            loader.load(
                &uri,
                Box::new(move |result| {
                    // a dropped receiver means the checker itself is gone
                    let _ = sender.send(Completion {
                        serial,
                        source,
                        result,
                    });
                }),
            );
        }
        Ok(())
    }

    /// Success callback for one source: decodes the manifest into the check
    /// records and flags the source ready.
    ///
    /// This only updates the gate. When it returns [`GateState::Ready`] the
    /// reconciliation pass runs on the next [`ResourceChecker::pump`], which
    /// needs the storage and listener a callback does not have.
    pub fn on_manifest_loaded(
        &mut self,
        source: ManifestSource,
        bytes: &[u8],
    ) -> Result<GateState, CheckError> {
        self.ensure_accepting(source)?;
        let decoded = match source {
            ManifestSource::Remote => codec::decode_remote(bytes).map(|manifest| {
                self.apply_remote(&manifest);
                manifest.resources().len()
            }),
            ManifestSource::ReadOnly | ManifestSource::ReadWrite => {
                codec::decode_local(bytes).map(|manifest| {
                    self.apply_local(source, &manifest);
                    manifest.resources().len()
                })
            }
        };
        let count = match decoded {
            Ok(count) => count,
            Err(error) => {
                return self.fail(CheckError::ManifestCorrupt {
                    manifest: source,
                    error,
                })
            }
        };
        debug!(%source, resources = count, "manifest decoded");
        self.mark_ready(source)
    }

    /// Failure callback for one source. A missing remote manifest ends the
    /// cycle; a missing local manifest is treated as empty. As with
    /// [`ResourceChecker::on_manifest_loaded`], a `Ready` gate is reconciled by
    /// the next `pump`.
    pub fn on_manifest_failed(
        &mut self,
        source: ManifestSource,
        uri: &str,
        message: &str,
    ) -> Result<GateState, CheckError> {
        self.ensure_accepting(source)?;
        if source == ManifestSource::Remote {
            return self.fail(CheckError::MissingRemoteManifest {
                uri: uri.to_string(),
                message: message.to_string(),
            });
        }
        warn!(%source, %uri, %message, "local manifest unavailable, treating as empty");
        self.missing_local_manifests.push(source);
        self.mark_ready(source)
    }

    /// Drains loader completions and runs the reconciliation pass once every
    /// source has reported. Returns the summary on the call that completes
    /// the cycle.
    pub fn pump(&mut self, ctx: &mut CheckContext<'_>) -> Result<Option<CheckSummary>, CheckError> {
        while let Ok(completion) = self.receiver.try_recv() {
            if completion.serial != self.serial || self.phase != Phase::Loading {
                debug!(
                    source = %completion.source,
                    cycle = completion.serial,
                    "ignoring stale manifest completion"
                );
                continue;
            }
            match completion.result {
                Ok(loaded) => {
                    debug!(
                        source = %completion.source,
                        bytes = loaded.bytes.len(),
                        elapsed_ms = loaded.duration.as_millis() as u64,
                        "manifest loaded"
                    );
                    self.on_manifest_loaded(completion.source, &loaded.bytes)?;
                }
                Err(failure) => {
                    self.on_manifest_failed(completion.source, &failure.uri, &failure.message)?;
                }
            }
        }

        if self.phase != Phase::Loading || self.gate.state() != GateState::Ready {
            return Ok(None);
        }
        match self.reconcile(ctx) {
            Ok(summary) => {
                self.phase = Phase::Reconciled;
                Ok(Some(summary))
            }
            Err(err) => self.fail(err),
        }
    }

    fn reset(&mut self) {
        self.gate = ReadinessGate::default();
        self.records.clear();
        self.applicable_game_version.clear();
        self.internal_resource_version = 0;
        self.asset_infos.clear();
        self.resource_groups.clear();
        self.missing_local_manifests.clear();
        self.last_migration = MigrationStats::default();
    }

    fn ensure_accepting(&mut self, source: ManifestSource) -> Result<(), CheckError> {
        if self.phase != Phase::Loading {
            return Err(CheckError::CycleInactive);
        }
        if self.gate.is_ready(source) {
            return self.fail(CheckError::DuplicateManifest(source));
        }
        Ok(())
    }

    fn mark_ready(&mut self, source: ManifestSource) -> Result<GateState, CheckError> {
        match self.gate.mark_ready(source) {
            Ok(state) => Ok(state),
            Err(err) => self.fail(err),
        }
    }

    fn fail<T>(&mut self, err: CheckError) -> Result<T, CheckError> {
        warn!(cycle = self.serial, error = %err, "check cycle aborted");
        self.phase = Phase::Failed;
        Err(err)
    }

    fn record(&mut self, name: &ResourceName) -> &mut CheckInfo {
        self.records
            .entry(name.clone())
            .or_insert_with(|| CheckInfo::new(name.clone()))
    }

    fn apply_remote(&mut self, manifest: &RemoteManifest) {
        self.applicable_game_version = manifest.applicable_game_version().to_string();
        self.internal_resource_version = manifest.internal_resource_version();

        for (id, resource) in manifest.resource_entries() {
            let container = manifest.container_of(id).map(str::to_string);
            let record = self.record(&resource.name);
            if let Some(container) = &container {
                record.set_cached_container_name(container.clone());
            }
            record.set_remote(RemoteInfo {
                container,
                load_type: resource.load_type,
                length: resource.length,
                hash: resource.hash,
                compressed_length: resource.compressed_length,
                compressed_hash: resource.compressed_hash,
            });
        }

        for asset in manifest.assets() {
            let info = AssetInfo {
                name: asset.name.clone(),
                resource: manifest.resource(asset.resource).name.clone(),
                dependencies: asset
                    .dependencies
                    .iter()
                    .map(|dependency| manifest.asset(*dependency).name.clone())
                    .collect(),
            };
            self.asset_infos.insert(info.name.clone(), info);
        }

        for group in manifest.resource_groups() {
            let members = group
                .resources
                .iter()
                .map(|id| manifest.resource(*id).name.clone())
                .collect();
            self.resource_groups.insert(group.name.clone(), members);
        }
    }

    fn apply_local(&mut self, source: ManifestSource, manifest: &LocalManifest) {
        for (id, resource) in manifest.resource_entries() {
            let container = manifest.container_of(id).map(str::to_string);
            let record = self.record(&resource.name);
            if let Some(container) = &container {
                record.set_cached_container_name(container.clone());
            }
            let info = LocalInfo {
                container,
                load_type: resource.load_type,
                length: resource.length,
                hash: resource.hash,
            };
            if source == ManifestSource::ReadOnly {
                record.set_read_only(info);
            } else {
                record.set_read_write(info);
            }
        }
    }

    /// Decides every status, migrates storage and, only when all of that
    /// succeeded, announces updates and publishes the tables.
    fn reconcile(&mut self, ctx: &mut CheckContext<'_>) -> Result<CheckSummary, CheckError> {
        let mut staged = ResourceTables {
            applicable_game_version: mem::take(&mut self.applicable_game_version),
            internal_resource_version: self.internal_resource_version,
            asset_infos: mem::take(&mut self.asset_infos),
            resource_groups: mem::take(&mut self.resource_groups),
            ..ResourceTables::default()
        };
        let mut summary = CheckSummary::default();
        let mut updates = Vec::new();
        let current_variant = self.current_variant.as_deref();

        for record in self.records.values_mut() {
            record.refresh_status(current_variant, self.ignore_other_variant);
            stage_record(record, &mut staged, &mut updates)?;
        }
        for update in &updates {
            summary.update_count += 1;
            summary.update_total_length += u64::from(update.length);
            summary.update_total_compressed_length += u64::from(update.compressed_length);
        }

        let mut migrator = Migrator::new(&self.options.read_write_root, &mut *ctx.file_systems);
        let migrated = migrator.run(self.records.values());
        let completed = migrator.into_completed();
        let stats = match migrated {
            Ok(stats) => stats,
            Err(err) => {
                self.persist_partial_migration(&staged, &completed);
                return Err(err);
            }
        };
        summary.moved = stats.moved;
        summary.removed = stats.removed;
        self.last_migration = stats;

        if stats.moved + stats.removed > 0 {
            if let Some(path) = &self.options.read_write_manifest_path {
                persist_read_write_manifest(path, &staged.read_write_infos)?;
            }
        }

        for update in &updates {
            debug!(
                resource = %update.name,
                container = ?update.container_name,
                length = update.length,
                "resource needs update"
            );
            ctx.listener.on_resource_needs_update(update);
        }
        *ctx.tables = staged;
        info!(
            cycle = self.serial,
            moved = summary.moved,
            removed = summary.removed,
            update_count = summary.update_count,
            update_total_length = summary.update_total_length,
            update_total_compressed_length = summary.update_total_compressed_length,
            "check cycle complete"
        );
        ctx.listener.on_check_complete(&summary);
        Ok(summary)
    }

    /// Records the steps a failed migration already applied, so the next
    /// cycle starts from the storage as it now is. Everything else keeps its
    /// old read-write placement.
    fn persist_partial_migration(
        &self,
        staged: &ResourceTables,
        completed: &BTreeSet<ResourceName>,
    ) {
        if completed.is_empty() {
            return;
        }
        let Some(path) = &self.options.read_write_manifest_path else {
            return;
        };
        let infos = partial_read_write_infos(self.records.values(), staged, completed);
        match persist_read_write_manifest(path, &infos) {
            Ok(()) => info!(
                cycle = self.serial,
                completed = completed.len(),
                "read-write manifest updated after partial migration"
            ),
            Err(err) => warn!(cycle = self.serial, error = %err, "partial migration not recorded"),
        }
    }
}

/// Read-write table after a failed migration: finished records take their
/// staged placement (or drop out when removed), the rest keep what the
/// read-write manifest said.
fn partial_read_write_infos<'r>(
    records: impl IntoIterator<Item = &'r CheckInfo>,
    staged: &ResourceTables,
    completed: &BTreeSet<ResourceName>,
) -> BTreeMap<ResourceName, ReadWriteResourceInfo> {
    let mut infos = BTreeMap::new();
    for record in records {
        let name = record.name();
        if completed.contains(name) {
            if let Some(info) = staged.read_write_infos.get(name) {
                infos.insert(name.clone(), info.clone());
            }
        } else if let Some(read_write) = record.read_write() {
            infos.insert(name.clone(), read_write_info(read_write, read_write.container.clone()));
        }
    }
    infos
}

fn stage_record(
    record: &CheckInfo,
    staged: &mut ResourceTables,
    updates: &mut Vec<ResourceUpdate>,
) -> Result<(), CheckError> {
    let name = record.name();
    if record.is_preserved() {
        if let Some(read_write) = record.read_write() {
            staged
                .read_write_infos
                .insert(name.clone(), read_write_info(read_write, read_write.container.clone()));
        }
        return Ok(());
    }

    match record.status() {
        CheckStatus::StorageInReadOnly => {
            let (Some(remote), Some(read_only)) = (record.remote(), record.read_only()) else {
                return Err(CheckError::UnknownStatus(name.clone()));
            };
            staged.resource_infos.insert(
                name.clone(),
                ResourceInfo {
                    container_name: read_only.container.clone(),
                    load_type: read_only.load_type,
                    length: read_only.length,
                    hash: read_only.hash,
                    compressed_length: remote.compressed_length,
                    is_read_only: true,
                    is_present_on_disk: true,
                },
            );
        }
        CheckStatus::StorageInReadWrite => {
            let (Some(remote), Some(read_write)) = (record.remote(), record.read_write()) else {
                return Err(CheckError::UnknownStatus(name.clone()));
            };
            staged
                .resource_infos
                .insert(name.clone(), resource_info(remote, true));
            // recorded where it will live once migration has run
            staged
                .read_write_infos
                .insert(name.clone(), read_write_info(read_write, remote.container.clone()));
        }
        CheckStatus::Update => {
            let Some(remote) = record.remote() else {
                return Err(CheckError::UnknownStatus(name.clone()));
            };
            staged
                .resource_infos
                .insert(name.clone(), resource_info(remote, false));
            if let Some(read_write) = record.read_write() {
                staged
                    .read_write_infos
                    .insert(name.clone(), read_write_info(read_write, read_write.container.clone()));
            }
            updates.push(ResourceUpdate {
                name: name.clone(),
                container_name: remote.container.clone(),
                load_type: remote.load_type,
                length: remote.length,
                hash: remote.hash,
                compressed_length: remote.compressed_length,
                compressed_hash: remote.compressed_hash,
            });
        }
        CheckStatus::Unavailable | CheckStatus::Disuse => {}
        CheckStatus::Unknown => return Err(CheckError::UnknownStatus(name.clone())),
    }
    Ok(())
}

fn resource_info(remote: &RemoteInfo, present: bool) -> ResourceInfo {
    ResourceInfo {
        container_name: remote.container.clone(),
        load_type: remote.load_type,
        length: remote.length,
        hash: remote.hash,
        compressed_length: remote.compressed_length,
        is_read_only: false,
        is_present_on_disk: present,
    }
}

fn read_write_info(local: &LocalInfo, container_name: Option<String>) -> ReadWriteResourceInfo {
    ReadWriteResourceInfo {
        container_name,
        load_type: local.load_type,
        length: local.length,
        hash: local.hash,
    }
}

fn persist_read_write_manifest(
    path: &std::path::Path,
    infos: &BTreeMap<ResourceName, ReadWriteResourceInfo>,
) -> Result<(), CheckError> {
    let persist_error = |message: String| CheckError::PersistFailure {
        path: path.to_path_buf(),
        message,
    };
    let manifest = tables::read_write_manifest(infos).map_err(|err| persist_error(err.to_string()))?;
    let bytes = codec::encode_local(&manifest).map_err(|err| persist_error(err.to_string()))?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|err| persist_error(err.to_string()))?;
    }
    pack_container::write_atomically(path, &bytes).map_err(|err| persist_error(err.to_string()))?;
    debug!(path = %path.display(), resources = infos.len(), "read-write manifest persisted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{encode_local, encode_remote};
    use crate::file_system::PackFileSystemManager;
    use crate::loader::MemoryByteLoader;
    use crate::manifest::{LocalManifestBuilder, RemoteManifestBuilder};

    fn rn(name: &str) -> ResourceName {
        ResourceName::new(name, None::<&str>, "dat").unwrap()
    }

    fn options(root: &std::path::Path) -> CheckerOptions {
        CheckerOptions {
            remote_manifest_uri: "remote".to_string(),
            read_only_manifest_uri: "ro".to_string(),
            read_write_manifest_uri: "rw".to_string(),
            read_write_root: root.to_path_buf(),
            read_write_manifest_path: None,
        }
    }

    fn remote_bytes() -> Vec<u8> {
        let mut builder = RemoteManifestBuilder::new("1.0", 3);
        builder.add_resource(rn("a"), LoadType::LoadFromFile, 100, 0xAA, 60, 0xA0);
        builder.add_resource(rn("b"), LoadType::LoadFromFile, 50, 0xBB, 30, 0xB0);
        encode_remote(&builder.build().unwrap()).unwrap()
    }

    fn local_bytes(entries: &[(&str, u32, u32)]) -> Vec<u8> {
        let mut builder = LocalManifestBuilder::new();
        for (name, length, hash) in entries {
            builder.add_resource(rn(name), LoadType::LoadFromFile, *length, *hash);
        }
        encode_local(&builder.build().unwrap()).unwrap()
    }

    #[test]
    fn gate_reports_progress_and_rejects_duplicates() {
        let mut gate = ReadinessGate::default();
        assert_eq!(gate.state(), GateState::Pending);
        assert_eq!(gate.mark_ready(ManifestSource::ReadWrite).unwrap(), GateState::PartiallyReady);
        assert_eq!(gate.mark_ready(ManifestSource::Remote).unwrap(), GateState::PartiallyReady);
        assert!(matches!(
            gate.mark_ready(ManifestSource::Remote),
            Err(CheckError::DuplicateManifest(ManifestSource::Remote))
        ));
        assert_eq!(gate.mark_ready(ManifestSource::ReadOnly).unwrap(), GateState::Ready);
    }

    #[test]
    fn reconciles_once_after_all_sources_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = MemoryByteLoader::new();
        loader.insert("remote", remote_bytes());
        loader.insert("ro", local_bytes(&[("b", 50, 0xBB)]));
        loader.insert("rw", local_bytes(&[]));

        let mut checker = ResourceChecker::new(options(dir.path()));
        let mut file_systems = PackFileSystemManager::new(dir.path(), "pak").unwrap();
        let mut tables = ResourceTables::new();
        let mut events = CheckEvents::default();

        checker.check_resources(&loader, None, false).unwrap();
        let mut ctx = CheckContext {
            file_systems: &mut file_systems,
            tables: &mut tables,
            listener: &mut events,
        };
        let summary = checker.pump(&mut ctx).unwrap().unwrap();
        assert_eq!(checker.pump(&mut ctx).unwrap(), None);

        assert_eq!(summary.update_count, 1);
        assert_eq!(summary.update_total_length, 100);
        assert_eq!(summary.update_total_compressed_length, 60);
        assert_eq!(checker.phase(), Phase::Reconciled);
        assert_eq!(checker.check_info(&rn("a")).unwrap().status(), CheckStatus::Update);
        assert_eq!(
            checker.check_info(&rn("b")).unwrap().status(),
            CheckStatus::StorageInReadOnly
        );
        assert_eq!(events.updates.len(), 1);
        assert_eq!(events.completed, vec![summary]);
        assert_eq!(tables.internal_resource_version, 3);
        assert!(tables.resource_info(&rn("b")).unwrap().is_read_only);
    }

    #[test]
    fn direct_callbacks_drive_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let mut checker = ResourceChecker::new(options(dir.path()));
        assert!(matches!(
            checker.on_manifest_loaded(ManifestSource::Remote, &remote_bytes()),
            Err(CheckError::CycleInactive)
        ));

        // a loader that never answers leaves the cycle to the direct callbacks
        struct Silent;
        impl ByteLoader for Silent {
            fn load(&self, _uri: &str, _on_complete: crate::loader::LoadCallback) {}
        }
        checker.check_resources(&Silent, None, false).unwrap();
        assert!(matches!(
            checker.check_resources(&Silent, None, false),
            Err(CheckError::CycleInProgress)
        ));
        assert_eq!(
            checker
                .on_manifest_failed(ManifestSource::ReadOnly, "ro", "gone")
                .unwrap(),
            GateState::PartiallyReady
        );
        assert_eq!(
            checker
                .on_manifest_loaded(ManifestSource::Remote, &remote_bytes())
                .unwrap(),
            GateState::PartiallyReady
        );
        assert_eq!(
            checker
                .on_manifest_loaded(ManifestSource::ReadWrite, &local_bytes(&[]))
                .unwrap(),
            GateState::Ready
        );
        assert_eq!(checker.missing_local_manifests(), &[ManifestSource::ReadOnly]);

        // a ready gate waits for the pump to reconcile
        assert_eq!(checker.phase(), Phase::Loading);
        let mut file_systems = PackFileSystemManager::new(dir.path(), "pak").unwrap();
        let mut tables = ResourceTables::new();
        let mut events = CheckEvents::default();
        let mut ctx = CheckContext {
            file_systems: &mut file_systems,
            tables: &mut tables,
            listener: &mut events,
        };
        let summary = checker.pump(&mut ctx).unwrap().unwrap();
        assert_eq!(summary.update_count, 2);
        assert_eq!(checker.phase(), Phase::Reconciled);
        assert_eq!(checker.pump(&mut ctx).unwrap(), None);
    }

    #[test]
    fn duplicate_delivery_aborts_the_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut checker = ResourceChecker::new(options(dir.path()));
        struct Silent;
        impl ByteLoader for Silent {
            fn load(&self, _uri: &str, _on_complete: crate::loader::LoadCallback) {}
        }
        checker.check_resources(&Silent, None, false).unwrap();
        checker
            .on_manifest_loaded(ManifestSource::ReadWrite, &local_bytes(&[]))
            .unwrap();
        assert!(matches!(
            checker.on_manifest_loaded(ManifestSource::ReadWrite, &local_bytes(&[])),
            Err(CheckError::DuplicateManifest(ManifestSource::ReadWrite))
        ));
        assert_eq!(checker.phase(), Phase::Failed);
        assert!(matches!(
            checker.on_manifest_loaded(ManifestSource::Remote, &remote_bytes()),
            Err(CheckError::CycleInactive)
        ));
    }

    #[test]
    fn completions_from_an_abandoned_cycle_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut loader = MemoryByteLoader::new();
        loader.insert("remote", vec![0xFF]);
        loader.insert("ro", local_bytes(&[]));
        loader.insert("rw", local_bytes(&[]));

        let mut checker = ResourceChecker::new(options(dir.path()));
        let mut file_systems = PackFileSystemManager::new(dir.path(), "pak").unwrap();
        let mut tables = ResourceTables::new();
        let mut events = CheckEvents::default();
        let mut ctx = CheckContext {
            file_systems: &mut file_systems,
            tables: &mut tables,
            listener: &mut events,
        };

        checker.check_resources(&loader, None, false).unwrap();
        assert!(matches!(
            checker.pump(&mut ctx),
            Err(CheckError::ManifestCorrupt {
                manifest: ManifestSource::Remote,
                ..
            })
        ));

        loader.insert("remote", remote_bytes());
        checker.check_resources(&loader, None, false).unwrap();
        let summary = checker.pump(&mut ctx).unwrap().unwrap();
        assert_eq!(summary.update_count, 2);
    }
}
