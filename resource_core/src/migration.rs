//! Storage moves and removals decided by a reconciliation pass.

use std::collections::BTreeSet;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::check_info::CheckInfo;
use crate::error::CheckError;
use crate::file_system::{FileSystem, FileSystemManager};
use crate::paths;
use crate::resource_name::ResourceName;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationStats {
    pub moved: usize,
    pub removed: usize,
    pub destroyed_containers: usize,
    pub pruned_dirs: usize,
}

pub struct Migrator<'a> {
    root: &'a Path,
    file_systems: &'a mut dyn FileSystemManager,
    completed: BTreeSet<ResourceName>,
}

impl<'a> Migrator<'a> {
    pub fn new(root: &'a Path, file_systems: &'a mut dyn FileSystemManager) -> Self {
        Self {
            root,
            file_systems,
            completed: BTreeSet::new(),
        }
    }

    /// Applies every pending move and removal. Empty containers and empty
    /// directories are cleaned up only when something changed.
    ///
    /// Stops at the first failing step. Records whose steps all finished are
    /// listed by [`Migrator::into_completed`] either way, and every move accepts a
    /// resource that already sits at its destination, so a failed run can be
    /// retried.
    pub fn run<'r, I>(&mut self, records: I) -> Result<MigrationStats, CheckError>
    where
        I: IntoIterator<Item = &'r CheckInfo>,
    {
        let mut stats = MigrationStats::default();
        for record in records {
            let mut changed = false;
            if record.needs_move_to_disk() {
                self.move_to_disk(record)?;
                stats.moved += 1;
                changed = true;
            } else if record.needs_move_to_container() {
                self.move_to_container(record)?;
                stats.moved += 1;
                changed = true;
            }
            if record.needs_remove() {
                self.remove(record)?;
                stats.removed += 1;
                changed = true;
            }
            if changed {
                self.completed.insert(record.name().clone());
            }
        }

        if stats.moved + stats.removed > 0 {
            stats.destroyed_containers = self.destroy_empty_containers()?;
            stats.pruned_dirs = paths::prune_empty_dirs(self.root)
                .map_err(|err| failure(self.root.display(), err))?;
            info!(
                moved = stats.moved,
                removed = stats.removed,
                destroyed_containers = stats.destroyed_containers,
                pruned_dirs = stats.pruned_dirs,
                "read-write storage migrated"
            );
        }
        Ok(stats)
    }

    /// Resources whose moves and removals have all been applied.
    pub fn into_completed(self) -> BTreeSet<ResourceName> {
        self.completed
    }

    fn move_to_disk(&mut self, record: &CheckInfo) -> Result<(), CheckError> {
        let name = record.name();
        let Some(source) = record.read_write_container() else {
            return Err(failure(name, "no source container"));
        };
        let entry = name.full_name();
        let loose = self.loose_path(record)?;
        if !self.holds(record, source, &entry)? {
            if is_extracted(record, &loose) {
                debug!(resource = %name, container = source, "already moved to loose file");
                return Ok(());
            }
            return Err(failure(name, format!("{} is not in container {}", entry, source)));
        }
        let container = self.open_existing(record, source)?;
        ensure(record, container.save_as_file(&entry, &loose), "extract")?;
        ensure(record, container.delete_file(&entry), "delete from container")?;
        debug!(resource = %name, container = source, "moved to loose file");
        Ok(())
    }

    fn move_to_container(&mut self, record: &CheckInfo) -> Result<(), CheckError> {
        let name = record.name();
        let Some(target) = record.target_container() else {
            return Err(failure(name, "no target container"));
        };
        let entry = name.full_name();
        let loose = self.loose_path(record)?;
        let source = record.read_write_container();

        if let Some(source) = source {
            if !self.holds(record, source, &entry)? {
                if !self.holds(record, target, &entry)? {
                    return Err(failure(name, format!("{} is not in container {}", entry, source)));
                }
                // left over from an interrupted staging copy
                paths::remove_file_if_exists(&loose).map_err(|err| failure(name, err))?;
                debug!(resource = %name, container = target, "already moved into container");
                return Ok(());
            }
        }

        match source {
            Some(source) => {
                // container to container goes through a loose staging copy
                let container = self.open_existing(record, source)?;
                ensure(record, container.save_as_file(&entry, &loose), "extract")?;
            }
            None if !loose.is_file() => {
                if self.holds(record, target, &entry)? {
                    debug!(resource = %name, container = target, "already moved into container");
                    return Ok(());
                }
                return Err(failure(name, format!("{} is missing", loose.display())));
            }
            None => {}
        }

        let destination = match self.file_systems.open(target, true) {
            Ok(Some(container)) => container,
            Ok(None) => return Err(failure(name, format!("cannot create container {}", target))),
            Err(err) => return Err(failure(name, err)),
        };
        ensure(record, destination.write_file(&entry, &loose), "write to container")?;

        if let Some(source) = source {
            let container = self.open_existing(record, source)?;
            ensure(record, container.delete_file(&entry), "delete from container")?;
        }
        paths::remove_file_if_exists(&loose).map_err(|err| failure(name, err))?;
        debug!(resource = %name, from = ?source, to = target, "moved into container");
        Ok(())
    }

    fn remove(&mut self, record: &CheckInfo) -> Result<(), CheckError> {
        let name = record.name();
        match record.read_write_container() {
            Some(source) => {
                // already gone is fine
                if let Some(container) = self
                    .file_systems
                    .open(source, false)
                    .map_err(|err| failure(name, err))?
                {
                    container
                        .delete_file(&name.full_name())
                        .map_err(|err| failure(name, err))?;
                }
            }
            None => {
                let loose = paths::loose_path(self.root, name);
                paths::remove_file_if_exists(&loose).map_err(|err| failure(name, err))?;
            }
        }
        debug!(resource = %name, status = %record.status(), "removed from read-write storage");
        Ok(())
    }

    fn destroy_empty_containers(&mut self) -> Result<usize, CheckError> {
        let mut destroyed = 0;
        for name in self.file_systems.container_names() {
            let empty = match self.file_systems.open(&name, false) {
                Ok(Some(container)) => container.file_count() == 0,
                Ok(None) => false,
                Err(err) => return Err(failure(&name, err)),
            };
            if empty {
                self.file_systems
                    .destroy(&name)
                    .map_err(|err| failure(&name, err))?;
                debug!(container = %name, "destroyed empty container");
                destroyed += 1;
            }
        }
        Ok(destroyed)
    }

    fn holds(
        &mut self,
        record: &CheckInfo,
        container: &str,
        entry: &str,
    ) -> Result<bool, CheckError> {
        match self.file_systems.open(container, false) {
            Ok(opened) => Ok(opened.is_some_and(|opened| opened.has_file(entry))),
            Err(err) => Err(failure(record.name(), err)),
        }
    }

    fn open_existing(
        &mut self,
        record: &CheckInfo,
        container: &str,
    ) -> Result<&mut dyn FileSystem, CheckError> {
        match self.file_systems.open(container, false) {
            Ok(Some(opened)) => Ok(opened),
            Ok(None) => Err(failure(
                record.name(),
                format!("container {} does not exist", container),
            )),
            Err(err) => Err(failure(record.name(), err)),
        }
    }

    fn loose_path(&self, record: &CheckInfo) -> Result<PathBuf, CheckError> {
        let path = paths::loose_path(self.root, record.name());
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| failure(record.name(), err))?;
        }
        Ok(path)
    }
}

/// A loose copy with the recorded length counts as a finished extraction.
fn is_extracted(record: &CheckInfo, loose: &Path) -> bool {
    let Some(read_write) = record.read_write() else {
        return false;
    };
    fs::metadata(loose)
        .map(|meta| meta.is_file() && meta.len() == u64::from(read_write.length))
        .unwrap_or(false)
}

fn ensure<E: Display>(
    record: &CheckInfo,
    outcome: Result<bool, E>,
    step: &str,
) -> Result<(), CheckError> {
    match outcome {
        Ok(true) => Ok(()),
        Ok(false) => Err(failure(record.name(), format!("{} did not happen", step))),
        Err(err) => Err(failure(record.name(), format!("{}: {}", step, err))),
    }
}

fn failure(resource: impl Display, message: impl Display) -> CheckError {
    CheckError::MigrationFailure {
        resource: resource.to_string(),
        message: message.to_string(),
    }
}
