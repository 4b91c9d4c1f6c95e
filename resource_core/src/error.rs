use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::ManifestError;
use crate::resource_name::ResourceName;

/// Which of the three manifests a completion belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ManifestSource {
    Remote,
    ReadOnly,
    ReadWrite,
}

impl ManifestSource {
    pub const ALL: [ManifestSource; 3] = [
        ManifestSource::Remote,
        ManifestSource::ReadOnly,
        ManifestSource::ReadWrite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ManifestSource::Remote => "remote",
            ManifestSource::ReadOnly => "read-only",
            ManifestSource::ReadWrite => "read-write",
        }
    }
}

impl fmt::Display for ManifestSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{manifest} manifest is corrupt: {error}")]
    ManifestCorrupt {
        manifest: ManifestSource,
        #[source]
        error: ManifestError,
    },
    #[error("{0} manifest was delivered twice in one cycle")]
    DuplicateManifest(ManifestSource),
    #[error("remote manifest {uri} could not be loaded: {message}")]
    MissingRemoteManifest { uri: String, message: String },
    #[error("migration of {resource} failed: {message}")]
    MigrationFailure { resource: String, message: String },
    #[error("failed to persist read-write manifest {path}: {message}")]
    PersistFailure { path: PathBuf, message: String },
    #[error("resource {0} has no status after reconciliation")]
    UnknownStatus(ResourceName),
    #[error("a check cycle is already loading")]
    CycleInProgress,
    #[error("no check cycle is accepting manifests")]
    CycleInactive,
}
