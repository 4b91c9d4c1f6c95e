//! Builds a local manifest describing the loose files below a directory.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::warn;

use crate::hash::content_hash;
use crate::manifest::{LoadType, LocalManifest, LocalManifestBuilder, ManifestError};
use crate::resource_name::ResourceName;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("scan of {path} failed: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path} is too large to describe ({len} bytes)")]
    TooLarge { path: PathBuf, len: u64 },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
}

/// Splits a '/'-separated relative file path into a resource name. The last
/// dot separates the extension; a second dot in the file name marks a variant.
pub fn resource_name_from_path(rel: &str) -> Option<ResourceName> {
    let (stem, extension) = rel.rsplit_once('.')?;
    let file_start = stem.rfind('/').map_or(0, |index| index + 1);
    let (name, variant) = match stem[file_start..].rsplit_once('.') {
        Some((_, variant)) => (&stem[..stem.len() - variant.len() - 1], Some(variant)),
        None => (stem, None),
    };
    ResourceName::new(name, variant, extension).ok()
}

/// Describes every loose file under `root` (recursively) except those in
/// `exclude`. Files whose names do not form a valid resource name are skipped.
pub fn scan_loose_files(
    root: &Path,
    load_type: LoadType,
    exclude: &[PathBuf],
) -> Result<LocalManifest, ScanError> {
    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let mut builder = LocalManifestBuilder::new();
    for path in files {
        if exclude.iter().any(|excluded| excluded == &path) {
            continue;
        }
        let Ok(rel) = path.strip_prefix(root) else {
            continue;
        };
        let rel = rel
            .components()
            .map(|part| part.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let Some(name) = resource_name_from_path(&rel) else {
            warn!(path = %path.display(), "skipping file without a valid resource name");
            continue;
        };
        let data = fs::read(&path).map_err(|source| ScanError::Io {
            path: path.clone(),
            source,
        })?;
        let length = u32::try_from(data.len()).map_err(|_| ScanError::TooLarge {
            path: path.clone(),
            len: data.len() as u64,
        })?;
        builder.add_resource(name, load_type, length, content_hash(&data));
    }
    Ok(builder.build()?)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), ScanError> {
    let io_error = |source| ScanError::Io {
        path: dir.to_path_buf(),
        source,
    };
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let entry = entry.map_err(io_error)?;
        let path = entry.path();
        if entry.file_type().map_err(io_error)?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_variant_and_extension() {
        let plain = resource_name_from_path("ui/menu.dat").unwrap();
        assert_eq!(plain.name(), "ui/menu");
        assert_eq!(plain.variant(), None);
        assert_eq!(plain.extension(), "dat");

        let variant = resource_name_from_path("sfx/boom.hd.bank").unwrap();
        assert_eq!(variant.name(), "sfx/boom");
        assert_eq!(variant.variant(), Some("hd"));
        assert_eq!(variant.extension(), "bank");

        let dotted_dir = resource_name_from_path("v1.2/readme.txt").unwrap();
        assert_eq!(dotted_dir.name(), "v1.2/readme");
        assert_eq!(dotted_dir.variant(), None);

        assert!(resource_name_from_path("noext").is_none());
    }

    #[test]
    fn scan_hashes_files_and_honours_exclusions() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("ui")).unwrap();
        fs::write(dir.path().join("ui/menu.dat"), b"a").unwrap();
        fs::write(dir.path().join("ResourceList.dat"), b"skip").unwrap();
        fs::write(dir.path().join("README"), b"no extension").unwrap();

        let manifest = scan_loose_files(
            dir.path(),
            LoadType::LoadFromFile,
            &[dir.path().join("ResourceList.dat")],
        )
        .unwrap();
        assert_eq!(manifest.resources().len(), 1);
        let resource = &manifest.resources()[0];
        assert_eq!(resource.name.full_name(), "ui/menu.dat");
        assert_eq!(resource.length, 1);
        assert_eq!(resource.hash, content_hash(b"a"));
    }
}
