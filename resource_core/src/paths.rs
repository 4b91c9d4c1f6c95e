use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::resource_name::ResourceName;

/// Joins a '/'-separated relative path onto `base`, refusing anything that
/// would leave it.
pub fn safe_join(base: &Path, rel: &str) -> Option<PathBuf> {
    let normalized = rel.replace('\\', "/");
    if normalized.is_empty() || normalized.starts_with('/') || normalized.contains(':') {
        return None;
    }
    let mut out = PathBuf::from(base);
    for part in normalized.split('/') {
        if part.is_empty() {
            return None;
        }
        match Path::new(part).components().next() {
            Some(Component::Normal(segment)) => out.push(segment),
            _ => return None,
        }
    }
    Some(out)
}

/// Canonical loose-file location of a resource inside the read-write root.
pub fn loose_path(root: &Path, name: &ResourceName) -> PathBuf {
    // ResourceName already rejects separators and relative segments.
    safe_join(root, &name.full_name()).unwrap_or_else(|| root.join(name.full_name()))
}

pub fn container_path(root: &Path, container: &str, extension: &str) -> Option<PathBuf> {
    safe_join(root, &format!("{}.{}", container, extension))
}

/// Removes `path` if present; a missing file is not an error.
pub fn remove_file_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err),
    }
}

/// Deletes empty directories below `root` (never `root` itself), deepest first.
/// Returns how many were removed.
pub fn prune_empty_dirs(root: &Path) -> io::Result<usize> {
    fn visit(dir: &Path, removed: &mut usize) -> io::Result<bool> {
        let mut empty = true;
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                let path = entry.path();
                if visit(&path, removed)? {
                    fs::remove_dir(&path)?;
                    *removed += 1;
                } else {
                    empty = false;
                }
            } else {
                empty = false;
            }
        }
        Ok(empty)
    }

    if !root.is_dir() {
        return Ok(0);
    }
    let mut removed = 0;
    visit(root, &mut removed)?;
    Ok(removed)
}
