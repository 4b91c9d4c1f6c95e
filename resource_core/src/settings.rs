use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::checker::CheckerOptions;
use crate::paths;

pub const DEFAULT_MANIFEST_NAME: &str = "ResourceList.dat";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings read failed ({path}): {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("settings parse failed: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("manifest name {0:?} does not stay inside its root")]
    UnsafeManifestName(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct CheckerSettings {
    pub version: u32,
    pub read_only_root: PathBuf,
    pub read_write_root: PathBuf,
    pub remote_manifest: String,
    #[serde(default = "default_manifest_name")]
    pub read_only_manifest: String,
    #[serde(default = "default_manifest_name")]
    pub read_write_manifest: String,
    #[serde(default)]
    pub current_variant: Option<String>,
    #[serde(default)]
    pub ignore_other_variant: bool,
    #[serde(default = "default_container_extension")]
    pub container_extension: String,
    #[serde(default = "default_true")]
    pub persist_read_write_manifest: bool,
}

#[derive(Clone, Debug, Default)]
pub struct SettingsValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl SettingsValidation {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

fn default_manifest_name() -> String {
    DEFAULT_MANIFEST_NAME.to_string()
}

fn default_container_extension() -> String {
    "pak".to_string()
}

fn default_true() -> bool {
    true
}

impl CheckerSettings {
    pub fn parse_toml(text: &str) -> Result<Self, SettingsError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads a settings file; relative roots and a relative remote manifest
    /// path resolve against the file's directory.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut settings = Self::parse_toml(&text)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        settings.rebase_relative_paths(base_dir);
        Ok(settings)
    }

    fn rebase_relative_paths(&mut self, base_dir: &Path) {
        for root in [&mut self.read_only_root, &mut self.read_write_root] {
            if root.is_relative() {
                *root = base_dir.join(&*root);
            }
        }
        if !is_uri(&self.remote_manifest) && Path::new(&self.remote_manifest).is_relative() {
            self.remote_manifest = base_dir
                .join(&self.remote_manifest)
                .to_string_lossy()
                .into_owned();
        }
    }

    pub fn validate(&self) -> SettingsValidation {
        let mut validation = SettingsValidation::default();
        if self.version != 1 {
            validation
                .errors
                .push(format!("unsupported settings version {}", self.version));
        }
        if self.read_only_root.as_os_str().is_empty() {
            validation
                .errors
                .push("read_only_root must not be empty".to_string());
        }
        if self.read_write_root.as_os_str().is_empty() {
            validation
                .errors
                .push("read_write_root must not be empty".to_string());
        }
        if self.remote_manifest.trim().is_empty() {
            validation
                .errors
                .push("remote_manifest must not be empty".to_string());
        }
        for (field, name) in [
            ("read_only_manifest", &self.read_only_manifest),
            ("read_write_manifest", &self.read_write_manifest),
        ] {
            if paths::safe_join(Path::new(""), name).is_none() {
                validation
                    .errors
                    .push(format!("{} {:?} must be a relative path inside its root", field, name));
            }
        }
        let extension = self.container_extension.trim();
        if extension.is_empty() || extension.contains(&['.', '/', '\\'][..]) {
            validation.errors.push(format!(
                "container_extension {:?} must be a bare extension",
                self.container_extension
            ));
        }
        if self.read_only_root == self.read_write_root {
            validation
                .warnings
                .push("read_only_root and read_write_root are the same directory".to_string());
        }
        if self.ignore_other_variant && self.current_variant.is_none() {
            validation.warnings.push(
                "ignore_other_variant has no effect without current_variant".to_string(),
            );
        }
        validation
    }

    pub fn read_only_manifest_path(&self) -> Result<PathBuf, SettingsError> {
        paths::safe_join(&self.read_only_root, &self.read_only_manifest)
            .ok_or_else(|| SettingsError::UnsafeManifestName(self.read_only_manifest.clone()))
    }

    pub fn read_write_manifest_path(&self) -> Result<PathBuf, SettingsError> {
        paths::safe_join(&self.read_write_root, &self.read_write_manifest)
            .ok_or_else(|| SettingsError::UnsafeManifestName(self.read_write_manifest.clone()))
    }

    pub fn checker_options(&self) -> Result<CheckerOptions, SettingsError> {
        let read_write_manifest = self.read_write_manifest_path()?;
        Ok(CheckerOptions {
            remote_manifest_uri: self.remote_manifest.clone(),
            read_only_manifest_uri: self.read_only_manifest_path()?.to_string_lossy().into_owned(),
            read_write_manifest_uri: read_write_manifest.to_string_lossy().into_owned(),
            read_write_root: self.read_write_root.clone(),
            read_write_manifest_path: self
                .persist_read_write_manifest
                .then_some(read_write_manifest),
        })
    }
}

fn is_uri(value: &str) -> bool {
    value.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
version = 1
read_only_root = "package"
read_write_root = "cache"
remote_manifest = "remote/ResourceVersion.dat"
"#;

    #[test]
    fn defaults_fill_optional_fields() {
        let settings = CheckerSettings::parse_toml(MINIMAL).unwrap();
        assert_eq!(settings.read_only_manifest, DEFAULT_MANIFEST_NAME);
        assert_eq!(settings.read_write_manifest, DEFAULT_MANIFEST_NAME);
        assert_eq!(settings.container_extension, "pak");
        assert!(settings.persist_read_write_manifest);
        assert!(!settings.ignore_other_variant);
        assert!(settings.current_variant.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn load_rebases_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("checker.toml");
        std::fs::write(&path, MINIMAL).unwrap();

        let settings = CheckerSettings::load(&path).unwrap();
        assert_eq!(settings.read_only_root, dir.path().join("package"));
        assert_eq!(settings.read_write_root, dir.path().join("cache"));
        assert_eq!(
            PathBuf::from(&settings.remote_manifest),
            dir.path().join("remote/ResourceVersion.dat")
        );

        let options = settings.checker_options().unwrap();
        assert_eq!(
            options.read_write_manifest_path,
            Some(dir.path().join("cache").join(DEFAULT_MANIFEST_NAME))
        );
    }

    #[test]
    fn uri_remote_manifest_is_left_alone() {
        let text = MINIMAL.replace(
            "remote/ResourceVersion.dat",
            "https://cdn.example.com/ResourceVersion.dat",
        );
        let mut settings = CheckerSettings::parse_toml(&text).unwrap();
        settings.rebase_relative_paths(Path::new("/srv"));
        assert_eq!(
            settings.remote_manifest,
            "https://cdn.example.com/ResourceVersion.dat"
        );
    }

    #[test]
    fn validate_reports_errors_and_warnings() {
        let text = r#"
version = 2
read_only_root = "same"
read_write_root = "same"
remote_manifest = ""
read_write_manifest = "../escape.dat"
container_extension = ".pak"
ignore_other_variant = true
persist_read_write_manifest = false
"#;
        let settings = CheckerSettings::parse_toml(text).unwrap();
        let validation = settings.validate();
        assert!(!validation.is_ok());
        assert_eq!(validation.errors.len(), 4);
        assert_eq!(validation.warnings.len(), 2);
        assert!(matches!(
            settings.checker_options(),
            Err(SettingsError::UnsafeManifestName(_))
        ));
    }

    #[test]
    fn persistence_can_be_disabled() {
        let text = format!("{}persist_read_write_manifest = false\n", MINIMAL);
        let settings = CheckerSettings::parse_toml(&text).unwrap();
        assert_eq!(settings.checker_options().unwrap().read_write_manifest_path, None);
    }
}
