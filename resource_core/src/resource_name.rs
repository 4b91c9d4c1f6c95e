use std::fmt;

use thiserror::Error;

pub const MAX_RESOURCE_NAME_LEN: usize = 512;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("invalid resource name: {message}")]
pub struct ResourceNameError {
    message: String,
}

impl ResourceNameError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Identity of a resource: `name`, optional `variant`, `extension`.
///
/// Comparison is ordinal and case-sensitive on all three fields. The derived
/// ordering (name, then variant with `None` first, then extension) is what the
/// read-write table uses for deterministic enumeration.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceName {
    name: String,
    variant: Option<String>,
    extension: String,
}

impl ResourceName {
    pub fn new(
        name: impl Into<String>,
        variant: Option<impl Into<String>>,
        extension: impl Into<String>,
    ) -> Result<Self, ResourceNameError> {
        let name = name.into();
        let variant = variant.map(Into::into);
        let extension = extension.into();

        validate_name(&name)?;
        if let Some(variant) = &variant {
            validate_segment("variant", variant)?;
        }
        validate_segment("extension", &extension)?;

        let resource = Self {
            name,
            variant,
            extension,
        };
        let full_len = resource.full_name().len();
        if full_len > MAX_RESOURCE_NAME_LEN {
            return Err(ResourceNameError::new(format!(
                "full name length {} exceeds max {}",
                full_len, MAX_RESOURCE_NAME_LEN
            )));
        }
        Ok(resource)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn variant(&self) -> Option<&str> {
        self.variant.as_deref()
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    /// `name.variant.extension`, or `name.extension` without a variant. Used as
    /// the container entry name and as the loose-file path under the read-write root.
    pub fn full_name(&self) -> String {
        match &self.variant {
            Some(variant) => format!("{}.{}.{}", self.name, variant, self.extension),
            None => format!("{}.{}", self.name, self.extension),
        }
    }

    /// A resource without a variant is always relevant; one with a variant only
    /// when it equals the active variant.
    pub fn matches_variant(&self, current_variant: Option<&str>) -> bool {
        match &self.variant {
            None => true,
            Some(variant) => current_variant == Some(variant.as_str()),
        }
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name())
    }
}

fn validate_name(name: &str) -> Result<(), ResourceNameError> {
    if name.trim().is_empty() {
        return Err(ResourceNameError::new("name is empty"));
    }
    if name.contains('\\') {
        return Err(ResourceNameError::new(format!(
            "name '{}' must use '/' separators",
            name
        )));
    }
    if name.starts_with('/') || name.contains(':') {
        return Err(ResourceNameError::new(format!(
            "name '{}' must be a relative path",
            name
        )));
    }
    for part in name.split('/') {
        if part.is_empty() || part == "." || part == ".." {
            return Err(ResourceNameError::new(format!(
                "name '{}' contains an empty or relative segment",
                name
            )));
        }
    }
    Ok(())
}

fn validate_segment(label: &str, value: &str) -> Result<(), ResourceNameError> {
    if value.is_empty() {
        return Err(ResourceNameError::new(format!("{} is empty", label)));
    }
    if value.contains(&['/', '\\', ':'][..]) {
        return Err(ResourceNameError::new(format!(
            "{} '{}' contains a path separator",
            label, value
        )));
    }
    Ok(())
}
