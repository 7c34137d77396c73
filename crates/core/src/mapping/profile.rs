//! Mapping profile rules: settings, input validation, and the portable
//! export envelope.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Timestamp;
use crate::validation::fields::is_canonical_field;

/// Reserved id prefix for read-only built-in profiles.
pub const BUILTIN_PREFIX: &str = "builtin-";

/// Current version of the export envelope.
pub const EXPORT_VERSION: u32 = 1;

/// Maximum length of a profile name.
pub const MAX_NAME_LEN: usize = 120;

/// Suffix appended to an imported profile's name when none is supplied.
pub const IMPORTED_SUFFIX: &str = " (Imported)";

/// Suffix appended to a duplicated profile's name when none is supplied.
pub const COPY_SUFFIX: &str = " (Copy)";

/// Source column name to canonical field name.
pub type ColumnMapping = BTreeMap<String, String>;

/// How source headers are compared against a profile's mapping keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingSettings {
    /// Drop headers that match no mapping entry.
    pub skip_unmapped: bool,
    /// Keep unmatched headers, renaming those whose normalized form is
    /// already a canonical field.
    pub auto_detect: bool,
    pub case_sensitive: bool,
    pub trim_values: bool,
}

impl MappingSettings {
    pub const DEFAULT: Self = Self {
        skip_unmapped: false,
        auto_detect: false,
        case_sensitive: false,
        trim_values: true,
    };

    /// Normalize a header or mapping key for comparison.
    pub fn normalize(&self, header: &str) -> String {
        let s = if self.trim_values { header.trim() } else { header };
        if self.case_sensitive {
            s.to_string()
        } else {
            s.to_lowercase()
        }
    }
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// The part of a profile the resolver consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileMapping {
    pub mapping: ColumnMapping,
    pub settings: MappingSettings,
}

/// Returns `true` if `id` names a built-in profile.
pub fn is_builtin_id(id: &str) -> bool {
    id.starts_with(BUILTIN_PREFIX)
}

/// Validate the user-editable parts of a profile.
pub fn validate_profile(name: &str, mapping: &ColumnMapping) -> Result<(), CoreError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::Validation(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    if mapping.is_empty() {
        return Err(CoreError::Validation(
            "mapping must contain at least one column".into(),
        ));
    }
    for (source, target) in mapping {
        if source.trim().is_empty() {
            return Err(CoreError::Validation(
                "mapping source columns must not be empty".into(),
            ));
        }
        if !is_canonical_field(target) {
            return Err(CoreError::Validation(format!(
                "mapping target '{target}' for column '{source}' is not a known field"
            )));
        }
    }
    Ok(())
}

/// Name for a duplicated profile.
pub fn duplicate_name(original: &str, requested: Option<&str>) -> String {
    requested
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{original}{COPY_SUFFIX}"))
}

/// Name for an imported profile.
pub fn imported_name(original: &str, requested: Option<&str>) -> String {
    requested
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{original}{IMPORTED_SUFFIX}"))
}

// ---------------------------------------------------------------------------
// Export envelope
// ---------------------------------------------------------------------------

/// The portable body of a profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileDocument {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub mapping: ColumnMapping,
    #[serde(default)]
    pub settings: MappingSettings,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Versioned wrapper written by export and read by import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileExport {
    pub version: u32,
    pub exported_at: Timestamp,
    pub profile: ProfileDocument,
}

/// Serialize a profile into its export envelope.
pub fn export_profile(document: ProfileDocument, exported_at: Timestamp) -> Result<String, CoreError> {
    let envelope = ProfileExport {
        version: EXPORT_VERSION,
        exported_at,
        profile: document,
    };
    serde_json::to_string_pretty(&envelope)
        .map_err(|e| CoreError::Internal(format!("failed to serialize profile: {e}")))
}

/// Parse and check an export envelope.
pub fn parse_export(serialized: &str) -> Result<ProfileDocument, CoreError> {
    let envelope: ProfileExport = serde_json::from_str(serialized)
        .map_err(|e| CoreError::Validation(format!("invalid profile export: {e}")))?;
    if envelope.version != EXPORT_VERSION {
        return Err(CoreError::Validation(format!(
            "unsupported profile export version {} (expected {EXPORT_VERSION})",
            envelope.version
        )));
    }
    validate_profile(&envelope.profile.name, &envelope.profile.mapping)?;
    Ok(envelope.profile)
}
