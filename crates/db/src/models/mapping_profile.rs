//! Mapping profile rows and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use swatch_core::mapping::{ColumnMapping, MappingSettings, ProfileDocument, ProfileMapping};
use swatch_core::types::{DbId, ProfileId, Timestamp};

/// A row from the `mapping_profiles` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MappingProfile {
    pub id: ProfileId,
    pub owner_id: DbId,
    pub name: String,
    pub description: Option<String>,
    pub mapping: serde_json::Value,
    pub settings: serde_json::Value,
    pub is_default: bool,
    pub is_shared: bool,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl MappingProfile {
    pub fn column_mapping(&self) -> ColumnMapping {
        serde_json::from_value(self.mapping.clone()).unwrap_or_default()
    }

    /// Missing keys fall back to [`MappingSettings::DEFAULT`].
    pub fn mapping_settings(&self) -> MappingSettings {
        serde_json::from_value(self.settings.clone()).unwrap_or(MappingSettings::DEFAULT)
    }

    pub fn to_profile_mapping(&self) -> ProfileMapping {
        ProfileMapping {
            mapping: self.column_mapping(),
            settings: self.mapping_settings(),
        }
    }

    /// The portable part of the profile, as carried by the export envelope.
    pub fn to_document(&self) -> ProfileDocument {
        ProfileDocument {
            name: self.name.clone(),
            description: self.description.clone(),
            mapping: self.column_mapping(),
            settings: self.mapping_settings(),
            metadata: self.metadata.clone(),
        }
    }
}

/// DTO for creating a profile. Also used by duplicate and import.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMappingProfile {
    pub name: String,
    pub description: Option<String>,
    pub mapping: ColumnMapping,
    #[serde(default)]
    pub settings: MappingSettings,
    #[serde(default)]
    pub is_default: bool,
    #[serde(default)]
    pub is_shared: bool,
    pub metadata: Option<serde_json::Value>,
}

impl From<ProfileDocument> for CreateMappingProfile {
    fn from(doc: ProfileDocument) -> Self {
        Self {
            name: doc.name,
            description: doc.description,
            mapping: doc.mapping,
            settings: doc.settings,
            is_default: false,
            is_shared: false,
            metadata: doc.metadata,
        }
    }
}

/// DTO for updating a profile. All fields optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateMappingProfile {
    pub name: Option<String>,
    pub description: Option<String>,
    pub mapping: Option<ColumnMapping>,
    pub settings: Option<MappingSettings>,
    pub is_default: Option<bool>,
    pub is_shared: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

/// Filters for listing visible profiles.
#[derive(Debug, Default, Deserialize)]
pub struct ProfileListQuery {
    /// Case-insensitive substring match on name or description.
    pub search: Option<String>,
    /// `Some(true)` keeps only shared profiles, `Some(false)` only the
    /// caller's own.
    pub shared: Option<bool>,
}
