//! Header-to-field resolution.

use async_trait::async_trait;
use serde_json::Value;

use super::builtin::find_builtin;
use super::profile::{is_builtin_id, ColumnMapping, MappingSettings, ProfileMapping};
use crate::error::CoreError;
use crate::types::{DbId, ProfileId};
use crate::validation::fields::is_canonical_field;
use crate::validation::RawRow;

/// Where user-owned profiles come from.
#[async_trait]
pub trait ProfileSource: Send + Sync {
    /// A profile owned by `owner_id` or shared; `None` otherwise.
    async fn visible_profile(
        &self,
        id: &str,
        owner_id: DbId,
    ) -> Result<Option<ProfileMapping>, CoreError>;

    /// The profile `owner_id` marked as their default, if any.
    async fn default_profile(&self, owner_id: DbId) -> Result<Option<ProfileMapping>, CoreError>;
}

/// How a job asked for its columns to be mapped.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingDirective {
    Explicit(ColumnMapping),
    Profile(ProfileId),
    Identity,
}

impl MappingDirective {
    /// Explicit mapping wins over a profile id; neither means identity.
    pub fn from_parts(explicit: Option<ColumnMapping>, profile_id: Option<ProfileId>) -> Self {
        match (explicit, profile_id) {
            (Some(mapping), _) if !mapping.is_empty() => Self::Explicit(mapping),
            (_, Some(id)) if !id.trim().is_empty() => Self::Profile(id.trim().to_string()),
            _ => Self::Identity,
        }
    }
}

/// Settings applied to an explicit per-job mapping.
const EXPLICIT_SETTINGS: MappingSettings = MappingSettings {
    skip_unmapped: false,
    auto_detect: false,
    case_sensitive: true,
    trim_values: true,
};

/// Per-column targets for one file. `None` drops the column.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderMapping {
    targets: Vec<Option<String>>,
}

impl HeaderMapping {
    pub fn identity(headers: &[String]) -> Self {
        Self {
            targets: headers.iter().cloned().map(Some).collect(),
        }
    }

    pub fn targets(&self) -> &[Option<String>] {
        &self.targets
    }

    /// Resolved mapping as `header -> field` pairs, for echoing on the job.
    pub fn to_column_mapping(&self, headers: &[String]) -> ColumnMapping {
        headers
            .iter()
            .zip(&self.targets)
            .filter_map(|(h, t)| t.as_ref().map(|t| (h.clone(), t.clone())))
            .collect()
    }

    /// Build the raw row for one record. Duplicate targets are all emitted
    /// in column order; [`RawRow::from_cells`] keeps the last.
    pub fn apply<'a, I>(&self, line: usize, record: I) -> RawRow
    where
        I: IntoIterator<Item = &'a str>,
    {
        RawRow::from_cells(
            line,
            self.targets
                .iter()
                .zip(record)
                .filter_map(|(target, cell)| {
                    target
                        .as_ref()
                        .map(|t| (t.clone(), Value::String(cell.to_string())))
                }),
        )
    }
}

/// Map headers through one profile.
pub fn map_headers(headers: &[String], profile: &ProfileMapping) -> HeaderMapping {
    let settings = &profile.settings;
    let entries: Vec<(String, &String)> = profile
        .mapping
        .iter()
        .map(|(source, target)| (settings.normalize(source), target))
        .collect();

    let targets = headers
        .iter()
        .map(|header| {
            let key = settings.normalize(header);
            if let Some((_, target)) = entries.iter().find(|(source, _)| *source == key) {
                return Some((*target).clone());
            }
            if settings.auto_detect {
                if is_canonical_field(&key) {
                    return Some(key);
                }
                return Some(header.clone());
            }
            (!settings.skip_unmapped).then(|| header.clone())
        })
        .collect();

    HeaderMapping { targets }
}

/// Resolve a directive into per-column targets.
///
/// Built-in ids never touch `source`. Unknown or invisible profiles are
/// reported as not found. With no mapping and no profile id the owner's
/// default profile applies, and headers map to themselves when there is none.
pub async fn resolve_mapping(
    headers: &[String],
    directive: &MappingDirective,
    owner_id: DbId,
    source: &dyn ProfileSource,
) -> Result<HeaderMapping, CoreError> {
    match directive {
        MappingDirective::Identity => Ok(match source.default_profile(owner_id).await? {
            Some(profile) => map_headers(headers, &profile),
            None => HeaderMapping::identity(headers),
        }),
        MappingDirective::Explicit(mapping) => Ok(map_headers(
            headers,
            &ProfileMapping {
                mapping: mapping.clone(),
                settings: EXPLICIT_SETTINGS,
            },
        )),
        MappingDirective::Profile(id) if is_builtin_id(id) => {
            let builtin =
                find_builtin(id).ok_or_else(|| CoreError::not_found("mapping_profile", id))?;
            Ok(map_headers(headers, &builtin.to_profile_mapping()))
        }
        MappingDirective::Profile(id) => {
            let profile = source
                .visible_profile(id, owner_id)
                .await?
                .ok_or_else(|| CoreError::not_found("mapping_profile", id))?;
            Ok(map_headers(headers, &profile))
        }
    }
}
