//! Row structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - A `Deserialize` update DTO (all `Option` fields) for patches, where the
//!   entity is mutable

pub mod artifact;
pub mod import_job;
pub mod mapping_profile;

pub use artifact::ImportArtifact;
pub use import_job::{ImportJob, JobListQuery, NewImportJob};
pub use mapping_profile::{
    CreateMappingProfile, MappingProfile, ProfileListQuery, UpdateMappingProfile,
};
