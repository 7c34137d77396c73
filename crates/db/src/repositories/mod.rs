//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument.

pub mod import_artifact_repo;
pub mod import_job_repo;
pub mod mapping_profile_repo;

pub use import_artifact_repo::ImportArtifactRepo;
pub use import_job_repo::{CreateOutcome, ImportJobRepo, SubmitLimits};
pub use mapping_profile_repo::{DeleteOutcome, MappingProfileRepo, PgProfileSource};
