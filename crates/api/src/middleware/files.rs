//! Access guard for stored objects served under `/files`.
//!
//! Every stored key sits under `imports/{job_id}/`, so an object is readable
//! by exactly the user who submitted that job.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use swatch_core::error::CoreError;
use swatch_core::types::JobId;
use swatch_db::repositories::ImportJobRepo;

use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// The job a stored object belongs to, read from its request path.
pub fn job_of_path(path: &str) -> Option<JobId> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    segments.find(|s| *s == "imports")?;
    segments.next()?.parse().ok()
}

/// Let the request through only when the caller owns the object's job.
/// Anything else reads as missing.
pub async fn require_file_owner(
    State(state): State<AppState>,
    user: AuthUser,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let path = request.uri().path().to_string();
    let not_found = || AppError::Core(CoreError::not_found("File", &path));

    let job_id = job_of_path(&path).ok_or_else(not_found)?;
    if ImportJobRepo::find_for_owner(&state.pool, job_id, user.user_id)
        .await?
        .is_none()
    {
        tracing::debug!(job_id = %job_id, user_id = user.user_id, "File request for a job the caller does not own");
        return Err(not_found());
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_id_is_read_after_the_imports_segment() {
        let id = JobId::new_v4();
        assert_eq!(job_of_path(&format!("/imports/{id}/source/bolts.csv")), Some(id));
        assert_eq!(
            job_of_path(&format!("/files/imports/{id}/artifacts/error_rows.csv")),
            Some(id)
        );
        assert_eq!(job_of_path("/imports/not-a-uuid/source/a.csv"), None);
        assert_eq!(job_of_path("/other/a.csv"), None);
        assert_eq!(job_of_path("/"), None);
    }
}
