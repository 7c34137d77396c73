/// User identifiers issued by the auth service (PostgreSQL BIGINT).
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Import jobs are keyed by an opaque UUID generated at submission.
pub type JobId = uuid::Uuid;

/// Mapping profile ids are opaque strings; built-ins use a reserved prefix.
pub type ProfileId = String;
