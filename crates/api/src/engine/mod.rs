//! Import job execution engine.
//!
//! Each admitted job runs as its own tokio task. The [`registry`] maps job
//! ids to cancellation tokens, [`progress`] persists pipeline progress to
//! the job row, and [`runner`] drives one job from claim to terminal
//! status.

pub mod progress;
pub mod registry;
pub mod runner;

pub use registry::JobRegistry;
pub use runner::ImportEngine;
