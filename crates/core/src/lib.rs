//! Domain logic for the bulk product-import pipeline.
//!
//! Pure validation, mapping and rendering code plus the async ports the
//! pipeline drives. Nothing in this crate touches the database or HTTP.

pub mod admission;
pub mod artifacts;
pub mod error;
pub mod import_job;
pub mod mapping;
pub mod pipeline;
pub mod ports;
pub mod product_row;
pub mod progress;
pub mod roles;
pub mod safety_gate;
pub mod source;
pub mod types;
pub mod validation;
