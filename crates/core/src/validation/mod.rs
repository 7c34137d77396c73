//! Row schema and validator.
//!
//! Turns one column-mapped spreadsheet row ([`RawRow`]) into either a
//! canonical [`crate::product_row::ProductRow`] or a list of
//! [`ValidationIssue`]s. Everything in here is pure: no I/O, no async.

pub mod fields;
pub mod raw;
pub mod row;
pub mod rules;

pub use raw::RawRow;
pub use row::{validate_row, ValidRow, ValidationContext};
pub use rules::{Severity, ValidationIssue};
