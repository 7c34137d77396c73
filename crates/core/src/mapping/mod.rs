//! Column mapping: profile rules, the built-in registry, and the resolver
//! that turns a file's header row into canonical field names.

pub mod builtin;
pub mod profile;
pub mod resolver;

pub use builtin::{find_builtin, BuiltinProfile, BUILTIN_PROFILES};
pub use profile::{
    duplicate_name, export_profile, imported_name, is_builtin_id, parse_export, validate_profile,
    ColumnMapping, MappingSettings, ProfileDocument, ProfileExport, ProfileMapping,
};
pub use resolver::{map_headers, resolve_mapping, HeaderMapping, MappingDirective, ProfileSource};
