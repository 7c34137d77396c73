pub mod imports;
pub mod mapping_profiles;
