//! Read-only built-in mapping profiles.
//!
//! The registry is a process-wide constant table; nothing mutates it.

use super::profile::{ColumnMapping, MappingSettings, ProfileMapping};

/// A built-in profile definition.
#[derive(Debug)]
pub struct BuiltinProfile {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub mapping: &'static [(&'static str, &'static str)],
    pub settings: MappingSettings,
}

impl BuiltinProfile {
    pub fn column_mapping(&self) -> ColumnMapping {
        self.mapping
            .iter()
            .map(|(source, target)| (source.to_string(), target.to_string()))
            .collect()
    }

    pub fn to_profile_mapping(&self) -> ProfileMapping {
        ProfileMapping {
            mapping: self.column_mapping(),
            settings: self.settings,
        }
    }
}

pub const FABRIC_PROFILE_ID: &str = "builtin-fabric";
pub const SHOPIFY_PROFILE_ID: &str = "builtin-shopify";

/// Bolt sheets as mills and jobbers usually send them.
const FABRIC_MAPPING: &[(&str, &str)] = &[
    ("Product Name", "title"),
    ("Fabric Name", "title"),
    ("Handle", "handle"),
    ("Style Number", "external_id"),
    ("SKU", "variant_sku"),
    ("Description", "description"),
    ("Content", "subtitle"),
    ("Currency", "currency_code"),
    ("Price per Yard", "retail_price"),
    ("Price per Meter", "retail_price"),
    ("Wholesale Price", "variant_price"),
    ("Unit", "uom"),
    ("Minimum Cut", "min_cut"),
    ("Cut Increment", "min_increment"),
    ("Yards on Hand", "inventory_quantity"),
    ("Reorder Point", "reorder_point"),
    ("Safety Stock", "safety_stock"),
    ("Low Stock Alert", "low_stock_threshold"),
    ("Backorder Policy", "backorder_policy"),
    ("Tags", "tags"),
    ("Collection", "collections"),
    ("Category", "categories"),
    ("Sales Channels", "sales_channels"),
    ("Image URLs", "images"),
    ("Swatch Image", "thumbnail"),
    ("Notes", "metadata_kv"),
];

/// Shopify's product CSV export.
const SHOPIFY_MAPPING: &[(&str, &str)] = &[
    ("Handle", "handle"),
    ("Title", "title"),
    ("Body (HTML)", "description"),
    ("Tags", "tags"),
    ("Product Category", "categories"),
    ("Option1 Name", "option_1_title"),
    ("Option1 Value", "option_1_value"),
    ("Option2 Name", "option_2_title"),
    ("Option2 Value", "option_2_value"),
    ("Option3 Name", "option_3_title"),
    ("Option3 Value", "option_3_value"),
    ("Variant SKU", "variant_sku"),
    ("Variant Price", "variant_price"),
    ("Variant Inventory Qty", "inventory_quantity"),
    ("Image Src", "images"),
];

pub const BUILTIN_PROFILES: &[BuiltinProfile] = &[
    BuiltinProfile {
        id: FABRIC_PROFILE_ID,
        name: "Fabric bolt sheet",
        description: "Mill and jobber bolt sheets with per-yard pricing and cut rules",
        mapping: FABRIC_MAPPING,
        settings: MappingSettings {
            skip_unmapped: false,
            auto_detect: true,
            case_sensitive: false,
            trim_values: true,
        },
    },
    BuiltinProfile {
        id: SHOPIFY_PROFILE_ID,
        name: "Shopify product export",
        description: "Product CSV exported from a Shopify admin",
        mapping: SHOPIFY_MAPPING,
        settings: MappingSettings {
            skip_unmapped: true,
            auto_detect: false,
            case_sensitive: false,
            trim_values: true,
        },
    },
];

/// Look up a built-in profile by id.
pub fn find_builtin(id: &str) -> Option<&'static BuiltinProfile> {
    BUILTIN_PROFILES.iter().find(|p| p.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mapping::profile::{is_builtin_id, validate_profile};

    #[test]
    fn builtins_are_well_formed() {
        for profile in BUILTIN_PROFILES {
            assert!(is_builtin_id(profile.id), "{}", profile.id);
            validate_profile(profile.name, &profile.column_mapping()).unwrap();
        }
    }

    #[test]
    fn fabric_maps_price_per_yard() {
        let fabric = find_builtin("builtin-fabric").unwrap();
        assert_eq!(
            fabric.column_mapping().get("Price per Yard").map(String::as_str),
            Some("retail_price")
        );
    }

    #[test]
    fn unknown_builtin_is_none() {
        assert!(find_builtin("builtin-nope").is_none());
    }
}
