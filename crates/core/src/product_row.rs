//! Canonical, validated product rows.
//!
//! A [`ProductRow`] only ever comes out of [`crate::validation::validate_row`];
//! downstream code never re-checks money or cross-field invariants.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Currency code (3-letter, lowercase) to amount in minor units.
pub type PriceList = BTreeMap<String, i64>;

/// Maximum number of product options a row may define.
pub const MAX_OPTIONS: usize = 3;

/// Product publication status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    #[default]
    Published,
    Draft,
}

impl ProductStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Published => "published",
            Self::Draft => "draft",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "published" => Some(Self::Published),
            "draft" => Some(Self::Draft),
            _ => None,
        }
    }
}

/// Unit of measure for cut-to-length goods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitOfMeasure {
    Yard,
    Meter,
    Metre,
    Yd,
    M,
}

impl UnitOfMeasure {
    pub const ALL: &'static [&'static str] = &["yard", "meter", "metre", "yd", "m"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Yard => "yard",
            Self::Meter => "meter",
            Self::Metre => "metre",
            Self::Yd => "yd",
            Self::M => "m",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "yard" => Some(Self::Yard),
            "meter" => Some(Self::Meter),
            "metre" => Some(Self::Metre),
            "yd" => Some(Self::Yd),
            "m" => Some(Self::M),
            _ => None,
        }
    }
}

/// What the storefront does when stock runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackorderPolicy {
    Deny,
    AllowDate,
    AllowAny,
}

impl BackorderPolicy {
    pub const ALL: &'static [&'static str] = &["deny", "allow_date", "allow_any"];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deny => "deny",
            Self::AllowDate => "allow_date",
            Self::AllowAny => "allow_any",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "deny" => Some(Self::Deny),
            "allow_date" => Some(Self::AllowDate),
            "allow_any" => Some(Self::AllowAny),
            _ => None,
        }
    }
}

/// Fabric inventory policy. Every field is optional on input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryPolicy {
    pub uom: Option<UnitOfMeasure>,
    pub min_increment: Option<f64>,
    pub min_cut: Option<f64>,
    pub reorder_point: Option<f64>,
    pub safety_stock: Option<f64>,
    pub low_stock_threshold: Option<f64>,
    pub backorder_policy: Option<BackorderPolicy>,
}

impl InventoryPolicy {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Render the policy as the `metadata.inventory` object (present keys only).
    pub fn to_metadata(&self) -> serde_json::Map<String, serde_json::Value> {
        let mut out = serde_json::Map::new();
        if let Some(uom) = self.uom {
            out.insert("uom".into(), uom.as_str().into());
        }
        let numbers = [
            ("min_increment", self.min_increment),
            ("min_cut", self.min_cut),
            ("reorder_point", self.reorder_point),
            ("safety_stock", self.safety_stock),
            ("low_stock_threshold", self.low_stock_threshold),
        ];
        for (key, value) in numbers {
            if let Some(v) = value {
                out.insert(key.into(), serde_json::json!(v));
            }
        }
        if let Some(policy) = self.backorder_policy {
            out.insert("backorder_policy".into(), policy.as_str().into());
        }
        out
    }
}

/// The single variant a spreadsheet row describes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariantRow {
    pub sku: Option<String>,
    pub title: Option<String>,
    /// Option values, positionally aligned with [`ProductRow::option_titles`].
    pub option_values: Vec<String>,
    pub prices: PriceList,
    pub manage_inventory: Option<bool>,
    pub allow_backorder: Option<bool>,
    pub inventory_quantity: Option<i64>,
}

/// A validated, normalized product row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRow {
    /// 1-based source line number.
    pub line: usize,
    pub title: String,
    pub handle: Option<String>,
    pub external_id: Option<String>,
    pub status: ProductStatus,
    pub description: Option<String>,
    pub subtitle: Option<String>,
    pub prices: PriceList,
    pub option_titles: Vec<String>,
    pub variant: VariantRow,
    pub inventory: InventoryPolicy,
    pub tags: Vec<String>,
    pub collections: Vec<String>,
    pub categories: Vec<String>,
    pub sales_channels: Vec<String>,
    pub images: Vec<String>,
    pub thumbnail: Option<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}
