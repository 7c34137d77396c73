//! Canonical field catalogue.
//!
//! Mapping profiles may only target names listed here (or the per-currency
//! price patterns).

use std::sync::LazyLock;

use regex::Regex;

pub const TITLE: &str = "title";
pub const HANDLE: &str = "handle";
pub const EXTERNAL_ID: &str = "external_id";
pub const STATUS: &str = "status";
pub const DESCRIPTION: &str = "description";
pub const SUBTITLE: &str = "subtitle";
pub const CURRENCY_CODE: &str = "currency_code";
pub const RETAIL_PRICE: &str = "retail_price";
pub const VARIANT_SKU: &str = "variant_sku";
pub const VARIANT_TITLE: &str = "variant_title";
pub const VARIANT_PRICE: &str = "variant_price";
pub const MANAGE_INVENTORY: &str = "manage_inventory";
pub const ALLOW_BACKORDER: &str = "allow_backorder";
pub const INVENTORY_QUANTITY: &str = "inventory_quantity";
pub const UOM: &str = "uom";
pub const MIN_INCREMENT: &str = "min_increment";
pub const MIN_CUT: &str = "min_cut";
pub const REORDER_POINT: &str = "reorder_point";
pub const SAFETY_STOCK: &str = "safety_stock";
pub const LOW_STOCK_THRESHOLD: &str = "low_stock_threshold";
pub const BACKORDER_POLICY: &str = "backorder_policy";
pub const TAGS: &str = "tags";
pub const COLLECTIONS: &str = "collections";
pub const CATEGORIES: &str = "categories";
pub const SALES_CHANNELS: &str = "sales_channels";
pub const IMAGES: &str = "images";
pub const THUMBNAIL: &str = "thumbnail";
pub const METADATA: &str = "metadata";
pub const METADATA_KV: &str = "metadata_kv";

/// `option_{n}_title` / `option_{n}_value` for n in 1..=3.
pub const OPTION_TITLES: [&str; 3] = ["option_1_title", "option_2_title", "option_3_title"];
pub const OPTION_VALUES: [&str; 3] = ["option_1_value", "option_2_value", "option_3_value"];

/// Every fixed canonical field name.
pub const CANONICAL_FIELDS: &[&str] = &[
    TITLE,
    HANDLE,
    EXTERNAL_ID,
    STATUS,
    DESCRIPTION,
    SUBTITLE,
    CURRENCY_CODE,
    RETAIL_PRICE,
    VARIANT_SKU,
    VARIANT_TITLE,
    VARIANT_PRICE,
    "option_1_title",
    "option_2_title",
    "option_3_title",
    "option_1_value",
    "option_2_value",
    "option_3_value",
    MANAGE_INVENTORY,
    ALLOW_BACKORDER,
    INVENTORY_QUANTITY,
    UOM,
    MIN_INCREMENT,
    MIN_CUT,
    REORDER_POINT,
    SAFETY_STOCK,
    LOW_STOCK_THRESHOLD,
    BACKORDER_POLICY,
    TAGS,
    COLLECTIONS,
    CATEGORIES,
    SALES_CHANNELS,
    IMAGES,
    THUMBNAIL,
    METADATA,
    METADATA_KV,
];

static PRODUCT_PRICE_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^price_([a-z]{3})$").expect("static regex"));

static VARIANT_PRICE_COLUMN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^variant_price_([a-z]{3})$").expect("static regex"));

/// Currency of a `price_<cur>` column, if `field` is one.
pub fn product_price_currency(field: &str) -> Option<&str> {
    PRODUCT_PRICE_COLUMN
        .captures(field)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Currency of a `variant_price_<cur>` column, if `field` is one.
pub fn variant_price_currency(field: &str) -> Option<&str> {
    VARIANT_PRICE_COLUMN
        .captures(field)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

/// Returns `true` if `field` is a name the validator interprets.
pub fn is_canonical_field(field: &str) -> bool {
    CANONICAL_FIELDS.contains(&field)
        || product_price_currency(field).is_some()
        || variant_price_currency(field).is_some()
}
