//! Row validation: field rules, then cross-field checks.
//!
//! A missing title short-circuits (nothing else is meaningful without it).
//! Every other rule runs and its issues accumulate, so one pass reports all
//! problems on a row.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::fields::{self, OPTION_TITLES, OPTION_VALUES};
use super::raw::RawRow;
use super::rules::{self, Money, Rule, ValidationIssue};
use crate::product_row::{
    BackorderPolicy, InventoryPolicy, PriceList, ProductRow, ProductStatus, UnitOfMeasure,
    VariantRow, MAX_OPTIONS,
};

/// Tolerance used when checking that `min_cut` is a multiple of `min_increment`.
pub const INCREMENT_TOLERANCE: f64 = 1e-8;

/// Handles are lowercase slugs.
static HANDLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:[-_][a-z0-9]+)*$").expect("static regex"));

/// Job-level settings the validator needs.
#[derive(Debug, Clone)]
pub struct ValidationContext {
    /// Currency applied to `retail_price` / `variant_price` when the row has
    /// no `currency_code`.
    pub default_currency: String,
    pub skip_image_validation: bool,
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self {
            default_currency: "usd".to_string(),
            skip_image_validation: false,
        }
    }
}

/// A row that passed validation, with any informational warnings.
#[derive(Debug, Clone)]
pub struct ValidRow {
    pub product: ProductRow,
    pub warnings: Vec<ValidationIssue>,
}

/// A check run against the fully constructed row.
type CrossFieldRule = fn(&ProductRow) -> Option<ValidationIssue>;

const CROSS_FIELD_RULES: &[CrossFieldRule] = &[min_cut_is_multiple_of_increment];

/// Validate and normalize one raw row.
///
/// Returns every issue found (errors and warnings) when the row is
/// rejected.
pub fn validate_row(
    raw: &RawRow,
    ctx: &ValidationContext,
) -> Result<ValidRow, Vec<ValidationIssue>> {
    let mut check = RowCheck {
        raw,
        issues: Vec::new(),
    };

    let Some(title) = check.field(fields::TITLE, rules::text) else {
        return Err(vec![ValidationIssue::error(
            raw.line,
            Some(fields::TITLE),
            "title is required",
        )]);
    };

    let status = check
        .field(fields::STATUS, status_rule)
        .unwrap_or_default();
    let currency = check
        .field(fields::CURRENCY_CODE, rules::currency_code)
        .unwrap_or_else(|| ctx.default_currency.clone());

    let handle = check.field(fields::HANDLE, handle_rule);
    let external_id = check.field(fields::EXTERNAL_ID, rules::text);
    let description = check.field(fields::DESCRIPTION, rules::text);
    let subtitle = check.field(fields::SUBTITLE, rules::text);

    let prices = check.prices(fields::RETAIL_PRICE, &currency, fields::product_price_currency);
    let variant_prices =
        check.prices(fields::VARIANT_PRICE, &currency, fields::variant_price_currency);

    let manage_inventory = check.field(fields::MANAGE_INVENTORY, rules::boolean);
    let allow_backorder = check.field(fields::ALLOW_BACKORDER, rules::boolean);
    let inventory_quantity = check.field(fields::INVENTORY_QUANTITY, rules::non_negative_integer);

    let inventory = InventoryPolicy {
        uom: check.field(fields::UOM, uom_rule),
        min_increment: check.field(fields::MIN_INCREMENT, rules::positive_number),
        min_cut: check.field(fields::MIN_CUT, rules::positive_number),
        reorder_point: check.field(fields::REORDER_POINT, rules::non_negative_number),
        safety_stock: check.field(fields::SAFETY_STOCK, rules::non_negative_number),
        low_stock_threshold: check.field(fields::LOW_STOCK_THRESHOLD, rules::non_negative_number),
        backorder_policy: check.field(fields::BACKORDER_POLICY, backorder_rule),
    };

    let (option_titles, option_values) = check.options();

    let tags = check.list(fields::TAGS, rules::list);
    let collections = check.list(fields::COLLECTIONS, rules::list);
    let categories = check.list(fields::CATEGORIES, rules::list);
    let sales_channels = check.list(fields::SALES_CHANNELS, rules::semicolon_list);

    let mut images = check.list(fields::IMAGES, rules::list);
    let mut thumbnail = check.field(fields::THUMBNAIL, rules::text);
    if !ctx.skip_image_validation {
        check.image_urls(&mut images, &mut thumbnail);
    }

    let metadata = check.metadata(&inventory);

    let product = ProductRow {
        line: raw.line,
        title,
        handle,
        external_id,
        status,
        description,
        subtitle,
        prices,
        option_titles,
        variant: VariantRow {
            sku: check.field(fields::VARIANT_SKU, rules::text),
            title: check.field(fields::VARIANT_TITLE, rules::text),
            option_values,
            prices: variant_prices,
            manage_inventory,
            allow_backorder,
            inventory_quantity,
        },
        inventory,
        tags,
        collections,
        categories,
        sales_channels,
        images,
        thumbnail,
        metadata,
    };

    for rule in CROSS_FIELD_RULES {
        if let Some(issue) = rule(&product) {
            check.issues.push(issue);
        }
    }

    if check.issues.iter().any(ValidationIssue::is_error) {
        Err(check.issues)
    } else {
        Ok(ValidRow {
            product,
            warnings: check.issues,
        })
    }
}

// ---------------------------------------------------------------------------
// Field rules
// ---------------------------------------------------------------------------

fn status_rule(value: &Value) -> Result<Option<ProductStatus>, String> {
    match rules::token(value)? {
        None => Ok(None),
        Some(s) => ProductStatus::parse(&s)
            .map(Some)
            .ok_or_else(|| format!("status '{s}' must be one of: published, draft")),
    }
}

fn uom_rule(value: &Value) -> Result<Option<UnitOfMeasure>, String> {
    match rules::token(value)? {
        None => Ok(None),
        Some(s) => UnitOfMeasure::parse(&s).map(Some).ok_or_else(|| {
            format!(
                "unit of measure '{s}' must be one of: {}",
                UnitOfMeasure::ALL.join(", ")
            )
        }),
    }
}

fn backorder_rule(value: &Value) -> Result<Option<BackorderPolicy>, String> {
    match rules::token(value)? {
        None => Ok(None),
        Some(s) => BackorderPolicy::parse(&s).map(Some).ok_or_else(|| {
            format!(
                "backorder policy '{s}' must be one of: {}",
                BackorderPolicy::ALL.join(", ")
            )
        }),
    }
}

fn handle_rule(value: &Value) -> Result<Option<String>, String> {
    match rules::token(value)? {
        None => Ok(None),
        Some(h) if HANDLE.is_match(&h) => Ok(Some(h)),
        Some(h) => Err(format!(
            "handle '{h}' may only contain lowercase letters, digits, '-' and '_'"
        )),
    }
}

fn is_http_url(candidate: &str) -> bool {
    let lower = candidate.to_ascii_lowercase();
    ["http://", "https://"]
        .iter()
        .any(|scheme| lower.starts_with(scheme) && lower.len() > scheme.len())
}

// ---------------------------------------------------------------------------
// Cross-field rules
// ---------------------------------------------------------------------------

fn min_cut_is_multiple_of_increment(row: &ProductRow) -> Option<ValidationIssue> {
    let (Some(increment), Some(cut)) = (row.inventory.min_increment, row.inventory.min_cut) else {
        return None;
    };
    // A non-positive increment already failed its own field rule, which
    // leaves it unset, so the error lands on `min_increment` instead. This
    // branch only guards the division.
    if increment <= 0.0 {
        return Some(ValidationIssue::error(
            row.line,
            Some(fields::MIN_CUT),
            "min_increment must be greater than 0 when min_cut is set",
        ));
    }
    let ratio = cut / increment;
    if (ratio - ratio.round()).abs() > INCREMENT_TOLERANCE {
        return Some(ValidationIssue::error(
            row.line,
            Some(fields::MIN_CUT),
            format!("min_cut ({cut}) must be a whole multiple of min_increment ({increment})"),
        ));
    }
    None
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

struct RowCheck<'a> {
    raw: &'a RawRow,
    issues: Vec<ValidationIssue>,
}

impl RowCheck<'_> {
    fn error(&mut self, field: &str, message: impl Into<String>) {
        self.issues
            .push(ValidationIssue::error(self.raw.line, Some(field), message));
    }

    fn warning(&mut self, field: &str, message: impl Into<String>) {
        self.issues
            .push(ValidationIssue::warning(self.raw.line, Some(field), message));
    }

    /// Apply `rule` to `field`, recording a field-scoped error on failure.
    fn field<T>(&mut self, field: &str, rule: Rule<T>) -> Option<T> {
        let raw = self.raw;
        let value = raw.get(field)?;
        match rule(value) {
            Ok(parsed) => parsed,
            Err(message) => {
                self.error(field, format!("{field}: {message}"));
                None
            }
        }
    }

    fn list(&mut self, field: &str, split: fn(&Value) -> Vec<String>) -> Vec<String> {
        self.raw.get(field).map(split).unwrap_or_default()
    }

    /// Collect the base price column plus every `<base>_<cur>` column.
    fn prices(
        &mut self,
        base_field: &str,
        currency: &str,
        currency_of: fn(&str) -> Option<&str>,
    ) -> PriceList {
        let mut prices = PriceList::new();
        let raw = self.raw;

        let columns = raw
            .cells
            .iter()
            .filter_map(|(name, value)| {
                if name == base_field {
                    Some((name.as_str(), currency.to_string(), value))
                } else {
                    currency_of(name).map(|cur| (name.as_str(), cur.to_string(), value))
                }
            })
            .collect::<Vec<_>>();

        for (name, cur, value) in columns {
            match rules::money(value) {
                Money::Amount(amount) if amount < 0 => {
                    self.error(name, format!("{name}: amount must not be negative"));
                }
                Money::Amount(amount) => {
                    prices.insert(cur, amount);
                }
                Money::Empty => {}
                Money::Unparsable => {
                    self.warning(name, format!("{name}: unparsable amount {value} was dropped"));
                }
            }
        }
        prices
    }

    fn options(&mut self) -> (Vec<String>, Vec<String>) {
        let mut titles = Vec::with_capacity(MAX_OPTIONS);
        let mut values = Vec::with_capacity(MAX_OPTIONS);
        for (title_field, value_field) in OPTION_TITLES.iter().zip(OPTION_VALUES.iter()) {
            let title = self.field(title_field, rules::text);
            let value = self.field(value_field, rules::text);
            match (title, value) {
                (Some(t), Some(v)) => {
                    titles.push(t);
                    values.push(v);
                }
                (Some(_), None) => {
                    self.error(value_field, format!("{value_field} is required when {title_field} is set"));
                }
                (None, Some(_)) => {
                    self.error(title_field, format!("{title_field} is required when {value_field} is set"));
                }
                (None, None) => {}
            }
        }
        (titles, values)
    }

    fn image_urls(&mut self, images: &mut Vec<String>, thumbnail: &mut Option<String>) {
        let bad: Vec<String> = images.iter().filter(|u| !is_http_url(u)).cloned().collect();
        for url in bad {
            self.error(fields::IMAGES, format!("image '{url}' is not an http(s) URL"));
        }
        images.retain(|u| is_http_url(u));
        if let Some(url) = thumbnail.as_deref() {
            if !is_http_url(url) {
                self.error(fields::THUMBNAIL, format!("thumbnail '{url}' is not an http(s) URL"));
                *thumbnail = None;
            }
        }
    }

    /// JSON blob first, shorthand pairs on top, inventory policy namespaced
    /// under `inventory`.
    fn metadata(&mut self, inventory: &InventoryPolicy) -> Map<String, Value> {
        let raw = self.raw;
        let mut metadata = Map::new();

        if let Some(blob) = raw.get(fields::METADATA) {
            match rules::metadata_json(blob) {
                Some(map) => metadata.extend(map),
                None => self.warning(fields::METADATA, "metadata is not a JSON object and was ignored"),
            }
        }

        if let Some(pairs) = raw.get(fields::METADATA_KV).and_then(|v| rules::text(v).ok().flatten()) {
            metadata.extend(rules::metadata_pairs(&pairs));
        }

        if !inventory.is_empty() {
            let mut namespaced = match metadata.remove("inventory") {
                Some(Value::Object(existing)) => existing,
                _ => Map::new(),
            };
            namespaced.extend(inventory.to_metadata());
            metadata.insert("inventory".to_string(), Value::Object(namespaced));
        }

        metadata
    }
}
