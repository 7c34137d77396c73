//! Issue types and the single-value rules the row validator composes.
//!
//! Each rule is a pure function from one cell value to a typed result.
//! `Ok(None)` means the cell is absent or empty.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Whether an issue excludes the row or is informational.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// A problem found while validating one row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationIssue {
    pub row_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
    pub severity: Severity,
}

impl ValidationIssue {
    pub fn error(row_index: usize, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            row_index,
            field: field.map(str::to_string),
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(row_index: usize, field: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            row_index,
            field: field.map(str::to_string),
            message: message.into(),
            severity: Severity::Warning,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

/// A rule over one cell value.
pub type Rule<T> = fn(&Value) -> Result<Option<T>, String>;

/// Leading symbols stripped from monetary strings.
const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£'];

/// Tokens accepted as `true` by [`boolean`].
const TRUTHY: &[&str] = &["true", "1", "yes", "y"];

/// Tokens accepted as `false` by [`boolean`].
const FALSY: &[&str] = &["false", "0", "no", "n"];

/// Trimmed text; numbers and booleans are rendered, empty strings are absent.
pub fn text(value: &Value) -> Result<Option<String>, String> {
    Ok(match value {
        Value::Null => None,
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_) | Value::Object(_) => return Err("must be a plain value".into()),
    })
}

/// Trimmed, lowercased text.
pub fn token(value: &Value) -> Result<Option<String>, String> {
    Ok(text(value)?.map(|s| s.to_lowercase()))
}

/// 3-letter lowercase currency code.
pub fn currency_code(value: &Value) -> Result<Option<String>, String> {
    match token(value)? {
        None => Ok(None),
        Some(code) if code.len() == 3 && code.chars().all(|c| c.is_ascii_lowercase()) => {
            Ok(Some(code))
        }
        Some(code) => Err(format!(
            "currency code '{code}' must be a 3-letter ISO code"
        )),
    }
}

/// Boolean from a bool, a number (0 / non-zero) or a truthy/falsy token.
pub fn boolean(value: &Value) -> Result<Option<bool>, String> {
    match value {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => Ok(Some(n.as_f64().map(|f| f != 0.0).unwrap_or(true))),
        _ => match token(value)? {
            None => Ok(None),
            Some(t) if TRUTHY.contains(&t.as_str()) => Ok(Some(true)),
            Some(t) if FALSY.contains(&t.as_str()) => Ok(Some(false)),
            Some(t) => Err(format!(
                "'{t}' is not a boolean (expected one of true/false/1/0/yes/no/y/n)"
            )),
        },
    }
}

/// Decimal number, tolerant of thousands separators in strings.
pub fn number(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| "is not a finite number".to_string()),
        _ => match text(value)? {
            None => Ok(None),
            Some(s) => strip_separators(&s)
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Some)
                .ok_or_else(|| format!("'{s}' is not a number")),
        },
    }
}

/// Number that must be strictly greater than zero.
pub fn positive_number(value: &Value) -> Result<Option<f64>, String> {
    match number(value)? {
        Some(n) if n <= 0.0 => Err(format!("must be greater than 0, got {n}")),
        other => Ok(other),
    }
}

/// Number that must be zero or greater.
pub fn non_negative_number(value: &Value) -> Result<Option<f64>, String> {
    match number(value)? {
        Some(n) if n < 0.0 => Err(format!("must not be negative, got {n}")),
        other => Ok(other),
    }
}

/// Whole number that must be zero or greater.
pub fn non_negative_integer(value: &Value) -> Result<Option<i64>, String> {
    match non_negative_number(value)? {
        None => Ok(None),
        Some(n) if n.fract() == 0.0 => Ok(Some(n as i64)),
        Some(n) => Err(format!("must be a whole number, got {n}")),
    }
}

/// Outcome of parsing a monetary cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Money {
    /// Amount in minor units (cents).
    Amount(i64),
    Empty,
    /// Present but not a recognisable amount; dropped rather than zeroed.
    Unparsable,
}

/// Parse a monetary cell into integer minor units.
///
/// Strings may carry thousands separators and a leading currency symbol;
/// amounts are rounded half away from zero to the nearest cent.
pub fn money(value: &Value) -> Money {
    let rendered = match value {
        Value::Null => return Money::Empty,
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        _ => return Money::Unparsable,
    };
    if rendered.trim().is_empty() {
        return Money::Empty;
    }
    match minor_units(&rendered) {
        Some(amount) => Money::Amount(amount),
        None => Money::Unparsable,
    }
}

fn strip_separators(raw: &str) -> String {
    raw.chars()
        .filter(|c| !matches!(c, ',' | '_' | ' ' | '\u{a0}'))
        .collect()
}

fn minor_units(raw: &str) -> Option<i64> {
    let cleaned = strip_separators(raw.trim());
    let cleaned = cleaned.trim_start_matches(CURRENCY_SYMBOLS);
    let (negative, digits) = match cleaned.strip_prefix('-') {
        Some(rest) => (true, rest.trim_start_matches(CURRENCY_SYMBOLS)),
        None => (false, cleaned),
    };

    // Scientific notation shows up when spreadsheets hand us floats.
    if digits.contains(&['e', 'E'][..]) {
        let f: f64 = digits.parse().ok()?;
        if !f.is_finite() {
            return None;
        }
        let cents = (f * 100.0).round();
        if cents.abs() > i64::MAX as f64 {
            return None;
        }
        let cents = cents as i64;
        return Some(if negative { -cents } else { cents });
    }

    let (int_part, frac_part) = digits.split_once('.').unwrap_or((digits, ""));
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().all(|c| c.is_ascii_digit()) || !frac_part.chars().all(|c| c.is_ascii_digit())
    {
        return None;
    }

    let whole: i64 = if int_part.is_empty() {
        0
    } else {
        int_part.parse().ok()?
    };
    let mut frac = frac_part.chars().filter_map(|c| c.to_digit(10)).map(i64::from);
    let tenths = frac.next().unwrap_or(0);
    let hundredths = frac.next().unwrap_or(0);
    let thousandths = frac.next().unwrap_or(0);

    let mut cents = whole.checked_mul(100)?.checked_add(tenths * 10 + hundredths)?;
    if thousandths >= 5 {
        cents = cents.checked_add(1)?;
    }
    Some(if negative { -cents } else { cents })
}

/// Split on commas and semicolons, trimming and dropping empty entries.
pub fn list(value: &Value) -> Vec<String> {
    split_with(value, &[',', ';'])
}

/// Split on semicolons only (commas are legal inside a channel name).
pub fn semicolon_list(value: &Value) -> Vec<String> {
    split_with(value, &[';'])
}

fn split_with(value: &Value, separators: &[char]) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|v| text(v).ok().flatten())
            .collect(),
        Value::String(s) => s
            .split(separators)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        Value::Number(n) => vec![n.to_string()],
        _ => Vec::new(),
    }
}

/// Lenient JSON object parse. `None` when the blob is not a JSON object.
pub fn metadata_json(value: &Value) -> Option<Map<String, Value>> {
    match value {
        Value::Object(map) => Some(map.clone()),
        Value::String(s) if s.trim().is_empty() => Some(Map::new()),
        Value::String(s) => match serde_json::from_str::<Value>(s) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        Value::Null => Some(Map::new()),
        _ => None,
    }
}

/// Parse `key=value;key=value` shorthand. Pairs without `=` or with an
/// empty key are ignored.
pub fn metadata_pairs(raw: &str) -> Map<String, Value> {
    raw.split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), Value::String(value.trim().to_string())))
        })
        .collect()
}
