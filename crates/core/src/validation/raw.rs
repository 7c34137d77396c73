//! The untyped, column-mapped row handed to the validator.

use serde_json::{Map, Value};

/// One spreadsheet record after column mapping and before validation.
///
/// Cells stay as loosely typed JSON values; only the validator interprets
/// them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    /// 1-based line number in the source file (the header is line 1).
    pub line: usize,
    pub cells: Map<String, Value>,
}

impl RawRow {
    /// Build a row from `(canonical_field, value)` pairs in column order.
    ///
    /// When two columns map to the same field the later column wins.
    pub fn from_cells<I>(line: usize, cells: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut map = Map::new();
        for (field, value) in cells {
            map.insert(field, value);
        }
        Self { line, cells: map }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.cells.get(field)
    }

    /// A row is blank when no cell carries a non-empty value.
    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| match v {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duplicate_fields_last_write_wins() {
        let row = RawRow::from_cells(
            2,
            vec![
                ("retail_price".to_string(), json!("10.00")),
                ("title".to_string(), json!("Linen")),
                ("retail_price".to_string(), json!("12.50")),
            ],
        );
        assert_eq!(row.get("retail_price"), Some(&json!("12.50")));
        assert_eq!(row.cells.len(), 2);
    }

    #[test]
    fn blank_detection() {
        let blank = RawRow::from_cells(
            3,
            vec![
                ("title".to_string(), json!("  ")),
                ("handle".to_string(), Value::Null),
            ],
        );
        assert!(blank.is_blank());

        let filled = RawRow::from_cells(4, vec![("tags".to_string(), json!("a"))]);
        assert!(!filled.is_blank());

        let numeric = RawRow::from_cells(5, vec![("min_cut".to_string(), json!(0))]);
        assert!(!numeric.is_blank());
    }
}
