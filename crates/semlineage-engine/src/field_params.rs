//! Field-parameter table detection
//!
//! A field parameter is a calculated table whose rows name other fields via
//! `NAMEOF`, e.g. `("Sales", NAMEOF('Sales'[Total Sales]), 0)`. There is no
//! schema flag for it, so tables are recognized by `NAMEOF` in a partition
//! source or a calculated column.

use regex::Regex;
use semlineage_core::{ColumnRef, Table};
use std::sync::OnceLock;

/// One row of a field-parameter table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldParameterItem {
    /// Display label (first tuple element)
    pub label: String,

    /// `NAMEOF` target; may name a measure rather than a column
    pub target: ColumnRef,

    pub ordinal: Option<i64>,
}

fn nameof_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bNAMEOF\s*\(").expect("valid regex"))
}

fn item_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)\(\s*"((?:[^"]|"")*)"\s*,\s*NAMEOF\s*\(\s*(?:'((?:[^']|'')+)'|([\p{L}_][\p{L}\p{N}_]*))\s*\[((?:[^\]]|\]\])+)\]\s*\)\s*(?:,\s*(-?\d+))?"#,
        )
        .expect("valid regex")
    })
}

/// True when the table looks like a field parameter
pub fn is_field_parameter(table: &Table) -> bool {
    let re = nameof_regex();
    table.partitions.iter().any(|p| re.is_match(&p.source))
        || table
            .columns
            .iter()
            .filter_map(|c| c.expression.as_deref())
            .any(|e| re.is_match(e))
}

/// Rows of a field-parameter table, in source order
pub fn field_parameter_items(table: &Table) -> Vec<FieldParameterItem> {
    table
        .partitions
        .iter()
        .map(|p| p.source.as_str())
        .chain(table.columns.iter().filter_map(|c| c.expression.as_deref()))
        .flat_map(|text| item_regex().captures_iter(text))
        .filter_map(|caps| {
            let table = match (caps.get(2), caps.get(3)) {
                (Some(quoted), _) => quoted.as_str().replace("''", "'"),
                (None, Some(bare)) => bare.as_str().to_string(),
                _ => return None,
            };
            Some(FieldParameterItem {
                label: caps[1].replace("\"\"", "\""),
                target: ColumnRef::new(table, caps[4].replace("]]", "]")),
                ordinal: caps.get(5).and_then(|m| m.as_str().parse().ok()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use semlineage_core::Partition;

    fn calculated(source: &str) -> Table {
        let mut table = Table::new("Metric Selector");
        table.partitions.push(Partition {
            name: "Metric Selector".to_string(),
            source_type: Some("calculated".to_string()),
            source: source.to_string(),
            ..Default::default()
        });
        table
    }

    #[test]
    fn detects_and_parses_items() {
        let table = calculated(
            "{\n    (\"Sales\", NAMEOF('Sales'[Total Sales]), 0),\n    (\"Say \"\"hi\"\"\", nameof(Customer[Country]), 1)\n}",
        );

        assert!(is_field_parameter(&table));
        assert_eq!(
            field_parameter_items(&table),
            vec![
                FieldParameterItem {
                    label: "Sales".to_string(),
                    target: ColumnRef::new("Sales", "Total Sales"),
                    ordinal: Some(0),
                },
                FieldParameterItem {
                    label: "Say \"hi\"".to_string(),
                    target: ColumnRef::new("Customer", "Country"),
                    ordinal: Some(1),
                },
            ]
        );
    }

    #[test]
    fn ordinary_calculated_tables_are_not_field_parameters() {
        let table = calculated("CALENDAR(DATE(2020, 1, 1), DATE(2030, 12, 31))");
        assert!(!is_field_parameter(&table));
        assert!(field_parameter_items(&table).is_empty());
    }
}
