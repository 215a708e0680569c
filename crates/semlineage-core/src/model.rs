//! Semantic model types
//!
//! A `Model` is assembled once from a project snapshot by the TMDL parser and
//! is treated as immutable afterwards. Relationship endpoints and DAX/M
//! references are best-effort names; nothing here guarantees they resolve.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::OnceLock;

/// A parsed semantic model
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// `database.tmdl` header
    pub database: DatabaseInfo,

    /// `model.tmdl` header
    pub model: ModelInfo,

    /// Tables, ordered by name
    pub tables: Vec<Table>,

    pub relationships: Vec<Relationship>,

    pub roles: Vec<Role>,

    /// Shared (model-level) expressions, including parameter queries
    pub expressions: Vec<Expression>,
}

impl Model {
    /// Find a table by exact name
    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// Find a shared expression by exact name
    pub fn expression(&self, name: &str) -> Option<&Expression> {
        self.expressions.iter().find(|e| e.name == name)
    }

    /// Iterate every measure together with its defining table
    pub fn measures(&self) -> impl Iterator<Item = (&Table, &Measure)> {
        self.tables
            .iter()
            .flat_map(|table| table.measures.iter().map(move |measure| (table, measure)))
    }

    /// Total number of columns across all tables
    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Total number of measures across all tables
    pub fn measure_count(&self) -> usize {
        self.tables.iter().map(|t| t.measures.len()).sum()
    }
}

/// Database header (`database 'Name'`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    pub name: String,

    #[serde(default)]
    pub compatibility_level: Option<u32>,
}

/// Model header (`model Model`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelInfo {
    pub name: String,

    #[serde(default)]
    pub culture: Option<String>,

    /// Every other `key: value` property of the model header
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
}

/// A table with its child objects
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    /// Unique within the model
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub is_hidden: bool,

    #[serde(default)]
    pub lineage_tag: Option<String>,

    #[serde(default)]
    pub columns: Vec<Column>,

    #[serde(default)]
    pub measures: Vec<Measure>,

    #[serde(default)]
    pub hierarchies: Vec<Hierarchy>,

    #[serde(default)]
    pub partitions: Vec<Partition>,

    /// Present only for calculation-group tables
    #[serde(default)]
    pub calculation_group: Option<CalculationGroup>,
}

impl Table {
    /// Create an empty table with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }

    pub fn hierarchy(&self, name: &str) -> Option<&Hierarchy> {
        self.hierarchies.iter().find(|h| h.name == name)
    }

    pub fn is_calculation_group(&self) -> bool {
        self.calculation_group.is_some()
    }
}

/// A data or calculated column
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    pub name: String,

    #[serde(default)]
    pub data_type: Option<String>,

    #[serde(default)]
    pub format_string: Option<String>,

    #[serde(default)]
    pub is_hidden: bool,

    #[serde(default)]
    pub source_column: Option<String>,

    #[serde(default)]
    pub summarize_by: Option<String>,

    /// DAX text of a calculated column
    #[serde(default)]
    pub expression: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub display_folder: Option<String>,

    #[serde(default)]
    pub data_category: Option<String>,

    #[serde(default)]
    pub sort_by_column: Option<String>,

    #[serde(default)]
    pub lineage_tag: Option<String>,
}

impl Column {
    pub fn is_calculated(&self) -> bool {
        self.expression.is_some()
    }
}

/// A DAX measure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Measure {
    pub name: String,

    /// DAX expression text (dedented)
    pub expression: String,

    #[serde(default)]
    pub display_folder: Option<String>,

    #[serde(default)]
    pub format_string: Option<String>,

    #[serde(default)]
    pub data_category: Option<String>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub is_hidden: bool,

    #[serde(default)]
    pub lineage_tag: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hierarchy {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub is_hidden: bool,

    /// Levels in ordinal order
    #[serde(default)]
    pub levels: Vec<Level>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Level {
    pub name: String,

    /// Name of the column (same table) backing this level
    pub column: String,

    pub ordinal: usize,
}

/// A table partition and its source query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Partition {
    pub name: String,

    /// Storage mode (`import`, `directQuery`, `dual`...)
    #[serde(default)]
    pub mode: Option<String>,

    /// M (or DAX, for calculated partitions) source text
    #[serde(default)]
    pub source: String,

    /// Header kind: `m`, `calculated`, `entity`...
    #[serde(default)]
    pub source_type: Option<String>,
}

impl Partition {
    /// True for partitions whose source is Power Query M
    pub fn is_m_source(&self) -> bool {
        match self.source_type.as_deref() {
            None => true,
            Some(kind) => kind.eq_ignore_ascii_case("m"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationGroup {
    #[serde(default)]
    pub precedence: Option<i64>,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub items: Vec<CalculationItem>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalculationItem {
    pub name: String,

    /// DAX text applied to `SELECTEDMEASURE()`
    pub expression: String,

    #[serde(default)]
    pub ordinal: Option<i64>,

    #[serde(default)]
    pub format_string_definition: Option<String>,
}

/// Relationship cardinality on one side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

impl Cardinality {
    /// Parse a TMDL cardinality keyword, case-insensitively
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "one" => Some(Self::One),
            "many" => Some(Self::Many),
            _ => None,
        }
    }
}

impl std::fmt::Display for Cardinality {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::One => write!(f, "one"),
            Self::Many => write!(f, "many"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Relationship {
    pub id: String,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
    pub from_cardinality: Cardinality,
    pub to_cardinality: Cardinality,
    pub cross_filtering_behavior: String,
    pub is_active: bool,
}

impl Relationship {
    /// A relationship with TMDL defaults (many-to-one, single direction, active)
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            from_table: String::new(),
            from_column: String::new(),
            to_table: String::new(),
            to_column: String::new(),
            from_cardinality: Cardinality::Many,
            to_cardinality: Cardinality::One,
            cross_filtering_behavior: "oneDirection".to_string(),
            is_active: true,
        }
    }
}

/// A security role
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub name: String,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub model_permission: Option<String>,

    #[serde(default)]
    pub table_permissions: Vec<TablePermission>,
}

/// Row-level filter of a role on one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TablePermission {
    pub table: String,
    pub filter_expression: String,
}

/// A shared expression (`expressions.tmdl`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expression {
    pub name: String,

    /// Expression language, `m` unless stated otherwise
    pub kind: String,

    pub expression: String,

    #[serde(default)]
    pub description: Option<String>,
}

impl Expression {
    /// True when the body carries the `IsParameterQuery = true` meta marker
    pub fn is_parameter_query(&self) -> bool {
        static MARKER: OnceLock<Regex> = OnceLock::new();
        let re = MARKER.get_or_init(|| {
            Regex::new(r"(?i)IsParameterQuery\s*=\s*true").expect("valid regex")
        });
        re.is_match(&self.expression)
    }

    /// Literal value of a text parameter query
    ///
    /// Returns `Some` only for parameter queries whose body is a single quoted
    /// string literal (optionally followed by its `meta [...]` record).
    pub fn parameter_literal(&self) -> Option<String> {
        if !self.is_parameter_query() {
            return None;
        }

        static LITERAL: OnceLock<Regex> = OnceLock::new();
        let re = LITERAL.get_or_init(|| {
            Regex::new(r#"(?s)^\s*"((?:[^"]|"")*)"\s*(?:meta\s*\[.*\])?\s*$"#).expect("valid regex")
        });

        re.captures(&self.expression)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().replace("\"\"", "\""))
    }
}

/// A `Table[Column]` reference
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[{}]", self.table, self.column)
    }
}
