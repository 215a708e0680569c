//! Visual field-usage input
//!
//! Produced by a report-layout reader outside this workspace; the engine only
//! consumes it.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    Measure,
    Column,
    Hierarchy,
}

/// One field bound to a visual
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRef {
    #[serde(rename = "type")]
    pub kind: FieldKind,

    pub table: String,

    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection_name: Option<String>,
}

impl FieldRef {
    pub fn measure(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(FieldKind::Measure, table, name)
    }

    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(FieldKind::Column, table, name)
    }

    pub fn hierarchy(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(FieldKind::Hierarchy, table, name)
    }

    fn new(kind: FieldKind, table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            name: name.into(),
            projection_name: None,
        }
    }
}

/// Fields used by one visual on one report page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualUsage {
    pub page_name: String,
    pub visual_name: String,

    #[serde(default)]
    pub visual_type: String,

    #[serde(default)]
    pub fields: Vec<FieldRef>,
}

impl VisualUsage {
    /// Cache and lookup key, `page|visual`
    pub fn key(&self) -> String {
        format!("{}|{}", self.page_name, self.visual_name)
    }

    /// Parse a JSON array of visuals
    pub fn from_json(json: &str) -> Result<Vec<Self>, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Load a JSON array of visuals from disk
    pub fn from_file(path: &Path) -> Result<Vec<Self>, VisualLoadError> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }
}

/// Visual usage loading errors
#[derive(Debug, thiserror::Error)]
pub enum VisualLoadError {
    #[error("Failed to read visual usage file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse visual usage JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_usage_json() {
        let visuals = VisualUsage::from_json(
            r#"[{
                "pageName": "Overview",
                "visualName": "Card",
                "visualType": "card",
                "fields": [
                    {"type": "measure", "table": "Sales", "name": "Total", "projectionName": "Sales.Total"},
                    {"type": "hierarchy", "table": "Date", "name": "Calendar"}
                ]
            }]"#,
        )
        .unwrap();

        assert_eq!(visuals.len(), 1);
        assert_eq!(visuals[0].key(), "Overview|Card");
        assert_eq!(visuals[0].fields[0].kind, FieldKind::Measure);
        assert_eq!(visuals[0].fields[0].projection_name.as_deref(), Some("Sales.Total"));
        assert_eq!(visuals[0].fields[1], FieldRef::hierarchy("Date", "Calendar"));
    }

    #[test]
    fn rejects_unknown_field_kinds() {
        let result = VisualUsage::from_json(
            r#"[{"pageName": "P", "visualName": "V", "fields": [{"type": "filter", "table": "T", "name": "N"}]}]"#,
        );
        assert!(result.is_err());
    }
}
