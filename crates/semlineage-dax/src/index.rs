//! Model-wide measure lookup
//!
//! Measure names are treated as global across the model. When two tables
//! define the same name, the table parsed last wins and the clash is
//! reported as `DAX_AMBIGUOUS_MEASURE`.

use semlineage_core::{Diagnostic, DiagnosticCode, Model, Severity};
use std::collections::{BTreeMap, HashMap};

/// `measure name -> defining table`, built once per model
#[derive(Debug, Clone, Default)]
pub struct MeasureIndex {
    by_name: HashMap<String, String>,

    /// Lowercase name -> exact name, for DAX's case-insensitive lookups
    folded: HashMap<String, String>,

    /// Names defined by more than one table, with every defining table in
    /// model order
    duplicates: BTreeMap<String, Vec<String>>,
}

impl MeasureIndex {
    pub fn build(model: &Model) -> Self {
        let mut index = Self::default();
        let mut defined_in: HashMap<&str, Vec<&str>> = HashMap::new();

        for (table, measure) in model.measures() {
            defined_in.entry(measure.name.as_str()).or_default().push(table.name.as_str());
            index.by_name.insert(measure.name.clone(), table.name.clone());
            index.folded.insert(measure.name.to_lowercase(), measure.name.clone());
        }

        for (name, tables) in defined_in {
            if tables.len() > 1 {
                tracing::warn!(measure = name, tables = ?tables, "measure name defined in several tables");
                index
                    .duplicates
                    .insert(name.to_string(), tables.into_iter().map(str::to_string).collect());
            }
        }

        index
    }

    /// Exact measure name for a reference, matching case-insensitively when
    /// no exact match exists
    pub fn canonical_name<'a>(&'a self, name: &'a str) -> Option<&'a str> {
        if self.by_name.contains_key(name) {
            return Some(name);
        }
        self.folded.get(&name.to_lowercase()).map(String::as_str)
    }

    /// Table defining `name`
    pub fn table_of(&self, name: &str) -> Option<&str> {
        let canonical = self.canonical_name(name)?;
        self.by_name.get(canonical).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.canonical_name(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Names defined by more than one table
    pub fn ambiguous(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.duplicates.iter().map(|(name, tables)| (name.as_str(), tables.as_slice()))
    }

    /// One `DAX_AMBIGUOUS_MEASURE` diagnostic per clashing name
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.ambiguous()
            .map(|(name, tables)| {
                let winner = tables.last().map(String::as_str).unwrap_or_default();
                Diagnostic::new(
                    DiagnosticCode::DaxAmbiguousMeasure,
                    Severity::Warn,
                    format!(
                        "measure '{}' is defined in tables {}; references resolve to '{}'",
                        name,
                        tables.join(", "),
                        winner
                    ),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use semlineage_core::{Measure, Table};

    fn table(name: &str, measures: &[&str]) -> Table {
        let mut table = Table::new(name);
        for measure in measures {
            table.measures.push(Measure {
                name: measure.to_string(),
                expression: "1".to_string(),
                ..Default::default()
            });
        }
        table
    }

    #[test]
    fn lookup_and_case_folding() {
        let model = Model {
            tables: vec![table("Sales", &["Total Sales", "Margin"])],
            ..Default::default()
        };
        let index = MeasureIndex::build(&model);

        assert_eq!(index.len(), 2);
        assert_eq!(index.table_of("Margin"), Some("Sales"));
        assert_eq!(index.table_of("total sales"), Some("Sales"));
        assert_eq!(index.canonical_name("MARGIN"), Some("Margin"));
        assert!(!index.contains("Missing"));
        assert!(index.diagnostics().is_empty());
    }

    #[test]
    fn last_table_wins_for_duplicate_names() {
        let model = Model {
            tables: vec![table("Budget", &["Total"]), table("Sales", &["Total"])],
            ..Default::default()
        };
        let index = MeasureIndex::build(&model);

        assert_eq!(index.table_of("Total"), Some("Sales"));

        let diagnostics = index.diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert_eq!(diagnostics[0].code, DiagnosticCode::DaxAmbiguousMeasure);
        assert!(diagnostics[0].message.contains("Budget, Sales"));
    }
}
