//! TMDL project parsing
//!
//! This crate handles:
//! - Classifying project files (`database.tmdl`, `tables/*.tmdl`, ...)
//! - The indentation-driven table state machine (columns, measures,
//!   hierarchies, partitions, calculation groups)
//! - Relationship, role and shared-expression scanners
//! - Collecting recoverable problems as diagnostics instead of failing
//!
//! Parsing is a pure function of the input snapshot: every call builds a
//! fresh [`ParseSession`], and nothing survives between calls.

mod expressions;
mod header;
mod lines;
mod relationships;
mod roles;
mod table;

use std::collections::BTreeMap;

use semlineage_core::{Diagnostic, DiagnosticCode, Location, Model, Severity, Table};

use crate::lines::WarningSink;

/// Role of a file inside a TMDL project folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Database,
    Model,
    Relationships,
    Expressions,
    Table,
    Role,
    Unsupported,
}

impl FileKind {
    /// Classify a logical path; `\` separators are accepted
    pub fn classify(path: &str) -> Self {
        let normalized = path.replace('\\', "/").to_lowercase();
        let mut segments = normalized.rsplit('/');
        let file = segments.next().unwrap_or("");
        let parent = segments.next().unwrap_or("");

        if !file.ends_with(".tmdl") {
            return Self::Unsupported;
        }

        match file {
            "database.tmdl" => Self::Database,
            "model.tmdl" => Self::Model,
            "relationships.tmdl" => Self::Relationships,
            "expressions.tmdl" => Self::Expressions,
            _ => match parent {
                "tables" => Self::Table,
                "roles" => Self::Role,
                _ => Self::Unsupported,
            },
        }
    }
}

/// Result of parsing a project: a best-effort model plus recoverable problems
#[derive(Debug, Clone, Default)]
pub struct ParsedModel {
    pub model: Model,
    pub warnings: Vec<Diagnostic>,
}

/// Short-lived accumulator for one parse of one project snapshot
#[derive(Debug, Default)]
pub struct ParseSession {
    model: Model,
    tables: Vec<Table>,
    warnings: Vec<Diagnostic>,
}

impl ParseSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one file into the session
    pub fn add_file(&mut self, path: &str, text: &str) {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let kind = FileKind::classify(path);
        tracing::debug!(file = path, kind = ?kind, "parsing TMDL file");

        match kind {
            FileKind::Database => header::parse_database(text, &mut self.model),
            FileKind::Model => header::parse_model(text, &mut self.model),
            FileKind::Relationships => {
                let sink = WarningSink::new(path, &mut self.warnings);
                let parsed = relationships::parse_relationships(text, sink);
                self.model.relationships.extend(parsed);
            }
            FileKind::Expressions => {
                let sink = WarningSink::new(path, &mut self.warnings);
                let parsed = expressions::parse_expressions(text, sink);
                self.model.expressions.extend(parsed);
            }
            FileKind::Role => {
                let sink = WarningSink::new(path, &mut self.warnings);
                let parsed = roles::parse_roles(text, sink);
                self.model.roles.extend(parsed);
            }
            FileKind::Table => {
                let sink = WarningSink::new(path, &mut self.warnings);
                for parsed in table::parse_table_file(text, sink) {
                    self.add_table(parsed, path);
                }
            }
            FileKind::Unsupported => {
                self.warnings.push(
                    Diagnostic::new(
                        DiagnosticCode::TmdlUnsupportedFile,
                        Severity::Info,
                        format!("'{}' is not a recognized TMDL file; skipped", path),
                    )
                    .with_location(Location::new(path)),
                );
            }
        }
    }

    fn add_table(&mut self, table: Table, path: &str) {
        if self.tables.iter().any(|t| t.name == table.name) {
            tracing::warn!(table = %table.name, file = path, "duplicate table declaration ignored");
            self.warnings.push(
                Diagnostic::new(
                    DiagnosticCode::TmdlDuplicateTable,
                    Severity::Warn,
                    format!("table '{}' is already declared; keeping the first declaration", table.name),
                )
                .with_location(Location::new(path)),
            );
            return;
        }
        self.tables.push(table);
    }

    /// Assemble the model; tables are ordered by name
    pub fn finish(mut self) -> ParsedModel {
        self.tables.sort_by(|a, b| {
            a.name
                .to_lowercase()
                .cmp(&b.name.to_lowercase())
                .then_with(|| a.name.cmp(&b.name))
        });
        self.model.tables = self.tables;

        tracing::debug!(
            tables = self.model.tables.len(),
            relationships = self.model.relationships.len(),
            roles = self.model.roles.len(),
            expressions = self.model.expressions.len(),
            warnings = self.warnings.len(),
            "TMDL project parsed"
        );

        ParsedModel {
            model: self.model,
            warnings: self.warnings,
        }
    }
}

/// Parse a `path -> text` snapshot of a TMDL project
///
/// Files are processed in path order so the result does not depend on the
/// iteration order of the input.
pub fn parse_project<I, P, T>(files: I) -> ParsedModel
where
    I: IntoIterator<Item = (P, T)>,
    P: Into<String>,
    T: AsRef<str>,
{
    let sorted: BTreeMap<String, T> = files.into_iter().map(|(path, text)| (path.into(), text)).collect();

    let mut session = ParseSession::new();
    for (path, text) in &sorted {
        session.add_file(path, text.as_ref());
    }
    session.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_classification() {
        assert_eq!(FileKind::classify("database.tmdl"), FileKind::Database);
        assert_eq!(FileKind::classify("definition/model.tmdl"), FileKind::Model);
        assert_eq!(FileKind::classify("tables/Sales.tmdl"), FileKind::Table);
        assert_eq!(FileKind::classify("definition\\tables\\Sales.tmdl"), FileKind::Table);
        assert_eq!(FileKind::classify("roles/Reader.tmdl"), FileKind::Role);
        assert_eq!(FileKind::classify("cultures/en-US.tmdl"), FileKind::Unsupported);
        assert_eq!(FileKind::classify("tables/Sales.json"), FileKind::Unsupported);
    }

    #[test]
    fn tables_are_sorted_and_deduplicated() {
        let parsed = parse_project(vec![
            ("tables/b.tmdl", "table sales\n\tcolumn A\n"),
            ("tables/a.tmdl", "table Date\n\tcolumn Date\n"),
            ("tables/c.tmdl", "table sales\n\tcolumn B\n"),
        ]);

        let names: Vec<_> = parsed.model.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["Date", "sales"]);
        assert_eq!(parsed.model.tables[1].columns[0].name, "A");

        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.warnings[0].code, DiagnosticCode::TmdlDuplicateTable);
        assert_eq!(parsed.warnings[0].file(), Some("tables/c.tmdl"));
    }

    #[test]
    fn unsupported_files_are_informational() {
        let parsed = parse_project(vec![("cultures/en-US.tmdl", "cultureInfo en-US\n")]);
        assert!(parsed.model.tables.is_empty());
        assert_eq!(parsed.warnings[0].code, DiagnosticCode::TmdlUnsupportedFile);
        assert_eq!(parsed.warnings[0].severity, Severity::Info);
    }

    #[test]
    fn byte_order_mark_is_ignored() {
        let parsed = parse_project(vec![("database.tmdl", "\u{feff}database Contoso\n")]);
        assert_eq!(parsed.model.database.name, "Contoso");
    }
}
