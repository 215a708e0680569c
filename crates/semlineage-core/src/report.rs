//! Analysis report schema (stable v1)
//!
//! This schema is STABLE and VERSIONED.
//! Breaking changes require a new version.

use serde::{Deserialize, Serialize};
use crate::config::SeverityThreshold;
use crate::diagnostic::{Diagnostic, Severity};
use crate::model::Model;
use crate::source::{DataSource, GatewayRequirement};

/// Report schema version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportVersion {
    /// Major version (breaking changes)
    pub major: u32,

    /// Minor version (backward-compatible additions)
    pub minor: u32,
}

impl ReportVersion {
    /// Current report schema version
    pub const CURRENT: ReportVersion = ReportVersion { major: 1, minor: 0 };
}

impl std::fmt::Display for ReportVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Summary statistics for a report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub tables: usize,
    pub columns: usize,
    pub measures: usize,
    pub relationships: usize,
    pub roles: usize,
    pub expressions: usize,
    pub data_sources: usize,

    /// Data sources that need an on-premises gateway
    pub gateway_sources: usize,

    /// Total number of diagnostics
    pub total: usize,

    /// Number of errors
    pub errors: usize,

    /// Number of warnings
    pub warnings: usize,

    /// Number of info messages
    pub info: usize,
}

/// Analysis report (report.json v1)
///
/// This is the stable output format.
/// All fields are versioned and backward-compatible.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Schema version
    pub version: ReportVersion,

    /// Timestamp (ISO 8601)
    pub timestamp: String,

    /// Model name (from `database.tmdl`)
    pub model_name: String,

    /// Summary statistics
    pub summary: ReportSummary,

    /// All diagnostics
    pub diagnostics: Vec<Diagnostic>,

    /// Deduplicated data sources
    pub data_sources: Vec<DataSource>,

    /// Metadata
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl AnalysisReport {
    /// Build a report for a parsed model
    ///
    /// Severity overrides are applied to every diagnostic before counting.
    pub fn new(
        model: &Model,
        diagnostics: Vec<Diagnostic>,
        data_sources: Vec<DataSource>,
        severity: &SeverityThreshold,
    ) -> Self {
        let mut report = Self {
            version: ReportVersion::CURRENT,
            timestamp: chrono::Utc::now().to_rfc3339(),
            model_name: model.database.name.clone(),
            summary: ReportSummary {
                tables: model.tables.len(),
                columns: model.column_count(),
                measures: model.measure_count(),
                relationships: model.relationships.len(),
                roles: model.roles.len(),
                expressions: model.expressions.len(),
                data_sources: data_sources.len(),
                gateway_sources: data_sources
                    .iter()
                    .filter(|s| s.gateway_required == GatewayRequirement::Required)
                    .count(),
                ..Default::default()
            },
            diagnostics: Vec::new(),
            data_sources,
            metadata: None,
        };

        for mut diagnostic in diagnostics {
            diagnostic.severity = severity.get_severity(diagnostic.code, diagnostic.severity);
            report.add_diagnostic(diagnostic);
        }

        report
    }

    /// Add a diagnostic to the report
    pub fn add_diagnostic(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.summary.errors += 1,
            Severity::Warn => self.summary.warnings += 1,
            Severity::Info => self.summary.info += 1,
        }

        self.summary.total += 1;
        self.diagnostics.push(diagnostic);
    }

    /// Check if the report has any errors
    pub fn has_errors(&self) -> bool {
        self.summary.errors > 0
    }

    /// Replace location values of every data source with placeholders
    pub fn redact(&mut self) {
        self.data_sources = self.data_sources.iter().map(DataSource::redacted).collect();
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Save to file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let json = self.to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticCode;
    use crate::model::Table;
    use crate::source::SourceType;

    fn sample_model() -> Model {
        let mut model = Model::default();
        model.database.name = "Contoso".to_string();
        model.tables.push(Table::new("Sales"));
        model
    }

    #[test]
    fn empty_report() {
        let report = AnalysisReport::new(&sample_model(), Vec::new(), Vec::new(), &SeverityThreshold::default());
        assert_eq!(report.version, ReportVersion::CURRENT);
        assert_eq!(report.summary.tables, 1);
        assert_eq!(report.summary.total, 0);
        assert!(!report.has_errors());
    }

    #[test]
    fn severity_overrides_are_applied() {
        let diagnostics = vec![
            Diagnostic::new(DiagnosticCode::TmdlOrphanObject, Severity::Warn, "orphan level"),
            Diagnostic::new(DiagnosticCode::Info, Severity::Info, "All good"),
        ];
        let mut severity = SeverityThreshold::default();
        severity.set_override(DiagnosticCode::TmdlOrphanObject, Severity::Error);

        let report = AnalysisReport::new(&sample_model(), diagnostics, Vec::new(), &severity);
        assert_eq!(report.summary.total, 2);
        assert_eq!(report.summary.errors, 1);
        assert_eq!(report.summary.info, 1);
        assert!(report.has_errors());
    }

    #[test]
    fn gateway_sources_are_counted() {
        let mut on_prem = DataSource::new(SourceType::SqlServer);
        on_prem.server = Some("CORP-SQL01".to_string());
        on_prem.gateway_required = GatewayRequirement::Required;
        let cloud = DataSource::new(SourceType::BigQuery);

        let mut report = AnalysisReport::new(
            &sample_model(),
            Vec::new(),
            vec![on_prem, cloud],
            &SeverityThreshold::default(),
        );
        assert_eq!(report.summary.data_sources, 2);
        assert_eq!(report.summary.gateway_sources, 1);

        report.redact();
        assert_eq!(report.data_sources[0].server.as_deref(), Some("***"));
    }

    #[test]
    fn report_serialization() {
        let report = AnalysisReport::new(&sample_model(), Vec::new(), Vec::new(), &SeverityThreshold::default());
        let json = report.to_json().unwrap();
        assert!(json.contains("\"version\""));
        assert!(json.contains("\"diagnostics\""));
        assert!(json.contains("\"Contoso\""));
    }
}
