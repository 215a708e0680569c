//! SemLineage Core
//!
//! Core domain model for Power BI semantic-model lineage with stable types.
//! Never rename diagnostic codes - they are part of the public API.

pub mod diagnostic;
pub mod model;
pub mod source;
pub mod report;
pub mod config;

pub use diagnostic::{Diagnostic, DiagnosticCode, Severity, Location};
pub use model::{
    Model, DatabaseInfo, ModelInfo, Table, Column, Measure, Hierarchy, Level, Partition,
    CalculationGroup, CalculationItem, Relationship, Cardinality, Role, TablePermission,
    Expression, ColumnRef,
};
pub use source::{DataSource, SourceType, GatewayRequirement};
pub use report::{AnalysisReport, ReportSummary, ReportVersion};
pub use config::{Config, ConfigError, SeverityThreshold, LineageConfig, GatewayConfig};
