//! Power Query M data-source extraction
//!
//! This crate handles:
//! - Finding connector calls (`Sql.Database(...)`, `Excel.Workbook(...)`, ...)
//!   in partition and shared-expression M text
//! - Capturing literal arguments and `#"Parameter"` references
//! - Resolving parameter references against text parameter queries
//! - Deduplicating sources across the model
//! - Classifying whether a source needs an on-premises gateway
//!
//! M is scanned, never evaluated.

pub mod args;
pub mod catalog;
pub mod gateway;
pub mod parameters;
pub mod parser;

pub use args::MArg;
pub use catalog::{Connector, Field, CONNECTORS};
pub use gateway::GatewayClassifier;
pub use parameters::ParameterTable;
pub use parser::{dedupe, MExpressionParser, ModelSources};
