//! SemLineage engine - lineage graph and queries
//!
//! This crate handles:
//! - Building the lineage graph (sources, tables, columns, measures,
//!   calculation items, field-parameter items, shared expressions, visuals)
//! - Measure dependency chains
//! - Visual lineage down to data sources
//! - Measure impact analysis
//! - Memoization of query results per engine instance

pub mod cache;
pub mod engine;
pub mod field_params;
pub mod graph;
pub mod visual;

pub use cache::QueryCache;
pub use engine::{
    ChainNode, ImpactedVisual, LineageEngine, MeasureImpact, MeasureRef, VisualLineage, VisualMeasure,
};
pub use field_params::{field_parameter_items, is_field_parameter, FieldParameterItem};
pub use graph::{Edge, GraphExport, LineageGraph, Node, NodeId, NodeKind, Relation};
pub use visual::{FieldKind, FieldRef, VisualLoadError, VisualUsage};
