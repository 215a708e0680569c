//! Lineage graph storage and traversal
//!
//! Edges point from the dependent object to what it depends on, so a node's
//! parents are its inputs (a measure's columns, a table's sources) and its
//! children are the objects built on top of it.

use semlineage_core::{ColumnRef, DataSource};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

/// Node identifier (`kind:name`, see the `*_id` helpers)
pub type NodeId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    DataSource,
    Table,
    Column,
    Measure,
    CalcItem,
    FpItem,
    Expression,
    Visual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    BelongsToTable,
    DefinedInTable,
    ReferencesColumn,
    DependsOnMeasure,
    ReferencesTable,
    ConnectsToSource,
    UsesField,
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::BelongsToTable => "belongs_to_table",
            Self::DefinedInTable => "defined_in_table",
            Self::ReferencesColumn => "references_column",
            Self::DependsOnMeasure => "depends_on_measure",
            Self::ReferencesTable => "references_table",
            Self::ConnectsToSource => "connects_to_source",
            Self::UsesField => "uses_field",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: NodeId,
    pub kind: NodeKind,

    /// Object name (for data sources, a display label)
    pub name: String,

    /// Owning table for columns, measures and items
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Edge {
    pub from: NodeId,
    pub to: NodeId,
    pub relation: Relation,
}

pub fn source_id(source: &DataSource) -> NodeId {
    format!("dataSource:{}", source.identity_key())
}

pub fn table_id(table: &str) -> NodeId {
    format!("table:{}", table)
}

pub fn column_id(column: &ColumnRef) -> NodeId {
    format!("column:{}[{}]", column.table, column.column)
}

pub fn measure_id(table: &str, measure: &str) -> NodeId {
    format!("measure:{}[{}]", table, measure)
}

pub fn calc_item_id(table: &str, item: &str) -> NodeId {
    format!("calcItem:{}[{}]", table, item)
}

pub fn fp_item_id(table: &str, label: &str) -> NodeId {
    format!("fpItem:{}[{}]", table, label)
}

pub fn expression_id(name: &str) -> NodeId {
    format!("expression:{}", name)
}

pub fn visual_id(page: &str, visual: &str) -> NodeId {
    format!("visual:{}|{}", page, visual)
}

/// Nodes and edges with forward and reverse adjacency
#[derive(Debug, Clone, Default)]
pub struct LineageGraph {
    /// Nodes in insertion order
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,

    edges: Vec<Edge>,
    edge_set: HashSet<Edge>,

    /// node -> nodes it depends on
    parents: HashMap<NodeId, Vec<NodeId>>,

    /// node -> nodes depending on it
    children: HashMap<NodeId, Vec<NodeId>>,
}

/// Serializable snapshot for external renderers
#[derive(Debug, Clone, Serialize)]
pub struct GraphExport<'a> {
    pub nodes: &'a [Node],
    pub edges: &'a [Edge],
}

impl LineageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; returns false if the id already exists
    pub fn add_node(&mut self, node: Node) -> bool {
        if self.index.contains_key(&node.id) {
            return false;
        }
        self.index.insert(node.id.clone(), self.nodes.len());
        self.nodes.push(node);
        true
    }

    /// Add an edge between two existing nodes
    ///
    /// Returns false (and adds nothing) when either end is missing or the
    /// edge is already present.
    pub fn add_edge(&mut self, from: &str, to: &str, relation: Relation) -> bool {
        if !self.contains(from) || !self.contains(to) {
            return false;
        }
        let edge = Edge {
            from: from.to_string(),
            to: to.to_string(),
            relation,
        };
        if !self.edge_set.insert(edge.clone()) {
            return false;
        }

        let parents = self.parents.entry(edge.from.clone()).or_default();
        if !parents.contains(&edge.to) {
            parents.push(edge.to.clone());
        }
        let children = self.children.entry(edge.to.clone()).or_default();
        if !children.contains(&edge.from) {
            children.push(edge.from.clone());
        }

        self.edges.push(edge);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.kind == kind)
    }

    /// Outgoing edges of a node
    pub fn edges_from<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Edge> {
        self.edges.iter().filter(move |e| e.from == id)
    }

    /// Immediate dependencies of a node
    pub fn parents(&self, id: &str) -> Vec<&NodeId> {
        self.parents
            .get(id)
            .map(|ids| ids.iter().collect())
            .unwrap_or_default()
    }

    /// Immediate dependents of a node
    pub fn children(&self, id: &str) -> Vec<&NodeId> {
        self.children
            .get(id)
            .map(|ids| ids.iter().collect())
            .unwrap_or_default()
    }

    /// Everything a node depends on, transitively, in BFS order
    pub fn upstream(&self, id: &str) -> Vec<NodeId> {
        Self::walk(&self.parents, id)
    }

    /// Everything built on a node, transitively, in BFS order
    ///
    /// This is the blast radius of a change to the node.
    pub fn downstream(&self, id: &str) -> Vec<NodeId> {
        Self::walk(&self.children, id)
    }

    pub fn has_path(&self, from: &str, to: &str) -> bool {
        self.upstream(from).iter().any(|id| id == to)
    }

    pub fn export(&self) -> GraphExport<'_> {
        GraphExport {
            nodes: &self.nodes,
            edges: &self.edges,
        }
    }

    fn walk(adjacency: &HashMap<NodeId, Vec<NodeId>>, start: &str) -> Vec<NodeId> {
        let mut visited: HashSet<&str> = HashSet::from([start]);
        let mut queue: VecDeque<&str> = VecDeque::from([start]);
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            for next in adjacency.get(current).into_iter().flatten() {
                if visited.insert(next.as_str()) {
                    result.push(next.clone());
                    queue.push_back(next.as_str());
                }
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, kind: NodeKind) -> Node {
        Node {
            id: id.to_string(),
            kind,
            name: id.to_string(),
            table: None,
        }
    }

    fn sample() -> LineageGraph {
        let mut graph = LineageGraph::new();
        graph.add_node(node("dataSource:sql", NodeKind::DataSource));
        graph.add_node(node("table:Sales", NodeKind::Table));
        graph.add_node(node("column:Sales[Amount]", NodeKind::Column));
        graph.add_node(node("measure:Sales[Total]", NodeKind::Measure));
        graph.add_node(node("measure:Sales[Share]", NodeKind::Measure));

        graph.add_edge("table:Sales", "dataSource:sql", Relation::ConnectsToSource);
        graph.add_edge("column:Sales[Amount]", "table:Sales", Relation::BelongsToTable);
        graph.add_edge("measure:Sales[Total]", "column:Sales[Amount]", Relation::ReferencesColumn);
        graph.add_edge("measure:Sales[Share]", "measure:Sales[Total]", Relation::DependsOnMeasure);
        graph
    }

    #[test]
    fn edges_need_both_ends() {
        let mut graph = sample();
        assert!(!graph.add_edge("measure:Sales[Total]", "column:Sales[Missing]", Relation::ReferencesColumn));
        assert!(!graph.add_edge("table:Sales", "dataSource:sql", Relation::ConnectsToSource));
        assert!(!graph.add_node(node("table:Sales", NodeKind::Table)));
        assert_eq!(graph.edge_count(), 4);
        assert_eq!(graph.node_count(), 5);
    }

    #[test]
    fn traversal() {
        let graph = sample();

        assert_eq!(graph.parents("measure:Sales[Share]"), vec!["measure:Sales[Total]"]);
        assert_eq!(graph.children("table:Sales"), vec!["column:Sales[Amount]"]);
        assert_eq!(
            graph.upstream("measure:Sales[Share]"),
            vec![
                "measure:Sales[Total]",
                "column:Sales[Amount]",
                "table:Sales",
                "dataSource:sql"
            ]
        );
        assert_eq!(graph.downstream("dataSource:sql").len(), 4);
        assert!(graph.has_path("measure:Sales[Share]", "dataSource:sql"));
        assert!(!graph.has_path("dataSource:sql", "measure:Sales[Share]"));
    }

    #[test]
    fn cycles_terminate() {
        let mut graph = LineageGraph::new();
        graph.add_node(node("measure:T[A]", NodeKind::Measure));
        graph.add_node(node("measure:T[B]", NodeKind::Measure));
        graph.add_edge("measure:T[A]", "measure:T[B]", Relation::DependsOnMeasure);
        graph.add_edge("measure:T[B]", "measure:T[A]", Relation::DependsOnMeasure);

        assert_eq!(graph.upstream("measure:T[A]"), vec!["measure:T[B]"]);
    }

    #[test]
    fn export_serializes_relations_snake_case() {
        let graph = sample();
        let json = serde_json::to_string(&graph.export()).unwrap();
        assert!(json.contains("\"relation\":\"connects_to_source\""));
        assert!(json.contains("\"kind\":\"dataSource\""));
    }
}
