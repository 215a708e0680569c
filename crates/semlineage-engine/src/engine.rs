//! Lineage engine: one build over a model, then read-only queries
//!
//! Measure names are global: references resolve through [`MeasureIndex`],
//! where the table parsed last wins for a duplicated name.

use semlineage_core::{ColumnRef, Config, DataSource, Diagnostic, Model, Table};
use semlineage_dax::{DaxReferenceExtractor, DaxReferences, MeasureIndex};
use semlineage_mquery::{dedupe, MExpressionParser, ModelSources};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::cache::QueryCache;
use crate::field_params::{field_parameter_items, is_field_parameter, FieldParameterItem};
use crate::graph::{
    calc_item_id, column_id, expression_id, fp_item_id, measure_id, source_id, table_id, visual_id,
    LineageGraph, Node, NodeId, NodeKind, Relation,
};
use crate::visual::{FieldKind, FieldRef, VisualUsage};

/// A measure identified by its defining table and name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MeasureRef {
    pub table: String,
    pub name: String,
}

/// One measure in a dependency chain, with the measures it references
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainNode {
    pub table: String,
    pub name: String,

    /// Empty when the measure references nothing or already appears among
    /// its own ancestors
    pub dependencies: Vec<ChainNode>,
}

impl ChainNode {
    /// Every measure in a chain, depth first, deduplicated
    pub fn flatten(chain: &[ChainNode]) -> Vec<MeasureRef> {
        fn visit(nodes: &[ChainNode], seen: &mut HashSet<(String, String)>, out: &mut Vec<MeasureRef>) {
            for node in nodes {
                if seen.insert((node.table.clone(), node.name.clone())) {
                    out.push(MeasureRef {
                        table: node.table.clone(),
                        name: node.name.clone(),
                    });
                }
                visit(&node.dependencies, seen, out);
            }
        }

        let mut out = Vec::new();
        visit(chain, &mut HashSet::new(), &mut out);
        out
    }
}

/// A measure reached from a visual
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualMeasure {
    pub table: String,
    pub name: String,

    /// Bound to the visual (possibly through a field parameter) rather than
    /// reached through another measure
    pub direct: bool,

    pub dependencies: Vec<ChainNode>,
}

/// Everything one visual draws on, down to its data sources
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualLineage {
    pub page_name: String,
    pub visual_name: String,
    pub visual_type: String,
    pub measures: Vec<VisualMeasure>,
    pub columns: Vec<ColumnRef>,

    /// Physical data tables; field-parameter and calculation-group tables are
    /// left out
    pub tables: Vec<String>,

    pub data_sources: Vec<DataSource>,
}

/// A visual affected by a change to a measure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactedVisual {
    pub page_name: String,
    pub visual_name: String,
    pub visual_type: String,

    /// Dependent measure through which the visual is reached, when it does
    /// not use the measure itself
    #[serde(skip_serializing_if = "Option::is_none")]
    pub via: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasureImpact {
    pub measure: MeasureRef,

    /// Measures referencing this one directly
    pub dependent_measures: Vec<MeasureRef>,

    pub visuals: Vec<ImpactedVisual>,
}

/// What a visual's fields stand for once hierarchies, calculation groups and
/// field parameters are looked through
#[derive(Debug, Default)]
struct Expansion {
    measures: Vec<String>,
    columns: Vec<ColumnRef>,
    tables: Vec<String>,
    nodes: Vec<NodeId>,
}

impl Expansion {
    fn add_measure(&mut self, name: &str) {
        if !self.measures.iter().any(|m| m == name) {
            self.measures.push(name.to_string());
        }
    }

    fn add_column(&mut self, column: ColumnRef) {
        if !self.columns.contains(&column) {
            self.columns.push(column);
        }
    }

    fn add_table(&mut self, table: &str) {
        if !self.tables.iter().any(|t| t == table) {
            self.tables.push(table.to_string());
        }
    }

    fn add_node(&mut self, id: NodeId) {
        if !self.nodes.contains(&id) {
            self.nodes.push(id);
        }
    }
}

/// Resolved `NAMEOF` target of a field-parameter row
#[derive(Debug, Clone, PartialEq, Eq)]
enum FieldTarget {
    Measure(String),
    Column(ColumnRef),
}

/// Lineage graph and queries over one model snapshot
///
/// Construct a new engine whenever the model changes; caches are never
/// invalidated.
#[derive(Debug)]
pub struct LineageEngine {
    model: Model,
    index: MeasureIndex,

    /// Canonical measure names in model order
    measure_order: Vec<String>,

    /// Measure name -> references of its winning definition
    measure_refs: HashMap<String, DaxReferences>,

    /// Measure name -> directly referenced measures
    dependencies: HashMap<String, Vec<String>>,

    sources: ModelSources,
    field_parameters: BTreeMap<String, Vec<FieldParameterItem>>,
    calculation_groups: HashSet<String>,
    visuals: Vec<VisualUsage>,
    diagnostics: Vec<Diagnostic>,
    graph: LineageGraph,

    chains: QueryCache<Vec<ChainNode>>,
    visual_lineage: QueryCache<VisualLineage>,
    impacts: QueryCache<MeasureImpact>,
}

impl LineageEngine {
    /// Build with default configuration
    pub fn build(model: &Model, visuals: &[VisualUsage]) -> Self {
        Self::build_with_config(model, visuals, &Config::default())
    }

    pub fn build_with_config(model: &Model, visuals: &[VisualUsage], config: &Config) -> Self {
        let mut model = model.clone();
        model.tables.retain(|table| {
            let skipped = config.lineage.is_table_skipped(&table.name);
            if skipped {
                tracing::debug!(table = %table.name, "table excluded from lineage");
            }
            !skipped
        });

        let index = MeasureIndex::build(&model);
        let sources = MExpressionParser::new(&model.expressions)
            .with_gateway_config(&config.gateway)
            .extract_model(&model);

        let mut diagnostics = index.diagnostics();
        diagnostics.extend(sources.diagnostics.iter().cloned());

        let mut measure_order = Vec::new();
        let mut measure_refs = HashMap::new();
        for (_, measure) in model.measures() {
            if !measure_refs.contains_key(&measure.name) {
                measure_order.push(measure.name.clone());
            }
            measure_refs.insert(measure.name.clone(), DaxReferenceExtractor::extract(&measure.expression));
        }

        let dependencies = measure_refs
            .iter()
            .map(|(name, refs)| (name.clone(), resolve_measure_refs(&index, refs)))
            .collect();

        let calculation_groups = model
            .tables
            .iter()
            .filter(|t| t.is_calculation_group())
            .map(|t| t.name.clone())
            .collect();

        let field_parameters = model
            .tables
            .iter()
            .filter(|t| !t.is_calculation_group() && is_field_parameter(t))
            .map(|t| (t.name.clone(), field_parameter_items(t)))
            .collect();

        let mut engine = Self {
            model,
            index,
            measure_order,
            measure_refs,
            dependencies,
            sources,
            field_parameters,
            calculation_groups,
            visuals: visuals.to_vec(),
            diagnostics,
            graph: LineageGraph::new(),
            chains: QueryCache::new(),
            visual_lineage: QueryCache::new(),
            impacts: QueryCache::new(),
        };
        engine.graph = engine.build_graph();

        tracing::info!(
            nodes = engine.graph.node_count(),
            edges = engine.graph.edge_count(),
            sources = engine.sources.sources.len(),
            "built lineage graph"
        );
        engine
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn graph(&self) -> &LineageGraph {
        &self.graph
    }

    pub fn measure_index(&self) -> &MeasureIndex {
        &self.index
    }

    pub fn visuals(&self) -> &[VisualUsage] {
        &self.visuals
    }

    /// Ambiguous-measure and unresolved-parameter findings from the build
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Deduplicated sources of the whole model
    pub fn all_data_sources(&self) -> &[DataSource] {
        &self.sources.sources
    }

    /// Sources of one table's partitions
    pub fn table_sources(&self, table: &str) -> &[DataSource] {
        self.sources
            .by_table
            .get(table)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_field_parameter(&self, table: &str) -> bool {
        self.field_parameters.contains_key(table)
    }

    pub fn is_calculation_group(&self, table: &str) -> bool {
        self.calculation_groups.contains(table)
    }

    /// Measures `name` depends on, as a tree
    ///
    /// The top level lists the measures referenced directly. A measure that
    /// already appears among its own ancestors is listed without
    /// dependencies, so cycles terminate. Unknown names give an empty chain.
    pub fn resolve_measure_chain(&self, name: &str) -> Arc<Vec<ChainNode>> {
        let Some(canonical) = self.index.canonical_name(name) else {
            return Arc::new(Vec::new());
        };
        if let Some(chain) = self.chains.get(canonical) {
            return chain;
        }

        let visited = HashSet::from([canonical.to_string()]);
        let chain = self.chain(canonical, &visited);
        self.chains.insert(canonical, chain)
    }

    /// Measures, columns, tables and sources behind one visual
    pub fn visual_lineage(&self, page: &str, visual: &str) -> Option<Arc<VisualLineage>> {
        let key = format!("{}|{}", page, visual);
        if let Some(lineage) = self.visual_lineage.get(&key) {
            return Some(lineage);
        }

        let usage = self
            .visuals
            .iter()
            .find(|v| v.page_name == page && v.visual_name == visual)?;
        let lineage = self.compute_visual_lineage(usage);
        Some(self.visual_lineage.insert(key, lineage))
    }

    /// Direct dependents of a measure and the visuals that show it
    ///
    /// A visual counts when it uses the measure or any measure built on it,
    /// however indirectly; `via` names the first such measure it uses.
    pub fn measure_impact(&self, name: &str) -> Option<Arc<MeasureImpact>> {
        let canonical = self.index.canonical_name(name)?;
        if let Some(impact) = self.impacts.get(canonical) {
            return Some(impact);
        }

        let dependents = self.direct_dependents(canonical);
        let affected = self.transitive_dependents(canonical);

        let visuals = self
            .visuals
            .iter()
            .filter_map(|usage| {
                let expansion = self.expand_visual(usage);
                let uses = |m: &str| expansion.measures.iter().any(|e| e == m);
                let via = if uses(canonical) {
                    None
                } else {
                    Some(affected.iter().find(|&&d| uses(d))?.to_string())
                };
                Some(ImpactedVisual {
                    page_name: usage.page_name.clone(),
                    visual_name: usage.visual_name.clone(),
                    visual_type: usage.visual_type.clone(),
                    via,
                })
            })
            .collect();

        let impact = MeasureImpact {
            measure: self.measure_ref(canonical),
            dependent_measures: dependents.iter().map(|d| self.measure_ref(d)).collect(),
            visuals,
        };
        Some(self.impacts.insert(canonical, impact))
    }

    /// Measures no other measure references and no visual uses
    pub fn unused_measures(&self) -> Vec<MeasureRef> {
        let referenced: HashSet<&str> = self
            .dependencies
            .values()
            .flatten()
            .map(String::as_str)
            .collect();
        let shown: HashSet<String> = self
            .visuals
            .iter()
            .flat_map(|usage| self.expand_visual(usage).measures)
            .collect();

        self.measure_order
            .iter()
            .filter(|m| !referenced.contains(m.as_str()) && !shown.contains(*m))
            .map(|m| self.measure_ref(m))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    fn chain(&self, name: &str, visited: &HashSet<String>) -> Vec<ChainNode> {
        let mut nodes = Vec::new();
        let mut seen = HashSet::new();

        for dependency in self.direct_dependencies(name) {
            let table = self.index.table_of(dependency).unwrap_or_default().to_string();
            if !seen.insert((table.clone(), dependency.clone())) {
                continue;
            }

            let dependencies = if visited.contains(dependency) {
                Vec::new()
            } else {
                let mut branch = visited.clone();
                branch.insert(dependency.clone());
                self.chain(dependency, &branch)
            };

            nodes.push(ChainNode {
                table,
                name: dependency.clone(),
                dependencies,
            });
        }

        nodes
    }

    fn compute_visual_lineage(&self, usage: &VisualUsage) -> VisualLineage {
        let expansion = self.expand_visual(usage);

        let mut measures = Vec::new();
        let mut seen = HashSet::new();
        for name in &expansion.measures {
            if seen.insert(name.clone()) {
                measures.push(self.visual_measure(name, true));
            }
        }
        for name in expansion.measures.iter().flat_map(|m| self.transitive_measures(m)) {
            if seen.insert(name.clone()) {
                measures.push(self.visual_measure(&name, false));
            }
        }

        let mut columns = expansion.columns.clone();
        let mut table_refs = expansion.tables.clone();
        for measure in &measures {
            if let Some(refs) = self.measure_refs.get(&measure.name) {
                for column in &refs.column_refs {
                    if !columns.contains(column) {
                        columns.push(column.clone());
                    }
                }
                table_refs.extend(refs.table_refs.iter().cloned());
            }
        }

        // Tables reached only by defining a measure, or acting as a UI
        // selector, are not data tables
        let mut tables: Vec<String> = Vec::new();
        let touched = columns.iter().map(|c| c.table.as_str()).chain(table_refs.iter().map(String::as_str));
        for table in touched {
            let physical = self.model.table(table).is_some()
                && !self.is_field_parameter(table)
                && !self.is_calculation_group(table);
            if physical && !tables.iter().any(|t| t == table) {
                tables.push(table.to_string());
            }
        }

        let data_sources = dedupe(
            tables
                .iter()
                .flat_map(|t| self.table_sources(t).iter().cloned()),
        );

        tracing::debug!(
            page = %usage.page_name,
            visual = %usage.visual_name,
            measures = measures.len(),
            tables = tables.len(),
            "resolved visual lineage"
        );

        VisualLineage {
            page_name: usage.page_name.clone(),
            visual_name: usage.visual_name.clone(),
            visual_type: usage.visual_type.clone(),
            measures,
            columns,
            tables,
            data_sources,
        }
    }

    fn visual_measure(&self, name: &str, direct: bool) -> VisualMeasure {
        let MeasureRef { table, name } = self.measure_ref(name);
        let dependencies = self.resolve_measure_chain(&name).as_ref().clone();
        VisualMeasure {
            table,
            name,
            direct,
            dependencies,
        }
    }

    // -------------------------------------------------------------------------
    // Resolution helpers
    // -------------------------------------------------------------------------

    fn measure_ref(&self, name: &str) -> MeasureRef {
        MeasureRef {
            table: self.index.table_of(name).unwrap_or_default().to_string(),
            name: name.to_string(),
        }
    }

    fn direct_dependencies(&self, name: &str) -> &[String] {
        self.dependencies
            .get(name)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Measures referencing `name` directly, in model order
    fn direct_dependents(&self, name: &str) -> Vec<&str> {
        self.measure_order
            .iter()
            .filter(|m| self.direct_dependencies(m).iter().any(|d| d == name))
            .map(String::as_str)
            .collect()
    }

    /// Measures built on `name`, however indirectly, BFS order
    fn transitive_dependents(&self, name: &str) -> Vec<&str> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = self.direct_dependents(name).into();
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }
            result.push(current);
            queue.extend(self.direct_dependents(current));
        }

        result
    }

    /// Every measure reachable from `name` through references, BFS order
    fn transitive_measures(&self, name: &str) -> Vec<String> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([name]);
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            for next in self.direct_dependencies(current) {
                if visited.insert(next.as_str()) {
                    result.push(next.clone());
                    queue.push_back(next.as_str());
                }
            }
        }

        result
    }

    /// Tables referenced by a measure and everything it depends on
    fn measure_tables(&self, name: &str) -> Vec<String> {
        let mut tables: Vec<String> = Vec::new();
        let chain = std::iter::once(name.to_string()).chain(self.transitive_measures(name));

        for measure in chain {
            if let Some(refs) = self.measure_refs.get(&measure) {
                for table in refs.referenced_tables() {
                    if !tables.iter().any(|t| t == table) {
                        tables.push(table.to_string());
                    }
                }
            }
        }

        tables
    }

    fn resolve_target(&self, target: &ColumnRef) -> FieldTarget {
        let is_column = self
            .model
            .table(&target.table)
            .map_or(false, |t| t.column(&target.column).is_some());

        if !is_column {
            if let Some(measure) = self.index.canonical_name(&target.column) {
                return FieldTarget::Measure(measure.to_string());
            }
        }
        FieldTarget::Column(target.clone())
    }

    fn expand_visual(&self, usage: &VisualUsage) -> Expansion {
        let mut expansion = Expansion::default();
        for field in &usage.fields {
            self.expand_field(field, &mut expansion);
        }
        expansion
    }

    fn expand_field(&self, field: &FieldRef, out: &mut Expansion) {
        match field.kind {
            FieldKind::Measure => {
                if let Some(name) = self.index.canonical_name(&field.name) {
                    let table = self.index.table_of(name).unwrap_or_default();
                    out.add_node(measure_id(table, name));
                    out.add_measure(name);
                }
            }
            FieldKind::Hierarchy => {
                let levels = self
                    .model
                    .table(&field.table)
                    .and_then(|t| t.hierarchy(&field.name))
                    .map(|h| h.levels.as_slice())
                    .unwrap_or_default();
                for level in levels {
                    let column = ColumnRef::new(&field.table, &level.column);
                    out.add_node(column_id(&column));
                    out.add_column(column);
                }
            }
            FieldKind::Column => {
                if let Some(table) = self.calculation_group_table(&field.table) {
                    self.expand_calculation_group(table, out);
                } else if let Some(items) = self.field_parameters.get(&field.table) {
                    self.expand_field_parameter(&field.table, items, out);
                } else {
                    let column = ColumnRef::new(&field.table, &field.name);
                    out.add_node(column_id(&column));
                    out.add_column(column);
                }
            }
        }
    }

    fn expand_calculation_group(&self, table: &Table, out: &mut Expansion) {
        let Some(group) = &table.calculation_group else { return };

        for item in &group.items {
            out.add_node(calc_item_id(&table.name, &item.name));

            let refs = DaxReferenceExtractor::extract(&item.expression);
            for name in resolve_measure_refs(&self.index, &refs) {
                out.add_measure(&name);
            }
            for column in refs.column_refs {
                out.add_column(column);
            }
            for table_ref in &refs.table_refs {
                out.add_table(table_ref);
            }
        }
    }

    fn expand_field_parameter(&self, table: &str, items: &[FieldParameterItem], out: &mut Expansion) {
        for item in items {
            out.add_node(fp_item_id(table, &item.label));
            match self.resolve_target(&item.target) {
                FieldTarget::Measure(name) => out.add_measure(&name),
                FieldTarget::Column(column) => out.add_column(column),
            }
        }
    }

    fn calculation_group_table(&self, name: &str) -> Option<&Table> {
        if !self.is_calculation_group(name) {
            return None;
        }
        self.model.table(name)
    }

    // -------------------------------------------------------------------------
    // Graph construction
    // -------------------------------------------------------------------------

    fn build_graph(&self) -> LineageGraph {
        let mut graph = LineageGraph::new();
        self.add_nodes(&mut graph);
        self.add_edges(&mut graph);
        graph
    }

    /// All nodes go in first so edge insertion can drop dangling references
    fn add_nodes(&self, graph: &mut LineageGraph) {
        for source in &self.sources.sources {
            graph.add_node(Node {
                id: source_id(source),
                kind: NodeKind::DataSource,
                name: source.label(),
                table: None,
            });
        }

        for table in &self.model.tables {
            graph.add_node(Node {
                id: table_id(&table.name),
                kind: NodeKind::Table,
                name: table.name.clone(),
                table: None,
            });
            for column in &table.columns {
                graph.add_node(Node {
                    id: column_id(&ColumnRef::new(&table.name, &column.name)),
                    kind: NodeKind::Column,
                    name: column.name.clone(),
                    table: Some(table.name.clone()),
                });
            }
            for measure in &table.measures {
                graph.add_node(Node {
                    id: measure_id(&table.name, &measure.name),
                    kind: NodeKind::Measure,
                    name: measure.name.clone(),
                    table: Some(table.name.clone()),
                });
            }
        }

        for expression in &self.model.expressions {
            graph.add_node(Node {
                id: expression_id(&expression.name),
                kind: NodeKind::Expression,
                name: expression.name.clone(),
                table: None,
            });
        }

        for table in self.model.tables.iter().filter(|t| self.is_calculation_group(&t.name)) {
            for item in table.calculation_group.iter().flat_map(|g| &g.items) {
                graph.add_node(Node {
                    id: calc_item_id(&table.name, &item.name),
                    kind: NodeKind::CalcItem,
                    name: item.name.clone(),
                    table: Some(table.name.clone()),
                });
            }
        }

        for (table, items) in &self.field_parameters {
            for item in items {
                graph.add_node(Node {
                    id: fp_item_id(table, &item.label),
                    kind: NodeKind::FpItem,
                    name: item.label.clone(),
                    table: Some(table.clone()),
                });
            }
        }

        for usage in &self.visuals {
            graph.add_node(Node {
                id: visual_id(&usage.page_name, &usage.visual_name),
                kind: NodeKind::Visual,
                name: usage.visual_name.clone(),
                table: None,
            });
        }
    }

    fn add_edges(&self, graph: &mut LineageGraph) {
        for table in &self.model.tables {
            let table_node = table_id(&table.name);
            let container = self.is_field_parameter(&table.name);

            for column in &table.columns {
                let id = column_id(&ColumnRef::new(&table.name, &column.name));
                graph.add_edge(&id, &table_node, Relation::BelongsToTable);
                if let Some(expression) = &column.expression {
                    self.add_dax_edges(graph, &id, &DaxReferenceExtractor::extract(expression));
                }
            }

            for measure in &table.measures {
                let id = measure_id(&table.name, &measure.name);
                let refs = DaxReferenceExtractor::extract(&measure.expression);

                if container {
                    for referenced in refs.referenced_tables() {
                        graph.add_edge(&id, &table_id(referenced), Relation::DefinedInTable);
                    }
                } else {
                    graph.add_edge(&id, &table_node, Relation::DefinedInTable);
                }
                self.add_dax_edges(graph, &id, &refs);
            }

            for source in self.table_sources(&table.name) {
                graph.add_edge(&table_node, &source_id(source), Relation::ConnectsToSource);
            }

            if let Some(group) = &table.calculation_group {
                for item in &group.items {
                    let id = calc_item_id(&table.name, &item.name);
                    graph.add_edge(&id, &table_node, Relation::DefinedInTable);
                    self.add_dax_edges(graph, &id, &DaxReferenceExtractor::extract(&item.expression));
                }
            }
        }

        for (name, sources) in &self.sources.by_expression {
            for source in sources {
                graph.add_edge(&expression_id(name), &source_id(source), Relation::ConnectsToSource);
            }
        }

        for (table, items) in &self.field_parameters {
            for item in items {
                let id = fp_item_id(table, &item.label);
                graph.add_edge(&id, &table_id(table), Relation::DefinedInTable);

                match self.resolve_target(&item.target) {
                    FieldTarget::Measure(name) => {
                        let owner = self.index.table_of(&name).unwrap_or_default();
                        graph.add_edge(&id, &measure_id(owner, &name), Relation::DependsOnMeasure);
                        for referenced in self.measure_tables(&name) {
                            graph.add_edge(&id, &table_id(&referenced), Relation::ReferencesTable);
                        }
                    }
                    FieldTarget::Column(column) => {
                        graph.add_edge(&id, &column_id(&column), Relation::ReferencesColumn);
                    }
                }
            }
        }

        for usage in &self.visuals {
            let id = visual_id(&usage.page_name, &usage.visual_name);
            for field in self.expand_visual(usage).nodes {
                graph.add_edge(&id, &field, Relation::UsesField);
            }
        }
    }

    fn add_dax_edges(&self, graph: &mut LineageGraph, from: &str, refs: &DaxReferences) {
        for column in &refs.column_refs {
            graph.add_edge(from, &column_id(column), Relation::ReferencesColumn);
        }
        for name in resolve_measure_refs(&self.index, refs) {
            let owner = self.index.table_of(&name).unwrap_or_default();
            graph.add_edge(from, &measure_id(owner, &name), Relation::DependsOnMeasure);
        }
        for table in &refs.table_refs {
            graph.add_edge(from, &table_id(table), Relation::ReferencesTable);
        }
    }
}

/// Bracket references that name a known measure, canonical and deduplicated
fn resolve_measure_refs(index: &MeasureIndex, refs: &DaxReferences) -> Vec<String> {
    let mut resolved: Vec<String> = Vec::new();
    for name in &refs.measure_refs {
        if let Some(canonical) = index.canonical_name(name) {
            if !resolved.iter().any(|r| r == canonical) {
                resolved.push(canonical.to_string());
            }
        }
    }
    resolved
}

#[cfg(test)]
mod tests {
    use super::*;
    use semlineage_core::{Measure, Table};

    fn node(name: &str, dependencies: Vec<ChainNode>) -> ChainNode {
        ChainNode {
            table: "T".to_string(),
            name: name.to_string(),
            dependencies,
        }
    }

    #[test]
    fn flatten_keeps_first_occurrence() {
        let chain = vec![node("A", vec![]), node("B", vec![node("A", vec![]), node("C", vec![])])];
        let names: Vec<String> = ChainNode::flatten(&chain).into_iter().map(|m| m.name).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn measure_refs_resolve_to_canonical_names() {
        let mut table = Table::new("T");
        table.measures.push(Measure {
            name: "Total".to_string(),
            expression: "1".to_string(),
            ..Default::default()
        });
        let model = Model {
            tables: vec![table],
            ..Default::default()
        };
        let index = MeasureIndex::build(&model);
        let refs = DaxReferenceExtractor::extract("[total] + [Total] + [Unknown]");

        assert_eq!(resolve_measure_refs(&index, &refs), vec!["Total"]);
    }
}
