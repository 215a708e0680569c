//! Data-source extraction from M text

use semlineage_core::{
    DataSource, Diagnostic, DiagnosticCode, Expression, GatewayConfig, Model, Severity, SourceType,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Range;

use crate::args::{classify, split_args, strip_comments, LetSteps, MArg};
use crate::catalog::{call_regex, lookup, odbc_server, Connector, Field};
use crate::gateway::GatewayClassifier;
use crate::parameters::ParameterTable;

/// Every source in a model, by owner and deduplicated
#[derive(Debug, Clone, Default)]
pub struct ModelSources {
    /// Distinct sources across the model; the first occurrence of each
    /// identity key wins
    pub sources: Vec<DataSource>,

    /// Table name -> sources of its M partitions (including inherited ones)
    pub by_table: BTreeMap<String, Vec<DataSource>>,

    /// Shared expression name -> its sources (including inherited ones)
    pub by_expression: BTreeMap<String, Vec<DataSource>>,

    /// `M_UNRESOLVED_PARAMETER` findings
    pub diagnostics: Vec<Diagnostic>,
}

/// Keep the first source of each identity key, preserving order
pub fn dedupe(sources: impl IntoIterator<Item = DataSource>) -> Vec<DataSource> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| seen.insert(source.identity_key()))
        .collect()
}

/// Extracts data sources from M expressions of one model
///
/// Built once from the model's shared expressions, which supply both
/// parameter values and the bodies of queries other queries build on.
#[derive(Debug, Clone)]
pub struct MExpressionParser {
    parameters: ParameterTable,

    /// Non-parameter shared expressions by name
    shared: HashMap<String, String>,

    classifier: GatewayClassifier,
}

impl MExpressionParser {
    pub fn new(expressions: &[Expression]) -> Self {
        let shared = expressions
            .iter()
            .filter(|e| !e.is_parameter_query())
            .map(|e| (e.name.clone(), e.expression.clone()))
            .collect();

        Self {
            parameters: ParameterTable::from_expressions(expressions),
            shared,
            classifier: GatewayClassifier::new(),
        }
    }

    /// Add configured cloud host patterns to gateway classification
    pub fn with_gateway_config(mut self, config: &GatewayConfig) -> Self {
        self.classifier = GatewayClassifier::with_config(config);
        self
    }

    pub fn parameters(&self) -> &ParameterTable {
        &self.parameters
    }

    /// Sources of one M expression, including those inherited from shared
    /// expressions it refers to, deduplicated
    pub fn extract(&self, m: &str) -> Vec<DataSource> {
        let mut visited = HashSet::new();
        let mut out = Vec::new();
        self.collect(m, &mut visited, &mut out);
        dedupe(out)
    }

    /// Sources of a shared expression; a reference back to itself is ignored
    pub fn extract_expression(&self, expression: &Expression) -> Vec<DataSource> {
        let mut visited = HashSet::from([expression.name.clone()]);
        let mut out = Vec::new();
        self.collect(&expression.expression, &mut visited, &mut out);
        dedupe(out)
    }

    /// Connector calls written directly in `m`, one descriptor per call
    pub fn extract_direct(&self, m: &str) -> Vec<DataSource> {
        let text = strip_comments(m);
        let steps = LetSteps::parse(&text);
        let mut sources = Vec::new();
        // Argument spans of file connectors; the location calls inside them
        // are part of that source, not sources of their own
        let mut wrapped: Vec<Range<usize>> = Vec::new();

        for caps in call_regex().captures_iter(&text) {
            let (Some(call), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if wrapped.iter().any(|span| span.contains(&call.start())) {
                continue;
            }
            let Some(connector) = lookup(name.as_str()) else {
                continue;
            };

            let (args, consumed) = split_args(&text[call.end()..]);
            if connector.wraps_content() {
                wrapped.push(call.end()..call.end() + consumed);
            }
            sources.push(self.build(connector, &args, &steps));
        }

        sources
    }

    /// Names of non-parameter shared expressions referenced by `m`, in order
    /// of first appearance
    pub fn referenced_expressions(&self, m: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        identifiers(&strip_comments(m))
            .into_iter()
            .filter(|name| self.shared.contains_key(name))
            .filter(|name| seen.insert(name.clone()))
            .collect()
    }

    /// Sources of every M partition and shared expression in `model`
    pub fn extract_model(&self, model: &Model) -> ModelSources {
        let mut result = ModelSources::default();
        let mut all = Vec::new();

        for table in &model.tables {
            let mut table_sources = Vec::new();
            for partition in table.partitions.iter().filter(|p| p.is_m_source()) {
                result
                    .diagnostics
                    .extend(self.unresolved(&format!("table '{}'", table.name), &partition.source));
                table_sources.extend(self.extract(&partition.source));
            }
            if table_sources.is_empty() {
                continue;
            }
            let table_sources = dedupe(table_sources);
            all.extend(table_sources.iter().cloned());
            result.by_table.insert(table.name.clone(), table_sources);
        }

        for expression in &model.expressions {
            if expression.is_parameter_query() || !expression.kind.eq_ignore_ascii_case("m") {
                continue;
            }
            result.diagnostics.extend(
                self.unresolved(&format!("expression '{}'", expression.name), &expression.expression),
            );
            let sources = self.extract_expression(expression);
            if sources.is_empty() {
                continue;
            }
            all.extend(sources.iter().cloned());
            result.by_expression.insert(expression.name.clone(), sources);
        }

        result.sources = dedupe(all);
        tracing::debug!(
            sources = result.sources.len(),
            unresolved = result.diagnostics.len(),
            "extracted model data sources"
        );
        result
    }

    fn collect(&self, m: &str, visited: &mut HashSet<String>, out: &mut Vec<DataSource>) {
        out.extend(self.extract_direct(m));

        for name in self.referenced_expressions(m) {
            if !visited.insert(name.clone()) {
                continue;
            }
            if let Some(body) = self.shared.get(&name) {
                self.collect(body, visited, out);
            }
        }
    }

    fn build(&self, connector: &Connector, args: &[&str], steps: &LetSteps<'_>) -> DataSource {
        let mut source = DataSource::new(connector.source_type);
        let odbc = connector.source_type == SourceType::Odbc;

        for (&field, raw) in connector.fields.iter().zip(args) {
            if field == Field::Skip {
                continue;
            }
            match classify(raw, steps, &self.parameters) {
                MArg::Literal(value) => {
                    let value = if odbc { odbc_server(&value) } else { value };
                    field.set(&mut source, value);
                }
                MArg::Parameter(name) => {
                    source.parameterized = true;
                    if let Some(value) = self.parameters.resolve(&name) {
                        let value = if odbc { odbc_server(value) } else { value.to_string() };
                        field.set_resolved(&mut source, value);
                    }
                    field.set(&mut source, name.clone());
                    if !source.parameters.contains(&name) {
                        source.parameters.push(name);
                    }
                }
                MArg::Absent | MArg::Expression(_) => {}
            }
        }

        source.gateway_required = self.classifier.classify(&source);
        tracing::debug!(
            connector = connector.function,
            source = %source.label(),
            gateway = ?source.gateway_required,
            "found data source"
        );
        source
    }

    /// One diagnostic per connector parameter with no literal value
    fn unresolved(&self, owner: &str, m: &str) -> Vec<Diagnostic> {
        let mut seen = HashSet::new();
        let mut diagnostics = Vec::new();

        for source in self.extract_direct(m) {
            for name in &source.parameters {
                if self.parameters.resolve(name).is_some() || !seen.insert(name.clone()) {
                    continue;
                }
                let reason = if self.parameters.is_known(name) {
                    "is not a text parameter"
                } else {
                    "is not defined"
                };
                tracing::warn!(owner, parameter = %name, "unresolved connector parameter");
                diagnostics.push(Diagnostic::new(
                    DiagnosticCode::MUnresolvedParameter,
                    Severity::Warn,
                    format!(
                        "{} passes '{}' to {} but it {}",
                        owner,
                        name,
                        source.source_type.display_name(),
                        reason
                    ),
                ));
            }
        }

        diagnostics
    }
}

/// Quoted identifiers (`#"Name"`) and bare identifiers outside string literals
fn identifiers(text: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '#' if chars.peek() == Some(&'"') => {
                chars.next();
                found.push(read_string(&mut chars));
            }
            '"' => {
                read_string(&mut chars);
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::from(c);
                while let Some(&n) = chars.peek() {
                    if !(n.is_alphanumeric() || n == '_' || n == '.') {
                        break;
                    }
                    ident.push(n);
                    chars.next();
                }
                found.push(ident);
            }
            _ => {}
        }
    }

    found
}

/// Read the rest of a `"..."` literal after its opening quote
fn read_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut value = String::new();
    while let Some(c) = chars.next() {
        if c == '"' {
            if chars.peek() == Some(&'"') {
                chars.next();
            } else {
                break;
            }
        }
        value.push(c);
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use semlineage_core::{GatewayRequirement, Partition, Table};

    fn expression(name: &str, body: &str) -> Expression {
        Expression {
            name: name.to_string(),
            kind: "m".to_string(),
            expression: body.to_string(),
            description: None,
        }
    }

    fn parameter(name: &str, value: &str) -> Expression {
        expression(
            name,
            &format!("\"{}\" meta [IsParameterQuery=true, Type=\"Text\", IsParameterQueryRequired=true]", value),
        )
    }

    fn table_with_source(name: &str, source: &str) -> Table {
        let mut table = Table::new(name);
        table.partitions.push(Partition {
            name: name.to_string(),
            source_type: Some("m".to_string()),
            source: source.to_string(),
            ..Default::default()
        });
        table
    }

    #[test]
    fn literal_sql_source() {
        let parser = MExpressionParser::new(&[]);
        let sources = parser.extract("let Source = Sql.Database(\"srv01\", \"db1\") in Source");

        assert_eq!(sources.len(), 1);
        let source = &sources[0];
        assert_eq!(source.source_type, SourceType::SqlServer);
        assert_eq!(source.server.as_deref(), Some("srv01"));
        assert_eq!(source.database.as_deref(), Some("db1"));
        assert!(!source.parameterized);
        assert!(source.parameters.is_empty());
        assert_eq!(source.gateway_required, GatewayRequirement::Required);
    }

    #[test]
    fn parameter_reference_is_kept_and_resolved() {
        let parser = MExpressionParser::new(&[parameter("Server Param", "prod.database.windows.net")]);
        let sources = parser.extract("Sql.Database(#\"Server Param\", \"db1\")");

        let source = &sources[0];
        assert!(source.parameterized);
        assert_eq!(source.parameters, vec!["Server Param"]);
        assert_eq!(source.server.as_deref(), Some("Server Param"));
        assert_eq!(source.server_resolved.as_deref(), Some("prod.database.windows.net"));
        assert_eq!(source.gateway_required, GatewayRequirement::NotRequired);
    }

    #[test]
    fn unresolved_parameter_stays_unknown() {
        let parser = MExpressionParser::new(&[]);
        let sources = parser.extract("Sql.Database(#\"Server Param\", \"db1\")");

        assert!(sources[0].parameterized);
        assert_eq!(sources[0].server_resolved, None);
        assert_eq!(sources[0].gateway_required, GatewayRequirement::Unknown);
    }

    #[test]
    fn multiple_connectors_in_one_expression() {
        let parser = MExpressionParser::new(&[]);
        let sources = parser.extract(
            "let\n  A = Sql.Database(\"srv01\", \"db1\"),\n  // B = Oracle.Database(\"old\"),\n  \
             C = Excel.Workbook(File.Contents(\"C:\\data\\x.xlsx\"), null, true),\n  \
             D = Excel.Workbook(Web.Contents(\"https://contoso.sharepoint.com/x.xlsx\"))\nin A",
        );

        let kinds: Vec<_> = sources.iter().map(|s| s.source_type).collect();
        assert_eq!(kinds, vec![SourceType::SqlServer, SourceType::Excel, SourceType::Excel]);
        assert_eq!(sources[1].path.as_deref(), Some("C:\\data\\x.xlsx"));
        assert_eq!(sources[1].gateway_required, GatewayRequirement::Required);
        assert_eq!(sources[2].gateway_required, GatewayRequirement::NotRequired);
    }

    #[test]
    fn odbc_and_argument_free_connectors() {
        let parser = MExpressionParser::new(&[]);
        let sources = parser.extract(
            "Odbc.Query(\"dsn=Legacy;uid=x\", \"select 1\") & GoogleBigQuery.Database() & PowerBI.Dataflows(null)",
        );

        assert_eq!(sources[0].server.as_deref(), Some("Legacy"));
        assert_eq!(sources[0].gateway_required, GatewayRequirement::Required);
        assert_eq!(sources[1].source_type, SourceType::BigQuery);
        assert_eq!(sources[1].gateway_required, GatewayRequirement::NotRequired);
        assert_eq!(sources[2].source_type, SourceType::Dataflows);
    }

    #[test]
    fn malformed_text_yields_nothing_or_partial_sources() {
        let parser = MExpressionParser::new(&[]);
        assert!(parser.extract("").is_empty());
        assert!(parser.extract("let Source = in").is_empty());

        let sources = parser.extract("Sql.Database(\"srv01\"");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].server.as_deref(), Some("srv01"));
    }

    #[test]
    fn shared_expression_sources_are_inherited() {
        let parser = MExpressionParser::new(&[
            expression("Staging", "let S = Sql.Database(\"crm.database.windows.net\", \"crm\") in S"),
            expression("Loop A", "#\"Loop B\""),
            expression("Loop B", "let X = #\"Loop A\", Y = Oracle.Database(\"ora1\") in Y"),
        ]);

        let sources = parser.extract("let Source = Staging in Source");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].server.as_deref(), Some("crm.database.windows.net"));

        let sources = parser.extract("#\"Loop A\"");
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].source_type, SourceType::Oracle);

        // Names inside string literals are not references
        assert!(parser.extract("Text.From(\"Staging\")").is_empty());
    }

    #[test]
    fn model_sources_are_deduplicated() {
        let model = Model {
            tables: vec![
                table_with_source("A", "Sql.Database(\"SRV01\", \"DB1\")"),
                table_with_source("B", "Sql.Database(\"srv01\", \"db1\")"),
            ],
            ..Default::default()
        };
        let parser = MExpressionParser::new(&model.expressions);
        let result = parser.extract_model(&model);

        assert_eq!(result.sources.len(), 1);
        assert_eq!(result.sources[0].server.as_deref(), Some("SRV01"));
        assert_eq!(result.by_table.len(), 2);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn unresolved_parameters_are_reported() {
        let model = Model {
            tables: vec![table_with_source("A", "Sql.Database(Env, #\"Db Name\")")],
            expressions: vec![expression("Env", "let x = 1 in x")],
            ..Default::default()
        };
        let parser = MExpressionParser::new(&model.expressions);
        let result = parser.extract_model(&model);

        let messages: Vec<_> = result.diagnostics.iter().map(|d| d.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "table 'A' passes 'Env' to SQL Server but it is not a text parameter",
                "table 'A' passes 'Db Name' to SQL Server but it is not defined",
            ]
        );
        assert!(result
            .diagnostics
            .iter()
            .all(|d| d.code == DiagnosticCode::MUnresolvedParameter));
    }

    #[test]
    fn step_variables_are_not_parameters() {
        let m = "let\n    Source = File.Contents(\"C:\\data\\sales.csv\"),\n    \
                 Data = Csv.Document(Source, [Delimiter=\",\", Columns=4]),\n    \
                 Remote = Csv.Document(Feed),\n    \
                 Feed = Web.Contents(#\"Feed Url\")\nin\n    Data";
        let model = Model {
            tables: vec![table_with_source("Sales", m)],
            expressions: vec![parameter("Feed Url", "https://contoso.sharepoint.com/feed.csv")],
            ..Default::default()
        };
        let parser = MExpressionParser::new(&model.expressions);
        let result = parser.extract_model(&model);

        let csv: Vec<_> = result.sources.iter().filter(|s| s.source_type == SourceType::Csv).collect();
        assert_eq!(csv.len(), 2);
        assert_eq!(csv[0].path.as_deref(), Some("C:\\data\\sales.csv"));
        assert!(!csv[0].parameterized);
        assert!(csv[0].parameters.is_empty());
        assert_eq!(csv[0].gateway_required, GatewayRequirement::Required);

        // A step holding a parameterized location carries the parameter
        assert_eq!(csv[1].parameters, vec!["Feed Url"]);
        assert_eq!(csv[1].gateway_required, GatewayRequirement::NotRequired);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn unknown_bare_names_are_opaque() {
        let model = Model {
            tables: vec![table_with_source("A", "Sql.Database(Source, \"db1\")")],
            ..Default::default()
        };
        let parser = MExpressionParser::new(&model.expressions);
        let result = parser.extract_model(&model);

        assert_eq!(result.sources[0].server, None);
        assert!(!result.sources[0].parameterized);
        assert_eq!(result.sources[0].gateway_required, GatewayRequirement::Unknown);
        assert!(result.diagnostics.is_empty());
    }
}
