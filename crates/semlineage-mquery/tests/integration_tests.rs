//! Integration tests for M data-source extraction
//!
//! Parses the sample project with the TMDL parser and extracts the sources
//! of every partition and shared expression.
//!
//! ```bash
//! cargo test -p semlineage-mquery --test integration_tests
//! ```

use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use semlineage_core::{GatewayConfig, GatewayRequirement, Model, SourceType};
use semlineage_mquery::{MExpressionParser, ModelSources};

// =============================================================================
// Helper Functions
// =============================================================================

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../fixtures/sample-model")
}

fn load_model() -> Model {
    let root = fixture_dir();
    let files: Vec<(String, String)> = walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.path().extension().map_or(false, |ext| ext == "tmdl"))
        .map(|entry| {
            let relative = entry
                .path()
                .strip_prefix(&root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            (relative, std::fs::read_to_string(entry.path()).unwrap())
        })
        .collect();

    semlineage_tmdl::parse_project(files).model
}

fn extract_fixture() -> ModelSources {
    let model = load_model();
    MExpressionParser::new(&model.expressions).extract_model(&model)
}

// =============================================================================
// Sample project
// =============================================================================

#[test]
fn every_m_table_has_its_source() {
    let result = extract_fixture();

    let tables: Vec<_> = result.by_table.keys().map(String::as_str).collect();
    assert_eq!(tables, vec!["Customer", "Date", "Sales"]);
    assert_eq!(result.sources.len(), 3);
    assert!(result.diagnostics.is_empty(), "{:#?}", result.diagnostics);
}

#[test]
fn parameterized_sql_server() {
    let result = extract_fixture();
    let sales = &result.by_table["Sales"];

    assert_eq!(sales.len(), 1);
    assert_eq!(sales[0].source_type, SourceType::SqlServer);
    assert_eq!(sales[0].server.as_deref(), Some("ServerName"));
    assert_eq!(sales[0].server_resolved.as_deref(), Some("CORP-SQL01"));
    assert_eq!(sales[0].database.as_deref(), Some("SalesDW"));
    assert!(sales[0].parameterized);
    assert_eq!(sales[0].gateway_required, GatewayRequirement::Required);
}

#[test]
fn source_inherited_from_shared_expression() {
    let result = extract_fixture();
    let customer = &result.by_table["Customer"];

    assert_eq!(customer.len(), 1);
    assert_eq!(customer[0].server.as_deref(), Some("contoso-crm.database.windows.net"));
    assert_eq!(customer[0].gateway_required, GatewayRequirement::NotRequired);
    assert_eq!(result.by_expression["Customer Staging"], *customer);
}

#[test]
fn excel_workbook_on_file_share() {
    let result = extract_fixture();
    let date = &result.by_table["Date"];

    assert_eq!(date.len(), 1);
    assert_eq!(date[0].source_type, SourceType::Excel);
    assert_eq!(date[0].path.as_deref(), Some("\\\\fileserver\\finance\\calendar.xlsx"));
    assert_eq!(date[0].gateway_required, GatewayRequirement::Required);
}

#[test]
fn configured_cloud_hosts_change_classification() {
    let mut model = load_model();
    for expression in &mut model.expressions {
        if expression.name == "ServerName" {
            expression.expression = expression.expression.replace("CORP-SQL01", "sql01.corp-cloud.example");
        }
    }

    let config = GatewayConfig {
        cloud_host_patterns: vec![r"\.corp-cloud\.example$".to_string()],
    };
    let result = MExpressionParser::new(&model.expressions)
        .with_gateway_config(&config)
        .extract_model(&model);

    assert_eq!(
        result.by_table["Sales"][0].gateway_required,
        GatewayRequirement::NotRequired
    );
}
