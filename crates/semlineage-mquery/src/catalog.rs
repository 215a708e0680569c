//! Connector catalog
//!
//! Each entry maps an M function to a source type and says which descriptor
//! field each positional argument fills. Arguments past the listed fields
//! (options records, queries, navigation) are ignored.

use regex::Regex;
use semlineage_core::{DataSource, SourceType};
use std::sync::OnceLock;

/// Descriptor field filled by a connector argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Server,
    Database,
    Url,
    Path,
    /// Positional argument with no location meaning
    Skip,
}

impl Field {
    pub fn set(self, source: &mut DataSource, value: String) {
        match self {
            Self::Server => source.server = Some(value),
            Self::Database => source.database = Some(value),
            Self::Url => source.url = Some(value),
            Self::Path => source.path = Some(value),
            Self::Skip => {}
        }
    }

    pub fn set_resolved(self, source: &mut DataSource, value: String) {
        match self {
            Self::Server => source.server_resolved = Some(value),
            Self::Database => source.database_resolved = Some(value),
            Self::Url => source.url_resolved = Some(value),
            Self::Path => source.path_resolved = Some(value),
            Self::Skip => {}
        }
    }
}

/// One recognized connector function
#[derive(Debug, Clone, Copy)]
pub struct Connector {
    pub function: &'static str,
    pub source_type: SourceType,
    pub fields: &'static [Field],
}

impl Connector {
    /// File connectors take their location from a wrapped
    /// `File.Contents`/`Web.Contents` call
    pub fn wraps_content(&self) -> bool {
        matches!(
            self.source_type,
            SourceType::Excel | SourceType::Csv | SourceType::Folder
        )
    }
}

const fn connector(
    function: &'static str,
    source_type: SourceType,
    fields: &'static [Field],
) -> Connector {
    Connector {
        function,
        source_type,
        fields,
    }
}

use Field::{Database, Path, Server, Skip, Url};

pub const CONNECTORS: &[Connector] = &[
    connector("Sql.Database", SourceType::SqlServer, &[Server, Database]),
    connector("Sql.Databases", SourceType::SqlServer, &[Server]),
    connector("AnalysisServices.Database", SourceType::AnalysisServices, &[Server, Database]),
    connector("AnalysisServices.Databases", SourceType::AnalysisServices, &[Server]),
    connector("OData.Feed", SourceType::OData, &[Url]),
    connector("Web.Contents", SourceType::Web, &[Url]),
    connector("SharePoint.Tables", SourceType::SharePointList, &[Url]),
    connector("SharePoint.Files", SourceType::SharePointFolder, &[Url]),
    connector("SharePoint.Contents", SourceType::SharePointFolder, &[Url]),
    connector("Excel.Workbook", SourceType::Excel, &[Path]),
    connector("Csv.Document", SourceType::Csv, &[Path]),
    connector("Folder.Files", SourceType::Folder, &[Path]),
    connector("Folder.Contents", SourceType::Folder, &[Path]),
    connector("AzureStorage.Blobs", SourceType::AzureBlobStorage, &[Url]),
    connector("AzureStorage.BlobContents", SourceType::AzureBlobStorage, &[Url]),
    connector("AzureStorage.DataLake", SourceType::AzureDataLake, &[Url]),
    connector("CommonDataService.Database", SourceType::Dataverse, &[Server]),
    connector("Dataverse.Contents", SourceType::Dataverse, &[Server]),
    connector("Cds.Entities", SourceType::Dataverse, &[Url]),
    connector("Snowflake.Databases", SourceType::Snowflake, &[Server, Database]),
    connector("Oracle.Database", SourceType::Oracle, &[Server]),
    connector("GoogleBigQuery.Database", SourceType::BigQuery, &[]),
    connector("PostgreSQL.Database", SourceType::PostgreSql, &[Server, Database]),
    connector("MySQL.Database", SourceType::MySql, &[Server, Database]),
    connector("Teradata.Database", SourceType::Teradata, &[Server]),
    connector("SapHana.Database", SourceType::SapHana, &[Server]),
    connector("Odbc.DataSource", SourceType::Odbc, &[Server]),
    connector("Odbc.Query", SourceType::Odbc, &[Server, Skip]),
    connector("PowerBI.Dataflows", SourceType::Dataflows, &[]),
    connector("PowerPlatform.Dataflows", SourceType::Dataflows, &[]),
    connector("AzureDataExplorer.Contents", SourceType::AzureDataExplorer, &[Server, Database]),
    connector("Kusto.Contents", SourceType::AzureDataExplorer, &[Server, Database]),
    connector("Lakehouse.Contents", SourceType::FabricLakehouse, &[]),
    connector("Fabric.Warehouse", SourceType::FabricWarehouse, &[]),
    connector("Databricks.Catalogs", SourceType::Databricks, &[Server, Path]),
    connector("DatabricksMultiCloud.Catalogs", SourceType::Databricks, &[Server, Path]),
];

/// Look up a catalog entry by exact function name
pub fn lookup(function: &str) -> Option<&'static Connector> {
    CONNECTORS.iter().find(|c| c.function == function)
}

/// Matches any catalog function followed by its opening parenthesis
///
/// Capture 1 is the function name. M is case-sensitive, so matching is too.
pub fn call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let mut names: Vec<&str> = CONNECTORS.iter().map(|c| c.function).collect();
        // Longest first so `Sql.Databases` is never cut short by `Sql.Database`
        names.sort_by_key(|n| std::cmp::Reverse(n.len()));
        let alternation = names
            .iter()
            .map(|n| regex::escape(n))
            .collect::<Vec<_>>()
            .join("|");
        Regex::new(&format!(r"\b({})\s*\(", alternation)).expect("valid regex")
    })
}

/// `DSN=name` out of an ODBC connection string, or the whole string
pub fn odbc_server(connection: &str) -> String {
    connection
        .split(';')
        .filter_map(|part| part.split_once('='))
        .find(|(key, _)| key.trim().eq_ignore_ascii_case("dsn"))
        .map(|(_, value)| value.trim().to_string())
        .unwrap_or_else(|| connection.to_string())
}
