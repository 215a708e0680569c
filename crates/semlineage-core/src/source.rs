//! Data-source descriptors derived from M partition queries
//!
//! These are not stored in the `Model`; the M expression parser produces them
//! and the lineage engine attaches them to tables.

use serde::{Deserialize, Serialize};

/// Connector kind recognized in M source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SourceType {
    SqlServer,
    AnalysisServices,
    OData,
    Web,
    SharePointList,
    SharePointFolder,
    Excel,
    Csv,
    Folder,
    AzureBlobStorage,
    AzureDataLake,
    Dataverse,
    Snowflake,
    Oracle,
    BigQuery,
    PostgreSql,
    MySql,
    Teradata,
    SapHana,
    Odbc,
    Dataflows,
    AzureDataExplorer,
    FabricLakehouse,
    FabricWarehouse,
    Databricks,
    /// Anything not in the connector catalog
    Unknown,
}

impl SourceType {
    /// Stable tag used in identity keys and node ids
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SqlServer => "sqlServer",
            Self::AnalysisServices => "analysisServices",
            Self::OData => "oData",
            Self::Web => "web",
            Self::SharePointList => "sharePointList",
            Self::SharePointFolder => "sharePointFolder",
            Self::Excel => "excel",
            Self::Csv => "csv",
            Self::Folder => "folder",
            Self::AzureBlobStorage => "azureBlobStorage",
            Self::AzureDataLake => "azureDataLake",
            Self::Dataverse => "dataverse",
            Self::Snowflake => "snowflake",
            Self::Oracle => "oracle",
            Self::BigQuery => "bigQuery",
            Self::PostgreSql => "postgreSql",
            Self::MySql => "mySql",
            Self::Teradata => "teradata",
            Self::SapHana => "sapHana",
            Self::Odbc => "odbc",
            Self::Dataflows => "dataflows",
            Self::AzureDataExplorer => "azureDataExplorer",
            Self::FabricLakehouse => "fabricLakehouse",
            Self::FabricWarehouse => "fabricWarehouse",
            Self::Databricks => "databricks",
            Self::Unknown => "unknown",
        }
    }

    /// Human-readable connector name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::SqlServer => "SQL Server",
            Self::AnalysisServices => "Analysis Services",
            Self::OData => "OData",
            Self::Web => "Web",
            Self::SharePointList => "SharePoint List",
            Self::SharePointFolder => "SharePoint Folder",
            Self::Excel => "Excel",
            Self::Csv => "CSV",
            Self::Folder => "Folder",
            Self::AzureBlobStorage => "Azure Blob Storage",
            Self::AzureDataLake => "Azure Data Lake Storage",
            Self::Dataverse => "Dataverse",
            Self::Snowflake => "Snowflake",
            Self::Oracle => "Oracle",
            Self::BigQuery => "Google BigQuery",
            Self::PostgreSql => "PostgreSQL",
            Self::MySql => "MySQL",
            Self::Teradata => "Teradata",
            Self::SapHana => "SAP HANA",
            Self::Odbc => "ODBC",
            Self::Dataflows => "Power BI Dataflows",
            Self::AzureDataExplorer => "Azure Data Explorer",
            Self::FabricLakehouse => "Fabric Lakehouse",
            Self::FabricWarehouse => "Fabric Warehouse",
            Self::Databricks => "Databricks",
            Self::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Whether reaching a source from the service needs an on-premises gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GatewayRequirement {
    Required,
    NotRequired,
    /// No rule applied; never guessed
    Unknown,
}

impl GatewayRequirement {
    /// `Some(true)`/`Some(false)` for a decided requirement, `None` for unknown
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Required => Some(true),
            Self::NotRequired => Some(false),
            Self::Unknown => None,
        }
    }
}

impl Default for GatewayRequirement {
    fn default() -> Self {
        Self::Unknown
    }
}

/// A physical data source referenced by an M query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub source_type: SourceType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    /// True when any captured argument was a reference rather than a literal
    #[serde(default)]
    pub parameterized: bool,

    /// Names of the referenced expressions, in argument order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_resolved: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_resolved: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_resolved: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path_resolved: Option<String>,

    #[serde(default)]
    pub gateway_required: GatewayRequirement,
}

impl DataSource {
    /// Create a descriptor with no arguments captured
    pub fn new(source_type: SourceType) -> Self {
        Self {
            source_type,
            server: None,
            database: None,
            url: None,
            path: None,
            parameterized: false,
            parameters: Vec::new(),
            server_resolved: None,
            database_resolved: None,
            url_resolved: None,
            path_resolved: None,
            gateway_required: GatewayRequirement::Unknown,
        }
    }

    /// Dedup identity: lowercase `type|server|database|url|path`
    pub fn identity_key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.source_type.as_str(),
            self.server.as_deref().unwrap_or(""),
            self.database.as_deref().unwrap_or(""),
            self.url.as_deref().unwrap_or(""),
            self.path.as_deref().unwrap_or(""),
        )
        .to_lowercase()
    }

    /// Server, preferring the resolved parameter value
    pub fn effective_server(&self) -> Option<&str> {
        self.server_resolved.as_deref().or(self.server.as_deref())
    }

    /// Path (or url for web-hosted files), preferring resolved values
    pub fn effective_path(&self) -> Option<&str> {
        self.path_resolved
            .as_deref()
            .or(self.path.as_deref())
            .or(self.url_resolved.as_deref())
            .or(self.url.as_deref())
    }

    /// Short label for diagrams and listings
    pub fn label(&self) -> String {
        let target = self
            .effective_server()
            .map(|s| match self.database_resolved.as_deref().or(self.database.as_deref()) {
                Some(db) => format!("{}/{}", s, db),
                None => s.to_string(),
            })
            .or_else(|| self.effective_path().map(str::to_string));

        match target {
            Some(target) => format!("{}: {}", self.source_type.display_name(), target),
            None => self.source_type.display_name().to_string(),
        }
    }

    /// Replace every location value with a placeholder
    pub fn redacted(&self) -> Self {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "***".to_string());
        Self {
            server: mask(&self.server),
            database: mask(&self.database),
            url: mask(&self.url),
            path: mask(&self.path),
            server_resolved: mask(&self.server_resolved),
            database_resolved: mask(&self.database_resolved),
            url_resolved: mask(&self.url_resolved),
            path_resolved: mask(&self.path_resolved),
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_key_is_case_insensitive() {
        let mut a = DataSource::new(SourceType::SqlServer);
        a.server = Some("SRV01".to_string());
        a.database = Some("Db1".to_string());

        let mut b = DataSource::new(SourceType::SqlServer);
        b.server = Some("srv01".to_string());
        b.database = Some("db1".to_string());

        assert_eq!(a.identity_key(), b.identity_key());
        assert_eq!(a.identity_key(), "sqlserver|srv01|db1||");
    }

    #[test]
    fn gateway_requirement_serialization() {
        let json = serde_json::to_string(&GatewayRequirement::NotRequired).unwrap();
        assert_eq!(json, "\"notRequired\"");
        assert_eq!(GatewayRequirement::Unknown.as_bool(), None);
        assert_eq!(GatewayRequirement::Required.as_bool(), Some(true));
    }

    #[test]
    fn label_prefers_resolved_server() {
        let mut source = DataSource::new(SourceType::SqlServer);
        source.server = Some("ServerParam".to_string());
        source.server_resolved = Some("srv01".to_string());
        source.database = Some("db1".to_string());
        assert_eq!(source.label(), "SQL Server: srv01/db1");
    }

    #[test]
    fn redaction_keeps_shape() {
        let mut source = DataSource::new(SourceType::Excel);
        source.path = Some("C:\\data\\sales.xlsx".to_string());
        let redacted = source.redacted();
        assert_eq!(redacted.path.as_deref(), Some("***"));
        assert_eq!(redacted.server, None);
        assert_eq!(redacted.source_type, SourceType::Excel);
    }
}
