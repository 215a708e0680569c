//! On-premises gateway classification
//!
//! Rules, in order:
//! - server connectors are cloud-hosted when the host matches a known cloud
//!   endpoint pattern, on-premises otherwise
//! - file connectors are cloud-hosted on SharePoint/OneDrive, on-premises
//!   otherwise
//! - SaaS connectors never need a gateway
//! - everything else stays unknown
//!
//! A location that is still an unresolved parameter is never guessed.

use regex::{Regex, RegexBuilder};
use semlineage_core::{DataSource, GatewayConfig, GatewayRequirement, SourceType};

/// Host patterns of cloud-hosted database endpoints
const CLOUD_HOST_PATTERNS: &[&str] = &[
    r"\.database\.windows\.net$",
    r"\.sql\.azuresynapse\.net$",
    r"\.datawarehouse\.fabric\.microsoft\.com$",
    r"\.pbidedicated\.windows\.net$",
    r"\.asazure\.windows\.net",
    r"^asazure://",
    r"^powerbi://",
];

const CLOUD_FILE_MARKERS: &[&str] = &["sharepoint", "onedrive", "1drv.ms"];

#[derive(Debug, Clone)]
pub struct GatewayClassifier {
    cloud_hosts: Vec<Regex>,
}

impl Default for GatewayClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl GatewayClassifier {
    /// Classifier with the built-in cloud host patterns only
    pub fn new() -> Self {
        let cloud_hosts = CLOUD_HOST_PATTERNS
            .iter()
            .filter_map(|pattern| compile(pattern))
            .collect();
        Self { cloud_hosts }
    }

    /// Built-in patterns plus the configured extras
    ///
    /// Invalid configured patterns are logged and skipped.
    pub fn with_config(config: &GatewayConfig) -> Self {
        let mut classifier = Self::new();
        classifier
            .cloud_hosts
            .extend(config.cloud_host_patterns.iter().filter_map(|p| compile(p)));
        classifier
    }

    pub fn classify(&self, source: &DataSource) -> GatewayRequirement {
        match source.source_type {
            SourceType::SqlServer
            | SourceType::AnalysisServices
            | SourceType::Oracle
            | SourceType::Teradata
            | SourceType::SapHana
            | SourceType::Odbc => self.classify_server(source),

            SourceType::Excel | SourceType::Csv | SourceType::Folder => classify_file(source),

            SourceType::OData
            | SourceType::Web
            | SourceType::SharePointList
            | SourceType::SharePointFolder
            | SourceType::AzureBlobStorage
            | SourceType::AzureDataLake
            | SourceType::Dataverse
            | SourceType::Snowflake
            | SourceType::BigQuery
            | SourceType::PostgreSql
            | SourceType::MySql
            | SourceType::Dataflows
            | SourceType::AzureDataExplorer
            | SourceType::FabricLakehouse
            | SourceType::FabricWarehouse
            | SourceType::Databricks => GatewayRequirement::NotRequired,

            SourceType::Unknown => GatewayRequirement::Unknown,
        }
    }

    /// A known host is cloud or on-premises. A server that is a parameter
    /// with no literal value, or is missing, has no host to test, so the
    /// answer is `Unknown` rather than an on-premises guess.
    fn classify_server(&self, source: &DataSource) -> GatewayRequirement {
        if is_unresolved(source.server.as_ref(), source.server_resolved.as_ref(), source) {
            return GatewayRequirement::Unknown;
        }
        let Some(server) = source.effective_server() else {
            return GatewayRequirement::Unknown;
        };

        if self.is_cloud_host(server) {
            GatewayRequirement::NotRequired
        } else {
            GatewayRequirement::Required
        }
    }

    /// Match a server string against the cloud patterns after dropping a
    /// `tcp:` prefix and a `,port` suffix
    pub fn is_cloud_host(&self, server: &str) -> bool {
        let host = normalize_host(server);
        self.cloud_hosts.iter().any(|re| re.is_match(&host))
    }
}

fn classify_file(source: &DataSource) -> GatewayRequirement {
    let unresolved_path = is_unresolved(source.path.as_ref(), source.path_resolved.as_ref(), source);
    let unresolved_url = is_unresolved(source.url.as_ref(), source.url_resolved.as_ref(), source);
    if unresolved_path || unresolved_url {
        return GatewayRequirement::Unknown;
    }
    let Some(path) = source.effective_path() else {
        return GatewayRequirement::Unknown;
    };

    let lower = path.to_lowercase();
    if CLOUD_FILE_MARKERS.iter().any(|marker| lower.contains(marker)) {
        GatewayRequirement::NotRequired
    } else {
        GatewayRequirement::Required
    }
}

/// The field holds a parameter name that never resolved
fn is_unresolved(value: Option<&String>, resolved: Option<&String>, source: &DataSource) -> bool {
    match value {
        Some(value) => resolved.is_none() && source.parameters.iter().any(|p| p == value),
        None => false,
    }
}

fn normalize_host(server: &str) -> String {
    let lower = server.trim().to_lowercase();
    let host = lower.strip_prefix("tcp:").unwrap_or(&lower);
    let host = host.split(',').next().unwrap_or(host);
    host.trim().to_string()
}

fn compile(pattern: &str) -> Option<Regex> {
    match RegexBuilder::new(pattern).case_insensitive(true).build() {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "ignoring invalid cloud host pattern");
            None
        }
    }
}
