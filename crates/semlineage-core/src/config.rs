//! Configuration schema (semlineage.toml)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::diagnostic::{DiagnosticCode, Severity};

/// Severity threshold overrides for specific diagnostic codes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SeverityThreshold {
    /// Map of diagnostic code to severity override
    #[serde(default)]
    pub overrides: HashMap<String, Severity>,
}

impl SeverityThreshold {
    /// Get severity for a diagnostic code, or default
    pub fn get_severity(&self, code: DiagnosticCode, default: Severity) -> Severity {
        self.overrides
            .get(code.as_str())
            .copied()
            .unwrap_or(default)
    }

    /// Set severity override for a code
    pub fn set_override(&mut self, code: DiagnosticCode, severity: Severity) {
        self.overrides.insert(code.as_str().to_string(), severity);
    }
}

/// Lineage graph options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LineageConfig {
    /// Tables left out of the lineage graph (glob patterns, `*` wildcard)
    #[serde(default)]
    pub skip_tables: Vec<String>,
}

impl LineageConfig {
    /// Check if a table should be left out of the graph
    pub fn is_table_skipped(&self, table: &str) -> bool {
        self.skip_tables.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, table)
            } else {
                pattern == table
            }
        })
    }
}

/// Gateway classification options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Extra regular expressions matched (case-insensitively) against server
    /// host names to treat them as cloud endpoints
    #[serde(default)]
    pub cloud_host_patterns: Vec<String>,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Redact server, database, url and path values in reports
    /// This is useful for privacy/security when sharing reports or logs
    #[serde(default)]
    pub redact_sensitive_data: bool,

    /// Severity thresholds
    #[serde(default)]
    pub severity: SeverityThreshold,

    /// Lineage graph options
    #[serde(default)]
    pub lineage: LineageConfig,

    /// Gateway classification options
    #[serde(default)]
    pub gateway: GatewayConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

/// Simple glob matching (supports a single * wildcard)
fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern == "*" || pattern == "**" {
        return true;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];

        text.len() >= prefix.len() + suffix.len()
            && text.starts_with(prefix)
            && text.ends_with(suffix)
    } else {
        pattern == text
    }
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.lineage.skip_tables.is_empty());
        assert!(config.gateway.cloud_host_patterns.is_empty());
        assert!(!config.redact_sensitive_data);
    }

    #[test]
    fn severity_override() {
        let mut threshold = SeverityThreshold::default();
        threshold.set_override(DiagnosticCode::TmdlUnsupportedFile, Severity::Info);

        assert_eq!(
            threshold.get_severity(DiagnosticCode::TmdlUnsupportedFile, Severity::Warn),
            Severity::Info
        );
        assert_eq!(
            threshold.get_severity(DiagnosticCode::TmdlOrphanObject, Severity::Warn),
            Severity::Warn
        );
    }

    #[test]
    fn skip_table_patterns() {
        let rules = LineageConfig {
            skip_tables: vec!["LocalDateTable_*".to_string(), "Scratch".to_string()],
        };

        assert!(rules.is_table_skipped("LocalDateTable_0b1c"));
        assert!(rules.is_table_skipped("Scratch"));
        assert!(!rules.is_table_skipped("Sales"));
    }

    #[test]
    fn config_from_toml() {
        let config = Config::from_toml(
            r#"
            redact_sensitive_data = true

            [severity.overrides]
            TMDL_UNSUPPORTED_FILE = "info"

            [lineage]
            skip_tables = ["DateTableTemplate_*"]

            [gateway]
            cloud_host_patterns = ["\\.corp-cloud\\.example$"]
            "#,
        )
        .unwrap();

        assert!(config.redact_sensitive_data);
        assert!(config.lineage.is_table_skipped("DateTableTemplate_42"));
        assert_eq!(config.gateway.cloud_host_patterns.len(), 1);
        assert_eq!(
            config.severity.get_severity(DiagnosticCode::TmdlUnsupportedFile, Severity::Warn),
            Severity::Info
        );
    }

    #[test]
    fn config_toml_roundtrip() {
        let mut config = Config::default();
        config.lineage.skip_tables.push("Temp*".to_string());
        let toml = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn glob_matching() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("Local*", "LocalDateTable"));
        assert!(glob_match("*_tmp", "sales_tmp"));
        assert!(!glob_match("ab*ba", "aba"));
        assert!(!glob_match("Local*", "Sales"));
    }
}
