// Configuration management with layered configuration (defaults, file, env)

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

use crate::db::query::{is_read_statement, SqlValue};
use crate::errors::ValidationError;
use crate::retry::FixedDelay;

/// Main settings structure containing all configuration options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub reports: Vec<ReportDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// HTTP path prefix the service is mounted under
    #[serde(default = "default_root_path")]
    pub root_path: String,
}

fn default_root_path() -> String {
    "/".to_string()
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub name: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub acquire_timeout_seconds: u64,
    pub connect_retries: u32,
    pub retry_delay_seconds: u64,
}

impl DatabaseConfig {
    /// Retry policy applied by the database client when acquiring a connection
    pub fn connect_policy(&self) -> FixedDelay {
        FixedDelay::new(
            self.connect_retries,
            Duration::from_secs(self.retry_delay_seconds),
        )
    }
}

// Keep the password out of logs
impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("user", &self.user)
            .field("password", &"***")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("name", &self.name)
            .field("min_connections", &self.min_connections)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_seconds", &self.acquire_timeout_seconds)
            .field("connect_retries", &self.connect_retries)
            .field("retry_delay_seconds", &self.retry_delay_seconds)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    /// Log file written alongside console output; None disables the file sink
    pub log_file: Option<String>,
    pub tracing_endpoint: Option<String>,
}

/// A named read-only report exposed under `/reports/{name}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub query: String,
    /// Query-string parameters bound to the statement placeholders, in order
    #[serde(default)]
    pub params: Vec<ReportParam>,
}

/// Postgres-facing type a report parameter is parsed into before binding
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    #[default]
    Text,
    Int,
    Float,
    Bool,
}

/// A declared report parameter: a bare name (text) or `{ name = "...", type = "int" }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawReportParam")]
pub struct ReportParam {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: ParamKind,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawReportParam {
    Name(String),
    Typed {
        name: String,
        #[serde(default, rename = "type")]
        kind: ParamKind,
    },
}

impl From<RawReportParam> for ReportParam {
    fn from(raw: RawReportParam) -> Self {
        match raw {
            RawReportParam::Name(name) => ReportParam::new(name, ParamKind::Text),
            RawReportParam::Typed { name, kind } => ReportParam::new(name, kind),
        }
    }
}

impl ReportParam {
    pub fn new(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Parse a raw query-string value into a typed bind parameter
    pub fn parse(&self, raw: &str) -> Result<SqlValue, ValidationError> {
        let invalid = |expected: &str| ValidationError::InvalidFieldValue {
            field: self.name.clone(),
            reason: format!("expected {}, got '{}'", expected, raw),
        };

        match self.kind {
            ParamKind::Text => Ok(SqlValue::Text(raw.to_string())),
            ParamKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(SqlValue::Int)
                .map_err(|_| invalid("an integer")),
            ParamKind::Float => raw
                .trim()
                .parse::<f64>()
                .map(SqlValue::Float)
                .map_err(|_| invalid("a number")),
            ParamKind::Bool => raw
                .trim()
                .parse::<bool>()
                .map(SqlValue::Bool)
                .map_err(|_| invalid("true or false")),
        }
    }
}

/// Flat environment variables understood in addition to the `APP__` layer
const FLAT_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("DB_USER", "database.user"),
    ("DB_PASS", "database.password"),
    ("DB_HOST", "database.host"),
    ("DB_PORT", "database.port"),
    ("DB_NAME", "database.name"),
    ("ROOT_PATH", "server.root_path"),
];

impl Settings {
    /// Load configuration with layered precedence: defaults → file → env
    pub fn load() -> Result<Self, ConfigError> {
        // A missing .env file is fine; real deployments set the environment directly
        let _ = dotenvy::dotenv();
        Self::load_from_path("config")
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(config_dir: P) -> Result<Self, ConfigError> {
        let config_dir = config_dir.as_ref();
        let defaults = Config::try_from(&Settings::default())?;

        let mut builder = Config::builder()
            .add_source(defaults)
            // Start with default configuration
            .add_source(File::from(config_dir.join("default.toml")).required(false))
            // Add local configuration (not committed to git)
            .add_source(File::from(config_dir.join("local.toml")).required(false))
            // Add environment-specific configuration
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in FLAT_ENV_OVERRIDES {
            builder = builder.set_override_option(*key, std::env::var(var).ok())?;
        }

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Validate configuration settings
    pub fn validate(&self) -> Result<(), String> {
        // Validate server config
        if self.server.port == 0 {
            return Err("Server port must be greater than 0".to_string());
        }
        if !self.server.root_path.starts_with('/') {
            return Err(format!(
                "Root path must start with '/', got '{}'",
                self.server.root_path
            ));
        }

        // Validate database config
        if self.database.host.is_empty() {
            return Err("Database host cannot be empty".to_string());
        }
        if self.database.name.is_empty() {
            return Err("Database name cannot be empty".to_string());
        }
        if self.database.port == 0 {
            return Err("Database port must be greater than 0".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.database.min_connections > self.database.max_connections {
            return Err("Database min_connections cannot exceed max_connections".to_string());
        }

        // Validate reports
        let mut names = HashSet::new();
        for report in &self.reports {
            if report.name.is_empty() {
                return Err("Report name cannot be empty".to_string());
            }
            if !names.insert(report.name.as_str()) {
                return Err(format!("Duplicate report name '{}'", report.name));
            }
            if !is_read_statement(&report.query) {
                return Err(format!(
                    "Report '{}' must be a SELECT statement",
                    report.name
                ));
            }
        }

        Ok(())
    }

    /// Normalised root path: "/" or a prefix without trailing slash
    pub fn root_path(&self) -> &str {
        let trimmed = self.server.root_path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/"
        } else {
            trimmed
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8000,
                root_path: default_root_path(),
            },
            database: DatabaseConfig {
                user: "postgres".to_string(),
                password: String::new(),
                host: "localhost".to_string(),
                port: 5432,
                name: "postgres".to_string(),
                min_connections: 1,
                max_connections: 10,
                acquire_timeout_seconds: 30,
                connect_retries: 3,
                retry_delay_seconds: 2,
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_file: Some("app.log".to_string()),
                tracing_endpoint: None,
            },
            reports: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_settings_are_valid() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.database.min_connections, 1);
        assert_eq!(settings.database.max_connections, 10);
    }

    #[test]
    fn test_validation_catches_zero_port() {
        let mut settings = Settings::default();
        settings.server.port = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_inverted_pool_bounds() {
        let mut settings = Settings::default();
        settings.database.min_connections = 11;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_catches_relative_root_path() {
        let mut settings = Settings::default();
        settings.server.root_path = "api".to_string();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_write_reports() {
        let mut settings = Settings::default();
        settings.reports.push(ReportDefinition {
            name: "purge".to_string(),
            description: String::new(),
            query: "DELETE FROM returns".to_string(),
            params: vec![],
        });
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_duplicate_reports() {
        let mut settings = Settings::default();
        let report = ReportDefinition {
            name: "summary".to_string(),
            description: String::new(),
            query: "SELECT 1".to_string(),
            params: vec![],
        };
        settings.reports.push(report.clone());
        settings.reports.push(report);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_root_path_normalisation() {
        let mut settings = Settings::default();
        assert_eq!(settings.root_path(), "/");
        settings.server.root_path = "/gstin/".to_string();
        assert_eq!(settings.root_path(), "/gstin");
    }

    #[test]
    fn test_connect_policy_from_config() {
        let settings = Settings::default();
        let policy = settings.database.connect_policy();
        assert_eq!(policy, FixedDelay::new(3, Duration::from_secs(2)));
    }

    #[test]
    fn test_debug_hides_password() {
        let mut settings = Settings::default();
        settings.database.password = "hunter2".to_string();
        let rendered = format!("{:?}", settings.database);
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn test_load_from_file_layers_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9100

[[reports]]
name = "filings"
query = "SELECT * FROM filings WHERE gstin = %s"
params = ["gstin"]
"#
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(settings.server.port, 9100);
        assert_eq!(settings.database.max_connections, 10);
        assert_eq!(settings.reports.len(), 1);
        assert_eq!(
            settings.reports[0].params,
            vec![ReportParam::new("gstin", ParamKind::Text)]
        );
    }

    #[test]
    fn test_load_typed_report_params() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("default.toml")).unwrap();
        writeln!(
            file,
            r#"
[[reports]]
name = "turnover"
query = "SELECT * FROM returns WHERE gstin = %s AND year = %s"
params = ["gstin", {{ name = "year", type = "int" }}]
"#
        )
        .unwrap();

        let settings = Settings::load_from_path(dir.path()).unwrap();
        assert_eq!(
            settings.reports[0].params,
            vec![
                ReportParam::new("gstin", ParamKind::Text),
                ReportParam::new("year", ParamKind::Int),
            ]
        );
    }

    #[test]
    fn test_report_param_parsing() {
        let year = ReportParam::new("year", ParamKind::Int);
        assert_eq!(year.parse("2024").unwrap(), SqlValue::Int(2024));
        assert!(matches!(
            year.parse("FY24"),
            Err(ValidationError::InvalidFieldValue { ref field, .. }) if field == "year"
        ));

        let rate = ReportParam::new("rate", ParamKind::Float);
        assert_eq!(rate.parse("18.5").unwrap(), SqlValue::Float(18.5));

        let active = ReportParam::new("active", ParamKind::Bool);
        assert_eq!(active.parse("true").unwrap(), SqlValue::Bool(true));

        let gstin = ReportParam::new("gstin", ParamKind::Text);
        assert_eq!(
            gstin.parse("29AAACB1234F1Z5").unwrap(),
            SqlValue::Text("29AAACB1234F1Z5".to_string())
        );
    }
}
