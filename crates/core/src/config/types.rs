use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::orchestrator::OrchestratorConfig;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub qc: QcConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("archivist.db")
}

/// Collection store layout.
///
/// Collections are directories below `root`. The three top-level
/// collections must be distinct.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Root directory of the managed collection store.
    pub root: PathBuf,
    #[serde(default = "default_ingestion_collection")]
    pub ingestion_collection: String,
    #[serde(default = "default_production_collection")]
    pub production_collection: String,
    #[serde(default = "default_orders_collection")]
    pub orders_collection: String,
}

fn default_ingestion_collection() -> String {
    "ingestion".to_string()
}

fn default_production_collection() -> String {
    "production".to_string()
}

fn default_orders_collection() -> String {
    "orders".to_string()
}

/// Quality-control backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QcConfig {
    /// Base URL of the QC job API (e.g., "http://qc.internal:8000")
    #[serde(default = "default_qc_url")]
    pub url: String,
    /// Bearer token for the QC job API
    #[serde(default)]
    pub api_key: Option<String>,
    /// Container image the backend should run
    #[serde(default)]
    pub image: Option<String>,
    /// HTTP request timeout in seconds (default: 30)
    #[serde(default = "default_qc_timeout")]
    pub timeout_secs: u64,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            url: default_qc_url(),
            api_key: None,
            image: None,
            timeout_secs: default_qc_timeout(),
        }
    }
}

fn default_qc_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_qc_timeout() -> u64 {
    30
}

/// Durable task queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// How long a consumed task stays invisible before it is redelivered.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            visibility_timeout_secs: default_visibility_timeout(),
        }
    }
}

fn default_visibility_timeout() -> u64 {
    300
}

/// Authorization configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Comma-delimited privileged identities, e.g. "alice,bob,".
    #[serde(default)]
    pub privileged_users: String,
    /// Whether privileged submitters skip the QC stage.
    #[serde(default)]
    pub auto_approve: bool,
    #[serde(default)]
    pub auto_approve_scope: AutoApproveScope,
}

/// When privilege is evaluated for the QC shortcut.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AutoApproveScope {
    /// Privilege captured once, when the batch is submitted.
    #[default]
    Batch,
    /// Privilege looked up again each time a QC submission is attempted.
    Submission,
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: SanitizedAuthConfig,
    pub qc: SanitizedQcConfig,
    pub queue: QueueConfig,
    pub orchestrator: OrchestratorConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub privileged_user_count: usize,
    pub auto_approve: bool,
    pub auto_approve_scope: AutoApproveScope,
}

/// Sanitized QC config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedQcConfig {
    pub url: String,
    pub api_key_configured: bool,
    pub image: Option<String>,
    pub timeout_secs: u64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let registry = crate::auth::AuthorizationRegistry::from_delimited(
            &config.auth.privileged_users,
        );
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            storage: config.storage.clone(),
            auth: SanitizedAuthConfig {
                privileged_user_count: registry.len(),
                auto_approve: config.auth.auto_approve,
                auto_approve_scope: config.auth.auto_approve_scope,
            },
            qc: SanitizedQcConfig {
                url: config.qc.url.clone(),
                api_key_configured: config
                    .qc
                    .api_key
                    .as_ref()
                    .is_some_and(|k| !k.is_empty()),
                image: config.qc.image.clone(),
                timeout_secs: config.qc.timeout_secs,
            },
            queue: config.queue.clone(),
            orchestrator: config.orchestrator.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal_config() {
        let toml = r#"
[storage]
root = "/srv/archive"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.storage.root.to_str().unwrap(), "/srv/archive");
        assert_eq!(config.storage.ingestion_collection, "ingestion");
        assert_eq!(config.storage.production_collection, "production");
        assert_eq!(config.storage.orders_collection, "orders");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "archivist.db");
        assert_eq!(config.queue.visibility_timeout_secs, 300);
        assert!(!config.auth.auto_approve);
        assert_eq!(config.auth.auto_approve_scope, AutoApproveScope::Batch);
    }

    #[test]
    fn test_deserialize_missing_storage_fails() {
        let toml = r#"
[server]
port = 8080
"#;
        let result: Result<Config, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_deserialize_auth_section() {
        let toml = r#"
[storage]
root = "/srv/archive"

[auth]
privileged_users = "alice,bob,"
auto_approve = true
auto_approve_scope = "submission"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.auth.privileged_users, "alice,bob,");
        assert!(config.auth.auto_approve);
        assert_eq!(config.auth.auto_approve_scope, AutoApproveScope::Submission);
    }

    #[test]
    fn test_deserialize_qc_section() {
        let toml = r#"
[storage]
root = "/srv/archive"

[qc]
url = "http://qc:9000"
api_key = "secret"
image = "registry/qc:1.2"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.qc.url, "http://qc:9000");
        assert_eq!(config.qc.api_key.as_deref(), Some("secret"));
        assert_eq!(config.qc.timeout_secs, 30);
    }

    #[test]
    fn test_sanitized_config_hides_api_key() {
        let toml = r#"
[storage]
root = "/srv/archive"

[auth]
privileged_users = "alice, bob ,,"

[qc]
api_key = "secret-key"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        assert!(sanitized.qc.api_key_configured);
        assert_eq!(sanitized.auth.privileged_user_count, 2);

        let json = serde_json::to_string(&sanitized).unwrap();
        assert!(!json.contains("secret-key"));
    }
}
