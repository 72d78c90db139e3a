use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Collection names are non-empty, single-segment and distinct
/// - Worker count, attempt limit and backoff bounds are sane
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    let collections = [
        ("storage.ingestion_collection", &config.storage.ingestion_collection),
        ("storage.production_collection", &config.storage.production_collection),
        ("storage.orders_collection", &config.storage.orders_collection),
    ];
    let mut seen = HashSet::new();
    for (key, name) in collections {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(invalid(&format!("{} cannot be empty", key)));
        }
        if trimmed.contains('/') || trimmed == "." || trimmed == ".." {
            return Err(invalid(&format!(
                "{} must be a single path segment, got '{}'",
                key, name
            )));
        }
        if !seen.insert(trimmed) {
            return Err(invalid(&format!("{} duplicates another collection", key)));
        }
    }

    let orch = &config.orchestrator;
    if orch.workers == 0 {
        return Err(invalid("orchestrator.workers must be at least 1"));
    }
    if orch.max_attempts == 0 {
        return Err(invalid("orchestrator.max_attempts must be at least 1"));
    }
    if orch.backoff_base_ms > orch.backoff_max_ms {
        return Err(invalid(
            "orchestrator.backoff_base_ms cannot exceed orchestrator.backoff_max_ms",
        ));
    }
    if orch.qc_max_polls_per_minute == 0 {
        return Err(invalid("orchestrator.qc_max_polls_per_minute must be at least 1"));
    }
    if orch.ticket_ttl_secs == 0 {
        return Err(invalid("orchestrator.ticket_ttl_secs must be at least 1"));
    }
    if config.queue.visibility_timeout_secs == 0 {
        return Err(invalid("queue.visibility_timeout_secs must be at least 1"));
    }

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base() -> Config {
        load_config_from_str(
            r#"
[storage]
root = "/srv/archive"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_duplicate_collections_fails() {
        let mut config = base();
        config.storage.orders_collection = "ingestion".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("orders_collection"));
    }

    #[test]
    fn test_validate_nested_collection_fails() {
        let mut config = base();
        config.storage.production_collection = "a/b".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = base();
        config.orchestrator.workers = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_backoff_bounds() {
        let mut config = base();
        config.orchestrator.backoff_base_ms = 10_000;
        config.orchestrator.backoff_max_ms = 1_000;
        assert!(validate_config(&config).is_err());
    }
}
