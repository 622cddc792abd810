//! Asgard application library
//!
//! Wires the keeper, the swap queue and the validator manager into a block
//! driver, and sets up config and tracing for an embedding binary.

pub mod dispatcher;
pub mod genesis;
pub mod node;

use std::path::Path;

use anyhow::Context;
use asgard_core::AppConfig;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

pub use dispatcher::{dispatch, HandlerResult};
pub use genesis::Genesis;
pub use node::{AsgardApp, BlockResult};

/// Read the application config from a JSON file
pub fn load_config(path: impl AsRef<Path>) -> anyhow::Result<AppConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
}

/// Build the tracing filter: `RUST_LOG` first, then the config directives
pub fn log_filter(config: &AppConfig) -> anyhow::Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env().add_directive("asgard=debug".parse::<Directive>()?);
    for directive in config.log_filter.split(',').filter(|d| !d.trim().is_empty()) {
        filter = filter.add_directive(
            directive
                .trim()
                .parse::<Directive>()
                .with_context(|| format!("invalid log directive {directive}"))?,
        );
    }
    Ok(filter)
}

/// Install the global subscriber; later calls are ignored
pub fn init_tracing(config: &AppConfig) -> anyhow::Result<()> {
    let filter = log_filter(config)?;
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_err() {
        tracing::debug!("tracing already initialised");
    }
    Ok(())
}

/// Load config, start tracing and build the app
pub fn run(config_path: impl AsRef<Path>) -> anyhow::Result<AsgardApp> {
    let config = load_config(config_path)?;
    init_tracing(&config)?;
    tracing::info!(environment = %config.environment, "Starting Asgard");
    AsgardApp::from_config(&config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use asgard_core::Environment;

    #[test]
    fn test_log_filter_accepts_config_directives() {
        let config = AppConfig {
            log_filter: "info,amm=trace".into(),
            ..AppConfig::default()
        };
        assert!(log_filter(&config).is_ok());

        let config = AppConfig {
            log_filter: "amm=loud".into(),
            ..AppConfig::default()
        };
        assert!(log_filter(&config).is_err());
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: AppConfig = serde_json::from_str(r#"{"environment":"mocknet"}"#).unwrap();
        assert_eq!(config.environment, Environment::Mocknet);
        assert_eq!(config.log_filter, "info");
        assert!(config.genesis_path.is_none());
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/asgard.json").unwrap_err();
        assert!(err.to_string().contains("failed to read config"));
    }
}
