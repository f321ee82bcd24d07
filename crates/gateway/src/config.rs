//! Configuration from environment variables and command-line flags.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;
use thiserror::Error;

use crate::policy::AccessMatrix;

/// Port the Prometheus scrape endpoint binds to.
pub const METRICS_PORT: u16 = 4242;

/// Prefix of the role → event-patterns environment variables.
pub const RBAC_PREFIX: &str = "RANGO_RBAC_";

/// Command-line flags.
#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Real-time fan-out gateway")]
pub struct Flags {
    /// Bind address for the WebSocket listener; overrides RANGER_HOST/RANGER_PORT.
    #[arg(long = "ws-addr")]
    pub ws_addr: Option<String>,

    /// Path to the PEM public key used to validate bearer tokens.
    #[arg(long = "pub-key", default_value = "config/rsa-key.pub")]
    pub pub_key: PathBuf,

    /// Upstream bus topic to consume.
    #[arg(long, default_value = "rango.events")]
    pub exchange: String,
}

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("KAFKA_BROKERS is not set")]
    MissingBrokers,
}

/// Resolved process configuration.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Bind address for the WebSocket listener.
    pub listen_addr: String,
    /// Comma-separated upstream seed brokers.
    pub kafka_brokers: String,
    /// Upstream bus topic.
    pub exchange: String,
    /// Path to the PEM public key file.
    pub pub_key_path: PathBuf,
    /// Inline PEM public key, preferred over the file when set.
    pub inline_public_key: Option<String>,
    /// Role → permitted event patterns.
    pub rbac: AccessMatrix,
}

impl Settings {
    /// Resolve settings from flags and the process environment.
    pub fn from_env(flags: Flags) -> Result<Self, ConfigError> {
        let listen_addr = flags.ws_addr.unwrap_or_else(|| {
            format!(
                "{}:{}",
                env_or("RANGER_HOST", "0.0.0.0"),
                env_or("RANGER_PORT", "8080")
            )
        });

        let kafka_brokers = std::env::var("KAFKA_BROKERS")
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::MissingBrokers)?;

        let inline_public_key = std::env::var("JWT_PUBLIC_KEY")
            .ok()
            .filter(|v| !v.is_empty());

        let rbac = AccessMatrix::new(rbac_from_pairs(std::env::vars()));

        Ok(Self {
            listen_addr,
            kafka_brokers,
            exchange: flags.exchange,
            pub_key_path: flags.pub_key,
            inline_public_key,
            rbac,
        })
    }
}

/// Log filter directive, from `LOG_LEVEL`.
pub fn log_level() -> String {
    env_or("LOG_LEVEL", "debug")
}

fn env_or(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Build the role → patterns map from `RANGO_RBAC_<ROLE>` pairs. Role
/// names are lower-cased; pattern lists are comma-separated with blanks
/// discarded.
pub fn rbac_from_pairs(
    pairs: impl IntoIterator<Item = (String, String)>,
) -> HashMap<String, Vec<String>> {
    pairs
        .into_iter()
        .filter_map(|(key, value)| {
            let role = key.strip_prefix(RBAC_PREFIX)?;
            if role.is_empty() {
                return None;
            }
            let patterns: Vec<String> = value
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(String::from)
                .collect();
            Some((role.to_lowercase(), patterns))
        })
        .collect()
}
