//! Configuration for quibd.
//!
//! Loads settings from a TOML file (default /etc/quib/config.toml) with
//! per-field defaults, so a partial file or no file at all still yields a
//! runnable daemon.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Default config file path.
pub const CONFIG_PATH: &str = "/etc/quib/config.toml";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub chain: ChainConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the HTTP listener.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

fn default_bind_addr() -> String {
    "127.0.0.1:7410".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    "/var/lib/quib/quib.db".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HS256 signing secret for access tokens. Must be set and at least
    /// 32 characters in a real deployment.
    #[serde(default)]
    pub jwt_secret: String,

    /// Token lifetime in seconds.
    #[serde(default = "default_jwt_expiry")]
    pub jwt_expiry_secs: u64,

    /// Wallet addresses allowed to call the admin/dev endpoints.
    #[serde(default)]
    pub dev_wallets: Vec<String>,

    /// Whether the evolution override endpoint is enabled at all.
    #[serde(default)]
    pub enable_evolution_test: bool,
}

fn default_jwt_expiry() -> u64 {
    7 * 24 * 3600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            jwt_expiry_secs: default_jwt_expiry(),
            dev_wallets: Vec::new(),
            enable_evolution_test: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// API key. Empty disables AI features; every call falls back to its
    /// neutral default.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_openai_url")]
    pub api_url: String,

    /// Model for creature replies.
    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Cheaper model for sentiment, keywords and short generations.
    #[serde(default = "default_light_model")]
    pub light_model: String,

    #[serde(default = "default_openai_timeout")]
    pub timeout_secs: u64,
}

fn default_openai_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4".to_string()
}

fn default_light_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_openai_timeout() -> u64 {
    30
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_url: default_openai_url(),
            chat_model: default_chat_model(),
            light_model: default_light_model(),
            timeout_secs: default_openai_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    /// JSON-RPC endpoint for token balance reads.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    #[serde(default = "default_chain_id")]
    pub chain_id: u64,

    /// ERC-20 contract holding the reward token.
    #[serde(default = "default_token_contract")]
    pub token_contract: String,

    #[serde(default = "default_token_decimals")]
    pub token_decimals: u32,

    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

fn default_rpc_url() -> String {
    "https://bsc-dataseed.binance.org/".to_string()
}

fn default_chain_id() -> u64 {
    56
}

fn default_token_contract() -> String {
    "0x0000000000000000000000000000000000000000".to_string()
}

fn default_token_decimals() -> u32 {
    18
}

fn default_rpc_timeout() -> u64 {
    10
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: default_chain_id(),
            token_contract: default_token_contract(),
            token_decimals: default_token_decimals(),
            timeout_secs: default_rpc_timeout(),
        }
    }
}

impl Config {
    /// Load from the given path, falling back to defaults when the file
    /// is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| format!("Failed to parse config: {}", path.display()))?;
            info!("Loaded config from {}", path.display());
            config
        } else {
            warn!("No config at {}, using defaults", path.display());
            Config::default()
        };

        if config.openai.api_key.is_empty() {
            warn!("openai.api_key not set; AI features degrade to defaults");
        }
        Ok(config)
    }

    /// Startup validation of the bits that must not be left defaulted.
    pub fn validate(&self) -> Result<()> {
        if self.auth.jwt_secret.is_empty() {
            bail!("auth.jwt_secret is required");
        }
        if self.auth.jwt_secret.len() < 32 {
            bail!("auth.jwt_secret must be at least 32 characters");
        }
        Ok(())
    }

    pub fn is_dev_wallet(&self, wallet: &str) -> bool {
        let wallet = wallet.to_lowercase();
        self.auth
            .dev_wallets
            .iter()
            .any(|w| w.to_lowercase() == wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [auth]
            jwt_secret = "0123456789abcdef0123456789abcdef"

            [openai]
            api_key = "sk-test"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind_addr, "127.0.0.1:7410");
        assert_eq!(config.chain.chain_id, 56);
        assert_eq!(config.openai.chat_model, "gpt-4");
        assert_eq!(config.auth.jwt_expiry_secs, 7 * 24 * 3600);
        config.validate().unwrap();
    }

    #[test]
    fn load_reads_file_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        // Absent file falls back to defaults.
        let config = Config::load(&path).unwrap();
        assert_eq!(config.database.path, "/var/lib/quib/quib.db");

        fs::write(
            &path,
            r#"
            [server]
            bind_addr = "0.0.0.0:9000"

            [database]
            path = "/tmp/quib-test.db"
            "#,
        )
        .unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.server.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.database.path, "/tmp/quib-test.db");
    }

    #[test]
    fn short_secret_rejected() {
        let mut config = Config::default();
        assert!(config.validate().is_err());
        config.auth.jwt_secret = "short".to_string();
        assert!(config.validate().is_err());
        config.auth.jwt_secret = "0123456789abcdef0123456789abcdef".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn dev_wallet_match_is_case_insensitive() {
        let mut config = Config::default();
        config.auth.dev_wallets = vec!["0xAbCd00000000000000000000000000000000ef12".to_string()];
        assert!(config.is_dev_wallet("0xabcd00000000000000000000000000000000EF12"));
        assert!(!config.is_dev_wallet("0x1111111111111111111111111111111111111111"));
    }
}
