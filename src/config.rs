/// Command-line and environment configuration.
///
/// Every setting can come from a flag or from the environment variable the
/// deployment already uses (`DATABASE_URL`, `BLOCKCHAIN_RPC_URL`, ...).
use std::time::Duration;

use clap::Args;
use zeroize::Zeroizing;

use crate::anchor::worker::DEFAULT_QUEUE_CAPACITY;
use crate::anchor::{CallOptions, ChainConfig};

/// Ledger settings. All three of endpoint, key and contract are required
/// for anchoring; with any of them missing anchoring is disabled.
#[derive(Debug, Clone, Args)]
pub struct ChainArgs {
    /// JSON-RPC endpoint of the ledger node.
    #[arg(long, env = "BLOCKCHAIN_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Hex private key of the anchoring identity.
    #[arg(long, env = "BLOCKCHAIN_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Address of the deployed anchoring contract.
    #[arg(long, env = "BLOCKCHAIN_CONTRACT")]
    pub contract: Option<String>,

    /// Upper bound for any single node call, in seconds.
    #[arg(long, env = "CHAIN_CALL_TIMEOUT_SECS", default_value_t = 30)]
    pub call_timeout_secs: u64,
}

impl ChainArgs {
    /// Names of the required settings that are absent or empty.
    pub fn missing(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.rpc_url) {
            missing.push("BLOCKCHAIN_RPC_URL");
        }
        if is_blank(&self.private_key) {
            missing.push("BLOCKCHAIN_PRIVATE_KEY");
        }
        if is_blank(&self.contract) {
            missing.push("BLOCKCHAIN_CONTRACT");
        }
        missing
    }

    /// Build the chain config, consuming the key so only the zeroizing copy
    /// remains.
    pub fn into_chain_config(self) -> Option<ChainConfig> {
        if !self.missing().is_empty() {
            return None;
        }
        let options = CallOptions {
            timeout: Duration::from_secs(self.call_timeout_secs.max(1)),
        };
        Some(ChainConfig {
            rpc_url: self.rpc_url?,
            private_key: Zeroizing::new(self.private_key?),
            contract_address: self.contract?,
            options,
        })
    }
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Where readings are stored.
#[derive(Debug, Clone, Args)]
pub struct StoreArgs {
    /// PostgreSQL connection string.
    #[arg(long, env = "DATABASE_URL", required_unless_present = "in_memory")]
    pub database_url: Option<String>,

    /// Keep readings in process memory instead of PostgreSQL.
    #[arg(long, default_value_t = false)]
    pub in_memory: bool,
}

/// Settings for `serve`.
#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Address the HTTP API listens on.
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen: String,

    /// Pending anchor requests held before new ones are dropped.
    #[arg(long, env = "ANCHOR_QUEUE_CAPACITY", default_value_t = DEFAULT_QUEUE_CAPACITY)]
    pub queue_capacity: usize,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub chain: ChainArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(rpc: Option<&str>, key: Option<&str>, contract: Option<&str>) -> ChainArgs {
        ChainArgs {
            rpc_url: rpc.map(String::from),
            private_key: key.map(String::from),
            contract: contract.map(String::from),
            call_timeout_secs: 5,
        }
    }

    #[test]
    fn test_complete_settings_build_config() {
        let cfg = args(Some("http://localhost:8545"), Some("0xabc"), Some("0xdef"))
            .into_chain_config()
            .unwrap();
        assert_eq!(cfg.rpc_url, "http://localhost:8545");
        assert_eq!(cfg.private_key.as_str(), "0xabc");
        assert_eq!(cfg.options.timeout, Duration::from_secs(5));
        assert!(!format!("{cfg:?}").contains("0xabc"));
    }

    #[test]
    fn test_any_missing_setting_disables_anchoring() {
        assert!(args(None, Some("k"), Some("c")).into_chain_config().is_none());
        assert!(args(Some("u"), None, Some("c")).into_chain_config().is_none());
        assert!(args(Some("u"), Some("k"), Some("  ")).into_chain_config().is_none());
        assert_eq!(
            args(None, None, Some("c")).missing(),
            vec!["BLOCKCHAIN_RPC_URL", "BLOCKCHAIN_PRIVATE_KEY"]
        );
    }
}
