//! Configuration management for the blob relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use ethers::signers::LocalWallet;
use ethers::types::{Address, U256};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub relayer: RelayerConfig,
    pub chain: ChainConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub blob: BlobConfig,
    #[serde(default)]
    pub kzg: KzgConfig,
    pub wallet: WalletConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelayerConfig {
    pub poll_interval_ms: u64,
    /// Bounded wait for the concurrent fee/nonce reads
    pub rpc_timeout_ms: u64,
    /// How far back to look for the latest request on startup
    pub lookback_blocks: u64,
    pub health_check_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub contract_address: String,
    /// JSON ABI of the contract; the built-in interface is used when absent
    pub abi_path: Option<String>,
    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,
}

/// Safety margins, in wei, added on top of the observed fees
#[derive(Debug, Clone, Deserialize)]
pub struct FeeConfig {
    pub priority_fee_margin_wei: u64,
    pub max_fee_margin_wei: u64,
    pub blob_fee_margin_wei: u64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BlobConfig {
    pub max_blobs: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct KzgConfig {
    pub trusted_setup_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    pub private_key_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

fn default_gas_limit() -> u64 {
    2_500_000
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            priority_fee_margin_wei: 100_000_000,
            max_fee_margin_wei: 1_000_000_000,
            blob_fee_margin_wei: 1_000_000_000,
        }
    }
}

impl FeeConfig {
    pub fn priority_fee_margin(&self) -> U256 {
        U256::from(self.priority_fee_margin_wei)
    }

    pub fn max_fee_margin(&self) -> U256 {
        U256::from(self.max_fee_margin_wei)
    }

    pub fn blob_fee_margin(&self) -> U256 {
        U256::from(self.blob_fee_margin_wei)
    }
}

impl WalletConfig {
    /// Read the hex private key from the configured environment variable
    pub fn load_wallet(&self) -> Result<LocalWallet> {
        let key = env::var(&self.private_key_env)
            .with_context(|| format!("No wallet configured. Set {}", self.private_key_env))?;

        let bytes = hex::decode(key.trim().trim_start_matches("0x"))
            .with_context(|| format!("{} is not a hex private key", self.private_key_env))?;

        LocalWallet::from_bytes(&bytes).context("Invalid private key")
    }
}

impl Settings {
    /// Load settings from the configured file
    pub fn load() -> Result<Self> {
        let config_path = env::var("BLOB_RELAYER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from an explicit path
    pub fn load_from(config_path: &PathBuf) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    fn parse(raw: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(raw);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.chain.rpc_urls.is_empty() {
            anyhow::bail!("Chain {} has no RPC URLs configured", self.chain.name);
        }

        self.contract_address()?;

        if self.blob.max_blobs == Some(0) {
            anyhow::bail!("blob.max_blobs must be at least 1 when set");
        }

        if self.relayer.rpc_timeout_ms == 0 {
            anyhow::bail!("relayer.rpc_timeout_ms must be positive");
        }

        Ok(())
    }

    /// Parsed contract address
    pub fn contract_address(&self) -> Result<Address> {
        self.chain
            .contract_address
            .parse::<Address>()
            .with_context(|| format!("Invalid contract address: {}", self.chain.contract_address))
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex");

    re.replace_all(input, |cap: &regex::Captures| {
        env::var(&cap[1]).unwrap_or_default()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[relayer]
poll_interval_ms = 2000
rpc_timeout_ms = 5000
lookback_blocks = 1000
health_check_interval_secs = 30

[chain]
name = "holesky"
rpc_urls = ["http://localhost:8545"]
contract_address = "0x06fd9d0Ae9052A85989D0A30c60fB11753537f9A"

[wallet]
private_key_env = "RELAYER_PRIVATE_KEY"

[metrics]
enabled = false
port = 9090
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("BLOB_TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${BLOB_TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_from_file_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load_from(&file.path().to_path_buf()).unwrap();
        assert_eq!(settings.chain.gas_limit, 2_500_000);
        assert_eq!(settings.blob.max_blobs, None);
        assert!(settings.kzg.trusted_setup_path.is_none());
        assert_eq!(settings.fees.priority_fee_margin(), U256::from(100_000_000u64));
        assert!(settings.contract_address().is_ok());
    }

    #[test]
    fn test_rejects_missing_rpc_urls() {
        let raw = SAMPLE.replace(
            "rpc_urls = [\"http://localhost:8545\"]",
            "rpc_urls = []",
        );
        assert!(Settings::parse(&raw).is_err());
    }

    #[test]
    fn test_load_wallet_from_env() {
        use ethers::signers::Signer;

        env::set_var(
            "BLOB_TEST_WALLET_KEY",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        );
        let config = WalletConfig {
            private_key_env: "BLOB_TEST_WALLET_KEY".to_string(),
        };
        let wallet = config.load_wallet().unwrap();
        assert_eq!(
            format!("{:?}", wallet.address()),
            "0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266"
        );

        env::set_var("BLOB_TEST_WALLET_BAD", "not-hex");
        let bad = WalletConfig {
            private_key_env: "BLOB_TEST_WALLET_BAD".to_string(),
        };
        assert!(bad.load_wallet().is_err());

        let missing = WalletConfig {
            private_key_env: "BLOB_TEST_WALLET_UNSET".to_string(),
        };
        assert!(missing.load_wallet().is_err());
    }

    #[test]
    fn test_rejects_bad_contract_address() {
        let raw = SAMPLE.replace("0x06fd9d0Ae9052A85989D0A30c60fB11753537f9A", "0x");
        assert!(Settings::parse(&raw).is_err());
    }
}
