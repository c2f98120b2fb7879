//! Network definitions for Conflux chains

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Chain id of Conflux core space mainnet
pub const MAINNET_CHAIN_ID: u64 = 1029;

/// Chain id of Conflux core space testnet
pub const TESTNET_CHAIN_ID: u64 = 1;

/// Network configuration for blockchain interaction
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network name (e.g., "conflux", "conflux-testnet", "local")
    #[serde(default)]
    pub name: String,
    /// RPC endpoint URL
    pub url: String,
    /// Chain ID
    pub chain_id: u64,
    /// Hex encoded private keys of the accounts used to sign transactions
    #[serde(default)]
    pub accounts: Vec<String>,
    /// Multiplier applied to estimated gas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_multiplier: Option<f64>,
}

impl NetworkConfig {
    /// Create configuration for Conflux mainnet
    pub fn mainnet() -> Self {
        Self::custom("conflux", "https://main.confluxrpc.com", MAINNET_CHAIN_ID)
    }

    /// Create configuration for Conflux testnet
    pub fn testnet() -> Self {
        Self::custom("conflux-testnet", "https://test.confluxrpc.com", TESTNET_CHAIN_ID)
    }

    /// Create configuration for a local development node
    pub fn local() -> Self {
        Self::custom("local", "http://localhost:12537", 2029)
    }

    /// Create custom network configuration
    pub fn custom(name: impl Into<String>, url: impl Into<String>, chain_id: u64) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            chain_id,
            accounts: Vec::new(),
            gas_multiplier: None,
        }
    }

    /// Adds a signing account
    pub fn with_account(mut self, private_key: impl Into<String>) -> Self {
        self.accounts.push(private_key.into());
        self
    }

    /// Built-in network for a well known name
    pub fn preset(name: &str) -> Option<Self> {
        match name {
            "conflux" | "mainnet" => Some(Self::mainnet()),
            "conflux-testnet" | "testnet" => Some(Self::testnet()),
            "local" => Some(Self::local()),
            _ => None,
        }
    }

    pub fn is_testnet(&self) -> bool {
        self.chain_id == TESTNET_CHAIN_ID
    }

    /// Validates the endpoint and account keys
    pub fn validate(&self) -> Result<()> {
        let scheme_ok = ["http://", "https://", "ws://", "wss://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme));
        if !scheme_ok {
            return Err(eyre::eyre!(
                "Network {} has an invalid url: {:?}",
                self.name,
                self.url
            ));
        }

        for (index, key) in self.accounts.iter().enumerate() {
            let digits = key.strip_prefix("0x").unwrap_or(key);
            if digits.len() != 64 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(eyre::eyre!(
                    "Network {} account #{} is not a 32-byte hex private key",
                    self.name,
                    index
                ));
            }
        }

        if let Some(multiplier) = self.gas_multiplier {
            if multiplier.is_nan() || multiplier <= 0.0 {
                return Err(eyre::eyre!(
                    "Network {} has a non-positive gas multiplier: {}",
                    self.name,
                    multiplier
                ));
            }
        }

        Ok(())
    }
}

// Private keys stay out of logs
impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("name", &self.name)
            .field("url", &self.url)
            .field("chain_id", &self.chain_id)
            .field("accounts", &format_args!("[{} redacted]", self.accounts.len()))
            .field("gas_multiplier", &self.gas_multiplier)
            .finish()
    }
}
