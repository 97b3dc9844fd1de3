//! Wallet service configuration

use std::collections::BTreeMap;
use std::time::Duration;

use agentgrid_types::{Address, TokenId, NATIVE_DECIMALS};
use serde::{Deserialize, Serialize};

/// PYUSD on Ethereum mainnet
pub const PYUSD_MAINNET_ADDRESS: &str = "0x6c3ea9036406852006290770bedfcaba0e23a0e8";

const DEFAULT_RPC_URL: &str = "https://eth.llamarpc.com";
const DEFAULT_CUSTODY_NETWORK: &str = "datil-test";

/// A fungible token the service knows how to denominate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub symbol: String,
    pub decimals: u8,
}

/// Wallet service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WalletConfig {
    /// Chain the wallets sign for
    pub chain_id: u64,
    /// JSON-RPC endpoint of the chain client
    pub rpc_url: String,
    /// Name of the custody network or keystore namespace
    pub custody_network: String,
    /// Timeout for custody encryption during provisioning
    pub custody_timeout_secs: u64,
    /// Timeout for claim retrieval plus key release
    pub authorization_timeout_secs: u64,
    /// Timeout for gas estimation and for submission, each
    pub submission_timeout_secs: u64,
    /// Known token contracts
    pub tokens: BTreeMap<Address, TokenConfig>,
}

impl Default for WalletConfig {
    fn default() -> Self {
        let mut tokens = BTreeMap::new();
        if let Ok(pyusd) = Address::parse(PYUSD_MAINNET_ADDRESS) {
            tokens.insert(
                pyusd,
                TokenConfig {
                    symbol: "PYUSD".to_string(),
                    decimals: 6,
                },
            );
        }

        Self {
            chain_id: 1,
            rpc_url: DEFAULT_RPC_URL.to_string(),
            custody_network: DEFAULT_CUSTODY_NETWORK.to_string(),
            custody_timeout_secs: 30,
            authorization_timeout_secs: 30,
            submission_timeout_secs: 60,
            tokens,
        }
    }
}

impl WalletConfig {
    /// Create config from environment variables (after loading `.env`)
    ///
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        let pyusd_address = std::env::var("PYUSD_CONTRACT_ADDRESS")
            .ok()
            .and_then(|s| Address::parse(&s).ok())
            .or_else(|| Address::parse(PYUSD_MAINNET_ADDRESS).ok());
        let pyusd_decimals = env_parse("PYUSD_DECIMALS").unwrap_or(6);

        let mut tokens = BTreeMap::new();
        if let Some(address) = pyusd_address {
            tokens.insert(
                address,
                TokenConfig {
                    symbol: "PYUSD".to_string(),
                    decimals: pyusd_decimals,
                },
            );
        }

        Self {
            chain_id: env_parse("CHAIN_ID").unwrap_or(defaults.chain_id),
            rpc_url: std::env::var("ETH_RPC_URL").unwrap_or(defaults.rpc_url),
            custody_network: std::env::var("CUSTODY_NETWORK")
                .or_else(|_| std::env::var("LIT_NETWORK"))
                .unwrap_or(defaults.custody_network),
            custody_timeout_secs: env_parse("CUSTODY_TIMEOUT_SECS")
                .unwrap_or(defaults.custody_timeout_secs),
            authorization_timeout_secs: env_parse("AUTHORIZATION_TIMEOUT_SECS")
                .unwrap_or(defaults.authorization_timeout_secs),
            submission_timeout_secs: env_parse("SUBMISSION_TIMEOUT_SECS")
                .unwrap_or(defaults.submission_timeout_secs),
            tokens,
        }
    }

    pub fn custody_timeout(&self) -> Duration {
        Duration::from_secs(self.custody_timeout_secs)
    }

    pub fn authorization_timeout(&self) -> Duration {
        Duration::from_secs(self.authorization_timeout_secs)
    }

    pub fn submission_timeout(&self) -> Duration {
        Duration::from_secs(self.submission_timeout_secs)
    }

    /// Register (or replace) a token contract
    pub fn with_token(mut self, address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        self.tokens.insert(
            address,
            TokenConfig {
                symbol: symbol.into(),
                decimals,
            },
        );
        self
    }

    /// Decimals used to denominate amounts of `token`
    pub fn decimals_for(&self, token: &TokenId) -> Option<u8> {
        match token {
            TokenId::Native => Some(NATIVE_DECIMALS),
            TokenId::Contract(address) => self.tokens.get(address).map(|t| t.decimals),
        }
    }

    /// Mask credentials in the RPC URL for logging
    pub fn rpc_url_masked(&self) -> String {
        mask_url(&self.rpc_url)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn mask_url(url: &str) -> String {
    // Query strings commonly carry API keys
    let (base, query) = match url.split_once('?') {
        Some((base, _)) => (base, Some("***")),
        None => (url, None),
    };

    let mut masked = base.to_string();
    if let (Some(scheme_end), Some(at_pos)) = (base.find("://"), base.rfind('@')) {
        let user_pass = &base[scheme_end + 3..at_pos];
        if let Some((user, _)) = user_pass.split_once(':') {
            masked = format!("{}{}:***{}", &base[..scheme_end + 3], user, &base[at_pos..]);
        }
    }

    match query {
        Some(q) => format!("{masked}?{q}"),
        None => masked,
    }
}
