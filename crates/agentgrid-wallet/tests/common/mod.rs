#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use agentgrid_crypto::ClaimSigner;
use agentgrid_ledger::FixedClock;
use agentgrid_types::{Address, AgentId, AgentWallet, Amount, RequesterClaim, SpendingLimits, TokenId};
use agentgrid_wallet::{
    AgentWalletService, ClaimError, ClaimSource, InMemoryChain, InMemoryKeyStore, SigningClaimIssuer,
    SoftwareKeystore, WalletConfig,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tracing_subscriber::EnvFilter;

pub const ISSUER: &str = "agentgrid";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn addr(byte: u8) -> Address {
    Address::from_bytes([byte; 20])
}

pub fn pyusd() -> Address {
    Address::parse(agentgrid_wallet::PYUSD_MAINNET_ADDRESS).unwrap()
}

/// A fully wired service over in-process collaborators
pub struct Harness {
    pub service: AgentWalletService,
    pub chain: InMemoryChain,
    pub store: Arc<InMemoryKeyStore>,
    pub clock: Arc<FixedClock>,
    pub issuer: Arc<SigningClaimIssuer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: WalletConfig) -> Self {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let issuer = Arc::new(
            SigningClaimIssuer::new(ISSUER, ClaimSigner::from_bytes(&[11u8; 32]))
                .with_clock(clock.clone()),
        );
        Self::assemble(config, clock, issuer.clone(), issuer)
    }

    /// Same wiring, but claims come from `claims`
    pub fn with_claims(config: WalletConfig, claims: Arc<dyn ClaimSource>) -> Self {
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let issuer = Arc::new(
            SigningClaimIssuer::new(ISSUER, ClaimSigner::from_bytes(&[11u8; 32]))
                .with_clock(clock.clone()),
        );
        Self::assemble(config, clock, issuer, claims)
    }

    fn assemble(
        config: WalletConfig,
        clock: Arc<FixedClock>,
        issuer: Arc<SigningClaimIssuer>,
        claims: Arc<dyn ClaimSource>,
    ) -> Self {
        let store = Arc::new(InMemoryKeyStore::new());
        let chain = InMemoryChain::new();
        let custody = Arc::new(
            SoftwareKeystore::new([42u8; 32], config.custody_network.clone())
                .with_clock(clock.clone()),
        );

        let service = AgentWalletService::with_clock(
            config,
            store.clone(),
            custody,
            claims,
            Arc::new(chain.clone()),
            clock.clone(),
        );

        Self {
            service,
            chain,
            store,
            clock,
            issuer,
        }
    }

    /// Provision `agent` and give its wallet plenty of native coin and PYUSD
    pub async fn funded_wallet(&self, agent: &str, limits: SpendingLimits) -> AgentWallet {
        let wallet = self
            .service
            .provision(AgentId::new(agent), limits)
            .await
            .unwrap();
        self.fund(&wallet).await;
        wallet
    }

    pub async fn fund(&self, wallet: &AgentWallet) {
        self.chain
            .set_balance(&wallet.address, TokenId::Native, Amount(u128::MAX / 2))
            .await;
        self.chain
            .set_balance(&wallet.address, TokenId::Contract(pyusd()), Amount(1_000_000_000))
            .await;
    }
}

pub fn test_config() -> WalletConfig {
    WalletConfig {
        custody_network: "test".to_string(),
        authorization_timeout_secs: 1,
        submission_timeout_secs: 1,
        ..WalletConfig::default()
    }
}

pub fn limits(daily: u128, per_transaction: u128) -> SpendingLimits {
    SpendingLimits::new(Amount(daily), Amount(per_transaction))
}

/// Always claims to be someone else
pub struct ImpostorClaims;

#[async_trait]
impl ClaimSource for ImpostorClaims {
    async fn claim_for(&self, _wallet: &AgentWallet) -> Result<RequesterClaim, ClaimError> {
        Ok(RequesterClaim::new(AgentId::new("impostor"), ISSUER))
    }
}

/// Never answers within any reasonable timeout
pub struct StalledClaims;

#[async_trait]
impl ClaimSource for StalledClaims {
    async fn claim_for(&self, wallet: &AgentWallet) -> Result<RequesterClaim, ClaimError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(RequesterClaim::new(wallet.agent_id.clone(), ISSUER))
    }
}
