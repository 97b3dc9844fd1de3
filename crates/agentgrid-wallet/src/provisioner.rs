//! Wallet provisioning

use std::sync::Arc;
use std::time::Duration;

use agentgrid_crypto::EvmKeypair;
use agentgrid_ledger::{Clock, SystemClock};
use agentgrid_types::{
    AccessPolicy, AccessPredicate, AgentId, AgentWallet, Result, SpendingLimits, WalletError,
};
use tracing::info;

use crate::custody::CustodyService;
use crate::store::KeyCustodyStore;

/// Creates signing identities and their custody records
#[derive(Clone)]
pub struct WalletProvisioner {
    store: Arc<dyn KeyCustodyStore>,
    custody: Arc<dyn CustodyService>,
    custody_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl WalletProvisioner {
    pub fn new(
        store: Arc<dyn KeyCustodyStore>,
        custody: Arc<dyn CustodyService>,
        custody_timeout: Duration,
    ) -> Self {
        Self {
            store,
            custody,
            custody_timeout,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Provision a wallet whose key only the agent itself can release
    pub async fn provision(&self, agent_id: AgentId, limits: SpendingLimits) -> Result<AgentWallet> {
        self.provision_with_predicates(agent_id, limits, Vec::new())
            .await
    }

    /// Provision a wallet whose access policy also requires `extra`
    /// predicates after the agent-id equality
    pub async fn provision_with_predicates(
        &self,
        agent_id: AgentId,
        limits: SpendingLimits,
        extra: Vec<AccessPredicate>,
    ) -> Result<AgentWallet> {
        if agent_id.as_str().trim().is_empty() {
            return Err(WalletError::invalid_request("agent id must not be empty"));
        }
        if self.store.contains(&agent_id).await {
            return Err(WalletError::DuplicateAgent {
                agent_id: agent_id.to_string(),
            });
        }

        let access_policy = extra
            .into_iter()
            .fold(AccessPolicy::for_agent(&agent_id), AccessPolicy::with);

        let keypair = EvmKeypair::generate();
        let address = keypair.address();
        let public_key = keypair.public_key_hex();
        let secret = keypair.into_secret();

        let encrypted = tokio::time::timeout(
            self.custody_timeout,
            self.custody.encrypt(&secret, &access_policy),
        )
        .await;
        // Raw key material ends here on every path
        drop(secret);

        let encrypted_private_key = encrypted
            .map_err(|_| WalletError::internal("custody encryption timed out"))?
            .map_err(|e| WalletError::internal(format!("custody encryption failed: {e}")))?;

        let wallet = AgentWallet {
            agent_id,
            address,
            public_key,
            encrypted_private_key,
            access_policy,
            spending_limits: limits,
            created_at: self.clock.now(),
        };

        self.store.put(wallet.clone()).await?;

        info!(
            agent_id = %wallet.agent_id,
            address = %wallet.address,
            predicates = wallet.access_policy.predicates.len(),
            daily_limit = %wallet.spending_limits.daily_limit,
            "Wallet provisioned"
        );

        Ok(wallet)
    }
}
