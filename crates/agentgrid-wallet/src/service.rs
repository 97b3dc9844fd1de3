//! Agent wallet service facade
//!
//! Wires the provisioner, executor and their collaborators together once,
//! at construction. Callers own the service and pass it where needed.

use std::sync::Arc;

use agentgrid_ledger::{Clock, SpendingLedger, SystemClock};
use agentgrid_types::{
    AccessPredicate, Address, AgentId, AgentWallet, Amount, Result, SpendingLimits, TokenId,
    TransactionReceipt, TransactionRequest, WalletError,
};
use tokio::time::timeout;
use tracing::info;

use crate::access::{AccessPolicyEvaluator, ClaimSource};
use crate::chain::ChainClient;
use crate::config::WalletConfig;
use crate::custody::CustodyService;
use crate::executor::{ExecutorSettings, TransactionExecutor};
use crate::provisioner::WalletProvisioner;
use crate::store::{AgentLocks, KeyCustodyStore};

/// Provisioning, spending and balance queries for agent wallets
#[derive(Clone)]
pub struct AgentWalletService {
    config: WalletConfig,
    store: Arc<dyn KeyCustodyStore>,
    chain: Arc<dyn ChainClient>,
    ledger: SpendingLedger,
    locks: AgentLocks,
    clock: Arc<dyn Clock>,
    provisioner: WalletProvisioner,
    executor: TransactionExecutor,
}

impl AgentWalletService {
    pub fn new(
        config: WalletConfig,
        store: Arc<dyn KeyCustodyStore>,
        custody: Arc<dyn CustodyService>,
        claims: Arc<dyn ClaimSource>,
        chain: Arc<dyn ChainClient>,
    ) -> Self {
        Self::with_clock(config, store, custody, claims, chain, Arc::new(SystemClock))
    }

    /// Build the service around an explicit clock
    pub fn with_clock(
        config: WalletConfig,
        store: Arc<dyn KeyCustodyStore>,
        custody: Arc<dyn CustodyService>,
        claims: Arc<dyn ClaimSource>,
        chain: Arc<dyn ChainClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let ledger = SpendingLedger::new();
        let locks = AgentLocks::new();

        let provisioner =
            WalletProvisioner::new(store.clone(), custody.clone(), config.custody_timeout())
                .with_clock(clock.clone());
        let evaluator = AccessPolicyEvaluator::new(custody).with_clock(clock.clone());
        let executor = TransactionExecutor::new(
            store.clone(),
            ledger.clone(),
            evaluator,
            claims,
            chain.clone(),
            ExecutorSettings::from(&config),
        )
        .with_locks(locks.clone())
        .with_clock(clock.clone());

        info!(
            chain_id = config.chain_id,
            rpc_url = %config.rpc_url_masked(),
            custody_network = %config.custody_network,
            "Agent wallet service ready"
        );

        Self {
            config,
            store,
            chain,
            ledger,
            locks,
            clock,
            provisioner,
            executor,
        }
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn ledger(&self) -> &SpendingLedger {
        &self.ledger
    }

    pub fn locks(&self) -> &AgentLocks {
        &self.locks
    }

    /// Provision a wallet for `agent_id`
    pub async fn provision(&self, agent_id: AgentId, limits: SpendingLimits) -> Result<AgentWallet> {
        self.provisioner.provision(agent_id, limits).await
    }

    /// Provision with additional access predicates
    pub async fn provision_with_predicates(
        &self,
        agent_id: AgentId,
        limits: SpendingLimits,
        extra: Vec<AccessPredicate>,
    ) -> Result<AgentWallet> {
        self.provisioner
            .provision_with_predicates(agent_id, limits, extra)
            .await
    }

    pub async fn wallet(&self, agent_id: &AgentId) -> Result<AgentWallet> {
        self.store.get(agent_id).await
    }

    /// Execute a transaction for the request's agent
    pub async fn execute(&self, request: TransactionRequest) -> Result<TransactionReceipt> {
        let agent_id = request.agent_id.clone();
        self.executor.execute(&agent_id, request).await
    }

    /// Replace an agent's spending limits once no transaction is in flight
    pub async fn update_limits(&self, agent_id: &AgentId, limits: SpendingLimits) -> Result<AgentWallet> {
        let _exclusive = self.locks.exclusive(agent_id).await;
        let wallet = self.store.update_limits(agent_id, limits).await?;

        info!(
            agent_id = %agent_id,
            daily_limit = %wallet.spending_limits.daily_limit,
            per_transaction_limit = %wallet.spending_limits.per_transaction_limit,
            "Spending limits updated"
        );
        Ok(wallet)
    }

    /// Send native coin, with `amount` in whole-coin units (e.g. `"0.05"`)
    pub async fn transfer_from_agent(
        &self,
        agent_id: &AgentId,
        to: &str,
        amount: &str,
    ) -> Result<TransactionReceipt> {
        let recipient = Address::parse(to)?;
        let decimals = self.decimals_for(&TokenId::Native)?;
        let amount = Amount::parse_units(amount, decimals)?;
        self.execute(TransactionRequest::native(agent_id.clone(), recipient, amount))
            .await
    }

    /// Send a registered token, with `amount` in the token's display units
    pub async fn transfer_token(
        &self,
        agent_id: &AgentId,
        token: &Address,
        to: &str,
        amount: &str,
    ) -> Result<TransactionReceipt> {
        let recipient = Address::parse(to)?;
        let decimals = self.decimals_for(&TokenId::Contract(token.clone()))?;
        let amount = Amount::parse_units(amount, decimals)?;
        self.execute(TransactionRequest::token(
            agent_id.clone(),
            recipient,
            token.clone(),
            amount,
        ))
        .await
    }

    /// On-chain balance of the agent's wallet, formatted in display units
    pub async fn agent_balance(&self, agent_id: &AgentId, token: &TokenId) -> Result<String> {
        let decimals = self.decimals_for(token)?;
        let wallet = self.store.get(agent_id).await?;

        let balance = timeout(
            self.config.submission_timeout(),
            self.chain.balance(&wallet.address, token),
        )
        .await
        .map_err(|_| WalletError::internal("balance query timed out"))?
        .map_err(|e| WalletError::internal(format!("balance query failed: {e}")))?;

        Ok(balance.format_units(decimals))
    }

    /// Spend already committed or reserved for the agent today
    pub fn spent_today(&self, agent_id: &AgentId) -> Amount {
        self.ledger.spent(agent_id, self.clock.today())
    }

    /// Drop ledger entries for days before today
    pub fn prune_ledger(&self) -> usize {
        self.ledger.prune_before(self.clock.today())
    }

    fn decimals_for(&self, token: &TokenId) -> Result<u8> {
        self.config
            .decimals_for(token)
            .ok_or_else(|| WalletError::invalid_request(format!("token {token} is not registered")))
    }
}
