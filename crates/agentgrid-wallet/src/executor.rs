//! Transaction execution pipeline
//!
//! ```text
//! Pending → PolicyChecked → KeyReleased → Signed → Submitted → Confirmed
//!                                                            ↘ Failed
//! ```
//!
//! The spend is reserved right after the policy check. From then on the
//! pipeline runs in its own task that owns the reservation, so an abandoned
//! caller cannot interrupt signing or submission, and every failure (or
//! panic) before confirmation rolls the reservation back.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use agentgrid_ledger::{Clock, Reservation, SpendingLedger, SystemClock};
use agentgrid_policy::{PolicyDecision, PolicyEngine};
use agentgrid_types::{
    AgentId, AgentWallet, Result, TokenId, TransactionReceipt, TransactionRequest, WalletError,
};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::access::{AccessPolicyEvaluator, ClaimSource};
use crate::chain::{unsigned_transaction, ChainClient};
use crate::config::WalletConfig;
use crate::store::{AgentLocks, KeyCustodyStore};

/// Stage of one `execute` invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    Pending,
    PolicyChecked,
    KeyReleased,
    Signed,
    Submitted,
    Confirmed,
    Failed,
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::PolicyChecked => "policy_checked",
            Self::KeyReleased => "key_released",
            Self::Signed => "signed",
            Self::Submitted => "submitted",
            Self::Confirmed => "confirmed",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Timing and chain parameters of the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorSettings {
    pub chain_id: u64,
    /// Bound on claim retrieval plus key release
    pub authorization_timeout: Duration,
    /// Bound on gas estimation and on submission, each
    pub submission_timeout: Duration,
}

impl From<&WalletConfig> for ExecutorSettings {
    fn from(config: &WalletConfig) -> Self {
        Self {
            chain_id: config.chain_id,
            authorization_timeout: config.authorization_timeout(),
            submission_timeout: config.submission_timeout(),
        }
    }
}

#[derive(Clone)]
struct ExecutorInner {
    store: Arc<dyn KeyCustodyStore>,
    ledger: SpendingLedger,
    policy: PolicyEngine,
    evaluator: AccessPolicyEvaluator,
    claims: Arc<dyn ClaimSource>,
    chain: Arc<dyn ChainClient>,
    locks: AgentLocks,
    clock: Arc<dyn Clock>,
    settings: ExecutorSettings,
}

/// Orchestrates policy, reservation, key release, signing and submission
#[derive(Clone)]
pub struct TransactionExecutor {
    inner: Arc<ExecutorInner>,
}

impl TransactionExecutor {
    pub fn new(
        store: Arc<dyn KeyCustodyStore>,
        ledger: SpendingLedger,
        evaluator: AccessPolicyEvaluator,
        claims: Arc<dyn ClaimSource>,
        chain: Arc<dyn ChainClient>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(ExecutorInner {
                store,
                ledger,
                policy: PolicyEngine::new(),
                evaluator,
                claims,
                chain,
                locks: AgentLocks::new(),
                clock: Arc::new(SystemClock),
                settings,
            }),
        }
    }

    /// Share per-agent locks with whoever updates limits
    pub fn with_locks(self, locks: AgentLocks) -> Self {
        self.rebuild(|inner| inner.locks = locks)
    }

    pub fn with_clock(self, clock: Arc<dyn Clock>) -> Self {
        self.rebuild(|inner| inner.clock = clock)
    }

    fn rebuild(self, apply: impl FnOnce(&mut ExecutorInner)) -> Self {
        let mut next = ExecutorInner::clone(&self.inner);
        apply(&mut next);
        Self {
            inner: Arc::new(next),
        }
    }

    pub fn ledger(&self) -> &SpendingLedger {
        &self.inner.ledger
    }

    /// Execute `request` on behalf of `agent_id`
    pub async fn execute(
        &self,
        agent_id: &AgentId,
        request: TransactionRequest,
    ) -> Result<TransactionReceipt> {
        if &request.agent_id != agent_id {
            return Err(WalletError::invalid_request(format!(
                "request for {} submitted on behalf of {}",
                request.agent_id, agent_id
            )));
        }

        let inner = &self.inner;
        let in_flight = inner.locks.in_flight(agent_id).await;
        stage(agent_id, ExecutionStage::Pending);

        let wallet = inner.store.get(agent_id).await?;
        if request.payload.is_some() && matches!(request.token, TokenId::Contract(_)) {
            return Err(WalletError::invalid_request(
                "token transfers cannot carry a payload",
            ));
        }

        let day = inner.clock.today();
        let snapshot = inner.ledger.snapshot(agent_id, day);
        if let PolicyDecision::Denied(reason) = inner.policy.validate(&wallet, &request, &snapshot) {
            warn!(agent_id = %agent_id, %reason, "Transaction denied by policy");
            return Err(reason.into());
        }
        stage(agent_id, ExecutionStage::PolicyChecked);

        let reservation = inner
            .ledger
            .reserve(agent_id, day, request.amount, wallet.spending_limits.daily_limit)
            .map_err(|e| {
                warn!(agent_id = %agent_id, error = %e, "Reservation lost to a concurrent spend");
                WalletError::from(e)
            })?;

        let task_inner = Arc::clone(inner);
        let task = tokio::spawn(async move {
            let _in_flight = in_flight;
            let agent_id = wallet.agent_id.clone();
            let outcome = task_inner.settle(wallet, request, reservation).await;
            if let Err(e) = &outcome {
                warn!(agent_id = %agent_id, error = %e, code = e.error_code(), "Transaction failed");
                stage(&agent_id, ExecutionStage::Failed);
            }
            outcome
        });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => Err(WalletError::internal(format!("execution task aborted: {e}"))),
        }
    }
}

impl ExecutorInner {
    /// Everything after the reservation. Returning early drops the
    /// reservation, which rolls it back.
    async fn settle(
        &self,
        wallet: AgentWallet,
        request: TransactionRequest,
        reservation: Reservation,
    ) -> Result<TransactionReceipt> {
        let agent_id = &wallet.agent_id;
        let mut transaction = unsigned_transaction(self.settings.chain_id, &wallet, &request)?;

        // Gas is settled before the key is released
        if request.gas_limit.is_none() {
            transaction.gas_limit = timeout(
                self.settings.submission_timeout,
                self.chain.estimate_gas(&transaction),
            )
            .await
            .map_err(|_| WalletError::submission_failed("gas estimation timed out"))?
            .map_err(|e| WalletError::submission_failed(format!("gas estimation failed: {e}")))?;
        }

        let key = timeout(self.settings.authorization_timeout, async {
            let claim = self
                .claims
                .claim_for(&wallet)
                .await
                .map_err(|e| WalletError::unauthorized(e.to_string()))?;
            self.evaluator.authorize_decryption(&wallet, &claim).await
        })
        .await
        .map_err(|_| WalletError::unauthorized("authorization timed out"))??;
        stage(agent_id, ExecutionStage::KeyReleased);

        let signed = key.sign(&transaction)?;
        stage(agent_id, ExecutionStage::Signed);

        let submitted = timeout(self.settings.submission_timeout, self.chain.submit(&signed))
            .await
            .map_err(|_| WalletError::submission_failed("submission timed out"))?
            .map_err(|e| WalletError::submission_failed(e.to_string()))?;
        stage(agent_id, ExecutionStage::Submitted);

        reservation.commit();
        stage(agent_id, ExecutionStage::Confirmed);

        info!(
            agent_id = %agent_id,
            hash = %submitted.hash,
            amount = %request.amount,
            recipient = %request.recipient,
            token = %request.token,
            "Transaction submitted"
        );

        Ok(TransactionReceipt {
            hash: submitted.hash,
            agent_id: wallet.agent_id.clone(),
            amount: request.amount,
            recipient: request.recipient,
            token: request.token,
            gas_limit: transaction.gas_limit,
            block_number: submitted.block_number,
            submitted_at: self.clock.now(),
        })
    }
}

fn stage(agent_id: &AgentId, stage: ExecutionStage) {
    debug!(agent_id = %agent_id, %stage, "Execution stage");
}
