//! Wallet record persistence and per-agent serialization

use std::collections::HashMap;
use std::sync::Arc;

use agentgrid_types::{AgentId, AgentWallet, Result, SpendingLimits, WalletError};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{OwnedRwLockReadGuard, OwnedRwLockWriteGuard, RwLock};

/// Persistent home of wallet records, keyed by agent
#[async_trait]
pub trait KeyCustodyStore: Send + Sync {
    /// Load a wallet, or `NotFound`
    async fn get(&self, agent_id: &AgentId) -> Result<AgentWallet>;

    /// Insert a new wallet, or `DuplicateAgent` if one exists
    async fn put(&self, wallet: AgentWallet) -> Result<()>;

    /// Replace a wallet's spending limits, returning the updated record.
    ///
    /// This is the raw record write. It must only be called while holding
    /// [`AgentLocks::exclusive`] for the agent, so it cannot race an
    /// in-flight execution; `AgentWalletService::update_limits` does this.
    async fn update_limits(&self, agent_id: &AgentId, limits: SpendingLimits) -> Result<AgentWallet>;

    async fn contains(&self, agent_id: &AgentId) -> bool {
        self.get(agent_id).await.is_ok()
    }
}

/// In-memory wallet store
#[derive(Clone, Default)]
pub struct InMemoryKeyStore {
    wallets: Arc<RwLock<HashMap<AgentId, AgentWallet>>>,
}

impl InMemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.wallets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.wallets.read().await.is_empty()
    }

    /// All agents with a wallet
    pub async fn agents(&self) -> Vec<AgentId> {
        self.wallets.read().await.keys().cloned().collect()
    }
}

#[async_trait]
impl KeyCustodyStore for InMemoryKeyStore {
    async fn get(&self, agent_id: &AgentId) -> Result<AgentWallet> {
        self.wallets
            .read()
            .await
            .get(agent_id)
            .cloned()
            .ok_or_else(|| WalletError::not_found(agent_id))
    }

    async fn put(&self, wallet: AgentWallet) -> Result<()> {
        let mut wallets = self.wallets.write().await;
        if wallets.contains_key(&wallet.agent_id) {
            return Err(WalletError::DuplicateAgent {
                agent_id: wallet.agent_id.to_string(),
            });
        }
        wallets.insert(wallet.agent_id.clone(), wallet);
        Ok(())
    }

    async fn update_limits(&self, agent_id: &AgentId, limits: SpendingLimits) -> Result<AgentWallet> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .get_mut(agent_id)
            .ok_or_else(|| WalletError::not_found(agent_id))?;
        wallet.spending_limits = limits;
        Ok(wallet.clone())
    }

    async fn contains(&self, agent_id: &AgentId) -> bool {
        self.wallets.read().await.contains_key(agent_id)
    }
}

/// Per-agent reader/writer locks.
///
/// Executions hold the shared side for their whole run, limit updates take
/// the exclusive side, so limits never change under an in-flight
/// transaction. Agents never block each other. A lock lives only while
/// someone holds or waits on it.
#[derive(Clone, Default)]
pub struct AgentLocks {
    locks: Arc<DashMap<AgentId, Arc<RwLock<()>>>>,
}

impl AgentLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, agent_id: &AgentId) -> Arc<RwLock<()>> {
        self.locks
            .entry(agent_id.clone())
            .or_insert_with(|| Arc::new(RwLock::new(())))
            .clone()
    }

    fn guard<G>(&self, agent_id: &AgentId, guard: G) -> AgentLockGuard<G> {
        AgentLockGuard {
            guard: Some(guard),
            agent_id: agent_id.clone(),
            locks: self.locks.clone(),
        }
    }

    /// Shared guard held by an executing transaction
    pub async fn in_flight(&self, agent_id: &AgentId) -> InFlightGuard {
        let guard = self.lock_for(agent_id).read_owned().await;
        self.guard(agent_id, guard)
    }

    /// Exclusive guard held while a wallet's limits change
    pub async fn exclusive(&self, agent_id: &AgentId) -> ExclusiveGuard {
        let guard = self.lock_for(agent_id).write_owned().await;
        self.guard(agent_id, guard)
    }

    /// Number of agents with a live lock
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

impl std::fmt::Debug for AgentLocks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLocks")
            .field("agents", &self.locks.len())
            .finish()
    }
}

/// A held per-agent lock; the agent's entry is dropped with its last holder
pub struct AgentLockGuard<G> {
    guard: Option<G>,
    agent_id: AgentId,
    locks: Arc<DashMap<AgentId, Arc<RwLock<()>>>>,
}

pub type InFlightGuard = AgentLockGuard<OwnedRwLockReadGuard<()>>;
pub type ExclusiveGuard = AgentLockGuard<OwnedRwLockWriteGuard<()>>;

impl<G> Drop for AgentLockGuard<G> {
    fn drop(&mut self) {
        // Release first so our own reference no longer counts
        self.guard.take();
        // Holders and waiters each keep a clone; only the map's copy left means idle
        self.locks
            .remove_if(&self.agent_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl<G> std::fmt::Debug for AgentLockGuard<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLockGuard")
            .field("agent_id", &self.agent_id)
            .finish_non_exhaustive()
    }
}
