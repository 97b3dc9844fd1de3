//! Chain submission collaborator and transaction construction

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agentgrid_crypto::recover_signer;
use agentgrid_types::{
    Address, AgentWallet, Amount, Result, SignedTransaction, SubmissionReceipt, TokenId,
    TransactionRequest, UnsignedTransaction, WalletError,
};
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

/// `transfer(address,uint256)`
pub const ERC20_TRANSFER_SELECTOR: [u8; 4] = [0xa9, 0x05, 0x9c, 0xbb];

/// Gas for a plain value transfer
pub const BASE_TRANSFER_GAS: u64 = 21_000;

/// Errors reported by the chain client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Transaction rejected: {0}")]
    Rejected(String),
}

/// Ledger submission service
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn estimate_gas(&self, transaction: &UnsignedTransaction) -> std::result::Result<u64, ChainError>;

    async fn submit(&self, transaction: &SignedTransaction) -> std::result::Result<SubmissionReceipt, ChainError>;

    /// Balance of `address` in `token`, in base units
    async fn balance(&self, address: &Address, token: &TokenId) -> std::result::Result<Amount, ChainError>;
}

/// ABI-encode an ERC-20 `transfer(to, amount)` call
pub fn erc20_transfer_calldata(to: &Address, amount: Amount) -> Vec<u8> {
    let mut data = Vec::with_capacity(4 + 32 + 32);
    data.extend_from_slice(&ERC20_TRANSFER_SELECTOR);
    data.extend_from_slice(&[0u8; 12]);
    data.extend_from_slice(&to.to_bytes());
    data.extend_from_slice(&[0u8; 16]);
    data.extend_from_slice(&amount.value().to_be_bytes());
    data
}

/// Decode ERC-20 `transfer` calldata back into `(to, amount)`
pub fn decode_erc20_transfer(data: &[u8]) -> Option<(Address, Amount)> {
    if data.len() != 68 || data[..4] != ERC20_TRANSFER_SELECTOR {
        return None;
    }
    // Both words must fit their types: 20-byte address, 128-bit amount
    if data[4..16].iter().any(|b| *b != 0) || data[36..52].iter().any(|b| *b != 0) {
        return None;
    }
    let to = Address::from_slice(&data[16..36]).ok()?;
    let amount = u128::from_be_bytes(data[52..68].try_into().ok()?);
    Some((to, Amount(amount)))
}

/// Build the unsigned transaction for `request` sent from `wallet`.
///
/// Token transfers call the token contract with zero value. The gas limit
/// is left at zero when the request does not carry one.
pub fn unsigned_transaction(
    chain_id: u64,
    wallet: &AgentWallet,
    request: &TransactionRequest,
) -> Result<UnsignedTransaction> {
    let (to, value, data) = match &request.token {
        TokenId::Native => (
            request.recipient.clone(),
            request.amount,
            request.payload.clone().unwrap_or_default(),
        ),
        TokenId::Contract(token) => {
            if request.payload.is_some() {
                return Err(WalletError::invalid_request(
                    "token transfers cannot carry a payload",
                ));
            }
            (
                token.clone(),
                Amount::ZERO,
                erc20_transfer_calldata(&request.recipient, request.amount),
            )
        }
    };

    Ok(UnsignedTransaction {
        chain_id,
        from: wallet.address.clone(),
        to,
        value,
        data: format!("0x{}", hex::encode(data)),
        gas_limit: request.gas_limit.unwrap_or(0),
    })
}

fn calldata(transaction: &UnsignedTransaction) -> Vec<u8> {
    hex::decode(transaction.data.trim_start_matches("0x")).unwrap_or_default()
}

/// In-process chain with balances, for tests and simulations.
///
/// Submissions must be signed by `from`, move balances and are rejected on
/// insufficient funds. Failures and latency can be injected.
#[derive(Clone, Default)]
pub struct InMemoryChain {
    balances: Arc<RwLock<HashMap<(Address, TokenId), Amount>>>,
    submitted: Arc<RwLock<Vec<SignedTransaction>>>,
    failures: Arc<AtomicUsize>,
    submit_delay_ms: Arc<AtomicU64>,
    block_number: Arc<AtomicU64>,
}

impl InMemoryChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_balance(&self, address: &Address, token: TokenId, amount: Amount) {
        self.balances
            .write()
            .await
            .insert((address.clone(), token), amount);
    }

    /// Make the next `count` submissions fail with an RPC error
    pub fn fail_next_submissions(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    /// Delay every submission by `delay`
    pub fn set_submit_delay(&self, delay: Duration) {
        self.submit_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Accepted transactions, oldest first
    pub async fn submitted(&self) -> Vec<SignedTransaction> {
        self.submitted.read().await.clone()
    }

    fn take_failure(&self) -> bool {
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ChainClient for InMemoryChain {
    async fn estimate_gas(&self, transaction: &UnsignedTransaction) -> std::result::Result<u64, ChainError> {
        let data = calldata(transaction);
        if decode_erc20_transfer(&data).is_some() {
            return Ok(65_000);
        }
        Ok(BASE_TRANSFER_GAS + 16 * data.len() as u64)
    }

    async fn submit(&self, signed: &SignedTransaction) -> std::result::Result<SubmissionReceipt, ChainError> {
        let delay = self.submit_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        if self.take_failure() {
            return Err(ChainError::Rpc("connection reset".to_string()));
        }

        let tx = &signed.transaction;
        let signer = recover_signer(signed).map_err(|e| ChainError::Rejected(e.to_string()))?;
        if signer != tx.from {
            return Err(ChainError::Rejected(format!(
                "signed by {} but sent from {}",
                signer, tx.from
            )));
        }
        if tx.gas_limit < BASE_TRANSFER_GAS {
            return Err(ChainError::Rejected(format!("gas limit {} too low", tx.gas_limit)));
        }

        let data = calldata(tx);
        let (token, to, amount) = match decode_erc20_transfer(&data) {
            Some((to, amount)) if tx.value.is_zero() => (TokenId::Contract(tx.to.clone()), to, amount),
            _ => (TokenId::Native, tx.to.clone(), tx.value),
        };

        let mut balances = self.balances.write().await;
        let from_key = (tx.from.clone(), token.clone());
        let available = balances.get(&from_key).copied().unwrap_or(Amount::ZERO);
        let remaining = available.checked_sub(amount).ok_or_else(|| {
            ChainError::Rejected(format!("insufficient funds: have {available}, need {amount}"))
        })?;
        balances.insert(from_key, remaining);
        let credited = balances.entry((to, token)).or_insert(Amount::ZERO);
        *credited = credited.checked_add(amount).unwrap_or(*credited);
        drop(balances);

        self.submitted.write().await.push(signed.clone());
        let block_number = self.block_number.fetch_add(1, Ordering::SeqCst) + 1;

        Ok(SubmissionReceipt {
            hash: signed.hash.clone(),
            block_number: Some(block_number),
        })
    }

    async fn balance(&self, address: &Address, token: &TokenId) -> std::result::Result<Amount, ChainError> {
        Ok(self
            .balances
            .read()
            .await
            .get(&(address.clone(), token.clone()))
            .copied()
            .unwrap_or(Amount::ZERO))
    }
}
