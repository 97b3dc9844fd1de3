//! AgentGrid Ledger - Per-agent daily spend accounting
//!
//! The ledger keeps one cumulative counter per `(agent, calendar day)`:
//! - Reservation is a single atomic read-check-increment
//! - A new day starts from zero (no reset job, the key simply changes)
//! - Only an outstanding reservation can be rolled back, and only once
//!
//! # Invariants
//!
//! 1. `spent` for a day never exceeds the limit presented at reservation time
//! 2. A reservation is either committed or rolled back, never both
//! 3. Different agents never contend on the same lock

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use agentgrid_types::{AgentId, Amount, WalletError};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur in ledger operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Daily limit exceeded: spent {spent}, requested {requested}, limit {limit}")]
    DailyLimitExceeded {
        spent: Amount,
        requested: Amount,
        limit: Amount,
    },

    #[error("Reservation {id} is not outstanding")]
    UnknownReservation { id: ReservationId },
}

pub type Result<T> = std::result::Result<T, LedgerError>;

impl From<LedgerError> for WalletError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::DailyLimitExceeded {
                spent,
                requested,
                limit,
            } => WalletError::DailyLimitExceeded {
                spent: spent.value(),
                requested: requested.value(),
                limit: limit.value(),
            },
            other => WalletError::internal(other.to_string()),
        }
    }
}

/// Source of "today" for day-keyed accounting
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    /// Current UTC calendar day
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall-clock time in UTC
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock for tests and simulations
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Point-in-time view of one agent's spend for one day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub agent_id: AgentId,
    pub day: NaiveDate,
    pub spent: Amount,
}

/// Identifies one outstanding reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReservationId(u64);

impl std::fmt::Display for ReservationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rsv-{}", self.0)
    }
}

type EntryKey = (AgentId, NaiveDate);

/// One `(agent, day)` row: committed plus outstanding spend, and the
/// reservations that may still be rolled back
#[derive(Debug, Default)]
struct DayEntry {
    spent: Amount,
    pending: HashMap<ReservationId, Amount>,
}

impl DayEntry {
    fn is_idle(&self) -> bool {
        self.spent.is_zero() && self.pending.is_empty()
    }
}

/// The AgentGrid spending ledger
///
/// Cheap to clone; clones share the same counters.
#[derive(Clone, Default)]
pub struct SpendingLedger {
    entries: Arc<DashMap<EntryKey, DayEntry>>,
    next_id: Arc<AtomicU64>,
}

impl SpendingLedger {
    /// Create a new in-memory ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Spend recorded for an agent on a day
    pub fn spent(&self, agent_id: &AgentId, day: NaiveDate) -> Amount {
        self.entries
            .get(&(agent_id.clone(), day))
            .map(|entry| entry.spent)
            .unwrap_or(Amount::ZERO)
    }

    pub fn snapshot(&self, agent_id: &AgentId, day: NaiveDate) -> LedgerSnapshot {
        LedgerSnapshot {
            agent_id: agent_id.clone(),
            day,
            spent: self.spent(agent_id, day),
        }
    }

    /// Atomically add `amount` to the day's spend if the result stays within
    /// `limit`.
    ///
    /// The returned guard rolls the increment back when dropped unless it is
    /// committed first. A denied reservation leaves no entry behind.
    pub fn reserve(
        &self,
        agent_id: &AgentId,
        day: NaiveDate,
        amount: Amount,
        limit: Amount,
    ) -> Result<Reservation> {
        let id = ReservationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let check = |current: Amount| {
            current
                .checked_add(amount)
                .filter(|next| *next <= limit)
                .ok_or(LedgerError::DailyLimitExceeded {
                    spent: current,
                    requested: amount,
                    limit,
                })
        };

        // The entry guard holds the shard lock for the whole check-and-set
        match self.entries.entry((agent_id.clone(), day)) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.spent = check(entry.spent)?;
                entry.pending.insert(id, amount);
            }
            Entry::Vacant(vacant) => {
                let spent = check(Amount::ZERO)?;
                let mut entry = DayEntry {
                    spent,
                    pending: HashMap::new(),
                };
                entry.pending.insert(id, amount);
                vacant.insert(entry);
            }
        }

        debug!(agent_id = %agent_id, %day, %amount, reservation = %id, "Spend reserved");

        Ok(Reservation {
            ledger: self.clone(),
            id,
            agent_id: agent_id.clone(),
            day,
            amount,
            settled: false,
        })
    }

    /// Undo an outstanding reservation.
    ///
    /// Each reservation can be rolled back at most once, and never after it
    /// was committed; anything else fails without changing the ledger.
    /// Returns the spend remaining for the day.
    pub fn rollback(&self, agent_id: &AgentId, day: NaiveDate, id: ReservationId) -> Result<Amount> {
        let key = (agent_id.clone(), day);
        let remaining = {
            let mut entry = self
                .entries
                .get_mut(&key)
                .ok_or(LedgerError::UnknownReservation { id })?;
            let amount = entry
                .pending
                .remove(&id)
                .ok_or(LedgerError::UnknownReservation { id })?;
            // `pending` amounts are always part of `spent`
            entry.spent = entry.spent.checked_sub(amount).unwrap_or(Amount::ZERO);
            entry.spent
        };

        self.entries.remove_if(&key, |_, entry| entry.is_idle());
        Ok(remaining)
    }

    fn commit(&self, agent_id: &AgentId, day: NaiveDate, id: ReservationId) {
        let key = (agent_id.clone(), day);
        if let Some(mut entry) = self.entries.get_mut(&key) {
            entry.pending.remove(&id);
        }
        self.entries.remove_if(&key, |_, entry| entry.is_idle());
    }

    /// Drop every entry for days before `day`. Returns how many were removed.
    pub fn prune_before(&self, day: NaiveDate) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(_, entry_day), _| *entry_day >= day);
        before.saturating_sub(self.entries.len())
    }

    /// Number of `(agent, day)` entries held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for SpendingLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpendingLedger")
            .field("entries", &self.entries.len())
            .finish()
    }
}

/// A tentative spend increment.
///
/// Dropping an uncommitted reservation rolls it back, so every early return,
/// error or panic between `reserve` and `commit` restores the ledger.
#[must_use = "an uncommitted reservation is rolled back when dropped"]
#[derive(Debug)]
pub struct Reservation {
    ledger: SpendingLedger,
    id: ReservationId,
    agent_id: AgentId,
    day: NaiveDate,
    amount: Amount,
    settled: bool,
}

impl Reservation {
    pub fn id(&self) -> ReservationId {
        self.id
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn day(&self) -> NaiveDate {
        self.day
    }

    pub fn amount(&self) -> Amount {
        self.amount
    }

    /// Make the increment permanent
    pub fn commit(mut self) {
        self.settled = true;
        self.ledger.commit(&self.agent_id, self.day, self.id);
    }

    /// Roll back now, returning the day's remaining spend
    pub fn release(mut self) -> Result<Amount> {
        self.settled = true;
        self.ledger.rollback(&self.agent_id, self.day, self.id)
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.settled {
            return;
        }
        match self.ledger.rollback(&self.agent_id, self.day, self.id) {
            Ok(remaining) => warn!(
                agent_id = %self.agent_id,
                day = %self.day,
                amount = %self.amount,
                %remaining,
                "Reservation rolled back"
            ),
            Err(e) => warn!(
                agent_id = %self.agent_id,
                day = %self.day,
                error = %e,
                "Reservation rollback failed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_reserve_and_commit() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");

        ledger
            .reserve(&agent, day(1), Amount(30), Amount(100))
            .unwrap()
            .commit();
        ledger
            .reserve(&agent, day(1), Amount(30), Amount(100))
            .unwrap()
            .commit();

        assert_eq!(ledger.spent(&agent, day(1)), Amount(60));
    }

    #[test]
    fn test_reserve_denied_leaves_spend_untouched() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");
        ledger
            .reserve(&agent, day(1), Amount(60), Amount(100))
            .unwrap()
            .commit();

        let err = ledger
            .reserve(&agent, day(1), Amount(50), Amount(100))
            .unwrap_err();
        assert_eq!(
            err,
            LedgerError::DailyLimitExceeded {
                spent: Amount(60),
                requested: Amount(50),
                limit: Amount(100),
            }
        );
        assert_eq!(ledger.spent(&agent, day(1)), Amount(60));
    }

    #[test]
    fn test_reserve_up_to_exact_limit() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");
        ledger
            .reserve(&agent, day(1), Amount(100), Amount(100))
            .unwrap()
            .commit();
        assert_eq!(ledger.spent(&agent, day(1)), Amount(100));
    }

    #[test]
    fn test_reserve_then_rollback_restores_spend() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");
        ledger
            .reserve(&agent, day(1), Amount(25), Amount(100))
            .unwrap()
            .commit();

        for amount in [0u128, 1, 40, 75] {
            let before = ledger.spent(&agent, day(1));
            let reservation = ledger
                .reserve(&agent, day(1), Amount(amount), Amount(100))
                .unwrap();
            assert_eq!(ledger.spent(&agent, day(1)), before.checked_add(Amount(amount)).unwrap());
            reservation.release().unwrap();
            assert_eq!(ledger.spent(&agent, day(1)), before);
        }
    }

    #[test]
    fn test_dropped_reservation_rolls_back() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");
        {
            let reservation = ledger
                .reserve(&agent, day(1), Amount(40), Amount(100))
                .unwrap();
            assert_eq!(reservation.amount(), Amount(40));
            assert_eq!(ledger.spent(&agent, day(1)), Amount(40));
        }
        assert_eq!(ledger.spent(&agent, day(1)), Amount::ZERO);
    }

    #[test]
    fn test_release_is_explicit_rollback() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");
        let reservation = ledger
            .reserve(&agent, day(1), Amount(40), Amount(100))
            .unwrap();
        assert_eq!(reservation.release().unwrap(), Amount::ZERO);
        assert_eq!(ledger.spent(&agent, day(1)), Amount::ZERO);
    }

    #[test]
    fn test_rollback_is_once_per_reservation() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");

        let first = ledger.reserve(&agent, day(1), Amount(30), Amount(100)).unwrap();
        let first_id = first.id();
        first.commit();
        let second = ledger.reserve(&agent, day(1), Amount(30), Amount(100)).unwrap();
        let second_id = second.id();
        second.commit();

        // Committed spend cannot be rolled back, by its id or twice over
        for id in [first_id, second_id, first_id] {
            assert_eq!(
                ledger.rollback(&agent, day(1), id),
                Err(LedgerError::UnknownReservation { id })
            );
        }
        assert_eq!(ledger.spent(&agent, day(1)), Amount(60));

        let pending = ledger.reserve(&agent, day(1), Amount(10), Amount(100)).unwrap();
        let pending_id = pending.id();
        assert_eq!(ledger.rollback(&agent, day(1), pending_id), Ok(Amount(60)));
        assert!(ledger.rollback(&agent, day(1), pending_id).is_err());
        // The guard's own rollback on drop is refused too
        drop(pending);
        assert_eq!(ledger.spent(&agent, day(1)), Amount(60));
    }

    #[test]
    fn test_rollback_of_unknown_day_or_agent() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");
        let reservation = ledger.reserve(&agent, day(1), Amount(10), Amount(100)).unwrap();
        let id = reservation.id();

        assert!(ledger.rollback(&agent, day(2), id).is_err());
        assert!(ledger.rollback(&AgentId::new("other"), day(1), id).is_err());
        assert_eq!(ledger.spent(&agent, day(1)), Amount(10));

        assert_eq!(reservation.release(), Ok(Amount::ZERO));
    }

    #[test]
    fn test_denied_and_rolled_back_reservations_leave_no_entries() {
        let ledger = SpendingLedger::new();
        for i in 0..100 {
            let agent = AgentId::new(format!("ghost-{i}"));
            assert!(ledger.reserve(&agent, day(1), Amount(101), Amount(100)).is_err());
            drop(ledger.reserve(&agent, day(1), Amount(5), Amount(100)).unwrap());
            ledger
                .reserve(&agent, day(1), Amount::ZERO, Amount(100))
                .unwrap()
                .commit();
        }
        assert!(ledger.is_empty());

        ledger
            .reserve(&AgentId::new("agent-1"), day(1), Amount(5), Amount(100))
            .unwrap()
            .commit();
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_new_day_starts_from_zero() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");
        ledger
            .reserve(&agent, day(1), Amount(100), Amount(100))
            .unwrap()
            .commit();

        assert!(ledger.reserve(&agent, day(1), Amount(1), Amount(100)).is_err());
        ledger
            .reserve(&agent, day(2), Amount(100), Amount(100))
            .unwrap()
            .commit();
        assert_eq!(ledger.spent(&agent, day(2)), Amount(100));
    }

    #[test]
    fn test_agents_are_independent() {
        let ledger = SpendingLedger::new();
        let a = AgentId::new("a");
        let b = AgentId::new("b");
        ledger
            .reserve(&a, day(1), Amount(100), Amount(100))
            .unwrap()
            .commit();
        assert!(ledger.reserve(&b, day(1), Amount(100), Amount(100)).is_ok());
    }

    #[test]
    fn test_prune_before() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");
        for d in 1..=3 {
            ledger
                .reserve(&agent, day(d), Amount(1), Amount(100))
                .unwrap()
                .commit();
        }
        assert_eq!(ledger.prune_before(day(3)), 2);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.spent(&agent, day(3)), Amount(1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_exceed_limit() {
        let ledger = SpendingLedger::new();
        let agent = AgentId::new("agent-1");

        let mut handles = Vec::new();
        for _ in 0..50 {
            let ledger = ledger.clone();
            let agent = agent.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .reserve(&agent, day(1), Amount(7), Amount(100))
                    .map(Reservation::commit)
                    .is_ok()
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap() {
                succeeded += 1;
            }
        }

        // 14 * 7 = 98 is the most that fits under 100
        assert_eq!(succeeded, 14);
        assert_eq!(ledger.spent(&agent, day(1)), Amount(98));
    }

    #[test]
    fn test_fixed_clock_rolls_over_day() {
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 23, 59, 0).unwrap());
        assert_eq!(clock.today(), day(1));
        clock.advance(Duration::minutes(2));
        assert_eq!(clock.today(), day(2));
    }

    #[test]
    fn test_ledger_error_maps_to_wallet_error() {
        let err: WalletError = LedgerError::DailyLimitExceeded {
            spent: Amount(60),
            requested: Amount(50),
            limit: Amount(100),
        }
        .into();
        assert_eq!(
            err,
            WalletError::DailyLimitExceeded {
                spent: 60,
                requested: 50,
                limit: 100,
            }
        );
    }
}
