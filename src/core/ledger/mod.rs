//! Credit ledger
//!
//! Two-phase debit: the decision to allow a call is made before any cost is
//! incurred, but the true cost is only known after the remote call returns.
//! `reserve` holds a conservative estimate out of the spendable balance,
//! `settle` replaces the hold with the actual cost, `release` (or simply
//! dropping the reservation) refunds it in full.
//!
//! Serialization is per user account: each account sits behind its own
//! mutex inside a concurrent map, so debits for unrelated users never
//! contend. Balances load lazily from the persistence collaborator on
//! first touch and are written back on every settle.


use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::core::types::ProviderError;
use crate::storage::{CreditStore, StoreError};
use crate::utils::error::{GatewayError, Result};

#[derive(Debug, Default)]
struct AccountState {
    balance: i64,
    reserved: i64,
    total_generations: u64,
    total_units: u64,
}

/// One user's credit account. Long-lived, mutated only through the ledger.
#[derive(Debug)]
pub struct CreditAccount {
    user_id: String,
    state: Mutex<AccountState>,
}

/// Point-in-time view of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountSnapshot {
    pub balance: i64,
    pub reserved: i64,
    pub available: i64,
    pub total_generations: u64,
    pub total_units: u64,
}

/// A hold against a balance, pending final cost determination.
///
/// Dropping an unsettled reservation returns the hold to the spendable
/// balance, so an abandoned or cancelled request never leaks credits.
#[derive(Debug)]
pub struct Reservation {
    id: Uuid,
    account: Arc<CreditAccount>,
    amount: i64,
    armed: bool,
}

impl Reservation {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.account.state.lock();
            state.reserved -= self.amount;
            debug!(
                user = %self.account.user_id,
                reservation = %self.id,
                amount = self.amount,
                "reservation released"
            );
        }
    }
}

/// Owns every credit account and the reserve/settle/release protocol
pub struct CreditLedger {
    store: Arc<dyn CreditStore>,
    accounts: DashMap<String, Arc<CreditAccount>>,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn CreditStore>) -> Self {
        Self {
            store,
            accounts: DashMap::new(),
        }
    }

    async fn account(&self, user_id: &str) -> std::result::Result<Arc<CreditAccount>, StoreError> {
        if let Some(account) = self.accounts.get(user_id) {
            return Ok(account.clone());
        }
        // Two tasks may race to the first load; both read the same stored
        // balance and `or_insert_with` keeps one entry.
        let balance = self.store.load_credit_balance(user_id).await?;
        let account = self
            .accounts
            .entry(user_id.to_string())
            .or_insert_with(|| {
                Arc::new(CreditAccount {
                    user_id: user_id.to_string(),
                    state: Mutex::new(AccountState {
                        balance,
                        ..AccountState::default()
                    }),
                })
            })
            .clone();
        Ok(account)
    }

    /// Hold `amount` credits out of the user's spendable balance, or reject
    /// with `InsufficientCredit` before any provider call is made.
    ///
    /// The check is serialized against the account's other reservations, so
    /// the sum of outstanding holds never exceeds the balance any of them
    /// observed.
    pub async fn reserve(&self, user_id: &str, amount: i64) -> Result<Reservation> {
        let account = self.account(user_id).await.map_err(GatewayError::Store)?;
        let id = Uuid::new_v4();
        {
            let mut state = account.state.lock();
            let available = state.balance - state.reserved;
            if amount > available {
                return Err(ProviderError::InsufficientCredit {
                    required: amount,
                    available,
                }
                .into());
            }
            state.reserved += amount;
        }
        debug!(user = user_id, reservation = %id, amount, "reservation granted");
        Ok(Reservation {
            id,
            account,
            amount,
            armed: true,
        })
    }

    /// Replace a reservation with the actual cost and persist the new
    /// balance. Credits back the difference when the actual cost came in
    /// under the estimate. Returns the new balance.
    ///
    /// The debit is clamped at the spendable amount, balance minus the
    /// holds still outstanding for other in-flight requests: an actual
    /// cost above the estimate is an estimation defect and must neither
    /// push the balance negative nor consume credits another reservation
    /// already secured.
    pub async fn settle(
        &self,
        mut reservation: Reservation,
        actual: i64,
        units: u64,
    ) -> std::result::Result<i64, StoreError> {
        reservation.armed = false;
        let account = reservation.account.clone();
        let new_balance = {
            let mut state = account.state.lock();
            state.reserved -= reservation.amount;
            let debit = actual.clamp(0, state.balance - state.reserved);
            if debit < actual {
                warn!(
                    user = %account.user_id,
                    actual,
                    debit,
                    "actual cost exceeded spendable balance, debit clamped"
                );
            }
            state.balance -= debit;
            state.total_generations += 1;
            state.total_units += units;
            state.balance
        };
        self.store
            .update_credit_balance(&account.user_id, new_balance)
            .await?;
        debug!(
            user = %account.user_id,
            reservation = %reservation.id,
            actual,
            new_balance,
            "reservation settled"
        );
        Ok(new_balance)
    }

    /// Refund a reservation in full. Equivalent to dropping it; named for
    /// call sites where the refund is the point.
    pub fn release(&self, reservation: Reservation) {
        drop(reservation);
    }

    /// Current balance, loading the account if needed
    pub async fn balance(&self, user_id: &str) -> std::result::Result<i64, StoreError> {
        Ok(self.account(user_id).await?.state.lock().balance)
    }

    /// Full account view, loading the account if needed
    pub async fn snapshot(
        &self,
        user_id: &str,
    ) -> std::result::Result<AccountSnapshot, StoreError> {
        let account = self.account(user_id).await?;
        let state = account.state.lock();
        Ok(AccountSnapshot {
            balance: state.balance,
            reserved: state.reserved,
            available: state.balance - state.reserved,
            total_generations: state.total_generations,
            total_units: state.total_units,
        })
    }
}
