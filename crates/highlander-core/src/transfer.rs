//! Bank transfers: the two-resource case of ordered locking.
//!
//! Three strategies move money between two [`BankAccount`]s:
//! - [`transfer_ordered`] locks by ascending account id and cannot deadlock.
//! - [`transfer_naive`] locks source then destination and can deadlock when
//!   two transfers run in opposite directions.
//! - [`transfer_try_lock`] bounds each lock attempt, backs off and retries
//!   until a deadline.

use crate::error::TransferError;
use crate::lock_order::{lock_in_call_order, lock_ordered};
use rand::Rng;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;
use tracing::debug;

/// Bound on a single lock attempt inside [`transfer_try_lock`].
const TRY_LOCK_SLICE: Duration = Duration::from_millis(10);

#[derive(Debug)]
pub struct BankAccount {
    id: u64,
    balance: Mutex<i64>,
}

impl BankAccount {
    pub fn new(id: u64, initial: i64) -> Self {
        Self {
            id,
            balance: Mutex::new(initial),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn balance(&self) -> i64 {
        *self.balance.lock().await
    }
}

/// Move `amount` from `from` to `to`, locking the lower id first.
pub async fn transfer_ordered(
    from: &BankAccount,
    to: &BankAccount,
    amount: i64,
) -> Result<(), TransferError> {
    ensure_distinct(from, to)?;
    let (mut source, mut dest) = lock_ordered(&from.balance, from.id, &to.balance, to.id).await;
    withdraw_deposit(from.id, &mut source, &mut dest, amount)
}

/// Move `amount` from `from` to `to`, locking `from` first. May deadlock.
pub async fn transfer_naive(
    from: &BankAccount,
    to: &BankAccount,
    amount: i64,
) -> Result<(), TransferError> {
    ensure_distinct(from, to)?;
    let (mut source, mut dest) = lock_in_call_order(&from.balance, &to.balance).await;
    withdraw_deposit(from.id, &mut source, &mut dest, amount)
}

/// Move `amount` from `from` to `to`, giving up after `max_wait`.
///
/// Each lock is attempted for a short slice; on failure everything held is
/// released and the attempt repeats after a small random back-off.
pub async fn transfer_try_lock(
    from: &BankAccount,
    to: &BankAccount,
    amount: i64,
    max_wait: Duration,
) -> Result<(), TransferError> {
    ensure_distinct(from, to)?;
    // `None` means the wait is too long to represent: retry until it succeeds.
    let deadline = Instant::now().checked_add(max_wait);

    while deadline.map_or(true, |deadline| Instant::now() < deadline) {
        if let Ok(mut source) = tokio::time::timeout(TRY_LOCK_SLICE, from.balance.lock()).await {
            if let Ok(mut dest) = tokio::time::timeout(TRY_LOCK_SLICE, to.balance.lock()).await {
                return withdraw_deposit(from.id, &mut source, &mut dest, amount);
            }
        }
        let backoff = rand::rng().random_range(1..5);
        tokio::time::sleep(Duration::from_millis(backoff)).await;
    }

    debug!(event = "transfer.lock_timeout", from = from.id, to = to.id);
    Err(TransferError::LockTimeout {
        waited_ms: u64::try_from(max_wait.as_millis()).unwrap_or(u64::MAX),
    })
}

fn ensure_distinct(from: &BankAccount, to: &BankAccount) -> Result<(), TransferError> {
    if from.id == to.id {
        return Err(TransferError::SameAccount(from.id));
    }
    Ok(())
}

fn withdraw_deposit(
    from_id: u64,
    source: &mut MutexGuard<'_, i64>,
    dest: &mut MutexGuard<'_, i64>,
    amount: i64,
) -> Result<(), TransferError> {
    if **source < amount {
        return Err(TransferError::InsufficientFunds {
            account: from_id,
            balance: **source,
            requested: amount,
        });
    }
    **source -= amount;
    **dest += amount;
    Ok(())
}
