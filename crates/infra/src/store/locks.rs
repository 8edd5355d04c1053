//! Exclusive row locks with bounded waits.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use stockflow_inventory::{SequenceKey, StockKey, TransferId};

use crate::error::StoreError;

pub(crate) type TxId = u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum LockKey {
    Transfer(TransferId),
    Stock(StockKey),
    Sequence(SequenceKey),
}

impl core::fmt::Display for LockKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LockKey::Transfer(id) => write!(f, "transfer {id}"),
            LockKey::Stock(key) => write!(f, "{key}"),
            LockKey::Sequence(key) => write!(f, "{key}"),
        }
    }
}

/// Lock table: row → owning transaction.
///
/// Re-entrant for the owner. Waiters park on a condvar that is signalled
/// whenever a transaction releases its locks.
#[derive(Debug)]
pub(crate) struct LockManager {
    owners: Mutex<HashMap<LockKey, TxId>>,
    released: Condvar,
    timeout: Duration,
}

impl LockManager {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            owners: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    /// Returns `true` if the lock was newly taken, `false` if already held by `tx`.
    pub(crate) fn acquire(&self, tx: TxId, key: LockKey) -> Result<bool, StoreError> {
        let deadline = Instant::now() + self.timeout;
        let mut owners = self.owners.lock().map_err(|_| StoreError::Poisoned)?;

        loop {
            match owners.get(&key) {
                None => {
                    owners.insert(key, tx);
                    return Ok(true);
                }
                Some(owner) if *owner == tx => return Ok(false),
                Some(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        tracing::warn!(resource = %key, tx, "row lock wait timed out");
                        return Err(StoreError::LockTimeout(key.to_string()));
                    }
                    let (guard, _) = self
                        .released
                        .wait_timeout(owners, deadline - now)
                        .map_err(|_| StoreError::Poisoned)?;
                    owners = guard;
                }
            }
        }
    }

    pub(crate) fn release_all(&self, tx: TxId, keys: &[LockKey]) {
        if keys.is_empty() {
            return;
        }
        // Release even if a panicking holder poisoned the table; waiters must not hang.
        let mut owners = match self.owners.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for key in keys {
            if owners.get(key) == Some(&tx) {
                owners.remove(key);
            }
        }
        drop(owners);
        self.released.notify_all();
    }
}
