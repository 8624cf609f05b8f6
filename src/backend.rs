//! Host integration: external clock and value movement.
//!
//! The engine never mutates time; it reads `now_unix` once per command and
//! forwards received value to the collection wallet through `forward_value`.

use std::{
    collections::HashMap,
    sync::atomic::{AtomicU64, Ordering},
};

use parking_lot::RwLock;
use thiserror::Error;

use crate::{Address, Balance, Timestamp};

/// Backend for value transfer and time.
/// All monetary side-effects on the value asset go through this trait.
pub trait SaleBackend: Send + Sync + 'static {
    /// Current UNIX time (seconds).
    fn now_unix(&self) -> Timestamp;

    /// Move `amount` of the value asset from `payer` to `wallet`.
    fn forward_value(
        &self,
        payer: Address,
        wallet: Address,
        amount: Balance,
    ) -> Result<(), BackendError>;
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("insufficient balance")]
    Insufficient,
    #[error("backend failure: {0}")]
    Other(String),
}

/// In-process backend with a settable clock and a value-asset balance map.
/// Useful for simulations and tests.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    now: AtomicU64,
    balances: RwLock<HashMap<Address, Balance>>,
}

impl InMemoryBackend {
    pub fn new(now: Timestamp) -> Self {
        let b = Self::default();
        b.set_now(now);
        b
    }

    pub fn set_now(&self, t: Timestamp) {
        self.now.store(t, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: u64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }

    /// Credit value to an account (faucet).
    pub fn fund(&self, to: Address, amount: Balance) {
        let mut m = self.balances.write();
        let e = m.entry(to).or_default();
        *e = e.saturating_add(amount);
    }

    pub fn balance(&self, who: Address) -> Balance {
        *self.balances.read().get(&who).unwrap_or(&0)
    }
}

impl SaleBackend for InMemoryBackend {
    fn now_unix(&self) -> Timestamp {
        self.now.load(Ordering::SeqCst)
    }

    fn forward_value(
        &self,
        payer: Address,
        wallet: Address,
        amount: Balance,
    ) -> Result<(), BackendError> {
        let mut m = self.balances.write();
        let pb = m.entry(payer).or_default();
        if *pb < amount {
            return Err(BackendError::Insufficient);
        }
        *pb -= amount;
        let wb = m.entry(wallet).or_default();
        *wb = wb
            .checked_add(amount)
            .ok_or_else(|| BackendError::Other("wallet balance overflow".into()))?;
        Ok(())
    }
}
