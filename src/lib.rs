//! Aethernova Crowdsale: staged token sale core
//! Features:
//! - Pre-sale (owner allocations) followed by three public stages with their own rates
//! - Cumulative supply caps per stage, all-or-nothing cap enforcement
//! - Deferred or immediate sale specification with a one-way confirmation latch
//! - Settlement: founder pool sized to preserve the reserved ownership fraction, lockup lifted
//! - Four-phase founder vesting released by the owner
//! - Fungible ledger with lockup and a bounty registry owned by the engine
//! - Atomic commands: every write fully applies or fully reverts
//! - Events: bounded log + tokio::broadcast
//!
//! Notes:
//! - Time and value movement are supplied by the host through `SaleBackend`.
//! - Address/Balance are placeholders; integrate with chain primitives in your node.
//!
//! (c) Aethernova

#![forbid(unsafe_code)]
#![allow(clippy::too_many_arguments)]

use std::{fmt, str::FromStr};

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

pub mod backend;
pub mod bounty;
pub mod config;
pub mod crowdsale;
pub mod ledger;
pub mod schedule;
pub mod telemetry;
pub mod vesting;

pub use backend::{BackendError, InMemoryBackend, SaleBackend};
pub use bounty::{BountyError, BountyEvent, BountyRegistry};
pub use crowdsale::{
    Crowdsale, CrowdsaleError, CrowdsaleEvent, Deployment, ErrorKind, Role, SaleLifecycle,
    SaleSnapshot,
};
pub use ledger::{Ledger, LedgerError, LedgerEvent};
pub use schedule::{resolve_stage, SaleCaps, SaleSpec, SpecError, Stage, Tokenomics};
pub use vesting::{FounderVesting, PHASES};

// ---------- Primitives ----------

/// Smallest unit balance (value and tokens).
pub type Balance = u128;

/// UNIX time in seconds, as reported by the host clock.
pub type Timestamp = u64;

/// 20-byte address placeholder; replace with chain primitive.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("invalid hex: {0}")]
    Hex(String),
    #[error("expected 20 bytes, got {0}")]
    Length(usize),
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
        let bytes = hex::decode(s).map_err(|e| AddressParseError::Hex(e.to_string()))?;
        let arr: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::Length(bytes.len()))?;
        Ok(Address(arr))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::from_str(&s).map_err(de::Error::custom)
    }
}

// ---------- Math helpers ----------

/// Compute (a * b) / d with checked u128 arithmetic; returns None on overflow or d == 0.
pub(crate) fn mul_div_u128(a: u128, b: u128, d: u128) -> Option<u128> {
    if d == 0 {
        return None;
    }
    a.checked_mul(b)?.checked_div(d)
}
