//! Four-phase founder vesting.
//!
//! The pool is fixed once, at settlement, and split by phase weights
//! 40/20/20/20. Phases unlock at strictly increasing timestamps and are
//! released strictly in order; `phases_released` only grows.
//!
//! Rounding: phases 2..=4 get `floor(pool * 2000 / 10_000)` each and phase 1
//! takes whatever is left, so the four amounts always sum to the pool.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{mul_div_u128, schedule::BPS_DENOM, Balance, Timestamp};

/// Number of vesting phases.
pub const PHASES: usize = 4;

/// Weight of each phase in basis points. Phase 1 absorbs rounding remainder.
pub const PHASE_WEIGHTS_BPS: [u128; PHASES] = [4_000, 2_000, 2_000, 2_000];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VestingError {
    #[error("invalid vesting: {0}")]
    Invalid(&'static str),
    #[error("arithmetic overflow")]
    Overflow,
    #[error("vesting pool already fixed")]
    AlreadyFunded,
    #[error("vesting pool not fixed yet")]
    NotFunded,
    #[error("no phase releasable")]
    NothingReleasable,
}

/// One released phase (1-based number).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseRelease {
    pub phase: u8,
    pub amount: Balance,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FounderVesting {
    unlock_times: [Timestamp; PHASES],
    amounts: [Balance; PHASES],
    funded: bool,
    phases_released: u8,
}

/// Split `pool` across phases by weight; phase 1 takes the remainder.
pub fn split(pool: Balance) -> Result<[Balance; PHASES], VestingError> {
    let mut out = [0; PHASES];
    let mut rest = pool;
    for i in 1..PHASES {
        let share = mul_div_u128(pool, PHASE_WEIGHTS_BPS[i], BPS_DENOM)
            .ok_or(VestingError::Overflow)?;
        out[i] = share;
        rest = rest.checked_sub(share).ok_or(VestingError::Overflow)?;
    }
    out[0] = rest;
    Ok(out)
}

impl FounderVesting {
    pub fn new(unlock_times: [Timestamp; PHASES]) -> Result<Self, VestingError> {
        if unlock_times.iter().any(|t| *t == 0) {
            return Err(VestingError::Invalid("unlock time must be non-zero"));
        }
        if !unlock_times.windows(2).all(|w| w[0] < w[1]) {
            return Err(VestingError::Invalid("unlock times must be strictly increasing"));
        }
        Ok(Self {
            unlock_times,
            amounts: [0; PHASES],
            funded: false,
            phases_released: 0,
        })
    }

    /// Fix the pool. Callable once.
    pub fn fund(&mut self, pool: Balance) -> Result<(), VestingError> {
        if self.funded {
            return Err(VestingError::AlreadyFunded);
        }
        self.amounts = split(pool)?;
        self.funded = true;
        Ok(())
    }

    pub fn unlock_times(&self) -> [Timestamp; PHASES] {
        self.unlock_times
    }

    pub fn amounts(&self) -> [Balance; PHASES] {
        self.amounts
    }

    pub fn is_funded(&self) -> bool {
        self.funded
    }

    pub fn total(&self) -> Balance {
        self.amounts.iter().sum()
    }

    pub fn phases_released(&self) -> u8 {
        self.phases_released
    }

    /// Whether phase `i` (0-based) has been withdrawn.
    pub fn withdrawn(&self, i: usize) -> bool {
        i < self.phases_released as usize
    }

    pub fn withdrawn_flags(&self) -> [bool; PHASES] {
        std::array::from_fn(|i| self.withdrawn(i))
    }

    /// Phases that `release(now)` would pay out.
    pub fn releasable(&self, now: Timestamp) -> Vec<PhaseRelease> {
        if !self.funded {
            return Vec::new();
        }
        (self.phases_released as usize..PHASES)
            .take_while(|&i| now >= self.unlock_times[i])
            .map(|i| PhaseRelease { phase: (i + 1) as u8, amount: self.amounts[i] })
            .collect()
    }

    /// Mark every unlocked, unclaimed phase as released. Fails on a no-op.
    pub fn release(&mut self, now: Timestamp) -> Result<Vec<PhaseRelease>, VestingError> {
        if !self.funded {
            return Err(VestingError::NotFunded);
        }
        let out = self.releasable(now);
        if out.is_empty() {
            return Err(VestingError::NothingReleasable);
        }
        self.phases_released += out.len() as u8;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vesting() -> FounderVesting {
        FounderVesting::new([100, 200, 300, 400]).unwrap()
    }

    #[test]
    fn split_sums_to_pool_and_phase_one_takes_remainder() {
        assert_eq!(split(1_000).unwrap(), [400, 200, 200, 200]);
        // 1003 * 0.2 = 200.6 -> 200; phase 1 = 1003 - 600
        assert_eq!(split(1_003).unwrap(), [403, 200, 200, 200]);
        assert_eq!(split(0).unwrap(), [0; 4]);
        let odd = 987_654_321_987_654_321u128;
        assert_eq!(split(odd).unwrap().iter().sum::<u128>(), odd);
    }

    #[test]
    fn unlock_times_must_increase() {
        assert!(FounderVesting::new([100, 100, 300, 400]).is_err());
        assert!(FounderVesting::new([0, 200, 300, 400]).is_err());
    }

    #[test]
    fn release_requires_funding_and_is_ordered() {
        let mut v = vesting();
        assert_eq!(v.release(1_000), Err(VestingError::NotFunded));
        v.fund(1_000).unwrap();
        assert_eq!(v.fund(5), Err(VestingError::AlreadyFunded));

        assert_eq!(v.release(99), Err(VestingError::NothingReleasable));
        assert_eq!(v.release(100).unwrap(), vec![PhaseRelease { phase: 1, amount: 400 }]);
        assert_eq!(v.release(150), Err(VestingError::NothingReleasable));

        // two phases at once
        assert_eq!(
            v.release(300).unwrap(),
            vec![PhaseRelease { phase: 2, amount: 200 }, PhaseRelease { phase: 3, amount: 200 }]
        );
        assert_eq!(v.withdrawn_flags(), [true, true, true, false]);
        assert_eq!(v.release(400).unwrap().len(), 1);
        assert_eq!(v.phases_released(), 4);
        assert_eq!(v.release(u64::MAX), Err(VestingError::NothingReleasable));
    }

    #[test]
    fn releasable_is_read_only() {
        let mut v = vesting();
        v.fund(10).unwrap();
        assert_eq!(v.releasable(250).len(), 2);
        assert_eq!(v.phases_released(), 0);
        assert_eq!(v.total(), 10);
    }
}
