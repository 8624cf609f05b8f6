//! Sale schedule: tokenomics, cumulative caps, stage timestamps and rates.
//!
//! Time opens the stages; an exhausted cumulative cap rolls a public stage
//! forward early, and exhaustion of the total cap ends the sale. Caps are
//! cumulative thresholds on `token_sold`, never per-stage deltas.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{mul_div_u128, Balance, Timestamp};

/// Basis points denominator (100% == 10_000 bps).
pub const BPS_DENOM: u128 = 10_000;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    #[error("invalid spec: {0}")]
    Invalid(&'static str),
    #[error("arithmetic overflow")]
    Overflow,
}

/// Fixed total supply and how it is carved up (basis points of max supply).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tokenomics {
    /// Whole tokens at full sell-out, before decimals.
    pub max_supply_tokens: u64,
    pub decimals: u32,
    /// Cumulative thresholds.
    pub presale_bps: u16,
    pub stage1_bps: u16,
    pub stage2_bps: u16,
    pub total_bps: u16,
    /// Minted to the bounty registry at deployment.
    pub bounty_bps: u16,
    /// Reserved for founders, released through vesting.
    pub founder_bps: u16,
}

impl Default for Tokenomics {
    fn default() -> Self {
        Self {
            max_supply_tokens: 500_000_000,
            decimals: 18,
            presale_bps: 500,
            stage1_bps: 2_500,
            stage2_bps: 5_000,
            total_bps: 7_500,
            bounty_bps: 0,
            founder_bps: 2_500,
        }
    }
}

impl Tokenomics {
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.max_supply_tokens == 0 {
            return Err(SpecError::Invalid("max_supply_tokens must be > 0"));
        }
        if self.decimals > 30 {
            return Err(SpecError::Invalid("decimals must be <= 30"));
        }
        if self.presale_bps == 0 {
            return Err(SpecError::Invalid("presale_bps must be > 0"));
        }
        if !(self.presale_bps < self.stage1_bps
            && self.stage1_bps < self.stage2_bps
            && self.stage2_bps < self.total_bps)
        {
            return Err(SpecError::Invalid("cap percentages must be strictly increasing"));
        }
        if self.founder_bps == 0 {
            return Err(SpecError::Invalid("founder_bps must be > 0"));
        }
        let sum = self.total_bps as u32 + self.bounty_bps as u32 + self.founder_bps as u32;
        if sum != BPS_DENOM as u32 {
            return Err(SpecError::Invalid("total_bps + bounty_bps + founder_bps must equal 10000"));
        }
        self.max_supply()?;
        Ok(())
    }

    /// One whole token in base units (10^decimals).
    pub fn token_unit(&self) -> Result<Balance, SpecError> {
        10u128.checked_pow(self.decimals).ok_or(SpecError::Overflow)
    }

    /// Max supply in base units.
    pub fn max_supply(&self) -> Result<Balance, SpecError> {
        (self.max_supply_tokens as u128)
            .checked_mul(self.token_unit()?)
            .ok_or(SpecError::Overflow)
    }

    fn share(&self, bps: u16) -> Result<Balance, SpecError> {
        mul_div_u128(self.max_supply()?, bps as u128, BPS_DENOM).ok_or(SpecError::Overflow)
    }

    pub fn caps(&self) -> Result<SaleCaps, SpecError> {
        self.validate()?;
        let caps = SaleCaps {
            presale: self.share(self.presale_bps)?,
            stage1: self.share(self.stage1_bps)?,
            stage2: self.share(self.stage2_bps)?,
            total: self.share(self.total_bps)?,
        };
        caps.validate()?;
        Ok(caps)
    }

    pub fn bounty_supply(&self) -> Result<Balance, SpecError> {
        self.share(self.bounty_bps)
    }

    /// Founder entitlement at full sell-out.
    pub fn founder_reserve(&self) -> Result<Balance, SpecError> {
        self.share(self.founder_bps)
    }
}

/// Cumulative caps in token base units. `total` doubles as the stage-3 cap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleCaps {
    pub presale: Balance,
    pub stage1: Balance,
    pub stage2: Balance,
    pub total: Balance,
}

impl SaleCaps {
    pub fn validate(&self) -> Result<(), SpecError> {
        if !(0 < self.presale
            && self.presale < self.stage1
            && self.stage1 < self.stage2
            && self.stage2 < self.total)
        {
            return Err(SpecError::Invalid("caps must be strictly increasing"));
        }
        Ok(())
    }
}

/// Schedule and prices decided by the owner. Immutable once confirmed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleSpec {
    pub stage1_start: Timestamp,
    pub stage2_start: Timestamp,
    pub stage3_start: Timestamp,
    pub sale_end: Timestamp,
    /// Value units per whole token.
    pub rate_stage1: Balance,
    pub rate_stage2: Balance,
    pub rate_stage3: Balance,
    /// Founder vesting unlock times.
    pub unlock_phase1: Timestamp,
    pub unlock_phase2: Timestamp,
    pub unlock_phase3: Timestamp,
    pub unlock_phase4: Timestamp,
}

impl SaleSpec {
    pub fn validate(&self) -> Result<(), SpecError> {
        let stamps = [self.stage1_start, self.stage2_start, self.stage3_start, self.sale_end];
        if stamps.iter().any(|t| *t == 0) {
            return Err(SpecError::Invalid("stage timestamps must be non-zero"));
        }
        if !stamps.windows(2).all(|w| w[0] < w[1]) {
            return Err(SpecError::Invalid("stage timestamps must be strictly increasing"));
        }
        if self.rate_stage1 == 0 || self.rate_stage2 == 0 || self.rate_stage3 == 0 {
            return Err(SpecError::Invalid("rates must be > 0"));
        }
        if !(self.rate_stage1 <= self.rate_stage2 && self.rate_stage2 <= self.rate_stage3) {
            return Err(SpecError::Invalid("rates must be non-decreasing across stages"));
        }
        let unlocks = self.unlock_times();
        if unlocks.iter().any(|t| *t == 0) {
            return Err(SpecError::Invalid("unlock timestamps must be non-zero"));
        }
        if !unlocks.windows(2).all(|w| w[0] < w[1]) {
            return Err(SpecError::Invalid("unlock timestamps must be strictly increasing"));
        }
        Ok(())
    }

    pub fn unlock_times(&self) -> [Timestamp; 4] {
        [self.unlock_phase1, self.unlock_phase2, self.unlock_phase3, self.unlock_phase4]
    }

    /// Rate of a public stage; `None` for stages that do not sell for value.
    pub fn rate(&self, stage: Stage) -> Option<Balance> {
        match stage {
            Stage::Stage1 => Some(self.rate_stage1),
            Stage::Stage2 => Some(self.rate_stage2),
            Stage::Stage3 => Some(self.rate_stage3),
            _ => None,
        }
    }
}

/// Sale stage derived from time and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    NotStarted,
    PreSale,
    Stage1,
    Stage2,
    Stage3,
    Ended,
}

impl Stage {
    pub fn is_public(&self) -> bool {
        matches!(self, Stage::Stage1 | Stage::Stage2 | Stage::Stage3)
    }

    /// Effective cumulative ceiling: min(stage cap, total cap).
    pub fn effective_cap(&self, caps: &SaleCaps) -> Option<Balance> {
        let cap = match self {
            Stage::PreSale => caps.presale,
            Stage::Stage1 => caps.stage1,
            Stage::Stage2 => caps.stage2,
            Stage::Stage3 => caps.total,
            Stage::NotStarted | Stage::Ended => return None,
        };
        Some(cap.min(caps.total))
    }
}

/// Resolve the current stage.
///
/// `active` is the confirmed spec together with the pre-sale start time;
/// `None` means the sale has not been confirmed yet.
///
/// Once a public stage is open by time, the stage also advances by counter:
/// it is the later of the time-based stage and the first stage whose
/// cumulative cap is still above `token_sold`. A stage can therefore be
/// skipped before its window opens. The pre-sale never rolls over.
pub fn resolve_stage(
    active: Option<(&SaleSpec, Timestamp)>,
    caps: &SaleCaps,
    token_sold: Balance,
    now: Timestamp,
) -> Stage {
    let (spec, presale_start) = match active {
        Some(a) => a,
        None => return Stage::NotStarted,
    };
    if now >= spec.sale_end || token_sold >= caps.total {
        return Stage::Ended;
    }
    if now < presale_start {
        return Stage::NotStarted;
    }
    let by_time = if now >= spec.stage3_start {
        Stage::Stage3
    } else if now >= spec.stage2_start {
        Stage::Stage2
    } else if now >= spec.stage1_start {
        Stage::Stage1
    } else {
        return Stage::PreSale;
    };
    by_time.max(stage_by_counter(caps, token_sold))
}

/// First public stage whose cumulative cap is not yet reached.
fn stage_by_counter(caps: &SaleCaps, token_sold: Balance) -> Stage {
    if token_sold < caps.stage1 {
        Stage::Stage1
    } else if token_sold < caps.stage2 {
        Stage::Stage2
    } else {
        Stage::Stage3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec_at(t0: Timestamp) -> SaleSpec {
        SaleSpec {
            stage1_start: t0 + 600,
            stage2_start: t0 + 1_200,
            stage3_start: t0 + 1_800,
            sale_end: t0 + 2_400,
            rate_stage1: 10,
            rate_stage2: 12,
            rate_stage3: 15,
            unlock_phase1: t0 + 3_000,
            unlock_phase2: t0 + 3_600,
            unlock_phase3: t0 + 4_200,
            unlock_phase4: t0 + 4_800,
        }
    }

    #[test]
    fn default_caps_match_fixed_percentages() {
        let t = Tokenomics::default();
        let max = t.max_supply().unwrap();
        assert_eq!(max, 500_000_000u128 * 10u128.pow(18));
        let caps = t.caps().unwrap();
        assert_eq!(caps.presale, max / 20);
        assert_eq!(caps.stage1, max / 4);
        assert_eq!(caps.stage2, max / 2);
        assert_eq!(caps.total, max * 3 / 4);
        assert_eq!(t.founder_reserve().unwrap(), max / 4);
        assert_eq!(t.bounty_supply().unwrap(), 0);
    }

    #[test]
    fn tokenomics_rejects_non_increasing_or_unbalanced() {
        let mut t = Tokenomics::default();
        t.stage1_bps = t.presale_bps;
        assert!(t.caps().is_err());

        let mut t = Tokenomics::default();
        t.bounty_bps = 100; // 7500 + 100 + 2500 != 10000
        assert_eq!(
            t.validate(),
            Err(SpecError::Invalid("total_bps + bounty_bps + founder_bps must equal 10000"))
        );

        let mut t = Tokenomics::default();
        t.total_bps = 7_400;
        t.bounty_bps = 100;
        assert!(t.validate().is_ok());
    }

    #[test]
    fn caps_collapsing_after_rounding_are_rejected() {
        let t = Tokenomics {
            max_supply_tokens: 1,
            decimals: 0,
            ..Tokenomics::default()
        };
        // every share floors to 0
        assert!(t.caps().is_err());
    }

    #[test]
    fn spec_validation_covers_every_parameter() {
        let ok = spec_at(1_000);
        assert!(ok.validate().is_ok());

        let mut s = ok;
        s.stage2_start = s.stage1_start;
        assert!(s.validate().is_err());

        let mut s = ok;
        s.sale_end = 0;
        assert!(s.validate().is_err());

        let mut s = ok;
        s.rate_stage3 = 0;
        assert!(s.validate().is_err());

        let mut s = ok;
        s.rate_stage2 = 9;
        assert!(s.validate().is_err());

        let mut s = ok;
        s.unlock_phase3 = s.unlock_phase2;
        assert!(s.validate().is_err());

        let mut s = ok;
        s.unlock_phase1 = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn stage_resolution_follows_time_without_sales() {
        let t0 = 1_000;
        let spec = spec_at(t0);
        let caps = Tokenomics::default().caps().unwrap();
        let active = Some((&spec, t0));

        assert_eq!(resolve_stage(None, &caps, 0, t0 + 700), Stage::NotStarted);
        assert_eq!(resolve_stage(active, &caps, 0, t0 - 1), Stage::NotStarted);
        assert_eq!(resolve_stage(active, &caps, 0, t0), Stage::PreSale);
        assert_eq!(resolve_stage(active, &caps, 0, t0 + 599), Stage::PreSale);
        assert_eq!(resolve_stage(active, &caps, 0, t0 + 600), Stage::Stage1);
        assert_eq!(resolve_stage(active, &caps, 0, t0 + 1_200), Stage::Stage2);
        assert_eq!(resolve_stage(active, &caps, 0, t0 + 1_800), Stage::Stage3);
        assert_eq!(resolve_stage(active, &caps, 0, t0 + 2_400), Stage::Ended);
    }

    #[test]
    fn exhausted_cap_rolls_public_stage_forward() {
        let t0 = 1_000;
        let spec = spec_at(t0);
        let caps = Tokenomics::default().caps().unwrap();
        let active = Some((&spec, t0));

        assert_eq!(resolve_stage(active, &caps, caps.stage1 - 1, t0 + 700), Stage::Stage1);
        assert_eq!(resolve_stage(active, &caps, caps.stage1, t0 + 700), Stage::Stage2);
        // stage 2 skipped entirely inside the stage-1 window
        assert_eq!(resolve_stage(active, &caps, caps.stage2, t0 + 700), Stage::Stage3);
        // time never moves backwards
        assert_eq!(resolve_stage(active, &caps, 0, t0 + 1_800), Stage::Stage3);
        // pre-sale stays put even with its cap filled
        assert_eq!(resolve_stage(active, &caps, caps.stage1, t0 + 10), Stage::PreSale);
    }

    #[test]
    fn total_cap_ends_sale_early() {
        let t0 = 1_000;
        let spec = spec_at(t0);
        let caps = Tokenomics::default().caps().unwrap();
        assert_eq!(resolve_stage(Some((&spec, t0)), &caps, caps.total, t0 + 700), Stage::Ended);
        assert_eq!(resolve_stage(Some((&spec, t0)), &caps, caps.total, t0 + 1), Stage::Ended);
    }

    #[test]
    fn effective_cap_and_rate_per_stage() {
        let spec = spec_at(1_000);
        let caps = Tokenomics::default().caps().unwrap();
        assert_eq!(Stage::PreSale.effective_cap(&caps), Some(caps.presale));
        assert_eq!(Stage::Stage2.effective_cap(&caps), Some(caps.stage2));
        assert_eq!(Stage::Stage3.effective_cap(&caps), Some(caps.total));
        assert_eq!(Stage::Ended.effective_cap(&caps), None);

        assert_eq!(spec.rate(Stage::Stage1), Some(10));
        assert_eq!(spec.rate(Stage::Stage3), Some(15));
        assert_eq!(spec.rate(Stage::PreSale), None);
    }
}
