//! Crowdsale engine.
//!
//! One engine owns one sale: the stage/time state machine, counters, the token
//! ledger, the bounty registry and the founder vesting schedule. Every write
//! goes through `execute`, which serializes commands on a single mutex,
//! snapshots `now` once, checks the caller's role and either commits all
//! effects (ledger, registry, scalar state, events) or none of them.

use std::{collections::VecDeque, fmt, sync::Arc};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    backend::{BackendError, SaleBackend},
    bounty::{BountyError, BountyEvent, BountyRegistry},
    ledger::{Ledger, LedgerError, LedgerEvent},
    mul_div_u128,
    schedule::{resolve_stage, SaleCaps, SaleSpec, SpecError, Stage, Tokenomics, BPS_DENOM},
    vesting::{FounderVesting, VestingError},
    Address, Balance, Timestamp,
};

const MAX_EVENTS: usize = 10_000;
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// Ledger account holding unvested founder tokens.
pub const DEFAULT_HOLDING_ADDRESS: Address = {
    let mut b = [0u8; 20];
    b[0] = 0xC5;
    b[19] = 0x01;
    Address(b)
};

/// Ledger account holding the bounty supply.
pub const DEFAULT_BOUNTY_ADDRESS: Address = {
    let mut b = [0u8; 20];
    b[0] = 0xC5;
    b[19] = 0x02;
    Address(b)
};

// ---------- Deployment ----------

/// Deployment-time parameters. `spec: Some` deploys with the schedule already
/// confirmed; `None` defers it to `set_spec` + `confirm_spec`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deployment {
    pub owner: Address,
    pub wallet: Address,
    pub bounty_admin: Address,
    pub holding: Address,
    pub bounty_address: Address,
    pub tokenomics: Tokenomics,
    pub spec: Option<SaleSpec>,
}

impl Deployment {
    pub fn new(owner: Address, wallet: Address, bounty_admin: Address) -> Self {
        Self {
            owner,
            wallet,
            bounty_admin,
            holding: DEFAULT_HOLDING_ADDRESS,
            bounty_address: DEFAULT_BOUNTY_ADDRESS,
            tokenomics: Tokenomics::default(),
            spec: None,
        }
    }

    pub fn with_spec(mut self, spec: SaleSpec) -> Self {
        self.spec = Some(spec);
        self
    }

    pub fn with_tokenomics(mut self, tokenomics: Tokenomics) -> Self {
        self.tokenomics = tokenomics;
        self
    }

    pub fn validate(&self) -> Result<(), CrowdsaleError> {
        let roles = [self.owner, self.wallet, self.bounty_admin, self.holding, self.bounty_address];
        if roles.iter().any(Address::is_zero) {
            return Err(CrowdsaleError::ZeroAddress);
        }
        if self.holding == self.bounty_address {
            return Err(CrowdsaleError::InvalidDeployment(
                "holding and bounty accounts must differ",
            ));
        }
        if [self.owner, self.wallet, self.bounty_admin].contains(&self.holding)
            || [self.owner, self.wallet, self.bounty_admin].contains(&self.bounty_address)
        {
            return Err(CrowdsaleError::InvalidDeployment(
                "engine accounts must not be role addresses",
            ));
        }
        self.tokenomics.caps()?;
        if let Some(spec) = &self.spec {
            spec.validate()?;
        }
        Ok(())
    }
}

// ---------- Lifecycle, roles ----------

/// One-way sale lifecycle. Variants are ordered; transitions only move forward.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SaleLifecycle {
    AwaitingSpec,
    Confirmed,
    Settled,
}

impl SaleLifecycle {
    pub fn is_confirmed(&self) -> bool {
        *self >= SaleLifecycle::Confirmed
    }
}

/// Capability required to run a command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Owner,
    BountyAdmin,
    Public,
}

// ---------- Events ----------

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CrowdsaleEvent {
    TokenPurchase {
        purchaser: Address,
        beneficiary: Address,
        value: Balance,
        amount: Balance,
        stage: Stage,
    },
    SpecUpdated(SaleSpec),
    SpecConfirmed { presale_start: Timestamp },
    Settled { token_sold: Balance, founder_pool: Balance },
    FounderWithdrawal { phase: u8, amount: Balance },
    OwnershipTransferred { previous: Address, new: Address },
    Ledger(LedgerEvent),
    Bounty(BountyEvent),
}

// ---------- Errors ----------

/// Coarse error taxonomy for callers deciding whether to retry later,
/// fix the input, or give up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Authorization,
    Validation,
    State,
    Capacity,
    Backend,
    Arithmetic,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CrowdsaleError {
    #[error("not authorized")]
    NotAuthorized,
    #[error("zero address")]
    ZeroAddress,
    #[error("amount must be > 0")]
    ZeroAmount,
    #[error("invalid deployment: {0}")]
    InvalidDeployment(&'static str),
    #[error("sale spec not set")]
    SpecMissing,
    #[error("sale spec not confirmed")]
    SpecNotConfirmed,
    #[error("sale spec already confirmed")]
    SpecAlreadyConfirmed,
    #[error("sale window already over")]
    SpecExpired,
    #[error("operation not allowed in stage {0:?}")]
    StageClosed(Stage),
    #[error("sale has not ended")]
    SaleNotEnded,
    #[error("sale already settled")]
    AlreadySettled,
    #[error("sale not settled")]
    NotSettled,
    #[error("cap exceeded: {requested} > {cap}")]
    CapExceeded { cap: Balance, requested: Balance },
    #[error("arithmetic overflow")]
    MathOverflow,
    #[error(transparent)]
    Spec(#[from] SpecError),
    #[error(transparent)]
    Vesting(#[from] VestingError),
    #[error("ledger: {0}")]
    Ledger(#[from] LedgerError),
    #[error("bounty: {0}")]
    Bounty(#[from] BountyError),
    #[error("backend: {0}")]
    Backend(#[from] BackendError),
}

fn ledger_kind(e: &LedgerError) -> ErrorKind {
    match e {
        LedgerError::NotPrivileged => ErrorKind::Authorization,
        LedgerError::Locked => ErrorKind::State,
        LedgerError::ZeroAddress | LedgerError::ZeroAmount => ErrorKind::Validation,
        LedgerError::InsufficientBalance | LedgerError::InsufficientAllowance => {
            ErrorKind::Capacity
        }
        LedgerError::Overflow => ErrorKind::Arithmetic,
    }
}

impl CrowdsaleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotAuthorized => ErrorKind::Authorization,
            Self::ZeroAddress
            | Self::ZeroAmount
            | Self::InvalidDeployment(_)
            | Self::SpecExpired => ErrorKind::Validation,
            Self::SpecMissing
            | Self::SpecNotConfirmed
            | Self::SpecAlreadyConfirmed
            | Self::StageClosed(_)
            | Self::SaleNotEnded
            | Self::AlreadySettled
            | Self::NotSettled => ErrorKind::State,
            Self::CapExceeded { .. } => ErrorKind::Capacity,
            Self::MathOverflow => ErrorKind::Arithmetic,
            Self::Spec(SpecError::Invalid(_)) => ErrorKind::Validation,
            Self::Spec(SpecError::Overflow) => ErrorKind::Arithmetic,
            Self::Vesting(VestingError::Invalid(_)) => ErrorKind::Validation,
            Self::Vesting(VestingError::Overflow) => ErrorKind::Arithmetic,
            Self::Vesting(_) => ErrorKind::State,
            Self::Ledger(e) => ledger_kind(e),
            Self::Bounty(BountyError::NotAdmin) => ErrorKind::Authorization,
            Self::Bounty(
                BountyError::LengthMismatch(..)
                | BountyError::ZeroAddress
                | BountyError::ValueRejected,
            ) => ErrorKind::Validation,
            Self::Bounty(BountyError::Ledger(e)) => ledger_kind(e),
            Self::Bounty(_) => ErrorKind::State,
            Self::Backend(_) => ErrorKind::Backend,
        }
    }
}

// ---------- State ----------

/// Scalar sale state; saved by value before each command and restored on revert.
#[derive(Clone, Copy, Debug)]
struct SaleState {
    owner: Address,
    lifecycle: SaleLifecycle,
    spec: Option<SaleSpec>,
    presale_start: Option<Timestamp>,
    wei_raised: Balance,
    token_sold: Balance,
    vesting: Option<FounderVesting>,
    founder_pool: Balance,
}

impl SaleState {
    fn active(&self) -> Option<(&SaleSpec, Timestamp)> {
        if !self.lifecycle.is_confirmed() {
            return None;
        }
        match (&self.spec, self.presale_start) {
            (Some(spec), Some(start)) => Some((spec, start)),
            _ => None,
        }
    }

    fn stage(&self, caps: &SaleCaps, now: Timestamp) -> Stage {
        if self.lifecycle == SaleLifecycle::Settled {
            return Stage::Ended;
        }
        resolve_stage(self.active(), caps, self.token_sold, now)
    }
}

struct Inner {
    sale: SaleState,
    ledger: Ledger,
    bounty: BountyRegistry,
    events: VecDeque<CrowdsaleEvent>,
}

impl Inner {
    fn push_event(&mut self, ev: CrowdsaleEvent) {
        if self.events.len() == MAX_EVENTS {
            self.events.pop_front();
        }
        self.events.push_back(ev);
    }
}

/// Mutable view handed to a command body.
struct Ctx<'a> {
    now: Timestamp,
    sale: &'a mut SaleState,
    ledger: &'a mut Ledger,
    bounty: &'a mut BountyRegistry,
    emitted: Vec<CrowdsaleEvent>,
}

impl Ctx<'_> {
    fn emit(&mut self, ev: CrowdsaleEvent) {
        self.emitted.push(ev);
    }
}

/// High-level sale status.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SaleSnapshot {
    pub lifecycle: SaleLifecycle,
    pub stage: Stage,
    pub presale_start: Option<Timestamp>,
    pub wei_raised: Balance,
    pub token_sold: Balance,
    pub total_supply: Balance,
    pub locked: bool,
    pub founder_pool: Balance,
    pub phases_released: u8,
}

// ---------- Engine ----------

pub struct Crowdsale<B: SaleBackend> {
    backend: Arc<B>,
    wallet: Address,
    holding: Address,
    tokenomics: Tokenomics,
    caps: SaleCaps,
    bounty_supply: Balance,
    founder_reserve: Balance,
    inner: Mutex<Inner>,
    events_tx: broadcast::Sender<CrowdsaleEvent>,
}

impl<B: SaleBackend> fmt::Debug for Crowdsale<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.inner.lock();
        f.debug_struct("Crowdsale")
            .field("lifecycle", &g.sale.lifecycle)
            .field("token_sold", &g.sale.token_sold)
            .field("wei_raised", &g.sale.wei_raised)
            .finish()
    }
}

impl<B: SaleBackend> Crowdsale<B> {
    /// Deploy a sale. Mints the bounty supply to the registry account and,
    /// for an immediate deployment, confirms the schedule at the current time.
    pub fn deploy(backend: Arc<B>, d: Deployment) -> Result<Arc<Self>, CrowdsaleError> {
        d.validate()?;
        let caps = d.tokenomics.caps()?;
        let bounty_supply = d.tokenomics.bounty_supply()?;
        let founder_reserve = d.tokenomics.founder_reserve()?;
        let now = backend.now_unix();

        let mut ledger = Ledger::new(d.holding);
        if bounty_supply > 0 {
            ledger.mint(d.holding, d.bounty_address, bounty_supply)?;
        }
        let bounty = BountyRegistry::new(d.bounty_admin, d.bounty_address);

        let mut sale = SaleState {
            owner: d.owner,
            lifecycle: SaleLifecycle::AwaitingSpec,
            spec: None,
            presale_start: None,
            wei_raised: 0,
            token_sold: 0,
            vesting: None,
            founder_pool: 0,
        };
        let mut initial = Vec::new();
        if let Some(spec) = d.spec {
            if now >= spec.sale_end {
                return Err(CrowdsaleError::SpecExpired);
            }
            sale.spec = Some(spec);
            sale.presale_start = Some(now);
            sale.vesting = Some(FounderVesting::new(spec.unlock_times())?);
            sale.lifecycle = SaleLifecycle::Confirmed;
            initial.push(CrowdsaleEvent::SpecConfirmed { presale_start: now });
        }

        let mut inner = Inner { sale, ledger, bounty, events: VecDeque::with_capacity(1024) };
        for ev in inner.ledger.take_events() {
            inner.push_event(CrowdsaleEvent::Ledger(ev));
        }
        for ev in initial {
            inner.push_event(ev);
        }

        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        info!(
            target: "crowdsale",
            owner = %d.owner,
            wallet = %d.wallet,
            immediate = d.spec.is_some(),
            cap_total = %caps.total,
            "crowdsale deployed"
        );
        Ok(Arc::new(Self {
            backend,
            wallet: d.wallet,
            holding: d.holding,
            tokenomics: d.tokenomics,
            caps,
            bounty_supply,
            founder_reserve,
            inner: Mutex::new(inner),
            events_tx: tx,
        }))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CrowdsaleEvent> {
        self.events_tx.subscribe()
    }

    fn authorize(&self, cx: &Ctx<'_>, caller: Address, role: Role) -> Result<(), CrowdsaleError> {
        let ok = match role {
            Role::Owner => caller == cx.sale.owner,
            Role::BountyAdmin => caller == cx.bounty.admin(),
            Role::Public => true,
        };
        if ok {
            Ok(())
        } else {
            Err(CrowdsaleError::NotAuthorized)
        }
    }

    /// Run one command atomically.
    fn execute<T>(
        &self,
        op: &'static str,
        caller: Address,
        role: Role,
        body: impl FnOnce(&mut Ctx<'_>) -> Result<T, CrowdsaleError>,
    ) -> Result<T, CrowdsaleError> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let now = self.backend.now_unix();

        let saved = inner.sale;
        inner.ledger.checkpoint();
        inner.bounty.checkpoint();

        let (res, emitted) = {
            let mut cx = Ctx {
                now,
                sale: &mut inner.sale,
                ledger: &mut inner.ledger,
                bounty: &mut inner.bounty,
                emitted: Vec::new(),
            };
            let res = match self.authorize(&cx, caller, role) {
                Ok(()) => body(&mut cx),
                Err(e) => Err(e),
            };
            (res, cx.emitted)
        };

        match res {
            Ok(v) => {
                inner.ledger.commit();
                inner.bounty.commit();
                let mut out: Vec<CrowdsaleEvent> =
                    inner.ledger.take_events().into_iter().map(CrowdsaleEvent::Ledger).collect();
                out.extend(inner.bounty.take_events().into_iter().map(CrowdsaleEvent::Bounty));
                out.extend(emitted);
                debug!(target: "crowdsale", op, %caller, events = out.len(), "command committed");
                for ev in out {
                    inner.push_event(ev.clone());
                    let _ = self.events_tx.send(ev);
                }
                Ok(v)
            }
            Err(e) => {
                inner.ledger.rollback();
                inner.bounty.rollback();
                inner.sale = saved;
                warn!(target: "crowdsale", op, %caller, error = %e, "command reverted");
                Err(e)
            }
        }
    }

    // ---------- Purchases ----------

    /// Owner allocates `token_amount` base units during the pre-sale window.
    pub fn buy_tokens_presale(
        &self,
        caller: Address,
        beneficiary: Address,
        token_amount: Balance,
    ) -> Result<(), CrowdsaleError> {
        self.execute("buy_tokens_presale", caller, Role::Owner, |cx| {
            if !cx.sale.lifecycle.is_confirmed() {
                return Err(CrowdsaleError::SpecNotConfirmed);
            }
            let stage = cx.sale.stage(&self.caps, cx.now);
            if stage != Stage::PreSale {
                return Err(CrowdsaleError::StageClosed(stage));
            }
            if beneficiary.is_zero() {
                return Err(CrowdsaleError::ZeroAddress);
            }
            if token_amount == 0 {
                return Err(CrowdsaleError::ZeroAmount);
            }
            let sold = cx
                .sale
                .token_sold
                .checked_add(token_amount)
                .ok_or(CrowdsaleError::MathOverflow)?;
            if sold > self.caps.presale {
                return Err(CrowdsaleError::CapExceeded { cap: self.caps.presale, requested: sold });
            }

            cx.ledger.mint(self.holding, beneficiary, token_amount)?;
            cx.sale.token_sold = sold;
            cx.emit(CrowdsaleEvent::TokenPurchase {
                purchaser: beneficiary,
                beneficiary,
                value: 0,
                amount: token_amount,
                stage,
            });
            info!(
                target: "crowdsale",
                %beneficiary,
                amount = %token_amount,
                token_sold = %sold,
                "pre-sale allocation"
            );
            Ok(())
        })
    }

    /// Public purchase for `value` units of the value asset paid by `caller`.
    /// Mints `floor(value / rate)` whole tokens; the remainder is not refunded.
    /// Rate and cap follow the resolved stage, so an exhausted stage prices
    /// the next purchase at the following stage. Returns the minted amount in
    /// base units.
    pub fn buy_tokens(
        &self,
        caller: Address,
        beneficiary: Address,
        value: Balance,
    ) -> Result<Balance, CrowdsaleError> {
        self.execute("buy_tokens", caller, Role::Public, |cx| {
            if beneficiary.is_zero() {
                return Err(CrowdsaleError::ZeroAddress);
            }
            if value == 0 {
                return Err(CrowdsaleError::ZeroAmount);
            }
            if !cx.sale.lifecycle.is_confirmed() {
                return Err(CrowdsaleError::SpecNotConfirmed);
            }
            let stage = cx.sale.stage(&self.caps, cx.now);
            let rate = cx.sale.spec.as_ref().and_then(|s| s.rate(stage));
            let (rate, cap) = match (rate, stage.effective_cap(&self.caps)) {
                (Some(rate), Some(cap)) if stage.is_public() => (rate, cap),
                _ => return Err(CrowdsaleError::StageClosed(stage)),
            };

            let whole = value / rate;
            let amount = whole
                .checked_mul(self.tokenomics.token_unit()?)
                .ok_or(CrowdsaleError::MathOverflow)?;
            if amount == 0 {
                return Err(CrowdsaleError::ZeroAmount);
            }
            let sold = cx.sale.token_sold.checked_add(amount).ok_or(CrowdsaleError::MathOverflow)?;
            if sold > cap {
                return Err(CrowdsaleError::CapExceeded { cap, requested: sold });
            }
            let raised = cx.sale.wei_raised.checked_add(value).ok_or(CrowdsaleError::MathOverflow)?;

            cx.ledger.mint(self.holding, beneficiary, amount)?;
            cx.sale.token_sold = sold;
            cx.sale.wei_raised = raised;
            self.backend.forward_value(caller, self.wallet, value)?;

            cx.emit(CrowdsaleEvent::TokenPurchase {
                purchaser: caller,
                beneficiary,
                value,
                amount,
                stage,
            });
            info!(
                target: "crowdsale",
                purchaser = %caller,
                %beneficiary,
                value = %value,
                amount = %amount,
                ?stage,
                token_sold = %sold,
                "token purchase"
            );
            Ok(amount)
        })
    }

    /// Plain inbound value: buys for the sender.
    pub fn receive(&self, caller: Address, value: Balance) -> Result<Balance, CrowdsaleError> {
        self.buy_tokens(caller, caller, value)
    }

    // ---------- Settlement and vesting ----------

    /// Fix the founder pool, mint it to the holding account and lift the
    /// ledger lockup. Owner only, once, after the sale has ended.
    pub fn settle(&self, caller: Address) -> Result<Balance, CrowdsaleError> {
        self.execute("settle", caller, Role::Owner, |cx| {
            match cx.sale.lifecycle {
                SaleLifecycle::Settled => return Err(CrowdsaleError::AlreadySettled),
                SaleLifecycle::AwaitingSpec => return Err(CrowdsaleError::SpecNotConfirmed),
                SaleLifecycle::Confirmed => {}
            }
            if cx.sale.stage(&self.caps, cx.now) != Stage::Ended {
                return Err(CrowdsaleError::SaleNotEnded);
            }

            let sold = cx.sale.token_sold;
            let pool = if sold == self.caps.total {
                self.founder_reserve
            } else {
                let distributed = sold
                    .checked_add(self.bounty_supply)
                    .ok_or(CrowdsaleError::MathOverflow)?;
                let founder_bps = self.tokenomics.founder_bps as u128;
                mul_div_u128(distributed, founder_bps, BPS_DENOM - founder_bps)
                    .ok_or(CrowdsaleError::MathOverflow)?
            };

            if pool > 0 {
                cx.ledger.mint(self.holding, self.holding, pool)?;
            }
            cx.ledger.set_lockup(self.holding, false)?;
            let vesting = cx.sale.vesting.as_mut().ok_or(CrowdsaleError::SpecMissing)?;
            vesting.fund(pool)?;
            cx.sale.founder_pool = pool;
            cx.sale.lifecycle = SaleLifecycle::Settled;

            cx.emit(CrowdsaleEvent::Settled { token_sold: sold, founder_pool: pool });
            info!(target: "crowdsale", token_sold = %sold, founder_pool = %pool, "sale settled");
            Ok(pool)
        })
    }

    /// Release every unlocked, unclaimed vesting phase to the owner.
    /// Fails when nothing new is releasable. Returns the amount paid.
    pub fn founder_withdraw(&self, caller: Address) -> Result<Balance, CrowdsaleError> {
        self.execute("founder_withdraw", caller, Role::Owner, |cx| {
            if cx.sale.lifecycle != SaleLifecycle::Settled {
                return Err(CrowdsaleError::NotSettled);
            }
            let owner = cx.sale.owner;
            let vesting = cx.sale.vesting.as_mut().ok_or(CrowdsaleError::NotSettled)?;
            let released = vesting.release(cx.now)?;

            let mut total: Balance = 0;
            for r in released {
                if r.amount > 0 {
                    cx.ledger.transfer(self.holding, owner, r.amount)?;
                }
                total = total.checked_add(r.amount).ok_or(CrowdsaleError::MathOverflow)?;
                cx.emit(CrowdsaleEvent::FounderWithdrawal { phase: r.phase, amount: r.amount });
                info!(
                    target: "crowdsale",
                    phase = r.phase,
                    amount = %r.amount,
                    "founder phase released"
                );
            }
            Ok(total)
        })
    }

    // ---------- Deferred spec ----------

    /// Replace the pending schedule. Rejected once confirmed.
    pub fn set_spec(&self, caller: Address, spec: SaleSpec) -> Result<(), CrowdsaleError> {
        self.execute("set_spec", caller, Role::Owner, |cx| {
            if cx.sale.lifecycle.is_confirmed() {
                return Err(CrowdsaleError::SpecAlreadyConfirmed);
            }
            spec.validate()?;
            cx.sale.spec = Some(spec);
            cx.emit(CrowdsaleEvent::SpecUpdated(spec));
            info!(
                target: "crowdsale",
                stage1 = spec.stage1_start,
                end = spec.sale_end,
                "sale spec updated"
            );
            Ok(())
        })
    }

    /// Freeze the schedule and open the pre-sale now.
    pub fn confirm_spec(&self, caller: Address) -> Result<(), CrowdsaleError> {
        self.execute("confirm_spec", caller, Role::Owner, |cx| {
            if cx.sale.lifecycle.is_confirmed() {
                return Err(CrowdsaleError::SpecAlreadyConfirmed);
            }
            let spec = cx.sale.spec.ok_or(CrowdsaleError::SpecMissing)?;
            if cx.now >= spec.sale_end {
                return Err(CrowdsaleError::SpecExpired);
            }
            cx.sale.vesting = Some(FounderVesting::new(spec.unlock_times())?);
            cx.sale.presale_start = Some(cx.now);
            cx.sale.lifecycle = SaleLifecycle::Confirmed;
            cx.emit(CrowdsaleEvent::SpecConfirmed { presale_start: cx.now });
            info!(target: "crowdsale", presale_start = cx.now, "sale spec confirmed");
            Ok(())
        })
    }

    pub fn transfer_ownership(
        &self,
        caller: Address,
        new_owner: Address,
    ) -> Result<(), CrowdsaleError> {
        self.execute("transfer_ownership", caller, Role::Owner, |cx| {
            if new_owner.is_zero() {
                return Err(CrowdsaleError::ZeroAddress);
            }
            let previous = cx.sale.owner;
            cx.sale.owner = new_owner;
            cx.emit(CrowdsaleEvent::OwnershipTransferred { previous, new: new_owner });
            info!(target: "crowdsale", %previous, new = %new_owner, "ownership transferred");
            Ok(())
        })
    }

    // ---------- Token and bounty pass-throughs ----------

    pub fn transfer(
        &self,
        caller: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), CrowdsaleError> {
        self.execute("transfer", caller, Role::Public, |cx| {
            Ok(cx.ledger.transfer(caller, to, amount)?)
        })
    }

    pub fn approve(
        &self,
        caller: Address,
        spender: Address,
        amount: Balance,
    ) -> Result<(), CrowdsaleError> {
        self.execute("approve", caller, Role::Public, |cx| {
            Ok(cx.ledger.approve(caller, spender, amount)?)
        })
    }

    pub fn transfer_from(
        &self,
        caller: Address,
        from: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), CrowdsaleError> {
        self.execute("transfer_from", caller, Role::Public, |cx| {
            Ok(cx.ledger.transfer_from(caller, from, to, amount)?)
        })
    }

    /// Burn own tokens; `note` typically names a destination on another chain.
    pub fn burn(&self, caller: Address, amount: Balance, note: &str) -> Result<(), CrowdsaleError> {
        self.execute("burn", caller, Role::Public, |cx| {
            cx.ledger.burn(caller, amount, note)?;
            info!(target: "crowdsale", burner = %caller, amount = %amount, note, "tokens burned");
            Ok(())
        })
    }

    pub fn set_bounty_allocations(
        &self,
        caller: Address,
        addrs: &[Address],
        amounts: &[Balance],
    ) -> Result<(), CrowdsaleError> {
        self.execute("set_bounty_allocations", caller, Role::BountyAdmin, |cx| {
            Ok(cx.bounty.set_allocations(caller, addrs, amounts)?)
        })
    }

    pub fn enable_bounty_withdrawal(&self, caller: Address) -> Result<(), CrowdsaleError> {
        self.execute("enable_bounty_withdrawal", caller, Role::BountyAdmin, |cx| {
            Ok(cx.bounty.enable_withdrawal(caller)?)
        })
    }

    pub fn withdraw_bounty(&self, caller: Address) -> Result<Balance, CrowdsaleError> {
        self.execute("withdraw_bounty", caller, Role::Public, |cx| {
            let amount = cx.bounty.withdraw(caller, cx.ledger)?;
            info!(target: "crowdsale", beneficiary = %caller, amount = %amount, "bounty claimed");
            Ok(amount)
        })
    }

    /// Inbound value sent to the bounty registry; zero value claims.
    pub fn send_to_bounty(
        &self,
        caller: Address,
        value: Balance,
    ) -> Result<Balance, CrowdsaleError> {
        self.execute("send_to_bounty", caller, Role::Public, |cx| {
            Ok(cx.bounty.receive(caller, value, cx.ledger)?)
        })
    }

    // ---------- Read surface ----------

    pub fn stage(&self) -> Stage {
        let now = self.backend.now_unix();
        self.inner.lock().sale.stage(&self.caps, now)
    }

    pub fn caps(&self) -> SaleCaps {
        self.caps
    }

    pub fn tokenomics(&self) -> Tokenomics {
        self.tokenomics
    }

    pub fn spec(&self) -> Option<SaleSpec> {
        self.inner.lock().sale.spec
    }

    pub fn lifecycle(&self) -> SaleLifecycle {
        self.inner.lock().sale.lifecycle
    }

    pub fn spec_confirmed(&self) -> bool {
        self.lifecycle().is_confirmed()
    }

    pub fn post_ico_executed(&self) -> bool {
        self.lifecycle() == SaleLifecycle::Settled
    }

    pub fn presale_start(&self) -> Option<Timestamp> {
        self.inner.lock().sale.presale_start
    }

    pub fn wei_raised(&self) -> Balance {
        self.inner.lock().sale.wei_raised
    }

    pub fn token_sold(&self) -> Balance {
        self.inner.lock().sale.token_sold
    }

    pub fn vesting(&self) -> Option<FounderVesting> {
        self.inner.lock().sale.vesting
    }

    pub fn owner(&self) -> Address {
        self.inner.lock().sale.owner
    }

    pub fn wallet(&self) -> Address {
        self.wallet
    }

    pub fn holding_address(&self) -> Address {
        self.holding
    }

    pub fn bounty_address(&self) -> Address {
        self.inner.lock().bounty.address()
    }

    pub fn bounty_admin(&self) -> Address {
        self.inner.lock().bounty.admin()
    }

    pub fn balance_of(&self, who: Address) -> Balance {
        self.inner.lock().ledger.balance_of(who)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Balance {
        self.inner.lock().ledger.allowance(owner, spender)
    }

    pub fn total_supply(&self) -> Balance {
        self.inner.lock().ledger.total_supply()
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().ledger.is_locked()
    }

    pub fn bounty_allocation(&self, who: Address) -> Balance {
        self.inner.lock().bounty.allocation(who)
    }

    pub fn bounty_claimed(&self, who: Address) -> bool {
        self.inner.lock().bounty.is_claimed(who)
    }

    pub fn bounty_withdrawal_enabled(&self) -> bool {
        self.inner.lock().bounty.withdrawal_enabled()
    }

    pub fn snapshot(&self) -> SaleSnapshot {
        let now = self.backend.now_unix();
        let g = self.inner.lock();
        SaleSnapshot {
            lifecycle: g.sale.lifecycle,
            stage: g.sale.stage(&self.caps, now),
            presale_start: g.sale.presale_start,
            wei_raised: g.sale.wei_raised,
            token_sold: g.sale.token_sold,
            total_supply: g.ledger.total_supply(),
            locked: g.ledger.is_locked(),
            founder_pool: g.sale.founder_pool,
            phases_released: g.sale.vesting.map(|v| v.phases_released()).unwrap_or(0),
        }
    }

    /// Most recent events first.
    pub fn events(&self, limit: usize) -> Vec<CrowdsaleEvent> {
        self.inner.lock().events.iter().rev().take(limit).cloned().collect()
    }
}

// ---------- Tests ----------
