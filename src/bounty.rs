//! Bounty registry: admin-set allocations claimed once each after the admin
//! enables withdrawals. Tokens are paid from the registry's own ledger
//! balance, so claims are also subject to the ledger lockup.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::{
    ledger::{Ledger, LedgerError},
    Address, Balance,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BountyError {
    #[error("caller is not the bounty admin")]
    NotAdmin,
    #[error("addresses and amounts differ in length ({0} vs {1})")]
    LengthMismatch(usize, usize),
    #[error("zero address")]
    ZeroAddress,
    #[error("withdrawal not enabled")]
    NotEnabled,
    #[error("withdrawal already enabled")]
    AlreadyEnabled,
    #[error("no bounty allocated")]
    NothingAllocated,
    #[error("bounty already claimed")]
    AlreadyClaimed,
    #[error("registry does not accept value")]
    ValueRejected,
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BountyEvent {
    AllocationSet { beneficiary: Address, amount: Balance },
    WithdrawalEnabled,
    Withdrawn { beneficiary: Address, amount: Balance },
}

#[derive(Clone, Debug)]
enum JournalRecord {
    Allocation { addr: Address, prev: Option<Balance> },
    Claimed(Address),
    Enabled,
}

#[derive(Clone, Copy, Debug)]
struct Checkpoint {
    journal_len: usize,
    events_len: usize,
}

#[derive(Debug)]
pub struct BountyRegistry {
    admin: Address,
    address: Address,
    allocations: HashMap<Address, Balance>,
    claimed: HashSet<Address>,
    enabled: bool,
    journal: Vec<JournalRecord>,
    checkpoints: Vec<Checkpoint>,
    events: Vec<BountyEvent>,
}

impl BountyRegistry {
    /// `address` is the ledger account holding the bounty supply.
    pub fn new(admin: Address, address: Address) -> Self {
        Self {
            admin,
            address,
            allocations: HashMap::new(),
            claimed: HashSet::new(),
            enabled: false,
            journal: Vec::new(),
            checkpoints: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn admin(&self) -> Address {
        self.admin
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn allocation(&self, who: Address) -> Balance {
        self.allocations.get(&who).copied().unwrap_or(0)
    }

    pub fn is_claimed(&self, who: Address) -> bool {
        self.claimed.contains(&who)
    }

    pub fn withdrawal_enabled(&self) -> bool {
        self.enabled
    }

    // ---------- Journal ----------

    pub fn checkpoint(&mut self) {
        self.checkpoints.push(Checkpoint {
            journal_len: self.journal.len(),
            events_len: self.events.len(),
        });
    }

    pub fn rollback(&mut self) {
        let Some(cp) = self.checkpoints.pop() else {
            return;
        };
        let undo: Vec<JournalRecord> = self.journal.drain(cp.journal_len..).rev().collect();
        for rec in undo {
            match rec {
                JournalRecord::Allocation { addr, prev: Some(v) } => {
                    self.allocations.insert(addr, v);
                }
                JournalRecord::Allocation { addr, prev: None } => {
                    self.allocations.remove(&addr);
                }
                JournalRecord::Claimed(addr) => {
                    self.claimed.remove(&addr);
                }
                JournalRecord::Enabled => self.enabled = false,
            }
        }
        self.events.truncate(cp.events_len);
    }

    pub fn commit(&mut self) {
        let _ = self.checkpoints.pop();
        if self.checkpoints.is_empty() {
            self.journal.clear();
        }
    }

    pub fn take_events(&mut self) -> Vec<BountyEvent> {
        std::mem::take(&mut self.events)
    }

    // ---------- Operations ----------

    /// Overwrite allocations per address. All-or-nothing: inputs are checked
    /// before anything is written.
    pub fn set_allocations(
        &mut self,
        caller: Address,
        addrs: &[Address],
        amounts: &[Balance],
    ) -> Result<(), BountyError> {
        if caller != self.admin {
            return Err(BountyError::NotAdmin);
        }
        if addrs.len() != amounts.len() {
            return Err(BountyError::LengthMismatch(addrs.len(), amounts.len()));
        }
        if addrs.iter().any(Address::is_zero) {
            return Err(BountyError::ZeroAddress);
        }
        let journaling = !self.checkpoints.is_empty();
        for (addr, amount) in addrs.iter().zip(amounts) {
            let prev = self.allocations.insert(*addr, *amount);
            if journaling {
                self.journal.push(JournalRecord::Allocation { addr: *addr, prev });
            }
            self.events.push(BountyEvent::AllocationSet { beneficiary: *addr, amount: *amount });
        }
        Ok(())
    }

    pub fn enable_withdrawal(&mut self, caller: Address) -> Result<(), BountyError> {
        if caller != self.admin {
            return Err(BountyError::NotAdmin);
        }
        if self.enabled {
            return Err(BountyError::AlreadyEnabled);
        }
        self.enabled = true;
        if !self.checkpoints.is_empty() {
            self.journal.push(JournalRecord::Enabled);
        }
        self.events.push(BountyEvent::WithdrawalEnabled);
        Ok(())
    }

    /// Claim the caller's allocation once. Returns the amount paid.
    pub fn withdraw(
        &mut self,
        caller: Address,
        ledger: &mut Ledger,
    ) -> Result<Balance, BountyError> {
        if !self.enabled {
            return Err(BountyError::NotEnabled);
        }
        if self.claimed.contains(&caller) {
            return Err(BountyError::AlreadyClaimed);
        }
        let amount = self.allocation(caller);
        if amount == 0 {
            return Err(BountyError::NothingAllocated);
        }
        ledger.transfer(self.address, caller, amount)?;
        self.claimed.insert(caller);
        if !self.checkpoints.is_empty() {
            self.journal.push(JournalRecord::Claimed(caller));
        }
        self.events.push(BountyEvent::Withdrawn { beneficiary: caller, amount });
        Ok(amount)
    }

    /// Inbound value: a zero-value call claims, anything else is refused.
    pub fn receive(
        &mut self,
        caller: Address,
        value: Balance,
        ledger: &mut Ledger,
    ) -> Result<Balance, BountyError> {
        if value != 0 {
            return Err(BountyError::ValueRejected);
        }
        self.withdraw(caller, ledger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(x: u8) -> Address {
        let mut a = [0u8; 20];
        a[0] = x;
        Address(a)
    }

    const ENGINE: u8 = 0xEE;
    const REGISTRY: u8 = 0xB0;
    const ADMIN: u8 = 0xAD;

    fn setup(supply: Balance) -> (BountyRegistry, Ledger) {
        let mut ledger = Ledger::new(addr(ENGINE));
        ledger.mint(addr(ENGINE), addr(REGISTRY), supply).unwrap();
        ledger.set_lockup(addr(ENGINE), false).unwrap();
        (BountyRegistry::new(addr(ADMIN), addr(REGISTRY)), ledger)
    }

    #[test]
    fn admin_sets_and_overwrites_allocations() {
        let (mut reg, _) = setup(1_000);
        reg.set_allocations(addr(ADMIN), &[addr(1), addr(2)], &[10, 20]).unwrap();
        reg.set_allocations(addr(ADMIN), &[addr(1)], &[15]).unwrap();
        assert_eq!(reg.allocation(addr(1)), 15);
        assert_eq!(reg.allocation(addr(2)), 20);

        assert_eq!(
            reg.set_allocations(addr(1), &[addr(1)], &[1]),
            Err(BountyError::NotAdmin)
        );
        assert_eq!(
            reg.set_allocations(addr(ADMIN), &[addr(1), addr(2)], &[1]),
            Err(BountyError::LengthMismatch(2, 1))
        );
        assert_eq!(
            reg.set_allocations(addr(ADMIN), &[addr(3), Address::ZERO], &[1, 1]),
            Err(BountyError::ZeroAddress)
        );
        // rejected batch wrote nothing
        assert_eq!(reg.allocation(addr(3)), 0);
    }

    #[test]
    fn withdraw_requires_enable_and_pays_once() {
        let (mut reg, mut ledger) = setup(1_000);
        reg.set_allocations(addr(ADMIN), &[addr(1)], &[100]).unwrap();

        assert_eq!(reg.withdraw(addr(1), &mut ledger), Err(BountyError::NotEnabled));
        assert_eq!(reg.enable_withdrawal(addr(1)), Err(BountyError::NotAdmin));
        reg.enable_withdrawal(addr(ADMIN)).unwrap();
        assert_eq!(reg.enable_withdrawal(addr(ADMIN)), Err(BountyError::AlreadyEnabled));

        assert_eq!(reg.withdraw(addr(1), &mut ledger), Ok(100));
        assert_eq!(ledger.balance_of(addr(1)), 100);
        assert_eq!(ledger.balance_of(addr(REGISTRY)), 900);
        assert!(reg.is_claimed(addr(1)));
        assert_eq!(reg.withdraw(addr(1), &mut ledger), Err(BountyError::AlreadyClaimed));

        assert_eq!(reg.withdraw(addr(2), &mut ledger), Err(BountyError::NothingAllocated));
    }

    #[test]
    fn zero_value_receive_claims_and_value_is_refused() {
        let (mut reg, mut ledger) = setup(1_000);
        reg.set_allocations(addr(ADMIN), &[addr(1)], &[40]).unwrap();
        reg.enable_withdrawal(addr(ADMIN)).unwrap();

        assert_eq!(reg.receive(addr(1), 5, &mut ledger), Err(BountyError::ValueRejected));
        assert_eq!(reg.receive(addr(1), 0, &mut ledger), Ok(40));
        assert_eq!(ledger.balance_of(addr(1)), 40);
    }

    #[test]
    fn claim_is_blocked_by_ledger_lockup() {
        let (mut reg, mut ledger) = setup(1_000);
        ledger.set_lockup(addr(ENGINE), true).unwrap();
        reg.set_allocations(addr(ADMIN), &[addr(1)], &[40]).unwrap();
        reg.enable_withdrawal(addr(ADMIN)).unwrap();
        assert_eq!(
            reg.withdraw(addr(1), &mut ledger),
            Err(BountyError::Ledger(LedgerError::Locked))
        );
        assert!(!reg.is_claimed(addr(1)));
    }

    #[test]
    fn rollback_restores_allocations_claims_and_latch() {
        let (mut reg, mut ledger) = setup(1_000);
        reg.set_allocations(addr(ADMIN), &[addr(1)], &[40]).unwrap();
        reg.take_events();

        reg.checkpoint();
        reg.set_allocations(addr(ADMIN), &[addr(1), addr(2)], &[50, 60]).unwrap();
        reg.enable_withdrawal(addr(ADMIN)).unwrap();
        reg.withdraw(addr(2), &mut ledger).unwrap();
        reg.rollback();

        assert_eq!(reg.allocation(addr(1)), 40);
        assert_eq!(reg.allocation(addr(2)), 0);
        assert!(!reg.withdrawal_enabled());
        assert!(!reg.is_claimed(addr(2)));
        assert!(reg.take_events().is_empty());
    }
}
