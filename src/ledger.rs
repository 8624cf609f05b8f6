//! Fungible token ledger owned by the crowdsale engine.
//!
//! - Balances, allowances and total supply
//! - Mint restricted to the privileged holder (the engine)
//! - Lockup: while set, only the privileged holder may transfer
//! - Burn with a free-form note (e.g. a destination address on another chain)
//! - Change journal with checkpoint/rollback/commit so a failed command leaves
//!   no trace, events included

use std::collections::HashMap;

use thiserror::Error;

use crate::{Address, Balance};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("caller is not the privileged holder")]
    NotPrivileged,
    #[error("transfers are locked")]
    Locked,
    #[error("zero address")]
    ZeroAddress,
    #[error("amount must be > 0")]
    ZeroAmount,
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("insufficient allowance")]
    InsufficientAllowance,
    #[error("balance overflow")]
    Overflow,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerEvent {
    Transfer { from: Address, to: Address, amount: Balance },
    Mint { to: Address, amount: Balance },
    Burn { burner: Address, amount: Balance, note: String },
    Approval { owner: Address, spender: Address, amount: Balance },
    LockupChanged { locked: bool },
}

/// Previous value of a mutated slot, replayed in reverse on rollback.
#[derive(Clone, Debug)]
enum JournalRecord {
    Balance { addr: Address, prev: Option<Balance> },
    Allowance { owner: Address, spender: Address, prev: Option<Balance> },
    TotalSupply(Balance),
    Lockup(bool),
}

#[derive(Clone, Copy, Debug)]
struct Checkpoint {
    journal_len: usize,
    events_len: usize,
}

#[derive(Debug)]
pub struct Ledger {
    privileged: Address,
    balances: HashMap<Address, Balance>,
    allowances: HashMap<(Address, Address), Balance>,
    total_supply: Balance,
    locked: bool,
    journal: Vec<JournalRecord>,
    checkpoints: Vec<Checkpoint>,
    events: Vec<LedgerEvent>,
}

impl Ledger {
    /// New empty ledger, locked, with `privileged` as the only minter.
    pub fn new(privileged: Address) -> Self {
        Self {
            privileged,
            balances: HashMap::new(),
            allowances: HashMap::new(),
            total_supply: 0,
            locked: true,
            journal: Vec::new(),
            checkpoints: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn privileged(&self) -> Address {
        self.privileged
    }

    pub fn balance_of(&self, who: Address) -> Balance {
        self.balances.get(&who).copied().unwrap_or(0)
    }

    pub fn allowance(&self, owner: Address, spender: Address) -> Balance {
        self.allowances.get(&(owner, spender)).copied().unwrap_or(0)
    }

    pub fn total_supply(&self) -> Balance {
        self.total_supply
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    // ---------- Journal ----------

    /// Start a batch of changes that can be undone as a whole.
    pub fn checkpoint(&mut self) {
        self.checkpoints.push(Checkpoint {
            journal_len: self.journal.len(),
            events_len: self.events.len(),
        });
    }

    /// Undo every change since the last checkpoint.
    pub fn rollback(&mut self) {
        let Some(cp) = self.checkpoints.pop() else {
            return;
        };
        let undo: Vec<JournalRecord> = self.journal.drain(cp.journal_len..).rev().collect();
        for rec in undo {
            match rec {
                JournalRecord::Balance { addr, prev } => match prev {
                    Some(v) => {
                        self.balances.insert(addr, v);
                    }
                    None => {
                        self.balances.remove(&addr);
                    }
                },
                JournalRecord::Allowance { owner, spender, prev } => match prev {
                    Some(v) => {
                        self.allowances.insert((owner, spender), v);
                    }
                    None => {
                        self.allowances.remove(&(owner, spender));
                    }
                },
                JournalRecord::TotalSupply(v) => self.total_supply = v,
                JournalRecord::Lockup(v) => self.locked = v,
            }
        }
        self.events.truncate(cp.events_len);
    }

    /// Keep the changes since the last checkpoint.
    pub fn commit(&mut self) {
        let _ = self.checkpoints.pop();
        if self.checkpoints.is_empty() {
            self.journal.clear();
        }
    }

    /// Drain events emitted so far.
    pub fn take_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }

    fn journaling(&self) -> bool {
        !self.checkpoints.is_empty()
    }

    fn put_balance(&mut self, addr: Address, value: Balance) {
        if self.journaling() {
            let prev = self.balances.get(&addr).copied();
            self.journal.push(JournalRecord::Balance { addr, prev });
        }
        self.balances.insert(addr, value);
    }

    fn put_allowance(&mut self, owner: Address, spender: Address, value: Balance) {
        if self.journaling() {
            let prev = self.allowances.get(&(owner, spender)).copied();
            self.journal.push(JournalRecord::Allowance { owner, spender, prev });
        }
        self.allowances.insert((owner, spender), value);
    }

    fn put_total_supply(&mut self, value: Balance) {
        if self.journaling() {
            self.journal.push(JournalRecord::TotalSupply(self.total_supply));
        }
        self.total_supply = value;
    }

    // ---------- Operations ----------

    pub fn mint(
        &mut self,
        caller: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), LedgerError> {
        if caller != self.privileged {
            return Err(LedgerError::NotPrivileged);
        }
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let supply = self.total_supply.checked_add(amount).ok_or(LedgerError::Overflow)?;
        let bal = self.balance_of(to).checked_add(amount).ok_or(LedgerError::Overflow)?;
        self.put_total_supply(supply);
        self.put_balance(to, bal);
        self.events.push(LedgerEvent::Mint { to, amount });
        Ok(())
    }

    /// Holder destroys own tokens; `note` is recorded in the event.
    pub fn burn(
        &mut self,
        holder: Address,
        amount: Balance,
        note: impl Into<String>,
    ) -> Result<(), LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let bal = self.balance_of(holder);
        if bal < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        let supply = self.total_supply.checked_sub(amount).ok_or(LedgerError::Overflow)?;
        self.put_balance(holder, bal - amount);
        self.put_total_supply(supply);
        self.events.push(LedgerEvent::Burn { burner: holder, amount, note: note.into() });
        Ok(())
    }

    pub fn transfer(
        &mut self,
        caller: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), LedgerError> {
        if self.locked && caller != self.privileged {
            return Err(LedgerError::Locked);
        }
        self.move_balance(caller, to, amount)
    }

    pub fn approve(
        &mut self,
        owner: Address,
        spender: Address,
        amount: Balance,
    ) -> Result<(), LedgerError> {
        if spender.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        self.put_allowance(owner, spender, amount);
        self.events.push(LedgerEvent::Approval { owner, spender, amount });
        Ok(())
    }

    /// Spend an allowance. Rejected while locked, for everyone.
    pub fn transfer_from(
        &mut self,
        spender: Address,
        from: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), LedgerError> {
        if self.locked {
            return Err(LedgerError::Locked);
        }
        let allowed = self.allowance(from, spender);
        if allowed < amount {
            return Err(LedgerError::InsufficientAllowance);
        }
        self.move_balance(from, to, amount)?;
        self.put_allowance(from, spender, allowed - amount);
        Ok(())
    }

    pub fn set_lockup(&mut self, caller: Address, locked: bool) -> Result<(), LedgerError> {
        if caller != self.privileged {
            return Err(LedgerError::NotPrivileged);
        }
        if self.locked == locked {
            return Ok(());
        }
        if self.journaling() {
            self.journal.push(JournalRecord::Lockup(self.locked));
        }
        self.locked = locked;
        self.events.push(LedgerEvent::LockupChanged { locked });
        Ok(())
    }

    fn move_balance(
        &mut self,
        from: Address,
        to: Address,
        amount: Balance,
    ) -> Result<(), LedgerError> {
        if to.is_zero() {
            return Err(LedgerError::ZeroAddress);
        }
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let from_bal = self.balance_of(from);
        if from_bal < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        if from != to {
            let to_bal = self.balance_of(to).checked_add(amount).ok_or(LedgerError::Overflow)?;
            self.put_balance(from, from_bal - amount);
            self.put_balance(to, to_bal);
        }
        self.events.push(LedgerEvent::Transfer { from, to, amount });
        Ok(())
    }
}
