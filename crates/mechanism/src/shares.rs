//! Vault share ledger
//!
//! Balances, allowances and total supply of the shares minted to recipients.
//! Whether a transfer is allowed at all is decided by the engine.

use std::collections::HashMap;

use primitive_types::U256;

use crate::error::{MechanismError, MechanismResult};
use crate::types::Address;

#[derive(Debug, Clone, Default)]
pub struct ShareLedger {
    balances: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address), U256>,
    total_supply: U256,
}

impl ShareLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn total_supply(&self) -> U256 {
        self.total_supply
    }

    pub fn balance_of(&self, owner: &Address) -> U256 {
        self.balances.get(owner).copied().unwrap_or_default()
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
        self.allowances.get(&(*owner, *spender)).copied().unwrap_or_default()
    }

    pub fn mint(&mut self, to: &Address, amount: U256) -> MechanismResult<()> {
        if to.is_zero() {
            return Err(MechanismError::ZeroAddress("share recipient".to_string()));
        }
        let total_supply = self
            .total_supply
            .checked_add(amount)
            .ok_or_else(|| MechanismError::Overflow("share supply".to_string()))?;
        let balance = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| MechanismError::Overflow(format!("share balance of {}", to)))?;

        self.total_supply = total_supply;
        self.balances.insert(*to, balance);
        Ok(())
    }

    pub fn burn(&mut self, from: &Address, amount: U256) -> MechanismResult<()> {
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(MechanismError::InsufficientShares {
                owner: *from,
                balance,
                required: amount,
            });
        }
        let total_supply = self
            .total_supply
            .checked_sub(amount)
            .ok_or_else(|| MechanismError::Underflow("share supply".to_string()))?;

        self.total_supply = total_supply;
        self.balances.insert(*from, balance - amount);
        Ok(())
    }

    pub fn transfer(&mut self, from: &Address, to: &Address, amount: U256) -> MechanismResult<()> {
        if to.is_zero() {
            return Err(MechanismError::ZeroAddress("share recipient".to_string()));
        }
        let balance = self.balance_of(from);
        if balance < amount {
            return Err(MechanismError::InsufficientShares {
                owner: *from,
                balance,
                required: amount,
            });
        }
        if from == to {
            return Ok(());
        }

        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| MechanismError::Overflow(format!("share balance of {}", to)))?;
        self.balances.insert(*from, balance - amount);
        self.balances.insert(*to, credited);
        Ok(())
    }

    pub fn approve(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: U256,
    ) -> MechanismResult<()> {
        if spender.is_zero() {
            return Err(MechanismError::ZeroAddress("share spender".to_string()));
        }
        self.allowances.insert((*owner, *spender), amount);
        Ok(())
    }

    /// Fail unless `spender` may move `amount` of `owner`'s shares
    pub fn check_allowance(
        &self,
        owner: &Address,
        spender: &Address,
        amount: U256,
    ) -> MechanismResult<()> {
        if owner == spender {
            return Ok(());
        }
        let allowance = self.allowance(owner, spender);
        if allowance < amount {
            return Err(MechanismError::InsufficientAllowance {
                spender: *spender,
                allowance,
                required: amount,
            });
        }
        Ok(())
    }

    /// Decrease the allowance after a checked spend; unlimited allowances stay put
    pub fn spend_allowance(
        &mut self,
        owner: &Address,
        spender: &Address,
        amount: U256,
    ) -> MechanismResult<()> {
        self.check_allowance(owner, spender, amount)?;
        if owner == spender {
            return Ok(());
        }
        let allowance = self.allowance(owner, spender);
        if allowance != U256::MAX {
            self.allowances.insert((*owner, *spender), allowance - amount);
        }
        Ok(())
    }
}
