//! Fungible asset collaborator
//!
//! The mechanism never moves value itself; it asks an asset to transfer on
//! its behalf. Any failure from the asset aborts the calling operation.

use dashmap::DashMap;
use primitive_types::U256;
use tracing::debug;

use crate::error::AssetError;
use crate::types::Address;

/// Standard fungible token semantics with an explicit acting account
pub trait FungibleAsset: Send + Sync {
    /// Address identifying the asset itself
    fn address(&self) -> Address;

    fn symbol(&self) -> &str;

    /// Number of decimals of the native unit
    fn decimals(&self) -> u8;

    fn balance_of(&self, account: &Address) -> U256;

    fn allowance(&self, owner: &Address, spender: &Address) -> U256;

    /// `owner` allows `spender` to move up to `amount`
    fn approve(&self, owner: &Address, spender: &Address, amount: U256) -> Result<(), AssetError>;

    /// Move `amount` from `from` to `to`, acting as `from`
    fn transfer(&self, from: &Address, to: &Address, amount: U256) -> Result<(), AssetError>;

    /// Move `amount` from `from` to `to`, acting as `spender` under an allowance
    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), AssetError>;
}

/// In-memory token used for simulations and tests
#[derive(Debug)]
pub struct InMemoryAsset {
    address: Address,
    symbol: String,
    decimals: u8,
    balances: DashMap<Address, U256>,
    allowances: DashMap<(Address, Address), U256>,
}

impl InMemoryAsset {
    /// Create a new asset with no balances
    pub fn new(address: Address, symbol: impl Into<String>, decimals: u8) -> Self {
        Self {
            address,
            symbol: symbol.into(),
            decimals,
            balances: DashMap::new(),
            allowances: DashMap::new(),
        }
    }

    /// Credit `amount` to `to` out of thin air
    pub fn mint(&self, to: &Address, amount: U256) -> Result<(), AssetError> {
        if to.is_zero() {
            return Err(AssetError::ZeroAddress);
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or_else(|| AssetError::Overflow(format!("minting {} to {}", amount, to)))?;
        self.balances.insert(*to, credited);
        Ok(())
    }

    fn move_balance(&self, from: &Address, to: &Address, amount: U256) -> Result<(), AssetError> {
        if from.is_zero() || to.is_zero() {
            return Err(AssetError::ZeroAddress);
        }

        let balance = self.balance_of(from);
        if balance < amount {
            return Err(AssetError::InsufficientBalance {
                account: *from,
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
            .ok_or_else(|| AssetError::Overflow(format!("crediting {} to {}", amount, to)))?;
        self.balances.insert(*from, balance - amount);
        self.balances.insert(*to, credited);

        debug!("{} transfer {} from {} to {}", self.symbol, amount, from, to);
        Ok(())
    }
}

impl FungibleAsset for InMemoryAsset {
    fn address(&self) -> Address {
        self.address
    }

    fn symbol(&self) -> &str {
        &self.symbol
    }

    fn decimals(&self) -> u8 {
        self.decimals
    }

    fn balance_of(&self, account: &Address) -> U256 {
        self.balances.get(account).map(|b| *b).unwrap_or_default()
    }

    fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
        self.allowances
            .get(&(*owner, *spender))
            .map(|a| *a)
            .unwrap_or_default()
    }

    fn approve(&self, owner: &Address, spender: &Address, amount: U256) -> Result<(), AssetError> {
        if owner.is_zero() || spender.is_zero() {
            return Err(AssetError::ZeroAddress);
        }
        self.allowances.insert((*owner, *spender), amount);
        Ok(())
    }

    fn transfer(&self, from: &Address, to: &Address, amount: U256) -> Result<(), AssetError> {
        self.move_balance(from, to, amount)
    }

    fn transfer_from(
        &self,
        spender: &Address,
        from: &Address,
        to: &Address,
        amount: U256,
    ) -> Result<(), AssetError> {
        let allowance = self.allowance(from, spender);
        if allowance < amount {
            return Err(AssetError::InsufficientAllowance {
                owner: *from,
                spender: *spender,
                allowance,
                required: amount,
            });
        }

        self.move_balance(from, to, amount)?;

        if allowance != U256::MAX {
            self.allowances.insert((*from, *spender), allowance - amount);
        }
        Ok(())
    }
}
