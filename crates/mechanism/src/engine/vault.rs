//! Vault-share accounting
//!
//! Shares are minted to recipients when proposals are queued and redeem
//! pro rata against the assets snapshotted at finalization. Conversions
//! follow the usual tokenized-vault rules: an empty vault converts 1:1,
//! previews of deposit and redeem round down, previews of mint and withdraw
//! round up, and the executed operation uses exactly the previewed amount.

use primitive_types::U256;
use quadfund_tally::{mul_div, mul_div_ceil};
use tracing::info;

use crate::asset::FungibleAsset;
use crate::error::{MechanismError, MechanismResult};
use crate::events::MechanismEvent;
use crate::strategy::VotingStrategy;
use crate::types::Address;

use super::AllocationEngine;

impl<S: VotingStrategy> AllocationEngine<S> {
    /// Assets backing the shares: the finalization snapshot once the tally is
    /// frozen, the strategy's live view before that
    pub fn total_assets(&self) -> MechanismResult<U256> {
        if self.tally_finalized {
            Ok(self.total_assets)
        } else {
            self.strategy.total_assets(&self.ctx)
        }
    }

    pub fn total_supply(&self) -> U256 {
        self.shares.total_supply()
    }

    /// Share balance of `owner`
    pub fn balance_of(&self, owner: &Address) -> U256 {
        self.shares.balance_of(owner)
    }

    pub fn allowance(&self, owner: &Address, spender: &Address) -> U256 {
        self.shares.allowance(owner, spender)
    }

    pub fn convert_to_shares(&self, assets: U256) -> MechanismResult<U256> {
        self.assets_to_shares(assets, false)
    }

    pub fn convert_to_assets(&self, shares: U256) -> MechanismResult<U256> {
        self.shares_to_assets(shares, false)
    }

    pub fn preview_deposit(&self, assets: U256) -> MechanismResult<U256> {
        self.assets_to_shares(assets, false)
    }

    pub fn preview_mint(&self, shares: U256) -> MechanismResult<U256> {
        self.shares_to_assets(shares, true)
    }

    pub fn preview_redeem(&self, shares: U256) -> MechanismResult<U256> {
        self.shares_to_assets(shares, false)
    }

    pub fn preview_withdraw(&self, assets: U256) -> MechanismResult<U256> {
        self.assets_to_shares(assets, true)
    }

    /// Shares `owner` can redeem right now
    pub fn max_redeem(&self, owner: &Address) -> MechanismResult<U256> {
        if self.paused {
            return Ok(U256::zero());
        }
        let balance = self.shares.balance_of(owner);
        let limit = self.strategy.available_withdraw_limit(&self.ctx, owner);
        if limit == U256::MAX {
            return Ok(balance);
        }
        Ok(balance.min(self.assets_to_shares(limit, false)?))
    }

    /// Assets `owner` can withdraw right now
    pub fn max_withdraw(&self, owner: &Address) -> MechanismResult<U256> {
        if self.paused {
            return Ok(U256::zero());
        }
        let assets = self.shares_to_assets(self.shares.balance_of(owner), false)?;
        let limit = self.strategy.available_withdraw_limit(&self.ctx, owner);
        Ok(assets.min(limit))
    }

    /// Burn `shares` of `owner` and send the assets to `receiver`.
    /// Returns the assets paid out.
    pub fn redeem(
        &mut self,
        caller: Address,
        shares: U256,
        receiver: Address,
        owner: Address,
    ) -> MechanismResult<U256> {
        let _entered = self.guard.enter()?;
        self.require_not_paused()?;

        if shares.is_zero() {
            return Err(MechanismError::ZeroAmount);
        }
        let max = self.max_redeem(&owner)?;
        if shares > max {
            return Err(MechanismError::ExceedsRedeemLimit { requested: shares, max });
        }
        let assets = self.preview_redeem(shares)?;
        if assets.is_zero() {
            return Err(MechanismError::InvalidInput(format!(
                "{} shares redeem for zero assets",
                shares
            )));
        }

        self.execute_withdraw(caller, receiver, owner, assets, shares)?;
        Ok(assets)
    }

    /// Send exactly `assets` to `receiver`, burning the shares of `owner`
    /// that cover them. Returns the shares burned.
    pub fn withdraw(
        &mut self,
        caller: Address,
        assets: U256,
        receiver: Address,
        owner: Address,
    ) -> MechanismResult<U256> {
        let _entered = self.guard.enter()?;
        self.require_not_paused()?;

        if assets.is_zero() {
            return Err(MechanismError::ZeroAmount);
        }
        let max = self.max_withdraw(&owner)?;
        if assets > max {
            return Err(MechanismError::ExceedsRedeemLimit { requested: assets, max });
        }
        let shares = self.preview_withdraw(assets)?;

        self.execute_withdraw(caller, receiver, owner, assets, shares)?;
        Ok(shares)
    }

    /// `owner` allows `spender` to move up to `amount` shares
    pub fn approve(
        &mut self,
        owner: Address,
        spender: Address,
        amount: U256,
    ) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_not_paused()?;
        self.shares.approve(&owner, &spender, amount)
    }

    pub fn transfer(&mut self, caller: Address, to: Address, amount: U256) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_transfers_unlocked()?;

        self.shares.transfer(&caller, &to, amount)?;
        self.emit(MechanismEvent::SharesTransferred { from: caller, to, amount });
        Ok(())
    }

    pub fn transfer_from(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        amount: U256,
    ) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_transfers_unlocked()?;

        self.shares.check_allowance(&from, &caller, amount)?;
        self.shares.transfer(&from, &to, amount)?;
        self.shares.spend_allowance(&from, &caller, amount)?;
        self.emit(MechanismEvent::SharesTransferred { from, to, amount });
        Ok(())
    }

    /// Recover the whole balance of `token` once redemption is over. Owner only.
    /// Returns the amount swept.
    pub fn sweep(
        &mut self,
        caller: Address,
        token: &dyn FungibleAsset,
        receiver: Address,
    ) -> MechanismResult<U256> {
        let _entered = self.guard.enter()?;
        self.require_not_paused()?;
        self.require_owner(&caller, "sweep")?;

        if receiver.is_zero() {
            return Err(MechanismError::ZeroAddress("sweep receiver".to_string()));
        }
        if !self.tally_finalized {
            return Err(MechanismError::TallyNotFinalized);
        }
        if !self.ctx.is_redemption_expired() {
            return Err(MechanismError::InvalidState(
                "redemption window has not closed".to_string(),
            ));
        }

        let mechanism = self.ctx.address();
        let amount = token.balance_of(&mechanism);
        if amount.is_zero() {
            return Err(MechanismError::InvalidState(format!("no {} to sweep", token.symbol())));
        }
        token.transfer(&mechanism, &receiver, amount)?;

        if token.address() == self.ctx.asset().address() {
            self.total_assets = U256::zero();
        }
        self.emit(MechanismEvent::Swept {
            token: token.address(),
            receiver,
            amount,
        });

        info!("Swept {} {} to {}", amount, token.symbol(), receiver);
        Ok(amount)
    }

    fn execute_withdraw(
        &mut self,
        caller: Address,
        receiver: Address,
        owner: Address,
        assets: U256,
        shares: U256,
    ) -> MechanismResult<()> {
        if receiver.is_zero() {
            return Err(MechanismError::ZeroAddress("receiver".to_string()));
        }
        self.shares.check_allowance(&owner, &caller, shares)?;
        let balance = self.shares.balance_of(&owner);
        if balance < shares {
            return Err(MechanismError::InsufficientShares {
                owner,
                balance,
                required: shares,
            });
        }
        let total_assets = self
            .total_assets
            .checked_sub(assets)
            .ok_or_else(|| {
                MechanismError::Underflow(format!(
                    "withdrawing {} from {}",
                    assets,
                    self.total_assets
                ))
            })?;

        let mechanism = self.ctx.address();
        self.ctx.asset().transfer(&mechanism, &receiver, assets)?;

        self.shares.spend_allowance(&owner, &caller, shares)?;
        self.shares.burn(&owner, shares)?;
        self.total_assets = total_assets;
        self.emit(MechanismEvent::Redeemed {
            caller,
            receiver,
            owner,
            assets,
            shares,
        });

        info!(
            "{} redeemed {} shares of {} for {} assets to {}",
            caller,
            shares,
            owner,
            assets,
            receiver
        );
        Ok(())
    }

    fn require_transfers_unlocked(&self) -> MechanismResult<()> {
        self.require_not_paused()?;
        let open = self
            .ctx
            .global_redemption_start()
            .map_or(false, |start| self.ctx.now() >= start);
        if !open {
            return Err(MechanismError::TransfersLocked);
        }
        Ok(())
    }

    fn assets_to_shares(&self, assets: U256, round_up: bool) -> MechanismResult<U256> {
        let supply = self.shares.total_supply();
        let total_assets = self.total_assets()?;
        if supply.is_zero() || total_assets.is_zero() {
            return Ok(assets);
        }
        let shares = if round_up {
            mul_div_ceil(assets, supply, total_assets)?
        } else {
            mul_div(assets, supply, total_assets)?
        };
        Ok(shares)
    }

    fn shares_to_assets(&self, shares: U256, round_up: bool) -> MechanismResult<U256> {
        let supply = self.shares.total_supply();
        if supply.is_zero() {
            return Ok(shares);
        }
        let total_assets = self.total_assets()?;
        let assets = if round_up {
            mul_div_ceil(shares, total_assets, supply)?
        } else {
            mul_div(shares, total_assets, supply)?
        };
        Ok(assets)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use quadfund_tally::Alpha;

    use crate::asset::InMemoryAsset;
    use crate::clock::ManualClock;
    use crate::config::MechanismConfig;
    use crate::engine::AllocationEngine;
    use crate::error::MechanismError;
    use crate::strategy::QuadraticVotingStrategy;
    use crate::types::{Address, VoteChoice};
    use crate::asset::FungibleAsset;
    use primitive_types::U256;

    fn addr(value: u64) -> Address {
        Address::from_low_u64(value)
    }

    /// One proposal with 3600 shares backed by 1800 assets, at redemption start
    fn redeemable(
        ) -> (AllocationEngine<QuadraticVotingStrategy>, Arc<InMemoryAsset>, Arc<ManualClock>,
    ) {
        let asset = Arc::new(InMemoryAsset::new(addr(0xa55e7), "TKN", 18));
        let clock = Arc::new(ManualClock::new(0));
        let mut config = MechanismConfig::new(asset.address(), addr(1));
        config.keeper = Some(addr(2));
        config.start_time = Some(0);
        config.voting_delay = 0;
        config.voting_period = 100;
        config.timelock_delay = 10;
        config.grace_period = 50;

        let strategy = QuadraticVotingStrategy::new(U256::zero(), Alpha::one());
        let mut engine =
            AllocationEngine::new(config, addr(0xfeed), asset.clone(), clock.clone(), strategy)
                .unwrap();

        let pid = engine.propose(addr(2), addr(20), "Shared tooling").unwrap();
        for (voter, weight) in [(10u64, 10u64), (11, 20), (12, 30)] {
            let deposit = U256::from(weight * weight);
            asset.mint(&addr(voter), deposit).unwrap();
            asset.approve(&addr(voter), &addr(0xfeed), deposit).unwrap();
            engine.signup(addr(voter), deposit).unwrap();
            engine.cast_vote(addr(voter), pid, VoteChoice::For, U256::from(weight)).unwrap();
        }
        // 1400 deposits + 400 matching
        asset.mint(&addr(0xfeed), U256::from(400u64)).unwrap();

        clock.set(100);
        engine.finalize_vote_tally(addr(1)).unwrap();
        engine.queue_proposal(pid).unwrap();
        clock.set(110);
        (engine, asset, clock)
    }

    #[test]
    fn test_conversions_are_pro_rata() {
        let (engine, _asset, _clock) = redeemable();
        assert_eq!(engine.total_supply(), U256::from(3600u64));
        assert_eq!(engine.total_assets().unwrap(), U256::from(1800u64));

        assert_eq!(engine.convert_to_assets(U256::from(3u64)).unwrap(), U256::one());
        assert_eq!(engine.preview_redeem(U256::from(3u64)).unwrap(), U256::one());
        assert_eq!(engine.preview_mint(U256::from(3u64)).unwrap(), U256::from(2u64));
        assert_eq!(engine.preview_deposit(U256::from(5u64)).unwrap(), U256::from(10u64));
        assert_eq!(engine.preview_withdraw(U256::from(5u64)).unwrap(), U256::from(10u64));
    }

    #[test]
    fn test_redeem_matches_preview() {
        let (mut engine, asset, _clock) = redeemable();
        let recipient = addr(20);

        let preview = engine.preview_redeem(U256::from(1001u64)).unwrap();
        let assets = engine.redeem(recipient, U256::from(1001u64), recipient, recipient).unwrap();
        assert_eq!(assets, preview);
        assert_eq!(assets, U256::from(500u64));
        assert_eq!(asset.balance_of(&recipient), U256::from(500u64));
        assert_eq!(engine.balance_of(&recipient), U256::from(2599u64));
    }

    #[test]
    fn test_withdraw_burns_rounded_up_shares() {
        let (mut engine, _asset, _clock) = redeemable();
        let recipient = addr(20);

        let preview = engine.preview_withdraw(U256::from(7u64)).unwrap();
        let burned = engine.withdraw(recipient, U256::from(7u64), recipient, recipient).unwrap();
        assert_eq!(burned, preview);
        assert_eq!(burned, U256::from(14u64));
    }

    #[test]
    fn test_redeem_by_third_party_needs_allowance() {
        let (mut engine, _asset, _clock) = redeemable();
        let recipient = addr(20);
        let operator = addr(30);

        let denied = engine.redeem(operator, U256::from(10u64), operator, recipient);
        assert!(matches!(denied, Err(MechanismError::InsufficientAllowance { .. })));

        engine.approve(recipient, operator, U256::from(10u64)).unwrap();
        engine.redeem(operator, U256::from(10u64), operator, recipient).unwrap();
        assert_eq!(engine.allowance(&recipient, &operator), U256::zero());
    }

    #[test]
    fn test_limits_close_after_grace_period() {
        let (engine, _asset, clock) = redeemable();
        let recipient = addr(20);
        assert_eq!(engine.max_redeem(&recipient).unwrap(), U256::from(3600u64));

        clock.set(160);
        assert_eq!(engine.max_redeem(&recipient).unwrap(), U256::from(3600u64));

        clock.set(161);
        assert_eq!(engine.max_redeem(&recipient).unwrap(), U256::zero());
        assert_eq!(engine.max_withdraw(&recipient).unwrap(), U256::zero());
    }
}
