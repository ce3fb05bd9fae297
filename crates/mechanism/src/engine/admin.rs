//! Pausing, ownership, role rotation and alpha management

use primitive_types::U256;
use quadfund_tally::Alpha;
use tracing::{info, warn};

use crate::error::{MechanismError, MechanismResult};
use crate::events::MechanismEvent;
use crate::strategy::{AlphaControl, VotingStrategy};
use crate::types::Address;

use super::AllocationEngine;

impl<S: VotingStrategy> AllocationEngine<S> {
    /// Block user flows. Owner or emergency admin.
    pub fn pause(&mut self, caller: Address) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        let roles = self.ctx.roles();
        if caller != roles.owner && caller != roles.emergency_admin {
            warn!("{} tried to pause without the owner or emergency admin role", caller);
            return Err(MechanismError::Unauthorized(
                "only the owner or emergency admin may pause".to_string(),
            ));
        }
        if self.paused {
            return Err(MechanismError::InvalidState("already paused".to_string()));
        }

        self.paused = true;
        self.emit(MechanismEvent::Paused { by: caller });
        info!("Mechanism {} paused by {}", self.ctx.address(), caller);
        Ok(())
    }

    pub fn unpause(&mut self, caller: Address) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_owner(&caller, "unpause")?;
        if !self.paused {
            return Err(MechanismError::InvalidState("not paused".to_string()));
        }

        self.paused = false;
        self.emit(MechanismEvent::Unpaused { by: caller });
        info!("Mechanism {} unpaused by {}", self.ctx.address(), caller);
        Ok(())
    }

    /// Start a two-step ownership transfer; `new_owner` must accept
    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_owner(&caller, "transfer ownership")?;
        if new_owner.is_zero() {
            return Err(MechanismError::ZeroAddress("new owner".to_string()));
        }

        self.ctx.roles_mut().pending_owner = Some(new_owner);
        self.emit(MechanismEvent::OwnershipTransferStarted {
            previous_owner: caller,
            new_owner,
        });
        info!("Ownership transfer from {} to {} started", caller, new_owner);
        Ok(())
    }

    pub fn accept_ownership(&mut self, caller: Address) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        if self.ctx.roles().pending_owner != Some(caller) {
            return Err(MechanismError::Unauthorized(format!(
                "{} is not the pending owner",
                caller
            )));
        }

        let roles = self.ctx.roles_mut();
        let previous_owner = std::mem::replace(&mut roles.owner, caller);
        roles.pending_owner = None;
        self.emit(MechanismEvent::OwnershipTransferred {
            previous_owner,
            new_owner: caller,
        });
        info!("Ownership transferred from {} to {}", previous_owner, caller);
        Ok(())
    }

    pub fn cancel_ownership_transfer(&mut self, caller: Address) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_owner(&caller, "cancel an ownership transfer")?;
        let pending_owner = self
            .ctx
            .roles_mut()
            .pending_owner
            .take()
            .ok_or_else(|| {
                MechanismError::InvalidState("no ownership transfer pending".to_string())
            })?;

        self.emit(MechanismEvent::OwnershipTransferCanceled {
            owner: caller,
            pending_owner,
        });
        info!("Ownership transfer to {} canceled", pending_owner);
        Ok(())
    }

    pub fn set_management(&mut self, caller: Address, management: Address) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_owner_or_management(&caller, "management")?;
        if management.is_zero() {
            return Err(MechanismError::ZeroAddress("management".to_string()));
        }

        self.ctx.roles_mut().management = management;
        self.emit(MechanismEvent::ManagementUpdated { management });
        info!("Management set to {}", management);
        Ok(())
    }

    pub fn set_keeper(&mut self, caller: Address, keeper: Address) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_owner_or_management(&caller, "keeper")?;
        if keeper.is_zero() {
            return Err(MechanismError::ZeroAddress("keeper".to_string()));
        }

        self.ctx.roles_mut().keeper = keeper;
        self.emit(MechanismEvent::KeeperUpdated { keeper });
        info!("Keeper set to {}", keeper);
        Ok(())
    }

    pub fn set_emergency_admin(
        &mut self,
        caller: Address,
        emergency_admin: Address,
    ) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_owner_or_management(&caller, "emergency admin")?;
        if emergency_admin.is_zero() {
            return Err(MechanismError::ZeroAddress("emergency admin".to_string()));
        }

        self.ctx.roles_mut().emergency_admin = emergency_admin;
        self.emit(MechanismEvent::EmergencyAdminUpdated { emergency_admin });
        info!("Emergency admin set to {}", emergency_admin);
        Ok(())
    }

    fn require_owner_or_management(&self, caller: &Address, role: &str) -> MechanismResult<()> {
        let roles = self.ctx.roles();
        if *caller != roles.owner && *caller != roles.management {
            warn!("{} tried to set {} without the owner or management role", caller, role);
            return Err(MechanismError::Unauthorized(format!(
                "only the owner or management may set {}",
                role
            )));
        }
        Ok(())
    }
}

impl<S: VotingStrategy + AlphaControl> AllocationEngine<S> {
    pub fn alpha(&self) -> Alpha {
        self.strategy.alpha()
    }

    /// Reweight funding before the tally is frozen. Owner only.
    pub fn set_alpha(
        &mut self,
        caller: Address,
        numerator: U256,
        denominator: U256,
    ) -> MechanismResult<()> {
        let _entered = self.guard.enter()?;
        self.require_owner(&caller, "set alpha")?;
        if self.tally_finalized {
            return Err(MechanismError::TallyAlreadyFinalized);
        }

        let previous = self.strategy.set_alpha(numerator, denominator)?;
        self.emit(MechanismEvent::AlphaUpdated {
            old_numerator: previous.numerator(),
            old_denominator: previous.denominator(),
            new_numerator: numerator,
            new_denominator: denominator,
        });
        Ok(())
    }

    /// Alpha that would spend the current balance exactly, given the votes so far
    pub fn optimal_alpha(&self) -> MechanismResult<Alpha> {
        let balance = self.ctx.asset().balance_of(&self.ctx.address());
        let user_deposits = self.total_user_deposits;
        let matching_pool = balance.saturating_sub(user_deposits);
        self.strategy.optimal_alpha(matching_pool, user_deposits)
    }

    /// Set alpha to `optimal_alpha()`. Owner only, before finalization.
    pub fn apply_optimal_alpha(&mut self, caller: Address) -> MechanismResult<Alpha> {
        let alpha = self.optimal_alpha()?;
        self.set_alpha(caller, alpha.numerator(), alpha.denominator())?;
        info!("Applied optimal alpha {}", alpha);
        Ok(alpha)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use primitive_types::U256;
    use quadfund_tally::Alpha;

    use crate::asset::{FungibleAsset, InMemoryAsset};
    use crate::clock::ManualClock;
    use crate::config::MechanismConfig;
    use crate::engine::AllocationEngine;
    use crate::error::MechanismError;
    use crate::strategy::QuadraticVotingStrategy;
    use crate::types::Address;

    const OWNER: u64 = 1;
    const MANAGEMENT: u64 = 2;
    const GUARDIAN: u64 = 3;

    fn addr(value: u64) -> Address {
        Address::from_low_u64(value)
    }

    fn engine() -> AllocationEngine<QuadraticVotingStrategy> {
        let asset = Arc::new(InMemoryAsset::new(addr(0xa55e7), "TKN", 18));
        let mut config = MechanismConfig::new(asset.address(), addr(OWNER));
        config.management = Some(addr(MANAGEMENT));
        config.emergency_admin = Some(addr(GUARDIAN));
        let strategy = QuadraticVotingStrategy::new(U256::zero(), Alpha::one());
        let clock = Arc::new(ManualClock::new(0));
        AllocationEngine::new(config, addr(0xfeed), asset, clock, strategy).unwrap()
    }

    #[test]
    fn test_pause_roles() {
        let mut engine = engine();
        assert!(engine.pause(addr(MANAGEMENT)).is_err());
        engine.pause(addr(GUARDIAN)).unwrap();
        assert!(engine.is_paused());
        assert!(matches!(engine.signup(addr(10), U256::one()), Err(MechanismError::Paused)));

        assert!(engine.unpause(addr(GUARDIAN)).is_err());
        engine.unpause(addr(OWNER)).unwrap();
        assert!(!engine.is_paused());
    }

    #[test]
    fn test_two_step_ownership() {
        let mut engine = engine();
        let next = addr(7);

        assert!(engine.transfer_ownership(next, next).is_err());
        engine.transfer_ownership(addr(OWNER), next).unwrap();
        assert_eq!(engine.roles().owner, addr(OWNER));
        assert!(engine.accept_ownership(addr(8)).is_err());

        engine.accept_ownership(next).unwrap();
        assert_eq!(engine.roles().owner, next);
        assert_eq!(engine.roles().pending_owner, None);
    }

    #[test]
    fn test_cancel_ownership_transfer() {
        let mut engine = engine();
        assert!(engine.cancel_ownership_transfer(addr(OWNER)).is_err());

        engine.transfer_ownership(addr(OWNER), addr(7)).unwrap();
        engine.cancel_ownership_transfer(addr(OWNER)).unwrap();
        assert!(engine.accept_ownership(addr(7)).is_err());
    }

    #[test]
    fn test_role_rotation() {
        let mut engine = engine();
        engine.set_keeper(addr(MANAGEMENT), addr(9)).unwrap();
        assert_eq!(engine.roles().keeper, addr(9));

        assert!(engine.set_keeper(addr(9), addr(10)).is_err());
        assert!(engine.set_management(addr(OWNER), Address::ZERO).is_err());

        engine.set_emergency_admin(addr(OWNER), addr(11)).unwrap();
        engine.set_management(addr(OWNER), addr(12)).unwrap();
        assert_eq!(engine.roles().emergency_admin, addr(11));
        assert_eq!(engine.roles().management, addr(12));
    }

    #[test]
    fn test_set_alpha_is_owner_only() {
        let mut engine = engine();
        assert!(engine.set_alpha(addr(MANAGEMENT), U256::one(), U256::from(2u64)).is_err());
        assert!(engine.set_alpha(addr(OWNER), U256::from(3u64), U256::from(2u64)).is_err());

        engine.set_alpha(addr(OWNER), U256::one(), U256::from(2u64)).unwrap();
        assert_eq!(engine.alpha(), Alpha::new(U256::one(), U256::from(2u64)).unwrap());
    }
}
