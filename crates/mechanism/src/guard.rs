//! Re-entrancy guard
//!
//! A single in-progress flag, set when a state-mutating operation enters and
//! cleared when the returned token is dropped, on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{MechanismError, MechanismResult};

#[derive(Debug, Default, Clone)]
pub struct ReentrancyGuard {
    entered: Arc<AtomicBool>,
}

impl ReentrancyGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark an operation as in progress, failing if one already is
    pub fn enter(&self) -> MechanismResult<Entered> {
        self.entered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| MechanismError::Reentrancy)?;

        Ok(Entered {
            entered: Arc::clone(&self.entered),
        })
    }

    pub fn is_entered(&self) -> bool {
        self.entered.load(Ordering::SeqCst)
    }
}

/// Proof that an operation holds the guard; releases it on drop
#[derive(Debug)]
pub struct Entered {
    entered: Arc<AtomicBool>,
}

impl Drop for Entered {
    fn drop(&mut self) {
        self.entered.store(false, Ordering::SeqCst);
    }
}
