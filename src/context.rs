//! Transaction context and its classification
//!
//! A `TransactionContext` is the set of flags an engine attaches to every
//! transaction it owns. The dispatcher never mutates it; it only turns it into
//! a `Route`, which is what every routing decision matches on.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TccError};

/// Classification flags attached one-to-one to a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TransactionContext {
    compensable: bool,
    compensating: bool,
    coordinator: bool,
    propagated: bool,
    recoveried: bool,
}

impl TransactionContext {
    /// Plain ACID transaction
    pub fn atomic() -> Self {
        Self::default()
    }

    /// Compensable transaction originated by this process
    pub fn coordinator() -> Self {
        Self {
            compensable: true,
            coordinator: true,
            ..Self::default()
        }
    }

    /// Compensable transaction this process coordinates but which arrived
    /// from an external caller
    pub fn propagated_coordinator() -> Self {
        Self {
            compensable: true,
            coordinator: true,
            propagated: true,
            ..Self::default()
        }
    }

    /// Compensable transaction joined from a remote coordinator
    pub fn participant() -> Self {
        Self {
            compensable: true,
            propagated: true,
            ..Self::default()
        }
    }

    /// Compensable transaction reconstructed during crash recovery.
    ///
    /// Recovery only ever resumes the compensating phase.
    pub fn recovered(coordinator: bool) -> Self {
        Self {
            compensable: true,
            compensating: true,
            coordinator,
            recoveried: true,
            ..Self::default()
        }
    }

    /// Arbitrary flag combination, for engines that restore a context from
    /// their own records. No invariant is checked here; `route` reports
    /// violations.
    pub fn from_flags(
        compensable: bool,
        compensating: bool,
        coordinator: bool,
        propagated: bool,
        recoveried: bool,
    ) -> Self {
        Self {
            compensable,
            compensating,
            coordinator,
            propagated,
            recoveried,
        }
    }

    pub fn is_compensable(&self) -> bool {
        self.compensable
    }

    pub fn is_compensating(&self) -> bool {
        self.compensating
    }

    pub fn is_coordinator(&self) -> bool {
        self.coordinator
    }

    pub fn is_propagated(&self) -> bool {
        self.propagated
    }

    pub fn is_recoveried(&self) -> bool {
        self.recoveried
    }

    /// Enter the compensating phase. Never reverts.
    pub fn mark_compensating(&mut self) -> Result<()> {
        if !self.compensable {
            return Err(TccError::illegal_state(
                "an atomic transaction has no compensating phase",
            ));
        }
        self.compensating = true;
        Ok(())
    }

    pub fn role(&self) -> Role {
        match (self.coordinator, self.propagated) {
            (true, false) => Role::Coordinator,
            (true, true) => Role::PropagatedCoordinator,
            (false, _) => Role::Participant,
        }
    }

    pub fn phase(&self) -> Phase {
        if self.compensating {
            Phase::Compensating
        } else {
            Phase::Trying
        }
    }

    /// Classify this context for routing.
    ///
    /// Fails for a recovered context that is not compensable.
    pub fn route(&self) -> Result<Route> {
        if self.recoveried {
            if !self.compensable {
                log::warn!("recovered transaction context is not compensable: {:?}", self);
                return Err(TccError::illegal_state(
                    "recovered transaction must be compensable",
                ));
            }
            return Ok(Route::Recovered);
        }
        if !self.compensable {
            return Ok(Route::Atomic);
        }
        Ok(Route::Compensable {
            role: self.role(),
            phase: self.phase(),
        })
    }
}

/// Who owns the outcome of a compensable transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Originated here; decides confirm or cancel
    Coordinator,
    /// Coordinates, but the outcome decision was made upstream
    PropagatedCoordinator,
    /// Joined a transaction coordinated elsewhere
    Participant,
}

/// Which half of the TCC protocol a compensable transaction is in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Trying,
    Compensating,
}

/// Routing classification of a transaction context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    /// Ordinary ACID transaction
    Atomic,
    /// Compensable transaction rebuilt by recovery
    Recovered,
    /// Live compensable transaction
    Compensable { role: Role, phase: Phase },
}

impl Route {
    pub fn is_compensable(&self) -> bool {
        !matches!(self, Route::Atomic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_atomic() {
        let ctx = TransactionContext::default();
        assert_eq!(ctx, TransactionContext::atomic());
        assert_eq!(ctx.route().unwrap(), Route::Atomic);
    }

    #[test]
    fn test_coordinator_route() {
        let ctx = TransactionContext::coordinator();
        assert_eq!(
            ctx.route().unwrap(),
            Route::Compensable {
                role: Role::Coordinator,
                phase: Phase::Trying
            }
        );
    }

    #[test]
    fn test_propagated_coordinator_route() {
        let ctx = TransactionContext::propagated_coordinator();
        assert_eq!(ctx.role(), Role::PropagatedCoordinator);
    }

    #[test]
    fn test_participant_route_ignores_propagated_flag() {
        let local = TransactionContext::from_flags(true, false, false, false, false);
        let remote = TransactionContext::participant();
        assert_eq!(local.role(), Role::Participant);
        assert_eq!(remote.role(), Role::Participant);
    }

    #[test]
    fn test_recovered_route() {
        let ctx = TransactionContext::recovered(true);
        assert!(ctx.is_compensating());
        assert_eq!(ctx.route().unwrap(), Route::Recovered);
    }

    #[test]
    fn test_recovered_without_compensable_is_illegal() {
        let ctx = TransactionContext::from_flags(false, false, true, false, true);
        assert!(matches!(ctx.route(), Err(TccError::IllegalState(_))));
    }

    #[test]
    fn test_mark_compensating_is_monotonic() {
        let mut ctx = TransactionContext::coordinator();
        assert_eq!(ctx.phase(), Phase::Trying);
        ctx.mark_compensating().unwrap();
        ctx.mark_compensating().unwrap();
        assert!(ctx.is_compensating());
        assert_eq!(ctx.phase(), Phase::Compensating);
    }

    #[test]
    fn test_mark_compensating_rejects_atomic() {
        let mut ctx = TransactionContext::atomic();
        assert!(ctx.mark_compensating().is_err());
        assert!(!ctx.is_compensating());
    }

    #[test]
    fn test_context_serialization() {
        let ctx = TransactionContext::propagated_coordinator();
        let json = serde_json::to_string(&ctx).unwrap();
        assert!(json.contains("\"propagated\":true"));
        let back: TransactionContext = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ctx);
    }
}
