//! Purchase record lifecycle states
//!
//! State IDs are stored in PostgreSQL as SMALLINT.

use std::fmt;

/// Purchase record states
///
/// Terminal: SETTLED (20), FAILED (-10)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum PurchaseState {
    /// Row exists, no provider transfer yet
    Initiated = 0,

    /// Provider accepted the transfer; transfer id attached.
    /// Must be tracked until terminal (recovery sweep re-polls it).
    TransferRequested = 10,

    /// Terminal: provider confirmed completion
    Settled = 20,

    /// Terminal: a step failed for good
    Failed = -10,
}

impl PurchaseState {
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, PurchaseState::Settled | PurchaseState::Failed)
    }

    /// Holds the (listing, buyer) pair: at most one active row per pair
    #[inline]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PurchaseState::Initiated | PurchaseState::TransferRequested
        )
    }

    /// Whether `self -> next` is a legal ledger transition
    pub fn can_transition_to(&self, next: PurchaseState) -> bool {
        matches!(
            (self, next),
            (PurchaseState::Initiated, PurchaseState::TransferRequested)
                | (PurchaseState::Initiated, PurchaseState::Failed)
                | (PurchaseState::TransferRequested, PurchaseState::Settled)
                | (PurchaseState::TransferRequested, PurchaseState::Failed)
        )
    }

    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(PurchaseState::Initiated),
            10 => Some(PurchaseState::TransferRequested),
            20 => Some(PurchaseState::Settled),
            -10 => Some(PurchaseState::Failed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseState::Initiated => "INITIATED",
            PurchaseState::TransferRequested => "TRANSFER_REQUESTED",
            PurchaseState::Settled => "SETTLED",
            PurchaseState::Failed => "FAILED",
        }
    }
}

impl fmt::Display for PurchaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for PurchaseState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        PurchaseState::from_id(value).ok_or(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(PurchaseState::Settled.is_terminal());
        assert!(PurchaseState::Failed.is_terminal());

        assert!(!PurchaseState::Initiated.is_terminal());
        assert!(!PurchaseState::TransferRequested.is_terminal());
    }

    #[test]
    fn test_active_states() {
        assert!(PurchaseState::Initiated.is_active());
        assert!(PurchaseState::TransferRequested.is_active());

        assert!(!PurchaseState::Settled.is_active());
        assert!(!PurchaseState::Failed.is_active());
    }

    #[test]
    fn test_transitions_never_reverse() {
        use PurchaseState::*;

        assert!(Initiated.can_transition_to(TransferRequested));
        assert!(Initiated.can_transition_to(Failed));
        assert!(TransferRequested.can_transition_to(Settled));
        assert!(TransferRequested.can_transition_to(Failed));

        assert!(!Initiated.can_transition_to(Settled));
        assert!(!TransferRequested.can_transition_to(Initiated));
        for terminal in [Settled, Failed] {
            for next in [Initiated, TransferRequested, Settled, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_state_id_roundtrip() {
        for state in [
            PurchaseState::Initiated,
            PurchaseState::TransferRequested,
            PurchaseState::Settled,
            PurchaseState::Failed,
        ] {
            assert_eq!(PurchaseState::from_id(state.id()), Some(state));
        }
        assert!(PurchaseState::from_id(999).is_none());
        assert!(PurchaseState::try_from(-30).is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(PurchaseState::Initiated.to_string(), "INITIATED");
        assert_eq!(
            PurchaseState::TransferRequested.to_string(),
            "TRANSFER_REQUESTED"
        );
        assert_eq!(PurchaseState::Settled.to_string(), "SETTLED");
    }
}
