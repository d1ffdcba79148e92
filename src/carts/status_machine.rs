use crate::carts::CartStatus;

/// Service for managing cart status transitions
pub struct StatusMachine;

impl StatusMachine {
    /// Check if a status transition is valid
    ///
    /// # Valid Transitions
    /// - Active → Active (content mutation), Abandoned (sweep), Processing (checkout),
    ///   Completed (merged away)
    /// - Abandoned → Active (shopper returns), Processing, Completed
    /// - Processing, Completed → nothing; settlement happens outside this service
    pub fn is_valid_transition(from: CartStatus, to: CartStatus) -> bool {
        match (from, to) {
            (CartStatus::Active, _) => true,

            (CartStatus::Abandoned, CartStatus::Active) => true,
            (CartStatus::Abandoned, CartStatus::Processing) => true,
            (CartStatus::Abandoned, CartStatus::Completed) => true,

            (CartStatus::Processing, _) => false,
            (CartStatus::Completed, _) => false,

            _ => false,
        }
    }

    /// Attempt to transition from one status to another
    ///
    /// Returns `Ok(to)` if the transition is valid, `Err(message)` otherwise
    pub fn transition(from: CartStatus, to: CartStatus) -> Result<CartStatus, String> {
        if Self::is_valid_transition(from, to) {
            Ok(to)
        } else {
            Err(format!("Invalid cart status transition from {} to {}", from, to))
        }
    }

    /// Whether items, coupon or totals may still change in this status
    pub fn accepts_changes(status: CartStatus) -> bool {
        Self::is_valid_transition(status, CartStatus::Active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_to_processing() {
        assert!(StatusMachine::is_valid_transition(
            CartStatus::Active,
            CartStatus::Processing
        ));
    }

    #[test]
    fn test_active_to_abandoned() {
        assert!(StatusMachine::is_valid_transition(
            CartStatus::Active,
            CartStatus::Abandoned
        ));
    }

    #[test]
    fn test_abandoned_revives() {
        assert!(StatusMachine::is_valid_transition(
            CartStatus::Abandoned,
            CartStatus::Active
        ));
    }

    #[test]
    fn test_abandoned_cannot_be_abandoned_again() {
        assert!(!StatusMachine::is_valid_transition(
            CartStatus::Abandoned,
            CartStatus::Abandoned
        ));
    }

    #[test]
    fn test_processing_to_active() {
        assert!(!StatusMachine::is_valid_transition(
            CartStatus::Processing,
            CartStatus::Active
        ));
    }

    #[test]
    fn test_processing_to_processing() {
        assert!(!StatusMachine::is_valid_transition(
            CartStatus::Processing,
            CartStatus::Processing
        ));
    }

    #[test]
    fn test_completed_to_active() {
        assert!(!StatusMachine::is_valid_transition(
            CartStatus::Completed,
            CartStatus::Active
        ));
    }

    #[test]
    fn test_transition_invalid_message() {
        let result = StatusMachine::transition(CartStatus::Completed, CartStatus::Processing);
        assert!(result.unwrap_err().contains("completed to processing"));
    }

    #[test]
    fn test_accepts_changes() {
        assert!(StatusMachine::accepts_changes(CartStatus::Active));
        assert!(StatusMachine::accepts_changes(CartStatus::Abandoned));
        assert!(!StatusMachine::accepts_changes(CartStatus::Processing));
        assert!(!StatusMachine::accepts_changes(CartStatus::Completed));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn cart_status_strategy() -> impl Strategy<Value = CartStatus> {
        prop_oneof![
            Just(CartStatus::Active),
            Just(CartStatus::Abandoned),
            Just(CartStatus::Processing),
            Just(CartStatus::Completed),
        ]
    }

    /// Processing and completed are terminal
    #[test]
    fn prop_terminal_states_have_no_exit() {
        proptest!(|(to in cart_status_strategy())| {
            prop_assert!(!StatusMachine::is_valid_transition(CartStatus::Processing, to));
            prop_assert!(!StatusMachine::is_valid_transition(CartStatus::Completed, to));
        });
    }

    /// transition() agrees with is_valid_transition()
    #[test]
    fn prop_transition_consistency() {
        proptest!(|(from in cart_status_strategy(), to in cart_status_strategy())| {
            let is_valid = StatusMachine::is_valid_transition(from, to);
            let result = StatusMachine::transition(from, to);
            prop_assert_eq!(is_valid, result.is_ok());
            if let Ok(next) = result {
                prop_assert_eq!(next, to);
            }
        });
    }
}
