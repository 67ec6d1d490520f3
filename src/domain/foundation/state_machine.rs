//! State machine trait for status enums.
//!
//! Provides a consistent interface for validating and performing lifecycle
//! transitions on status enums.

use super::ValidationError;

/// Trait for status enums that represent state machines.
///
/// Implementors define which transitions are valid; `transition_to` then
/// enforces them uniformly.
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }
}
