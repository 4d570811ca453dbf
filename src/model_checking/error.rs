//! Error type shared by model construction, verification and learning.

/// Error type for all fallible operations on models.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A transition or reward refers to a state missing from the state list.
    #[error("state {state} is referenced but was never declared")]
    UndeclaredState {
        /// The offending state identifier.
        state: String,
    },

    /// An action transition refers to an action missing from the action list.
    #[error("action {action} is referenced but was never declared")]
    UndeclaredAction {
        /// The offending action identifier.
        action: String,
    },

    /// A state has both plain and action-labelled outgoing transitions.
    #[error("state {state} mixes transitions with and without actions")]
    MixedTransitionStyle {
        /// The state declaring both styles.
        state: String,
    },

    /// The model declares no states at all.
    #[error("model declares no states")]
    NoStates,

    /// A state identifier appears twice in the state list.
    #[error("state {state} is declared more than once")]
    DuplicateState {
        /// The repeated identifier.
        state: String,
    },

    /// A transition weight is non-finite or not strictly positive.
    #[error("transition {from} -> {to} has invalid weight {weight}")]
    InvalidWeight {
        /// Source state.
        from: String,
        /// Destination state.
        to: String,
        /// The rejected weight.
        weight: f64,
    },

    /// A query named a state the model does not contain.
    #[error("unknown state {state}")]
    UnknownState {
        /// The unknown identifier.
        state: String,
    },

    /// A query named an action the model does not contain.
    #[error("unknown action {action}")]
    UnknownAction {
        /// The unknown identifier.
        action: String,
    },

    /// A state has no outgoing transition to sample from.
    #[error("state {state} has no outgoing transitions")]
    NoOutgoingTransitions {
        /// The dead-end state.
        state: String,
    },

    /// The chosen action is not enabled in the current state.
    #[error("action {action} is not available in state {state}")]
    ActionNotAvailable {
        /// The current state.
        state: String,
        /// The rejected action.
        action: String,
    },

    /// `simulation_step` was called before `simulation_init`.
    #[error("simulation has not been initialised")]
    SimulationNotStarted,

    /// A numeric parameter lies outside its admissible range.
    #[error("invalid parameter {name} = {value}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The rejected value.
        value: f64,
        /// Human readable constraint.
        reason: &'static str,
    },

    /// The reachability linear system has no unique solution.
    #[error("linear system is singular at pivot column {column}")]
    SingularSystem {
        /// Column at which elimination found no usable pivot.
        column: usize,
    },

    /// The reachability linear program could not be solved.
    #[error("linear program failed: {reason}")]
    LinearProgram {
        /// Message reported by the solver.
        reason: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl ModelError {
    pub(crate) fn invalid(name: &'static str, value: f64, reason: &'static str) -> ModelError {
        ModelError::InvalidParameter { name, value, reason }
    }
}

/// Checks that `value` lies strictly inside `(0, 1)`.
pub(crate) fn check_open_unit(name: &'static str, value: f64) -> Result<(), ModelError> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ModelError::invalid(name, value, "must lie strictly between 0 and 1"))
    }
}

/// Checks that a count is at least one.
pub(crate) fn check_positive(name: &'static str, value: usize) -> Result<(), ModelError> {
    if value >= 1 {
        Ok(())
    } else {
        Err(ModelError::invalid(name, value as f64, "must be at least 1"))
    }
}
