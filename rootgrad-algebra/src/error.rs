use thiserror::Error;

/// A precondition on the solver's arguments that did not hold.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum InvalidInput {
    #[error("{name} has size 0, but must have a non-zero size")]
    EmptyVector { name: &'static str },

    #[error("{name}[{index}] is {value}, but must be finite")]
    NonFinite {
        name: &'static str,
        index: usize,
        value: f64,
    },

    #[error("{name} is {value}, but must be greater than 0")]
    NonPositive { name: &'static str, value: f64 },
}

/// Why an algebraic solve failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverError {
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInput),

    #[error(
        "the output of the algebraic system has dimension {actual}, \
         but should have the same dimension as the vector of unknowns, which is {expected}"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("max number of iterations: {max_num_steps} exceeded ({evaluations} evaluations)")]
    NonConvergence {
        max_num_steps: usize,
        evaluations: usize,
    },

    #[error(
        "the norm of the algebraic function is {norm}, but should be lower than \
         the function tolerance {function_tolerance}; consider decreasing the relative \
         tolerance and increasing max_num_steps"
    )]
    UnacceptableRoot { norm: f64, function_tolerance: f64 },

    #[error("the Jacobian of the algebraic system with respect to the unknowns is singular at the solution")]
    SingularJacobian,
}

impl SolverError {
    /// `true` for failures caused by the caller's arguments rather than by the solve.
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, SolverError::InvalidInput(_))
    }
}
