use rootgrad::Float;

use crate::check::check_positive;
use crate::error::SolverError;
use crate::hybrid::HybridConfig;

/// Tolerances and budget for [`algebra_solver`](crate::algebra_solver).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SolverConfig<F> {
    /// Convergence criterion on the step / trust radius, relative to the
    /// scaled norm of the unknowns (default: 1e-10).
    pub relative_tolerance: F,
    /// Largest residual norm at which a returned point is accepted as a root
    /// (default: 1e-6).
    pub function_tolerance: F,
    /// Maximum number of residual evaluations (default: 1000).
    pub max_num_steps: usize,
}

impl Default for SolverConfig<f64> {
    fn default() -> Self {
        SolverConfig {
            relative_tolerance: 1e-10,
            function_tolerance: 1e-6,
            max_num_steps: 1000,
        }
    }
}

impl Default for SolverConfig<f32> {
    fn default() -> Self {
        SolverConfig {
            relative_tolerance: 1e-6,
            function_tolerance: 1e-4,
            max_num_steps: 1000,
        }
    }
}

impl<F: Float> SolverConfig<F> {
    pub fn with_relative_tolerance(mut self, tol: F) -> Self {
        self.relative_tolerance = tol;
        self
    }

    pub fn with_function_tolerance(mut self, tol: F) -> Self {
        self.function_tolerance = tol;
        self
    }

    pub fn with_max_num_steps(mut self, steps: usize) -> Self {
        self.max_num_steps = steps;
        self
    }

    /// Root-finder settings: `xtol = relative_tolerance`, `maxfev = max_num_steps`.
    pub fn hybrid_config(&self) -> HybridConfig<F> {
        HybridConfig {
            xtol: self.relative_tolerance,
            maxfev: self.max_num_steps,
            factor: F::from_f64(100.0).unwrap_or_else(F::one),
        }
    }

    /// Check that both tolerances and the step budget are strictly positive.
    pub fn validate(&self) -> Result<(), SolverError> {
        check_positive("relative_tolerance", self.relative_tolerance)?;
        check_positive("function_tolerance", self.function_tolerance)?;
        if self.max_num_steps == 0 {
            return Err(crate::error::InvalidInput::NonPositive {
                name: "max_num_steps",
                value: 0.0,
            }
            .into());
        }
        Ok(())
    }
}
