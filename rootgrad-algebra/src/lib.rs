//! Algebraic equation solving with implicit-function-theorem gradients.
//!
//! [`algebra_solver`] finds `θ` with `f(θ; y, dat, dat_int) = 0` using a
//! Powell hybrid dogleg iteration on exact forward-mode Jacobians. When the
//! parameters `y` are [`rootgrad::Reverse`] tape variables, the root is
//! attached to the tape through a single [`rootgrad::ImplicitNode`], so
//! reverse mode sees `dθ/dy = -Jf_x⁻¹ Jf_y` instead of the solver iterations.

pub mod check;
pub mod config;
pub mod error;
pub mod functor;
pub mod hybrid;
pub mod linalg;
pub mod residual;
pub mod sensitivity;
pub mod solve;
pub mod system;

pub use config::SolverConfig;
pub use error::{InvalidInput, SolverError};
pub use functor::SystemFunctor;
pub use hybrid::{hybrid, HybridConfig, HybridResult, Termination};
pub use residual::{ResidualEvaluator, Wrt};
pub use sensitivity::sensitivity;
pub use solve::{algebra_solver, solve_root, Parameter, RootSolution};
pub use system::{AlgebraSystem, SystemData};
