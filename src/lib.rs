//! Reverse-mode automatic differentiation with implicit nodes.
//!
//! The tape records elementary operations as precomputed multipliers and,
//! for solvers that already know the derivative of their output, dense
//! [`ImplicitNode`]s. Forward-mode [`Dual`] numbers evaluate Jacobians.

pub mod api;
pub mod dual;
pub mod node;
mod ops;
pub mod reverse;
pub mod scalar;
pub mod tape;

pub use api::{grad, jacobian, vjp};
pub use dual::Dual;
pub use node::ImplicitNode;
pub use reverse::Reverse;
pub use scalar::{Float, Scalar};

/// Type alias for forward-mode dual numbers over `f64`.
pub type Dual64 = Dual<f64>;
/// Type alias for reverse-mode variables over `f64`.
pub type Reverse64 = Reverse<f64>;
/// Type alias for reverse-mode variables over `f32`.
pub type Reverse32 = Reverse<f32>;
