use std::io::Write;

use rootgrad::{Float, Scalar};

/// A system of algebraic equations `f(x; y, dat, dat_int) = 0`.
///
/// `residual` is generic over the scalar type so that one definition serves
/// plain evaluation (`T = F`) and exact Jacobians (`T = Dual<F>`). It must
/// return as many residuals as there are unknowns, and it must tolerate being
/// called at arbitrary points near the root.
///
/// ```
/// use rootgrad::Scalar;
/// use rootgrad_algebra::AlgebraSystem;
///
/// /// x² - y = 0
/// struct SquareRoot;
///
/// impl AlgebraSystem<f64> for SquareRoot {
///     fn residual<T: Scalar<Float = f64>>(
///         &self,
///         x: &[T],
///         y: &[T],
///         _dat: &[f64],
///         _dat_int: &[i32],
///         _msgs: &mut dyn std::io::Write,
///     ) -> Vec<T> {
///         vec![x[0] * x[0] - y[0]]
///     }
/// }
/// ```
pub trait AlgebraSystem<F: Float> {
    /// Evaluate the residual at unknowns `x` and parameters `y`.
    ///
    /// `msgs` is a diagnostic sink; the solver never reads it.
    fn residual<T: Scalar<Float = F>>(
        &self,
        x: &[T],
        y: &[T],
        dat: &[F],
        dat_int: &[i32],
        msgs: &mut dyn Write,
    ) -> Vec<T>;
}

impl<F: Float, S: AlgebraSystem<F> + ?Sized> AlgebraSystem<F> for &S {
    fn residual<T: Scalar<Float = F>>(
        &self,
        x: &[T],
        y: &[T],
        dat: &[F],
        dat_int: &[i32],
        msgs: &mut dyn Write,
    ) -> Vec<T> {
        (**self).residual(x, y, dat, dat_int, msgs)
    }
}

/// Fixed data passed unchanged to every residual evaluation.
#[derive(Debug, Clone, Copy)]
pub struct SystemData<'a, F> {
    pub real: &'a [F],
    pub int: &'a [i32],
}

impl<'a, F> SystemData<'a, F> {
    pub fn new(real: &'a [F], int: &'a [i32]) -> Self {
        SystemData { real, int }
    }
}
