/// A square residual map `R^n → R^n` with its Jacobian, as consumed by
/// [`hybrid`](crate::hybrid::hybrid).
pub trait SystemFunctor<F> {
    /// Evaluate the residual at `x`.
    fn value(&mut self, x: &[F]) -> Vec<F>;

    /// Evaluate the Jacobian `J[i][j] = ∂f_i/∂x_j` at `x`.
    fn jacobian(&mut self, x: &[F]) -> Vec<Vec<F>>;
}
