use std::io::Write;

use rootgrad::Float;

use crate::error::SolverError;
use crate::functor::SystemFunctor;
use crate::linalg::lu_solve_matrix;
use crate::residual::ResidualEvaluator;
use crate::system::{AlgebraSystem, SystemData};

/// Compute the sensitivity `dθ/dy` (x_size × y_size) of a root `theta`.
///
/// Differentiating `f(θ(y), y) = 0` gives `Jf_x · dθ/dy + Jf_y = 0`, so
/// `dθ/dy = -Jf_x⁻¹ · Jf_y`. Both Jacobians are taken at `(theta, y)`
/// and the result comes from one LU factorization of `Jf_x`, never from
/// an explicit inverse.
///
/// Fails with [`SolverError::SingularJacobian`] when `Jf_x` is singular.
pub fn sensitivity<F: Float, S: AlgebraSystem<F>>(
    system: &S,
    theta: &[F],
    y: &[F],
    data: SystemData<'_, F>,
    msgs: &mut dyn Write,
) -> Result<Vec<Vec<F>>, SolverError> {
    let jf_x = ResidualEvaluator::unknowns(system, y, data, &mut *msgs).jacobian(theta);
    let jf_y = ResidualEvaluator::parameters(system, theta, data, &mut *msgs).jacobian(y);

    if jf_x.len() != theta.len() {
        return Err(SolverError::DimensionMismatch {
            expected: theta.len(),
            actual: jf_x.len(),
        });
    }

    let neg_jf_y: Vec<Vec<F>> = jf_y
        .into_iter()
        .map(|row| row.into_iter().map(|v| -v).collect())
        .collect();
    let jx_y = lu_solve_matrix(&jf_x, &neg_jf_y).ok_or(SolverError::SingularJacobian)?;

    log::debug!(
        "computed {}x{} solution sensitivity",
        theta.len(),
        y.len()
    );
    Ok(jx_y)
}
