use std::io::{self, Write};

use rootgrad::tape::{self, TapeThreadLocal};
use rootgrad::{Float, ImplicitNode, Reverse, Scalar};

use crate::check::{as_f64, check_finite, check_nonzero_size};
use crate::config::SolverConfig;
use crate::error::SolverError;
use crate::functor::SystemFunctor;
use crate::hybrid::{hybrid, Termination};
use crate::linalg::stable_norm;
use crate::residual::ResidualEvaluator;
use crate::sensitivity::sensitivity;
use crate::system::{AlgebraSystem, SystemData};

/// An accepted root with solver statistics.
#[derive(Debug, Clone)]
pub struct RootSolution<F> {
    pub theta: Vec<F>,
    /// Stable Euclidean norm of the residual at `theta`.
    pub residual_norm: F,
    /// Residual evaluations used by the root finder.
    pub nfev: usize,
    /// Jacobian evaluations used by the root finder.
    pub njev: usize,
    pub iterations: usize,
    pub termination: Termination,
}

/// How a parameter type turns a numeric root into solver output.
///
/// Plain floats return the root unchanged. [`Reverse`] variables attach the
/// root to the active tape through an [`ImplicitNode`] carrying `dθ/dy`.
pub trait Parameter: Scalar {
    fn attach_root<S: AlgebraSystem<Self::Float>>(
        system: &S,
        theta: Vec<Self::Float>,
        y: &[Self],
        data: SystemData<'_, Self::Float>,
        msgs: &mut dyn Write,
    ) -> Result<Vec<Self>, SolverError>;
}

macro_rules! impl_parameter_for_float {
    ($f:ty) => {
        impl Parameter for $f {
            fn attach_root<S: AlgebraSystem<$f>>(
                _system: &S,
                theta: Vec<$f>,
                _y: &[$f],
                _data: SystemData<'_, $f>,
                _msgs: &mut dyn Write,
            ) -> Result<Vec<$f>, SolverError> {
                Ok(theta)
            }
        }
    };
}

impl_parameter_for_float!(f32);
impl_parameter_for_float!(f64);

impl<F: Float + TapeThreadLocal> Parameter for Reverse<F> {
    fn attach_root<S: AlgebraSystem<F>>(
        system: &S,
        theta: Vec<F>,
        y: &[Self],
        data: SystemData<'_, F>,
        msgs: &mut dyn Write,
    ) -> Result<Vec<Self>, SolverError> {
        if !y.iter().any(Reverse::is_tracked) {
            return Ok(theta.into_iter().map(Reverse::constant).collect());
        }
        assert!(
            tape::has_active_tape::<F>(),
            "tracked parameters passed to algebra_solver without an active tape"
        );

        // Build phase: everything the reverse sweep reads is computed here.
        let y_val: Vec<F> = y.iter().map(Scalar::value).collect();
        let jx_y = sensitivity(system, &theta, &y_val, data, msgs)?;
        let node = ImplicitNode::new(y.iter().map(Reverse::index).collect(), jx_y);
        let first = tape::with_active_tape::<F, _>(|t| t.push_implicit(node));

        Ok(theta
            .into_iter()
            .enumerate()
            .map(|(i, v)| Reverse::from_tape(v, first + i as u32))
            .collect())
    }
}

fn validate_inputs<F: Float>(
    x0: &[F],
    y: &[F],
    dat: &[F],
    config: &SolverConfig<F>,
) -> Result<(), SolverError> {
    check_nonzero_size("initial guess", x0)?;
    check_nonzero_size("parameter vector", y)?;
    check_finite("initial guess", x0)?;
    check_finite("parameter vector", y)?;
    check_finite("continuous data", dat)?;
    config.validate()
}

fn solve_root_with<F: Float, S: AlgebraSystem<F>>(
    system: &S,
    x0: &[F],
    y: &[F],
    data: SystemData<'_, F>,
    msgs: &mut dyn Write,
    config: &SolverConfig<F>,
) -> Result<RootSolution<F>, SolverError> {
    validate_inputs(x0, y, data.real, config)?;

    let n = x0.len();
    let mut fx = ResidualEvaluator::unknowns(system, y, data, msgs);

    let z_size = fx.value(x0).len();
    if z_size != n {
        return Err(SolverError::DimensionMismatch {
            expected: n,
            actual: z_size,
        });
    }

    let result = hybrid(&mut fx, x0, &config.hybrid_config());

    if let Termination::DimensionMismatch { actual } = result.termination {
        return Err(SolverError::DimensionMismatch {
            expected: n,
            actual,
        });
    }

    // Budget exhaustion is a failure even if the last step happened to converge.
    if result.nfev >= config.max_num_steps {
        log::warn!(
            "algebra solver used {} of {} evaluations ({})",
            result.nfev,
            config.max_num_steps,
            result.termination
        );
        return Err(SolverError::NonConvergence {
            max_num_steps: config.max_num_steps,
            evaluations: result.nfev,
        });
    }

    let residual = fx.value(&result.x);
    if residual.len() != n {
        return Err(SolverError::DimensionMismatch {
            expected: n,
            actual: residual.len(),
        });
    }
    let norm = stable_norm(&residual);
    if !(norm <= config.function_tolerance) {
        log::warn!(
            "rejecting candidate root with residual norm {:?} ({})",
            as_f64(norm),
            result.termination
        );
        return Err(SolverError::UnacceptableRoot {
            norm: as_f64(norm),
            function_tolerance: as_f64(config.function_tolerance),
        });
    }

    log::debug!(
        "algebra solver accepted root: |f| = {:?}, {} evaluations, {} jacobians",
        as_f64(norm),
        result.nfev,
        result.njev
    );
    Ok(RootSolution {
        theta: result.x,
        residual_norm: norm,
        nfev: result.nfev,
        njev: result.njev,
        iterations: result.iterations,
        termination: result.termination,
    })
}

/// Solve `f(θ; y, dat, dat_int) = 0` for plain-float parameters and report
/// solver statistics alongside the root.
///
/// Runs the same validation and acceptance checks as [`algebra_solver`].
pub fn solve_root<F: Float, S: AlgebraSystem<F>>(
    system: &S,
    x0: &[F],
    y: &[F],
    dat: &[F],
    dat_int: &[i32],
    msgs: Option<&mut dyn Write>,
    config: &SolverConfig<F>,
) -> Result<RootSolution<F>, SolverError> {
    let mut sink = io::sink();
    let msgs: &mut dyn Write = match msgs {
        Some(m) => m,
        None => &mut sink,
    };
    solve_root_with(system, x0, y, SystemData::new(dat, dat_int), msgs, config)
}

/// Solve the algebraic system `f(θ; y, dat, dat_int) = 0` for `θ`,
/// starting from `x0`.
///
/// With `T = f64` (or `f32`) this returns the root. With `T = Reverse<F>`
/// the root is returned as tape variables whose adjoints flow back to `y`
/// through the implicit function theorem; the solver iterations themselves
/// are never recorded.
///
/// # Errors
///
/// - [`SolverError::InvalidInput`]: `x0` or `y` empty; a non-finite value in
///   `x0`, `y` or `dat`; a non-positive tolerance or `max_num_steps`.
/// - [`SolverError::DimensionMismatch`]: the residual length differs from `x0.len()`.
/// - [`SolverError::NonConvergence`]: the evaluation budget was used up.
/// - [`SolverError::UnacceptableRoot`]: the residual norm at the returned
///   point exceeds `function_tolerance`.
/// - [`SolverError::SingularJacobian`]: (tape variables only) `Jf_x` is
///   singular at the root.
///
/// # Panics
///
/// With tracked `Reverse` parameters, panics if no tape is active.
pub fn algebra_solver<F, T, S>(
    system: &S,
    x0: &[F],
    y: &[T],
    dat: &[F],
    dat_int: &[i32],
    msgs: Option<&mut dyn Write>,
    config: &SolverConfig<F>,
) -> Result<Vec<T>, SolverError>
where
    F: Float,
    T: Parameter<Float = F>,
    S: AlgebraSystem<F>,
{
    let mut sink = io::sink();
    let msgs: &mut dyn Write = match msgs {
        Some(m) => m,
        None => &mut sink,
    };

    let y_val: Vec<F> = y.iter().map(Scalar::value).collect();
    let data = SystemData::new(dat, dat_int);
    let root = solve_root_with(system, x0, &y_val, data, &mut *msgs, config)?;
    T::attach_root(system, root.theta, y, data, msgs)
}
