use std::cell::Cell;
use std::io::Write;

use approx::{assert_abs_diff_eq, assert_relative_eq};
use rootgrad::tape::{Tape, TapeGuard, CONSTANT};
use rootgrad::{grad, Float, Reverse, Scalar};
use rootgrad_algebra::{
    algebra_solver, solve_root, AlgebraSystem, InvalidInput, SolverConfig, SolverError,
};

// ============================================================
// Test systems
// ============================================================

/// θ - y = 0
struct Shift;

impl<F: Float> AlgebraSystem<F> for Shift {
    fn residual<T: Scalar<Float = F>>(
        &self,
        x: &[T],
        y: &[T],
        _dat: &[F],
        _dat_int: &[i32],
        _msgs: &mut dyn Write,
    ) -> Vec<T> {
        vec![x[0] - y[0]]
    }
}

/// θ² - y = 0
struct SquareRoot;

impl<F: Float> AlgebraSystem<F> for SquareRoot {
    fn residual<T: Scalar<Float = F>>(
        &self,
        x: &[T],
        y: &[T],
        _dat: &[F],
        _dat_int: &[i32],
        _msgs: &mut dyn Write,
    ) -> Vec<T> {
        vec![x[0] * x[0] - y[0]]
    }
}

/// [θ0³ - y0, θ0 θ1 - y1]: θ0 = y0^(1/3), θ1 = y1 / θ0.
struct CubeProduct;

impl AlgebraSystem<f64> for CubeProduct {
    fn residual<T: Scalar<Float = f64>>(
        &self,
        x: &[T],
        y: &[T],
        _dat: &[f64],
        _dat_int: &[i32],
        _msgs: &mut dyn Write,
    ) -> Vec<T> {
        vec![x[0].powi(3) - y[0], x[0] * x[1] - y[1]]
    }
}

/// θ - dat0 · dat_int0 - y = 0, logging every evaluation.
struct Offset;

impl AlgebraSystem<f64> for Offset {
    fn residual<T: Scalar<Float = f64>>(
        &self,
        x: &[T],
        y: &[T],
        dat: &[f64],
        dat_int: &[i32],
        msgs: &mut dyn Write,
    ) -> Vec<T> {
        let _ = writeln!(msgs, "evaluating at {}", x[0]);
        let shift = T::from_f(dat[0] * f64::from(dat_int[0]));
        vec![x[0] - shift - y[0]]
    }
}

/// θ³ - y = 0; `Jf_x` vanishes at θ = 0.
struct Cube;

impl AlgebraSystem<f64> for Cube {
    fn residual<T: Scalar<Float = f64>>(
        &self,
        x: &[T],
        y: &[T],
        _dat: &[f64],
        _dat_int: &[i32],
        _msgs: &mut dyn Write,
    ) -> Vec<T> {
        vec![x[0].powi(3) - y[0]]
    }
}

/// θ² + y = 0 has no real root for y > 0.
struct NoRealRoot;

impl AlgebraSystem<f64> for NoRealRoot {
    fn residual<T: Scalar<Float = f64>>(
        &self,
        x: &[T],
        y: &[T],
        _dat: &[f64],
        _dat_int: &[i32],
        _msgs: &mut dyn Write,
    ) -> Vec<T> {
        vec![x[0] * x[0] + y[0]]
    }
}

/// Returns two residuals for one unknown.
struct TooManyResiduals;

impl AlgebraSystem<f64> for TooManyResiduals {
    fn residual<T: Scalar<Float = f64>>(
        &self,
        x: &[T],
        y: &[T],
        _dat: &[f64],
        _dat_int: &[i32],
        _msgs: &mut dyn Write,
    ) -> Vec<T> {
        vec![x[0] - y[0], x[0] + y[0]]
    }
}

/// [θ0 - y0, 0]: the second unknown never affects the residual.
struct Decoupled;

impl AlgebraSystem<f64> for Decoupled {
    fn residual<T: Scalar<Float = f64>>(
        &self,
        x: &[T],
        y: &[T],
        _dat: &[f64],
        _dat_int: &[i32],
        _msgs: &mut dyn Write,
    ) -> Vec<T> {
        vec![x[0] - y[0], x[1] - x[1]]
    }
}

/// [1e6 (θ0 - y0), 1e-6 (θ1 - y1)]
struct BadlyScaled;

impl AlgebraSystem<f64> for BadlyScaled {
    fn residual<T: Scalar<Float = f64>>(
        &self,
        x: &[T],
        y: &[T],
        _dat: &[f64],
        _dat_int: &[i32],
        _msgs: &mut dyn Write,
    ) -> Vec<T> {
        vec![
            (x[0] - y[0]) * T::from_f(1e6),
            (x[1] - y[1]) * T::from_f(1e-6),
        ]
    }
}

/// θ - y = 0, counting residual evaluations.
#[derive(Default)]
struct Counting {
    calls: Cell<usize>,
}

impl AlgebraSystem<f64> for Counting {
    fn residual<T: Scalar<Float = f64>>(
        &self,
        x: &[T],
        y: &[T],
        _dat: &[f64],
        _dat_int: &[i32],
        _msgs: &mut dyn Write,
    ) -> Vec<T> {
        self.calls.set(self.calls.get() + 1);
        vec![x[0] - y[0]]
    }
}

fn config() -> SolverConfig<f64> {
    SolverConfig::default()
}

fn solve_f64<S: AlgebraSystem<f64>>(system: &S, x0: &[f64], y: &[f64]) -> Vec<f64> {
    algebra_solver(system, x0, y, &[], &[], None, &config()).unwrap()
}

// ============================================================
// Values
// ============================================================

#[test]
fn shift_returns_parameter() {
    let theta = solve_f64(&Shift, &[0.0], &[5.0]);
    assert_eq!(theta.len(), 1);
    assert_relative_eq!(theta[0], 5.0, epsilon = 1e-10);
}

#[test]
fn shift_residual_is_exactly_zero() {
    let report = solve_root(&Shift, &[0.0], &[5.0], &[], &[], None, &config()).unwrap();
    assert_eq!(report.theta, vec![5.0]);
    assert_eq!(report.residual_norm, 0.0);
}

#[test]
fn distant_root_is_reached() {
    let theta = solve_f64(&Shift, &[0.0], &[1e6]);
    assert_relative_eq!(theta[0], 1e6, max_relative = 1e-12);

    let report = solve_root(&Shift, &[0.0], &[1e6], &[], &[], None, &config()).unwrap();
    assert!(report.nfev < 100);
}

#[test]
fn badly_scaled_linear_system() {
    let theta = solve_f64(&BadlyScaled, &[0.0, 0.0], &[2.0, 3.0]);
    assert_relative_eq!(theta[0], 2.0, max_relative = 1e-10);
    assert_relative_eq!(theta[1], 3.0, max_relative = 1e-6);
}

#[test]
fn square_root_of_four() {
    let theta = solve_f64(&SquareRoot, &[1.0], &[4.0]);
    assert_relative_eq!(theta[0], 2.0, epsilon = 1e-8);
}

#[test]
fn square_root_in_single_precision() {
    let config = SolverConfig::<f32>::default();
    let theta: Vec<f32> =
        algebra_solver(&SquareRoot, &[1.0f32], &[9.0f32], &[], &[], None, &config).unwrap();
    assert_relative_eq!(theta[0], 3.0, epsilon = 1e-4);
}

#[test]
fn two_dimensional_root() {
    let theta = solve_f64(&CubeProduct, &[1.0, 1.0], &[8.0, 6.0]);
    assert_relative_eq!(theta[0], 2.0, epsilon = 1e-8);
    assert_relative_eq!(theta[1], 3.0, epsilon = 1e-8);
}

#[test]
fn data_reaches_the_system() {
    let mut log = Vec::new();
    let theta = algebra_solver(
        &Offset,
        &[0.0],
        &[1.0],
        &[0.5],
        &[4],
        Some(&mut log as &mut dyn Write),
        &config(),
    )
    .unwrap();
    assert_relative_eq!(theta[0], 3.0, epsilon = 1e-10);
    assert!(String::from_utf8_lossy(&log).contains("evaluating at"));
}

#[test]
fn repeated_solves_are_identical() {
    let a = solve_f64(&CubeProduct, &[1.0, 1.0], &[8.0, 6.0]);
    let b = solve_f64(&CubeProduct, &[1.0, 1.0], &[8.0, 6.0]);
    assert_eq!(a, b);
}

#[test]
fn starting_at_the_root_is_cheap() {
    let report = solve_root(&Shift, &[5.0], &[5.0], &[], &[], None, &config()).unwrap();
    assert_eq!(report.theta, vec![5.0]);
    assert_eq!(report.residual_norm, 0.0);
    assert_eq!(report.nfev, 1);
    assert!(report.termination.is_converged());
}

#[test]
fn solve_root_reports_statistics() {
    let report = solve_root(&SquareRoot, &[1.0], &[4.0], &[], &[], None, &config()).unwrap();
    assert_relative_eq!(report.theta[0], 2.0, epsilon = 1e-8);
    assert!(report.residual_norm <= 1e-6);
    assert!(report.nfev > 1 && report.nfev < 1000);
    assert!(report.njev >= 1);
    assert!(report.iterations >= 1);
}

// ============================================================
// Gradients through the root
// ============================================================

#[test]
fn shift_gradient_is_one() {
    let g = grad(
        |y: &[Reverse<f64>]| {
            let theta = algebra_solver(&Shift, &[0.0], y, &[], &[], None, &config()).unwrap();
            theta[0]
        },
        &[5.0],
    );
    assert_relative_eq!(g[0], 1.0, epsilon = 1e-12);
}

#[test]
fn square_root_gradient() {
    // dθ/dy = 1 / (2 sqrt(y)) = 0.25 at y = 4.
    let g = grad(
        |y: &[Reverse<f64>]| {
            let theta = algebra_solver(&SquareRoot, &[1.0], y, &[], &[], None, &config()).unwrap();
            theta[0]
        },
        &[4.0],
    );
    assert_relative_eq!(g[0], 0.25, epsilon = 1e-8);
}

#[test]
fn closed_form_sensitivity_of_two_dimensional_root() {
    // θ0 = y0^(1/3), θ1 = y1 / θ0 at y = (8, 6).
    let d0 = grad(
        |y: &[Reverse<f64>]| {
            algebra_solver(&CubeProduct, &[1.0, 1.0], y, &[], &[], None, &config()).unwrap()[0]
        },
        &[8.0, 6.0],
    );
    assert_relative_eq!(d0[0], 1.0 / 12.0, epsilon = 1e-8);
    assert_abs_diff_eq!(d0[1], 0.0, epsilon = 1e-12);

    let d1 = grad(
        |y: &[Reverse<f64>]| {
            algebra_solver(&CubeProduct, &[1.0, 1.0], y, &[], &[], None, &config()).unwrap()[1]
        },
        &[8.0, 6.0],
    );
    assert_relative_eq!(d1[0], -0.125, epsilon = 1e-8);
    assert_relative_eq!(d1[1], 0.5, epsilon = 1e-8);
}

#[test]
fn loss_gradient_matches_finite_differences() {
    let loss = |theta: &[f64]| theta[0] * theta[0] + 3.0 * theta[1];
    let y = [8.0, 6.0];

    let g = grad(
        |y: &[Reverse<f64>]| {
            let theta =
                algebra_solver(&CubeProduct, &[1.0, 1.0], y, &[], &[], None, &config()).unwrap();
            theta[0] * theta[0] + theta[1] * 3.0
        },
        &y,
    );

    let h = 1e-5;
    for j in 0..2 {
        let mut yp = y;
        let mut ym = y;
        yp[j] += h;
        ym[j] -= h;
        let fd = (loss(&solve_f64(&CubeProduct, &[1.0, 1.0], &yp))
            - loss(&solve_f64(&CubeProduct, &[1.0, 1.0], &ym)))
            / (2.0 * h);
        assert_relative_eq!(g[j], fd, epsilon = 1e-6);
    }
    assert_relative_eq!(g[0], 1.0 / 3.0 - 0.375, epsilon = 1e-8);
    assert_relative_eq!(g[1], 1.5, epsilon = 1e-8);
}

#[test]
fn parameter_used_outside_the_solver() {
    // L = θ(y) · y with θ = y: dL/dy = 2y.
    let g = grad(
        |y: &[Reverse<f64>]| {
            let theta = algebra_solver(&Shift, &[0.0], y, &[], &[], None, &config()).unwrap();
            theta[0] * y[0]
        },
        &[5.0],
    );
    assert_relative_eq!(g[0], 10.0, epsilon = 1e-9);
}

#[test]
fn parameters_computed_on_the_tape() {
    // y = 2u, θ = sqrt(y): dθ/du = 1 / sqrt(2u).
    let g = grad(
        |u: &[Reverse<f64>]| {
            let y = [u[0] * 2.0];
            algebra_solver(&SquareRoot, &[1.0], &y, &[], &[], None, &config()).unwrap()[0]
        },
        &[2.0],
    );
    assert_relative_eq!(g[0], 0.5, epsilon = 1e-8);
}

#[test]
fn tracked_parameters_push_one_node() {
    let mut tape = Tape::<f64>::new();
    let (idx, val) = tape.new_variable(8.0);
    let (idx1, val1) = tape.new_variable(6.0);
    let y = [Reverse::from_tape(val, idx), Reverse::from_tape(val1, idx1)];

    let theta = {
        let _guard = TapeGuard::new(&mut tape);
        algebra_solver(&CubeProduct, &[1.0, 1.0], &y, &[], &[], None, &config()).unwrap()
    };

    assert_eq!(tape.num_implicit_nodes(), 1);
    assert_eq!(tape.num_variables(), 4);
    assert!(theta.iter().all(Reverse::is_tracked));
    assert_eq!(theta[1].index(), theta[0].index() + 1);

    let node = &tape.implicit_nodes()[0];
    assert_eq!(node.params(), &[idx, idx1]);
    assert_eq!(node.num_outputs(), 2);

    let adjoints = tape.reverse(theta[1].index());
    assert_relative_eq!(adjoints[idx as usize], -0.125, epsilon = 1e-8);
    assert_relative_eq!(adjoints[idx1 as usize], 0.5, epsilon = 1e-8);
}

#[test]
fn mixed_tracked_and_constant_parameters() {
    let mut tape = Tape::<f64>::new();
    let (idx, val) = tape.new_variable(8.0);
    let y = [Reverse::from_tape(val, idx), Reverse::constant(6.0)];

    let theta = {
        let _guard = TapeGuard::new(&mut tape);
        algebra_solver(&CubeProduct, &[1.0, 1.0], &y, &[], &[], None, &config()).unwrap()
    };

    assert_eq!(tape.num_implicit_nodes(), 1);
    assert_eq!(tape.implicit_nodes()[0].params(), &[idx, CONSTANT]);

    let adjoints = tape.reverse(theta[1].index());
    assert_eq!(adjoints.len(), 3);
    assert_relative_eq!(adjoints[idx as usize], -0.125, epsilon = 1e-8);

    // Same derivative through grad: θ1 = 6 / y0^(1/3).
    let g = grad(
        |u: &[Reverse<f64>]| {
            let y = [u[0], Reverse::constant(6.0)];
            algebra_solver(&CubeProduct, &[1.0, 1.0], &y, &[], &[], None, &config()).unwrap()[1]
        },
        &[8.0],
    );
    assert_relative_eq!(g[0], -0.125, epsilon = 1e-8);
}

#[test]
fn distant_root_gradient() {
    let g = grad(
        |y: &[Reverse<f64>]| {
            algebra_solver(&Shift, &[0.0], y, &[], &[], None, &config()).unwrap()[0]
        },
        &[1e6],
    );
    assert_relative_eq!(g[0], 1.0, epsilon = 1e-12);
}

#[test]
#[should_panic(expected = "without an active tape")]
fn tracked_parameters_need_a_tape() {
    let y = [Reverse::<f64>::from_tape(4.0, 0)];
    let _ = algebra_solver(&SquareRoot, &[1.0], &y, &[], &[], None, &config());
}

#[test]
fn constant_parameters_push_no_node() {
    let mut tape = Tape::<f64>::new();
    let y = [Reverse::constant(4.0)];

    let theta = {
        let _guard = TapeGuard::new(&mut tape);
        algebra_solver(&SquareRoot, &[1.0], &y, &[], &[], None, &config()).unwrap()
    };

    assert!(!theta[0].is_tracked());
    assert_relative_eq!(theta[0].value(), 2.0, epsilon = 1e-8);
    assert_eq!(tape.num_implicit_nodes(), 0);
}

// ============================================================
// Failures
// ============================================================

#[test]
fn budget_of_one_is_exhausted() {
    let config = config().with_max_num_steps(1);
    let err = algebra_solver(&SquareRoot, &[1.0], &[4.0], &[], &[], None, &config).unwrap_err();
    assert!(matches!(
        err,
        SolverError::NonConvergence {
            max_num_steps: 1,
            ..
        }
    ));
}

#[test]
fn invalid_config_never_calls_the_system() {
    let bad = [
        config().with_relative_tolerance(0.0),
        config().with_function_tolerance(0.0),
        config().with_function_tolerance(-1e-6),
        config().with_max_num_steps(0),
    ];
    for config in &bad {
        let system = Counting::default();
        let err = algebra_solver(&system, &[1.0], &[5.0], &[], &[], None, config).unwrap_err();
        assert!(err.is_invalid_input(), "{err}");
        assert_eq!(system.calls.get(), 0);
    }
}

#[test]
fn empty_vectors_rejected() {
    let err = algebra_solver(&Shift, &[], &[5.0], &[], &[], None, &config()).unwrap_err();
    assert_eq!(
        err,
        SolverError::InvalidInput(InvalidInput::EmptyVector {
            name: "initial guess"
        })
    );

    let err = algebra_solver::<f64, f64, _>(&Shift, &[1.0], &[], &[], &[], None, &config()).unwrap_err();
    assert_eq!(
        err,
        SolverError::InvalidInput(InvalidInput::EmptyVector {
            name: "parameter vector"
        })
    );
}

#[test]
fn non_finite_inputs_rejected() {
    let system = Counting::default();

    let err = algebra_solver(&system, &[f64::NAN], &[5.0], &[], &[], None, &config()).unwrap_err();
    assert!(matches!(
        err,
        SolverError::InvalidInput(InvalidInput::NonFinite {
            name: "initial guess",
            index: 0,
            ..
        })
    ));

    let err = algebra_solver(&system, &[1.0], &[5.0, f64::INFINITY], &[], &[], None, &config())
        .unwrap_err();
    assert!(matches!(
        err,
        SolverError::InvalidInput(InvalidInput::NonFinite {
            name: "parameter vector",
            index: 1,
            ..
        })
    ));

    let err =
        algebra_solver(&system, &[1.0], &[5.0], &[0.0, f64::NAN], &[], None, &config()).unwrap_err();
    assert!(matches!(
        err,
        SolverError::InvalidInput(InvalidInput::NonFinite {
            name: "continuous data",
            index: 1,
            ..
        })
    ));
    assert_eq!(system.calls.get(), 0);
}

#[test]
fn wrong_residual_length_is_reported() {
    let err =
        algebra_solver(&TooManyResiduals, &[1.0], &[5.0], &[], &[], None, &config()).unwrap_err();
    assert_eq!(
        err,
        SolverError::DimensionMismatch {
            expected: 1,
            actual: 2
        }
    );
}

#[test]
fn stalled_solver_is_not_a_root() {
    // Jf_x = 0 at the start, so the iteration cannot move.
    let err = algebra_solver(&Cube, &[0.0], &[1.0], &[], &[], None, &config()).unwrap_err();
    match err {
        SolverError::UnacceptableRoot {
            norm,
            function_tolerance,
        } => {
            assert_relative_eq!(norm, 1.0);
            assert_relative_eq!(function_tolerance, 1e-6);
        }
        other => panic!("expected UnacceptableRoot, got {other:?}"),
    }
}

#[test]
fn no_real_root_fails() {
    let err = algebra_solver(&NoRealRoot, &[1.0], &[1.0], &[], &[], None, &config()).unwrap_err();
    assert!(matches!(
        err,
        SolverError::UnacceptableRoot { .. } | SolverError::NonConvergence { .. }
    ));
}

#[test]
fn singular_jacobian_only_matters_for_gradients() {
    let theta = solve_f64(&Decoupled, &[1.0, 1.0], &[5.0]);
    assert_relative_eq!(theta[0], 5.0, epsilon = 1e-10);

    let mut tape = Tape::<f64>::new();
    let (idx, val) = tape.new_variable(5.0);
    let y = [Reverse::from_tape(val, idx)];
    let err = {
        let _guard = TapeGuard::new(&mut tape);
        algebra_solver(&Decoupled, &[1.0, 1.0], &y, &[], &[], None, &config()).unwrap_err()
    };
    assert_eq!(err, SolverError::SingularJacobian);
    assert_eq!(tape.num_implicit_nodes(), 0);
}
