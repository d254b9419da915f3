//! Powell's hybrid method for square nonlinear systems.
//!
//! Each iteration takes a dogleg step inside a trust region measured in
//! variables scaled by the Jacobian column norms. The Gauss-Newton step
//! comes from an LU solve of the current Jacobian. The exact Jacobian is
//! evaluated at the start and after two consecutive failed steps; in between
//! it is corrected by Broyden rank-one updates, as in MINPACK `hybrj`.

use std::fmt;

use num_traits::Float;

use crate::functor::SystemFunctor;
use crate::linalg::{lu_solve, mat_t_vec, mat_vec, stable_norm};

/// Configuration for [`hybrid`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HybridConfig<F> {
    /// Stop when the trust radius falls below `xtol` times the scaled norm
    /// of `x` (default: 1e-10).
    pub xtol: F,
    /// Maximum number of residual evaluations (default: 1000).
    pub maxfev: usize,
    /// Initial step bound, as a multiple of the scaled norm of `x0`
    /// (default: 100).
    pub factor: F,
}

impl Default for HybridConfig<f64> {
    fn default() -> Self {
        HybridConfig {
            xtol: 1e-10,
            maxfev: 1000,
            factor: 100.0,
        }
    }
}

impl Default for HybridConfig<f32> {
    fn default() -> Self {
        HybridConfig {
            xtol: 1e-6,
            maxfev: 1000,
            factor: 100.0,
        }
    }
}

/// Why [`hybrid`] stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Trust radius fell below `xtol` relative to the scaled norm of `x`.
    Converged,
    /// The residual is exactly zero.
    ZeroResidual,
    /// `maxfev` residual evaluations were used.
    TooManyFunctionEvaluations,
    /// `xtol` is too small: no further improvement of `x` is possible.
    ToleranceTooSmall,
    /// Five consecutive fresh-Jacobian iterations without progress.
    NotMakingProgressJacobian,
    /// Ten consecutive iterations without progress.
    NotMakingProgressIterations,
    /// The residual length differs from the number of unknowns.
    DimensionMismatch { actual: usize },
    /// The residual or its Jacobian is not finite at the starting point.
    NonFinite,
}

impl Termination {
    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::Converged | Termination::ZeroResidual)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged => write!(f, "relative step below tolerance"),
            Termination::ZeroResidual => write!(f, "residual is zero"),
            Termination::TooManyFunctionEvaluations => {
                write!(f, "maximum function evaluations reached")
            }
            Termination::ToleranceTooSmall => write!(f, "tolerance too small"),
            Termination::NotMakingProgressJacobian => {
                write!(f, "not making progress (jacobian evaluations)")
            }
            Termination::NotMakingProgressIterations => {
                write!(f, "not making progress (iterations)")
            }
            Termination::DimensionMismatch { actual } => {
                write!(f, "residual has dimension {actual}")
            }
            Termination::NonFinite => write!(f, "non-finite residual or jacobian"),
        }
    }
}

/// Result of a [`hybrid`] run.
#[derive(Debug, Clone)]
pub struct HybridResult<F> {
    /// Final iterate.
    pub x: Vec<F>,
    /// Residual at `x`.
    pub fvec: Vec<F>,
    /// Euclidean norm of `fvec`.
    pub fnorm: F,
    /// Number of accepted steps.
    pub iterations: usize,
    /// Residual evaluations, including the one at `x0`.
    pub nfev: usize,
    /// Jacobian evaluations.
    pub njev: usize,
    pub termination: Termination,
}

fn scaled_norm<F: Float>(diag: &[F], v: &[F]) -> F {
    let dv: Vec<F> = diag.iter().zip(v).map(|(&d, &x)| d * x).collect();
    stable_norm(&dv)
}

fn column_norms<F: Float>(jac: &[Vec<F>], n: usize) -> Vec<F> {
    (0..n)
        .map(|j| {
            let col: Vec<F> = jac.iter().map(|row| row[j]).collect();
            stable_norm(&col)
        })
        .collect()
}

fn all_finite<F: Float>(jac: &[Vec<F>]) -> bool {
    jac.iter().flat_map(|row| row.iter()).all(|v| v.is_finite())
}

/// Dogleg step for the linear model `f + J p` within `||D p|| <= delta`.
fn dogleg<F: Float>(jac: &[Vec<F>], fvec: &[F], diag: &[F], delta: F) -> Vec<F> {
    let n = diag.len();
    let neg_f: Vec<F> = fvec.iter().map(|&v| -v).collect();
    let gauss_newton = lu_solve(jac, &neg_f);

    // Work in scaled variables z = D p.
    let gn_z = gauss_newton
        .as_ref()
        .map(|p| p.iter().zip(diag).map(|(&v, &d)| v * d).collect::<Vec<F>>());
    if let Some(z) = &gn_z {
        if stable_norm(z) <= delta {
            return gauss_newton.unwrap_or_else(|| vec![F::zero(); n]);
        }
    }

    // Scaled gradient of 0.5 ||f||²: g = D⁻¹ Jᵀ f.
    let g: Vec<F> = mat_t_vec(jac, fvec)
        .iter()
        .zip(diag)
        .map(|(&v, &d)| v / d)
        .collect();
    let gnorm = stable_norm(&g);

    let z: Vec<F> = if gnorm == F::zero() {
        match &gn_z {
            // Gauss-Newton direction truncated to the boundary.
            Some(gz) => {
                let s = delta / stable_norm(gz);
                gz.iter().map(|&v| v * s).collect()
            }
            None => return vec![F::zero(); n],
        }
    } else {
        // Cauchy point: minimizer of the model along -g.
        let dinv_g: Vec<F> = g.iter().zip(diag).map(|(&v, &d)| v / d).collect();
        let jg_norm = stable_norm(&mat_vec(jac, &dinv_g));
        let sd_len = if jg_norm == F::zero() {
            F::infinity()
        } else {
            gnorm * (gnorm / jg_norm) * (gnorm / jg_norm)
        };

        match &gn_z {
            Some(gz) if sd_len < delta => {
                let sd: Vec<F> = g.iter().map(|&v| -v * (sd_len / gnorm)).collect();
                let d: Vec<F> = gz.iter().zip(&sd).map(|(&a, &b)| a - b).collect();
                let a = d.iter().fold(F::zero(), |s, &v| s + v * v);
                let b = (F::one() + F::one())
                    * sd.iter().zip(&d).fold(F::zero(), |s, (&u, &v)| s + u * v);
                let c = sd.iter().fold(F::zero(), |s, &v| s + v * v) - delta * delta;
                let four = F::from(4.0).unwrap_or_else(F::one);
                let disc = (b * b - four * a * c).max(F::zero()).sqrt();
                let tau = if b >= F::zero() {
                    -(c + c) / (b + disc)
                } else {
                    (disc - b) / (a + a)
                };
                sd.iter().zip(&d).map(|(&s, &v)| s + tau * v).collect()
            }
            _ => {
                let len = sd_len.min(delta);
                g.iter().map(|&v| -v * (len / gnorm)).collect()
            }
        }
    };

    z.iter().zip(diag).map(|(&v, &d)| v / d).collect()
}

/// Rank-one secant correction `J += s (D² p)ᵀ / ||D p||²`.
fn broyden_update<F: Float>(jac: &mut [Vec<F>], secant: &[F], diag: &[F], p: &[F], pnorm: F) {
    let w: Vec<F> = diag
        .iter()
        .zip(p)
        .map(|(&d, &v)| d * ((d * v) / pnorm) / pnorm)
        .collect();
    for (row, &s) in jac.iter_mut().zip(secant) {
        for (a, &wj) in row.iter_mut().zip(&w) {
            *a = *a + s * wj;
        }
    }
}

/// Find a root of `fun` starting from `x0` with Powell's hybrid method.
///
/// Never panics on bad residuals: a residual of the wrong length or a
/// non-finite start is reported through [`Termination`].
pub fn hybrid<F: Float, S: SystemFunctor<F>>(
    fun: &mut S,
    x0: &[F],
    config: &HybridConfig<F>,
) -> HybridResult<F> {
    let n = x0.len();
    let p1 = F::from(0.1).unwrap_or_else(F::epsilon);
    let p5 = F::from(0.5).unwrap_or_else(F::epsilon);
    let p001 = F::from(1e-3).unwrap_or_else(F::epsilon);
    let p0001 = F::from(1e-4).unwrap_or_else(F::epsilon);

    let mut x = x0.to_vec();
    let mut fvec = fun.value(&x);
    let mut nfev = 1usize;
    let mut njev = 0usize;
    let mut iterations = 0usize;

    macro_rules! finish {
        ($termination:expr, $fnorm:expr) => {{
            let termination = $termination;
            log::debug!(
                "hybrid solver stopped after {} iterations ({} evaluations, {} jacobians): {}",
                iterations,
                nfev,
                njev,
                termination
            );
            return HybridResult {
                x,
                fvec,
                fnorm: $fnorm,
                iterations,
                nfev,
                njev,
                termination,
            };
        }};
    }

    if fvec.len() != n {
        let actual = fvec.len();
        finish!(Termination::DimensionMismatch { actual }, F::nan());
    }
    let mut fnorm = stable_norm(&fvec);
    if !fnorm.is_finite() {
        finish!(Termination::NonFinite, fnorm);
    }
    if fnorm == F::zero() {
        finish!(Termination::ZeroResidual, fnorm);
    }

    let mut jac = fun.jacobian(&x);
    njev += 1;
    if !all_finite(&jac) {
        finish!(Termination::NonFinite, fnorm);
    }

    let mut diag: Vec<F> = column_norms(&jac, n)
        .into_iter()
        .map(|d| if d == F::zero() { F::one() } else { d })
        .collect();
    let mut xnorm = scaled_norm(&diag, &x);
    let mut delta = config.factor * xnorm;
    if delta == F::zero() {
        delta = config.factor;
    }

    let mut first = true;
    let mut jeval = true;
    let (mut ncsuc, mut ncfail, mut nslow1, mut nslow2) = (0usize, 0usize, 0usize, 0usize);

    loop {
        let p = dogleg(&jac, &fvec, &diag, delta);
        let pnorm = scaled_norm(&diag, &p);
        if first {
            delta = delta.min(pnorm);
            first = false;
        }

        let x_trial: Vec<F> = x.iter().zip(&p).map(|(&a, &b)| a + b).collect();
        let f_trial = fun.value(&x_trial);
        nfev += 1;
        if f_trial.len() != n {
            let actual = f_trial.len();
            finish!(Termination::DimensionMismatch { actual }, fnorm);
        }
        let fnorm1 = stable_norm(&f_trial);

        // Actual vs. predicted relative reduction of the residual norm.
        let actred = if fnorm1 < fnorm {
            F::one() - (fnorm1 / fnorm).powi(2)
        } else {
            -F::one()
        };
        let model: Vec<F> = mat_vec(&jac, &p)
            .iter()
            .zip(&fvec)
            .map(|(&jp, &f)| jp + f)
            .collect();
        let temp = stable_norm(&model);
        // Secant mismatch f(x + p) - (f + J p), taken before fvec moves.
        let secant: Vec<F> = f_trial.iter().zip(&model).map(|(&a, &b)| a - b).collect();
        let prered = if temp < fnorm {
            F::one() - (temp / fnorm).powi(2)
        } else {
            F::zero()
        };
        let ratio = if prered > F::zero() {
            actred / prered
        } else {
            F::zero()
        };

        if ratio < p1 {
            ncsuc = 0;
            ncfail += 1;
            delta = p5 * delta;
        } else {
            ncfail = 0;
            ncsuc += 1;
            if ratio >= p5 || ncsuc > 1 {
                delta = delta.max(pnorm / p5);
            }
            if (ratio - F::one()).abs() <= p1 {
                delta = pnorm / p5;
            }
        }

        let accepted = ratio >= p0001;
        if accepted {
            x = x_trial;
            fvec = f_trial;
            fnorm = fnorm1;
            xnorm = scaled_norm(&diag, &x);
            iterations += 1;
        }
        log::trace!(
            "hybrid iteration: |f| = {:?}, ratio = {:?}, delta = {:?}, accepted = {}, failures = {}",
            fnorm.to_f64(),
            ratio.to_f64(),
            delta.to_f64(),
            accepted,
            ncfail
        );

        nslow1 += 1;
        if actred >= p001 {
            nslow1 = 0;
        }
        if jeval {
            nslow2 += 1;
        }
        if actred >= p1 {
            nslow2 = 0;
        }

        if fnorm == F::zero() {
            finish!(Termination::ZeroResidual, fnorm);
        }
        if delta <= config.xtol * xnorm {
            finish!(Termination::Converged, fnorm);
        }
        if nfev >= config.maxfev {
            finish!(Termination::TooManyFunctionEvaluations, fnorm);
        }
        if p1 * (p1 * delta).max(pnorm) <= F::epsilon() * xnorm {
            finish!(Termination::ToleranceTooSmall, fnorm);
        }
        if nslow2 == 5 {
            finish!(Termination::NotMakingProgressJacobian, fnorm);
        }
        if nslow1 == 10 {
            finish!(Termination::NotMakingProgressIterations, fnorm);
        }

        if ncfail == 2 {
            let fresh = fun.jacobian(&x);
            njev += 1;
            if !all_finite(&fresh) {
                finish!(Termination::NonFinite, fnorm);
            }
            jac = fresh;
            for (d, c) in diag.iter_mut().zip(column_norms(&jac, n)) {
                *d = d.max(c);
            }
            jeval = true;
        } else {
            if fnorm1.is_finite() && pnorm > F::zero() {
                broyden_update(&mut jac, &secant, &diag, &p, pnorm);
            }
            jeval = false;
        }
    }
}
