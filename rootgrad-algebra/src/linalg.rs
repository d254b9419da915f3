//! Dense linear algebra on row-major `Vec<Vec<F>>` matrices.

use num_traits::Float;

/// LU factorization with partial pivoting.
///
/// L (unit diagonal, implicit) is stored below the diagonal and U on and
/// above it, plus the row permutation.
pub struct LuFactors<F> {
    lu: Vec<Vec<F>>,
    /// `perm[i]` is the original row index for factored row `i`.
    perm: Vec<usize>,
}

impl<F: Float> LuFactors<F> {
    pub fn dim(&self) -> usize {
        self.perm.len()
    }

    /// Solve `A x = b` with the stored factors.
    // Explicit indexing is clearer for forward/back substitution with permuted indices
    #[allow(clippy::needless_range_loop)]
    pub fn solve(&self, b: &[F]) -> Vec<F> {
        let n = self.dim();
        debug_assert_eq!(b.len(), n);

        let mut y: Vec<F> = self.perm.iter().map(|&p| b[p]).collect();

        // L y' = P b, unit diagonal
        for i in 1..n {
            for j in 0..i {
                y[i] = y[i] - self.lu[i][j] * y[j];
            }
        }

        // U x = y'
        let mut x = vec![F::zero(); n];
        for i in (0..n).rev() {
            let mut sum = y[i];
            for j in (i + 1)..n {
                sum = sum - self.lu[i][j] * x[j];
            }
            x[i] = sum / self.lu[i][i];
        }
        x
    }
}

/// Factorize an `n × n` matrix.
///
/// Returns `None` if a pivot is zero relative to the largest entry of `a`,
/// or if `a` contains non-finite values.
// Explicit indexing is clearer for pivoted LU: row/col indices drive pivot search and elimination
#[allow(clippy::needless_range_loop)]
pub fn lu_factor<F: Float>(a: &[Vec<F>]) -> Option<LuFactors<F>> {
    let n = a.len();
    debug_assert!(a.iter().all(|row| row.len() == n));

    let scale = a
        .iter()
        .flat_map(|row| row.iter())
        .fold(F::zero(), |m, &v| m.max(v.abs()));
    if !scale.is_finite() || scale == F::zero() {
        return None;
    }
    let n_f = F::from(n).unwrap_or_else(F::one);
    let tiny = F::epsilon() * n_f * scale;

    let mut lu: Vec<Vec<F>> = a.to_vec();
    let mut perm: Vec<usize> = (0..n).collect();

    for col in 0..n {
        let mut max_row = col;
        let mut max_val = lu[col][col].abs();
        for row in (col + 1)..n {
            let v = lu[row][col].abs();
            if v > max_val {
                max_val = v;
                max_row = row;
            }
        }

        if max_val <= tiny {
            return None;
        }

        if max_row != col {
            lu.swap(col, max_row);
            perm.swap(col, max_row);
        }

        let pivot = lu[col][col];
        for row in (col + 1)..n {
            let factor = lu[row][col] / pivot;
            lu[row][col] = factor;
            for j in (col + 1)..n {
                let val = lu[col][j];
                lu[row][j] = lu[row][j] - factor * val;
            }
        }
    }

    Some(LuFactors { lu, perm })
}

/// Solve `A x = b`. Returns `None` if `A` is singular.
pub fn lu_solve<F: Float>(a: &[Vec<F>], b: &[F]) -> Option<Vec<F>> {
    Some(lu_factor(a)?.solve(b))
}

/// Solve `A X = B` for an `n × k` right-hand side, factorizing `A` once.
///
/// Returns `X` as an `n × k` row-major matrix, or `None` if `A` is singular.
pub fn lu_solve_matrix<F: Float>(a: &[Vec<F>], b: &[Vec<F>]) -> Option<Vec<Vec<F>>> {
    let factors = lu_factor(a)?;
    let n = factors.dim();
    let k = b.first().map_or(0, Vec::len);

    let mut x = vec![vec![F::zero(); k]; n];
    let mut col = vec![F::zero(); n];
    for j in 0..k {
        for (c, row) in col.iter_mut().zip(b) {
            *c = row[j];
        }
        for (row, v) in x.iter_mut().zip(factors.solve(&col)) {
            row[j] = v;
        }
    }
    Some(x)
}

/// Euclidean norm computed with scaling so that large or tiny entries do
/// not overflow or underflow the sum of squares.
pub fn stable_norm<F: Float>(v: &[F]) -> F {
    let scale = v.iter().fold(F::zero(), |m, &x| m.max(x.abs()));
    if scale == F::zero() || !scale.is_finite() {
        // NaN propagates through the fold as the other operand; recover it.
        if v.iter().any(|x| x.is_nan()) {
            return F::nan();
        }
        return scale;
    }
    let sum = v.iter().fold(F::zero(), |acc, &x| {
        let r = x / scale;
        acc + r * r
    });
    scale * sum.sqrt()
}

/// `A x` for a row-major `m × n` matrix.
pub fn mat_vec<F: Float>(a: &[Vec<F>], x: &[F]) -> Vec<F> {
    a.iter()
        .map(|row| row.iter().zip(x).fold(F::zero(), |s, (&r, &v)| s + r * v))
        .collect()
}

/// `Aᵀ x` for a row-major `m × n` matrix.
pub fn mat_t_vec<F: Float>(a: &[Vec<F>], x: &[F]) -> Vec<F> {
    let n = a.first().map_or(0, Vec::len);
    let mut out = vec![F::zero(); n];
    for (row, &xi) in a.iter().zip(x) {
        for (o, &r) in out.iter_mut().zip(row) {
            *o = *o + r * xi;
        }
    }
    out
}
