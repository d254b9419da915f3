use std::fmt::{self, Display};

use crate::tape::{self, TapeThreadLocal, CONSTANT};
use crate::Float;

/// Reverse-mode AD variable.
///
/// Just a value and a tape index. `Copy` because the tape lives in a
/// thread-local, not inside this struct.
#[derive(Clone, Copy, Debug)]
pub struct Reverse<F: Float> {
    pub(crate) value: F,
    pub(crate) index: u32,
}

impl<F: Float> Reverse<F> {
    /// Create a constant (not tracked on tape).
    #[inline]
    pub fn constant(value: F) -> Self {
        Reverse {
            value,
            index: CONSTANT,
        }
    }

    /// Create a reverse variable from a tape allocation.
    #[inline]
    pub fn from_tape(value: F, index: u32) -> Self {
        Reverse { value, index }
    }

    /// Get the tape index. [`CONSTANT`] for untracked values.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Whether this value is recorded on a tape.
    #[inline]
    pub fn is_tracked(&self) -> bool {
        self.index != CONSTANT
    }
}

impl<F: Float + TapeThreadLocal> Reverse<F> {
    /// Record `f(self)` with precomputed derivative `f'(self)`.
    #[inline]
    fn unary(self, f_val: F, f_deriv: F) -> Self {
        if self.index == CONSTANT {
            return Reverse::constant(f_val);
        }
        let index = tape::with_active_tape(|t| t.push_unary(self.index, f_deriv));
        Reverse {
            value: f_val,
            index,
        }
    }

    #[inline]
    pub fn sqrt(self) -> Self {
        let s = self.value.sqrt();
        self.unary(s, F::one() / (s + s))
    }

    #[inline]
    pub fn powi(self, n: i32) -> Self {
        let val = self.value.powi(n);
        let coeff = F::from_i32(n).unwrap_or_else(F::nan);
        self.unary(val, coeff * self.value.powi(n - 1))
    }

    #[inline]
    pub fn powf(self, n: F) -> Self {
        let val = self.value.powf(n);
        self.unary(val, n * self.value.powf(n - F::one()))
    }

    #[inline]
    pub fn exp(self) -> Self {
        let e = self.value.exp();
        self.unary(e, e)
    }

    #[inline]
    pub fn ln(self) -> Self {
        self.unary(self.value.ln(), F::one() / self.value)
    }

    #[inline]
    pub fn sin(self) -> Self {
        self.unary(self.value.sin(), self.value.cos())
    }

    #[inline]
    pub fn cos(self) -> Self {
        self.unary(self.value.cos(), -self.value.sin())
    }

    #[inline]
    pub fn tanh(self) -> Self {
        let t = self.value.tanh();
        self.unary(t, F::one() - t * t)
    }

    #[inline]
    pub fn abs(self) -> Self {
        self.unary(self.value.abs(), self.value.signum())
    }
}

impl<F: Float> Display for Reverse<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl<F: Float> Default for Reverse<F> {
    fn default() -> Self {
        Reverse::constant(F::zero())
    }
}
