//! Argument checks shared by the solver entry points.

use rootgrad::Float;

use crate::error::InvalidInput;

#[inline]
pub(crate) fn as_f64<F: Float>(value: F) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

pub fn check_nonzero_size<T>(name: &'static str, v: &[T]) -> Result<(), InvalidInput> {
    if v.is_empty() {
        return Err(InvalidInput::EmptyVector { name });
    }
    Ok(())
}

/// Fails on the first NaN or infinite entry.
pub fn check_finite<F: Float>(name: &'static str, v: &[F]) -> Result<(), InvalidInput> {
    match v.iter().position(|x| !x.is_finite()) {
        Some(index) => Err(InvalidInput::NonFinite {
            name,
            index,
            value: as_f64(v[index]),
        }),
        None => Ok(()),
    }
}

/// Fails unless `value > 0` (NaN fails).
pub fn check_positive<F: Float>(name: &'static str, value: F) -> Result<(), InvalidInput> {
    if value > F::zero() {
        Ok(())
    } else {
        Err(InvalidInput::NonPositive {
            name,
            value: as_f64(value),
        })
    }
}
