//! Module containing miscellaneous utility functions.

use crate::imports::*;

/// Default relative tolerance for float comparisons
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Returns true when `val1` and `val2` agree to within `epsilon`, either
/// relative to their sum or as an absolute difference
pub fn almost_eq(val1: f64, val2: f64, epsilon: Option<f64>) -> bool {
    let epsilon = epsilon.unwrap_or(DEFAULT_EPSILON);
    ((val2 - val1) / (val1 + val2)).abs() < epsilon || (val2 - val1).abs() < epsilon
}

pub fn almost_eq_uom<D, U>(
    val1: &uom::si::Quantity<D, U, f64>,
    val2: &uom::si::Quantity<D, U, f64>,
    epsilon: Option<f64>,
) -> bool
where
    D: uom::si::Dimension + ?Sized,
    U: uom::si::Units<f64> + ?Sized,
{
    almost_eq(val1.value, val2.value, epsilon)
}

/// Clamps a percentage into [0, 100], mapping NaN to 0
pub fn clamp_pct(pct: f64) -> f64 {
    if pct.is_nan() {
        0.0
    } else {
        pct.clamp(0.0, 100.0)
    }
}
