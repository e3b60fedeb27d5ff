//! Convergence-clamped gas transfer between two volumes.
//!
//! Every reservoir pair in the brake models moves gas with the same recipe:
//! take a candidate pressure step from a rate, then clamp it so the two
//! pressures meet at their volume-weighted equilibrium instead of crossing.
//! The resulting pressures are never further apart than before the transfer.

/// Clamps a transfer in which `source` falls by `dp` while `receiver` rises by
/// `dp * ratio`, where `ratio` is source volume over receiver volume.
///
/// Returns the clamped, non-negative `dp`.
pub fn equalizing_drop(source_psi: f64, receiver_psi: f64, ratio: f64, dp: f64) -> f64 {
    if source_psi <= receiver_psi || !(dp > 0.0) {
        return 0.0;
    }
    if source_psi - dp < receiver_psi + dp * ratio {
        (source_psi - receiver_psi) / (1.0 + ratio)
    } else {
        dp
    }
}

/// Clamps a transfer in which `receiver` rises by `dp` while `source` falls by
/// `dp * ratio`, where `ratio` is receiver volume over source volume.
///
/// Returns the clamped, non-negative `dp`.
pub fn equalizing_rise(source_psi: f64, receiver_psi: f64, ratio: f64, dp: f64) -> f64 {
    if source_psi <= receiver_psi || !(dp > 0.0) {
        return 0.0;
    }
    if receiver_psi + dp > source_psi - dp * ratio {
        (source_psi - receiver_psi) / (1.0 + ratio)
    } else {
        dp
    }
}

/// Applies [equalizing_drop] and returns the source pressure drop
pub fn transfer_drop(source_psi: &mut f64, receiver_psi: &mut f64, ratio: f64, dp: f64) -> f64 {
    let dp = equalizing_drop(*source_psi, *receiver_psi, ratio, dp);
    *source_psi -= dp;
    *receiver_psi += dp * ratio;
    dp
}

/// Applies [equalizing_rise] and returns the receiver pressure rise
pub fn transfer_rise(source_psi: &mut f64, receiver_psi: &mut f64, ratio: f64, dp: f64) -> f64 {
    let dp = equalizing_rise(*source_psi, *receiver_psi, ratio, dp);
    *source_psi -= dp * ratio;
    *receiver_psi += dp;
    dp
}
