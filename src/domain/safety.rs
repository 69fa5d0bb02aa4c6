//! Safety bounds for candidate amounts
//!
//! Bounds the search range so neither venue leaves its safe utilization
//! window, and locates the amounts at which a venue lands exactly on its
//! kink. The rate curve is non-smooth at the kink, so uniform grids can
//! miss the true optimum near it; kink amounts are injected into the
//! candidate set as mandatory points.

use crate::domain::snapshot::PoolSnapshot;

/// Maximum amount withdrawable from a venue while keeping its utilization
/// at or below `max_safe_util`.
pub fn max_withdrawable(pool: &PoolSnapshot, max_safe_util: f64) -> f64 {
    if max_safe_util <= 0.0 {
        return 0.0;
    }
    (pool.total_supplied - pool.total_borrowed() / max_safe_util).max(0.0)
}

/// Maximum amount depositable into a venue while keeping its utilization
/// at or above `min_safe_util`. Unbounded when no floor is set.
pub fn max_depositable(pool: &PoolSnapshot, min_safe_util: f64) -> f64 {
    if min_safe_util <= 0.0 {
        return f64::INFINITY;
    }
    (pool.total_borrowed() / min_safe_util - pool.total_supplied).max(0.0)
}

/// Usable search range for an ordered (source, dest) pair: the held
/// balance capped by both venues' safety bounds, clipped to >= 0.
pub fn usable_range(
    balance: f64,
    from: &PoolSnapshot,
    to: &PoolSnapshot,
    min_safe_util: f64,
    max_safe_util: f64,
) -> f64 {
    balance
        .min(max_withdrawable(from, max_safe_util))
        .min(max_depositable(to, min_safe_util))
        .max(0.0)
}

/// Amounts that push either venue's utilization to exactly its kink.
///
/// Withdrawing raises the source's utilization towards its kink from
/// below; depositing lowers the destination's towards its kink from
/// above. Both are found by inverting utilization = borrowed / supplied.
pub fn kink_points(
    from: &PoolSnapshot,
    from_kink: f64,
    to: &PoolSnapshot,
    to_kink: f64,
    max_amount: f64,
) -> Vec<f64> {
    let mut points = Vec::new();
    if from_kink > 0.0 && from.utilization < from_kink {
        let amount = from.total_supplied - from.total_borrowed() / from_kink;
        if amount > 0.0 && amount < max_amount {
            points.push(amount);
        }
    }
    if to_kink > 0.0 && to.utilization > to_kink {
        let amount = to.total_borrowed() / to_kink - to.total_supplied;
        if amount > 0.0 && amount < max_amount {
            points.push(amount);
        }
    }
    points
}
