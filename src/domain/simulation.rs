//! Move simulation
//!
//! Projects the state of both venues after a transfer: new utilizations,
//! new rates through the rate model, portfolio-weighted yield before and
//! after, and the safety flags the search engine filters on. Moving
//! supply does not itself change borrow demand, so borrowed amounts stay
//! fixed while total supplied shifts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::position::Position;
use crate::domain::rates::CurveSet;
use crate::domain::snapshot::{PoolSnapshot, SnapshotSet};
use crate::domain::stability::StabilityAssessment;
use crate::shared::config::OptimizerConfig;
use crate::shared::errors::SimulationError;

/// Pre/post state of one venue touched by a move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueTransition {
    pub venue: String,
    pub util_before: f64,
    pub util_after: f64,
    pub rate_before: f64,
    pub rate_after: f64,
    /// Whether the utilization moved from one side of the venue's kink to
    /// the other (landing exactly on the kink counts)
    pub crosses_kink: bool,
}

/// The product of one simulated move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MoveOutcome {
    pub amount: f64,
    pub source: VenueTransition,
    pub dest: VenueTransition,
    pub weighted_rate_before: f64,
    pub weighted_rate_after: f64,
    pub gain_bps: f64,
    pub annual_gain_usd: f64,
    /// Absolute rate spread between the two venues before/after the move
    pub spread_before: f64,
    pub spread_after: f64,
    pub profitable: bool,
    /// Filled by the stability scorer in equilibrium mode
    pub stability: Option<StabilityAssessment>,
}

/// Simulates transfers against immutable snapshots
pub struct MoveSimulator<'a> {
    pools: &'a SnapshotSet,
    curves: &'a CurveSet,
    position: &'a Position,
    min_gain_bps: f64,
    fixed_cost_usd: f64,
    deposit_util_floors: &'a BTreeMap<String, f64>,
}

impl<'a> MoveSimulator<'a> {
    pub fn new(
        pools: &'a SnapshotSet,
        curves: &'a CurveSet,
        position: &'a Position,
        config: &'a OptimizerConfig,
    ) -> Self {
        Self {
            pools,
            curves,
            position,
            min_gain_bps: config.min_gain_bps,
            fixed_cost_usd: config.fixed_cost_usd,
            deposit_util_floors: &config.deposit_util_floors,
        }
    }

    /// Current portfolio-weighted supply rate over the entire position
    pub fn current_weighted_rate(&self) -> Result<f64, SimulationError> {
        let total = self.position.total();
        if total <= 0.0 {
            return Ok(0.0);
        }
        let mut acc = 0.0;
        for (venue, balance) in self.position.iter() {
            if *balance <= 0.0 {
                continue;
            }
            if let Some(pool) = self.pools.get(venue) {
                acc += balance * self.curves.supply_rate(venue, pool.utilization)?;
            }
        }
        Ok(acc / total)
    }

    /// Simulate moving `amount` USD from one venue to another.
    ///
    /// A zero amount is a valid no-op whose outcome reproduces the current
    /// weighted rate exactly and is never profitable.
    pub fn simulate(
        &self,
        amount: f64,
        from: &str,
        to: &str,
    ) -> Result<MoveOutcome, SimulationError> {
        if amount < 0.0 {
            return Err(SimulationError::InvalidAmount(amount));
        }
        let held = self.position.balance(from);
        if amount > held {
            return Err(SimulationError::InsufficientBalance {
                venue: from.to_string(),
                requested: amount,
                held,
            });
        }

        let from_pool = self.usable_pool(from)?;
        let to_pool = self.usable_pool(to)?;

        // Hard guard: a configured venue may not be pushed below its
        // deposit utilization floor. The violation carries the largest
        // amount that would still be safe.
        if let Some(&floor) = self.deposit_util_floors.get(to) {
            if floor > 0.0 {
                let max_safe =
                    (to_pool.total_borrowed() / floor - to_pool.total_supplied).max(0.0);
                if amount > max_safe {
                    return Err(SimulationError::KinkGuardViolation {
                        venue: to.to_string(),
                        max_safe,
                    });
                }
            }
        }

        let new_util_from = if amount == 0.0 {
            from_pool.utilization
        } else {
            let new_supply = from_pool.total_supplied - amount;
            if new_supply <= 0.0 {
                // fully drained: treat as saturated rather than dividing by zero
                1.0
            } else {
                (from_pool.total_borrowed() / new_supply).min(1.0)
            }
        };
        let new_util_to = if amount == 0.0 {
            to_pool.utilization
        } else {
            (to_pool.total_borrowed() / (to_pool.total_supplied + amount)).min(1.0)
        };

        let from_curve = self.curves.get(from)?;
        let to_curve = self.curves.get(to)?;

        let rate_before_from = from_curve.supply_rate(from_pool.utilization);
        let rate_before_to = to_curve.supply_rate(to_pool.utilization);
        let rate_after_from = from_curve.supply_rate(new_util_from);
        let rate_after_to = to_curve.supply_rate(new_util_to);

        let weighted_before = self.current_weighted_rate()?;
        let weighted_after = self.weighted_rate_after(
            amount,
            from,
            to,
            rate_after_from,
            rate_after_to,
        )?;

        let total_balance = self.position.total();
        let gain_bps = (weighted_after - weighted_before) * 10_000.0;
        let annual_gain_usd = (weighted_after - weighted_before) * total_balance;

        let source = VenueTransition {
            venue: from.to_string(),
            util_before: from_pool.utilization,
            util_after: new_util_from,
            rate_before: rate_before_from,
            rate_after: rate_after_from,
            crosses_kink: crosses_kink(from_pool.utilization, new_util_from, from_curve.kink()),
        };
        let dest = VenueTransition {
            venue: to.to_string(),
            util_before: to_pool.utilization,
            util_after: new_util_to,
            rate_before: rate_before_to,
            rate_after: rate_after_to,
            crosses_kink: crosses_kink(to_pool.utilization, new_util_to, to_curve.kink()),
        };

        Ok(MoveOutcome {
            amount,
            source,
            dest,
            weighted_rate_before: weighted_before,
            weighted_rate_after: weighted_after,
            gain_bps,
            annual_gain_usd,
            spread_before: (rate_before_from - rate_before_to).abs(),
            spread_after: (rate_after_from - rate_after_to).abs(),
            profitable: gain_bps > self.min_gain_bps && annual_gain_usd > self.fixed_cost_usd,
            stability: None,
        })
    }

    fn usable_pool(&self, venue: &str) -> Result<&PoolSnapshot, SimulationError> {
        let pool = self
            .pools
            .get(venue)
            .ok_or_else(|| SimulationError::DegenerateVenue(venue.to_string()))?;
        if pool.is_degenerate() {
            return Err(SimulationError::DegenerateVenue(venue.to_string()));
        }
        Ok(pool)
    }

    fn weighted_rate_after(
        &self,
        amount: f64,
        from: &str,
        to: &str,
        rate_after_from: f64,
        rate_after_to: f64,
    ) -> Result<f64, SimulationError> {
        let moved = self.position.apply_move(amount, from, to);
        let total = moved.total();
        if total <= 0.0 {
            return Ok(0.0);
        }
        let mut acc = 0.0;
        for (venue, balance) in moved.iter() {
            if *balance <= 0.0 || !self.pools.contains_key(venue) {
                continue;
            }
            let rate = if venue == from {
                rate_after_from
            } else if venue == to {
                rate_after_to
            } else {
                let pool = &self.pools[venue];
                self.curves.supply_rate(venue, pool.utilization)?
            };
            acc += balance * rate;
        }
        Ok(acc / total)
    }
}

fn crosses_kink(util_before: f64, util_after: f64, kink: f64) -> bool {
    (util_before < kink && kink <= util_after) || (util_after < kink && kink <= util_before)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::rates::{CalibratedCurve, RateCurveParams, VenueCurve};
    use approx::assert_relative_eq;

    fn params(slope1: f64, slope2: f64) -> RateCurveParams {
        RateCurveParams {
            kink: 0.80,
            base_rate: 0.0,
            slope1,
            slope2,
            reserve_factor: 0.10,
        }
    }

    fn fixture() -> (SnapshotSet, CurveSet, Position, OptimizerConfig) {
        let mut pools = SnapshotSet::new();
        pools.insert(
            "marginfi".to_string(),
            PoolSnapshot::new("marginfi", 0.14, 2_500_000.0, 0.84),
        );
        pools.insert(
            "solend".to_string(),
            PoolSnapshot::new("solend", 0.12, 3_000_000.0, 0.82),
        );

        let mut curves = CurveSet::new();
        curves.insert(
            "solend",
            VenueCurve::Calibrated(CalibratedCurve::fit(params(0.052, 1.0), 0.82, 0.12)),
        );
        curves.insert(
            "marginfi",
            VenueCurve::Calibrated(CalibratedCurve::fit(params(0.040, 0.75), 0.84, 0.14)),
        );

        let position = Position::new()
            .with_balance("solend", 300_000.0)
            .with_balance("marginfi", 0.0);

        (pools, curves, position, OptimizerConfig::default())
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        let (pools, curves, position, config) = fixture();
        let sim = MoveSimulator::new(&pools, &curves, &position, &config);
        let err = sim.simulate(-1.0, "solend", "marginfi").unwrap_err();
        assert!(matches!(err, SimulationError::InvalidAmount(_)));
    }

    #[test]
    fn test_insufficient_balance_is_rejected() {
        let (pools, curves, position, config) = fixture();
        let sim = MoveSimulator::new(&pools, &curves, &position, &config);
        let err = sim.simulate(400_000.0, "solend", "marginfi").unwrap_err();
        assert!(matches!(err, SimulationError::InsufficientBalance { .. }));
    }

    #[test]
    fn test_zero_move_reproduces_current_rate_and_is_not_profitable() {
        let (pools, curves, position, config) = fixture();
        let sim = MoveSimulator::new(&pools, &curves, &position, &config);
        let outcome = sim.simulate(0.0, "solend", "marginfi").unwrap();
        assert_eq!(outcome.weighted_rate_after, outcome.weighted_rate_before);
        assert_eq!(outcome.gain_bps, 0.0);
        assert!(!outcome.profitable);
        assert!(!outcome.source.crosses_kink);
        assert!(!outcome.dest.crosses_kink);
    }

    #[test]
    fn test_utilization_monotonicity_in_amount() {
        let (pools, curves, position, config) = fixture();
        let sim = MoveSimulator::new(&pools, &curves, &position, &config);
        let mut last_src = 0.0;
        let mut last_dst = 1.0;
        for amount in [10_000.0, 50_000.0, 100_000.0, 200_000.0, 300_000.0] {
            let outcome = sim.simulate(amount, "solend", "marginfi").unwrap();
            assert!(outcome.source.util_after > last_src);
            assert!(outcome.dest.util_after < last_dst);
            last_src = outcome.source.util_after;
            last_dst = outcome.dest.util_after;
        }
    }

    #[test]
    fn test_borrowed_amounts_are_preserved() {
        let (pools, curves, position, config) = fixture();
        let sim = MoveSimulator::new(&pools, &curves, &position, &config);
        let outcome = sim.simulate(100_000.0, "solend", "marginfi").unwrap();
        // borrows are unchanged by a supply move, only the denominators shift
        let src_borrow_after = outcome.source.util_after * (3_000_000.0 - 100_000.0);
        assert_relative_eq!(src_borrow_after, 3_000_000.0 * 0.82, epsilon = 1e-6);
        let dst_borrow_after = outcome.dest.util_after * (2_500_000.0 + 100_000.0);
        assert_relative_eq!(dst_borrow_after, 2_500_000.0 * 0.84, epsilon = 1e-6);
    }

    #[test]
    fn test_kink_guard_violation_reports_clamped_safe_cap() {
        // venue sitting below the floor already: no deposit is safe
        let mut pools = SnapshotSet::new();
        pools.insert(
            "solend".to_string(),
            PoolSnapshot::new("solend", 0.12, 2_000_000.0, 0.85),
        );
        pools.insert(
            "marginfi".to_string(),
            PoolSnapshot::new("marginfi", 0.10, 3_000_000.0, 0.78),
        );
        let mut curves = CurveSet::new();
        curves.insert(
            "solend",
            VenueCurve::Calibrated(CalibratedCurve::fit(params(0.052, 1.0), 0.85, 0.12)),
        );
        curves.insert(
            "marginfi",
            VenueCurve::Calibrated(CalibratedCurve::fit(params(0.040, 0.75), 0.78, 0.10)),
        );
        let position = Position::new().with_balance("solend", 500_000.0);
        let mut config = OptimizerConfig::default();
        config.deposit_util_floors.insert("marginfi".to_string(), 0.80);

        let sim = MoveSimulator::new(&pools, &curves, &position, &config);
        let err = sim.simulate(50_000.0, "solend", "marginfi").unwrap_err();
        match err {
            SimulationError::KinkGuardViolation { venue, max_safe } => {
                assert_eq!(venue, "marginfi");
                // borrowed/floor - supplied is negative here, clamped to zero
                assert_eq!(max_safe, 0.0);
            }
            other => panic!("expected kink guard violation, got {:?}", other),
        }
    }

    #[test]
    fn test_kink_guard_allows_amounts_under_the_cap() {
        let mut pools = SnapshotSet::new();
        pools.insert(
            "solend".to_string(),
            PoolSnapshot::new("solend", 0.12, 3_000_000.0, 0.82),
        );
        pools.insert(
            "marginfi".to_string(),
            PoolSnapshot::new("marginfi", 0.14, 2_000_000.0, 0.85),
        );
        let mut curves = CurveSet::new();
        curves.insert(
            "solend",
            VenueCurve::Calibrated(CalibratedCurve::fit(params(0.052, 1.0), 0.82, 0.12)),
        );
        curves.insert(
            "marginfi",
            VenueCurve::Calibrated(CalibratedCurve::fit(params(0.040, 0.75), 0.85, 0.14)),
        );
        let position = Position::new().with_balance("solend", 500_000.0);
        let mut config = OptimizerConfig::default();
        config.deposit_util_floors.insert("marginfi".to_string(), 0.80);

        let sim = MoveSimulator::new(&pools, &curves, &position, &config);
        // cap = borrowed/0.80 - supplied = 1.7M/0.8 - 2M = 125k
        let cap = 2_000_000.0 * 0.85 / 0.80 - 2_000_000.0;
        assert!(sim.simulate(cap - 1.0, "solend", "marginfi").is_ok());
        let err = sim.simulate(cap + 1.0, "solend", "marginfi").unwrap_err();
        match err {
            SimulationError::KinkGuardViolation { max_safe, .. } => {
                assert_relative_eq!(max_safe, cap, epsilon = 1e-6);
            }
            other => panic!("expected kink guard violation, got {:?}", other),
        }
    }

    #[test]
    fn test_kink_crossing_flags_use_each_venues_kink() {
        let mut pools = SnapshotSet::new();
        pools.insert(
            "solend".to_string(),
            PoolSnapshot::new("solend", 0.08, 1_000_000.0, 0.75),
        );
        pools.insert(
            "marginfi".to_string(),
            PoolSnapshot::new("marginfi", 0.14, 2_000_000.0, 0.85),
        );
        let mut curves = CurveSet::new();
        curves.insert(
            "solend",
            VenueCurve::Calibrated(CalibratedCurve::fit(params(0.052, 1.0), 0.75, 0.08)),
        );
        curves.insert(
            "marginfi",
            VenueCurve::Calibrated(CalibratedCurve::fit(params(0.040, 0.75), 0.85, 0.14)),
        );
        let position = Position::new().with_balance("solend", 500_000.0);
        let config = OptimizerConfig::default();
        let sim = MoveSimulator::new(&pools, &curves, &position, &config);

        // withdrawing 100k: source util 0.75 -> 750k/900k = 0.833, crosses 0.80
        // depositing 100k: dest util 0.85 -> 1.7M/2.1M = 0.8095, stays above 0.80
        let outcome = sim.simulate(100_000.0, "solend", "marginfi").unwrap();
        assert!(outcome.source.crosses_kink);
        assert!(!outcome.dest.crosses_kink);
    }

    #[test]
    fn test_draining_the_source_saturates_utilization() {
        let mut pools = SnapshotSet::new();
        pools.insert(
            "solend".to_string(),
            PoolSnapshot::new("solend", 0.12, 200_000.0, 0.50),
        );
        pools.insert(
            "marginfi".to_string(),
            PoolSnapshot::new("marginfi", 0.14, 2_000_000.0, 0.84),
        );
        let mut curves = CurveSet::new();
        curves.insert(
            "solend",
            VenueCurve::Calibrated(CalibratedCurve::fit(params(0.052, 1.0), 0.50, 0.12)),
        );
        curves.insert(
            "marginfi",
            VenueCurve::Calibrated(CalibratedCurve::fit(params(0.040, 0.75), 0.84, 0.14)),
        );
        let position = Position::new().with_balance("solend", 200_000.0);
        let config = OptimizerConfig::default();
        let sim = MoveSimulator::new(&pools, &curves, &position, &config);
        let outcome = sim.simulate(200_000.0, "solend", "marginfi").unwrap();
        assert_eq!(outcome.source.util_after, 1.0);
    }
}
