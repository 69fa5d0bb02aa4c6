//! Top-level decision policy
//!
//! A large observed rate gap dominates any marginal incremental optimum
//! and is time-sensitive, so it short-circuits straight to a full-wallet
//! move. Everything else is delegated to the search engine.

use serde::{Deserialize, Serialize};

use crate::domain::position::Position;
use crate::domain::rates::CurveSet;
use crate::domain::search::{Objective, SearchEngine, SearchOutcome, SearchTrace};
use crate::domain::simulation::MoveOutcome;
use crate::domain::snapshot::{SnapshotSet, VenueStatus};
use crate::shared::config::OptimizerConfig;
use crate::shared::errors::OptimizerError;

/// Final recommendation handed to external consumers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Recommendation {
    /// Rate gap at or above the threshold: move the whole balance
    FullMove {
        amount: f64,
        from: String,
        to: String,
        rate_from: f64,
        rate_to: f64,
        /// Gap in percentage points
        gap_pct: f64,
        annual_gain_usd: f64,
    },
    /// Incremental move found by the search engine
    Rebalance {
        outcome: MoveOutcome,
        combined_score: Option<f64>,
        convergence: Option<MoveOutcome>,
    },
    NoMoveNeeded {
        reason: String,
        current_weighted_rate: f64,
        venues: Vec<VenueStatus>,
        convergence: Option<MoveOutcome>,
    },
}

/// Applies the full-move shortcut, then falls back to the search engine
pub struct DecisionPolicy<'a> {
    pools: &'a SnapshotSet,
    curves: &'a CurveSet,
    position: &'a Position,
    config: &'a OptimizerConfig,
}

impl<'a> DecisionPolicy<'a> {
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
            config,
        }
    }

    pub fn decide(
        &self,
        objective: Objective,
    ) -> Result<(Recommendation, SearchTrace), OptimizerError> {
        let engine = SearchEngine::new(self.pools, self.curves, self.position, self.config);

        let rates = self.current_rates();
        if rates.is_empty() {
            return Err(OptimizerError::NoData);
        }

        if rates.len() >= 2 {
            if let Some(shortcut) = self.full_move_shortcut(&engine, &rates)? {
                return Ok((shortcut, SearchTrace::default()));
            }
        }

        let report = engine.run(objective).map_err(OptimizerError::from)?;
        let recommendation = match report.outcome {
            SearchOutcome::Move {
                outcome,
                combined_score,
                convergence,
            } => Recommendation::Rebalance {
                outcome,
                combined_score,
                convergence,
            },
            SearchOutcome::NoImprovement {
                current_weighted_rate,
                venues,
                convergence,
            } => {
                let reason = match objective {
                    Objective::PureYield { .. } => {
                        "Current position is already optimal".to_string()
                    }
                    Objective::Equilibrium => {
                        "Current position is already at equilibrium".to_string()
                    }
                };
                Recommendation::NoMoveNeeded {
                    reason,
                    current_weighted_rate,
                    venues,
                    convergence,
                }
            }
        };
        Ok((recommendation, report.trace))
    }

    /// Current calibrated supply rate for every usable venue, in
    /// deterministic order.
    fn current_rates(&self) -> Vec<(String, f64)> {
        self.pools
            .values()
            .filter(|pool| !pool.is_degenerate())
            .filter_map(|pool| {
                self.curves
                    .get(&pool.venue)
                    .ok()
                    .map(|curve| (pool.venue.clone(), curve.supply_rate(pool.utilization)))
            })
            .collect()
    }

    /// Checks the rate gap and, when it is at or above the threshold,
    /// recommends moving the entire trailing balance to the highest-rate
    /// venue. Of several qualifying source venues the one with the
    /// largest annual gain wins; the two-venue case reduces to moving
    /// everything or staying put.
    fn full_move_shortcut(
        &self,
        engine: &SearchEngine<'_>,
        rates: &[(String, f64)],
    ) -> Result<Option<Recommendation>, OptimizerError> {
        let Some((best_venue, best_rate)) =
            rates
                .iter()
                .fold(None::<(&String, f64)>, |acc, (venue, rate)| match acc {
                    Some((_, top)) if top >= *rate => acc,
                    _ => Some((venue, *rate)),
                })
        else {
            return Ok(None);
        };

        let threshold = self.config.full_move_threshold_pct;
        let max_gap_pct = rates
            .iter()
            .map(|(_, rate)| (best_rate - rate) * 100.0)
            .fold(0.0, f64::max);
        if max_gap_pct < threshold {
            return Ok(None);
        }

        // pick the qualifying source with the most to gain
        let mut chosen: Option<(String, f64, f64)> = None;
        for (venue, rate) in rates {
            if venue == best_venue {
                continue;
            }
            let gap_pct = (best_rate - rate) * 100.0;
            if gap_pct < threshold {
                continue;
            }
            let balance = self.position.balance(venue);
            if balance <= 0.0 {
                continue;
            }
            let annual_gain = balance * (best_rate - rate);
            let better = match &chosen {
                Some((_, _, top_gain)) => annual_gain > *top_gain,
                None => true,
            };
            if better {
                chosen = Some((venue.clone(), *rate, annual_gain));
            }
        }

        match chosen {
            Some((from, rate_from, annual_gain_usd)) => Ok(Some(Recommendation::FullMove {
                amount: self.position.balance(&from),
                from,
                to: best_venue.clone(),
                rate_from,
                rate_to: best_rate,
                gap_pct: (best_rate - rate_from) * 100.0,
                annual_gain_usd,
            })),
            None => {
                // the gap is large but everything already sits in the
                // highest-rate venue
                let current_weighted_rate = engine
                    .current_weighted_rate()
                    .map_err(OptimizerError::from)?;
                Ok(Some(Recommendation::NoMoveNeeded {
                    reason: format!(
                        "{} leads by {:.2} percentage points and already holds the position",
                        best_venue, max_gap_pct
                    ),
                    current_weighted_rate,
                    venues: engine.venue_statuses(),
                    convergence: None,
                }))
            }
        }
    }
}
