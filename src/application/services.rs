//! Application services and use cases

use tracing::{debug, info, warn};

use crate::domain::policy::{DecisionPolicy, Recommendation};
use crate::domain::position::Position;
use crate::domain::rates::{CalibratedCurve, CurveSet, VenueCurve};
use crate::domain::search::Objective;
use crate::domain::snapshot::SnapshotSet;
use crate::report::RebalanceReport;
use crate::shared::config::OptimizerConfig;
use crate::shared::errors::OptimizerError;

/// Application service wiring snapshots, curves, policy and search into
/// one recommendation run.
pub struct RebalanceService {
    config: OptimizerConfig,
}

impl RebalanceService {
    pub fn new(config: OptimizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Produce a recommendation for the given snapshots and position.
    ///
    /// Venues without supply or without configured curve parameters are
    /// excluded up front; they are producer-side problems, not reasons to
    /// abort the run.
    pub fn recommend(
        &self,
        pools: &SnapshotSet,
        position: &Position,
        objective: Objective,
    ) -> Result<RebalanceReport, OptimizerError> {
        if pools.is_empty() {
            return Err(OptimizerError::NoData);
        }

        let mut usable = SnapshotSet::new();
        let mut curves = CurveSet::new();
        for (venue, pool) in pools {
            if pool.is_degenerate() {
                warn!("⚠️ Excluding {}: zero or negative total supplied", venue);
                continue;
            }
            let Some(params) = self.config.venues.get(venue) else {
                warn!("⚠️ Excluding {}: no rate curve parameters configured", venue);
                continue;
            };
            let curve = if pool.observed_rate > 0.0 {
                VenueCurve::Calibrated(CalibratedCurve::fit(
                    params.clone(),
                    pool.utilization,
                    pool.observed_rate,
                ))
            } else {
                // nothing to anchor against, use the raw model
                VenueCurve::Parametrized(params.clone())
            };
            curves.insert(venue.clone(), curve);
            usable.insert(venue.clone(), pool.clone());
        }

        if usable.is_empty() {
            return Err(OptimizerError::NoData);
        }

        info!(
            "🔍 Optimizing {} venues, total balance ${:.2}",
            usable.len(),
            position.total()
        );

        let policy = DecisionPolicy::new(&usable, &curves, position, &self.config);
        let (recommendation, trace) = policy.decide(objective)?;

        debug!(
            "Search tested {} candidates across {} trace events",
            trace.candidates_tested,
            trace.events.len()
        );
        match &recommendation {
            Recommendation::FullMove {
                amount, from, to, ..
            } => {
                info!("🚀 Full move: ${:.2} from {} to {}", amount, from, to);
            }
            Recommendation::Rebalance { outcome, .. } => {
                info!(
                    "🎯 Move ${:.2} from {} to {} ({:+.1} bps)",
                    outcome.amount, outcome.source.venue, outcome.dest.venue, outcome.gain_bps
                );
            }
            Recommendation::NoMoveNeeded { reason, .. } => {
                info!("✅ No move needed: {}", reason);
            }
        }

        Ok(RebalanceReport::new(objective, recommendation, trace))
    }
}
