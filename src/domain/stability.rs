//! Stability scoring for equilibrium mode
//!
//! A candidate is stable when both post-move utilizations sit inside the
//! safe window and the resulting rate spread either fits under the cap or
//! shrinks an already-excessive spread. The second arm lets the optimizer
//! still recommend a corrective move when starting from an unsafe spread.

use serde::{Deserialize, Serialize};

use crate::domain::simulation::MoveOutcome;
use crate::shared::config::StabilityConfig;

/// Stability verdict and score for one simulated move
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityAssessment {
    pub is_stable: bool,
    /// 0-1, higher is better; 0 for unstable candidates
    pub stability_score: f64,
    pub util_score: f64,
    pub spread_score: f64,
}

/// Converts simulated outcomes into stability verdicts
pub struct StabilityScorer<'a> {
    config: &'a StabilityConfig,
}

impl<'a> StabilityScorer<'a> {
    pub fn new(config: &'a StabilityConfig) -> Self {
        Self { config }
    }

    pub fn utils_within_window(&self, outcome: &MoveOutcome) -> bool {
        let cfg = self.config;
        let src = outcome.source.util_after;
        let dst = outcome.dest.util_after;
        cfg.min_safe_util <= src
            && src <= cfg.max_safe_util
            && cfg.min_safe_util <= dst
            && dst <= cfg.max_safe_util
    }

    pub fn assess(&self, outcome: &MoveOutcome) -> StabilityAssessment {
        let cfg = self.config;
        let spread_cap = cfg.max_spread_bps / 10_000.0;

        let util_within_limits = self.utils_within_window(outcome);
        let spread_within_limit = outcome.spread_after <= spread_cap;
        let reduces_spread = outcome.spread_after < outcome.spread_before;

        let is_stable = util_within_limits && (spread_within_limit || reduces_spread);
        if !is_stable {
            return StabilityAssessment {
                is_stable: false,
                stability_score: 0.0,
                util_score: 0.0,
                spread_score: 0.0,
            };
        }

        let util_score = 1.0
            - ((outcome.source.util_after - cfg.optimal_util).abs()
                + (outcome.dest.util_after - cfg.optimal_util).abs())
                / cfg.util_score_span;
        let spread_score = 1.0 - outcome.spread_after / spread_cap;
        let stability_score =
            (cfg.util_weight * util_score + cfg.spread_weight * spread_score).clamp(0.0, 1.0);

        StabilityAssessment {
            is_stable: true,
            stability_score,
            util_score,
            spread_score,
        }
    }
}
