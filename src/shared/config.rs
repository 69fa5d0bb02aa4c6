//! Optimizer configuration

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fs, path::Path};

use crate::domain::rates::RateCurveParams;

/// Search engine tunables
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of even increments in the pure-yield candidate grid
    pub grid_points: usize,
    /// Equilibrium grid step as a percentage of the safe range
    pub equilibrium_step_pct: f64,
    /// Golden-section window as a fraction of the pair's max amount
    pub golden_window_frac: f64,
    /// Golden-section convergence tolerance on the amount, in USD
    pub golden_tolerance_usd: f64,
    pub golden_max_iters: usize,
    /// Ternary window as a fraction of the pair's max amount
    pub ternary_window_frac: f64,
    /// Ternary convergence tolerance on the amount, in USD
    pub ternary_tolerance_usd: f64,
    pub ternary_max_iters: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            grid_points: 1000,
            equilibrium_step_pct: 2.0,
            golden_window_frac: 0.10,
            golden_tolerance_usd: 0.10,
            golden_max_iters: 50,
            ternary_window_frac: 0.05,
            ternary_tolerance_usd: 1.0,
            ternary_max_iters: 30,
        }
    }
}

/// Stability scoring tunables (equilibrium mode)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StabilityConfig {
    /// Lower edge of the safe utilization window, just above the kink
    pub min_safe_util: f64,
    /// Upper edge of the safe utilization window, before rates go extreme
    pub max_safe_util: f64,
    /// Utilization sweet spot the scorer pulls towards
    pub optimal_util: f64,
    /// Normalization span for the utilization score
    pub util_score_span: f64,
    /// Maximum cross-venue rate spread before other actors arbitrage it away
    pub max_spread_bps: f64,
    /// Weight of the utilization term inside the stability score
    pub util_weight: f64,
    /// Weight of the spread term inside the stability score
    pub spread_weight: f64,
    /// Weight of stability in the combined candidate score
    pub stability_weight: f64,
    /// Weight of yield in the combined candidate score
    pub yield_weight: f64,
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            min_safe_util: 0.805,
            max_safe_util: 0.87,
            optimal_util: 0.825,
            util_score_span: 0.2,
            max_spread_bps: 150.0,
            util_weight: 0.6,
            spread_weight: 0.4,
            stability_weight: 0.6,
            yield_weight: 0.4,
        }
    }
}

/// Top-level optimizer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Minimum gain for a move to count as profitable, in basis points
    pub min_gain_bps: f64,
    /// Flat transaction cost a profitable move has to clear, in USD
    pub fixed_cost_usd: f64,
    /// Rate gap (percentage points) that short-circuits to a full-wallet move
    pub full_move_threshold_pct: f64,
    pub search: SearchConfig,
    pub stability: StabilityConfig,
    /// Per-venue hard deposit guards: minimum utilization a deposit may not
    /// push the venue below
    pub deposit_util_floors: BTreeMap<String, f64>,
    /// Per-venue interest rate curve parameters
    pub venues: BTreeMap<String, RateCurveParams>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        let mut venues = BTreeMap::new();
        venues.insert(
            "solend".to_string(),
            RateCurveParams {
                kink: 0.80,
                base_rate: 0.0,
                slope1: 0.052,
                slope2: 1.0,
                reserve_factor: 0.10,
            },
        );
        venues.insert(
            "marginfi".to_string(),
            RateCurveParams {
                kink: 0.80,
                base_rate: 0.0,
                slope1: 0.040,
                slope2: 0.75,
                reserve_factor: 0.10,
            },
        );
        Self {
            min_gain_bps: 5.0,
            fixed_cost_usd: 10.0,
            full_move_threshold_pct: 1.5,
            search: SearchConfig::default(),
            stability: StabilityConfig::default(),
            deposit_util_floors: BTreeMap::new(),
            venues,
        }
    }
}

impl OptimizerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("read config {}", path.as_ref().display()))?;
        let cfg: Self = toml::from_str(&s).context("parse optimizer config")?;
        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_values() {
        let cfg = OptimizerConfig::default();
        assert_eq!(cfg.min_gain_bps, 5.0);
        assert_eq!(cfg.fixed_cost_usd, 10.0);
        assert_eq!(cfg.full_move_threshold_pct, 1.5);
        assert_eq!(cfg.search.grid_points, 1000);
        assert_eq!(cfg.search.equilibrium_step_pct, 2.0);
        assert_eq!(cfg.stability.min_safe_util, 0.805);
        assert_eq!(cfg.stability.max_safe_util, 0.87);
        assert_eq!(cfg.stability.optimal_util, 0.825);
        assert_eq!(cfg.stability.max_spread_bps, 150.0);
        assert!(cfg.venues.contains_key("solend"));
        assert!(cfg.venues.contains_key("marginfi"));
    }

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let toml_src = r#"
            min_gain_bps = 10.0

            [stability]
            max_spread_bps = 200.0

            [venues.solend]
            kink = 0.8
            base_rate = 0.0
            slope1 = 0.052
            slope2 = 1.0
            reserve_factor = 0.10
        "#;
        let cfg: OptimizerConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(cfg.min_gain_bps, 10.0);
        assert_eq!(cfg.stability.max_spread_bps, 200.0);
        // untouched sections keep their defaults
        assert_eq!(cfg.stability.min_safe_util, 0.805);
        assert_eq!(cfg.search.grid_points, 1000);
        let solend = cfg.venues.get("solend").unwrap();
        assert_eq!(solend.kink, 0.8);
        assert_eq!(solend.slope1, 0.052);
    }
}
