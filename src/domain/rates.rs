//! Kinked interest rate model
//!
//! Each venue prices borrowing with a piecewise-linear curve that changes
//! slope at the kink point. The supply side earns the borrow rate scaled
//! by utilization, minus the protocol's reserve cut.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::shared::errors::SimulationError;

/// Utilization is clamped below 1.0 before evaluation to avoid the
/// singularity at full utilization.
pub const MAX_MODEL_UTILIZATION: f64 = 0.9999;

/// Guard against division by zero when a venue reports a zero kink.
const MIN_KINK: f64 = 1e-6;

/// Piecewise-linear borrow rate coefficients for one venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateCurveParams {
    /// Utilization fraction where the slope changes (0 < kink < 1)
    pub kink: f64,
    pub base_rate: f64,
    pub slope1: f64,
    pub slope2: f64,
    /// Fraction of borrow interest retained by the protocol
    pub reserve_factor: f64,
}

impl RateCurveParams {
    /// Annualized borrow rate at the given utilization
    pub fn borrow_rate(&self, utilization: f64) -> f64 {
        let u = utilization.clamp(0.0, MAX_MODEL_UTILIZATION);
        let kink = self.kink.max(MIN_KINK);
        if u <= kink {
            self.base_rate + self.slope1 * (u / kink)
        } else {
            self.base_rate
                + self.slope1
                + self.slope2 * ((u - kink) / (1.0 - kink).max(MIN_KINK))
        }
    }

    /// Annualized supply rate at the given utilization
    ///
    /// Supply rate = borrow rate * utilization * (1 - reserve factor)
    pub fn supply_rate(&self, utilization: f64) -> f64 {
        let u = utilization.clamp(0.0, MAX_MODEL_UTILIZATION);
        self.borrow_rate(u) * u * (1.0 - self.reserve_factor)
    }
}

/// A rate curve rescaled so the model reproduces the externally observed
/// supply rate at the venue's current utilization.
///
/// Modeled and reported rates diverge slightly (fees, rounding, timing);
/// anchoring the curve's level to ground truth keeps the optimizer from
/// manufacturing gain out of model error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibratedCurve {
    params: RateCurveParams,
    scale: f64,
}

impl CalibratedCurve {
    /// Fit the scale factor against an observed rate at the current
    /// utilization. Falls back to 1.0 when the modeled rate is not positive.
    pub fn fit(params: RateCurveParams, current_utilization: f64, observed_rate: f64) -> Self {
        let modeled = params.supply_rate(current_utilization);
        let scale = if modeled > 0.0 {
            observed_rate / modeled
        } else {
            1.0
        };
        Self { params, scale }
    }

    pub fn supply_rate(&self, utilization: f64) -> f64 {
        self.scale * self.params.supply_rate(utilization)
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn params(&self) -> &RateCurveParams {
        &self.params
    }
}

/// Rate model for one venue: raw on-chain parameters, or a curve
/// calibrated against the venue's reported rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum VenueCurve {
    Parametrized(RateCurveParams),
    Calibrated(CalibratedCurve),
}

impl VenueCurve {
    pub fn supply_rate(&self, utilization: f64) -> f64 {
        match self {
            VenueCurve::Parametrized(params) => params.supply_rate(utilization),
            VenueCurve::Calibrated(curve) => curve.supply_rate(utilization),
        }
    }

    pub fn kink(&self) -> f64 {
        self.params().kink
    }

    pub fn params(&self) -> &RateCurveParams {
        match self {
            VenueCurve::Parametrized(params) => params,
            VenueCurve::Calibrated(curve) => curve.params(),
        }
    }
}

/// Rate curves keyed by venue id
#[derive(Debug, Clone, Default)]
pub struct CurveSet(BTreeMap<String, VenueCurve>);

impl CurveSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, venue: impl Into<String>, curve: VenueCurve) {
        self.0.insert(venue.into(), curve);
    }

    pub fn get(&self, venue: &str) -> Result<&VenueCurve, SimulationError> {
        self.0
            .get(venue)
            .ok_or_else(|| SimulationError::MissingCurveParams(venue.to_string()))
    }

    pub fn contains(&self, venue: &str) -> bool {
        self.0.contains_key(venue)
    }

    pub fn supply_rate(&self, venue: &str, utilization: f64) -> Result<f64, SimulationError> {
        Ok(self.get(venue)?.supply_rate(utilization))
    }
}
