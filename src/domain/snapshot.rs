//! Venue state snapshots
//!
//! A snapshot is constructed once per optimization cycle by an external
//! producer (chain polling, status-line parsing) and treated as immutable
//! for the duration of the run.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One venue's state at an evaluation instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub venue: String,
    /// Externally reported annualized supply rate, decimal fraction
    pub observed_rate: f64,
    /// Total value supplied/locked, USD
    pub total_supplied: f64,
    /// Borrowed / supplied ratio, decimal in [0, ~1]
    pub utilization: f64,
}

impl PoolSnapshot {
    pub fn new(
        venue: impl Into<String>,
        observed_rate: f64,
        total_supplied: f64,
        utilization: f64,
    ) -> Self {
        Self {
            venue: venue.into(),
            observed_rate,
            total_supplied,
            utilization,
        }
    }

    pub fn total_borrowed(&self) -> f64 {
        self.total_supplied * self.utilization
    }

    pub fn available_liquidity(&self) -> f64 {
        self.total_supplied - self.total_borrowed()
    }

    /// Venues without supply have undefined utilization and are excluded
    /// from search.
    pub fn is_degenerate(&self) -> bool {
        self.total_supplied <= 0.0
    }
}

/// Snapshots keyed by venue id. Ordered so pair enumeration stays
/// deterministic across runs.
pub type SnapshotSet = BTreeMap<String, PoolSnapshot>;

/// Per-venue status carried in no-move results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VenueStatus {
    pub venue: String,
    pub utilization: f64,
    pub rate: f64,
    pub total_supplied: f64,
    pub total_borrowed: f64,
}
