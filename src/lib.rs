//! Repools - Lending Pool Yield Rebalancer
//! Built with Domain-Driven Design principles

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod report;
pub mod shared;

// Re-export main types for convenience
pub use application::services::RebalanceService;
pub use domain::policy::{DecisionPolicy, Recommendation};
pub use domain::position::Position;
pub use domain::rates::{CalibratedCurve, CurveSet, RateCurveParams, VenueCurve};
pub use domain::search::{Objective, RefinementTarget, SearchEngine};
pub use domain::simulation::{MoveOutcome, MoveSimulator};
pub use domain::snapshot::{PoolSnapshot, SnapshotSet};
pub use report::RebalanceReport;
pub use shared::config::OptimizerConfig;
