//! Error handling for the application

use thiserror::Error;

/// Simulation-related errors
///
/// All of these are recoverable at the call site: a failed candidate is
/// simply excluded from the search instead of aborting it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SimulationError {
    #[error("Transfer amount must not be negative: {0}")]
    InvalidAmount(f64),

    #[error("Insufficient balance in {venue}: requested ${requested:.2}, held ${held:.2}")]
    InsufficientBalance {
        venue: String,
        requested: f64,
        held: f64,
    },

    #[error("Deposit into {venue} would breach its utilization floor (max safe amount: ${max_safe:.2})")]
    KinkGuardViolation { venue: String, max_safe: f64 },

    #[error("Degenerate venue {0}: zero or negative total supplied")]
    DegenerateVenue(String),

    #[error("No rate curve parameters for venue {0}")]
    MissingCurveParams(String),
}

/// Optimizer-level errors
#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("No usable venue snapshots provided")]
    NoData,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Snapshot parse error: {0}")]
    ParseError(String),

    #[error("Invalid position: {0}")]
    InvalidPosition(String),

    #[error(transparent)]
    Simulation(#[from] SimulationError),
}
