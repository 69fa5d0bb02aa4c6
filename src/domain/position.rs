//! Held balances across venues

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::shared::errors::OptimizerError;

/// Mapping from venue id to currently held balance in USD.
///
/// Total balance is conserved across any simulated move; no capital is
/// created or destroyed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Position(BTreeMap<String, f64>);

impl Position {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn with_balance(mut self, venue: impl Into<String>, usd: f64) -> Self {
        self.0.insert(venue.into(), usd);
        self
    }

    pub fn set(&mut self, venue: impl Into<String>, usd: f64) {
        self.0.insert(venue.into(), usd);
    }

    pub fn balance(&self, venue: &str) -> f64 {
        self.0.get(venue).copied().unwrap_or(0.0)
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }

    /// New position after moving `amount` from one venue to another.
    pub fn apply_move(&self, amount: f64, from: &str, to: &str) -> Position {
        let mut next = self.clone();
        next.set(from, self.balance(from) - amount);
        next.set(to, self.balance(to) + amount);
        next
    }

    /// Parse a CLI position argument like `"solend=300000,marginfi=0"`.
    pub fn parse(input: &str) -> Result<Self, OptimizerError> {
        let mut position = Position::new();
        for part in input.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            let (venue, amount) = part.split_once('=').ok_or_else(|| {
                OptimizerError::InvalidPosition(format!("expected venue=amount, got '{}'", part))
            })?;
            let usd: f64 = amount.trim().parse().map_err(|_| {
                OptimizerError::InvalidPosition(format!("bad amount '{}' for {}", amount, venue))
            })?;
            if usd < 0.0 {
                return Err(OptimizerError::InvalidPosition(format!(
                    "negative balance for {}",
                    venue
                )));
            }
            position.set(venue.trim(), usd);
        }
        if position.0.is_empty() {
            return Err(OptimizerError::InvalidPosition(
                "no venue balances given".to_string(),
            ));
        }
        Ok(position)
    }
}
