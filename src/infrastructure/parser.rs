//! Status-line parsing
//!
//! Upstream monitoring emits loosely formatted one-line summaries per
//! venue, e.g.
//!
//! `solend usdc - 13.79% apr. supplied/tvl- $2,950,186.42, utilisation rate= 82.91%`
//!
//! This module turns those lines into pool snapshots. The venue id is the
//! first word of the line; both "utilisation" and "utilization" spellings
//! are accepted.

use regex::Regex;

use crate::domain::snapshot::{PoolSnapshot, SnapshotSet};
use crate::shared::errors::OptimizerError;

const STATUS_LINE: &str = r"(?i)^\s*([a-z][a-z0-9_-]*)\b.*?(\d+(?:\.\d+)?)%\s*apr.*?\$\s*([0-9][0-9,]*(?:\.\d+)?).*?utili[sz]ation\s*rate\s*=?\s*(\d+(?:\.\d+)?)\s*%";

/// Parse one snapshot per recognizable line. Lines that do not match are
/// skipped; an input with no recognizable line at all is an error.
pub fn parse_status(input: &str) -> Result<SnapshotSet, OptimizerError> {
    let re = Regex::new(STATUS_LINE).expect("status line pattern is valid");
    let mut pools = SnapshotSet::new();

    for line in input.lines() {
        let Some(caps) = re.captures(line) else {
            continue;
        };
        let venue = caps[1].to_lowercase();
        let apr: f64 = caps[2].parse().map_err(|_| bad_number(&caps[2], line))?;
        let tvl: f64 = caps[3]
            .replace(',', "")
            .parse()
            .map_err(|_| bad_number(&caps[3], line))?;
        let utilization: f64 = caps[4].parse().map_err(|_| bad_number(&caps[4], line))?;

        pools.insert(
            venue.clone(),
            PoolSnapshot::new(venue, apr / 100.0, tvl, utilization / 100.0),
        );
    }

    if pools.is_empty() {
        return Err(OptimizerError::ParseError(
            "no venue status lines recognized".to_string(),
        ));
    }
    Ok(pools)
}

fn bad_number(value: &str, line: &str) -> OptimizerError {
    OptimizerError::ParseError(format!("bad number '{}' in line '{}'", value, line.trim()))
}
