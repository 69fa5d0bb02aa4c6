//! Report rendering for rebalance recommendations
//!
//! Downstream persistence and chat delivery consume the JSON form
//! verbatim; the text form is for humans at the terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::policy::Recommendation;
use crate::domain::search::{Objective, SearchTrace};
use crate::domain::simulation::MoveOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceReport {
    pub timestamp: DateTime<Utc>,
    pub objective: String,
    pub recommendation: Recommendation,
    pub candidates_tested: usize,
    pub trace: SearchTrace,
}

impl RebalanceReport {
    pub fn new(
        objective: Objective,
        recommendation: Recommendation,
        trace: SearchTrace,
    ) -> Self {
        let objective = match objective {
            Objective::PureYield { .. } => "pure_yield".to_string(),
            Objective::Equilibrium => "equilibrium".to_string(),
        };
        Self {
            timestamp: Utc::now(),
            objective,
            candidates_tested: trace.candidates_tested,
            recommendation,
            trace,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Plain-text rendering of the recommendation
    pub fn render_text(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!(
            "Rebalance recommendation ({}, {} candidates tested)",
            self.objective, self.candidates_tested
        ));

        match &self.recommendation {
            Recommendation::FullMove {
                amount,
                from,
                to,
                rate_from,
                rate_to,
                gap_pct,
                annual_gain_usd,
            } => {
                lines.push(format!(
                    "ACTION: move the entire ${:.2} from {} ({:.2}%) to {} ({:.2}%)",
                    amount,
                    from,
                    rate_from * 100.0,
                    to,
                    rate_to * 100.0
                ));
                lines.push(format!(
                    "Rate gap {:.2} percentage points; extra yield ${:.2}/year",
                    gap_pct, annual_gain_usd
                ));
            }
            Recommendation::Rebalance {
                outcome,
                combined_score,
                convergence,
            } => {
                lines.push(format!(
                    "ACTION: move ${:.2} from {} to {}",
                    outcome.amount, outcome.source.venue, outcome.dest.venue
                ));
                lines.push(render_transitions(outcome));
                lines.push(format!(
                    "Weighted rate {:.3}% -> {:.3}% (gain {:.1} bps, ${:.2}/year)",
                    outcome.weighted_rate_before * 100.0,
                    outcome.weighted_rate_after * 100.0,
                    outcome.gain_bps,
                    outcome.annual_gain_usd
                ));
                lines.push(format!(
                    "Profitable after costs: {}",
                    if outcome.profitable { "yes" } else { "no" }
                ));
                if let Some(stability) = &outcome.stability {
                    lines.push(format!(
                        "Stability: {} (score {:.2})",
                        if stability.is_stable { "stable" } else { "unstable" },
                        stability.stability_score
                    ));
                }
                if let Some(score) = combined_score {
                    lines.push(format!("Combined score: {:.3}", score));
                }
                for transition in [&outcome.source, &outcome.dest] {
                    if transition.crosses_kink {
                        lines.push(format!("WARNING: {} crosses its kink", transition.venue));
                    }
                }
                if let Some(conv) = convergence {
                    lines.push(render_convergence(conv));
                }
            }
            Recommendation::NoMoveNeeded {
                reason,
                current_weighted_rate,
                venues,
                convergence,
            } => {
                lines.push(format!("No move needed: {}", reason));
                lines.push(format!(
                    "Current weighted rate: {:.3}%",
                    current_weighted_rate * 100.0
                ));
                for status in venues {
                    lines.push(format!(
                        "  {}: {:.2}% util, {:.2}% rate, ${:.0} supplied",
                        status.venue,
                        status.utilization * 100.0,
                        status.rate * 100.0,
                        status.total_supplied
                    ));
                }
                if let Some(conv) = convergence {
                    lines.push(render_convergence(conv));
                }
            }
        }

        lines.join("\n")
    }
}

fn render_transitions(outcome: &MoveOutcome) -> String {
    format!(
        "Utilization {}: {:.2}% -> {:.2}% | {}: {:.2}% -> {:.2}%",
        outcome.source.venue,
        outcome.source.util_before * 100.0,
        outcome.source.util_after * 100.0,
        outcome.dest.venue,
        outcome.dest.util_before * 100.0,
        outcome.dest.util_after * 100.0
    )
}

fn render_convergence(conv: &MoveOutcome) -> String {
    format!(
        "Convergence option: move ${:.2} {} -> {} (spread {:.0} bps -> {:.0} bps)",
        conv.amount,
        conv.source.venue,
        conv.dest.venue,
        conv.spread_before * 10_000.0,
        conv.spread_after * 10_000.0
    )
}
