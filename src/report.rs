use std::collections::HashMap;
use std::fmt::Write;

use chrono::{DateTime, Utc};

use crate::models::{Factor, PrioritizedRequest, ProjectionResult, Tier};
use crate::weights::WeightSet;

#[derive(Debug, Clone, PartialEq)]
pub struct NeighborhoodSummary {
    pub neighborhood: String,
    pub count: usize,
    pub avg_score: f64,
    pub critical: usize,
}

pub fn summarize_by_neighborhood(ranked: &[PrioritizedRequest]) -> Vec<NeighborhoodSummary> {
    let mut map: HashMap<&str, (usize, u32, usize)> = HashMap::new();

    for entry in ranked {
        let slot = map.entry(entry.request.neighborhood.as_str()).or_insert((0, 0, 0));
        slot.0 += 1;
        slot.1 += entry.score;
        if entry.tier == Tier::Critical {
            slot.2 += 1;
        }
    }

    let mut summaries: Vec<NeighborhoodSummary> = map
        .into_iter()
        .map(|(neighborhood, (count, total, critical))| NeighborhoodSummary {
            neighborhood: neighborhood.to_string(),
            count,
            avg_score: if count == 0 {
                0.0
            } else {
                f64::from(total) / count as f64
            },
            critical,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.critical
            .cmp(&a.critical)
            .then_with(|| b.count.cmp(&a.count))
            .then_with(|| a.neighborhood.cmp(&b.neighborhood))
    });
    summaries
}

pub fn format_days(days: Option<u32>) -> String {
    match days {
        Some(1) => "1 day".to_string(),
        Some(days) => format!("{days} days"),
        None => "never at this rate".to_string(),
    }
}

pub fn build_report(
    as_of: DateTime<Utc>,
    weights: &WeightSet,
    ranked: &[PrioritizedRequest],
    projection: &ProjectionResult,
    limit: usize,
) -> String {
    let summaries = summarize_by_neighborhood(ranked);
    let mut output = String::new();

    let _ = writeln!(output, "# Service Demand Priority Report");
    let _ = writeln!(output, "Backlog as of {}", as_of.format("%Y-%m-%d %H:%M UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Weights");
    for factor in Factor::ALL {
        let _ = writeln!(output, "- {}: {}", factor.as_str(), weights.get(factor));
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Tier Mix");
    if ranked.is_empty() {
        let _ = writeln!(output, "No open requests.");
    } else {
        for tier in &projection.tiers {
            let _ = writeln!(output, "- {}: {} requests", tier.tier.as_str(), tier.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Priority Requests");
    if ranked.is_empty() {
        let _ = writeln!(output, "No open requests.");
    } else {
        for entry in ranked.iter().take(limit) {
            let _ = writeln!(
                output,
                "- {} ({}, {}) score {} [{}]",
                entry.request.protocol,
                entry.request.category,
                entry.request.neighborhood,
                entry.score,
                entry.tier.as_str()
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Neighborhoods");
    if summaries.is_empty() {
        let _ = writeln!(output, "No open requests.");
    } else {
        for summary in &summaries {
            let _ = writeln!(
                output,
                "- {}: {} open, {} critical (avg score {:.1})",
                summary.neighborhood, summary.count, summary.critical, summary.avg_score
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Capacity");
    let _ = writeln!(
        output,
        "Observed throughput {:.2} requests/day; backlog of {} clears in {}.",
        projection.throughput_per_day,
        projection.backlog_size,
        format_days(projection.current_clearance_days)
    );
    if projection.capacity_delta != 0.0 {
        let _ = writeln!(
            output,
            "With {:+.2} requests/day it clears in {}.",
            projection.capacity_delta,
            format_days(projection.projected_clearance_days)
        );
    }
    for tier in &projection.tiers {
        let _ = writeln!(
            output,
            "- through {}: {}",
            tier.tier.as_str(),
            format_days(tier.cumulative_days)
        );
    }

    output
}
