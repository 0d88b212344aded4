//! Backlog clearance projection.
//!
//! First-order single-queue model: clearance = ceil(backlog / throughput).
//! Arrivals during the projection window are ignored.

use chrono::{DateTime, Duration, Utc};

use crate::models::{PrioritizedRequest, ProjectionResult, ServiceRequest, Tier, TierClearance};

pub const DEFAULT_WINDOW_DAYS: u32 = 28;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ProjectionError {
    #[error("capacity delta must be a finite number, got {0}")]
    NonFiniteDelta(f64),
    #[error("throughput window must span at least one day")]
    EmptyWindow,
}

/// How historical throughput is measured: resolutions in the trailing
/// `window_days` divided by the window length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThroughputPolicy {
    pub window_days: u32,
}

impl Default for ThroughputPolicy {
    fn default() -> Self {
        Self {
            window_days: DEFAULT_WINDOW_DAYS,
        }
    }
}

impl ThroughputPolicy {
    pub fn new(window_days: u32) -> Result<Self, ProjectionError> {
        if window_days == 0 {
            return Err(ProjectionError::EmptyWindow);
        }
        Ok(Self { window_days })
    }

    pub fn window_start(&self, as_of: DateTime<Utc>) -> DateTime<Utc> {
        as_of - Duration::days(i64::from(self.window_days))
    }

    /// Average requests resolved per day. Requests without a resolution time
    /// or resolved outside the window do not count.
    pub fn throughput(&self, resolved: &[ServiceRequest], as_of: DateTime<Utc>) -> f64 {
        let start = self.window_start(as_of);
        let count = resolved
            .iter()
            .filter_map(|request| request.resolved_at)
            .filter(|at| *at > start && *at <= as_of)
            .count();
        count as f64 / f64::from(self.window_days)
    }
}

/// Days to work off `backlog` requests at `rate` per day.
pub fn clearance_days(backlog: usize, rate: f64) -> Option<u32> {
    if backlog == 0 {
        return Some(0);
    }
    if rate <= 0.0 {
        return None;
    }
    let days = (backlog as f64 / rate).ceil();
    if days > f64::from(u32::MAX) {
        None
    } else {
        Some(days as u32)
    }
}

pub fn project(
    ranked: &[PrioritizedRequest],
    throughput_per_day: f64,
    capacity_delta: f64,
) -> Result<ProjectionResult, ProjectionError> {
    if !capacity_delta.is_finite() {
        return Err(ProjectionError::NonFiniteDelta(capacity_delta));
    }

    let backlog_size = ranked.len();
    let projected_rate = throughput_per_day + capacity_delta;
    let current_clearance_days = clearance_days(backlog_size, throughput_per_day);
    let projected_clearance_days = clearance_days(backlog_size, projected_rate);
    let days_saved = match (current_clearance_days, projected_clearance_days) {
        (Some(current), Some(projected)) => Some(i64::from(current) - i64::from(projected)),
        _ => None,
    };

    let mut cumulative = 0usize;
    let tiers = Tier::ALL
        .iter()
        .map(|tier| {
            let count = ranked.iter().filter(|entry| entry.tier == *tier).count();
            cumulative += count;
            TierClearance {
                tier: *tier,
                count,
                cumulative_days: clearance_days(cumulative, projected_rate),
            }
        })
        .collect();

    tracing::debug!(
        backlog_size,
        throughput_per_day,
        capacity_delta,
        ?current_clearance_days,
        ?projected_clearance_days,
        "capacity projection"
    );

    Ok(ProjectionResult {
        backlog_size,
        throughput_per_day,
        capacity_delta,
        current_clearance_days,
        projected_clearance_days,
        days_saved,
        tiers,
    })
}
