use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Open,
    InProgress,
    Resolved,
    Archived,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in_progress",
            Self::Resolved => "resolved",
            Self::Archived => "archived",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "in_progress" => Some(Self::InProgress),
            "resolved" => Some(Self::Resolved),
            "archived" => Some(Self::Archived),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Closed work never enters a ranking pass.
    pub fn is_closed(self) -> bool {
        matches!(self, Self::Resolved | Self::Archived | Self::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLabel {
    Low,
    Medium,
    High,
    Urgent,
}

impl PriorityLabel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "urgent" => Some(Self::Urgent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub protocol: String,
    pub status: RequestStatus,
    pub category: String,
    pub neighborhood: String,
    pub secretariat: Option<String>,
    pub priority_label: PriorityLabel,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub sla_deadline: Option<DateTime<Utc>>,
}

impl ServiceRequest {
    /// `resolved_at` must be present exactly when the status is `resolved`.
    pub fn check_consistency(&self) -> Result<(), String> {
        match (self.status, self.resolved_at) {
            (RequestStatus::Resolved, None) => Err(format!(
                "request {} is resolved but has no resolved_at",
                self.protocol
            )),
            (status, Some(_)) if status != RequestStatus::Resolved => Err(format!(
                "request {} has resolved_at but status {}",
                self.protocol,
                status.as_str()
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NeighborhoodRiskRecord {
    pub neighborhood: String,
    pub risk_score: i32,
    pub recurring_issue_tags: BTreeSet<String>,
}

/// The six scoring factors, in the order they are listed to operators.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Severity,
    PeopleImpact,
    Urgency,
    LocationCriticality,
    WaitTime,
    Recurrence,
}

impl Factor {
    pub const ALL: [Factor; 6] = [
        Factor::Severity,
        Factor::PeopleImpact,
        Factor::Urgency,
        Factor::LocationCriticality,
        Factor::WaitTime,
        Factor::Recurrence,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Severity => "severity",
            Self::PeopleImpact => "people_impact",
            Self::Urgency => "urgency",
            Self::LocationCriticality => "location_criticality",
            Self::WaitTime => "wait_time",
            Self::Recurrence => "recurrence",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|factor| factor.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct PriorityMetrics {
    pub severity: u8,
    pub people_impact: u8,
    pub urgency: u8,
    pub location_criticality: u8,
    pub wait_time: u8,
    pub recurrence: u8,
}

impl PriorityMetrics {
    pub fn get(&self, factor: Factor) -> u8 {
        match factor {
            Factor::Severity => self.severity,
            Factor::PeopleImpact => self.people_impact,
            Factor::Urgency => self.urgency,
            Factor::LocationCriticality => self.location_criticality,
            Factor::WaitTime => self.wait_time,
            Factor::Recurrence => self.recurrence,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash, Ord, PartialOrd)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Critical,
    High,
    Medium,
    Low,
}

impl Tier {
    pub const CRITICAL_MIN: u32 = 40;
    pub const HIGH_MIN: u32 = 30;
    pub const MEDIUM_MIN: u32 = 20;

    /// Ordered from most to least urgent.
    pub const ALL: [Tier; 4] = [Tier::Critical, Tier::High, Tier::Medium, Tier::Low];

    pub fn from_score(score: u32) -> Self {
        if score >= Self::CRITICAL_MIN {
            Self::Critical
        } else if score >= Self::HIGH_MIN {
            Self::High
        } else if score >= Self::MEDIUM_MIN {
            Self::Medium
        } else {
            Self::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tier| tier.as_str() == value)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PrioritizedRequest {
    pub request: ServiceRequest,
    pub metrics: PriorityMetrics,
    pub score: u32,
    pub tier: Tier,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TierClearance {
    pub tier: Tier,
    pub count: usize,
    /// Days until every request of this tier and all tiers above it is
    /// cleared, working the backlog in rank order.
    pub cumulative_days: Option<u32>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProjectionResult {
    pub backlog_size: usize,
    pub throughput_per_day: f64,
    pub capacity_delta: f64,
    /// `None` when the backlog never clears at the observed throughput.
    pub current_clearance_days: Option<u32>,
    pub projected_clearance_days: Option<u32>,
    pub days_saved: Option<i64>,
    pub tiers: Vec<TierClearance>,
}
