//! Per-request metric derivation.
//!
//! Every rule here is fixed; operators tune only the weights applied on top.
//! All time arithmetic is relative to the snapshot's `as_of` instant.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

use crate::models::{NeighborhoodRiskRecord, PriorityLabel, PriorityMetrics, ServiceRequest};

pub const METRIC_MAX: u8 = 5;

pub const SEVERITY_BY_LABEL: [(PriorityLabel, u8); 4] = [
    (PriorityLabel::Urgent, 5),
    (PriorityLabel::High, 4),
    (PriorityLabel::Medium, 2),
    (PriorityLabel::Low, 1),
];

/// Shared infrastructure reaches more residents than point-source issues.
pub const PEOPLE_IMPACT_BY_CATEGORY: [(&str, u8); 16] = [
    ("water", 5),
    ("water_supply", 5),
    ("sewage", 5),
    ("drainage", 5),
    ("flooding", 5),
    ("street_lighting", 4),
    ("lighting", 4),
    ("traffic_signal", 4),
    ("public_transport", 4),
    ("pothole", 3),
    ("paving", 3),
    ("waste_collection", 3),
    ("tree_pruning", 2),
    ("illegal_dumping", 2),
    ("noise", 1),
    ("graffiti", 1),
];

pub const PEOPLE_IMPACT_DEFAULT: u8 = 2;

/// `(hours remaining at most, metric)`, checked in order. Overdue counts as 5.
pub const URGENCY_BANDS: [(i64, u8); 2] = [(24, 5), (72, 3)];
pub const URGENCY_OVERDUE: u8 = 5;
pub const URGENCY_BASELINE: u8 = 1;

pub const RISK_BAND_WIDTH: i32 = 20;
pub const LOCATION_DEFAULT_BAND: u8 = 1;

pub const RECURRENCE_WINDOW_DAYS: i64 = 90;

/// Lookup into the neighborhood risk registry. A missing record is a valid
/// answer, never an error.
pub trait RiskRegistry {
    fn risk_for(&self, neighborhood: &str) -> Option<&NeighborhoodRiskRecord>;
}

impl RiskRegistry for HashMap<String, NeighborhoodRiskRecord> {
    fn risk_for(&self, neighborhood: &str) -> Option<&NeighborhoodRiskRecord> {
        self.get(neighborhood)
    }
}

pub fn normalize_category(category: &str) -> String {
    category
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == ' ' || c == '-' { '_' } else { c })
        .collect()
}

pub fn severity(label: PriorityLabel) -> u8 {
    SEVERITY_BY_LABEL
        .iter()
        .find(|(candidate, _)| *candidate == label)
        .map(|(_, metric)| *metric)
        .unwrap_or(1)
}

pub fn people_impact(category: &str) -> u8 {
    let key = normalize_category(category);
    PEOPLE_IMPACT_BY_CATEGORY
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, metric)| *metric)
        .unwrap_or(PEOPLE_IMPACT_DEFAULT)
}

pub fn urgency(sla_deadline: Option<DateTime<Utc>>, as_of: DateTime<Utc>) -> u8 {
    let Some(deadline) = sla_deadline else {
        return URGENCY_BASELINE;
    };
    if deadline <= as_of {
        return URGENCY_OVERDUE;
    }
    let remaining = deadline - as_of;
    URGENCY_BANDS
        .iter()
        .find(|(hours, _)| remaining <= Duration::hours(*hours))
        .map(|(_, metric)| *metric)
        .unwrap_or(URGENCY_BASELINE)
}

/// Risk scores 0-19 land in band 1 and 80-100 in band 5.
pub fn location_criticality(record: Option<&NeighborhoodRiskRecord>) -> u8 {
    match record {
        Some(record) => {
            let band = record.risk_score.clamp(0, 100) / RISK_BAND_WIDTH + 1;
            band.min(i32::from(METRIC_MAX)) as u8
        }
        None => LOCATION_DEFAULT_BAND,
    }
}

pub fn wait_time(created_at: DateTime<Utc>, as_of: DateTime<Utc>) -> u8 {
    (as_of - created_at)
        .num_days()
        .clamp(0, i64::from(METRIC_MAX)) as u8
}

/// Creation times of every known request, keyed by neighborhood and
/// normalized category. Built once per ranking pass.
#[derive(Debug, Default)]
pub struct RecurrenceIndex {
    created: HashMap<(String, String), Vec<DateTime<Utc>>>,
}

impl RecurrenceIndex {
    pub fn build<'a>(requests: impl IntoIterator<Item = &'a ServiceRequest>) -> Self {
        let mut created: HashMap<(String, String), Vec<DateTime<Utc>>> = HashMap::new();
        for request in requests {
            created
                .entry((
                    request.neighborhood.clone(),
                    normalize_category(&request.category),
                ))
                .or_default()
                .push(request.created_at);
        }
        Self { created }
    }

    /// Number of requests in the same neighborhood and category created in
    /// the trailing window, the request itself excluded. Zero unless the
    /// category is a recurring issue tag for that neighborhood.
    pub fn recurrence(
        &self,
        request: &ServiceRequest,
        record: Option<&NeighborhoodRiskRecord>,
        as_of: DateTime<Utc>,
    ) -> u8 {
        let category = normalize_category(&request.category);
        let tagged = record.is_some_and(|record| {
            record
                .recurring_issue_tags
                .iter()
                .any(|tag| normalize_category(tag) == category)
        });
        if !tagged {
            return 0;
        }

        let window_start = as_of - Duration::days(RECURRENCE_WINDOW_DAYS);
        let in_window = self
            .created
            .get(&(request.neighborhood.clone(), category))
            .map(|times| {
                times
                    .iter()
                    .filter(|at| **at >= window_start && **at <= as_of)
                    .count()
            })
            .unwrap_or(0);
        let own = usize::from(request.created_at >= window_start && request.created_at <= as_of);

        in_window
            .saturating_sub(own)
            .min(usize::from(METRIC_MAX)) as u8
    }
}

pub struct MetricExtractor<'a, R: RiskRegistry + ?Sized> {
    risk: &'a R,
    recurrence: &'a RecurrenceIndex,
    as_of: DateTime<Utc>,
}

impl<'a, R: RiskRegistry + ?Sized> MetricExtractor<'a, R> {
    pub fn new(risk: &'a R, recurrence: &'a RecurrenceIndex, as_of: DateTime<Utc>) -> Self {
        Self {
            risk,
            recurrence,
            as_of,
        }
    }

    pub fn extract(&self, request: &ServiceRequest) -> PriorityMetrics {
        let record = self.risk.risk_for(&request.neighborhood);
        PriorityMetrics {
            severity: severity(request.priority_label),
            people_impact: people_impact(&request.category),
            urgency: urgency(request.sla_deadline, self.as_of),
            location_criticality: location_criticality(record),
            wait_time: wait_time(request.created_at, self.as_of),
            recurrence: self.recurrence.recurrence(request, record, self.as_of),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RequestStatus;
    use chrono::TimeZone;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 20, 12, 0, 0).unwrap()
    }

    fn record(score: i32, tags: &[&str]) -> NeighborhoodRiskRecord {
        NeighborhoodRiskRecord {
            neighborhood: "Vila Nova".to_string(),
            risk_score: score,
            recurring_issue_tags: tags.iter().map(|tag| tag.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    fn request(n: u128, category: &str, days_ago: i64) -> ServiceRequest {
        ServiceRequest {
            id: Uuid::from_u128(n),
            protocol: format!("2026-{n:06}"),
            status: RequestStatus::Open,
            category: category.to_string(),
            neighborhood: "Vila Nova".to_string(),
            secretariat: None,
            priority_label: PriorityLabel::Medium,
            created_at: as_of() - Duration::days(days_ago),
            resolved_at: None,
            sla_deadline: None,
        }
    }

    #[test]
    fn severity_table() {
        assert_eq!(severity(PriorityLabel::Urgent), 5);
        assert_eq!(severity(PriorityLabel::High), 4);
        assert_eq!(severity(PriorityLabel::Medium), 2);
        assert_eq!(severity(PriorityLabel::Low), 1);
    }

    #[test]
    fn people_impact_favors_shared_infrastructure() {
        assert_eq!(people_impact("Water"), 5);
        assert_eq!(people_impact("street lighting"), 4);
        assert_eq!(people_impact("graffiti"), 1);
        assert_eq!(people_impact("something new"), PEOPLE_IMPACT_DEFAULT);
        assert!(people_impact("drainage") > people_impact("pothole"));
    }

    #[test]
    fn urgency_follows_deadline_proximity() {
        let now = as_of();
        assert_eq!(urgency(None, now), 1);
        assert_eq!(urgency(Some(now - Duration::hours(1)), now), 5);
        assert_eq!(urgency(Some(now), now), 5);
        assert_eq!(urgency(Some(now + Duration::hours(24)), now), 5);
        assert_eq!(urgency(Some(now + Duration::hours(25)), now), 3);
        assert_eq!(urgency(Some(now + Duration::hours(72)), now), 3);
        assert_eq!(urgency(Some(now + Duration::hours(73)), now), 1);
    }

    #[test]
    fn location_bands() {
        assert_eq!(location_criticality(None), 1);
        assert_eq!(location_criticality(Some(&record(0, &[]))), 1);
        assert_eq!(location_criticality(Some(&record(19, &[]))), 1);
        assert_eq!(location_criticality(Some(&record(20, &[]))), 2);
        assert_eq!(location_criticality(Some(&record(59, &[]))), 3);
        assert_eq!(location_criticality(Some(&record(80, &[]))), 5);
        assert_eq!(location_criticality(Some(&record(100, &[]))), 5);
        assert_eq!(location_criticality(Some(&record(250, &[]))), 5);
    }

    #[test]
    fn wait_time_is_capped() {
        let now = as_of();
        assert_eq!(wait_time(now - Duration::hours(23), now), 0);
        assert_eq!(wait_time(now - Duration::days(3), now), 3);
        assert_eq!(wait_time(now - Duration::days(40), now), 5);
        assert_eq!(wait_time(now + Duration::days(1), now), 0);
    }

    #[test]
    fn recurrence_counts_tagged_peers_in_window() {
        let target = request(1, "drainage", 1);
        let mut history = vec![target.clone()];
        history.extend((2..=4).map(|n| request(n, "drainage", 10 * n as i64)));
        history.push(request(9, "drainage", 120));
        history.push(request(10, "pothole", 2));
        let index = RecurrenceIndex::build(&history);

        let tagged = record(50, &["drainage"]);
        assert_eq!(index.recurrence(&target, Some(&tagged), as_of()), 3);

        let untagged = record(50, &["pothole"]);
        assert_eq!(index.recurrence(&target, Some(&untagged), as_of()), 0);
        assert_eq!(index.recurrence(&target, None, as_of()), 0);
    }

    #[test]
    fn recurrence_is_capped() {
        let history: Vec<_> = (1..=12).map(|n| request(n, "flooding", n as i64)).collect();
        let index = RecurrenceIndex::build(&history);
        let tagged = record(10, &["Flooding"]);
        assert_eq!(index.recurrence(&history[0], Some(&tagged), as_of()), 5);
    }

    #[test]
    fn extract_combines_all_rules() {
        let mut target = request(1, "water", 7);
        target.priority_label = PriorityLabel::Urgent;
        target.sla_deadline = Some(as_of() - Duration::hours(3));
        let mut registry = HashMap::new();
        registry.insert("Vila Nova".to_string(), record(45, &[]));
        let index = RecurrenceIndex::build([&target]);

        let metrics = MetricExtractor::new(&registry, &index, as_of()).extract(&target);
        assert_eq!(
            metrics,
            PriorityMetrics {
                severity: 5,
                people_impact: 5,
                urgency: 5,
                location_criticality: 3,
                wait_time: 5,
                recurrence: 0,
            }
        );
    }
}
