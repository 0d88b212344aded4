//! The in-process surface the dashboard talks to.
//!
//! The engine holds one published snapshot of requests, the current weights
//! and the ranked list derived from both. Every change to either input is a
//! full recomputation that replaces the published list wholesale.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::capacity::{self, ProjectionError, ThroughputPolicy};
use crate::models::{NeighborhoodRiskRecord, PrioritizedRequest, ProjectionResult, ServiceRequest};
use crate::ranker::{self, RankFilter};
use crate::weights::{WeightError, WeightSet};

/// Read side of the request store.
pub trait RequestRepository {
    fn list_open_requests(&self) -> anyhow::Result<Vec<ServiceRequest>>;
    fn list_resolved_requests(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<ServiceRequest>>;
}

/// Immutable inputs of one ranking pass, captured at `as_of`.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    pub as_of: DateTime<Utc>,
    pub open: Vec<ServiceRequest>,
    pub resolved: Vec<ServiceRequest>,
}

impl RequestSnapshot {
    pub fn empty(as_of: DateTime<Utc>) -> Self {
        Self {
            as_of,
            open: Vec::new(),
            resolved: Vec::new(),
        }
    }

    /// Pull open work plus enough resolved history to cover both the
    /// throughput window and the recurrence window.
    pub fn capture<R: RequestRepository + ?Sized>(
        repository: &R,
        policy: ThroughputPolicy,
        as_of: DateTime<Utc>,
    ) -> anyhow::Result<Self> {
        let recurrence_start =
            as_of - chrono::Duration::days(crate::extract::RECURRENCE_WINDOW_DAYS);
        let since = policy.window_start(as_of).min(recurrence_start);
        Ok(Self {
            as_of,
            open: repository.list_open_requests()?,
            resolved: repository.list_resolved_requests(since)?,
        })
    }
}

pub struct PriorityEngine {
    weights: Arc<WeightSet>,
    risk: HashMap<String, NeighborhoodRiskRecord>,
    policy: ThroughputPolicy,
    snapshot: Arc<RequestSnapshot>,
    ranked: Arc<[PrioritizedRequest]>,
}

impl PriorityEngine {
    pub fn new(
        weights: WeightSet,
        risk: HashMap<String, NeighborhoodRiskRecord>,
        policy: ThroughputPolicy,
        snapshot: RequestSnapshot,
    ) -> Self {
        let mut engine = Self {
            weights: Arc::new(weights),
            risk,
            policy,
            snapshot: Arc::new(snapshot),
            ranked: Arc::from(Vec::new()),
        };
        engine.recompute();
        engine
    }

    /// The weights in effect right now. Callers keep the snapshot they got
    /// even if the weights are replaced afterwards.
    pub fn weights(&self) -> Arc<WeightSet> {
        Arc::clone(&self.weights)
    }

    /// Replace the weights wholesale and re-rank.
    pub fn set_weights(&mut self, weights: WeightSet) {
        if *self.weights == weights {
            return;
        }
        self.weights = Arc::new(weights);
        tracing::info!(?weights, "weights replaced");
        self.recompute();
    }

    /// Validate an untyped weight table and swap it in. On error nothing
    /// changes and the previous weights stay in effect.
    pub fn set_weights_from(&mut self, values: &serde_json::Value) -> Result<(), WeightError> {
        let weights = WeightSet::create(values).inspect_err(|err| {
            tracing::warn!(%err, "rejected weight replacement");
        })?;
        self.set_weights(weights);
        Ok(())
    }

    pub fn replace_snapshot(&mut self, snapshot: RequestSnapshot) {
        self.snapshot = Arc::new(snapshot);
        self.recompute();
    }

    pub fn refresh<R: RequestRepository + ?Sized>(
        &mut self,
        repository: &R,
        as_of: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        let snapshot = RequestSnapshot::capture(repository, self.policy, as_of)?;
        self.replace_snapshot(snapshot);
        Ok(())
    }

    pub fn snapshot(&self) -> Arc<RequestSnapshot> {
        Arc::clone(&self.snapshot)
    }

    /// The full published ranking.
    pub fn ranked(&self) -> Arc<[PrioritizedRequest]> {
        Arc::clone(&self.ranked)
    }

    pub fn ranked_list(&self, filter: &RankFilter) -> Vec<PrioritizedRequest> {
        filter.apply(&self.ranked).into_iter().cloned().collect()
    }

    pub fn throughput(&self) -> f64 {
        self.policy
            .throughput(&self.snapshot.resolved, self.snapshot.as_of)
    }

    pub fn project_capacity(&self, capacity_delta: f64) -> Result<ProjectionResult, ProjectionError> {
        capacity::project(&self.ranked, self.throughput(), capacity_delta)
    }

    fn recompute(&mut self) {
        let snapshot = Arc::clone(&self.snapshot);
        let weights = Arc::clone(&self.weights);
        let ranked = ranker::rank(
            &snapshot.open,
            &snapshot.resolved,
            &weights,
            &self.risk,
            snapshot.as_of,
        );
        tracing::debug!(
            open = snapshot.open.len(),
            ranked = ranked.len(),
            "published ranking"
        );
        self.ranked = Arc::from(ranked);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PriorityLabel, RequestStatus, Tier};
    use chrono::{Duration, TimeZone};
    use serde_json::json;
    use std::cell::Cell;
    use uuid::Uuid;

    fn as_of() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 8, 10, 10, 0, 0).unwrap()
    }

    fn request(n: u128, label: PriorityLabel, status: RequestStatus, days_ago: i64) -> ServiceRequest {
        let created_at = as_of() - Duration::days(days_ago);
        ServiceRequest {
            id: Uuid::from_u128(n),
            protocol: format!("2026-{n:06}"),
            status,
            category: "street_lighting".to_string(),
            neighborhood: "Leste".to_string(),
            secretariat: Some("infrastructure".to_string()),
            priority_label: label,
            created_at,
            resolved_at: (status == RequestStatus::Resolved).then(|| created_at + Duration::days(1)),
            sla_deadline: Some(created_at + Duration::hours(48)),
        }
    }

    struct FakeRepository {
        open: Vec<ServiceRequest>,
        resolved: Vec<ServiceRequest>,
        resolved_since: Cell<Option<DateTime<Utc>>>,
    }

    impl RequestRepository for FakeRepository {
        fn list_open_requests(&self) -> anyhow::Result<Vec<ServiceRequest>> {
            Ok(self.open.clone())
        }

        fn list_resolved_requests(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<ServiceRequest>> {
            self.resolved_since.set(Some(since));
            Ok(self
                .resolved
                .iter()
                .filter(|request| request.resolved_at.is_some_and(|at| at >= since))
                .cloned()
                .collect())
        }
    }

    fn repository() -> FakeRepository {
        FakeRepository {
            open: vec![
                request(1, PriorityLabel::Low, RequestStatus::Open, 1),
                request(2, PriorityLabel::Urgent, RequestStatus::InProgress, 3),
                request(3, PriorityLabel::Medium, RequestStatus::Open, 2),
            ],
            resolved: (10..66)
                .map(|n| request(n, PriorityLabel::Medium, RequestStatus::Resolved, (n % 27) as i64 + 1))
                .collect(),
            resolved_since: Cell::new(None),
        }
    }

    fn engine() -> PriorityEngine {
        let mut engine = PriorityEngine::new(
            WeightSet::default(),
            HashMap::new(),
            ThroughputPolicy::default(),
            RequestSnapshot::empty(as_of()),
        );
        engine.refresh(&repository(), as_of()).unwrap();
        engine
    }

    #[test]
    fn capture_reaches_back_over_recurrence_window() {
        let repository = repository();
        RequestSnapshot::capture(&repository, ThroughputPolicy::default(), as_of()).unwrap();
        assert_eq!(repository.resolved_since.get(), Some(as_of() - Duration::days(90)));
    }

    #[test]
    fn empty_engine_has_empty_ranking() {
        let engine = PriorityEngine::new(
            WeightSet::default(),
            HashMap::new(),
            ThroughputPolicy::default(),
            RequestSnapshot::empty(as_of()),
        );
        assert!(engine.ranked_list(&RankFilter::default()).is_empty());
        let projection = engine.project_capacity(5.0).unwrap();
        assert_eq!(projection.current_clearance_days, Some(0));
    }

    #[test]
    fn refresh_ranks_open_work() {
        let engine = engine();
        let ids: Vec<u128> = engine
            .ranked_list(&RankFilter::default())
            .iter()
            .map(|entry| entry.request.id.as_u128())
            .collect();
        assert_eq!(ids, vec![2, 3, 1]);
    }

    #[test]
    fn replacing_weights_reranks() {
        let mut engine = engine();
        let before = engine.weights();
        let wait_only = json!({
            "severity": 0,
            "people_impact": 0,
            "urgency": 0,
            "location_criticality": 0,
            "wait_time": 5,
            "recurrence": 0
        });
        engine.set_weights_from(&wait_only).unwrap();

        assert_eq!(*before, WeightSet::default());
        let ranked = engine.ranked_list(&RankFilter::default());
        assert_eq!(ranked[0].request.id, Uuid::from_u128(2));
        assert_eq!(ranked[0].score, 15);
        assert_eq!(ranked[1].score, 10);
        assert_eq!(ranked[2].score, 5);
    }

    #[test]
    fn invalid_weights_leave_previous_set_in_place() {
        let mut engine = engine();
        let before = engine.ranked();
        let err = engine
            .set_weights_from(&json!({ "severity": 9 }))
            .unwrap_err();
        assert!(matches!(err, WeightError::Missing(_)));
        assert_eq!(*engine.weights(), WeightSet::default());
        assert_eq!(&*engine.ranked(), &*before);
    }

    #[test]
    fn filtered_view_keeps_rank_order() {
        let engine = engine();
        let filter = RankFilter {
            status: Some(RequestStatus::Open),
            ..RankFilter::default()
        };
        let ids: Vec<u128> = engine
            .ranked_list(&filter)
            .iter()
            .map(|entry| entry.request.id.as_u128())
            .collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn projection_uses_resolved_history() {
        let engine = engine();
        assert_eq!(engine.throughput(), 2.0);
        let projection = engine.project_capacity(1.0).unwrap();
        assert_eq!(projection.backlog_size, 3);
        assert_eq!(projection.current_clearance_days, Some(2));
        assert_eq!(projection.projected_clearance_days, Some(1));
        assert_eq!(projection.tiers.iter().map(|tier| tier.count).sum::<usize>(), 3);
        assert!(projection.tiers.iter().any(|tier| tier.tier == Tier::Critical));
    }
}
