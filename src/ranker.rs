use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use crate::extract::{normalize_category, MetricExtractor, RecurrenceIndex, RiskRegistry};
use crate::models::{PrioritizedRequest, RequestStatus, ServiceRequest, Tier};
use crate::score;
use crate::weights::WeightSet;

/// Score and order every unclosed request in `requests`.
///
/// `history` feeds only the recurrence metric; it may include resolved work
/// and may overlap `requests`. Cancelled and archived requests never count
/// towards recurrence.
pub fn rank<R: RiskRegistry + ?Sized>(
    requests: &[ServiceRequest],
    history: &[ServiceRequest],
    weights: &WeightSet,
    risk: &R,
    as_of: DateTime<Utc>,
) -> Vec<PrioritizedRequest> {
    let index = RecurrenceIndex::build(unique_requests(requests, history));
    let extractor = MetricExtractor::new(risk, &index, as_of);

    let mut ranked: Vec<PrioritizedRequest> = requests
        .iter()
        .filter(|request| !request.status.is_closed())
        .map(|request| {
            let metrics = extractor.extract(request);
            let (score, tier) = score::score_and_tier(&metrics, weights);
            PrioritizedRequest {
                request: request.clone(),
                metrics,
                score,
                tier,
            }
        })
        .collect();

    ranked.sort_by(rank_order);
    tracing::debug!(
        input = requests.len(),
        ranked = ranked.len(),
        "ranking pass complete"
    );
    ranked
}

/// Highest score first, then oldest, then lowest id.
pub fn rank_order(a: &PrioritizedRequest, b: &PrioritizedRequest) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| a.request.created_at.cmp(&b.request.created_at))
        .then_with(|| a.request.id.cmp(&b.request.id))
}

fn unique_requests<'a>(
    requests: &'a [ServiceRequest],
    history: &'a [ServiceRequest],
) -> impl Iterator<Item = &'a ServiceRequest> {
    let open_ids: std::collections::HashSet<uuid::Uuid> =
        requests.iter().map(|request| request.id).collect();
    requests
        .iter()
        .chain(
            history
                .iter()
                .filter(move |request| !open_ids.contains(&request.id)),
        )
        .filter(|request| {
            !matches!(
                request.status,
                RequestStatus::Cancelled | RequestStatus::Archived
            )
        })
}

/// A view over an already ranked list. Filtering only drops entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankFilter {
    pub secretariat: Option<String>,
    pub category: Option<String>,
    pub neighborhood: Option<String>,
    pub status: Option<RequestStatus>,
    pub min_score: Option<u32>,
    pub tier: Option<Tier>,
}

impl RankFilter {
    pub fn matches(&self, entry: &PrioritizedRequest) -> bool {
        let request = &entry.request;
        self.secretariat
            .as_deref()
            .map_or(true, |value| {
                request
                    .secretariat
                    .as_deref()
                    .is_some_and(|secretariat| secretariat.eq_ignore_ascii_case(value))
            })
            && self.category.as_deref().map_or(true, |value| {
                normalize_category(&request.category) == normalize_category(value)
            })
            && self
                .neighborhood
                .as_deref()
                .map_or(true, |value| request.neighborhood.eq_ignore_ascii_case(value))
            && self.status.map_or(true, |value| request.status == value)
            && self.min_score.map_or(true, |value| entry.score >= value)
            && self.tier.map_or(true, |value| entry.tier == value)
    }

    pub fn apply<'a>(&self, ranked: &'a [PrioritizedRequest]) -> Vec<&'a PrioritizedRequest> {
        ranked.iter().filter(|entry| self.matches(entry)).collect()
    }
}
