//! File-based snapshot sources and the in-memory repository both adapters
//! load into.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::engine::RequestRepository;
use crate::models::{NeighborhoodRiskRecord, PriorityLabel, RequestStatus, ServiceRequest};

#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    requests: Vec<ServiceRequest>,
}

impl InMemoryRepository {
    pub fn new(requests: Vec<ServiceRequest>) -> Self {
        Self { requests }
    }
}

impl RequestRepository for InMemoryRepository {
    fn list_open_requests(&self) -> anyhow::Result<Vec<ServiceRequest>> {
        Ok(self
            .requests
            .iter()
            .filter(|request| !request.status.is_closed())
            .cloned()
            .collect())
    }

    fn list_resolved_requests(&self, since: DateTime<Utc>) -> anyhow::Result<Vec<ServiceRequest>> {
        Ok(self
            .requests
            .iter()
            .filter(|request| request.status == RequestStatus::Resolved)
            .filter(|request| request.resolved_at.is_some_and(|at| at >= since))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Deserialize)]
pub struct RequestRow {
    pub id: Option<Uuid>,
    pub protocol: String,
    pub status: String,
    pub category: String,
    pub neighborhood: String,
    pub secretariat: Option<String>,
    pub priority_label: String,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub sla_deadline: Option<DateTime<Utc>>,
}

impl RequestRow {
    pub fn into_request(self) -> anyhow::Result<ServiceRequest> {
        let status = RequestStatus::parse(self.status.trim())
            .with_context(|| format!("unknown status `{}` on {}", self.status, self.protocol))?;
        let priority_label = PriorityLabel::parse(self.priority_label.trim()).with_context(|| {
            format!(
                "unknown priority label `{}` on {}",
                self.priority_label, self.protocol
            )
        })?;
        let request = ServiceRequest {
            id: self.id.unwrap_or_else(|| protocol_id(&self.protocol)),
            protocol: self.protocol,
            status,
            category: self.category,
            neighborhood: self.neighborhood,
            secretariat: self.secretariat.filter(|value| !value.trim().is_empty()),
            priority_label,
            created_at: self.created_at,
            resolved_at: self.resolved_at,
            sla_deadline: self.sla_deadline,
        };
        if let Err(reason) = request.check_consistency() {
            bail!(reason);
        }
        Ok(request)
    }
}

#[derive(Debug, Deserialize)]
pub struct RiskRow {
    pub neighborhood: String,
    pub risk_score: i32,
    /// Semicolon separated, e.g. `drainage;flooding`.
    #[serde(default)]
    pub recurring_issue_tags: String,
}

impl RiskRow {
    pub fn into_record(self) -> anyhow::Result<NeighborhoodRiskRecord> {
        if !(0..=100).contains(&self.risk_score) {
            bail!(
                "risk score for {} must be between 0 and 100, got {}",
                self.neighborhood,
                self.risk_score
            );
        }
        Ok(NeighborhoodRiskRecord {
            neighborhood: self.neighborhood,
            risk_score: self.risk_score,
            recurring_issue_tags: split_tags(&self.recurring_issue_tags),
        })
    }
}

/// Stable id for rows that carry only a protocol, so the id tie-break in a
/// ranking is the same on every load.
pub fn protocol_id(protocol: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, protocol.trim().as_bytes())
}

pub fn split_tags(raw: &str) -> BTreeSet<String> {
    raw.split(';')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn read_requests_csv(path: &Path) -> anyhow::Result<Vec<ServiceRequest>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut requests = Vec::new();

    for (line, result) in reader.deserialize::<RequestRow>().enumerate() {
        let row = result.with_context(|| format!("bad request row {} in {}", line + 1, path.display()))?;
        requests.push(row.into_request()?);
    }

    tracing::debug!(count = requests.len(), path = %path.display(), "loaded requests");
    Ok(requests)
}

pub fn read_risk_csv(path: &Path) -> anyhow::Result<Vec<NeighborhoodRiskRecord>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    let mut records = Vec::new();

    for (line, result) in reader.deserialize::<RiskRow>().enumerate() {
        let row = result.with_context(|| format!("bad risk row {} in {}", line + 1, path.display()))?;
        records.push(row.into_record()?);
    }

    Ok(records)
}

pub fn risk_registry(records: Vec<NeighborhoodRiskRecord>) -> HashMap<String, NeighborhoodRiskRecord> {
    records
        .into_iter()
        .map(|record| (record.neighborhood.clone(), record))
        .collect()
}
