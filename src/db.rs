use std::collections::HashMap;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::models::{NeighborhoodRiskRecord, PriorityLabel, RequestStatus, ServiceRequest};
use crate::sources::{self, InMemoryRepository};

const REQUEST_COLUMNS: &str = "id, protocol, status, category, neighborhood, secretariat, \
     priority_label, created_at, resolved_at, sla_deadline";

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn seed(pool: &PgPool, now: DateTime<Utc>) -> anyhow::Result<()> {
    let risk = vec![
        ("Centro", 85, vec!["drainage", "street_lighting"]),
        ("Vila Nova", 62, vec!["water", "flooding"]),
        ("Jardim", 18, vec![]),
    ];

    for (neighborhood, score, tags) in risk {
        let tags: Vec<String> = tags.into_iter().map(str::to_string).collect();
        upsert_risk(pool, neighborhood, score, &tags).await?;
    }

    let requests = vec![
        ("seed-0001", "open", "drainage", "Centro", "infrastructure", "urgent", 6, Some(24)),
        ("seed-0002", "open", "drainage", "Centro", "infrastructure", "high", 2, Some(72)),
        ("seed-0003", "in_progress", "water", "Vila Nova", "sanitation", "high", 3, Some(48)),
        ("seed-0004", "open", "street_lighting", "Jardim", "infrastructure", "medium", 1, Some(120)),
        ("seed-0005", "open", "graffiti", "Jardim", "urban_services", "low", 9, None),
        ("seed-0006", "resolved", "pothole", "Centro", "works", "medium", 12, Some(96)),
        ("seed-0007", "resolved", "water", "Vila Nova", "sanitation", "urgent", 5, Some(24)),
        ("seed-0008", "cancelled", "noise", "Centro", "urban_services", "low", 4, None),
    ];

    for (protocol, status, category, neighborhood, secretariat, label, days_ago, sla_hours) in
        requests
    {
        let created_at = now - Duration::days(days_ago);
        let resolved_at = (status == "resolved").then(|| created_at + Duration::days(2));
        let sla_deadline = sla_hours.map(|hours| created_at + Duration::hours(hours));

        sqlx::query(
            r#"
            INSERT INTO demand_priority.service_requests
            (id, protocol, status, category, neighborhood, secretariat,
             priority_label, created_at, resolved_at, sla_deadline)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (protocol) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(protocol)
        .bind(status)
        .bind(category)
        .bind(neighborhood)
        .bind(secretariat)
        .bind(label)
        .bind(created_at)
        .bind(resolved_at)
        .bind(sla_deadline)
        .execute(pool)
        .await?;
    }

    Ok(())
}

async fn upsert_risk(
    pool: &PgPool,
    neighborhood: &str,
    risk_score: i32,
    tags: &[String],
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO demand_priority.neighborhood_risk
        (neighborhood, risk_score, recurring_issue_tags)
        VALUES ($1, $2, $3)
        ON CONFLICT (neighborhood) DO UPDATE
        SET risk_score = EXCLUDED.risk_score,
            recurring_issue_tags = EXCLUDED.recurring_issue_tags
        "#,
    )
    .bind(neighborhood)
    .bind(risk_score)
    .bind(tags)
    .execute(pool)
    .await?;
    Ok(())
}

fn request_from_row(row: &PgRow) -> anyhow::Result<ServiceRequest> {
    let protocol: String = row.get("protocol");
    let status: String = row.get("status");
    let label: String = row.get("priority_label");
    let request = ServiceRequest {
        id: row.get("id"),
        status: RequestStatus::parse(&status)
            .with_context(|| format!("unknown status `{status}` on {protocol}"))?,
        priority_label: PriorityLabel::parse(&label)
            .with_context(|| format!("unknown priority label `{label}` on {protocol}"))?,
        protocol,
        category: row.get("category"),
        neighborhood: row.get("neighborhood"),
        secretariat: row.get("secretariat"),
        created_at: row.get("created_at"),
        resolved_at: row.get("resolved_at"),
        sla_deadline: row.get("sla_deadline"),
    };
    if let Err(reason) = request.check_consistency() {
        tracing::warn!(%reason, "inconsistent request row");
        anyhow::bail!(reason);
    }
    Ok(request)
}

pub async fn fetch_open_requests(pool: &PgPool) -> anyhow::Result<Vec<ServiceRequest>> {
    let query = format!(
        "SELECT {REQUEST_COLUMNS} FROM demand_priority.service_requests \
         WHERE status IN ('open', 'in_progress')"
    );
    let rows = sqlx::query(&query).fetch_all(pool).await?;
    rows.iter().map(request_from_row).collect()
}

pub async fn fetch_resolved_requests(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> anyhow::Result<Vec<ServiceRequest>> {
    let query = format!(
        "SELECT {REQUEST_COLUMNS} FROM demand_priority.service_requests \
         WHERE status = 'resolved' AND resolved_at >= $1"
    );
    let rows = sqlx::query(&query).bind(since).fetch_all(pool).await?;
    rows.iter().map(request_from_row).collect()
}

/// Everything a ranking pass may ask for, loaded up front so the engine can
/// stay synchronous.
pub async fn load_repository(
    pool: &PgPool,
    since: DateTime<Utc>,
) -> anyhow::Result<InMemoryRepository> {
    let mut requests = fetch_open_requests(pool).await?;
    requests.extend(fetch_resolved_requests(pool, since).await?);
    tracing::info!(count = requests.len(), %since, "loaded requests from postgres");
    Ok(InMemoryRepository::new(requests))
}

pub async fn fetch_risk_registry(
    pool: &PgPool,
) -> anyhow::Result<HashMap<String, NeighborhoodRiskRecord>> {
    let rows = sqlx::query(
        "SELECT neighborhood, risk_score, recurring_issue_tags \
         FROM demand_priority.neighborhood_risk",
    )
    .fetch_all(pool)
    .await?;

    let records = rows
        .into_iter()
        .map(|row| {
            let tags: Vec<String> = row.get("recurring_issue_tags");
            NeighborhoodRiskRecord {
                neighborhood: row.get("neighborhood"),
                risk_score: row.get("risk_score"),
                recurring_issue_tags: tags.into_iter().collect(),
            }
        })
        .collect();

    Ok(sources::risk_registry(records))
}

pub async fn import_requests_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let requests = sources::read_requests_csv(csv_path)?;
    let mut inserted = 0usize;

    for request in requests {
        let result = sqlx::query(
            r#"
            INSERT INTO demand_priority.service_requests
            (id, protocol, status, category, neighborhood, secretariat,
             priority_label, created_at, resolved_at, sla_deadline)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (protocol) DO NOTHING
            "#,
        )
        .bind(request.id)
        .bind(&request.protocol)
        .bind(request.status.as_str())
        .bind(&request.category)
        .bind(&request.neighborhood)
        .bind(&request.secretariat)
        .bind(request.priority_label.as_str())
        .bind(request.created_at)
        .bind(request.resolved_at)
        .bind(request.sla_deadline)
        .execute(pool)
        .await?;

        if result.rows_affected() > 0 {
            inserted += 1;
        }
    }

    Ok(inserted)
}

pub async fn import_risk_csv(pool: &PgPool, csv_path: &std::path::Path) -> anyhow::Result<usize> {
    let records = sources::read_risk_csv(csv_path)?;
    let count = records.len();

    for record in records {
        let tags: Vec<String> = record.recurring_issue_tags.into_iter().collect();
        upsert_risk(pool, &record.neighborhood, record.risk_score, &tags).await?;
    }

    Ok(count)
}
