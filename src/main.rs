use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::EnvFilter;

use demand_prioritizer::capacity::{self, ThroughputPolicy};
use demand_prioritizer::engine::{PriorityEngine, RequestSnapshot};
use demand_prioritizer::models::{Factor, NeighborhoodRiskRecord, RequestStatus, Tier};
use demand_prioritizer::ranker::RankFilter;
use demand_prioritizer::sources::{self, InMemoryRepository};
use demand_prioritizer::weights::{self, WeightSet};
use demand_prioritizer::{db, extract, report};

#[derive(Parser)]
#[command(name = "demand-prioritizer")]
#[command(about = "Ranks open service requests and projects backlog clearance", long_about = None)]
struct Cli {
    /// TOML file with all six weight coefficients
    #[arg(long, global = true, env = "DEMAND_WEIGHTS")]
    weights: Option<PathBuf>,
    /// Trailing days of resolutions used to measure throughput
    #[arg(long, global = true, default_value_t = capacity::DEFAULT_WINDOW_DAYS)]
    window_days: u32,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// Read requests from a CSV file instead of Postgres
    #[arg(long, requires = "risk_csv")]
    requests_csv: Option<PathBuf>,
    /// Neighborhood risk registry CSV, used with --requests-csv
    #[arg(long, requires = "requests_csv")]
    risk_csv: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct FilterArgs {
    #[arg(long)]
    secretariat: Option<String>,
    #[arg(long)]
    category: Option<String>,
    #[arg(long)]
    neighborhood: Option<String>,
    #[arg(long, value_parser = parse_status)]
    status: Option<RequestStatus>,
    #[arg(long)]
    min_score: Option<u32>,
    #[arg(long, value_parser = parse_tier)]
    tier: Option<Tier>,
}

impl From<FilterArgs> for RankFilter {
    fn from(args: FilterArgs) -> Self {
        RankFilter {
            secretariat: args.secretariat,
            category: args.category,
            neighborhood: args.neighborhood,
            status: args.status,
            min_score: args.min_score,
            tier: args.tier,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load realistic seed data
    Seed,
    /// Import service requests from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import neighborhood risk records from a CSV file
    ImportRisk {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Print the ranked backlog
    Rank {
        #[command(flatten)]
        source: SourceArgs,
        #[command(flatten)]
        filter: FilterArgs,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Project backlog clearance with extra resolution capacity
    Project {
        #[command(flatten)]
        source: SourceArgs,
        /// Extra requests resolved per day (negative for lost capacity)
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        delta: f64,
        #[arg(long)]
        json: bool,
    },
    /// Validate and show the weights in effect
    Weights,
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
        delta: f64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "priority-report.md")]
        out: PathBuf,
    },
}

fn parse_status(value: &str) -> Result<RequestStatus, String> {
    RequestStatus::parse(value).ok_or_else(|| format!("unknown status `{value}`"))
}

fn parse_tier(value: &str) -> Result<Tier, String> {
    Tier::parse(value).ok_or_else(|| format!("unknown tier `{value}`"))
}

async fn connect() -> anyhow::Result<PgPool> {
    let database_url = std::env::var("DATABASE_URL")
        .context("DATABASE_URL must be set to a production Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .context("failed to connect to Postgres")
}

async fn load_engine(
    source: &SourceArgs,
    weights: WeightSet,
    policy: ThroughputPolicy,
) -> anyhow::Result<PriorityEngine> {
    let as_of = Utc::now();
    let (repository, risk): (InMemoryRepository, HashMap<String, NeighborhoodRiskRecord>) =
        match (&source.requests_csv, &source.risk_csv) {
            (Some(requests), Some(risk)) => (
                InMemoryRepository::new(sources::read_requests_csv(requests)?),
                sources::risk_registry(sources::read_risk_csv(risk)?),
            ),
            _ => {
                let pool = connect().await?;
                let since = as_of
                    - chrono::Duration::days(extract::RECURRENCE_WINDOW_DAYS.max(i64::from(
                        policy.window_days,
                    )));
                (
                    db::load_repository(&pool, since).await?,
                    db::fetch_risk_registry(&pool).await?,
                )
            }
        };

    let mut engine = PriorityEngine::new(weights, risk, policy, RequestSnapshot::empty(as_of));
    engine.refresh(&repository, as_of)?;
    Ok(engine)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let weights = match &cli.weights {
        Some(path) => weights::load_file(path)?,
        None => WeightSet::default(),
    };
    let policy = ThroughputPolicy::new(cli.window_days)?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect().await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect().await?;
            db::seed(&pool, Utc::now()).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let pool = connect().await?;
            let inserted = db::import_requests_csv(&pool, &csv).await?;
            println!("Inserted {inserted} requests from {}.", csv.display());
        }
        Commands::ImportRisk { csv } => {
            let pool = connect().await?;
            let upserted = db::import_risk_csv(&pool, &csv).await?;
            println!("Upserted {upserted} risk records from {}.", csv.display());
        }
        Commands::Rank {
            source,
            filter,
            limit,
            json,
        } => {
            let engine = load_engine(&source, weights, policy).await?;
            let ranked = engine.ranked_list(&filter.into());

            if json {
                let shown: Vec<_> = ranked.iter().take(limit).collect();
                println!("{}", serde_json::to_string_pretty(&shown)?);
                return Ok(());
            }

            if ranked.is_empty() {
                println!("No open requests match.");
                return Ok(());
            }

            println!("Top requests by priority score:");
            for entry in ranked.iter().take(limit) {
                println!(
                    "- {} ({}, {}) score {} [{}] waiting {}d",
                    entry.request.protocol,
                    entry.request.category,
                    entry.request.neighborhood,
                    entry.score,
                    entry.tier.as_str(),
                    entry.metrics.wait_time
                );
            }
        }
        Commands::Project {
            source,
            delta,
            json,
        } => {
            let engine = load_engine(&source, weights, policy).await?;
            let projection = engine.project_capacity(delta)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&projection)?);
                return Ok(());
            }

            println!(
                "Backlog {} at {:.2}/day clears in {}.",
                projection.backlog_size,
                projection.throughput_per_day,
                report::format_days(projection.current_clearance_days)
            );
            println!(
                "With {:+.2}/day it clears in {}.",
                projection.capacity_delta,
                report::format_days(projection.projected_clearance_days)
            );
        }
        Commands::Weights => {
            for factor in Factor::ALL {
                println!("{} = {}", factor.as_str(), weights.get(factor));
            }
        }
        Commands::Report {
            source,
            delta,
            limit,
            out,
        } => {
            let engine = load_engine(&source, weights, policy).await?;
            let projection = engine.project_capacity(delta)?;
            let snapshot = engine.snapshot();
            let report = report::build_report(
                snapshot.as_of,
                &engine.weights(),
                &engine.ranked(),
                &projection,
                limit,
            );
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
