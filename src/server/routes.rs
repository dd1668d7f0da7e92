// src/server/routes.rs

//! Axum router and handlers for the tracker REST API.
//!
//! - `GET /health` - liveness check
//! - `GET /api/v1/packages?filter=` - scored package list plus summary stats
//! - `POST /api/v1/scan` - request a scan (202, never blocks)
//! - `GET /api/v1/scan/status` - scheduler state and last scan summary

use crate::catalog::PackageMeta;
use crate::db;
use crate::error::Error;
use crate::ledger::{self, UsageRecord};
use crate::scanner::{ScanStatus, TriggerOutcome};
use crate::score::{self, UsageTier, DUSTY_DAYS, FRESH_DAYS};
use crate::server::SharedState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tower_http::cors::CorsLayer;
use tracing::error;

/// Error response wrapper mapping crate errors to HTTP statuses.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::InvalidFilter(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

/// Which slice of the ledger to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackageFilter {
    All,
    /// Not used for at least 30 days.
    Dusty,
    /// Not used for at least 7 days.
    Unused,
    RemovalCandidates,
}

impl FromStr for PackageFilter {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "all" => Ok(PackageFilter::All),
            "dusty" => Ok(PackageFilter::Dusty),
            "unused" => Ok(PackageFilter::Unused),
            "removal-candidates" => Ok(PackageFilter::RemovalCandidates),
            other => Err(Error::InvalidFilter(format!(
                "unknown filter '{}' (expected all, dusty, unused or removal-candidates)",
                other
            ))),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub filter: Option<String>,
}

/// One scored package in the list response.
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub name: String,
    pub description: Option<String>,
    pub explicit: bool,
    pub required_by_other: bool,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub scan_count: i64,
    pub days_since_use: i64,
    pub score: f64,
    pub tier: UsageTier,
}

/// Aggregate counters over the whole (unfiltered) ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SummaryStats {
    pub total: usize,
    /// Packages idle for a week or more.
    pub unused_week: usize,
    /// Explicitly installed packages idle for 30 days or more.
    pub dusty_explicit: usize,
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub packages: Vec<PackageReport>,
    pub stats: SummaryStats,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ScanTriggerResponse {
    pub status: TriggerOutcome,
}

/// Join ledger rows with catalog metadata, score them, and filter.
///
/// Removed packages are excluded entirely; stats always cover the unfiltered
/// view so the envelope is stable across filters. Packages absent from the
/// catalog cache (cache not yet primed) are treated as dependency-installed,
/// which keeps them out of the removal-candidate tier.
pub fn assemble(
    records: &[UsageRecord],
    metas: &HashMap<String, PackageMeta>,
    now: DateTime<Utc>,
    filter: PackageFilter,
) -> (Vec<PackageReport>, SummaryStats) {
    let mut stats = SummaryStats {
        total: 0,
        unused_week: 0,
        dusty_explicit: 0,
    };
    let mut packages = Vec::new();

    for record in records {
        if record.removed {
            continue;
        }

        let meta = metas.get(&record.package_name);
        let explicit = meta.map(|m| m.explicit).unwrap_or(false);
        let required_by_other = meta.map(|m| m.required_by_other).unwrap_or(false);
        let dust = score::score(record.last_seen, now, explicit, required_by_other);

        stats.total += 1;
        if dust.days_since_use >= FRESH_DAYS {
            stats.unused_week += 1;
        }
        if dust.days_since_use >= DUSTY_DAYS && explicit {
            stats.dusty_explicit += 1;
        }

        let keep = match filter {
            PackageFilter::All => true,
            PackageFilter::Dusty => dust.days_since_use >= DUSTY_DAYS,
            PackageFilter::Unused => dust.days_since_use >= FRESH_DAYS,
            PackageFilter::RemovalCandidates => dust.tier == UsageTier::RemovalCandidate,
        };
        if !keep {
            continue;
        }

        packages.push(PackageReport {
            name: record.package_name.clone(),
            description: meta.and_then(|m| m.description.clone()),
            explicit,
            required_by_other,
            first_seen: record.first_seen,
            last_seen: record.last_seen,
            scan_count: record.scan_count,
            days_since_use: dust.days_since_use,
            score: dust.score,
            tier: dust.tier,
        });
    }

    // Dustiest first, name as tiebreaker.
    packages.sort_by(|a, b| {
        b.days_since_use
            .cmp(&a.days_since_use)
            .then_with(|| a.name.cmp(&b.name))
    });

    (packages, stats)
}

/// Build the main router
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .nest("/api/v1", build_v1_router())
        // The list is consumed by a local browser page on another origin.
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn build_v1_router() -> Router<SharedState> {
    Router::new()
        .route("/packages", get(list_packages_handler))
        .route("/scan", post(trigger_scan_handler))
        .route("/scan/status", get(scan_status_handler))
}

/// GET /health
async fn health_handler(State(_state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// GET /api/v1/packages?filter=all|dusty|unused|removal-candidates
async fn list_packages_handler(
    State(state): State<SharedState>,
    Query(params): Query<ListQuery>,
) -> ApiResult<Json<ListResponse>> {
    let filter = params
        .filter
        .as_deref()
        .unwrap_or("all")
        .parse::<PackageFilter>()?;

    let db_path = state.config.db_path.clone();
    let records = tokio::task::spawn_blocking(move || {
        let conn = db::open(&db_path)?;
        ledger::get_all(&conn)
    })
    .await
    .map_err(|e| Error::Internal(format!("ledger read task failed: {}", e)))??;

    let metas = state.scheduler.catalog_metas().await;
    let now = Utc::now();
    let (packages, stats) = assemble(&records, &metas, now, filter);

    Ok(Json(ListResponse {
        packages,
        stats,
        generated_at: now,
    }))
}

/// POST /api/v1/scan
///
/// Always 202: the scan runs in the background and concurrent requests
/// coalesce into the one in flight.
async fn trigger_scan_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let status = state.scheduler.trigger();
    (StatusCode::ACCEPTED, Json(ScanTriggerResponse { status }))
}

/// GET /api/v1/scan/status
async fn scan_status_handler(State(state): State<SharedState>) -> Json<ScanStatus> {
    Json(state.scheduler.status().await)
}
