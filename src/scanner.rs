// src/scanner.rs

//! Scan pipeline and scheduler.
//!
//! A scan is: snapshot the package catalog and running processes (bounded by
//! a timeout, no database writes in this phase), resolve executables to
//! packages, deduplicate, then commit the whole batch in one transaction.
//! An `AtomicBool` is the single mutual-exclusion point; manual triggers
//! while a scan runs coalesce instead of queueing.

use crate::catalog::{PackageCatalog, PackageMeta};
use crate::config::TrackerConfig;
use crate::db;
use crate::error::{Error, Result};
use crate::ledger;
use crate::procs::ProcessSnapshot;
use crate::resolver::OwnershipIndex;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

/// Scheduler lifecycle state, observable via the status endpoint.
///
/// A failure is sticky until the next scan starts, so a poller can see that
/// the previous attempt went wrong; it never blocks new scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Scanning,
    Failed,
}

/// Summary of one completed (or failed) scan.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub scan_time: DateTime<Utc>,
    /// Distinct packages observed running.
    pub observed: usize,
    /// Distinct executable paths that resolved to no single package.
    pub unresolved: usize,
    pub duration_ms: u64,
    pub error: Option<String>,
}

impl ScanOutcome {
    fn failure(scan_time: DateTime<Utc>, duration_ms: u64, error: String) -> Self {
        Self {
            scan_time,
            observed: 0,
            unresolved: 0,
            duration_ms,
            error: Some(error),
        }
    }
}

/// Result of asking for a manual scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerOutcome {
    Started,
    /// A scan was already running; the request coalesces into it.
    AlreadyRunning,
}

/// Status payload for the API.
#[derive(Debug, Clone, Serialize)]
pub struct ScanStatus {
    pub state: ScanState,
    pub last_scan: Option<ScanOutcome>,
}

/// Owns the scan loop and the catalog metadata cache the query path reads.
pub struct ScanScheduler {
    config: TrackerConfig,
    catalog: Arc<dyn PackageCatalog>,
    procs: Arc<dyn ProcessSnapshot>,
    // Sole mutual-exclusion point between timer ticks and manual triggers.
    in_progress: AtomicBool,
    state: RwLock<ScanState>,
    last_outcome: RwLock<Option<ScanOutcome>>,
    catalog_cache: RwLock<HashMap<String, PackageMeta>>,
}

impl ScanScheduler {
    pub fn new(
        config: TrackerConfig,
        catalog: Arc<dyn PackageCatalog>,
        procs: Arc<dyn ProcessSnapshot>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            catalog,
            procs,
            in_progress: AtomicBool::new(false),
            state: RwLock::new(ScanState::Idle),
            last_outcome: RwLock::new(None),
            catalog_cache: RwLock::new(HashMap::new()),
        })
    }

    pub async fn status(&self) -> ScanStatus {
        ScanStatus {
            state: *self.state.read().await,
            last_scan: self.last_outcome.read().await.clone(),
        }
    }

    /// Catalog metadata from the most recent snapshot, keyed by package name.
    pub async fn catalog_metas(&self) -> HashMap<String, PackageMeta> {
        self.catalog_cache.read().await.clone()
    }

    /// Request a scan. Returns immediately; the scan runs on a spawned task.
    pub fn trigger(self: &Arc<Self>) -> TriggerOutcome {
        if self.try_acquire() {
            let scheduler = Arc::clone(self);
            tokio::spawn(async move {
                scheduler.run_scan().await;
            });
            TriggerOutcome::Started
        } else {
            debug!("Scan trigger coalesced, scan already in progress");
            TriggerOutcome::AlreadyRunning
        }
    }

    /// Timer loop. The interval is measured from scan completion, so a slow
    /// scan delays the next tick instead of stacking up behind it.
    pub async fn run_timer(self: Arc<Self>) {
        let interval = self.config.scan_interval;
        info!("Scan timer started ({}s interval)", interval.as_secs());
        loop {
            tokio::time::sleep(interval).await;
            if self.try_acquire() {
                self.run_scan().await;
            } else {
                debug!("Skipping timer tick, scan already in progress");
            }
        }
    }

    /// Startup reconciliation: seed catalog packages missing from the ledger
    /// as "seen now" and refresh removed flags, then prime the catalog cache.
    pub async fn reconcile(&self) -> Result<usize> {
        let catalog = Arc::clone(&self.catalog);
        let db_path = self.config.db_path.clone();

        let (seeded, metas) = tokio::task::spawn_blocking(move || -> Result<_> {
            let packages = catalog.list_installed()?;
            let installed: BTreeSet<String> =
                packages.iter().map(|p| p.name.clone()).collect();
            let metas: HashMap<String, PackageMeta> = packages
                .iter()
                .map(|p| (p.name.clone(), p.meta()))
                .collect();

            let mut conn = db::open(&db_path)?;
            let seeded = ledger::reconcile(&mut conn, &installed, Utc::now())?;
            Ok((seeded, metas))
        })
        .await
        .map_err(|e| Error::Internal(format!("reconcile task failed: {}", e)))??;

        *self.catalog_cache.write().await = metas;
        if seeded > 0 {
            info!("Reconciled ledger, seeded {} new package(s)", seeded);
        }
        Ok(seeded)
    }

    fn try_acquire(&self) -> bool {
        self.in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// Run one scan to completion. Caller must hold the in-progress flag.
    async fn run_scan(&self) {
        *self.state.write().await = ScanState::Scanning;
        let started = Instant::now();

        match self.scan_once().await {
            Ok(outcome) => {
                info!(
                    observed = outcome.observed,
                    unresolved = outcome.unresolved,
                    duration_ms = outcome.duration_ms,
                    "Scan complete"
                );
                *self.state.write().await = ScanState::Idle;
                *self.last_outcome.write().await = Some(outcome);
            }
            Err(e) => {
                error!("Scan failed: {}", e);
                *self.state.write().await = ScanState::Failed;
                *self.last_outcome.write().await = Some(ScanOutcome::failure(
                    Utc::now(),
                    started.elapsed().as_millis() as u64,
                    e.to_string(),
                ));
            }
        }

        self.in_progress.store(false, Ordering::SeqCst);
    }

    /// One scan: adapter snapshot, resolution, atomic ledger commit.
    ///
    /// The snapshot phase writes nothing, so if it exceeds the timeout the
    /// abandoned blocking task cannot race a later scan's commit.
    pub async fn scan_once(&self) -> Result<ScanOutcome> {
        let started = Instant::now();

        let catalog = Arc::clone(&self.catalog);
        let procs = Arc::clone(&self.procs);
        let snapshot = tokio::task::spawn_blocking(move || -> Result<_> {
            let packages = catalog.list_installed()?;
            let executables = procs.running_executables()?;
            Ok((packages, executables))
        });

        let (packages, executables) =
            match tokio::time::timeout(self.config.adapter_timeout, snapshot).await {
                Ok(joined) => joined
                    .map_err(|e| Error::Internal(format!("snapshot task failed: {}", e)))??,
                Err(_) => {
                    return Err(Error::Adapter(format!(
                        "adapter snapshot exceeded {}s",
                        self.config.adapter_timeout.as_secs()
                    )));
                }
            };

        let index = OwnershipIndex::build(&packages);
        let mut observed: BTreeSet<String> = BTreeSet::new();
        let mut unresolved = 0usize;
        let unique_paths: BTreeSet<_> = executables.iter().collect();
        for path in unique_paths {
            match index.resolve(path) {
                Some(name) => {
                    observed.insert(name.to_string());
                }
                None => {
                    unresolved += 1;
                    debug!("No owning package for {}", path.display());
                }
            }
        }
        if unresolved > 0 {
            warn!("{} executable path(s) did not resolve to a package", unresolved);
        }

        let installed: BTreeSet<String> = packages.iter().map(|p| p.name.clone()).collect();
        let metas: HashMap<String, PackageMeta> = packages
            .iter()
            .map(|p| (p.name.clone(), p.meta()))
            .collect();
        *self.catalog_cache.write().await = metas;

        let scan_time = Utc::now();
        let db_path = self.config.db_path.clone();
        let observed_count = observed.len();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = db::open(&db_path)?;
            ledger::commit_scan(&mut conn, &installed, &observed, scan_time)
        })
        .await
        .map_err(|e| Error::Internal(format!("commit task failed: {}", e)))??;

        Ok(ScanOutcome {
            scan_time,
            observed: observed_count,
            unresolved,
            duration_ms: started.elapsed().as_millis() as u64,
            error: None,
        })
    }
}
