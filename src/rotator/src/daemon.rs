//! The scan loop tying discovery, policy and rotation together.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use common::config::Configuration;
use prometheus::Registry;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::budget::BudgetTracker;
use crate::discovery::Discovery;
use crate::engine::RotationEngine;
use crate::error::Result;
use crate::eviction::EvictionSweeper;
use crate::http::HttpState;
use crate::journal::Journal;
use crate::metrics::{ErrorKind, MetricsSink, RotatorMetrics, create_metrics_registry};
use crate::overrides::OverrideSet;
use crate::policy::PolicyResolver;
use crate::tasks::TaskPool;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleSummary {
    pub discovered: usize,
    pub rotated: usize,
    pub failed: usize,
    pub bytes_rotated: u64,
}

pub struct RotatorDaemon {
    config: Configuration,
    discovery: Discovery,
    resolver: PolicyResolver,
    engine: RotationEngine,
    sweeper: Arc<EvictionSweeper>,
    registry: Arc<Registry>,
    metrics: Arc<RotatorMetrics>,
    ready: Arc<AtomicBool>,
}

impl RotatorDaemon {
    /// Build every component from `config`. Invalid configuration and bad
    /// glob patterns fail here.
    pub async fn new(config: Configuration) -> Result<Self> {
        config.validate()?;

        let overrides = Arc::new(OverrideSet::compile(&config.overrides)?);
        overrides.warn_unused_budgets();

        let (registry, metrics) = create_metrics_registry()?;
        let sink: Arc<dyn MetricsSink> = metrics.clone();

        let discovery = Discovery::new(&config.defaults.discovery, overrides.clone())?;
        let resolver = PolicyResolver::new(
            config.defaults.discovery.path.clone(),
            config.defaults.policy.clone(),
            overrides,
            sink.clone(),
        );

        let limit = config.namespace_budget();
        let journal = Arc::new(Journal::load(config.daemon.journal_path.clone()).await);
        let budget = Arc::new(BudgetTracker::new(limit));
        let sweeper = Arc::new(EvictionSweeper::new(
            config.defaults.discovery.path.clone(),
            limit,
        ));
        let engine = RotationEngine::new(journal, budget, sweeper.clone(), sink, TaskPool::new());

        let daemon = Self {
            config,
            discovery,
            resolver,
            engine,
            sweeper,
            registry,
            metrics,
            ready: Arc::new(AtomicBool::new(false)),
        };

        if daemon.config.daemon.reconcile_budget_on_startup {
            daemon.reconcile_budget().await;
        }

        info!(
            root = %daemon.discovery.root().display(),
            budget = limit,
            scan_interval_ms = daemon.config.daemon.scan_interval.as_millis() as u64,
            "Rotator initialized"
        );
        Ok(daemon)
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn engine(&self) -> &RotationEngine {
        &self.engine
    }

    pub fn metrics(&self) -> &Arc<RotatorMetrics> {
        &self.metrics
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn http_state(&self) -> HttpState {
        HttpState::new(self.registry.clone(), self.ready.clone())
    }

    /// Seed namespace usage from archives already on disk.
    async fn reconcile_budget(&self) {
        let sweeper = self.sweeper.clone();
        let totals = match tokio::task::spawn_blocking(move || sweeper.archived_bytes_by_namespace())
            .await
        {
            Ok(totals) => totals,
            Err(e) => {
                warn!(error = %e, "Budget reconciliation failed");
                return;
            }
        };

        for (namespace, bytes) in totals {
            self.engine.budget().seed(&namespace, bytes);
            self.metrics.set_namespace_usage(&namespace, bytes);
            info!(namespace = %namespace, bytes, "Seeded namespace usage from disk");
        }
    }

    /// One discovery pass, processing files sequentially.
    pub async fn run_cycle(&self) -> CycleSummary {
        self.metrics.record_scan_cycle();
        let mut summary = CycleSummary::default();

        let files = match self.discovery.scan() {
            Ok(files) => files,
            Err(e) => {
                warn!(root = %self.discovery.root().display(), error = %e, "Discovery failed");
                self.metrics.record_error(ErrorKind::Discovery);
                self.metrics.set_files_discovered(0);
                return summary;
            }
        };
        summary.discovered = files.len();
        self.metrics.set_files_discovered(files.len());
        info!(files_found = files.len(), "Scan complete");

        for file in &files {
            let policy = self.resolver.effective_policy(&file.namespace, &file.path);
            match self.engine.process_file(file, &policy).await {
                Ok(Some(outcome)) => {
                    summary.rotated += 1;
                    summary.bytes_rotated += outcome.bytes;
                }
                Ok(None) => {}
                Err(e) => {
                    summary.failed += 1;
                    self.metrics.record_error(ErrorKind::ProcessFile);
                    warn!(file = %file.path.display(), error = %e, "Failed to process file");
                }
            }
        }

        debug!(
            discovered = summary.discovered,
            rotated = summary.rotated,
            failed = summary.failed,
            bytes_rotated = summary.bytes_rotated,
            "Cycle finished"
        );
        summary
    }

    /// Run cycles on the scan interval until `shutdown` is cancelled. The
    /// first cycle starts immediately; a running cycle is never interrupted.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = interval(self.config.daemon.scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ready.store(true, Ordering::Release);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Scan loop stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.run_cycle().await;
                }
            }
        }
    }

    /// Cancel background work and wait for it within the grace period.
    pub async fn shutdown(&self) -> bool {
        self.ready.store(false, Ordering::Release);
        self.engine
            .tasks()
            .shutdown(self.config.daemon.shutdown_grace)
            .await
    }
}
