//! Prometheus metrics for the rotator.

use std::sync::Arc;

use common::config::RotationTechnique;
use prometheus::{IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry};

use crate::error::{Result, RotatorError};

pub const METRICS_PREFIX: &str = "rotator";

/// Label for series that exist before any namespace is seen.
pub const DEFAULT_LABEL: &str = "_default";

/// Failure categories counted in `rotator_errors_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Discovery,
    ProcessFile,
    Compress,
    Journal,
    Eviction,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Discovery => "discovery",
            ErrorKind::ProcessFile => "process_file",
            ErrorKind::Compress => "compress",
            ErrorKind::Journal => "journal",
            ErrorKind::Eviction => "eviction",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideKind {
    Namespace,
    Path,
}

impl OverrideKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideKind::Namespace => "namespace",
            OverrideKind::Path => "path",
        }
    }
}

/// Sink for the events the rotator reports.
pub trait MetricsSink: Send + Sync {
    fn record_rotation(&self, namespace: &str, technique: RotationTechnique);
    fn record_bytes_rotated(&self, namespace: &str, bytes: u64);
    fn record_error(&self, kind: ErrorKind);
    fn set_namespace_usage(&self, namespace: &str, bytes: u64);
    fn record_override_applied(&self, kind: OverrideKind);
    fn record_scan_cycle(&self);
    fn set_files_discovered(&self, count: usize);
}

pub struct RotatorMetrics {
    pub rotations_total: IntCounterVec,
    pub bytes_rotated_total: IntCounterVec,
    pub errors_total: IntCounterVec,
    pub namespace_usage_bytes: IntGaugeVec,
    pub overrides_applied_total: IntCounterVec,
    pub scan_cycles_total: IntCounter,
    pub files_discovered: IntGauge,
}

fn register<C>(registry: &Registry, name: &str, collector: C) -> Result<C>
where
    C: prometheus::core::Collector + Clone + 'static,
{
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| RotatorError::Initialization(format!("Failed to register {name}: {e}")))?;
    Ok(collector)
}

fn create_error(name: &str) -> impl FnOnce(prometheus::Error) -> RotatorError + '_ {
    move |e| RotatorError::Initialization(format!("Failed to create {name} metric: {e}"))
}

fn saturating_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl RotatorMetrics {
    pub fn new(registry: &Registry) -> Result<Self> {
        let rotations_total = IntCounterVec::new(
            Opts::new("rotations_total", "Total number of file rotations")
                .namespace(METRICS_PREFIX),
            &["namespace", "technique"],
        )
        .map_err(create_error("rotations_total"))?;

        let bytes_rotated_total = IntCounterVec::new(
            Opts::new("bytes_rotated_total", "Total bytes moved into rotated files")
                .namespace(METRICS_PREFIX),
            &["namespace"],
        )
        .map_err(create_error("bytes_rotated_total"))?;

        let errors_total = IntCounterVec::new(
            Opts::new("errors_total", "Total number of errors by type").namespace(METRICS_PREFIX),
            &["type"],
        )
        .map_err(create_error("errors_total"))?;

        let namespace_usage_bytes = IntGaugeVec::new(
            Opts::new("ns_usage_bytes", "Archived bytes accounted per namespace")
                .namespace(METRICS_PREFIX),
            &["namespace"],
        )
        .map_err(create_error("ns_usage_bytes"))?;

        let overrides_applied_total = IntCounterVec::new(
            Opts::new(
                "overrides_applied_total",
                "Total number of policy overrides applied by type",
            )
            .namespace(METRICS_PREFIX),
            &["type"],
        )
        .map_err(create_error("overrides_applied_total"))?;

        let scan_cycles_total = IntCounter::with_opts(
            Opts::new("scan_cycles_total", "Total number of scan cycles run")
                .namespace(METRICS_PREFIX),
        )
        .map_err(create_error("scan_cycles_total"))?;

        let files_discovered = IntGauge::with_opts(
            Opts::new("files_discovered", "Files found by the most recent scan")
                .namespace(METRICS_PREFIX),
        )
        .map_err(create_error("files_discovered"))?;

        let metrics = Self {
            rotations_total: register(registry, "rotations_total", rotations_total)?,
            bytes_rotated_total: register(registry, "bytes_rotated_total", bytes_rotated_total)?,
            errors_total: register(registry, "errors_total", errors_total)?,
            namespace_usage_bytes: register(
                registry,
                "ns_usage_bytes",
                namespace_usage_bytes,
            )?,
            overrides_applied_total: register(
                registry,
                "overrides_applied_total",
                overrides_applied_total,
            )?,
            scan_cycles_total: register(registry, "scan_cycles_total", scan_cycles_total)?,
            files_discovered: register(registry, "files_discovered", files_discovered)?,
        };
        metrics.initialize_series();
        Ok(metrics)
    }

    /// Touch the labelled series so they are exported at zero from startup.
    fn initialize_series(&self) {
        self.rotations_total
            .with_label_values(&[DEFAULT_LABEL, RotationTechnique::Rename.as_str()]);
        self.bytes_rotated_total.with_label_values(&[DEFAULT_LABEL]);
        self.namespace_usage_bytes.with_label_values(&[DEFAULT_LABEL]);
        self.errors_total
            .with_label_values(&[ErrorKind::Discovery.as_str()]);
        for kind in [OverrideKind::Namespace, OverrideKind::Path] {
            self.overrides_applied_total.with_label_values(&[kind.as_str()]);
        }
    }

    pub fn rotations(&self, namespace: &str, technique: RotationTechnique) -> u64 {
        self.rotations_total
            .with_label_values(&[namespace, technique.as_str()])
            .get()
    }

    pub fn bytes_rotated(&self, namespace: &str) -> u64 {
        self.bytes_rotated_total.with_label_values(&[namespace]).get()
    }

    pub fn errors(&self, kind: ErrorKind) -> u64 {
        self.errors_total.with_label_values(&[kind.as_str()]).get()
    }

    pub fn namespace_usage(&self, namespace: &str) -> i64 {
        self.namespace_usage_bytes
            .with_label_values(&[namespace])
            .get()
    }

    pub fn overrides_applied(&self, kind: OverrideKind) -> u64 {
        self.overrides_applied_total
            .with_label_values(&[kind.as_str()])
            .get()
    }
}

impl MetricsSink for RotatorMetrics {
    fn record_rotation(&self, namespace: &str, technique: RotationTechnique) {
        self.rotations_total
            .with_label_values(&[namespace, technique.as_str()])
            .inc();
    }

    fn record_bytes_rotated(&self, namespace: &str, bytes: u64) {
        self.bytes_rotated_total
            .with_label_values(&[namespace])
            .inc_by(bytes);
    }

    fn record_error(&self, kind: ErrorKind) {
        self.errors_total.with_label_values(&[kind.as_str()]).inc();
    }

    fn set_namespace_usage(&self, namespace: &str, bytes: u64) {
        self.namespace_usage_bytes
            .with_label_values(&[namespace])
            .set(saturating_i64(bytes));
    }

    fn record_override_applied(&self, kind: OverrideKind) {
        self.overrides_applied_total
            .with_label_values(&[kind.as_str()])
            .inc();
    }

    fn record_scan_cycle(&self) {
        self.scan_cycles_total.inc();
    }

    fn set_files_discovered(&self, count: usize) {
        self.files_discovered
            .set(saturating_i64(u64::try_from(count).unwrap_or(u64::MAX)));
    }
}

/// Create a registry carrying process metrics and the rotator's own.
pub fn create_metrics_registry() -> Result<(Arc<Registry>, Arc<RotatorMetrics>)> {
    let registry = Registry::new();

    #[cfg(target_os = "linux")]
    {
        let process_collector = prometheus::process_collector::ProcessCollector::for_self();
        registry
            .register(Box::new(process_collector))
            .map_err(|e| {
                RotatorError::Initialization(format!("Failed to register process metrics: {e}"))
            })?;
    }

    let metrics = Arc::new(RotatorMetrics::new(&registry)?);
    Ok((Arc::new(registry), metrics))
}
