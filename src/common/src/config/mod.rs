mod size;

pub use size::{ByteSize, ByteSizeError};

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Yaml},
};

pub const DEFAULT_CONFIG_PATH: &str = "/etc/rotator/config.yaml";
pub const ENV_PREFIX: &str = "ROTATOR__";

/// Where and how deep to look for log files.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Root of the `<namespace>/<pod>/*.log` tree
    pub path: PathBuf,
    /// Globs a file must match (empty matches everything)
    pub include: Vec<String>,
    /// Globs that reject a file
    pub exclude: Vec<String>,
    /// Directory depth limit below the root, `0` disables it
    pub max_depth: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("/pang/logs"),
            include: Vec::new(),
            exclude: Vec::new(),
            max_depth: 8,
        }
    }
}

/// Include/exclude lists carried by a namespace or path override.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DiscoveryFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

/// How a file is cut over to an archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotationTechnique {
    /// Rename the file away and recreate an empty one at the original path.
    Rename,
    /// Copy the content away and truncate the original in place.
    #[serde(alias = "copy-truncate", alias = "copy_truncate")]
    CopyTruncate,
}

impl RotationTechnique {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationTechnique::Rename => "rename",
            RotationTechnique::CopyTruncate => "copytruncate",
        }
    }
}

impl fmt::Display for RotationTechnique {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rotation and retention thresholds.
///
/// The same type is used for the defaults and for override sections. In an
/// override a zero value (or an absent technique) means "not overridden".
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PolicyConfig {
    /// Rotate once the file reaches this size
    pub size: ByteSize,
    /// Rotate once the last modification is this old
    #[serde(with = "humantime_serde")]
    pub age: Duration,
    /// Rotate once the file has not been written for this long
    #[serde(with = "humantime_serde")]
    pub inactive: Duration,
    /// Rotated siblings to keep per file
    pub keep_files: u32,
    /// Days a rotated sibling is kept
    pub keep_days: u32,
    /// Delay before a freshly rotated file is gzip-compressed
    #[serde(with = "humantime_serde")]
    pub compress_after: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub technique: Option<RotationTechnique>,
}

impl PolicyConfig {
    /// Technique to rotate with; rename unless configured otherwise.
    pub fn rotation_technique(&self) -> RotationTechnique {
        self.technique.unwrap_or(RotationTechnique::Rename)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BudgetConfig {
    /// Archived bytes a namespace may accumulate before eviction kicks in
    pub per_namespace_bytes: ByteSize,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            per_namespace_bytes: ByteSize::gib(10),
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub discovery: DiscoveryConfig,
    pub policy: PolicyConfig,
    pub budgets: BudgetConfig,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            discovery: DiscoveryConfig::default(),
            policy: PolicyConfig {
                size: ByteSize::mib(100),
                age: Duration::from_secs(24 * 3600),
                inactive: Duration::from_secs(6 * 3600),
                keep_files: 5,
                keep_days: 3,
                compress_after: Duration::from_secs(3600),
                technique: Some(RotationTechnique::Rename),
            },
            budgets: BudgetConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct NamespaceOverride {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryFilter>,
    /// Accepted but not enforced: the budget tracker only knows the global limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budgets: Option<BudgetConfig>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathOverride {
    /// Glob selecting the files this override applies to
    #[serde(rename = "match")]
    pub pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy: Option<PolicyConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryFilter>,
}

/// Override hierarchy. Path overrides keep their configured order; the first
/// matching one wins.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Overrides {
    pub namespaces: HashMap<String, NamespaceOverride>,
    pub paths: Vec<PathOverride>,
}

/// Settings of the long-running process around the rotation core.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Interval between scan cycles
    #[serde(with = "humantime_serde")]
    pub scan_interval: Duration,
    /// Address of the health and metrics server
    pub listen: String,
    /// Location of the rotation journal
    pub journal_path: PathBuf,
    /// How long shutdown waits for background compression and eviction
    #[serde(with = "humantime_serde")]
    pub shutdown_grace: Duration,
    /// Seed namespace usage from archives already on disk at startup
    pub reconcile_budget_on_startup: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(30),
            listen: "0.0.0.0:9102".to_string(),
            journal_path: PathBuf::from("/var/lib/rotator/state.json"),
            shutdown_grace: Duration::from_secs(5),
            reconcile_budget_on_startup: false,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub defaults: Defaults,
    pub overrides: Overrides,
    pub daemon: DaemonConfig,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to extract configuration: {0}")]
    Extract(#[from] Box<figment::Error>),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl Configuration {
    /// Load the configuration from the default location when present, with
    /// environment overrides applied on top.
    pub fn load() -> Result<Self, ConfigError> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        if default_path.exists() {
            Self::load_from_path(default_path)
        } else {
            Self::figment(None).extract().map_err(|e| Box::new(e).into())
        }
    }

    /// Load the configuration from a YAML file, with environment overrides
    /// applied on top. A missing file is an error.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::figment(Some(path))
            .extract()
            .map_err(|e| Box::new(e).into())
    }

    fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Configuration::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Validate settings that would otherwise only fail once the daemon runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.defaults.discovery.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "defaults.discovery.path must not be empty".to_string(),
            ));
        }
        if self.defaults.budgets.per_namespace_bytes.is_zero() {
            return Err(ConfigError::Invalid(
                "defaults.budgets.per_namespace_bytes must be positive".to_string(),
            ));
        }
        if self.daemon.scan_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "daemon.scan_interval must be positive".to_string(),
            ));
        }
        if self.daemon.journal_path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "daemon.journal_path must not be empty".to_string(),
            ));
        }
        for path_override in &self.overrides.paths {
            if path_override.pattern.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "overrides.paths entries need a non-empty match pattern".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Global archive budget per namespace, in bytes.
    pub fn namespace_budget(&self) -> u64 {
        self.defaults.budgets.per_namespace_bytes.as_u64()
    }
}
