//! Size- and age-based rotation for `<root>/<namespace>/<pod>/*.log` trees.
//!
//! Each scan cycle discovers log files, resolves their effective policy,
//! rotates the eligible ones and prunes old rotations. Rotated bytes are
//! accounted per namespace; a namespace over budget gets its oldest archives
//! evicted in the background.

pub mod budget;
pub mod daemon;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod eviction;
pub mod http;
pub mod journal;
pub mod metrics;
pub mod overrides;
pub mod pattern;
pub mod policy;
pub mod tasks;

pub use daemon::{CycleSummary, RotatorDaemon};
pub use discovery::{DiscoveredFile, Discovery};
pub use engine::{RotationEngine, RotationOutcome, RotationTrigger};
pub use error::{Result, RotateError, RotatorError};
pub use policy::PolicyResolver;
