//! Workload model and environment overlays
//!
//! A [`Workload`] is the already-parsed description of one containerized
//! service. It carries named override fragments under `environments`; the
//! overlay resolver merges the fragment for one environment onto the base
//! using a tagged [`Node`] tree:
//!
//! ```text
//! base:     { cpu: 256, command: [a, b], variables: { A: 1 } }
//! fragment: { command: [x], variables: { B: 2 } }
//! resolved: { cpu: 256, command: [x], variables: { A: 1, B: 2 } }
//! ```
//!
//! Sequences are always replaced as a whole.

mod duration;
mod node;
mod overlay;
mod workload;

use thiserror::Error;

pub use duration::{Duration, InvalidDuration};
pub use node::{Node, Scalar};
pub use overlay::apply_environment;
pub use workload::{
    AutoscalingConfig, ContainerHealthCheck, Count, HealthCheckArgs, HealthCheckConfig,
    HttpConfig, ImageConfig, NetworkConfig, Placement, SidecarConfig, VpcConfig, Workload,
    WorkloadKind,
};

/// Errors that can occur while resolving an environment overlay
#[derive(Debug, Error)]
pub enum OverlayError {
    /// The fragment's shape does not fit the base workload
    #[error("invalid override at {path}: {reason}")]
    InvalidOverride { path: String, reason: String },
}
