//! Typed workload description

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::duration::Duration;
use super::node::Node;

/// The kind of service a workload describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkloadKind {
    /// Internet-facing service behind the environment's load balancer
    #[serde(rename = "Load Balanced Web Service")]
    LoadBalancedWebService,
    /// Internal service reachable only through service discovery
    #[serde(rename = "Backend Service")]
    BackendService,
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkloadKind::LoadBalancedWebService => f.write_str("Load Balanced Web Service"),
            WorkloadKind::BackendService => f.write_str("Backend Service"),
        }
    }
}

/// A containerized workload together with its per-environment overrides
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workload {
    /// Service name
    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    pub kind: WorkloadKind,

    #[serde(default)]
    pub image: ImageConfig,

    /// Task CPU units
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<u32>,

    /// Task memory in MiB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<Count>,

    /// Enable interactive sessions into running tasks
    #[serde(default)]
    pub exec: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entrypoint: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,

    /// Plain environment variables for the main container
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,

    /// Environment variable name to secret parameter name or ARN
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, String>,

    /// Load balancer exposure rules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http: Option<HttpConfig>,

    /// Container-level health check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<ContainerHealthCheck>,

    #[serde(default)]
    pub network: NetworkConfig,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub sidecars: BTreeMap<String, SidecarConfig>,

    /// Override fragments keyed by environment name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub environments: BTreeMap<String, Node>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageConfig {
    /// Image reference, e.g. `nginx:1.25` or a registry URI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    /// Port the main container listens on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Desired task count, either fixed or an autoscaling range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Count {
    Fixed(u32),
    Autoscaling(AutoscalingConfig),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoscalingConfig {
    /// Inclusive task range such as `1-10`
    pub range: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_percentage: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_percentage: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Listener rule path, `/` for the root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthcheck: Option<HealthCheckArgs>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deregistration_delay: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stickiness: Option<bool>,

    /// Container receiving traffic; defaults to the main container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_container: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,

    /// Host names routed to this service on the HTTPS listener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<Vec<String>>,
}

/// Target group health check, either just a path or full settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HealthCheckArgs {
    Path(String),
    Config(HealthCheckConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_codes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub healthy_threshold: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unhealthy_threshold: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grace_period: Option<Duration>,
}

impl HealthCheckArgs {
    /// Normalize the short form into full settings
    pub fn config(&self) -> HealthCheckConfig {
        match self {
            HealthCheckArgs::Path(path) => HealthCheckConfig {
                path: Some(path.clone()),
                ..HealthCheckConfig::default()
            },
            HealthCheckArgs::Config(config) => config.clone(),
        }
    }
}

/// Health check run by the container agent inside the task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerHealthCheck {
    pub command: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_period: Option<Duration>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(default)]
    pub vpc: VpcConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VpcConfig {
    #[serde(default)]
    pub placement: Placement,

    /// Extra security groups attached to the tasks
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
}

/// Subnets the tasks are launched in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Placement {
    #[default]
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SidecarConfig {
    pub image: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub essential: Option<bool>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
}
