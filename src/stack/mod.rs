//! Stack template compiler
//!
//! Compiles a resolved [`Workload`] into a [`StackArtifact`]: a template
//! document plus the ordered parameter values to deploy it with.
//!
//! # Determinism
//!
//! Every section of the template is an ordered map and every logical id is
//! fixed per resource role, so compiling the same input twice renders the same
//! YAML. The only exception is the uniqueness suffix of helper resources,
//! which is random unless [`RuntimeConfig::unique_suffix`] is set. The suffix
//! that was used is exported as the `UniqueSuffix` output so it can be read
//! back from the deployed stack and supplied again on the next compile.

mod backend_service;
mod config;
mod lb_web_service;
pub mod naming;
mod parameters;
pub mod payload;
mod resources;
pub mod template;

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, info};

use crate::manifest::{Count, Workload, WorkloadKind};

pub use config::{RuntimeConfig, RuntimeConfigError, DEFAULT_LOG_RETENTION_DAYS};
pub use naming::{ResourceNamer, Role, UniqueSuffix, UNIQUE_SUFFIX_OUTPUT};
pub use parameters::{parameters_to_json, Parameter};
pub use payload::{AutomationPayload, ENV_CONTROLLER, RULE_PRIORITY};
pub use template::{Output, Resource, Template};

use parameters::ParameterSpec;

/// Tag keys every stack carries; additional tags cannot replace them
pub const APPLICATION_TAG: &str = "application";
pub const ENVIRONMENT_TAG: &str = "environment";
pub const SERVICE_TAG: &str = "service";

/// Errors that can occur during stack compilation
#[derive(Debug, Error)]
pub enum CompileError {
    /// The workload asks for something this compiler cannot render for the
    /// given runtime
    #[error("unsupported {feature}: {reason}")]
    UnsupportedShape { feature: String, reason: String },

    /// A field the resolved workload must always carry is absent
    #[error("missing required field '{field}'")]
    MissingRequiredField { field: String },

    /// The template or parameters could not be serialized
    #[error("render error: {0}")]
    Render(String),
}

impl CompileError {
    pub(crate) fn unsupported(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnsupportedShape {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn missing(field: impl Into<String>) -> Self {
        Self::MissingRequiredField {
            field: field.into(),
        }
    }

    /// True when the error points at a bug in whatever produced the workload
    /// rather than at user input
    pub fn is_defect(&self) -> bool {
        matches!(self, CompileError::MissingRequiredField { .. })
    }
}

/// A compiled stack, ready to hand to a deployment component
#[derive(Debug, Clone, PartialEq)]
pub struct StackArtifact {
    /// `<app>-<env>-<service>`
    pub stack_name: String,
    pub template: Template,
    /// Override values ordered by key
    pub parameters: Vec<Parameter>,
    /// Suffix used for helper resources that need globally unique names
    pub unique_suffix: Option<UniqueSuffix>,
    /// Stack-level tags ordered by key
    pub tags: BTreeMap<String, String>,
}

impl StackArtifact {
    /// The template rendered as YAML
    pub fn template_body(&self) -> Result<String, CompileError> {
        self.template.to_yaml()
    }

    /// The parameters rendered as a JSON array
    pub fn serialized_parameters(&self) -> Result<String, CompileError> {
        parameters_to_json(&self.parameters)
    }
}

/// Desired count bounds for application auto scaling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ScalingRange {
    pub min: u32,
    pub max: u32,
    pub cpu_percentage: Option<u32>,
    pub memory_percentage: Option<u32>,
}

/// Task settings every workload kind needs, checked once up front
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TaskSettings {
    pub image: String,
    pub port: Option<u16>,
    pub cpu: u32,
    pub memory: u32,
    pub desired_count: u32,
    pub scaling: Option<ScalingRange>,
}

/// Everything a kind-specific builder needs for one compile
pub(crate) struct StackContext<'a> {
    pub workload: &'a Workload,
    pub app: &'a str,
    pub env: &'a str,
    pub runtime: &'a RuntimeConfig,
    pub namer: ResourceNamer,
    pub task: TaskSettings,
}

impl<'a> StackContext<'a> {
    fn new(
        workload: &'a Workload,
        app: &'a str,
        env: &'a str,
        runtime: &'a RuntimeConfig,
    ) -> Result<Self, CompileError> {
        if workload.name.is_empty() {
            return Err(CompileError::missing("name"));
        }
        let task = TaskSettings::from_workload(workload, runtime)?;
        Ok(Self {
            workload,
            app,
            env,
            runtime,
            namer: ResourceNamer::new(app, env, &workload.name),
            task,
        })
    }

    /// Stack tags: the additional tags plus the reserved identity tags
    pub fn tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.runtime.additional_tags.clone();
        tags.insert(APPLICATION_TAG.to_string(), self.app.to_string());
        tags.insert(ENVIRONMENT_TAG.to_string(), self.env.to_string());
        tags.insert(SERVICE_TAG.to_string(), self.workload.name.clone());
        tags
    }
}

impl TaskSettings {
    fn from_workload(workload: &Workload, runtime: &RuntimeConfig) -> Result<Self, CompileError> {
        let image = runtime
            .image
            .clone()
            .or_else(|| workload.image.location.clone())
            .ok_or_else(|| CompileError::missing("image.location"))?;
        let cpu = workload.cpu.ok_or_else(|| CompileError::missing("cpu"))?;
        let memory = workload.memory.ok_or_else(|| CompileError::missing("memory"))?;

        let (desired_count, scaling) = match workload.count.as_ref() {
            None => return Err(CompileError::missing("count")),
            Some(Count::Fixed(n)) => (*n, None),
            Some(Count::Autoscaling(config)) => {
                let (min, max) = parse_range(&config.range)?;
                let range = ScalingRange {
                    min,
                    max,
                    cpu_percentage: config.cpu_percentage,
                    memory_percentage: config.memory_percentage,
                };
                (min, Some(range))
            }
        };

        Ok(Self {
            image,
            port: workload.image.port,
            cpu,
            memory,
            desired_count,
            scaling,
        })
    }
}

/// Parse an inclusive `min-max` task range
fn parse_range(range: &str) -> Result<(u32, u32), CompileError> {
    let invalid = || CompileError::unsupported("count.range", format!("'{range}' is not a range like 1-10"));
    let (min, max) = range.split_once('-').ok_or_else(invalid)?;
    let min: u32 = min.trim().parse().map_err(|_| invalid())?;
    let max: u32 = max.trim().parse().map_err(|_| invalid())?;
    if min > max {
        return Err(invalid());
    }
    Ok((min, max))
}

fn parameter_specs(ctx: &StackContext<'_>) -> Result<Vec<ParameterSpec>, CompileError> {
    match ctx.workload.kind {
        WorkloadKind::LoadBalancedWebService => lb_web_service::parameters(ctx),
        WorkloadKind::BackendService => backend_service::parameters(ctx),
    }
}

/// Compile a resolved workload into a stack artifact
///
/// The workload must already have its environment overlay applied. Helper
/// resources with provider-enforced unique names use
/// `runtime.unique_suffix`, or a fresh random suffix when none is supplied.
pub fn compile(
    workload: &Workload,
    app_name: &str,
    env_name: &str,
    runtime: &RuntimeConfig,
) -> Result<StackArtifact, CompileError> {
    let ctx = StackContext::new(workload, app_name, env_name, runtime)?;
    info!(
        stack = %ctx.namer.stack_name(),
        kind = %workload.kind,
        partition = %runtime.partition,
        "compiling stack"
    );

    let specs = parameter_specs(&ctx)?;
    let (template, unique_suffix) = match workload.kind {
        WorkloadKind::LoadBalancedWebService => {
            let suffix = UniqueSuffix::resolve(runtime.unique_suffix.as_deref())?;
            (lb_web_service::template(&ctx, &specs, &suffix)?, Some(suffix))
        }
        WorkloadKind::BackendService => (backend_service::template(&ctx, &specs)?, None),
    };

    debug!(
        stack = %ctx.namer.stack_name(),
        resources = template.resources.len(),
        parameters = specs.len(),
        "compiled stack"
    );

    Ok(StackArtifact {
        stack_name: ctx.namer.stack_name(),
        template,
        parameters: parameters::ordered(specs),
        unique_suffix,
        tags: ctx.tags(),
    })
}

/// The parameter values `compile` would produce, ordered by key
pub fn serialize_parameters(
    workload: &Workload,
    app_name: &str,
    env_name: &str,
    runtime: &RuntimeConfig,
) -> Result<Vec<Parameter>, CompileError> {
    let ctx = StackContext::new(workload, app_name, env_name, runtime)?;
    Ok(parameters::ordered(parameter_specs(&ctx)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_range() {
        assert_eq!(parse_range("1-10").unwrap(), (1, 10));
        assert_eq!(parse_range(" 2 - 4 ").unwrap(), (2, 4));
        assert!(matches!(parse_range("10-1"), Err(CompileError::UnsupportedShape { .. })));
        assert!(matches!(parse_range("ten"), Err(CompileError::UnsupportedShape { .. })));
    }

    #[test]
    fn test_is_defect() {
        assert!(CompileError::missing("cpu").is_defect());
        assert!(!CompileError::unsupported("http.alias", "no").is_defect());
    }

    #[test]
    fn test_missing_fields() {
        let workload: Workload = serde_yaml::from_str(
            r#"
name: worker
type: Backend Service
image:
  location: busybox
memory: 512
count: 1
"#,
        )
        .unwrap();
        let err = compile(&workload, "app", "test", &RuntimeConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "missing required field 'cpu'");

        let err = serialize_parameters(&workload, "app", "test", &RuntimeConfig::default()).unwrap_err();
        assert!(err.is_defect());
    }

    #[test]
    fn test_runtime_image_wins() {
        let workload: Workload = serde_yaml::from_str(
            r#"
name: worker
type: Backend Service
cpu: 256
memory: 512
count: 1
"#,
        )
        .unwrap();
        let runtime = RuntimeConfig::default().with_image("123456789012.dkr.ecr.us-east-1.amazonaws.com/worker:abc");
        let params = serialize_parameters(&workload, "app", "test", &runtime).unwrap();
        let image = params.iter().find(|p| p.key == "ContainerImage").unwrap();
        assert_eq!(image.value, "123456789012.dkr.ecr.us-east-1.amazonaws.com/worker:abc");
    }

    #[test]
    fn test_reserved_tags_win() {
        let workload: Workload = serde_yaml::from_str(
            "name: worker\ntype: Backend Service\nimage:\n  location: busybox\ncpu: 256\nmemory: 512\ncount: 1\n",
        )
        .unwrap();
        let runtime = RuntimeConfig::default()
            .with_additional_tag("service", "spoofed")
            .with_additional_tag("owner", "platform");
        let artifact = compile(&workload, "app", "test", &runtime).unwrap();
        assert_eq!(artifact.tags["service"], "worker");
        assert_eq!(artifact.tags["owner"], "platform");
        assert_eq!(artifact.unique_suffix, None);
    }
}
