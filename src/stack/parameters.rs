//! Stack parameter declarations and their serialized values

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::CompileError;

pub const APP_NAME: &str = "AppName";
pub const ENV_NAME: &str = "EnvName";
pub const WORKLOAD_NAME: &str = "WorkloadName";
pub const CONTAINER_IMAGE: &str = "ContainerImage";
pub const CONTAINER_PORT: &str = "ContainerPort";
pub const TASK_CPU: &str = "TaskCPU";
pub const TASK_MEMORY: &str = "TaskMemory";
pub const TASK_COUNT: &str = "TaskCount";
pub const LOG_RETENTION: &str = "LogRetention";
pub const ADDONS_TEMPLATE_URL: &str = "AddonsTemplateURL";
pub const TARGET_CONTAINER: &str = "TargetContainer";
pub const TARGET_PORT: &str = "TargetPort";
pub const HTTPS_ENABLED: &str = "HTTPSEnabled";
pub const RULE_PATH: &str = "RulePath";
pub const HEALTH_CHECK_PATH: &str = "HealthCheckPath";
pub const STICKINESS: &str = "Stickiness";
pub const ALIASES: &str = "Aliases";

/// Value of `ContainerPort` when the workload exposes no port
pub const NO_EXPOSED_PORT: &str = "-1";

/// One override value passed with the template at stack-update time
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Parameter {
    #[serde(rename = "ParameterKey")]
    pub key: String,
    #[serde(rename = "ParameterValue")]
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ParameterType {
    String,
    Number,
}

/// A template parameter declaration together with the value to deploy it with
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ParameterSpec {
    pub key: &'static str,
    pub kind: ParameterType,
    pub value: String,
}

impl ParameterSpec {
    pub fn string(key: &'static str, value: impl Into<String>) -> Self {
        Self {
            key,
            kind: ParameterType::String,
            value: value.into(),
        }
    }

    pub fn number(key: &'static str, value: impl ToString) -> Self {
        Self {
            key,
            kind: ParameterType::Number,
            value: value.to_string(),
        }
    }

    /// The `Parameters` section entry for this spec
    pub fn declaration(&self) -> Value {
        match self.kind {
            ParameterType::String => json!({ "Type": "String" }),
            ParameterType::Number => json!({ "Type": "Number" }),
        }
    }
}

/// Template `Parameters` section built from specs
pub(crate) fn declarations(specs: &[ParameterSpec]) -> BTreeMap<String, Value> {
    specs
        .iter()
        .map(|spec| (spec.key.to_string(), spec.declaration()))
        .collect()
}

/// Serialized parameter values, ordered by key
pub(crate) fn ordered(specs: Vec<ParameterSpec>) -> Vec<Parameter> {
    let mut params: Vec<Parameter> = specs
        .into_iter()
        .map(|spec| Parameter {
            key: spec.key.to_string(),
            value: spec.value,
        })
        .collect();
    params.sort();
    params
}

/// Join list values with commas, the format `Fn::Split` reads back
pub(crate) fn join_list(values: &[String]) -> String {
    values.join(",")
}

/// Render parameters as a JSON array of `ParameterKey`/`ParameterValue`
/// objects
pub fn parameters_to_json(params: &[Parameter]) -> Result<String, CompileError> {
    serde_json::to_string_pretty(params).map_err(|e| CompileError::Render(e.to_string()))
}
