//! Environment overlay resolution

use serde_json::Value;
use tracing::debug;

use super::node::Node;
use super::workload::Workload;
use super::OverlayError;

/// Resolve `base` for `environment_name`
///
/// The fragment stored under `environments.<environment_name>` is merged onto
/// the base. A missing fragment leaves the base untouched. The returned
/// workload carries no override fragments, so resolving it again is a no-op.
pub fn apply_environment(base: &Workload, environment_name: &str) -> Result<Workload, OverlayError> {
    let mut resolved = base.clone();
    let environments = std::mem::take(&mut resolved.environments);

    let Some(fragment) = environments.get(environment_name) else {
        debug!(workload = %base.name, env = %environment_name, "no override fragment for environment");
        return Ok(resolved);
    };

    let fragment_path = format!("environments.{environment_name}");
    let tree = serde_json::to_value(&resolved).map_err(|e| OverlayError::InvalidOverride {
        path: fragment_path.clone(),
        reason: e.to_string(),
    })?;
    let merged = Node::from(tree).merge(fragment.clone(), "")?;

    let mut resolved: Workload =
        serde_json::from_value(Value::from(merged)).map_err(|e| OverlayError::InvalidOverride {
            path: fragment_path,
            reason: e.to_string(),
        })?;
    resolved.environments.clear();

    debug!(workload = %resolved.name, env = %environment_name, "applied environment overrides");
    Ok(resolved)
}

impl Workload {
    /// Resolve this workload for an environment; see [`apply_environment`]
    pub fn apply_env(&self, environment_name: &str) -> Result<Workload, OverlayError> {
        apply_environment(self, environment_name)
    }
}
