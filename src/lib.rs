//! Stack Compiler - compiles containerized workloads into infrastructure stacks
//!
//! This library resolves a workload description for one environment and
//! compiles it into a deployable stack: a template document plus the ordered
//! parameter values to deploy it with. It also resolves the partition and
//! caller identity needed to build correct resource identifiers.
//!
//! # Example
//!
//! ```rust
//! use stack_compiler::{compile_for_environment, RuntimeConfig, Workload};
//!
//! let workload: Workload = serde_yaml::from_str(r#"
//! name: worker
//! type: Backend Service
//! image:
//!   location: busybox
//! cpu: 256
//! memory: 512
//! count: 1
//! environments:
//!   prod:
//!     count: 3
//! "#).unwrap();
//!
//! let runtime = RuntimeConfig::new("123456789012", "us-west-2");
//! let artifact = compile_for_environment(&workload, "shop", "prod", &runtime).unwrap();
//! assert_eq!(artifact.stack_name, "shop-prod-worker");
//! assert!(artifact.template_body().unwrap().contains("AWS::ECS::Service"));
//! ```

pub mod error;
pub mod identity;
pub mod manifest;
pub mod stack;

pub use error::Error;
pub use identity::{
    resolve_caller, resolve_partition, Caller, CallerIdentityApi, IdentityError,
    IdentityResolver, Partition, RawIdentity,
};
pub use manifest::{apply_environment, OverlayError, Workload, WorkloadKind};
pub use stack::{
    compile, parameters_to_json, serialize_parameters, CompileError, Parameter, RuntimeConfig,
    StackArtifact, Template, UniqueSuffix,
};

use tracing::info;

/// Resolve `base` for `env_name` and compile the result
///
/// This is the full pipeline: overlay resolution followed by compilation.
pub fn compile_for_environment(
    base: &Workload,
    app_name: &str,
    env_name: &str,
    runtime: &RuntimeConfig,
) -> Result<StackArtifact, Error> {
    let resolved = apply_environment(base, env_name)?;
    let artifact = compile(&resolved, app_name, env_name, runtime)?;
    info!(
        stack = %artifact.stack_name,
        parameters = artifact.parameters.len(),
        "stack ready"
    );
    Ok(artifact)
}
