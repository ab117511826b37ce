//! Backend Service stacks: the shared task resources without a load balancer

use super::naming::Role;
use super::resources;
use super::template::{Resource, Template};
use super::{CompileError, ParameterSpec, StackContext};

pub(crate) fn parameters(ctx: &StackContext<'_>) -> Result<Vec<ParameterSpec>, CompileError> {
    if ctx.workload.http.is_some() {
        return Err(CompileError::unsupported(
            "http",
            "a Backend Service is not exposed through the load balancer",
        ));
    }
    Ok(resources::base_parameters(ctx))
}

pub(crate) fn template(ctx: &StackContext<'_>, specs: &[ParameterSpec]) -> Result<Template, CompileError> {
    let mut template = resources::skeleton(
        &format!("Backend Service {} for {}-{}", ctx.workload.name, ctx.app, ctx.env),
        specs,
    );
    resources::add_task_resources(ctx, &mut template);
    template.add_resource(
        Role::Service.logical_id(),
        Resource::new("AWS::ECS::Service", resources::service_properties(ctx)),
    );
    resources::add_addons_stack(ctx, &mut template);
    resources::add_autoscaling(ctx, &mut template);
    resources::add_common_outputs(ctx, &mut template);
    Ok(template)
}

#[cfg(test)]
mod tests {
    use crate::manifest::Workload;
    use crate::stack::{compile, serialize_parameters, CompileError, RuntimeConfig};

    const WORKER: &str = "name: worker\ntype: Backend Service\nimage:\n  location: busybox\ncpu: 256\nmemory: 512\n";

    #[test]
    fn test_no_load_balancer_resources() {
        let workload: Workload = serde_yaml::from_str(&format!("{WORKER}count: 2\n")).unwrap();
        let artifact = compile(&workload, "shop", "test", &RuntimeConfig::default()).unwrap();
        let resources = &artifact.template.resources;
        assert!(resources.contains_key("Service"));
        assert!(!resources.contains_key("TargetGroup"));
        assert!(!resources.contains_key("EnvControllerFunction"));
        assert!(artifact.template.conditions.contains_key("HasAddons"));
        assert_eq!(resources["AddonsStack"].condition.as_deref(), Some("HasAddons"));
    }

    #[test]
    fn test_autoscaling_range() {
        let workload: Workload = serde_yaml::from_str(&format!(
            "{WORKER}count:\n  range: 1-4\n  memory_percentage: 60\n"
        ))
        .unwrap();
        let artifact = compile(&workload, "shop", "test", &RuntimeConfig::default()).unwrap();
        let resources = &artifact.template.resources;
        assert_eq!(resources["AutoScalingTarget"].properties["MaxCapacity"], 4);
        assert!(resources.contains_key("AutoScalingPolicyECSServiceAverageMemoryUtilization"));
        assert!(!resources.contains_key("AutoScalingPolicyECSServiceAverageCPUUtilization"));

        let count = artifact.parameters.iter().find(|p| p.key == "TaskCount").unwrap();
        assert_eq!(count.value, "1");
    }

    #[test]
    fn test_http_block_rejected() {
        let workload: Workload =
            serde_yaml::from_str(&format!("{WORKER}count: 1\nhttp:\n  path: /\n")).unwrap();
        let err = compile(&workload, "shop", "test", &RuntimeConfig::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedShape { ref feature, .. } if feature == "http"));

        let err = serialize_parameters(&workload, "shop", "test", &RuntimeConfig::default()).unwrap_err();
        assert!(matches!(err, CompileError::UnsupportedShape { ref feature, .. } if feature == "http"));
    }
}
