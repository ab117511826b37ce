//! Resources shared by every workload kind: logging, IAM, task definition,
//! ECS service, service discovery, add-ons and auto scaling

use std::collections::BTreeMap;

use serde_json::{json, Value};

use crate::manifest::{ContainerHealthCheck, Placement, SidecarConfig};

use super::naming::Role;
use super::parameters::*;
use super::template::{
    equals, get_att, import_env, join, not, reference, split, sub, tag_list, Output, Resource,
    Template,
};
use super::{ParameterSpec, StackContext};

pub(crate) const HAS_ADDONS: &str = "HasAddons";

const ECS_TASKS_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";
const EXECUTION_ROLE_POLICY: &str = "service-role/AmazonECSTaskExecutionRolePolicy";
const LOG_STREAM_PREFIX: &str = "ecs";

const DEFAULT_CONTAINER_HC_INTERVAL: u64 = 10;
const DEFAULT_CONTAINER_HC_RETRIES: u32 = 2;
const DEFAULT_CONTAINER_HC_TIMEOUT: u64 = 5;
const DEFAULT_CONTAINER_HC_START_PERIOD: u64 = 0;

const DEFAULT_SCALING_CPU_PERCENTAGE: u32 = 70;
const SCALE_IN_COOLDOWN: u32 = 120;
const SCALE_OUT_COOLDOWN: u32 = 60;

/// Parameters every workload stack declares
pub(crate) fn base_parameters(ctx: &StackContext<'_>) -> Vec<ParameterSpec> {
    let port = ctx
        .task
        .port
        .map(|p| p.to_string())
        .unwrap_or_else(|| NO_EXPOSED_PORT.to_string());

    vec![
        ParameterSpec::string(APP_NAME, ctx.app),
        ParameterSpec::string(ENV_NAME, ctx.env),
        ParameterSpec::string(WORKLOAD_NAME, ctx.workload.name.as_str()),
        ParameterSpec::string(CONTAINER_IMAGE, ctx.task.image.as_str()),
        ParameterSpec::number(CONTAINER_PORT, port),
        ParameterSpec::number(TASK_CPU, ctx.task.cpu),
        ParameterSpec::number(TASK_MEMORY, ctx.task.memory),
        ParameterSpec::number(TASK_COUNT, ctx.task.desired_count),
        ParameterSpec::number(LOG_RETENTION, ctx.runtime.log_retention_days),
        ParameterSpec::string(
            ADDONS_TEMPLATE_URL,
            ctx.runtime.addons_template_url.clone().unwrap_or_default(),
        ),
    ]
}

/// A template with metadata, parameter declarations and shared conditions
pub(crate) fn skeleton(description: &str, specs: &[ParameterSpec]) -> Template {
    let mut template = Template::new(description);
    template.metadata.insert(
        "Version".to_string(),
        json!(concat!("stack-compiler v", env!("CARGO_PKG_VERSION"))),
    );
    template.parameters = declarations(specs);
    template.add_condition(HAS_ADDONS, not(equals(reference(ADDONS_TEMPLATE_URL), json!(""))));
    template
}

pub(crate) fn assume_role_policy(service: &str) -> Value {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": { "Service": service },
            "Action": "sts:AssumeRole",
        }],
    })
}

/// Log group, IAM roles, task definition and service discovery entry
pub(crate) fn add_task_resources(ctx: &StackContext<'_>, template: &mut Template) {
    template.add_resource(
        Role::LogGroup.logical_id(),
        Resource::new(
            "AWS::Logs::LogGroup",
            json!({
                "LogGroupName": sub("/ecs/${AppName}-${EnvName}-${WorkloadName}"),
                "RetentionInDays": reference(LOG_RETENTION),
            }),
        ),
    );
    template.add_resource(Role::ExecutionRole.logical_id(), execution_role(ctx));
    template.add_resource(Role::TaskRole.logical_id(), task_role(ctx));
    template.add_resource(Role::TaskDefinition.logical_id(), task_definition(ctx));
    template.add_resource(Role::DiscoveryService.logical_id(), discovery_service(ctx));
}

/// ARN the execution role needs to read for a secret reference
///
/// Full ARNs are used as-is; anything else names an SSM parameter in the
/// stack's own account and region.
fn secret_arn(value_from: &str) -> Value {
    if value_from.starts_with("arn:") {
        json!(value_from)
    } else {
        sub(&format!(
            "arn:${{AWS::Partition}}:ssm:${{AWS::Region}}:${{AWS::AccountId}}:parameter/{}",
            value_from.trim_start_matches('/')
        ))
    }
}

fn execution_role(ctx: &StackContext<'_>) -> Resource {
    let mut properties = json!({
        "AssumeRolePolicyDocument": assume_role_policy(ECS_TASKS_PRINCIPAL),
        "ManagedPolicyArns": [ctx.runtime.partition.managed_policy_arn(EXECUTION_ROLE_POLICY)],
    });

    if !ctx.workload.secrets.is_empty() {
        let resources: Vec<Value> = ctx.workload.secrets.values().map(|v| secret_arn(v)).collect();
        properties["Policies"] = json!([{
            "PolicyName": "SecretsAccess",
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [{
                    "Effect": "Allow",
                    "Action": ["ssm:GetParameters", "secretsmanager:GetSecretValue", "kms:Decrypt"],
                    "Resource": resources,
                }],
            },
        }]);
    }
    Resource::new("AWS::IAM::Role", properties)
}

fn task_role(ctx: &StackContext<'_>) -> Resource {
    let mut properties = json!({
        "AssumeRolePolicyDocument": assume_role_policy(ECS_TASKS_PRINCIPAL),
    });

    if ctx.workload.exec {
        properties["Policies"] = json!([{
            "PolicyName": "ExecuteCommand",
            "PolicyDocument": {
                "Version": "2012-10-17",
                "Statement": [
                    {
                        "Effect": "Allow",
                        "Action": [
                            "ssmmessages:CreateControlChannel",
                            "ssmmessages:OpenControlChannel",
                            "ssmmessages:CreateDataChannel",
                            "ssmmessages:OpenDataChannel",
                        ],
                        "Resource": "*",
                    },
                    {
                        "Effect": "Allow",
                        "Action": [
                            "logs:CreateLogStream",
                            "logs:DescribeLogGroups",
                            "logs:DescribeLogStreams",
                            "logs:PutLogEvents",
                        ],
                        "Resource": "*",
                    },
                ],
            },
        }]);
    }
    Resource::new("AWS::IAM::Role", properties)
}

fn log_configuration(ctx: &StackContext<'_>) -> Value {
    json!({
        "LogDriver": "awslogs",
        "Options": {
            "awslogs-region": reference("AWS::Region"),
            "awslogs-group": reference(Role::LogGroup.logical_id()),
            "awslogs-stream-prefix": LOG_STREAM_PREFIX,
        },
    })
}

/// `[{Name, Value}]` list ordered by name
fn name_value_list(vars: &BTreeMap<String, Value>) -> Value {
    Value::Array(
        vars.iter()
            .map(|(name, value)| json!({ "Name": name, "Value": value }))
            .collect(),
    )
}

fn main_environment(ctx: &StackContext<'_>) -> Value {
    let mut vars: BTreeMap<String, Value> = ctx
        .workload
        .variables
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect();
    vars.insert("APP_NAME".to_string(), reference(APP_NAME));
    vars.insert("ENV_NAME".to_string(), reference(ENV_NAME));
    vars.insert("SERVICE_NAME".to_string(), reference(WORKLOAD_NAME));
    vars.insert(
        "SERVICE_DISCOVERY_ENDPOINT".to_string(),
        sub("${EnvName}.${AppName}.local"),
    );
    name_value_list(&vars)
}

fn container_health_check(hc: &ContainerHealthCheck) -> Value {
    json!({
        "Command": hc.command,
        "Interval": hc.interval.map(|d| d.as_secs()).unwrap_or(DEFAULT_CONTAINER_HC_INTERVAL),
        "Retries": hc.retries.unwrap_or(DEFAULT_CONTAINER_HC_RETRIES),
        "Timeout": hc.timeout.map(|d| d.as_secs()).unwrap_or(DEFAULT_CONTAINER_HC_TIMEOUT),
        "StartPeriod": hc.start_period.map(|d| d.as_secs()).unwrap_or(DEFAULT_CONTAINER_HC_START_PERIOD),
    })
}

fn main_container(ctx: &StackContext<'_>) -> Value {
    let workload = ctx.workload;
    let mut container = json!({
        "Name": reference(WORKLOAD_NAME),
        "Image": reference(CONTAINER_IMAGE),
        "Essential": true,
        "Environment": main_environment(ctx),
        "LogConfiguration": log_configuration(ctx),
    });

    if ctx.task.port.is_some() {
        container["PortMappings"] = json!([{ "ContainerPort": reference(CONTAINER_PORT), "Protocol": "tcp" }]);
    }
    if !workload.secrets.is_empty() {
        container["Secrets"] = Value::Array(
            workload
                .secrets
                .iter()
                .map(|(name, value_from)| json!({ "Name": name, "ValueFrom": value_from }))
                .collect(),
        );
    }
    if let Some(entrypoint) = &workload.entrypoint {
        container["EntryPoint"] = json!(entrypoint);
    }
    if let Some(command) = &workload.command {
        container["Command"] = json!(command);
    }
    if let Some(hc) = &workload.healthcheck {
        container["HealthCheck"] = container_health_check(hc);
    }
    container
}

fn sidecar_container(ctx: &StackContext<'_>, name: &str, sidecar: &SidecarConfig) -> Value {
    let vars: BTreeMap<String, Value> = sidecar
        .variables
        .iter()
        .map(|(k, v)| (k.clone(), json!(v)))
        .collect();
    let mut container = json!({
        "Name": name,
        "Image": sidecar.image,
        "Essential": sidecar.essential.unwrap_or(true),
        "Environment": name_value_list(&vars),
        "LogConfiguration": log_configuration(ctx),
    });
    if let Some(port) = sidecar.port {
        container["PortMappings"] = json!([{ "ContainerPort": port, "Protocol": "tcp" }]);
    }
    container
}

fn task_definition(ctx: &StackContext<'_>) -> Resource {
    let mut containers = vec![main_container(ctx)];
    containers.extend(
        ctx.workload
            .sidecars
            .iter()
            .map(|(name, sidecar)| sidecar_container(ctx, name, sidecar)),
    );

    Resource::new(
        "AWS::ECS::TaskDefinition",
        json!({
            "Family": sub("${AppName}-${EnvName}-${WorkloadName}"),
            "NetworkMode": "awsvpc",
            "RequiresCompatibilities": ["FARGATE"],
            "Cpu": reference(TASK_CPU),
            "Memory": reference(TASK_MEMORY),
            "ExecutionRoleArn": get_att(Role::ExecutionRole.logical_id(), "Arn"),
            "TaskRoleArn": get_att(Role::TaskRole.logical_id(), "Arn"),
            "ContainerDefinitions": containers,
        }),
    )
}

fn discovery_service(ctx: &StackContext<'_>) -> Resource {
    let mut records = vec![json!({ "TTL": 10, "Type": "A" })];
    if ctx.task.port.is_some() {
        records.push(json!({ "TTL": 10, "Type": "SRV" }));
    }
    Resource::new(
        "AWS::ServiceDiscovery::Service",
        json!({
            "Description": sub("Discovery service for the ${WorkloadName} service"),
            "DnsConfig": { "RoutingPolicy": "MULTIVALUE", "DnsRecords": records },
            "HealthCheckCustomConfig": { "FailureThreshold": 1 },
            "Name": reference(WORKLOAD_NAME),
            "NamespaceId": import_env("ServiceDiscoveryNamespaceID"),
        }),
    )
}

/// Properties of the ECS service; kind builders add load balancer settings
pub(crate) fn service_properties(ctx: &StackContext<'_>) -> Value {
    let vpc = &ctx.workload.network.vpc;
    let (assign_public_ip, subnets) = match vpc.placement {
        Placement::Public => ("ENABLED", "PublicSubnets"),
        Placement::Private => ("DISABLED", "PrivateSubnets"),
    };
    let mut security_groups = vec![import_env("EnvironmentSecurityGroup")];
    security_groups.extend(vpc.security_groups.iter().map(|sg| json!(sg)));

    let mut registry = json!({ "RegistryArn": get_att(Role::DiscoveryService.logical_id(), "Arn") });
    if ctx.task.port.is_some() {
        registry["Port"] = reference(CONTAINER_PORT);
    }

    json!({
        "PlatformVersion": "LATEST",
        "Cluster": import_env("ClusterId"),
        "TaskDefinition": reference(Role::TaskDefinition.logical_id()),
        "DesiredCount": reference(TASK_COUNT),
        "DeploymentConfiguration": {
            "MinimumHealthyPercent": 100,
            "MaximumPercent": 200,
            "DeploymentCircuitBreaker": { "Enable": true, "Rollback": true },
        },
        "PropagateTags": "SERVICE",
        "LaunchType": "FARGATE",
        "EnableExecuteCommand": ctx.workload.exec,
        "NetworkConfiguration": {
            "AwsvpcConfiguration": {
                "AssignPublicIp": assign_public_ip,
                "Subnets": split(",", import_env(subnets)),
                "SecurityGroups": security_groups,
            },
        },
        "ServiceRegistries": [registry],
        "Tags": tag_list(&ctx.tags()),
    })
}

/// Nested add-ons stack, present only when a template URL is supplied
pub(crate) fn add_addons_stack(ctx: &StackContext<'_>, template: &mut Template) {
    template.add_resource(
        Role::AddonsStack.logical_id(),
        Resource::new(
            "AWS::CloudFormation::Stack",
            json!({
                "Parameters": {
                    "App": reference(APP_NAME),
                    "Env": reference(ENV_NAME),
                    "Name": reference(WORKLOAD_NAME),
                },
                "TemplateURL": reference(ADDONS_TEMPLATE_URL),
            }),
        )
        .with_condition(HAS_ADDONS),
    );
}

/// Scalable target and target-tracking policies for a task count range
pub(crate) fn add_autoscaling(ctx: &StackContext<'_>, template: &mut Template) {
    let Some(range) = ctx.task.scaling else {
        return;
    };

    let target_id = Role::AutoScalingTarget.logical_id();
    template.add_resource(
        target_id,
        Resource::new(
            "AWS::ApplicationAutoScaling::ScalableTarget",
            json!({
                "MinCapacity": range.min,
                "MaxCapacity": range.max,
                "ResourceId": join("/", json!([
                    "service",
                    import_env("ClusterId"),
                    get_att(Role::Service.logical_id(), "Name"),
                ])),
                "RoleARN": sub("arn:${AWS::Partition}:iam::${AWS::AccountId}:role/aws-service-role/ecs.application-autoscaling.amazonaws.com/AWSServiceRoleForApplicationAutoScaling_ECSService"),
                "ScalableDimension": "ecs:service:DesiredCount",
                "ServiceNamespace": "ecs",
            }),
        ),
    );

    let cpu = match (range.cpu_percentage, range.memory_percentage) {
        (None, None) => Some(DEFAULT_SCALING_CPU_PERCENTAGE),
        (cpu, _) => cpu,
    };
    let policies = [
        (Role::AutoScalingCpuPolicy, "ECSServiceAverageCPUUtilization", cpu),
        (
            Role::AutoScalingMemoryPolicy,
            "ECSServiceAverageMemoryUtilization",
            range.memory_percentage,
        ),
    ];
    for (role, metric, target_value) in policies {
        let Some(target_value) = target_value else {
            continue;
        };
        let id = role.logical_id();
        template.add_resource(
            id,
            Resource::new(
                "AWS::ApplicationAutoScaling::ScalingPolicy",
                json!({
                    "PolicyName": sub(&format!("${{AWS::StackName}}-{id}")),
                    "PolicyType": "TargetTrackingScaling",
                    "ScalingTargetId": reference(target_id),
                    "TargetTrackingScalingPolicyConfiguration": {
                        "PredefinedMetricSpecification": { "PredefinedMetricType": metric },
                        "ScaleInCooldown": SCALE_IN_COOLDOWN,
                        "ScaleOutCooldown": SCALE_OUT_COOLDOWN,
                        "TargetValue": target_value,
                    },
                }),
            ),
        );
    }
}

pub(crate) fn add_common_outputs(ctx: &StackContext<'_>, template: &mut Template) {
    template.add_output(
        "DiscoveryServiceARN",
        Output::new(get_att(Role::DiscoveryService.logical_id(), "Arn"))
            .with_description("ARN of the Discovery Service.")
            .exported_as("DiscoveryServiceARN"),
    );
}
