//! Load Balanced Web Service stacks
//!
//! On top of the shared task resources these stacks register the service with
//! the environment's application load balancer: a target group, listener
//! rules at a free priority, and the two helper functions that find that
//! priority and enable the listeners on the environment stack.

use serde_json::{json, Value};

use crate::identity::Partition;
use crate::manifest::{HealthCheckConfig, HttpConfig};

use super::naming::{Role, UniqueSuffix, UNIQUE_SUFFIX_OUTPUT};
use super::parameters::*;
use super::payload::{AutomationPayload, ENV_CONTROLLER, PAYLOAD_HANDLER, PAYLOAD_RUNTIME, RULE_PRIORITY};
use super::resources;
use super::template::{
    equals, get_att, if_then, import_env, no_value, not, reference, split, sub, Output, Resource,
    Template,
};
use super::{CompileError, ParameterSpec, StackContext};

const HTTP_LOAD_BALANCER: &str = "HTTPLoadBalancer";
const HTTPS_LOAD_BALANCER: &str = "HTTPSLoadBalancer";
const IS_DEFAULT_ROOT_PATH: &str = "IsDefaultRootPath";
const HAS_ALIASES: &str = "HasAliases";

/// Environment stack parameter listing the services behind the load balancer
const ALB_WORKLOADS_PARAMETER: &str = "ALBWorkloads";

const LAMBDA_PRINCIPAL: &str = "lambda.amazonaws.com";
const LAMBDA_BASIC_EXECUTION_POLICY: &str = "service-role/AWSLambdaBasicExecutionRole";
const FUNCTION_NAME_MAX_LEN: usize = 64;
const FUNCTION_TIMEOUT_SECS: u32 = 600;

const DEFAULT_HEALTH_CHECK_PATH: &str = "/";
const DEFAULT_HEALTHY_THRESHOLD: u32 = 2;
const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 2;
const DEFAULT_HEALTH_CHECK_INTERVAL: u64 = 10;
const DEFAULT_HEALTH_CHECK_TIMEOUT: u64 = 5;
const DEFAULT_SUCCESS_CODES: &str = "200";
const DEFAULT_GRACE_PERIOD: u64 = 60;
const DEFAULT_DEREGISTRATION_DELAY: u64 = 60;

/// HTTP exposure settings, validated against the workload and runtime
#[derive(Debug)]
struct LbSettings<'a> {
    http: &'a HttpConfig,
    rule_path: String,
    target_container: String,
    target_port: u16,
    aliases: Vec<String>,
    health_check: HealthCheckConfig,
}

impl<'a> LbSettings<'a> {
    fn new(ctx: &StackContext<'a>) -> Result<Self, CompileError> {
        let workload = ctx.workload;
        let http = workload.http.as_ref().ok_or_else(|| CompileError::missing("http"))?;
        let path = http.path.as_deref().ok_or_else(|| CompileError::missing("http.path"))?;
        let main_port = ctx.task.port.ok_or_else(|| CompileError::missing("image.port"))?;

        let (target_container, target_port) = match http.target_container.as_deref() {
            None => (workload.name.clone(), http.target_port.unwrap_or(main_port)),
            Some(name) if name == workload.name => (name.to_string(), http.target_port.unwrap_or(main_port)),
            Some(name) => {
                let sidecar = workload.sidecars.get(name).ok_or_else(|| {
                    CompileError::unsupported(
                        "http.target_container",
                        format!("'{name}' is neither the main container nor a sidecar"),
                    )
                })?;
                let port = http.target_port.or(sidecar.port).ok_or_else(|| {
                    CompileError::unsupported(
                        "http.target_container",
                        format!("sidecar '{name}' does not expose a port"),
                    )
                })?;
                (name.to_string(), port)
            }
        };

        let aliases = http.alias.clone().unwrap_or_default();
        if !aliases.is_empty() {
            if ctx.runtime.partition == Partition::AwsCn {
                return Err(CompileError::unsupported(
                    "http.alias",
                    format!("aliases are not available in the {} partition", ctx.runtime.partition),
                ));
            }
            if !ctx.runtime.https_listener {
                return Err(CompileError::unsupported(
                    "http.alias",
                    "aliases require an HTTPS listener in the environment",
                ));
            }
        }

        Ok(Self {
            http,
            rule_path: rule_path(path),
            target_container,
            target_port,
            aliases,
            health_check: http.healthcheck.as_ref().map(|hc| hc.config()).unwrap_or_default(),
        })
    }
}

/// `/` for the root, otherwise the path without surrounding slashes
fn rule_path(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

pub(crate) fn parameters(ctx: &StackContext<'_>) -> Result<Vec<ParameterSpec>, CompileError> {
    let lb = LbSettings::new(ctx)?;
    let mut specs = resources::base_parameters(ctx);
    specs.extend([
        ParameterSpec::string(TARGET_CONTAINER, lb.target_container.as_str()),
        ParameterSpec::number(TARGET_PORT, lb.target_port),
        ParameterSpec::string(HTTPS_ENABLED, ctx.runtime.https_listener.to_string()),
        ParameterSpec::string(RULE_PATH, lb.rule_path.as_str()),
        ParameterSpec::string(
            HEALTH_CHECK_PATH,
            lb.health_check.path.as_deref().unwrap_or(DEFAULT_HEALTH_CHECK_PATH),
        ),
        ParameterSpec::string(STICKINESS, lb.http.stickiness.unwrap_or(false).to_string()),
        ParameterSpec::string(ALIASES, join_list(&lb.aliases)),
    ]);
    Ok(specs)
}

pub(crate) fn template(
    ctx: &StackContext<'_>,
    specs: &[ParameterSpec],
    suffix: &UniqueSuffix,
) -> Result<Template, CompileError> {
    let lb = LbSettings::new(ctx)?;
    let mut template = resources::skeleton(
        &format!("Load Balanced Web Service {} for {}-{}", ctx.workload.name, ctx.app, ctx.env),
        specs,
    );

    template.add_condition(HTTP_LOAD_BALANCER, equals(reference(HTTPS_ENABLED), json!("false")));
    template.add_condition(HTTPS_LOAD_BALANCER, equals(reference(HTTPS_ENABLED), json!("true")));
    template.add_condition(IS_DEFAULT_ROOT_PATH, equals(reference(RULE_PATH), json!("/")));
    template.add_condition(HAS_ALIASES, not(equals(reference(ALIASES), json!(""))));

    resources::add_task_resources(ctx, &mut template);
    template.add_resource(Role::TargetGroup.logical_id(), target_group(&lb));
    add_env_controller(ctx, suffix, &mut template);
    add_rule_priority(ctx, suffix, &mut template);
    add_listener_rules(ctx, &mut template);
    template.add_resource(Role::Service.logical_id(), service(ctx, &lb));
    resources::add_addons_stack(ctx, &mut template);
    resources::add_autoscaling(ctx, &mut template);

    resources::add_common_outputs(ctx, &mut template);
    template.add_output(
        UNIQUE_SUFFIX_OUTPUT,
        Output::new(json!(suffix.as_str()))
            .with_description("Suffix of the helper function names; supply it again on the next deployment."),
    );
    template.add_output(
        "PublicLoadBalancerDNSName",
        Output::new(import_env("PublicLoadBalancerDNSName"))
            .with_description("DNS name of the environment's public load balancer."),
    );
    Ok(template)
}

fn target_group(lb: &LbSettings<'_>) -> Resource {
    let hc = &lb.health_check;
    let deregistration_delay = lb
        .http
        .deregistration_delay
        .map(|d| d.as_secs())
        .unwrap_or(DEFAULT_DEREGISTRATION_DELAY);

    Resource::new(
        "AWS::ElasticLoadBalancingV2::TargetGroup",
        json!({
            "HealthCheckPath": reference(HEALTH_CHECK_PATH),
            "HealthCheckIntervalSeconds": hc.interval.map(|d| d.as_secs()).unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL),
            "HealthCheckTimeoutSeconds": hc.timeout.map(|d| d.as_secs()).unwrap_or(DEFAULT_HEALTH_CHECK_TIMEOUT),
            "HealthyThresholdCount": hc.healthy_threshold.unwrap_or(DEFAULT_HEALTHY_THRESHOLD),
            "UnhealthyThresholdCount": hc.unhealthy_threshold.unwrap_or(DEFAULT_UNHEALTHY_THRESHOLD),
            "Matcher": { "HttpCode": hc.success_codes.as_deref().unwrap_or(DEFAULT_SUCCESS_CODES) },
            "Port": reference(TARGET_PORT),
            "Protocol": "HTTP",
            "TargetType": "ip",
            "VpcId": import_env("VpcId"),
            "TargetGroupAttributes": [
                { "Key": "deregistration_delay.timeout_seconds", "Value": deregistration_delay.to_string() },
                { "Key": "stickiness.enabled", "Value": reference(STICKINESS) },
                { "Key": "stickiness.type", "Value": "lb_cookie" },
                { "Key": "load_balancing.algorithm.type", "Value": "round_robin" },
            ],
        }),
    )
}

fn lambda_role(partition: Partition, policy_name: &str, statements: Value) -> Resource {
    Resource::new(
        "AWS::IAM::Role",
        json!({
            "AssumeRolePolicyDocument": resources::assume_role_policy(LAMBDA_PRINCIPAL),
            "ManagedPolicyArns": [partition.managed_policy_arn(LAMBDA_BASIC_EXECUTION_POLICY)],
            "Policies": [{
                "PolicyName": policy_name,
                "PolicyDocument": { "Version": "2012-10-17", "Statement": statements },
            }],
        }),
    )
}

/// Function running an embedded payload, with the payload digest in its
/// metadata so a changed handler shows up as a changed resource
fn payload_function(
    ctx: &StackContext<'_>,
    role: Role,
    execution_role: Role,
    payload: AutomationPayload,
    suffix: &UniqueSuffix,
) -> Resource {
    Resource::new(
        "AWS::Lambda::Function",
        json!({
            "FunctionName": ctx.namer.unique_name(role, suffix, FUNCTION_NAME_MAX_LEN),
            "Code": { "ZipFile": payload.source() },
            "Handler": PAYLOAD_HANDLER,
            "Runtime": PAYLOAD_RUNTIME,
            "Timeout": FUNCTION_TIMEOUT_SECS,
            "Role": get_att(execution_role.logical_id(), "Arn"),
        }),
    )
    .with_metadata(json!({ "Payload": payload.name(), "PayloadDigest": payload.digest() }))
}

fn add_env_controller(ctx: &StackContext<'_>, suffix: &UniqueSuffix, template: &mut Template) {
    let statements = json!([
        {
            "Effect": "Allow",
            "Action": ["cloudformation:DescribeStacks", "cloudformation:UpdateStack"],
            "Resource": sub("arn:${AWS::Partition}:cloudformation:${AWS::Region}:${AWS::AccountId}:stack/${AppName}-${EnvName}/*"),
        },
        {
            "Effect": "Allow",
            "Action": ["iam:PassRole"],
            "Resource": sub("arn:${AWS::Partition}:iam::${AWS::AccountId}:role/${AppName}-${EnvName}-CFNExecutionRole"),
        },
    ]);
    template.add_resource(
        Role::EnvControllerRole.logical_id(),
        lambda_role(ctx.runtime.partition, "EnvControllerStackUpdate", statements),
    );
    template.add_resource(
        Role::EnvControllerFunction.logical_id(),
        payload_function(ctx, Role::EnvControllerFunction, Role::EnvControllerRole, ENV_CONTROLLER, suffix),
    );
    template.add_resource(
        Role::EnvControllerAction.logical_id(),
        Resource::new(
            "Custom::EnvControllerFunction",
            json!({
                "ServiceToken": get_att(Role::EnvControllerFunction.logical_id(), "Arn"),
                "Workload": reference(WORKLOAD_NAME),
                "EnvStack": sub("${AppName}-${EnvName}"),
                "Parameters": [ALB_WORKLOADS_PARAMETER],
            }),
        ),
    );
}

/// Listener the service's rules attach to, as reported by the environment
/// controller once the environment stack enabled it
fn listener_arn(ctx: &StackContext<'_>) -> Value {
    let action = Role::EnvControllerAction.logical_id();
    if_then(
        HTTPS_LOAD_BALANCER,
        get_att(action, "HTTPSListenerArn"),
        get_att(action, "HTTPListenerArn"),
    )
}

fn add_rule_priority(ctx: &StackContext<'_>, suffix: &UniqueSuffix, template: &mut Template) {
    let statements = json!([{
        "Effect": "Allow",
        "Action": ["elasticloadbalancing:DescribeRules"],
        "Resource": "*",
    }]);
    template.add_resource(
        Role::RulePriorityRole.logical_id(),
        lambda_role(ctx.runtime.partition, "RulePriorityDescribeRules", statements),
    );
    template.add_resource(
        Role::RulePriorityFunction.logical_id(),
        payload_function(ctx, Role::RulePriorityFunction, Role::RulePriorityRole, RULE_PRIORITY, suffix),
    );
    template.add_resource(
        Role::RulePriorityAction.logical_id(),
        Resource::new(
            "Custom::RulePriorityFunction",
            json!({
                "ServiceToken": get_att(Role::RulePriorityFunction.logical_id(), "Arn"),
                "ListenerArn": listener_arn(ctx),
            }),
        ),
    );
}

fn path_pattern_condition() -> Value {
    json!({
        "Field": "path-pattern",
        "PathPatternConfig": {
            "Values": if_then(
                IS_DEFAULT_ROOT_PATH,
                json!(["/*"]),
                json!([sub("/${RulePath}"), sub("/${RulePath}/*")]),
            ),
        },
    })
}

fn listener_rule(ctx: &StackContext<'_>, listener: Value, actions: Value, conditions: Value) -> Value {
    json!({
        "ListenerArn": listener,
        "Priority": get_att(Role::RulePriorityAction.logical_id(), "Priority"),
        "Actions": actions,
        "Conditions": conditions,
    })
}

fn add_listener_rules(ctx: &StackContext<'_>, template: &mut Template) {
    let action = Role::EnvControllerAction.logical_id();
    let forward = json!([{
        "Type": "forward",
        "TargetGroupArn": reference(Role::TargetGroup.logical_id()),
    }]);
    let redirect = json!([{
        "Type": "redirect",
        "RedirectConfig": { "Protocol": "HTTPS", "Port": "443", "StatusCode": "HTTP_301" },
    }]);
    let host_header = if_then(
        HAS_ALIASES,
        json!({ "Field": "host-header", "HostHeaderConfig": { "Values": split(",", reference(ALIASES)) } }),
        no_value(),
    );

    template.add_resource(
        Role::HttpListenerRule.logical_id(),
        Resource::new(
            "AWS::ElasticLoadBalancingV2::ListenerRule",
            listener_rule(
                ctx,
                get_att(action, "HTTPListenerArn"),
                forward.clone(),
                json!([path_pattern_condition()]),
            ),
        )
        .with_condition(HTTP_LOAD_BALANCER),
    );
    template.add_resource(
        Role::HttpsListenerRule.logical_id(),
        Resource::new(
            "AWS::ElasticLoadBalancingV2::ListenerRule",
            listener_rule(
                ctx,
                get_att(action, "HTTPSListenerArn"),
                forward,
                json!([path_pattern_condition(), host_header]),
            ),
        )
        .with_condition(HTTPS_LOAD_BALANCER),
    );
    template.add_resource(
        Role::HttpRedirectRule.logical_id(),
        Resource::new(
            "AWS::ElasticLoadBalancingV2::ListenerRule",
            listener_rule(
                ctx,
                get_att(action, "HTTPListenerArn"),
                redirect,
                json!([path_pattern_condition()]),
            ),
        )
        .with_condition(HTTPS_LOAD_BALANCER),
    );

    // The service may only start once whichever rule applies exists.
    let rule_ref = if_then(
        HTTPS_LOAD_BALANCER,
        reference(Role::HttpsListenerRule.logical_id()),
        reference(Role::HttpListenerRule.logical_id()),
    );
    template.add_resource(
        Role::ListenerRuleWaitHandle.logical_id(),
        Resource::new("AWS::CloudFormation::WaitConditionHandle", json!({}))
            .with_metadata(json!({ "RuleArn": rule_ref })),
    );
}

fn service(ctx: &StackContext<'_>, lb: &LbSettings<'_>) -> Resource {
    let mut properties = resources::service_properties(ctx);
    properties["LoadBalancers"] = json!([{
        "ContainerName": reference(TARGET_CONTAINER),
        "ContainerPort": reference(TARGET_PORT),
        "TargetGroupArn": reference(Role::TargetGroup.logical_id()),
    }]);
    properties["HealthCheckGracePeriodSeconds"] = json!(lb
        .health_check
        .grace_period
        .map(|d| d.as_secs())
        .unwrap_or(DEFAULT_GRACE_PERIOD));

    Resource::new("AWS::ECS::Service", properties)
        .with_depends_on(Role::ListenerRuleWaitHandle.logical_id())
        .with_depends_on(Role::EnvControllerAction.logical_id())
}
