//! Integration tests for stack compilation and parameter serialization

use std::collections::BTreeMap;

use pretty_assertions::assert_eq;
use regex::Regex;
use serde_json::Value;

use stack_compiler::stack::{ENV_CONTROLLER, RULE_PRIORITY, UNIQUE_SUFFIX_OUTPUT};
use stack_compiler::{
    compile, compile_for_environment, resolve_caller, serialize_parameters, CompileError, Error,
    Partition, RawIdentity, RuntimeConfig, StackArtifact, UniqueSuffix, Workload,
};

const FRONTEND: &str = include_str!("fixtures/frontend.yml");
const RUNTIME: &str = include_str!("fixtures/runtime.toml");

fn frontend() -> Workload {
    serde_yaml::from_str(FRONTEND).unwrap()
}

fn runtime() -> RuntimeConfig {
    RuntimeConfig::from_str(RUNTIME).unwrap()
}

fn compile_test_env(runtime: &RuntimeConfig) -> StackArtifact {
    compile_for_environment(&frontend(), "shop", "test", runtime).unwrap()
}

/// Replace every GUID with a fixed marker
fn normalize_guids(text: &str) -> String {
    let guid = Regex::new(r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}").unwrap();
    guid.replace_all(text, "<GUID>").into_owned()
}

fn parameter<'a>(artifact: &'a StackArtifact, key: &str) -> &'a str {
    artifact
        .parameters
        .iter()
        .find(|p| p.key == key)
        .map(|p| p.value.as_str())
        .unwrap_or_else(|| panic!("no parameter {key}"))
}

#[test]
fn test_templates_equal_after_guid_normalization() {
    let runtime = runtime();
    let first = compile_test_env(&runtime);
    let second = compile_test_env(&runtime);

    // fresh suffixes differ, everything else matches
    assert_ne!(first.unique_suffix, second.unique_suffix);
    assert_eq!(
        normalize_guids(&first.template_body().unwrap()),
        normalize_guids(&second.template_body().unwrap())
    );
}

#[test]
fn test_supplied_suffix_is_byte_identical() {
    let runtime = runtime().with_unique_suffix("5f0c7e1a-1d4b-4c55-9f3e-0a8d7c2b6e41");
    let first = compile_test_env(&runtime).template_body().unwrap();
    let second = compile_test_env(&runtime).template_body().unwrap();
    assert_eq!(first, second);
    assert!(first.contains("5f0c7e1a-1d4b-4c55-9f3e-0a8d7c2b6e41"));
}

#[test]
fn test_suffix_round_trips_through_outputs() {
    let first = compile_test_env(&runtime());
    let exported = first.template.outputs[UNIQUE_SUFFIX_OUTPUT].value.as_str().unwrap();

    // what the deployment layer would read back from the stack
    let mut outputs = BTreeMap::new();
    outputs.insert(UNIQUE_SUFFIX_OUTPUT.to_string(), exported.to_string());
    let suffix = UniqueSuffix::from_outputs(&outputs).unwrap();
    assert_eq!(Some(&suffix), first.unique_suffix.as_ref());

    let second = compile_test_env(&runtime().with_unique_suffix(suffix.as_str()));
    assert_eq!(first.template_body().unwrap(), second.template_body().unwrap());
}

#[test]
fn test_payload_digests_identical_across_compiles() {
    let runtime = runtime();
    let first = compile_test_env(&runtime);
    let second = compile_test_env(&runtime);

    for (id, payload) in [
        ("EnvControllerFunction", ENV_CONTROLLER),
        ("RulePriorityFunction", RULE_PRIORITY),
    ] {
        let digest = |artifact: &StackArtifact| {
            artifact.template.resources[id].metadata.as_ref().unwrap()["PayloadDigest"].clone()
        };
        assert_eq!(digest(&first), digest(&second));
        assert_eq!(digest(&first), Value::from(payload.digest()));
        assert_eq!(
            first.template.resources[id].properties["Code"]["ZipFile"],
            Value::from(payload.source())
        );
    }
}

#[test]
fn test_parameters_are_stable_and_ordered() {
    let runtime = runtime();
    let first = compile_test_env(&runtime);
    let second = compile_test_env(&runtime);
    assert_eq!(first.parameters, second.parameters);
    assert_eq!(
        first.serialized_parameters().unwrap(),
        second.serialized_parameters().unwrap()
    );

    let keys: Vec<&str> = first.parameters.iter().map(|p| p.key.as_str()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
}

#[test]
fn test_every_parameter_is_declared() {
    let artifact = compile_test_env(&runtime());
    for param in &artifact.parameters {
        assert!(
            artifact.template.parameters.contains_key(&param.key),
            "{} is not declared",
            param.key
        );
    }
    assert_eq!(artifact.parameters.len(), artifact.template.parameters.len());
}

#[test]
fn test_overridden_health_check_end_to_end() {
    let runtime = runtime();
    let artifact = compile_test_env(&runtime);
    assert_eq!(parameter(&artifact, "HealthCheckPath"), "/healthz");
    assert_eq!(parameter(&artifact, "RulePath"), "/");
    assert_eq!(parameter(&artifact, "HTTPSEnabled"), "false");
    assert_eq!(parameter(&artifact, "ContainerPort"), "80");
    assert_eq!(parameter(&artifact, "LogRetention"), "14");

    let target_group = &artifact.template.resources["TargetGroup"].properties;
    assert_eq!(target_group["HealthyThresholdCount"], 3);
    assert_eq!(target_group["TargetGroupAttributes"][0]["Value"], "30");

    let raw = RawIdentity {
        account: runtime.account_id.clone(),
        user_id: "AIDAEXAMPLE".to_string(),
    };
    let caller = resolve_caller(raw, &runtime.region).unwrap();
    assert_eq!(caller.root_user_arn, "arn:aws:iam::123456789012:root");
}

#[test]
fn test_serialize_parameters_matches_compile() {
    let runtime = runtime();
    let resolved = frontend().apply_env("test").unwrap();
    let artifact = compile(&resolved, "shop", "test", &runtime).unwrap();
    assert_eq!(
        serialize_parameters(&resolved, "shop", "test", &runtime).unwrap(),
        artifact.parameters
    );
}

#[test]
fn test_partition_specific_identifiers() {
    let china = RuntimeConfig::new("123456789012", "cn-north-1");
    assert_eq!(china.partition, Partition::AwsCn);
    let artifact = compile_test_env(&china);
    let body = artifact.template_body().unwrap();
    assert!(body.contains("arn:aws-cn:iam::aws:policy/service-role/AmazonECSTaskExecutionRolePolicy"));
    assert!(!body.contains("arn:aws:iam::aws:policy"));
}

#[test]
fn test_alias_rejected_in_china_partition() {
    let runtime = RuntimeConfig::new("123456789012", "cn-north-1").with_https_listener(true);
    let err = compile_for_environment(&frontend(), "shop", "prod", &runtime).unwrap_err();
    match err {
        Error::Compile(CompileError::UnsupportedShape { feature, .. }) => assert_eq!(feature, "http.alias"),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_alias_with_https_listener() {
    let runtime = runtime().with_https_listener(true);
    let artifact = compile_for_environment(&frontend(), "shop", "prod", &runtime).unwrap();
    assert_eq!(parameter(&artifact, "Aliases"), "shop.example.com");
    assert_eq!(parameter(&artifact, "HTTPSEnabled"), "true");
    assert_eq!(parameter(&artifact, "TaskCPU"), "1024");
    assert_eq!(parameter(&artifact, "TaskCount"), "2");
}

#[test]
fn test_tags_and_logical_ids() {
    let artifact = compile_test_env(&runtime());
    assert_eq!(artifact.stack_name, "shop-test-frontend");
    let tags: Vec<(&str, &str)> = artifact
        .tags
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    assert_eq!(
        tags,
        vec![
            ("application", "shop"),
            ("cost-center", "1234"),
            ("environment", "test"),
            ("owner", "platform"),
            ("service", "frontend"),
        ]
    );
    for id in ["Service", "TaskDefinition", "TargetGroup", "HTTPListenerRule", "ListenerRuleWaitHandle"] {
        assert!(artifact.template.resources.contains_key(id), "missing {id}");
    }
}

#[test]
fn test_missing_port_is_defect() {
    let mut workload = frontend();
    workload.image.port = None;
    let err = compile_for_environment(&workload, "shop", "test", &runtime()).unwrap_err();
    assert!(err.is_defect());
    assert_eq!(err.to_string(), "missing required field 'image.port'");
}

#[test]
fn test_parallel_compiles_agree() {
    let workload = frontend();
    let runtime = runtime().with_unique_suffix("parallel");
    let expected = compile_for_environment(&workload, "shop", "test", &runtime)
        .unwrap()
        .template_body()
        .unwrap();

    let bodies: Vec<String> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    compile_for_environment(&workload, "shop", "test", &runtime)
                        .unwrap()
                        .template_body()
                        .unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for body in bodies {
        assert_eq!(body, expected);
    }
}

#[test]
fn test_invalid_unique_suffix_rejected() {
    for suffix in ["x".repeat(70), "bad suffix/!".to_string()] {
        let runtime = runtime().with_unique_suffix(suffix.as_str());
        let err = compile_for_environment(&frontend(), "shop", "test", &runtime).unwrap_err();
        match err {
            Error::Compile(CompileError::UnsupportedShape { feature, .. }) => assert_eq!(feature, "unique_suffix"),
            other => panic!("unexpected error for {suffix:?}: {other}"),
        }
    }
}

#[test]
fn test_function_names_fit_with_longest_suffix() {
    let mut workload = frontend();
    workload.name = "checkout-frontend-with-a-rather-long-name".to_string();
    let runtime = runtime().with_unique_suffix("s".repeat(36));
    let artifact = compile_for_environment(&workload, "my-very-long-application", "production", &runtime).unwrap();

    let name = |id: &str| {
        artifact.template.resources[id].properties["FunctionName"]
            .as_str()
            .unwrap()
            .to_string()
    };
    let env_controller = name("EnvControllerFunction");
    let rule_priority = name("RulePriorityFunction");
    assert!(env_controller.len() <= 64, "{env_controller}");
    assert!(rule_priority.len() <= 64, "{rule_priority}");
    assert_ne!(env_controller, rule_priority);
}

#[test]
fn test_backend_http_rejected_by_both_entry_points() {
    let workload: Workload = serde_yaml::from_str(
        "name: worker\ntype: Backend Service\nimage:\n  location: busybox\ncpu: 256\nmemory: 512\ncount: 1\nhttp:\n  path: /\n",
    )
    .unwrap();
    let runtime = runtime();
    assert!(matches!(
        serialize_parameters(&workload, "shop", "test", &runtime),
        Err(CompileError::UnsupportedShape { .. })
    ));
    assert!(matches!(
        compile(&workload, "shop", "test", &runtime),
        Err(CompileError::UnsupportedShape { .. })
    ));
}

#[test]
fn test_addons_stack_with_template_url() {
    let url = "https://stackset-bucket.s3.us-west-2.amazonaws.com/manual/addons/frontend.yml";
    let runtime_with_url = runtime().with_addons_template_url(url);
    let artifact = compile_test_env(&runtime_with_url);
    assert_eq!(parameter(&artifact, "AddonsTemplateURL"), url);

    let addons = &artifact.template.resources["AddonsStack"];
    assert_eq!(addons.kind, "AWS::CloudFormation::Stack");
    assert_eq!(addons.condition.as_deref(), Some("HasAddons"));
    assert_eq!(addons.properties["TemplateURL"]["Ref"], "AddonsTemplateURL");

    let without = compile_test_env(&runtime());
    assert_eq!(parameter(&without, "AddonsTemplateURL"), "");
}

#[test]
fn test_exec_and_secrets_rendered() {
    let artifact = compile_test_env(&runtime());
    let resources = &artifact.template.resources;

    let task_policies = &resources["TaskRole"].properties["Policies"];
    assert_eq!(task_policies[0]["PolicyName"], "ExecuteCommand");
    assert_eq!(resources["Service"].properties["EnableExecuteCommand"], true);

    let execution_policies = &resources["ExecutionRole"].properties["Policies"];
    assert_eq!(execution_policies[0]["PolicyName"], "SecretsAccess");
    let secret_resource = &execution_policies[0]["PolicyDocument"]["Statement"][0]["Resource"][0];
    assert_eq!(
        secret_resource["Fn::Sub"],
        "arn:${AWS::Partition}:ssm:${AWS::Region}:${AWS::AccountId}:parameter/shop/test/db-password"
    );

    let container = &resources["TaskDefinition"].properties["ContainerDefinitions"][0];
    assert_eq!(container["Secrets"][0]["Name"], "DB_PASSWORD");
    assert_eq!(container["Secrets"][0]["ValueFrom"], "/shop/test/db-password");

    let mut without_exec = frontend();
    without_exec.exec = false;
    without_exec.secrets.clear();
    let plain = compile_for_environment(&without_exec, "shop", "test", &runtime()).unwrap();
    assert!(plain.template.resources["TaskRole"].properties.get("Policies").is_none());
    assert!(plain.template.resources["ExecutionRole"].properties.get("Policies").is_none());
    assert_eq!(plain.template.resources["Service"].properties["EnableExecuteCommand"], false);
}

#[test]
fn test_minimal_workload_health_check_path() {
    let workload: Workload = serde_yaml::from_str(
        r#"
name: frontend
type: Load Balanced Web Service
image:
  location: nginx
  port: 8080
http:
  path: api
  healthcheck: /healthz
cpu: 256
memory: 512
count: 1
"#,
    )
    .unwrap();
    let runtime = RuntimeConfig::new("123456789012", "us-east-1");
    let artifact = compile(&workload, "shop", "test", &runtime).unwrap();
    assert_eq!(parameter(&artifact, "HealthCheckPath"), "/healthz");
    assert_eq!(parameter(&artifact, "RulePath"), "api");
    assert_eq!(parameter(&artifact, "TargetPort"), "8080");

    let caller = resolve_caller(
        RawIdentity {
            account: runtime.account_id.clone(),
            user_id: "AIDAEXAMPLE".to_string(),
        },
        &runtime.region,
    )
    .unwrap();
    assert_eq!(caller.root_user_arn, "arn:aws:iam::123456789012:root");
}
