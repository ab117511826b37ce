//! Template document model and intrinsic function helpers

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Value};

use super::CompileError;

pub const FORMAT_VERSION: &str = "2010-09-09";

/// A stack template with its named sections
///
/// All sections are ordered maps, so rendering the same template twice
/// yields the same bytes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Template {
    #[serde(rename = "AWSTemplateFormatVersion")]
    pub format_version: String,
    #[serde(rename = "Description")]
    pub description: String,
    #[serde(rename = "Metadata", skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    #[serde(rename = "Parameters")]
    pub parameters: BTreeMap<String, Value>,
    #[serde(rename = "Conditions", skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, Value>,
    #[serde(rename = "Resources")]
    pub resources: BTreeMap<String, Resource>,
    #[serde(rename = "Outputs", skip_serializing_if = "BTreeMap::is_empty")]
    pub outputs: BTreeMap<String, Output>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Resource {
    #[serde(rename = "Type")]
    pub kind: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    pub properties: Value,
}

impl Resource {
    pub fn new(kind: impl Into<String>, properties: Value) -> Self {
        Self {
            kind: kind.into(),
            condition: None,
            depends_on: Vec::new(),
            metadata: None,
            properties,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Output {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export: Option<Value>,
}

impl Output {
    pub fn new(value: Value) -> Self {
        Self {
            description: None,
            value,
            export: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Export the output as `${AWS::StackName}-<name>`
    pub fn exported_as(mut self, name: &str) -> Self {
        self.export = Some(json!({ "Name": sub(&format!("${{AWS::StackName}}-{name}")) }));
        self
    }
}

impl Template {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            format_version: FORMAT_VERSION.to_string(),
            description: description.into(),
            metadata: BTreeMap::new(),
            parameters: BTreeMap::new(),
            conditions: BTreeMap::new(),
            resources: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn add_condition(&mut self, name: &str, predicate: Value) {
        self.conditions.insert(name.to_string(), predicate);
    }

    pub fn add_resource(&mut self, logical_id: &str, resource: Resource) {
        self.resources.insert(logical_id.to_string(), resource);
    }

    pub fn add_output(&mut self, name: &str, output: Output) {
        self.outputs.insert(name.to_string(), output);
    }

    /// Render the template as YAML
    pub fn to_yaml(&self) -> Result<String, CompileError> {
        serde_yaml::to_string(self).map_err(|e| CompileError::Render(e.to_string()))
    }
}

// Intrinsic functions

pub fn reference(name: &str) -> Value {
    json!({ "Ref": name })
}

pub fn get_att(logical_id: &str, attribute: &str) -> Value {
    json!({ "Fn::GetAtt": [logical_id, attribute] })
}

pub fn sub(text: &str) -> Value {
    json!({ "Fn::Sub": text })
}

pub fn join(delimiter: &str, values: Value) -> Value {
    json!({ "Fn::Join": [delimiter, values] })
}

pub fn split(delimiter: &str, source: Value) -> Value {
    json!({ "Fn::Split": [delimiter, source] })
}

pub fn equals(left: Value, right: Value) -> Value {
    json!({ "Fn::Equals": [left, right] })
}

pub fn not(condition: Value) -> Value {
    json!({ "Fn::Not": [condition] })
}

pub fn if_then(condition: &str, then: Value, otherwise: Value) -> Value {
    json!({ "Fn::If": [condition, then, otherwise] })
}

pub fn no_value() -> Value {
    reference("AWS::NoValue")
}

/// Import an output exported by the environment stack
///
/// Exports are named `<app>-<env>-<name>`, which keeps the template free of
/// account- or region-specific identifiers.
pub fn import_env(name: &str) -> Value {
    json!({ "Fn::ImportValue": sub(&format!("${{AppName}}-${{EnvName}}-{name}")) })
}

/// A `[{Key, Value}]` tag list, ordered by key
pub fn tag_list(tags: &BTreeMap<String, String>) -> Value {
    Value::Array(
        tags.iter()
            .map(|(k, v)| json!({ "Key": k, "Value": v }))
            .collect(),
    )
}
