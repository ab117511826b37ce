//! Logical identifiers, physical names and uniqueness suffixes

use std::collections::BTreeMap;
use std::fmt;

use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use super::CompileError;

/// Name of the stack output carrying the uniqueness suffix
pub const UNIQUE_SUFFIX_OUTPUT: &str = "UniqueSuffix";

/// Length of the hash kept when a physical name has to be shortened
const NAME_HASH_LEN: usize = 8;

/// Longest accepted suffix; a hyphenated UUID fits exactly
pub const MAX_SUFFIX_LEN: usize = 36;

/// The part a resource plays in a workload stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Role {
    LogGroup,
    ExecutionRole,
    TaskRole,
    TaskDefinition,
    Service,
    DiscoveryService,
    AddonsStack,
    AutoScalingTarget,
    AutoScalingCpuPolicy,
    AutoScalingMemoryPolicy,
    TargetGroup,
    HttpListenerRule,
    HttpsListenerRule,
    HttpRedirectRule,
    ListenerRuleWaitHandle,
    RulePriorityRole,
    RulePriorityFunction,
    RulePriorityAction,
    EnvControllerRole,
    EnvControllerFunction,
    EnvControllerAction,
}

impl Role {
    /// Template-local identifier; the same role always gets the same id
    pub fn logical_id(&self) -> &'static str {
        match self {
            Role::LogGroup => "LogGroup",
            Role::ExecutionRole => "ExecutionRole",
            Role::TaskRole => "TaskRole",
            Role::TaskDefinition => "TaskDefinition",
            Role::Service => "Service",
            Role::DiscoveryService => "DiscoveryService",
            Role::AddonsStack => "AddonsStack",
            Role::AutoScalingTarget => "AutoScalingTarget",
            Role::AutoScalingCpuPolicy => "AutoScalingPolicyECSServiceAverageCPUUtilization",
            Role::AutoScalingMemoryPolicy => "AutoScalingPolicyECSServiceAverageMemoryUtilization",
            Role::TargetGroup => "TargetGroup",
            Role::HttpListenerRule => "HTTPListenerRule",
            Role::HttpsListenerRule => "HTTPSListenerRule",
            Role::HttpRedirectRule => "HTTPRedirectRule",
            Role::ListenerRuleWaitHandle => "ListenerRuleWaitHandle",
            Role::RulePriorityRole => "RulePriorityRole",
            Role::RulePriorityFunction => "RulePriorityFunction",
            Role::RulePriorityAction => "RulePriorityAction",
            Role::EnvControllerRole => "EnvControllerRole",
            Role::EnvControllerFunction => "EnvControllerFunction",
            Role::EnvControllerAction => "EnvControllerAction",
        }
    }

    /// Short form used inside physical names
    pub fn slug(&self) -> String {
        match self {
            Role::RulePriorityFunction => "rule-priority".to_string(),
            Role::EnvControllerFunction => "env-controller".to_string(),
            other => other.logical_id().to_lowercase(),
        }
    }
}

/// Derives names for one `{app, env, service}` stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceNamer {
    app: String,
    env: String,
    service: String,
}

impl ResourceNamer {
    pub fn new(app: &str, env: &str, service: &str) -> Self {
        Self {
            app: app.to_string(),
            env: env.to_string(),
            service: service.to_string(),
        }
    }

    /// `<app>-<env>-<service>`
    pub fn stack_name(&self) -> String {
        format!("{}-{}-{}", self.app, self.env, self.service)
    }

    /// `<app>-<env>-<service>-<slug>`, shortened to `max_len`
    pub fn physical_name(&self, role: Role, max_len: usize) -> String {
        shorten(&format!("{}-{}", self.stack_name(), role.slug()), max_len)
    }

    /// A physical name ending in the uniqueness suffix, at most `max_len` long
    pub fn unique_name(&self, role: Role, suffix: &UniqueSuffix, max_len: usize) -> String {
        let room = max_len.saturating_sub(suffix.as_str().len() + 1);
        format!("{}-{}", self.physical_name(role, room), suffix)
    }
}

/// Truncate `name` to `max_len`, replacing the tail with a short hash of the
/// full name so distinct long names stay distinct
fn shorten(name: &str, max_len: usize) -> String {
    if name.len() <= max_len {
        return name.to_string();
    }
    let hash = hex::encode(Sha256::digest(name.as_bytes()));
    let hash = &hash[..NAME_HASH_LEN.min(max_len)];
    let mut keep = max_len.saturating_sub(hash.len() + 1);
    while !name.is_char_boundary(keep) {
        keep -= 1;
    }
    let head = name[..keep].trim_end_matches('-');
    if head.is_empty() {
        hash.to_string()
    } else {
        format!("{head}-{hash}")
    }
}

/// Suffix making provider-enforced unique names unique across deployments
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UniqueSuffix(String);

impl UniqueSuffix {
    /// A fresh random suffix
    pub fn generate() -> Self {
        Self(Uuid::new_v4().hyphenated().to_string())
    }

    /// Use `supplied` when present, otherwise generate one
    ///
    /// A supplied suffix must be 1 to [`MAX_SUFFIX_LEN`] characters of
    /// `[A-Za-z0-9_-]`, the characters a function name accepts.
    pub fn resolve(supplied: Option<&str>) -> Result<Self, CompileError> {
        match supplied {
            Some(s) if !s.is_empty() => Self::parse(s),
            _ => {
                let suffix = Self::generate();
                debug!(suffix = %suffix, "generated unique suffix");
                Ok(suffix)
            }
        }
    }

    fn parse(s: &str) -> Result<Self, CompileError> {
        if s.len() > MAX_SUFFIX_LEN {
            return Err(CompileError::unsupported(
                "unique_suffix",
                format!("'{s}' is longer than {MAX_SUFFIX_LEN} characters"),
            ));
        }
        if let Some(c) = s.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_')) {
            return Err(CompileError::unsupported(
                "unique_suffix",
                format!("'{s}' contains '{c}'; only letters, digits, '-' and '_' are allowed"),
            ));
        }
        Ok(Self(s.to_string()))
    }

    /// Read the suffix back from a deployed stack's outputs; a value that
    /// would not be accepted by [`UniqueSuffix::resolve`] is ignored
    pub fn from_outputs(outputs: &BTreeMap<String, String>) -> Option<Self> {
        outputs
            .get(UNIQUE_SUFFIX_OUTPUT)
            .filter(|s| !s.is_empty())
            .and_then(|s| Self::parse(s).ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UniqueSuffix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_name_and_logical_ids() {
        let namer = ResourceNamer::new("shop", "test", "frontend");
        assert_eq!(namer.stack_name(), "shop-test-frontend");
        assert_eq!(Role::TargetGroup.logical_id(), "TargetGroup");
        assert_eq!(Role::HttpListenerRule.logical_id(), "HTTPListenerRule");
    }

    #[test]
    fn test_short_names_untouched() {
        let namer = ResourceNamer::new("a", "b", "c");
        assert_eq!(namer.physical_name(Role::LogGroup, 64), "a-b-c-loggroup");
    }

    #[test]
    fn test_long_names_are_shortened_deterministically() {
        let namer = ResourceNamer::new("my-very-long-application", "production", "checkout-frontend");
        let name = namer.physical_name(Role::EnvControllerFunction, 27);
        assert_eq!(name.len(), 27);
        assert_eq!(name, namer.physical_name(Role::EnvControllerFunction, 27));
        assert_ne!(name, namer.physical_name(Role::RulePriorityFunction, 27));
    }

    #[test]
    fn test_unique_name_fits_limit() {
        let namer = ResourceNamer::new("my-very-long-application", "production", "checkout-frontend");
        let suffix = UniqueSuffix::generate();
        let name = namer.unique_name(Role::EnvControllerFunction, &suffix, 64);
        assert!(name.len() <= 64, "{name} is too long");
        assert!(name.ends_with(suffix.as_str()));
    }

    #[test]
    fn test_resolve_prefers_supplied() {
        assert_eq!(UniqueSuffix::resolve(Some("keep-me")).unwrap().as_str(), "keep-me");
        let generated = UniqueSuffix::resolve(None).unwrap();
        assert_eq!(generated.as_str().len(), MAX_SUFFIX_LEN);
        assert_ne!(generated, UniqueSuffix::resolve(Some("")).unwrap());
    }

    #[test]
    fn test_resolve_rejects_bad_suffixes() {
        for bad in ["x".repeat(MAX_SUFFIX_LEN + 1), "bad suffix/!".to_string(), "caf\u{e9}".to_string()] {
            let err = UniqueSuffix::resolve(Some(&bad)).unwrap_err();
            assert!(
                matches!(err, CompileError::UnsupportedShape { ref feature, .. } if feature == "unique_suffix"),
                "{bad:?} was accepted"
            );
        }
        assert!(UniqueSuffix::resolve(Some(&"x".repeat(MAX_SUFFIX_LEN))).is_ok());
    }

    #[test]
    fn test_longest_suffix_keeps_names_distinct() {
        let namer = ResourceNamer::new("shop", "test", "frontend");
        let suffix = UniqueSuffix::resolve(Some(&"x".repeat(MAX_SUFFIX_LEN))).unwrap();
        let env = namer.unique_name(Role::EnvControllerFunction, &suffix, 64);
        let rule = namer.unique_name(Role::RulePriorityFunction, &suffix, 64);
        assert!(env.len() <= 64 && rule.len() <= 64);
        assert!(!env.starts_with('-'));
        assert_ne!(env, rule);
    }

    #[test]
    fn test_shorten_counts_bytes() {
        let namer = ResourceNamer::new("shop", "test", "caf\u{e9}-fr\u{e9}-frontend-service");
        for max_len in 20..40 {
            let name = namer.physical_name(Role::EnvControllerFunction, max_len);
            assert!(name.len() <= max_len, "{name} is {} bytes", name.len());
        }
    }

    #[test]
    fn test_from_outputs() {
        let mut outputs = BTreeMap::new();
        assert_eq!(UniqueSuffix::from_outputs(&outputs), None);
        outputs.insert(UNIQUE_SUFFIX_OUTPUT.to_string(), "abc".to_string());
        assert_eq!(UniqueSuffix::from_outputs(&outputs).unwrap().as_str(), "abc");
        outputs.insert(UNIQUE_SUFFIX_OUTPUT.to_string(), "not valid!".to_string());
        assert_eq!(UniqueSuffix::from_outputs(&outputs), None);
    }
}
