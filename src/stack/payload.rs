//! Automation payloads run by custom resources
//!
//! Handler sources are compiled into the crate, so their bytes depend only on
//! the crate version and never on the workload being compiled.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha2::{Digest, Sha256};

/// Lambda runtime the embedded handlers target
pub const PAYLOAD_RUNTIME: &str = "nodejs18.x";

/// Entry point of every embedded handler
pub const PAYLOAD_HANDLER: &str = "index.handler";

/// Packaged logic executed by a provider-managed custom resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutomationPayload {
    name: &'static str,
    source: &'static str,
}

/// Registers the service with its environment stack's load balancer
pub const ENV_CONTROLLER: AutomationPayload = AutomationPayload {
    name: "env-controller",
    source: include_str!("payloads/env_controller.js"),
};

/// Picks a free listener rule priority
pub const RULE_PRIORITY: AutomationPayload = AutomationPayload {
    name: "rule-priority",
    source: include_str!("payloads/rule_priority.js"),
};

impl AutomationPayload {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Inline source, as placed in the function's `Code.ZipFile`
    pub fn source(&self) -> &'static str {
        self.source
    }

    /// Base64 SHA-256 of the source, the same encoding Lambda uses for
    /// `CodeSha256`
    pub fn digest(&self) -> String {
        STANDARD.encode(Sha256::digest(self.source.as_bytes()))
    }
}
