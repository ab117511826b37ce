//! Caller identity resolution

use std::error::Error as StdError;

use thiserror::Error;
use tracing::debug;

use super::partition::resolve_partition;

/// Error type returned by an identity-service implementation
pub type UpstreamError = Box<dyn StdError + Send + Sync>;

/// Errors that can occur while resolving the caller identity
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The identity call failed or no region could be determined
    #[error("identity unavailable: {reason}")]
    IdentityUnavailable { reason: String },
}

impl IdentityError {
    fn unavailable(reason: impl Into<String>) -> Self {
        Self::IdentityUnavailable {
            reason: reason.into(),
        }
    }
}

/// Account and user identifiers as returned by the identity service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawIdentity {
    pub account: String,
    pub user_id: String,
}

/// A fully qualified calling entity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    /// ARN of the account root user, formatted for the caller's partition
    pub root_user_arn: String,
    pub account: String,
    pub user_id: String,
}

/// The identity-service call this crate consumes but never performs
pub trait CallerIdentityApi {
    fn get_caller_identity(&self) -> Result<RawIdentity, UpstreamError>;
}

/// Build a [`Caller`] from an identity-service response and the active region
pub fn resolve_caller(raw: RawIdentity, region: &str) -> Result<Caller, IdentityError> {
    if region.is_empty() {
        return Err(IdentityError::unavailable("region is not set"));
    }
    let partition = resolve_partition(region);
    debug!(account = %raw.account, %region, %partition, "resolved caller partition");

    Ok(Caller {
        root_user_arn: format!("arn:{}:iam::{}:root", partition, raw.account),
        account: raw.account,
        user_id: raw.user_id,
    })
}

/// Resolves callers through an injected identity-service client
///
/// Failures from the client are wrapped and returned as-is; retry policy
/// belongs to the client.
#[derive(Debug, Clone)]
pub struct IdentityResolver<A> {
    client: A,
}

impl<A: CallerIdentityApi> IdentityResolver<A> {
    pub fn new(client: A) -> Self {
        Self { client }
    }

    /// Query the identity service and qualify the result for `region`
    ///
    /// An unset region fails before the identity service is called.
    pub fn get(&self, region: Option<&str>) -> Result<Caller, IdentityError> {
        let region = region
            .filter(|r| !r.is_empty())
            .ok_or_else(|| IdentityError::unavailable("region is not set"))?;
        let raw = self
            .client
            .get_caller_identity()
            .map_err(|e| IdentityError::unavailable(format!("get caller identity: {e}")))?;
        resolve_caller(raw, region)
    }
}
