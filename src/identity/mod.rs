//! Partition and caller identity resolution
//!
//! Resource identifiers differ between the commercial and the restricted
//! China partition. This module maps regions to partitions and qualifies the
//! caller record returned by the identity service. Both operations are pure:
//! the identity-service call itself is supplied through [`CallerIdentityApi`].

mod caller;
mod partition;

pub use caller::{
    resolve_caller, Caller, CallerIdentityApi, IdentityError, IdentityResolver, RawIdentity,
    UpstreamError,
};
pub use partition::{resolve_partition, Partition, UnknownPartition};
