//! Region to partition mapping

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Regions that live in the restricted China partition
const CHINA_REGIONS: &[&str] = &["cn-north-1", "cn-northwest-1"];

/// An identifier namespace of the cloud provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Partition {
    /// Commercial partition (`aws`)
    #[default]
    Aws,
    /// China partition (`aws-cn`)
    AwsCn,
}

/// Error returned when parsing an unknown partition name
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown partition '{0}'")]
pub struct UnknownPartition(pub String);

impl Partition {
    /// The identifier used inside ARNs
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Aws => "aws",
            Partition::AwsCn => "aws-cn",
        }
    }

    /// ARN of a provider-managed IAM policy in this partition
    pub fn managed_policy_arn(&self, name: &str) -> String {
        format!("arn:{}:iam::aws:policy/{}", self.as_str(), name)
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Partition {
    type Err = UnknownPartition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(Partition::Aws),
            "aws-cn" => Ok(Partition::AwsCn),
            other => Err(UnknownPartition(other.to_string())),
        }
    }
}

/// Resolve the partition a region belongs to
///
/// Only the China regions map to the restricted partition. Anything else,
/// including empty or malformed region strings, falls back to the commercial
/// partition; region strings are not validated here.
pub fn resolve_partition(region: &str) -> Partition {
    if CHINA_REGIONS.contains(&region) {
        Partition::AwsCn
    } else {
        Partition::Aws
    }
}
