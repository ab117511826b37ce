//! Error type for the complete compile pipeline

use thiserror::Error;

use crate::identity::IdentityError;
use crate::manifest::OverlayError;
use crate::stack::{CompileError, RuntimeConfigError};

/// Errors that can occur anywhere between a raw workload and a stack artifact
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error(transparent)]
    Overlay(#[from] OverlayError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("runtime config: {0}")]
    Config(#[from] RuntimeConfigError),
}

impl Error {
    /// True when the error points at a bug upstream rather than at user input
    pub fn is_defect(&self) -> bool {
        matches!(self, Error::Compile(e) if e.is_defect())
    }
}
