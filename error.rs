//! Error types for the simulator.
//!
//! Every failure aborts the run: the simulation is a one-shot deterministic
//! computation, so there is nothing to retry.

use thiserror::Error;

/// Failures raised while validating parameters or stepping the simulation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimError {
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("degenerate arithmetic in {context}: {reason}")]
    ArithmeticDegenerate { context: &'static str, reason: String },

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),
}

impl SimError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidParameter { name, reason: reason.into() }
    }

    pub(crate) fn degenerate(context: &'static str, reason: impl Into<String>) -> Self {
        Self::ArithmeticDegenerate { context, reason: reason.into() }
    }
}

pub type Result<T> = std::result::Result<T, SimError>;

/// Failures while persisting a run record. These never affect the
/// in-memory simulation result they were asked to write.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("results log I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to serialize run record: {0}")]
    Serialize(#[from] serde_json::Error),
}
