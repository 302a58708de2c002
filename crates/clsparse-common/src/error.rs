//! Execution error taxonomy.
//!
//! Every device-level failure in the dense routines (mapping, fill, kernel
//! build, kernel launch, vendor routine) collapses to
//! [`ClsparseError::InvalidExecution`]. The reason string is kept for
//! humans only; callers branch on [`Status`].

use std::fmt;
use thiserror::Error;

/// Errors returned by clsparse-rs device routines.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClsparseError {
    /// A device operation reported a non-success status.
    #[error("invalid kernel execution: {reason}")]
    InvalidExecution { reason: String },
}

impl ClsparseError {
    /// Build a [`ClsparseError::InvalidExecution`] from any displayable reason.
    pub fn invalid_execution(reason: impl fmt::Display) -> Self {
        Self::InvalidExecution { reason: reason.to_string() }
    }

    /// Status code reported upward for this error.
    pub fn status(&self) -> Status {
        match self {
            Self::InvalidExecution { .. } => Status::InvalidExecution,
        }
    }
}

/// Convenience result alias.
pub type Result<T> = std::result::Result<T, ClsparseError>;

/// Outcome of a device routine as seen by callers that only need a code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Success,
    InvalidExecution,
}

impl Status {
    /// Collapse a routine result into its status.
    pub fn of<T>(result: &Result<T>) -> Self {
        match result {
            Ok(_) => Self::Success,
            Err(e) => e.status(),
        }
    }

    /// Whether this status is [`Status::Success`].
    pub fn is_success(self) -> bool {
        self == Self::Success
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::InvalidExecution => write!(f, "invalid kernel execution"),
        }
    }
}
