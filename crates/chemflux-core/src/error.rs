//! Error type shared by the whole kernel.
//!
//! Only precondition failures are errors.  Negative concentrations produced
//! during integration are recovered in place and surfaced as
//! [`InstabilityEvent`](crate::integrator::InstabilityEvent)s instead.
use thiserror::Error;

pub type Result<T> = std::result::Result<T, KernelError>;

#[derive(Debug, Error)]
pub enum KernelError {
    /// Declared dimensions disagree with the data supplied for them.
    #[error("{what}: expected {expected}, found {found}")]
    TopologyMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    /// Network or grid connectivity that cannot be resolved.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Malformed grid or channel field text.
    #[error("grid format error at line {line}: {message}")]
    GridFormat { line: usize, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fail with [`KernelError::TopologyMismatch`] unless `found == expected`.
pub(crate) fn ensure_len(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(KernelError::TopologyMismatch { what, expected, found })
    }
}
