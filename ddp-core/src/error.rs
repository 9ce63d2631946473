//! Library error type.
//!
//! Only configuration-time programming errors are raised through `Result`.
//! Runtime numerical trouble (non-PD Hessians, rejected line searches,
//! regularization saturation) is handled inside the solvers and reported
//! through the solution status instead.

use thiserror::Error;

/// Configuration errors raised by [`crate::Cddp::solve`].
#[derive(Error, Debug)]
pub enum CddpError {
    /// No dynamical system was supplied.
    #[error("dynamical system must be set before solving")]
    MissingSystem,

    /// No objective was supplied.
    #[error("objective must be set before solving")]
    MissingObjective,

    /// Horizon of zero control intervals.
    #[error("horizon must be at least one control interval")]
    ZeroHorizon,

    /// A supplied quantity has the wrong dimension.
    #[error("dimension mismatch for {what}: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Name of the offending quantity
        what: &'static str,
        /// Expected dimension
        expected: usize,
        /// Actual dimension
        actual: usize,
    },

    /// The objective carries a reference state that disagrees with the
    /// context's reference state.
    #[error("reference state mismatch between context and objective")]
    ReferenceStateMismatch,
}
