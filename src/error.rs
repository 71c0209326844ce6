//! Error types for the path finder

use thiserror::Error;

/// Configuration and usage errors.
///
/// Planning failures (infeasible samples, exhausted budgets) are not errors; they are
/// reported through [`crate::path_finder::SolverStatus`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlannerError {
    #[error("dimension mismatch: expected {expected} values, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("invalid sampling range on axis {axis}: min must be smaller than max")]
    InvalidRange { axis: usize },

    #[error("probability {name} must lie in [0, 1], got {value}")]
    InvalidProbability { name: &'static str, value: f64 },

    #[error("no problem set, call set_problem first")]
    NoProblem,

    #[error("no solution path available")]
    NoPath,

    #[error("cannot resample a path to {0} waypoints, at least 2 are needed")]
    ResampleCount(usize),

    #[error("configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, PlannerError>;
