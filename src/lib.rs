//! Sampling-based path finding in continuous configuration spaces.
//!
//! The [`rrt`] module holds the search trees and the growth engine behind four
//! strategies (RRT, RRT*, single-direction RRT* and PSBI-RRT); [`path_finder`] wraps them
//! behind a problem-owning façade.

pub mod config;
pub mod error;
pub mod obstacles;
pub mod path_finder;
pub mod rrt;
pub mod util;

pub use config::PlannerConfig;
pub use error::{PlannerError, Result};
pub use path_finder::{PathFinder, SolverReturn, SolverStatus};
