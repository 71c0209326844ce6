#[allow(clippy::module_inception)]
pub mod path_finder;
pub mod solver_return;

pub use path_finder::PathFinder;
pub use solver_return::{SolverReturn, SolverStatus};
