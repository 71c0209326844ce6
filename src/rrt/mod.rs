pub mod engine;
pub mod neighbors;
pub mod observer;
pub mod path;
pub mod policy;
pub mod problem;
pub mod sampling;
pub mod single_tree;
pub mod state;
pub mod termination;
pub mod validity_checker;

pub use engine::{Connection, GrowthEngine, SharedObserver};
pub use neighbors::{KdTreeNearestNeighbors, LinearNearestNeighbors, NearestNeighbors};
pub use observer::{DisplayCache, TreeObserver, TreeSide};
pub use policy::{Counters, Policy, StepProbabilities, StepStatus, Strategy};
pub use problem::ConfigurationProblem;
pub use sampling::{SamplingDistribution, UniformDistribution};
pub use single_tree::SingleTree;
pub use state::RealVectorState;
pub use termination::TerminationCondition;
pub use validity_checker::{QueryResult, ValidityChecker};
