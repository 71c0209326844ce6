use crate::config::PlannerConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Probabilities of the growth moves.
///
/// - `forward`: grow one tree towards the other (single direction: towards the goal)
/// - `side`: side-step around an infeasible extension
/// - `backward`: target a node of the other tree instead of a uniform sample
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepProbabilities {
    pub forward: f64,
    pub side: f64,
    pub backward: f64,
}

impl StepProbabilities {
    pub const fn new(forward: f64, side: f64, backward: f64) -> Self {
        Self {
            forward,
            side,
            backward,
        }
    }

    /// Applies the overrides of a configuration.
    pub fn overridden_by(self, config: &PlannerConfig) -> Self {
        Self {
            forward: config.p_forward_step.unwrap_or(self.forward),
            side: config.p_side_step.unwrap_or(self.side),
            backward: config.p_backward_step.unwrap_or(self.backward),
        }
    }
}

/// The knobs that distinguish the planning strategies.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    /// Grow a start and a goal tree towards each other
    pub bidirectional: bool,
    /// Choose parents and rewire neighbours to minimize path cost (RRT*)
    pub optimize_cost: bool,
    /// Splice the goal branch into the start tree on connection
    pub merge_trees: bool,
    pub probabilities: StepProbabilities,
}

/// The planning strategies offered by the path finder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Bidirectional RRT, stops at the first connection
    Rrt,
    /// Bidirectional RRT* with tree merging
    RrtStar,
    /// RRT* grown from the start towards an explicit goal
    SingleRrtStar,
    /// Bidirectional RRT with side and backward steps enabled
    PsbiRrt,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Rrt,
        Strategy::RrtStar,
        Strategy::SingleRrtStar,
        Strategy::PsbiRrt,
    ];

    pub fn policy(self) -> Policy {
        match self {
            Strategy::Rrt => Policy {
                bidirectional: true,
                optimize_cost: false,
                merge_trees: false,
                probabilities: StepProbabilities::new(0.5, 0.0, 0.0),
            },
            Strategy::RrtStar => Policy {
                bidirectional: true,
                optimize_cost: true,
                merge_trees: true,
                probabilities: StepProbabilities::new(0.5, 0.0, 0.0),
            },
            Strategy::SingleRrtStar => Policy {
                bidirectional: false,
                optimize_cost: true,
                merge_trees: false,
                probabilities: StepProbabilities::new(0.5, 0.0, 0.0),
            },
            Strategy::PsbiRrt => Policy {
                bidirectional: true,
                optimize_cost: false,
                merge_trees: false,
                probabilities: StepProbabilities::new(0.7, 0.5, 0.2),
            },
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Strategy::Rrt => "RRT",
            Strategy::RrtStar => "RRT*",
            Strategy::SingleRrtStar => "single RRT*",
            Strategy::PsbiRrt => "PSBI-RRT",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Diagnostic counters shared by all strategies. `*_good` counts the attempts of each
/// kind that added a node.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub iters: usize,
    pub n_forward_step: usize,
    pub n_forward_step_good: usize,
    pub n_side_step: usize,
    pub n_side_step_good: usize,
    pub n_back_step: usize,
    pub n_back_step_good: usize,
    pub n_rnd_step: usize,
    pub n_rnd_step_good: usize,
    pub n_rewires: usize,
    pub n_merges: usize,
    pub n_merge_rollbacks: usize,
}

impl Counters {
    pub fn to_json(&self) -> json::JsonValue {
        json::object! {
            iters: self.iters,
            n_forward_step: self.n_forward_step,
            n_forward_step_good: self.n_forward_step_good,
            n_side_step: self.n_side_step,
            n_side_step_good: self.n_side_step_good,
            n_back_step: self.n_back_step,
            n_back_step_good: self.n_back_step_good,
            n_rnd_step: self.n_rnd_step,
            n_rnd_step_good: self.n_rnd_step_good,
            n_rewires: self.n_rewires,
            n_merges: self.n_merges,
            n_merge_rollbacks: self.n_merge_rollbacks,
        }
    }
}

/// Outcome of a single planning iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// Nothing new, keep iterating
    Continue,
    /// The trees connected or the best solution improved
    Connected,
    /// The iteration budget is used up
    Exhausted,
}

impl StepStatus {
    /// The integer form: 0 continue, 1 connected, -1 exhausted.
    pub fn code(self) -> i32 {
        match self {
            StepStatus::Continue => 0,
            StepStatus::Connected => 1,
            StepStatus::Exhausted => -1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_match_their_strategy() {
        assert!(!Strategy::Rrt.policy().optimize_cost);
        assert!(Strategy::RrtStar.policy().merge_trees);
        assert!(!Strategy::SingleRrtStar.policy().bidirectional);
        assert_eq!(
            Strategy::PsbiRrt.policy().probabilities,
            StepProbabilities::new(0.7, 0.5, 0.2)
        );
    }

    #[test]
    fn config_overrides_probabilities() {
        let config = PlannerConfig {
            p_side_step: Some(0.3),
            ..Default::default()
        };
        let p = Strategy::Rrt.policy().probabilities.overridden_by(&config);
        assert_eq!(p, StepProbabilities::new(0.5, 0.3, 0.0));
    }

    #[test]
    fn status_codes() {
        let codes: Vec<i32> = [StepStatus::Continue, StepStatus::Connected, StepStatus::Exhausted]
            .iter()
            .map(|s| s.code())
            .collect();
        assert_eq!(codes, vec![0, 1, -1]);
    }
}
