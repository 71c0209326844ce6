use crate::rrt::path::path_length;
use crate::rrt::policy::{Counters, Strategy};
use crate::rrt::state::RealVectorState;
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a planning call ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolverStatus {
    Solved,
    BudgetExhausted,
    Cancelled,
    /// None of the start configurations is feasible.
    InfeasibleStart,
    /// None of the goal configurations is feasible.
    InfeasibleGoal,
}

impl SolverStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SolverStatus::Solved => "solved",
            SolverStatus::BudgetExhausted => "budget exhausted",
            SolverStatus::Cancelled => "cancelled",
            SolverStatus::InfeasibleStart => "infeasible start",
            SolverStatus::InfeasibleGoal => "infeasible goal",
        }
    }
}

/// The result of a planning call: the path (empty unless solved) and diagnostics.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolverReturn<F: Float, const N: usize> {
    pub strategy: Strategy,
    pub status: SolverStatus,
    pub path: Vec<RealVectorState<F, N>>,
    /// Cost of the returned path
    pub cost: Option<F>,
    /// Wall-clock time of the call in seconds
    pub time: f64,
    /// Counters accumulated by the strategy's engine over all calls
    pub counters: Counters,
    /// Feasibility queries issued during the call
    pub n_queries: usize,
}

impl<F: Float, const N: usize> SolverReturn<F, N> {
    /// A result for a call that could not start planning.
    pub fn failure(strategy: Strategy, status: SolverStatus) -> Self {
        Self {
            strategy,
            status,
            path: Vec::new(),
            cost: None,
            time: 0.0,
            counters: Counters::default(),
            n_queries: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == SolverStatus::Solved
    }

    /// Euclidean length of the path.
    pub fn path_length(&self) -> F {
        path_length(&self.path)
    }

    pub fn to_json(&self) -> json::JsonValue {
        let path: Vec<Vec<f64>> = self
            .path
            .iter()
            .map(|state| {
                state
                    .values()
                    .iter()
                    .map(|v| v.to_f64().unwrap_or(f64::NAN))
                    .collect()
            })
            .collect();
        let mut object = json::object! {
            strategy: self.strategy.name(),
            status: self.status.as_str(),
            success: self.is_success(),
            time: self.time,
            n_queries: self.n_queries,
            path: path,
            counters: self.counters.to_json(),
        };
        if let Some(cost) = self.cost.and_then(|c| c.to_f64()) {
            object["cost"] = cost.into();
        }
        object
    }
}

impl<F: Float, const N: usize> fmt::Display for SolverReturn<F, N> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "{} result", self.strategy)?;
        writeln!(f, "  Status: {}", self.status.as_str())?;
        match self.cost.and_then(|c| c.to_f64()) {
            Some(cost) => writeln!(f, "  Cost: {:.4} ({} waypoints)", cost, self.path.len())?,
            None => writeln!(f, "  Cost: -")?,
        }
        writeln!(f, "  Time: {:.4} s", self.time)?;
        writeln!(f, "  Iterations: {}", self.counters.iters)?;
        writeln!(
            f,
            "  Steps (good/total): forward {}/{}, side {}/{}, backward {}/{}, random {}/{}",
            self.counters.n_forward_step_good,
            self.counters.n_forward_step,
            self.counters.n_side_step_good,
            self.counters.n_side_step,
            self.counters.n_back_step_good,
            self.counters.n_back_step,
            self.counters.n_rnd_step_good,
            self.counters.n_rnd_step
        )?;
        writeln!(
            f,
            "  Rewires: {}, merges: {}, rollbacks: {}",
            self.counters.n_rewires, self.counters.n_merges, self.counters.n_merge_rollbacks
        )?;
        write!(f, "  Queries: {}", self.n_queries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solved() -> SolverReturn<f64, 2> {
        SolverReturn {
            strategy: Strategy::Rrt,
            status: SolverStatus::Solved,
            path: vec![RealVectorState::new([0.0, 0.0]), RealVectorState::new([3.0, 4.0])],
            cost: Some(5.0),
            time: 0.25,
            counters: Counters {
                iters: 12,
                ..Default::default()
            },
            n_queries: 40,
        }
    }

    #[test]
    fn json_export() {
        let result = solved();
        let value = result.to_json();
        assert_eq!(value["status"], "solved");
        assert_eq!(value["success"], true);
        assert_eq!(value["cost"], 5.0);
        assert_eq!(value["path"][1][1], 4.0);
        assert_eq!(value["counters"]["iters"], 12);
        assert_eq!(result.path_length(), 5.0);
    }

    #[test]
    fn failures_have_no_path() {
        let result = SolverReturn::<f64, 2>::failure(Strategy::PsbiRrt, SolverStatus::InfeasibleGoal);
        assert!(!result.is_success());
        assert!(result.path.is_empty());
        assert!(result.to_json()["cost"].is_null());
        assert!(result.to_string().contains("infeasible goal"));
    }

    #[test]
    fn display_lists_the_counters() {
        let text = solved().to_string();
        assert!(text.starts_with("RRT result"));
        assert!(text.contains("Iterations: 12"));
        assert!(text.contains("Cost: 5.0000 (2 waypoints)"));
    }
}
