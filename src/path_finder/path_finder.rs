use crate::config::PlannerConfig;
use crate::error::{PlannerError, Result};
use crate::path_finder::solver_return::{SolverReturn, SolverStatus};
use crate::rrt::engine::{GrowthEngine, SharedObserver};
use crate::rrt::neighbors::NearestNeighbors;
use crate::rrt::path::resample_path;
use crate::rrt::policy::Strategy;
use crate::rrt::problem::ConfigurationProblem;
use crate::rrt::state::RealVectorState;
use crate::rrt::validity_checker::ValidityChecker;
use log::{info, warn};
use num_traits::Float;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Instant;

/// Owns a planning problem and runs the strategies on it.
///
/// Each strategy's engine is built on first use and kept, so calling the same strategy
/// again continues growing its trees: a solved RRT returns its path again, and the RRT*
/// variants keep improving theirs. Replacing the problem or the configuration drops all
/// engines.
pub struct PathFinder<F: Float, const N: usize, NN: NearestNeighbors<F, N>> {
    config: PlannerConfig,
    problem: Option<ConfigurationProblem<F, N>>,
    starts: Vec<RealVectorState<F, N>>,
    goals: Vec<RealVectorState<F, N>>,
    /// First feasible start and goal configurations.
    start: Option<RealVectorState<F, N>>,
    goal: Option<RealVectorState<F, N>>,
    solvers: HashMap<Strategy, GrowthEngine<F, N, NN>>,
    observer: Option<SharedObserver<F, N>>,
    cancel: Arc<AtomicBool>,
    last_path: Option<Vec<RealVectorState<F, N>>>,
}

impl<F: Float + 'static, const N: usize, NN: NearestNeighbors<F, N>> PathFinder<F, N, NN> {
    pub fn new(config: PlannerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            problem: None,
            starts: Vec::new(),
            goals: Vec::new(),
            start: None,
            goal: None,
            solvers: HashMap::new(),
            observer: None,
            cancel: Arc::new(AtomicBool::new(false)),
            last_path: None,
        })
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: PlannerConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.solvers.clear();
        Ok(())
    }

    /// Sets the problem to solve.
    ///
    /// Parameters:
    /// - `checker`: The feasibility oracle.
    /// - `ranges`: (min, max) sampling bounds per axis.
    /// - `starts`, `goals`: Candidate configurations; the first feasible one of each list
    ///   roots its tree.
    /// - `collision_tolerance`: Accepted penetration depth (None: zero).
    pub fn set_problem(
        &mut self,
        checker: Box<dyn ValidityChecker<F, N>>,
        ranges: [(F, F); N],
        starts: &[RealVectorState<F, N>],
        goals: &[RealVectorState<F, N>],
        collision_tolerance: Option<F>,
    ) -> Result<()> {
        if starts.is_empty() || goals.is_empty() {
            return Err(PlannerError::Config(
                "at least one start and one goal configuration are required".to_string(),
            ));
        }
        self.problem = Some(ConfigurationProblem::new(checker, ranges, collision_tolerance)?);
        self.starts = starts.to_vec();
        self.goals = goals.to_vec();
        self.select_seeds();
        Ok(())
    }

    /// Restricts collision checking to the given pairs of named geometries.
    pub fn set_explicit_collision_pairs(&mut self, pairs: &[(String, String)]) -> Result<()> {
        let problem = self.problem.as_mut().ok_or(PlannerError::NoProblem)?;
        problem.checker_mut().restrict_to_pairs(pairs);
        // Cached feasibility answers are stale now.
        self.select_seeds();
        Ok(())
    }

    fn select_seeds(&mut self) {
        self.solvers.clear();
        self.last_path = None;
        let Some(problem) = &self.problem else {
            return;
        };
        self.start = first_feasible(problem, &self.starts, "start");
        self.goal = first_feasible(problem, &self.goals, "goal");
    }

    pub fn problem(&self) -> Option<&ConfigurationProblem<F, N>> {
        self.problem.as_ref()
    }

    /// Attaches an observer to the existing engines and to every engine built later.
    pub fn set_observer(&mut self, observer: SharedObserver<F, N>) {
        for engine in self.solvers.values_mut() {
            engine.set_observer(observer.clone());
        }
        self.observer = Some(observer);
    }

    /// The flag shared with every engine; raising it cancels the running call.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    /// The engine of a strategy, once it has been used.
    pub fn engine(&self, strategy: Strategy) -> Option<&GrowthEngine<F, N, NN>> {
        self.solvers.get(&strategy)
    }

    /// Bidirectional RRT.
    pub fn solve(&mut self) -> Result<SolverReturn<F, N>> {
        self.solve_with(Strategy::Rrt)
    }

    /// Bidirectional RRT* with tree merging.
    pub fn star_solve(&mut self) -> Result<SolverReturn<F, N>> {
        self.solve_with(Strategy::RrtStar)
    }

    /// Single-direction RRT*.
    pub fn single_star_solve(&mut self) -> Result<SolverReturn<F, N>> {
        self.solve_with(Strategy::SingleRrtStar)
    }

    /// Bidirectional RRT with side and backward steps.
    pub fn psbi_solve(&mut self) -> Result<SolverReturn<F, N>> {
        self.solve_with(Strategy::PsbiRrt)
    }

    /// Runs one planning call of `strategy` with a budget of `max_iters` iterations.
    ///
    /// Planning failures are reported in the returned status; errors are reserved for a
    /// missing problem or an invalid configuration.
    pub fn solve_with(&mut self, strategy: Strategy) -> Result<SolverReturn<F, N>> {
        let problem = self.problem.as_ref().ok_or(PlannerError::NoProblem)?;
        let Some(start) = self.start else {
            return Ok(SolverReturn::failure(strategy, SolverStatus::InfeasibleStart));
        };
        let Some(goal) = self.goal else {
            return Ok(SolverReturn::failure(strategy, SolverStatus::InfeasibleGoal));
        };

        let timer = Instant::now();
        let queries_before = problem.n_queries();
        let engine = match self.solvers.entry(strategy) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let mut engine =
                    GrowthEngine::with_policy(strategy.policy(), &self.config, problem, start, goal)?;
                engine.set_cancel_flag(self.cancel.clone());
                if let Some(observer) = &self.observer {
                    engine.set_observer(observer.clone());
                }
                entry.insert(engine)
            }
        };

        let path = engine.plan_connect(problem);
        let status = match &path {
            Some(_) => SolverStatus::Solved,
            None if engine.was_cancelled() => SolverStatus::Cancelled,
            None => SolverStatus::BudgetExhausted,
        };
        let result = SolverReturn {
            strategy,
            status,
            cost: path.as_ref().and(engine.best_cost()),
            path: path.clone().unwrap_or_default(),
            time: timer.elapsed().as_secs_f64(),
            counters: engine.counters().clone(),
            n_queries: problem.n_queries() - queries_before,
        };

        if self.config.verbose >= 1 {
            info!(
                "[PathFinder] {}: {} after {} iterations ({:.3} s)",
                strategy,
                status.as_str(),
                result.counters.iters,
                result.time
            );
        }
        if path.is_some() {
            self.last_path = path;
        }
        Ok(result)
    }

    /// The path of the last successful call.
    pub fn last_path(&self) -> Option<&[RealVectorState<F, N>]> {
        self.last_path.as_deref()
    }

    /// The last successful path resampled to exactly `waypoints` states, uniformly spaced
    /// by arc length.
    pub fn resampled_path(&self, waypoints: usize) -> Result<Vec<RealVectorState<F, N>>> {
        let path = self.last_path.as_ref().ok_or(PlannerError::NoPath)?;
        resample_path(path, waypoints)
    }
}

fn first_feasible<F: Float, const N: usize>(
    problem: &ConfigurationProblem<F, N>,
    candidates: &[RealVectorState<F, N>],
    label: &str,
) -> Option<RealVectorState<F, N>> {
    for (i, candidate) in candidates.iter().enumerate() {
        if problem.is_feasible(&problem.query(candidate)) {
            return Some(*candidate);
        }
        warn!("[PathFinder] skipping infeasible {} configuration #{}", label, i);
    }
    None
}
