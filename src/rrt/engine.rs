use crate::config::PlannerConfig;
use crate::error::{PlannerError, Result};
use crate::rrt::neighbors::NearestNeighbors;
use crate::rrt::observer::{TreeObserver, TreeSide};
use crate::rrt::path::join_paths;
use crate::rrt::policy::{Counters, Policy, StepProbabilities, StepStatus, Strategy};
use crate::rrt::problem::ConfigurationProblem;
use crate::rrt::sampling::{SamplingDistribution, UniformDistribution};
use crate::rrt::single_tree::{Sample, SingleTree};
use crate::rrt::state::RealVectorState;
use crate::rrt::termination::{AnyTermination, TerminationCondition, TimeTermination};
use crate::rrt::validity_checker::QueryResult;
use log::{debug, info, trace};
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// An observer shared with a rendering thread.
pub type SharedObserver<F, const N: usize> = Arc<dyn TreeObserver<F, N> + Send + Sync>;

/// A pair of nodes joining the start tree and the goal tree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Connection {
    pub start_node: usize,
    pub goal_node: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Solution {
    /// The trees meet at a pair of nodes.
    Connection(Connection),
    /// A node of the start tree holds the goal configuration.
    GoalNode(usize),
}

/// The tree growth engine behind every strategy.
///
/// Grows one tree (single direction) or two trees (start and goal) and, depending on its
/// [`Policy`], optimizes path cost by choosing parents and rewiring neighbours (RRT*) and
/// merges the goal branch into the start tree when the trees connect.
///
/// The engine does not own the [`ConfigurationProblem`]; every planning call borrows it.
///
/// Template Parameters:
/// - `F`: The floating-point type.
/// - `N`: The dimension of the space.
/// - `NN`: The nearest neighbors data structure.
pub struct GrowthEngine<F: Float, const N: usize, NN: NearestNeighbors<F, N>> {
    policy: Policy,
    probabilities: StepProbabilities,
    stepsize: F,
    max_iters: usize,
    subsample_checks: i32,
    verbose: i32,
    /// Upper bound of the rewiring radius.
    max_connection_radius: F,
    gamma: F,
    /// Start tree, then goal tree when bidirectional.
    trees: Vec<SingleTree<F, N, NN>>,
    /// Explicit goal of a single-direction search.
    goal: Option<(RealVectorState<F, N>, QueryResult<F, N>)>,
    /// Goal-tree node -> start-tree node, for branches already merged into the start tree.
    spliced: HashMap<usize, usize>,
    solution: Option<Solution>,
    counters: Counters,
    rng: StdRng,
    sampler: Box<dyn SamplingDistribution<F, N>>,
    observer: Option<SharedObserver<F, N>>,
    cancel: Arc<AtomicBool>,
    cancelled: bool,
    /// Iteration count at which `step_connect` reports exhaustion.
    budget_end: usize,
}

impl<F: Float + 'static, const N: usize, NN: NearestNeighbors<F, N>> GrowthEngine<F, N, NN> {
    /// Bidirectional RRT: stops at the first connection.
    pub fn rrt(
        config: &PlannerConfig,
        problem: &ConfigurationProblem<F, N>,
        start: RealVectorState<F, N>,
        goal: RealVectorState<F, N>,
    ) -> Result<Self> {
        Self::with_policy(Strategy::Rrt.policy(), config, problem, start, goal)
    }

    /// Bidirectional RRT* with tree merging.
    pub fn rrt_star(
        config: &PlannerConfig,
        problem: &ConfigurationProblem<F, N>,
        start: RealVectorState<F, N>,
        goal: RealVectorState<F, N>,
    ) -> Result<Self> {
        Self::with_policy(Strategy::RrtStar.policy(), config, problem, start, goal)
    }

    /// RRT* grown from `start` towards `goal` only.
    pub fn single_rrt_star(
        config: &PlannerConfig,
        problem: &ConfigurationProblem<F, N>,
        start: RealVectorState<F, N>,
        goal: RealVectorState<F, N>,
    ) -> Result<Self> {
        Self::with_policy(Strategy::SingleRrtStar.policy(), config, problem, start, goal)
    }

    /// Bidirectional RRT with side-steps and backward steps.
    pub fn psbi_rrt(
        config: &PlannerConfig,
        problem: &ConfigurationProblem<F, N>,
        start: RealVectorState<F, N>,
        goal: RealVectorState<F, N>,
    ) -> Result<Self> {
        Self::with_policy(Strategy::PsbiRrt.policy(), config, problem, start, goal)
    }

    /// Constructs an engine and seeds its tree(s).
    ///
    /// Parameters:
    /// - `policy`: The strategy knobs; its probabilities are overridden by `config`.
    /// - `config`: Step size, budget and RRT* parameters (negative values are derived from
    ///   the sampling box of `problem`).
    /// - `problem`: The feasibility context, used to query the roots.
    /// - `start`, `goal`: The roots (bidirectional) or the root and the target.
    pub fn with_policy(
        policy: Policy,
        config: &PlannerConfig,
        problem: &ConfigurationProblem<F, N>,
        start: RealVectorState<F, N>,
        goal: RealVectorState<F, N>,
    ) -> Result<Self> {
        config.validate()?;

        let stepsize = if config.stepsize > 0.0 {
            F::from(config.stepsize).unwrap()
        } else {
            problem.diagonal() / F::from(50.0).unwrap()
        };
        let max_connection_radius = if config.max_connection_radius > 0.0 {
            F::from(config.max_connection_radius).unwrap()
        } else {
            stepsize + stepsize
        };
        let gamma = if config.gamma > 0.0 {
            F::from(config.gamma).unwrap()
        } else {
            let volume = problem.volume().to_f64().unwrap_or(0.0);
            F::from(optimal_gamma(volume, N)?).unwrap()
        };

        let (sampler, rng) = match config.seed {
            Some(seed) => (
                UniformDistribution::with_seed(*problem.ranges(), seed)?,
                StdRng::seed_from_u64(seed.wrapping_add(1)),
            ),
            None => (
                UniformDistribution::new(*problem.ranges())?,
                StdRng::from_entropy(),
            ),
        };

        let mut engine = Self {
            policy,
            probabilities: policy.probabilities.overridden_by(config),
            stepsize,
            max_iters: config.max_iters,
            subsample_checks: config.subsample_checks,
            verbose: config.verbose,
            max_connection_radius,
            gamma,
            trees: Vec::with_capacity(2),
            goal: None,
            spliced: HashMap::new(),
            solution: None,
            counters: Counters::default(),
            rng,
            sampler: Box::new(sampler),
            observer: None,
            cancel: Arc::new(AtomicBool::new(false)),
            cancelled: false,
            budget_end: config.max_iters,
        };
        engine.reset(problem, start, goal, policy.bidirectional);
        Ok(engine)
    }

    fn reset(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        start: RealVectorState<F, N>,
        goal: RealVectorState<F, N>,
        bidirectional: bool,
    ) {
        self.trees.clear();
        self.trees.push(SingleTree::new(start, problem.query(&start)));
        let goal_query = problem.query(&goal);
        if bidirectional {
            self.trees.push(SingleTree::new(goal, goal_query));
            self.goal = None;
        } else {
            self.goal = Some((goal, goal_query));
        }
        self.spliced.clear();
        self.solution = None;
        self.replay_to_observer();
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The effective step probabilities (policy defaults with configured overrides).
    pub fn probabilities(&self) -> StepProbabilities {
        self.probabilities
    }

    pub fn stepsize(&self) -> F {
        self.stepsize
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn trees(&self) -> &[SingleTree<F, N, NN>] {
        &self.trees
    }

    pub fn tree(&self, side: TreeSide) -> Option<&SingleTree<F, N, NN>> {
        self.trees.get(side.index())
    }

    pub fn is_bidirectional(&self) -> bool {
        self.trees.len() == 2
    }

    pub fn solved(&self) -> bool {
        self.solution.is_some()
    }

    /// The meeting nodes, while the solution is a connection between the two trees.
    pub fn connection(&self) -> Option<Connection> {
        match self.solution? {
            Solution::Connection(connection) => Some(connection),
            Solution::GoalNode(_) => None,
        }
    }

    /// The start-tree node holding the goal, once a goal node exists.
    pub fn goal_node(&self) -> Option<usize> {
        match self.solution? {
            Solution::GoalNode(index) => Some(index),
            Solution::Connection(_) => None,
        }
    }

    /// Cost of the best solution found so far. Never increases.
    pub fn best_cost(&self) -> Option<F> {
        match self.solution? {
            Solution::Connection(connection) => Some(self.connection_cost(&connection)),
            Solution::GoalNode(index) => Some(self.trees[0].cost(index)),
        }
    }

    /// The best path found so far, from the start to the goal.
    pub fn path(&self) -> Option<Vec<RealVectorState<F, N>>> {
        match self.solution? {
            Solution::Connection(connection) => Some(join_paths(
                self.trees[0].path_from_node(connection.start_node),
                self.trees[1].path_from_node(connection.goal_node),
            )),
            Solution::GoalNode(index) => Some(self.trees[0].path_from_node(index)),
        }
    }

    /// The flag checked at the top of every iteration. Raising it stops planning; it stays
    /// raised until the caller clears it.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn set_cancel_flag(&mut self, flag: Arc<AtomicBool>) {
        self.cancel = flag;
    }

    /// Whether the last planning call stopped on the cancellation flag.
    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Attaches an observer and replays the current trees to it.
    pub fn set_observer(&mut self, observer: SharedObserver<F, N>) {
        self.observer = Some(observer);
        self.replay_to_observer();
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    /// The RRT* neighbourhood radius for a tree of `n` nodes:
    /// `gamma * (ln n / n)^(1/N)`, bounded by the maximum connection radius.
    pub fn rewiring_radius(&self, n: usize) -> F {
        let card_v = F::from(n).unwrap();
        let d = F::from(N).unwrap();
        let radius = self.gamma * (card_v.ln() / card_v).powf(F::one() / d);
        if radius > self.max_connection_radius {
            self.max_connection_radius
        } else {
            radius
        }
    }

    /// Plans with a budget of `max_iters` further iterations.
    ///
    /// Non-optimizing policies stop at the first connection, and a solved engine returns
    /// its path right away. Optimizing policies spend the whole budget improving the
    /// solution. Returns the best path, if any.
    pub fn plan_connect(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
    ) -> Option<Vec<RealVectorState<F, N>>> {
        self.budget_end = self.counters.iters.saturating_add(self.max_iters);
        self.drive(problem, &mut AnyTermination::new())
    }

    /// Single-direction planning from `q0` to `q_goal`.
    ///
    /// Discards the current trees and grows a single tree rooted at `q0`, biased towards
    /// `q_goal` by the forward step probability.
    pub fn plan_forward(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        q0: RealVectorState<F, N>,
        q_goal: RealVectorState<F, N>,
    ) -> Option<Vec<RealVectorState<F, N>>> {
        self.reset(problem, q0, q_goal, false);
        self.plan_connect(problem)
    }

    /// Plans until the termination condition fires (or the trees connect, for
    /// non-optimizing policies).
    pub fn plan_until<T: TerminationCondition + ?Sized>(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        termination: &mut T,
    ) -> Option<Vec<RealVectorState<F, N>>> {
        self.budget_end = usize::MAX;
        let path = self.drive(problem, termination);
        // Later direct steps get a fresh iteration budget.
        self.budget_end = self.counters.iters.saturating_add(self.max_iters);
        path
    }

    /// Plans under a wall-clock budget in seconds.
    #[deprecated(note = "use `plan_until` with a `TimeTermination`")]
    pub fn run(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        time_budget: f64,
    ) -> Option<Vec<RealVectorState<F, N>>> {
        self.plan_until(problem, &mut TimeTermination::from_secs_f64(time_budget))
    }

    fn drive<T: TerminationCondition + ?Sized>(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        termination: &mut T,
    ) -> Option<Vec<RealVectorState<F, N>>> {
        self.cancelled = false;
        if self.solved() && !self.policy.optimize_cost {
            return self.path();
        }
        let first_iteration = self.counters.iters;
        loop {
            if self.cancel.load(Ordering::Relaxed) {
                self.cancelled = true;
                break;
            }
            if termination.evaluate() {
                break;
            }
            match self.step_connect(problem) {
                StepStatus::Exhausted => break,
                StepStatus::Connected if !self.policy.optimize_cost => break,
                _ => {}
            }
        }

        if self.verbose >= 1 {
            let iterations = self.counters.iters - first_iteration;
            match self.best_cost() {
                Some(cost) => info!(
                    "[RRT] solution after {} iterations, cost {:.4}",
                    iterations,
                    cost.to_f64().unwrap_or(f64::NAN)
                ),
                None if self.cancelled => info!("[RRT] cancelled after {} iterations", iterations),
                None => info!("[RRT] no solution after {} iterations", iterations),
            }
        }
        self.path()
    }

    /// Runs one planning iteration.
    ///
    /// Bidirectional: for each tree in turn, either grow it towards the other tree
    /// (probability `forward`) or towards a random target followed by a connection attempt.
    /// Single direction: grow towards the goal (probability `forward`) or a uniform sample,
    /// then try to reach the goal.
    pub fn step_connect(&mut self, problem: &ConfigurationProblem<F, N>) -> StepStatus {
        if self.solved() && !self.policy.optimize_cost {
            return StepStatus::Connected;
        }
        if self.counters.iters >= self.budget_end {
            return StepStatus::Exhausted;
        }
        self.counters.iters += 1;

        let improved = if self.is_bidirectional() {
            self.step_bidirectional(problem)
        } else {
            self.step_forward(problem)
        };

        if self.verbose >= 3 {
            trace!(
                "[RRT] iteration {}: {} nodes",
                self.counters.iters,
                self.trees.iter().map(|tree| tree.len()).sum::<usize>()
            );
        }
        if improved {
            StepStatus::Connected
        } else {
            StepStatus::Continue
        }
    }

    fn step_bidirectional(&mut self, problem: &ConfigurationProblem<F, N>) -> bool {
        let mut improved = false;
        for side in [TreeSide::Start, TreeSide::Goal] {
            let connection = if self.rng.gen::<f64>() < self.probabilities.forward {
                self.grow_tree_to_tree(problem, side)
            } else {
                self.grow_tree_towards_random(problem, side)
                    .and_then(|node| self.try_connect(problem, side, node))
            };
            if let Some(connection) = connection {
                if self.accept_connection(problem, connection) {
                    improved = true;
                    if !self.policy.optimize_cost {
                        return true;
                    }
                }
            }
        }
        improved
    }

    fn step_forward(&mut self, problem: &ConfigurationProblem<F, N>) -> bool {
        let Some((goal, goal_query)) = self.goal.clone() else {
            return false;
        };
        let towards_goal = self.rng.gen::<f64>() < self.probabilities.forward;
        let target = if towards_goal {
            self.counters.n_forward_step += 1;
            goal
        } else {
            self.counters.n_rnd_step += 1;
            self.sampler.sample()
        };
        let Some(node) = self.extend(problem, TreeSide::Start, &target) else {
            return false;
        };
        if towards_goal {
            self.counters.n_forward_step_good += 1;
        } else {
            self.counters.n_rnd_step_good += 1;
        }
        self.try_reach_goal(problem, node, &goal, &goal_query)
    }

    /// Grows the tree on `side` towards a random node of the other tree (probability
    /// `backward`, bidirectional only) or towards a uniform sample. Returns the new node.
    pub fn grow_tree_towards_random(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        side: TreeSide,
    ) -> Option<usize> {
        let backward =
            self.is_bidirectional() && self.rng.gen::<f64>() < self.probabilities.backward;
        let target = if backward {
            self.counters.n_back_step += 1;
            let other = &self.trees[side.other().index()];
            *other.state(other.random_node(&mut self.rng))
        } else {
            self.counters.n_rnd_step += 1;
            self.sampler.sample()
        };

        let node = self.extend(problem, side, &target)?;
        if backward {
            self.counters.n_back_step_good += 1;
        } else {
            self.counters.n_rnd_step_good += 1;
        }
        Some(node)
    }

    /// Grows the tree on `side` from its newest node's surroundings towards the nearest
    /// node of the other tree, then tries to connect the new node to the other tree.
    pub fn grow_tree_to_tree(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        side: TreeSide,
    ) -> Option<Connection> {
        if !self.is_bidirectional() {
            return None;
        }
        let tree = &self.trees[side.index()];
        let other = &self.trees[side.other().index()];
        let (nearest, _) = other.nearest(tree.state(tree.last()));
        let target = *other.state(nearest);

        self.counters.n_forward_step += 1;
        let node = self.extend(problem, side, &target)?;
        self.counters.n_forward_step_good += 1;
        self.try_connect(problem, side, node)
    }

    /// Connects `node` of the tree on `side` to the nearest node of the other tree when
    /// they are at most one step apart and the joining edge is feasible.
    fn try_connect(
        &self,
        problem: &ConfigurationProblem<F, N>,
        side: TreeSide,
        node: usize,
    ) -> Option<Connection> {
        let other = &self.trees[side.other().index()];
        let (nearest, distance) = other.nearest(self.trees[side.index()].state(node));
        if distance > self.stepsize {
            return None;
        }
        let connection = match side {
            TreeSide::Start => Connection {
                start_node: node,
                goal_node: nearest,
            },
            TreeSide::Goal => Connection {
                start_node: nearest,
                goal_node: node,
            },
        };
        let start = &self.trees[0];
        if distance > F::epsilon()
            && !problem.is_edge_feasible(
                start.state(connection.start_node),
                start.query(connection.start_node),
                self.trees[1].state(connection.goal_node),
                self.subsample_checks,
            )
        {
            return None;
        }
        Some(connection)
    }

    fn accept_connection(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        connection: Connection,
    ) -> bool {
        if !self.policy.optimize_cost {
            self.solution = Some(Solution::Connection(connection));
            if self.verbose >= 2 {
                debug!(
                    "[RRT] trees connected at ({}, {}) after {} iterations",
                    connection.start_node, connection.goal_node, self.counters.iters
                );
            }
            return true;
        }
        if self.policy.merge_trees {
            return self.merge_trees(problem, connection);
        }
        let cost = self.connection_cost(&connection);
        if self.best_cost().map_or(true, |best| cost < best) {
            self.solution = Some(Solution::Connection(connection));
            return true;
        }
        false
    }

    fn connection_cost(&self, connection: &Connection) -> F {
        let start = &self.trees[0];
        let goal = &self.trees[1];
        start.cost(connection.start_node)
            + start
                .state(connection.start_node)
                .euclidean_distance(goal.state(connection.goal_node))
            + goal.cost(connection.goal_node)
    }

    /// Splices the goal-tree branch from the connection down to the goal root into a
    /// working copy of the start tree, so later iterations keep optimizing one connected
    /// tree. The copy replaces the start tree only if the goal becomes cheaper to reach;
    /// otherwise it is dropped by [`Self::revert_nodes`].
    fn merge_trees(&mut self, problem: &ConfigurationProblem<F, N>, connection: Connection) -> bool {
        if let Some(best) = self.best_cost() {
            if self.connection_cost(&connection) >= best {
                return false;
            }
        }

        let mut scratch = self.trees[0].clone();
        let mut spliced = self.spliced.clone();
        let Some(rewired) = self.splice_goal_branch(problem, &mut scratch, &mut spliced, connection)
        else {
            self.revert_nodes(scratch, "a reversed goal-tree edge is infeasible");
            return false;
        };
        let Some(&goal_node) = spliced.get(&0) else {
            self.revert_nodes(scratch, "the goal root was not reached");
            return false;
        };
        let cost = scratch.cost(goal_node);
        if self.best_cost().map_or(false, |best| cost >= best) {
            self.revert_nodes(scratch, "no cost improvement");
            return false;
        }

        let previous_len = self.trees[0].len();
        let previous = std::mem::replace(&mut self.trees[0], scratch);
        self.spliced = spliced;
        self.solution = Some(Solution::GoalNode(goal_node));
        self.counters.n_merges += 1;
        self.counters.n_rewires += rewired.len();

        if let Some(observer) = &self.observer {
            let tree = &self.trees[0];
            for index in previous_len..tree.len() {
                observer.node_added(TreeSide::Start, index, tree.state(index), tree.parent(index));
            }
            for index in 0..previous_len {
                if let Some(parent) = tree.parent(index) {
                    if previous.parent(index) != Some(parent) {
                        observer.parent_changed(TreeSide::Start, index, parent);
                    }
                }
            }
        }
        if self.verbose >= 2 {
            debug!(
                "[RRT] merged goal branch at iteration {}, cost {:.4}",
                self.counters.iters,
                cost.to_f64().unwrap_or(f64::NAN)
            );
        }
        true
    }

    /// Copies the goal-tree path `connection.goal_node -> goal root` into `scratch`,
    /// re-validating every edge in its new direction. Stops early at a goal-tree node that
    /// an earlier merge already copied, re-parenting that copy if the new route is cheaper.
    ///
    /// Returns the re-parented start-tree nodes, or None if an edge is infeasible.
    fn splice_goal_branch(
        &self,
        problem: &ConfigurationProblem<F, N>,
        scratch: &mut SingleTree<F, N, NN>,
        spliced: &mut HashMap<usize, usize>,
        connection: Connection,
    ) -> Option<Vec<usize>> {
        let goal_tree = &self.trees[1];
        let mut rewired = Vec::new();
        let mut parent = connection.start_node;
        let mut current = Some(connection.goal_node);

        while let Some(node) = current {
            let state = *goal_tree.state(node);
            let edge = scratch.state(parent).euclidean_distance(&state);
            if edge <= F::epsilon() {
                // The start-tree node coincides with the goal-tree node.
                spliced.insert(node, parent);
                current = goal_tree.parent(node);
                continue;
            }
            if !problem.is_edge_feasible(
                scratch.state(parent),
                scratch.query(parent),
                &state,
                self.subsample_checks,
            ) {
                return None;
            }
            if let Some(&copy) = spliced.get(&node) {
                if scratch.cost(parent) + edge < scratch.cost(copy)
                    && scratch.change_parent(copy, parent, edge)
                {
                    rewired.push(copy);
                }
                break;
            }

            let index = if self.policy.optimize_cost {
                let radius = self.rewiring_radius(scratch.len() + 1);
                let (index, mut changed) = add_with_rewiring(
                    scratch,
                    state,
                    goal_tree.query(node).clone(),
                    parent,
                    radius,
                    problem,
                    self.subsample_checks,
                );
                rewired.append(&mut changed);
                index
            } else {
                scratch.add(state, parent, goal_tree.query(node).clone())
            };
            spliced.insert(node, index);
            parent = index;
            current = goal_tree.parent(node);
        }
        Some(rewired)
    }

    /// Drops a merge working copy; the committed trees are untouched.
    fn revert_nodes(&mut self, scratch: SingleTree<F, N, NN>, reason: &str) {
        drop(scratch);
        self.counters.n_merge_rollbacks += 1;
        if self.verbose >= 2 {
            debug!("[RRT] merge rolled back: {}", reason);
        }
    }

    /// Adds the goal to the single tree once a node is within one step of it, or
    /// re-parents the existing goal node if the new node offers a cheaper route.
    fn try_reach_goal(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        node: usize,
        goal: &RealVectorState<F, N>,
        goal_query: &QueryResult<F, N>,
    ) -> bool {
        let tree = &self.trees[0];
        let state = *tree.state(node);
        let distance = state.euclidean_distance(goal);
        if distance > self.stepsize || !problem.is_feasible(goal_query) {
            return false;
        }
        let existing = self.goal_node();
        if distance <= F::epsilon() {
            // The new node is the goal itself.
            if existing.is_none() {
                self.solution = Some(Solution::GoalNode(node));
                return true;
            }
            return false;
        }
        if !problem.is_edge_feasible(&state, tree.query(node), goal, self.subsample_checks) {
            return false;
        }

        match existing {
            None => {
                let sample = Sample {
                    state: *goal,
                    query: goal_query.clone(),
                    parent: node,
                    is_side_step: false,
                };
                let index = self.insert(problem, TreeSide::Start, sample);
                self.solution = Some(Solution::GoalNode(index));
                if self.verbose >= 2 {
                    debug!("[RRT] goal reached after {} iterations", self.counters.iters);
                }
                true
            }
            Some(goal_node) if self.policy.optimize_cost => {
                let tree = &mut self.trees[0];
                if tree.cost(node) + distance < tree.cost(goal_node)
                    && tree.change_parent(goal_node, node, distance)
                {
                    self.counters.n_rewires += 1;
                    self.notify_rewired(TreeSide::Start, &[goal_node]);
                    return true;
                }
                false
            }
            Some(_) => false,
        }
    }

    /// Extends the tree on `side` towards `target` and adds the new node if it and its
    /// edge are feasible.
    fn extend(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        side: TreeSide,
        target: &RealVectorState<F, N>,
    ) -> Option<usize> {
        let tree = &self.trees[side.index()];
        let sample = tree.new_sample(
            target,
            self.stepsize,
            self.probabilities.side,
            problem,
            &mut self.rng,
            0,
        )?;
        if sample.is_side_step {
            self.counters.n_side_step += 1;
        }
        if !problem.is_feasible(&sample.query)
            || !problem.is_edge_feasible(
                tree.state(sample.parent),
                tree.query(sample.parent),
                &sample.state,
                self.subsample_checks,
            )
        {
            return None;
        }
        if sample.is_side_step {
            self.counters.n_side_step_good += 1;
        }
        Some(self.insert(problem, side, sample))
    }

    fn insert(
        &mut self,
        problem: &ConfigurationProblem<F, N>,
        side: TreeSide,
        sample: Sample<F, N>,
    ) -> usize {
        let k = side.index();
        if !self.policy.optimize_cost {
            let index = self.trees[k].add(sample.state, sample.parent, sample.query);
            self.notify_added(side, index);
            return index;
        }

        let radius = self.rewiring_radius(self.trees[k].len() + 1);
        let (index, rewired) = add_with_rewiring(
            &mut self.trees[k],
            sample.state,
            sample.query,
            sample.parent,
            radius,
            problem,
            self.subsample_checks,
        );
        self.counters.n_rewires += rewired.len();
        self.notify_added(side, index);
        self.notify_rewired(side, &rewired);
        index
    }

    fn notify_added(&self, side: TreeSide, index: usize) {
        if let Some(observer) = &self.observer {
            let tree = &self.trees[side.index()];
            observer.node_added(side, index, tree.state(index), tree.parent(index));
        }
    }

    fn notify_rewired(&self, side: TreeSide, nodes: &[usize]) {
        if let Some(observer) = &self.observer {
            let tree = &self.trees[side.index()];
            for &node in nodes {
                if let Some(parent) = tree.parent(node) {
                    observer.parent_changed(side, node, parent);
                }
            }
        }
    }

    fn replay_to_observer(&self) {
        let Some(observer) = &self.observer else {
            return;
        };
        for side in [TreeSide::Start, TreeSide::Goal] {
            observer.tree_cleared(side);
        }
        for (side, tree) in [TreeSide::Start, TreeSide::Goal].into_iter().zip(&self.trees) {
            for index in 0..tree.len() {
                self.notify_added(side, index);
            }
        }
    }
}

/// Adds a node under the cheapest feasible parent within `radius` (falling back to
/// `parent`, whose edge the caller has checked) and re-parents every neighbour that
/// becomes cheaper through the new node.
///
/// Returns the new node and the re-parented neighbours.
fn add_with_rewiring<F: Float, const N: usize, NN: NearestNeighbors<F, N>>(
    tree: &mut SingleTree<F, N, NN>,
    state: RealVectorState<F, N>,
    query: QueryResult<F, N>,
    parent: usize,
    radius: F,
    problem: &ConfigurationProblem<F, N>,
    subsample_checks: i32,
) -> (usize, Vec<usize>) {
    let neighbors = tree.neighbors(&state, radius);

    let mut best_parent = parent;
    let mut best_cost = tree.cost(parent) + tree.state(parent).euclidean_distance(&state);
    for &candidate in &neighbors {
        if candidate == parent {
            continue;
        }
        let cost = tree.cost(candidate) + tree.state(candidate).euclidean_distance(&state);
        if cost < best_cost
            && problem.is_edge_feasible(
                tree.state(candidate),
                tree.query(candidate),
                &state,
                subsample_checks,
            )
        {
            best_parent = candidate;
            best_cost = cost;
        }
    }
    let index = tree.add(state, best_parent, query);

    let mut rewired = Vec::new();
    for &neighbor in &neighbors {
        if neighbor == best_parent || tree.parent(neighbor).is_none() {
            continue;
        }
        let edge = state.euclidean_distance(tree.state(neighbor));
        if tree.cost(index) + edge < tree.cost(neighbor)
            && problem.is_edge_feasible(&state, tree.query(index), tree.state(neighbor), subsample_checks)
            && tree.change_parent(neighbor, index, edge)
        {
            rewired.push(neighbor);
        }
    }
    (index, rewired)
}

/// Computes gamma value to achieve asymptotic optimality for the RRT* algorithm.
/// Parameters:
/// - `free_space_volume`: The volume of the free space.
/// - `dimension`: The dimension of the state space.
///
/// Returns:
/// The optimal gamma value.
pub fn optimal_gamma(free_space_volume: f64, dimension: usize) -> Result<f64> {
    if !(free_space_volume > 0.0) {
        return Err(PlannerError::Config(
            "the free space volume must be positive".to_string(),
        ));
    }
    if dimension == 0 {
        return Err(PlannerError::Config("the dimension must be positive".to_string()));
    }

    let d = dimension as f64;
    let unit_ball_volume =
        std::f64::consts::PI.powf(d / 2.0) / special::Gamma::gamma(1.0 + d / 2.0);
    Ok((2.0 * (1.0 + 1.0 / d) * free_space_volume / unit_ball_volume).powf(1.0 / d))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obstacles::{AnalyticValidityChecker, StaticRectangularObstacle};
    use crate::rrt::neighbors::{KdTreeNearestNeighbors, LinearNearestNeighbors};
    use crate::rrt::observer::DisplayCache;
    use crate::rrt::path::path_length;
    use crate::rrt::termination::MaxIterationsTermination;
    use crate::rrt::validity_checker::{AlwaysValid, ValidityChecker};
    use approx::assert_relative_eq;

    type Engine = GrowthEngine<f64, 2, KdTreeNearestNeighbors<f64, 2>>;

    fn s(x: f64, y: f64) -> RealVectorState<f64, 2> {
        RealVectorState::new([x, y])
    }

    fn corridor() -> ConfigurationProblem<f64, 2> {
        ConfigurationProblem::new(Box::new(AlwaysValid::new()), [(-1.0, 11.0), (-1.0, 1.0)], None)
            .unwrap()
    }

    fn config(seed: u64, max_iters: usize) -> PlannerConfig {
        PlannerConfig {
            stepsize: 1.0,
            max_iters,
            seed: Some(seed),
            ..Default::default()
        }
    }

    #[test]
    fn optimal_gamma_in_the_plane() {
        // Unit area: (2 * 1.5 / pi)^(1/2)
        assert_relative_eq!(
            optimal_gamma(1.0, 2).unwrap(),
            (3.0 / std::f64::consts::PI).sqrt(),
            epsilon = 1e-12
        );
        assert!(optimal_gamma(0.0, 2).is_err());
        assert!(optimal_gamma(1.0, 0).is_err());
    }

    #[test]
    fn derived_parameters() {
        let problem = corridor();
        let engine = Engine::rrt(&PlannerConfig::default(), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        assert_relative_eq!(engine.stepsize(), problem.diagonal() / 50.0);
        assert_relative_eq!(engine.rewiring_radius(2), 2.0 * engine.stepsize());
        assert!(engine.rewiring_radius(100_000) < 2.0 * engine.stepsize());
        assert_eq!(engine.trees().len(), 2);
        assert_eq!(engine.probabilities(), Strategy::Rrt.policy().probabilities);
    }

    #[test]
    fn rrt_connects_and_stops() {
        let problem = corridor();
        let mut engine = Engine::rrt(&config(3, 1000), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        let path = engine.plan_connect(&problem).unwrap();
        let iterations = engine.counters().iters;
        assert!(iterations < 200);
        assert_eq!(path.first(), Some(&s(0.0, 0.0)));
        assert_eq!(path.last(), Some(&s(10.0, 0.0)));
        assert!(path.windows(2).all(|w| w[0].euclidean_distance(&w[1]) <= 1.0 + 1e-9));
        assert_relative_eq!(engine.best_cost().unwrap(), path_length(&path), epsilon = 1e-9);

        // A solved engine answers again without iterating.
        assert_eq!(engine.plan_connect(&problem), Some(path));
        assert_eq!(engine.counters().iters, iterations);
        assert_eq!(engine.step_connect(&problem), StepStatus::Connected);
    }

    #[test]
    fn counters_are_consistent() {
        let problem = corridor();
        let mut engine =
            Engine::psbi_rrt(&config(11, 1000), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        engine.plan_connect(&problem).unwrap();
        let c = engine.counters();
        assert!(c.n_forward_step_good <= c.n_forward_step);
        assert!(c.n_back_step_good <= c.n_back_step);
        assert!(c.n_rnd_step_good <= c.n_rnd_step);
        assert!(c.n_side_step_good <= c.n_side_step);
        let added: usize = engine.trees().iter().map(|t| t.len() - 1).sum();
        assert_eq!(added, c.n_forward_step_good + c.n_back_step_good + c.n_rnd_step_good);
    }

    #[test]
    fn exhausted_budget_is_reported() {
        // The goal is unreachable: a wall spans the whole box.
        let wall = StaticRectangularObstacle::new(s(4.0, -2.0), s(6.0, 2.0));
        let problem = ConfigurationProblem::new(
            Box::new(AnalyticValidityChecker::new(vec![wall])),
            [(-1.0, 11.0), (-1.0, 1.0)],
            None,
        )
        .unwrap();
        let mut engine = Engine::rrt(&config(5, 50), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        assert!(engine.plan_connect(&problem).is_none());
        assert_eq!(engine.counters().iters, 50);
        assert_eq!(engine.step_connect(&problem), StepStatus::Exhausted);
        assert!(!engine.was_cancelled());

        // Another call grants another budget.
        assert!(engine.plan_connect(&problem).is_none());
        assert_eq!(engine.counters().iters, 100);
    }

    #[test]
    fn rrt_star_merges_and_improves() {
        let problem = corridor();
        let mut engine =
            Engine::rrt_star(&config(21, 600), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        let mut best = f64::INFINITY;
        for _ in 0..600 {
            engine.step_connect(&problem);
            if let Some(cost) = engine.best_cost() {
                assert!(cost <= best + 1e-9);
                best = cost;
            }
        }
        assert!(engine.counters().n_merges >= 1);
        assert!(engine.goal_node().is_some());
        assert!(best >= 10.0 - 1e-9);
        let path = engine.path().unwrap();
        assert_eq!(path.first(), Some(&s(0.0, 0.0)));
        assert_eq!(path.last(), Some(&s(10.0, 0.0)));
        assert_relative_eq!(path_length(&path), best, epsilon = 1e-6);
        assert!(engine.trees().iter().all(|tree| tree.check_consistency()));
    }

    #[test]
    fn single_rrt_star_reaches_the_goal() {
        let problem = corridor();
        let mut engine =
            Engine::single_rrt_star(&config(8, 800), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        assert!(!engine.is_bidirectional());
        let path = engine.plan_connect(&problem).unwrap();
        assert_eq!(path.last(), Some(&s(10.0, 0.0)));
        // Optimizing policies use the whole budget.
        assert_eq!(engine.counters().iters, 800);
        assert!(engine.trees()[0].check_consistency());
    }

    #[test]
    fn plan_forward_grows_a_single_tree() {
        let problem = corridor();
        let mut engine = Engine::rrt(&config(4, 2000), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        let path = engine.plan_forward(&problem, s(1.0, 0.0), s(6.0, 0.5)).unwrap();
        assert!(!engine.is_bidirectional());
        assert_eq!(path.first(), Some(&s(1.0, 0.0)));
        assert_eq!(path.last(), Some(&s(6.0, 0.5)));
    }

    #[test]
    fn cancellation_stops_planning() {
        let problem = corridor();
        let mut engine = Engine::rrt(&config(2, 1000), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        engine.cancel_flag().store(true, Ordering::Relaxed);
        assert!(engine.plan_connect(&problem).is_none());
        assert!(engine.was_cancelled());
        assert_eq!(engine.counters().iters, 0);

        engine.cancel_flag().store(false, Ordering::Relaxed);
        assert!(engine.plan_connect(&problem).is_some());
        assert!(!engine.was_cancelled());
    }

    #[test]
    fn plan_until_respects_the_termination() {
        let problem = corridor();
        let mut engine =
            Engine::rrt_star(&config(6, 5000), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        engine.plan_until(&problem, &mut MaxIterationsTermination::new(40));
        assert_eq!(engine.counters().iters, 40);
    }

    #[test]
    fn steps_after_plan_until_are_bounded() {
        let problem = corridor();
        let mut engine =
            Engine::rrt_star(&config(6, 30), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        engine.plan_until(&problem, &mut MaxIterationsTermination::new(100));
        assert_eq!(engine.counters().iters, 100);
        let statuses: Vec<StepStatus> = (0..31).map(|_| engine.step_connect(&problem)).collect();
        assert!(statuses[..30].iter().all(|status| *status != StepStatus::Exhausted));
        assert_eq!(statuses[30], StepStatus::Exhausted);
        assert_eq!(engine.counters().iters, 130);
    }

    #[test]
    fn engines_work_in_single_precision() {
        let problem = ConfigurationProblem::<f32, 2>::new(
            Box::new(AlwaysValid::new()),
            [(-1.0, 11.0), (-1.0, 1.0)],
            None,
        )
        .unwrap();
        let mut engine = GrowthEngine::<f32, 2, KdTreeNearestNeighbors<f32, 2>>::rrt(
            &config(12, 1000),
            &problem,
            RealVectorState::new([0.0, 0.0]),
            RealVectorState::new([10.0, 0.0]),
        )
        .unwrap();
        let path = engine.plan_connect(&problem).unwrap();
        assert_eq!(path.last(), Some(&RealVectorState::new([10.0f32, 0.0])));
    }

    /// Rejects edges that cross `x = 5.5` towards larger x; the reverse direction is free.
    struct OneWayGate;

    impl ValidityChecker<f64, 2> for OneWayGate {
        fn query(&self, _state: &RealVectorState<f64, 2>) -> QueryResult<f64, 2> {
            QueryResult::feasible()
        }

        fn is_edge_valid(&self, a: &RealVectorState<f64, 2>, b: &RealVectorState<f64, 2>) -> bool {
            !(a[0] < 5.5 && b[0] > 5.5)
        }
    }

    #[test]
    fn infeasible_reversed_edge_rolls_the_merge_back() {
        let problem =
            ConfigurationProblem::new(Box::new(OneWayGate), [(-1.0, 11.0), (-1.0, 1.0)], None)
                .unwrap();
        let mut engine =
            Engine::rrt_star(&config(1, 10), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        // The goal tree grew leftwards through the gate, which is allowed in that direction.
        let a = engine.trees[0].add(s(4.0, 0.0), 0, QueryResult::feasible());
        let b = engine.trees[1].add(s(6.0, 0.0), 0, QueryResult::feasible());
        let c = engine.trees[1].add(s(5.0, 0.0), b, QueryResult::feasible());

        let before: Vec<(Option<usize>, f64)> = (0..engine.trees[0].len())
            .map(|i| (engine.trees[0].parent(i), engine.trees[0].cost(i)))
            .collect();
        let connection = Connection {
            start_node: a,
            goal_node: c,
        };
        assert!(!engine.merge_trees(&problem, connection));

        assert_eq!(engine.counters().n_merge_rollbacks, 1);
        assert_eq!(engine.counters().n_merges, 0);
        assert!(!engine.solved());
        let after: Vec<(Option<usize>, f64)> = (0..engine.trees[0].len())
            .map(|i| (engine.trees[0].parent(i), engine.trees[0].cost(i)))
            .collect();
        assert_eq!(after, before);
        assert!(engine.spliced.is_empty());
        assert!(engine.trees().iter().all(|tree| tree.check_consistency()));
    }

    #[test]
    fn feasible_merge_commits_the_goal_branch() {
        let problem = corridor();
        let mut engine =
            Engine::rrt_star(&config(1, 10), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        let a = engine.trees[0].add(s(4.0, 0.0), 0, QueryResult::feasible());
        let b = engine.trees[1].add(s(6.0, 0.0), 0, QueryResult::feasible());
        let c = engine.trees[1].add(s(5.0, 0.0), b, QueryResult::feasible());
        let connection = Connection {
            start_node: a,
            goal_node: c,
        };
        assert!(engine.merge_trees(&problem, connection));

        assert_eq!(engine.counters().n_merges, 1);
        assert_eq!(engine.counters().n_merge_rollbacks, 0);
        let goal_node = engine.goal_node().unwrap();
        assert_eq!(engine.trees()[0].state(goal_node), &s(10.0, 0.0));
        assert_relative_eq!(engine.best_cost().unwrap(), 10.0, epsilon = 1e-9);
        assert!(engine.trees()[0].check_consistency());
    }

    #[test]
    #[allow(deprecated)]
    fn deprecated_run_uses_a_time_budget() {
        let problem = corridor();
        let mut engine =
            Engine::rrt(&config(9, 5000), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        assert!(engine.run(&problem, 5.0).is_some());
    }

    #[test]
    fn observer_mirrors_the_trees() {
        let problem = corridor();
        let cache = Arc::new(DisplayCache::<f64, 2>::new());
        let mut engine = GrowthEngine::<f64, 2, LinearNearestNeighbors<f64, 2>>::rrt_star(
            &config(13, 300),
            &problem,
            s(0.0, 0.0),
            s(10.0, 0.0),
        )
        .unwrap();
        engine.set_observer(cache.clone());
        engine.plan_connect(&problem);

        for (side, tree) in [TreeSide::Start, TreeSide::Goal].into_iter().zip(engine.trees()) {
            assert_eq!(cache.len(side), tree.len());
            let edges = cache.edges(side);
            assert_eq!(edges.len(), tree.len() - 1);
            for index in 1..tree.len() {
                let parent = tree.parent(index).unwrap();
                assert!(edges.contains(&(*tree.state(parent), *tree.state(index))));
            }
        }
    }

    #[test]
    fn observer_forgets_discarded_trees() {
        let problem = corridor();
        let cache = Arc::new(DisplayCache::<f64, 2>::new());
        let mut engine =
            Engine::rrt_star(&config(14, 300), &problem, s(0.0, 0.0), s(10.0, 0.0)).unwrap();
        engine.set_observer(cache.clone());
        engine.plan_connect(&problem);
        assert!(cache.len(TreeSide::Goal) > 1);

        engine.plan_forward(&problem, s(1.0, 0.0), s(3.0, 0.0));
        assert!(!engine.is_bidirectional());
        assert_eq!(cache.len(TreeSide::Start), engine.trees()[0].len());
        assert!(cache.is_empty(TreeSide::Goal));
        assert_eq!(cache.edges(TreeSide::Start).len(), engine.trees()[0].len() - 1);
    }
}
