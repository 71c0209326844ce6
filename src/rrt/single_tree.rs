use crate::rrt::neighbors::NearestNeighbors;
use crate::rrt::problem::ConfigurationProblem;
use crate::rrt::state::RealVectorState;
use crate::rrt::validity_checker::QueryResult;
use log::warn;
use num_traits::Float;
use rand::Rng;

/// Maximum number of chained side-steps for a single sample.
pub const MAX_SIDE_STEP_DEPTH: usize = 3;

/// A node in the search tree.
#[derive(Clone, Debug)]
pub struct Node<F: Float, const N: usize> {
    /// The state in N-dimensional space.
    state: RealVectorState<F, N>,
    /// The index of the parent node (None if the node is the root).
    parent: Option<usize>,
    /// The indices of the children nodes.
    children: Vec<usize>,
    /// The cost of the edge from the parent to this node.
    parent_cost: F,
    /// Cost of the path from the root to this node.
    total_cost: F,
    /// The oracle answer for this exact state.
    query: QueryResult<F, N>,
}

impl<F: Float, const N: usize> Node<F, N> {
    pub fn state(&self) -> &RealVectorState<F, N> {
        &self.state
    }

    pub fn parent(&self) -> Option<usize> {
        self.parent
    }

    pub fn children(&self) -> &[usize] {
        &self.children
    }

    pub fn parent_cost(&self) -> F {
        self.parent_cost
    }

    pub fn total_cost(&self) -> F {
        self.total_cost
    }

    pub fn query(&self) -> &QueryResult<F, N> {
        &self.query
    }
}

/// A candidate state on the segment from the nearest tree node towards a target.
#[derive(Clone, Debug, PartialEq)]
pub struct Proposal<F: Float, const N: usize> {
    pub state: RealVectorState<F, N>,
    /// Index of the nearest node, the parent of the candidate.
    pub nearest: usize,
    /// Distance from the nearest node to the target.
    pub distance: F,
}

/// A queried candidate produced by [`SingleTree::new_sample`].
#[derive(Clone, Debug)]
pub struct Sample<F: Float, const N: usize> {
    pub state: RealVectorState<F, N>,
    pub query: QueryResult<F, N>,
    pub parent: usize,
    pub is_side_step: bool,
}

/// A search tree: an append-only arena of nodes plus a spatial index over their states.
///
/// Node `i` of the arena is item `i` of the index. Nodes are never removed, only
/// re-parented, and node 0 is the root.
#[derive(Clone)]
pub struct SingleTree<F: Float, const N: usize, NN: NearestNeighbors<F, N>> {
    nodes: Vec<Node<F, N>>,
    nearest_neighbors: NN,
}

impl<F: Float, const N: usize, NN: NearestNeighbors<F, N>> SingleTree<F, N, NN> {
    /// Seeds a tree with a single root node of cost zero.
    pub fn new(root: RealVectorState<F, N>, root_query: QueryResult<F, N>) -> Self {
        let mut nearest_neighbors = NN::new();
        nearest_neighbors.add(root, 0);
        Self {
            nodes: vec![Node {
                state: root,
                parent: None,
                children: Vec::new(),
                parent_cost: F::zero(),
                total_cost: F::zero(),
                query: root_query,
            }],
            nearest_neighbors,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// A tree always holds its root.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Node<F, N>] {
        &self.nodes
    }

    pub fn node(&self, index: usize) -> &Node<F, N> {
        &self.nodes[index]
    }

    pub fn state(&self, index: usize) -> &RealVectorState<F, N> {
        &self.nodes[index].state
    }

    pub fn parent(&self, index: usize) -> Option<usize> {
        self.nodes[index].parent
    }

    pub fn cost(&self, index: usize) -> F {
        self.nodes[index].total_cost
    }

    pub fn parent_cost(&self, index: usize) -> F {
        self.nodes[index].parent_cost
    }

    pub fn query(&self, index: usize) -> &QueryResult<F, N> {
        &self.nodes[index].query
    }

    /// Index of the most recently added node.
    pub fn last(&self) -> usize {
        self.nodes.len() - 1
    }

    pub fn random_node<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        rng.gen_range(0..self.nodes.len())
    }

    /// Number of edges between the node and the root.
    pub fn depth(&self, index: usize) -> usize {
        let mut depth = 0;
        let mut current = index;
        while let Some(parent) = self.nodes[current].parent {
            depth += 1;
            current = parent;
        }
        depth
    }

    /// The closest node to `target` and its distance.
    pub fn nearest(&self, target: &RealVectorState<F, N>) -> (usize, F) {
        self.nearest_neighbors
            .nearest_one_with_distance(target)
            .unwrap_or_else(|| (0, self.nodes[0].state.euclidean_distance(target)))
    }

    /// Finds the nearest node to `target` and the state one step towards it.
    ///
    /// The proposal never overshoots: it lies at distance `min(stepsize, distance)` from
    /// the nearest node.
    pub fn find_nearest_and_propose(
        &self,
        target: &RealVectorState<F, N>,
        stepsize: F,
    ) -> Proposal<F, N> {
        let (nearest, distance) = self.nearest(target);
        let from = &self.nodes[nearest].state;
        let state = if distance > stepsize {
            from.interpolate(target, stepsize / distance)
        } else {
            *target
        };
        Proposal {
            state,
            nearest,
            distance,
        }
    }

    /// Proposes and queries a new state towards `target`.
    ///
    /// If the straight proposal is infeasible, then with probability `p_side_step` a
    /// side-step is attempted from the same parent, perpendicular to the blocked direction
    /// (see [`side_step_direction`]). Side-steps chain up to [`MAX_SIDE_STEP_DEPTH`] times.
    ///
    /// Returns None for a degenerate proposal (the target coincides with a node) or when
    /// the side-step chain runs out of depth. An infeasible sample is returned as is when
    /// no side-step is taken; the caller decides what to do with it.
    pub fn new_sample<R: Rng + ?Sized>(
        &self,
        target: &RealVectorState<F, N>,
        stepsize: F,
        p_side_step: f64,
        problem: &ConfigurationProblem<F, N>,
        rng: &mut R,
        recursion_depth: usize,
    ) -> Option<Sample<F, N>> {
        let proposal = self.find_nearest_and_propose(target, stepsize);
        if proposal.distance <= F::epsilon() {
            return None;
        }
        self.sample_from(
            proposal.nearest,
            proposal.state,
            stepsize,
            p_side_step,
            problem,
            rng,
            recursion_depth,
            false,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn sample_from<R: Rng + ?Sized>(
        &self,
        parent: usize,
        candidate: RealVectorState<F, N>,
        stepsize: F,
        p_side_step: f64,
        problem: &ConfigurationProblem<F, N>,
        rng: &mut R,
        recursion_depth: usize,
        is_side_step: bool,
    ) -> Option<Sample<F, N>> {
        let query = problem.query(&candidate);
        let sample = Sample {
            state: candidate,
            query,
            parent,
            is_side_step,
        };
        if problem.is_feasible(&sample.query) || p_side_step <= 0.0 {
            return Some(sample);
        }
        if recursion_depth >= MAX_SIDE_STEP_DEPTH {
            return None;
        }
        if rng.gen::<f64>() >= p_side_step {
            return Some(sample);
        }

        let origin = self.nodes[parent].state;
        let Some(direction) = side_step_direction(&sample.query, &(candidate - origin)) else {
            return Some(sample);
        };
        self.sample_from(
            parent,
            &origin + &(direction * stepsize),
            stepsize,
            p_side_step,
            problem,
            rng,
            recursion_depth + 1,
            true,
        )
    }

    /// Appends a node as a child of `parent` and returns its index.
    ///
    /// The caller is responsible for having validated the state and the edge.
    pub fn add(
        &mut self,
        state: RealVectorState<F, N>,
        parent: usize,
        query: QueryResult<F, N>,
    ) -> usize {
        let index = self.nodes.len();
        let parent_cost = state.euclidean_distance(&self.nodes[parent].state);
        let total_cost = self.nodes[parent].total_cost + parent_cost;
        self.nodes.push(Node {
            state,
            parent: Some(parent),
            children: Vec::new(),
            parent_cost,
            total_cost,
            query,
        });
        self.nodes[parent].children.push(index);
        self.nearest_neighbors.add(state, index);
        index
    }

    /// Returns the states from the root to the given node.
    pub fn path_from_node(&self, from: usize) -> Vec<RealVectorState<F, N>> {
        let mut path = Vec::with_capacity(self.depth(from) + 1);
        let mut current = from;

        // Reconstruct the path by backtracking up the tree (following the parent pointers).
        while let Some(parent) = self.nodes[current].parent {
            path.push(self.nodes[current].state);
            current = parent;
        }
        path.push(self.nodes[current].state);

        // Reverse the path so that it goes from the root to the node.
        path.reverse();
        path
    }

    /// Indices of all nodes within `radius` of `state`.
    pub fn neighbors(&self, state: &RealVectorState<F, N>, radius: F) -> Vec<usize> {
        self.nearest_neighbors.within_radius(state, radius)
    }

    /// Whether `ancestor` lies on the path from `node` to the root (a node is its own ancestor).
    pub fn is_ancestor(&self, ancestor: usize, node: usize) -> bool {
        let mut current = Some(node);
        while let Some(index) = current {
            if index == ancestor {
                return true;
            }
            current = self.nodes[index].parent;
        }
        false
    }

    /// Re-parents `node` under `new_parent` with the given edge cost and updates the total
    /// cost of the whole subtree below it.
    ///
    /// Returns false and leaves the tree untouched when the change would detach the root
    /// or create a cycle.
    pub fn change_parent(&mut self, node: usize, new_parent: usize, new_edge_cost: F) -> bool {
        let Some(old_parent) = self.nodes[node].parent else {
            warn!("[SingleTree] refusing to re-parent the root");
            return false;
        };
        if self.is_ancestor(node, new_parent) {
            warn!(
                "[SingleTree] refusing to re-parent node {} under its descendant {}",
                node, new_parent
            );
            return false;
        }

        self.nodes[old_parent].children.retain(|&c| c != node);
        self.nodes[new_parent].children.push(node);
        self.nodes[node].parent = Some(new_parent);
        self.nodes[node].parent_cost = new_edge_cost;
        self.nodes[node].total_cost = self.nodes[new_parent].total_cost + new_edge_cost;
        self.propagate_costs(node);
        true
    }

    /// Recomputes the total cost of every descendant of `node` from its parent, so no
    /// stale value survives a re-parenting.
    fn propagate_costs(&mut self, node: usize) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let base = self.nodes[current].total_cost;
            for k in 0..self.nodes[current].children.len() {
                let child = self.nodes[current].children[k];
                self.nodes[child].total_cost = base + self.nodes[child].parent_cost;
                stack.push(child);
            }
        }
    }

    /// Checks the structural invariants: a single root at index 0, consistent child lists,
    /// no cycles, and `total_cost[i] == total_cost[parent[i]] + parent_cost[i]`.
    pub fn check_consistency(&self) -> bool {
        if self.nodes.is_empty() || self.nodes[0].parent.is_some() {
            return false;
        }
        if self.nodes[0].total_cost != F::zero() || self.nearest_neighbors.len() != self.nodes.len() {
            return false;
        }
        let tolerance = F::from(1e-9).unwrap();
        for (i, node) in self.nodes.iter().enumerate().skip(1) {
            let Some(parent) = node.parent else {
                return false;
            };
            if !self.nodes[parent].children.contains(&i) {
                return false;
            }
            let expected = self.nodes[parent].total_cost + node.parent_cost;
            if (node.total_cost - expected).abs() > tolerance * (F::one() + expected.abs()) {
                return false;
            }
            // A walk to the root longer than the tree means a cycle.
            let mut steps = 0;
            let mut current = i;
            while let Some(p) = self.nodes[current].parent {
                steps += 1;
                if steps > self.nodes.len() {
                    return false;
                }
                current = p;
            }
        }
        self.nodes.iter().enumerate().all(|(i, node)| {
            node.children
                .iter()
                .all(|&c| self.nodes[c].parent == Some(i))
        })
    }
}

/// The side-step direction for an infeasible query, given the blocked forward direction.
///
/// The oracle's escape direction is projected onto the hyperplane orthogonal to the
/// forward direction and normalized, which slides along the obstacle surface instead of
/// backing away from the target. A head-on contact (escape anti-parallel to forward) has
/// no projection; then the axis least aligned with forward is used. Returns None if the
/// query has no escape direction or no perpendicular exists (one dimension).
pub fn side_step_direction<F: Float, const N: usize>(
    query: &QueryResult<F, N>,
    forward: &RealVectorState<F, N>,
) -> Option<RealVectorState<F, N>> {
    let escape = query.escape_direction?;
    let Some(forward) = forward.normalized() else {
        return Some(escape);
    };
    let tangent = escape - forward * escape.dot(&forward);
    let scale = F::from(1e-6).unwrap();
    if tangent.norm() > scale {
        return tangent.normalized();
    }
    if N < 2 {
        return None;
    }
    let axis = (0..N).min_by(|&a, &b| {
        forward[a]
            .abs()
            .partial_cmp(&forward[b].abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;
    let mut unit = RealVectorState::zeros();
    unit[axis] = F::one();
    (unit - forward * forward[axis]).normalized()
}
