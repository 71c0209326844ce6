use crate::rrt::state::RealVectorState;
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Which of the two trees of a bidirectional search an event refers to.
/// Single-direction searches only use `Start`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TreeSide {
    Start,
    Goal,
}

impl TreeSide {
    pub fn index(self) -> usize {
        match self {
            TreeSide::Start => 0,
            TreeSide::Goal => 1,
        }
    }

    pub fn other(self) -> Self {
        match self {
            TreeSide::Start => TreeSide::Goal,
            TreeSide::Goal => TreeSide::Start,
        }
    }
}

/// Receives tree growth events, e.g. for visualization.
///
/// Observers are called from the planning thread and must not block for long.
pub trait TreeObserver<F: Float, const N: usize> {
    fn node_added(
        &self,
        side: TreeSide,
        index: usize,
        state: &RealVectorState<F, N>,
        parent: Option<usize>,
    );

    fn parent_changed(&self, _side: TreeSide, _index: usize, _new_parent: usize) {}

    /// The tree on `side` was discarded; the nodes reported next rebuild it from index 0.
    fn tree_cleared(&self, _side: TreeSide) {}
}

#[derive(Default)]
struct DisplayTrees<F: Float, const N: usize> {
    nodes: [Vec<(RealVectorState<F, N>, Option<usize>)>; 2],
}

/// A mutex-guarded copy of both trees, written by the planner and read by a renderer.
pub struct DisplayCache<F: Float, const N: usize> {
    trees: Mutex<DisplayTrees<F, N>>,
}

impl<F: Float, const N: usize> Default for DisplayCache<F, N> {
    fn default() -> Self {
        Self {
            trees: Mutex::new(DisplayTrees {
                nodes: [Vec::new(), Vec::new()],
            }),
        }
    }
}

impl<F: Float, const N: usize> DisplayCache<F, N> {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_trees<T>(&self, f: impl FnOnce(&mut DisplayTrees<F, N>) -> T) -> T {
        // A panicking renderer must not take the planner down with it.
        let mut guard = self.trees.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    pub fn len(&self, side: TreeSide) -> usize {
        self.with_trees(|trees| trees.nodes[side.index()].len())
    }

    pub fn is_empty(&self, side: TreeSide) -> bool {
        self.len(side) == 0
    }

    /// Copies the edges (parent state, child state) of one tree.
    pub fn edges(&self, side: TreeSide) -> Vec<(RealVectorState<F, N>, RealVectorState<F, N>)> {
        self.with_trees(|trees| {
            let nodes = &trees.nodes[side.index()];
            nodes
                .iter()
                .filter_map(|(state, parent)| {
                    parent
                        .and_then(|p| nodes.get(p))
                        .map(|(parent_state, _)| (*parent_state, *state))
                })
                .collect()
        })
    }

    /// Copies the nodes of both trees as (state, parent) pairs, start tree first.
    #[allow(clippy::type_complexity)]
    pub fn snapshot(&self) -> [Vec<(RealVectorState<F, N>, Option<usize>)>; 2] {
        self.with_trees(|trees| trees.nodes.clone())
    }
}

impl<F: Float, const N: usize> TreeObserver<F, N> for DisplayCache<F, N> {
    fn node_added(
        &self,
        side: TreeSide,
        index: usize,
        state: &RealVectorState<F, N>,
        parent: Option<usize>,
    ) {
        self.with_trees(|trees| {
            let nodes = &mut trees.nodes[side.index()];
            if index >= nodes.len() {
                nodes.resize(index + 1, (*state, None));
            }
            nodes[index] = (*state, parent);
        });
    }

    fn parent_changed(&self, side: TreeSide, index: usize, new_parent: usize) {
        self.with_trees(|trees| {
            if let Some(node) = trees.nodes[side.index()].get_mut(index) {
                node.1 = Some(new_parent);
            }
        });
    }

    fn tree_cleared(&self, side: TreeSide) {
        self.with_trees(|trees| trees.nodes[side.index()].clear());
    }
}
