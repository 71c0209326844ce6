use crate::rrt::state::RealVectorState;
use crate::util::ordered_float::OrderedFloat;
use kiddo::float::{distance::SquaredEuclidean, kdtree::Axis, kdtree::KdTree};
use num_traits::Float;

/// A trait for a nearest neighbor data structure that supports nearest neighbors and radius queries.
/// Stores RealVectorStates and a usize index along with them.
///
/// Insertion is incremental; indices handed out earlier stay valid.
pub trait NearestNeighbors<F: Float, const N: usize>: Clone {
    /// Constructs a new nearest neighbor data structure.
    /// The data structure is empty initially.
    fn new() -> Self;

    /// Adds a state to the data structure.
    ///
    /// Parameters:
    /// - `state`: The RealVectorState to add.
    /// - `item`: The index of the RealVectorState.
    fn add(&mut self, state: RealVectorState<F, N>, item: usize);

    /// Gets the nearest neighbor to the given RealVectorState and its Euclidean distance.
    ///
    /// Returns None if the data structure is empty.
    fn nearest_one_with_distance(&self, state: &RealVectorState<F, N>) -> Option<(usize, F)>;

    /// Gets the item/index of the nearest neighbor, if any.
    fn nearest_one(&self, state: &RealVectorState<F, N>) -> Option<usize> {
        self.nearest_one_with_distance(state).map(|(item, _)| item)
    }

    /// Gets all RealVectorStates within a given radius of the given RealVectorState.
    ///
    /// Returns:
    /// The items/indices of the RealVectorStates within the radius.
    fn within_radius(&self, state: &RealVectorState<F, N>, radius: F) -> Vec<usize>;

    /// Number of stored states.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A nearest neighbor data structure that uses a linear search to find the nearest neighbors.
/// This is useful for small datasets. Ties resolve to the earliest inserted state.
#[derive(Clone)]
pub struct LinearNearestNeighbors<F: Float, const N: usize> {
    states: Vec<(RealVectorState<F, N>, usize)>,
}

impl<F: Float, const N: usize> NearestNeighbors<F, N> for LinearNearestNeighbors<F, N> {
    fn new() -> Self {
        Self { states: Vec::new() }
    }

    fn add(&mut self, state: RealVectorState<F, N>, item: usize) {
        self.states.push((state, item));
    }

    fn nearest_one_with_distance(&self, state: &RealVectorState<F, N>) -> Option<(usize, F)> {
        self.states
            .iter()
            .map(|(p, i)| (*i, state.euclidean_distance_squared(p)))
            .min_by_key(|&(_, d)| OrderedFloat::from(d))
            .map(|(i, d)| (i, d.sqrt()))
    }

    fn within_radius(&self, state: &RealVectorState<F, N>, radius: F) -> Vec<usize> {
        self.states
            .iter()
            .filter(|(p, _)| state.euclidean_distance_squared(p) <= radius * radius)
            .map(|(_, i)| *i)
            .collect()
    }

    fn len(&self) -> usize {
        self.states.len()
    }
}

#[derive(Clone)]
pub struct KdTreeNearestNeighbors<F: Float + Axis, const N: usize> {
    kdtree: KdTree<F, usize, N, 32, u32>,
    len: usize,
}

impl<F: Float + Axis, const N: usize> NearestNeighbors<F, N> for KdTreeNearestNeighbors<F, N> {
    fn new() -> Self {
        Self {
            kdtree: KdTree::new(),
            len: 0,
        }
    }

    fn add(&mut self, state: RealVectorState<F, N>, item: usize) {
        self.kdtree.add(state.values(), item);
        self.len += 1;
    }

    fn nearest_one_with_distance(&self, state: &RealVectorState<F, N>) -> Option<(usize, F)> {
        if self.len == 0 {
            return None;
        }
        let neighbor = self.kdtree.nearest_one::<SquaredEuclidean>(state.values());
        Some((neighbor.item, neighbor.distance.sqrt()))
    }

    fn within_radius(&self, state: &RealVectorState<F, N>, radius: F) -> Vec<usize> {
        self.kdtree
            .within_unsorted::<SquaredEuclidean>(state.values(), radius * radius)
            .iter()
            .map(|n| n.item)
            .collect()
    }

    fn len(&self) -> usize {
        self.len
    }
}
