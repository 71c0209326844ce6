use crate::rrt::state::RealVectorState;
use crate::rrt::validity_checker::{QueryResult, ValidityChecker};
use num_traits::Float;

/// A trait for analytic obstacles in N-dimensional space.
/// Analytic obstacles have exact functions for containment and intersection checks.
/// They do not require discrete sampling or approximation.
pub trait AnalyticObstacle<F: Float, const N: usize> {
    fn contains(&self, state: &RealVectorState<F, N>) -> bool;
    fn intersects_edge(&self, start: &RealVectorState<F, N>, end: &RealVectorState<F, N>) -> bool;

    /// Penetration depth and outward contact normal for a contained state.
    /// Returns None when the state is outside the obstacle.
    fn penetration(&self, state: &RealVectorState<F, N>) -> Option<(F, RealVectorState<F, N>)>;
}

/// A validity checker that uses analytic obstacles to check for collisions.
/// It implements the ValidityChecker trait.
///
/// Obstacles may carry a name; named obstacles can be excluded from checking with
/// [`ValidityChecker::restrict_to_pairs`].
pub struct AnalyticValidityChecker<F: Float, const N: usize, O: AnalyticObstacle<F, N>> {
    obstacles: Vec<(Option<String>, O)>,
    active: Vec<bool>,
    _phantom: std::marker::PhantomData<F>,
}

impl<F: Float, const N: usize, O: AnalyticObstacle<F, N>> AnalyticValidityChecker<F, N, O> {
    /// Creates a new `AnalyticValidityChecker` with the given obstacles.
    pub fn new(obstacles: Vec<O>) -> Self {
        Self::from_entries(obstacles.into_iter().map(|o| (None, o)).collect())
    }

    /// Creates a checker whose obstacles are addressable by name.
    pub fn new_named(obstacles: Vec<(String, O)>) -> Self {
        Self::from_entries(obstacles.into_iter().map(|(n, o)| (Some(n), o)).collect())
    }

    fn from_entries(obstacles: Vec<(Option<String>, O)>) -> Self {
        let active = vec![true; obstacles.len()];
        Self {
            obstacles,
            active,
            _phantom: std::marker::PhantomData,
        }
    }

    fn active_obstacles(&self) -> impl Iterator<Item = &O> {
        self.obstacles
            .iter()
            .zip(self.active.iter())
            .filter(|(_, active)| **active)
            .map(|((_, obstacle), _)| obstacle)
    }
}

impl<F: Float, const N: usize, O: AnalyticObstacle<F, N>> ValidityChecker<F, N>
    for AnalyticValidityChecker<F, N, O>
{
    fn query(&self, state: &RealVectorState<F, N>) -> QueryResult<F, N> {
        QueryResult::combine(self.active_obstacles().filter_map(|obstacle| {
            obstacle
                .penetration(state)
                .map(|(depth, normal)| QueryResult::colliding(depth, Some(normal)))
        }))
    }

    fn is_state_valid(&self, state: &RealVectorState<F, N>) -> bool {
        self.active_obstacles()
            .all(|obstacle| !obstacle.contains(state))
    }

    fn is_edge_valid(&self, start: &RealVectorState<F, N>, end: &RealVectorState<F, N>) -> bool {
        self.active_obstacles()
            .all(|obstacle| !obstacle.intersects_edge(start, end))
    }

    /// Keeps unnamed obstacles and the named ones that appear in any pair.
    fn restrict_to_pairs(&mut self, pairs: &[(String, String)]) {
        for ((name, _), active) in self.obstacles.iter().zip(self.active.iter_mut()) {
            *active = match name {
                None => true,
                Some(name) => pairs.iter().any(|(a, b)| a == name || b == name),
            };
        }
    }
}
