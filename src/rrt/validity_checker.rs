use crate::rrt::state::RealVectorState;
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// The answer of a feasibility query for a single state.
///
/// Infeasible results carry enough local geometry to derive a side-step: how deep the
/// state penetrates an obstacle and, when known, the unit direction that leads out of it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueryResult<F: Float, const N: usize> {
    pub feasible: bool,
    /// Penetration depth into the worst obstacle (zero when feasible).
    pub penetration: F,
    /// Unit direction leading out of collision, if the checker can compute one.
    pub escape_direction: Option<RealVectorState<F, N>>,
}

impl<F: Float, const N: usize> QueryResult<F, N> {
    pub fn feasible() -> Self {
        Self {
            feasible: true,
            penetration: F::zero(),
            escape_direction: None,
        }
    }

    pub fn colliding(penetration: F, escape_direction: Option<RealVectorState<F, N>>) -> Self {
        Self {
            feasible: false,
            penetration,
            escape_direction: escape_direction.and_then(|d| d.normalized()),
        }
    }

    pub fn is_feasible(&self) -> bool {
        self.feasible
    }

    /// Feasibility with a collision tolerance: shallow penetrations are accepted.
    pub fn is_feasible_within(&self, tolerance: F) -> bool {
        self.feasible || self.penetration <= tolerance
    }

    /// Merges the results of several checks on the same state.
    ///
    /// The combined escape direction is the penetration-weighted sum of the individual
    /// escape directions, so a state wedged between two obstacles is pushed along the
    /// gap between them.
    pub fn combine<I: IntoIterator<Item = Self>>(results: I) -> Self {
        let mut combined = Self::feasible();
        let mut escape = RealVectorState::zeros();
        let mut has_escape = false;
        for result in results.into_iter().filter(|r| !r.feasible) {
            combined.feasible = false;
            combined.penetration = combined.penetration.max(result.penetration);
            if let Some(direction) = result.escape_direction {
                let weight = result.penetration.max(F::epsilon());
                escape = &escape + &(direction * weight);
                has_escape = true;
            }
        }
        if has_escape {
            combined.escape_direction = escape.normalized();
        }
        combined
    }
}

/// Checks if a state or edge is valid (i.e., not in collision).
///
/// Implementations must be deterministic and free of side effects, since the tree caches
/// one query result per node.
pub trait ValidityChecker<F: Float, const N: usize> {
    /// Queries the feasibility of a state together with its local collision geometry.
    fn query(&self, state: &RealVectorState<F, N>) -> QueryResult<F, N>;

    /// Checks if a state is valid (i.e., does not collide with obstacles).
    fn is_state_valid(&self, state: &RealVectorState<F, N>) -> bool {
        self.query(state).is_feasible()
    }

    /// Checks if an edge is valid (i.e., does not collide with obstacles).
    ///
    /// Parameters:
    /// - `a`: The start point of the edge.
    /// - `b`: The end point of the edge.
    fn is_edge_valid(&self, a: &RealVectorState<F, N>, b: &RealVectorState<F, N>) -> bool;

    /// Narrows the checked geometry to the given named pairs. Checkers without named
    /// geometry ignore this.
    fn restrict_to_pairs(&mut self, _pairs: &[(String, String)]) {}
}

/// A simple validity checker that always returns true (i.e., all points and edges are valid).
pub struct AlwaysValid<F: Float, const N: usize> {
    _phantom: std::marker::PhantomData<F>,
}

impl<F: Float, const N: usize> AlwaysValid<F, N> {
    /// Constructs a new AlwaysValid.
    pub fn new() -> Self {
        Self {
            _phantom: std::marker::PhantomData,
        }
    }
}

impl<F: Float, const N: usize> Default for AlwaysValid<F, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float, const N: usize> ValidityChecker<F, N> for AlwaysValid<F, N> {
    fn query(&self, _state: &RealVectorState<F, N>) -> QueryResult<F, N> {
        QueryResult::feasible()
    }

    fn is_edge_valid(&self, _a: &RealVectorState<F, N>, _b: &RealVectorState<F, N>) -> bool {
        true
    }
}

/// A validity checker that takes the union of multiple validity checkers.
/// If any of the checkers return false, the point or edge is considered invalid.
pub struct UnionValidityChecker<F: Float, const N: usize> {
    checkers: Vec<Box<dyn ValidityChecker<F, N>>>,
}

impl<F: Float, const N: usize> UnionValidityChecker<F, N> {
    /// Constructs a new UnionValidityChecker with an empty list of checkers.
    pub fn new() -> Self {
        Self {
            checkers: Vec::new(),
        }
    }

    /// Adds a new validity checker to the union.
    pub fn add_checker(&mut self, checker: Box<dyn ValidityChecker<F, N>>) {
        self.checkers.push(checker);
    }
}

impl<F: Float, const N: usize> Default for UnionValidityChecker<F, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float, const N: usize> ValidityChecker<F, N> for UnionValidityChecker<F, N> {
    fn query(&self, state: &RealVectorState<F, N>) -> QueryResult<F, N> {
        QueryResult::combine(self.checkers.iter().map(|checker| checker.query(state)))
    }

    fn is_state_valid(&self, state: &RealVectorState<F, N>) -> bool {
        self.checkers
            .iter()
            .all(|checker| checker.is_state_valid(state))
    }

    fn is_edge_valid(&self, a: &RealVectorState<F, N>, b: &RealVectorState<F, N>) -> bool {
        self.checkers
            .iter()
            .all(|checker| checker.is_edge_valid(a, b))
    }

    fn restrict_to_pairs(&mut self, pairs: &[(String, String)]) {
        for checker in self.checkers.iter_mut() {
            checker.restrict_to_pairs(pairs);
        }
    }
}
