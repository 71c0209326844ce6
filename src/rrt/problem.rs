use crate::error::Result;
use crate::rrt::sampling::validate_ranges;
use crate::rrt::state::RealVectorState;
use crate::rrt::validity_checker::{QueryResult, ValidityChecker};
use num_traits::Float;
use std::cell::Cell;

/// Upper bound on the samples used to walk an edge out of a tolerated contact.
const CONTACT_WALK_STEPS: usize = 64;

/// The feasibility context a planner works in: the oracle, the box the configuration
/// space is sampled from, and the collision tolerance applied to oracle answers.
pub struct ConfigurationProblem<F: Float, const N: usize> {
    checker: Box<dyn ValidityChecker<F, N>>,
    ranges: [(F, F); N],
    collision_tolerance: F,
    n_queries: Cell<usize>,
}

impl<F: Float, const N: usize> ConfigurationProblem<F, N> {
    /// Parameters:
    /// - `checker`: The feasibility oracle.
    /// - `ranges`: (min, max) sampling bounds per axis.
    /// - `collision_tolerance`: Accepted penetration depth, zero when None or negative.
    pub fn new(
        checker: Box<dyn ValidityChecker<F, N>>,
        ranges: [(F, F); N],
        collision_tolerance: Option<F>,
    ) -> Result<Self> {
        validate_ranges(&ranges)?;
        Ok(Self {
            checker,
            ranges,
            collision_tolerance: collision_tolerance.unwrap_or_else(F::zero).max(F::zero()),
            n_queries: Cell::new(0),
        })
    }

    /// Queries the oracle for a single state.
    pub fn query(&self, state: &RealVectorState<F, N>) -> QueryResult<F, N> {
        self.n_queries.set(self.n_queries.get() + 1);
        self.checker.query(state)
    }

    /// Whether a query result is acceptable under the collision tolerance.
    pub fn is_feasible(&self, result: &QueryResult<F, N>) -> bool {
        result.is_feasible_within(self.collision_tolerance)
    }

    /// Checks the edge `from -> to`.
    ///
    /// Edges leaving a strictly feasible state must pass the oracle's exact edge check.
    /// Edges leaving a state that is only tolerated (shallow contact) are walked until
    /// they leave contact, with penetration never deeper than the tolerance or the
    /// source's own penetration, and the rest must pass the exact edge check. In both
    /// cases `subsample_checks` intermediate states, placed along the edge by a van der
    /// Corput sequence, must be feasible.
    pub fn is_edge_feasible(
        &self,
        from: &RealVectorState<F, N>,
        from_query: &QueryResult<F, N>,
        to: &RealVectorState<F, N>,
        subsample_checks: i32,
    ) -> bool {
        let exact = if from_query.is_feasible() {
            self.checker.is_edge_valid(from, to)
        } else {
            self.is_contact_edge_valid(from, from_query, to)
        };
        if !exact {
            return false;
        }
        (1..=subsample_checks.max(0) as u32).all(|k| {
            let t = F::from(van_der_corput(k)).unwrap();
            self.is_feasible(&self.query(&from.interpolate(to, t)))
        })
    }

    /// Walks an edge that starts in contact until it is free, then checks the remainder.
    fn is_contact_edge_valid(
        &self,
        from: &RealVectorState<F, N>,
        from_query: &QueryResult<F, N>,
        to: &RealVectorState<F, N>,
    ) -> bool {
        let depth = self.collision_tolerance.max(from_query.penetration);
        let length = (*to - *from).norm();
        if length <= F::zero() {
            return true;
        }
        let max_walk = F::from(CONTACT_WALK_STEPS).unwrap();
        let step = depth.max(length / max_walk);
        let mut travelled = F::zero();
        while travelled < length {
            travelled = (travelled + step).min(length);
            let state = from.interpolate(to, travelled / length);
            let result = self.query(&state);
            if result.is_feasible() {
                return self.checker.is_edge_valid(&state, to);
            }
            if result.penetration > depth {
                return false;
            }
        }
        true
    }

    pub fn ranges(&self) -> &[(F, F); N] {
        &self.ranges
    }

    pub fn collision_tolerance(&self) -> F {
        self.collision_tolerance
    }

    /// Length of the diagonal of the sampling box.
    pub fn diagonal(&self) -> F {
        self.ranges
            .iter()
            .fold(F::zero(), |acc, &(min, max)| acc + (max - min) * (max - min))
            .sqrt()
    }

    /// Volume of the sampling box.
    pub fn volume(&self) -> F {
        self.ranges
            .iter()
            .fold(F::one(), |acc, &(min, max)| acc * (max - min))
    }

    pub fn checker_mut(&mut self) -> &mut dyn ValidityChecker<F, N> {
        self.checker.as_mut()
    }

    /// Total number of oracle queries issued through this problem.
    pub fn n_queries(&self) -> usize {
        self.n_queries.get()
    }
}

/// Base-2 radical inverse of `k`: 1/2, 1/4, 3/4, 1/8, 5/8, ...
pub fn van_der_corput(mut k: u32) -> f64 {
    let mut result = 0.0;
    let mut base = 0.5;
    while k > 0 {
        if k & 1 == 1 {
            result += base;
        }
        base *= 0.5;
        k >>= 1;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obstacles::{AnalyticValidityChecker, StaticSphericalObstacle};
    use approx::assert_relative_eq;

    fn problem_with_sphere(tolerance: Option<f64>) -> ConfigurationProblem<f64, 2> {
        let checker = AnalyticValidityChecker::new(vec![StaticSphericalObstacle::new(
            RealVectorState::new([5.0, 0.0]),
            1.0,
        )]);
        ConfigurationProblem::new(Box::new(checker), [(0.0, 10.0), (-5.0, 5.0)], tolerance).unwrap()
    }

    #[test]
    fn van_der_corput_sequence() {
        let values: Vec<f64> = (1..=5).map(van_der_corput).collect();
        assert_eq!(values, vec![0.5, 0.25, 0.75, 0.125, 0.625]);
    }

    #[test]
    fn box_measures() {
        let problem = problem_with_sphere(None);
        assert_relative_eq!(problem.volume(), 100.0);
        assert_relative_eq!(problem.diagonal(), 200f64.sqrt());
        assert_relative_eq!(problem.collision_tolerance(), 0.0);
    }

    #[test]
    fn edges_through_obstacles_are_rejected() {
        let problem = problem_with_sphere(None);
        let a = RealVectorState::new([3.0, 0.0]);
        let b = RealVectorState::new([7.0, 0.0]);
        let qa = problem.query(&a);
        assert!(problem.is_feasible(&qa));
        assert!(!problem.is_edge_feasible(&a, &qa, &b, 0));
        let c = RealVectorState::new([3.0, 2.0]);
        assert!(problem.is_edge_feasible(&a, &qa, &c, 4));
        assert!(problem.n_queries() >= 5);
    }

    #[test]
    fn tolerated_start_can_leave_contact() {
        let problem = problem_with_sphere(Some(0.1));
        let inside = RealVectorState::new([5.0, 0.95]);
        let query = problem.query(&inside);
        assert!(!query.is_feasible());
        assert!(problem.is_feasible(&query));
        let outside = RealVectorState::new([5.0, 1.5]);
        assert!(problem.is_edge_feasible(&inside, &query, &outside, 3));
    }

    #[test]
    fn tolerated_start_cannot_cross_the_obstacle() {
        let problem = problem_with_sphere(Some(0.1));
        let inside = RealVectorState::new([4.05, 0.0]);
        let query = problem.query(&inside);
        assert!(problem.is_feasible(&query));
        let across = RealVectorState::new([8.0, 0.0]);
        assert!(!problem.is_edge_feasible(&inside, &query, &across, 0));
        let back_out = RealVectorState::new([2.0, 0.0]);
        assert!(problem.is_edge_feasible(&inside, &query, &back_out, 0));
    }

    #[test]
    fn tolerated_start_cannot_reach_a_second_obstacle() {
        let checker = AnalyticValidityChecker::new(vec![
            StaticSphericalObstacle::new(RealVectorState::new([0.0, 0.0]), 1.0),
            StaticSphericalObstacle::new(RealVectorState::new([0.0, 4.0]), 1.0),
        ]);
        let problem =
            ConfigurationProblem::new(Box::new(checker), [(-5.0, 5.0), (-5.0, 9.0)], Some(0.1))
                .unwrap();
        let inside = RealVectorState::new([0.0, 0.95]);
        let query = problem.query(&inside);
        assert!(problem.is_feasible(&query));
        assert!(!problem.is_edge_feasible(&inside, &query, &RealVectorState::new([0.0, 7.0]), 0));
    }
}
