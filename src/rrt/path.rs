use crate::error::{PlannerError, Result};
use crate::rrt::state::RealVectorState;
use num_traits::Float;

/// Reverses a path in place (goal-tree paths run goal -> meeting point).
pub fn revert_path<F: Float, const N: usize>(path: &mut [RealVectorState<F, N>]) {
    path.reverse();
}

/// Sum of the Euclidean segment lengths.
pub fn path_length<F: Float, const N: usize>(path: &[RealVectorState<F, N>]) -> F {
    path.windows(2)
        .fold(F::zero(), |acc, w| acc + w[0].euclidean_distance(&w[1]))
}

/// Joins a start-tree path (root -> meeting node) with a goal-tree path (root -> meeting
/// node), reverting the latter and dropping a duplicated meeting configuration.
pub fn join_paths<F: Float, const N: usize>(
    mut start_path: Vec<RealVectorState<F, N>>,
    mut goal_path: Vec<RealVectorState<F, N>>,
) -> Vec<RealVectorState<F, N>> {
    revert_path(&mut goal_path);
    let duplicated = match (start_path.last(), goal_path.first()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    };
    let skip = usize::from(duplicated);
    start_path.extend(goal_path.into_iter().skip(skip));
    start_path
}

/// Resamples a path to exactly `waypoints` states spaced uniformly by arc length.
///
/// The first and last states of the result are the first and last states of `path`.
pub fn resample_path<F: Float, const N: usize>(
    path: &[RealVectorState<F, N>],
    waypoints: usize,
) -> Result<Vec<RealVectorState<F, N>>> {
    if waypoints < 2 {
        return Err(PlannerError::ResampleCount(waypoints));
    }
    let (Some(first), Some(last)) = (path.first(), path.last()) else {
        return Err(PlannerError::NoPath);
    };

    let mut cumulative = Vec::with_capacity(path.len());
    cumulative.push(F::zero());
    for w in path.windows(2) {
        let previous = cumulative[cumulative.len() - 1];
        cumulative.push(previous + w[0].euclidean_distance(&w[1]));
    }
    let total = cumulative[cumulative.len() - 1];
    if total <= F::zero() {
        return Ok(vec![*first; waypoints]);
    }

    let mut resampled = Vec::with_capacity(waypoints);
    let mut segment = 0;
    let denominator = F::from(waypoints - 1).unwrap();
    for k in 0..waypoints - 1 {
        let target = total * F::from(k).unwrap() / denominator;
        while segment + 2 < path.len() && cumulative[segment + 1] < target {
            segment += 1;
        }
        let length = cumulative[segment + 1] - cumulative[segment];
        let t = if length > F::zero() {
            ((target - cumulative[segment]) / length).min(F::one())
        } else {
            F::zero()
        };
        resampled.push(path[segment].interpolate(&path[segment + 1], t));
    }
    resampled.push(*last);
    Ok(resampled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn s(x: f64, y: f64) -> RealVectorState<f64, 2> {
        RealVectorState::new([x, y])
    }

    #[test]
    fn resampling_keeps_endpoints_and_count() {
        let path = vec![s(0.0, 0.0), s(3.0, 0.0), s(3.0, 1.0)];
        let resampled = resample_path(&path, 5).unwrap();
        assert_eq!(resampled.len(), 5);
        assert_eq!(resampled[0], s(0.0, 0.0));
        assert_eq!(resampled[4], s(3.0, 1.0));
        // Total length 4, spacing 1.
        assert_relative_eq!(resampled[1][0], 1.0, epsilon = 1e-12);
        assert_relative_eq!(resampled[3][0], 3.0, epsilon = 1e-12);
        assert_relative_eq!(path_length(&resampled), 4.0, epsilon = 1e-12);
    }

    #[test]
    fn resampling_a_single_state_repeats_it() {
        let resampled = resample_path(&[s(1.0, 2.0)], 3).unwrap();
        assert_eq!(resampled, vec![s(1.0, 2.0); 3]);
    }

    #[test]
    fn resampling_rejects_bad_input() {
        assert_eq!(
            resample_path(&[s(0.0, 0.0), s(1.0, 0.0)], 1),
            Err(PlannerError::ResampleCount(1))
        );
        assert_eq!(
            resample_path::<f64, 2>(&[], 4),
            Err(PlannerError::NoPath)
        );
    }

    #[test]
    fn join_drops_duplicated_meeting_state() {
        let start = vec![s(0.0, 0.0), s(1.0, 0.0)];
        let goal = vec![s(2.0, 0.0), s(1.0, 0.0)];
        assert_eq!(join_paths(start.clone(), goal), vec![s(0.0, 0.0), s(1.0, 0.0), s(2.0, 0.0)]);

        let goal = vec![s(3.0, 0.0), s(1.5, 0.0)];
        assert_eq!(join_paths(start, goal).len(), 4);
    }
}
