use crate::error::{PlannerError, Result};
use crate::rrt::state::RealVectorState;
use num_traits::Float;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A distribution from which the planner draws random target states.
pub trait SamplingDistribution<F: Float, const N: usize> {
    /// Draws one state.
    fn sample(&mut self) -> RealVectorState<F, N>;
}

/// Uniform distribution over an axis-aligned box.
pub struct UniformDistribution<F: Float, const N: usize> {
    ranges: [(F, F); N],
    rng: StdRng,
}

impl<F: Float, const N: usize> UniformDistribution<F, N> {
    /// Creates a uniform distribution seeded from system entropy.
    ///
    /// Parameters:
    /// - `ranges`: (min, max) per axis, min must be strictly smaller than max.
    pub fn new(ranges: [(F, F); N]) -> Result<Self> {
        Self::with_rng(ranges, StdRng::from_entropy())
    }

    /// Creates a reproducible uniform distribution.
    pub fn with_seed(ranges: [(F, F); N], seed: u64) -> Result<Self> {
        Self::with_rng(ranges, StdRng::seed_from_u64(seed))
    }

    fn with_rng(ranges: [(F, F); N], rng: StdRng) -> Result<Self> {
        validate_ranges(&ranges)?;
        Ok(Self { ranges, rng })
    }

    pub fn ranges(&self) -> &[(F, F); N] {
        &self.ranges
    }
}

impl<F: Float, const N: usize> SamplingDistribution<F, N> for UniformDistribution<F, N> {
    fn sample(&mut self) -> RealVectorState<F, N> {
        let mut state = RealVectorState::zeros();
        for (i, &(min, max)) in self.ranges.iter().enumerate() {
            let u = F::from(self.rng.gen::<f64>()).unwrap();
            state[i] = min + u * (max - min);
        }
        state
    }
}

/// Checks that every axis range is non-empty and finite.
pub fn validate_ranges<F: Float, const N: usize>(ranges: &[(F, F); N]) -> Result<()> {
    for (axis, &(min, max)) in ranges.iter().enumerate() {
        if !(min < max) || !min.is_finite() || !max.is_finite() {
            return Err(PlannerError::InvalidRange { axis });
        }
    }
    Ok(())
}
