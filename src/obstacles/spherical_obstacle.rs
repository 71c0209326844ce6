use crate::obstacles::AnalyticObstacle;
use crate::rrt::state::RealVectorState;
use num_traits::Float;
use serde::{Deserialize, Serialize};

/// A trait for spherical obstacles
pub trait SphericalObstacle<F: Float, const N: usize>: AnalyticObstacle<F, N> {
    /// Returns the center of the obstacle.
    fn center(&self) -> &RealVectorState<F, N>;
    /// Returns the radius of the obstacle.
    fn radius(&self) -> F;

    /// Checks if a point is inside the sphere.
    fn contains(&self, point: &RealVectorState<F, N>) -> bool {
        let distance_squared = self.center().euclidean_distance_squared(point);
        distance_squared < self.radius().powi(2)
    }

    /// Check if an edge intersects with the sphere.
    fn intersects_edge(&self, start: &RealVectorState<F, N>, end: &RealVectorState<F, N>) -> bool {
        if SphericalObstacle::contains(self, start) || SphericalObstacle::contains(self, end) {
            return true; // One of the endpoints is inside the sphere
        }

        let direction = end - start;
        let center_to_start = start - self.center();
        let a = direction.dot(&direction);
        let b = F::from(2.0).unwrap() * center_to_start.dot(&direction);
        let c = center_to_start.dot(&center_to_start) - self.radius().powi(2);
        let discriminant = b * b - F::from(4.0).unwrap() * a * c;

        if discriminant < F::zero() {
            return false; // No real roots; no intersection
        }

        let sqrt_discriminant = discriminant.sqrt();
        let two_a = F::from(2.0).unwrap() * a;

        let t1 = (-b - sqrt_discriminant) / two_a;
        let t2 = (-b + sqrt_discriminant) / two_a;

        // Check if either intersection point is within the segment [0, 1]
        (t1 >= F::zero() && t1 <= F::one()) || (t2 >= F::zero() && t2 <= F::one())
    }

    /// Depth below the surface and the outward radial normal.
    /// A state exactly at the center escapes along the first axis.
    fn penetration(&self, state: &RealVectorState<F, N>) -> Option<(F, RealVectorState<F, N>)> {
        if !SphericalObstacle::contains(self, state) {
            return None;
        }
        let offset = state - self.center();
        let depth = self.radius() - offset.norm();
        let normal = offset.normalized().unwrap_or_else(|| {
            let mut axis = RealVectorState::zeros();
            axis[0] = F::one();
            axis
        });
        Some((depth, normal))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticSphericalObstacle<F: Float, const N: usize> {
    center: RealVectorState<F, N>,
    radius: F,
}

impl<F: Float, const N: usize> StaticSphericalObstacle<F, N> {
    pub fn new(center: RealVectorState<F, N>, radius: F) -> Self {
        Self { center, radius }
    }
}

impl<F: Float, const N: usize> SphericalObstacle<F, N> for StaticSphericalObstacle<F, N> {
    fn center(&self) -> &RealVectorState<F, N> {
        &self.center
    }

    fn radius(&self) -> F {
        self.radius
    }
}

impl<F: Float, const N: usize> AnalyticObstacle<F, N> for StaticSphericalObstacle<F, N> {
    fn contains(&self, state: &RealVectorState<F, N>) -> bool {
        SphericalObstacle::contains(self, state)
    }

    fn intersects_edge(&self, start: &RealVectorState<F, N>, end: &RealVectorState<F, N>) -> bool {
        SphericalObstacle::intersects_edge(self, start, end)
    }

    fn penetration(&self, state: &RealVectorState<F, N>) -> Option<(F, RealVectorState<F, N>)> {
        SphericalObstacle::penetration(self, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn edge_crossing_the_sphere_intersects() {
        let sphere = StaticSphericalObstacle::new(RealVectorState::new([0.0, 0.0]), 1.0);
        let a = RealVectorState::new([-2.0, 0.5]);
        let b = RealVectorState::new([2.0, 0.5]);
        assert!(SphericalObstacle::intersects_edge(&sphere, &a, &b));
        let c = RealVectorState::new([2.0, 1.5]);
        let d = RealVectorState::new([-2.0, 1.5]);
        assert!(!SphericalObstacle::intersects_edge(&sphere, &c, &d));
    }

    #[test]
    fn penetration_points_outwards() {
        let sphere = StaticSphericalObstacle::new(RealVectorState::new([1.0, 1.0]), 2.0);
        let (depth, normal) = SphericalObstacle::penetration(&sphere, &RealVectorState::new([1.0, 2.5])).unwrap();
        assert_relative_eq!(depth, 0.5);
        assert_relative_eq!(normal[0], 0.0);
        assert_relative_eq!(normal[1], 1.0);
        assert!(SphericalObstacle::penetration(&sphere, &RealVectorState::new([4.0, 1.0])).is_none());
    }
}
