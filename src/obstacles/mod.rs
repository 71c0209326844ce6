pub mod analytic_obstacle;
pub mod rectangular_obstacle;
pub mod spherical_obstacle;

pub use analytic_obstacle::{AnalyticObstacle, AnalyticValidityChecker};
pub use rectangular_obstacle::{RectangularObstacle, StaticRectangularObstacle};
pub use spherical_obstacle::{SphericalObstacle, StaticSphericalObstacle};
