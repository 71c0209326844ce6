use rrt_pathfinder::obstacles::{
    AnalyticValidityChecker, StaticRectangularObstacle, StaticSphericalObstacle,
};
use rrt_pathfinder::rrt::path::path_length;
use rrt_pathfinder::rrt::problem::van_der_corput;
use rrt_pathfinder::rrt::validity_checker::AlwaysValid;
use rrt_pathfinder::rrt::{
    DisplayCache, KdTreeNearestNeighbors, RealVectorState, Strategy, TreeSide, ValidityChecker,
};
use rrt_pathfinder::{PathFinder, PlannerConfig, SolverStatus};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

type Finder2 = PathFinder<f64, 2, KdTreeNearestNeighbors<f64, 2>>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn s(x: f64, y: f64) -> RealVectorState<f64, 2> {
    RealVectorState::new([x, y])
}

fn config(seed: u64, max_iters: usize) -> PlannerConfig {
    PlannerConfig {
        stepsize: 1.0,
        max_iters,
        seed: Some(seed),
        ..Default::default()
    }
}

/// Obstacle-free strip around the segment (0,0) -> (10,0).
fn free_finder(config: PlannerConfig) -> Finder2 {
    let mut finder = Finder2::new(config).unwrap();
    finder
        .set_problem(
            Box::new(AlwaysValid::new()),
            [(-1.0, 11.0), (-1.0, 1.0)],
            &[s(0.0, 0.0)],
            &[s(10.0, 0.0)],
            None,
        )
        .unwrap();
    finder
}

fn wall() -> AnalyticValidityChecker<f64, 2, StaticRectangularObstacle<f64, 2>> {
    AnalyticValidityChecker::new(vec![StaticRectangularObstacle::new(
        s(4.0, -3.0),
        s(6.0, 3.0),
    )])
}

/// The straight line (0,0) -> (10,0) is blocked by a wall; detours pass above or below it.
fn blocked_finder(config: PlannerConfig) -> Finder2 {
    let mut finder = Finder2::new(config).unwrap();
    finder
        .set_problem(
            Box::new(wall()),
            [(-1.0, 11.0), (-5.0, 5.0)],
            &[s(0.0, 0.0)],
            &[s(10.0, 0.0)],
            None,
        )
        .unwrap();
    finder
}

fn assert_path_feasible(
    checker: &dyn ValidityChecker<f64, 2>,
    path: &[RealVectorState<f64, 2>],
    subsample_checks: u32,
) {
    for state in path {
        assert!(checker.query(state).is_feasible(), "state {:?} collides", state);
    }
    for w in path.windows(2) {
        assert!(checker.is_edge_valid(&w[0], &w[1]));
        for k in 1..=subsample_checks {
            let t = van_der_corput(k);
            assert!(checker.query(&w[0].interpolate(&w[1], t)).is_feasible());
        }
    }
}

#[test]
fn free_plane_rrt_connects_quickly() {
    init_logging();
    let mut finder = free_finder(config(1, 5000));
    let result = finder.solve().unwrap();
    assert!(result.is_success());
    assert!(result.counters.iters < 200, "{} iterations", result.counters.iters);
    let length = path_length(&result.path);
    assert!(length >= 10.0 - 1e-9);
    assert!(length <= 15.0, "path length {}", length);
    assert_eq!(result.path.first(), Some(&s(0.0, 0.0)));
    assert_eq!(result.path.last(), Some(&s(10.0, 0.0)));
}

#[test]
fn blocked_line_is_avoided() {
    init_logging();
    let subsample_checks = 8;
    let mut finder = blocked_finder(PlannerConfig {
        subsample_checks,
        ..config(2, 5000)
    });
    let result = finder.solve().unwrap();
    assert!(result.is_success(), "{}", result);
    assert_path_feasible(&wall(), &result.path, subsample_checks as u32);
    assert!(result.path.iter().any(|state| state[1].abs() >= 3.0));
}

#[test]
fn every_strategy_avoids_the_wall() {
    init_logging();
    for (seed, strategy) in Strategy::ALL.into_iter().enumerate() {
        let mut finder = blocked_finder(config(100 + seed as u64, 5000));
        let result = finder.solve_with(strategy).unwrap();
        assert!(result.is_success(), "{} failed:\n{}", strategy, result);
        assert_path_feasible(&wall(), &result.path, 0);
        assert_eq!(result.path.first(), Some(&s(0.0, 0.0)));
        assert_eq!(result.path.last(), Some(&s(10.0, 0.0)));
        let engine = finder.engine(strategy).unwrap();
        assert!(engine.trees().iter().all(|tree| tree.check_consistency()));
    }
}

#[test]
fn rrt_star_cost_decreases_towards_the_straight_line() {
    init_logging();
    let mut finder = free_finder(config(3, 400));
    let mut previous = f64::INFINITY;
    for _ in 0..5 {
        let result = finder.star_solve().unwrap();
        assert!(result.is_success());
        let cost = result.cost.unwrap();
        assert!(cost <= previous + 1e-9, "cost went up from {} to {}", previous, cost);
        assert!(cost >= 10.0 - 1e-9);
        previous = cost;
    }
    assert!(previous <= 12.0, "cost {}", previous);
    assert_eq!(finder.engine(Strategy::RrtStar).unwrap().counters().iters, 2000);
}

#[test]
fn repeated_solves_never_get_worse() {
    init_logging();
    let mut finder = blocked_finder(config(4, 1500));
    for strategy in Strategy::ALL {
        let first = finder.solve_with(strategy).unwrap();
        let second = finder.solve_with(strategy).unwrap();
        assert!(second.is_success() || !first.is_success());
        if let (Some(a), Some(b)) = (first.cost, second.cost) {
            assert!(b <= a + 1e-9, "{}: {} then {}", strategy, a, b);
        }
    }
    // Feasibility-only strategies hand back the same path.
    let a = finder.solve().unwrap();
    let b = finder.solve().unwrap();
    assert_eq!(a.path, b.path);
}

#[test]
fn resampled_path_has_the_requested_waypoints() {
    init_logging();
    let mut finder = blocked_finder(config(5, 5000));
    let result = finder.psbi_solve().unwrap();
    assert!(result.is_success());
    for waypoints in [2, 7, 50] {
        let resampled = finder.resampled_path(waypoints).unwrap();
        assert_eq!(resampled.len(), waypoints);
        assert_eq!(resampled.first(), result.path.first());
        assert_eq!(resampled.last(), result.path.last());
    }
    assert!(finder.resampled_path(1).is_err());
}

#[test]
fn cancellation_from_another_thread() {
    init_logging();
    let mut finder = free_finder(config(6, 100_000_000));
    let flag = finder.cancel_flag();
    let canceller = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        flag.store(true, Ordering::Relaxed);
    });
    let result = finder.star_solve().unwrap();
    canceller.join().unwrap();

    let engine = finder.engine(Strategy::RrtStar).unwrap();
    assert!(engine.was_cancelled());
    assert!(result.counters.iters < 100_000_000);
    // An optimizing run keeps the best path found before the cancellation.
    assert_eq!(result.is_success(), engine.solved());

    // The flag stays raised until cleared.
    assert_eq!(finder.solve().unwrap().status, SolverStatus::Cancelled);
    finder.cancel_flag().store(false, Ordering::Relaxed);
    assert!(finder.solve().unwrap().is_success());
}

#[test]
fn display_cache_follows_the_planner() {
    init_logging();
    let cache = Arc::new(DisplayCache::<f64, 2>::new());
    let mut finder = blocked_finder(config(7, 3000));
    finder.set_observer(cache.clone());

    let reader = {
        let cache = cache.clone();
        thread::spawn(move || {
            let mut seen = 0;
            for _ in 0..200 {
                seen = seen.max(cache.len(TreeSide::Start));
                thread::sleep(Duration::from_micros(100));
            }
            seen
        })
    };
    let result = finder.star_solve().unwrap();
    let seen = reader.join().unwrap();

    assert!(result.is_success());
    let engine = finder.engine(Strategy::RrtStar).unwrap();
    assert!(seen <= engine.trees()[0].len());
    for (side, tree) in [TreeSide::Start, TreeSide::Goal].into_iter().zip(engine.trees()) {
        assert_eq!(cache.len(side), tree.len());
        assert_eq!(cache.edges(side).len(), tree.len() - 1);
    }
}

#[test]
fn single_star_solve_in_three_dimensions() {
    init_logging();
    let checker = AnalyticValidityChecker::new(vec![
        StaticSphericalObstacle::new(RealVectorState::new([2.5, 0.0, 0.0]), 1.0),
        StaticSphericalObstacle::new(RealVectorState::new([2.5, 2.0, 1.0]), 0.8),
    ]);
    let mut finder = PathFinder::<f64, 3, KdTreeNearestNeighbors<f64, 3>>::new(PlannerConfig {
        stepsize: 0.5,
        max_iters: 3000,
        subsample_checks: 4,
        seed: Some(8),
        ..Default::default()
    })
    .unwrap();
    let start = RealVectorState::new([0.0, 0.0, 0.0]);
    let goal = RealVectorState::new([5.0, 0.0, 0.0]);
    finder
        .set_problem(
            Box::new(checker),
            [(-1.0, 6.0), (-3.0, 3.0), (-3.0, 3.0)],
            &[start],
            &[goal],
            None,
        )
        .unwrap();
    let result = finder.single_star_solve().unwrap();
    assert!(result.is_success(), "{}", result);
    assert_eq!(result.path.first(), Some(&start));
    assert_eq!(result.path.last(), Some(&goal));
    assert!(result.cost.unwrap() > 5.0);
}

#[test]
fn configuration_from_json() {
    init_logging();
    let config = PlannerConfig::from_json_str(
        r#"{"stepsize": 1.0, "max_iters": 3000, "p_side_step": 0.4, "seed": 10}"#,
    )
    .unwrap();
    let mut finder = blocked_finder(config);
    let result = finder.solve().unwrap();
    assert!(result.is_success());
    let engine = finder.engine(Strategy::Rrt).unwrap();
    assert_eq!(engine.probabilities().side, 0.4);
    let exported = result.to_json();
    assert_eq!(exported["strategy"], "RRT");
    assert_eq!(exported["path"].len(), result.path.len());
}

#[test]
fn tolerated_start_does_not_cut_through_its_obstacle() {
    init_logging();
    let sphere = || {
        AnalyticValidityChecker::new(vec![StaticSphericalObstacle::new(s(0.0, 0.0), 1.0)])
    };
    let mut finder = Finder2::new(PlannerConfig {
        stepsize: 5.0,
        max_iters: 5000,
        seed: Some(9),
        ..Default::default()
    })
    .unwrap();
    finder
        .set_problem(
            Box::new(sphere()),
            [(-3.0, 5.0), (-3.0, 3.0)],
            &[s(-0.95, 0.0)],
            &[s(3.0, 0.0)],
            Some(0.1),
        )
        .unwrap();
    let result = finder.solve().unwrap();
    assert!(result.is_success(), "{}", result);

    let checker = sphere();
    let deepest = result
        .path
        .windows(2)
        .flat_map(|w| (0..=200).map(move |k| w[0].interpolate(&w[1], k as f64 / 200.0)))
        .map(|state| checker.query(&state).penetration)
        .fold(0.0, f64::max);
    assert!(deepest <= 0.2, "penetration {} along {:?}", deepest, result.path);
}
