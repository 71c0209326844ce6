//! # Path finding in a 2D environment
//!
//! Plans around a few obstacles with every strategy and reports the results.
//!
//! ## Usage
//! ```bash
//! cargo run --example plan_2d -- --trials 10 --output-dir output/plan_2d
//! ```

use clap::Parser;
use json::object;
use rrt_pathfinder::obstacles::{AnalyticValidityChecker, StaticSphericalObstacle};
use rrt_pathfinder::rrt::{KdTreeNearestNeighbors, RealVectorState, Strategy};
use rrt_pathfinder::{PathFinder, PlannerConfig};
use std::fs;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(version, about = "Plan 2D paths with every strategy", long_about = None)]
struct CliArgs {
    /// Directory to save the output files (nothing is saved if omitted)
    #[arg(short, long)]
    output_dir: Option<String>,

    /// JSON file with the planner configuration
    #[arg(short, long)]
    config: Option<String>,

    /// Number of trials per strategy
    #[arg(short, long, default_value_t = 5)]
    trials: u64,

    /// Number of waypoints of the resampled path
    #[arg(short, long, default_value_t = 20)]
    waypoints: usize,
}

fn obstacles() -> Vec<StaticSphericalObstacle<f64, 2>> {
    [(8.0, 8.0, 3.0), (16.0, 20.0, 4.0), (22.0, 9.0, 3.0), (10.0, 22.0, 2.5)]
        .iter()
        .map(|&(x, y, r)| StaticSphericalObstacle::new(RealVectorState::new([x, y]), r))
        .collect()
}

fn main() {
    env_logger::init();
    let args: CliArgs = CliArgs::parse();

    let base_config = match &args.config {
        Some(file) => {
            let text = fs::read_to_string(file).expect("Failed to read the configuration file.");
            PlannerConfig::from_json_str(&text).expect("Invalid configuration.")
        }
        None => PlannerConfig {
            stepsize: 1.0,
            max_iters: 3000,
            subsample_checks: 4,
            ..Default::default()
        },
    };

    let output_dir = args.output_dir.as_ref().map(Path::new);
    if let Some(dir) = output_dir {
        fs::create_dir_all(dir).unwrap();
    }

    let mut strategies_json = json::array![];
    for strategy in Strategy::ALL {
        let mut trials_json = json::array![];
        for trial in 0..args.trials {
            let config = PlannerConfig {
                seed: Some(base_config.seed.unwrap_or(0) + trial),
                ..base_config.clone()
            };
            let mut finder =
                PathFinder::<f64, 2, KdTreeNearestNeighbors<f64, 2>>::new(config).unwrap();
            finder
                .set_problem(
                    Box::new(AnalyticValidityChecker::new(obstacles())),
                    [(0.0, 30.0), (0.0, 30.0)],
                    &[RealVectorState::new([2.0, 2.0])],
                    &[RealVectorState::new([28.0, 28.0])],
                    None,
                )
                .unwrap();

            let result = finder.solve_with(strategy).unwrap();
            println!("{} trial {:02}\n{}", strategy, trial, result);

            let mut trial_json = object! {
                "trial" => trial,
                "result" => result.to_json(),
            };
            if let Ok(resampled) = finder.resampled_path(args.waypoints) {
                let waypoints: Vec<Vec<f64>> =
                    resampled.iter().map(|state| state.values().to_vec()).collect();
                trial_json["resampled_path"] = waypoints.into();
            }
            trials_json
                .push(trial_json)
                .expect("Failed to push trial json.");

            if let Some(dir) = output_dir {
                let file_name = format!(
                    "{}_{:02}.bin",
                    strategy.name().replace(' ', "_").replace('*', "_star"),
                    trial
                );
                let encoded: Vec<u8> = bincode::serialize(&result).unwrap();
                fs::write(dir.join(file_name), encoded).unwrap();
            }
        }
        strategies_json
            .push(object! { "strategy" => strategy.name(), "trials" => trials_json })
            .expect("Failed to push strategy json.");
    }

    let output_json = object! { "strategies" => strategies_json };
    match output_dir {
        Some(dir) => fs::write(dir.join("plan_2d.json"), output_json.pretty(2)).unwrap(),
        None => println!("{}", output_json.pretty(2)),
    }
}
