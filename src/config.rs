//! Planner configuration.

use crate::error::{PlannerError, Result};
use serde::{Deserialize, Serialize};

mod defaults {
    pub fn stepsize() -> f64 {
        -1.0
    }
    pub fn max_iters() -> usize {
        5000
    }
    pub fn auto() -> f64 {
        -1.0
    }
}

/// Parameters shared by every strategy.
///
/// Negative `stepsize`, `max_connection_radius` and `gamma` request values derived from
/// the problem's sampling box. Unset step probabilities fall back to the strategy's
/// default profile.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfig {
    /// Maximum extension per step (negative: box diagonal / 50)
    #[serde(default = "defaults::stepsize")]
    pub stepsize: f64,

    /// Iterations granted per planning call
    #[serde(default = "defaults::max_iters")]
    pub max_iters: usize,

    /// Intermediate feasibility checks per edge (<= 0 disables)
    #[serde(default)]
    pub subsample_checks: i32,

    /// 0 = quiet, 1 = results, 2 = connections and merges, 3 = every iteration
    #[serde(default)]
    pub verbose: i32,

    /// Probability of growing one tree towards the other
    #[serde(default)]
    pub p_forward_step: Option<f64>,

    /// Probability of side-stepping an infeasible extension
    #[serde(default)]
    pub p_side_step: Option<f64>,

    /// Probability of targeting a node of the other tree instead of a uniform sample
    #[serde(default)]
    pub p_backward_step: Option<f64>,

    /// Upper bound of the RRT* rewiring radius (negative: 2 * stepsize)
    #[serde(default = "defaults::auto")]
    pub max_connection_radius: f64,

    /// RRT* rewiring constant (negative: optimal gamma of the sampling box)
    #[serde(default = "defaults::auto")]
    pub gamma: f64,

    /// Seed for reproducible runs
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            stepsize: defaults::stepsize(),
            max_iters: defaults::max_iters(),
            subsample_checks: 0,
            verbose: 0,
            p_forward_step: None,
            p_side_step: None,
            p_backward_step: None,
            max_connection_radius: defaults::auto(),
            gamma: defaults::auto(),
            seed: None,
        }
    }
}

impl PlannerConfig {
    /// Checks that every probability override lies in [0, 1].
    pub fn validate(&self) -> Result<()> {
        let probabilities = [
            ("p_forward_step", self.p_forward_step),
            ("p_side_step", self.p_side_step),
            ("p_backward_step", self.p_backward_step),
        ];
        for (name, value) in probabilities {
            if let Some(value) = value {
                if !(0.0..=1.0).contains(&value) {
                    return Err(PlannerError::InvalidProbability { name, value });
                }
            }
        }
        if self.max_iters == 0 {
            return Err(PlannerError::Config("max_iters must be positive".to_string()));
        }
        Ok(())
    }

    /// Reads a configuration from a JSON object; absent keys keep their defaults.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value = json::parse(text).map_err(|e| PlannerError::Config(e.to_string()))?;
        if !value.is_object() {
            return Err(PlannerError::Config("expected a JSON object".to_string()));
        }

        let mut config = Self::default();
        if let Some(v) = value["stepsize"].as_f64() {
            config.stepsize = v;
        }
        if let Some(v) = value["max_iters"].as_usize() {
            config.max_iters = v;
        }
        if let Some(v) = value["subsample_checks"].as_i32() {
            config.subsample_checks = v;
        }
        if let Some(v) = value["verbose"].as_i32() {
            config.verbose = v;
        }
        config.p_forward_step = value["p_forward_step"].as_f64();
        config.p_side_step = value["p_side_step"].as_f64();
        config.p_backward_step = value["p_backward_step"].as_f64();
        if let Some(v) = value["max_connection_radius"].as_f64() {
            config.max_connection_radius = v;
        }
        if let Some(v) = value["gamma"].as_f64() {
            config.gamma = v;
        }
        config.seed = value["seed"].as_u64();

        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> json::JsonValue {
        let mut object = json::object! {
            stepsize: self.stepsize,
            max_iters: self.max_iters,
            subsample_checks: self.subsample_checks,
            verbose: self.verbose,
            max_connection_radius: self.max_connection_radius,
            gamma: self.gamma,
        };
        let optional = [
            ("p_forward_step", self.p_forward_step),
            ("p_side_step", self.p_side_step),
            ("p_backward_step", self.p_backward_step),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                object[key] = value.into();
            }
        }
        if let Some(seed) = self.seed {
            object["seed"] = seed.into();
        }
        object
    }
}
