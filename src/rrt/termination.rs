use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Decides when a planning loop has to stop.
///
/// `evaluate` is called once at the top of every iteration and returns true when the
/// loop must terminate.
pub trait TerminationCondition {
    fn evaluate(&mut self) -> bool;
}

/// Terminates after a fixed number of evaluations.
pub struct MaxIterationsTermination {
    max_iterations: usize,
    iterations: usize,
}

impl MaxIterationsTermination {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            iterations: 0,
        }
    }
}

impl TerminationCondition for MaxIterationsTermination {
    fn evaluate(&mut self) -> bool {
        if self.iterations >= self.max_iterations {
            return true;
        }
        self.iterations += 1;
        false
    }
}

/// Terminates once a wall-clock budget has elapsed. The clock starts at construction.
pub struct TimeTermination {
    start: Instant,
    budget: Duration,
}

impl TimeTermination {
    pub fn new(budget: Duration) -> Self {
        Self {
            start: Instant::now(),
            budget,
        }
    }

    pub fn from_secs_f64(seconds: f64) -> Self {
        Self::new(Duration::from_secs_f64(seconds.max(0.0)))
    }
}

impl TerminationCondition for TimeTermination {
    fn evaluate(&mut self) -> bool {
        self.start.elapsed() >= self.budget
    }
}

/// Terminates when a shared flag is raised, possibly from another thread.
#[derive(Clone)]
pub struct CancelTermination {
    flag: Arc<AtomicBool>,
}

impl CancelTermination {
    pub fn new(flag: Arc<AtomicBool>) -> Self {
        Self { flag }
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl TerminationCondition for CancelTermination {
    fn evaluate(&mut self) -> bool {
        self.is_cancelled()
    }
}

/// Terminates as soon as any of its conditions does.
#[derive(Default)]
pub struct AnyTermination {
    conditions: Vec<Box<dyn TerminationCondition>>,
}

impl AnyTermination {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, condition: Box<dyn TerminationCondition>) -> Self {
        self.conditions.push(condition);
        self
    }
}

impl TerminationCondition for AnyTermination {
    fn evaluate(&mut self) -> bool {
        // Every condition is evaluated so iteration counters stay in step.
        self.conditions
            .iter_mut()
            .fold(false, |stop, condition| condition.evaluate() || stop)
    }
}
