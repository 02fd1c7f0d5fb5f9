use crate::core::{Problem, Strategy};
use tracing::warn;

mod annealing;
#[cfg_attr(not(feature = "pumpkin"), allow(dead_code))]
mod cp;
mod cpsat;
mod greedy;
#[cfg(feature = "gurobi")]
mod gurobi;
mod heuristic;
mod hybrid;
#[cfg(any(feature = "microlp", feature = "highs"))]
mod lp;
mod milp;
#[cfg(feature = "pumpkin")]
mod pumpkin;

pub use cpsat::{CpSat, SearchStatus};
pub use heuristic::Heuristic;
pub use hybrid::Hybrid;
pub use milp::Milp;

/// Registered strategies. Every concrete strategy adds a constructor here.
#[allow(unsafe_code)]
#[linkme::distributed_slice]
pub static STRATEGIES: [fn() -> Box<dyn Strategy>];

/// Creates every registered strategy.
#[must_use]
pub fn strategies() -> Vec<Box<dyn Strategy>> {
    STRATEGIES.iter().map(|create| create()).collect()
}

/// Returns whether the problem is within the recommended size of the strategy.
/// Oversized problems are still solved, with a warning.
fn within_bounds(strategy: &dyn Strategy, problem: &Problem) -> bool {
    let tasks = problem.tasks.len();
    let slots = problem.slot_count();
    let fits = strategy.can_handle(tasks, slots);
    if !fits {
        warn!(
            strategy = strategy.name(),
            tasks,
            slots,
            max_tasks = strategy.max_recommended_tasks(),
            max_slots = strategy.max_recommended_slots(),
            "problem exceeds the recommended size"
        );
    }
    fits
}
