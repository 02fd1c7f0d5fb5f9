use super::TaskId;
use thiserror::Error;

/// Errors raised by the planner.
///
/// Structural infeasibility (oversized tasks, cycles, unreachable deadlines) is never
/// an error: it is reported per task in [`super::PlanResult::un_scheduled`].
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("Task ID is repeated in the request: {0}")]
    DuplicateTask(TaskId),

    #[error("Task {0} has zero duration")]
    ZeroDuration(TaskId),

    #[error("Task {0} has an invalid {1}")]
    InvalidTask(TaskId, String),

    #[error("Invalid window on {date_ms}: [{start_min}, {end_min})")]
    InvalidWindow {
        date_ms: i64,
        start_min: u32,
        end_min: u32,
    },

    #[error("Invalid params: {0}")]
    InvalidParam(String),

    #[error("Strategy {strategy} failed: {message}")]
    Solver {
        strategy: &'static str,
        message: String,
    },

    #[error("All optimization strategies failed: {}", .failures.join("; "))]
    AllStrategiesFailed { failures: Vec<String> },
}

impl PlanError {
    /// Creates a solver failure for the given strategy.
    pub fn solver(strategy: &'static str, message: impl std::fmt::Display) -> Self {
        Self::Solver {
            strategy,
            message: message.to_string(),
        }
    }
}
