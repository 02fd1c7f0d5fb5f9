mod error;
mod prepare;
mod problem;
mod solution;
mod utility;
mod util;

pub use error::*;
pub use prepare::*;
pub use problem::*;
pub use solution::*;
pub use util::*;
pub use utility::*;

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Concrete strategy variants.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyKind {
    Heuristic,
    Milp,
    Cpsat,
    Hybrid,
}

impl StrategyKind {
    /// Human readable name of the strategy.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Heuristic => "Heuristic",
            Self::Milp => "MILP",
            Self::Cpsat => "CP-SAT",
            Self::Hybrid => "Hybrid",
        }
    }
}

impl Display for StrategyKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Strategy selector of a request.
#[derive(
    Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize, clap::ValueEnum,
)]
#[serde(rename_all = "UPPERCASE")]
#[clap(rename_all = "UPPERCASE")]
pub enum StrategyType {
    #[default]
    Auto,
    Heuristic,
    Milp,
    Cpsat,
    Hybrid,
}

impl StrategyType {
    /// Returns the explicitly requested strategy, `None` for automatic selection.
    #[must_use]
    pub const fn kind(self) -> Option<StrategyKind> {
        match self {
            Self::Auto => None,
            Self::Heuristic => Some(StrategyKind::Heuristic),
            Self::Milp => Some(StrategyKind::Milp),
            Self::Cpsat => Some(StrategyKind::Cpsat),
            Self::Hybrid => Some(StrategyKind::Hybrid),
        }
    }
}

/// Turns a problem into a plan.
pub trait Strategy: Send + Sync {
    /// Schedules the tasks of the given problem.
    ///
    /// # Errors
    /// - If the underlying solver fails unexpectedly.
    fn schedule(&self, problem: &Problem) -> Result<PlanResult, PlanError>;

    /// Schedules the tasks starting from `hint`, a feasible plan of the same problem.
    /// The result must not be worse than the hint. Strategies without warm start
    /// support ignore it.
    ///
    /// # Errors
    /// - If the underlying solver fails unexpectedly.
    fn refine(&self, problem: &Problem, hint: &PlanResult) -> Result<PlanResult, PlanError> {
        let _ = hint;
        self.schedule(problem)
    }

    /// Returns the strategy variant.
    fn kind(&self) -> StrategyKind;

    /// Returns the name of the strategy.
    fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Returns whether the solver of the strategy could be initialized.
    fn is_available(&self) -> bool {
        true
    }

    /// Returns the maximum number of tasks the strategy is recommended for.
    fn max_recommended_tasks(&self) -> usize {
        usize::MAX
    }

    /// Returns the maximum number of slots the strategy is recommended for.
    fn max_recommended_slots(&self) -> usize {
        usize::MAX
    }

    /// Returns whether the problem size is within the recommended bounds.
    fn can_handle(&self, task_count: usize, slot_count: usize) -> bool {
        task_count <= self.max_recommended_tasks() && slot_count <= self.max_recommended_slots()
    }
}
