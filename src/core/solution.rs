use super::{Problem, TaskId, PLACEMENT_REWARD};
use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Utility of an assignment split by component.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct UtilityBreakdown {
    pub priority: f64,
    pub deadline: f64,
    pub switch: f64,
    pub fatigue: f64,
    pub enjoy: f64,
    pub focus: f64,
    #[serde(default)]
    pub fragmentation: f64,
}

impl UtilityBreakdown {
    /// Sum of all components.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.priority
            + self.deadline
            + self.switch
            + self.fatigue
            + self.enjoy
            + self.focus
            + self.fragmentation
    }
}

/// A task placed on a day.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub task_id: TaskId,
    pub date_ms: i64,
    pub start_min: u32,
    pub end_min: u32,
    pub utility: f64,
    pub breakdown: UtilityBreakdown,
}

impl Assignment {
    /// Creates an unscored assignment.
    #[must_use]
    pub fn new(task_id: TaskId, date_ms: i64, start_min: u32, end_min: u32) -> Self {
        Self {
            task_id,
            date_ms,
            start_min,
            end_min,
            utility: 0.0,
            breakdown: UtilityBreakdown::default(),
        }
    }

    /// Returns whether two assignments share a minute of the same day.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.date_ms == other.date_ms
            && self.start_min < other.end_min
            && other.start_min < self.end_min
    }

    /// Returns whether this assignment is finished before `other` begins.
    #[must_use]
    pub const fn precedes(&self, other: &Self) -> bool {
        self.date_ms < other.date_ms
            || (self.date_ms == other.date_ms && self.end_min <= other.start_min)
    }
}

/// Category of the reason a task was left out of the plan.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnscheduleKind {
    /// The task does not fit into any window.
    Oversized,
    /// The task takes part in a dependency cycle.
    CyclicDependency,
    /// No placement satisfies the earliest start, deadline and prerequisites.
    InfeasibleDeadline,
    /// A prerequisite can never be scheduled.
    DependencyUnscheduled,
    /// The windows are full.
    NoCapacity,
    /// The solver stopped before placing the task.
    SolverTimeout,
}

impl UnscheduleKind {
    /// Returns whether the reason holds for every strategy.
    #[must_use]
    pub const fn is_structural(self) -> bool {
        !matches!(self, Self::NoCapacity | Self::SolverTimeout)
    }
}

/// Why a task is not in the plan.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnScheduleReason {
    pub task_id: TaskId,
    pub kind: UnscheduleKind,
    pub reason: String,
}

impl UnScheduleReason {
    #[must_use]
    pub fn new(task_id: TaskId, kind: UnscheduleKind, reason: impl Into<String>) -> Self {
        let reason = reason.into();
        Self {
            task_id,
            kind,
            reason,
        }
    }
}

impl Display for UnScheduleReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.task_id, self.reason)
    }
}

/// Result of a strategy: every task ends up in exactly one of the two lists.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanResult {
    pub assignments: Vec<Assignment>,
    #[serde(rename = "unScheduled")]
    pub un_scheduled: Vec<UnScheduleReason>,
}

impl PlanResult {
    /// Number of scheduled tasks.
    #[must_use]
    pub fn scheduled_len(&self) -> usize {
        self.assignments.len()
    }

    /// Returns whether no task is left unscheduled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.un_scheduled.is_empty()
    }

    /// Sum of assignment utilities.
    #[must_use]
    pub fn total_utility(&self) -> f64 {
        self.assignments.iter().map(|a| a.utility).sum()
    }

    /// Value used to compare plans: scheduled tasks first, utility second.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn objective(&self) -> f64 {
        self.scheduled_len() as f64 * PLACEMENT_REWARD + self.total_utility()
    }

    /// Returns the assignment of a task.
    #[must_use]
    pub fn assignment(&self, task: TaskId) -> Option<&Assignment> {
        self.assignments.iter().find(|a| a.task_id == task)
    }

    /// Returns the unschedule reason of a task.
    #[must_use]
    pub fn reason(&self, task: TaskId) -> Option<&UnScheduleReason> {
        self.un_scheduled.iter().find(|r| r.task_id == task)
    }

    /// Verifies the plan against the problem it was computed for.
    /// Checks the task partition, window containment, time bounds, no-overlap and precedence.
    #[must_use]
    pub fn verify(&self, problem: &Problem) -> bool {
        self.is_partition(problem)
            && self.respects_windows(problem)
            && self.has_no_overlap()
            && self.respects_precedence(problem)
    }

    fn is_partition(&self, problem: &Problem) -> bool {
        let mut seen = HashSet::with_capacity(problem.tasks.len());
        let ids = self.assignments.iter().map(|a| a.task_id);
        let ids = ids.chain(self.un_scheduled.iter().map(|r| r.task_id));
        for id in ids {
            if !seen.insert(id) {
                return false;
            }
        }
        seen.len() == problem.tasks.len() && problem.tasks.iter().all(|t| seen.contains(&t.task_id))
    }

    fn respects_windows(&self, problem: &Problem) -> bool {
        let tasks: HashMap<_, _> = problem.tasks.iter().map(|t| (t.task_id, t)).collect();
        self.assignments.iter().all(|a| {
            let Some(task) = tasks.get(&a.task_id) else {
                return false;
            };
            let start_ms = a.date_ms.saturating_add(i64::from(a.start_min) * super::MS_PER_MINUTE);
            let end_ms = a.date_ms.saturating_add(i64::from(a.end_min) * super::MS_PER_MINUTE);
            a.end_min.checked_sub(a.start_min) == Some(problem.params.round_up(task.duration_min))
                && a.start_min % problem.params.slot_min == 0
                && problem.window_at(a.date_ms, a.start_min, a.end_min).is_some()
                && task.earliest_start_ms.map_or(true, |earliest| start_ms >= earliest)
                && task.deadline_ms.map_or(true, |deadline| end_ms <= deadline)
        })
    }

    fn has_no_overlap(&self) -> bool {
        let mut sorted: Vec<_> = self.assignments.iter().collect();
        sorted.sort_unstable_by_key(|a| (a.date_ms, a.start_min));
        sorted.windows(2).all(|pair| !pair[0].overlaps(pair[1]))
    }

    fn respects_precedence(&self, problem: &Problem) -> bool {
        let placed: HashMap<_, _> = self.assignments.iter().map(|a| (a.task_id, a)).collect();
        problem.tasks.iter().all(|task| {
            let Some(assignment) = placed.get(&task.task_id) else {
                return true;
            };
            task.dependent_task_ids.iter().all(|dep| {
                let known = problem.tasks.iter().any(|t| t.task_id == *dep);
                match placed.get(dep) {
                    Some(before) => before.precedes(assignment),
                    None => !known,
                }
            })
        })
    }
}
