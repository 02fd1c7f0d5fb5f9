#![allow(clippy::cast_precision_loss)]

use super::{Assignment, Problem, TaskInput, UtilityBreakdown, Weights, Window, MS_PER_MINUTE};
use ahash::{HashMap, HashMapExt};

/// Reward for every scheduled task. Dominates the utility terms so that
/// all strategies prefer plans with more tasks.
pub const PLACEMENT_REWARD: f64 = 1000.0;

const DEADLINE_BONUS: f64 = 10.0;
const URGENCY_SCALE: f64 = 10.0;
const FOCUS_BONUS: f64 = 20.0;
const FOCUS_EFFORT: f64 = 0.7;
const SWITCH_PENALTY: f64 = 5.0;
/// Gaps shorter than this many minutes are too short to use.
const USABLE_GAP_MIN: u32 = 15;
const SHORT_GAP_PENALTY: f64 = 5.0;
const GAP_MINUTE_PENALTY: f64 = 0.1;
const MS_PER_HOUR: f64 = 3_600_000.0;
const MS_PER_DAY: f64 = 86_400_000.0;

/// Coarse similarity class of a task, derived from its effort.
#[must_use]
pub fn category(task: &TaskInput) -> u8 {
    if task.effort < 0.34 {
        0
    } else if task.effort < 0.67 {
        1
    } else {
        2
    }
}

/// Weighted utility of assignments.
#[derive(Clone, Copy, Debug)]
pub struct UtilityModel<'a> {
    weights: &'a Weights,
}

impl<'a> UtilityModel<'a> {
    #[must_use]
    pub const fn new(weights: &'a Weights) -> Self {
        Self { weights }
    }

    /// Position independent part of the utility of placing `task` so that it ends at `end_min`.
    /// Context switch and fatigue depend on the rest of the day and stay zero here.
    #[must_use]
    pub fn placement(
        &self,
        task: &TaskInput,
        date_ms: i64,
        end_min: u32,
        deep_work: bool,
    ) -> UtilityBreakdown {
        let deadline = task.deadline_ms.map_or(0.0, |deadline| {
            let end_ms = date_ms.saturating_add(i64::from(end_min) * MS_PER_MINUTE);
            let slack = (deadline.saturating_sub(end_ms) as f64 / MS_PER_HOUR).max(0.0);
            self.weights.deadline * DEADLINE_BONUS * slack / (slack + 24.0)
        });

        UtilityBreakdown {
            priority: self.weights.priority * task.priority_score,
            deadline,
            enjoy: self.weights.enjoy * task.enjoyability,
            focus: if deep_work && task.effort > FOCUS_EFFORT {
                FOCUS_BONUS
            } else {
                0.0
            },
            ..UtilityBreakdown::default()
        }
    }

    /// Linear objective coefficient of a placement, as used by the exact models.
    #[must_use]
    pub fn placement_value(
        &self,
        task: &TaskInput,
        date_ms: i64,
        end_min: u32,
        deep_work: bool,
    ) -> f64 {
        PLACEMENT_REWARD + self.placement(task, date_ms, end_min, deep_work).total()
    }

    /// Construction key of the greedy pass. Higher keys are placed first.
    /// Urgency is measured from `horizon_ms`, the beginning of the first window.
    #[must_use]
    pub fn priority_key(&self, task: &TaskInput, horizon_ms: i64) -> f64 {
        let urgency = task.deadline_ms.map_or(0.0, |deadline| {
            let days = (deadline.saturating_sub(horizon_ms) as f64 / MS_PER_DAY).max(0.0);
            URGENCY_SCALE / (1.0 + days)
        });
        self.weights.priority * task.priority_score
            + self.weights.deadline * urgency
            + self.weights.enjoy * task.enjoyability
    }

    /// Scores every assignment of a plan, including the sequence dependent terms.
    /// Assignments are left sorted by day and start.
    pub fn score_plan(&self, problem: &Problem, assignments: &mut [Assignment]) {
        let tasks: HashMap<_, _> = problem.tasks.iter().map(|t| (t.task_id, t)).collect();
        assignments.sort_unstable_by_key(|a| (a.date_ms, a.start_min, a.task_id));
        let windows: Vec<_> = assignments
            .iter()
            .map(|a| problem.window_at(a.date_ms, a.start_min, a.end_min).copied())
            .collect();
        let fragmentation = fragmentation(assignments, &windows);

        let mut day = None;
        let mut worked = 0;
        let mut previous = None;

        for (i, assignment) in assignments.iter_mut().enumerate() {
            let Some(task) = tasks.get(&assignment.task_id) else {
                continue;
            };

            if day != Some(assignment.date_ms) {
                day = Some(assignment.date_ms);
                worked = 0;
                previous = None;
            }

            let deep_work = windows[i].is_some_and(|w| w.is_deep_work);
            let mut breakdown =
                self.placement(task, assignment.date_ms, assignment.end_min, deep_work);
            breakdown.fragmentation = -fragmentation[i];

            let current = category(task);
            if previous.is_some_and(|previous| previous != current) {
                breakdown.switch = -self.weights.switch * SWITCH_PENALTY;
            }
            breakdown.fatigue = -self.weights.fatigue * task.effort * f64::from(worked) / 60.0;

            assignment.breakdown = breakdown;
            assignment.utility = breakdown.total();

            worked += assignment.end_min - assignment.start_min;
            previous = Some(current);
        }
    }
}

/// Penalty of a leftover gap of `gap` minutes.
fn gap_penalty(gap: u32) -> f64 {
    let short = if gap > 0 && gap < USABLE_GAP_MIN {
        SHORT_GAP_PENALTY
    } else {
        0.0
    };
    short + GAP_MINUTE_PENALTY * f64::from(gap.min(USABLE_GAP_MIN))
}

/// Fragmentation penalty per sorted assignment. Each assignment carries the gap before
/// it in its window, and the last one of a window also carries the gap after it.
fn fragmentation(assignments: &[Assignment], windows: &[Option<Window>]) -> Vec<f64> {
    let mut penalties = vec![0.0; assignments.len()];
    for (i, assignment) in assignments.iter().enumerate() {
        let Some(window) = windows[i] else {
            continue;
        };
        let same_window = |j: usize| windows[j] == Some(window);

        let free_from = i
            .checked_sub(1)
            .filter(|&j| same_window(j))
            .map_or(window.start_min, |j| assignments[j].end_min);
        penalties[i] += gap_penalty(assignment.start_min.saturating_sub(free_from));

        let last = i + 1 >= assignments.len() || !same_window(i + 1);
        if last {
            penalties[i] += gap_penalty(window.end_min.saturating_sub(assignment.end_min));
        }
    }
    penalties
}
