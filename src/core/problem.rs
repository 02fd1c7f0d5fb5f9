use super::PlanError;
use ahash::{HashSet, HashSetExt};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Identifier of a task inside a single request.
pub type TaskId = u64;

/// Number of minutes in a day. Window offsets never exceed it.
pub const MINUTES_PER_DAY: u32 = 1440;

/// Milliseconds in a minute.
pub const MS_PER_MINUTE: i64 = 60_000;

/// Largest accepted magnitude of scores and weights.
pub const MAX_SCORE: f64 = 1e6;

/// Largest time limit applied to solvers, one year.
pub const MAX_TIME_LIMIT_SEC: u64 = 365 * 24 * 3600;

/// Largest accepted magnitude of timestamps, roughly 30 000 years.
pub const MAX_TIMESTAMP_MS: i64 = 1_000_000_000_000_000;

/// A task to be placed into one of the windows.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub task_id: TaskId,
    pub duration_min: u32,
    #[serde(default)]
    pub priority_score: f64,
    #[serde(default)]
    pub deadline_ms: Option<i64>,
    #[serde(default)]
    pub earliest_start_ms: Option<i64>,
    #[serde(default)]
    pub effort: f64,
    #[serde(default)]
    pub enjoyability: f64,
    /// Tasks that must be completed before this one may start.
    #[serde(default)]
    pub dependent_task_ids: Vec<TaskId>,
}

impl TaskInput {
    /// Creates a task with the given id and duration and neutral scores.
    #[must_use]
    pub fn new(task_id: TaskId, duration_min: u32) -> Self {
        Self {
            task_id,
            duration_min,
            ..Self::default()
        }
    }

    /// Sets the prerequisites of the task.
    #[must_use]
    pub fn after(mut self, prerequisites: impl IntoIterator<Item = TaskId>) -> Self {
        self.dependent_task_ids = prerequisites.into_iter().collect();
        self
    }

    /// Sets the priority score of the task.
    #[must_use]
    pub const fn with_priority(mut self, priority_score: f64) -> Self {
        self.priority_score = priority_score;
        self
    }

    /// Sets the absolute deadline of the task.
    #[must_use]
    pub const fn with_deadline(mut self, deadline_ms: i64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    /// Sets the earliest absolute start of the task.
    #[must_use]
    pub const fn with_earliest_start(mut self, earliest_start_ms: i64) -> Self {
        self.earliest_start_ms = Some(earliest_start_ms);
        self
    }

    /// Sets effort and enjoyability of the task.
    #[must_use]
    pub const fn with_scores(mut self, effort: f64, enjoyability: f64) -> Self {
        self.effort = effort;
        self.enjoyability = enjoyability;
        self
    }
}

/// A contiguous interval of available minutes on one day.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Window {
    pub date_ms: i64,
    pub start_min: u32,
    pub end_min: u32,
    #[serde(default)]
    pub is_deep_work: bool,
}

impl Window {
    #[must_use]
    pub const fn new(date_ms: i64, start_min: u32, end_min: u32) -> Self {
        Self {
            date_ms,
            start_min,
            end_min,
            is_deep_work: false,
        }
    }

    #[must_use]
    pub const fn deep_work(mut self) -> Self {
        self.is_deep_work = true;
        self
    }

    /// Capacity of the window in minutes.
    #[must_use]
    pub const fn capacity(&self) -> u32 {
        self.end_min.saturating_sub(self.start_min)
    }

    /// Returns whether the interval `[start, end)` of the same day lies inside the window.
    #[must_use]
    pub const fn contains(&self, date_ms: i64, start: u32, end: u32) -> bool {
        self.date_ms == date_ms && self.start_min <= start && end <= self.end_min
    }
}

/// Coefficients of the per-assignment utility.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub struct Weights {
    #[serde(rename = "wPriority", default = "default_weight")]
    pub priority: f64,
    #[serde(rename = "wDeadline", default = "default_weight")]
    pub deadline: f64,
    #[serde(rename = "wSwitch", default = "default_weight")]
    pub switch: f64,
    #[serde(rename = "wFatigue", default = "default_weight")]
    pub fatigue: f64,
    #[serde(rename = "wEnjoy", default = "default_weight")]
    pub enjoy: f64,
}

const fn default_weight() -> f64 {
    1.0
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            priority: 1.0,
            deadline: 1.0,
            switch: 1.0,
            fatigue: 1.0,
            enjoy: 1.0,
        }
    }
}

/// Solver controls.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Params {
    pub slot_min: u32,
    /// Wall-clock budget of the local search in milliseconds.
    #[serde(rename = "timeBudgetLS")]
    pub time_budget_ls: u64,
    pub max_time_sec: u64,
    pub initial_temperature: f64,
    pub cooling_rate: f64,
    pub max_iterations: usize,
    pub num_workers: usize,
    pub seed: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            slot_min: 15,
            time_budget_ls: 2000,
            max_time_sec: 30,
            initial_temperature: 1000.0,
            cooling_rate: 0.95,
            max_iterations: 1000,
            num_workers: 4,
            seed: 42,
        }
    }
}

impl Params {
    /// Solver time limit.
    #[must_use]
    pub const fn max_time(&self) -> Duration {
        Duration::from_secs(self.max_time_sec)
    }

    /// Solver time limit. Limits above [`MAX_TIME_LIMIT_SEC`] mean no limit.
    #[must_use]
    pub fn time_limit(&self) -> Option<Duration> {
        (self.max_time_sec <= MAX_TIME_LIMIT_SEC).then_some(self.max_time())
    }

    /// Instant at which a solve started at `started` must end, `None` without a limit.
    #[must_use]
    pub fn deadline(&self, started: Instant) -> Option<Instant> {
        self.time_limit().and_then(|limit| started.checked_add(limit))
    }

    /// Local search time budget.
    #[must_use]
    pub const fn local_search_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ls)
    }

    /// Rounds the given duration up to a multiple of the slot length.
    /// Saturates at `u32::MAX`.
    #[must_use]
    pub const fn round_up(&self, minutes: u32) -> u32 {
        let slot = if self.slot_min == 0 { 1 } else { self.slot_min };
        minutes.div_ceil(slot).saturating_mul(slot)
    }

    /// Rounds the given minute up to the next slot boundary.
    #[must_use]
    pub const fn align(&self, minute: u32) -> u32 {
        self.round_up(minute)
    }
}

fn in_range(value: f64) -> bool {
    value.is_finite() && value.abs() <= MAX_SCORE
}

const fn valid_timestamp(ms: i64) -> bool {
    -MAX_TIMESTAMP_MS <= ms && ms <= MAX_TIMESTAMP_MS
}

/// A single batch of work: the input snapshot every strategy consumes read-only.
#[non_exhaustive]
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Problem {
    pub tasks: Vec<TaskInput>,
    pub windows: Vec<Window>,
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub params: Params,
}

impl Problem {
    #[must_use]
    pub fn new(tasks: Vec<TaskInput>, windows: Vec<Window>, weights: Weights, params: Params) -> Self {
        Self {
            tasks,
            windows,
            weights,
            params,
        }
    }

    /// Creates a problem with default weights and params.
    #[must_use]
    pub fn with_defaults(tasks: Vec<TaskInput>, windows: Vec<Window>) -> Self {
        Self::new(tasks, windows, Weights::default(), Params::default())
    }

    /// Estimated number of discrete start slots over all windows.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        let slot = self.params.slot_min.max(1);
        let slots: u64 = self.windows.iter().map(|w| u64::from(w.capacity() / slot)).sum();
        crate::cast_usize(slots)
    }

    /// Returns the window holding the given interval, preferring deep-work windows.
    #[must_use]
    pub fn window_at(&self, date_ms: i64, start: u32, end: u32) -> Option<&Window> {
        let mut found = None;
        for window in self.windows.iter().filter(|w| w.contains(date_ms, start, end)) {
            if window.is_deep_work {
                return Some(window);
            }
            if found.is_none() {
                found = Some(window);
            }
        }
        found
    }

    /// Checks the input for malformed values.
    ///
    /// # Errors
    /// - If a task id is repeated, a task has zero duration,
    ///   a window is empty or exceeds the day, or a param is out of range.
    pub fn validate(&self) -> Result<(), PlanError> {
        if self.params.slot_min == 0 || self.params.slot_min > MINUTES_PER_DAY {
            return Err(PlanError::InvalidParam(format!(
                "slotMin must be in [1, {MINUTES_PER_DAY}]"
            )));
        }
        if !(self.params.cooling_rate > 0.0 && self.params.cooling_rate <= 1.0) {
            return Err(PlanError::InvalidParam(
                "coolingRate must be in (0, 1]".into(),
            ));
        }
        if !(self.params.initial_temperature > 0.0) {
            return Err(PlanError::InvalidParam(
                "initialTemperature must be positive".into(),
            ));
        }

        let weights = &self.weights;
        let named = [
            ("wPriority", weights.priority),
            ("wDeadline", weights.deadline),
            ("wSwitch", weights.switch),
            ("wFatigue", weights.fatigue),
            ("wEnjoy", weights.enjoy),
        ];
        if let Some((name, _)) = named.iter().find(|(_, value)| !in_range(*value)) {
            return Err(PlanError::InvalidParam(format!(
                "{name} must be finite and at most {MAX_SCORE:e} in magnitude"
            )));
        }

        let mut seen = HashSet::with_capacity(self.tasks.len());
        for task in &self.tasks {
            if !seen.insert(task.task_id) {
                return Err(PlanError::DuplicateTask(task.task_id));
            }
            if task.duration_min == 0 {
                return Err(PlanError::ZeroDuration(task.task_id));
            }
            let scores = [
                ("priorityScore", task.priority_score),
                ("effort", task.effort),
                ("enjoyability", task.enjoyability),
            ];
            if let Some((name, _)) = scores.iter().find(|(_, value)| !in_range(*value)) {
                return Err(PlanError::InvalidTask(task.task_id, (*name).into()));
            }
            let times = [
                ("deadlineMs", task.deadline_ms),
                ("earliestStartMs", task.earliest_start_ms),
            ];
            if let Some((name, _)) = times
                .iter()
                .find(|(_, time)| time.is_some_and(|ms| !valid_timestamp(ms)))
            {
                return Err(PlanError::InvalidTask(task.task_id, (*name).into()));
            }
        }

        for window in &self.windows {
            if window.start_min >= window.end_min
                || window.end_min > MINUTES_PER_DAY
                || !valid_timestamp(window.date_ms)
            {
                return Err(PlanError::InvalidWindow {
                    date_ms: window.date_ms,
                    start_min: window.start_min,
                    end_min: window.end_min,
                });
            }
        }

        Ok(())
    }
}
