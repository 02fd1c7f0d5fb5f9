use super::{
    Assignment, Placement, PlanResult, Prepared, UnScheduleReason, UnscheduleKind, UtilityModel,
    PLACEMENT_REWARD,
};

/// A builder for creating a plan.
/// Keeps per-day occupancy so that placements can be checked for overlap and precedence.
#[derive(Clone, Debug)]
pub struct PlanBuilder<'p, 'a> {
    prepared: &'p Prepared<'a>,
    placed: Vec<Option<Placement>>,
    days: Vec<Vec<usize>>,
}

impl<'p, 'a> PlanBuilder<'p, 'a> {
    /// Creates an empty plan builder.
    #[must_use]
    pub fn new(prepared: &'p Prepared<'a>) -> Self {
        Self {
            prepared,
            placed: vec![None; prepared.problem.tasks.len()],
            days: vec![Vec::new(); prepared.days.len()],
        }
    }

    /// Rebuilds the placements of a plan.
    /// Returns `None` if any assignment is not a feasible placement.
    #[must_use]
    pub fn from_plan(prepared: &'p Prepared<'a>, plan: &PlanResult) -> Option<Self> {
        let mut builder = Self::new(prepared);
        let mut assignments: Vec<_> = plan.assignments.iter().collect();
        assignments.sort_unstable_by_key(|a| (a.date_ms, a.start_min));

        for assignment in assignments {
            let task = prepared.index_of(assignment.task_id)?;
            let day = prepared.day_of(assignment.date_ms)?;
            let placement = builder.candidate_at(task, day, assignment.start_min)?;
            if placement.end_min != assignment.end_min || !builder.fits(task, &placement) {
                return None;
            }
            builder.place(task, placement);
        }

        Some(builder)
    }

    /// Returns the pre-processed request.
    #[must_use]
    pub const fn prepared(&self) -> &'p Prepared<'a> {
        self.prepared
    }

    /// Places a task. The placement must fit.
    pub fn place(&mut self, task: usize, placement: Placement) {
        let day = &mut self.days[placement.day];
        let position = day.partition_point(|&other| {
            self.placed[other].is_some_and(|p| p.start_min < placement.start_min)
        });
        day.insert(position, task);
        self.placed[task] = Some(placement);
    }

    /// Removes a task from the plan and returns its placement.
    pub fn remove(&mut self, task: usize) -> Option<Placement> {
        let placement = self.placed[task].take()?;
        self.days[placement.day].retain(|&other| other != task);
        Some(placement)
    }

    /// Returns the placement of a task.
    #[must_use]
    pub fn placement(&self, task: usize) -> Option<&Placement> {
        self.placed[task].as_ref()
    }

    /// Returns the placed tasks.
    pub fn placed_tasks(&self) -> impl Iterator<Item = usize> + '_ {
        self.placed
            .iter()
            .enumerate()
            .filter_map(|(task, placement)| placement.map(|_| task))
    }

    /// Returns the schedulable tasks which are not placed.
    pub fn unplaced_tasks(&self) -> impl Iterator<Item = usize> + '_ {
        self.prepared
            .order
            .iter()
            .copied()
            .filter(|&task| self.placed[task].is_none())
    }

    /// Number of placed tasks.
    #[must_use]
    pub fn placed_len(&self) -> usize {
        self.placed.iter().filter(|p| p.is_some()).count()
    }

    /// Returns the candidate placement of a task starting at the given day and minute.
    #[must_use]
    pub fn candidate_at(&self, task: usize, day: usize, start_min: u32) -> Option<Placement> {
        let candidates = &self.prepared.candidates[task];
        let index = candidates
            .binary_search_by_key(&(day, start_min), |p| (p.day, p.start_min))
            .ok()?;
        Some(candidates[index])
    }

    /// Check if the placement is not in conflict with other tasks of the same day.
    #[must_use]
    pub fn is_free(&self, placement: &Placement) -> bool {
        self.days[placement.day].iter().all(|&other| {
            self.placed[other].map_or(true, |p| !p.overlaps(placement))
        })
    }

    /// Checks whether the task can take the placement in the current plan.
    /// All prerequisites must be placed and finished before it starts,
    /// and every placed dependent must start after it ends.
    #[must_use]
    pub fn fits(&self, task: usize, placement: &Placement) -> bool {
        let prepared = self.prepared;
        self.is_free(placement)
            && prepared.prerequisites[task].iter().all(|&before| {
                self.placed[before].is_some_and(|p| p.end_key() <= placement.start_key())
            })
            && prepared.dependents[task].iter().all(|&after| {
                self.placed[after].map_or(true, |p| placement.end_key() <= p.start_key())
            })
    }

    /// Calculates the first placement of the task that fits, in time order.
    #[must_use]
    pub fn first_fit(&self, task: usize) -> Option<Placement> {
        self.prepared.candidates[task]
            .iter()
            .find(|placement| self.fits(task, placement))
            .copied()
    }

    /// Scored assignments of the placed tasks, sorted by day and start.
    #[must_use]
    pub fn assignments(&self) -> Vec<Assignment> {
        let problem = self.prepared.problem;
        let mut assignments: Vec<_> = self
            .placed_tasks()
            .filter_map(|task| {
                let placement = self.placed[task]?;
                let id = problem.tasks[task].task_id;
                let assignment = Assignment::new(
                    id,
                    placement.date_ms,
                    placement.start_min,
                    placement.end_min,
                );
                Some(assignment)
            })
            .collect();
        UtilityModel::new(&problem.weights).score_plan(problem, &mut assignments);
        assignments
    }

    /// Calculates the plan objective: rewards placed tasks, then utility.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn calculate_score(&self) -> f64 {
        let assignments = self.assignments();
        let utility: f64 = assignments.iter().map(|a| a.utility).sum();
        assignments.len() as f64 * PLACEMENT_REWARD + utility
    }

    /// Sum of the linear placement values, the objective of the exact models.
    #[must_use]
    pub fn linear_score(&self) -> f64 {
        self.placed.iter().flatten().map(|p| p.value).sum()
    }

    /// Finishes the plan. Schedulable tasks that are not placed are reported with
    /// `leftover`, or as blocked by a prerequisite that is not placed.
    #[must_use]
    pub fn into_plan(self, leftover: UnscheduleKind) -> PlanResult {
        let assignments = self.assignments();
        let problem = self.prepared.problem;
        let mut un_scheduled = Vec::new();

        for (task, input) in problem.tasks.iter().enumerate() {
            if let Some(reason) = &self.prepared.excluded[task] {
                un_scheduled.push(reason.clone());
                continue;
            }
            if self.placed[task].is_some() {
                continue;
            }

            let blocked = self.prepared.prerequisites[task]
                .iter()
                .find(|&&before| self.placed[before].is_none());
            let reason = match (leftover, blocked) {
                (UnscheduleKind::SolverTimeout, _) => UnScheduleReason::new(
                    input.task_id,
                    leftover,
                    "solver time limit reached before placing the task",
                ),
                (_, Some(&before)) => UnScheduleReason::new(
                    input.task_id,
                    UnscheduleKind::DependencyUnscheduled,
                    format!("prerequisite {} is not scheduled", problem.tasks[before].task_id),
                ),
                (_, None) => UnScheduleReason::new(
                    input.task_id,
                    leftover,
                    "no free window capacity satisfies its constraints",
                ),
            };
            un_scheduled.push(reason);
        }

        PlanResult {
            assignments,
            un_scheduled,
        }
    }
}

impl<'p, 'a> From<PlanBuilder<'p, 'a>> for PlanResult {
    fn from(builder: PlanBuilder<'p, 'a>) -> Self {
        builder.into_plan(UnscheduleKind::NoCapacity)
    }
}
