//! Pre-processing shared by every strategy.
//!
//! Builds the precedence graph of a request, excludes the tasks that no strategy
//! could ever place (oversized, cyclic, unreachable time bounds, unschedulable
//! prerequisites) and enumerates the slot-aligned placements of the others.

use super::{
    Problem, TaskId, UnScheduleReason, UnscheduleKind, UtilityModel, MINUTES_PER_DAY,
    MS_PER_MINUTE,
};
use ahash::{HashMap, HashMapExt};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::debug;

/// A slot-aligned position a task may take.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Placement {
    pub date_ms: i64,
    pub start_min: u32,
    pub end_min: u32,
    /// Rank of `date_ms` among the days of the request.
    pub day: usize,
    pub deep_work: bool,
    /// Linear objective coefficient of the placement.
    pub value: f64,
}

impl Placement {
    /// Monotone time key of the start, comparable across days.
    #[must_use]
    pub fn start_key(&self) -> i64 {
        crate::cast_i64(self.day) * i64::from(MINUTES_PER_DAY) + i64::from(self.start_min)
    }

    /// Monotone time key of the end, comparable across days.
    #[must_use]
    pub fn end_key(&self) -> i64 {
        crate::cast_i64(self.day) * i64::from(MINUTES_PER_DAY) + i64::from(self.end_min)
    }

    /// Returns whether two placements share a minute.
    #[must_use]
    pub const fn overlaps(&self, other: &Self) -> bool {
        self.day == other.day && self.start_min < other.end_min && other.start_min < self.end_min
    }
}

/// A request after pre-processing.
#[derive(Clone, Debug)]
pub struct Prepared<'a> {
    pub problem: &'a Problem,
    /// Distinct window days in ascending order.
    pub days: Vec<i64>,
    /// Feasible placements per task index, ordered by time.
    pub candidates: Vec<Vec<Placement>>,
    /// Reason per task index for tasks that can never be placed.
    pub excluded: Vec<Option<UnScheduleReason>>,
    /// Prerequisite task indices per task index, restricted to the request.
    pub prerequisites: Vec<Vec<usize>>,
    /// Inverse of `prerequisites`.
    pub dependents: Vec<Vec<usize>>,
    /// Topological order of the schedulable tasks.
    pub order: Vec<usize>,
}

impl<'a> Prepared<'a> {
    /// Runs the pre-processing pass.
    #[must_use]
    pub fn new(problem: &'a Problem) -> Self {
        let n = problem.tasks.len();
        let index: HashMap<TaskId, usize> = problem
            .tasks
            .iter()
            .enumerate()
            .map(|(i, task)| (task.task_id, i))
            .collect();

        let mut prerequisites = vec![Vec::new(); n];
        let mut dependents = vec![Vec::new(); n];
        for (i, task) in problem.tasks.iter().enumerate() {
            for dep in &task.dependent_task_ids {
                if let Some(&j) = index.get(dep) {
                    if !prerequisites[i].contains(&j) {
                        prerequisites[i].push(j);
                        dependents[j].push(i);
                    }
                }
            }
        }

        let mut days: Vec<i64> = problem.windows.iter().map(|w| w.date_ms).collect();
        days.sort_unstable();
        days.dedup();

        let mut prepared = Self {
            problem,
            days,
            candidates: vec![Vec::new(); n],
            excluded: vec![None; n],
            prerequisites,
            dependents,
            order: Vec::with_capacity(n),
        };

        prepared.exclude_unfit();
        prepared.exclude_cycles();
        prepared.propagate();

        debug!(
            tasks = n,
            schedulable = prepared.order.len(),
            days = prepared.days.len(),
            "pre-processing done"
        );

        prepared
    }

    /// Returns the index of the task with the given id.
    #[must_use]
    pub fn index_of(&self, task: TaskId) -> Option<usize> {
        self.problem.tasks.iter().position(|t| t.task_id == task)
    }

    /// Returns whether the task at `index` may be placed by a strategy.
    #[must_use]
    pub fn is_schedulable(&self, index: usize) -> bool {
        self.excluded[index].is_none()
    }

    /// Returns the rank of the given day.
    #[must_use]
    pub fn day_of(&self, date_ms: i64) -> Option<usize> {
        self.days.binary_search(&date_ms).ok()
    }

    /// Number of schedulable tasks.
    #[must_use]
    pub fn schedulable_len(&self) -> usize {
        self.order.len()
    }

    /// Largest time key of any placement.
    #[must_use]
    pub fn horizon(&self) -> i64 {
        crate::cast_i64(self.days.len()) * i64::from(MINUTES_PER_DAY)
    }

    fn exclude_unfit(&mut self) {
        let problem = self.problem;
        let params = &problem.params;
        let model = UtilityModel::new(&problem.weights);
        let largest = problem.windows.iter().map(|w| w.capacity()).max();

        let mut windows = problem.windows.clone();
        windows.sort_unstable_by_key(|w| (w.date_ms, w.start_min, w.end_min));

        for (i, task) in problem.tasks.iter().enumerate() {
            let Some(largest) = largest else {
                self.exclude(i, UnscheduleKind::NoCapacity, "no windows available".into());
                continue;
            };
            if task.duration_min > largest {
                let reason = format!(
                    "duration {} min exceeds every window capacity (largest {largest} min)",
                    task.duration_min
                );
                self.exclude(i, UnscheduleKind::Oversized, reason);
                continue;
            }

            let length = params.round_up(task.duration_min);
            let mut candidates = Vec::new();
            for window in &windows {
                let Some(day) = self.day_of(window.date_ms) else {
                    continue;
                };
                let mut start = params.align(window.start_min);
                while let Some(end) = start.checked_add(length).filter(|&end| end <= window.end_min) {
                    let deep_work = problem
                        .window_at(window.date_ms, start, end)
                        .is_some_and(|w| w.is_deep_work);
                    candidates.push(Placement {
                        date_ms: window.date_ms,
                        start_min: start,
                        end_min: end,
                        day,
                        deep_work,
                        value: model.placement_value(task, window.date_ms, end, deep_work),
                    });
                    let Some(next) = start.checked_add(params.slot_min) else {
                        break;
                    };
                    start = next;
                }
            }
            candidates.sort_unstable_by_key(|p| (p.day, p.start_min));
            candidates.dedup_by_key(|p| (p.day, p.start_min));

            if candidates.is_empty() {
                let reason = format!(
                    "duration {} min does not fit the {}-minute grid of any window",
                    task.duration_min, params.slot_min
                );
                self.exclude(i, UnscheduleKind::Oversized, reason);
                continue;
            }

            candidates.retain(|p| {
                let start_ms = p.date_ms.saturating_add(i64::from(p.start_min) * MS_PER_MINUTE);
                let end_ms = p.date_ms.saturating_add(i64::from(p.end_min) * MS_PER_MINUTE);
                task.earliest_start_ms.map_or(true, |earliest| start_ms >= earliest)
                    && task.deadline_ms.map_or(true, |deadline| end_ms <= deadline)
            });

            if candidates.is_empty() {
                let reason = "no window placement satisfies earliest start and deadline";
                self.exclude(i, UnscheduleKind::InfeasibleDeadline, reason.into());
                continue;
            }

            self.candidates[i] = candidates;
        }
    }

    fn exclude_cycles(&mut self) {
        let mut graph = DiGraph::<usize, ()>::with_capacity(self.prerequisites.len(), 0);
        let nodes: Vec<NodeIndex> = (0..self.prerequisites.len())
            .map(|i| graph.add_node(i))
            .collect();
        for (i, prerequisites) in self.prerequisites.iter().enumerate() {
            for &j in prerequisites {
                graph.add_edge(nodes[j], nodes[i], ());
            }
        }

        for component in tarjan_scc(&graph) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&node| graph.contains_edge(node, node));
            if !cyclic {
                continue;
            }
            for node in component {
                let i = graph[node];
                if self.excluded[i].is_none() {
                    self.exclude(i, UnscheduleKind::CyclicDependency, "cyclic dependency".into());
                }
            }
        }
    }

    /// Walks the precedence graph in topological order, pruning placements that start
    /// before the earliest completion of a prerequisite.
    fn propagate(&mut self) {
        let n = self.prerequisites.len();
        let cyclic = |reason: &Option<UnScheduleReason>| {
            reason
                .as_ref()
                .is_some_and(|r| r.kind == UnscheduleKind::CyclicDependency)
        };

        let mut indegree = vec![0; n];
        for (i, prerequisites) in self.prerequisites.iter().enumerate() {
            indegree[i] = prerequisites
                .iter()
                .filter(|&&j| !cyclic(&self.excluded[j]))
                .count();
        }

        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| indegree[i] == 0 && !cyclic(&self.excluded[i]))
            .map(Reverse)
            .collect();

        while let Some(Reverse(i)) = ready.pop() {
            if self.excluded[i].is_none() {
                self.settle(i);
            }
            for k in 0..self.dependents[i].len() {
                let d = self.dependents[i][k];
                if cyclic(&self.excluded[d]) {
                    continue;
                }
                indegree[d] -= 1;
                if indegree[d] == 0 {
                    ready.push(Reverse(d));
                }
            }
        }
    }

    fn settle(&mut self, i: usize) {
        let mut earliest = i64::MIN;
        for k in 0..self.prerequisites[i].len() {
            let j = self.prerequisites[i][k];
            if self.excluded[j].is_some() {
                let reason = format!(
                    "prerequisite {} can not be scheduled",
                    self.problem.tasks[j].task_id
                );
                self.exclude(i, UnscheduleKind::DependencyUnscheduled, reason);
                return;
            }
            let first_end = self.candidates[j].iter().map(Placement::end_key).min();
            earliest = earliest.max(first_end.unwrap_or(i64::MAX));
        }

        self.candidates[i].retain(|p| p.start_key() >= earliest);
        if self.candidates[i].is_empty() {
            let reason = "no placement after the earliest completion of its prerequisites";
            self.exclude(i, UnscheduleKind::InfeasibleDeadline, reason.into());
            return;
        }

        self.order.push(i);
    }

    fn exclude(&mut self, i: usize, kind: UnscheduleKind, reason: String) {
        let task = self.problem.tasks[i].task_id;
        self.candidates[i].clear();
        self.excluded[i] = Some(UnScheduleReason::new(task, kind, reason));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{TaskInput, Window};

    const DAY_MS: i64 = 86_400_000;

    fn kind(prepared: &Prepared, task: TaskId) -> Option<UnscheduleKind> {
        let index = prepared.index_of(task)?;
        prepared.excluded[index].as_ref().map(|r| r.kind)
    }

    #[test]
    fn oversized_and_cyclic_tasks_are_excluded() {
        let problem = Problem::with_defaults(
            vec![
                TaskInput::new(1, 600),
                TaskInput::new(2, 30).after([3]),
                TaskInput::new(3, 30).after([2]),
                TaskInput::new(4, 30),
            ],
            vec![Window::new(0, 480, 660), Window::new(0, 780, 1020)],
        );
        let prepared = Prepared::new(&problem);

        assert_eq!(kind(&prepared, 1), Some(UnscheduleKind::Oversized));
        assert_eq!(kind(&prepared, 2), Some(UnscheduleKind::CyclicDependency));
        assert_eq!(kind(&prepared, 3), Some(UnscheduleKind::CyclicDependency));
        assert_eq!(kind(&prepared, 4), None);
        assert_eq!(prepared.order, vec![3]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let problem = Problem::with_defaults(
            vec![TaskInput::new(1, 30).after([1])],
            vec![Window::new(0, 0, 120)],
        );
        let prepared = Prepared::new(&problem);
        assert_eq!(kind(&prepared, 1), Some(UnscheduleKind::CyclicDependency));
    }

    #[test]
    fn dependents_of_unschedulable_tasks_are_excluded() {
        let problem = Problem::with_defaults(
            vec![
                TaskInput::new(1, 30).after([2]),
                TaskInput::new(2, 30).after([1]),
                TaskInput::new(3, 30).after([1]),
                TaskInput::new(4, 30).after([3]),
            ],
            vec![Window::new(0, 0, 240)],
        );
        let prepared = Prepared::new(&problem);
        assert_eq!(kind(&prepared, 3), Some(UnscheduleKind::DependencyUnscheduled));
        assert_eq!(kind(&prepared, 4), Some(UnscheduleKind::DependencyUnscheduled));
    }

    #[test]
    fn unknown_prerequisites_are_ignored() {
        let problem = Problem::with_defaults(
            vec![TaskInput::new(1, 30).after([99])],
            vec![Window::new(0, 0, 60)],
        );
        let prepared = Prepared::new(&problem);
        assert!(prepared.is_schedulable(0));
        assert_eq!(prepared.candidates[0].len(), 3);
    }

    #[test]
    fn candidates_follow_slot_grid_and_bounds() {
        let problem = Problem::with_defaults(
            vec![
                TaskInput::new(1, 20).with_earliest_start(40 * 60_000),
                TaskInput::new(2, 30).with_deadline(DAY_MS - 1),
            ],
            vec![Window::new(0, 5, 65), Window::new(DAY_MS, 0, 60)],
        );
        let prepared = Prepared::new(&problem);

        let starts: Vec<_> = prepared.candidates[0]
            .iter()
            .map(|p| (p.day, p.start_min, p.end_min))
            .collect();
        assert_eq!(starts, vec![(1, 0, 30), (1, 15, 45), (1, 30, 60)]);
        assert!(prepared.candidates[1].iter().all(|p| p.day == 0));
    }

    #[test]
    fn unreachable_deadline_is_reported() {
        let problem = Problem::with_defaults(
            vec![
                TaskInput::new(1, 60),
                TaskInput::new(2, 60).after([1]).with_deadline(60 * 60_000),
            ],
            vec![Window::new(0, 0, 180)],
        );
        let prepared = Prepared::new(&problem);
        assert_eq!(kind(&prepared, 2), Some(UnscheduleKind::InfeasibleDeadline));

        let tight = Problem::with_defaults(
            vec![TaskInput::new(1, 60).with_deadline(30 * 60_000)],
            vec![Window::new(0, 0, 180)],
        );
        let prepared = Prepared::new(&tight);
        assert_eq!(kind(&prepared, 1), Some(UnscheduleKind::InfeasibleDeadline));
    }

    #[test]
    fn dependent_placements_start_after_prerequisite() {
        let problem = Problem::with_defaults(
            vec![TaskInput::new(1, 60), TaskInput::new(2, 60).after([1])],
            vec![Window::new(0, 0, 180)],
        );
        let prepared = Prepared::new(&problem);
        assert_eq!(prepared.order, vec![0, 1]);
        assert!(prepared.candidates[1].iter().all(|p| p.start_min >= 60));
    }

    #[test]
    fn slot_wider_than_the_day_leaves_no_candidates() {
        let mut problem = Problem::with_defaults(
            vec![TaskInput::new(1, 30)],
            vec![Window::new(0, 0, MINUTES_PER_DAY)],
        );
        problem.params.slot_min = 3_000_000_000;
        let prepared = Prepared::new(&problem);
        assert_eq!(kind(&prepared, 1), Some(UnscheduleKind::Oversized));
    }

    #[test]
    fn no_windows_means_no_capacity() {
        let problem = Problem::with_defaults(vec![TaskInput::new(1, 10)], vec![]);
        let prepared = Prepared::new(&problem);
        assert_eq!(kind(&prepared, 1), Some(UnscheduleKind::NoCapacity));
    }
}
