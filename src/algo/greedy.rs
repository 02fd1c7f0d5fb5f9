use crate::core::{PlanBuilder, Prepared, TaskId, UtilityModel, MS_PER_MINUTE};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A task whose prerequisites have all been visited.
/// Ordered by construction key, then by ascending task id.
#[derive(Clone, Copy, Debug)]
struct Ready {
    key: f64,
    id: TaskId,
    index: usize,
}

impl PartialEq for Ready {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ready {}

impl PartialOrd for Ready {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ready {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.key.total_cmp(&other.key) {
            Ordering::Equal => other.id.cmp(&self.id),
            order => order,
        }
    }
}

/// Greedy construction.
/// Visits tasks in topological order, choosing the ready task with the highest key,
/// and puts each one into the earliest free placement.
pub(super) fn construct<'p, 'a>(prepared: &'p Prepared<'a>) -> PlanBuilder<'p, 'a> {
    let problem = prepared.problem;
    let model = UtilityModel::new(&problem.weights);
    let horizon = problem
        .windows
        .iter()
        .map(|w| w.date_ms.saturating_add(i64::from(w.start_min) * MS_PER_MINUTE))
        .min()
        .unwrap_or_default();

    let ready = |index: usize| Ready {
        key: model.priority_key(&problem.tasks[index], horizon),
        id: problem.tasks[index].task_id,
        index,
    };

    let mut indegree: Vec<usize> = prepared.prerequisites.iter().map(Vec::len).collect();
    let mut queue: BinaryHeap<Ready> = prepared
        .order
        .iter()
        .filter(|&&index| indegree[index] == 0)
        .map(|&index| ready(index))
        .collect();

    let mut builder = PlanBuilder::new(prepared);

    while let Some(task) = queue.pop() {
        let blocked = prepared.prerequisites[task.index]
            .iter()
            .any(|&before| builder.placement(before).is_none());
        if !blocked {
            if let Some(placement) = builder.first_fit(task.index) {
                builder.place(task.index, placement);
            }
        }

        for &after in &prepared.dependents[task.index] {
            indegree[after] -= 1;
            if indegree[after] == 0 && prepared.is_schedulable(after) {
                queue.push(ready(after));
            }
        }
    }

    builder
}
