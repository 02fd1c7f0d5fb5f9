//! Mixed integer model of the window scheduling problem.
//!
//! Every candidate placement of a schedulable task is a binary column. Rows are kept
//! in the `sum(coefficient * column) <= rhs` form so that any backend can load them:
//!
//! - a task takes at most one placement,
//! - every slot of a day is used by at most one placement,
//! - a placed dependent needs its prerequisite placed (gating),
//! - a placed dependent starts after its prerequisite ends (big-M ordering).
#![allow(clippy::cast_precision_loss)]

use crate::core::{
    Params, Placement, PlanBuilder, PlanError, PlanResult, Prepared, Problem, Strategy,
    StrategyKind, UnscheduleKind,
};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::{info, warn};

/// A binary decision: task `task` takes `placement`.
#[derive(Clone, Copy, Debug)]
pub(super) struct Column {
    pub task: usize,
    pub placement: Placement,
}

/// Linear row `sum(coefficient * column) <= rhs`.
#[derive(Clone, Debug, Default)]
pub(super) struct Row {
    pub terms: Vec<(usize, f64)>,
    pub rhs: f64,
}

/// Backend independent linear model. The objective maximizes the placement values.
#[derive(Clone, Debug, Default)]
pub(super) struct LinearModel {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl LinearModel {
    pub fn build(prepared: &Prepared) -> Self {
        let mut columns = Vec::new();
        let mut by_task = vec![Vec::new(); prepared.problem.tasks.len()];
        for &task in &prepared.order {
            for &placement in &prepared.candidates[task] {
                by_task[task].push(columns.len());
                columns.push(Column { task, placement });
            }
        }

        let mut rows = Vec::new();
        let one = |column: &usize| (*column, 1.0);

        for task_columns in by_task.iter().filter(|c| c.len() > 1) {
            rows.push(Row {
                terms: task_columns.iter().map(one).collect(),
                rhs: 1.0,
            });
        }

        let slot = prepared.problem.params.slot_min;
        let mut slots: BTreeMap<(usize, u32), Vec<usize>> = BTreeMap::new();
        for (c, column) in columns.iter().enumerate() {
            let placement = &column.placement;
            let mut minute = Some(placement.start_min);
            while let Some(current) = minute.filter(|&m| m < placement.end_min) {
                slots.entry((placement.day, current)).or_default().push(c);
                minute = current.checked_add(slot);
            }
        }
        for users in slots.values().filter(|users| users.len() > 1) {
            rows.push(Row {
                terms: users.iter().map(one).collect(),
                rhs: 1.0,
            });
        }

        let big_m = prepared.horizon() as f64;
        for &after in &prepared.order {
            for &before in &prepared.prerequisites[after] {
                let mut gating: Vec<_> = by_task[after].iter().map(one).collect();
                gating.extend(by_task[before].iter().map(|&c| (c, -1.0)));
                rows.push(Row {
                    terms: gating,
                    rhs: 0.0,
                });

                let starts = by_task[after].iter().map(|&c| {
                    let start = columns[c].placement.start_key() as f64;
                    (c, big_m - start)
                });
                let ends = by_task[before]
                    .iter()
                    .map(|&c| (c, columns[c].placement.end_key() as f64));
                rows.push(Row {
                    terms: starts.chain(ends).collect(),
                    rhs: big_m,
                });
            }
        }

        Self { columns, rows }
    }

    /// Column values of a plan, used as a warm start.
    pub fn hint(&self, plan: &PlanBuilder) -> Vec<f64> {
        self.columns
            .iter()
            .map(|column| match plan.placement(column.task) {
                Some(placement) if *placement == column.placement => 1.0,
                _ => 0.0,
            })
            .collect()
    }

    /// Rebuilds a plan from column values. Placements are replayed in topological
    /// order and any that does not fit is dropped.
    pub fn decode<'p, 'a>(&self, prepared: &'p Prepared<'a>, values: &[f64]) -> PlanBuilder<'p, 'a> {
        let mut chosen = vec![None; prepared.problem.tasks.len()];
        for (column, &value) in self.columns.iter().zip(values) {
            if value > 0.5 {
                chosen[column.task] = Some(column.placement);
            }
        }

        let mut plan = PlanBuilder::new(prepared);
        for &task in &prepared.order {
            if let Some(placement) = chosen[task] {
                if plan.fits(task, &placement) {
                    plan.place(task, placement);
                } else {
                    warn!(task, "dropping infeasible solver placement");
                }
            }
        }
        plan
    }
}

/// Result of a backend solve.
#[derive(Clone, Debug, Default)]
pub(super) struct Outcome {
    /// Column values of the best solution found, if any.
    pub values: Option<Vec<f64>>,
    pub timed_out: bool,
}

/// A linear solver able to load a [`LinearModel`].
pub(super) struct Backend {
    pub name: &'static str,
    pub init: fn() -> Result<(), String>,
    pub solve: fn(&LinearModel, &Params, Option<&[f64]>) -> Result<Outcome, String>,
}

/// Backends in order of preference.
const BACKENDS: &[Backend] = &[
    #[cfg(feature = "gurobi")]
    super::gurobi::BACKEND,
    #[cfg(feature = "highs")]
    super::lp::HIGHS,
    #[cfg(feature = "microlp")]
    super::lp::MICROLP,
];

const MAX_TASKS: usize = 30;
const MAX_SLOTS: usize = 2000;

/// Exact strategy solving the mixed integer model.
/// Available when a backend can be initialized.
#[derive(Debug, Default)]
pub struct Milp {
    backend: OnceLock<Option<usize>>,
}

impl Milp {
    fn backend(&self) -> Option<&'static Backend> {
        let index = self.backend.get_or_init(|| {
            BACKENDS.iter().position(|backend| match (backend.init)() {
                Ok(()) => true,
                Err(message) => {
                    warn!(backend = backend.name, error = %message, "MILP backend is not available");
                    false
                }
            })
        });
        index.map(|index| &BACKENDS[index])
    }

    fn solve(&self, problem: &Problem, hint: Option<&PlanResult>) -> Result<PlanResult, PlanError> {
        let Some(backend) = self.backend() else {
            return Err(PlanError::solver(self.name(), "no MILP backend is available"));
        };
        super::within_bounds(self, problem);

        let prepared = Prepared::new(problem);
        if prepared.schedulable_len() == 0 {
            return Ok(PlanBuilder::new(&prepared).into());
        }

        let hint = hint.and_then(|plan| PlanBuilder::from_plan(&prepared, plan));
        let model = LinearModel::build(&prepared);
        let start = hint.as_ref().map(|plan| model.hint(plan));
        info!(
            backend = backend.name,
            columns = model.columns.len(),
            rows = model.rows.len(),
            warm_start = start.is_some(),
            "solving MILP"
        );

        let outcome = (backend.solve)(&model, &problem.params, start.as_deref())
            .map_err(|message| PlanError::solver(self.name(), message))?;
        let leftover = if outcome.timed_out {
            warn!(limit = problem.params.max_time_sec, "MILP time limit reached");
            UnscheduleKind::SolverTimeout
        } else {
            UnscheduleKind::NoCapacity
        };

        let plan = outcome
            .values
            .map_or_else(|| PlanBuilder::new(&prepared), |values| model.decode(&prepared, &values));

        match hint {
            Some(hint) if hint.calculate_score() > plan.calculate_score() => {
                info!("MILP kept the warm start");
                Ok(hint.into_plan(leftover))
            }
            _ => {
                info!(placed = plan.placed_len(), "MILP finished");
                Ok(plan.into_plan(leftover))
            }
        }
    }
}

impl Strategy for Milp {
    fn schedule(&self, problem: &Problem) -> Result<PlanResult, PlanError> {
        self.solve(problem, None)
    }

    fn refine(&self, problem: &Problem, hint: &PlanResult) -> Result<PlanResult, PlanError> {
        self.solve(problem, Some(hint))
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Milp
    }

    fn is_available(&self) -> bool {
        self.backend().is_some()
    }

    fn max_recommended_tasks(&self) -> usize {
        MAX_TASKS
    }

    fn max_recommended_slots(&self) -> usize {
        MAX_SLOTS
    }
}

#[allow(unsafe_code)]
#[linkme::distributed_slice(super::STRATEGIES)]
static INSTANCE: fn() -> Box<dyn Strategy> = || Box::new(Milp::default());

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{TaskInput, Window};
    #[cfg(feature = "microlp")]
    use crate::data::samples;

    #[cfg(feature = "microlp")]
    #[test]
    fn test_milp() {
        assert!(samples(true, &Milp::default()).is_ok());
    }

    fn chain() -> Problem {
        Problem::with_defaults(
            vec![TaskInput::new(1, 60), TaskInput::new(2, 60).after([1])],
            vec![Window::new(0, 0, 180)],
        )
    }

    #[test]
    fn model_has_columns_per_candidate() {
        let problem = chain();
        let prepared = Prepared::new(&problem);
        let model = LinearModel::build(&prepared);

        let candidates: usize = prepared.candidates.iter().map(Vec::len).sum();
        assert_eq!(model.columns.len(), candidates);
        assert!(model.rows.iter().all(|row| !row.terms.is_empty()));
    }

    #[test]
    fn ordering_row_rejects_overlapping_precedence() {
        let problem = chain();
        let prepared = Prepared::new(&problem);
        let model = LinearModel::build(&prepared);

        let pick = |task: usize, start: u32| {
            model
                .columns
                .iter()
                .position(|c| c.task == task && c.placement.start_min == start)
        };
        let satisfied = |values: &[f64]| {
            model.rows.iter().all(|row| {
                let lhs: f64 = row.terms.iter().map(|&(c, coef)| coef * values[c]).sum();
                lhs <= row.rhs + 1e-9
            })
        };

        let (Some(first), Some(second), Some(late_first)) = (pick(0, 0), pick(1, 60), pick(0, 105))
        else {
            panic!("expected candidate columns");
        };
        let mut values = vec![0.0; model.columns.len()];
        values[first] = 1.0;
        values[second] = 1.0;
        assert!(satisfied(&values));

        values[first] = 0.0;
        values[late_first] = 1.0;
        assert!(!satisfied(&values));

        values[late_first] = 0.0;
        assert!(!satisfied(&values));
    }

    #[test]
    fn decode_replays_in_topological_order() {
        let problem = chain();
        let prepared = Prepared::new(&problem);
        let model = LinearModel::build(&prepared);

        let values: Vec<f64> = model
            .columns
            .iter()
            .map(|c| {
                let start = if c.task == 0 { 0 } else { 60 };
                if c.placement.start_min == start { 1.0 } else { 0.0 }
            })
            .collect();
        let plan = model.decode(&prepared, &values);
        assert_eq!(plan.placed_len(), 2);
        assert_eq!(model.hint(&plan), values);
    }

    #[cfg(feature = "microlp")]
    #[test]
    fn exact_plan_beats_greedy_choice() -> anyhow::Result<()> {
        let problem = Problem::with_defaults(
            vec![
                TaskInput::new(1, 120).with_priority(5.0),
                TaskInput::new(2, 60),
                TaskInput::new(3, 60),
            ],
            vec![Window::new(0, 0, 120)],
        );
        let milp = Milp::default();
        assert!(milp.is_available());

        let plan = milp.schedule(&problem)?;
        assert!(plan.verify(&problem));
        assert_eq!(plan.scheduled_len(), 2);
        assert_eq!(plan.reason(1).map(|r| r.kind), Some(UnscheduleKind::NoCapacity));
        Ok(())
    }

    #[cfg(feature = "microlp")]
    #[test]
    fn exact_plan_respects_precedence() -> anyhow::Result<()> {
        let problem = Problem::with_defaults(
            vec![
                TaskInput::new(1, 60),
                TaskInput::new(2, 60).after([1]).with_priority(3.0),
                TaskInput::new(3, 30).after([2]),
            ],
            vec![Window::new(0, 0, 90), Window::new(86_400_000, 0, 120)],
        );
        let plan = Milp::default().schedule(&problem)?;
        assert!(plan.verify(&problem));
        assert!(plan.is_complete());
        Ok(())
    }

    #[cfg(feature = "microlp")]
    #[test]
    fn unbounded_time_limit_is_accepted() -> anyhow::Result<()> {
        let mut problem = chain();
        problem.params.max_time_sec = u64::MAX;
        let plan = Milp::default().schedule(&problem)?;
        assert!(plan.verify(&problem));
        assert!(plan.is_complete());
        Ok(())
    }

    #[test]
    fn bounds_are_recommended() {
        let milp = Milp::default();
        assert!(milp.can_handle(30, 2000));
        assert!(!milp.can_handle(31, 10));
        assert!(!milp.can_handle(10, 2001));
    }
}
