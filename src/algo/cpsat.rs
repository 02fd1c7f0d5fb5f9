use super::cp::{Backend, CpModel, Settings, BACKENDS};
use crate::core::{
    PlanBuilder, PlanError, PlanResult, Prepared, Problem, Strategy, StrategyKind, UnscheduleKind,
};
use serde::Serialize;
use std::fmt::{Display, Formatter};
use std::sync::OnceLock;
use std::time::Instant;
use tracing::{info, warn};

const MAX_TASKS: usize = 100;
const MAX_SLOTS: usize = 5000;

/// Termination status of a constraint search.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SearchStatus {
    /// Optimality was proven.
    Optimal,
    /// The time limit was hit with a non-empty plan.
    Feasible,
    /// The time limit was hit before anything was placed.
    Unknown,
}

impl Display for SearchStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Optimal => f.write_str("OPTIMAL"),
            Self::Feasible => f.write_str("FEASIBLE"),
            Self::Unknown => f.write_str("UNKNOWN"),
        }
    }
}

/// Constraint programming strategy.
/// Optional intervals per task with no-overlap and precedence, solved by a CP backend.
/// Available when a backend can be initialized.
#[derive(Debug, Default)]
pub struct CpSat {
    backend: OnceLock<Option<usize>>,
}

impl CpSat {
    fn backend(&self) -> Option<&'static Backend> {
        let index = self.backend.get_or_init(|| {
            BACKENDS.iter().position(|backend| match (backend.init)() {
                Ok(()) => true,
                Err(message) => {
                    warn!(backend = backend.name, error = %message, "CP backend is not available");
                    false
                }
            })
        });
        index.map(|index| &BACKENDS[index])
    }

    /// Solves the problem, optionally starting from a feasible plan.
    /// Returns the plan and how the search ended.
    ///
    /// # Errors
    /// - If no backend is available or the backend fails.
    pub fn solve(
        &self,
        problem: &Problem,
        hint: Option<&PlanResult>,
    ) -> Result<(PlanResult, SearchStatus), PlanError> {
        let Some(backend) = self.backend() else {
            return Err(PlanError::solver(self.name(), "no CP backend is available"));
        };
        super::within_bounds(self, problem);

        let started = Instant::now();
        let params = &problem.params;
        let prepared = Prepared::new(problem);
        if prepared.schedulable_len() == 0 {
            return Ok((PlanBuilder::new(&prepared).into(), SearchStatus::Optimal));
        }

        let model = CpModel::build(&prepared).map_err(|message| PlanError::solver(self.name(), message))?;
        let hint = hint.and_then(|plan| PlanBuilder::from_plan(&prepared, plan));
        let settings = Settings {
            time_limit: params.time_limit(),
            lower_bound: hint
                .as_ref()
                .map(|plan| model.objective(&model.choices(&prepared, plan))),
        };
        info!(
            backend = backend.name,
            intervals = model.intervals.len(),
            precedences = model.precedences.len(),
            warm_start = hint.is_some(),
            "solving CP-SAT"
        );

        let outcome = (backend.solve)(&model, &settings)
            .map_err(|message| PlanError::solver(self.name(), message))?;

        let found = outcome
            .choices
            .map_or_else(|| PlanBuilder::new(&prepared), |choices| model.plan(&prepared, &choices));
        let plan = match hint {
            Some(hint) if hint.calculate_score() > found.calculate_score() => {
                info!("CP-SAT kept the warm start");
                hint
            }
            _ => found,
        };

        let status = match (outcome.complete, plan.placed_len()) {
            (true, _) => SearchStatus::Optimal,
            (false, 0) => SearchStatus::Unknown,
            (false, _) => SearchStatus::Feasible,
        };
        let leftover = if outcome.complete {
            UnscheduleKind::NoCapacity
        } else {
            warn!(limit = params.max_time_sec, "CP-SAT time limit reached");
            UnscheduleKind::SolverTimeout
        };

        info!(
            %status,
            placed = plan.placed_len(),
            elapsed_ms = started.elapsed().as_millis(),
            "CP-SAT finished"
        );

        Ok((plan.into_plan(leftover), status))
    }
}

impl Strategy for CpSat {
    fn schedule(&self, problem: &Problem) -> Result<PlanResult, PlanError> {
        self.solve(problem, None).map(|(plan, _)| plan)
    }

    fn refine(&self, problem: &Problem, hint: &PlanResult) -> Result<PlanResult, PlanError> {
        self.solve(problem, Some(hint)).map(|(plan, _)| plan)
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Cpsat
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
static INSTANCE: fn() -> Box<dyn Strategy> = || Box::new(CpSat::default());

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{TaskInput, Window};

    #[cfg(not(feature = "pumpkin"))]
    #[test]
    fn without_backend_cpsat_is_unavailable() {
        let problem = Problem::with_defaults(vec![TaskInput::new(1, 30)], vec![Window::new(0, 0, 60)]);
        let cpsat = CpSat::default();
        assert!(!cpsat.is_available());
        assert!(matches!(
            cpsat.schedule(&problem),
            Err(PlanError::Solver { .. })
        ));
    }

    #[cfg(feature = "pumpkin")]
    #[test]
    fn test_cpsat() {
        assert!(crate::data::samples(true, &CpSat::default()).is_ok());
    }

    #[cfg(feature = "pumpkin")]
    #[test]
    fn dependent_task_follows_its_prerequisite() -> anyhow::Result<()> {
        let problem = Problem::with_defaults(
            vec![
                TaskInput::new(1, 60),
                TaskInput::new(2, 120).after([1]),
                TaskInput::new(3, 90),
            ],
            vec![Window::new(0, 540, 720), Window::new(0, 780, 960)],
        );
        let (plan, status) = CpSat::default().solve(&problem, None)?;

        assert_eq!(status, SearchStatus::Optimal);
        assert!(plan.verify(&problem));
        assert!(plan.scheduled_len() >= 2);
        let (Some(first), Some(second)) = (plan.assignment(1), plan.assignment(2)) else {
            panic!("the chain must be scheduled");
        };
        assert!(first.end_min <= second.start_min);
        Ok(())
    }

    #[cfg(feature = "pumpkin")]
    #[test]
    fn zero_time_limit_reports_timeouts() -> anyhow::Result<()> {
        let mut problem = Problem::with_defaults(
            (1..=30).map(|id| TaskInput::new(id, 45)).collect(),
            vec![Window::new(0, 0, 720)],
        );
        problem.params.max_time_sec = 0;

        let (plan, status) = CpSat::default().solve(&problem, None)?;
        assert_ne!(status, SearchStatus::Optimal);
        assert!(plan.verify(&problem));
        assert!(plan
            .un_scheduled
            .iter()
            .all(|r| r.kind == UnscheduleKind::SolverTimeout));
        Ok(())
    }

    #[cfg(feature = "pumpkin")]
    #[test]
    fn unbounded_time_limit_solves_to_optimality() -> anyhow::Result<()> {
        let mut problem = Problem::with_defaults(
            vec![TaskInput::new(1, 60), TaskInput::new(2, 60).after([1])],
            vec![Window::new(0, 0, 180)],
        );
        problem.params.max_time_sec = u64::MAX;

        let (plan, status) = CpSat::default().solve(&problem, None)?;
        assert_eq!(status, SearchStatus::Optimal);
        assert!(plan.is_complete());
        Ok(())
    }

    #[cfg(feature = "pumpkin")]
    #[test]
    fn repeated_solves_give_the_same_plan() -> anyhow::Result<()> {
        let problem = Problem::with_defaults(
            (1..=8_u32)
                .map(|id| {
                    TaskInput::new(u64::from(id), 30 + 15 * (id % 3)).with_priority(f64::from(id % 4))
                })
                .collect(),
            vec![Window::new(0, 480, 720), Window::new(0, 780, 900)],
        );
        let first = CpSat::default().schedule(&problem)?;
        let second = CpSat::default().schedule(&problem)?;
        assert_eq!(first, second);
        Ok(())
    }

    #[cfg(feature = "pumpkin")]
    #[test]
    fn refinement_is_not_worse_than_hint() -> anyhow::Result<()> {
        let problem = Problem::with_defaults(
            vec![
                TaskInput::new(1, 120).with_priority(5.0),
                TaskInput::new(2, 60),
                TaskInput::new(3, 60),
            ],
            vec![Window::new(0, 0, 120)],
        );
        let hint = crate::algo::Heuristic.schedule(&problem)?;
        let refined = CpSat::default().refine(&problem, &hint)?;

        assert!(refined.verify(&problem));
        assert!(refined.scheduled_len() >= hint.scheduled_len());
        assert_eq!(refined.scheduled_len(), 2);
        Ok(())
    }
}
