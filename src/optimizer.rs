//! Entry points: explicit or automatic strategy, and the fallback chain.

use crate::core::{PlanError, PlanResult, Problem, StrategyType};
use crate::factory::StrategyFactory;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// A scheduling request as exchanged with callers.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct Request {
    #[serde(flatten)]
    pub problem: Problem,
    #[serde(default)]
    pub strategy: StrategyType,
}

/// Runs strategies on problems. Holds no per-request state.
#[derive(Clone, Debug, Default)]
pub struct Optimizer {
    factory: StrategyFactory,
}

impl Optimizer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_factory(factory: StrategyFactory) -> Self {
        Self { factory }
    }

    #[must_use]
    pub const fn factory(&self) -> &StrategyFactory {
        &self.factory
    }

    /// Solves the problem with one strategy, selected by size for `StrategyType::Auto`.
    ///
    /// # Errors
    /// - If the problem is malformed.
    /// - If the strategy fails.
    pub fn optimize(&self, problem: &Problem, strategy: StrategyType) -> Result<PlanResult, PlanError> {
        problem.validate()?;

        let strategy = match strategy.kind() {
            Some(kind) => self.factory.create(kind),
            None => self
                .factory
                .create_best_for(problem.tasks.len(), problem.slot_count()),
        };

        info!(
            strategy = strategy.name(),
            tasks = problem.tasks.len(),
            windows = problem.windows.len(),
            "optimizing"
        );
        let plan = strategy.schedule(problem)?;
        info!(
            scheduled = plan.scheduled_len(),
            unscheduled = plan.un_scheduled.len(),
            "plan ready"
        );
        Ok(plan)
    }

    /// Tries the strategies of the fallback chain in order.
    /// Returns the first complete plan or the result of the last strategy; otherwise
    /// the plan that schedules the most tasks. Failing strategies are skipped.
    ///
    /// # Errors
    /// - If the problem is malformed.
    /// - If every strategy fails.
    pub fn optimize_with_fallback(&self, problem: &Problem) -> Result<PlanResult, PlanError> {
        problem.validate()?;

        let chain = self.factory.fallback_chain();
        let mut best: Option<PlanResult> = None;
        let mut failures = Vec::new();

        for (i, strategy) in chain.iter().enumerate() {
            let last = i + 1 == chain.len();
            info!(strategy = strategy.name(), "trying strategy");

            match strategy.schedule(problem) {
                Ok(plan) if plan.is_complete() || last => {
                    info!(
                        strategy = strategy.name(),
                        scheduled = plan.scheduled_len(),
                        unscheduled = plan.un_scheduled.len(),
                        "plan ready"
                    );
                    return Ok(plan);
                }
                Ok(plan) => {
                    info!(
                        strategy = strategy.name(),
                        unscheduled = plan.un_scheduled.len(),
                        "plan is incomplete, trying next strategy"
                    );
                    if best
                        .as_ref()
                        .map_or(true, |best| plan.scheduled_len() > best.scheduled_len())
                    {
                        best = Some(plan);
                    }
                }
                Err(err) => {
                    warn!(strategy = strategy.name(), %err, "strategy failed");
                    failures.push(format!("{}: {err}", strategy.name()));
                }
            }
        }

        best.ok_or(PlanError::AllStrategiesFailed { failures })
    }

    /// Serves a request with its own strategy selector, or the fallback chain.
    ///
    /// # Errors
    /// - See [`Optimizer::optimize`] and [`Optimizer::optimize_with_fallback`].
    pub fn run(&self, request: &Request, fallback: bool) -> Result<PlanResult, PlanError> {
        if fallback {
            self.optimize_with_fallback(&request.problem)
        } else {
            self.optimize(&request.problem, request.strategy)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{
        Assignment, Strategy, StrategyKind, TaskInput, UnScheduleReason, UnscheduleKind, Window,
    };
    use crate::factory::test::Stub;
    use std::sync::Arc;

    fn plan(scheduled: u64, unscheduled: u64) -> PlanResult {
        let assignments = (0..scheduled)
            .map(|id| Assignment::new(id, 0, 0, 15))
            .collect();
        let un_scheduled = (scheduled..scheduled + unscheduled)
            .map(|id| UnScheduleReason::new(id, UnscheduleKind::NoCapacity, "full"))
            .collect();
        PlanResult {
            assignments,
            un_scheduled,
        }
    }

    fn optimizer(strategies: Vec<Arc<Stub>>) -> Optimizer {
        let strategies = strategies
            .into_iter()
            .map(|s| s as Arc<dyn Strategy>)
            .collect();
        Optimizer::with_factory(StrategyFactory::with_strategies(strategies))
    }

    fn split_day() -> Problem {
        Problem::with_defaults(
            vec![
                TaskInput::new(1, 60),
                TaskInput::new(2, 120).after([1]),
                TaskInput::new(3, 90),
            ],
            vec![Window::new(0, 540, 720), Window::new(0, 780, 960)],
        )
    }

    fn broken_day() -> Problem {
        Problem::with_defaults(
            vec![
                TaskInput::new(1, 600),
                TaskInput::new(2, 30).after([3]),
                TaskInput::new(3, 30).after([2]),
                TaskInput::new(4, 60),
                TaskInput::new(5, 45),
            ],
            vec![Window::new(0, 480, 660), Window::new(0, 780, 1020)],
        )
    }

    #[test]
    fn complete_plan_stops_the_chain() -> anyhow::Result<()> {
        let cpsat = Arc::new(Stub::new(StrategyKind::Cpsat, Ok(plan(3, 0))));
        let milp = Arc::new(Stub::new(StrategyKind::Milp, Ok(plan(1, 2))));
        let heuristic = Arc::new(Stub::new(StrategyKind::Heuristic, Ok(plan(2, 1))));
        let optimizer = optimizer(vec![cpsat.clone(), milp.clone(), heuristic.clone()]);

        let result = optimizer.optimize_with_fallback(&split_day())?;
        assert_eq!(result, plan(3, 0));
        assert_eq!((cpsat.calls(), milp.calls(), heuristic.calls()), (1, 0, 0));
        Ok(())
    }

    #[test]
    fn last_strategy_result_is_returned() -> anyhow::Result<()> {
        let cpsat = Arc::new(Stub::new(StrategyKind::Cpsat, Ok(plan(2, 1))));
        let heuristic = Arc::new(Stub::new(StrategyKind::Heuristic, Ok(plan(1, 2))));
        let optimizer = optimizer(vec![cpsat, heuristic.clone()]);

        let result = optimizer.optimize_with_fallback(&split_day())?;
        assert_eq!(result, plan(1, 2));
        assert_eq!(heuristic.calls(), 1);
        Ok(())
    }

    #[test]
    fn failures_are_skipped() -> anyhow::Result<()> {
        let cpsat = Arc::new(Stub::new(
            StrategyKind::Cpsat,
            Err(PlanError::solver("CP-SAT", "crashed")),
        ));
        let milp = Arc::new(Stub::new(StrategyKind::Milp, Ok(plan(2, 1))));
        let heuristic = Arc::new(Stub::new(StrategyKind::Heuristic, Ok(plan(3, 0))));
        let optimizer = optimizer(vec![cpsat, milp, heuristic]);

        assert_eq!(optimizer.optimize_with_fallback(&split_day())?, plan(3, 0));
        Ok(())
    }

    #[test]
    fn best_partial_plan_survives_a_failing_tail() -> anyhow::Result<()> {
        let cpsat = Arc::new(Stub::new(StrategyKind::Cpsat, Ok(plan(1, 2))));
        let milp = Arc::new(Stub::new(StrategyKind::Milp, Ok(plan(2, 1))));
        let heuristic = Arc::new(Stub::new(
            StrategyKind::Heuristic,
            Err(PlanError::solver("Heuristic", "crashed")),
        ));
        let optimizer = optimizer(vec![cpsat, milp, heuristic]);

        assert_eq!(optimizer.optimize_with_fallback(&split_day())?, plan(2, 1));
        Ok(())
    }

    #[test]
    fn equal_partial_plans_keep_the_first() -> anyhow::Result<()> {
        let first = plan(2, 1);
        let mut second = plan(2, 1);
        second.assignments[0].start_min = 15;
        second.assignments[0].end_min = 30;

        let cpsat = Arc::new(Stub::new(StrategyKind::Cpsat, Ok(first.clone())));
        let milp = Arc::new(Stub::new(StrategyKind::Milp, Ok(second)));
        let heuristic = Arc::new(Stub::new(
            StrategyKind::Heuristic,
            Err(PlanError::solver("Heuristic", "crashed")),
        ));
        let optimizer = optimizer(vec![cpsat, milp, heuristic]);

        assert_eq!(optimizer.optimize_with_fallback(&split_day())?, first);
        Ok(())
    }

    #[test]
    fn all_failures_are_reported() {
        let fail = |kind, name| Arc::new(Stub::new(kind, Err(PlanError::solver(name, "crashed"))));
        let optimizer = optimizer(vec![
            fail(StrategyKind::Cpsat, "CP-SAT"),
            fail(StrategyKind::Heuristic, "Heuristic"),
        ]);

        let Err(PlanError::AllStrategiesFailed { failures }) =
            optimizer.optimize_with_fallback(&split_day())
        else {
            panic!("aggregate failure expected");
        };
        assert_eq!(failures.len(), 2);
        assert!(failures[0].starts_with("CP-SAT: "));
    }

    #[test]
    fn malformed_requests_are_rejected() {
        let mut problem = split_day();
        problem.tasks.push(TaskInput::new(1, 30));
        assert_eq!(
            Optimizer::new().optimize(&problem, StrategyType::Heuristic),
            Err(PlanError::DuplicateTask(1))
        );
    }

    #[test]
    fn every_strategy_schedules_the_split_day() -> anyhow::Result<()> {
        let problem = split_day();
        let optimizer = Optimizer::new();
        for strategy in [
            StrategyType::Auto,
            StrategyType::Heuristic,
            StrategyType::Milp,
            StrategyType::Cpsat,
            StrategyType::Hybrid,
        ] {
            let plan = optimizer.optimize(&problem, strategy)?;
            assert!(plan.verify(&problem), "{strategy:?} produced an invalid plan");
            assert!(plan.scheduled_len() >= 2, "{strategy:?} scheduled too little");
            if let (Some(first), Some(second)) = (plan.assignment(1), plan.assignment(2)) {
                assert!(first.precedes(second));
            }
        }
        Ok(())
    }

    #[test]
    fn structural_failures_are_reported_by_every_strategy() -> anyhow::Result<()> {
        let problem = broken_day();
        let optimizer = Optimizer::new();
        for strategy in [
            StrategyType::Heuristic,
            StrategyType::Milp,
            StrategyType::Cpsat,
            StrategyType::Hybrid,
        ] {
            let plan = optimizer.optimize(&problem, strategy)?;
            assert!(plan.verify(&problem));
            assert_eq!(plan.un_scheduled.len(), 3, "{strategy:?}");
            assert_eq!(plan.reason(1).map(|r| r.kind), Some(UnscheduleKind::Oversized));
            assert_eq!(plan.reason(2).map(|r| r.kind), Some(UnscheduleKind::CyclicDependency));
            assert_eq!(plan.reason(3).map(|r| r.kind), Some(UnscheduleKind::CyclicDependency));
        }

        let plan = optimizer.optimize_with_fallback(&problem)?;
        assert_eq!(plan.un_scheduled.len(), 3);
        Ok(())
    }

    #[test]
    fn request_reads_the_wire_format() -> anyhow::Result<()> {
        let json = r#"{
            "tasks": [{"taskId": 1, "durationMin": 30, "dependentTaskIds": []}],
            "windows": [{"dateMs": 0, "startMin": 540, "endMin": 600, "isDeepWork": true}],
            "weights": {"wPriority": 2.0},
            "params": {"slotMin": 30, "timeBudgetLS": 100},
            "strategy": "CPSAT"
        }"#;
        let request: Request = serde_json::from_str(json)?;

        assert_eq!(request.strategy, StrategyType::Cpsat);
        assert_eq!(request.problem.params.slot_min, 30);
        assert_eq!(request.problem.params.max_time_sec, 30);
        assert!((request.problem.weights.priority - 2.0).abs() < 1e-9);

        let plan = Optimizer::new().run(&request, false)?;
        assert!(plan.is_complete());
        Ok(())
    }
}
