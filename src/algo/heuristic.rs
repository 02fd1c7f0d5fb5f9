use super::{annealing, greedy};
use crate::core::{PlanError, PlanResult, Prepared, Problem, Strategy, StrategyKind};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

/// Greedy construction followed by simulated annealing.
/// Always available and without size limits.
#[derive(Clone, Copy, Debug, Default)]
pub struct Heuristic;

impl Strategy for Heuristic {
    fn schedule(&self, problem: &Problem) -> Result<PlanResult, PlanError> {
        let prepared = Prepared::new(problem);
        let initial = greedy::construct(&prepared);
        let initial_score = initial.calculate_score();
        let placed = initial.placed_len();

        let mut rng = StdRng::seed_from_u64(problem.params.seed);
        let (plan, stats) = annealing::improve(initial, &problem.params, &mut rng);

        info!(
            initial = placed,
            improved = plan.placed_len(),
            iterations = stats.iterations,
            initial_score,
            score = plan.calculate_score(),
            "heuristic finished"
        );

        Ok(plan.into())
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Heuristic
    }
}

#[allow(unsafe_code)]
#[linkme::distributed_slice(super::STRATEGIES)]
static INSTANCE: fn() -> Box<dyn Strategy> = || Box::new(Heuristic);
