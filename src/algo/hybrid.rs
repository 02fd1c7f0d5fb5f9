use super::{CpSat, Heuristic, Milp};
use crate::core::{PlanError, PlanResult, Problem, Strategy, StrategyKind};
use tracing::{info, warn};

/// Heuristic plan refined by an exact strategy.
/// The heuristic plan warm-starts CP-SAT, or MILP when CP-SAT is not available.
/// Without an exact strategy the heuristic plan is returned as is.
#[derive(Debug, Default)]
pub struct Hybrid {
    cpsat: CpSat,
    milp: Milp,
}

impl Hybrid {
    fn refiner(&self) -> Option<&dyn Strategy> {
        if self.cpsat.is_available() {
            Some(&self.cpsat)
        } else if self.milp.is_available() {
            Some(&self.milp)
        } else {
            None
        }
    }
}

impl Strategy for Hybrid {
    fn schedule(&self, problem: &Problem) -> Result<PlanResult, PlanError> {
        let initial = Heuristic.schedule(problem)?;

        let Some(refiner) = self.refiner() else {
            warn!("no exact strategy available, keeping the heuristic plan");
            return Ok(initial);
        };

        let refined = refiner.refine(problem, &initial)?;
        info!(
            refiner = refiner.name(),
            initial = initial.scheduled_len(),
            refined = refined.scheduled_len(),
            "hybrid refinement finished"
        );

        if refined.objective() < initial.objective() {
            return Ok(initial);
        }
        Ok(refined)
    }

    fn kind(&self) -> StrategyKind {
        StrategyKind::Hybrid
    }
}

#[allow(unsafe_code)]
#[linkme::distributed_slice(super::STRATEGIES)]
static INSTANCE: fn() -> Box<dyn Strategy> = || Box::new(Hybrid::default());
