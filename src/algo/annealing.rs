use crate::core::{Params, PlanBuilder};
use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::Rng;
use std::time::Instant;
use tracing::debug;

/// Annealing stops once the temperature falls below this value.
const MIN_TEMPERATURE: f64 = 0.01;

/// Neighborhood moves of the local search.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Move {
    /// Exchanges the positions of two placed tasks.
    Swap,
    /// Moves a placed task to another candidate position.
    Relocate,
    /// Places a task that is not part of the plan.
    Insert,
}

impl Move {
    fn random(rng: &mut StdRng) -> Self {
        match rng.gen_range(0..5) {
            0 | 1 => Self::Swap,
            2 | 3 => Self::Relocate,
            _ => Self::Insert,
        }
    }
}

/// Applies a random move to `plan`.
/// Returns `false` if the move is infeasible, in which case `plan` must be discarded.
fn apply(plan: &mut PlanBuilder, rng: &mut StdRng) -> bool {
    match Move::random(rng) {
        Move::Swap => swap(plan, rng),
        Move::Relocate => relocate(plan, rng),
        Move::Insert => insert(plan, rng),
    }
}

fn swap(plan: &mut PlanBuilder, rng: &mut StdRng) -> bool {
    let tasks = plan.placed_tasks().choose_multiple(rng, 2);
    let &[first, second] = tasks.as_slice() else {
        return false;
    };
    let (Some(a), Some(b)) = (plan.remove(first), plan.remove(second)) else {
        return false;
    };

    let (Some(to_b), Some(to_a)) = (
        plan.candidate_at(first, b.day, b.start_min),
        plan.candidate_at(second, a.day, a.start_min),
    ) else {
        return false;
    };

    if !plan.fits(first, &to_b) {
        return false;
    }
    plan.place(first, to_b);
    if !plan.fits(second, &to_a) {
        return false;
    }
    plan.place(second, to_a);
    true
}

fn relocate(plan: &mut PlanBuilder, rng: &mut StdRng) -> bool {
    let Some(task) = plan.placed_tasks().choose(rng) else {
        return false;
    };
    let Some(current) = plan.remove(task) else {
        return false;
    };
    let Some(&target) = plan.prepared().candidates[task].iter().choose(rng) else {
        return false;
    };
    if target == current || !plan.fits(task, &target) {
        return false;
    }
    plan.place(task, target);
    true
}

fn insert(plan: &mut PlanBuilder, rng: &mut StdRng) -> bool {
    let Some(task) = plan.unplaced_tasks().choose(rng) else {
        return false;
    };
    let Some(&target) = plan.prepared().candidates[task].iter().choose(rng) else {
        return false;
    };
    if !plan.fits(task, &target) {
        return false;
    }
    plan.place(task, target);
    true
}

/// Counters of a local search run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(super) struct Stats {
    pub iterations: usize,
    pub accepted: usize,
    /// Moves that could not be applied to the current plan.
    pub infeasible: usize,
}

/// Improves the plan with simulated annealing.
/// An infeasible move counts as a rejected iteration and still cools the temperature.
/// Returns the best plan seen, which is never worse than the given one.
pub(super) fn improve<'p, 'a>(
    plan: PlanBuilder<'p, 'a>,
    params: &Params,
    rng: &mut StdRng,
) -> (PlanBuilder<'p, 'a>, Stats) {
    let started = Instant::now();
    let budget = params.local_search_budget();

    let mut current_score = plan.calculate_score();
    let mut best_score = current_score;
    let mut best = plan.clone();
    let mut current = plan;
    let mut temperature = params.initial_temperature;
    let mut stats = Stats::default();

    while stats.iterations < params.max_iterations
        && temperature >= MIN_TEMPERATURE
        && started.elapsed() < budget
    {
        stats.iterations += 1;

        let mut neighbor = current.clone();
        if apply(&mut neighbor, rng) {
            let score = neighbor.calculate_score();
            let delta = score - current_score;
            if delta >= 0.0 || rng.gen::<f64>() < (delta / temperature).exp() {
                current = neighbor;
                current_score = score;
                stats.accepted += 1;

                if current_score > best_score {
                    best_score = current_score;
                    best = current.clone();
                }
            }
        } else {
            stats.infeasible += 1;
        }

        temperature *= params.cooling_rate;
    }

    debug!(
        iterations = stats.iterations,
        accepted = stats.accepted,
        infeasible = stats.infeasible,
        temperature,
        score = best_score,
        "local search finished"
    );

    (best, stats)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::algo::greedy;
    use crate::core::{PlanResult, Prepared, Problem, TaskInput, Window};
    use rand::SeedableRng;

    fn problem() -> Problem {
        let mut problem = Problem::with_defaults(
            vec![
                TaskInput::new(1, 60).with_scores(0.9, 0.1),
                TaskInput::new(2, 45).with_scores(0.2, 0.8).with_priority(2.0),
                TaskInput::new(3, 30).after([1]),
                TaskInput::new(4, 90).with_scores(0.8, 0.0),
                TaskInput::new(5, 30).with_priority(4.0),
            ],
            vec![
                Window::new(0, 540, 720).deep_work(),
                Window::new(0, 780, 900),
                Window::new(86_400_000, 540, 660),
            ],
        );
        problem.params.max_iterations = 500;
        problem
    }

    #[test]
    fn local_search_never_worsens_the_plan() {
        let problem = problem();
        let prepared = Prepared::new(&problem);
        let initial = greedy::construct(&prepared);
        let initial_score = initial.calculate_score();

        let mut rng = StdRng::seed_from_u64(problem.params.seed);
        let (improved, stats) = improve(initial, &problem.params, &mut rng);
        assert!(improved.calculate_score() >= initial_score);
        assert!(stats.accepted <= stats.iterations);

        let plan: PlanResult = improved.into();
        assert!(plan.verify(&problem));
    }

    #[test]
    fn local_search_is_deterministic_for_a_seed() {
        let problem = problem();
        let prepared = Prepared::new(&problem);

        let run = || {
            let mut rng = StdRng::seed_from_u64(7);
            let plan: PlanResult = improve(greedy::construct(&prepared), &problem.params, &mut rng)
                .0
                .into();
            plan
        };

        assert_eq!(run(), run());
    }

    #[test]
    fn cold_start_keeps_the_initial_plan() {
        let mut problem = problem();
        problem.params.initial_temperature = 0.001;
        let prepared = Prepared::new(&problem);
        let initial: PlanResult = greedy::construct(&prepared).into();

        let mut rng = StdRng::seed_from_u64(1);
        let (plan, stats) = improve(greedy::construct(&prepared), &problem.params, &mut rng);
        assert_eq!(stats.iterations, 0);
        assert_eq!(PlanResult::from(plan), initial);
    }

    #[test]
    fn infeasible_moves_count_as_rejected_iterations() {
        let mut problem = Problem::with_defaults(
            vec![TaskInput::new(1, 60), TaskInput::new(2, 60)],
            vec![Window::new(0, 0, 60)],
        );
        problem.params.max_iterations = 50;
        problem.params.cooling_rate = 0.99;
        problem.params.time_budget_ls = 60_000;
        let prepared = Prepared::new(&problem);
        let initial: PlanResult = greedy::construct(&prepared).into();

        let mut rng = StdRng::seed_from_u64(5);
        let (plan, stats) = improve(greedy::construct(&prepared), &problem.params, &mut rng);
        assert_eq!(
            stats,
            Stats {
                iterations: 50,
                accepted: 0,
                infeasible: 50,
            }
        );
        assert_eq!(PlanResult::from(plan), initial);
    }

    #[test]
    fn insert_places_a_missing_task() {
        let problem = Problem::with_defaults(
            vec![TaskInput::new(1, 30)],
            vec![Window::new(0, 0, 60)],
        );
        let prepared = Prepared::new(&problem);
        let mut rng = StdRng::seed_from_u64(3);
        let mut plan = PlanBuilder::new(&prepared);

        assert!(insert(&mut plan, &mut rng));
        assert_eq!(plan.placed_len(), 1);
        assert!(!insert(&mut plan, &mut rng));
        assert!(!swap(&mut plan, &mut rng));
    }
}
