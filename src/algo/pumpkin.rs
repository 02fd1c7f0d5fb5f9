use super::cp::{Backend, Choices, CpModel, Interval, Outcome, Settings};
use pumpkin_solver::constraints::{self, ArgDisjunctiveTask, Constraint, ConstraintTag};
use pumpkin_solver::optimisation::linear_sat_unsat::LinearSatUnsat;
use pumpkin_solver::optimisation::OptimisationDirection;
use pumpkin_solver::results::{OptimisationResult, ProblemSolution};
use pumpkin_solver::termination::{Indefinite, TerminationCondition, TimeBudget};
use pumpkin_solver::variables::{DomainId, TransformableVariable};
use pumpkin_solver::Solver;

/// Lazy clause generation solver, pure Rust.
pub(super) const BACKEND: Backend = Backend {
    name: "pumpkin",
    init: || Ok(()),
    solve,
};

/// Variables of one interval.
struct Vars {
    /// Candidate index, the candidate count when absent.
    index: DomainId,
    start: DomainId,
    value: DomainId,
    present: DomainId,
}

fn post(solver: &mut Solver, constraint: impl Constraint) -> Result<(), String> {
    solver
        .add_constraint(constraint)
        .post()
        .map_err(|err| format!("{err:?}"))
}

fn table(solver: &mut Solver, values: impl IntoIterator<Item = i32>) -> Vec<DomainId> {
    values
        .into_iter()
        .map(|value| solver.new_bounded_integer(value, value))
        .collect()
}

fn interval(
    solver: &mut Solver,
    tag: ConstraintTag,
    model: &CpModel,
    interval: &Interval,
) -> Result<Vars, String> {
    let absent = i32::try_from(interval.starts.len()).map_err(|err| err.to_string())?;
    let low = interval.values.iter().copied().min().unwrap_or_default().min(0);
    let high = interval.values.iter().copied().max().unwrap_or_default().max(0);
    let vars = Vars {
        index: solver.new_bounded_integer(0, absent),
        start: solver.new_bounded_integer(0, model.end),
        value: solver.new_bounded_integer(low, high),
        present: solver.new_bounded_integer(0, 1),
    };

    let starts = interval.starts.iter().copied().chain([interval.parked]);
    let values = interval.values.iter().copied().chain([0]);
    let presence = interval.starts.iter().map(|_| 1).chain([0]);

    let starts = table(solver, starts);
    post(solver, constraints::element(vars.index, starts, vars.start, tag))?;
    let values = table(solver, values);
    post(solver, constraints::element(vars.index, values, vars.value, tag))?;
    let presence = table(solver, presence);
    post(solver, constraints::element(vars.index, presence, vars.present, tag))?;

    Ok(vars)
}

fn optimise(
    solver: &mut Solver,
    termination: &mut impl TerminationCondition,
    objective: DomainId,
) -> OptimisationResult {
    let mut brancher = solver.default_brancher();
    let search = LinearSatUnsat::new(OptimisationDirection::Maximise, objective, |_, _| {});
    solver.optimise(&mut brancher, termination, search)
}

fn read(vars: &[Vars], model: &CpModel, solution: &impl ProblemSolution) -> Choices {
    vars.iter()
        .zip(&model.intervals)
        .map(|(vars, interval)| {
            usize::try_from(solution.get_integer_value(vars.index))
                .ok()
                .filter(|&c| c < interval.starts.len())
        })
        .collect()
}

fn solve(model: &CpModel, settings: &Settings) -> Result<Outcome, String> {
    let mut solver = Solver::default();
    let tag = solver.new_constraint_tag();

    let vars = model
        .intervals
        .iter()
        .map(|i| interval(&mut solver, tag, model, i))
        .collect::<Result<Vec<_>, _>>()?;

    let tasks = vars
        .iter()
        .zip(&model.intervals)
        .map(|(vars, interval)| ArgDisjunctiveTask {
            start_time: vars.start,
            processing_time: interval.length,
        })
        .collect::<Vec<_>>();
    post(&mut solver, constraints::disjunctive_strict(tasks, tag))?;

    for &(before, after) in &model.precedences {
        let (b, a) = (&vars[before], &vars[after]);
        let gating = vec![a.present.scaled(1), b.present.scaled(-1)];
        post(&mut solver, constraints::less_than_or_equals(gating, 0, tag))?;

        let length = model.intervals[before].length;
        let ordering = vec![b.start.scaled(1), a.start.scaled(-1), a.present.scaled(model.big_m)];
        post(
            &mut solver,
            constraints::less_than_or_equals(ordering, model.big_m - length, tag),
        )?;
    }

    let (low, high) = model.objective_bounds();
    let objective = solver.new_bounded_integer(low, high);
    let mut sum: Vec<_> = vars.iter().map(|v| v.value.scaled(1)).collect();
    sum.push(objective.scaled(-1));
    post(&mut solver, constraints::equals(sum, 0, tag))?;

    if let Some(bound) = settings.lower_bound {
        let bound = i32::try_from(bound).map_err(|err| err.to_string())?;
        post(
            &mut solver,
            constraints::less_than_or_equals(vec![objective.scaled(-1)], -bound, tag),
        )?;
    }

    let result = match settings.time_limit {
        Some(limit) => optimise(&mut solver, &mut TimeBudget::starting_now(limit), objective),
        None => optimise(&mut solver, &mut Indefinite, objective),
    };

    match result {
        OptimisationResult::Optimal(solution) => Ok(Outcome {
            choices: Some(read(&vars, model, &solution)),
            complete: true,
        }),
        OptimisationResult::Satisfiable(solution) => Ok(Outcome {
            choices: Some(read(&vars, model, &solution)),
            complete: false,
        }),
        OptimisationResult::Unknown => Ok(Outcome::default()),
        OptimisationResult::Unsatisfiable => Err("interval model is infeasible".into()),
    }
}
