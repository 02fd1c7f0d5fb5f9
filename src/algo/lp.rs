//! `good_lp` backends of the linear model.
//!
//! Solves run on the calling thread. The time limit is handed to the solver and the
//! warm start is loaded as its initial solution.

use super::milp::{Backend, LinearModel, Outcome};
use crate::core::Params;
use good_lp::{
    constraint, variable, variables, Expression, Solution, SolutionStatus, Solver, SolverModel,
    Variable, WithInitialSolution, WithTimeLimit,
};
use std::time::Instant;

/// Pure Rust branch and bound solver.
#[cfg(feature = "microlp")]
pub(super) const MICROLP: Backend = Backend {
    name: "microlp",
    init: || Ok(()),
    solve: |model, params, hint| solve_with(good_lp::microlp, model, params, hint, |m| m),
};

/// HiGHS, bundled and built from source by the `highs` feature.
#[cfg(feature = "highs")]
pub(super) const HIGHS: Backend = Backend {
    name: "highs",
    init: || Ok(()),
    solve: |model, params, hint| {
        let threads = u32::try_from(params.num_workers).unwrap_or(u32::MAX).max(1);
        solve_with(good_lp::highs, model, params, hint, |m| m.set_threads(threads))
    },
};

fn solve_with<S>(
    solver: S,
    model: &LinearModel,
    params: &Params,
    hint: Option<&[f64]>,
    configure: impl FnOnce(S::Model) -> S::Model,
) -> Result<Outcome, String>
where
    S: Solver,
    S::Model: WithTimeLimit + WithInitialSolution,
{
    let mut vars = variables!();
    let x: Vec<Variable> = model
        .columns
        .iter()
        .map(|_| vars.add(variable().binary()))
        .collect();

    let objective: Expression = model
        .columns
        .iter()
        .zip(&x)
        .map(|(column, &var)| column.placement.value * var)
        .sum();
    let mut problem = configure(vars.maximise(objective).using(solver));

    for row in &model.rows {
        let lhs: Expression = row.terms.iter().map(|&(c, coefficient)| coefficient * x[c]).sum();
        problem = problem.with(constraint!(lhs <= row.rhs));
    }

    let limit = params.time_limit();
    if let Some(limit) = limit {
        problem = problem.with_time_limit(limit.as_secs_f64());
    }
    if let Some(hint) = hint {
        problem = problem.with_initial_solution(x.iter().copied().zip(hint.iter().copied()));
    }

    let started = Instant::now();
    match problem.solve() {
        Ok(solution) => Ok(Outcome {
            values: Some(x.iter().map(|&var| solution.value(var)).collect()),
            timed_out: matches!(solution.status(), SolutionStatus::TimeLimit),
        }),
        // An interrupted solve with no incumbent is reported as an error.
        Err(_) if limit.is_some_and(|limit| started.elapsed() >= limit) => Ok(Outcome {
            values: None,
            timed_out: true,
        }),
        Err(err) => Err(err.to_string()),
    }
}
