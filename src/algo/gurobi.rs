use super::milp::{Backend, LinearModel, Outcome};
use crate::core::Params;
use anyhow::Result;
use grb::prelude::*;

/// Gurobi optimizer. Needs a native installation and a license.
pub(super) const BACKEND: Backend = Backend {
    name: "gurobi",
    init: || Env::new("").map(|_| ()).map_err(|err| err.to_string()),
    solve: |model, params, hint| solve(model, params, hint).map_err(|err| format!("{err:#}")),
};

pub fn create_model(name: &str, params: &Params) -> Result<Model> {
    let mut env = Env::new("")?;
    env.set(param::OutputFlag, 0)?;
    env.set(param::LogToConsole, 0)?;
    if let Some(limit) = params.time_limit() {
        env.set(param::TimeLimit, limit.as_secs_f64())?;
    }
    if let Ok(threads) = i32::try_from(params.num_workers) {
        env.set(param::Threads, threads)?;
    }
    Ok(Model::with_env(name, env)?)
}

#[allow(clippy::useless_conversion)]
fn solve(model: &LinearModel, params: &Params, hint: Option<&[f64]>) -> Result<Outcome> {
    let mut gurobi = create_model("windows", params)?;

    let mut x = Vec::with_capacity(model.columns.len());
    for (c, column) in model.columns.iter().enumerate() {
        x.push(add_binvar!(gurobi, name: &format!("x_{c}"), obj: column.placement.value)?);
    }

    for (r, row) in model.rows.iter().enumerate() {
        let lhs = row.terms.iter().map(|&(c, coefficient)| coefficient * x[c]).grb_sum();
        gurobi.add_constr(&format!("r_{r}"), c!(lhs <= row.rhs))?;
    }

    gurobi.set_attr(attr::ModelSense, ModelSense::Maximize)?;
    if let Some(hint) = hint {
        gurobi.set_obj_attr_batch(attr::Start, x.iter().copied().zip(hint.iter().copied()))?;
    }

    gurobi.optimize()?;

    let timed_out = gurobi.status()? == Status::TimeLimit;
    let values = if gurobi.get_attr(attr::SolCount)? > 0 {
        Some(gurobi.get_obj_attr_batch(attr::X, x)?)
    } else {
        None
    };

    Ok(Outcome { values, timed_out })
}
