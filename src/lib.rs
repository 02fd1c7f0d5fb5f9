#![deny(clippy::all, clippy::cargo, clippy::expect_used, clippy::unwrap_used)]
#![deny(clippy::pedantic, clippy::nursery, unsafe_code)]
#![warn(clippy::unimplemented, clippy::redundant_type_annotations)]

use anyhow::Result;
use std::io::BufRead;

pub mod algo;
pub mod core;
pub mod data;
pub mod factory;
pub mod optimizer;

/// Reads a request from the reader, plans it and writes the plan to stdout as JSON.
/// `strategy` overrides the selector of the request. With `fallback` the strategies
/// of the fallback chain are tried in order instead.
///
/// # Errors
/// - If the request could not be read from the reader.
/// - If the request is malformed or every strategy failed.
/// - If the plan could not be written to stdout.
///
/// # Panics
///  - If the plan is invalid in debug mode.
pub fn run_reader(
    optimizer: &optimizer::Optimizer,
    reader: &mut impl BufRead,
    strategy: Option<core::StrategyType>,
    fallback: bool,
) -> Result<()> {
    let mut request: optimizer::Request = data::deserialize(reader)?;
    if let Some(strategy) = strategy {
        request.strategy = strategy;
    }

    let plan = optimizer.run(&request, fallback)?;

    debug_assert!(plan.verify(&request.problem), "Plan is invalid: {plan:?}");

    println!("{}", data::to_string(&plan)?);

    Ok(())
}

#[cfg(not(target_pointer_width = "64"))]
compile_error!("Must be 64-bit system!");

/// Casts the given value to `usize`.
/// It should never fail on 64-bit systems.
///
/// # Panics
/// - If the value cannot be cast to `usize`.
#[must_use]
pub fn cast_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or_else(|_| unreachable!("Must be 64-bit system!"))
}

/// Casts the given value to `u64`.
/// It should never fail on 64-bit systems.
///
/// # Panics
/// - If the value cannot be cast to `u64`.
#[must_use]
pub fn cast_u64(value: usize) -> u64 {
    u64::try_from(value).unwrap_or_else(|_| unreachable!("Must be 64-bit system!"))
}

/// Casts the given index to `i64`.
/// Indices of in-memory collections always fit.
///
/// # Panics
/// - If the value cannot be cast to `i64`.
#[must_use]
pub fn cast_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or_else(|_| unreachable!("Index out of range!"))
}
