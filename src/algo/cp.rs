//! Interval model of the window scheduling problem.
//!
//! Every schedulable task is an optional interval of fixed length. Its start is chosen
//! from the time keys of its candidate placements, or it is parked past the horizon
//! when absent. Parked slots of different tasks never overlap, so a single
//! no-overlap constraint over all starts covers every day. For a precedence pair a
//! present dependent needs its prerequisite present and ending before it starts.
//!
//! Values are scaled to integers and clamped so that any sum of them fits `i32`.

#![allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]

use crate::core::{PlanBuilder, Prepared};
use std::time::Duration;
use tracing::warn;

/// Objective values are scaled to integers with this factor.
const SCALE: f64 = 100.0;

/// Decision per interval: the candidate index, or `None` if absent.
pub(super) type Choices = Vec<Option<usize>>;

/// An optional task interval.
#[derive(Clone, Debug)]
pub(super) struct Interval {
    pub task: usize,
    /// Start time key per candidate placement.
    pub starts: Vec<i32>,
    /// Scaled objective value per candidate placement.
    pub values: Vec<i32>,
    pub length: i32,
    /// Start of the interval when absent.
    pub parked: i32,
}

/// Backend independent constraint model. The objective maximizes the sum of values.
#[derive(Clone, Debug)]
pub(super) struct CpModel {
    pub intervals: Vec<Interval>,
    /// Interval index pairs `(before, after)`.
    pub precedences: Vec<(usize, usize)>,
    /// Exclusive upper bound of every start, parked ones included.
    pub end: i32,
    /// Coefficient that relaxes an ordering row when the dependent is absent.
    pub big_m: i32,
}

impl CpModel {
    /// Builds the model of the schedulable tasks.
    ///
    /// # Errors
    /// - If the time keys of the request do not fit `i32`.
    pub fn build(prepared: &Prepared) -> Result<Self, String> {
        let out_of_range = |_| "time horizon exceeds the CP model range".to_string();
        let horizon = i32::try_from(prepared.horizon()).map_err(out_of_range)?;

        let count = prepared.order.len();
        let cap = f64::from(i32::MAX) / (count as f64 + 1.0);
        let scale = |value: f64| (value * SCALE).round().clamp(-cap, cap) as i32;

        let mut interval_of = vec![None; prepared.problem.tasks.len()];
        let mut intervals = Vec::with_capacity(count);
        let mut parked = i64::from(horizon);
        for &task in &prepared.order {
            let candidates = &prepared.candidates[task];
            let length = candidates
                .first()
                .map_or(0, |p| p.end_key() - p.start_key());
            let starts = candidates
                .iter()
                .map(|p| i32::try_from(p.start_key()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(out_of_range)?;

            interval_of[task] = Some(intervals.len());
            intervals.push(Interval {
                task,
                starts,
                values: candidates.iter().map(|p| scale(p.value)).collect(),
                length: i32::try_from(length).map_err(out_of_range)?,
                parked: i32::try_from(parked).map_err(out_of_range)?,
            });
            parked += length;
        }

        let longest = intervals.iter().map(|i| i.length).max().unwrap_or_default();
        let end = i32::try_from(parked).map_err(out_of_range)?;
        let big_m = end
            .checked_add(longest)
            .filter(|m| *m <= i32::MAX / 4)
            .ok_or_else(|| "time horizon exceeds the CP model range".to_string())?;

        let precedences = prepared
            .order
            .iter()
            .filter_map(|&after| Some((after, interval_of[after]?)))
            .flat_map(|(after, a)| {
                prepared.prerequisites[after]
                    .iter()
                    .filter_map(|&before| interval_of[before])
                    .map(move |b| (b, a))
                    .collect::<Vec<_>>()
            })
            .collect();

        Ok(Self {
            intervals,
            precedences,
            end,
            big_m,
        })
    }

    /// Smallest and largest objective a solution may reach.
    pub fn objective_bounds(&self) -> (i32, i32) {
        self.intervals.iter().fold((0, 0), |(low, high), interval| {
            let min = interval.values.iter().copied().min().unwrap_or_default().min(0);
            let max = interval.values.iter().copied().max().unwrap_or_default().max(0);
            (low.saturating_add(min), high.saturating_add(max))
        })
    }

    /// Decisions that reproduce a plan.
    pub fn choices(&self, prepared: &Prepared, plan: &PlanBuilder) -> Choices {
        self.intervals
            .iter()
            .map(|interval| {
                let placement = plan.placement(interval.task)?;
                prepared.candidates[interval.task]
                    .iter()
                    .position(|p| p == placement)
            })
            .collect()
    }

    /// Integer objective of the given decisions.
    pub fn objective(&self, choices: &[Option<usize>]) -> i64 {
        self.intervals
            .iter()
            .zip(choices)
            .filter_map(|(interval, choice)| interval.values.get((*choice)?))
            .map(|&value| i64::from(value))
            .sum()
    }

    /// Rebuilds a plan from decisions. Placements are replayed in topological order
    /// and any that does not fit is dropped.
    pub fn plan<'p, 'a>(&self, prepared: &'p Prepared<'a>, choices: &[Option<usize>]) -> PlanBuilder<'p, 'a> {
        let mut plan = PlanBuilder::new(prepared);
        for (interval, choice) in self.intervals.iter().zip(choices) {
            let task = interval.task;
            let Some(&placement) = choice.and_then(|c| prepared.candidates[task].get(c)) else {
                continue;
            };
            if plan.fits(task, &placement) {
                plan.place(task, placement);
            } else {
                warn!(task, "dropping infeasible solver placement");
            }
        }
        plan
    }
}

/// Search configuration.
#[derive(Clone, Copy, Debug, Default)]
pub(super) struct Settings {
    /// `None` searches until optimality is proven.
    pub time_limit: Option<Duration>,
    /// Objective the solution must reach, the value of a warm start.
    pub lower_bound: Option<i64>,
}

/// Result of a backend solve.
#[derive(Clone, Debug, Default)]
pub(super) struct Outcome {
    /// Decisions of the best solution found, if any.
    pub choices: Option<Choices>,
    /// Whether optimality was proven.
    pub complete: bool,
}

/// A constraint solver able to load a [`CpModel`].
pub(super) struct Backend {
    pub name: &'static str,
    pub init: fn() -> Result<(), String>,
    pub solve: fn(&CpModel, &Settings) -> Result<Outcome, String>,
}

/// Backends in order of preference.
pub(super) const BACKENDS: &[Backend] = &[
    #[cfg(feature = "pumpkin")]
    super::pumpkin::BACKEND,
];

#[cfg(test)]
mod test {
    use super::*;
    use crate::core::{Problem, TaskInput, Window, MINUTES_PER_DAY};

    const DAY_MS: i64 = 86_400_000;

    fn chain() -> Problem {
        Problem::with_defaults(
            vec![
                TaskInput::new(1, 60),
                TaskInput::new(2, 60).after([1]),
                TaskInput::new(3, 30),
            ],
            vec![Window::new(0, 0, 180), Window::new(DAY_MS, 60, 120)],
        )
    }

    #[test]
    fn absent_intervals_are_parked_apart() -> anyhow::Result<()> {
        let problem = chain();
        let prepared = Prepared::new(&problem);
        let model = CpModel::build(&prepared).map_err(anyhow::Error::msg)?;

        assert_eq!(model.intervals.len(), 3);
        let horizon = 2 * i32::try_from(MINUTES_PER_DAY)?;
        let mut parked: Vec<_> = model.intervals.iter().map(|i| (i.parked, i.length)).collect();
        parked.sort_unstable();
        assert_eq!(parked[0].0, horizon);
        assert!(parked.windows(2).all(|w| w[0].0 + w[0].1 <= w[1].0));
        assert!(model
            .intervals
            .iter()
            .all(|i| i.starts.iter().all(|&s| s + i.length <= horizon)));
        assert_eq!(model.end, horizon + 150);
        assert!(model.big_m >= model.end + 60);
        Ok(())
    }

    #[test]
    fn precedences_link_intervals() -> anyhow::Result<()> {
        let problem = chain();
        let prepared = Prepared::new(&problem);
        let model = CpModel::build(&prepared).map_err(anyhow::Error::msg)?;

        let [(before, after)] = model.precedences[..] else {
            panic!("one precedence expected");
        };
        assert_eq!(model.intervals[before].task, 0);
        assert_eq!(model.intervals[after].task, 1);
        Ok(())
    }

    #[test]
    fn plan_and_choices_agree() -> anyhow::Result<()> {
        let problem = chain();
        let prepared = Prepared::new(&problem);
        let model = CpModel::build(&prepared).map_err(anyhow::Error::msg)?;

        let mut choices = vec![None; model.intervals.len()];
        for (i, interval) in model.intervals.iter().enumerate() {
            choices[i] = match interval.task {
                0 => prepared.candidates[0].iter().position(|p| p.start_min == 0),
                1 => prepared.candidates[1].iter().position(|p| p.start_min == 60),
                _ => None,
            };
        }
        let plan = model.plan(&prepared, &choices);
        assert_eq!(plan.placed_len(), 2);
        assert_eq!(model.choices(&prepared, &plan), choices);
        assert!(model.objective(&choices) > 0);
        Ok(())
    }

    #[test]
    fn overlapping_choices_are_dropped() -> anyhow::Result<()> {
        let problem = Problem::with_defaults(
            vec![TaskInput::new(1, 60), TaskInput::new(2, 60)],
            vec![Window::new(0, 0, 120)],
        );
        let prepared = Prepared::new(&problem);
        let model = CpModel::build(&prepared).map_err(anyhow::Error::msg)?;

        let choices: Choices = model
            .intervals
            .iter()
            .map(|i| prepared.candidates[i.task].iter().position(|p| p.start_min == 0))
            .collect();
        assert_eq!(model.plan(&prepared, &choices).placed_len(), 1);
        Ok(())
    }

    #[test]
    fn huge_values_are_clamped() -> anyhow::Result<()> {
        let problem = Problem::with_defaults(
            vec![
                TaskInput::new(1, 30).with_priority(1e17),
                TaskInput::new(2, 30).with_priority(1e17),
            ],
            vec![Window::new(0, 0, 120)],
        );
        let prepared = Prepared::new(&problem);
        let model = CpModel::build(&prepared).map_err(anyhow::Error::msg)?;

        let (low, high) = model.objective_bounds();
        assert!(low <= 0 && high > 0);
        assert!(high < i32::MAX);
        let all: Choices = vec![Some(0); model.intervals.len()];
        assert!(model.objective(&all) <= i64::from(i32::MAX));
        Ok(())
    }
}
