use clap::{Parser, ValueEnum};
use rand::prelude::*;
use std::io::Write;
use std::num::NonZero;
use tracing_subscriber::EnvFilter;
use window_scheduler::core::{Problem, StrategyType, Strategy, TaskId, TaskInput, Window};
use window_scheduler::optimizer::{Optimizer, Request};
use window_scheduler::{algo, cast_u64, data, run_reader};

const DAY_MS: i64 = 86_400_000;
const MINUTE_MS: i64 = 60_000;

#[derive(Copy, Clone, Debug)]
struct Algorithm(&'static str);

impl std::fmt::Display for Algorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ValueEnum for Algorithm {
    fn value_variants<'a>() -> &'a [Self] {
        static ALGORITHMS: std::sync::LazyLock<Vec<Algorithm>> = std::sync::LazyLock::new(|| {
            let iter = algo::STRATEGIES.iter();
            iter.map(|init| Algorithm(init().name())).collect()
        });

        ALGORITHMS.as_slice()
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        Some(clap::builder::PossibleValue::new(self.0))
    }
}

/// Application assigning tasks to daily time windows.
#[derive(Debug, Parser)]
enum Application {
    /// Plan the JSON request read from stdin and print the plan as JSON.
    Run {
        /// Strategy overriding the selector of the request.
        strategy: Option<StrategyType>,
        /// Try CP-SAT, MILP and the heuristic in order instead.
        #[clap(short, long)]
        fallback: bool,
    },
    /// Run benchmarks on a set of requests.
    Bench {
        /// The input directory.
        input: String,
        /// Exclude strategies.
        #[clap(short, long, value_delimiter = ',')]
        exclude: Vec<Algorithm>,
    },
    /// Generate random requests.
    Gen {
        /// The number of tasks.
        tasks: NonZero<usize>,
        /// The number of days.
        days: NonZero<usize>,
        /// The number of windows per day.
        #[clap(short, long, default_value = "2")]
        windows: NonZero<u32>,
        /// Probability that a task depends on an earlier one.
        #[clap(short = 'r', long, default_value = "0.2")]
        dependency_ratio: f64,
        /// Probability that a task has a deadline.
        #[clap(short, long, default_value = "0.3")]
        deadline_ratio: f64,
        /// Number of requests to generate.
        #[clap(short, long, default_value = "1")]
        amount: NonZero<u64>,
        /// Path to output the generated requests. If the directory does not exist, it will be created.
        #[clap(short, long, default_value = "output")]
        output: String,
    },
}

fn strategies(exclude: &[Algorithm]) -> impl Iterator<Item = Box<dyn Strategy>> + '_ {
    let iter = algo::STRATEGIES.iter().map(|init| init());
    iter.filter(|strategy| !exclude.iter().any(|name| name.0 == strategy.name()))
}

/// Splits the working day 08:00 to 20:00 into `count` windows with lunch-sized gaps.
fn gen_windows(days: usize, count: u32, rng: &mut impl Rng) -> Vec<Window> {
    let (first, last) = (8 * 60, 20 * 60);
    let count = count.min(12);
    let span = (last - first) / count;
    let mut windows = Vec::new();
    for day in 0..days {
        let date_ms = i64::try_from(day).unwrap_or_default() * DAY_MS;
        for i in 0..count {
            let start = first + i * span;
            let end = start + span - span / 4;
            let window = Window::new(date_ms, start, end);
            windows.push(if rng.gen_bool(0.3) {
                window.deep_work()
            } else {
                window
            });
        }
    }
    windows
}

fn gen_tasks(tasks: usize, days: usize, dependency: f64, deadline: f64) -> Vec<TaskInput> {
    let mut rng = thread_rng();
    let horizon = i64::try_from(days).unwrap_or(1) * DAY_MS;
    let (dependency, deadline) = (dependency.clamp(0.0, 1.0), deadline.clamp(0.0, 1.0));
    (1..=cast_u64(tasks))
        .map(|id: TaskId| {
            let mut task = TaskInput::new(id, 15 * rng.gen_range(1..=8))
                .with_priority(rng.gen_range(0.0..10.0))
                .with_scores(rng.gen(), rng.gen());
            if id > 1 && rng.gen_bool(dependency) {
                task = task.after([rng.gen_range(1..id)]);
            }
            if rng.gen_bool(deadline) {
                task = task.with_deadline(rng.gen_range(DAY_MS / 2..=horizon) / MINUTE_MS * MINUTE_MS);
            }
            task
        })
        .collect()
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match Application::parse() {
        Application::Run { strategy, fallback } => run_reader(
            &Optimizer::new(),
            &mut std::io::stdin().lock(),
            strategy,
            fallback,
        ),
        Application::Bench { input, exclude } => {
            for strategy in strategies(&exclude) {
                println!("{}", data::run(&input, false, strategy.as_ref())?);
            }
            Ok(())
        }
        Application::Gen {
            tasks,
            days,
            windows,
            dependency_ratio,
            deadline_ratio,
            amount,
            output,
        } => {
            let tasks = tasks.get();
            let days = days.get();

            let output = std::path::Path::new(&output);
            if !output.try_exists()? {
                std::fs::create_dir_all(output)?;
            }

            for i in 0..amount.get() {
                let request = Request {
                    problem: Problem::with_defaults(
                        gen_tasks(tasks, days, dependency_ratio, deadline_ratio),
                        gen_windows(days, windows.get(), &mut thread_rng()),
                    ),
                    strategy: StrategyType::Auto,
                };
                let filename = format!("0_{i}_gen.json");
                std::fs::File::create(output.join(filename))?
                    .write_all(data::to_string(&request)?.as_bytes())?;
            }
            Ok(())
        }
    }
}
