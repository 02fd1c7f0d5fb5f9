use crate::core::Strategy;
use crate::data::deserialize;
use crate::optimizer::Request;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result};
use std::fs::File;
use std::io::BufReader;

/// Report of running a directory of samples.
#[derive(Debug, Deserialize, Serialize)]
pub struct Report {
    strategy: String,
    entries: Vec<ReportEntry>,
}

impl Report {
    /// Create a new report.
    fn new(strategy: String) -> Self {
        let entries = Vec::new();
        Self { strategy, entries }
    }

    /// Get the strategy name.
    #[must_use]
    pub fn strategy_name(&self) -> &str {
        &self.strategy
    }

    /// Get the entries.
    #[must_use]
    pub fn entries(&self) -> &[ReportEntry] {
        &self.entries
    }
}

impl Display for Report {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        writeln!(f, "Strategy: {}", self.strategy)?;
        for entry in &self.entries {
            writeln!(f, "{entry}")?;
        }
        writeln!(f, "-------------------")
    }
}

/// Report of running a single sample.
#[non_exhaustive]
#[derive(Debug, Deserialize, Serialize)]
pub struct ReportEntry {
    pub name: String,
    pub scheduled: usize,
    pub unscheduled: usize,
    pub objective: f64,
    pub time: f64,
}

impl Display for ReportEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(
            f,
            "{}: {} scheduled, {} unscheduled, objective {:.2} in {:.2} sec",
            self.name, self.scheduled, self.unscheduled, self.objective, self.time
        )
    }
}

/// Run all samples in the `samples` directory.
/// Print the report to stdout.
///
/// # Arguments
/// - `valid` is true, check that at least the expected number of tasks is scheduled.
/// - `strategy` is the strategy to run.
///
/// # Errors
/// - If a file cannot be read.
/// - If no samples are found.
///
/// # Panics
/// - If a plan is invalid.
/// - If too few tasks are scheduled and `valid` is true.
pub fn samples(valid: bool, strategy: &dyn Strategy) -> anyhow::Result<()> {
    run("samples", valid, strategy).and_then(|report| {
        if report.entries.is_empty() {
            Err(anyhow!("No samples found"))
        } else {
            println!("{report}");
            Ok(())
        }
    })
}

/// Run all samples in the `dir` directory.
/// Samples the strategy is not recommended for are skipped.
///
/// # Arguments
/// - `valid` is true, check that at least the expected number of tasks is scheduled.
/// - `strategy` is the strategy to run.
///
/// # Errors
/// - If a file cannot be read.
/// - If the strategy fails.
///
/// # Panics
/// - If a plan is invalid.
/// - If too few tasks are scheduled and `valid` is true.
pub fn run(dir: &str, valid: bool, strategy: &dyn Strategy) -> anyhow::Result<Report> {
    let mut report = Report::new(strategy.name().into());

    let mut files = std::fs::read_dir(dir)?.collect::<std::io::Result<Vec<_>>>()?;
    files.sort_by_key(std::fs::DirEntry::file_name);

    for file in files {
        let (name, expected) = parse_filename(&file.file_name())?;
        let request: Request = deserialize(&mut BufReader::new(File::open(file.path())?))?;
        let problem = &request.problem;

        if !strategy.is_available() || !strategy.can_handle(problem.tasks.len(), problem.slot_count())
        {
            continue;
        }

        let time = std::time::Instant::now();
        let plan = strategy.schedule(problem)?;
        let time = time.elapsed().as_secs_f64();

        assert!(plan.verify(problem), "Invalid plan created for {name}");
        if valid {
            assert!(
                plan.scheduled_len() >= expected,
                "Too few tasks scheduled for {name}"
            );
        }

        report.entries.push(ReportEntry {
            name,
            scheduled: plan.scheduled_len(),
            unscheduled: plan.un_scheduled.len(),
            objective: plan.objective(),
            time,
        });
    }

    Ok(report)
}

/// Parses `<expected scheduled>_<index>[_<label>].json`.
fn parse_filename(filename: &std::ffi::OsString) -> anyhow::Result<(String, usize)> {
    static NAME_ERR: &str = "Cannot read filename";

    let name = filename.to_str().ok_or_else(|| anyhow!(NAME_ERR))?;
    let mut parts = name.split('.');
    let mut parts = parts.next().ok_or_else(|| anyhow!(NAME_ERR))?.split('_');
    let expected = parts.next().ok_or_else(|| anyhow!(NAME_ERR))?.parse()?;
    let _: usize = parts.next().ok_or_else(|| anyhow!(NAME_ERR))?.parse()?;
    Ok((name.into(), expected))
}
