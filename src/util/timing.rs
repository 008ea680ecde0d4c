//! Execution timing
//!
//! [`ExecutionTimeBlock`] times a scope: the guard returned by
//! [`ExecutionTimeBlock::start`] stamps the end time when finished or
//! dropped. [`ExecutionTime`] times individual calls.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::error::ConfigError;
use crate::report::{default_reporter, Event, Phase, SharedReporter};

pub const DEFAULT_OUTPUT_DECIMALS: usize = 10;

/// Upper limit for `output_decimals`; finer digits are below clock resolution.
pub const MAX_OUTPUT_DECIMALS: usize = 20;

fn check_decimals(output_decimals: usize) -> Result<(), ConfigError> {
    if output_decimals > MAX_OUTPUT_DECIMALS {
        return Err(ConfigError::invalid(format!(
            "output_decimals must be at most {MAX_OUTPUT_DECIMALS}, got {output_decimals} instead."
        )));
    }
    Ok(())
}

fn format_secs(duration: Duration, decimals: usize) -> String {
    format!("{:.*}", decimals, duration.as_secs_f64())
}

/// A completed timing of a block. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Measurement {
    title: Option<String>,
    output_decimals: usize,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    execution_time: Duration,
}

impl Measurement {
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn output_decimals(&self) -> usize {
        self.output_decimals
    }

    /// Wall-clock time the block was entered.
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Wall-clock time the block was left.
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    /// Monotonic duration of the block.
    pub fn execution_time(&self) -> Duration {
        self.execution_time
    }

    pub fn message(&self) -> String {
        let secs = format_secs(self.execution_time, self.output_decimals);
        match &self.title {
            None => format!("This code took {secs} seconds to execute."),
            Some(title) => {
                format!("Code block with title \"{title}\" took {secs} seconds to execute.")
            }
        }
    }
}

/// Times a scope and reports its duration.
#[derive(Clone)]
pub struct ExecutionTimeBlock {
    title: Option<String>,
    output_decimals: usize,
    reporter: SharedReporter,
}

impl ExecutionTimeBlock {
    pub fn new(title: Option<&str>, output_decimals: usize) -> Result<Self, ConfigError> {
        check_decimals(output_decimals)?;
        Ok(Self {
            title: title.map(str::to_string),
            output_decimals,
            reporter: default_reporter(),
        })
    }

    pub fn reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn output_decimals(&self) -> usize {
        self.output_decimals
    }

    /// Enter the block. Timing ends when the guard is finished or dropped.
    pub fn start(&self) -> TimerGuard<'_> {
        TimerGuard {
            block: self,
            start_time: Utc::now(),
            started: Instant::now(),
            finished: false,
        }
    }

    /// Time `f` as one block.
    pub fn measure<T>(&self, f: impl FnOnce() -> T) -> (T, Measurement) {
        let guard = self.start();
        let output = f();
        (output, guard.finish())
    }
}

impl Default for ExecutionTimeBlock {
    fn default() -> Self {
        Self {
            title: None,
            output_decimals: DEFAULT_OUTPUT_DECIMALS,
            reporter: default_reporter(),
        }
    }
}

/// A running block timer.
pub struct TimerGuard<'a> {
    block: &'a ExecutionTimeBlock,
    start_time: DateTime<Utc>,
    started: Instant,
    finished: bool,
}

impl TimerGuard<'_> {
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Time spent in the block so far.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Leave the block and return its measurement.
    pub fn finish(mut self) -> Measurement {
        self.complete()
    }

    fn complete(&mut self) -> Measurement {
        self.finished = true;
        let execution_time = self.started.elapsed();
        let measurement = Measurement {
            title: self.block.title.clone(),
            output_decimals: self.block.output_decimals,
            start_time: self.start_time,
            end_time: Utc::now(),
            execution_time,
        };

        let operation = self.block.title.as_deref().unwrap_or("block");
        self.block.reporter.report(
            &Event::new(Phase::Elapsed, operation)
                .with_elapsed(execution_time)
                .with_lines(vec![measurement.message()]),
        );
        measurement
    }
}

impl Drop for TimerGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.complete();
        }
    }
}

/// Times every call of an operation.
#[derive(Clone)]
pub struct ExecutionTime {
    output_decimals: usize,
    reporter: SharedReporter,
}

impl ExecutionTime {
    pub fn new(output_decimals: usize) -> Result<Self, ConfigError> {
        check_decimals(output_decimals)?;
        Ok(Self {
            output_decimals,
            reporter: default_reporter(),
        })
    }

    pub fn reporter(mut self, reporter: SharedReporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run `f` and report how long it took.
    pub fn run<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let output = f();
        let elapsed = start.elapsed();

        let line = format!(
            "Function \"{name}\" took {} seconds to execute.",
            format_secs(elapsed, self.output_decimals)
        );
        self.reporter.report(
            &Event::new(Phase::Elapsed, name)
                .with_elapsed(elapsed)
                .with_lines(vec![line]),
        );
        output
    }

    pub fn wrap<A, T, F>(&self, name: impl Into<String>, f: F) -> impl Fn(A) -> T
    where
        F: Fn(A) -> T,
    {
        let timer = self.clone();
        let name = name.into();
        move |args: A| timer.run(&name, || f(args))
    }
}

impl Default for ExecutionTime {
    fn default() -> Self {
        Self {
            output_decimals: DEFAULT_OUTPUT_DECIMALS,
            reporter: default_reporter(),
        }
    }
}
