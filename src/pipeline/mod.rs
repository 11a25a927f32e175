use std::fmt;
use std::fs;
use std::io;
use std::str::FromStr;
use std::time::Duration;

use log::Level;
use thiserror::Error;

use crate::configuration::{Configuration, FailurePolicy};
use crate::formatter::Formatter;
use crate::helper::Stopwatch;
use crate::logging::{self, SharedLogger};
use crate::runner::{CommandRunner, Invocation, RunError};

const LOG_TARGET: &str = "rusty_pgsync::pipeline";

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Step {
    Dump,
    Transfer,
    Restore,
}

impl Step {
    pub const ALL: [Step; 3] = [Step::Dump, Step::Transfer, Step::Restore];
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Dump => write!(f, "database backup"),
            Step::Transfer => write!(f, "database dump transfer"),
            Step::Restore => write!(f, "database dump application"),
        }
    }
}

/// Which steps a run covers: the whole pipeline or a single step.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Mode {
    All,
    Only(Step),
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(mode: &str) -> Result<Mode, String> {
        match mode {
            "all" => Ok(Mode::All),
            "dump" | "backup" => Ok(Mode::Only(Step::Dump)),
            "transfer" => Ok(Mode::Only(Step::Transfer)),
            "restore" => Ok(Mode::Only(Step::Restore)),
            mode => Err(format!("invalid mode: {}", mode)),
        }
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error("could not start '{program}': {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("'{program}' failed with {}", describe_exit(.code))]
    Exit { program: String, code: Option<i32> },
    #[error("'{program}' did not finish within {limit:?}")]
    Timeout { program: String, limit: Duration },
    #[error("unexpected error while running '{program}': {source}")]
    Unexpected {
        program: String,
        #[source]
        source: io::Error,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {}", code),
        None => String::from("termination by signal"),
    }
}

pub type StepOutcome = Result<(), StepError>;

/// Outcome of every step that ran, plus the ones skipped after an abort.
#[derive(Debug)]
pub struct Summary {
    pub outcomes: Vec<(Step, StepOutcome)>,
    pub skipped: Vec<Step>,
}

impl Summary {
    pub fn failed_steps(&self) -> Vec<Step> {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_err())
            .map(|(step, _)| *step)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        self.failed_steps().is_empty() && self.skipped.is_empty()
    }

    /// Process exit code: failures only count when the run was meant to abort on them.
    pub fn exit_code(&self, policy: FailurePolicy) -> i32 {
        match policy {
            FailurePolicy::Abort if !self.is_success() => 1,
            _ => 0,
        }
    }
}

/// Runs remote dump, transfer and local restore, one after the other.
pub struct Pipeline<R: CommandRunner> {
    configuration: Configuration,
    runner: R,
    logger: SharedLogger,
}

impl<R: CommandRunner> Pipeline<R> {
    pub fn new(configuration: Configuration, runner: R, logger: SharedLogger) -> Pipeline<R> {
        Pipeline {
            configuration,
            runner,
            logger,
        }
    }

    pub fn configuration(&self) -> &Configuration {
        &self.configuration
    }

    pub async fn run_remote_dump(&self) -> StepOutcome {
        let invocation = self.configuration.build_dump_command();
        self.execute(Step::Dump, &invocation).await
    }

    pub async fn run_transfer(&self) -> StepOutcome {
        let invocation = self.configuration.build_transfer_command();
        let outcome = self.execute(Step::Transfer, &invocation).await;
        if outcome.is_ok() {
            self.report_local_dump_size();
        }
        outcome
    }

    pub async fn run_restore(&self) -> StepOutcome {
        let invocation = self.configuration.build_restore_command();
        self.execute(Step::Restore, &invocation).await
    }

    pub async fn run_step(&self, step: Step) -> StepOutcome {
        match step {
            Step::Dump => self.run_remote_dump().await,
            Step::Transfer => self.run_transfer().await,
            Step::Restore => self.run_restore().await,
        }
    }

    pub async fn run_all(&self) -> Summary {
        self.run_steps(&Step::ALL).await
    }

    pub async fn run(&self, mode: Mode) -> Summary {
        match mode {
            Mode::All => self.run_all().await,
            Mode::Only(step) => self.run_steps(&[step]).await,
        }
    }

    async fn run_steps(&self, steps: &[Step]) -> Summary {
        let mut summary = Summary {
            outcomes: Vec::new(),
            skipped: Vec::new(),
        };

        for step in steps {
            let aborted = self.configuration.failure_policy == FailurePolicy::Abort
                && !summary.failed_steps().is_empty();
            if aborted {
                self.log(
                    Level::Warn,
                    format_args!("skipping the {} process after an earlier failure", step),
                );
                summary.skipped.push(*step);
                continue;
            }

            let outcome = self.run_step(*step).await;
            summary.outcomes.push((*step, outcome));
        }

        let failed = summary.failed_steps().len();
        if failed == 0 && summary.skipped.is_empty() {
            self.log(
                Level::Info,
                format_args!("finished: {} of {} steps succeeded", steps.len(), steps.len()),
            );
        } else {
            self.log(
                Level::Warn,
                format_args!(
                    "finished: {} of {} steps succeeded, {} failed, {} skipped",
                    steps.len() - failed - summary.skipped.len(),
                    steps.len(),
                    failed,
                    summary.skipped.len()
                ),
            );
        }

        summary
    }

    async fn execute(&self, step: Step, invocation: &Invocation) -> StepOutcome {
        self.log(Level::Info, format_args!("starting the {} process", step));
        self.log(Level::Debug, format_args!("running: {}", invocation));

        let stopwatch = Stopwatch::start();
        let program = invocation.program.clone();
        let outcome = match self.runner.run(invocation).await {
            Ok(outcome) if outcome.success() => Ok(()),
            Ok(outcome) => Err(StepError::Exit {
                program,
                code: outcome.code,
            }),
            Err(RunError::Launch(source)) => Err(StepError::Launch { program, source }),
            Err(RunError::TimedOut(limit)) => Err(StepError::Timeout { program, limit }),
            Err(RunError::Wait(source)) => Err(StepError::Unexpected { program, source }),
        };

        match &outcome {
            Ok(()) => self.log(
                Level::Info,
                format_args!(
                    "{} was successful (runtime: {})",
                    capitalize(&step.to_string()),
                    stopwatch.get_formatted_runtime()
                ),
            ),
            Err(err) => self.log(
                Level::Error,
                format_args!(
                    "error during {}: {} (runtime: {})",
                    step,
                    err,
                    stopwatch.get_formatted_runtime()
                ),
            ),
        }

        outcome
    }

    fn report_local_dump_size(&self) {
        match fs::metadata(&self.configuration.local_restore_path) {
            Ok(metadata) => self.log(
                Level::Info,
                format_args!(
                    "local dump '{}' has {}",
                    self.configuration.local_restore_path,
                    Formatter::format_size(metadata.len(), 2)
                ),
            ),
            Err(err) => self.log(
                Level::Warn,
                format_args!(
                    "local dump '{}' could not be inspected => {}",
                    self.configuration.local_restore_path, err
                ),
            ),
        }
    }

    fn log(&self, level: Level, args: fmt::Arguments) {
        logging::emit(&*self.logger, level, LOG_TARGET, args);
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
