#[macro_use]
extern crate clap;
#[macro_use]
extern crate lazy_static;

use std::env;
use std::path::Path;
use std::process;
use std::sync::Arc;

use chrono::Utc;
use clap::{Arg, ArgAction, Command};
use log::Level;

mod configuration;
mod formatter;
mod helper;
mod logging;
mod pipeline;
mod runner;

use configuration::{Configuration, Overrides, Settings};
use logging::SharedLogger;
use pipeline::{Mode, Pipeline};
use runner::SystemRunner;

const LOG_TARGET: &str = "rusty_pgsync";

struct Arguments {
    config: Option<String>,
    overrides: Overrides,
    mode: String,
    log_level: String,
}

async fn start_main(arguments: Arguments, logger: SharedLogger) -> Result<i32, String> {
    let mode: Mode = arguments.mode.parse()?;

    let home_dir = dirs::home_dir();
    let settings_file = configuration::locate_settings_file(
        arguments.config.as_deref(),
        Path::new("."),
        home_dir.as_deref(),
    )
    .map_err(|err| err.to_string())?;

    let file_settings = match settings_file {
        Some(file_name) => {
            logging::emit(
                &*logger,
                Level::Info,
                LOG_TARGET,
                format_args!("read settings from {}", file_name.display()),
            );
            Some(Settings::load(&file_name).map_err(|err| err.to_string())?)
        }
        None => None,
    };
    let settings = Settings::gather(file_settings, env::vars_os(), &arguments.overrides)
        .map_err(|err| err.to_string())?;

    let backup_configuration =
        Configuration::from_settings(&settings, Utc::now()).map_err(|err| err.to_string())?;

    let runner = SystemRunner::new(backup_configuration.step_timeout);
    let pipeline = Pipeline::new(backup_configuration, runner, logger);
    let summary = pipeline.run(mode).await;

    Ok(summary.exit_code(pipeline.configuration().failure_policy))
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let arguments = get_arguments();

    let level = match logging::parse_level(&arguments.log_level) {
        Ok(level) => level,
        Err(why) => {
            eprintln!("Error: {}", why);
            process::exit(2);
        }
    };
    let logger = match logging::console_logger(level) {
        Ok(logger) => logger,
        Err(why) => {
            eprintln!("Error: {}", why);
            process::exit(1);
        }
    };

    let code = match start_main(arguments, Arc::clone(&logger)).await {
        Ok(code) => code,
        Err(why) => {
            logging::emit(
                &*logger,
                Level::Error,
                LOG_TARGET,
                format_args!("Error: {}", why),
            );
            1
        }
    };

    logger.flush();
    process::exit(code);
}

fn get_arguments() -> Arguments {
    let matches = Command::new("rusty-pgsync")
        .version(crate_version!())
        .author(crate_authors!())
        .about("Dumps a remote PostgreSQL database, copies the dump here and restores it locally.")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Specify a settings file (default: .env or rusty-pgsync.conf)"),
        )
        .arg(
            Arg::new("remote-path")
                .short('r')
                .long("remote-path")
                .value_name("PATH")
                .help("Where the dump is written on the remote host"),
        )
        .arg(
            Arg::new("local-path")
                .short('l')
                .long("local-path")
                .value_name("PATH")
                .help("Where the dump is copied to and restored from"),
        )
        .arg(
            Arg::new("mode")
                .short('m')
                .long("mode")
                .value_name("MODE")
                .default_value("all")
                .help("all (default), dump, transfer or restore"),
        )
        .arg(
            Arg::new("abort-on-failure")
                .long("abort-on-failure")
                .action(ArgAction::SetTrue)
                .help("Skip the remaining steps once one failed and exit with 1"),
        )
        .arg(
            Arg::new("step-timeout")
                .long("step-timeout")
                .value_name("DURATION")
                .help("Kill a step that runs longer than this (e.g. 30m)"),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .value_name("LEVEL")
                .default_value("info")
                .help("error, warn, info (default), debug or trace"),
        )
        .get_matches();

    Arguments {
        config: matches.get_one::<String>("config").cloned(),
        overrides: Overrides {
            remote_path: matches.get_one::<String>("remote-path").cloned(),
            local_path: matches.get_one::<String>("local-path").cloned(),
            step_timeout: matches.get_one::<String>("step-timeout").cloned(),
            abort_on_failure: matches.get_flag("abort-on-failure"),
        },
        mode: matches
            .get_one::<String>("mode")
            .cloned()
            .unwrap_or_else(|| String::from("all")),
        log_level: matches
            .get_one::<String>("log-level")
            .cloned()
            .unwrap_or_else(|| String::from("info")),
    }
}
