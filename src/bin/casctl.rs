// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::{env, path::PathBuf, process, time::Duration};

use clap::{Arg, ArgAction, ArgMatches, Command};
use env_logger::Builder;
use log::LevelFilter;

use opencas::{
    casctl::{run, CasResult, VERSION},
    engine::{verify_binaries, SystemExecutor, DEFAULT_CONFIG_PATH},
};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

fn casctl_cmd() -> Command {
    Command::new("casctl")
        .version(VERSION)
        .about("Open CAS service control")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_name("PATH")
                .value_parser(clap::value_parser!(PathBuf))
                .default_value(DEFAULT_CONFIG_PATH)
                .help("Configuration file declaring caches and cores"),
        )
        .arg(
            Arg::new("log_level")
                .long("log-level")
                .global(true)
                .value_name("LEVEL")
                .value_parser(LOG_LEVELS)
                .help("Log at this level; overrides RUST_LOG"),
        )
        .subcommand(
            Command::new("init")
                .about("Start all caches and add all cores from scratch")
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Overwrite existing metadata and partitions on cache devices"),
                ),
        )
        .subcommand(
            Command::new("start").about("Load all configured caches and cores which are present"),
        )
        .subcommand(
            Command::new("settle")
                .about("Wait for all configured caches and cores to come up")
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_name("SECS")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("270"),
                )
                .arg(
                    Arg::new("interval")
                        .long("interval")
                        .value_name("SECS")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("5"),
                ),
        )
        .subcommand(
            Command::new("stop")
                .about("Detach all cores and stop all caches")
                .arg(
                    Arg::new("flush")
                        .long("flush")
                        .action(ArgAction::SetTrue)
                        .help("Flush dirty data before detaching and stopping"),
                ),
        )
        .subcommand(Command::new("report").about("Print the running caches and cores as JSON"))
        .subcommand(Command::new("version").about("Print versions of installed components"))
}

/// Configure and initialize the logger.
/// The level given on the command line takes precedence. Otherwise, read
/// log configuration parameters from RUST_LOG if it is set. Otherwise,
/// log warnings and errors only.
fn initialize_log(level: Option<&str>) {
    let mut builder = Builder::new();

    match level.and_then(|l| l.parse::<LevelFilter>().ok()) {
        Some(filter) => {
            builder.filter_level(filter);
        }
        None => match env::var("RUST_LOG") {
            Ok(s) => {
                builder.parse_filters(&s);
            }
            Err(_) => {
                builder.filter_level(LevelFilter::Warn);
            }
        },
    }

    builder.init()
}

fn seconds(matches: &ArgMatches, name: &str) -> Duration {
    Duration::from_secs(
        *matches
            .get_one::<u64>(name)
            .expect("argument has a default value"),
    )
}

fn run_command(name: &str, matches: &ArgMatches) -> CasResult<()> {
    verify_binaries()?;

    let executor = SystemExecutor;
    let config = matches
        .get_one::<PathBuf>("config")
        .expect("'config' has a default value");

    match name {
        "init" => run::init(&executor, config, matches.get_flag("force")),
        "start" => run::start(&executor, config),
        "settle" => run::settle(
            &executor,
            config,
            seconds(matches, "timeout"),
            seconds(matches, "interval"),
        ),
        "stop" => run::stop(&executor, matches.get_flag("flush")),
        "report" => {
            println!("{}", run::report(&executor)?);
            Ok(())
        }
        "version" => {
            println!("{}", run::version(&executor)?);
            Ok(())
        }
        _ => unreachable!("all subcommands are handled"),
    }
}

fn main() {
    let matches = casctl_cmd().get_matches();
    let (name, sub) = matches.subcommand().expect("a subcommand is required");
    initialize_log(sub.get_one::<String>("log_level").map(|s| s.as_str()));

    if let Err(e) = run_command(name, sub) {
        eprintln!("Error encountered: {e}");
        process::exit(1);
    }
}
