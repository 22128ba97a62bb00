//! This module implements the definition of the command line app.

use std::path::PathBuf;

use clap::builder::ValueParser;
use clap::{Arg, ArgAction, Command, value_parser};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const ABOUT: &str = "Tails load balancer access logs into Honeycomb.";

pub fn make_app() -> Command {
    Command::new("elbtail")
        .disable_help_subcommand(true)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .propagate_version(true)
        .max_term_width(79)
        .version(VERSION)
        .about(ABOUT)
        .arg(
            Arg::new("config")
                .value_name("CONFIG")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("The path to the config folder."),
        )
        .subcommand(
            Command::new("publish")
                .about("Publish access logs")
                .after_help(
                    "This reads access log lines from the given files, or from stdin if no \
                     file or '-' is given, samples them and sends them to Honeycomb.  All \
                     files are published concurrently.  The command returns once every \
                     file has been read and all events have been delivered.",
                )
                .arg(
                    Arg::new("files")
                        .value_name("FILE")
                        .num_args(0..)
                        .action(ArgAction::Append)
                        .value_parser(ValueParser::os_string())
                        .help("Access log files to publish. Use '-' for stdin."),
                )
                .arg(
                    Arg::new("write_key")
                        .long("write-key")
                        .short('k')
                        .value_name("KEY")
                        .env("ELBTAIL_WRITE_KEY")
                        .hide_env_values(true)
                        .help("The Honeycomb write key."),
                )
                .arg(
                    Arg::new("dataset")
                        .long("dataset")
                        .short('d')
                        .value_name("DATASET")
                        .env("ELBTAIL_DATASET")
                        .help("The dataset events are written to."),
                )
                .arg(
                    Arg::new("api_host")
                        .long("api-host")
                        .value_name("URL")
                        .env("ELBTAIL_API_HOST")
                        .help("The base URL of the Honeycomb API."),
                )
                .arg(
                    Arg::new("sample_rate")
                        .long("sample-rate")
                        .value_name("RATE")
                        .env("ELBTAIL_SAMPLE_RATE")
                        .help("The goal sample rate across all events."),
                )
                .arg(
                    Arg::new("statsd")
                        .long("statsd")
                        .value_name("HOST:PORT")
                        .env("ELBTAIL_STATSD")
                        .help("The statsd server internal metrics are reported to."),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Manage the elbtail config")
                .after_help(
                    "This command provides basic config management.  It can be used \
                     to initialize a new config and to print out the current config.",
                )
                .subcommand_required(true)
                .arg_required_else_help(true)
                .subcommand(
                    Command::new("init")
                        .about("Initialize a new config")
                        .after_help(
                            "This creates the config folder and writes a config file \
                             with all default values into it.",
                        ),
                )
                .subcommand(
                    Command::new("show")
                        .about("Show the entire config out for debugging purposes")
                        .after_help(
                            "This dumps out the entire config including the values \
                             which are not in the config file but filled in from \
                             defaults.  The default output format is YAML but a debug \
                             format can also be specified.",
                        )
                        .arg(
                            Arg::new("format")
                                .short('f')
                                .long("format")
                                .value_parser(["debug", "yaml"])
                                .default_value("yaml")
                                .help("The output format"),
                        ),
                ),
        )
}
