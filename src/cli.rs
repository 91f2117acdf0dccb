use std::{env, path::PathBuf, sync::Arc};

use ansi_term::Color::Green;
use structopt::StructOpt;

use scchain_config as config;
use scchain_node::actors::node;

pub fn from_args() -> Cli {
    Cli::from_args()
}

pub fn exec(command: Cli) -> anyhow::Result<()> {
    let Cli {
        config,
        debug,
        trace,
        no_timestamp,
        no_module_path,
        cmd,
    } = command;

    let config = get_config(config.or_else(config::dirs::find_config))?;

    let mut log_opts = LogOptions {
        level: config.log.level,
        source: LogOptionsSource::Config,
        timestamp: !no_timestamp,
        module_path: !no_module_path,
    };

    if let Ok(rust_log) = env::var("RUST_LOG") {
        if rust_log.contains("scchain") {
            log_opts.level = env_logger::Logger::from_default_env().filter();
            log_opts.source = LogOptionsSource::Env;
        }
    }

    if trace {
        log_opts.level = log::LevelFilter::Trace;
        log_opts.source = LogOptionsSource::Flag;
    } else if debug {
        log_opts.level = log::LevelFilter::Debug;
        log_opts.source = LogOptionsSource::Flag;
    }

    init_logger(&log_opts);

    match cmd {
        Command::Run => run_node(config),
        Command::ShowConfig => {
            println!("{:#?}", config);
            Ok(())
        }
    }
}

fn run_node(config: config::Config) -> anyhow::Result<()> {
    log::info!(
        "{} committee of {} with quorum {}, {} chains",
        Green.bold().paint("Starting local committee"),
        config.committee.size,
        config.committee.quorum,
        config.committee.chains
    );

    node::run(Arc::new(config), || {
        let system = node::System::current();
        if let Err(e) = ctrlc::set_handler(move || node::close(&system)) {
            log::error!(
                "Error setting handler for both SIGINT (Ctrl+C) and SIGTERM (kill): {}",
                e
            );
        }
    })
}

fn init_logger(opts: &LogOptions) {
    println!(
        "Setting log level to: {}, source: {:?}",
        opts.level, opts.source
    );
    env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp(if opts.timestamp {
            Some(env_logger::TimestampPrecision::Seconds)
        } else {
            None
        })
        .format_module_path(opts.module_path)
        .filter_level(log::LevelFilter::Info)
        .filter_module("scchain", opts.level)
        .init();
}

fn get_config(path: Option<PathBuf>) -> anyhow::Result<config::Config> {
    match path {
        Some(p) => {
            println!("Loading config from: {}", p.display());
            let partial = config::loaders::toml::from_file(p)?;
            Ok(config::Config::from_partial(&partial))
        }
        None => {
            println!("HEADS UP! No configuration specified/found. Using default one!");
            Ok(config::Config::default())
        }
    }
}

#[derive(Debug, StructOpt)]
#[structopt(name = "scchain", about = "Committee node of the smart-contract chains.")]
pub struct Cli {
    /// Load configuration from this file.
    #[structopt(short = "c", long = "config")]
    config: Option<PathBuf>,
    /// Turn on DEBUG logging.
    #[structopt(long = "debug")]
    debug: bool,
    /// Turn on TRACE logging.
    #[structopt(long = "trace")]
    trace: bool,
    /// Do not show timestamps in logs.
    #[structopt(long = "no-timestamp")]
    no_timestamp: bool,
    /// Do not show module path in logs.
    #[structopt(long = "no-module-path")]
    no_module_path: bool,
    #[structopt(subcommand)]
    cmd: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Run every node of the committee in this process.
    #[structopt(name = "run")]
    Run,
    /// Print the configuration in use and exit.
    #[structopt(name = "show-config")]
    ShowConfig,
}

#[derive(Debug)]
struct LogOptions {
    level: log::LevelFilter,
    source: LogOptionsSource,
    timestamp: bool,
    module_path: bool,
}

#[derive(Debug)]
enum LogOptionsSource {
    Config,
    Env,
    Flag,
}
