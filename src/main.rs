//! filevars daemon
//!
//! Usage:
//!   filevars [-v] [-h] -f <FILE>
//!
//! Options:
//!   -f, --file <FILE>  Configuration file (JSON, or TOML with a .toml extension)
//!   -v, --verbose      Verbose output
//!   -h, --help         Display this help

use std::path::PathBuf;
use std::process;

use clap::{CommandFactory, Parser};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

use filevars::{shutdown, FileVarsConfig};

#[derive(Parser)]
#[command(name = "filevars")]
#[command(about = "Map variables to template files")]
#[command(disable_help_flag = true)]
struct Cli {
    /// Configuration file
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Display this help
    #[arg(short, long)]
    help: bool,
}

fn main() {
    if std::env::args_os().len() < 2 {
        usage();
        process::exit(1);
    }

    let (trigger, shutdown_rx) = shutdown::channel();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("{}", e.kind());
            usage();
            process::exit(1);
        }
    };
    init_tracing(cli.verbose);

    if let Err(e) = shutdown::install(trigger, shutdown::SHUTDOWN_GRACE) {
        warn!(error = %e, "could not install termination handler");
    }

    // -h shows usage but does not stop the daemon
    if cli.help {
        usage();
    }

    let Some(path) = cli.file else {
        if !cli.help {
            usage();
        }
        process::exit(1);
    };

    let config = match FileVarsConfig::from_file(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.report());
            process::exit(1);
        }
    };

    match filevars::serve(&config, shutdown_rx) {
        Ok(exit) => {
            error!(?exit, "abnormal termination of filevars");
        }
        Err(e) => {
            error!(error = %e, "could not open variable server");
        }
    }
    process::exit(1);
}

fn usage() {
    eprintln!("{}", Cli::command().render_help());
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
