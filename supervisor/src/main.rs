mod channel;
mod error;
mod process;
mod supervisor;

use anyhow::Context;
use clap::Parser;
use common::{Config, LoggingConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use supervisor::{Supervisor, SupervisorPlan};

#[derive(Parser)]
#[command(author, version, about = "Run the fake GPU producer and FITS writer until quit or Ctrl-C", long_about = None)]
struct Args {
    /// Config file (.yaml, .yml or .toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Raise log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    let config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    setup_logging(&config.logging, args.verbose)?;
    log::info!("Starting scan supervisor...");

    let mut supervisor = Supervisor::new(SupervisorPlan::from_config(&config.supervisor));
    match supervisor.run().await {
        Ok(reason) => {
            log::info!("Supervisor stopped ({:?}, {:?})", reason, supervisor.state());
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn setup_logging(logging: &LoggingConfig, verbose: u8) -> anyhow::Result<()> {
    let level = match verbose {
        0 => logging.level_filter(),
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    let log_file = std::env::var("SCANCTL_LOG")
        .ok()
        .map(PathBuf::from)
        .or_else(|| logging.output.clone());

    // Operator prompts own stdout
    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d][%H:%M:%S"),
                record.target(),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Some(path) = log_file {
        dispatch = dispatch.chain(
            fern::log_file(&path).with_context(|| format!("Failed to open log file {:?}", path))?,
        );
    }

    dispatch.apply()?;
    Ok(())
}
