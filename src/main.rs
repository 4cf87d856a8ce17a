pub mod config;
pub mod control_loop;
pub mod controller;
pub mod error;
pub mod link;
pub mod mapping;

use crate::config::{LoggingSettings, TeleopConfig};
use crate::control_loop::{ControlLoop, LoopSummary};
use crate::controller::EventCollector;
use crate::error::TeleopError;
use crate::link::MaccepaLink;
use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;
use std::process::ExitCode;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "maccepa-teleop")]
#[command(version, about = "Control a MACCEPA actuator with a joystick")]
struct Cli {
    /// Serial port of the actuator control board (e.g. /dev/ttyUSB0)
    #[arg(value_name = "PORT")]
    port: String,

    /// Config file path (default: ~/.config/maccepa-teleop/teleop.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() -> Result<ExitCode> {
    // Usage errors exit here with status 2, before any hardware is touched
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return Ok(ExitCode::from(e.exit_code()));
        }
    };

    setup(&config.logging)?;

    Ok(ExitCode::from(exit_status(run(&cli.port, &config))))
}

// Logging is up by now, so errors are reported once through the subscriber
fn exit_status(outcome: Result<LoopSummary, TeleopError>) -> u8 {
    match outcome {
        Ok(summary) => {
            info!(
                "Session finished after {} events and {} writes",
                summary.events, summary.writes
            );
            0
        }
        Err(e) => {
            error!("{}", e);
            e.exit_code()
        }
    }
}

fn load_config(cli: &Cli) -> Result<TeleopConfig, TeleopError> {
    let (path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (TeleopConfig::default_path(), false),
    };
    Ok(TeleopConfig::load(&path, required)?)
}

fn run(port: &str, config: &TeleopConfig) -> Result<LoopSummary, TeleopError> {
    // Init: the link must be up before joysticks are looked at
    let link = MaccepaLink::open(port, config.link.clone())?;
    let source = EventCollector::create()?.initialize()?;

    let ready = ControlLoop::create(Box::new(link), Box::new(source), CancellationToken::new())
        .initialize()?;
    ready.start()?.run()
}

fn setup(logging: &LoggingSettings) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;

    // RUST_LOG holding a plain level wins over the config file
    let level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|value| Level::from_str(&value).ok())
        .map_or_else(|| logging.max_level(), Ok)?;
    setup_logging_env(level);
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
