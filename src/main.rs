use std::fs::{self, File};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Mutex, mpsc};
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod bucket;
mod controller;
mod domain;
mod export;
mod format;
mod inputter;
mod loader;
mod model;
mod schema;
mod table;
mod ui;

use controller::Controller;
use domain::{DEFAULT_DISCRIMINATOR, DEFAULT_ENDPOINT, DaveConfig, DaveError, Message};
use model::{Model, Status};
use ui::DashboardUI;

/// Terminal dashboard for backup, certificate and storage reports
#[derive(Parser, Debug)]
#[command(name = "dave", version)]
#[command(about = "Terminal dashboard for backup, certificate and storage reports")]
struct Args {
    /// Endpoint returning a JSON array of records, can be given multiple times
    #[arg(short, long = "endpoint", default_value = DEFAULT_ENDPOINT)]
    endpoints: Vec<String>,

    /// Field used to split records into tables
    #[arg(short, long, default_value = DEFAULT_DISCRIMINATOR)]
    discriminator: String,

    /// Additional field never shown as a column, can be given multiple times
    #[arg(long = "hidden-field")]
    hidden_fields: Vec<String>,

    /// Rows per page (5, 10 or 25)
    #[arg(short, long, default_value = "10")]
    page_size: usize,

    /// Show the built-in sample data when fetching fails
    #[arg(long, default_value = "false")]
    fallback: bool,

    /// Directory CSV exports are written to
    #[arg(long, default_value = ".")]
    export_dir: String,

    /// HTTP timeout per endpoint in seconds
    #[arg(long, default_value = "10")]
    timeout_secs: u64,

    /// Start in dark mode
    #[arg(long, default_value = "false")]
    dark: bool,

    /// Log file, the terminal belongs to the dashboard
    #[arg(long, default_value = "~/.cache/dave/dave.log")]
    log_file: String,

    /// Event poll time in milliseconds
    #[arg(long, default_value = "100")]
    event_poll_time: u64,

    /// Maximum rendered column width in characters
    #[arg(long, default_value = "32")]
    max_column_width: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(&args.log_file) {
        eprintln!("Error: could not set up logging: {e}");
        return ExitCode::FAILURE;
    }

    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {e}");
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let result = run(&config);
    ratatui::restore();
    match result {
        Err(e) => {
            error!("Dave stopped with an error: {e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn expand_path(path: &str) -> Result<PathBuf, DaveError> {
    let expanded = shellexpand::full(path)
        .map_err(|e| DaveError::InvalidConfig(format!("cannot expand {path}: {e}")))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn build_config(args: &Args) -> Result<DaveConfig, DaveError> {
    let mut hidden_fields = DaveConfig::default().hidden_fields;
    hidden_fields.extend(args.hidden_fields.iter().cloned());

    DaveConfig::default()
        .endpoints(args.endpoints.clone())
        .discriminator(args.discriminator.clone())
        .hidden_fields(hidden_fields)
        .page_size(args.page_size)
        .fallback(args.fallback)
        .export_dir(expand_path(&args.export_dir)?)
        .timeout(Duration::from_secs(args.timeout_secs))
        .dark_mode(args.dark)
        .event_poll_time(args.event_poll_time)
        .max_column_width(args.max_column_width)
        .validate()
}

fn init_logging(log_file: &str) -> Result<(), DaveError> {
    let path = expand_path(log_file)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(&path)?;

    // RUST_LOG takes precedence, fallback to info
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_target(false),
        )
        .with(ErrorLayer::default())
        .init();
    info!("Logging to {}", path.display());
    Ok(())
}

fn run(config: &DaveConfig) -> Result<(), DaveError> {
    info!(
        endpoints = ?config.endpoints,
        discriminator = %config.discriminator,
        page_size = config.page_size,
        fallback = config.fallback,
        "Starting dave"
    );

    let (sender, receiver) = mpsc::channel::<Message>();
    let controller = Controller::new(config, receiver);
    let mut ui = DashboardUI::new();

    let mut terminal = ratatui::try_init()?;
    let size = terminal.size()?;
    let mut model = Model::init(config, sender, size.width as usize);
    model.update(Some(Message::Refresh))?;

    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(model.get_uidata(), f))?;

        // Handle events and map to a Message
        let message = controller.handle_event(&model)?;
        model.update(message)?;
    }

    info!("Quitting dave");
    Ok(())
}
