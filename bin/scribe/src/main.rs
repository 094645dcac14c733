//! Writes recording rule evaluation results to a Prometheus remote-write endpoint.

#![deny(warnings)]

use std::{fs::File, io::BufReader, path::Path};

use clap::Parser as _;
use scribe_app::prelude::*;
use scribe_config::ConfigurationLoader;
use scribe_error::{ErrorContext as _, GenericError};
use scribe_frame::Frame;
use scribe_io::net::HttpTransportProvider;
use scribe_remote_write::{extract_points, RemoteWriter, WriterConfig};
use tracing::{debug, error, info};

mod config;
use self::config::{Action, Cli, PointsConfig, WriteConfig};

const ENV_PREFIX: &str = "SCRIBE";

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = initialize_logging(Some(cli.log_level())) {
        fatal_and_exit(format!("failed to initialize logging: {}", e));
    }

    if let Err(e) = run(cli).await {
        error!("{:?}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), GenericError> {
    match cli.action {
        Action::Write(config) => write(config).await,
        Action::Points(config) => print_points(config),
    }
}

async fn write(config: WriteConfig) -> Result<(), GenericError> {
    initialize_tls().error_context("Failed to initialize TLS.")?;

    let writer_config = ConfigurationLoader::default()
        .from_file(&config.config)?
        .from_environment(ENV_PREFIX)?
        .into_typed::<WriterConfig>()?;
    debug!(config = ?writer_config, "Loaded writer configuration.");

    let frames = load_frames(&config.points.frames)?;
    let writer = RemoteWriter::new(&writer_config, &HttpTransportProvider::new())?;

    let points = &config.points;
    writer
        .write(&points.name, points.timestamp(), &frames, &points.extra_labels())
        .await?;

    info!(metric = %points.name, endpoint = %writer.client().endpoint(), "Wrote rule evaluation results.");
    Ok(())
}

fn print_points(config: PointsConfig) -> Result<(), GenericError> {
    let frames = load_frames(&config.frames)?;
    let points = extract_points(&config.name, config.timestamp(), &frames, &config.extra_labels())?;

    let rendered = serde_json::to_string_pretty(&points).error_context("Failed to render points.")?;
    println!("{}", rendered);
    Ok(())
}

fn load_frames(path: &Path) -> Result<Vec<Frame>, GenericError> {
    let file = File::open(path).with_error_context(|| format!("Failed to open frames file '{}'.", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_error_context(|| format!("Failed to parse frames file '{}'.", path.display()))
}
