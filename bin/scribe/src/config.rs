use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{ArgAction, Args, Parser, Subcommand};
use scribe_frame::Labels;
use tracing::level_filters::LevelFilter;

#[derive(Parser)]
#[command(about)]
pub struct Cli {
    /// Enable verbose output. (Specify twice for more verbosity.)
    #[arg(global = true, short = 'v', long, action = ArgAction::Count, default_value_t = 0)]
    verbose: u8,

    /// Subcommand to run.
    #[command(subcommand)]
    pub action: Action,
}

impl Cli {
    /// Gets the configured log level based on the user-supplied verbosity level.
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        }
    }
}

#[derive(Subcommand)]
pub enum Action {
    /// Write rule evaluation results to a remote metrics store.
    Write(WriteConfig),

    /// Print the points rule evaluation results would be written as, without writing them.
    Points(PointsConfig),
}

/// Options shared by every command reading rule evaluation results.
#[derive(Args, Clone, Debug)]
pub struct PointsConfig {
    /// Metric name to record the results under.
    #[arg(short = 'n', long)]
    pub name: String,

    /// Path to a JSON file holding the evaluation result frames.
    #[arg(short = 'f', long)]
    pub frames: PathBuf,

    /// Label added to every series, as `name=value`. (Can be repeated.)
    #[arg(short = 'l', long = "label", value_parser = parse_label)]
    pub labels: Vec<(String, String)>,

    /// Evaluation timestamp, in RFC 3339 format.
    ///
    /// Defaults to the current time.
    #[arg(short = 't', long)]
    pub timestamp: Option<DateTime<Utc>>,
}

impl PointsConfig {
    /// Returns the extra labels, in the order given.
    ///
    /// A label given more than once keeps its last value.
    pub fn extra_labels(&self) -> Labels {
        self.labels.iter().cloned().collect()
    }

    /// Returns the evaluation timestamp.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp.unwrap_or_else(Utc::now)
    }
}

#[derive(Args, Clone, Debug)]
pub struct WriteConfig {
    /// Path to the writer configuration file (YAML, or JSON with a `.json` extension).
    ///
    /// Settings can be overridden with `SCRIBE_`-prefixed environment variables, such as `SCRIBE_URL`.
    #[arg(short = 'c', long)]
    pub config: PathBuf,

    #[command(flatten)]
    pub points: PointsConfig,
}

fn parse_label(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected `name=value`, got `{}`", raw)),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser as _;

    use super::*;

    #[test]
    fn parses_write_command() {
        let cli = Cli::try_parse_from([
            "scribe",
            "-v",
            "write",
            "--config",
            "/etc/scribe/writer.yaml",
            "--name",
            "cpu_usage",
            "--frames",
            "frames.json",
            "--label",
            "env=prod",
            "--label",
            "team=infra",
            "--timestamp",
            "2023-11-14T22:13:20Z",
        ])
        .unwrap();

        assert_eq!(cli.log_level(), LevelFilter::DEBUG);

        let Action::Write(config) = cli.action else {
            panic!("expected write command");
        };
        assert_eq!(config.config, PathBuf::from("/etc/scribe/writer.yaml"));
        assert_eq!(config.points.name, "cpu_usage");
        assert_eq!(config.points.timestamp().timestamp(), 1_700_000_000);

        let labels: Vec<_> = config.points.extra_labels().iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        assert_eq!(
            labels,
            vec![("env".to_string(), "prod".to_string()), ("team".to_string(), "infra".to_string())]
        );
    }

    #[test]
    fn label_values_may_contain_equals() {
        assert_eq!(
            parse_label("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_label("empty=").unwrap(), ("empty".to_string(), String::new()));
    }

    #[test]
    fn malformed_labels_are_rejected() {
        assert!(parse_label("novalue").is_err());
        assert!(parse_label("=value").is_err());

        let result = Cli::try_parse_from(["scribe", "points", "-n", "up", "-f", "frames.json", "-l", "broken"]);
        assert!(result.is_err());
    }

    #[test]
    fn write_requires_config() {
        let result = Cli::try_parse_from(["scribe", "write", "-n", "up", "-f", "frames.json"]);
        assert!(result.is_err());
    }
}
