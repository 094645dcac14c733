//! Logging.

use std::fmt;

use chrono::Utc;
use scribe_error::{generic_error, GenericError};
use tracing::{field, level_filters::LevelFilter, Event, Subscriber};
use tracing_subscriber::{
    field::VisitOutput,
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt as _,
    registry::LookupSpan,
    util::SubscriberInitExt as _,
    EnvFilter, Layer,
};

const LOG_LEVEL_ENV_VAR: &str = "SCRIBE_LOG_LEVEL";
const LOG_FORMAT_JSON_ENV_VAR: &str = "SCRIBE_LOG_FORMAT_JSON";

/// Logs a message to standard error and exits the process with a non-zero exit code.
pub fn fatal_and_exit(message: String) -> ! {
    eprintln!("FATAL: {}", message);
    std::process::exit(1);
}

/// Initializes the logging subsystem for `tracing`.
///
/// This function reads the `SCRIBE_LOG_LEVEL` environment variable to determine the log filtering directives to use. If
/// the environment variable is not set, `default_level` is used, or `INFO` if no default level is given. Additionally,
/// it reads the `SCRIBE_LOG_FORMAT_JSON` environment variable to determine which output format to use. If it is set to
/// `true` or `1`, the logs will be formatted as JSON. Otherwise, logs are written in a pipe-delimited, human-readable
/// format.
///
/// All logs are written to standard error, so that standard output stays free for command output.
///
/// # Errors
///
/// If the logging subsystem was already initialized, an error will be returned.
pub fn initialize_logging(default_level: Option<LevelFilter>) -> Result<(), GenericError> {
    let is_json = std::env::var(LOG_FORMAT_JSON_ENV_VAR)
        .map(|s| s.trim().to_lowercase())
        .map(|s| s == "true" || s == "1")
        .unwrap_or(false);

    let level_filter = EnvFilter::builder()
        .with_default_directive(default_level.unwrap_or(LevelFilter::INFO).into())
        .with_env_var(LOG_LEVEL_ENV_VAR)
        .from_env_lossy();

    let result = if is_json {
        tracing_subscriber::registry()
            .with(json_layer().with_filter(level_filter))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(pretty_layer().with_filter(level_filter))
            .try_init()
    };

    result.map_err(|e| generic_error!("Failed to initialize logging: {}", e))
}

fn json_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .json()
        .flatten_event(true)
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
}

fn pretty_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    tracing_subscriber::fmt::Layer::new()
        .event_format(PipeFormatter::new("SCRIBE"))
        .with_writer(std::io::stderr)
}

/// Event formatter producing `<time> | <app> | <level> | (<file>:<line>) | key:value,... | message`.
struct PipeFormatter {
    app_name: &'static str,
}

impl PipeFormatter {
    fn new(app_name: &'static str) -> Self {
        Self { app_name }
    }
}

impl<S, N> FormatEvent<S, N> for PipeFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(&self, _ctx: &FmtContext<'_, S, N>, mut writer: Writer<'_>, event: &Event<'_>) -> fmt::Result {
        let metadata = event.metadata();

        write!(
            writer,
            "{} | {} | {} | ",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC"),
            self.app_name,
            metadata.level()
        )?;

        match (metadata.file(), metadata.line()) {
            (Some(file), Some(line)) => write!(writer, "({}:{})", file, line)?,
            _ => write!(writer, "(unknown:0)")?,
        }

        let mut visitor = PipeFieldVisitor::new(writer.by_ref());
        event.record(&mut visitor);
        visitor.finish()?;

        writeln!(writer)
    }
}

/// Field visitor that writes structured fields as `key:value` pairs, separated by commas, and holds the message back
/// so it can be written last.
///
/// The first write error is kept and returned from `finish`. Writes after an error are skipped.
struct PipeFieldVisitor<'writer> {
    writer: Writer<'writer>,
    fields_written: usize,
    message: String,
    last_result: fmt::Result,
}

impl<'writer> PipeFieldVisitor<'writer> {
    fn new(writer: Writer<'writer>) -> Self {
        Self {
            writer,
            fields_written: 0,
            message: String::new(),
            last_result: Ok(()),
        }
    }

    fn try_write(&mut self, field: &field::Field, f: impl FnOnce(&mut dyn fmt::Write) -> fmt::Result) {
        if self.last_result.is_err() {
            return;
        }

        if field.name() == "message" {
            self.last_result = f(&mut self.message);
            return;
        }

        let separator = if self.fields_written == 0 { " | " } else { "," };
        self.last_result = write!(self.writer, "{}{}:", separator, field.name());
        if self.last_result.is_ok() {
            self.last_result = f(&mut self.writer);
        }
        if self.last_result.is_ok() {
            self.fields_written += 1;
        }
    }
}

impl field::Visit for PipeFieldVisitor<'_> {
    fn record_debug(&mut self, field: &field::Field, value: &dyn fmt::Debug) {
        self.try_write(field, |w| write!(w, "{:?}", value));
    }

    fn record_str(&mut self, field: &field::Field, value: &str) {
        self.try_write(field, |w| write!(w, "{}", value));
    }
}

impl VisitOutput<fmt::Result> for PipeFieldVisitor<'_> {
    fn finish(mut self) -> fmt::Result {
        self.last_result?;

        if self.message.is_empty() {
            Ok(())
        } else {
            write!(self.writer, " | {}", self.message)
        }
    }
}
