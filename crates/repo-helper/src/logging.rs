use std::fmt;

use anstream::ColorChoice;
use anyhow::Context;
use owo_colors::{AnsiColors, OwoColorize};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::registry::LookupSpan;

/// The workspace crates that log through `tracing`.
const CRATES: [&str; 5] = [
    "repo_helper",
    "rh_build_backend",
    "rh_configuration",
    "rh_fs",
    "rh_requirements",
];

/// How much to log when `RUST_LOG` is unset.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Verbosity {
    /// Nothing.
    #[default]
    Quiet,
    /// `DEBUG` and above from the workspace crates (`--verbose`).
    Verbose,
}

/// `DEBUG Writing wheel at dist/...`, one line per event.
struct LevelPrefixed;

fn level_color(level: Level) -> AnsiColors {
    match level {
        Level::TRACE => AnsiColors::Magenta,
        Level::DEBUG => AnsiColors::Blue,
        Level::INFO => AnsiColors::Green,
        Level::WARN => AnsiColors::Yellow,
        Level::ERROR => AnsiColors::Red,
    }
}

impl<S, N> FormatEvent<S, N> for LevelPrefixed
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            write!(writer, "{} ", level.color(level_color(level)))?;
        } else {
            write!(writer, "{level} ")?;
        }
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// `RUST_LOG` if set, otherwise the directives for `verbosity`.
fn env_filter(verbosity: Verbosity) -> anyhow::Result<EnvFilter> {
    if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
        return EnvFilter::try_from_default_env().context("Invalid `RUST_LOG` directives");
    }
    let directives = match verbosity {
        Verbosity::Quiet => String::new(),
        Verbosity::Verbose => CRATES.map(|krate| format!("{krate}=debug")).join(","),
    };
    EnvFilter::builder()
        .with_default_directive(LevelFilter::OFF.into())
        .parse(directives)
        .context("Invalid logging directives")
}

/// Send `tracing` events to stderr.
pub(crate) fn setup_logging(verbosity: Verbosity) -> anyhow::Result<()> {
    let ansi = !matches!(
        anstream::Stderr::choice(&std::io::stderr()),
        ColorChoice::Never
    );

    tracing_subscriber::fmt()
        .with_ansi(ansi)
        .event_format(LevelPrefixed)
        .with_env_filter(env_filter(verbosity)?)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("{err}"))
        .context("Failed to initialize logging")
}
