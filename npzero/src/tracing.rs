//! Logging setup.
//!
//! Library code logs through `use crate::tracing::prelude::*` and never
//! installs a subscriber. Binaries call [`init`] once at startup.
//!
//! Under systemd, events go to the journal. Everywhere else they go to
//! stdout in a compact one-line format, with structured fields on a second,
//! dimmed line, filtered by `RUST_LOG`.

use std::{
    env, fmt,
    io::{self, IsTerminal},
};

use time::OffsetDateTime;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::{
    filter::{EnvFilter, LevelFilter},
    fmt::{
        FmtContext, FormatEvent, FormatFields,
        format::{DefaultFields, Writer as FmtWriter},
        time::FormatTime,
    },
    prelude::*,
    registry::LookupSpan,
};

#[cfg(target_os = "linux")]
use std::os::unix::io::AsRawFd;

#[cfg(target_os = "linux")]
use nix::libc;

pub mod prelude {
    #[allow(unused_imports)]
    pub use tracing::{debug, error, info, trace, warn};
}

use prelude::*;

/// Prefix stripped from our own targets.
const CRATE_PREFIX: &str = "npzero::";

/// True if stderr is the stream systemd named in JOURNAL_STREAM.
///
/// The variable holds "device:inode"; it is inherited by children whose
/// stderr has been redirected, so the numbers must match stderr's own.
#[cfg(target_os = "linux")]
fn stderr_is_journal_stream() -> bool {
    let Ok(journal_stream) = env::var("JOURNAL_STREAM") else {
        return false;
    };
    let Some((dev, ino)) = journal_stream.split_once(':') else {
        return false;
    };
    let (Ok(expected_dev), Ok(expected_ino)) = (dev.parse::<u64>(), ino.parse::<u64>()) else {
        return false;
    };

    let fd = io::stderr().as_raw_fd();
    let mut stat: libc::stat = unsafe { std::mem::zeroed() };
    if unsafe { libc::fstat(fd, &mut stat) } != 0 {
        return false;
    }

    stat.st_dev as u64 == expected_dev && stat.st_ino as u64 == expected_ino
}

/// Install the global subscriber.
///
/// `default_level` applies when `RUST_LOG` is unset or does not mention a
/// target.
pub fn init(default_level: LevelFilter) {
    #[cfg(target_os = "linux")]
    {
        if stderr_is_journal_stream() {
            match tracing_journald::layer() {
                Ok(layer) => {
                    tracing_subscriber::registry()
                        .with(env_filter(default_level))
                        .with(layer)
                        .init();
                    return;
                }
                Err(e) => eprintln!("journald unavailable ({}), logging to stdout", e),
            }
        }
    }

    init_stdout(default_level);
}

fn env_filter(default_level: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var("RUST_LOG")
        .from_env_lossy()
}

fn init_stdout(default_level: LevelFilter) {
    let ansi = io::stdout().is_terminal();
    tracing_subscriber::registry()
        .with(env_filter(default_level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(LocalTimer)
                .with_ansi(ansi)
                .fmt_fields(DefaultFields::new())
                .event_format(CompactFormatter { ansi }),
        )
        .init();
    trace!(ansi, "Logging to stdout");
}

/// Collects an event's message and fields.
#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    fields: Vec<(&'static str, String)>,
}

impl Visit for FieldCollector {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.fields.push((field.name(), value.to_string()));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let formatted = format!("{:?}", value);
        if field.name() == "message" {
            self.message = Some(formatted);
        } else {
            // Some(x) -> x
            let cleaned = match formatted.strip_prefix("Some(") {
                Some(inner) => inner.strip_suffix(')').unwrap_or(inner).to_string(),
                None => formatted,
            };
            self.fields.push((field.name(), cleaned));
        }
    }
}

/// `HH:MM:SS LEVEL target: message`, fields on the next line.
struct CompactFormatter {
    ansi: bool,
}

impl CompactFormatter {
    fn paint(&self, w: &mut FmtWriter<'_>, color: &str, text: &str) -> fmt::Result {
        if self.ansi {
            write!(w, "{}{}\x1b[0m", color, text)
        } else {
            write!(w, "{}", text)
        }
    }
}

impl<S, N> FormatEvent<S, N> for CompactFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: FmtWriter<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = FieldCollector::default();
        event.record(&mut visitor);

        LocalTimer.format_time(&mut writer)?;
        write!(writer, " ")?;

        let (color, label) = match *event.metadata().level() {
            Level::ERROR => ("\x1b[31m", "ERROR"),
            Level::WARN => ("\x1b[33m", "WARN "),
            Level::INFO => ("\x1b[32m", "INFO "),
            Level::DEBUG => ("\x1b[34m", "DEBUG"),
            Level::TRACE => ("\x1b[35m", "TRACE"),
        };
        self.paint(&mut writer, color, label)?;

        let target = event.metadata().target();
        let target = target.strip_prefix(CRATE_PREFIX).unwrap_or(target);
        write!(writer, " {}: ", target)?;

        if let Some(message) = &visitor.message {
            write!(writer, "{}", message.trim_matches('"'))?;
        }

        if !visitor.fields.is_empty() {
            let fields = visitor
                .fields
                .iter()
                .map(|(key, value)| format!("{}={}", key, value.trim_matches('"')))
                .collect::<Vec<_>>()
                .join(", ");
            // Indent past "HH:MM:SS LEVEL ".
            writeln!(writer)?;
            write!(writer, "               ")?;
            self.paint(&mut writer, "\x1b[90m", &fields)?;
        }

        writeln!(writer)
    }
}

/// Local wall-clock time to the second.
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut FmtWriter<'_>) -> fmt::Result {
        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());
        let formatted = now
            .format(time::macros::format_description!("[hour]:[minute]:[second]"))
            .map_err(|_| fmt::Error)?;
        write!(w, "{}", formatted)
    }
}
