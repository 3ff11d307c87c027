use super::{Severity, SourceLocation, VerbosityTable, subsystem_of};
use std::fmt::{self, Write as _};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing::field::{Field, Visit};
use tracing::subscriber::Interest;
use tracing::{Event, Metadata, Subscriber};
use tracing_log::NormalizeEvent;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::{FormatTime, Uptime};
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::layer::{Context, Filter};
use tracing_subscriber::registry::LookupSpan;

/// Event layout for the fmt layer: `[uptime] L subsystem file:line: message`.
///
/// Events re-emitted from `log` records are normalized first, so they show
/// the record's own target and location.
pub struct RouterFormat {
    timer: Uptime,
}

impl RouterFormat {
    pub fn new(started: Instant) -> Self {
        Self {
            timer: Uptime::from(started),
        }
    }
}

fn colour_of(severity: Severity) -> Option<&'static str> {
    match severity {
        Severity::Fatal => Some("\x1b[1;31m"),
        Severity::Warn => Some("\x1b[33m"),
        Severity::Info => None,
        Severity::Verbose | Severity::Debug => Some("\x1b[2m"),
    }
}

impl<S, N> FormatEvent<S, N> for RouterFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let normalized = event.normalized_metadata();
        let metadata = normalized.as_ref().unwrap_or_else(|| event.metadata());
        let severity = Severity::from_tracing(metadata.level());
        let colour = colour_of(severity).filter(|_| writer.has_ansi_escapes());

        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let location = SourceLocation {
            file: metadata.file().unwrap_or("(unknown)"),
            line: metadata.line(),
        };

        if let Some(code) = colour {
            writer.write_str(code)?;
        }
        writer.write_char('[')?;
        self.timer.format_time(&mut writer)?;
        write!(
            writer,
            "] {} {} {}: {}",
            severity.letter(),
            subsystem_of(metadata.target()),
            location,
            visitor.finish()
        )?;
        if colour.is_some() {
            writer.write_str("\x1b[0m")?;
        }
        writeln!(writer)
    }
}

const LOG_CALLSITE_TARGET: &str = "log";

/// Per-layer filter deciding emission from the router's verbosity table.
#[derive(Clone)]
pub struct VerbosityFilter {
    table: Arc<RwLock<VerbosityTable>>,
}

impl VerbosityFilter {
    pub(super) fn new(table: Arc<RwLock<VerbosityTable>>) -> Self {
        Self { table }
    }

    fn admits(&self, metadata: &Metadata<'_>) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .should_emit(
                subsystem_of(metadata.target()),
                Severity::from_tracing(metadata.level()),
            )
    }
}

impl<S> Filter<S> for VerbosityFilter {
    // Callsites re-emitted from `log` records all share the "log" target; their
    // real subsystem is only known per event.
    fn enabled(&self, metadata: &Metadata<'_>, _cx: &Context<'_, S>) -> bool {
        metadata.is_event() && (metadata.target() == LOG_CALLSITE_TARGET || self.admits(metadata))
    }

    fn event_enabled(&self, event: &Event<'_>, _cx: &Context<'_, S>) -> bool {
        match event.normalized_metadata() {
            Some(metadata) => self.admits(&metadata),
            None => true,
        }
    }

    // Thresholds change after callsites are first seen (option dispatch runs
    // after the subscriber is installed), so interest is never cached.
    fn callsite_enabled(&self, _metadata: &'static Metadata<'static>) -> Interest {
        Interest::sometimes()
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
    fields: String,
}

impl MessageVisitor {
    fn finish(self) -> String {
        if self.fields.is_empty() {
            self.message
        } else {
            self.message + &self.fields
        }
    }
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message.push_str(value),
            name if name.starts_with("log.") => {}
            name => {
                let _ = write!(self.fields, " {}={}", name, value);
            }
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        match field.name() {
            "message" => {
                let _ = write!(self.message, "{:?}", value);
            }
            name if name.starts_with("log.") => {}
            name => {
                let _ = write!(self.fields, " {}={:?}", name, value);
            }
        }
    }
}
