use super::format::{RouterFormat, VerbosityFilter};
use super::native::native_level;
use super::{Severity, VerbosityTable};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;
use tracing_subscriber::filter::Filtered;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::DefaultFields;
use tracing_subscriber::layer::{Layered, SubscriberExt};
use tracing_subscriber::{Layer, Registry};

/// Where a log message originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation<'a> {
    pub file: &'a str,
    pub line: Option<u32>,
}

impl SourceLocation<'static> {
    /// Location of the caller.
    #[track_caller]
    pub fn here() -> Self {
        let caller = std::panic::Location::caller();
        Self {
            file: caller.file(),
            line: Some(caller.line()),
        }
    }
}

impl fmt::Display for SourceLocation<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}:{}", self.file, line),
            None => f.write_str(self.file),
        }
    }
}

/// fmt layer writing router lines, filtered by the verbosity table.
pub type RouterLayer<S, W> =
    Filtered<tracing_subscriber::fmt::Layer<S, DefaultFields, RouterFormat, W>, VerbosityFilter, S>;

/// Owns the verbosity table and builds the subscriber that applies it.
///
/// Output goes through a synchronous writer. No writer thread exists, which
/// keeps logging usable on both sides of the daemonization fork.
pub struct LogRouter {
    table: Arc<RwLock<VerbosityTable>>,
    started: Instant,
}

impl LogRouter {
    /// Router starting at `all=info`, timing lines from `started`.
    pub fn new(started: Instant) -> Self {
        Self {
            table: Arc::new(RwLock::new(VerbosityTable::default())),
            started,
        }
    }

    pub fn set_verbosity(&self, subsystem: &str, level: Severity) {
        self.table
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .set(subsystem, level);
    }

    /// Overwrite every threshold registered in `table`.
    pub fn apply(&self, table: &VerbosityTable) {
        let mut current = self.table.write().unwrap_or_else(PoisonError::into_inner);
        for (subsystem, level) in table.iter() {
            current.set(subsystem, level);
        }
    }

    pub fn should_emit(&self, subsystem: &str, level: Severity) -> bool {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .should_emit(subsystem, level)
    }

    /// Snapshot of the thresholds currently in effect.
    pub fn table(&self) -> VerbosityTable {
        self.table
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Filter sharing this router's live thresholds.
    pub fn filter(&self) -> VerbosityFilter {
        VerbosityFilter::new(self.table.clone())
    }

    pub fn layer<S, W>(&self, make_writer: W, ansi: bool) -> RouterLayer<S, W>
    where
        S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
        W: for<'w> MakeWriter<'w> + 'static,
    {
        tracing_subscriber::fmt::layer()
            .with_writer(make_writer)
            .with_ansi(ansi)
            .event_format(RouterFormat::new(self.started))
            .with_filter(self.filter())
    }

    /// Registry with this router's layer as its only output.
    pub fn subscriber<W>(&self, make_writer: W, ansi: bool) -> Layered<RouterLayer<Registry, W>, Registry>
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        tracing_subscriber::registry().with(self.layer(make_writer, ansi))
    }

    /// Emit `message` as coming from `subsystem` if `level` passes its threshold.
    ///
    /// The message is dispatched as a `log` record through the current tracing
    /// subscriber, so it is formatted exactly like every other line.
    pub fn route(
        &self,
        subsystem: &str,
        level: Severity,
        message: &str,
        location: SourceLocation<'_>,
    ) {
        if !self.should_emit(subsystem, level) {
            return;
        }

        // format_trace always returns Ok.
        let _ = tracing_log::format_trace(
            &log::Record::builder()
                .target(subsystem)
                .level(native_level(level))
                .file(Some(location.file))
                .line(location.line)
                .args(format_args!("{}", message))
                .build(),
        );
    }

    /// Route a warning raised by the router's own configuration.
    #[track_caller]
    pub fn warn_self(&self, message: &str) {
        self.route("log", Severity::Warn, message, SourceLocation::here());
    }
}
