//! Hierarchical log verbosity and routing.
//!
//! Every message in the process, whether it comes from our own `tracing`
//! macros or from a third-party library logging through the `log` crate, is
//! written by one `tracing_subscriber::fmt` layer. That layer is filtered by
//! the [`LogRouter`]'s [`VerbosityTable`], which maps subsystem names to a
//! minimum [`Severity`]; the wildcard subsystem `all` covers everything that
//! has no entry of its own.
//!
//! The router is usable before option parsing has finished: it starts with
//! `all=info` so that problems with the `--log` option itself can be reported.

mod format;
mod native;
mod router;

pub use format::{RouterFormat, VerbosityFilter};
pub use native::{NativeLogBridge, native_level, severity_of};
pub use router::{LogRouter, RouterLayer, SourceLocation};

use indexmap::IndexMap;
use std::fmt;
use std::io::{self, IsTerminal};
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Wildcard subsystem consulted when a subsystem has no threshold of its own.
pub const ALL_SUBSYSTEMS: &str = "all";

/// Ordered message severity: `debug < verbose < info < warn < fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Debug,
    Verbose,
    Info,
    Warn,
    Fatal,
}

impl Severity {
    /// All severities in ascending order.
    pub const ALL: [Severity; 5] = [
        Severity::Debug,
        Severity::Verbose,
        Severity::Info,
        Severity::Warn,
        Severity::Fatal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Debug => "debug",
            Severity::Verbose => "verbose",
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Fatal => "fatal",
        }
    }

    /// Single-letter tag used in formatted log lines.
    pub fn letter(self) -> char {
        match self {
            Severity::Debug => 'D',
            Severity::Verbose => 'V',
            Severity::Info => 'I',
            Severity::Warn => 'W',
            Severity::Fatal => 'F',
        }
    }

    /// Map a `tracing` level onto the local scale.
    pub fn from_tracing(level: &tracing::Level) -> Self {
        if *level == tracing::Level::ERROR {
            Severity::Fatal
        } else if *level == tracing::Level::WARN {
            Severity::Warn
        } else if *level == tracing::Level::INFO {
            Severity::Info
        } else if *level == tracing::Level::DEBUG {
            Severity::Verbose
        } else {
            Severity::Debug
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A level name that is not one of `debug verbose info warn fatal`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown log level '{0}'")]
pub struct UnknownSeverity(pub String);

impl FromStr for Severity {
    type Err = UnknownSeverity;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|level| level.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| UnknownSeverity(s.to_string()))
    }
}

/// Per-subsystem severity thresholds.
///
/// A message from subsystem `S` at severity `L` is emitted iff `L` is at or
/// above the threshold registered for `S`, falling back to the `all` entry
/// when `S` has none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbosityTable {
    thresholds: IndexMap<String, Severity>,
}

impl Default for VerbosityTable {
    fn default() -> Self {
        Self::uniform(Severity::Info)
    }
}

impl VerbosityTable {
    /// A table whose only entry is `all=<level>`.
    pub fn uniform(level: Severity) -> Self {
        let mut thresholds = IndexMap::new();
        thresholds.insert(ALL_SUBSYSTEMS.to_string(), level);
        Self { thresholds }
    }

    /// Register or overwrite the threshold for `subsystem`.
    pub fn set(&mut self, subsystem: impl Into<String>, level: Severity) {
        self.thresholds.insert(subsystem.into(), level);
    }

    /// Effective threshold for `subsystem`.
    pub fn threshold(&self, subsystem: &str) -> Severity {
        self.thresholds
            .get(subsystem)
            .or_else(|| self.thresholds.get(ALL_SUBSYSTEMS))
            .copied()
            .unwrap_or(Severity::Info)
    }

    pub fn should_emit(&self, subsystem: &str, level: Severity) -> bool {
        level >= self.threshold(subsystem)
    }

    /// Explicitly registered entries, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Severity)> {
        self.thresholds.iter().map(|(name, level)| (name.as_str(), *level))
    }

    /// Apply a `name=level[,name=level...]` specification.
    ///
    /// A bare level applies to `all`. Parts that are neither are left out of
    /// the table and returned so the caller can warn about them.
    pub fn apply_spec(&mut self, spec: &str) -> Vec<String> {
        let mut rejected = Vec::new();

        for part in spec.split(',').filter(|part| !part.is_empty()) {
            if let Ok(level) = part.parse::<Severity>() {
                self.set(ALL_SUBSYSTEMS, level);
                continue;
            }

            match part.split_once('=') {
                Some((name, level)) if !name.is_empty() => match level.parse::<Severity>() {
                    Ok(level) => self.set(name, level),
                    Err(_) => rejected.push(part.to_string()),
                },
                _ => rejected.push(part.to_string()),
            }
        }

        rejected
    }
}

impl fmt::Display for VerbosityTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, level) in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, level)?;
            first = false;
        }
        Ok(())
    }
}

/// Subsystem name for a `tracing` target or `log` target.
///
/// Our own module paths lose the crate prefix (and the `services` grouping),
/// foreign targets keep their first path segment.
pub fn subsystem_of(target: &str) -> &str {
    let rest = match target.strip_prefix(env!("CARGO_CRATE_NAME")) {
        Some("") => return "main",
        Some(rest) => match rest.strip_prefix("::") {
            Some(rest) => rest.strip_prefix("services::").unwrap_or(rest),
            None => target,
        },
        None => target,
    };
    rest.split("::").next().unwrap_or(rest)
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("a global tracing subscriber is already installed")]
    SubscriberInstalled,

    #[error("a global log bridge is already installed")]
    BridgeInstalled,
}

/// Install the router's subscriber for the whole process, writing to stderr
/// (colourised when stderr is a terminal), and bridge `log` records into it.
///
/// Must be called at most once per process.
pub fn install(router: Arc<LogRouter>) -> Result<(), LoggingError> {
    let subscriber = router.subscriber(io::stderr, io::stderr().is_terminal());
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|_| LoggingError::SubscriberInstalled)?;

    log::set_boxed_logger(Box::new(NativeLogBridge::new(router)))
        .map_err(|_| LoggingError::BridgeInstalled)?;
    log::set_max_level(log::LevelFilter::Trace);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn severity() -> impl Strategy<Value = Severity> {
        prop::sample::select(Severity::ALL.to_vec())
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Debug < Severity::Verbose);
        assert!(Severity::Verbose < Severity::Info);
        assert!(Severity::Info < Severity::Warn);
        assert!(Severity::Warn < Severity::Fatal);
    }

    #[test]
    fn test_severity_parse() {
        assert_eq!("verbose".parse::<Severity>(), Ok(Severity::Verbose));
        assert_eq!("WARN".parse::<Severity>(), Ok(Severity::Warn));
        assert!("warning".parse::<Severity>().is_err());
    }

    #[test]
    fn test_default_table_is_info() {
        let table = VerbosityTable::default();
        assert_eq!(table.threshold("anything"), Severity::Info);
        assert!(!table.should_emit("ui", Severity::Verbose));
        assert!(table.should_emit("ui", Severity::Info));
    }

    #[test]
    fn test_apply_spec_mixed() {
        let mut table = VerbosityTable::default();
        let rejected = table.apply_spec("all=debug,net=warn");

        assert!(rejected.is_empty());
        assert_eq!(table.threshold("all"), Severity::Debug);
        assert_eq!(table.threshold("net"), Severity::Warn);
        assert!(!table.should_emit("net", Severity::Info));
        assert!(table.should_emit("ui", Severity::Verbose));
    }

    #[test]
    fn test_apply_spec_bare_level() {
        let mut table = VerbosityTable::default();
        assert!(table.apply_spec("fatal").is_empty());
        assert_eq!(table.threshold("all"), Severity::Fatal);
    }

    #[test]
    fn test_apply_spec_rejects_unknown_parts() {
        let mut table = VerbosityTable::default();
        let rejected = table.apply_spec("loud,net=shouting,=info,ui=debug");

        assert_eq!(rejected, vec!["loud", "net=shouting", "=info"]);
        assert_eq!(table.threshold("ui"), Severity::Debug);
        assert_eq!(table.threshold("net"), Severity::Info);
    }

    #[test]
    fn test_table_display() {
        let mut table = VerbosityTable::default();
        table.apply_spec("net=warn");
        assert_eq!(table.to_string(), "all=info,net=warn");
    }

    #[test]
    fn test_subsystem_of() {
        assert_eq!(subsystem_of("kestrel"), "main");
        assert_eq!(subsystem_of("kestrel::cli"), "cli");
        assert_eq!(subsystem_of("kestrel::services::instance"), "instance");
        assert_eq!(subsystem_of("kestrel_other::x"), "kestrel_other");
        assert_eq!(subsystem_of("tokio::net::unix"), "tokio");
    }

    proptest! {
        #[test]
        fn prop_should_emit_matches_threshold(
            all in severity(),
            registered in severity(),
            level in severity(),
            name in "[a-z]{1,8}",
        ) {
            prop_assume!(name != ALL_SUBSYSTEMS);
            let mut table = VerbosityTable::uniform(all);
            table.set("net", registered);

            let expected = if name == "net" { level >= registered } else { level >= all };
            prop_assert_eq!(table.should_emit(&name, level), expected);
        }
    }
}
