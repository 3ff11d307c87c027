use super::{LogRouter, Severity, subsystem_of};
use std::sync::Arc;

/// Re-classify a native `log` level onto the local severity scale.
///
/// The match is exhaustive: a new variant in `log::Level` fails the build
/// rather than slipping through unclassified.
pub fn severity_of(level: log::Level) -> Severity {
    match level {
        log::Level::Error => Severity::Fatal,
        log::Level::Warn => Severity::Warn,
        log::Level::Info => Severity::Info,
        log::Level::Debug => Severity::Verbose,
        log::Level::Trace => Severity::Debug,
    }
}

/// Inverse of [`severity_of`], used to dispatch routed messages as records.
pub fn native_level(severity: Severity) -> log::Level {
    match severity {
        Severity::Fatal => log::Level::Error,
        Severity::Warn => log::Level::Warn,
        Severity::Info => log::Level::Info,
        Severity::Verbose => log::Level::Debug,
        Severity::Debug => log::Level::Trace,
    }
}

/// `log::Log` implementation feeding third-party records into tracing.
///
/// Records below the router's threshold for their subsystem are dropped here;
/// the rest are re-emitted as tracing events and formatted by the router's
/// layer.
pub struct NativeLogBridge {
    router: Arc<LogRouter>,
}

impl NativeLogBridge {
    pub fn new(router: Arc<LogRouter>) -> Self {
        Self { router }
    }
}

impl log::Log for NativeLogBridge {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.router
            .should_emit(subsystem_of(metadata.target()), severity_of(metadata.level()))
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            let _ = tracing_log::format_trace(record);
        }
    }

    fn flush(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Log;
    use std::io::{self, Write};
    use std::sync::Mutex;
    use std::time::Instant;
    use tracing_log::AsTrace;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_native_levels_map_totally() {
        assert_eq!(severity_of(log::Level::Error), Severity::Fatal);
        assert_eq!(severity_of(log::Level::Warn), Severity::Warn);
        assert_eq!(severity_of(log::Level::Info), Severity::Info);
        assert_eq!(severity_of(log::Level::Debug), Severity::Verbose);
        assert_eq!(severity_of(log::Level::Trace), Severity::Debug);
    }

    #[test]
    fn test_reemitted_level_keeps_its_severity() {
        for level in log::Level::iter() {
            assert_eq!(Severity::from_tracing(&level.as_trace()), severity_of(level));
            assert_eq!(native_level(severity_of(level)), level);
        }
    }

    #[test]
    fn test_bridge_routes_record_under_target_subsystem() {
        let captured = Captured::default();
        let writer = captured.clone();
        let router = Arc::new(LogRouter::new(Instant::now()));
        let _guard =
            tracing::subscriber::set_default(router.subscriber(move || writer.clone(), false));
        router.set_verbosity("hyper", Severity::Warn);
        let bridge = NativeLogBridge::new(router);

        bridge.log(
            &log::Record::builder()
                .target("hyper::proto")
                .level(log::Level::Info)
                .args(format_args!("suppressed"))
                .build(),
        );
        bridge.log(
            &log::Record::builder()
                .target("hyper::proto")
                .level(log::Level::Warn)
                .file(Some("proto.rs"))
                .line(Some(7))
                .args(format_args!("connection reset"))
                .build(),
        );

        let text = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(!text.contains("suppressed"));
        assert!(text.ends_with("W hyper proto.rs:7: connection reset\n"), "{text}");
    }
}
