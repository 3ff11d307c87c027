// Kestrel - startup orchestration for a single-instance browser process
//
// This is the library crate containing option dispatch, logging, instance
// coordination and the startup sequence. The binary crate (main.rs) wires
// them together for one process.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod services;

// Re-export commonly used types for convenience
pub use app::Application;
pub use cli::{Dispatch, Dispatcher, OptionError, Report};
pub use error::{ErrorKind, StartupError, fatal};
pub use logging::{LogRouter, Severity, VerbosityTable};
pub use metrics::Metrics;
pub use models::{LaunchOptions, ProcessConfig, Profile};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name, also the directory name under every storage root
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

/// Identity registered with the instance coordinator
pub const APP_ID: &str = "org.kestrel.Browser";
