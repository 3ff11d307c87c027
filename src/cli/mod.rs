//! Command-line option parsing and dispatch.
//!
//! Dispatch turns the raw argument vector into one of three outcomes: exit
//! right away (version, help, `--check`), continue to a full launch with
//! resolved [`LaunchOptions`], or fail with [`OptionError::InvalidOption`].
//! `--version` is checked before `--check`; the first short-circuit wins.

use crate::config::{self, CONFIG_FILE_NAME};
use crate::error::StartupError;
use crate::logging::{LogRouter, Severity, VerbosityTable};
use crate::models::{LaunchOptions, Profile};
use crate::services::directories::{DirectoryError, DirectoryProvisioner, DirectoryRoots};
use crate::services::host::Host;
use crate::services::startup;
use crate::{APP_ID, APP_NAME, VERSION};
use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use clap::error::{ContextKind, ContextValue, ErrorKind};
use std::cell::OnceCell;
use std::ffi::OsString;
use thiserror::Error;

/// Printed to stderr when `--check` parses the script.
pub const CHECK_OK: &str = "Configuration file syntax OK.";

/// Printed to stderr when `--check` rejects the script.
pub const CHECK_FAILED: &str = "Configuration file syntax error.";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionError {
    #[error("invalid option '{token}': {detail}")]
    InvalidOption { token: String, detail: String },
}

#[derive(Parser, Debug, Default, PartialEq, Eq)]
#[command(
    name = "kestrel",
    about = "A fast, small, scriptable web browser",
    disable_version_flag = true
)]
pub struct Cli {
    /// Print version and exit
    #[arg(short = 'V', long)]
    pub version: bool,

    /// Check config and exit
    #[arg(short = 'k', long)]
    pub check: bool,

    /// Print verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Specify precise log level (e.g. all=warn,net=debug)
    #[arg(short, long, value_name = "NAME")]
    pub log: Option<String>,

    /// Configuration file to use
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Profile name to use
    #[arg(short, long, value_name = "NAME")]
    pub profile: Option<String>,

    /// Run in background
    #[arg(short, long)]
    pub nonblock: bool,

    /// Ignore running instances
    #[arg(short = 'U', long)]
    pub nonunique: bool,

    /// URIs or files to open
    #[arg(value_name = "URI")]
    pub uris: Vec<String>,
}

impl Cli {
    /// Parse `raw` (including the program name), mapping clap failures.
    ///
    /// `Ok(Err(text))` carries help output for an informational exit.
    pub fn parse_raw(raw: &[OsString]) -> Result<Result<Self, String>, OptionError> {
        match Cli::try_parse_from(raw) {
            Ok(cli) => Ok(Ok(cli)),
            Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp) => Ok(Err(e.render().to_string())),
            Err(e) => Err(invalid_option(&e, raw)),
        }
    }
}

/// clap names the offending token in its error context, except for
/// arguments that are not valid UTF-8; those are found in `raw` instead.
fn invalid_option(e: &clap::Error, raw: &[OsString]) -> OptionError {
    let context = |kind| match e.get(kind) {
        Some(ContextValue::String(value)) => Some(value.clone()),
        Some(ContextValue::Strings(values)) => values.first().cloned(),
        _ => None,
    };

    let token = context(ContextKind::InvalidArg)
        .or_else(|| context(ContextKind::InvalidValue))
        .or_else(|| {
            raw.iter()
                .skip(1)
                .find(|arg| arg.to_str().is_none())
                .map(|arg| arg.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "?".to_string());
    let detail = e.kind().as_str().unwrap_or("invalid option").to_string();

    OptionError::InvalidOption { token, detail }
}

/// Something to print before an informational exit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Report {
    None,
    Stdout(String),
    Stderr(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// Print `report` and exit with `code`; no further startup.
    Exit { code: i32, report: Report },
    /// Proceed to daemonization, argument scrubbing and registration.
    Continue(LaunchOptions),
}

/// Resolve `--log` and `--verbose` into one table, warning through `router`.
///
/// An explicit specification wins over `--verbose`, which is then ignored
/// with exactly one warning.
pub fn resolve_verbosity(log: Option<&str>, verbose: bool, router: &LogRouter) -> VerbosityTable {
    let Some(spec) = log else {
        return VerbosityTable::uniform(if verbose {
            Severity::Verbose
        } else {
            Severity::Info
        });
    };

    let mut table = VerbosityTable::default();
    for part in table.apply_spec(spec) {
        router.warn_self(&format!("ignoring unrecognized --log option '{}'", part));
    }
    if verbose {
        router.warn_self("invalid mix of -v and -l, ignoring -v");
    }
    table
}

/// Option dispatch against a set of storage roots.
///
/// Roots are resolved on first use, so `--version` and `--help` work even
/// when the platform cannot name a home directory.
pub struct Dispatcher<'a> {
    router: &'a LogRouter,
    provisioner: OnceCell<DirectoryProvisioner>,
    resolve_roots: fn() -> Result<DirectoryRoots, DirectoryError>,
    system_config_dirs: Vec<Utf8PathBuf>,
}

impl<'a> Dispatcher<'a> {
    /// Dispatcher over roots that are already known.
    pub fn new(router: &'a LogRouter, roots: DirectoryRoots) -> Self {
        let dispatcher = Self::with_roots_from(router, DirectoryRoots::from_platform);
        let _ = dispatcher.provisioner.set(DirectoryProvisioner::new(roots));
        dispatcher
    }

    /// Dispatcher resolving the platform roots when first needed.
    pub fn from_platform(router: &'a LogRouter) -> Self {
        Self::with_roots_from(router, DirectoryRoots::from_platform)
    }

    pub fn with_roots_from(
        router: &'a LogRouter,
        resolve_roots: fn() -> Result<DirectoryRoots, DirectoryError>,
    ) -> Self {
        Self {
            router,
            provisioner: OnceCell::new(),
            resolve_roots,
            system_config_dirs: config::system_config_dirs(),
        }
    }

    pub fn provisioner(&self) -> Result<&DirectoryProvisioner, DirectoryError> {
        if let Some(provisioner) = self.provisioner.get() {
            return Ok(provisioner);
        }
        let provisioner = DirectoryProvisioner::new((self.resolve_roots)()?);
        Ok(self.provisioner.get_or_init(|| provisioner))
    }

    /// Hand the provisioner to the rest of startup.
    pub fn into_provisioner(self) -> Result<DirectoryProvisioner, DirectoryError> {
        match self.provisioner.into_inner() {
            Some(provisioner) => Ok(provisioner),
            None => Ok(DirectoryProvisioner::new((self.resolve_roots)()?)),
        }
    }

    /// Replace the `$XDG_CONFIG_DIRS` search list.
    pub fn with_system_config_dirs(mut self, dirs: Vec<Utf8PathBuf>) -> Self {
        self.system_config_dirs = dirs;
        self
    }

    /// Configuration script used when `--config` is absent.
    pub fn default_config_path(&self) -> Result<Utf8PathBuf, DirectoryError> {
        let user_root = self.provisioner()?.roots().config.as_path();
        let candidates = config::candidate_paths(APP_NAME, user_root, &self.system_config_dirs);
        Ok(config::resolve_config_path(None, &candidates)
            .unwrap_or_else(|| user_root.join(APP_NAME).join(CONFIG_FILE_NAME)))
    }

    pub fn dispatch<H: Host + ?Sized>(
        &self,
        raw: &[OsString],
        host: &mut H,
    ) -> Result<Dispatch, StartupError> {
        let cli = match Cli::parse_raw(raw)? {
            Ok(cli) => cli,
            Err(help) => {
                return Ok(Dispatch::Exit {
                    code: 0,
                    report: Report::Stdout(help),
                });
            }
        };

        if cli.version {
            return Ok(Dispatch::Exit {
                code: 0,
                report: Report::Stdout(format!("{} {} ({})\n", APP_NAME, VERSION, APP_ID)),
            });
        }

        let log = resolve_verbosity(cli.log.as_deref(), cli.verbose, self.router);
        self.router.apply(&log);
        tracing::debug!("Log verbosity: {}", log);

        let profile = match cli.profile.as_deref() {
            Some(name) => Profile::named(name).map_err(|e| OptionError::InvalidOption {
                token: name.to_string(),
                detail: e.to_string(),
            })?,
            None => Profile::default(),
        };

        let config_path = match cli.config {
            Some(path) => path,
            None => self.default_config_path()?,
        };

        if cli.check {
            return self.check(&profile, &config_path, host);
        }

        Ok(Dispatch::Continue(LaunchOptions {
            config_path,
            profile,
            log,
            daemonize: cli.nonblock,
            allow_multiple: cli.nonunique,
            targets: cli.uris,
        }))
    }

    fn check<H: Host + ?Sized>(
        &self,
        profile: &Profile,
        config_path: &Utf8Path,
        host: &mut H,
    ) -> Result<Dispatch, StartupError> {
        tracing::debug!("Checking configuration {}", config_path);
        let ok = startup::check_config(APP_NAME, profile, config_path, self.provisioner()?, host);
        let (code, message) = if ok { (0, CHECK_OK) } else { (1, CHECK_FAILED) };
        Ok(Dispatch::Exit {
            code,
            report: Report::Stderr(format!("{}\n", message)),
        })
    }
}
