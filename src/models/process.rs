use crate::logging::VerbosityTable;
use camino::{Utf8Path, Utf8PathBuf};
use regex::Regex;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Display name of the unnamed profile.
pub const DEFAULT_PROFILE_NAME: &str = "default";

static APPLICATION_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_-][A-Za-z0-9_-]*(\.[A-Za-z_-][A-Za-z0-9_-]*)+$")
        .expect("application id pattern is valid")
});

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid application name '{0}'")]
pub struct InvalidIdentity(pub String);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid profile name '{0}'")]
pub struct InvalidProfile(pub String);

/// Check an application id: two or more dot-separated elements of
/// `[A-Za-z0-9_-]`, none starting with a digit, at most 255 bytes.
pub fn validate_application_id(id: &str) -> Result<(), InvalidIdentity> {
    if id.len() <= 255 && APPLICATION_ID.is_match(id) {
        Ok(())
    } else {
        Err(InvalidIdentity(id.to_string()))
    }
}

/// Named namespace partitioning on-disk state and instance ownership.
///
/// The default profile has no name and adds no path segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Profile(Option<String>);

impl Profile {
    pub fn named(name: &str) -> Result<Self, InvalidProfile> {
        let is_component = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\0']);
        if is_component {
            Ok(Self(Some(name.to_string())))
        } else {
            Err(InvalidProfile(name.to_string()))
        }
    }

    pub fn name(&self) -> &str {
        self.0.as_deref().unwrap_or(DEFAULT_PROFILE_NAME)
    }

    /// Path segment appended under the application directory, if any.
    pub fn segment(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_default(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Whether the activation broker enforces a single resident process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniquenessMode {
    Unique,
    NonUnique,
}

/// Application id plus uniqueness mode, scoped to a profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceIdentity {
    app_id: String,
    profile: Profile,
    mode: UniquenessMode,
}

impl InstanceIdentity {
    pub fn new(
        app_id: &str,
        profile: Profile,
        mode: UniquenessMode,
    ) -> Result<Self, InvalidIdentity> {
        validate_application_id(app_id)?;
        Ok(Self {
            app_id: app_id.to_string(),
            profile,
            mode,
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn mode(&self) -> UniquenessMode {
        self.mode
    }

    pub fn is_unique(&self) -> bool {
        self.mode == UniquenessMode::Unique
    }

    /// File stem naming this identity's instance socket and lock.
    ///
    /// Application ids cannot contain `@`, so the default profile (`<id>`)
    /// never shares a stem with a named one (`<id>@<name>`), including a
    /// profile literally named `default`.
    pub fn instance_key(&self) -> String {
        match self.profile.segment() {
            Some(name) => format!("{}@{}", self.app_id, name),
            None => self.app_id.clone(),
        }
    }
}

/// Everything option dispatch resolved for a normal launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchOptions {
    pub config_path: Utf8PathBuf,
    pub profile: Profile,
    pub log: VerbosityTable,
    pub daemonize: bool,
    pub allow_multiple: bool,
    pub targets: Vec<String>,
}

/// Process-wide configuration, immutable once built.
///
/// Built once after option dispatch, daemonization and argument scrubbing,
/// then passed by reference to every later component.
#[derive(Debug, Clone)]
pub struct ProcessConfig {
    identity: InstanceIdentity,
    config_path: Utf8PathBuf,
    log: VerbosityTable,
    daemonize: bool,
    targets: Vec<String>,
    argv: Vec<OsString>,
    exec_path: Option<PathBuf>,
    started: Instant,
}

impl ProcessConfig {
    pub fn new(
        app_id: &str,
        launch: LaunchOptions,
        argv: Vec<OsString>,
        started: Instant,
    ) -> Result<Self, InvalidIdentity> {
        let mode = if launch.allow_multiple {
            UniquenessMode::NonUnique
        } else {
            UniquenessMode::Unique
        };
        let identity = InstanceIdentity::new(app_id, launch.profile, mode)?;
        let exec_path = argv.first().map(PathBuf::from);

        Ok(Self {
            identity,
            config_path: launch.config_path,
            log: launch.log,
            daemonize: launch.daemonize,
            targets: launch.targets,
            argv,
            exec_path,
            started,
        })
    }

    pub fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    pub fn app_id(&self) -> &str {
        self.identity.app_id()
    }

    pub fn profile(&self) -> &Profile {
        self.identity.profile()
    }

    pub fn config_path(&self) -> &Utf8Path {
        &self.config_path
    }

    pub fn log(&self) -> &VerbosityTable {
        &self.log
    }

    pub fn daemonize(&self) -> bool {
        self.daemonize
    }

    /// Single-instance enforcement was switched off on the command line.
    pub fn allow_multiple(&self) -> bool {
        !self.identity.is_unique()
    }

    /// Positional URIs or files given on the command line.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// Durable copy of the original argument vector.
    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    pub fn exec_path(&self) -> Option<&PathBuf> {
        self.exec_path.as_ref()
    }

    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch() -> LaunchOptions {
        LaunchOptions {
            config_path: Utf8PathBuf::from("/etc/xdg/kestrel/rc.toml"),
            profile: Profile::default(),
            log: VerbosityTable::default(),
            daemonize: false,
            allow_multiple: false,
            targets: vec!["https://example.org".to_string()],
        }
    }

    #[test]
    fn test_application_id_rules() {
        assert!(validate_application_id("org.kestrel.Browser").is_ok());
        assert!(validate_application_id("a-b.c_d").is_ok());
        assert!(validate_application_id("kestrel").is_err());
        assert!(validate_application_id("org..kestrel").is_err());
        assert!(validate_application_id("org.1kestrel").is_err());
        assert!(validate_application_id(".org.kestrel").is_err());
        assert!(validate_application_id("org.kestrel.").is_err());
        assert!(validate_application_id("org.kes trel").is_err());

        let long = format!("org.{}", "k".repeat(252));
        assert!(validate_application_id(&long).is_err());
    }

    #[test]
    fn test_profile_names() {
        assert_eq!(Profile::default().name(), "default");
        assert_eq!(Profile::default().segment(), None);
        assert_eq!(Profile::named("work").unwrap().segment(), Some("work"));

        for bad in ["", ".", "..", "a/b", "nul\0"] {
            assert_eq!(Profile::named(bad), Err(InvalidProfile(bad.to_string())));
        }
    }

    #[test]
    fn test_instance_key_separates_default_profile() {
        let key = |profile| {
            InstanceIdentity::new("org.kestrel.Browser", profile, UniquenessMode::Unique)
                .unwrap()
                .instance_key()
        };

        assert_eq!(key(Profile::default()), "org.kestrel.Browser");
        assert_eq!(
            key(Profile::named("default").unwrap()),
            "org.kestrel.Browser@default"
        );
    }

    #[test]
    fn test_process_config_from_launch() {
        let argv = vec![OsString::from("/usr/bin/kestrel"), OsString::from("-n")];
        let config =
            ProcessConfig::new("org.kestrel.Browser", launch(), argv.clone(), Instant::now())
                .unwrap();

        assert_eq!(config.app_id(), "org.kestrel.Browser");
        assert!(config.identity().is_unique());
        assert!(!config.allow_multiple());
        assert_eq!(config.argv(), argv.as_slice());
        assert_eq!(config.exec_path(), Some(&PathBuf::from("/usr/bin/kestrel")));
        assert_eq!(config.targets(), ["https://example.org"]);
    }

    #[test]
    fn test_allow_multiple_selects_non_unique() {
        let mut options = launch();
        options.allow_multiple = true;
        let config =
            ProcessConfig::new("org.kestrel.Browser", options, Vec::new(), Instant::now())
                .unwrap();

        assert_eq!(config.identity().mode(), UniquenessMode::NonUnique);
        assert_eq!(config.exec_path(), None);
    }
}
