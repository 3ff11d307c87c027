//! Profile-scoped storage roots.
//!
//! Each of the three roots is `<platform root>/<app name>[/<profile>]`, created
//! with owner and group access only. Creation is idempotent and tolerates a
//! concurrent instance creating the same directories.

use crate::models::Profile;
use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use std::fmt;
use std::fs::DirBuilder;
use std::io;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Permission bits requested for every created directory (before umask).
pub const DIRECTORY_MODE: u32 = 0o770;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryKind {
    Cache,
    Config,
    Data,
}

impl fmt::Display for DirectoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DirectoryKind::Cache => "cache",
            DirectoryKind::Config => "config",
            DirectoryKind::Data => "data",
        })
    }
}

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("cannot determine the platform directories (no home directory)")]
    NoHome,

    #[error("platform directory {0:?} is not valid UTF-8")]
    NonUtf8(PathBuf),

    #[error("failed to create {kind} directory {path}: {source}")]
    Create {
        kind: DirectoryKind,
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Platform-standard roots the profile directories live under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryRoots {
    pub cache: Utf8PathBuf,
    pub config: Utf8PathBuf,
    pub data: Utf8PathBuf,
    /// Per-session runtime directory, when the platform has one.
    pub runtime: Option<Utf8PathBuf>,
}

fn utf8(path: &Path) -> Result<Utf8PathBuf, DirectoryError> {
    Utf8PathBuf::try_from(path.to_path_buf())
        .map_err(|e| DirectoryError::NonUtf8(e.into_path_buf()))
}

impl DirectoryRoots {
    /// Roots reported by the platform (XDG base directories on Linux).
    pub fn from_platform() -> Result<Self, DirectoryError> {
        let base = BaseDirs::new().ok_or(DirectoryError::NoHome)?;
        Ok(Self {
            cache: utf8(base.cache_dir())?,
            config: utf8(base.config_dir())?,
            data: utf8(base.data_dir())?,
            runtime: base.runtime_dir().map(utf8).transpose()?,
        })
    }

    /// All roots below a single base directory.
    pub fn under(base: &Utf8Path) -> Self {
        Self {
            cache: base.join("cache"),
            config: base.join("config"),
            data: base.join("data"),
            runtime: Some(base.join("run")),
        }
    }

    /// Where instance sockets go: the runtime root, else the cache root.
    pub fn runtime_or_cache(&self) -> &Utf8Path {
        self.runtime.as_deref().unwrap_or(&self.cache)
    }
}

/// The three profile-scoped storage directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectorySet {
    pub cache: Utf8PathBuf,
    pub config: Utf8PathBuf,
    pub data: Utf8PathBuf,
}

impl DirectorySet {
    pub fn iter(&self) -> impl Iterator<Item = (DirectoryKind, &Utf8Path)> {
        [
            (DirectoryKind::Cache, self.cache.as_path()),
            (DirectoryKind::Config, self.config.as_path()),
            (DirectoryKind::Data, self.data.as_path()),
        ]
        .into_iter()
    }
}

/// Outcome of a provisioning run. Failures are collected, not raised.
#[derive(Debug)]
pub struct ProvisionReport {
    pub dirs: DirectorySet,
    pub failures: Vec<DirectoryError>,
}

impl ProvisionReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    /// Turn the first failure into an error for callers that treat it as fatal.
    pub fn into_result(self) -> Result<DirectorySet, DirectoryError> {
        match self.failures.into_iter().next() {
            Some(failure) => Err(failure),
            None => Ok(self.dirs),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryProvisioner {
    roots: DirectoryRoots,
}

impl DirectoryProvisioner {
    pub fn new(roots: DirectoryRoots) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &DirectoryRoots {
        &self.roots
    }

    /// Compute the profile directories without touching the filesystem.
    pub fn paths(&self, app_name: &str, profile: &Profile) -> DirectorySet {
        let scoped = |root: &Utf8Path| {
            let app_dir = root.join(app_name);
            match profile.segment() {
                Some(segment) => app_dir.join(segment),
                None => app_dir,
            }
        };

        DirectorySet {
            cache: scoped(&self.roots.cache),
            config: scoped(&self.roots.config),
            data: scoped(&self.roots.data),
        }
    }

    /// Create the three profile directories, logging each failure.
    pub fn provision(&self, app_name: &str, profile: &Profile) -> ProvisionReport {
        let dirs = self.paths(app_name, profile);
        let mut failures = Vec::new();

        for (kind, path) in dirs.iter() {
            match create_dir(path) {
                Ok(()) => tracing::debug!("Using {} directory {}", kind, path),
                Err(source) => {
                    let failure = DirectoryError::Create {
                        kind,
                        path: path.to_path_buf(),
                        source,
                    };
                    tracing::warn!("{}", failure);
                    failures.push(failure);
                }
            }
        }

        ProvisionReport { dirs, failures }
    }
}

fn create_dir(path: &Utf8Path) -> io::Result<()> {
    // Recursive creation succeeds when the directory already exists,
    // including when another process created it in the meantime.
    DirBuilder::new()
        .recursive(true)
        .mode(DIRECTORY_MODE)
        .create(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn create_test_provisioner() -> (DirectoryProvisioner, Utf8PathBuf, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let base = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        (
            DirectoryProvisioner::new(DirectoryRoots::under(&base)),
            base,
            temp_dir,
        )
    }

    #[test]
    fn test_paths_with_named_profile() {
        let (provisioner, base, _temp_dir) = create_test_provisioner();
        let dirs = provisioner.paths("kestrel", &Profile::named("work").unwrap());

        assert_eq!(dirs.cache, base.join("cache/kestrel/work"));
        assert_eq!(dirs.config, base.join("config/kestrel/work"));
        assert_eq!(dirs.data, base.join("data/kestrel/work"));
    }

    #[test]
    fn test_default_profile_has_no_segment() {
        let (provisioner, base, _temp_dir) = create_test_provisioner();
        let dirs = provisioner.paths("kestrel", &Profile::default());
        assert_eq!(dirs.data, base.join("data/kestrel"));
    }

    #[test]
    fn test_provision_creates_private_directories() {
        let (provisioner, _base, _temp_dir) = create_test_provisioner();
        let report = provisioner.provision("kestrel", &Profile::default());

        assert!(report.is_complete());
        for (_, path) in report.dirs.iter() {
            let mode = std::fs::metadata(path).unwrap().permissions().mode();
            assert!(path.is_dir());
            assert_eq!(mode & 0o007, 0, "{path} is world accessible");
        }
    }

    #[test]
    fn test_provision_reports_failure_without_stopping() {
        let (provisioner, base, _temp_dir) = create_test_provisioner();
        // A file where the cache root should be blocks that directory only.
        std::fs::write(base.join("cache"), b"").unwrap();

        let report = provisioner.provision("kestrel", &Profile::default());

        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0],
            DirectoryError::Create {
                kind: DirectoryKind::Cache,
                ..
            }
        ));
        assert!(report.dirs.config.is_dir());
        assert!(report.dirs.data.is_dir());
        assert!(report.into_result().is_err());
    }

    #[test]
    fn test_runtime_or_cache() {
        let mut roots = DirectoryRoots::under(Utf8Path::new("/base"));
        assert_eq!(roots.runtime_or_cache(), Utf8Path::new("/base/run"));
        roots.runtime = None;
        assert_eq!(roots.runtime_or_cache(), Utf8Path::new("/base/cache"));
    }
}
