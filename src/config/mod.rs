use crate::models::UserSettings;
use camino::{Utf8Path, Utf8PathBuf};
use config::{Config, File, FileFormat};
use std::fs;
use std::io;
use thiserror::Error;

/// File name of the user configuration script.
pub const CONFIG_FILE_NAME: &str = "rc.toml";

/// Fallback when `$XDG_CONFIG_DIRS` is unset or empty.
const DEFAULT_SYSTEM_CONFIG_DIR: &str = "/etc/xdg";

/// Errors raised while locating, parsing or validating the configuration script.
#[derive(Error, Debug)]
pub enum ConfigScriptError {
    #[error("configuration file not found: {0}")]
    NotFound(Utf8PathBuf),

    #[error("failed to read configuration file {path}: {source}")]
    Unreadable {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("syntax error in {path}: {source}")]
    Syntax {
        path: Utf8PathBuf,
        #[source]
        source: config::ConfigError,
    },

    #[error("invalid configuration in {path}: {reason}")]
    Invalid { path: Utf8PathBuf, reason: String },
}

impl ConfigScriptError {
    pub fn is_syntax(&self) -> bool {
        matches!(self, ConfigScriptError::Syntax { .. })
    }
}

/// System-wide configuration directories from `$XDG_CONFIG_DIRS`.
pub fn system_config_dirs() -> Vec<Utf8PathBuf> {
    let dirs: Vec<Utf8PathBuf> = std::env::var("XDG_CONFIG_DIRS")
        .unwrap_or_default()
        .split(':')
        .filter(|dir| !dir.is_empty())
        .map(Utf8PathBuf::from)
        .collect();

    if dirs.is_empty() {
        vec![Utf8PathBuf::from(DEFAULT_SYSTEM_CONFIG_DIR)]
    } else {
        dirs
    }
}

/// Configuration script locations in search order: the user's own
/// configuration root first, then each system directory.
pub fn candidate_paths(
    app_name: &str,
    user_config_root: &Utf8Path,
    system_dirs: &[Utf8PathBuf],
) -> Vec<Utf8PathBuf> {
    std::iter::once(user_config_root)
        .chain(system_dirs.iter().map(Utf8PathBuf::as_path))
        .map(|dir| dir.join(app_name).join(CONFIG_FILE_NAME))
        .collect()
}

/// Pick the script to run: an explicit path wins, otherwise the first
/// candidate that exists, otherwise the first candidate.
pub fn resolve_config_path(
    explicit: Option<Utf8PathBuf>,
    candidates: &[Utf8PathBuf],
) -> Option<Utf8PathBuf> {
    if explicit.is_some() {
        return explicit;
    }

    candidates
        .iter()
        .find(|path| path.is_file())
        .or_else(|| candidates.first())
        .cloned()
}

fn format_for(path: &Utf8Path) -> FileFormat {
    match path.extension().map(str::to_ascii_lowercase).as_deref() {
        Some("yaml") | Some("yml") => FileFormat::Yaml,
        Some("json") => FileFormat::Json,
        _ => FileFormat::Toml,
    }
}

fn read_script(path: &Utf8Path) -> Result<String, ConfigScriptError> {
    fs::read_to_string(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => ConfigScriptError::NotFound(path.to_path_buf()),
        _ => ConfigScriptError::Unreadable {
            path: path.to_path_buf(),
            source,
        },
    })
}

fn parse_script(path: &Utf8Path) -> Result<Config, ConfigScriptError> {
    let contents = read_script(path)?;
    Config::builder()
        .add_source(File::from_str(&contents, format_for(path)))
        .build()
        .map_err(|source| ConfigScriptError::Syntax {
            path: path.to_path_buf(),
            source,
        })
}

/// Syntax-only parse of the configuration script.
pub fn check_syntax(path: &Utf8Path) -> Result<(), ConfigScriptError> {
    parse_script(path)?;
    tracing::debug!("Configuration syntax OK: {}", path);
    Ok(())
}

/// Parse, deserialize and validate the configuration script.
pub fn load_settings(path: &Utf8Path) -> Result<UserSettings, ConfigScriptError> {
    let settings: UserSettings =
        parse_script(path)?
            .try_deserialize()
            .map_err(|e| ConfigScriptError::Invalid {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

    settings
        .validate()
        .map_err(|reason| ConfigScriptError::Invalid {
            path: path.to_path_buf(),
            reason,
        })?;

    tracing::info!("Loaded configuration from {}", path);
    Ok(settings)
}
