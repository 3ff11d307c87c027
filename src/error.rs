//! Startup error taxonomy and the single fatal-abort path.

use crate::cli::OptionError;
use crate::logging::{LogRouter, LoggingError, Severity, SourceLocation};
use crate::models::InvalidIdentity;
use crate::services::daemon::DaemonError;
use crate::services::directories::DirectoryError;
use crate::services::host::HostError;
use crate::services::instance::InstanceError;
use crate::services::startup::Stage;
use camino::Utf8PathBuf;
use thiserror::Error;

/// Coarse classification deciding how an error is reported and the exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad flag or option value.
    User,
    /// Process creation, session, directory or socket failure.
    Resource,
    /// A collaborator could not be initialized; no degraded mode exists.
    Infrastructure,
    /// Configuration script missing, unreadable or rejected.
    ConfigSyntax,
}

#[derive(Error, Debug)]
pub enum StartupError {
    #[error(transparent)]
    Option(#[from] OptionError),

    #[error(transparent)]
    Identity(#[from] InvalidIdentity),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error(transparent)]
    Daemon(#[from] DaemonError),

    #[error(transparent)]
    Directory(#[from] DirectoryError),

    #[error("{stage} initialization failed: {source}")]
    Infrastructure {
        stage: Stage,
        #[source]
        source: HostError,
    },

    #[error("could not locate or execute configuration {0}")]
    ConfigScript(Utf8PathBuf),

    #[error(transparent)]
    Instance(#[from] InstanceError),
}

impl StartupError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StartupError::Option(_) => ErrorKind::User,
            StartupError::Daemon(_) | StartupError::Directory(_) | StartupError::Instance(_) => {
                ErrorKind::Resource
            }
            StartupError::Identity(_)
            | StartupError::Logging(_)
            | StartupError::Infrastructure { .. } => ErrorKind::Infrastructure,
            StartupError::ConfigScript(_) => ErrorKind::ConfigSyntax,
        }
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::ConfigSyntax => 1,
            ErrorKind::User => 2,
            ErrorKind::Resource => 3,
            ErrorKind::Infrastructure => 4,
        }
    }
}

/// Report `error` at fatal severity and terminate the process.
#[track_caller]
pub fn fatal(router: &LogRouter, error: StartupError) -> ! {
    router.route(
        "main",
        Severity::Fatal,
        &error.to_string(),
        SourceLocation::here(),
    );
    std::process::exit(error.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::errno::Errno;

    #[test]
    fn test_exit_codes() {
        let option = StartupError::from(OptionError::InvalidOption {
            token: "--bogus".to_string(),
            detail: "unexpected argument".to_string(),
        });
        assert_eq!(option.kind(), ErrorKind::User);
        assert_eq!(option.exit_code(), 2);

        let fork = StartupError::from(DaemonError::Fork(Errno::EAGAIN));
        assert_eq!(fork.kind(), ErrorKind::Resource);
        assert_eq!(fork.exit_code(), 3);

        let transport = StartupError::Infrastructure {
            stage: Stage::Transport,
            source: HostError("down".to_string()),
        };
        assert_eq!(transport.exit_code(), 4);

        let script = StartupError::ConfigScript(Utf8PathBuf::from("/tmp/rc.toml"));
        assert_eq!(script.kind(), ErrorKind::ConfigSyntax);
        assert_eq!(script.exit_code(), 1);
    }

    #[test]
    fn test_messages_are_preserved() {
        let err = StartupError::from(DaemonError::Session(Errno::EPERM));
        assert!(err.to_string().starts_with("new SID creation failure"));

        let err = StartupError::from(InvalidIdentity("bad".to_string()));
        assert_eq!(err.to_string(), "invalid application name 'bad'");
    }
}
