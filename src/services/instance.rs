//! Single-instance coordination.
//!
//! Registration decides whether this process becomes the Primary for its
//! application id and profile, or a Secondary that forwards its invocation to
//! the resident Primary and exits. In non-unique mode every process is its own
//! Primary and nothing is shared.
//!
//! [`SocketCoordinator`] implements the broker with a Unix domain socket per
//! identity. The connect-or-bind decision is made while holding an exclusive
//! `flock` on a sibling lock file, so two simultaneous launches can never both
//! become Primary. A Secondary only returns once the Primary has queued its
//! invocation and acknowledged it.

use crate::models::InstanceIdentity;
use camino::{Utf8Path, Utf8PathBuf};
use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::fs::PermissionsExt;
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Forwarded invocations buffered before a Secondary has to wait.
pub const INBOX_CAPACITY: usize = 16;

const ACK: &str = "ok";

/// How long the Primary waits for a connected Secondary to send its invocation.
const RECEIVE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a Secondary waits for the Primary's acknowledgement. The instance
/// lock is held for the whole wait.
pub const ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("instance registration was already attempted")]
    AlreadyRegistered,

    #[error("cannot lock {path}: {source}")]
    Lock {
        path: Utf8PathBuf,
        #[source]
        source: Errno,
    },

    #[error("instance socket {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed invocation: {0}")]
    Protocol(#[from] serde_json::Error),

    #[error("primary instance did not acknowledge the forwarded invocation")]
    NotAcknowledged,
}

fn io_error(path: &Utf8Path) -> impl FnOnce(io::Error) -> InstanceError + '_ {
    move |source| InstanceError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// One launch request: targets to open plus the directory it was made from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    pub targets: Vec<String>,
    #[serde(default)]
    pub cwd: Option<Utf8PathBuf>,
}

impl Invocation {
    pub fn new(targets: Vec<String>, cwd: Option<Utf8PathBuf>) -> Self {
        Self { targets, cwd }
    }

    /// Invocation made from the current working directory.
    pub fn from_current_dir(targets: Vec<String>) -> Self {
        let cwd = std::env::current_dir()
            .ok()
            .and_then(|dir| Utf8PathBuf::try_from(dir).ok());
        Self::new(targets, cwd)
    }

    /// No targets: the instance is simply activated.
    pub fn is_activation(&self) -> bool {
        self.targets.is_empty()
    }

    /// Targets with relative paths that exist under `cwd` made absolute.
    pub fn resolved_targets(&self) -> Vec<String> {
        self.targets
            .iter()
            .map(|target| {
                let path = Utf8Path::new(target);
                match &self.cwd {
                    Some(cwd) if !target.contains("://") && path.is_relative() => {
                        let candidate = cwd.join(path);
                        if candidate.exists() {
                            candidate.into_string()
                        } else {
                            target.clone()
                        }
                    }
                    _ => target.clone(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceRole {
    Unregistered,
    Primary,
    Secondary,
}

/// Result of a registration attempt. There is no way back from either role.
#[derive(Debug)]
pub enum Registration {
    Primary(PrimaryInstance),
    Secondary,
}

impl Registration {
    pub fn role(&self) -> InstanceRole {
        match self {
            Registration::Primary(_) => InstanceRole::Primary,
            Registration::Secondary => InstanceRole::Secondary,
        }
    }
}

/// The identity owned by this process and its inbox of forwarded invocations.
#[derive(Debug)]
pub struct PrimaryInstance {
    inbox: mpsc::Receiver<Invocation>,
    endpoint: Option<Endpoint>,
    // Keeps a standalone inbox open so it never reports end of input.
    _idle: Option<mpsc::Sender<Invocation>>,
}

impl PrimaryInstance {
    /// Primary that receives nothing (non-unique mode).
    pub fn standalone() -> Self {
        let (tx, inbox) = mpsc::channel(1);
        Self {
            inbox,
            endpoint: None,
            _idle: Some(tx),
        }
    }

    /// Primary fed by an in-process sender.
    pub fn channel() -> (mpsc::Sender<Invocation>, Self) {
        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let primary = Self {
            inbox,
            endpoint: None,
            _idle: None,
        };
        (tx, primary)
    }

    pub async fn next_invocation(&mut self) -> Option<Invocation> {
        self.inbox.recv().await
    }

    /// Blocking variant for callers outside the runtime.
    pub fn blocking_next(&mut self) -> Option<Invocation> {
        self.inbox.blocking_recv()
    }

    /// Socket other instances forward to, if coordination is active.
    pub fn socket_path(&self) -> Option<&Utf8Path> {
        self.endpoint.as_ref().map(|endpoint| endpoint.socket.as_path())
    }
}

/// Removes the socket file when the Primary goes away.
#[derive(Debug)]
struct Endpoint {
    socket: Utf8PathBuf,
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.socket) {
            if e.kind() != io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove instance socket {}: {}", self.socket, e);
            }
        }
    }
}

/// Capability deciding Primary or Secondary for an identity.
pub trait InstanceCoordinator {
    fn register(
        &self,
        identity: &InstanceIdentity,
        invocation: &Invocation,
    ) -> Result<Registration, InstanceError>;
}

/// Unix-domain-socket broker rooted in a runtime directory.
#[derive(Debug)]
pub struct SocketCoordinator {
    dir: Utf8PathBuf,
    ack_timeout: Duration,
    attempted: AtomicBool,
}

impl SocketCoordinator {
    pub fn new(dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ack_timeout: ACK_TIMEOUT,
            attempted: AtomicBool::new(false),
        }
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn socket_path(&self, identity: &InstanceIdentity) -> Utf8PathBuf {
        self.dir.join(format!("{}.sock", identity.instance_key()))
    }

    fn lock_path(&self, identity: &InstanceIdentity) -> Utf8PathBuf {
        self.dir.join(format!("{}.lock", identity.instance_key()))
    }

    fn become_primary(&self, socket: Utf8PathBuf) -> Result<PrimaryInstance, InstanceError> {
        let listener = UnixListener::bind(&socket).map_err(io_error(&socket))?;
        fs::set_permissions(&socket, Permissions::from_mode(0o600)).map_err(io_error(&socket))?;
        let endpoint = Endpoint { socket };

        let (tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        thread::Builder::new()
            .name("instance-inbox".to_string())
            .spawn(move || serve(listener, tx))
            .map_err(io_error(&endpoint.socket))?;

        Ok(PrimaryInstance {
            inbox,
            endpoint: Some(endpoint),
            _idle: None,
        })
    }
}

impl InstanceCoordinator for SocketCoordinator {
    fn register(
        &self,
        identity: &InstanceIdentity,
        invocation: &Invocation,
    ) -> Result<Registration, InstanceError> {
        if self.attempted.swap(true, Ordering::SeqCst) {
            return Err(InstanceError::AlreadyRegistered);
        }

        if !identity.is_unique() {
            tracing::debug!("Non-unique mode, skipping instance coordination");
            return Ok(Registration::Primary(PrimaryInstance::standalone()));
        }

        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let lock_path = self.lock_path(identity);
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_error(&lock_path))?;
        let _lock = Flock::lock(lock_file, FlockArg::LockExclusive).map_err(|(_, source)| {
            InstanceError::Lock {
                path: lock_path.clone(),
                source,
            }
        })?;

        let socket = self.socket_path(identity);
        match UnixStream::connect(&socket) {
            Ok(stream) => {
                forward(stream, invocation, self.ack_timeout)?;
                tracing::info!(
                    "Forwarded invocation to the running instance of {} ({})",
                    identity.app_id(),
                    identity.profile()
                );
                return Ok(Registration::Secondary);
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused
                ) =>
            {
                match fs::remove_file(&socket) {
                    Ok(()) => tracing::debug!("Removed stale instance socket {}", socket),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(io_error(&socket)(e)),
                }
            }
            Err(e) => return Err(io_error(&socket)(e)),
        }

        let primary = self.become_primary(socket)?;
        tracing::debug!(
            "Registered as primary instance of {} ({})",
            identity.app_id(),
            identity.profile()
        );
        Ok(Registration::Primary(primary))
    }
}

fn forward(
    mut stream: UnixStream,
    invocation: &Invocation,
    timeout: Duration,
) -> Result<(), InstanceError> {
    let io = |source| InstanceError::Io {
        path: Utf8PathBuf::from("(forward)"),
        source,
    };

    let mut line = serde_json::to_string(invocation)?;
    line.push('\n');
    stream.set_write_timeout(Some(timeout)).map_err(io)?;
    stream.write_all(line.as_bytes()).map_err(io)?;

    // The instance lock stays held until this read returns.
    stream.set_read_timeout(Some(timeout)).map_err(io)?;
    let mut ack = String::new();
    BufReader::new(&stream).read_line(&mut ack).map_err(io)?;

    if ack.trim_end() == ACK {
        Ok(())
    } else {
        Err(InstanceError::NotAcknowledged)
    }
}

fn serve(listener: UnixListener, tx: mpsc::Sender<Invocation>) {
    for stream in listener.incoming() {
        let stream = match stream {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!("Failed to accept instance connection: {}", e);
                continue;
            }
        };

        match receive(&stream, &tx) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => tracing::warn!("Dropped forwarded invocation: {}", e),
        }
    }
    tracing::debug!("Instance inbox closed");
}

/// Queue one forwarded invocation, then acknowledge it.
///
/// Returns `false` once the inbox has no receiver left.
fn receive(stream: &UnixStream, tx: &mpsc::Sender<Invocation>) -> Result<bool, InstanceError> {
    let io = |source| InstanceError::Io {
        path: Utf8PathBuf::from("(inbox)"),
        source,
    };

    stream.set_read_timeout(Some(RECEIVE_TIMEOUT)).map_err(io)?;
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).map_err(io)?;
    let invocation: Invocation = serde_json::from_str(line.trim_end())?;

    if tx.blocking_send(invocation).is_err() {
        return Ok(false);
    }

    let mut writer = stream;
    writer.write_all(format!("{}\n", ACK).as_bytes()).map_err(io)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_invocation_activation() {
        assert!(Invocation::default().is_activation());
        assert!(!Invocation::new(vec!["x".to_string()], None).is_activation());
    }

    #[test]
    fn test_resolved_targets() {
        let temp_dir = TempDir::new().unwrap();
        let cwd = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        fs::write(cwd.join("page.html"), "<html/>").unwrap();

        let invocation = Invocation::new(
            vec![
                "page.html".to_string(),
                "missing.html".to_string(),
                "https://example.org/a".to_string(),
                "/abs/file.html".to_string(),
            ],
            Some(cwd.clone()),
        );

        assert_eq!(
            invocation.resolved_targets(),
            vec![
                cwd.join("page.html").into_string(),
                "missing.html".to_string(),
                "https://example.org/a".to_string(),
                "/abs/file.html".to_string(),
            ]
        );
    }

    #[test]
    fn test_invocation_wire_format() {
        let invocation = Invocation::new(vec!["a".to_string()], None);
        let json = serde_json::to_string(&invocation).unwrap();
        let parsed: Invocation = serde_json::from_str(r#"{"targets":["a"]}"#).unwrap();
        assert_eq!(parsed, invocation);
        assert!(json.starts_with(r#"{"targets":["a"]"#));
    }

    #[test]
    fn test_standalone_primary_has_no_socket() {
        let primary = PrimaryInstance::standalone();
        assert!(primary.socket_path().is_none());
    }
}
