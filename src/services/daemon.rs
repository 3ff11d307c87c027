//! Background detachment (`--nonblock`).
//!
//! The process forks; the parent leaves immediately with success and the
//! child becomes a session leader without a controlling terminal, then carries
//! on with startup. Neither failure is retried.

use nix::errno::Errno;
use nix::unistd::{ForkResult, fork, setsid};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonError {
    #[error("cannot fork: {0}")]
    Fork(#[source] Errno),

    #[error("new SID creation failure: {0}")]
    Session(#[source] Errno),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForkOutcome {
    Parent { child: i32 },
    Child,
}

/// Host process operations needed for detachment.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessOps {
    fn fork(&self) -> Result<ForkOutcome, Errno>;

    fn new_session(&self) -> Result<(), Errno>;
}

/// [`ProcessOps`] backed by the real `fork(2)` and `setsid(2)`.
pub struct NixProcessOps;

impl ProcessOps for NixProcessOps {
    fn fork(&self) -> Result<ForkOutcome, Errno> {
        // SAFETY: detachment runs before the runtime or any other thread is
        // started, so the child inherits a single-threaded process.
        match unsafe { fork() }? {
            ForkResult::Parent { child } => Ok(ForkOutcome::Parent {
                child: child.as_raw(),
            }),
            ForkResult::Child => Ok(ForkOutcome::Child),
        }
    }

    fn new_session(&self) -> Result<(), Errno> {
        setsid().map(|_| ())
    }
}

/// What the caller must do after [`maybe_detach`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detachment {
    /// Detachment was not requested; continue in the foreground.
    NotRequested,
    /// This is the original process; exit with success and do nothing else.
    ExitParent,
    /// This is the detached child; continue startup.
    Detached,
}

pub fn maybe_detach<P: ProcessOps + ?Sized>(
    requested: bool,
    ops: &P,
) -> Result<Detachment, DaemonError> {
    if !requested {
        return Ok(Detachment::NotRequested);
    }

    match ops.fork().map_err(DaemonError::Fork)? {
        ForkOutcome::Parent { .. } => Ok(Detachment::ExitParent),
        ForkOutcome::Child => {
            ops.new_session().map_err(DaemonError::Session)?;
            Ok(Detachment::Detached)
        }
    }
}
