//! Services module - the process-level machinery behind startup.
//!
//! # Components
//!
//! - [`directories`]: computes and creates the profile-scoped cache, config and data roots
//! - [`daemon`]: optional background detachment (`--nonblock`)
//! - [`argv`]: durable copy of the arguments and in-place scrubbing of the live vector
//! - [`instance`]: single-instance registration and forwarding of invocations
//! - [`host`]: the contract with the rendering, transport and scripting collaborators
//! - [`startup`]: the ordered, fail-fast initialization of those collaborators
//!
//! # Order of operations
//!
//! 1. Option dispatch (see [`crate::cli`]) may exit before anything here runs
//! 2. [`daemon::maybe_detach`] forks; the parent exits with success
//! 3. [`argv::secure_process_args`] snapshots and wipes the live arguments
//! 4. [`instance::InstanceCoordinator::register`] picks Primary or Secondary
//! 5. The Primary runs [`startup::run`] exactly once
//!
//! Nothing here starts a thread before step 4, so the fork in step 2 always
//! happens in a single-threaded process.

pub mod argv;
pub mod daemon;
pub mod directories;
pub mod host;
pub mod instance;
pub mod startup;

pub use argv::{ArgVector, secure_args, secure_process_args};
pub use daemon::{DaemonError, Detachment, NixProcessOps, ProcessOps, maybe_detach};
pub use directories::{
    DirectoryError, DirectoryKind, DirectoryProvisioner, DirectoryRoots, DirectorySet,
    ProvisionReport,
};
pub use host::{HeadlessHost, Host, HostError};
pub use instance::{
    InstanceCoordinator, InstanceError, InstanceRole, Invocation, PrimaryInstance, Registration,
    SocketCoordinator,
};
pub use startup::Stage;
