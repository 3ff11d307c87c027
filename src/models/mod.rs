//! Data models shared by the startup components.
//!
//! - [`ProcessConfig`]: immutable process-wide configuration assembled after option dispatch
//! - [`LaunchOptions`]: what option dispatch resolved for a normal launch
//! - [`InstanceIdentity`]: application id, profile and uniqueness mode used for registration
//! - [`Profile`]: namespace partitioning on-disk state
//! - [`UserSettings`]: settings declared by the user configuration script

pub mod config;
pub mod process;

pub use config::{UserSettings, WindowSettings};
pub use process::{
    DEFAULT_PROFILE_NAME, InstanceIdentity, InvalidIdentity, InvalidProfile, LaunchOptions,
    ProcessConfig, Profile, UniquenessMode, validate_application_id,
};
