//! Ordered initialization of the dependent subsystems.
//!
//! Stages run strictly one after another and each must succeed before the
//! next starts: directories, rendering context, transport, scripting runtime,
//! configuration script. The first failure ends the sequence.

use crate::error::StartupError;
use crate::metrics::Metrics;
use crate::models::{ProcessConfig, Profile};
use crate::services::directories::{DirectoryProvisioner, DirectorySet};
use crate::services::host::Host;
use camino::Utf8Path;
use std::fmt;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Directories,
    RenderingContext,
    Transport,
    ScriptingRuntime,
    ConfigScript,
}

impl Stage {
    /// Stages in execution order.
    pub const ORDER: [Stage; 5] = [
        Stage::Directories,
        Stage::RenderingContext,
        Stage::Transport,
        Stage::ScriptingRuntime,
        Stage::ConfigScript,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Directories => "directories",
            Stage::RenderingContext => "rendering context",
            Stage::Transport => "transport",
            Stage::ScriptingRuntime => "scripting runtime",
            Stage::ConfigScript => "configuration script",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn timed<T>(metrics: &Metrics, stage: Stage, run: impl FnOnce() -> T) -> T {
    let started = Instant::now();
    let result = run();
    metrics.record_stage(stage, started.elapsed());
    tracing::debug!("Stage '{}' finished in {:?}", stage, started.elapsed());
    result
}

/// Run every stage for `config`, returning the provisioned directories.
pub fn run<H: Host + ?Sized>(
    config: &ProcessConfig,
    app_name: &str,
    provisioner: &DirectoryProvisioner,
    host: &mut H,
    metrics: &Metrics,
) -> Result<DirectorySet, StartupError> {
    let dirs = timed(metrics, Stage::Directories, || {
        provisioner.provision(app_name, config.profile()).into_result()
    })?;

    let infrastructure = [
        Stage::RenderingContext,
        Stage::Transport,
        Stage::ScriptingRuntime,
    ];
    for stage in infrastructure {
        timed(metrics, stage, || match stage {
            Stage::RenderingContext => host.init_rendering_context(),
            Stage::Transport => host.init_transport(),
            _ => host.init_scripting_runtime(),
        })
        .map_err(|source| StartupError::Infrastructure { stage, source })?;
    }

    let path = config.config_path();
    if !timed(metrics, Stage::ConfigScript, || {
        host.load_config_script(path, false)
    }) {
        return Err(StartupError::ConfigScript(path.to_path_buf()));
    }

    tracing::info!(
        "Startup complete for profile '{}' in {:.3}s",
        config.profile(),
        config.uptime().as_secs_f64()
    );
    Ok(dirs)
}

/// `--check`: provision directories and parse the script without executing it.
///
/// The rendering context and transport are never touched.
pub fn check_config<H: Host + ?Sized>(
    app_name: &str,
    profile: &Profile,
    config_path: &Utf8Path,
    provisioner: &DirectoryProvisioner,
    host: &mut H,
) -> bool {
    let report = provisioner.provision(app_name, profile);
    if !report.is_complete() {
        tracing::warn!(
            "{} of 3 profile directories could not be created",
            report.failures.len()
        );
    }

    if let Err(e) = host.init_scripting_runtime() {
        tracing::warn!("{} initialization failed: {}", Stage::ScriptingRuntime, e);
        return false;
    }

    host.load_config_script(config_path, true)
}
