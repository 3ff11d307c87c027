//! Contract with the external collaborators started during startup.
//!
//! The rendering engine, the inter-process transport and the scripting runtime
//! are not part of this crate. Startup only needs to initialize them in order,
//! hand the configuration script to the scripting side, and pass targets to
//! open. [`HeadlessHost`] is the implementation shipped with the binary.

use crate::config;
use crate::models::UserSettings;
use camino::Utf8Path;
use thiserror::Error;

/// Initialization failure reported by a collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct HostError(pub String);

#[cfg_attr(test, mockall::automock)]
pub trait Host {
    fn init_rendering_context(&mut self) -> Result<(), HostError>;

    fn init_transport(&mut self) -> Result<(), HostError>;

    fn init_scripting_runtime(&mut self) -> Result<(), HostError>;

    /// Parse (and unless `validate_only`, execute) the configuration script.
    fn load_config_script(&mut self, path: &Utf8Path, validate_only: bool) -> bool;

    /// Open targets in the running instance; empty means plain activation.
    fn dispatch_open(&mut self, targets: &[String]);
}

/// Collaborators without a display: stages only record their readiness and
/// opened targets are kept in memory.
#[derive(Debug, Default)]
pub struct HeadlessHost {
    rendering: bool,
    transport: bool,
    scripting: bool,
    settings: Option<UserSettings>,
    opened: Vec<String>,
}

impl HeadlessHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings from the last executed configuration script.
    pub fn settings(&self) -> Option<&UserSettings> {
        self.settings.as_ref()
    }

    /// Every target opened so far, in order.
    pub fn opened(&self) -> &[String] {
        &self.opened
    }

    fn expand(&self, target: &str) -> String {
        let looks_like_location =
            target.contains("://") || target.contains('.') || target.contains('/');
        if looks_like_location {
            return target.to_string();
        }
        self.settings
            .as_ref()
            .and_then(|settings| settings.search_url(target))
            .unwrap_or_else(|| target.to_string())
    }
}

impl Host for HeadlessHost {
    fn init_rendering_context(&mut self) -> Result<(), HostError> {
        self.rendering = true;
        tracing::debug!("Rendering context ready (headless)");
        Ok(())
    }

    fn init_transport(&mut self) -> Result<(), HostError> {
        if !self.rendering {
            return Err(HostError(
                "transport requires an initialized rendering context".to_string(),
            ));
        }
        self.transport = true;
        tracing::debug!("Transport ready (headless)");
        Ok(())
    }

    fn init_scripting_runtime(&mut self) -> Result<(), HostError> {
        self.scripting = true;
        tracing::debug!("Scripting runtime ready");
        Ok(())
    }

    fn load_config_script(&mut self, path: &Utf8Path, validate_only: bool) -> bool {
        if !self.scripting {
            tracing::warn!("Scripting runtime not initialized, cannot run {}", path);
            return false;
        }

        if validate_only {
            return match config::check_syntax(path) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!("{}", e);
                    false
                }
            };
        }

        match config::load_settings(path) {
            Ok(settings) => {
                self.settings = Some(settings);
                true
            }
            Err(e) => {
                tracing::warn!("{}", e);
                false
            }
        }
    }

    fn dispatch_open(&mut self, targets: &[String]) {
        if targets.is_empty() {
            let homepage = self
                .settings
                .as_ref()
                .map(|settings| settings.homepage.clone())
                .unwrap_or_else(|| UserSettings::default().homepage);
            tracing::info!("Activated, opening {}", homepage);
            self.opened.push(homepage);
            return;
        }

        for target in targets {
            let location = self.expand(target);
            tracing::info!("Opening {}", location);
            self.opened.push(location);
        }
    }
}
