//! The Primary's lifetime: one startup, then serving invocations.

use crate::APP_NAME;
use crate::error::StartupError;
use crate::metrics::Metrics;
use crate::models::ProcessConfig;
use crate::services::directories::{DirectoryProvisioner, DirectorySet};
use crate::services::host::Host;
use crate::services::instance::{Invocation, PrimaryInstance};
use crate::services::startup;
use std::future::Future;

pub struct Application<H: Host> {
    config: ProcessConfig,
    provisioner: DirectoryProvisioner,
    host: H,
    metrics: Metrics,
    dirs: Option<DirectorySet>,
}

impl<H: Host> Application<H> {
    pub fn new(config: ProcessConfig, provisioner: DirectoryProvisioner, host: H) -> Self {
        let metrics = Metrics::new(config.started());
        Self {
            config,
            provisioner,
            host,
            metrics,
            dirs: None,
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Directories provisioned by startup, once it has run.
    pub fn dirs(&self) -> Option<&DirectorySet> {
        self.dirs.as_ref()
    }

    /// Run the startup sequence. Later calls return the first result's directories.
    pub fn startup(&mut self) -> Result<&DirectorySet, StartupError> {
        let dirs = match self.dirs.take() {
            Some(dirs) => dirs,
            None => startup::run(
                &self.config,
                APP_NAME,
                &self.provisioner,
                &mut self.host,
                &self.metrics,
            )?,
        };
        Ok(self.dirs.insert(dirs))
    }

    /// Hand one invocation to the host: activate when empty, open otherwise.
    pub fn handle(&mut self, invocation: &Invocation, forwarded: bool) {
        let activation = invocation.is_activation();
        if activation {
            self.host.dispatch_open(&[]);
        } else {
            self.host.dispatch_open(&invocation.resolved_targets());
        }
        self.metrics.record_invocation(activation, forwarded);
    }

    /// Start up, handle this process's own `invocation`, then serve forwarded
    /// invocations until `shutdown` resolves or the inbox closes.
    ///
    /// `invocation` is the one built for registration, so relative file
    /// targets resolve against the launch directory exactly as they would
    /// had the launch been forwarded.
    pub async fn run(
        mut self,
        mut primary: PrimaryInstance,
        invocation: Invocation,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), StartupError> {
        self.startup()?;
        self.handle(&invocation, false);

        if let Some(socket) = primary.socket_path() {
            tracing::debug!("Accepting invocations on {}", socket);
        }

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    break;
                }
                next = primary.next_invocation() => match next {
                    Some(invocation) => self.handle(&invocation, true),
                    None => {
                        tracing::debug!("Invocation inbox closed");
                        break;
                    }
                },
            }
        }

        self.metrics.log_summary();
        Ok(())
    }
}
