//! Kestrel - single-instance browser launcher
//!
//! Main entry point. Turns one command-line invocation into either a running
//! Primary instance or a forwarded request to the one already running.
//!
//! # Execution Flow
//!
//! 1. Install the log router and validate the application id
//! 2. Dispatch options: `--version`, `--help` and `--check` exit here; the
//!    platform storage roots are only resolved once something needs them
//! 3. Detach into the background when `--nonblock` is given
//! 4. Snapshot the arguments and wipe them from the process listing
//! 5. Register with the instance coordinator; a Secondary forwards and exits
//! 6. Build the tokio runtime and run the application until Ctrl-C/SIGTERM
//!
//! Every fatal condition goes through [`kestrel::fatal`], which logs at fatal
//! severity and exits with the error's code.

use anyhow::Result;
use kestrel::cli::{Dispatch, Dispatcher, Report};
use kestrel::models::{ProcessConfig, validate_application_id};
use kestrel::services::{
    Detachment, HeadlessHost, InstanceCoordinator, Invocation, NixProcessOps, Registration,
    SocketCoordinator, argv, maybe_detach,
};
use kestrel::{APP_ID, APP_NAME, Application, LogRouter, StartupError, VERSION, fatal, logging};
use std::ffi::OsString;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal::unix::{SignalKind, signal};

fn main() -> Result<()> {
    let started = Instant::now();
    let router = Arc::new(LogRouter::new(started));

    if let Err(e) = logging::install(router.clone()) {
        // Nothing is listening for log lines yet.
        eprintln!("{}: {}", APP_NAME, e);
        std::process::exit(StartupError::from(e).exit_code());
    }
    if let Err(e) = validate_application_id(APP_ID) {
        fatal(&router, e.into());
    }

    let raw: Vec<OsString> = std::env::args_os().collect();
    let mut host = HeadlessHost::new();

    let dispatcher = Dispatcher::from_platform(&router);
    let launch = match dispatcher.dispatch(&raw, &mut host) {
        Ok(Dispatch::Continue(launch)) => launch,
        Ok(Dispatch::Exit { code, report }) => {
            match report {
                Report::Stdout(text) => print!("{}", text),
                Report::Stderr(text) => eprint!("{}", text),
                Report::None => {}
            }
            std::process::exit(code);
        }
        Err(e) => fatal(&router, e),
    };
    let provisioner = dispatcher
        .into_provisioner()
        .unwrap_or_else(|e| fatal(&router, e.into()));

    match maybe_detach(launch.daemonize, &NixProcessOps) {
        Ok(Detachment::ExitParent) => std::process::exit(0),
        Ok(Detachment::NotRequested | Detachment::Detached) => {}
        Err(e) => fatal(&router, e.into()),
    }

    let durable = argv::secure_process_args(&raw);
    drop(raw);
    let config =
        ProcessConfig::new(APP_ID, launch, durable, started).unwrap_or_else(|e| fatal(&router, e.into()));

    tracing::info!(
        "Starting {} v{} (profile '{}')",
        APP_NAME,
        VERSION,
        config.profile()
    );

    let coordinator =
        SocketCoordinator::new(provisioner.roots().runtime_or_cache().join(APP_NAME));
    let invocation = Invocation::from_current_dir(config.targets().to_vec());
    let primary = match coordinator.register(config.identity(), &invocation) {
        Ok(Registration::Primary(primary)) => primary,
        Ok(Registration::Secondary) => return Ok(()),
        Err(e) => fatal(&router, e.into()),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(2)
        .thread_name("kestrel-worker")
        .build()?;

    let app = Application::new(config, provisioner, host);
    let result = runtime.block_on(app.run(primary, invocation, shutdown_signal()));

    runtime.shutdown_timeout(Duration::from_secs(5));

    if let Err(e) = result {
        fatal(&router, e);
    }

    tracing::info!("Application shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!("Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
