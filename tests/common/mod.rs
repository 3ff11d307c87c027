//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use kestrel::logging::{LogRouter, VerbosityTable};
use kestrel::models::{LaunchOptions, ProcessConfig, Profile};
use kestrel::services::{DirectoryProvisioner, DirectoryRoots, HeadlessHost, Host, HostError};
use kestrel::{APP_ID, APP_NAME};
use std::ffi::OsString;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tempfile::TempDir;
use tracing::subscriber::DefaultGuard;

/// One call made on a [`RecordingHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Rendering,
    Transport,
    Scripting,
    LoadScript { validate_only: bool },
    Open(Vec<String>),
}

/// Call log that outlives the host it was taken from.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    fn push(&self, call: Call) {
        self.0.lock().unwrap().push(call);
    }
}

/// [`HeadlessHost`] that records every call and can be told to fail a stage.
#[derive(Debug, Default)]
pub struct RecordingHost {
    inner: HeadlessHost,
    log: CallLog,
    failing: Option<Call>,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Host whose initialization for `call` fails.
    pub fn failing(call: Call) -> Self {
        Self {
            failing: Some(call),
            ..Self::default()
        }
    }

    pub fn log(&self) -> CallLog {
        self.log.clone()
    }

    fn init(&mut self, call: Call) -> Result<(), HostError> {
        let fails = self.failing.as_ref() == Some(&call);
        self.log.push(call);
        if fails {
            Err(HostError("injected failure".to_string()))
        } else {
            Ok(())
        }
    }
}

impl Host for RecordingHost {
    fn init_rendering_context(&mut self) -> Result<(), HostError> {
        self.init(Call::Rendering)?;
        self.inner.init_rendering_context()
    }

    fn init_transport(&mut self) -> Result<(), HostError> {
        self.init(Call::Transport)?;
        self.inner.init_transport()
    }

    fn init_scripting_runtime(&mut self) -> Result<(), HostError> {
        self.init(Call::Scripting)?;
        self.inner.init_scripting_runtime()
    }

    fn load_config_script(&mut self, path: &Utf8Path, validate_only: bool) -> bool {
        self.log.push(Call::LoadScript { validate_only });
        self.inner.load_config_script(path, validate_only)
    }

    fn dispatch_open(&mut self, targets: &[String]) {
        self.log.push(Call::Open(targets.to_vec()));
        self.inner.dispatch_open(targets);
    }
}

/// In-memory log sink shared with the test.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn text(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }

    pub fn lines_containing(&self, needle: &str) -> usize {
        self.text().lines().filter(|line| line.contains(needle)).count()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route this thread's log output into a buffer until the guard drops.
pub fn capture_logs(router: &LogRouter) -> (SharedBuffer, DefaultGuard) {
    let buffer = SharedBuffer::default();
    let writer = buffer.clone();
    let guard = tracing::subscriber::set_default(router.subscriber(move || writer.clone(), false));
    (buffer, guard)
}

pub fn create_sandbox() -> (TempDir, Utf8PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let base = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
    (temp_dir, base)
}

pub fn provisioner(base: &Utf8Path) -> DirectoryProvisioner {
    DirectoryProvisioner::new(DirectoryRoots::under(base))
}

pub fn write_script(dir: &Utf8Path, contents: &str) -> Utf8PathBuf {
    let path = dir.join("rc.toml");
    std::fs::write(&path, contents).unwrap();
    path
}

/// Argument vector as the process would receive it.
pub fn args(list: &[&str]) -> Vec<OsString> {
    std::iter::once(APP_NAME)
        .chain(list.iter().copied())
        .map(OsString::from)
        .collect()
}

pub fn process_config(config_path: Utf8PathBuf, profile: Profile, targets: &[&str]) -> ProcessConfig {
    let launch = LaunchOptions {
        config_path,
        profile,
        log: VerbosityTable::default(),
        daemonize: false,
        allow_multiple: false,
        targets: targets.iter().map(|t| t.to_string()).collect(),
    };
    ProcessConfig::new(APP_ID, launch, args(targets), Instant::now()).unwrap()
}
