//! Live argument scrubbing against the kernel's view of the process
//!
//! The only test here re-runs this binary with extra arguments, and that
//! child wipes its own argument vector. The wipe is never applied to the
//! harness process running the other tests.

#![cfg(all(target_os = "linux", target_env = "gnu"))]

use kestrel::services::secure_process_args;
use std::ffi::OsString;
use std::os::unix::ffi::OsStrExt;
use std::process::Command;

const CHILD_ENV: &str = "KESTREL_ARGV_SCRUB_CHILD";
const TEST_NAME: &str = "test_process_arguments_are_wiped_from_cmdline";

fn cmdline() -> Vec<u8> {
    std::fs::read("/proc/self/cmdline").unwrap()
}

#[test]
fn test_process_arguments_are_wiped_from_cmdline() {
    if std::env::var_os(CHILD_ENV).is_none() {
        let output = Command::new(std::env::current_exe().unwrap())
            .args([TEST_NAME, "--exact", "--nocapture", "--test-threads=1"])
            .env(CHILD_ENV, "1")
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "child failed:\n{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        return;
    }

    let args: Vec<OsString> = std::env::args_os().collect();
    assert!(args.len() > 1);
    let before = cmdline();

    let durable = secure_process_args(&args);
    let after = cmdline();

    assert_eq!(durable, args);
    assert_eq!(after.len(), before.len());

    let argv0 = args[0].as_bytes();
    assert_eq!(&after[..argv0.len()], argv0);
    assert!(
        after[argv0.len()..].iter().all(|byte| *byte == 0),
        "{:?}",
        String::from_utf8_lossy(&after)
    );
}
