//! Redaction of the process argument vector.
//!
//! URLs and profile names passed on the command line would otherwise stay
//! readable in process listings (`ps`, `/proc/<pid>/cmdline`) for the whole
//! lifetime of the browser. [`secure_args`] takes an owned copy of every
//! argument and then zeroes the live strings in place, keeping their lengths so
//! the vector stays structurally identical.

use std::ffi::OsString;
use std::os::unix::ffi::OsStringExt;

/// Mutable view of an argument vector whose strings can be wiped in place.
pub trait ArgVector {
    fn arg_count(&self) -> usize;

    /// Raw bytes of the argument at `index`.
    fn arg_bytes(&self, index: usize) -> &[u8];

    /// Overwrite every byte of the argument at `index` with zero.
    fn wipe(&mut self, index: usize);
}

impl ArgVector for Vec<Vec<u8>> {
    fn arg_count(&self) -> usize {
        self.len()
    }

    fn arg_bytes(&self, index: usize) -> &[u8] {
        &self[index]
    }

    fn wipe(&mut self, index: usize) {
        self[index].fill(0);
    }
}

/// Copy every argument into owned storage, then zero arguments 1.. in place.
///
/// Argument 0, the executable path, is left untouched. The returned copy is
/// fully materialized before the first byte is overwritten.
pub fn secure_args<V: ArgVector + ?Sized>(live: &mut V) -> Vec<OsString> {
    let durable: Vec<OsString> = (0..live.arg_count())
        .map(|index| OsString::from_vec(live.arg_bytes(index).to_vec()))
        .collect();

    for index in 1..live.arg_count() {
        live.wipe(index);
    }

    durable
}

/// Scrub the real process arguments.
///
/// Returns the durable copy, or `fallback` when the platform gives no access
/// to the live vector (the arguments then stay visible).
pub fn secure_process_args(fallback: &[OsString]) -> Vec<OsString> {
    match process::ProcessArgv::live() {
        Some(mut live) => {
            let durable = secure_args(&mut live);
            tracing::debug!("Scrubbed {} process arguments", durable.len().saturating_sub(1));
            durable
        }
        None => {
            tracing::warn!("Process arguments cannot be scrubbed on this platform");
            fallback.to_vec()
        }
    }
}

#[cfg(all(target_os = "linux", target_env = "gnu"))]
mod process {
    use super::ArgVector;
    use std::ffi::{CStr, c_char, c_int};
    use std::sync::atomic::{AtomicIsize, AtomicPtr, Ordering};

    static ARGC: AtomicIsize = AtomicIsize::new(0);
    static ARGV: AtomicPtr<*mut c_char> = AtomicPtr::new(std::ptr::null_mut());

    // glibc passes (argc, argv, envp) to every `.init_array` entry, which
    // hands us the original argument strings rather than a copy.
    #[used]
    #[unsafe(link_section = ".init_array.00099")]
    static CAPTURE_ARGV: extern "C" fn(c_int, *mut *mut c_char, *mut *mut c_char) = capture;

    extern "C" fn capture(argc: c_int, argv: *mut *mut c_char, _envp: *mut *mut c_char) {
        ARGC.store(argc as isize, Ordering::Relaxed);
        ARGV.store(argv, Ordering::Relaxed);
    }

    /// The argument vector the kernel placed on the initial stack.
    pub struct ProcessArgv {
        argv: *mut *mut c_char,
        lengths: Vec<usize>,
    }

    impl ProcessArgv {
        pub fn live() -> Option<Self> {
            let argc = usize::try_from(ARGC.load(Ordering::Relaxed)).ok()?;
            let argv = ARGV.load(Ordering::Relaxed);
            if argv.is_null() {
                return None;
            }

            // Lengths are fixed up front; after a wipe the strings read as empty.
            let lengths = (0..argc)
                .map(|index| {
                    // SAFETY: argv holds argc valid NUL-terminated strings for
                    // the whole process lifetime.
                    unsafe { CStr::from_ptr(*argv.add(index)).to_bytes().len() }
                })
                .collect();

            Some(Self { argv, lengths })
        }
    }

    impl ArgVector for ProcessArgv {
        fn arg_count(&self) -> usize {
            self.lengths.len()
        }

        fn arg_bytes(&self, index: usize) -> &[u8] {
            // SAFETY: index < argc, and the string spans `lengths[index]` bytes.
            unsafe {
                std::slice::from_raw_parts(
                    (*self.argv.add(index)).cast::<u8>(),
                    self.lengths[index],
                )
            }
        }

        fn wipe(&mut self, index: usize) {
            // SAFETY: writes stay within the original string, NUL excluded.
            unsafe {
                std::ptr::write_bytes(*self.argv.add(index), 0, self.lengths[index]);
            }
        }
    }
}

#[cfg(not(all(target_os = "linux", target_env = "gnu")))]
mod process {
    /// No access to the live vector on this platform.
    pub struct ProcessArgv;

    impl ProcessArgv {
        pub fn live() -> Option<Vec<Vec<u8>>> {
            None
        }
    }
}
