use std::sync::atomic::{AtomicBool, Ordering};

static VERBOSE: AtomicBool = AtomicBool::new(false);

pub fn enable_verbose() {
    VERBOSE.store(true, Ordering::Relaxed);
}

pub fn verbose() -> bool {
    VERBOSE.load(Ordering::Relaxed)
}

/// Diagnostic chatter, only when the `debug`/`list`/`delete` subcommands
/// turned verbosity on. User-facing messages use `println!` instead.
#[macro_export]
macro_rules! debug_log {
    ($($arg:tt)*) => {
        if $crate::logger::verbose() {
            eprintln!("[drivesyncd] {}", format_args!($($arg)*));
        }
    };
}
