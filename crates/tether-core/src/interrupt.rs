//! External stop requests for a running session.
//!
//! Ctrl+C wakes the session's readiness wait directly. SIGTERM and SIGHUP
//! only raise a flag, which the session reads at the start of every cycle.

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

static INTERRUPTED: AtomicBool = AtomicBool::new(false);
static TERMINATE: AtomicBool = AtomicBool::new(false);
static INTERRUPT_NOTIFY: OnceLock<Notify> = OnceLock::new();

/// The session was stopped from outside; the CLI exits with status 130.
#[derive(Debug)]
pub struct InterruptedError;

impl std::fmt::Display for InterruptedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interrupted")
    }
}

impl std::error::Error for InterruptedError {}

/// Installs the Ctrl+C, SIGTERM and SIGHUP handlers.
///
/// None of them print: the renderer owns stdout.
///
/// # Panics
/// Panics if a handler cannot be registered.
pub fn init() {
    ctrlc::set_handler(trigger_ctrl_c).expect("Error setting Ctrl+C handler");

    #[cfg(unix)]
    {
        use signal_hook::consts::{SIGHUP, SIGTERM};

        // SAFETY: These closures only set an AtomicBool, which is async-signal-safe.
        unsafe {
            signal_hook::low_level::register(SIGTERM, || {
                TERMINATE.store(true, Ordering::SeqCst);
            })
            .expect("Error registering SIGTERM handler");
            signal_hook::low_level::register(SIGHUP, || {
                TERMINATE.store(true, Ordering::SeqCst);
            })
            .expect("Error registering SIGHUP handler");
        }
    }
}

fn notify() -> &'static Notify {
    INTERRUPT_NOTIFY.get_or_init(Notify::new)
}

/// Marks the session as interrupted and wakes its wait.
///
/// A second Ctrl+C while the session is still closing exits at once.
pub fn trigger_ctrl_c() {
    if INTERRUPTED.swap(true, Ordering::SeqCst) {
        std::process::exit(130);
    }
    notify().notify_waiters();
}

pub fn is_interrupted() -> bool {
    INTERRUPTED.load(Ordering::SeqCst)
}

/// SIGTERM or SIGHUP was received.
pub fn should_terminate() -> bool {
    TERMINATE.load(Ordering::SeqCst)
}

/// Returns true when any external stop request is pending.
pub fn stop_requested() -> bool {
    is_interrupted() || should_terminate()
}

/// Resolves once Ctrl+C was pressed. Used as one arm of the readiness wait.
pub async fn wait_for_interrupt() {
    loop {
        // Registered before the flag check so a trigger in between is not lost.
        let notified = notify().notified();
        if is_interrupted() {
            return;
        }
        notified.await;
    }
}
