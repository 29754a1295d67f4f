//! Termination signal handling
//!
//! SIGINT and SIGTERM do not touch the server connection themselves. They fire
//! a [`ShutdownTrigger`]; the dispatch loop notices at its wait point, closes
//! the connection on its own thread and returns.
//!
//! Termination is still guaranteed when the loop is stuck: a second signal,
//! or the loop failing to stop within the grace period, exits the process.

use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::{debug, error, warn};

/// How long the dispatch loop has to stop after the first signal
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Sending half of the shutdown channel
#[derive(Debug, Clone)]
pub struct ShutdownTrigger {
    tx: Sender<()>,
    fired: Arc<AtomicBool>,
}

impl ShutdownTrigger {
    /// Request shutdown. Repeated calls are harmless.
    pub fn trigger(&self) {
        if !self.fired.swap(true, Ordering::SeqCst) {
            // capacity 1: a pending wakeup is already enough
            let _ = self.tx.try_send(());
        }
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Create a shutdown trigger and the receiver the dispatch loop waits on
pub fn channel() -> (ShutdownTrigger, Receiver<()>) {
    let (tx, rx) = bounded(1);
    let trigger = ShutdownTrigger {
        tx,
        fired: Arc::new(AtomicBool::new(false)),
    };
    (trigger, rx)
}

/// Route SIGINT and SIGTERM to `trigger`, exiting with status 1 if the loop
/// has not stopped `grace` after the first signal
pub fn install(trigger: ShutdownTrigger, grace: Duration) -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || on_signal(&trigger, grace, force_exit))
}

fn force_exit() {
    error!("abnormal termination of filevars");
    process::exit(1);
}

fn on_signal<F>(trigger: &ShutdownTrigger, grace: Duration, exit: F)
where
    F: FnOnce() + Send + 'static,
{
    if trigger.is_triggered() {
        warn!("termination signal repeated");
        exit();
        return;
    }

    debug!("termination signal received");
    trigger.trigger();

    let watchdog = thread::Builder::new()
        .name("filevars-shutdown".to_string())
        .spawn(move || {
            thread::sleep(grace);
            warn!(?grace, "dispatch loop did not stop in time");
            exit();
        });
    if let Err(e) = watchdog {
        warn!(error = %e, "could not start shutdown watchdog");
    }
}
