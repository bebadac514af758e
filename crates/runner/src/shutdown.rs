#![forbid(unsafe_code)]

use crate::RunnerError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Process-local stop request shared by a worker loop and whoever wants it to drain.
///
/// This is the fast path only. The durable `shutdown` flag in the store is what every
/// worker ultimately honors.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Turns SIGTERM/SIGINT into a stop request on `stop`.
///
/// Must run before any other thread is spawned: the signals are blocked on the calling
/// thread, every thread started afterwards inherits that mask, and a dedicated listener
/// thread receives them with `sigwait`.
#[cfg(unix)]
pub fn install_signal_listener(stop: StopSignal) -> Result<(), RunnerError> {
    use nix::sys::signal::{SigSet, Signal};

    let mut signals = SigSet::empty();
    signals.add(Signal::SIGTERM);
    signals.add(Signal::SIGINT);
    signals
        .thread_block()
        .map_err(|err| RunnerError::Signal(err.to_string()))?;

    std::thread::Builder::new()
        .name("qc-signals".to_string())
        .spawn(move || {
            loop {
                match signals.wait() {
                    Ok(signal) => {
                        tracing::info!(signal = signal.as_str(), "stop requested; draining current job");
                        stop.request();
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "signal wait failed; listener exiting");
                        return;
                    }
                }
            }
        })?;
    Ok(())
}

#[cfg(not(unix))]
pub fn install_signal_listener(_stop: StopSignal) -> Result<(), RunnerError> {
    Ok(())
}
