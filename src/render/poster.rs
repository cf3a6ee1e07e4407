//! Handoff from worker threads to the main (UI) thread

use std::time::{Duration, Instant};

use log::trace;

pub type UiCallback = Box<dyn FnOnce() + Send>;

/// Schedules callbacks to run on the main thread
pub trait MainThread: Send + Sync {
    fn post(&self, callback: UiCallback);
}

/// Queue drained by the UI loop. `post` may be called from any thread,
/// `run_pending` only from the thread that owns the UI state.
pub struct ChannelPoster {
    tx: flume::Sender<UiCallback>,
    rx: flume::Receiver<UiCallback>,
}

impl Default for ChannelPoster {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelPoster {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    /// Runs everything queued so far without blocking
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(callback) = self.rx.try_recv() {
            callback();
            ran += 1;
        }
        if ran > 0 {
            trace!("Ran {ran} main-thread callbacks");
        }
        ran
    }

    /// Blocks up to `timeout` for the first callback, then drains the rest
    pub fn wait_and_run(&self, timeout: Duration) -> usize {
        match self.rx.recv_timeout(timeout) {
            Ok(callback) => {
                callback();
                1 + self.run_pending()
            }
            Err(_) => 0,
        }
    }

    /// Keeps draining until `done` holds or `timeout` elapses
    pub fn run_until(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            self.run_pending();
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            self.wait_and_run((deadline - now).min(Duration::from_millis(20)));
        }
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

impl MainThread for ChannelPoster {
    fn post(&self, callback: UiCallback) {
        // the receiver lives in self, so the send cannot fail
        let _ = self.tx.send(callback);
    }
}
