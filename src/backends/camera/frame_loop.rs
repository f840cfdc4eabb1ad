// SPDX-License-Identifier: GPL-3.0-only
//! Paced capture thread
//!
//! Sources that synthesize or poll frames run their producer on a dedicated
//! thread at a fixed cadence, so frame callbacks never share a thread with
//! encoding or presentation work.

use super::types::{DeviceError, DeviceResult};
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Handle to a thread that calls a producer once per period
///
/// Dropping the handle stops the thread and waits for it.
pub struct PacedCaptureThread {
    handle: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
    name: String,
}

impl PacedCaptureThread {
    /// Spawn `capture-<name>` calling `produce(tick)` every `period`
    ///
    /// The producer ends the thread by returning `ControlFlow::Break`.
    /// Deadlines are absolute, so a slow tick shortens the next sleep. After
    /// an overrun longer than a whole period the schedule resets to now and
    /// the missed ticks are not replayed.
    pub fn spawn<F>(name: &str, period: Duration, mut produce: F) -> DeviceResult<Self>
    where
        F: FnMut(u64) -> ControlFlow<()> + Send + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let thread_name = name.to_string();
        let period = period.max(Duration::from_millis(1));

        let handle = thread::Builder::new()
            .name(format!("capture-{}", name))
            .spawn(move || {
                let mut deadline = Instant::now();
                let mut tick = 0u64;
                while !thread_stop.load(Ordering::SeqCst) {
                    if produce(tick).is_break() {
                        debug!(name = %thread_name, tick, "Producer ended capture");
                        break;
                    }
                    tick += 1;

                    deadline += period;
                    let now = Instant::now();
                    if deadline > now {
                        thread::sleep(deadline - now);
                    } else if now - deadline > period {
                        deadline = now;
                    }
                }
                debug!(name = %thread_name, ticks = tick, "Capture thread exiting");
            })
            .map_err(|e| DeviceError::SessionFailed(format!("spawn capture thread: {}", e)))?;

        info!(name = %name, period_ms = period.as_millis() as u64, "Capture thread started");
        Ok(Self {
            handle: Some(handle),
            stop,
            name: name.to_string(),
        })
    }

    /// Whether the thread is still producing
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Signal the thread and wait for it to exit
    ///
    /// Calling this from the producer itself only sets the flag.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let Some(handle) = self.handle.take() else {
            return;
        };
        if handle.thread().id() == thread::current().id() {
            return;
        }
        if handle.join().is_err() {
            warn!(name = %self.name, "Capture thread panicked");
        }
    }
}

impl Drop for PacedCaptureThread {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU64;

    #[test]
    fn test_ticks_are_sequential() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ticks);

        let capture = PacedCaptureThread::spawn("seq", Duration::from_millis(2), move |t| {
            seen.lock().unwrap().push(t);
            if t == 4 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();

        while capture.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(*ticks.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_period_is_respected() {
        let start = Instant::now();
        let capture = PacedCaptureThread::spawn("period", Duration::from_millis(20), |t| {
            if t == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .unwrap();
        while capture.is_running() {
            thread::sleep(Duration::from_millis(1));
        }
        // tick 3 runs after three full periods
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_stop_joins_thread() {
        let count = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&count);
        let mut capture = PacedCaptureThread::spawn("stop", Duration::from_millis(5), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            ControlFlow::Continue(())
        })
        .unwrap();

        thread::sleep(Duration::from_millis(30));
        assert!(capture.is_running());
        capture.stop();
        assert!(!capture.is_running());

        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop > 0);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }
}
