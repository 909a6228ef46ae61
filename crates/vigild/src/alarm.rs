//! Alarm controller — the Idle/Sounding state machine.
//!
//! While sounding, a worker thread emits a fixed-cadence pulse train:
//! 500 ms tone, 1000 ms pause, checking a cancel token at each cycle
//! boundary. A stop request is therefore honored within one full cycle;
//! `stop_and_wait` joins the worker so the caller observes full silence
//! before proceeding.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use vigil_hw::Sounder;

const ALARM_TONE_HZ: f32 = 1000.0;
const ALARM_TONE: Duration = Duration::from_millis(500);
const ALARM_PAUSE: Duration = Duration::from_millis(1000);

/// Cancellation token: flag + condvar so the pause is a timed wait that
/// wakes immediately on cancel instead of an unconditional sleep.
///
/// Written only by the controller (main thread), read by the worker.
struct CancelToken {
    cancelled: Mutex<bool>,
    cond: Condvar,
}

impl CancelToken {
    fn new() -> Self {
        Self {
            cancelled: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    fn cancel(&self) {
        let mut flag = self.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        *flag = true;
        self.cond.notify_all();
    }

    fn is_cancelled(&self) -> bool {
        *self.cancelled.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Wait up to `timeout` for cancellation. Returns true if cancelled.
    fn wait_timeout(&self, timeout: Duration) -> bool {
        let flag = self.cancelled.lock().unwrap_or_else(|e| e.into_inner());
        let (flag, _) = self
            .cond
            .wait_timeout_while(flag, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(|e| e.into_inner());
        *flag
    }
}

/// Cadence for the alarm pulse train. Separated from the controller so
/// tests can run with a fast cycle.
#[derive(Clone, Copy)]
pub struct AlarmCadence {
    pub tone_hz: f32,
    pub tone: Duration,
    pub pause: Duration,
}

impl Default for AlarmCadence {
    fn default() -> Self {
        Self {
            tone_hz: ALARM_TONE_HZ,
            tone: ALARM_TONE,
            pause: ALARM_PAUSE,
        }
    }
}

/// Owns the sounding worker thread. Idle when no worker is running.
pub struct AlarmController {
    sounder: Arc<dyn Sounder>,
    cadence: AlarmCadence,
    worker: Option<(JoinHandle<()>, Arc<CancelToken>)>,
}

impl AlarmController {
    pub fn new(sounder: Arc<dyn Sounder>, cadence: AlarmCadence) -> Self {
        Self {
            sounder,
            cadence,
            worker: None,
        }
    }

    pub fn is_sounding(&self) -> bool {
        self.worker.is_some()
    }

    /// Transition Idle → Sounding. No-op while already sounding: only
    /// one pulse train may run at a time.
    pub fn start(&mut self) {
        if self.worker.is_some() {
            return;
        }

        let token = Arc::new(CancelToken::new());
        let worker_token = Arc::clone(&token);
        let sounder = Arc::clone(&self.sounder);
        let cadence = self.cadence;

        let handle = std::thread::Builder::new()
            .name("vigil-alarm".into())
            .spawn(move || {
                tracing::debug!("alarm worker started");
                loop {
                    if worker_token.is_cancelled() {
                        break;
                    }
                    sounder.pulse(cadence.tone_hz, cadence.tone);
                    if worker_token.wait_timeout(cadence.pause) {
                        break;
                    }
                }
                tracing::debug!("alarm worker stopped");
            })
            .expect("failed to spawn alarm worker");

        tracing::info!("alarm sounding");
        self.worker = Some((handle, token));
    }

    /// Transition Sounding → Idle, synchronously: cancels the worker and
    /// joins it, so the alarm is fully silent when this returns. No-op
    /// when idle.
    pub fn stop_and_wait(&mut self) {
        let Some((handle, token)) = self.worker.take() else {
            return;
        };
        token.cancel();
        if handle.join().is_err() {
            tracing::warn!("alarm worker panicked");
        }
        tracing::info!("alarm stopped");
    }
}

impl Drop for AlarmController {
    fn drop(&mut self) {
        self.stop_and_wait();
    }
}
