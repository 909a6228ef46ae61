//! Episode tracking and the capture/detect/alert loop.
//!
//! A detection episode begins on the first frame with presence after a
//! period of absence and ends on the first frame without it. The session
//! guarantees at most one notification per episode and keeps the alarm
//! sounding for the episode's whole duration.

use crate::alarm::AlarmController;
use crate::notify::Notifier;
use crate::preview::Preview;
use vigil_core::PoseDetector;
use vigil_hw::{CaptureSession, Frame};

/// Per-episode state, owned by the loop. Replaces ambient globals with
/// an explicit object: the notified flag plus the alarm handle.
pub struct Session {
    alarm: AlarmController,
    notifier: Notifier,
    episode_notified: bool,
}

impl Session {
    pub fn new(alarm: AlarmController, notifier: Notifier) -> Self {
        Self {
            alarm,
            notifier,
            episode_notified: false,
        }
    }

    /// Feed one classified frame into the episode state machine.
    ///
    /// Presence: dispatch a notification once per episode, keep the
    /// alarm sounding. Absence: stop the alarm synchronously (so the
    /// next episode never races a trailing pulse), re-arm notification.
    pub fn observe(&mut self, frame: &Frame, present: bool) {
        if present {
            if !self.episode_notified {
                tracing::info!(sequence = frame.sequence, "presence detected; alerting");
                self.notifier.dispatch(frame.clone());
                self.episode_notified = true;
            }
            self.alarm.start();
        } else {
            self.alarm.stop_and_wait();
            self.episode_notified = false;
        }
    }

    pub fn is_alarm_sounding(&self) -> bool {
        self.alarm.is_sounding()
    }

    /// Silence the alarm and wait for it; called on user quit and at
    /// the end of the stream.
    pub fn shutdown(&mut self) {
        self.alarm.stop_and_wait();
    }
}

/// Run the monitor loop until the stream ends or the user quits.
///
/// Frame-acquisition failure is stream exhaustion, not a fault: the loop
/// terminates cleanly. Inference failures are logged and treated as
/// absence so the system keeps watching.
pub fn run(
    capture: &mut CaptureSession<'_>,
    detector: &mut PoseDetector,
    session: &mut Session,
    mut preview: Option<&mut Preview>,
) {
    let mut first = true;

    loop {
        let frame = match capture.next_frame() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::info!(error = %e, "capture stream ended");
                break;
            }
        };

        if first {
            tracing::debug!(
                brightness = frame.avg_brightness(),
                width = frame.width,
                height = frame.height,
                "first frame captured"
            );
            first = false;
        }

        let pose = match detector.detect(&frame.data, frame.width, frame.height) {
            Ok(pose) => pose,
            Err(e) => {
                tracing::warn!(error = %e, sequence = frame.sequence, "inference failed");
                None
            }
        };

        session.observe(&frame, pose.is_some());

        if let Some(window) = preview.as_deref_mut() {
            if window.render(&frame, pose.as_ref()) {
                tracing::info!("quit requested");
                break;
            }
        }
    }

    session.shutdown();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmCadence;
    use crate::notify::{Alert, AlertMailer, NotifyError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};
    use vigil_hw::Sounder;

    struct NullSounder;

    impl Sounder for NullSounder {
        fn pulse(&self, _freq_hz: f32, duration: Duration) {
            std::thread::sleep(duration);
        }
    }

    struct CountingMailer {
        sends: AtomicUsize,
        fail: bool,
    }

    impl CountingMailer {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                sends: AtomicUsize::new(0),
                fail,
            })
        }

        fn count(&self) -> usize {
            self.sends.load(Ordering::SeqCst)
        }
    }

    impl AlertMailer for CountingMailer {
        fn send(&self, _alert: &Alert) -> Result<(), NotifyError> {
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Address(
                    "nope".parse::<lettre::message::Mailbox>().unwrap_err(),
                ))
            } else {
                Ok(())
            }
        }
    }

    struct Harness {
        session: Session,
        mailer: Arc<CountingMailer>,
        _runtime: tokio::runtime::Runtime,
    }

    fn harness(fail: bool, tag: &str) -> Harness {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let sounder: Arc<dyn Sounder> = Arc::new(NullSounder);
        let cadence = AlarmCadence {
            tone_hz: 1000.0,
            tone: Duration::from_millis(2),
            pause: Duration::from_millis(5),
        };
        let alarm = AlarmController::new(Arc::clone(&sounder), cadence);
        let mailer = CountingMailer::new(fail);
        let notifier = Notifier::new(
            mailer.clone(),
            sounder,
            runtime.handle().clone(),
            std::env::temp_dir().join(format!("vigil_monitor_{tag}_{}.jpg", std::process::id())),
        );
        Harness {
            session: Session::new(alarm, notifier),
            mailer,
            _runtime: runtime,
        }
    }

    fn frame(sequence: u32) -> Frame {
        Frame {
            data: vec![64u8; 8 * 8 * 3],
            width: 8,
            height: 8,
            timestamp: Instant::now(),
            sequence,
        }
    }

    fn wait_for_sends(mailer: &CountingMailer, expected: usize) {
        let start = Instant::now();
        while start.elapsed() < Duration::from_secs(2) {
            if mailer.count() >= expected {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("expected {expected} sends, got {}", mailer.count());
    }

    #[test]
    fn test_one_notification_per_episode() {
        let mut h = harness(false, "one_per_episode");

        h.session.observe(&frame(0), true);
        h.session.observe(&frame(1), true);
        h.session.observe(&frame(2), true);

        wait_for_sends(&h.mailer, 1);
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(h.mailer.count(), 1, "one notification per detection run");
        h.session.shutdown();
    }

    #[test]
    fn test_flag_resets_between_episodes() {
        let mut h = harness(false, "flag_reset");

        h.session.observe(&frame(0), true);
        h.session.observe(&frame(1), false);
        h.session.observe(&frame(2), true);

        wait_for_sends(&h.mailer, 2);
        assert_eq!(h.mailer.count(), 2, "each episode notifies independently");
        h.session.shutdown();
    }

    #[test]
    fn test_alarm_follows_episode() {
        let mut h = harness(false, "alarm_follows");

        h.session.observe(&frame(0), false);
        assert!(!h.session.is_alarm_sounding());

        h.session.observe(&frame(1), true);
        assert!(h.session.is_alarm_sounding());

        h.session.observe(&frame(2), true);
        assert!(h.session.is_alarm_sounding(), "alarm continues through the run");

        h.session.observe(&frame(3), false);
        assert!(!h.session.is_alarm_sounding(), "alarm idle after the run ends");
        h.session.shutdown();
    }

    #[test]
    fn test_notification_failure_does_not_stop_monitoring() {
        let mut h = harness(true, "failure_tolerant");

        h.session.observe(&frame(0), true);
        wait_for_sends(&h.mailer, 1);
        assert!(h.session.is_alarm_sounding(), "alarm unaffected by mail failure");

        h.session.observe(&frame(1), false);
        h.session.observe(&frame(2), true);
        wait_for_sends(&h.mailer, 2);
        assert!(h.session.is_alarm_sounding());
        h.session.shutdown();
    }

    #[test]
    fn test_reference_sequence() {
        // Frame sequence [absent, present, present, absent, present]:
        // notifications at frames 2 and 5; alarm during 2, 3, and 5.
        let mut h = harness(false, "reference");
        let expectations = [
            (false, false, 0),
            (true, true, 1),
            (true, true, 1),
            (false, false, 1),
            (true, true, 2),
        ];

        for (i, &(present, alarm_expected, sends_expected)) in expectations.iter().enumerate() {
            h.session.observe(&frame(i as u32), present);
            assert_eq!(
                h.session.is_alarm_sounding(),
                alarm_expected,
                "alarm state after frame {}",
                i + 1
            );
            wait_for_sends(&h.mailer, sends_expected);
        }

        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(h.mailer.count(), 2, "exactly two notifications total");
        h.session.shutdown();
    }

    #[test]
    fn test_shutdown_silences_alarm() {
        let mut h = harness(false, "shutdown");
        h.session.observe(&frame(0), true);
        assert!(h.session.is_alarm_sounding());
        h.session.shutdown();
        assert!(!h.session.is_alarm_sounding());
    }
}
