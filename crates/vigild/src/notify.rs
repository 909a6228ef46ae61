//! Email notification — one alert per detection episode.
//!
//! Dispatch is fire-and-forget onto the tokio blocking pool; the monitor
//! loop never waits on a send and never learns about failures. A send
//! gate serializes mail sessions so two episodes close in time can never
//! overlap their SMTP connections.

use crate::config::Credentials;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{Message, SmtpTransport, Transport};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use vigil_hw::{Frame, Sounder};

const SMTP_HOST: &str = "smtp.gmail.com";
const ALERT_SUBJECT: &str = "Human Detected - Intruder ALERT!!!";
const ALERT_BODY: &str = "An intruder was detected. See attached frame.";
const CONFIRM_TONE_HZ: f32 = 1500.0;
const CONFIRM_TONE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("invalid address: {0}")]
    Address(#[from] lettre::address::AddressError),
    #[error("message build failed: {0}")]
    Message(#[from] lettre::error::Error),
    #[error("content type: {0}")]
    ContentType(#[from] lettre::message::header::ContentTypeErr),
    #[error("smtp: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),
}

/// One alert ready for submission.
pub struct Alert {
    /// Attachment file name (the transient capture file's name).
    pub attachment_name: String,
    pub jpeg: Vec<u8>,
}

/// Submits one alert email. Implementations own the whole session
/// lifecycle: connect, authenticate, send, close.
pub trait AlertMailer: Send + Sync {
    fn send(&self, alert: &Alert) -> Result<(), NotifyError>;
}

/// STARTTLS mail submission to the fixed well-known host.
pub struct SmtpMailer {
    sender: Mailbox,
    recipient: Mailbox,
    credentials: SmtpCredentials,
}

impl SmtpMailer {
    pub fn new(credentials: &Credentials) -> Result<Self, NotifyError> {
        Ok(Self {
            sender: credentials.sender.parse()?,
            recipient: credentials.recipient.parse()?,
            credentials: SmtpCredentials::new(
                credentials.sender.clone(),
                credentials.password.clone(),
            ),
        })
    }
}

impl AlertMailer for SmtpMailer {
    fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let message = Message::builder()
            .from(self.sender.clone())
            .to(self.recipient.clone())
            .subject(ALERT_SUBJECT)
            .multipart(
                MultiPart::mixed()
                    .singlepart(SinglePart::plain(ALERT_BODY.to_string()))
                    .singlepart(
                        Attachment::new(alert.attachment_name.clone())
                            .body(alert.jpeg.clone(), ContentType::parse("image/jpeg")?),
                    ),
            )?;

        // Built per send and dropped on every exit path, which closes
        // the SMTP session whether the submission succeeded or not.
        let transport = SmtpTransport::starttls_relay(SMTP_HOST)?
            .credentials(self.credentials.clone())
            .build();

        transport.send(&message)?;
        Ok(())
    }
}

/// Fire-and-forget notification dispatcher.
pub struct Notifier {
    mailer: Arc<dyn AlertMailer>,
    sounder: Arc<dyn Sounder>,
    /// Serializes persist-and-send; held across the whole mail session.
    gate: Arc<Mutex<()>>,
    runtime: tokio::runtime::Handle,
    capture_path: PathBuf,
}

impl Notifier {
    pub fn new(
        mailer: Arc<dyn AlertMailer>,
        sounder: Arc<dyn Sounder>,
        runtime: tokio::runtime::Handle,
        capture_path: PathBuf,
    ) -> Self {
        Self {
            mailer,
            sounder,
            gate: Arc::new(Mutex::new(())),
            runtime,
            capture_path,
        }
    }

    /// Queue one notification for the given frame and return immediately.
    ///
    /// The caller holds no handle to the task; once started it runs to
    /// completion (success or failure) even if a new episode begins.
    pub fn dispatch(&self, frame: Frame) {
        let mailer = Arc::clone(&self.mailer);
        let sounder = Arc::clone(&self.sounder);
        let gate = Arc::clone(&self.gate);
        let capture_path = self.capture_path.clone();

        self.runtime.spawn_blocking(move || {
            deliver(&frame, mailer.as_ref(), sounder.as_ref(), &gate, &capture_path);
        });
    }
}

/// Persist the frame and submit the alert, serialized by the gate.
/// Every failure is logged and absorbed; the monitor loop must keep
/// watching and alarming regardless of notification outcome.
fn deliver(
    frame: &Frame,
    mailer: &dyn AlertMailer,
    sounder: &dyn Sounder,
    gate: &Mutex<()>,
    capture_path: &std::path::Path,
) {
    let _session = gate.lock().unwrap_or_else(|e| e.into_inner());

    let jpeg = match frame.encode_jpeg() {
        Ok(jpeg) => jpeg,
        Err(e) => {
            tracing::warn!(error = %e, "failed to encode capture; dropping notification");
            return;
        }
    };

    if let Err(e) = std::fs::write(capture_path, &jpeg) {
        tracing::warn!(error = %e, path = %capture_path.display(), "failed to persist capture");
        return;
    }

    let attachment_name = capture_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "capture.jpg".to_string());

    let alert = Alert {
        attachment_name,
        jpeg,
    };

    match mailer.send(&alert) {
        Ok(()) => {
            tracing::info!(recipient_notified = true, "alert email sent");
            sounder.pulse(CONFIRM_TONE_HZ, CONFIRM_TONE);
        }
        Err(e) => {
            tracing::warn!(error = %e, "alert email failed; monitoring continues");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Instant;

    struct NullSounder {
        pulses: AtomicUsize,
    }

    impl NullSounder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                pulses: AtomicUsize::new(0),
            })
        }
    }

    impl Sounder for NullSounder {
        fn pulse(&self, _freq_hz: f32, _duration: Duration) {
            self.pulses.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Mailer that records sends and detects overlapping sessions.
    struct ProbeMailer {
        sends: AtomicUsize,
        in_flight: AtomicBool,
        overlapped: AtomicBool,
        fail: bool,
        hold: Duration,
    }

    impl ProbeMailer {
        fn new(fail: bool, hold: Duration) -> Arc<Self> {
            Arc::new(Self {
                sends: AtomicUsize::new(0),
                in_flight: AtomicBool::new(false),
                overlapped: AtomicBool::new(false),
                fail,
                hold,
            })
        }
    }

    impl AlertMailer for ProbeMailer {
        fn send(&self, _alert: &Alert) -> Result<(), NotifyError> {
            if self.in_flight.swap(true, Ordering::SeqCst) {
                self.overlapped.store(true, Ordering::SeqCst);
            }
            std::thread::sleep(self.hold);
            self.in_flight.store(false, Ordering::SeqCst);
            self.sends.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(NotifyError::Address(
                    "not an address".parse::<Mailbox>().unwrap_err(),
                ))
            } else {
                Ok(())
            }
        }
    }

    fn test_frame() -> Frame {
        Frame {
            data: vec![128u8; 8 * 8 * 3],
            width: 8,
            height: 8,
            timestamp: Instant::now(),
            sequence: 0,
        }
    }

    fn unique_capture_path(tag: &str) -> PathBuf {
        std::env::temp_dir().join(format!("vigil_test_{tag}_{}.jpg", std::process::id()))
    }

    fn wait_for(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_dispatch_sends_and_chirps() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mailer = ProbeMailer::new(false, Duration::ZERO);
        let sounder = NullSounder::new();
        let notifier = Notifier::new(
            mailer.clone(),
            sounder.clone(),
            runtime.handle().clone(),
            unique_capture_path("send"),
        );

        notifier.dispatch(test_frame());
        assert!(wait_for(Duration::from_secs(2), || {
            mailer.sends.load(Ordering::SeqCst) == 1
        }));
        assert_eq!(sounder.pulses.load(Ordering::SeqCst), 1, "one confirmation tone");
    }

    #[test]
    fn test_dispatch_persists_capture() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mailer = ProbeMailer::new(false, Duration::ZERO);
        let path = unique_capture_path("persist");
        let _ = std::fs::remove_file(&path);
        let notifier = Notifier::new(
            mailer.clone(),
            NullSounder::new(),
            runtime.handle().clone(),
            path.clone(),
        );

        notifier.dispatch(test_frame());
        assert!(wait_for(Duration::from_secs(2), || {
            mailer.sends.load(Ordering::SeqCst) == 1
        }));
        let bytes = std::fs::read(&path).expect("capture file written");
        assert_eq!(&bytes[..2], &[0xFF, 0xD8], "capture is a JPEG");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_failure_absorbed_and_no_chirp() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mailer = ProbeMailer::new(true, Duration::ZERO);
        let sounder = NullSounder::new();
        let notifier = Notifier::new(
            mailer.clone(),
            sounder.clone(),
            runtime.handle().clone(),
            unique_capture_path("fail"),
        );

        notifier.dispatch(test_frame());
        assert!(wait_for(Duration::from_secs(2), || {
            mailer.sends.load(Ordering::SeqCst) == 1
        }));
        assert_eq!(sounder.pulses.load(Ordering::SeqCst), 0, "no chirp on failure");

        // A later episode still goes through.
        notifier.dispatch(test_frame());
        assert!(wait_for(Duration::from_secs(2), || {
            mailer.sends.load(Ordering::SeqCst) == 2
        }));
    }

    #[test]
    fn test_gate_serializes_sessions() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let mailer = ProbeMailer::new(false, Duration::from_millis(100));
        let notifier = Notifier::new(
            mailer.clone(),
            NullSounder::new(),
            runtime.handle().clone(),
            unique_capture_path("gate"),
        );

        notifier.dispatch(test_frame());
        notifier.dispatch(test_frame());

        assert!(wait_for(Duration::from_secs(5), || {
            mailer.sends.load(Ordering::SeqCst) == 2
        }));
        assert!(
            !mailer.overlapped.load(Ordering::SeqCst),
            "second session must wait for the first to close"
        );
    }
}
