//! Audible tone output via `rodio`.

use rodio::source::{SineWave, Source};
use rodio::{OutputStream, Sink};
use std::time::Duration;

const TONE_AMPLITUDE: f32 = 0.6;

/// Emits a single audible pulse, blocking for its duration.
///
/// Implementations must absorb audio failures: the alarm loop has no
/// failure mode, so a missing or busy output device is logged and
/// treated as a silent pulse of the same length.
pub trait Sounder: Send + Sync {
    fn pulse(&self, freq_hz: f32, duration: Duration);
}

/// Default-output-device sounder.
///
/// Opens the output stream per pulse rather than holding it: the stream
/// handle is not `Send`, and reopening tolerates the device disappearing
/// between pulses (headset unplugged mid-alarm).
pub struct AudioSounder;

impl Sounder for AudioSounder {
    fn pulse(&self, freq_hz: f32, duration: Duration) {
        match OutputStream::try_default() {
            Ok((_stream, handle)) => match Sink::try_new(&handle) {
                Ok(sink) => {
                    sink.append(
                        SineWave::new(freq_hz)
                            .take_duration(duration)
                            .amplify(TONE_AMPLITUDE),
                    );
                    sink.sleep_until_end();
                }
                Err(e) => {
                    tracing::warn!(error = %e, "audio sink unavailable; skipping pulse");
                    std::thread::sleep(duration);
                }
            },
            Err(e) => {
                tracing::warn!(error = %e, "audio output unavailable; skipping pulse");
                std::thread::sleep(duration);
            }
        }
    }
}
