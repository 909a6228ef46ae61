//! Configuration and credentials.
//!
//! Runtime settings come from `VIGIL_*` environment variables with
//! defaults, overridable by command-line flags. Mail credentials live in
//! a separate `KEY=value` file; a missing file or key is a fatal startup
//! error raised before any camera or model resource is touched.

use std::path::{Path, PathBuf};
use thiserror::Error;

const KEY_SENDER: &str = "SENDER_EMAIL";
const KEY_PASSWORD: &str = "EMAIL_PASSWORD";
const KEY_RECIPIENT: &str = "RECEIVER_EMAIL";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("credentials file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("credentials file: line {0} is not KEY=value")]
    Malformed(usize),
    #[error("credentials file: missing required key {0}")]
    MissingKey(&'static str),
}

/// Mail credentials, immutable for the process lifetime.
pub struct Credentials {
    pub sender: String,
    pub password: String,
    pub recipient: String,
}

impl Credentials {
    /// Load credentials from a plain `KEY=value` file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        parse_credentials(&contents)
    }
}

/// Parse credentials from `KEY=value` lines, skipping blanks and `#`
/// comments. Values split on the first `=` only.
fn parse_credentials(contents: &str) -> Result<Credentials, ConfigError> {
    let mut sender = None;
    let mut password = None;
    let mut recipient = None;

    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            return Err(ConfigError::Malformed(lineno + 1));
        };
        match key.trim() {
            KEY_SENDER => sender = Some(value.trim().to_string()),
            KEY_PASSWORD => password = Some(value.trim().to_string()),
            KEY_RECIPIENT => recipient = Some(value.trim().to_string()),
            other => {
                tracing::debug!(key = other, "ignoring unknown credentials key");
            }
        }
    }

    Ok(Credentials {
        sender: sender.ok_or(ConfigError::MissingKey(KEY_SENDER))?,
        password: password.ok_or(ConfigError::MissingKey(KEY_PASSWORD))?,
        recipient: recipient.ok_or(ConfigError::MissingKey(KEY_RECIPIENT))?,
    })
}

/// Monitor configuration, loaded from environment variables.
pub struct Config {
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Path to the pose model ONNX file.
    pub model_path: PathBuf,
    /// Path to the credentials file.
    pub credentials_path: PathBuf,
    /// Transient location for the captured frame attached to alerts.
    pub capture_path: PathBuf,
    /// Run without the preview window.
    pub headless: bool,
}

impl Config {
    /// Load configuration from `VIGIL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self {
            camera_device: std::env::var("VIGIL_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            model_path: std::env::var("VIGIL_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("models/movenet_lightning.onnx")),
            credentials_path: std::env::var("VIGIL_CREDENTIALS")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config.env")),
            capture_path: std::env::temp_dir().join("vigil_capture.jpg"),
            headless: std::env::var("VIGIL_HEADLESS")
                .map(|v| v != "0")
                .unwrap_or(false),
        }
    }
}
