use thiserror::Error;

/// Microphone acquisition and capture failures.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("microphone access denied")]
    PermissionDenied,

    #[error("no usable microphone: {0}")]
    DeviceUnavailable(String),

    #[error("input stream error: {0}")]
    Stream(String),
}

/// Request/response failures against the search backend.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server returned {0}")]
    Status(reqwest::StatusCode),

    #[error("malformed response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

/// Failures on the streamed dataset download channel.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("download stream dropped: {0}")]
    Transport(String),

    #[error("malformed stream message: {0}")]
    Protocol(String),
}

/// Narration backend failures. Absorbed locally; narration is best-effort.
#[derive(Error, Debug)]
pub enum SynthesisError {
    #[error("failed to spawn synthesizer: {0}")]
    Spawn(String),

    #[error("synthesizer failed: {0}")]
    Backend(String),
}

/// Local speech-to-text failures.
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("model download failed: {0}")]
    Download(String),

    #[error("failed to load model: {0}")]
    ModelLoad(String),

    #[error("transcription failed: {0}")]
    Recognition(String),
}
