/// Result alias that carries the custom [`NeonRoomError`] type.
pub type Result<T> = std::result::Result<T, NeonRoomError>;

/// Common error type for the core crate.
///
/// Nothing on the per-frame update path returns one of these. They only
/// surface where the core touches the outside world: loading clips, models,
/// saved documents and scenario files.
#[derive(Debug, thiserror::Error)]
pub enum NeonRoomError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// A JSON document or payload could not be parsed.
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    /// A WAV clip could not be decoded.
    #[error("wav: {0}")]
    Wav(#[from] hound::Error),
    /// The spectral transform rejected its buffers.
    #[error("fft: {0}")]
    Fft(#[from] realfft::FftError),
    /// A model file referenced by a schema failed to load.
    #[error("failed to load model `{path}`: {reason}")]
    AssetLoad { path: String, reason: String },
    /// No usable audio source; audio reactivity stays disabled.
    #[error("audio unavailable: {0}")]
    AudioUnavailable(String),
    /// The caller handed the core something it cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
}

impl NeonRoomError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub fn asset_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AssetLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

impl From<&str> for NeonRoomError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for NeonRoomError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
