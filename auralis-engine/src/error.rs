use crate::tracks::TrackId;
use thiserror::Error;

/// Decoding failures. All three are fatal for the chunk being decoded;
/// only a missing track is fatal for the session.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unsupported format: {0}")]
    Unsupported(String),

    #[error("corrupt stream: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage failures. Reads degrade to a cache miss; writes are retried
/// once and then logged.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("storage corruption: {0}")]
    Corrupt(String),

    #[error("sidecar format error: {0}")]
    SidecarFormat(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A DSP invariant was violated mid-chunk (non-finite filter state).
#[derive(Debug, Error)]
#[error("non-finite samples after {stage} stage")]
pub struct DspError {
    pub stage: &'static str,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Dsp(#[from] DspError),

    #[error("track not found: {0}")]
    TrackMissing(TrackId),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl EngineError {
    /// Stable error-kind tag carried on control-channel error events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_error",
            Self::Store(_) => "store_error",
            Self::Dsp(_) => "dsp_error",
            Self::TrackMissing(_) => "track_missing",
            Self::Config(_) => "config_error",
            Self::Protocol(_) => "protocol_error",
        }
    }

    /// True when the session cannot continue (the source is gone, as
    /// opposed to one bad chunk).
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::TrackMissing(_))
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
