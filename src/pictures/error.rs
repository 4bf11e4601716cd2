use thiserror::Error;

/// Failures of the picture layer.
#[derive(Debug, Error)]
pub enum PictureError {
    /// The source could not be opened or decoded.
    #[error("failed to decode {path}: {cause:#}")]
    Decode { path: String, cause: anyhow::Error },

    /// The result could not be encoded or written.
    #[error("failed to write {path}: {cause:#}")]
    Encode { path: String, cause: anyhow::Error },

    /// Only right-angle rotations are supported.
    #[error("unsupported rotation of {0} degrees")]
    UnsupportedRotation(f32),

    #[error("cannot download {0}: unsupported protocol")]
    UnsupportedProtocol(String),

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("texture allocation of {width}x{height} failed")]
    Texture { width: u32, height: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PictureError {
    pub fn decode(path: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Decode {
            path: path.into(),
            cause,
        }
    }

    pub fn encode(path: impl Into<String>, cause: anyhow::Error) -> Self {
        Self::Encode {
            path: path.into(),
            cause,
        }
    }

    /// Stable numeric code reported when a conversion fails.
    pub fn code(&self) -> i32 {
        match self {
            Self::Decode { .. } => 2,
            Self::Encode { .. } => 3,
            Self::UnsupportedRotation(_) => 4,
            Self::UnsupportedProtocol(_) => 5,
            Self::Download { .. } => 6,
            Self::Texture { .. } => 7,
            Self::Io(_) => 8,
        }
    }
}
