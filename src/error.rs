//! Error taxonomy for render operations
//!
//! Every variant is scoped to a single operation: none of them takes the
//! process down. Startup code wraps these in `anyhow` with context instead.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RenderError {
    /// Malformed or missing caller input
    #[error("{0}")]
    InvalidInput(String),

    /// Payload could not be decoded into a bitmap
    #[error("decode failed: {0}")]
    Decode(String),

    /// Display device could not be opened, queried or written
    #[error("display device {}: {source}", path.display())]
    Device {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Display reports a pixel layout we cannot encode
    #[error("unsupported display format: {0}")]
    Unsupported(String),

    #[error("font error: {0}")]
    Font(String),

    /// Worker running the render died before finishing
    #[error("render task failed: {0}")]
    Task(String),
}

impl RenderError {
    pub fn device(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Device { path: path.into(), source }
    }

    /// True when the caller supplied something unusable
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Decode(_))
    }
}

impl From<image::ImageError> for RenderError {
    fn from(e: image::ImageError) -> Self {
        Self::Decode(e.to_string())
    }
}

impl From<qrcode::types::QrError> for RenderError {
    fn from(e: qrcode::types::QrError) -> Self {
        Self::Decode(e.to_string())
    }
}

pub type RenderResult<T> = std::result::Result<T, RenderError>;
