//! Display output
//!
//! Canvases are composed in memory and handed to a [`FrameSink`], which
//! owns the path to the physical panel.

pub mod canvas;
pub mod fb;
pub mod qr;
pub mod text;

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::RenderResult;

pub use canvas::{Canvas, Color, SCREEN_SIZE};

/// Trait for display outputs
pub trait FrameSink: Send + Sync {
    /// Write the pixels covered by `canvas` to the display.
    ///
    /// Each call is self-contained; nothing orders two commits issued by
    /// different callers.
    fn commit(&self, canvas: &Canvas) -> RenderResult<()>;
}

/// Create the sink for a framebuffer device node
pub fn create_sink(device: impl Into<PathBuf>) -> Arc<dyn FrameSink> {
    Arc::new(fb::FramebufferSink::new(device))
}
