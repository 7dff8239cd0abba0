//! Shared application context
//!
//! One [`AppContext`] is created at startup and cloned into every request
//! handler and the status task. It carries the only long-lived mutable
//! state of the process: the activity flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::RenderResult;
use crate::render::{RenderRequest, Renderer, Trigger};
use crate::ui::text::Typeface;
use crate::ui::{Color, FrameSink};

/// Colour painted right before the process exits
pub const SHUTDOWN_COLOR: Color = Color::BLUE;

/// "A foreground command is in control of the screen."
///
/// Raised by every foreground render, cleared only by an explicit resume.
#[derive(Debug, Clone, Default)]
pub struct ActivityFlag(Arc<AtomicBool>);

impl ActivityFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the flag, returning whether it was already raised
    pub fn activate(&self) -> bool {
        self.0.swap(true, Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_active(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Main application context
#[derive(Clone)]
pub struct AppContext {
    pub renderer: Renderer,
    pub activity: ActivityFlag,
    pub shutdown: CancellationToken,
}

impl AppContext {
    /// Create a new context around a display sink and a typeface
    pub fn new(sink: Arc<dyn FrameSink>, face: Arc<dyn Typeface>) -> Self {
        let activity = ActivityFlag::new();
        Self {
            renderer: Renderer::new(sink, face, activity.clone()),
            activity,
            shutdown: CancellationToken::new(),
        }
    }

    /// Render an explicit request; suppresses the status task once visible
    pub async fn foreground(&self, request: RenderRequest) -> RenderResult<()> {
        self.renderer
            .render(request, Trigger::Foreground, &self.shutdown)
            .await
    }

    /// Hand the screen back to the status task
    pub fn resume_status(&self) {
        if self.activity.is_active() {
            info!("Status display resumed");
        }
        self.activity.clear();
    }

    /// Paint the shutdown colour and cancel all background work.
    ///
    /// Cancellation happens even when painting fails.
    pub async fn shutdown(&self) -> RenderResult<()> {
        info!("Received exit request, shutting down...");
        let painted = self.foreground(RenderRequest::SolidColor(SHUTDOWN_COLOR)).await;
        self.shutdown.cancel();
        painted
    }
}
