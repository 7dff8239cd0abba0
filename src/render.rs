//! Surface rendering
//!
//! Turns a [`RenderRequest`] into one or more canvases and commits them to
//! the frame sink. Composition and device writes run on the blocking pool;
//! animation delays are async sleeps that give up on cancellation.

use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, ImageDecoder, Limits, RgbImage};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::app::ActivityFlag;
use crate::error::{RenderError, RenderResult};
use crate::platform::metrics::StatsSample;
use crate::status;
use crate::ui::text::{self, TextStyle, Typeface};
use crate::ui::{qr, Canvas, Color, FrameSink, SCREEN_SIZE};

/// Placeholder shown when a text request carries no content
pub const DEFAULT_TEXT: &str = "no content param";
pub const DEFAULT_TEXT_SIZE: f32 = 22.0;

/// Milliseconds of playback per hundredth of a second of GIF delay
const MS_PER_DELAY_UNIT: u64 = 3;

/// Largest GIF logical screen edge accepted for decoding
const MAX_GIF_SIDE: u32 = 2048;
/// Upper bound on the decoded size of all frames of one GIF
const MAX_GIF_DECODED_BYTES: usize = 256 * 1024 * 1024;

/// One frame of an animation and how long it stays up
#[derive(Debug, Clone)]
pub struct AnimationFrame {
    pub canvas: Canvas,
    /// Delay in hundredths of a second, as stored in the GIF
    pub delay_cs: u32,
}

impl AnimationFrame {
    pub fn hold(&self) -> Duration {
        Duration::from_millis(self.delay_cs as u64 * MS_PER_DELAY_UNIT)
    }
}

/// Text block anchored by its centre
#[derive(Debug, Clone, PartialEq)]
pub struct TextRequest {
    pub content: String,
    pub x: f32,
    pub y: f32,
    pub style: TextStyle,
}

impl Default for TextRequest {
    fn default() -> Self {
        let center = SCREEN_SIZE as f32 / 2.0;
        Self {
            content: DEFAULT_TEXT.to_string(),
            x: center,
            y: center,
            style: TextStyle::new(DEFAULT_TEXT_SIZE, Color::BLACK, true),
        }
    }
}

/// Everything the screen can be asked to show
#[derive(Debug, Clone)]
pub enum RenderRequest {
    SolidColor(Color),
    StaticImage(RgbImage),
    AnimatedImage(Vec<AnimationFrame>),
    Text(TextRequest),
    QrCode(String),
    StatsOverlay(StatsSample),
}

impl RenderRequest {
    fn kind(&self) -> &'static str {
        match self {
            RenderRequest::SolidColor(_) => "solid color",
            RenderRequest::StaticImage(_) => "image",
            RenderRequest::AnimatedImage(_) => "animation",
            RenderRequest::Text(_) => "text",
            RenderRequest::QrCode(_) => "QR code",
            RenderRequest::StatsOverlay(_) => "stats",
        }
    }
}

/// Who asked for a render
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// An explicit command; takes the screen from the status task
    Foreground,
    /// Status task or startup splash
    Background,
}

#[derive(Clone)]
pub struct Renderer {
    sink: Arc<dyn FrameSink>,
    face: Arc<dyn Typeface>,
    activity: ActivityFlag,
}

impl Renderer {
    pub fn new(sink: Arc<dyn FrameSink>, face: Arc<dyn Typeface>, activity: ActivityFlag) -> Self {
        Self { sink, face, activity }
    }

    /// Render `request` and commit it.
    ///
    /// A foreground render raises the activity flag once its first canvas
    /// has reached the display.
    pub async fn render(
        &self,
        request: RenderRequest,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> RenderResult<()> {
        debug!("Rendering {} ({:?})", request.kind(), trigger);
        match request {
            RenderRequest::AnimatedImage(frames) => self.play(frames, trigger, cancel).await,
            other => {
                let this = self.clone();
                blocking(move || {
                    let canvas = this.compose(&other)?;
                    this.sink.commit(&canvas)
                })
                .await?;
                self.mark(trigger);
                Ok(())
            }
        }
    }

    /// Startup splash: optional background image with a status line
    pub async fn splash(&self, background: Option<RgbImage>) -> RenderResult<()> {
        let this = self.clone();
        blocking(move || {
            let mut canvas = Canvas::filled(Color::BACKGROUND);
            if let Some(image) = &background {
                canvas.copy_from(image);
            }
            let style = TextStyle::new(20.0, Color::new(100, 100, 100), true);
            text::draw_wrapped(
                &mut canvas,
                this.face.as_ref(),
                "starting services",
                120.0,
                210.0,
                SCREEN_SIZE as f32,
                &style,
            );
            this.sink.commit(&canvas)
        })
        .await
    }

    /// Build the canvas for a single-frame request
    fn compose(&self, request: &RenderRequest) -> RenderResult<Canvas> {
        match request {
            RenderRequest::SolidColor(color) => Ok(Canvas::filled(*color)),
            RenderRequest::StaticImage(image) => Ok(Canvas::placed((0, 0), image.clone())),
            RenderRequest::Text(req) => Ok(self.text_canvas(req)),
            RenderRequest::QrCode(content) => qr::qr_canvas(content),
            RenderRequest::StatsOverlay(sample) => {
                Ok(status::stats_canvas(self.face.as_ref(), sample))
            }
            RenderRequest::AnimatedImage(_) => Err(RenderError::InvalidInput(
                "animations are played, not composed".to_string(),
            )),
        }
    }

    fn text_canvas(&self, req: &TextRequest) -> Canvas {
        let mut canvas = Canvas::filled(Color::BACKGROUND);
        text::draw_wrapped(
            &mut canvas,
            self.face.as_ref(),
            &req.content,
            req.x,
            req.y,
            SCREEN_SIZE as f32,
            &req.style,
        );
        canvas
    }

    /// Commit frames in order, holding each for its delay.
    ///
    /// Other commits may land between frames. Cancellation stops playback
    /// after the frame currently on screen.
    async fn play(
        &self,
        frames: Vec<AnimationFrame>,
        trigger: Trigger,
        cancel: &CancellationToken,
    ) -> RenderResult<()> {
        let total = frames.len();
        for (i, frame) in frames.into_iter().enumerate() {
            let hold = frame.hold();
            let sink = Arc::clone(&self.sink);
            blocking(move || sink.commit(&frame.canvas)).await?;
            if i == 0 {
                self.mark(trigger);
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Animation cancelled after frame {}/{}", i + 1, total);
                    break;
                }
                _ = tokio::time::sleep(hold) => {}
            }
        }
        Ok(())
    }

    fn mark(&self, trigger: Trigger) {
        if trigger == Trigger::Foreground && !self.activity.activate() {
            debug!("Foreground took over the display");
        }
    }
}

/// Decode a still image in any supported format
pub fn decode_image(bytes: &[u8]) -> RenderResult<RgbImage> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Decode every frame of a GIF, composited to full size.
///
/// The header controls the allocation size, so the screen dimensions and
/// the total decoded size are bounded before and during decoding.
pub fn decode_gif(bytes: &[u8]) -> RenderResult<Vec<AnimationFrame>> {
    let mut decoder = GifDecoder::new(Cursor::new(bytes))?;
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_GIF_SIDE);
    limits.max_image_height = Some(MAX_GIF_SIDE);
    decoder.set_limits(limits)?;

    let mut frames = Vec::new();
    let mut decoded = 0usize;
    for frame in decoder.into_frames() {
        let frame = frame?;
        let (numer, denom) = frame.delay().numer_denom_ms();
        let delay_ms = numer as f64 / denom.max(1) as f64;
        let pixels = DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8();

        decoded += pixels.as_raw().len();
        if decoded > MAX_GIF_DECODED_BYTES {
            return Err(RenderError::Decode(format!(
                "GIF expands to more than {} MiB",
                MAX_GIF_DECODED_BYTES / (1024 * 1024)
            )));
        }
        frames.push(AnimationFrame {
            canvas: Canvas::placed((0, 0), pixels),
            delay_cs: (delay_ms / 10.0).round() as u32,
        });
    }

    if frames.is_empty() {
        return Err(RenderError::Decode("GIF contains no frames".to_string()));
    }
    Ok(frames)
}

/// Run `f` on the blocking pool
pub async fn blocking<T, F>(f: F) -> RenderResult<T>
where
    F: FnOnce() -> RenderResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| RenderError::Task(e.to_string()))?
}
