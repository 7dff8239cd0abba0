//! Control socket
//!
//! HTTP over a Unix domain socket. Handlers validate their input, hand a
//! [`RenderRequest`] to the shared context and answer with a one-line
//! confirmation or error.

use anyhow::{Context, Result};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::any;
use axum::Router;
use serde::Deserialize;
use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tokio::net::UnixListener;
use tracing::{error, info, warn};

use crate::app::AppContext;
use crate::error::RenderError;
use crate::render::{self, RenderRequest, TextRequest};
use crate::ui::text::Align;
use crate::ui::Color;

type Params = Vec<(String, String)>;

/// Largest accepted text size in pixels; glyph bitmaps grow with its square
const MAX_TEXT_SIZE: f32 = 240.0;

/// Error response for a failed command
#[derive(Debug)]
pub struct ApiError(RenderError);

impl From<RenderError> for ApiError {
    fn from(e: RenderError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = if self.0.is_client_error() {
            warn!("Rejected request: {}", self.0);
            StatusCode::BAD_REQUEST
        } else {
            error!("Request failed: {}", self.0);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, format!("{}\n", self.0)).into_response()
    }
}

type ApiResult = std::result::Result<String, ApiError>;

/// Build the command router
pub fn router(ctx: AppContext, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/rgb", any(set_color))
        .route("/image", any(draw_image))
        .route("/gif", any(draw_gif))
        .route("/text", any(draw_text))
        .route("/qr", any(draw_qr))
        .route("/stats/on", any(stats_on))
        .route("/exit", any(exit))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(ctx)
}

/// Bind the control socket, replacing any stale one, open to all local users
pub fn bind(path: &Path) -> Result<UnixListener> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            fs::set_permissions(dir, fs::Permissions::from_mode(0o755))
                .with_context(|| format!("Failed to set permissions on {}", dir.display()))?;
        }
    }

    match fs::remove_file(path) {
        Ok(()) => info!("Removed stale socket {}", path.display()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to remove {}", path.display()));
        }
    }

    let listener = UnixListener::bind(path)
        .with_context(|| format!("Could not listen on {}", path.display()))?;
    fs::set_permissions(path, fs::Permissions::from_mode(0o777))
        .with_context(|| format!("Failed to set permissions on {}", path.display()))?;

    info!("Listening on socket: {}", path.display());
    Ok(listener)
}

/// Serve until the context is cancelled
pub async fn serve(listener: UnixListener, ctx: AppContext, max_body_bytes: usize) -> Result<()> {
    let shutdown = ctx.shutdown.clone();
    axum::serve(listener, router(ctx, max_body_bytes))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("Could not start HTTP server")
}

#[derive(Debug, Deserialize)]
struct ColorBody {
    #[serde(rename = "R", alias = "r", default)]
    r: u8,
    #[serde(rename = "G", alias = "g", default)]
    g: u8,
    #[serde(rename = "B", alias = "b", default)]
    b: u8,
}

fn parse_color(body: &[u8]) -> Result<Color, RenderError> {
    serde_json::from_slice::<ColorBody>(body)
        .map(|c| Color::new(c.r, c.g, c.b))
        .map_err(|_| {
            RenderError::InvalidInput(
                "Requires json body with R, G, and B keys! Values must be 0-255".to_string(),
            )
        })
}

async fn set_color(State(ctx): State<AppContext>, body: Bytes) -> ApiResult {
    let color = parse_color(&body)?;
    ctx.foreground(RenderRequest::SolidColor(color)).await?;
    Ok(format!(
        "parsed color: R{} G{} B{}\nwrote to framebuffer!\n",
        color.r, color.g, color.b
    ))
}

fn require_body(body: &Bytes, what: &str) -> Result<(), RenderError> {
    if body.is_empty() {
        return Err(RenderError::InvalidInput(format!(
            "Requires {what} bytes in the request body"
        )));
    }
    Ok(())
}

async fn draw_image(State(ctx): State<AppContext>, body: Bytes) -> ApiResult {
    require_body(&body, "image")?;
    let image = render::blocking(move || render::decode_image(&body)).await?;
    ctx.foreground(RenderRequest::StaticImage(image)).await?;
    Ok("Image drawn\n".to_string())
}

async fn draw_gif(State(ctx): State<AppContext>, body: Bytes) -> ApiResult {
    require_body(&body, "GIF")?;
    let frames = render::blocking(move || render::decode_gif(&body)).await?;
    info!("Playing GIF with {} frames", frames.len());
    ctx.foreground(RenderRequest::AnimatedImage(frames)).await?;
    Ok("GIF drawn\n".to_string())
}

async fn draw_text(State(ctx): State<AppContext>, Query(params): Query<Params>) -> ApiResult {
    let request = text_request(&params)?;
    ctx.foreground(RenderRequest::Text(request)).await?;
    Ok("Text drawn\n".to_string())
}

async fn draw_qr(State(ctx): State<AppContext>, Query(params): Query<Params>) -> ApiResult {
    let content = qr_content(&params)?;
    ctx.foreground(RenderRequest::QrCode(content)).await?;
    info!("QR code printed to screen");
    Ok("QR code drawn\n".to_string())
}

async fn stats_on(State(ctx): State<AppContext>) -> &'static str {
    ctx.resume_status();
    "Stats on\n"
}

async fn exit(State(ctx): State<AppContext>) -> ApiResult {
    ctx.shutdown().await?;
    Ok("Shutting down\n".to_string())
}

fn first<'a>(params: &'a Params, key: &str) -> Option<&'a str> {
    params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
}

fn number(params: &Params, key: &str) -> Result<Option<f32>, RenderError> {
    first(params, key)
        .map(|v| match v.trim().parse::<f32>() {
            Ok(n) if n.is_finite() => Ok(n),
            _ => Err(RenderError::InvalidInput(format!("{key} must be a number (got '{v}')"))),
        })
        .transpose()
}

/// Text parameters with their defaults filled in
fn text_request(params: &Params) -> Result<TextRequest, RenderError> {
    let mut req = TextRequest::default();

    if let Some(content) = first(params, "content") {
        req.content = content.to_string();
    }
    if let Some(size) = number(params, "size")? {
        if size <= 0.0 || size > MAX_TEXT_SIZE {
            return Err(RenderError::InvalidInput(format!(
                "size must be between 0 and {MAX_TEXT_SIZE} (got {size})"
            )));
        }
        req.style.size = size;
    }
    if let Some(x) = number(params, "x")? {
        req.x = x;
    }
    if let Some(y) = number(params, "y")? {
        req.y = y;
    }
    if let Some(color) = first(params, "color") {
        req.style.color = Color::from_hex(color).ok_or_else(|| {
            RenderError::InvalidInput(format!("color must be RRGGBB hex (got '{color}')"))
        })?;
    }
    if let Some(bold) = first(params, "bold") {
        req.style.bold = match bold {
            "1" | "true" => true,
            "0" | "false" => false,
            other => {
                return Err(RenderError::InvalidInput(format!(
                    "bold must be true or false (got '{other}')"
                )))
            }
        };
    }
    if let Some(align) = first(params, "align") {
        req.style.align = align.parse::<Align>()?;
    }

    Ok(req)
}

/// All `content` values joined; at least one must be present
fn qr_content(params: &Params) -> Result<String, RenderError> {
    let values: Vec<&str> = params
        .iter()
        .filter(|(k, _)| k == "content")
        .map(|(_, v)| v.as_str())
        .collect();
    if values.is_empty() {
        return Err(RenderError::InvalidInput(
            "Pass ?content= to render a QR code".to_string(),
        ));
    }
    Ok(values.concat())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::DEFAULT_TEXT;
    use crate::ui::testing::RecordingSink;
    use crate::ui::text::testing::BlockFace;
    use std::sync::Arc;

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn context() -> (AppContext, Arc<RecordingSink>) {
        let sink = RecordingSink::new();
        (AppContext::new(sink.clone(), Arc::new(BlockFace)), sink)
    }

    #[test]
    fn text_defaults() {
        let req = text_request(&params(&[])).unwrap();
        assert_eq!(req.content, DEFAULT_TEXT);
        assert_eq!(req.style.size, 22.0);
        assert_eq!((req.x, req.y), (120.0, 120.0));
        assert_eq!(req.style.color, Color::BLACK);
        assert!(req.style.bold);
        assert_eq!(req.style.align, Align::Center);
    }

    #[test]
    fn text_overrides() {
        let req = text_request(&params(&[
            ("content", "hello"),
            ("size", "30"),
            ("x", "10"),
            ("y", "200"),
            ("color", "ff0000"),
            ("bold", "false"),
            ("align", "left"),
            ("content", "ignored"),
        ]))
        .unwrap();
        assert_eq!(req.content, "hello");
        assert_eq!(req.style.size, 30.0);
        assert_eq!((req.x, req.y), (10.0, 200.0));
        assert_eq!(req.style.color, Color::new(255, 0, 0));
        assert!(!req.style.bold);
        assert_eq!(req.style.align, Align::Left);
    }

    #[test]
    fn text_rejects_bad_numbers() {
        for (key, value) in [("size", "big"), ("x", "NaN"), ("y", ""), ("size", "0")] {
            let err = text_request(&params(&[(key, value)])).unwrap_err();
            assert!(err.is_client_error(), "{key}={value}");
        }
    }

    #[test]
    fn text_size_is_capped() {
        let err = text_request(&params(&[("size", "100000")])).unwrap_err();
        assert!(err.is_client_error());
        let req = text_request(&params(&[("size", "240")])).unwrap();
        assert_eq!(req.style.size, 240.0);
    }

    #[tokio::test]
    async fn oversized_text_is_rejected_without_drawing() {
        let (ctx, sink) = context();
        let query = Query(params(&[("content", "A"), ("size", "10000000")]));
        let err = draw_text(State(ctx.clone()), query).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(sink.count(), 0);
        assert!(!ctx.activity.is_active());
    }

    #[test]
    fn qr_content_is_joined() {
        let content = qr_content(&params(&[("content", "ab"), ("x", "1"), ("content", "cd")]));
        assert_eq!(content.unwrap(), "abcd");
        assert_eq!(qr_content(&params(&[("content", "")])).unwrap(), "");
    }

    #[test]
    fn color_body_parsing() {
        assert_eq!(parse_color(br#"{"R":1,"G":2,"B":3}"#).unwrap(), Color::new(1, 2, 3));
        assert_eq!(parse_color(br#"{"r":9}"#).unwrap(), Color::new(9, 0, 0));
        assert!(parse_color(br#"{"R":256}"#).is_err());
        assert!(parse_color(b"").is_err());
        assert!(parse_color(b"not json").is_err());
    }

    #[tokio::test]
    async fn qr_without_content_writes_nothing() {
        let (ctx, sink) = context();
        let result = draw_qr(State(ctx.clone()), Query(params(&[]))).await;
        let err = result.unwrap_err();
        assert!(err.0.is_client_error());
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(sink.count(), 0);
        assert!(!ctx.activity.is_active());
    }

    #[tokio::test]
    async fn qr_with_content_draws_and_suppresses_status() {
        let (ctx, sink) = context();
        let body = draw_qr(State(ctx.clone()), Query(params(&[("content", "hi")])))
            .await
            .unwrap();
        assert_eq!(body, "QR code drawn\n");
        assert_eq!(sink.last().unwrap().origin(), (30, 47));
        assert!(ctx.activity.is_active());
    }

    #[tokio::test]
    async fn set_color_confirms_values() {
        let (ctx, sink) = context();
        let body = set_color(State(ctx), Bytes::from_static(br#"{"R":10,"G":20,"B":30}"#))
            .await
            .unwrap();
        assert_eq!(body, "parsed color: R10 G20 B30\nwrote to framebuffer!\n");
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test]
    async fn bad_image_is_client_error() {
        let (ctx, sink) = context();
        let err = draw_image(State(ctx.clone()), Bytes::from_static(b"garbage"))
            .await
            .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(sink.count(), 0);

        let err = draw_gif(State(ctx), Bytes::new()).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn device_error_is_server_error() {
        let ctx = AppContext::new(RecordingSink::broken(), Arc::new(BlockFace));
        let err = draw_text(State(ctx), Query(params(&[]))).await.unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn stats_on_clears_flag() {
        let (ctx, _) = context();
        ctx.activity.activate();
        assert_eq!(stats_on(State(ctx.clone())).await, "Stats on\n");
        assert!(!ctx.activity.is_active());
    }

    #[tokio::test]
    async fn bind_replaces_stale_socket() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("run/pibox/framebuffer.sock");
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "stale").unwrap();

        let _listener = bind(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o777);
    }

    #[tokio::test]
    async fn bind_creates_socket_directory() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("missing/dir/fb.sock");
        let _listener = bind(&path).unwrap();
        assert!(path.exists());
    }
}
