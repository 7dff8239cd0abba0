//! QR code rasterization

use image::{Rgb, RgbImage};
use qrcode::{EcLevel, QrCode};

use super::Canvas;
use crate::error::RenderResult;

/// Top-left corner of the QR area on screen
pub const QR_ORIGIN: (u32, u32) = (30, 47);
/// Edge length of the QR area in pixels
pub const QR_SIZE: u32 = 180;

/// Encode `content` and place it in the fixed QR area
pub fn qr_canvas(content: &str) -> RenderResult<Canvas> {
    let code = QrCode::with_error_correction_level(content.as_bytes(), EcLevel::L)?;
    Ok(Canvas::placed(QR_ORIGIN, rasterize(&code, QR_SIZE)))
}

/// Map every output pixel to its nearest module, without a quiet zone.
///
/// Codes with more modules than `size` are drawn one pixel per module and
/// cropped to `size`.
fn rasterize(code: &QrCode, size: u32) -> RgbImage {
    let modules = code.width();
    let colors = code.to_colors();
    let scale = size.max(modules as u32);
    let modules_per_pixel = modules as f64 / scale as f64;

    RgbImage::from_fn(size, size, |x, y| {
        let mx = (x as f64 * modules_per_pixel) as usize;
        let my = (y as f64 * modules_per_pixel) as usize;
        match colors[my * modules + mx] {
            qrcode::Color::Dark => Rgb([0, 0, 0]),
            qrcode::Color::Light => Rgb([255, 255, 255]),
        }
    })
}
