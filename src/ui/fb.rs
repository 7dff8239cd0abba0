//! Linux framebuffer sink

use std::fs::{File, OpenOptions};
use std::os::unix::fs::FileExt;
use std::os::unix::io::AsRawFd;
use std::path::PathBuf;
use tracing::debug;

use super::{Canvas, FrameSink};
use crate::error::{RenderError, RenderResult};

const FBIOGET_VSCREENINFO: libc::c_ulong = 0x4600;
const FBIOGET_FSCREENINFO: libc::c_ulong = 0x4602;

/// Linux framebuffer fixed screen info
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FbFixScreeninfo {
    id: [u8; 16],
    smem_start: libc::c_ulong,
    smem_len: u32,
    type_: u32,
    type_aux: u32,
    visual: u32,
    xpanstep: u16,
    ypanstep: u16,
    ywrapstep: u16,
    line_length: u32,
    mmio_start: libc::c_ulong,
    mmio_len: u32,
    accel: u32,
    capabilities: u16,
    reserved: [u16; 2],
}

/// Linux framebuffer variable screen info
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FbVarScreeninfo {
    xres: u32,
    yres: u32,
    xres_virtual: u32,
    yres_virtual: u32,
    xoffset: u32,
    yoffset: u32,
    bits_per_pixel: u32,
    grayscale: u32,
    red: FbBitfield,
    green: FbBitfield,
    blue: FbBitfield,
    transp: FbBitfield,
    nonstd: u32,
    activate: u32,
    height: u32,
    width: u32,
    accel_flags: u32,
    pixclock: u32,
    left_margin: u32,
    right_margin: u32,
    upper_margin: u32,
    lower_margin: u32,
    hsync_len: u32,
    vsync_len: u32,
    sync: u32,
    vmode: u32,
    rotate: u32,
    colorspace: u32,
    reserved: [u32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FbBitfield {
    offset: u32,
    length: u32,
    msb_right: u32,
}

nix::ioctl_read_bad!(fbioget_vscreeninfo, FBIOGET_VSCREENINFO, FbVarScreeninfo);
nix::ioctl_read_bad!(fbioget_fscreeninfo, FBIOGET_FSCREENINFO, FbFixScreeninfo);

/// Visible geometry and memory layout of a framebuffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u32,
    pub line_length: u32,
}

impl ScreenGeometry {
    fn query(file: &File) -> std::io::Result<Self> {
        let fd = file.as_raw_fd();

        let mut vinfo: FbVarScreeninfo = unsafe { std::mem::zeroed() };
        unsafe { fbioget_vscreeninfo(fd, &mut vinfo) }?;

        let mut finfo: FbFixScreeninfo = unsafe { std::mem::zeroed() };
        unsafe { fbioget_fscreeninfo(fd, &mut finfo) }?;

        Ok(Self {
            width: vinfo.xres,
            height: vinfo.yres,
            bits_per_pixel: vinfo.bits_per_pixel,
            line_length: finfo.line_length,
        })
    }

    fn bytes_per_pixel(&self) -> RenderResult<usize> {
        match self.bits_per_pixel {
            16 => Ok(2),
            24 => Ok(3),
            32 => Ok(4),
            other => Err(RenderError::Unsupported(format!("{other} bits per pixel"))),
        }
    }
}

/// Framebuffer sink; opens the device for every commit
pub struct FramebufferSink {
    path: PathBuf,
}

impl FramebufferSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl FrameSink for FramebufferSink {
    fn commit(&self, canvas: &Canvas) -> RenderResult<()> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.path)
            .map_err(|e| RenderError::device(&self.path, e))?;

        let geometry =
            ScreenGeometry::query(&file).map_err(|e| RenderError::device(&self.path, e))?;

        write_canvas(&file, &geometry, canvas).map_err(|e| match e {
            WriteError::Io(e) => RenderError::device(&self.path, e),
            WriteError::Render(e) => e,
        })?;

        debug!(
            "Committed {}x{} at {:?} to {}",
            canvas.width(),
            canvas.height(),
            canvas.origin(),
            self.path.display()
        );
        Ok(())
    }
}

enum WriteError {
    Io(std::io::Error),
    Render(RenderError),
}

/// Write the visible part of `canvas` row by row at its screen position
fn write_canvas(
    file: &File,
    geometry: &ScreenGeometry,
    canvas: &Canvas,
) -> Result<(), WriteError> {
    let bpp = geometry.bytes_per_pixel().map_err(WriteError::Render)?;
    let (ox, oy) = canvas.origin();
    if ox >= geometry.width || oy >= geometry.height {
        return Ok(());
    }

    let cols = canvas.width().min(geometry.width - ox);
    let rows = canvas.height().min(geometry.height - oy);
    let mut row = Vec::with_capacity(cols as usize * bpp);

    for y in 0..rows {
        row.clear();
        for x in 0..cols {
            let px = canvas.pixels().get_pixel(x, y);
            encode_pixel(&mut row, bpp, px[0], px[1], px[2]);
        }
        let offset = (oy + y) as u64 * geometry.line_length as u64 + ox as u64 * bpp as u64;
        file.write_all_at(&row, offset).map_err(WriteError::Io)?;
    }

    Ok(())
}

fn encode_pixel(out: &mut Vec<u8>, bytes_per_pixel: usize, r: u8, g: u8, b: u8) {
    match bytes_per_pixel {
        4 => out.extend_from_slice(&[b, g, r, 255]),
        3 => out.extend_from_slice(&[b, g, r]),
        _ => {
            // RGB565
            let rgb565 =
                ((r as u16 & 0xF8) << 8) | ((g as u16 & 0xFC) << 3) | ((b as u16 & 0xF8) >> 3);
            out.extend_from_slice(&rgb565.to_le_bytes());
        }
    }
}
