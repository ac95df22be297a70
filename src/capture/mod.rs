//! Frame acquisition.
//!
//! This module provides:
//! - The `FrameSource` trait the monitor polls
//! - `WindowSource` (Windows only): finds the game window and grabs its pixels
//! - `ReplaySource`: plays back screenshot files, on any platform

use chrono::{DateTime, Local};
use image::{ImageBuffer, Rgba, RgbaImage};

use crate::error::Result;

#[cfg(windows)]
mod gdi;
pub mod replay;
#[cfg(windows)]
pub mod window;

pub use replay::ReplaySource;
#[cfg(windows)]
pub use window::WindowSource;

/// One captured image. Read-only once created.
#[derive(Clone, Debug)]
pub struct Frame {
    pub image: RgbaImage,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbaImage) -> Self {
        Self {
            image,
            captured_at: Local::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Geometry and visibility of the captured surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub width: u32,
    pub height: u32,
    pub minimized: bool,
}

/// Outcome of one capture attempt.
#[derive(Debug)]
pub enum Capture {
    Frame { frame: Frame, surface: SurfaceInfo },
    /// The surface is not there right now (window closed, replay exhausted)
    Absent,
}

/// Anything the monitor can poll for frames.
pub trait FrameSource: Send {
    /// Grabs the current frame. Failures on a present surface are
    /// `ScanError::CaptureFailure`; a missing surface is `Capture::Absent`.
    fn capture(&mut self) -> Result<Capture>;
}

/// Converts a BGRA pixel buffer with `stride` bytes per row to RGBA.
///
/// Alpha is forced opaque: GDI leaves it undefined.
pub fn bgra_to_rgba(data: &[u8], width: u32, height: u32, stride: usize) -> RgbaImage {
    let mut img: RgbaImage = ImageBuffer::new(width, height);

    for y in 0..height {
        let row = y as usize * stride;
        for x in 0..width {
            let offset = row + x as usize * 4;
            let Some(px) = data.get(offset..offset + 4) else {
                return img;
            };
            // BGRA -> RGBA
            img.put_pixel(x, y, Rgba([px[2], px[1], px[0], 255]));
        }
    }

    img
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bgra_to_rgba() {
        // 2x2, stride padded to 12 bytes
        let data: Vec<u8> = vec![
            10, 20, 30, 0, 40, 50, 60, 0, 99, 99, 99, 99, //
            70, 80, 90, 0, 1, 2, 3, 0, 99, 99, 99, 99,
        ];
        let img = bgra_to_rgba(&data, 2, 2, 12);
        assert_eq!(*img.get_pixel(0, 0), Rgba([30, 20, 10, 255]));
        assert_eq!(*img.get_pixel(1, 0), Rgba([60, 50, 40, 255]));
        assert_eq!(*img.get_pixel(0, 1), Rgba([90, 80, 70, 255]));
        assert_eq!(*img.get_pixel(1, 1), Rgba([3, 2, 1, 255]));
    }

    #[test]
    fn test_bgra_short_buffer_does_not_panic() {
        let data = vec![1u8, 2, 3, 4];
        let img = bgra_to_rgba(&data, 2, 2, 8);
        assert_eq!(*img.get_pixel(0, 0), Rgba([3, 2, 1, 255]));
        assert_eq!(*img.get_pixel(1, 1), Rgba([0, 0, 0, 0]));
    }
}
