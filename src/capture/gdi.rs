//! GDI pixel grabs with every handle owned by a guard.

use image::RgbaImage;

use windows::Win32::Foundation::HWND;
use windows::Win32::Graphics::Gdi::{
    BitBlt, CreateCompatibleBitmap, CreateCompatibleDC, DeleteDC, DeleteObject, GetDC, GetDIBits,
    GetWindowDC, ReleaseDC, SelectObject, BITMAPINFO, BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
    HBITMAP, HDC, HGDIOBJ, SRCCOPY,
};
use windows::Win32::Storage::Xps::{PrintWindow, PRINT_WINDOW_FLAGS};

use super::bgra_to_rgba;
use crate::error::{Result, ScanError};

/// Renders DWM-composited content, so covered windows still capture.
const PW_RENDERFULLCONTENT: PRINT_WINDOW_FLAGS = PRINT_WINDOW_FLAGS(2);

fn failure(what: &str) -> ScanError {
    ScanError::CaptureFailure(what.to_string())
}

/// A DC obtained with `GetWindowDC`/`GetDC`, released on drop.
struct WindowDc {
    hwnd: HWND,
    hdc: HDC,
}

impl WindowDc {
    fn window(hwnd: HWND) -> Result<Self> {
        let hdc = unsafe { GetWindowDC(hwnd) };
        if hdc.is_invalid() {
            return Err(failure("GetWindowDC failed"));
        }
        Ok(Self { hwnd, hdc })
    }

    /// DC of the whole virtual screen.
    fn screen() -> Result<Self> {
        let hwnd = HWND::default();
        let hdc = unsafe { GetDC(hwnd) };
        if hdc.is_invalid() {
            return Err(failure("GetDC(screen) failed"));
        }
        Ok(Self { hwnd, hdc })
    }
}

impl Drop for WindowDc {
    fn drop(&mut self) {
        unsafe {
            ReleaseDC(self.hwnd, self.hdc);
        }
    }
}

/// Memory DC from `CreateCompatibleDC`, deleted on drop.
struct MemoryDc(HDC);

impl MemoryDc {
    fn compatible_with(hdc: HDC) -> Result<Self> {
        let mem = unsafe { CreateCompatibleDC(hdc) };
        if mem.is_invalid() {
            return Err(failure("CreateCompatibleDC failed"));
        }
        Ok(Self(mem))
    }
}

impl Drop for MemoryDc {
    fn drop(&mut self) {
        unsafe {
            let _ = DeleteDC(self.0);
        }
    }
}

/// Device-dependent bitmap, deleted on drop.
struct Bitmap(HBITMAP);

impl Bitmap {
    fn compatible_with(hdc: HDC, width: u32, height: u32) -> Result<Self> {
        let bitmap = unsafe { CreateCompatibleBitmap(hdc, width as i32, height as i32) };
        if bitmap.is_invalid() {
            return Err(failure("CreateCompatibleBitmap failed"));
        }
        Ok(Self(bitmap))
    }

    fn as_object(&self) -> HGDIOBJ {
        HGDIOBJ(self.0 .0)
    }
}

impl Drop for Bitmap {
    fn drop(&mut self) {
        unsafe {
            let _ = DeleteObject(self.as_object());
        }
    }
}

/// Selects an object into a DC and restores the previous one on drop.
struct Selection {
    hdc: HDC,
    previous: HGDIOBJ,
}

impl Selection {
    fn select(hdc: HDC, object: HGDIOBJ) -> Result<Self> {
        let previous = unsafe { SelectObject(hdc, object) };
        if previous.is_invalid() {
            return Err(failure("SelectObject failed"));
        }
        Ok(Self { hdc, previous })
    }
}

impl Drop for Selection {
    fn drop(&mut self) {
        unsafe {
            SelectObject(self.hdc, self.previous);
        }
    }
}

/// Copies a bitmap's pixels out as RGBA. The bitmap must not be selected
/// into any DC.
fn read_bitmap(hdc: HDC, bitmap: &Bitmap, width: u32, height: u32) -> Result<RgbaImage> {
    let mut info = BITMAPINFO {
        bmiHeader: BITMAPINFOHEADER {
            biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
            biWidth: width as i32,
            // Negative height = top-down rows
            biHeight: -(height as i32),
            biPlanes: 1,
            biBitCount: 32,
            biCompression: BI_RGB.0,
            ..Default::default()
        },
        ..Default::default()
    };
    let stride = width as usize * 4;
    let mut buffer = vec![0u8; stride * height as usize];

    let lines = unsafe {
        GetDIBits(
            hdc,
            bitmap.0,
            0,
            height,
            Some(buffer.as_mut_ptr().cast()),
            &mut info,
            DIB_RGB_COLORS,
        )
    };
    if lines != height as i32 {
        return Err(failure("GetDIBits failed"));
    }

    Ok(bgra_to_rgba(&buffer, width, height, stride))
}

/// Renders a window into an offscreen bitmap with `PrintWindow`.
pub fn print_window(hwnd: HWND, width: u32, height: u32) -> Result<RgbaImage> {
    let window_dc = WindowDc::window(hwnd)?;
    let mem_dc = MemoryDc::compatible_with(window_dc.hdc)?;
    let bitmap = Bitmap::compatible_with(window_dc.hdc, width, height)?;

    {
        let _selection = Selection::select(mem_dc.0, bitmap.as_object())?;
        let ok = unsafe { PrintWindow(hwnd, mem_dc.0, PW_RENDERFULLCONTENT) };
        if !ok.as_bool() {
            return Err(failure("PrintWindow returned 0"));
        }
    }

    read_bitmap(mem_dc.0, &bitmap, width, height)
}

/// Copies a rectangle of the visible screen. Only sees what is on top.
pub fn grab_screen(left: i32, top: i32, width: u32, height: u32) -> Result<RgbaImage> {
    let screen_dc = WindowDc::screen()?;
    let mem_dc = MemoryDc::compatible_with(screen_dc.hdc)?;
    let bitmap = Bitmap::compatible_with(screen_dc.hdc, width, height)?;

    {
        let _selection = Selection::select(mem_dc.0, bitmap.as_object())?;
        unsafe {
            BitBlt(
                mem_dc.0,
                0,
                0,
                width as i32,
                height as i32,
                screen_dc.hdc,
                left,
                top,
                SRCCOPY,
            )
        }
        .map_err(|e| ScanError::CaptureFailure(format!("BitBlt failed: {}", e)))?;
    }

    read_bitmap(mem_dc.0, &bitmap, width, height)
}
