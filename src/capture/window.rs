//! Live capture of the game window.

use std::ffi::OsString;
use std::os::windows::ffi::OsStringExt;

use windows::Win32::Foundation::{CloseHandle, BOOL, HWND, LPARAM, POINT, RECT, TRUE};
use windows::Win32::Graphics::Gdi::ClientToScreen;
use windows::Win32::System::Threading::{
    OpenProcess, QueryFullProcessImageNameW, PROCESS_NAME_WIN32, PROCESS_QUERY_LIMITED_INFORMATION,
};
use windows::Win32::UI::WindowsAndMessaging::{
    EnumWindows, GetClientRect, GetWindowPlacement, GetWindowRect, GetWindowTextLengthW,
    GetWindowTextW, GetWindowThreadProcessId, IsIconic, IsWindowVisible, WINDOWPLACEMENT,
};

use super::{gdi, Capture, Frame, FrameSource, SurfaceInfo};
use crate::config::CaptureConfig;
use crate::error::{Result, ScanError};

fn window_title(hwnd: HWND) -> String {
    unsafe {
        let title_len = GetWindowTextLengthW(hwnd);
        if title_len <= 0 {
            return String::new();
        }
        let mut title_buf: Vec<u16> = vec![0; (title_len + 1) as usize];
        let copied = GetWindowTextW(hwnd, &mut title_buf);
        OsString::from_wide(&title_buf[..copied.max(0) as usize])
            .to_string_lossy()
            .to_string()
    }
}

/// Executable file name of the process owning `hwnd`.
fn process_name(hwnd: HWND) -> Option<String> {
    unsafe {
        let mut process_id: u32 = 0;
        GetWindowThreadProcessId(hwnd, Some(&mut process_id));
        if process_id == 0 {
            return None;
        }

        let process_handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, false, process_id).ok()?;
        let mut name_buf: Vec<u16> = vec![0; 1024];
        let mut len = name_buf.len() as u32;
        let result = QueryFullProcessImageNameW(
            process_handle,
            PROCESS_NAME_WIN32,
            windows::core::PWSTR(name_buf.as_mut_ptr()),
            &mut len,
        );
        let _ = CloseHandle(process_handle);

        if result.is_err() || len == 0 {
            return None;
        }
        let full_path = OsString::from_wide(&name_buf[..len as usize])
            .to_string_lossy()
            .to_string();
        full_path.rsplit('\\').next().map(str::to_string)
    }
}

/// Finds a visible top-level window whose title is exactly `title`.
///
/// When `process` is given and the owner's executable can be resolved, it must
/// match too (case-insensitive). This keeps out companion apps that reuse the
/// game's name in their own title.
pub fn find_window(title: &str, process: Option<&str>) -> Option<HWND> {
    struct EnumData<'a> {
        title: &'a str,
        process: Option<String>,
        hwnd: Option<HWND>,
    }

    unsafe extern "system" fn enum_callback(hwnd: HWND, lparam: LPARAM) -> BOOL {
        unsafe {
            let data = &mut *(lparam.0 as *mut EnumData);

            if !IsWindowVisible(hwnd).as_bool() {
                return TRUE;
            }
            if window_title(hwnd) != data.title {
                return TRUE;
            }
            if let (Some(wanted), Some(actual)) = (data.process.as_deref(), process_name(hwnd)) {
                if actual.to_lowercase() != wanted {
                    log::debug!("Skipping \"{}\" owned by {}", data.title, actual);
                    return TRUE;
                }
            }

            data.hwnd = Some(hwnd);
            BOOL(0) // Stop enumeration
        }
    }

    let mut data = EnumData {
        title,
        process: process.map(str::to_lowercase),
        hwnd: None,
    };
    unsafe {
        // EnumWindows reports an error when the callback stops it early
        let _ = EnumWindows(Some(enum_callback), LPARAM(&mut data as *mut _ as isize));
    }
    data.hwnd
}

/// Position and size of a window. Minimized windows report their restore
/// rectangle.
#[derive(Clone, Copy, Debug)]
struct WindowGeometry {
    left: i32,
    top: i32,
    width: i32,
    height: i32,
    minimized: bool,
}

fn window_geometry(hwnd: HWND) -> Result<WindowGeometry> {
    let mut rect = RECT::default();
    // Fails when the window closed after it was found
    unsafe { GetWindowRect(hwnd, &mut rect) }.map_err(|_| ScanError::SurfaceNotFound)?;
    let minimized = unsafe { IsIconic(hwnd) }.as_bool();

    if minimized {
        let mut placement = WINDOWPLACEMENT {
            length: std::mem::size_of::<WINDOWPLACEMENT>() as u32,
            ..Default::default()
        };
        if unsafe { GetWindowPlacement(hwnd, &mut placement) }.is_ok() {
            rect = placement.rcNormalPosition;
        }
    }

    Ok(WindowGeometry {
        left: rect.left,
        top: rect.top,
        width: rect.right - rect.left,
        height: rect.bottom - rect.top,
        minimized,
    })
}

/// Offset of the client area from the window's top-left corner, and its size.
fn client_area(hwnd: HWND) -> Result<(POINT, u32, u32)> {
    let mut client_rect = RECT::default();
    unsafe { GetClientRect(hwnd, &mut client_rect) }
        .map_err(|e| ScanError::CaptureFailure(format!("GetClientRect: {}", e)))?;

    let mut client_origin = POINT { x: 0, y: 0 };
    if !unsafe { ClientToScreen(hwnd, &mut client_origin) }.as_bool() {
        return Err(ScanError::CaptureFailure("ClientToScreen failed".into()));
    }

    let mut window_rect = RECT::default();
    unsafe { GetWindowRect(hwnd, &mut window_rect) }
        .map_err(|e| ScanError::CaptureFailure(format!("GetWindowRect: {}", e)))?;

    let offset = POINT {
        x: client_origin.x - window_rect.left,
        y: client_origin.y - window_rect.top,
    };
    let width = (client_rect.right - client_rect.left).max(0) as u32;
    let height = (client_rect.bottom - client_rect.top).max(0) as u32;
    Ok((offset, width, height))
}

/// Polls the game window. The window is looked up again on every capture, so
/// restarts of the game are picked up without any extra handling.
pub struct WindowSource {
    title: String,
    process: Option<String>,
    crop_to_client: bool,
}

impl WindowSource {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            title: config.window_title.clone(),
            process: config.process_name.clone(),
            crop_to_client: config.crop_to_client,
        }
    }
}

impl FrameSource for WindowSource {
    fn capture(&mut self) -> Result<Capture> {
        let Some(hwnd) = find_window(&self.title, self.process.as_deref()) else {
            return Ok(Capture::Absent);
        };
        let geometry = window_geometry(hwnd)?;
        if geometry.width <= 0 || geometry.height <= 0 {
            return Ok(Capture::Absent);
        }
        let (width, height) = (geometry.width as u32, geometry.height as u32);

        let mut image = match gdi::print_window(hwnd, width, height) {
            Ok(image) => image,
            Err(e) => {
                log::debug!("PrintWindow failed ({}), falling back to screen grab", e);
                gdi::grab_screen(geometry.left, geometry.top, width, height)?
            }
        };

        if self.crop_to_client && !geometry.minimized {
            let (offset, cw, ch) = client_area(hwnd)?;
            let x = (offset.x.max(0) as u32).min(width);
            let y = (offset.y.max(0) as u32).min(height);
            let cw = cw.min(width - x);
            let ch = ch.min(height - y);
            if cw > 0 && ch > 0 {
                image = image::imageops::crop_imm(&image, x, y, cw, ch).to_image();
            }
        }

        Ok(Capture::Frame {
            surface: SurfaceInfo {
                width,
                height,
                minimized: geometry.minimized,
            },
            frame: Frame::new(image),
        })
    }
}
