//! Replays screenshots from disk as if they were live captures.

use std::fs;
use std::path::{Path, PathBuf};

use super::{Capture, Frame, FrameSource, SurfaceInfo};
use crate::error::{Result, ScanError};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "webp"];

/// Yields frames from a single image or from every image in a directory
/// (sorted by name). Once the list is exhausted the source reports
/// `Absent`, unless it loops.
pub struct ReplaySource {
    files: Vec<PathBuf>,
    next: usize,
    looping: bool,
}

impl ReplaySource {
    /// Builds a source from a file or a directory.
    pub fn open(path: &Path, looping: bool) -> Result<Self> {
        let files = if path.is_dir() {
            let mut files: Vec<PathBuf> = fs::read_dir(path)?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| {
                    p.extension()
                        .and_then(|e| e.to_str())
                        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
                        .unwrap_or(false)
                })
                .collect();
            files.sort();
            files
        } else {
            vec![path.to_path_buf()]
        };
        log::info!("Replay source: {} file(s) from {}", files.len(), path.display());
        Ok(Self {
            files,
            next: 0,
            looping,
        })
    }

    /// Number of files in the playlist.
    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

impl FrameSource for ReplaySource {
    fn capture(&mut self) -> Result<Capture> {
        if self.next >= self.files.len() {
            if !self.looping || self.files.is_empty() {
                return Ok(Capture::Absent);
            }
            self.next = 0;
        }
        let path = &self.files[self.next];
        self.next += 1;

        if !path.exists() {
            return Ok(Capture::Absent);
        }
        let image = image::open(path)
            .map_err(|e| ScanError::CaptureFailure(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        let surface = SurfaceInfo {
            width: image.width(),
            height: image.height(),
            minimized: false,
        };
        Ok(Capture::Frame {
            frame: Frame::new(image),
            surface,
        })
    }
}
