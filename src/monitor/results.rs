//! Per-pass result files.
//!
//! - `matches_live.json`: the latest pass, overwritten each time
//! - `matches.jsonl`: every pass, appended for crash safety
//! - `annotated_live.png`: the latest frame with slot boxes

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::capture::Frame;
use crate::config::OutputConfig;
use crate::detection::{annotate, DetectionResult};

pub const LIVE_FILE: &str = "matches_live.json";
pub const HISTORY_FILE: &str = "matches.jsonl";
pub const ANNOTATED_FILE: &str = "annotated_live.png";

#[derive(Serialize)]
struct LiveRecord<'a> {
    results: &'a [DetectionResult],
}

#[derive(Serialize)]
struct HistoryRecord<'a> {
    captured_at: String,
    results: &'a [DetectionResult],
}

/// Writes detection results under one output directory.
#[derive(Clone, Debug)]
pub struct ResultWriter {
    out_dir: PathBuf,
    write_results: bool,
    write_annotated: bool,
}

impl ResultWriter {
    pub fn new(out_dir: PathBuf, config: &OutputConfig) -> Self {
        Self {
            out_dir,
            write_results: config.write_results,
            write_annotated: config.write_annotated,
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Writes whatever outputs are enabled for one pass.
    pub fn write(&self, frame: &Frame, results: &[DetectionResult]) -> Result<()> {
        if !self.write_results && !self.write_annotated {
            return Ok(());
        }
        fs::create_dir_all(&self.out_dir).context("Failed to create output directory")?;

        if self.write_results {
            self.write_live(results)?;
            self.append_history(frame, results)?;
        }
        if self.write_annotated {
            let path = self.out_dir.join(ANNOTATED_FILE);
            annotate(&frame.image, results)
                .save(&path)
                .with_context(|| format!("Failed to save {}", path.display()))?;
        }
        Ok(())
    }

    fn write_live(&self, results: &[DetectionResult]) -> Result<()> {
        let path = self.out_dir.join(LIVE_FILE);
        let json = serde_json::to_string_pretty(&LiveRecord { results })
            .context("Failed to serialize results")?;
        fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Results written to {}", path.display());
        Ok(())
    }

    fn append_history(&self, frame: &Frame, results: &[DetectionResult]) -> Result<()> {
        let path = self.out_dir.join(HISTORY_FILE);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .context("Failed to open history for append")?;

        let line = serde_json::to_string(&HistoryRecord {
            captured_at: frame.captured_at.format("%Y-%m-%dT%H:%M:%S%.3f").to_string(),
            results,
        })
        .context("Failed to serialize results")?;
        writeln!(file, "{}", line).context("Failed to write history line")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::Rect;
    use crate::detection::RegionMetrics;
    use image::{ImageBuffer, Rgba, RgbaImage};
    use tempfile::tempdir;

    fn frame() -> Frame {
        let img: RgbaImage = ImageBuffer::from_pixel(64, 32, Rgba([0, 0, 0, 255]));
        Frame::new(img)
    }

    fn results() -> Vec<DetectionResult> {
        vec![
            DetectionResult {
                slot: 1,
                entity_id: Some("ras".to_string()),
                score: 14.0,
                is_suppressed: false,
                reason: None,
                roi: Rect::new(2, 2, 20, 20),
                belt: Some(Rect::new(22, 0, 12, 26)),
                metrics: RegionMetrics::default(),
            },
            DetectionResult {
                slot: 2,
                entity_id: None,
                score: 0.0,
                is_suppressed: true,
                reason: None,
                roi: Rect::new(36, 2, 20, 20),
                belt: None,
                metrics: RegionMetrics::default(),
            },
        ]
    }

    #[test]
    fn test_writes_live_record_and_image() {
        let dir = tempdir().unwrap();
        let writer = ResultWriter::new(dir.path().join("out"), &OutputConfig::default());
        writer.write(&frame(), &results()).unwrap();

        let live: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(dir.path().join("out").join(LIVE_FILE)).unwrap())
                .unwrap();
        let rows = live["results"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["entity"], "ras");
        assert_eq!(rows[1]["suppressed"], true);
        assert_eq!(rows[1]["entity"], serde_json::Value::Null);

        let annotated = image::open(dir.path().join("out").join(ANNOTATED_FILE)).unwrap();
        assert_eq!((annotated.width(), annotated.height()), (64, 32));
    }

    #[test]
    fn test_history_appends() {
        let dir = tempdir().unwrap();
        let writer = ResultWriter::new(dir.path().to_path_buf(), &OutputConfig::default());
        for _ in 0..3 {
            writer.write(&frame(), &results()).unwrap();
        }

        let content = fs::read_to_string(dir.path().join(HISTORY_FILE)).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert!(first["captured_at"].is_string());
        assert_eq!(first["results"][0]["slot"], 1);
    }

    #[test]
    fn test_disabled_outputs_write_nothing() {
        let dir = tempdir().unwrap();
        let config = OutputConfig {
            write_results: false,
            write_annotated: false,
            ..OutputConfig::default()
        };
        let writer = ResultWriter::new(dir.path().join("out"), &config);
        writer.write(&frame(), &results()).unwrap();
        assert!(!dir.path().join("out").exists());
    }
}
