//! The monitor loop.
//!
//! Polls the frame source at a fixed rate, feeds the gate, and when the draft
//! screen is confirmed hands the triggering frame to a background detection
//! thread so the gate keeps ticking. At most one detection runs at a time.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::capture::{Capture, Frame, FrameSource};
use crate::detection::{DetectionSummary, GateController, GateTransition};
use crate::engine::Engine;
use crate::error::ScanError;
use crate::monitor::events::{Event, EventSink};
use crate::monitor::results::ResultWriter;

/// Longest single sleep, so a stop request is noticed quickly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Last surface status reported, to avoid repeating it every cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceStatus {
    Found,
    Minimized,
    NotFound,
}

pub struct Monitor<S: FrameSource> {
    engine: Arc<Engine>,
    source: S,
    sink: Arc<dyn EventSink>,
    writer: Arc<ResultWriter>,
    stop: Arc<AtomicBool>,
    gate: GateController,
    last_status: Option<SurfaceStatus>,
    last_score_emit: Option<Instant>,
    pending: Option<JoinHandle<()>>,
    period: Duration,
    absent_poll: Duration,
    score_emit: Duration,
}

impl<S: FrameSource> Monitor<S> {
    pub fn new(
        engine: Arc<Engine>,
        source: S,
        sink: Arc<dyn EventSink>,
        writer: ResultWriter,
        stop: Arc<AtomicBool>,
    ) -> Self {
        let config = engine.config();
        let gate = GateController::new(&config.gate);
        let period = Duration::from_secs_f64(1.0 / config.gate.fps);
        let absent_poll = Duration::from_secs_f64(config.capture.absent_poll_secs.max(0.0));
        let score_emit = Duration::from_secs_f64(config.gate.score_emit_secs.max(0.0));

        Self {
            engine,
            source,
            sink,
            writer: Arc::new(writer),
            stop,
            gate,
            last_status: None,
            last_score_emit: None,
            pending: None,
            period,
            absent_poll,
            score_emit,
        }
    }

    /// Runs until the stop flag is set, then waits for any outstanding
    /// detection and emits `stopped`.
    pub fn run(mut self) {
        log::info!(
            "Monitor started ({:.1} fps, enter {:.2}, stay {:.2})",
            1.0 / self.period.as_secs_f64(),
            self.engine.config().gate.enter_threshold,
            self.engine.config().gate.stay_threshold
        );
        self.sink.emit(Event::Started);

        while !self.stop.load(Ordering::SeqCst) {
            let pause = self.cycle(Instant::now());
            self.sleep(pause);
        }

        self.finish();
    }

    /// One poll. Returns how long to sleep before the next one.
    fn cycle(&mut self, started: Instant) -> Duration {
        if self.gate.in_cooldown(started) {
            return self.period;
        }

        let capture = match self.source.capture() {
            Ok(capture) => capture,
            Err(ScanError::SurfaceNotFound) => Capture::Absent,
            Err(e) => {
                log::warn!("Capture failed: {}", e);
                self.sink.emit(Event::CaptureError { msg: e.to_string() });
                return self.period;
            }
        };

        let (frame, surface) = match capture {
            Capture::Frame { frame, surface } => (frame, surface),
            Capture::Absent => {
                if self.set_status(SurfaceStatus::NotFound) {
                    log::info!("Window not found");
                    self.sink.emit(Event::WindowNotFound);
                }
                self.gate.reset();
                return self.absent_poll;
            }
        };

        let (win_w, win_h) = (surface.width, surface.height);
        if surface.minimized {
            if self.set_status(SurfaceStatus::Minimized) {
                log::warn!("Window is minimized ({}x{})", win_w, win_h);
                self.sink.emit(Event::WindowMinimized { win_w, win_h });
            }
        } else if self.set_status(SurfaceStatus::Found) {
            log::info!("Window found ({}x{})", win_w, win_h);
            self.sink.emit(Event::WindowFound { win_w, win_h });
        }

        let score = self.engine.gate_score(&frame.image);
        let now = Instant::now();
        if self
            .last_score_emit
            .is_none_or(|last| now.duration_since(last) >= self.score_emit)
        {
            self.sink.emit(Event::gate_score(score, win_w, win_h));
            self.last_score_emit = Some(now);
        }

        match self.gate.update(score, now) {
            GateTransition::Entered => {
                log::info!("Gate triggered (score {:.3})", score);
                self.sink.emit(Event::Triggered);
                self.spawn_detection(frame);
            }
            GateTransition::Exited => {
                log::info!("Gate released (score {:.3}), cooling down", score);
            }
            GateTransition::Unchanged => {}
        }

        self.period.saturating_sub(started.elapsed())
    }

    /// Records a status; true when it differs from the last one.
    fn set_status(&mut self, status: SurfaceStatus) -> bool {
        let changed = self.last_status != Some(status);
        self.last_status = Some(status);
        changed
    }

    fn spawn_detection(&mut self, frame: Frame) {
        if let Some(handle) = &self.pending {
            if !handle.is_finished() {
                log::warn!("Previous detection still running; skipping this trigger");
                return;
            }
        }
        if let Some(handle) = self.pending.take() {
            let _ = handle.join();
        }

        let engine = Arc::clone(&self.engine);
        let sink = Arc::clone(&self.sink);
        let writer = Arc::clone(&self.writer);
        self.pending = Some(thread::spawn(move || {
            run_detection(&engine, &frame, &writer, sink.as_ref());
        }));
    }

    fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while !self.stop.load(Ordering::SeqCst) {
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                break;
            }
            thread::sleep(left.min(SLEEP_SLICE));
        }
    }

    fn finish(&mut self) {
        if let Some(handle) = self.pending.take() {
            log::info!("Waiting for detection to finish...");
            let _ = handle.join();
        }
        log::info!("Monitor stopped");
        self.sink.emit(Event::Stopped);
    }
}

/// Detection thread body: pass, result files, `detected` event.
fn run_detection(engine: &Engine, frame: &Frame, writer: &ResultWriter, sink: &dyn EventSink) {
    let started = Instant::now();
    let results = match catch_unwind(AssertUnwindSafe(|| engine.detect(&frame.image))) {
        Ok(results) => results,
        Err(panic) => {
            let msg = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "detection panicked".to_string());
            log::error!("Detection failed: {}", msg);
            sink.emit(Event::DetectionError { msg });
            return;
        }
    };
    log::info!(
        "Detection finished in {} ms ({} slots)",
        started.elapsed().as_millis(),
        results.len()
    );

    if let Err(e) = writer.write(frame, &results) {
        log::warn!("Failed to write results: {:#}", e);
    }

    let summary = DetectionSummary::from_results(&results, engine.config().output.max_clean);
    sink.emit(Event::Detected {
        clean: summary.clean,
        banned: summary.banned,
    });
}
