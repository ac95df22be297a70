//! Status events emitted by the monitor.
//!
//! Consumers (the desktop app, a test harness) read one JSON object per line,
//! tagged by `status`. Sinks decide where the events go: stdout for the live
//! binary, a channel for tests and embedders.

use std::io::{self, Write};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Event {
    Started,
    WindowFound {
        win_w: u32,
        win_h: u32,
    },
    /// Still captured, but the user should restore the window
    WindowMinimized {
        win_w: u32,
        win_h: u32,
    },
    WindowNotFound,
    Triggered,
    Detected {
        clean: Vec<String>,
        banned: Option<String>,
    },
    /// Periodic gate reading for diagnostics
    GateScore {
        score: f32,
        win_w: u32,
        win_h: u32,
    },
    CaptureError {
        msg: String,
    },
    DetectionError {
        msg: String,
    },
    /// Startup failure; the monitor does not run
    Error {
        msg: String,
    },
    Stopped,
}

impl Event {
    /// Gate score rounded to three decimals.
    pub fn gate_score(score: f32, win_w: u32, win_h: u32) -> Self {
        Event::GateScore {
            score: (score * 1000.0).round() / 1000.0,
            win_w,
            win_h,
        }
    }
}

/// Destination for events. Shared between the poll loop and detection threads.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: Event);
}

/// Writes each event as one flushed JSON line.
pub struct JsonLinesSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Gives the writer back (tests inspect what was written).
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(w) => w,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl JsonLinesSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> EventSink for JsonLinesSink<W> {
    fn emit(&self, event: Event) {
        log::debug!("Event: {:?}", event);
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(e) => {
                log::error!("Failed to serialize event {:?}: {}", event, e);
                return;
            }
        };
        let Ok(mut writer) = self.writer.lock() else {
            log::error!("Event writer lock poisoned");
            return;
        };
        if let Err(e) = writeln!(writer, "{}", line).and_then(|_| writer.flush()) {
            log::warn!("Failed to write event: {}", e);
        }
    }
}

/// Forwards events over an mpsc channel.
pub struct ChannelSink {
    sender: Sender<Event>,
}

impl EventSink for ChannelSink {
    fn emit(&self, event: Event) {
        log::debug!("Event: {:?}", event);
        // Receiver gone means nobody is listening any more
        let _ = self.sender.send(event);
    }
}

/// Creates a channel sink and the receiver for its events.
pub fn event_channel() -> (ChannelSink, Receiver<Event>) {
    let (sender, receiver) = channel();
    (ChannelSink { sender }, receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn to_json(event: &Event) -> serde_json::Value {
        serde_json::to_value(event).unwrap()
    }

    #[test]
    fn test_unit_events_carry_only_status() {
        assert_eq!(to_json(&Event::Started), json!({"status": "started"}));
        assert_eq!(to_json(&Event::WindowNotFound), json!({"status": "window_not_found"}));
        assert_eq!(to_json(&Event::Stopped), json!({"status": "stopped"}));
    }

    #[test]
    fn test_detected_event_shape() {
        let event = Event::Detected {
            clean: vec!["ras".to_string(), "mercedes".to_string()],
            banned: None,
        };
        assert_eq!(
            to_json(&event),
            json!({"status": "detected", "clean": ["ras", "mercedes"], "banned": null})
        );
    }

    #[test]
    fn test_window_events_carry_size() {
        assert_eq!(
            to_json(&Event::WindowMinimized { win_w: 1280, win_h: 720 }),
            json!({"status": "window_minimized", "win_w": 1280, "win_h": 720})
        );
    }

    #[test]
    fn test_gate_score_is_rounded() {
        let event = Event::gate_score(0.834567, 1920, 1080);
        assert_eq!(
            event,
            Event::GateScore {
                score: 0.835,
                win_w: 1920,
                win_h: 1080
            }
        );
    }

    #[test]
    fn test_json_lines_sink_writes_one_line_per_event() {
        let sink = JsonLinesSink::new(Vec::new());
        sink.emit(Event::Started);
        sink.emit(Event::CaptureError {
            msg: "PrintWindow returned 0".to_string(),
        });
        sink.emit(Event::Stopped);

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        let parsed: Event = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(
            parsed,
            Event::CaptureError {
                msg: "PrintWindow returned 0".to_string()
            }
        );
    }

    #[test]
    fn test_channel_sink_preserves_order() {
        let (sink, receiver) = event_channel();
        sink.emit(Event::Started);
        sink.emit(Event::Triggered);
        sink.emit(Event::Stopped);
        drop(sink);

        let received: Vec<Event> = receiver.iter().collect();
        assert_eq!(received, vec![Event::Started, Event::Triggered, Event::Stopped]);
    }

    #[test]
    fn test_channel_sink_survives_dropped_receiver() {
        let (sink, receiver) = event_channel();
        drop(receiver);
        sink.emit(Event::Started);
    }
}
