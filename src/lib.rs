//! Draft Scanner
//!
//! Watches the Epic Seven client for the hero draft screen, then reports which
//! heroes sit in the draft slots and which slot carries the ban.

pub mod calibration;
pub mod capture;
pub mod config;
pub mod detection;
pub mod engine;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod paths;
pub mod vision;

pub use engine::Engine;
pub use error::{Result, ScanError};
