//! Source Adapters
//!
//! Three incompatible backends, one capability: hand back the raw
//! (identity, timestamp) observations of a run.
//!
//! ## Structure
//! - `capture.rs` - pcap file of 802.11 frames
//! - `forensic.rs` - Kismet log database
//! - `telemetry.rs` - probemon database
//! - `frame.rs` - 802.11 header decoding shared by capture and forensic
//! - `sqlite.rs` - read-only database handling shared by forensic and telemetry

pub mod capture;
pub mod forensic;
pub mod frame;
pub mod sqlite;
pub mod telemetry;

pub use capture::CaptureSource;
pub use forensic::ForensicSource;
pub use telemetry::TelemetrySource;

use super::config::{FrameFilter, RunConfig, SourceSelection};
use super::identity::Identity;
use crate::error::Result;

// ============================================================================
// OBSERVATION
// ============================================================================

/// One sighting of an identity
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// None when the record carried no usable address
    pub identity: Option<Identity>,
    /// Seconds since epoch
    pub timestamp: f64,
    /// Only telemetry rows carry it
    pub rssi: Option<i32>,
}

impl Observation {
    pub fn new(identity: Option<Identity>, timestamp: f64) -> Self {
        Self {
            identity,
            timestamp,
            rssi: None,
        }
    }
}

/// Common contract of every adapter
pub trait ObservationSource {
    /// Short name for logs
    fn name(&self) -> &'static str;

    fn fetch(&self, filter: FrameFilter) -> Result<Vec<Observation>>;
}

// ============================================================================
// SOURCE SELECTION
// ============================================================================

/// The adapter chosen for a run
pub enum Source {
    Capture(CaptureSource),
    Forensic(ForensicSource),
    Telemetry(TelemetrySource),
}

impl Source {
    pub fn from_config(config: &RunConfig) -> Self {
        match &config.source {
            SourceSelection::Capture(path) => {
                Source::Capture(CaptureSource::new(path.clone(), config.ignored.clone()))
            }
            SourceSelection::Forensic(path) => {
                Source::Forensic(ForensicSource::new(path.clone(), config.ignored.clone()))
            }
            SourceSelection::Telemetry(path) => Source::Telemetry(TelemetrySource::new(
                path.clone(),
                config.window,
                config.rssi_floor,
                config.ignored.clone(),
            )),
        }
    }
}

impl ObservationSource for Source {
    fn name(&self) -> &'static str {
        match self {
            Source::Capture(s) => s.name(),
            Source::Forensic(s) => s.name(),
            Source::Telemetry(s) => s.name(),
        }
    }

    fn fetch(&self, filter: FrameFilter) -> Result<Vec<Observation>> {
        match self {
            Source::Capture(s) => s.fetch(filter),
            Source::Forensic(s) => s.fetch(filter),
            Source::Telemetry(s) => s.fetch(filter),
        }
    }
}

// ============================================================================
// FETCH STATS
// ============================================================================

/// Per-fetch counters, logged once at the end
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchStats {
    pub kept: usize,
    /// Not a probe request while restricted to probe requests
    pub filtered: usize,
    /// Source address in the ignore list
    pub ignored: usize,
    /// Record could not be decoded
    pub corrupt: usize,
    /// Address text was not a valid identity
    pub malformed: usize,
    /// Sentinel or non-client device removed after the scan
    pub removed: usize,
}

impl FetchStats {
    pub fn log(&self, source: &str) {
        log::info!(
            "{}: {} observations kept ({} filtered, {} ignored, {} removed, {} corrupt, {} malformed)",
            source,
            self.kept,
            self.filtered,
            self.ignored,
            self.removed,
            self.corrupt,
            self.malformed
        );
    }
}
