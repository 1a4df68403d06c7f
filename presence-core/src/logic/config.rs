//! Run Configuration
//!
//! `PresenceFile` is the on-disk part (`probemon.toml`): ignore list, vendor
//! merge list and known devices. `RunConfig` is what one pipeline run needs;
//! the CLI builds it from its arguments plus the file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};

use super::identity::{Identity, VendorPrefix};
use crate::constants;
use crate::error::{PresenceError, Result};

// ============================================================================
// CONFIG FILE
// ============================================================================

/// Raw content of the config file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceFile {
    /// Addresses never reported (own devices, access points...)
    pub ignored: Vec<String>,
    /// Vendor prefixes whose devices are merged into one timeline
    pub merged: Vec<String>,
    /// Devices always kept regardless of the minimum observation count
    pub knownmac: Vec<String>,
}

impl PresenceFile {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| PresenceError::Config(format!("cannot read {:?}: {}", path, e)))?;
        toml::from_str(&content)
            .map_err(|e| PresenceError::Config(format!("cannot parse {:?}: {}", path, e)))
    }

    /// An explicit path must load; otherwise the default location is optional
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => {
                let default = constants::get_config_path();
                if default.exists() {
                    Self::from_file(&default)
                } else {
                    log::debug!("No config file at {:?}, using defaults", default);
                    Ok(Self::default())
                }
            }
        }
    }

    /// Normalize every entry
    pub fn resolve(&self) -> Result<Lists> {
        Ok(Lists {
            ignored: parse_identities(&self.ignored, "ignored")?,
            merged: self
                .merged
                .iter()
                .map(|m| VendorPrefix::parse(m))
                .collect::<Result<Vec<_>>>()?,
            knownmac: parse_identities(&self.knownmac, "knownmac")?,
        })
    }
}

fn parse_identities(raw: &[String], key: &str) -> Result<HashSet<Identity>> {
    raw.iter()
        .map(|s| {
            Identity::normalize(s)
                .map_err(|_| PresenceError::Config(format!("{}: invalid address {:?}", key, s)))
        })
        .collect()
}

/// Normalized lists from the config file
#[derive(Debug, Clone, Default)]
pub struct Lists {
    pub ignored: HashSet<Identity>,
    pub merged: Vec<VendorPrefix>,
    pub knownmac: HashSet<Identity>,
}

// ============================================================================
// SOURCE SELECTION
// ============================================================================

/// Which backend feeds the run; exactly one per invocation
#[derive(Debug, Clone, PartialEq)]
pub enum SourceSelection {
    /// pcap file of 802.11 frames
    Capture(PathBuf),
    /// Kismet log database
    Forensic(PathBuf),
    /// probemon database
    Telemetry(PathBuf),
}

impl Default for SourceSelection {
    fn default() -> Self {
        SourceSelection::Telemetry(constants::get_db_path())
    }
}

impl SourceSelection {
    pub fn path(&self) -> &Path {
        match self {
            Self::Capture(p) | Self::Forensic(p) | Self::Telemetry(p) => p,
        }
    }
}

/// Frame subtype restriction for frame-carrying sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameFilter {
    #[default]
    All,
    ProbeRequestsOnly,
}

// ============================================================================
// TIME WINDOW
// ============================================================================

/// Inclusive [start, end] window, seconds since epoch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeWindow {
    pub start: f64,
    pub end: f64,
}

impl TimeWindow {
    /// Window of `span` seconds ending now
    pub fn ending_now(span: u64) -> Self {
        let end = Local::now().timestamp() as f64;
        Self {
            start: end - span as f64,
            end,
        }
    }

    /// Window of `span` seconds starting at a user supplied date
    pub fn starting_at(start: &str, span: u64) -> Result<Self> {
        let start = parse_start(start)?;
        Ok(Self {
            start,
            end: start + span as f64,
        })
    }
}

/// `<n>d`, `<n>h` or `<n>m` to seconds
pub fn parse_span(span: &str) -> Result<u64> {
    let span = span.trim();
    let unit = span
        .chars()
        .last()
        .ok_or_else(|| PresenceError::Config("empty span".into()))?;
    let count: u64 = span[..span.len() - unit.len_utf8()].parse().map_err(|_| {
        PresenceError::Config(format!(
            "span {:?} should be of the form [digit]...[d|h|m]",
            span
        ))
    })?;

    let unit_secs = match unit {
        'd' => 24 * 60 * 60,
        'h' => 60 * 60,
        'm' => 60,
        _ => {
            return Err(PresenceError::Config(format!(
                "span {:?}: postfix could only be d or h or m",
                span
            )))
        }
    };
    Ok(count * unit_secs)
}

/// `YYYY-MM-DDTHH:MM`, or `YYYY-MM-DD` meaning noon that day (local time)
fn parse_start(raw: &str) -> Result<f64> {
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default()))
        })
        .map_err(|_| PresenceError::Config(format!("can't parse date timestamp {:?}", raw)))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp() as f64)
        .ok_or_else(|| PresenceError::Config(format!("{:?} does not exist in local time", raw)))
}

// ============================================================================
// RUN CONFIG
// ============================================================================

/// Everything one pipeline run needs
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub source: SourceSelection,
    pub frame_filter: FrameFilter,
    /// `--mac` patterns, OR-ed
    pub patterns: Vec<String>,
    /// Minimum number of observations to keep an identity
    pub min_observations: usize,
    /// Telemetry rows must have rssi strictly above this
    pub rssi_floor: i32,
    pub window: TimeWindow,
    /// Merge locally administered addresses into one "LAA" timeline
    pub privacy: bool,
    pub ignored: HashSet<Identity>,
    pub merged: Vec<VendorPrefix>,
    pub knownmac: HashSet<Identity>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            source: SourceSelection::default(),
            frame_filter: FrameFilter::All,
            patterns: Vec::new(),
            min_observations: constants::DEFAULT_MIN_OBSERVATIONS,
            rssi_floor: constants::DEFAULT_RSSI_FLOOR,
            window: TimeWindow::ending_now(constants::DEFAULT_SPAN_SECS),
            privacy: false,
            ignored: HashSet::new(),
            merged: Vec::new(),
            knownmac: HashSet::new(),
        }
    }
}

impl RunConfig {
    /// Apply the lists of a config file
    pub fn with_lists(mut self, lists: Lists) -> Self {
        self.ignored = lists.ignored;
        self.merged = lists.merged;
        self.knownmac = lists.knownmac;
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================
