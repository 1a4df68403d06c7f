//! Central Configuration Constants
//!
//! Defaults for every tunable of a run. Paths can be overridden from the
//! environment, everything else comes from the command line.

use std::path::PathBuf;
use std::time::Duration;

/// Default probemon database
pub const DEFAULT_DB_PATH: &str = "probemon.db";

/// Default config file (ignored / merged / knownmac lists)
pub const DEFAULT_CONFIG_PATH: &str = "probemon.toml";

/// Minimum number of observations to keep an identity
pub const DEFAULT_MIN_OBSERVATIONS: usize = 3;

/// Telemetry rows at or below this RSSI are dropped
pub const DEFAULT_RSSI_FLOOR: i32 = -99;

/// Default span of the time window (1 day)
pub const DEFAULT_SPAN: &str = "1d";
pub const DEFAULT_SPAN_SECS: u64 = 24 * 60 * 60;

/// Delay before the single retry on a locked telemetry database
pub const LOCK_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Label of the merged locally administered group
pub const LAA_LABEL: &str = "LAA";

/// Kismet phy name of 802.11 packets
pub const KISMET_PHY_80211: &str = "IEEE802.11";

/// Kismet device types kept by the forensic source
pub const KISMET_CLIENT_TYPES: [&str; 2] = ["Wi-Fi Client", "Wi-Fi Device"];

/// App version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================
// Helper functions to read from env with fallback
// ============================================

/// Telemetry database path from environment or default
pub fn get_db_path() -> PathBuf {
    std::env::var("PROBEMON_DB")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH))
}

/// Config file path from environment or default
pub fn get_config_path() -> PathBuf {
    std::env::var("PROBEMON_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
