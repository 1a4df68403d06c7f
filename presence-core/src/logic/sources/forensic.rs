//! Forensic Source
//!
//! Kismet log database. Every 802.11 packet gives up to two observations
//! (source and destination), then the scan is cleaned up: sentinel
//! addresses go, and so does every device Kismet classified as something
//! other than a Wi-Fi client/device (access points, bridged hosts...).

use std::collections::HashSet;
use std::path::PathBuf;

use rusqlite::{Connection, Row};

use super::frame::{self, LinkLayer};
use super::sqlite::{open_read_only, row_error};
use super::{FetchStats, Observation, ObservationSource};
use crate::constants::{KISMET_CLIENT_TYPES, KISMET_PHY_80211};
use crate::error::{PresenceError, Result};
use crate::logic::config::FrameFilter;
use crate::logic::identity::Identity;

const PACKETS_QUERY: &str = "SELECT ts_sec, lower(sourcemac), lower(destmac), packet
     FROM packets WHERE phyname = ?1";

const DEVICES_QUERY: &str = "SELECT lower(devmac), type FROM devices";

pub struct ForensicSource {
    path: PathBuf,
    ignored: HashSet<Identity>,
}

impl ForensicSource {
    pub fn new(path: PathBuf, ignored: HashSet<Identity>) -> Self {
        Self { path, ignored }
    }

    fn scan_packets(
        &self,
        conn: &Connection,
        filter: FrameFilter,
        stats: &mut FetchStats,
    ) -> Result<Vec<Observation>> {
        let mut stmt = conn.prepare(PACKETS_QUERY)?;
        let mut rows = stmt.query([KISMET_PHY_80211])?;
        let mut observations = Vec::new();

        while let Some(row) = rows.next()? {
            match self.decode_row(row, filter, stats, &mut observations) {
                Ok(()) => {}
                Err(e) if e.is_record_level() => {
                    log::debug!("Skipping packet: {}", e);
                    stats.corrupt += 1;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(observations)
    }

    fn decode_row(
        &self,
        row: &Row,
        filter: FrameFilter,
        stats: &mut FetchStats,
        out: &mut Vec<Observation>,
    ) -> Result<()> {
        let ts_sec: i64 = row.get(0).map_err(row_error)?;
        let source: Option<String> = row.get(1).map_err(row_error)?;
        let dest: Option<String> = row.get(2).map_err(row_error)?;

        if filter == FrameFilter::ProbeRequestsOnly {
            let packet: Option<Vec<u8>> = row.get(3).map_err(row_error)?;
            let packet = packet
                .ok_or_else(|| PresenceError::SourceCorrupt("packet without frame bytes".into()))?;
            if !frame::decode(LinkLayer::Radiotap, &packet)?.is_probe_request() {
                stats.filtered += 1;
                return Ok(());
            }
        }

        let timestamp = ts_sec as f64;

        match parse_column(source.as_deref(), stats) {
            Some(Some(id)) if self.ignored.contains(&id) => stats.ignored += 1,
            Some(identity) => out.push(Observation::new(identity, timestamp)),
            None => {}
        }

        // Multicast and broadcast receivers are not devices
        if let Some(Some(id)) = parse_column(dest.as_deref(), stats) {
            if self.ignored.contains(&id) {
                stats.ignored += 1;
            } else if !id.is_excluded_multicast() {
                out.push(Observation::new(Some(id), timestamp));
            }
        }
        Ok(())
    }

    /// Devices known to Kismet that are not Wi-Fi clients
    fn non_client_devices(&self, conn: &Connection, stats: &mut FetchStats) -> Result<HashSet<Identity>> {
        let mut stmt = conn.prepare(DEVICES_QUERY)?;
        let mut rows = stmt.query([])?;
        let mut excluded = HashSet::new();

        while let Some(row) = rows.next()? {
            let (devmac, kind) = match read_device(row).map_err(row_error) {
                Ok(r) => r,
                Err(e) if e.is_record_level() => {
                    log::debug!("Skipping device record: {}", e);
                    stats.corrupt += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            if kind.as_deref().map_or(false, |k| KISMET_CLIENT_TYPES.contains(&k)) {
                continue;
            }
            if let Some(Some(id)) = parse_column(devmac.as_deref(), stats) {
                excluded.insert(id);
            }
        }
        Ok(excluded)
    }
}

fn read_device(row: &Row) -> rusqlite::Result<(Option<String>, Option<String>)> {
    Ok((row.get(0)?, row.get(1)?))
}

/// None: malformed (counted), Some(None): empty column, Some(Some(id)): address
fn parse_column(raw: Option<&str>, stats: &mut FetchStats) -> Option<Option<Identity>> {
    match raw.map(str::trim) {
        None | Some("") => Some(None),
        Some(text) => match Identity::normalize(text) {
            Ok(id) => Some(Some(id)),
            Err(e) => {
                log::debug!("Dropping address: {}", e);
                stats.malformed += 1;
                None
            }
        },
    }
}

impl ObservationSource for ForensicSource {
    fn name(&self) -> &'static str {
        "forensic"
    }

    fn fetch(&self, filter: FrameFilter) -> Result<Vec<Observation>> {
        log::info!("Processing kismet file {:?}", self.path);

        let conn = open_read_only(&self.path)?;
        let mut stats = FetchStats::default();
        let mut observations = self.scan_packets(&conn, filter, &mut stats)?;

        // Sentinels: absent is fine
        let before = observations.len();
        observations.retain(|o| {
            !matches!(o.identity, Some(id) if id == Identity::BROADCAST || id == Identity::ZERO)
        });

        let excluded = self.non_client_devices(&conn, &mut stats)?;
        observations.retain(|o| o.identity.map_or(true, |id| !excluded.contains(&id)));
        stats.removed = before - observations.len();
        stats.kept = observations.len();

        drop(conn);
        stats.log(self.name());
        Ok(observations)
    }
}

// ============================================================================
// TESTS
// ============================================================================
