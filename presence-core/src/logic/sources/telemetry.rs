//! Telemetry Source
//!
//! The probemon database: one row per probe request, joined with the
//! `mac` table for the address. Time window, ignore list and RSSI floor
//! are applied by the query itself.

use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};

use super::sqlite::{is_row_level, with_read_only};
use super::{FetchStats, Observation, ObservationSource};
use crate::constants::LOCK_RETRY_DELAY;
use crate::error::Result;
use crate::logic::config::{FrameFilter, TimeWindow};
use crate::logic::identity::Identity;

pub struct TelemetrySource {
    path: PathBuf,
    window: TimeWindow,
    rssi_floor: i32,
    ignored: HashSet<Identity>,
    retry_delay: Duration,
}

impl TelemetrySource {
    pub fn new(path: PathBuf, window: TimeWindow, rssi_floor: i32, ignored: HashSet<Identity>) -> Self {
        Self {
            path,
            window,
            rssi_floor,
            ignored,
            retry_delay: LOCK_RETRY_DELAY,
        }
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn sql(&self) -> String {
        let placeholders = vec!["?"; self.ignored.len()].join(",");
        format!(
            "SELECT probemon.date, mac.address, probemon.rssi FROM probemon
             INNER JOIN mac ON mac.id = probemon.mac
             WHERE probemon.date <= ? AND probemon.date >= ?
             AND lower(mac.address) NOT IN ({})
             AND probemon.rssi > ?
             ORDER BY probemon.date",
            placeholders
        )
    }

    fn bindings(&self) -> Vec<Value> {
        let mut values = vec![Value::Real(self.window.end), Value::Real(self.window.start)];
        values.extend(self.ignored.iter().map(|id| Value::Text(id.to_string())));
        values.push(Value::Integer(self.rssi_floor as i64));
        values
    }

    /// Statement-level failures come back raw so the caller can retry on a lock
    fn query(&self, conn: &Connection) -> rusqlite::Result<(Vec<Observation>, FetchStats)> {
        let mut stmt = conn.prepare(&self.sql())?;
        let mut rows = stmt.query(params_from_iter(self.bindings()))?;
        let mut observations = Vec::new();
        let mut stats = FetchStats::default();

        while let Some(row) = rows.next()? {
            let (date, address, rssi) = match read_row(row) {
                Ok(r) => r,
                Err(e) if is_row_level(&e) => {
                    log::debug!("Skipping probemon row: {}", e);
                    stats.corrupt += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let identity = match address.as_deref().map(str::trim) {
                None | Some("") => None,
                Some(text) => match Identity::normalize(text) {
                    Ok(id) => Some(id),
                    Err(e) => {
                        log::debug!("Dropping address: {}", e);
                        stats.malformed += 1;
                        continue;
                    }
                },
            };

            stats.kept += 1;
            observations.push(Observation {
                identity,
                timestamp: date,
                rssi,
            });
        }
        Ok((observations, stats))
    }
}

fn read_row(row: &Row) -> rusqlite::Result<(f64, Option<String>, Option<i32>)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

impl ObservationSource for TelemetrySource {
    fn name(&self) -> &'static str {
        "telemetry"
    }

    /// Every row is a probe request already, the frame filter has nothing to do
    fn fetch(&self, _filter: FrameFilter) -> Result<Vec<Observation>> {
        log::info!(
            "Processing probemon db {:?} ({} -> {})",
            self.path,
            self.window.start,
            self.window.end
        );

        // Connection is scoped to each attempt
        let (observations, stats) = with_read_only(&self.path, self.retry_delay, |conn| self.query(conn))?;

        stats.log(self.name());
        Ok(observations)
    }
}

// ============================================================================
// TESTS
// ============================================================================
