//! Logic Module - Presence Pipeline
//!
//! Source adapters produce observations, the aggregator turns them into the
//! ranked per-device dataset.
//!
//! ## Structure
//! - `identity.rs` - hardware address codec
//! - `pattern.rs` - `--mac` wildcard patterns
//! - `config.rs` - config file and per-run settings
//! - `sources/` - capture, forensic and telemetry adapters
//! - `aggregate/` - grouping, filtering, ranking and merges

pub mod aggregate;
pub mod config;
pub mod identity;
pub mod pattern;
pub mod sources;

pub use aggregate::{aggregate, AggregateOptions, Dataset, Label, TimelineEntry};
pub use config::{FrameFilter, PresenceFile, RunConfig, SourceSelection, TimeWindow};
pub use identity::{Identity, VendorPrefix};
pub use sources::{Observation, ObservationSource, Source};

use crate::error::Result;

/// One complete run: fetch from the selected source, then aggregate
pub fn run(config: &RunConfig) -> Result<Dataset> {
    // Bad patterns fail before touching the source
    let options = AggregateOptions::from_config(config)?;
    if !options.patterns.is_empty() {
        let patterns: Vec<&str> = options.patterns.patterns().collect();
        log::info!("Restricting to {}", patterns.join(", "));
    }
    let source = Source::from_config(config);

    log::info!("Reading {} source {:?}", source.name(), config.source.path());
    let observations = source.fetch(config.frame_filter)?;
    log::debug!("{} raw observations", observations.len());

    let dataset = aggregate(observations, &options)?;
    log::info!(
        "{} timelines, {} observations",
        dataset.len(),
        dataset.total_observations()
    );
    Ok(dataset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PresenceError;
    use rusqlite::Connection;

    fn telemetry_db(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("probemon.db");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE mac (id INTEGER PRIMARY KEY, address TEXT);
             CREATE TABLE probemon (date REAL, mac INTEGER, rssi INTEGER);
             INSERT INTO mac VALUES (1, 'a8:aa:aa:00:00:01'), (2, '02:11:22:00:00:02');
             INSERT INTO probemon VALUES (100, 1, -50), (200, 1, -60), (150, 2, -40);",
        )
        .unwrap();
        path
    }

    #[test]
    fn test_run_against_telemetry() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            source: SourceSelection::Telemetry(telemetry_db(dir.path())),
            window: TimeWindow { start: 0.0, end: 1000.0 },
            min_observations: 1,
            privacy: true,
            ..Default::default()
        };

        let ds = run(&config).unwrap();
        assert_eq!(ds.labels(), vec!["a8:aa:aa:00:00:01", "LAA"]);
        assert_eq!(ds.entries()[1].timestamps, vec![150.0]);
    }

    #[test]
    fn test_run_nothing_to_plot() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            source: SourceSelection::Telemetry(telemetry_db(dir.path())),
            window: TimeWindow { start: 0.0, end: 1000.0 },
            min_observations: 10,
            ..Default::default()
        };
        assert!(matches!(run(&config), Err(PresenceError::EmptyResult)));
    }

    #[test]
    fn test_run_pattern_matching_nothing_is_nothing_to_plot() {
        let dir = tempfile::tempdir().unwrap();
        let config = RunConfig {
            source: SourceSelection::Telemetry(telemetry_db(dir.path())),
            window: TimeWindow { start: 0.0, end: 1000.0 },
            patterns: vec!["a8:aa:aa:00:00:01:ff".into()],
            min_observations: 1,
            ..Default::default()
        };
        assert!(matches!(run(&config), Err(PresenceError::EmptyResult)));
    }
}
