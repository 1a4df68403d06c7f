//! Command line interface
//!
//! Thin layer over `RunConfig`: parse arguments, merge them with the config
//! file, check the input exists.

use std::collections::HashSet;
use std::path::PathBuf;

use clap::Parser;

use crate::constants;
use crate::error::{PresenceError, Result};
use crate::logic::config::{self, Lists, TimeWindow};
use crate::logic::{FrameFilter, Identity, RunConfig, SourceSelection};

/// Build per-device presence timelines from probe requests
#[derive(Parser, Debug, Clone)]
#[command(name = "probemon-presence", version, about)]
pub struct Cli {
    /// Telemetry database (probemon)
    #[arg(short = 'b', long)]
    pub db: Option<PathBuf>,

    /// Capture file to process instead of the database
    #[arg(long, conflicts_with = "kismet")]
    pub pcap: Option<PathBuf>,

    /// Kismet log to process instead of the database
    #[arg(long)]
    pub kismet: Option<PathBuf>,

    /// With --pcap or --kismet, keep only probe requests
    #[arg(long)]
    pub only_pr: bool,

    /// Only keep addresses matching this prefix (`%` as wildcard)
    #[arg(short = 'm', long = "mac")]
    pub mac: Vec<String>,

    /// Known address, kept whatever its count (replaces the config list)
    #[arg(short = 'k', long)]
    pub knownmac: Vec<String>,

    /// Minimum number of observations to consider an address
    #[arg(short = 'M', long, default_value_t = constants::DEFAULT_MIN_OBSERVATIONS)]
    pub min: usize,

    /// Minimal RSSI value (telemetry only)
    #[arg(short = 'r', long, default_value_t = constants::DEFAULT_RSSI_FLOOR, allow_negative_numbers = true)]
    pub rssi: i32,

    /// Merge locally administered addresses
    #[arg(short = 'p', long)]
    pub privacy: bool,

    /// Start of the window, YYYY-MM-DDTHH:MM or YYYY-MM-DD
    #[arg(short = 's', long)]
    pub start: Option<String>,

    /// Span of the window (<n>d, <n>h or <n>m)
    #[arg(long, default_value = constants::DEFAULT_SPAN)]
    pub span_time: String,

    /// Config file with ignored/merged/knownmac lists
    #[arg(short = 'c', long)]
    pub config: Option<PathBuf>,

    /// Write the dataset here instead of stdout
    #[arg(short = 'o', long)]
    pub output: Option<PathBuf>,

    /// Be verbose
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

impl Cli {
    pub fn source(&self) -> SourceSelection {
        if let Some(p) = &self.pcap {
            SourceSelection::Capture(p.clone())
        } else if let Some(k) = &self.kismet {
            SourceSelection::Forensic(k.clone())
        } else {
            SourceSelection::Telemetry(self.db.clone().unwrap_or_else(constants::get_db_path))
        }
    }

    fn window(&self) -> Result<TimeWindow> {
        let span = config::parse_span(&self.span_time)?;
        match &self.start {
            Some(start) => TimeWindow::starting_at(start, span),
            None => Ok(TimeWindow::ending_now(span)),
        }
    }

    /// Arguments win over the file; `-k` replaces the file's knownmac list
    pub fn into_run_config(self, lists: Lists) -> Result<RunConfig> {
        let window = self.window()?;
        let source = self.source();
        if !source.path().exists() {
            return Err(PresenceError::SourceUnavailable(format!(
                "file not found {}",
                source.path().display()
            )));
        }

        let mut config = RunConfig {
            source,
            frame_filter: if self.only_pr {
                FrameFilter::ProbeRequestsOnly
            } else {
                FrameFilter::All
            },
            patterns: self.mac.clone(),
            min_observations: self.min,
            rssi_floor: self.rssi,
            window,
            privacy: self.privacy,
            ..Default::default()
        }
        .with_lists(lists);

        if !self.knownmac.is_empty() {
            config.knownmac = self
                .knownmac
                .iter()
                .map(|k| k.parse::<Identity>())
                .collect::<Result<HashSet<_>>>()?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("probemon-presence").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        assert_eq!(cli.min, 3);
        assert_eq!(cli.rssi, -99);
        assert_eq!(cli.span_time, "1d");
        assert!(matches!(cli.source(), SourceSelection::Telemetry(_)));
    }

    #[test]
    fn test_pcap_and_kismet_conflict() {
        let res = Cli::try_parse_from(["probemon-presence", "--pcap", "a.pcap", "--kismet", "b.kismet"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_repeatable_and_negative_options() {
        let cli = parse(&["-m", "aa:bb", "--mac", "cc:dd", "-r", "-70", "--pcap", "dump.pcap"]);
        assert_eq!(cli.mac, vec!["aa:bb", "cc:dd"]);
        assert_eq!(cli.rssi, -70);
        assert_eq!(cli.source(), SourceSelection::Capture(PathBuf::from("dump.pcap")));
    }

    #[test]
    fn test_missing_input_is_reported() {
        let cli = parse(&["--kismet", "/nonexistent/Kismet.kismet"]);
        let res = cli.into_run_config(Lists::default());
        assert!(matches!(res, Err(PresenceError::SourceUnavailable(_))));
    }

    #[test]
    fn test_knownmac_replaces_config_list() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("probemon.db");
        std::fs::write(&db, b"").unwrap();
        let db = db.to_string_lossy().to_string();

        let mut lists = Lists::default();
        lists.knownmac.insert(Identity::normalize("aa:aa:aa:aa:aa:aa").unwrap());

        let config = parse(&["--db", &db]).into_run_config(lists.clone()).unwrap();
        assert_eq!(config.knownmac, lists.knownmac);

        let config = parse(&["--db", &db, "-k", "BB:BB:BB:BB:BB:BB", "--only-pr"])
            .into_run_config(lists)
            .unwrap();
        assert_eq!(config.knownmac.len(), 1);
        assert!(config.knownmac.contains(&Identity::normalize("bb:bb:bb:bb:bb:bb").unwrap()));
        assert_eq!(config.frame_filter, FrameFilter::ProbeRequestsOnly);
    }

    #[test]
    fn test_bad_span_is_config_error() {
        let cli = parse(&["--span-time", "3w"]);
        assert!(matches!(cli.into_run_config(Lists::default()), Err(PresenceError::Config(_))));
    }
}
