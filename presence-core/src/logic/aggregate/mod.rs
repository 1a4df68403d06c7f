//! Aggregator
//!
//! Turns the raw observations of one source into the dataset handed to the
//! renderer: group per identity, select, filter on observation count, rank
//! by frequency, then run the anonymization and vendor merges.
//!
//! Pure in-memory transform: no I/O, no shared state.

pub mod merge;


use std::collections::{HashMap, HashSet};
use std::fmt;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use super::config::RunConfig;
use super::identity::{Identity, VendorPrefix};
use super::pattern::MatcherSet;
use super::sources::Observation;
use crate::constants::LAA_LABEL;
use crate::error::{PresenceError, Result};

// ============================================================================
// DATASET
// ============================================================================

/// Name of one timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Label {
    Identity(Identity),
    /// Merged locally administered addresses
    Anonymized,
    /// Merged addresses of one vendor
    Vendor(VendorPrefix),
}

impl Label {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Label::Identity(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Label::Identity(id) => id.fmt(f),
            Label::Anonymized => f.write_str(LAA_LABEL),
            Label::Vendor(prefix) => prefix.fmt(f),
        }
    }
}

impl Serialize for Label {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// One row of the dataset: label and ascending timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    pub label: Label,
    pub timestamps: Vec<f64>,
}

impl Serialize for TimelineEntry {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TimelineEntry", 2)?;
        state.serialize_field("label", &self.label)?;
        state.serialize_field("timestamps", &self.timestamps)?;
        state.end()
    }
}

/// Final output, most observed first
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    entries: Vec<TimelineEntry>,
}

impl Dataset {
    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.label.to_string()).collect()
    }

    /// Sum of all timeline lengths
    pub fn total_observations(&self) -> usize {
        self.entries.iter().map(|e| e.timestamps.len()).sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TimelineEntry> {
        self.entries.iter()
    }
}

impl Serialize for Dataset {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

// ============================================================================
// OPTIONS
// ============================================================================

/// The part of the run configuration the aggregator looks at
#[derive(Debug, Clone, Default)]
pub struct AggregateOptions {
    pub patterns: MatcherSet,
    pub min_observations: usize,
    pub knownmac: HashSet<Identity>,
    pub privacy: bool,
    pub merged: Vec<VendorPrefix>,
}

impl AggregateOptions {
    pub fn from_config(config: &RunConfig) -> Result<Self> {
        Ok(Self {
            patterns: MatcherSet::compile(&config.patterns)?,
            min_observations: config.min_observations,
            knownmac: config.knownmac.clone(),
            privacy: config.privacy,
            merged: config.merged.clone(),
        })
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

/// identity -> timestamps, in first-seen order
fn group(observations: Vec<Observation>) -> Vec<(Identity, Vec<f64>)> {
    let mut index: HashMap<Identity, usize> = HashMap::new();
    let mut groups: Vec<(Identity, Vec<f64>)> = Vec::new();

    for obs in observations {
        let Some(id) = obs.identity else { continue };
        match index.get(&id) {
            Some(&i) => groups[i].1.push(obs.timestamp),
            None => {
                index.insert(id, groups.len());
                groups.push((id, vec![obs.timestamp]));
            }
        }
    }
    groups
}

pub fn aggregate(observations: Vec<Observation>, options: &AggregateOptions) -> Result<Dataset> {
    let groups = group(observations);
    log::debug!("Grouped {} identities", groups.len());
    if groups.is_empty() {
        return Err(PresenceError::EmptyResult);
    }

    // Pattern failure always removes; the allow-list only overrides the count check
    let mut selected: Vec<(Identity, Vec<f64>)> = groups
        .into_iter()
        .filter(|(id, _)| options.patterns.is_empty() || options.patterns.matches(id))
        .filter(|(id, ts)| ts.len() >= options.min_observations || options.knownmac.contains(id))
        .collect();
    log::debug!("{} identities left after filtering", selected.len());

    // Stable: equal counts keep first-seen order
    selected.sort_by(|a, b| b.1.len().cmp(&a.1.len()));

    let mut entries: Vec<TimelineEntry> = selected
        .into_iter()
        .map(|(id, mut timestamps)| {
            timestamps.sort_by(f64::total_cmp);
            TimelineEntry {
                label: Label::Identity(id),
                timestamps,
            }
        })
        .collect();

    if options.privacy {
        let n = merge::merge_by(&mut entries, Label::Anonymized, Identity::is_locally_administered);
        if n > 0 {
            log::info!("Merged {} locally administered addresses into {}", n, LAA_LABEL);
        }
    }

    for prefix in &options.merged {
        let n = merge::merge_by(&mut entries, Label::Vendor(*prefix), |id| id.vendor_prefix() == *prefix);
        if n > 0 {
            log::info!("Merged {} addresses of vendor {}", n, prefix);
        }
    }

    if entries.is_empty() {
        return Err(PresenceError::EmptyResult);
    }
    Ok(Dataset { entries })
}
