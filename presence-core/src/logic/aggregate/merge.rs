//! Merge-by-predicate
//!
//! Anonymization merge and vendor merge are the same operation: pull every
//! real identity matching a predicate out of the ranked list, union their
//! timestamps and append one synthetic entry in their place.

use super::{Label, TimelineEntry};
use crate::logic::identity::Identity;

/// Returns how many entries were folded into the new one
pub fn merge_by<P>(entries: &mut Vec<TimelineEntry>, label: Label, predicate: P) -> usize
where
    P: Fn(&Identity) -> bool,
{
    // Only real identities are candidates; earlier synthetic groups stay put
    let (merged, kept): (Vec<_>, Vec<_>) = std::mem::take(entries)
        .into_iter()
        .partition(|e| matches!(&e.label, Label::Identity(id) if predicate(id)));
    *entries = kept;

    if merged.is_empty() {
        return 0;
    }

    let count = merged.len();
    let mut timestamps: Vec<f64> = merged.into_iter().flat_map(|e| e.timestamps).collect();
    timestamps.sort_by(f64::total_cmp);
    entries.push(TimelineEntry { label, timestamps });
    count
}
