//! Probemon Presence
//!
//! Reads 802.11 probe request observations from a capture file, a Kismet
//! log or a probemon database, and turns them into per-device presence
//! timelines ready to plot.

pub mod cli;
pub mod constants;
pub mod error;
pub mod logic;

pub use error::{PresenceError, Result};
pub use logic::{run, Dataset, RunConfig};
