//! Identity Codec
//!
//! Normalization and classification of 802.11 hardware addresses.
//! Every address entering the pipeline goes through `Identity::normalize`,
//! so the rest of the crate only ever sees the canonical lowercase form.

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::{PresenceError, Result};

// ============================================================================
// CONSTANTS
// ============================================================================

/// Locally administered bit of the first octet (xxxxxx1x)
const LOCAL_BIT: u8 = 0b0000_0010;

/// IPv4 multicast OUI (01:00:5e), lower half of the range only
const IPV4_MULTICAST_OUI: [u8; 3] = [0x01, 0x00, 0x5e];

// ============================================================================
// IDENTITY
// ============================================================================

/// A 6-byte hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity([u8; 6]);

impl Identity {
    pub const BROADCAST: Identity = Identity([0xff; 6]);
    pub const ZERO: Identity = Identity([0x00; 6]);

    pub fn from_octets(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Parse `aa:bb:cc:dd:ee:ff` in any case
    pub fn normalize(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let mut octets = [0u8; 6];
        let mut parts = raw.split(':');

        for slot in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| PresenceError::MalformedIdentity(raw.to_string()))?;
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(PresenceError::MalformedIdentity(raw.to_string()));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| PresenceError::MalformedIdentity(raw.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(PresenceError::MalformedIdentity(raw.to_string()));
        }

        Ok(Self(octets))
    }

    pub fn is_locally_administered(&self) -> bool {
        self.0[0] & LOCAL_BIT == LOCAL_BIT
    }

    pub fn vendor_prefix(&self) -> VendorPrefix {
        VendorPrefix([self.0[0], self.0[1], self.0[2]])
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    /// 01:00:5e:00:00:00 - 01:00:5e:7f:ff:ff
    pub fn is_multicast(&self) -> bool {
        self.0[..3] == IPV4_MULTICAST_OUI && self.0[3] & 0x80 == 0
    }

    /// Addresses that never name a real client: multicast range, broadcast, all-zero
    pub fn is_excluded_multicast(&self) -> bool {
        self.is_multicast() || self.is_broadcast() || *self == Self::ZERO
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let o = &self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            o[0], o[1], o[2], o[3], o[4], o[5]
        )
    }
}

impl FromStr for Identity {
    type Err = PresenceError;

    fn from_str(s: &str) -> Result<Self> {
        Self::normalize(s)
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

// ============================================================================
// VENDOR PREFIX
// ============================================================================

/// First 3 octets of an address (OUI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VendorPrefix([u8; 3]);

impl VendorPrefix {
    /// Accepts `aa:bb:cc` or anything longer that starts with it (a full address)
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let head = raw.get(..8).unwrap_or(raw);
        let mut octets = [0u8; 3];
        let mut parts = head.split(':');

        for slot in octets.iter_mut() {
            let part = parts.next().unwrap_or("");
            if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(PresenceError::Config(format!("invalid vendor prefix {:?}", raw)));
            }
            *slot = u8::from_str_radix(part, 16)
                .map_err(|_| PresenceError::Config(format!("invalid vendor prefix {:?}", raw)))?;
        }

        // Anything after the prefix must still look like the rest of an address
        if raw.len() > 8 && !raw[8..].starts_with(':') {
            return Err(PresenceError::Config(format!("invalid vendor prefix {:?}", raw)));
        }

        Ok(Self(octets))
    }
}

impl fmt::Display for VendorPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}:{:02x}", self.0[0], self.0[1], self.0[2])
    }
}

// ============================================================================
// TESTS
// ============================================================================
