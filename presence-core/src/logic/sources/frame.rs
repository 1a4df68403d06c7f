//! 802.11 frame header decoding
//!
//! Just enough of the MAC header to classify a frame and pull out its
//! addresses. Frames may come bare (DLT 105) or behind a radiotap header
//! (DLT 127, also what Kismet stores in its `packets` table).

use crate::error::{PresenceError, Result};
use crate::logic::identity::Identity;

/// pcap link types we know how to read
pub const DLT_IEEE802_11: i32 = 105;
pub const DLT_IEEE802_11_RADIOTAP: i32 = 127;

/// Management frame type and probe request subtype
pub const TYPE_MANAGEMENT: u8 = 0;
pub const SUBTYPE_PROBE_REQUEST: u8 = 4;

const TYPE_CONTROL: u8 = 1;
const SUBTYPE_CTS: u8 = 12;
const SUBTYPE_ACK: u8 = 13;

/// FC(2) + duration(2) + addr1(6)
const MIN_HEADER_LEN: usize = 10;
/// ... + addr2(6)
const ADDR2_END: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer {
    Ieee80211,
    Radiotap,
}

impl LinkLayer {
    pub fn from_linktype(linktype: i32) -> Option<Self> {
        match linktype {
            DLT_IEEE802_11 => Some(Self::Ieee80211),
            DLT_IEEE802_11_RADIOTAP => Some(Self::Radiotap),
            _ => None,
        }
    }
}

/// Decoded MAC header fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub frame_type: u8,
    pub subtype: u8,
    /// addr1
    pub receiver: Identity,
    /// addr2, absent on CTS/ACK
    pub transmitter: Option<Identity>,
}

impl FrameHeader {
    pub fn is_probe_request(&self) -> bool {
        self.frame_type == TYPE_MANAGEMENT && self.subtype == SUBTYPE_PROBE_REQUEST
    }
}

pub fn decode(layer: LinkLayer, data: &[u8]) -> Result<FrameHeader> {
    let frame = match layer {
        LinkLayer::Ieee80211 => data,
        LinkLayer::Radiotap => strip_radiotap(data)?,
    };
    decode_mac_header(frame)
}

/// Skip the radiotap header (version 0, little endian it_len at offset 2)
fn strip_radiotap(data: &[u8]) -> Result<&[u8]> {
    if data.len() < 4 {
        return Err(PresenceError::SourceCorrupt(format!(
            "radiotap header truncated ({} bytes)",
            data.len()
        )));
    }
    if data[0] != 0 {
        return Err(PresenceError::SourceCorrupt(format!(
            "unsupported radiotap version {}",
            data[0]
        )));
    }

    let it_len = u16::from_le_bytes([data[2], data[3]]) as usize;
    if it_len < 8 || it_len > data.len() {
        return Err(PresenceError::SourceCorrupt(format!(
            "radiotap length {} out of bounds ({} bytes)",
            it_len,
            data.len()
        )));
    }
    Ok(&data[it_len..])
}

fn decode_mac_header(frame: &[u8]) -> Result<FrameHeader> {
    if frame.len() < MIN_HEADER_LEN {
        return Err(PresenceError::SourceCorrupt(format!(
            "802.11 header truncated ({} bytes)",
            frame.len()
        )));
    }

    let fc = frame[0];
    let frame_type = (fc >> 2) & 0b11;
    let subtype = (fc >> 4) & 0b1111;

    let receiver = Identity::from_octets(address_at(frame, 4));
    let short_control = frame_type == TYPE_CONTROL && matches!(subtype, SUBTYPE_CTS | SUBTYPE_ACK);
    let transmitter = if short_control || frame.len() < ADDR2_END {
        None
    } else {
        Some(Identity::from_octets(address_at(frame, 10)))
    };

    Ok(FrameHeader {
        frame_type,
        subtype,
        receiver,
        transmitter,
    })
}

fn address_at(frame: &[u8], offset: usize) -> [u8; 6] {
    let mut out = [0u8; 6];
    out.copy_from_slice(&frame[offset..offset + 6]);
    out
}

// ============================================================================
// TEST FIXTURES
// ============================================================================
