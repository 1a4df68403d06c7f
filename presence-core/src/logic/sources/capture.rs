//! Capture Source
//!
//! Offline capture file of 802.11 frames (raw or radiotap), classic pcap or
//! pcapng. The transmitter address (addr2) of each frame is the observed
//! identity, the record timestamp keeps its sub-second part.

use std::collections::HashSet;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use pcap_parser::pcapng::{Block, InterfaceDescriptionBlock};
use pcap_parser::traits::PcapReaderIterator;
use pcap_parser::{create_reader, PcapBlockOwned, PcapError};

use super::frame::{self, LinkLayer};
use super::{FetchStats, Observation, ObservationSource};
use crate::error::{PresenceError, Result};
use crate::logic::config::FrameFilter;
use crate::logic::identity::Identity;

/// Reader buffer size
const BUFFER_SIZE: usize = 65536;

pub struct CaptureSource {
    path: PathBuf,
    ignored: HashSet<Identity>,
}

/// How to read the records of one interface (the whole file for classic pcap)
#[derive(Debug, Clone, Copy)]
struct CaptureFormat {
    layer: Option<LinkLayer>,
    /// Timestamp units per second
    resolution: f64,
    /// Seconds added to every timestamp
    offset: f64,
}

impl CaptureFormat {
    fn legacy(linktype: i32, nanosecond: bool) -> Self {
        Self {
            layer: LinkLayer::from_linktype(linktype),
            resolution: if nanosecond { 1e9 } else { 1e6 },
            offset: 0.0,
        }
    }

    fn interface(idb: &InterfaceDescriptionBlock) -> Self {
        Self {
            layer: LinkLayer::from_linktype(idb.linktype.0),
            resolution: ticks_per_second(idb.if_tsresol),
            offset: idb.if_tsoffset as f64,
        }
    }
}

/// `if_tsresol`: high bit set means a power of two, otherwise a power of ten
fn ticks_per_second(tsresol: u8) -> f64 {
    let exp = i32::from(tsresol & 0x7f);
    if tsresol & 0x80 == 0 {
        10f64.powi(exp)
    } else {
        2f64.powi(exp)
    }
}

fn warn_if_not_80211(format: &CaptureFormat, linktype: i32) {
    if format.layer.is_none() {
        log::warn!(
            "Link type {} carries no 802.11 header, no identity will be found",
            linktype
        );
    }
}

impl CaptureSource {
    pub fn new(path: PathBuf, ignored: HashSet<Identity>) -> Self {
        Self { path, ignored }
    }

    fn unavailable<E: std::fmt::Debug>(&self, what: &str, err: E) -> PresenceError {
        PresenceError::SourceUnavailable(format!("{}: {} ({:?})", self.path.display(), what, err))
    }

    fn observe(
        &self,
        format: CaptureFormat,
        timestamp: f64,
        data: &[u8],
        filter: FrameFilter,
        stats: &mut FetchStats,
    ) -> Option<Observation> {
        // Not 802.11: no transmitter address to speak of
        let Some(layer) = format.layer else {
            stats.filtered += 1;
            return None;
        };

        let header = match frame::decode(layer, data) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Skipping frame: {}", e);
                stats.corrupt += 1;
                return None;
            }
        };

        if filter == FrameFilter::ProbeRequestsOnly && !header.is_probe_request() {
            stats.filtered += 1;
            return None;
        }

        if let Some(id) = header.transmitter {
            if self.ignored.contains(&id) {
                stats.ignored += 1;
                return None;
            }
        }

        stats.kept += 1;
        Some(Observation::new(header.transmitter, timestamp + format.offset))
    }
}

impl ObservationSource for CaptureSource {
    fn name(&self) -> &'static str {
        "capture"
    }

    fn fetch(&self, filter: FrameFilter) -> Result<Vec<Observation>> {
        log::info!("Processing capture file {:?}", self.path);

        let file = File::open(&self.path)
            .map_err(|e| PresenceError::SourceUnavailable(format!("{}: {}", self.path.display(), e)))?;
        let mut reader = create_reader(BUFFER_SIZE, BufReader::new(file))
            .map_err(|e| self.unavailable("not a pcap or pcapng file", e))?;

        // Classic pcap: one format for the file. pcapng: one per interface, per section
        let mut legacy: Option<CaptureFormat> = None;
        let mut interfaces: Vec<CaptureFormat> = Vec::new();
        let mut observations = Vec::new();
        let mut stats = FetchStats::default();

        loop {
            match reader.next() {
                Ok((offset, block)) => {
                    let record = match block {
                        PcapBlockOwned::LegacyHeader(ref hdr) => {
                            let format = CaptureFormat::legacy(hdr.network.0, hdr.is_nanosecond_precision());
                            warn_if_not_80211(&format, hdr.network.0);
                            legacy = Some(format);
                            None
                        }
                        PcapBlockOwned::Legacy(ref pkt) => legacy.map(|format| {
                            let ts = pkt.ts_sec as f64 + pkt.ts_usec as f64 / format.resolution;
                            (format, ts, pkt.data)
                        }),
                        PcapBlockOwned::NG(Block::SectionHeader(_)) => {
                            interfaces.clear();
                            None
                        }
                        PcapBlockOwned::NG(Block::InterfaceDescription(ref idb)) => {
                            let format = CaptureFormat::interface(idb);
                            warn_if_not_80211(&format, idb.linktype.0);
                            interfaces.push(format);
                            None
                        }
                        PcapBlockOwned::NG(Block::EnhancedPacket(ref epb)) => {
                            match interfaces.get(epb.if_id as usize) {
                                Some(&format) => {
                                    let ticks = (u64::from(epb.ts_high) << 32) | u64::from(epb.ts_low);
                                    Some((format, ticks as f64 / format.resolution, epb.data))
                                }
                                None => {
                                    log::debug!("Skipping packet of unknown interface {}", epb.if_id);
                                    stats.corrupt += 1;
                                    None
                                }
                            }
                        }
                        PcapBlockOwned::NG(Block::SimplePacket(_)) => {
                            // No timestamp to place it on a timeline
                            log::debug!("Skipping simple packet block");
                            stats.corrupt += 1;
                            None
                        }
                        PcapBlockOwned::NG(_) => None,
                    };

                    if let Some((format, ts, data)) = record {
                        if let Some(obs) = self.observe(format, ts, data, filter, &mut stats) {
                            observations.push(obs);
                        }
                    }
                    drop(block);
                    reader.consume(offset);
                }
                Err(PcapError::Eof) => break,
                Err(PcapError::Incomplete(_)) => {
                    reader.refill().map_err(|e| self.unavailable("read error", e))?;
                }
                // Capture cut off mid-record: keep what was read
                Err(PcapError::UnexpectedEof) => {
                    log::debug!("Truncated record at end of {:?}", self.path);
                    stats.corrupt += 1;
                    break;
                }
                // No record boundary to resync on past a mangled block
                Err(PcapError::NomError(..)) | Err(PcapError::OwnedNomError(..)) => {
                    log::warn!("Unparsable record in {:?}, stopping there", self.path);
                    stats.corrupt += 1;
                    break;
                }
                Err(e) => return Err(self.unavailable("unreadable capture", e)),
            }
        }

        stats.log(self.name());
        Ok(observations)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::super::frame::fixtures::*;
    use super::*;
    use std::io::Write;

    const PHONE: [u8; 6] = [0xaa, 0xaa, 0xaa, 0x00, 0x00, 0x01];
    const RANDOM: [u8; 6] = [0x02, 0x11, 0x22, 0x00, 0x00, 0x02];
    const AP: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];

    /// Classic microsecond pcap with the given link type
    fn write_pcap(linktype: u32, records: &[(u32, u32, Vec<u8>)]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut buf = Vec::new();
        buf.extend_from_slice(&0xa1b2c3d4u32.to_le_bytes());
        buf.extend_from_slice(&2u16.to_le_bytes());
        buf.extend_from_slice(&4u16.to_le_bytes());
        buf.extend_from_slice(&0i32.to_le_bytes());
        buf.extend_from_slice(&0u32.to_le_bytes());
        buf.extend_from_slice(&65535u32.to_le_bytes());
        buf.extend_from_slice(&linktype.to_le_bytes());
        for (sec, usec, data) in records {
            buf.extend_from_slice(&sec.to_le_bytes());
            buf.extend_from_slice(&usec.to_le_bytes());
            buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
            buf.extend_from_slice(&(data.len() as u32).to_le_bytes());
            buf.extend_from_slice(data);
        }
        file.write_all(&buf).unwrap();
        file.flush().unwrap();
        file
    }

    /// Little-endian pcapng: SHB, one IDB, then one EPB per record (ticks in µs)
    fn write_pcapng(linktype: u16, records: &[(u64, Vec<u8>)]) -> tempfile::NamedTempFile {
        fn block(buf: &mut Vec<u8>, block_type: u32, body: &[u8]) {
            let len = 12 + body.len() as u32;
            buf.extend_from_slice(&block_type.to_le_bytes());
            buf.extend_from_slice(&len.to_le_bytes());
            buf.extend_from_slice(body);
            buf.extend_from_slice(&len.to_le_bytes());
        }

        let mut buf = Vec::new();

        let mut shb = Vec::new();
        shb.extend_from_slice(&0x1a2b3c4du32.to_le_bytes());
        shb.extend_from_slice(&1u16.to_le_bytes());
        shb.extend_from_slice(&0u16.to_le_bytes());
        shb.extend_from_slice(&(-1i64).to_le_bytes());
        block(&mut buf, 0x0a0d0d0a, &shb);

        let mut idb = Vec::new();
        idb.extend_from_slice(&linktype.to_le_bytes());
        idb.extend_from_slice(&0u16.to_le_bytes());
        idb.extend_from_slice(&65535u32.to_le_bytes());
        // if_tsresol = 6, then opt_endofopt
        idb.extend_from_slice(&9u16.to_le_bytes());
        idb.extend_from_slice(&1u16.to_le_bytes());
        idb.extend_from_slice(&[6, 0, 0, 0]);
        idb.extend_from_slice(&[0, 0, 0, 0]);
        block(&mut buf, 1, &idb);

        for (ticks, data) in records {
            let mut epb = Vec::new();
            epb.extend_from_slice(&0u32.to_le_bytes());
            epb.extend_from_slice(&((ticks >> 32) as u32).to_le_bytes());
            epb.extend_from_slice(&(*ticks as u32).to_le_bytes());
            epb.extend_from_slice(&(data.len() as u32).to_le_bytes());
            epb.extend_from_slice(&(data.len() as u32).to_le_bytes());
            epb.extend_from_slice(data);
            epb.resize(epb.len() + (4 - data.len() % 4) % 4, 0);
            block(&mut buf, 6, &epb);
        }

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&buf).unwrap();
        file.flush().unwrap();
        file
    }

    fn id(octets: [u8; 6]) -> Identity {
        Identity::from_octets(octets)
    }

    #[test]
    fn test_reads_transmitters_with_subsecond_time() {
        let pcap = write_pcap(
            127,
            &[
                (100, 250_000, with_radiotap(&probe_request(PHONE))),
                (150, 0, with_radiotap(&probe_request(RANDOM))),
                (200, 500_000, with_radiotap(&probe_request(PHONE))),
            ],
        );

        let source = CaptureSource::new(pcap.path().to_path_buf(), HashSet::new());
        let obs = source.fetch(FrameFilter::All).unwrap();

        assert_eq!(obs.len(), 3);
        assert_eq!(obs[0].identity, Some(id(PHONE)));
        assert_eq!(obs[0].timestamp, 100.25);
        assert_eq!(obs[1].identity, Some(id(RANDOM)));
        assert_eq!(obs[2].timestamp, 200.5);
    }

    #[test]
    fn test_probe_request_filter() {
        let beacon = mac_header(0, 8, [0xff; 6], AP);
        let pcap = write_pcap(105, &[(1, 0, beacon), (2, 0, probe_request(PHONE))]);
        let source = CaptureSource::new(pcap.path().to_path_buf(), HashSet::new());

        assert_eq!(source.fetch(FrameFilter::All).unwrap().len(), 2);

        let only = source.fetch(FrameFilter::ProbeRequestsOnly).unwrap();
        assert_eq!(only.len(), 1);
        assert_eq!(only[0].identity, Some(id(PHONE)));
    }

    #[test]
    fn test_ignored_sources_are_skipped() {
        let pcap = write_pcap(105, &[(1, 0, probe_request(AP)), (2, 0, probe_request(PHONE))]);
        let ignored: HashSet<_> = [id(AP)].into_iter().collect();
        let source = CaptureSource::new(pcap.path().to_path_buf(), ignored);

        let obs = source.fetch(FrameFilter::All).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].identity, Some(id(PHONE)));
    }

    #[test]
    fn test_corrupt_frame_is_skipped() {
        let pcap = write_pcap(105, &[(1, 0, vec![0x40, 0x00]), (2, 0, probe_request(PHONE))]);
        let source = CaptureSource::new(pcap.path().to_path_buf(), HashSet::new());

        let obs = source.fetch(FrameFilter::All).unwrap();
        assert_eq!(obs.len(), 1);
        assert_eq!(obs[0].timestamp, 2.0);
    }

    #[test]
    fn test_missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let source = CaptureSource::new(dir.path().join("none.pcap"), HashSet::new());
        assert!(matches!(
            source.fetch(FrameFilter::All),
            Err(PresenceError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_not_a_pcap_is_unavailable() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"definitely not a capture file, just some text").unwrap();
        file.flush().unwrap();

        let source = CaptureSource::new(file.path().to_path_buf(), HashSet::new());
        assert!(matches!(
            source.fetch(FrameFilter::All),
            Err(PresenceError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_truncated_trailing_record_is_skipped() {
        let pcap = write_pcap(
            105,
            &[(1, 0, probe_request(PHONE)), (2, 0, probe_request(RANDOM))],
        );
        // Record header announcing 24 bytes, followed by only 4 of them
        let mut tail = Vec::new();
        tail.extend_from_slice(&3u32.to_le_bytes());
        tail.extend_from_slice(&0u32.to_le_bytes());
        tail.extend_from_slice(&24u32.to_le_bytes());
        tail.extend_from_slice(&24u32.to_le_bytes());
        tail.extend_from_slice(&probe_request(AP)[..4]);
        std::fs::OpenOptions::new()
            .append(true)
            .open(pcap.path())
            .unwrap()
            .write_all(&tail)
            .unwrap();

        let source = CaptureSource::new(pcap.path().to_path_buf(), HashSet::new());
        let obs = source.fetch(FrameFilter::All).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[1].identity, Some(id(RANDOM)));
    }

    #[test]
    fn test_reads_pcapng() {
        let pcapng = write_pcapng(
            127,
            &[
                (100_250_000, with_radiotap(&probe_request(PHONE))),
                (200_000_000, with_radiotap(&mac_header(0, 8, [0xff; 6], AP))),
                (300_500_000, with_radiotap(&probe_request(RANDOM))),
            ],
        );
        let source = CaptureSource::new(pcapng.path().to_path_buf(), HashSet::new());

        let obs = source.fetch(FrameFilter::ProbeRequestsOnly).unwrap();
        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].identity, Some(id(PHONE)));
        assert_eq!(obs[0].timestamp, 100.25);
        assert_eq!(obs[1].identity, Some(id(RANDOM)));
        assert_eq!(obs[1].timestamp, 300.5);
    }

    #[test]
    fn test_pcapng_timestamp_resolution() {
        assert_eq!(ticks_per_second(6), 1e6);
        assert_eq!(ticks_per_second(9), 1e9);
        assert_eq!(ticks_per_second(0x80 | 10), 1024.0);
    }
}
