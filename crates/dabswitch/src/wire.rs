//! Bit-exact FIG 0/18 and FIG 0/19 payload parsing
//!
//! These parsers sit at the edge between the FIC decoder and the
//! typed records the rest of the crate consumes. Field layouts follow
//! ETSI EN 300 401 §6.3.4 (announcement support) and §6.3.5
//! (announcement switching), with the EWS extension of ETSI
//! TS 104 090 on region-flagged FIG 0/19 records.
//!
//! Malformed records are dropped and counted; the surrounding records
//! of a batch still parse. Nothing here panics on hostile input.

use byteorder::{BigEndian, ByteOrder};
use thiserror::Error;

use crate::codes::AnnouncementFlags;
use crate::records::{ActiveAnnouncementRecord, EwsArea, ServiceSupportRecord, MAX_SUBCHANNEL};

/// Why a wire record was dropped
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq)]
pub enum WireError {
    /// The payload ended mid-record
    #[error("payload truncated mid-record")]
    Truncated,

    /// FIG 0/18 with the reserved service id 0
    #[error("service id 0 is reserved")]
    ReservedServiceId,

    /// FIG 0/19 with the reserved cluster id 0
    #[error("cluster id 0 is reserved")]
    ReservedClusterId,

    /// An active FIG 0/19 record with a subchannel outside 1..=63
    #[error("active announcement with subchannel outside 1..=63")]
    InvalidSubchannel,
}

/// One parsed FIG payload
///
/// `dropped` counts records discarded for any [`WireError`]; callers
/// accumulate it into their malformed-record statistics.
#[derive(Clone, Debug)]
pub struct WireBatch<T> {
    /// Successfully decoded records, in signalled order
    pub records: Vec<T>,
    /// Records dropped as malformed
    pub dropped: u32,
}

impl<T> Default for WireBatch<T> {
    fn default() -> Self {
        WireBatch {
            records: Vec::new(),
            dropped: 0,
        }
    }
}

/// Parse a FIG 0/18 (announcement support) payload
///
/// The payload is a sequence of service records:
///
/// ```txt
/// SId        16 or 32 bits  (long form per the outer FIG header)
/// ASu flags  16 bits, big-endian
/// Rfa        5 bits
/// count      3 bits
/// clusters   count × 8 bits
/// ```
///
/// A record with service id 0 is dropped and parsing continues at the
/// next record. A truncated tail drops exactly one record.
pub fn parse_fig0_18(payload: &[u8], long_sids: bool) -> WireBatch<ServiceSupportRecord> {
    let mut reader = Reader::new(payload);
    let mut batch = WireBatch::default();

    while !reader.is_empty() {
        match read_support_record(&mut reader, long_sids) {
            Ok(record) => batch.records.push(record),
            Err(WireError::ReservedServiceId) => {
                // boundary is known; skip just this record
                batch.dropped += 1;
            }
            Err(_) => {
                // boundary lost; nothing after this can be trusted
                batch.dropped += 1;
                break;
            }
        }
    }

    batch
}

/// Parse a FIG 0/19 (announcement switching) payload
///
/// The payload is a sequence of cluster records:
///
/// ```txt
/// Cluster id  8 bits
/// ASw flags   16 bits, big-endian  (0x0000 = announcement ended)
/// New flag    1 bit
/// Region flag 1 bit
/// SubChId     6 bits
/// ```
///
/// When the region flag is set the record continues with the ETSI
/// TS 104 090 extension:
///
/// ```txt
/// Rfa         2 bits
/// Region id   6 bits (lower part)
/// NFF         4 bits  (0 = no geographic address)
/// Rfa         4 bits
/// Location    4 × 8 bits
/// ```
///
/// Records with the reserved cluster id 0, or with an out-of-range
/// subchannel while active, are dropped and counted.
pub fn parse_fig0_19(payload: &[u8]) -> WireBatch<ActiveAnnouncementRecord> {
    let mut reader = Reader::new(payload);
    let mut batch = WireBatch::default();

    while !reader.is_empty() {
        match read_switching_record(&mut reader) {
            Ok(record) => batch.records.push(record),
            Err(WireError::ReservedClusterId) | Err(WireError::InvalidSubchannel) => {
                batch.dropped += 1;
            }
            Err(_) => {
                batch.dropped += 1;
                break;
            }
        }
    }

    batch
}

fn read_support_record(
    reader: &mut Reader<'_>,
    long_sids: bool,
) -> Result<ServiceSupportRecord, WireError> {
    let service_id = if long_sids {
        reader.read_u32_be()?
    } else {
        u32::from(reader.read_u16_be()?)
    };
    let asu = AnnouncementFlags::from_raw(reader.read_u16_be()?);
    let count = reader.read_u8()? & 0x07;

    // consume the cluster list before judging the service id, so a
    // bad id still leaves the reader on the next record boundary
    let mut clusters = [0u8; 7];
    for cluster in clusters.iter_mut().take(count as usize) {
        *cluster = reader.read_u8()?;
    }

    let mut record =
        ServiceSupportRecord::new(service_id, asu).ok_or(WireError::ReservedServiceId)?;
    for &cluster in clusters.iter().take(count as usize) {
        record.add_cluster(cluster);
    }

    Ok(record)
}

fn read_switching_record(
    reader: &mut Reader<'_>,
) -> Result<ActiveAnnouncementRecord, WireError> {
    let cluster_id = reader.read_u8()?;
    let asw = AnnouncementFlags::from_raw(reader.read_u16_be()?);
    let packed = reader.read_u8()?;

    let new_flag = packed & 0x80 != 0;
    let region_flag = packed & 0x40 != 0;
    let subchannel_id = packed & MAX_SUBCHANNEL;

    let region = if region_flag {
        let region_id = reader.read_u8()? & 0x3F;
        let nff = reader.read_u8()? >> 4;
        let mut location = [0u8; 4];
        for byte in location.iter_mut() {
            *byte = reader.read_u8()?;
        }
        // NFF 0 signals a region announcement with no geographic
        // address attached
        let area = (nff != 0).then(|| EwsArea::new(location, nff));
        Some((region_id, area))
    } else {
        None
    };

    if cluster_id == 0 {
        return Err(WireError::ReservedClusterId);
    }
    if asw.any() && !(1..=MAX_SUBCHANNEL).contains(&subchannel_id) {
        return Err(WireError::InvalidSubchannel);
    }

    let mut record = ActiveAnnouncementRecord::new(cluster_id, asw, subchannel_id)
        .with_new_flag(new_flag);
    if let Some((region_id, area)) = region {
        record = record.with_region(region_id, area);
    }

    Ok(record)
}

// Bounds-checked cursor over a FIG payload
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Reader { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn read_u8(&mut self) -> Result<u8, WireError> {
        let byte = *self.buf.get(self.pos).ok_or(WireError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_u16_be(&mut self) -> Result<u16, WireError> {
        let end = self.pos + 2;
        if end > self.buf.len() {
            return Err(WireError::Truncated);
        }
        let value = BigEndian::read_u16(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(value)
    }

    fn read_u32_be(&mut self) -> Result<u32, WireError> {
        let end = self.pos + 4;
        if end > self.buf.len() {
            return Err(WireError::Truncated);
        }
        let value = BigEndian::read_u32(&self.buf[self.pos..end]);
        self.pos = end;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::codes::AnnouncementType;

    #[test]
    fn test_fig0_18_short_sid() {
        // service 0x4001 supports Alarm + RoadTraffic, clusters [1, 9]
        let payload = [0x40, 0x01, 0x00, 0x03, 0x02, 0x01, 0x09];
        let batch = parse_fig0_18(&payload, false);

        assert_eq!(0, batch.dropped);
        assert_eq!(1, batch.records.len());
        let record = &batch.records[0];
        assert_eq!(0x4001, record.service_id());
        assert!(record.supports(AnnouncementType::Alarm));
        assert!(record.supports(AnnouncementType::RoadTraffic));
        assert!(!record.supports(AnnouncementType::News));
        assert_eq!(&[1, 9], record.clusters());
    }

    #[test]
    fn test_fig0_18_long_sid_and_empty_clusters() {
        // 32-bit service id, News support, zero clusters
        let payload = [0xE1, 0x00, 0x40, 0x01, 0x00, 0x10, 0x00];
        let batch = parse_fig0_18(&payload, true);

        assert_eq!(0, batch.dropped);
        let record = &batch.records[0];
        assert_eq!(0xE100_4001, record.service_id());
        assert!(record.supports(AnnouncementType::News));
        assert!(record.clusters().is_empty());
    }

    #[test]
    fn test_fig0_18_skips_reserved_sid() {
        // first record has SId 0 and is dropped; second still parses
        let payload = [
            0x00, 0x00, 0x00, 0x01, 0x01, 0x02, // SId 0, one cluster
            0x40, 0x01, 0x00, 0x01, 0x00, // SId 0x4001, no clusters
        ];
        let batch = parse_fig0_18(&payload, false);

        assert_eq!(1, batch.dropped);
        assert_eq!(1, batch.records.len());
        assert_eq!(0x4001, batch.records[0].service_id());
    }

    #[test]
    fn test_fig0_18_truncated() {
        // cluster count says three but only one byte follows
        let payload = [0x40, 0x01, 0x00, 0x01, 0x03, 0x01];
        let batch = parse_fig0_18(&payload, false);

        assert_eq!(1, batch.dropped);
        assert!(batch.records.is_empty());
    }

    #[test]
    fn test_fig0_19_plain_record() {
        // cluster 1, RoadTraffic active, new flag, subchannel 18
        let payload = [0x01, 0x00, 0x02, 0x80 | 18];
        let batch = parse_fig0_19(&payload);

        assert_eq!(0, batch.dropped);
        let record = &batch.records[0];
        assert_eq!(1, record.cluster_id());
        assert!(record.is_active());
        assert_eq!(
            Some(AnnouncementType::RoadTraffic),
            record.highest_priority_type()
        );
        assert_eq!(18, record.subchannel_id());
        assert!(record.new_flag());
        assert!(!record.region_flag());
        assert!(record.ews_area().is_none());
    }

    #[test]
    fn test_fig0_19_termination() {
        // all-clear ASw ends the announcement; subchannel 0 is fine here
        let payload = [0x01, 0x00, 0x00, 0x00];
        let batch = parse_fig0_19(&payload);

        assert_eq!(0, batch.dropped);
        assert!(!batch.records[0].is_active());
    }

    #[test]
    fn test_fig0_19_region_with_ews() {
        let location = dabplace::pack_wire(2, 17, 11, 46, 2);
        let mut payload = vec![
            0xFF, 0x00, 0x01, 0x40 | 30, // alarm cluster, Alarm, region flag, subch 30
            0x05, // region id 5
            0xE0, // NFF 0xE
        ];
        payload.extend_from_slice(&location);

        let batch = parse_fig0_19(&payload);
        assert_eq!(0, batch.dropped);
        let record = &batch.records[0];
        assert!(record.is_ensemble_alarm());
        assert!(record.region_flag());
        assert_eq!(Some(5), record.region_id());
        let area = record.ews_area().expect("missing EWS area");
        assert_eq!(0xE, area.nff());
        assert_eq!(&location, area.data());
    }

    #[test]
    fn test_fig0_19_region_without_ews() {
        // NFF 0: region announcement with no geographic address
        let payload = [0x02, 0x00, 0x10, 0x40 | 9, 0x00, 0x00, 0, 0, 0, 0];
        let batch = parse_fig0_19(&payload);

        assert_eq!(0, batch.dropped);
        let record = &batch.records[0];
        assert!(record.region_flag());
        assert!(record.ews_area().is_none());
    }

    #[test]
    fn test_fig0_19_drops_bad_records() {
        let payload = [
            0x00, 0x00, 0x01, 18, // cluster 0: reserved
            0x01, 0x00, 0x01, 0x00, // active but subchannel 0
            0x02, 0x00, 0x01, 20, // good
        ];
        let batch = parse_fig0_19(&payload);

        assert_eq!(2, batch.dropped);
        assert_eq!(1, batch.records.len());
        assert_eq!(2, batch.records[0].cluster_id());
    }

    #[test]
    fn test_fig0_19_reserved_flag_bits_round_trip() {
        // reserved ASw bits survive into the record but do not
        // register as activity
        let payload = [0x03, 0xF8, 0x00, 0x00];
        let batch = parse_fig0_19(&payload);

        let record = &batch.records[0];
        assert_eq!(0xF800, record.flags().as_raw());
        assert!(!record.is_active());
    }

    #[test]
    fn test_fig0_19_multiple_records() {
        let payload = [
            0x01, 0x00, 0x02, 18, // traffic on cluster 1
            0x02, 0x00, 0x10, 20, // news on cluster 2
        ];
        let batch = parse_fig0_19(&payload);

        assert_eq!(0, batch.dropped);
        assert_eq!(2, batch.records.len());
        assert_eq!(1, batch.records[0].cluster_id());
        assert_eq!(2, batch.records[1].cluster_id());
    }
}
