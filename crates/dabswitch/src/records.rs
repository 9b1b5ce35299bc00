//! Decoded FIG 0/18 and FIG 0/19 records

use std::time::Instant;

use arrayvec::ArrayVec;

use crate::codes::{AnnouncementFlags, AnnouncementType};

/// The ensemble-wide alarm cluster (ETSI EN 300 401 §8.1.6.2)
///
/// FIG 0/19 records addressed to this cluster are alarm announcements
/// for every service in the ensemble, subject only to the ensemble
/// alarm (Al) flag.
pub const ALARM_CLUSTER: u8 = 0xFF;

/// Highest legal subchannel id
pub const MAX_SUBCHANNEL: u8 = 63;

/// FIG 0/18's 3-bit cluster count bounds the list to seven entries
pub type ClusterList = ArrayVec<u8, 7>;

/// Announcement support for one service (decoded FIG 0/18)
///
/// Records which announcement types a service supports and which
/// announcement clusters it belongs to. A service with support flags
/// but no clusters signals capability without receiving announcements
/// from anywhere.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceSupportRecord {
    service_id: u32,
    support: AnnouncementFlags,
    clusters: ClusterList,
}

impl ServiceSupportRecord {
    /// New support record
    ///
    /// Returns `None` for the reserved service id 0.
    pub fn new(service_id: u32, support: AnnouncementFlags) -> Option<ServiceSupportRecord> {
        if service_id == 0 {
            return None;
        }
        Some(ServiceSupportRecord {
            service_id,
            support,
            clusters: ClusterList::new(),
        })
    }

    /// Service identifier (never 0)
    pub fn service_id(&self) -> u32 {
        self.service_id
    }

    /// ASu support flags
    pub fn support(&self) -> AnnouncementFlags {
        self.support
    }

    /// Cluster ids this service belongs to, in signalled order
    pub fn clusters(&self) -> &[u8] {
        &self.clusters
    }

    /// Add a cluster membership
    ///
    /// Duplicates and overflow beyond the seven-entry wire bound are
    /// silently dropped; each cluster id appears at most once.
    pub fn add_cluster(&mut self, cluster_id: u8) {
        if !self.clusters.contains(&cluster_id) {
            let _ = self.clusters.try_push(cluster_id);
        }
    }

    /// True if the service supports announcement type `ty`
    pub fn supports(&self, ty: AnnouncementType) -> bool {
        self.support.supports(ty)
    }

    /// True if the service belongs to `cluster_id`
    pub fn in_cluster(&self, cluster_id: u8) -> bool {
        self.clusters.contains(&cluster_id)
    }
}

/// EWS geographic addressing attached to a FIG 0/19 record
///
/// Carried only for region-flagged records under ETSI TS 104 090: the
/// four location octets plus the Nibble Fill Flag selecting the match
/// granularity. Interpretation is [`dabplace`]'s business.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EwsArea {
    data: [u8; 4],
    nff: u8,
}

impl EwsArea {
    /// New area from raw wire fields
    pub fn new(data: [u8; 4], nff: u8) -> EwsArea {
        EwsArea {
            data,
            nff: nff & 0x0F,
        }
    }

    /// The four location octets
    pub fn data(&self) -> &[u8; 4] {
        &self.data
    }

    /// Nibble Fill Flag (match granularity selector)
    pub fn nff(&self) -> u8 {
        self.nff
    }
}

/// One active (or ending) announcement (decoded FIG 0/19)
///
/// An all-clear ASw flag field encodes the *end* of the cluster's
/// announcement rather than activity; see
/// [`is_active()`](ActiveAnnouncementRecord::is_active).
///
/// `first_seen` and `last_update` are monotonic receiver-side
/// timestamps: repeated FIG 0/19 for the same cluster refreshes
/// `last_update` while `first_seen` keeps the original detection time.
#[derive(Clone, Debug)]
pub struct ActiveAnnouncementRecord {
    cluster_id: u8,
    flags: AnnouncementFlags,
    subchannel_id: u8,
    new_flag: bool,
    region_flag: bool,
    region_id: Option<u8>,
    ews_area: Option<EwsArea>,
    first_seen: Instant,
    last_update: Instant,
}

impl ActiveAnnouncementRecord {
    /// New announcement record with both timestamps at now
    pub fn new(cluster_id: u8, flags: AnnouncementFlags, subchannel_id: u8) -> Self {
        let now = Instant::now();
        ActiveAnnouncementRecord {
            cluster_id,
            flags,
            subchannel_id,
            new_flag: false,
            region_flag: false,
            region_id: None,
            ews_area: None,
            first_seen: now,
            last_update: now,
        }
    }

    /// Set the New flag from the wire
    pub fn with_new_flag(mut self, new_flag: bool) -> Self {
        self.new_flag = new_flag;
        self
    }

    /// Attach region signalling from the wire
    pub fn with_region(mut self, region_id: u8, ews_area: Option<EwsArea>) -> Self {
        self.region_flag = true;
        self.region_id = Some(region_id);
        self.ews_area = ews_area;
        self
    }

    /// Announcement cluster id
    pub fn cluster_id(&self) -> u8 {
        self.cluster_id
    }

    /// ASw flags: the currently active announcement types
    pub fn flags(&self) -> AnnouncementFlags {
        self.flags
    }

    /// Subchannel carrying the announcement audio (1..=63 when active)
    pub fn subchannel_id(&self) -> u8 {
        self.subchannel_id
    }

    /// New flag from the wire
    pub fn new_flag(&self) -> bool {
        self.new_flag
    }

    /// Region flag from the wire
    pub fn region_flag(&self) -> bool {
        self.region_flag
    }

    /// Lower region id, when region-flagged
    pub fn region_id(&self) -> Option<u8> {
        self.region_id
    }

    /// EWS geographic address, when one was signalled
    pub fn ews_area(&self) -> Option<&EwsArea> {
        self.ews_area.as_ref()
    }

    /// When this cluster's announcement was first detected
    pub fn first_seen(&self) -> Instant {
        self.first_seen
    }

    /// When the most recent FIG 0/19 for this cluster arrived
    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    /// True while the announcement is running
    ///
    /// An all-clear flag field means the announcement has ended.
    pub fn is_active(&self) -> bool {
        self.flags.any()
    }

    /// True for the ensemble-wide alarm cluster `0xFF`
    pub fn is_ensemble_alarm(&self) -> bool {
        self.cluster_id == ALARM_CLUSTER
    }

    /// The most urgent active type, `None` once ended
    pub fn highest_priority_type(&self) -> Option<AnnouncementType> {
        self.flags.highest_priority()
    }

    /// Fold a repeated FIG 0/19 for the same cluster into this record
    ///
    /// Adopts the newer flags, subchannel, and signalling; keeps
    /// `first_seen`.
    pub fn refresh_from(&mut self, newer: &ActiveAnnouncementRecord) {
        debug_assert_eq!(self.cluster_id, newer.cluster_id);
        self.flags = newer.flags;
        self.subchannel_id = newer.subchannel_id;
        self.new_flag = newer.new_flag;
        self.region_flag = newer.region_flag;
        self.region_id = newer.region_id;
        self.ews_area = newer.ews_area;
        self.last_update = newer.last_update;
    }
}
