//! Ensemble-wide announcement state fed by the FIC decoder

use std::collections::HashMap;

use crate::codes::AnnouncementType;
use crate::records::{ActiveAnnouncementRecord, ServiceSupportRecord};

/// Per-service announcement support (FIG 0/18 state)
///
/// Entries persist until removed or cleared; FIG 0/18 carries no
/// expiry, so lifetime management belongs to the Coordinator.
#[derive(Clone, Debug, Default)]
pub struct SupportStore {
    records: HashMap<u32, ServiceSupportRecord>,
}

impl SupportStore {
    /// New, empty store
    pub fn new() -> SupportStore {
        SupportStore::default()
    }

    /// Insert or replace the record for its service
    ///
    /// Replaces any prior record for the same service id wholesale.
    pub fn upsert(&mut self, record: ServiceSupportRecord) {
        self.records.insert(record.service_id(), record);
    }

    /// Remove a service's record; idempotent
    pub fn remove(&mut self, service_id: u32) {
        self.records.remove(&service_id);
    }

    /// Erase everything (ensemble change)
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Look up a service's record
    pub fn get(&self, service_id: u32) -> Option<&ServiceSupportRecord> {
        self.records.get(&service_id)
    }

    /// True iff the service is known and belongs to `cluster_id`
    pub fn participates(&self, service_id: u32, cluster_id: u8) -> bool {
        self.records
            .get(&service_id)
            .map(|record| record.in_cluster(cluster_id))
            .unwrap_or(false)
    }

    /// True iff the service is known and supports `ty`
    pub fn supports(&self, service_id: u32, ty: AnnouncementType) -> bool {
        self.records
            .get(&service_id)
            .map(|record| record.supports(ty))
            .unwrap_or(false)
    }

    /// True if any known service supports any announcement type
    pub fn any_support(&self) -> bool {
        self.records.values().any(|record| record.support().any())
    }

    /// Number of services with support records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no support records are held
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// What an [`ActiveStore::update`] did
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new cluster became active
    Started,

    /// A known cluster was refreshed in place
    Refreshed,

    /// The cluster's announcement ended (all-clear ASw)
    Ended,
}

/// Per-cluster active announcements (FIG 0/19 state)
///
/// Keyed by cluster id. Repeated FIG 0/19 for a known cluster
/// refreshes the held record in place, preserving its original
/// detection time. An all-clear record evicts the cluster; acting on
/// that termination (returning to the original service) is the
/// Coordinator's job.
#[derive(Clone, Debug, Default)]
pub struct ActiveStore {
    records: HashMap<u8, ActiveAnnouncementRecord>,
}

impl ActiveStore {
    /// New, empty store
    pub fn new() -> ActiveStore {
        ActiveStore::default()
    }

    /// Fold one FIG 0/19 record into the store
    pub fn update(&mut self, record: ActiveAnnouncementRecord) -> UpdateOutcome {
        if !record.is_active() {
            self.records.remove(&record.cluster_id());
            return UpdateOutcome::Ended;
        }

        match self.records.get_mut(&record.cluster_id()) {
            Some(held) => {
                held.refresh_from(&record);
                UpdateOutcome::Refreshed
            }
            None => {
                self.records.insert(record.cluster_id(), record);
                UpdateOutcome::Started
            }
        }
    }

    /// Look up a cluster's active announcement
    pub fn get(&self, cluster_id: u8) -> Option<&ActiveAnnouncementRecord> {
        self.records.get(&cluster_id)
    }

    /// Erase everything (ensemble change)
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Number of clusters with a running announcement
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if no announcement is running anywhere
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
