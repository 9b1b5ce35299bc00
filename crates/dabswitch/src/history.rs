//! Bounded log of completed announcements

use std::time::Duration;

use arraydeque::{ArrayDeque, Wrapping};
use chrono::{DateTime, Utc};

use crate::codes::AnnouncementType;

/// One completed (or still-playing) announcement
///
/// Entries are appended provisionally when announcement audio starts
/// and finalized when it ends; a provisional entry has `end == start`
/// and a zero duration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    announcement_type: AnnouncementType,
    service_name: String,
    duration: Duration,
}

impl HistoryEntry {
    /// Open a provisional entry at the current wall time
    pub fn begin(announcement_type: AnnouncementType, service_name: String) -> HistoryEntry {
        let start = Utc::now();
        HistoryEntry {
            start,
            end: start,
            announcement_type,
            service_name,
            duration: Duration::ZERO,
        }
    }

    /// Close the entry with its measured duration
    ///
    /// The end stamp is the current wall time; the duration comes
    /// from the monotonic clock, so the two may disagree slightly if
    /// the wall clock stepped while the announcement played.
    pub fn finalize(&mut self, duration: Duration) {
        self.end = Utc::now();
        self.duration = duration;
    }

    /// Wall time the announcement audio started
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Wall time the announcement ended
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// The announcement's most urgent type at switch time
    pub fn announcement_type(&self) -> AnnouncementType {
        self.announcement_type
    }

    /// Name of the interrupted service (never empty)
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Announcement play time, measured monotonically
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

/// FIFO log of the most recent announcements
///
/// Holds at most [`CAPACITY`](HistoryLog::CAPACITY) entries; the
/// 501st append evicts the oldest. Synchronization is the
/// Coordinator's responsibility, like the rest of its state.
#[derive(Clone, Debug, Default)]
pub struct HistoryLog {
    ring: ArrayDeque<HistoryEntry, CAPACITY, Wrapping>,
}

const CAPACITY: usize = 500;

impl HistoryLog {
    /// Maximum retained entries
    ///
    /// Bounded so a receiver left running for months cannot grow
    /// without limit. The bound is part of the user-facing contract:
    /// "the last 500 announcements."
    pub const CAPACITY: usize = CAPACITY;

    /// New, empty log
    pub fn new() -> HistoryLog {
        HistoryLog::default()
    }

    /// Append an entry, evicting the oldest when full
    pub fn append(&mut self, entry: HistoryEntry) {
        self.ring.push_back(entry);
    }

    /// Close the most recent entry
    ///
    /// No-op on an empty log; reports whether an entry was amended.
    pub fn finalize_last(&mut self, duration: Duration) -> bool {
        match self.ring.back_mut() {
            Some(entry) => {
                entry.finalize(duration);
                true
            }
            None => false,
        }
    }

    /// Copy of the log, ordered oldest → newest
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.ring.iter().cloned().collect()
    }

    /// The most recent entry
    pub fn last(&self) -> Option<&HistoryEntry> {
        self.ring.back()
    }

    /// Number of retained entries
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// True if nothing has completed yet
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_snapshot_order() {
        let mut log = HistoryLog::new();
        assert!(log.is_empty());

        log.append(HistoryEntry::begin(
            AnnouncementType::RoadTraffic,
            "Radio One".to_owned(),
        ));
        log.append(HistoryEntry::begin(
            AnnouncementType::Alarm,
            "Radio One".to_owned(),
        ));

        let entries = log.snapshot();
        assert_eq!(2, entries.len());
        assert_eq!(AnnouncementType::RoadTraffic, entries[0].announcement_type());
        assert_eq!(AnnouncementType::Alarm, entries[1].announcement_type());
        assert!(entries[0].start() <= entries[1].start());
    }

    #[test]
    fn test_finalize_last() {
        let mut log = HistoryLog::new();
        assert!(!log.finalize_last(Duration::from_secs(1)));

        log.append(HistoryEntry::begin(
            AnnouncementType::News,
            "Radio One".to_owned(),
        ));
        assert!(log.finalize_last(Duration::from_secs(42)));

        let entry = &log.snapshot()[0];
        assert_eq!(Duration::from_secs(42), entry.duration());
        assert!(entry.end() >= entry.start());
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut log = HistoryLog::new();
        for n in 0..HistoryLog::CAPACITY + 10 {
            log.append(HistoryEntry::begin(
                AnnouncementType::News,
                format!("Service {}", n),
            ));
        }

        assert_eq!(HistoryLog::CAPACITY, log.len());
        let entries = log.snapshot();
        // the ten oldest were evicted
        assert_eq!("Service 10", entries.first().unwrap().service_name());
        assert_eq!(
            format!("Service {}", HistoryLog::CAPACITY + 9),
            entries.last().unwrap().service_name()
        );
    }
}
