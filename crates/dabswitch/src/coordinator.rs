//! Glue between the FIC feed, the switching policy, and the tuner

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[cfg(not(test))]
use log::{debug, info, warn};

#[cfg(test)]
use std::{println as debug, println as info, println as warn};

use dabplace::ReceiverLocation;

use crate::codes::AnnouncementType;
use crate::history::{HistoryEntry, HistoryLog};
use crate::machine::{State, StateMachine};
use crate::policy::{evaluate, Decision};
use crate::prefs::Preferences;
use crate::records::{ActiveAnnouncementRecord, ServiceSupportRecord};
use crate::stores::{ActiveStore, SupportStore};
use crate::wire;

/// Retune request emitted towards the tuner/audio layer
///
/// Requests are fire-and-forget: completion arrives later as
/// [`Coordinator::on_tuner_locked`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TunerCommand {
    /// Tune announcement audio on the given subchannel
    RetuneToSubchannel(u8),

    /// Go back to the user's selected service
    RestoreOriginal {
        /// Service to restore
        service_id: u32,
        /// Its subchannel
        subchannel_id: u8,
    },
}

/// Capability interface to the tuner/audio layer
///
/// The Coordinator calls these only *after* releasing its lock, so an
/// implementation may take as long as a retune takes. It must
/// eventually answer with [`Coordinator::on_tuner_locked`], from any
/// thread.
pub trait TunerPort: Send + Sync {
    /// Tune announcement audio on `subchannel_id`
    fn retune_to_subchannel(&self, subchannel_id: u8);

    /// Restore the user's selected service
    fn restore_original(&self, service_id: u32, subchannel_id: u8);
}

/// Observer of announcement lifecycle events
///
/// Sinks are invoked **while the Coordinator's lock is held** and
/// therefore must be non-blocking: no I/O, no network, no unbounded
/// work. A sink that needs to do real work must enqueue and return.
pub trait AnnouncementSink: Send {
    /// The state machine moved
    fn state_changed(&self, from: State, to: State);

    /// An announcement completed and its history entry was finalized
    fn announcement_finished(&self, entry: &HistoryEntry) {
        let _ = entry;
    }
}

/// Announcement switching coordinator
///
/// Owns the announcement stores, the user preferences, the state
/// machine, and the history log behind a single mutex, and connects
/// them to the outside world: FIG 0/18 and FIG 0/19 batches arrive
/// from the FIC decoder, lock confirmations from the tuner, user
/// actions from the UI, and a periodic tick (at most one second
/// apart) keeps the duration deadline honest.
///
/// All entry points are thread-safe and bounded-time. Retune requests
/// are queued under the lock and handed to the injected [`TunerPort`]
/// after it is released, so the tuner can never deadlock against an
/// entry point.
///
/// ```no_run
/// use dabswitch::{Coordinator, TunerPort};
///
/// struct Radio;
/// impl TunerPort for Radio {
///     fn retune_to_subchannel(&self, subchannel_id: u8) { /* ... */ }
///     fn restore_original(&self, service_id: u32, subchannel_id: u8) { /* ... */ }
/// }
///
/// let coordinator = Coordinator::new(Box::new(Radio));
/// coordinator.on_original_service_set(0x4001, 5);
/// // feed it FIG payloads as they decode...
/// coordinator.on_fig_0_19_payload(&[0x01, 0x00, 0x02, 18]);
/// ```
pub struct Coordinator {
    inner: Mutex<Inner>,
    tuner: Box<dyn TunerPort>,
}

struct Inner {
    support: SupportStore,
    active: ActiveStore,
    prefs: Preferences,
    machine: StateMachine,
    history: HistoryLog,
    receiver_location: Option<ReceiverLocation>,
    labels: HashMap<u32, String>,
    sinks: Vec<Box<dyn AnnouncementSink>>,
    outbound: VecDeque<TunerCommand>,
    ensemble_any_support: bool,
    dropped_records: u64,
    history_open: bool,
}

impl Coordinator {
    /// New coordinator bound to a tuner
    pub fn new(tuner: Box<dyn TunerPort>) -> Coordinator {
        Coordinator {
            inner: Mutex::new(Inner {
                support: SupportStore::new(),
                active: ActiveStore::new(),
                prefs: Preferences::default(),
                machine: StateMachine::new(),
                history: HistoryLog::new(),
                receiver_location: None,
                labels: HashMap::new(),
                sinks: Vec::new(),
                outbound: VecDeque::new(),
                ensemble_any_support: false,
                dropped_records: 0,
                history_open: false,
            }),
            tuner,
        }
    }

    /// Register a lifecycle observer
    ///
    /// See [`AnnouncementSink`] for the non-blocking contract.
    pub fn register_sink(&self, sink: Box<dyn AnnouncementSink>) {
        self.lock().sinks.push(sink);
    }

    // ------------------------------------------------------------------
    // FIC feed
    // ------------------------------------------------------------------

    /// One decoded FIG 0/18 record arrived
    pub fn on_fig_0_18(&self, record: ServiceSupportRecord) {
        self.with_inner(|inner| inner.handle_support_record(record));
    }

    /// A raw FIG 0/18 payload arrived
    ///
    /// Convenience for feeds that deliver undecoded payloads; wraps
    /// [`wire::parse_fig0_18`] and counts dropped records.
    pub fn on_fig_0_18_payload(&self, payload: &[u8], long_sids: bool) {
        let batch = wire::parse_fig0_18(payload, long_sids);
        self.with_inner(|inner| {
            inner.dropped_records += u64::from(batch.dropped);
            for record in batch.records {
                inner.handle_support_record(record);
            }
        });
    }

    /// A batch of decoded FIG 0/19 records arrived
    ///
    /// Records are processed in signalled order; the duration deadline
    /// is re-checked afterwards.
    pub fn on_fig_0_19(&self, records: Vec<ActiveAnnouncementRecord>) {
        self.with_inner(|inner| {
            for record in records {
                inner.handle_switching_record(record);
            }
            inner.check_deadline();
        });
    }

    /// A raw FIG 0/19 payload arrived
    pub fn on_fig_0_19_payload(&self, payload: &[u8]) {
        let batch = wire::parse_fig0_19(payload);
        self.with_inner(|inner| {
            inner.dropped_records += u64::from(batch.dropped);
            for record in batch.records {
                inner.handle_switching_record(record);
            }
            inner.check_deadline();
        });
    }

    // ------------------------------------------------------------------
    // Tuner and timer
    // ------------------------------------------------------------------

    /// The tuner locked onto a subchannel
    ///
    /// Advances `Switching` → `Playing` or `Restoring` → `Idle` when
    /// the subchannel is the one we asked for; anything else is
    /// ignored.
    pub fn on_tuner_locked(&self, subchannel_id: u8) {
        self.with_inner(|inner| inner.handle_tuner_locked(subchannel_id));
    }

    /// Periodic deadline tick, at most one second apart
    pub fn on_tick(&self) {
        self.with_inner(|inner| inner.check_deadline());
    }

    // ------------------------------------------------------------------
    // User actions
    // ------------------------------------------------------------------

    /// The user selected a service to listen to
    ///
    /// This is the service restored after announcements. Recorded only
    /// while `Idle`; selections mid-announcement are refused.
    pub fn on_original_service_set(&self, service_id: u32, subchannel_id: u8) {
        self.with_inner(|inner| {
            if inner.machine.set_original_service(service_id, subchannel_id) {
                debug!(
                    "original service set to 0x{:04X} on subchannel {}",
                    service_id, subchannel_id
                );
            }
        });
    }

    /// A service label became known (FIG 1)
    ///
    /// Used to name interrupted services in history entries.
    pub fn on_service_label(&self, service_id: u32, label: String) {
        self.with_inner(|inner| {
            inner.labels.insert(service_id, label);
        });
    }

    /// Replace the whole preference set
    pub fn set_preferences(&self, prefs: Preferences) {
        self.with_inner(|inner| inner.prefs = prefs);
    }

    /// Master enable for announcement switching
    pub fn set_enabled(&self, enabled: bool) {
        self.with_inner(|inner| inner.prefs.set_enabled(enabled));
    }

    /// Enable or disable one announcement type
    pub fn set_type_enabled(&self, ty: AnnouncementType, enabled: bool) {
        self.with_inner(|inner| inner.prefs.set_type_enabled(ty, enabled));
    }

    /// Set the priority threshold (clamped into 1..=11)
    pub fn set_priority_threshold(&self, threshold: u8) {
        self.with_inner(|inner| inner.prefs.set_priority_threshold(threshold));
    }

    /// Set the announcement safety timeout
    pub fn set_max_duration(&self, max_duration: Duration) {
        self.with_inner(|inner| inner.prefs.set_max_duration(max_duration));
    }

    /// Allow or forbid manual return
    pub fn set_allow_manual_return(&self, allow: bool) {
        self.with_inner(|inner| inner.prefs.set_allow_manual_return(allow));
    }

    /// Honour or ignore the ensemble alarm cluster (Al flag, FIG 0/0)
    pub fn set_ensemble_alarm_enabled(&self, enabled: bool) {
        self.with_inner(|inner| inner.prefs.set_ensemble_alarm_enabled(enabled));
    }

    /// Set or clear the receiver's own location for EWS filtering
    pub fn set_receiver_location(&self, location: Option<ReceiverLocation>) {
        self.with_inner(|inner| inner.receiver_location = location);
    }

    /// End the current announcement early
    ///
    /// Honoured only while `Playing` and only when the preferences
    /// allow it; reports whether a return was started.
    pub fn return_now(&self) -> bool {
        self.with_inner(|inner| inner.handle_return_now())
    }

    /// Remove a service's announcement support (service lost)
    pub fn clear_support(&self, service_id: u32) {
        self.with_inner(|inner| {
            inner.support.remove(service_id);
            inner.ensemble_any_support = inner.support.any_support();
        });
    }

    /// Drop all announcement state (ensemble change)
    ///
    /// Clears both stores and forces the machine to `Idle`, discarding
    /// any original-service context without a restore. The history log
    /// survives; it describes the past, not the ensemble.
    pub fn reset_all(&self) {
        self.with_inner(|inner| inner.handle_reset());
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Current lifecycle state
    pub fn state(&self) -> State {
        self.lock().machine.state()
    }

    /// The announcement being switched to or played, if any
    pub fn current_announcement(&self) -> Option<ActiveAnnouncementRecord> {
        self.lock().machine.current().cloned()
    }

    /// Time since the current announcement was committed to
    pub fn elapsed(&self) -> Option<Duration> {
        self.lock().machine.elapsed()
    }

    /// The service that will be (or was) restored
    pub fn original_service(&self) -> Option<(u32, u8)> {
        self.lock().machine.original_service()
    }

    /// Current preferences (a copy)
    pub fn preferences(&self) -> Preferences {
        self.lock().prefs.clone()
    }

    /// The receiver's own location, if set
    pub fn receiver_location(&self) -> Option<ReceiverLocation> {
        self.lock().receiver_location
    }

    /// The running announcement on `cluster_id`, if any (a copy)
    pub fn active_announcement(&self, cluster_id: u8) -> Option<ActiveAnnouncementRecord> {
        self.lock().active.get(cluster_id).cloned()
    }

    /// True if any service in the ensemble signals announcement support
    pub fn ensemble_supports_announcements(&self) -> bool {
        self.lock().ensemble_any_support
    }

    /// Completed announcements, oldest → newest (a copy)
    pub fn history(&self) -> Vec<HistoryEntry> {
        self.lock().history.snapshot()
    }

    /// Wire records dropped as malformed since startup
    pub fn malformed_record_count(&self) -> u64 {
        self.lock().dropped_records
    }

    // ------------------------------------------------------------------

    /// Run `f` under the lock, then flush queued tuner commands
    ///
    /// The flush happens strictly after the lock is released; state
    /// transitions never call into the tuner synchronously.
    fn with_inner<R>(&self, f: impl FnOnce(&mut Inner) -> R) -> R {
        let (result, commands) = {
            let mut inner = self.lock();
            let result = f(&mut inner);
            let commands: Vec<TunerCommand> = inner.outbound.drain(..).collect();
            (result, commands)
        };

        for command in commands {
            match command {
                TunerCommand::RetuneToSubchannel(subchannel_id) => {
                    self.tuner.retune_to_subchannel(subchannel_id)
                }
                TunerCommand::RestoreOriginal {
                    service_id,
                    subchannel_id,
                } => self.tuner.restore_original(service_id, subchannel_id),
            }
        }

        result
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // a sink or test that panicked under the lock does not take
        // the whole receiver down with it
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn handle_support_record(&mut self, record: ServiceSupportRecord) {
        debug!(
            "FIG 0/18: service 0x{:04X} supports {:?}, clusters {:?}",
            record.service_id(),
            record.support(),
            record.clusters()
        );
        self.support.upsert(record);
        self.ensemble_any_support = self.support.any_support();
    }

    fn handle_switching_record(&mut self, record: ActiveAnnouncementRecord) {
        let cluster_id = record.cluster_id();
        let ended = !record.is_active();
        self.active.update(record.clone());

        if ended {
            let ours = matches!(self.machine.state(), State::Switching | State::Playing)
                && self.machine.current().map(|c| c.cluster_id()) == Some(cluster_id);
            if ours {
                info!("cluster {} announcement ended; returning to service", cluster_id);
                self.drive_ending();
            }
            // terminations for other clusters only update the store
            return;
        }

        let decision = evaluate(
            &record,
            &self.machine.snapshot(),
            &self.prefs,
            &self.support,
            self.receiver_location.as_ref(),
        );
        match decision {
            Decision::Switch => self.drive_switch(record),
            Decision::Preempt => self.drive_preempt(record),
            Decision::Ignore => {
                debug!("ignoring announcement on cluster {}", cluster_id);
            }
        }
    }

    fn drive_switch(&mut self, record: ActiveAnnouncementRecord) {
        let subchannel_id = record.subchannel_id();
        let from = self.machine.state();

        if self.machine.begin(record) {
            info!("switching to announcement on subchannel {}", subchannel_id);
            self.emit_transition(from, State::Switching);
            self.outbound
                .push_back(TunerCommand::RetuneToSubchannel(subchannel_id));
        } else {
            // e.g. no original service selected yet
            debug!("switch decision not actionable in state \"{}\"", from);
        }
    }

    fn drive_preempt(&mut self, record: ActiveAnnouncementRecord) {
        let subchannel_id = record.subchannel_id();
        let from = self.machine.state();
        let elapsed = self.machine.elapsed().unwrap_or_default();

        if self.machine.preempt(record) {
            info!(
                "preempting with higher-priority announcement on subchannel {}",
                subchannel_id
            );
            // the preempted announcement is over for the listener
            self.close_history_entry(elapsed);
            self.emit_transition(from, State::Switching);
            self.outbound
                .push_back(TunerCommand::RetuneToSubchannel(subchannel_id));
        }
    }

    fn drive_ending(&mut self) {
        let from = self.machine.state();
        let elapsed = self.machine.elapsed().unwrap_or_default();

        if !self.machine.begin_ending() {
            return;
        }
        self.emit_transition(from, State::Ending);
        self.close_history_entry(elapsed);

        if let Some((service_id, subchannel_id)) = self.machine.begin_restoring() {
            self.emit_transition(State::Ending, State::Restoring);
            self.outbound.push_back(TunerCommand::RestoreOriginal {
                service_id,
                subchannel_id,
            });
        }
    }

    fn handle_tuner_locked(&mut self, subchannel_id: u8) {
        match self.machine.state() {
            State::Switching => {
                let expected = self.machine.current().map(|c| c.subchannel_id());
                if expected == Some(subchannel_id) && self.machine.mark_playing() {
                    self.emit_transition(State::Switching, State::Playing);
                    self.open_history_entry();
                } else {
                    debug!(
                        "tuner locked subchannel {} while expecting {:?}",
                        subchannel_id, expected
                    );
                }
            }
            State::Restoring => {
                let expected = self.machine.original_service().map(|(_, subch)| subch);
                if expected == Some(subchannel_id) && self.machine.mark_restored() {
                    self.emit_transition(State::Restoring, State::Idle);
                } else {
                    debug!(
                        "tuner locked subchannel {} while restoring to {:?}",
                        subchannel_id, expected
                    );
                }
            }
            state => {
                debug!("ignoring tuner lock in state \"{}\"", state);
            }
        }
    }

    fn handle_return_now(&mut self) -> bool {
        if !self.prefs.allow_manual_return() {
            debug!("manual return refused by preferences");
            return false;
        }
        if self.machine.state() != State::Playing {
            return false;
        }
        info!("manual return to original service");
        self.drive_ending();
        true
    }

    fn handle_reset(&mut self) {
        let from = self.machine.state();
        let elapsed = self.machine.elapsed().unwrap_or_default();

        self.support.clear();
        self.active.clear();
        self.ensemble_any_support = false;
        self.close_history_entry(elapsed);
        self.machine.reset();

        if from != State::Idle {
            info!("announcement state dropped by reset");
            self.emit_transition(from, State::Idle);
        }
    }

    fn check_deadline(&mut self) {
        if !self.machine.timed_out(self.prefs.max_duration()) {
            return;
        }
        match self.machine.state() {
            State::Playing => warn!(
                "announcement exceeded {} s; forcing return to service",
                self.prefs.max_duration().as_secs()
            ),
            State::Switching => warn!(
                "tuner never confirmed the announcement subchannel; forcing return to service"
            ),
            _ => {}
        }
        self.drive_ending();
    }

    // Append the provisional history entry once audio actually starts
    fn open_history_entry(&mut self) {
        let announcement_type = match self
            .machine
            .current()
            .and_then(|record| record.highest_priority_type())
        {
            Some(ty) => ty,
            None => return,
        };

        let service_name = match self.machine.original_service() {
            Some((service_id, _)) => self
                .labels
                .get(&service_id)
                .cloned()
                .unwrap_or_else(|| format!("0x{:04X}", service_id)),
            None => return,
        };

        self.history
            .append(HistoryEntry::begin(announcement_type, service_name));
        self.history_open = true;
    }

    fn close_history_entry(&mut self, duration: Duration) {
        if !self.history_open {
            return;
        }
        self.history.finalize_last(duration);
        self.history_open = false;

        if let Some(entry) = self.history.last() {
            for sink in &self.sinks {
                sink.announcement_finished(entry);
            }
        }
    }

    fn emit_transition(&self, from: State, to: State) {
        debug!("announcement state: \"{}\" → \"{}\"", from, to);
        for sink in &self.sinks {
            sink.state_changed(from, to);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use crate::codes::{AnnouncementFlags, AnnouncementType};
    use crate::records::ALARM_CLUSTER;

    struct RecordingTuner(Arc<Mutex<Vec<TunerCommand>>>);

    impl TunerPort for RecordingTuner {
        fn retune_to_subchannel(&self, subchannel_id: u8) {
            self.0
                .lock()
                .unwrap()
                .push(TunerCommand::RetuneToSubchannel(subchannel_id));
        }

        fn restore_original(&self, service_id: u32, subchannel_id: u8) {
            self.0.lock().unwrap().push(TunerCommand::RestoreOriginal {
                service_id,
                subchannel_id,
            });
        }
    }

    struct RecordingSink(Arc<Mutex<Vec<(State, State)>>>);

    impl AnnouncementSink for RecordingSink {
        fn state_changed(&self, from: State, to: State) {
            self.0.lock().unwrap().push((from, to));
        }
    }

    fn coordinator() -> (Coordinator, Arc<Mutex<Vec<TunerCommand>>>) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let coordinator = Coordinator::new(Box::new(RecordingTuner(calls.clone())));
        (coordinator, calls)
    }

    fn drain(calls: &Arc<Mutex<Vec<TunerCommand>>>) -> Vec<TunerCommand> {
        std::mem::take(&mut *calls.lock().unwrap())
    }

    fn support(service_id: u32, ty: AnnouncementType, clusters: &[u8]) -> ServiceSupportRecord {
        let mut record =
            ServiceSupportRecord::new(service_id, AnnouncementFlags::from(ty)).unwrap();
        for &cluster in clusters {
            record.add_cluster(cluster);
        }
        record
    }

    fn announcement(cluster: u8, ty: AnnouncementType, subch: u8) -> ActiveAnnouncementRecord {
        ActiveAnnouncementRecord::new(cluster, AnnouncementFlags::from(ty), subch)
    }

    fn termination(cluster: u8) -> ActiveAnnouncementRecord {
        ActiveAnnouncementRecord::new(cluster, AnnouncementFlags::none(), 0)
    }

    // Bring a coordinator to Playing a RoadTraffic announcement on
    // subchannel 18, cluster 1, original service 0x4001/5
    fn playing_traffic() -> (Coordinator, Arc<Mutex<Vec<TunerCommand>>>) {
        let (coordinator, calls) = coordinator();
        coordinator.on_original_service_set(0x4001, 5);
        coordinator.on_service_label(0x4001, "Radio One".to_owned());
        coordinator.on_fig_0_18(support(0x4001, AnnouncementType::RoadTraffic, &[1]));
        coordinator.on_fig_0_19(vec![announcement(1, AnnouncementType::RoadTraffic, 18)]);
        coordinator.on_tuner_locked(18);
        assert_eq!(State::Playing, coordinator.state());
        drain(&calls);
        (coordinator, calls)
    }

    #[test]
    fn test_single_announcement_full_cycle() {
        let (coordinator, calls) = coordinator();
        coordinator.on_original_service_set(0x4001, 5);
        coordinator.on_service_label(0x4001, "Radio One".to_owned());

        coordinator.on_fig_0_18(support(0x4001, AnnouncementType::RoadTraffic, &[1]));
        assert!(coordinator.ensemble_supports_announcements());

        coordinator.on_fig_0_19(vec![announcement(1, AnnouncementType::RoadTraffic, 18)]);
        assert_eq!(State::Switching, coordinator.state());
        assert_eq!(vec![TunerCommand::RetuneToSubchannel(18)], drain(&calls));

        coordinator.on_tuner_locked(18);
        assert_eq!(State::Playing, coordinator.state());
        assert!(coordinator.elapsed().is_some());

        coordinator.on_fig_0_19(vec![termination(1)]);
        assert_eq!(State::Restoring, coordinator.state());
        assert_eq!(
            vec![TunerCommand::RestoreOriginal {
                service_id: 0x4001,
                subchannel_id: 5
            }],
            drain(&calls)
        );

        coordinator.on_tuner_locked(5);
        assert_eq!(State::Idle, coordinator.state());
        assert!(coordinator.current_announcement().is_none());

        let history = coordinator.history();
        assert_eq!(1, history.len());
        assert_eq!(AnnouncementType::RoadTraffic, history[0].announcement_type());
        assert_eq!("Radio One", history[0].service_name());
    }

    #[test]
    fn test_alarm_preempts_traffic() {
        let (coordinator, calls) = playing_traffic();

        coordinator.on_fig_0_19(vec![announcement(1, AnnouncementType::Alarm, 19)]);
        assert_eq!(State::Switching, coordinator.state());
        assert_eq!(vec![TunerCommand::RetuneToSubchannel(19)], drain(&calls));

        coordinator.on_tuner_locked(19);
        assert_eq!(State::Playing, coordinator.state());

        coordinator.on_fig_0_19(vec![termination(1)]);
        coordinator.on_tuner_locked(5);
        assert_eq!(State::Idle, coordinator.state());

        // the original service was restored exactly once, to 0x4001
        assert_eq!(
            vec![
                TunerCommand::RestoreOriginal {
                    service_id: 0x4001,
                    subchannel_id: 5
                }
            ],
            drain(&calls)
        );

        let history = coordinator.history();
        assert_eq!(2, history.len());
        assert_eq!(AnnouncementType::RoadTraffic, history[0].announcement_type());
        assert_eq!(AnnouncementType::Alarm, history[1].announcement_type());
    }

    #[test]
    fn test_lower_priority_is_ignored() {
        let (coordinator, calls) = playing_traffic();

        // escalate to an alarm first
        coordinator.on_fig_0_19(vec![announcement(1, AnnouncementType::Alarm, 19)]);
        coordinator.on_tuner_locked(19);
        drain(&calls);

        // a news flash must not displace it
        coordinator.on_fig_0_19(vec![announcement(1, AnnouncementType::News, 20)]);
        assert_eq!(State::Playing, coordinator.state());
        assert_eq!(
            Some(19),
            coordinator
                .current_announcement()
                .map(|r| r.subchannel_id())
        );
        assert!(drain(&calls).is_empty());
    }

    #[test]
    fn test_service_not_in_cluster() {
        let (coordinator, calls) = coordinator();
        coordinator.on_original_service_set(0x4001, 5);
        coordinator.on_fig_0_18(support(0x4001, AnnouncementType::Alarm, &[1]));

        coordinator.on_fig_0_19(vec![announcement(2, AnnouncementType::Alarm, 18)]);
        assert_eq!(State::Idle, coordinator.state());
        assert!(drain(&calls).is_empty());

        // the announcement is tracked even though we did not switch
        assert!(coordinator.active_announcement(2).is_some());
    }

    #[test]
    fn test_disabled_blocks_ordinary_alarm() {
        let (coordinator, calls) = coordinator();
        coordinator.on_original_service_set(0x4001, 5);
        coordinator.on_fig_0_18(support(0x4001, AnnouncementType::Alarm, &[1]));
        coordinator.set_enabled(false);

        coordinator.on_fig_0_19(vec![announcement(1, AnnouncementType::Alarm, 18)]);
        assert_eq!(State::Idle, coordinator.state());
        assert!(drain(&calls).is_empty());
    }

    #[test]
    fn test_ensemble_alarm_overrides_disable() {
        let (coordinator, calls) = coordinator();
        coordinator.on_original_service_set(0x4001, 5);
        coordinator.set_enabled(false);

        coordinator.on_fig_0_19(vec![announcement(
            ALARM_CLUSTER,
            AnnouncementType::Alarm,
            30,
        )]);
        assert_eq!(State::Switching, coordinator.state());
        assert_eq!(vec![TunerCommand::RetuneToSubchannel(30)], drain(&calls));

        coordinator.on_tuner_locked(30);
        assert_eq!(State::Playing, coordinator.state());
    }

    #[test]
    fn test_timeout_forces_return() {
        let (coordinator, calls) = playing_traffic();
        coordinator.set_max_duration(Duration::from_secs(1));

        // no tick yet: still playing
        assert_eq!(State::Playing, coordinator.state());

        coordinator.lock().machine.backdate_started(Duration::from_millis(1100));
        coordinator.on_tick();
        assert_eq!(State::Restoring, coordinator.state());
        assert_eq!(
            vec![TunerCommand::RestoreOriginal {
                service_id: 0x4001,
                subchannel_id: 5
            }],
            drain(&calls)
        );

        coordinator.on_tuner_locked(5);
        assert_eq!(State::Idle, coordinator.state());

        let history = coordinator.history();
        assert_eq!(1, history.len());
        assert!(history[0].duration() >= Duration::from_secs(1));
        assert!(history[0].duration() < Duration::from_secs(10));
    }

    #[test]
    fn test_stuck_tuner_times_out_from_switching() {
        let (coordinator, calls) = coordinator();
        coordinator.on_original_service_set(0x4001, 5);
        coordinator.on_fig_0_18(support(0x4001, AnnouncementType::RoadTraffic, &[1]));
        coordinator.on_fig_0_19(vec![announcement(1, AnnouncementType::RoadTraffic, 18)]);
        assert_eq!(State::Switching, coordinator.state());
        drain(&calls);

        // the tuner never confirms; the deadline still fires
        coordinator.lock().machine.backdate_started(Duration::from_secs(301));
        coordinator.on_tick();
        assert_eq!(State::Restoring, coordinator.state());

        coordinator.on_tuner_locked(5);
        assert_eq!(State::Idle, coordinator.state());

        // playback never started, so nothing went into the history
        assert!(coordinator.history().is_empty());
    }

    #[test]
    fn test_ews_location_filters_ensemble_alarm() {
        let (coordinator, calls) = coordinator();
        coordinator.on_original_service_set(0x4001, 5);
        coordinator.set_receiver_location(Some("0025-0110-0898".parse().unwrap())); // zone 1

        // alert addressed to zone 2
        let area = crate::records::EwsArea::new(dabplace::pack_wire(2, 36, 11, 46, 2), 0xE);
        let alert = announcement(ALARM_CLUSTER, AnnouncementType::Alarm, 30)
            .with_region(0, Some(area));

        coordinator.on_fig_0_19(vec![alert]);
        assert_eq!(State::Idle, coordinator.state());
        assert!(drain(&calls).is_empty());

        // the same alert addressed to our zone switches
        let area = crate::records::EwsArea::new(dabplace::pack_wire(1, 36, 11, 46, 2), 0xF);
        let alert = announcement(ALARM_CLUSTER, AnnouncementType::Alarm, 30)
            .with_region(0, Some(area));
        coordinator.on_fig_0_19(vec![alert]);
        assert_eq!(State::Switching, coordinator.state());
    }

    #[test]
    fn test_manual_return() {
        let (coordinator, calls) = playing_traffic();

        coordinator.set_allow_manual_return(false);
        assert!(!coordinator.return_now());
        assert_eq!(State::Playing, coordinator.state());
        assert!(drain(&calls).is_empty());

        coordinator.set_allow_manual_return(true);
        assert!(coordinator.return_now());
        assert_eq!(State::Restoring, coordinator.state());

        // return_now in Idle is a no-op
        coordinator.on_tuner_locked(5);
        assert_eq!(State::Idle, coordinator.state());
        assert!(!coordinator.return_now());
    }

    #[test]
    fn test_termination_for_other_cluster_is_ignored() {
        let (coordinator, calls) = playing_traffic();

        coordinator.on_fig_0_19(vec![termination(9)]);
        assert_eq!(State::Playing, coordinator.state());
        assert!(drain(&calls).is_empty());
    }

    #[test]
    fn test_reset_all_discards_announcement() {
        let (coordinator, calls) = playing_traffic();

        coordinator.reset_all();
        assert_eq!(State::Idle, coordinator.state());
        assert_eq!(None, coordinator.original_service());
        assert!(!coordinator.ensemble_supports_announcements());
        // no restore command: the context is discarded, not restored
        assert!(drain(&calls).is_empty());

        // the truncated announcement still closed its history entry
        assert_eq!(1, coordinator.history().len());
    }

    #[test]
    fn test_sink_sees_every_transition() {
        let (coordinator, _calls) = coordinator();
        let seen = Arc::new(Mutex::new(Vec::new()));
        coordinator.register_sink(Box::new(RecordingSink(seen.clone())));

        coordinator.on_original_service_set(0x4001, 5);
        coordinator.on_fig_0_18(support(0x4001, AnnouncementType::RoadTraffic, &[1]));
        coordinator.on_fig_0_19(vec![announcement(1, AnnouncementType::RoadTraffic, 18)]);
        coordinator.on_tuner_locked(18);
        coordinator.on_fig_0_19(vec![termination(1)]);
        coordinator.on_tuner_locked(5);

        assert_eq!(
            vec![
                (State::Idle, State::Switching),
                (State::Switching, State::Playing),
                (State::Playing, State::Ending),
                (State::Ending, State::Restoring),
                (State::Restoring, State::Idle),
            ],
            *seen.lock().unwrap()
        );
    }

    #[test]
    fn test_refresh_keeps_playing() {
        let (coordinator, calls) = playing_traffic();

        // a repeat of the same FIG 0/19 is a refresh, not a preemption
        coordinator.on_fig_0_19(vec![announcement(1, AnnouncementType::RoadTraffic, 18)]);
        assert_eq!(State::Playing, coordinator.state());
        assert!(drain(&calls).is_empty());
        assert_eq!(1, coordinator.history().len());
    }

    #[test]
    fn test_raw_payload_feed_and_malformed_counter() {
        let (coordinator, calls) = coordinator();
        coordinator.on_original_service_set(0x4001, 5);

        // service 0x4001, RoadTraffic support, cluster 1
        coordinator.on_fig_0_18_payload(&[0x40, 0x01, 0x00, 0x02, 0x01, 0x01], false);
        assert!(coordinator.ensemble_supports_announcements());

        // one good record, one with the reserved cluster id
        coordinator.on_fig_0_19_payload(&[
            0x00, 0x00, 0x02, 18, // cluster 0: dropped
            0x01, 0x00, 0x02, 18, // good
        ]);
        assert_eq!(1, coordinator.malformed_record_count());
        assert_eq!(State::Switching, coordinator.state());
        assert_eq!(vec![TunerCommand::RetuneToSubchannel(18)], drain(&calls));
    }

    #[test]
    fn test_service_selection_refused_mid_announcement() {
        let (coordinator, _calls) = playing_traffic();

        coordinator.on_original_service_set(0x9002, 7);
        assert_eq!(Some((0x4001, 5)), coordinator.original_service());
    }
}
