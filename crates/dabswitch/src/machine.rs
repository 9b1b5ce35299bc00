//! Announcement switching state machine

use std::fmt;
use std::time::{Duration, Instant};

use crate::records::ActiveAnnouncementRecord;

/// Lifecycle state of the announcement switcher
///
/// The states follow ETSI EN 300 401 §8.1.6.3:
///
/// ```txt
///   Idle ───────────────────────┐
///    ↑                          ↓
///    │                      (Detected)
///    │                          ↓
///    │                      Switching ←──┐
///    │                          ↓        │ preemption
///    │                       Playing ────┘
///    │                          ↓
///    │                       Ending
///    │                          ↓
///    └──────────────────── Restoring
/// ```
///
/// `Detected` is reserved for front-ends that pre-announce an
/// upcoming switch; this machine collapses `Idle` directly into
/// `Switching` and never enters it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum State {
    /// Playing the user's selected service; no announcement
    Idle,

    /// An eligible announcement was detected (reserved for UIs)
    Detected,

    /// Retune to the announcement subchannel requested
    Switching,

    /// Playing announcement audio
    Playing,

    /// The announcement is over; about to restore
    Ending,

    /// Retune back to the original service requested
    Restoring,
}

impl AsRef<str> for State {
    fn as_ref(&self) -> &str {
        match self {
            State::Idle => "idle",
            State::Detected => "announcement detected",
            State::Switching => "switching to announcement",
            State::Playing => "playing announcement",
            State::Ending => "announcement ending",
            State::Restoring => "restoring original service",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_ref().fmt(f)
    }
}

/// The machine fields a switching decision may consult
///
/// A plain value so [`crate::policy::evaluate`] stays a pure function
/// of its arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Snapshot {
    /// Service selected by the user; 0 when none
    pub original_service_id: u32,

    /// Priority number of the announcement currently being played or
    /// switched to, when there is one
    pub current_priority: Option<u8>,
}

/// Six-state announcement lifecycle
///
/// All methods are infallible no-ops when called in the wrong state:
/// they report what happened and never panic. Clock readings use
/// [`Instant`], so deadline checks are immune to wall-clock steps.
///
/// The original-service context survives a normal return to `Idle`
/// (the user is still listening to that service); only
/// [`reset()`](StateMachine::reset) discards it.
#[derive(Clone, Debug)]
pub struct StateMachine {
    state: State,
    original_service_id: u32,
    original_subchannel_id: u8,
    current: Option<ActiveAnnouncementRecord>,
    started_at: Option<Instant>,
}

impl Default for StateMachine {
    fn default() -> StateMachine {
        StateMachine {
            state: State::Idle,
            original_service_id: 0,
            original_subchannel_id: 0,
            current: None,
            started_at: None,
        }
    }
}

impl StateMachine {
    /// New machine in `Idle` with no service context
    pub fn new() -> StateMachine {
        StateMachine::default()
    }

    /// Current lifecycle state
    pub fn state(&self) -> State {
        self.state
    }

    /// The service to restore after an announcement, when known
    pub fn original_service(&self) -> Option<(u32, u8)> {
        (self.original_service_id != 0)
            .then_some((self.original_service_id, self.original_subchannel_id))
    }

    /// The announcement being switched to or played
    pub fn current(&self) -> Option<&ActiveAnnouncementRecord> {
        self.current.as_ref()
    }

    /// Time since the current announcement was committed to
    ///
    /// Measured from the retune request, so a tuner that never
    /// confirms still runs out the clock. `None` outside
    /// `Switching`/`Playing`.
    pub fn elapsed(&self) -> Option<Duration> {
        match self.state {
            State::Switching | State::Playing => self.started_at.map(|t| t.elapsed()),
            _ => None,
        }
    }

    /// Fields the switching policy consults
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            original_service_id: self.original_service_id,
            current_priority: match self.state {
                State::Switching | State::Playing => self
                    .current
                    .as_ref()
                    .and_then(|record| record.highest_priority_type())
                    .map(|ty| ty.priority()),
                _ => None,
            },
        }
    }

    /// Record the user's selected service
    ///
    /// Only honoured while `Idle`: a selection mid-announcement
    /// would desynchronize the restore target. Service id 0 is
    /// refused.
    pub fn set_original_service(&mut self, service_id: u32, subchannel_id: u8) -> bool {
        if self.state != State::Idle || service_id == 0 {
            return false;
        }
        self.original_service_id = service_id;
        self.original_subchannel_id = subchannel_id;
        true
    }

    /// Commit to an announcement: `Idle` → `Switching`
    ///
    /// Requires an original service to restore to and an active
    /// record. Marks the announcement start time.
    pub fn begin(&mut self, record: ActiveAnnouncementRecord) -> bool {
        if self.state != State::Idle || self.original_service_id == 0 || !record.is_active() {
            return false;
        }
        self.current = Some(record);
        self.started_at = Some(Instant::now());
        self.state = State::Switching;
        true
    }

    /// Replace the current announcement in place: → `Switching`
    ///
    /// The original-service context is preserved across preemptions;
    /// only the eventual `Ending` restores it. The duration clock
    /// restarts for the new announcement.
    pub fn preempt(&mut self, record: ActiveAnnouncementRecord) -> bool {
        if !matches!(self.state, State::Switching | State::Playing) || !record.is_active() {
            return false;
        }
        self.current = Some(record);
        self.started_at = Some(Instant::now());
        self.state = State::Switching;
        true
    }

    /// Tuner confirmed the announcement subchannel: `Switching` → `Playing`
    pub fn mark_playing(&mut self) -> bool {
        if self.state != State::Switching {
            return false;
        }
        self.state = State::Playing;
        true
    }

    /// The announcement is over: `Switching`/`Playing` → `Ending`
    ///
    /// Reached on termination (all-clear ASw), timeout, or manual
    /// return.
    pub fn begin_ending(&mut self) -> bool {
        if !matches!(self.state, State::Switching | State::Playing) {
            return false;
        }
        self.state = State::Ending;
        true
    }

    /// Start the restore: `Ending` → `Restoring`
    ///
    /// Returns the original service to retune to.
    pub fn begin_restoring(&mut self) -> Option<(u32, u8)> {
        if self.state != State::Ending {
            return None;
        }
        self.state = State::Restoring;
        Some((self.original_service_id, self.original_subchannel_id))
    }

    /// Tuner confirmed the original service: `Restoring` → `Idle`
    ///
    /// Clears the announcement context; the original-service context
    /// is retained for the next announcement.
    pub fn mark_restored(&mut self) -> bool {
        if self.state != State::Restoring {
            return false;
        }
        self.state = State::Idle;
        self.current = None;
        self.started_at = None;
        true
    }

    /// True once the duration deadline has passed
    ///
    /// Armed in `Switching` as well as `Playing`, so a tuner that
    /// never confirms cannot strand the machine.
    pub fn timed_out(&self, max_duration: Duration) -> bool {
        match self.state {
            State::Switching | State::Playing => self
                .started_at
                .map(|t| t.elapsed() >= max_duration)
                .unwrap_or(false),
            _ => false,
        }
    }

    /// Drop everything and return to `Idle`
    ///
    /// Discards the original-service context too; used on ensemble
    /// change and full reset.
    pub fn reset(&mut self) {
        *self = StateMachine::default();
    }

    /// Back-date the announcement start time, for deadline tests
    #[cfg(test)]
    pub(crate) fn backdate_started(&mut self, by: Duration) {
        if let Some(started) = self.started_at.as_mut() {
            *started -= by;
        }
    }
}
