//! # dabswitch: DAB Announcement Switching
//!
//! This crate decides, in real time, whether a DAB receiver should
//! interrupt the listener's selected service for an announcement
//! (a traffic flash, an emergency alarm, a weather warning), play
//! it, and then restore the original service. It implements the
//! announcement support and switching machinery of
//! ETSI EN 300 401 §8.1.6 together with the Emergency Warning System
//! geographic filtering of ETSI TS 104 090.
//!
//! ## How switching works
//!
//! Broadcasters signal announcements through two FIG types in the
//! Fast Information Channel:
//!
//! * **FIG 0/18** (announcement support) says, per service, which
//!   announcement types it supports and which *clusters* it belongs
//!   to. A cluster is a broadcaster-defined group of services sharing
//!   announcement signalling.
//! * **FIG 0/19** (announcement switching) says, per cluster, which
//!   announcement types are live right now and on which subchannel
//!   the announcement audio is carried. An all-clear flag field ends
//!   the announcement.
//!
//! The [`Coordinator`] consumes both feeds, consults the user's
//! [`Preferences`] and the receiver's [`ReceiverLocation`] (for
//! EWS-addressed alerts), and drives a six-[`State`] lifecycle:
//! retune to the announcement, play it, and restore the original
//! service when it ends, times out, or the user bails.
//! Higher-priority announcements preempt lower-priority ones in
//! place; the original service is restored only once, at the end.
//!
//! ## Example
//!
//! ```
//! use dabswitch::{
//!     AnnouncementFlags, AnnouncementType, ActiveAnnouncementRecord, Coordinator,
//!     ServiceSupportRecord, State, TunerPort,
//! };
//!
//! struct NullTuner;
//! impl TunerPort for NullTuner {
//!     fn retune_to_subchannel(&self, _subchannel_id: u8) {}
//!     fn restore_original(&self, _service_id: u32, _subchannel_id: u8) {}
//! }
//!
//! let coordinator = Coordinator::new(Box::new(NullTuner));
//!
//! // the user is listening to service 0x4001 on subchannel 5
//! coordinator.on_original_service_set(0x4001, 5);
//!
//! // FIG 0/18: that service takes road traffic flashes via cluster 1
//! let mut support = ServiceSupportRecord::new(
//!     0x4001,
//!     AnnouncementFlags::from(AnnouncementType::RoadTraffic),
//! )
//! .unwrap();
//! support.add_cluster(1);
//! coordinator.on_fig_0_18(support);
//!
//! // FIG 0/19: a traffic flash is live on subchannel 18
//! coordinator.on_fig_0_19(vec![ActiveAnnouncementRecord::new(
//!     1,
//!     AnnouncementFlags::from(AnnouncementType::RoadTraffic),
//!     18,
//! )]);
//! assert_eq!(State::Switching, coordinator.state());
//!
//! // the tuner confirms, the announcement plays
//! coordinator.on_tuner_locked(18);
//! assert_eq!(State::Playing, coordinator.state());
//! ```
//!
//! ## Threading
//!
//! A `Coordinator` is shared freely between the FIC-decoder thread,
//! the tuner callback thread, the UI, and a periodic ticker. One
//! internal mutex protects all state; entry points never block on
//! anything but that lock, and outbound tuner commands are delivered
//! after it is released. Observers always return copies.
//!
//! ## Crates in this workspace
//!
//! * [`dabplace`]: EWS location codes and geographic matching,
//!   usable on its own.
//! * `annsim`: a developer CLI that drives a `Coordinator` from
//!   scripted FIG payloads.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod codes;
mod coordinator;
mod history;
mod machine;
mod policy;
mod prefs;
mod records;
mod stores;
pub mod wire;

pub use dabplace::ReceiverLocation;

pub use codes::{AnnouncementFlags, AnnouncementType};
pub use coordinator::{AnnouncementSink, Coordinator, TunerCommand, TunerPort};
pub use history::{HistoryEntry, HistoryLog};
pub use machine::{Snapshot, State, StateMachine};
pub use policy::{evaluate, Decision};
pub use prefs::{Preferences, DEFAULT_MAX_DURATION, THRESHOLD_ALL};
pub use records::{
    ActiveAnnouncementRecord, ClusterList, EwsArea, ServiceSupportRecord, ALARM_CLUSTER,
    MAX_SUBCHANNEL,
};
pub use stores::{ActiveStore, SupportStore, UpdateOutcome};
