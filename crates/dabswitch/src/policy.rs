//! The switching decision

use dabplace::ReceiverLocation;

use crate::machine::Snapshot;
use crate::prefs::Preferences;
use crate::records::ActiveAnnouncementRecord;
use crate::stores::SupportStore;

/// What to do about one FIG 0/19 record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Decision {
    /// Interrupt the selected service and retune to the announcement
    Switch,

    /// Replace the announcement already playing, keeping the original
    /// service context for the eventual restore
    Preempt,

    /// Leave the receiver where it is
    Ignore,
}

/// Decide whether `record` should interrupt the receiver
///
/// A pure function of its arguments: same inputs, same decision, no
/// mutation. The rules fire in order; the first hit wins.
///
/// 1. An all-clear flag field is a termination, not an announcement:
///    `Ignore`. (The Coordinator handles the return separately.)
/// 2. A record carrying an EWS geographic address must match the
///    receiver location. No receiver location, an unassigned NFF, a
///    bad alert checksum, or a plain mismatch: `Ignore`, even for
///    ensemble alarms. Records without an address skip this rule.
/// 3. Ensemble alarm override: cluster `0xFF` bypasses the user's
///    filters while the ensemble Al flag is honoured, and is ignored
///    outright while it is not (ETSI EN 300 401 §8.1.2).
/// 4. Switching disabled: `Ignore`.
/// 5. The record's most urgent type is disabled: `Ignore`.
/// 6. The type's priority number exceeds the threshold: `Ignore`.
/// 7. The selected service has a support record that does not list
///    the announcement's cluster: `Ignore`. (A service must opt into
///    a cluster to receive from it.)
/// 8. An announcement is already underway: strictly more urgent
///    newcomers `Preempt`; everything else, ties included, is
///    ignored in favour of the incumbent.
/// 9. Otherwise: `Switch`.
pub fn evaluate(
    record: &ActiveAnnouncementRecord,
    machine: &Snapshot,
    prefs: &Preferences,
    support: &SupportStore,
    receiver_location: Option<&ReceiverLocation>,
) -> Decision {
    // 1: termination
    let announced = match record.highest_priority_type() {
        Some(ty) => ty,
        None => return Decision::Ignore,
    };
    let priority = announced.priority();

    // 2: EWS geographic filter
    if let Some(area) = record.ews_area() {
        let matched = receiver_location
            .map(|location| location.matches_wire(area.data(), area.nff()))
            .unwrap_or(false);
        if !matched {
            return Decision::Ignore;
        }
    }

    // 3: ensemble alarm override
    if record.is_ensemble_alarm() {
        if !prefs.ensemble_alarm_enabled() {
            return Decision::Ignore;
        }
        return match machine.current_priority {
            Some(current) if priority < current => Decision::Preempt,
            Some(_) => Decision::Ignore,
            None => Decision::Switch,
        };
    }

    // 4: master enable
    if !prefs.enabled() {
        return Decision::Ignore;
    }

    // 5: per-type filter
    if !prefs.type_enabled(announced) {
        return Decision::Ignore;
    }

    // 6: priority threshold
    if priority > prefs.priority_threshold() {
        return Decision::Ignore;
    }

    // 7: cluster membership of the selected service
    if machine.original_service_id != 0
        && support.get(machine.original_service_id).is_some()
        && !support.participates(machine.original_service_id, record.cluster_id())
    {
        return Decision::Ignore;
    }

    // 8: arbitration against the incumbent
    if let Some(current) = machine.current_priority {
        return if priority < current {
            Decision::Preempt
        } else {
            Decision::Ignore
        };
    }

    // 9
    Decision::Switch
}
