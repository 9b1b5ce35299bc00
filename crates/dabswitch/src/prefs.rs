//! User preferences for announcement switching

use std::path::Path;
use std::time::Duration;

#[cfg(not(test))]
use log::warn;

#[cfg(test)]
use std::println as warn;

use serde::{Deserialize, Serialize};

use crate::codes::AnnouncementType;

/// Priority threshold admitting every announcement type
pub const THRESHOLD_ALL: u8 = 11;

/// Default safety timeout for a single announcement
pub const DEFAULT_MAX_DURATION: Duration = Duration::from_secs(300);

/// Legal range for the persisted maximum duration, in seconds
const MAX_DURATION_RANGE: (u64, u64) = (30, 600);

/// Switching policy configured by the user
///
/// Controls which announcements are allowed to interrupt the selected
/// service and how the receiver behaves while one plays. Defaults
/// admit everything: switching enabled, all types enabled, threshold
/// at the least-urgent priority, manual return allowed, a five-minute
/// safety timeout, and ensemble alarms honoured.
///
/// The priority threshold is clamped into 1..=11 by every mutation
/// path, so a held value is always in range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Preferences {
    enabled: bool,
    type_enabled: [bool; AnnouncementType::COUNT as usize],
    priority_threshold: u8,
    allow_manual_return: bool,
    max_duration: Duration,
    ensemble_alarm_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Preferences {
        Preferences {
            enabled: true,
            type_enabled: [true; AnnouncementType::COUNT as usize],
            priority_threshold: THRESHOLD_ALL,
            allow_manual_return: true,
            max_duration: DEFAULT_MAX_DURATION,
            ensemble_alarm_enabled: true,
        }
    }
}

impl Preferences {
    /// Master enable for announcement switching
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable switching entirely
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Per-type enable for `ty`
    pub fn type_enabled(&self, ty: AnnouncementType) -> bool {
        self.type_enabled[ty.bit() as usize]
    }

    /// Enable or disable a single announcement type
    pub fn set_type_enabled(&mut self, ty: AnnouncementType, enabled: bool) {
        self.type_enabled[ty.bit() as usize] = enabled;
    }

    /// Priority threshold: only types with `priority() <= threshold`
    /// may switch (1 admits only Alarm, 11 admits everything)
    pub fn priority_threshold(&self) -> u8 {
        self.priority_threshold
    }

    /// Set the priority threshold, clamped into 1..=11
    pub fn set_priority_threshold(&mut self, threshold: u8) {
        self.priority_threshold = threshold.clamp(1, THRESHOLD_ALL);
    }

    /// Whether the user may end an announcement early
    pub fn allow_manual_return(&self) -> bool {
        self.allow_manual_return
    }

    /// Allow or forbid ending an announcement early
    pub fn set_allow_manual_return(&mut self, allow: bool) {
        self.allow_manual_return = allow;
    }

    /// Safety timeout after which an announcement is abandoned
    pub fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Set the safety timeout
    pub fn set_max_duration(&mut self, max_duration: Duration) {
        self.max_duration = max_duration;
    }

    /// Whether ensemble-wide alarms (cluster `0xFF`) are honoured
    ///
    /// Mirrors the ensemble's Al flag (ETSI EN 300 401 §8.1.2): when
    /// clear, alarm-cluster announcements are ignored outright.
    pub fn ensemble_alarm_enabled(&self) -> bool {
        self.ensemble_alarm_enabled
    }

    /// Honour or ignore the ensemble alarm cluster
    pub fn set_ensemble_alarm_enabled(&mut self, enabled: bool) {
        self.ensemble_alarm_enabled = enabled;
    }

    /// Load preferences from the persisted settings file
    ///
    /// Any failure—missing file, unreadable JSON, wrong value types—
    /// falls back silently to [`Preferences::default()`]; a warning is
    /// logged once per call. Out-of-range values are clamped rather
    /// than rejected. Unknown keys are ignored; missing keys take
    /// their defaults.
    pub fn load(path: &Path) -> Preferences {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!(
                    "announcement preferences not loaded from {}: {}; using defaults",
                    path.display(),
                    err
                );
                return Preferences::default();
            }
        };

        match serde_json::from_str::<SettingsFile>(&text) {
            Ok(file) => Preferences::from(file.announcements),
            Err(err) => {
                warn!(
                    "announcement preferences in {} are unreadable: {}; using defaults",
                    path.display(),
                    err
                );
                Preferences::default()
            }
        }
    }

    /// Persist preferences to the settings file
    ///
    /// Reports success; on failure the file's previous contents are
    /// whatever the filesystem left them as, and the in-memory values
    /// are untouched.
    pub fn save(&self, path: &Path) -> bool {
        let file = SettingsFile {
            announcements: RawPreferences::from(self),
        };
        let text = match serde_json::to_string_pretty(&file) {
            Ok(text) => text,
            Err(err) => {
                warn!("announcement preferences not serialized: {}", err);
                return false;
            }
        };

        match std::fs::write(path, text) {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "announcement preferences not saved to {}: {}",
                    path.display(),
                    err
                );
                false
            }
        }
    }
}

/// On-disk settings document; preferences live under the
/// `Announcements` namespace
#[derive(Serialize, Deserialize, Default)]
struct SettingsFile {
    #[serde(rename = "Announcements", default)]
    announcements: RawPreferences,
}

/// The persisted key/value record, exactly as written to disk
#[derive(Serialize, Deserialize)]
#[serde(default)]
struct RawPreferences {
    enabled: bool,
    #[serde(rename = "minPriority")]
    min_priority: u8,
    #[serde(rename = "maxDuration")]
    max_duration: u64,
    #[serde(rename = "allowManualReturn")]
    allow_manual_return: bool,
    #[serde(rename = "ensembleAlarmEnabled")]
    ensemble_alarm_enabled: bool,
    #[serde(rename = "enabledTypes")]
    enabled_types: Vec<u8>,
}

impl Default for RawPreferences {
    fn default() -> RawPreferences {
        RawPreferences::from(&Preferences::default())
    }
}

impl From<&Preferences> for RawPreferences {
    fn from(prefs: &Preferences) -> RawPreferences {
        RawPreferences {
            enabled: prefs.enabled,
            min_priority: prefs.priority_threshold,
            max_duration: prefs.max_duration.as_secs(),
            allow_manual_return: prefs.allow_manual_return,
            ensemble_alarm_enabled: prefs.ensemble_alarm_enabled,
            enabled_types: (0..AnnouncementType::COUNT)
                .filter_map(AnnouncementType::from_bit)
                .filter(|ty| prefs.type_enabled(*ty))
                .map(|ty| ty.bit())
                .collect(),
        }
    }
}

impl From<RawPreferences> for Preferences {
    fn from(raw: RawPreferences) -> Preferences {
        let mut prefs = Preferences {
            enabled: raw.enabled,
            type_enabled: [false; AnnouncementType::COUNT as usize],
            priority_threshold: raw.min_priority.clamp(1, THRESHOLD_ALL),
            allow_manual_return: raw.allow_manual_return,
            max_duration: Duration::from_secs(
                raw.max_duration
                    .clamp(MAX_DURATION_RANGE.0, MAX_DURATION_RANGE.1),
            ),
            ensemble_alarm_enabled: raw.ensemble_alarm_enabled,
        };

        // bit numbers outside the assigned range are ignored
        for ty in raw.enabled_types.iter().filter_map(|&b| AnnouncementType::from_bit(b)) {
            prefs.set_type_enabled(ty, true);
        }

        prefs
    }
}
