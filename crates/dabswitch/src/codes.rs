//! Announcement types and the ASu/ASw flag field

use std::fmt;

use strum::EnumMessage;

/// DAB announcement type (ETSI EN 300 401 Table 14)
///
/// Each type occupies one bit of the 16-bit ASu/ASw flag fields; the
/// discriminant is the bit number. Bit numbers double as the priority
/// ranking: `Alarm` (bit 0) is the most urgent announcement a
/// broadcaster can signal, `Financial` (bit 10) the least.
///
/// ```
/// use dabswitch::AnnouncementType;
///
/// assert_eq!(1, AnnouncementType::Alarm.priority());
/// assert_eq!(11, AnnouncementType::Financial.priority());
/// assert_eq!("Road Traffic flash", AnnouncementType::RoadTraffic.as_display_str());
/// assert_eq!(
///     "Road Traffic flash",
///     format!("{}", AnnouncementType::RoadTraffic)
/// );
/// ```
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    strum_macros::EnumMessage,
    strum_macros::EnumIter,
)]
#[repr(u8)]
pub enum AnnouncementType {
    /// Emergency alarm (bit 0, priority 1)
    #[strum(detailed_message = "Alarm")]
    Alarm = 0,

    /// Road traffic flash (bit 1)
    #[strum(detailed_message = "Road Traffic flash")]
    RoadTraffic = 1,

    /// Public transport flash (bit 2)
    #[strum(detailed_message = "Transport flash")]
    TransportFlash = 2,

    /// Warning / service announcement (bit 3)
    #[strum(detailed_message = "Warning/Service")]
    Warning = 3,

    /// News flash (bit 4)
    #[strum(detailed_message = "News flash")]
    News = 4,

    /// Area weather flash (bit 5)
    #[strum(detailed_message = "Area weather flash")]
    Weather = 5,

    /// Event announcement (bit 6)
    #[strum(detailed_message = "Event announcement")]
    Event = 6,

    /// Special event (bit 7)
    #[strum(detailed_message = "Special event")]
    SpecialEvent = 7,

    /// Programme information (bit 8)
    #[strum(detailed_message = "Programme information")]
    ProgrammeInfo = 8,

    /// Sport report (bit 9)
    #[strum(detailed_message = "Sport report")]
    Sport = 9,

    /// Financial report (bit 10, priority 11)
    #[strum(detailed_message = "Financial report")]
    Financial = 10,
}

impl AnnouncementType {
    /// Number of assigned announcement types
    pub const COUNT: u8 = 11;

    /// Decode a flag-field bit number
    ///
    /// Returns `None` for the reserved bits 11..=15 and anything
    /// larger.
    pub fn from_bit(bit: u8) -> Option<AnnouncementType> {
        match bit {
            0 => Some(AnnouncementType::Alarm),
            1 => Some(AnnouncementType::RoadTraffic),
            2 => Some(AnnouncementType::TransportFlash),
            3 => Some(AnnouncementType::Warning),
            4 => Some(AnnouncementType::News),
            5 => Some(AnnouncementType::Weather),
            6 => Some(AnnouncementType::Event),
            7 => Some(AnnouncementType::SpecialEvent),
            8 => Some(AnnouncementType::ProgrammeInfo),
            9 => Some(AnnouncementType::Sport),
            10 => Some(AnnouncementType::Financial),
            _ => None,
        }
    }

    /// Bit number in the ASu/ASw flag fields (0..=10)
    pub fn bit(&self) -> u8 {
        *self as u8
    }

    /// Priority ranking (1 = most urgent, 11 = least)
    ///
    /// Per ETSI EN 300 401 §8.1.6.1 the priority order is the bit
    /// order, so this is just `bit() + 1`.
    pub fn priority(&self) -> u8 {
        *self as u8 + 1
    }

    /// Human-readable name, like "`Road Traffic flash`"
    pub fn as_display_str(&self) -> &'static str {
        self.get_detailed_message().expect("missing definition")
    }
}

impl fmt::Display for AnnouncementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_display_str().fmt(f)
    }
}

/// The 16-bit ASu/ASw announcement flag field
///
/// Bit *i* set means announcement type *i* is supported (ASu, FIG
/// 0/18) or currently active (ASw, FIG 0/19). Bits 11..=15 are
/// reserved: they survive a raw round-trip untouched but are ignored
/// by every query, so a field whose only set bits are reserved
/// behaves as empty. An all-clear ASw field signals the end of an
/// announcement.
///
/// ```
/// use dabswitch::{AnnouncementFlags, AnnouncementType};
///
/// let mut flags = AnnouncementFlags::none();
/// flags.set(AnnouncementType::News);
/// flags.set(AnnouncementType::Alarm);
///
/// assert!(flags.supports(AnnouncementType::Alarm));
/// assert_eq!(Some(AnnouncementType::Alarm), flags.highest_priority());
///
/// let in_priority_order: Vec<_> = flags.iter().collect();
/// assert_eq!(
///     vec![AnnouncementType::Alarm, AnnouncementType::News],
///     in_priority_order
/// );
/// ```
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AnnouncementFlags(u16);

impl AnnouncementFlags {
    /// Mask of the eleven assigned bits
    const ASSIGNED: u16 = (1 << AnnouncementType::COUNT) - 1;

    /// An all-clear flag field
    pub fn none() -> AnnouncementFlags {
        AnnouncementFlags(0)
    }

    /// Wrap a raw 16-bit field as received off the wire
    ///
    /// Reserved bits are preserved so the value round-trips
    /// bit-exactly; they have no effect on any query.
    pub fn from_raw(raw: u16) -> AnnouncementFlags {
        AnnouncementFlags(raw)
    }

    /// The raw 16-bit field, reserved bits included
    pub fn as_raw(&self) -> u16 {
        self.0
    }

    /// Set the bit for `ty`
    pub fn set(&mut self, ty: AnnouncementType) {
        self.0 |= 1 << ty.bit();
    }

    /// Clear the bit for `ty`
    pub fn clear(&mut self, ty: AnnouncementType) {
        self.0 &= !(1 << ty.bit());
    }

    /// True if the bit for `ty` is set
    pub fn supports(&self, ty: AnnouncementType) -> bool {
        self.0 & (1 << ty.bit()) != 0
    }

    /// True if any assigned bit is set
    ///
    /// Reserved bits do not count: an ASw field of, say, `0x0800`
    /// still encodes "announcement ended."
    pub fn any(&self) -> bool {
        self.0 & Self::ASSIGNED != 0
    }

    /// The most urgent type in the field
    ///
    /// Returns the set bit with the smallest bit number, which is by
    /// construction the smallest priority number. `None` if the field
    /// is empty.
    pub fn highest_priority(&self) -> Option<AnnouncementType> {
        AnnouncementType::from_bit((self.0 & Self::ASSIGNED).trailing_zeros() as u8)
    }

    /// Iterate over set types in ascending priority number
    ///
    /// The first item, if any, equals
    /// [`highest_priority()`](Self::highest_priority).
    pub fn iter(&self) -> impl Iterator<Item = AnnouncementType> + '_ {
        let field = *self;
        (0..AnnouncementType::COUNT)
            .filter_map(AnnouncementType::from_bit)
            .filter(move |ty| field.supports(*ty))
    }
}

impl From<AnnouncementType> for AnnouncementFlags {
    /// A field with exactly one bit set
    fn from(ty: AnnouncementType) -> AnnouncementFlags {
        let mut flags = AnnouncementFlags::none();
        flags.set(ty);
        flags
    }
}

impl FromIterator<AnnouncementType> for AnnouncementFlags {
    fn from_iter<I: IntoIterator<Item = AnnouncementType>>(types: I) -> AnnouncementFlags {
        let mut flags = AnnouncementFlags::none();
        for ty in types {
            flags.set(ty);
        }
        flags
    }
}

impl fmt::Debug for AnnouncementFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AnnouncementFlags({:#06x})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use strum::IntoEnumIterator;

    #[test]
    fn test_priority_is_enum_order() {
        let mut previous: Option<AnnouncementType> = None;
        for ty in AnnouncementType::iter() {
            assert_eq!(ty.bit() + 1, ty.priority());
            if let Some(prev) = previous {
                assert!(prev < ty);
                assert!(prev.priority() < ty.priority());
            }
            previous = Some(ty);
        }

        assert_eq!(AnnouncementType::COUNT, AnnouncementType::Financial.bit() + 1);
    }

    #[test]
    fn test_from_bit() {
        for ty in AnnouncementType::iter() {
            assert_eq!(Some(ty), AnnouncementType::from_bit(ty.bit()));
            // display names exist for every variant
            assert!(!ty.as_display_str().is_empty());
        }
        for reserved in 11u8..=16 {
            assert_eq!(None, AnnouncementType::from_bit(reserved));
        }
    }

    #[test]
    fn test_flag_round_trip() {
        for ty in AnnouncementType::iter() {
            let mut flags = AnnouncementFlags::none();
            flags.set(ty);
            assert!(flags.supports(ty));
            assert!(flags.any());

            flags.clear(ty);
            assert!(!flags.supports(ty));
            assert!(!flags.any());
        }

        // raw round-trip is bit-exact over the assigned range
        for word in [0x0000u16, 0x0001, 0x0401, 0x07FF] {
            assert_eq!(word, AnnouncementFlags::from_raw(word).as_raw());
        }

        // reserved bits survive the round-trip but never read as activity
        let reserved_only = AnnouncementFlags::from_raw(0xF800);
        assert_eq!(0xF800, reserved_only.as_raw());
        assert!(!reserved_only.any());
        assert_eq!(None, reserved_only.highest_priority());
    }

    #[test]
    fn test_enumeration_order() {
        let flags: AnnouncementFlags = [
            AnnouncementType::Sport,
            AnnouncementType::RoadTraffic,
            AnnouncementType::Weather,
        ]
        .into_iter()
        .collect();

        let order: Vec<_> = flags.iter().collect();
        assert_eq!(
            vec![
                AnnouncementType::RoadTraffic,
                AnnouncementType::Weather,
                AnnouncementType::Sport
            ],
            order
        );
        assert_eq!(flags.highest_priority(), order.first().copied());

        // restartable
        assert_eq!(order, flags.iter().collect::<Vec<_>>());
    }

    #[test]
    fn test_highest_priority() {
        assert_eq!(None, AnnouncementFlags::none().highest_priority());

        let mut flags = AnnouncementFlags::from(AnnouncementType::Financial);
        assert_eq!(Some(AnnouncementType::Financial), flags.highest_priority());

        flags.set(AnnouncementType::News);
        assert_eq!(Some(AnnouncementType::News), flags.highest_priority());

        flags.set(AnnouncementType::Alarm);
        assert_eq!(Some(AnnouncementType::Alarm), flags.highest_priority());
    }
}
