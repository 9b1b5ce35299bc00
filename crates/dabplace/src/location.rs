//! Location code parsing, formatting, and hierarchical matching

use std::fmt;
use std::str::FromStr;

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

/// Highest legal zone number (ETSI TS 104 090 §5.1)
pub const MAX_ZONE: u8 = 41;

/// Mask for one six-bit hierarchy field
const FIELD_MASK: u32 = 0x3F;

/// Error decoding a location code
#[derive(Error, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LocationCodeError {
    /// The input matches neither the display nor the hex grammar
    #[error("location code matches neither \"dddd-dddd-dddd\" nor \"Z<zone>:<hex>\"")]
    UnrecognizedFormat,

    /// A display-format group exceeds its ten-bit range
    #[error("display-format group exceeds 1023")]
    GroupOutOfRange,

    /// The zone is outside 0..=41
    #[error("zone exceeds {MAX_ZONE}")]
    ZoneOutOfRange,

    /// A hierarchy level exceeds its six-bit range
    #[error("hierarchy level exceeds 63")]
    LevelOutOfRange,

    /// A stored checksum disagrees with the encoded location
    #[error("checksum does not match encoded location")]
    ChecksumMismatch,
}

/// Compute the Annex B checksum for a location code
///
/// The zone and the 24-bit location value are packed into four
/// octets—zone left-aligned in the top octet, location right-aligned—
/// which are XORed together and inverted:
///
/// ```
/// use dabplace::compute_checksum;
///
/// assert_eq!(0x56, compute_checksum(1, 0x91BB82));
/// ```
pub fn compute_checksum(zone: u8, location_24bit: u32) -> u8 {
    let packed = (u32::from(zone & 0x3F) << 24) | (location_24bit & 0x00FF_FFFF);

    let folded = (packed >> 24) as u8 ^ (packed >> 16) as u8 ^ (packed >> 8) as u8 ^ packed as u8;

    !folded
}

/// Validate an externally-supplied checksum
///
/// Returns `true` iff `checksum` equals
/// [`compute_checksum`]`(zone, location_24bit)`.
pub fn validate_checksum(zone: u8, location_24bit: u32, checksum: u8) -> bool {
    compute_checksum(zone, location_24bit) == checksum
}

/// Granularity of an alert's geographic address
///
/// The Nibble Fill Flag (NFF) carried next to a FIG 0/19 location
/// payload selects how many hierarchy levels below the zone are
/// significant. Only four of the sixteen nibble values are assigned;
/// the rest decode to `None` and must not match anything.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchScope {
    /// NFF `0xF`: compare L3 only (coarsest)
    Region,

    /// NFF `0xE`: compare L3 and L4
    Province,

    /// NFF `0xC`: compare L3, L4, and L5
    District,

    /// NFF `0x8`: compare all four levels (finest)
    Subdistrict,
}

impl MatchScope {
    /// Decode a Nibble Fill Flag
    ///
    /// Returns `None` for the twelve unassigned nibble values.
    pub fn from_nff(nff: u8) -> Option<MatchScope> {
        match nff {
            0xF => Some(MatchScope::Region),
            0xE => Some(MatchScope::Province),
            0xC => Some(MatchScope::District),
            0x8 => Some(MatchScope::Subdistrict),
            _ => None,
        }
    }

    /// Number of hierarchy levels compared at this scope
    pub fn depth(&self) -> usize {
        match self {
            MatchScope::Region => 1,
            MatchScope::Province => 2,
            MatchScope::District => 3,
            MatchScope::Subdistrict => 4,
        }
    }
}

/// The receiver's own location
///
/// Constructed from user input in either text format (via [`FromStr`])
/// or from raw fields (via [`ReceiverLocation::new`]). The checksum is
/// always recomputed on construction, so a held value is valid by
/// construction.
///
/// `Display` renders the display format.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ReceiverLocation {
    zone: u8,
    levels: [u8; 4],
    checksum: u8,
}

impl ReceiverLocation {
    /// Build a location from raw fields
    ///
    /// `zone` must be 0..=41 and every level 0..=63.
    pub fn new(zone: u8, l3: u8, l4: u8, l5: u8, l6: u8) -> Result<Self, LocationCodeError> {
        if zone > MAX_ZONE {
            return Err(LocationCodeError::ZoneOutOfRange);
        }
        if l3 > 0x3F || l4 > 0x3F || l5 > 0x3F || l6 > 0x3F {
            return Err(LocationCodeError::LevelOutOfRange);
        }

        let levels = [l3, l4, l5, l6];
        Ok(Self {
            zone,
            levels,
            checksum: compute_checksum(zone, pack_levels(&levels)),
        })
    }

    /// Zone number (0..=41)
    pub fn zone(&self) -> u8 {
        self.zone
    }

    /// Hierarchy levels as `(L3, L4, L5, L6)`
    pub fn levels(&self) -> (u8, u8, u8, u8) {
        (self.levels[0], self.levels[1], self.levels[2], self.levels[3])
    }

    /// Annex B checksum over zone and levels
    pub fn checksum(&self) -> u8 {
        self.checksum
    }

    /// Render as display format, like `"0025-0110-0898"`
    pub fn to_display_format(&self) -> String {
        let val30 = (u32::from(self.zone) << 24) | pack_levels(&self.levels);
        format!(
            "{:04}-{:04}-{:04}",
            (val30 >> 20) & 0x3FF,
            (val30 >> 10) & 0x3FF,
            val30 & 0x3FF
        )
    }

    /// Render as hex format, like `"Z1:91BB82"`
    pub fn to_hex_format(&self) -> String {
        format!("Z{}:{:06X}", self.zone, pack_levels(&self.levels))
    }

    /// Match an already-extracted alert location at the given NFF
    ///
    /// The zone comparison is mandatory at every scope. Unassigned NFF
    /// values never match.
    pub fn matches(&self, alert: &AlertLocation, nff: u8) -> bool {
        let scope = match MatchScope::from_nff(nff) {
            Some(scope) => scope,
            None => return false,
        };

        self.zone == alert.zone && self.levels[..scope.depth()] == alert.levels[..scope.depth()]
    }

    /// Match a raw FIG 0/19 location payload at the given NFF
    ///
    /// Extracts the alert location from `data`, screens its checksum,
    /// and compares at the NFF-selected scope. Any failure along the
    /// way—bad checksum, unassigned NFF, zone mismatch—reports `false`.
    pub fn matches_wire(&self, data: &[u8; 4], nff: u8) -> bool {
        match AlertLocation::from_wire(data) {
            Ok(alert) => self.matches(&alert, nff),
            Err(_) => false,
        }
    }
}

impl FromStr for ReceiverLocation {
    type Err = LocationCodeError;

    /// Parse either input grammar
    ///
    /// Strings containing a dash parse as display format; strings with
    /// a `Z`/`z` prefix and a colon parse as hex format. Anything else
    /// is [`LocationCodeError::UnrecognizedFormat`].
    fn from_str(code: &str) -> Result<Self, Self::Err> {
        if code.contains('-') {
            parse_display_format(code)
        } else if code.starts_with(['Z', 'z']) && code.contains(':') {
            parse_hex_format(code)
        } else {
            Err(LocationCodeError::UnrecognizedFormat)
        }
    }
}

impl fmt::Display for ReceiverLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.to_display_format().fmt(f)
    }
}

/// An alert's geographic address, extracted from FIG 0/19
///
/// The four wire octets are laid out as:
///
/// ```txt
/// byte 0: zone[5:0] << 2 | L3[5:4]
/// byte 1: L3[3:0]   << 4 | L4[3:0]     (L4 is 4 bits on the wire)
/// byte 2: L5[5:0]   << 2 | L6[5:4]
/// byte 3: L6[3:0]   << 4 | checksum nibble (0 = not transmitted)
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AlertLocation {
    zone: u8,
    levels: [u8; 4],
    checksum: u8,
}

impl AlertLocation {
    /// Extract an alert location from its four wire octets
    ///
    /// The full 8-bit checksum is recomputed from the extracted
    /// fields. When the wire's checksum nibble is non-zero it must
    /// agree with the low nibble of the recomputed value; a zero
    /// nibble is treated as not transmitted.
    pub fn from_wire(data: &[u8; 4]) -> Result<Self, LocationCodeError> {
        let zone = (data[0] >> 2) & 0x3F;
        let l3 = ((data[0] & 0x03) << 4) | ((data[1] >> 4) & 0x0F);
        let l4 = data[1] & 0x0F;
        let l5 = (data[2] >> 2) & 0x3F;
        let l6 = ((data[2] & 0x03) << 4) | ((data[3] >> 4) & 0x0F);

        let levels = [l3, l4, l5, l6];
        let checksum = compute_checksum(zone, pack_levels(&levels));

        let wire_nibble = data[3] & 0x0F;
        if wire_nibble != 0 && wire_nibble != checksum & 0x0F {
            return Err(LocationCodeError::ChecksumMismatch);
        }

        Ok(Self {
            zone,
            levels,
            checksum,
        })
    }

    /// Zone number addressed by the alert
    pub fn zone(&self) -> u8 {
        self.zone
    }

    /// Hierarchy levels as `(L3, L4, L5, L6)`
    pub fn levels(&self) -> (u8, u8, u8, u8) {
        (self.levels[0], self.levels[1], self.levels[2], self.levels[3])
    }

    /// Recomputed Annex B checksum
    pub fn checksum(&self) -> u8 {
        self.checksum
    }
}

/// Pack location fields into the FIG 0/19 wire layout
///
/// The inverse of [`AlertLocation::from_wire`], including the checksum
/// nibble in byte 3. `l4` is truncated to its four-bit wire width;
/// other fields to six bits. Useful for broadcaster-side encoders and
/// test fixtures.
pub fn pack_wire(zone: u8, l3: u8, l4: u8, l5: u8, l6: u8) -> [u8; 4] {
    let (zone, l3, l4, l5, l6) = (zone & 0x3F, l3 & 0x3F, l4 & 0x0F, l5 & 0x3F, l6 & 0x3F);
    let checksum = compute_checksum(zone, pack_levels(&[l3, l4, l5, l6]));

    [
        (zone << 2) | (l3 >> 4),
        ((l3 & 0x0F) << 4) | l4,
        (l5 << 2) | (l6 >> 4),
        ((l6 & 0x0F) << 4) | (checksum & 0x0F),
    ]
}

// Pack four six-bit levels into the 24-bit location value
fn pack_levels(levels: &[u8; 4]) -> u32 {
    (u32::from(levels[0]) << 18)
        | (u32::from(levels[1]) << 12)
        | (u32::from(levels[2]) << 6)
        | u32::from(levels[3])
}

fn parse_display_format(code: &str) -> Result<ReceiverLocation, LocationCodeError> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^([0-9]{4})-([0-9]{4})-([0-9]{4})$").expect("bad display regexp");
    }

    let caps = RE
        .captures(code)
        .ok_or(LocationCodeError::UnrecognizedFormat)?;

    let mut groups = [0u32; 3];
    for (group, cap) in groups.iter_mut().zip(caps.iter().skip(1)) {
        // the pattern admits only four-digit numbers
        *group = cap
            .expect("missing capture group")
            .as_str()
            .parse()
            .expect("non-numeric capture");
        if *group > 0x3FF {
            return Err(LocationCodeError::GroupOutOfRange);
        }
    }

    let val30 = (groups[0] << 20) | (groups[1] << 10) | groups[2];
    ReceiverLocation::new(
        ((val30 >> 24) & FIELD_MASK) as u8,
        ((val30 >> 18) & FIELD_MASK) as u8,
        ((val30 >> 12) & FIELD_MASK) as u8,
        ((val30 >> 6) & FIELD_MASK) as u8,
        (val30 & FIELD_MASK) as u8,
    )
}

fn parse_hex_format(code: &str) -> Result<ReceiverLocation, LocationCodeError> {
    lazy_static! {
        static ref RE: Regex =
            Regex::new(r"^[Zz]([0-9]{1,2}):([0-9A-Fa-f]{6})$").expect("bad hex regexp");
    }

    let caps = RE
        .captures(code)
        .ok_or(LocationCodeError::UnrecognizedFormat)?;

    let zone: u8 = caps[1].parse().map_err(|_| LocationCodeError::ZoneOutOfRange)?;
    let location_24bit =
        u32::from_str_radix(&caps[2], 16).expect("non-hex capture");

    ReceiverLocation::new(
        zone,
        ((location_24bit >> 18) & FIELD_MASK) as u8,
        ((location_24bit >> 12) & FIELD_MASK) as u8,
        ((location_24bit >> 6) & FIELD_MASK) as u8,
        (location_24bit & FIELD_MASK) as u8,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum() {
        assert_eq!(0x56, compute_checksum(1, 0x91BB82));
        assert!(validate_checksum(1, 0x91BB82, 0x56));

        // every other eight-bit value must be rejected
        for wrong in (0u8..=255).filter(|&c| c != 0x56) {
            assert!(!validate_checksum(1, 0x91BB82, wrong));
        }

        // zone participates in the fold
        assert_ne!(
            compute_checksum(1, 0x91BB82),
            compute_checksum(2, 0x91BB82)
        );
    }

    #[test]
    fn test_parse_display_format() {
        let loc: ReceiverLocation = "0025-0110-0898".parse().expect("bad code");
        assert_eq!(1, loc.zone());
        assert_eq!((36, 27, 46, 2), loc.levels());
        assert_eq!("0025-0110-0898", loc.to_display_format());
        assert_eq!("Z1:91BB82", loc.to_hex_format());

        // extremes of the grammar
        assert!("0000-0000-0000".parse::<ReceiverLocation>().is_ok());
        assert_eq!(
            Err(LocationCodeError::GroupOutOfRange),
            "1023-1024-1023".parse::<ReceiverLocation>()
        );
        assert_eq!(
            Err(LocationCodeError::GroupOutOfRange),
            "9999-9999-9999".parse::<ReceiverLocation>()
        );
    }

    #[test]
    fn test_parse_display_format_rejects() {
        for bad in [
            "",
            "0025011100898",
            "002-011-089",
            "0025-011X-0898",
            "0025-0110-0898-",
            "0025_0111_0898",
        ] {
            assert_eq!(
                Err(LocationCodeError::UnrecognizedFormat),
                bad.parse::<ReceiverLocation>(),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_parse_hex_format() {
        let loc: ReceiverLocation = "Z1:91BB82".parse().expect("bad code");
        assert_eq!(1, loc.zone());
        assert_eq!((36, 27, 46, 2), loc.levels());

        // prefix and hex digits are case-insensitive
        assert_eq!(Ok(loc), "z1:91bb82".parse());

        assert!("Z0:000000".parse::<ReceiverLocation>().is_ok());
        assert!("Z41:FFFFFF".parse::<ReceiverLocation>().is_ok());
        assert_eq!(
            Err(LocationCodeError::ZoneOutOfRange),
            "Z42:000000".parse::<ReceiverLocation>()
        );
        assert_eq!(
            Err(LocationCodeError::ZoneOutOfRange),
            "Z99:91BB82".parse::<ReceiverLocation>()
        );
    }

    #[test]
    fn test_parse_hex_format_rejects() {
        for bad in ["1:91BB82", "Z191BB82", "Z1:91BB8", "Z1:91BB820", "Z1:91BBXZ"] {
            assert_eq!(
                Err(LocationCodeError::UnrecognizedFormat),
                bad.parse::<ReceiverLocation>(),
                "accepted {:?}",
                bad
            );
        }
    }

    #[test]
    fn test_format_round_trip() {
        // display → hex → display preserves every field
        let loc: ReceiverLocation = "0025-0110-0898".parse().unwrap();
        let again: ReceiverLocation = loc.to_hex_format().parse().unwrap();
        assert_eq!(loc, again);
        assert_eq!("0025-0110-0898", again.to_display_format());
        assert_eq!("0025-0110-0898", format!("{}", again));
    }

    #[test]
    fn test_wire_extraction() {
        let wire = pack_wire(2, 17, 11, 46, 2);
        let alert = AlertLocation::from_wire(&wire).expect("bad wire bytes");
        assert_eq!(2, alert.zone());
        assert_eq!((17, 11, 46, 2), alert.levels());
        assert_eq!(
            compute_checksum(2, (17u32 << 18) | (11 << 12) | (46 << 6) | 2),
            alert.checksum()
        );
    }

    #[test]
    fn test_wire_checksum_nibble() {
        let mut wire = pack_wire(5, 9, 3, 20, 7);
        let nibble = wire[3] & 0x0F;

        // a transmitted nibble that disagrees is rejected...
        if nibble != 0 {
            wire[3] = (wire[3] & 0xF0) | (nibble ^ 0x05);
            assert_eq!(
                Err(LocationCodeError::ChecksumMismatch),
                AlertLocation::from_wire(&wire)
            );
        }

        // ...but an all-zero nibble reads as not transmitted
        wire[3] &= 0xF0;
        assert!(AlertLocation::from_wire(&wire).is_ok());
    }

    #[test]
    fn test_nff_matching() {
        let loc = ReceiverLocation::new(2, 17, 11, 46, 2).unwrap();

        // same zone and L3, diverging below
        let sibling = pack_wire(2, 17, 11, 46, 9);
        assert!(loc.matches_wire(&sibling, 0xF));
        assert!(loc.matches_wire(&sibling, 0xE));
        assert!(loc.matches_wire(&sibling, 0xC));
        assert!(!loc.matches_wire(&sibling, 0x8));

        // L4 differs: only the coarsest scope matches
        let cousin = pack_wire(2, 17, 12, 46, 2);
        assert!(loc.matches_wire(&cousin, 0xF));
        assert!(!loc.matches_wire(&cousin, 0xE));

        // zone mismatch fails at every scope
        let elsewhere = pack_wire(3, 17, 11, 46, 2);
        for nff in [0xF, 0xE, 0xC, 0x8] {
            assert!(!loc.matches_wire(&elsewhere, nff));
        }

        // unassigned NFF values never match
        let exact = pack_wire(2, 17, 11, 46, 2);
        for nff in (0u8..=0xD).filter(|n| ![0x8, 0xC].contains(n)) {
            assert!(!loc.matches_wire(&exact, nff), "matched at NFF {:#x}", nff);
        }
    }

    #[test]
    fn test_nff_monotonicity() {
        // a match at the finest scope implies a match at every coarser one
        let loc = ReceiverLocation::new(7, 33, 5, 60, 12).unwrap();
        let exact = pack_wire(7, 33, 5, 60, 12);

        assert!(loc.matches_wire(&exact, 0x8));
        for coarser in [0xC, 0xE, 0xF] {
            assert!(loc.matches_wire(&exact, coarser));
        }
    }

    #[test]
    fn test_new_rejects_out_of_range() {
        assert_eq!(
            Err(LocationCodeError::ZoneOutOfRange),
            ReceiverLocation::new(42, 0, 0, 0, 0)
        );
        assert_eq!(
            Err(LocationCodeError::LevelOutOfRange),
            ReceiverLocation::new(0, 64, 0, 0, 0)
        );
    }
}
