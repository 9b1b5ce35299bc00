//! # dabplace: DAB EWS Location Codes
//!
//! This crate parses, formats, and matches the hierarchical geographic
//! location codes used by the DAB
//! [Emergency Warning System](https://www.etsi.org/deliver/etsi_ts/104000_104099/104090/)
//! (ETSI TS 104 090). Receivers use these codes to decide whether an
//! emergency announcement addressed to a geographic area applies to
//! *their* location.
//!
//! ## Anatomy of a location code
//!
//! A location code is a 30-bit value:
//!
//! * a 6-bit **zone** (0..=41), the top of the hierarchy; and
//! * four 6-bit hierarchy levels **L3..L6**, from coarsest to finest
//!   (think region → province → district → sub-district).
//!
//! An 8-bit checksum (Annex B) protects the code against typos: the
//! 30 bits are packed into four octets, XORed together, and inverted.
//!
//! Users enter their receiver location in one of two text forms:
//!
//! * **Display**: three dash-separated groups of four decimal digits,
//!   each group holding ten bits of the 30-bit value,
//!   e.g. `0025-0110-0898`.
//! * **Hex**: the zone in decimal and the 24 level bits in hex,
//!   e.g. `Z1:91BB82`.
//!
//! ```
//! use dabplace::ReceiverLocation;
//!
//! let loc: ReceiverLocation = "Z1:91BB82".parse().expect("valid code");
//! assert_eq!(1, loc.zone());
//! assert_eq!("0025-0110-0898", loc.to_display_format());
//! assert_eq!("Z1:91BB82", loc.to_hex_format());
//!
//! // both grammars decode to the same location
//! let same: ReceiverLocation = "0025-0110-0898".parse().unwrap();
//! assert_eq!(loc, same);
//! ```
//!
//! ## Matching alerts
//!
//! Alerts carried in FIG 0/19 address an area with a 4-byte location
//! payload and a 4-bit Nibble Fill Flag (NFF) that selects how many
//! hierarchy levels are significant. [`ReceiverLocation::matches_wire`]
//! performs the whole check: wire extraction, checksum screening, the
//! mandatory zone comparison, and the NFF-selected level comparison.
//!
//! ```
//! use dabplace::{pack_wire, MatchScope, ReceiverLocation};
//!
//! let loc: ReceiverLocation = "Z2:44BB82".parse().unwrap();
//!
//! // an alert for the receiver's own district
//! let alert = pack_wire(2, 17, 11, 46, 2);
//! assert!(loc.matches_wire(&alert, 0x8));
//!
//! // a coarser alert for the whole region still matches
//! assert!(loc.matches_wire(&alert, 0xF));
//! assert_eq!(Some(MatchScope::Region), MatchScope::from_nff(0xF));
//! ```
//!
//! This crate has no dependency on the announcement-switching core and
//! may be used alone, e.g. from a settings UI that validates location
//! input as the user types.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod location;

pub use location::{
    compute_checksum, pack_wire, validate_checksum, AlertLocation, LocationCodeError, MatchScope,
    ReceiverLocation,
};
