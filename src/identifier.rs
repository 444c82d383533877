//! Bit-level decoding of extended (29-bit) CAN identifiers.
//!
//! # Layout
//!
//! ```text
//!  28    26 25  24  23          16 15           8 7            0
//! ┌────────┬───┬───┬──────────────┬──────────────┬──────────────┐
//! │priority│ R │ DP│  PDU format  │ PDU specific │source address│
//! └────────┴───┴───┴──────────────┴──────────────┴──────────────┘
//! ```
//!
//! The group identifier (PGN) used for reference lookups is the 16-bit
//! field spanning bits 8..=23.

use std::fmt;

/// Mask selecting the meaningful bits of an extended identifier.
pub const EXTENDED_ID_MASK: u32 = 0x1FFF_FFFF;

/// Exclusive upper bound of the 29-bit identifier range. Masking is the
/// identity on every value below it.
pub const EXTENDED_ID_LIMIT: u32 = EXTENDED_ID_MASK + 1;

/// Returns the standard identifier, i.e. the low 29 bits of `raw_id`.
pub fn mask_standard_id(raw_id: u32) -> u32 {
    raw_id & EXTENDED_ID_MASK
}

/// Returns the 16-bit group identifier carried in bits 8..=23.
pub fn extract_group_id(raw_id: u32) -> u16 {
    ((raw_id >> 8) & 0xFFFF) as u16
}

/// Formats an identifier the way every report prints it: `0x` + lowercase hex.
pub fn format_hex(value: u32) -> String {
    format!("{:#x}", value)
}

/// PDU format discriminant taken from bits 16..=17.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PduFormat {
    Pdu1,
    Pdu2,
    Pdu1Group,
    Pdu2Group,
}

impl PduFormat {
    pub fn from_raw(raw_id: u32) -> Self {
        match (raw_id >> 16) & 0x3 {
            0 => Self::Pdu1,
            1 => Self::Pdu2,
            2 => Self::Pdu1Group,
            _ => Self::Pdu2Group,
        }
    }

    /// Group identifier for this PDU format.
    ///
    /// All four formats currently share one extraction.
    pub fn group_id(self, raw_id: u32) -> u16 {
        match self {
            Self::Pdu1 => extract_group_id(raw_id),
            Self::Pdu2 => extract_group_id(raw_id),
            Self::Pdu1Group => extract_group_id(raw_id),
            Self::Pdu2Group => extract_group_id(raw_id),
        }
    }
}

impl fmt::Display for PduFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pdu1 => write!(f, "PDU1"),
            Self::Pdu2 => write!(f, "PDU2"),
            Self::Pdu1Group => write!(f, "PDU1 (group function)"),
            Self::Pdu2Group => write!(f, "PDU2 (group function)"),
        }
    }
}

/// All protocol fields of one raw identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodedId {
    pub raw: u32,
    pub standard_id: u32,
    pub pdu_format: PduFormat,
    pub group_id: u16,
}

impl DecodedId {
    pub fn decode(raw: u32) -> Self {
        let pdu_format = PduFormat::from_raw(raw);
        Self {
            raw,
            standard_id: mask_standard_id(raw),
            pdu_format,
            group_id: pdu_format.group_id(raw),
        }
    }
}

impl fmt::Display for DecodedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", format_hex(self.standard_id))
    }
}
