//! Bit-packed header subfields and their lookup tables
//!
//! The masks and shifts below are part of the wire contract. All packing and
//! unpacking of the two shared header bytes goes through the functions in
//! this module.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sample rate index occupies bits 0-4 of `sr_subprotocol`
pub const SR_INDEX_MASK: u8 = 0x1F;
/// Sub-protocol occupies bits 5-7 of `sr_subprotocol`
pub const SUB_PROTOCOL_MASK: u8 = 0xE0;
pub const SUB_PROTOCOL_SHIFT: u8 = 5;

/// Data type occupies bits 0-2 of `format_codec`
pub const DATA_TYPE_MASK: u8 = 0x07;
/// Bit 3 of `format_codec` is reserved and must be clear for PCM
pub const RESERVED_BIT_MASK: u8 = 0x08;
/// Codec occupies bits 4-7 of `format_codec`
pub const CODEC_MASK: u8 = 0xF0;
pub const CODEC_SHIFT: u8 = 4;

/// Sub-protocol values as they appear in the masked header byte
pub const SUB_PROTOCOL_AUDIO: u8 = 0x00;
pub const SUB_PROTOCOL_SERIAL: u8 = 0x20;
pub const SUB_PROTOCOL_TEXT: u8 = 0x40;
pub const SUB_PROTOCOL_SERVICE: u8 = 0x60;

/// Codec values as they appear in the masked header byte
pub const CODEC_PCM: u8 = 0x00;

/// Combine a sample rate index and a sub-protocol id into one byte.
pub fn pack_sr_subprotocol(sr_index: u8, sub_protocol_id: u8) -> u8 {
    (sr_index & SR_INDEX_MASK) | ((sub_protocol_id << SUB_PROTOCOL_SHIFT) & SUB_PROTOCOL_MASK)
}

/// Split a `sr_subprotocol` byte into `(sample rate index, sub-protocol id)`.
pub fn unpack_sr_subprotocol(byte: u8) -> (u8, u8) {
    (
        byte & SR_INDEX_MASK,
        (byte & SUB_PROTOCOL_MASK) >> SUB_PROTOCOL_SHIFT,
    )
}

/// Combine a data type id, codec id and the reserved bit into one byte.
pub fn pack_format_codec(data_type_id: u8, codec_id: u8, reserved: bool) -> u8 {
    let reserved = if reserved { RESERVED_BIT_MASK } else { 0 };
    (data_type_id & DATA_TYPE_MASK) | reserved | ((codec_id << CODEC_SHIFT) & CODEC_MASK)
}

/// Split a `format_codec` byte into `(data type id, codec id, reserved bit)`.
pub fn unpack_format_codec(byte: u8) -> (u8, u8, bool) {
    (
        byte & DATA_TYPE_MASK,
        (byte & CODEC_MASK) >> CODEC_SHIFT,
        byte & RESERVED_BIT_MASK != 0,
    )
}

/// Sample rates for indices 0-20; indices 21-31 are undefined
pub const SAMPLE_RATES: [u32; 21] = [
    6000, 12000, 24000, 48000, 96000, 192000, 384000, 8000, 16000, 32000, 64000, 128000, 256000,
    512000, 11025, 22050, 44100, 88200, 176400, 352800, 705600,
];

/// Returned by [`index_for_sample_rate`] when the rate has no index
pub const SR_INDEX_NOT_FOUND: u8 = 32;

/// Sample rate in Hz for an index, or 0 if the index is undefined.
pub fn sample_rate_for_index(index: u8) -> u32 {
    SAMPLE_RATES.get(index as usize).copied().unwrap_or(0)
}

/// Index for a sample rate in Hz, or [`SR_INDEX_NOT_FOUND`].
pub fn index_for_sample_rate(hz: u32) -> u8 {
    SAMPLE_RATES
        .iter()
        .position(|&rate| rate == hz)
        .map(|index| index as u8)
        .unwrap_or(SR_INDEX_NOT_FOUND)
}

/// 5-bit sample rate index as carried in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleRate(u8);

impl SampleRate {
    /// Any 5-bit index, defined or not
    pub fn from_index(index: u8) -> Option<Self> {
        (index <= SR_INDEX_MASK).then_some(Self(index))
    }

    pub fn from_hz(hz: u32) -> Option<Self> {
        match index_for_sample_rate(hz) {
            SR_INDEX_NOT_FOUND => None,
            index => Some(Self(index)),
        }
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Rate in Hz, 0 when the index is undefined
    pub fn hz(self) -> u32 {
        sample_rate_for_index(self.0)
    }

    pub fn is_defined(self) -> bool {
        (self.0 as usize) < SAMPLE_RATES.len()
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        // 48 kHz
        Self(3)
    }
}

impl fmt::Display for SampleRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_defined() {
            write!(f, "{} Hz", self.hz())
        } else {
            write!(f, "undefined rate #{}", self.0)
        }
    }
}

/// Packet content class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubProtocol {
    Audio,
    Serial,
    Text,
    Service,
    /// Ids 4-7 have no assigned meaning
    Undefined(u8),
}

impl SubProtocol {
    /// From the 3-bit id (already shifted down)
    pub fn from_id(id: u8) -> Self {
        match id & (SUB_PROTOCOL_MASK >> SUB_PROTOCOL_SHIFT) {
            0 => Self::Audio,
            1 => Self::Serial,
            2 => Self::Text,
            3 => Self::Service,
            other => Self::Undefined(other),
        }
    }

    /// The 3-bit id
    pub fn id(self) -> u8 {
        match self {
            Self::Audio => SUB_PROTOCOL_AUDIO >> SUB_PROTOCOL_SHIFT,
            Self::Serial => SUB_PROTOCOL_SERIAL >> SUB_PROTOCOL_SHIFT,
            Self::Text => SUB_PROTOCOL_TEXT >> SUB_PROTOCOL_SHIFT,
            Self::Service => SUB_PROTOCOL_SERVICE >> SUB_PROTOCOL_SHIFT,
            Self::Undefined(id) => id & (SUB_PROTOCOL_MASK >> SUB_PROTOCOL_SHIFT),
        }
    }
}

impl fmt::Display for SubProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Audio => f.write_str("audio"),
            Self::Serial => f.write_str("serial"),
            Self::Text => f.write_str("text"),
            Self::Service => f.write_str("service"),
            Self::Undefined(id) => write!(f, "undefined sub-protocol #{id}"),
        }
    }
}

/// Payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Pcm,
    /// Any other 4-bit codec id; not decoded by this crate
    Other(u8),
}

impl Codec {
    pub fn from_id(id: u8) -> Self {
        match id & (CODEC_MASK >> CODEC_SHIFT) {
            0 => Self::Pcm,
            other => Self::Other(other),
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Self::Pcm => CODEC_PCM >> CODEC_SHIFT,
            Self::Other(id) => id & (CODEC_MASK >> CODEC_SHIFT),
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pcm => f.write_str("PCM"),
            Self::Other(id) => write!(f, "codec #{id}"),
        }
    }
}

/// Sample component format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Unsigned 8-bit, 128 is silence
    Uint8,
    #[default]
    Int16,
    /// Signed 24-bit packed in 3 bytes
    Int24,
    Int32,
    Float32,
    Float64,
    /// Bit-packed 12-bit samples, not supported
    Int12,
    /// Bit-packed 10-bit samples, not supported
    Int10,
}

impl DataType {
    pub fn from_id(id: u8) -> Self {
        match id & DATA_TYPE_MASK {
            0 => Self::Uint8,
            1 => Self::Int16,
            2 => Self::Int24,
            3 => Self::Int32,
            4 => Self::Float32,
            5 => Self::Float64,
            6 => Self::Int12,
            _ => Self::Int10,
        }
    }

    pub fn id(self) -> u8 {
        match self {
            Self::Uint8 => 0,
            Self::Int16 => 1,
            Self::Int24 => 2,
            Self::Int32 => 3,
            Self::Float32 => 4,
            Self::Float64 => 5,
            Self::Int12 => 6,
            Self::Int10 => 7,
        }
    }

    /// Bytes per sample component; 0 for the bit-packed types
    pub fn byte_size(self) -> usize {
        match self {
            Self::Uint8 => 1,
            Self::Int16 => 2,
            Self::Int24 => 3,
            Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
            Self::Int12 | Self::Int10 => 0,
        }
    }

    pub fn is_supported(self) -> bool {
        self.byte_size() != 0
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Int24 => "int24",
            Self::Int32 => "int32",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
            Self::Int12 => "int12",
            Self::Int10 => "int10",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rate_lookup() {
        assert_eq!(sample_rate_for_index(3), 48000);
        assert_eq!(sample_rate_for_index(16), 44100);
        assert_eq!(sample_rate_for_index(20), 705600);
        assert_eq!(sample_rate_for_index(21), 0);
        assert_eq!(sample_rate_for_index(31), 0);

        assert_eq!(index_for_sample_rate(48000), 3);
        assert_eq!(index_for_sample_rate(6000), 0);
        assert_eq!(index_for_sample_rate(999), SR_INDEX_NOT_FOUND);
    }

    #[test]
    fn test_every_defined_rate_maps_back() {
        for (index, &hz) in SAMPLE_RATES.iter().enumerate() {
            assert_eq!(index_for_sample_rate(hz) as usize, index);
        }
    }

    #[test]
    fn test_sample_rate_newtype() {
        assert_eq!(SampleRate::from_hz(44100).map(SampleRate::index), Some(16));
        assert!(SampleRate::from_hz(44000).is_none());
        assert!(SampleRate::from_index(32).is_none());

        let undefined = SampleRate::from_index(25).unwrap();
        assert!(!undefined.is_defined());
        assert_eq!(undefined.hz(), 0);
        assert_eq!(SampleRate::default().hz(), 48000);
    }

    #[test]
    fn test_sr_subprotocol_packing() {
        assert_eq!(pack_sr_subprotocol(3, 0), 0x03);
        assert_eq!(pack_sr_subprotocol(16, 1), 0x30);
        assert_eq!(pack_sr_subprotocol(31, 7), 0xFF);
        // Out-of-range inputs are masked, never bleed into the neighbour field
        assert_eq!(pack_sr_subprotocol(0x3F, 0), 0x1F);

        assert_eq!(unpack_sr_subprotocol(0x43), (3, 2));
        let (_, service) = unpack_sr_subprotocol(0x60);
        assert_eq!(service << SUB_PROTOCOL_SHIFT, SUB_PROTOCOL_SERVICE);
    }

    #[test]
    fn test_format_codec_packing() {
        assert_eq!(pack_format_codec(1, 0, false), 0x01);
        assert_eq!(pack_format_codec(4, 0, true), 0x0C);
        assert_eq!(pack_format_codec(7, 15, true), 0xFF);

        assert_eq!(unpack_format_codec(0x01), (1, 0, false));
        assert_eq!(unpack_format_codec(0x2B), (3, 2, true));
    }

    #[test]
    fn test_data_type_sizes() {
        assert_eq!(DataType::Uint8.byte_size(), 1);
        assert_eq!(DataType::Int16.byte_size(), 2);
        assert_eq!(DataType::Int24.byte_size(), 3);
        assert_eq!(DataType::Int32.byte_size(), 4);
        assert_eq!(DataType::Float32.byte_size(), 4);
        assert_eq!(DataType::Float64.byte_size(), 8);
        assert_eq!(DataType::Int12.byte_size(), 0);
        assert_eq!(DataType::Int10.byte_size(), 0);

        for id in 0..8 {
            assert_eq!(DataType::from_id(id).id(), id);
        }
    }

    #[test]
    fn test_sub_protocol_ids() {
        assert_eq!(SubProtocol::from_id(0), SubProtocol::Audio);
        assert_eq!(SubProtocol::from_id(1), SubProtocol::Serial);
        assert_eq!(SubProtocol::from_id(2), SubProtocol::Text);
        assert_eq!(SubProtocol::from_id(3), SubProtocol::Service);
        assert_eq!(SubProtocol::from_id(5), SubProtocol::Undefined(5));
        for id in 0..8 {
            assert_eq!(SubProtocol::from_id(id).id(), id);
        }
        assert_eq!(Codec::from_id(0), Codec::Pcm);
        assert_eq!(Codec::from_id(9).id(), 9);
    }
}
