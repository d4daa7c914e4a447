//! VBAN wire protocol
//!
//! Every datagram starts with a fixed 28-byte little-endian header:
//!
//! ```text
//! offset  size  field
//!      0     4  magic            "VBAN"
//!      4     1  sr_subprotocol   bits 0-4 sample rate index, bits 5-7 sub-protocol
//!      5     1  samples_m1       samples per frame - 1
//!      6     1  channels_m1      channels - 1
//!      7     1  format_codec     bits 0-2 data type, bit 3 reserved, bits 4-7 codec
//!      8    16  stream_name      ASCII, NUL padded
//!     24     4  frame_counter    wraps mod 2^32
//!     28   ...  payload          0..=1436 bytes
//! ```

pub mod fields;
pub mod header;

pub use fields::{
    index_for_sample_rate, sample_rate_for_index, Codec, DataType, SampleRate, SubProtocol,
    SAMPLE_RATES, SR_INDEX_NOT_FOUND,
};
pub use header::{decode, encode, Packet, PacketHeader, StreamName};

/// Default UDP port
pub const DEFAULT_PORT: u16 = 6980;

/// Fixed header size in bytes
pub const HEADER_SIZE: usize = 28;

/// Largest payload a single packet may carry
pub const MAX_PAYLOAD_SIZE: usize = 1436;

/// Largest datagram on the wire
pub const MAX_PACKET_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Raw length of the stream name field
pub const STREAM_NAME_LEN: usize = 16;

/// Longest stream name accepted in configuration (one byte kept for the terminator)
pub const MAX_CONFIG_STREAM_NAME_LEN: usize = STREAM_NAME_LEN - 1;

/// "VBAN" read as a little-endian u32
pub const MAGIC: u32 = 0x4E41_4256;

/// Most samples per channel a single frame can describe
pub const MAX_SAMPLES_PER_FRAME: usize = 256;

/// Most channels a single frame can describe
pub const MAX_CHANNELS: usize = 256;
