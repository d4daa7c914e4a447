//! Packet header encoding and decoding

use std::borrow::Cow;
use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use super::fields::{
    pack_format_codec, pack_sr_subprotocol, unpack_format_codec, unpack_sr_subprotocol, Codec,
    DataType, SampleRate, SubProtocol,
};
use super::{
    HEADER_SIZE, MAGIC, MAX_CHANNELS, MAX_PAYLOAD_SIZE, MAX_SAMPLES_PER_FRAME, STREAM_NAME_LEN,
};
use crate::error::{Error, ProtocolError};

const NAME_OFFSET: usize = 8;
const FRAME_COUNTER_OFFSET: usize = NAME_OFFSET + STREAM_NAME_LEN;

/// Raw 16-byte stream name field
///
/// Shorter names are NUL padded. A name of exactly 16 bytes carries no
/// terminator.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct StreamName([u8; STREAM_NAME_LEN]);

impl StreamName {
    pub fn new(name: &str) -> Result<Self, ProtocolError> {
        let bytes = name.as_bytes();
        if bytes.len() > STREAM_NAME_LEN {
            return Err(ProtocolError::StreamNameTooLong(bytes.len()));
        }
        if !name.is_ascii() || bytes.contains(&0) {
            return Err(ProtocolError::InvalidStreamName);
        }

        let mut raw = [0u8; STREAM_NAME_LEN];
        raw[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(raw))
    }

    pub fn from_raw(raw: [u8; STREAM_NAME_LEN]) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> &[u8; STREAM_NAME_LEN] {
        &self.0
    }

    /// Name bytes up to the first NUL
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(STREAM_NAME_LEN);
        &self.0[..end]
    }

    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }

    pub fn to_string_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl fmt::Display for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_string_lossy())
    }
}

impl fmt::Debug for StreamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StreamName({:?})", self.to_string_lossy())
    }
}

/// Decoded 28-byte header
///
/// Fields are kept in their wire form (`*_m1` counts, raw indices) so that
/// every header decodes and re-encodes byte for byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub sample_rate: SampleRate,
    pub sub_protocol: SubProtocol,
    pub samples_per_frame_m1: u8,
    pub channels_m1: u8,
    pub data_type: DataType,
    /// Bit 3 of `format_codec`; must be clear for PCM
    pub reserved: bool,
    pub codec: Codec,
    pub stream_name: StreamName,
    pub frame_counter: u32,
}

impl PacketHeader {
    /// Header for a PCM audio frame.
    pub fn audio(
        sample_rate: SampleRate,
        samples_per_frame: usize,
        channels: usize,
        data_type: DataType,
        stream_name: StreamName,
        frame_counter: u32,
    ) -> Result<Self, Error> {
        if !(1..=MAX_SAMPLES_PER_FRAME).contains(&samples_per_frame) {
            return Err(Error::InvalidArgument(format!(
                "samples per frame must be 1-{}, got {}",
                MAX_SAMPLES_PER_FRAME, samples_per_frame
            )));
        }
        if !(1..=MAX_CHANNELS).contains(&channels) {
            return Err(Error::InvalidArgument(format!(
                "channel count must be 1-{}, got {}",
                MAX_CHANNELS, channels
            )));
        }

        Ok(Self {
            sample_rate,
            sub_protocol: SubProtocol::Audio,
            samples_per_frame_m1: (samples_per_frame - 1) as u8,
            channels_m1: (channels - 1) as u8,
            data_type,
            reserved: false,
            codec: Codec::Pcm,
            stream_name,
            frame_counter,
        })
    }

    /// Parse the header at the start of `bytes`.
    pub fn parse(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let Some(header) = bytes.first_chunk::<HEADER_SIZE>() else {
            return Err(ProtocolError::PacketTooShort(bytes.len()));
        };

        let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        if magic != MAGIC {
            return Err(ProtocolError::InvalidMagic(magic));
        }

        let (sr_index, sub_protocol_id) = unpack_sr_subprotocol(header[4]);
        let (data_type_id, codec_id, reserved) = unpack_format_codec(header[7]);

        let mut name = [0u8; STREAM_NAME_LEN];
        name.copy_from_slice(&header[NAME_OFFSET..FRAME_COUNTER_OFFSET]);

        let frame_counter = u32::from_le_bytes([
            header[FRAME_COUNTER_OFFSET],
            header[FRAME_COUNTER_OFFSET + 1],
            header[FRAME_COUNTER_OFFSET + 2],
            header[FRAME_COUNTER_OFFSET + 3],
        ]);

        Ok(Self {
            // unpack masks to 5 bits, so the index is always in range
            sample_rate: SampleRate::from_index(sr_index).unwrap_or_default(),
            sub_protocol: SubProtocol::from_id(sub_protocol_id),
            samples_per_frame_m1: header[5],
            channels_m1: header[6],
            data_type: DataType::from_id(data_type_id),
            reserved,
            codec: Codec::from_id(codec_id),
            stream_name: StreamName::from_raw(name),
            frame_counter,
        })
    }

    /// Serialize into exactly [`HEADER_SIZE`] bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[..4].copy_from_slice(&MAGIC.to_le_bytes());
        out[4] = pack_sr_subprotocol(self.sample_rate.index(), self.sub_protocol.id());
        out[5] = self.samples_per_frame_m1;
        out[6] = self.channels_m1;
        out[7] = pack_format_codec(self.data_type.id(), self.codec.id(), self.reserved);
        out[NAME_OFFSET..FRAME_COUNTER_OFFSET].copy_from_slice(self.stream_name.raw());
        out[FRAME_COUNTER_OFFSET..].copy_from_slice(&self.frame_counter.to_le_bytes());
        out
    }

    pub fn samples_per_frame(&self) -> usize {
        self.samples_per_frame_m1 as usize + 1
    }

    pub fn channels(&self) -> usize {
        self.channels_m1 as usize + 1
    }

    /// Payload length implied by the header for PCM data
    pub fn expected_payload_len(&self) -> usize {
        self.samples_per_frame() * self.channels() * self.data_type.byte_size()
    }
}

/// A decoded datagram borrowing its payload from the receive buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet<'a> {
    pub header: PacketHeader,
    pub payload: &'a [u8],
}

impl<'a> Packet<'a> {
    pub fn payload(&self) -> &'a [u8] {
        self.payload
    }

    pub fn payload_len_matches(&self) -> bool {
        self.payload.len() == self.header.expected_payload_len()
    }
}

/// Decode a datagram into header and payload.
pub fn decode(datagram: &[u8]) -> Result<Packet<'_>, ProtocolError> {
    let header = PacketHeader::parse(datagram)?;
    Ok(Packet {
        header,
        payload: &datagram[HEADER_SIZE..],
    })
}

/// Append an encoded packet to `buf`.
pub fn encode_into(
    header: &PacketHeader,
    payload: &[u8],
    buf: &mut BytesMut,
) -> Result<(), ProtocolError> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }
    buf.reserve(HEADER_SIZE + payload.len());
    buf.put_slice(&header.to_bytes());
    buf.put_slice(payload);
    Ok(())
}

/// Encode header and payload into one datagram.
pub fn encode(header: &PacketHeader, payload: &[u8]) -> Result<Bytes, ProtocolError> {
    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_into(header, payload, &mut buf)?;
    Ok(buf.freeze())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn stereo_header(name: &str) -> PacketHeader {
        PacketHeader::audio(
            SampleRate::from_hz(48000).unwrap(),
            64,
            2,
            DataType::Int16,
            StreamName::new(name).unwrap(),
            7,
        )
        .unwrap()
    }

    #[test]
    fn test_wire_layout() {
        let header = stereo_header("Stream1");
        let bytes = header.to_bytes();

        assert_eq!(&bytes[..4], b"VBAN");
        assert_eq!(bytes[4], 0x03);
        assert_eq!(bytes[5], 63);
        assert_eq!(bytes[6], 1);
        assert_eq!(bytes[7], 0x01);
        assert_eq!(&bytes[8..15], b"Stream1");
        assert!(bytes[15..24].iter().all(|&b| b == 0));
        assert_eq!(&bytes[24..], &7u32.to_le_bytes());
    }

    #[test]
    fn test_decode_too_short() {
        let bytes = stereo_header("a").to_bytes();
        assert_eq!(
            decode(&bytes[..27]).unwrap_err(),
            ProtocolError::PacketTooShort(27)
        );
        assert_eq!(decode(&[]).unwrap_err(), ProtocolError::PacketTooShort(0));
    }

    #[test]
    fn test_decode_bad_magic() {
        let mut bytes = stereo_header("a").to_bytes();
        bytes[..4].copy_from_slice(b"NABV");
        let expected = u32::from_le_bytes(*b"NABV");
        assert_eq!(
            decode(&bytes).unwrap_err(),
            ProtocolError::InvalidMagic(expected)
        );
    }

    #[test]
    fn test_header_only_packet_has_empty_payload() {
        let bytes = stereo_header("a").to_bytes();
        let packet = decode(&bytes).unwrap();
        assert!(packet.payload.is_empty());
        assert!(!packet.payload_len_matches());
    }

    #[test]
    fn test_full_length_stream_name() {
        let name = StreamName::new("ExactlySixteen16").unwrap();
        assert_eq!(name.as_bytes(), b"ExactlySixteen16");
        assert_eq!(name.to_string(), "ExactlySixteen16");

        assert_eq!(
            StreamName::new("SeventeenChars17x"),
            Err(ProtocolError::StreamNameTooLong(17))
        );
        assert_eq!(StreamName::new("nul\0"), Err(ProtocolError::InvalidStreamName));
        assert!(StreamName::new("").unwrap().is_empty());
    }

    #[test]
    fn test_encode_rejects_oversize_payload() {
        let header = stereo_header("a");
        let payload = vec![0u8; MAX_PAYLOAD_SIZE + 1];
        assert_eq!(
            encode(&header, &payload).unwrap_err(),
            ProtocolError::PayloadTooLarge(MAX_PAYLOAD_SIZE + 1)
        );
    }

    #[test]
    fn test_audio_header_rejects_bad_counts() {
        let name = StreamName::default();
        let rate = SampleRate::default();
        assert!(PacketHeader::audio(rate, 0, 2, DataType::Int16, name, 0).is_err());
        assert!(PacketHeader::audio(rate, 257, 2, DataType::Int16, name, 0).is_err());
        assert!(PacketHeader::audio(rate, 256, 0, DataType::Int16, name, 0).is_err());

        let max = PacketHeader::audio(rate, 256, 256, DataType::Uint8, name, 0).unwrap();
        assert_eq!(max.samples_per_frame_m1, 255);
        assert_eq!(max.channels_m1, 255);
    }

    #[test]
    fn test_expected_payload_len() {
        let header = stereo_header("a");
        assert_eq!(header.expected_payload_len(), 64 * 2 * 2);

        let mut packed = header;
        packed.data_type = DataType::Int12;
        assert_eq!(packed.expected_payload_len(), 0);
    }

    fn any_header() -> impl Strategy<Value = PacketHeader> {
        (
            0u8..32,
            0u8..8,
            any::<u8>(),
            any::<u8>(),
            0u8..8,
            any::<bool>(),
            0u8..16,
            any::<[u8; STREAM_NAME_LEN]>(),
            any::<u32>(),
        )
            .prop_map(
                |(sr, sub, samples, channels, data_type, reserved, codec, name, counter)| {
                    PacketHeader {
                        sample_rate: SampleRate::from_index(sr).unwrap(),
                        sub_protocol: SubProtocol::from_id(sub),
                        samples_per_frame_m1: samples,
                        channels_m1: channels,
                        data_type: DataType::from_id(data_type),
                        reserved,
                        codec: Codec::from_id(codec),
                        stream_name: StreamName::from_raw(name),
                        frame_counter: counter,
                    }
                },
            )
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            header in any_header(),
            payload in proptest::collection::vec(any::<u8>(), 0..=MAX_PAYLOAD_SIZE),
        ) {
            let datagram = encode(&header, &payload).unwrap();
            prop_assert_eq!(datagram.len(), HEADER_SIZE + payload.len());

            let packet = decode(&datagram).unwrap();
            prop_assert_eq!(packet.header, header);
            prop_assert_eq!(packet.payload, &payload[..]);

            let reencoded = encode(&packet.header, packet.payload).unwrap();
            prop_assert_eq!(reencoded, datagram);
        }
    }
}
