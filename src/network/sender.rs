//! VBAN sender
//!
//! Wraps interleaved PCM frames in a header and transmits each as one
//! datagram. No buffering; one `send` is one packet.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::error::{Error, NetworkError, ProtocolError, Result};
use crate::network::stats::SenderStats;
use crate::network::udp;
use crate::protocol::header::encode_into;
use crate::protocol::{
    DataType, PacketHeader, SampleRate, StreamName, DEFAULT_PORT, MAX_CHANNELS,
    MAX_CONFIG_STREAM_NAME_LEN, MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE, MAX_SAMPLES_PER_FRAME,
};

/// PCM layout of outgoing frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioFormat {
    /// Hz; must be one of the protocol's sample rates
    pub sample_rate: u32,
    pub channels: u16,
    pub data_type: DataType,
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            data_type: DataType::Int16,
        }
    }
}

impl AudioFormat {
    /// Bytes per interleaved frame (one sample for every channel)
    pub fn frame_size(&self) -> usize {
        self.channels as usize * self.data_type.byte_size()
    }
}

/// Sender configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    pub stream_name: String,
    /// Destination IP address
    pub dest_addr: String,
    /// 0 selects the VBAN default port
    pub dest_port: u16,
    /// Local address to send from; port 0 picks any
    pub bind_addr: SocketAddr,
    pub format: AudioFormat,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            stream_name: "Stream1".to_string(),
            dest_addr: "127.0.0.1".to_string(),
            dest_port: DEFAULT_PORT,
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            format: AudioFormat::default(),
        }
    }
}

impl SenderConfig {
    /// Resolved destination, with port 0 mapped to the default
    pub fn destination(&self) -> Result<SocketAddr> {
        if self.dest_addr.trim().is_empty() {
            return Err(Error::InvalidArgument("destination address is empty".into()));
        }
        let ip: IpAddr = self
            .dest_addr
            .trim()
            .parse()
            .map_err(|_| NetworkError::InvalidAddress(self.dest_addr.clone()))?;
        let port = if self.dest_port == 0 {
            DEFAULT_PORT
        } else {
            self.dest_port
        };
        Ok(SocketAddr::new(ip, port))
    }

    /// Validated stream name in wire form
    pub fn wire_stream_name(&self) -> Result<StreamName> {
        if self.stream_name.len() > MAX_CONFIG_STREAM_NAME_LEN {
            return Err(Error::InvalidArgument(format!(
                "stream name may be at most {} characters, got {}",
                MAX_CONFIG_STREAM_NAME_LEN,
                self.stream_name.len()
            )));
        }
        StreamName::new(&self.stream_name)
            .map_err(|e| Error::InvalidArgument(format!("stream name: {e}")))
    }

    pub fn validate(&self) -> Result<()> {
        self.destination()?;
        self.wire_stream_name()?;

        let format = &self.format;
        if SampleRate::from_hz(format.sample_rate).is_none() {
            return Err(ProtocolError::InvalidSampleRate(format.sample_rate).into());
        }
        if !(1..=MAX_CHANNELS).contains(&(format.channels as usize)) {
            return Err(Error::InvalidArgument(format!(
                "channel count must be 1-{}, got {}",
                MAX_CHANNELS, format.channels
            )));
        }
        if !format.data_type.is_supported() {
            return Err(ProtocolError::UnsupportedDataType(format.data_type).into());
        }
        Ok(())
    }
}

/// Sending endpoint
pub struct VbanSender {
    socket: UdpSocket,
    dest: SocketAddr,
    stream_name: StreamName,
    sample_rate: SampleRate,
    format: AudioFormat,
    frame_counter: u32,
    packet: BytesMut,
    stats: SenderStats,
}

impl VbanSender {
    /// Validate `config` and open the socket
    pub fn new(config: &SenderConfig) -> Result<Self> {
        config.validate()?;
        let dest = config.destination()?;
        let stream_name = config.wire_stream_name()?;
        let sample_rate = SampleRate::from_hz(config.format.sample_rate)
            .ok_or(ProtocolError::InvalidSampleRate(config.format.sample_rate))?;

        let socket = udp::create_socket(config.bind_addr)?;

        tracing::info!(
            "VBAN sender '{}' -> {} ({} Hz, {} ch, {})",
            stream_name,
            dest,
            sample_rate.hz(),
            config.format.channels,
            config.format.data_type
        );

        Ok(Self {
            socket,
            dest,
            stream_name,
            sample_rate,
            format: config.format,
            frame_counter: 0,
            packet: BytesMut::with_capacity(MAX_PACKET_SIZE),
            stats: SenderStats::default(),
        })
    }

    /// Payload bytes needed for `samples` samples per channel
    pub fn payload_size(&self, samples: usize) -> usize {
        samples * self.format.frame_size()
    }

    /// Send one frame of `samples` interleaved samples per channel.
    ///
    /// `audio` must be exactly [`payload_size`](Self::payload_size) bytes.
    /// Returns the number of bytes put on the wire. The frame counter
    /// advances on every attempt that reaches the socket.
    pub fn send(&mut self, audio: &[u8], samples: usize) -> Result<usize> {
        if !(1..=MAX_SAMPLES_PER_FRAME).contains(&samples) {
            return Err(Error::InvalidArgument(format!(
                "sample count must be 1-{}, got {}",
                MAX_SAMPLES_PER_FRAME, samples
            )));
        }

        let payload_size = self.payload_size(samples);
        if payload_size > MAX_PAYLOAD_SIZE {
            return Err(ProtocolError::PayloadTooLarge(payload_size).into());
        }
        if audio.len() != payload_size {
            return Err(ProtocolError::DataSizeMismatch {
                expected: payload_size,
                actual: audio.len(),
            }
            .into());
        }

        let header = PacketHeader::audio(
            self.sample_rate,
            samples,
            self.format.channels as usize,
            self.format.data_type,
            self.stream_name,
            self.frame_counter,
        )?;
        self.frame_counter = self.frame_counter.wrapping_add(1);

        self.packet.clear();
        encode_into(&header, audio, &mut self.packet)?;

        let sent = match self.socket.send_to(&self.packet, self.dest) {
            Ok(sent) => sent,
            Err(e) => {
                self.stats.send_errors += 1;
                return Err(NetworkError::SendFailed(e.to_string()).into());
            }
        };
        if sent != self.packet.len() {
            self.stats.send_errors += 1;
            return Err(NetworkError::PartialSend {
                expected: self.packet.len(),
                sent,
            }
            .into());
        }

        self.stats.packets_sent += 1;
        self.stats.bytes_sent += sent as u64;
        tracing::trace!("Sent frame {} ({} bytes)", header.frame_counter, sent);
        Ok(sent)
    }

    /// Counter value the next packet will carry
    pub fn frame_counter(&self) -> u32 {
        self.frame_counter
    }

    pub fn destination(&self) -> SocketAddr {
        self.dest
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn stats(&self) -> SenderStats {
        self.stats
    }

    /// Close the socket
    pub fn close(self) {
        tracing::info!(
            "VBAN sender '{}' closed after {} packets",
            self.stream_name,
            self.stats.packets_sent
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::decode;

    fn loopback_config(port: u16) -> SenderConfig {
        SenderConfig {
            stream_name: "Unit".into(),
            dest_addr: "127.0.0.1".into(),
            dest_port: port,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            format: AudioFormat::default(),
        }
    }

    #[test]
    fn test_dest_port_zero_uses_default() {
        let config = SenderConfig {
            dest_port: 0,
            ..loopback_config(0)
        };
        assert_eq!(config.destination().unwrap().port(), DEFAULT_PORT);
    }

    #[test]
    fn test_config_validation() {
        let mut config = loopback_config(7000);
        config.dest_addr = "not-an-ip".into();
        assert!(matches!(
            VbanSender::new(&config),
            Err(Error::Network(NetworkError::InvalidAddress(_)))
        ));

        let mut config = loopback_config(7000);
        config.dest_addr = String::new();
        assert!(matches!(
            VbanSender::new(&config),
            Err(Error::InvalidArgument(_))
        ));

        let mut config = loopback_config(7000);
        config.stream_name = "SixteenChars16xx".into();
        assert!(matches!(
            VbanSender::new(&config),
            Err(Error::InvalidArgument(_))
        ));

        let mut config = loopback_config(7000);
        config.format.data_type = DataType::Int12;
        assert!(matches!(
            VbanSender::new(&config),
            Err(Error::Protocol(ProtocolError::UnsupportedDataType(
                DataType::Int12
            )))
        ));

        let mut config = loopback_config(7000);
        config.format.sample_rate = 999;
        assert!(matches!(
            VbanSender::new(&config),
            Err(Error::Protocol(ProtocolError::InvalidSampleRate(999)))
        ));

        let mut config = loopback_config(7000);
        config.format.channels = 0;
        assert!(VbanSender::new(&config).is_err());
    }

    #[test]
    fn test_send_rejects_bad_sizes() {
        let target = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = target.local_addr().unwrap().port();
        let mut sender = VbanSender::new(&loopback_config(port)).unwrap();

        assert!(matches!(
            sender.send(&[], 0),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            sender.send(&[0u8; 4], 257),
            Err(Error::InvalidArgument(_))
        ));
        // 256 stereo int16 samples is 1024 bytes; 3 bytes short
        assert!(matches!(
            sender.send(&[0u8; 1021], 256),
            Err(Error::Protocol(ProtocolError::DataSizeMismatch {
                expected: 1024,
                actual: 1021
            }))
        ));
        assert_eq!(sender.frame_counter(), 0);
    }

    #[test]
    fn test_send_oversize_payload() {
        let target = UdpSocket::bind("127.0.0.1:0").unwrap();
        let mut config = loopback_config(target.local_addr().unwrap().port());
        config.format.channels = 8;
        config.format.data_type = DataType::Float32;
        let mut sender = VbanSender::new(&config).unwrap();

        // 64 samples x 8 channels x 4 bytes = 2048
        let audio = vec![0u8; 2048];
        assert!(matches!(
            sender.send(&audio, 64),
            Err(Error::Protocol(ProtocolError::PayloadTooLarge(2048)))
        ));
    }

    #[test]
    fn test_send_increments_frame_counter() {
        let target = UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = target.local_addr().unwrap().port();
        let mut sender = VbanSender::new(&loopback_config(port)).unwrap();

        let audio: Vec<u8> = (0..64u8).collect();
        for expected_counter in 0..3u32 {
            let sent = sender.send(&audio, 16).unwrap();
            assert_eq!(sent, 28 + 64);

            let mut buf = [0u8; MAX_PACKET_SIZE];
            let (len, _) = target.recv_from(&mut buf).unwrap();
            let packet = decode(&buf[..len]).unwrap();
            assert_eq!(packet.header.frame_counter, expected_counter);
            assert_eq!(packet.header.stream_name.as_bytes(), b"Unit");
            assert_eq!(packet.header.samples_per_frame(), 16);
            assert_eq!(packet.header.channels(), 2);
            assert_eq!(packet.payload, &audio[..]);
            assert!(packet.payload_len_matches());
        }

        let stats = sender.stats();
        assert_eq!(stats.packets_sent, 3);
        assert_eq!(stats.bytes_sent, 3 * 92);
    }
}
