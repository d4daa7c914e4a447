//! Error types for the VBAN streaming library

use thiserror::Error;

use crate::network::receiver::ReceiverState;
use crate::protocol::DataType;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mirrored ring buffer errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Failed to allocate {0} bytes of backing storage")]
    AllocFailed(usize),

    #[error("Buffer is not initialized")]
    NotInitialized,

    #[error("Buffer full: {requested} bytes requested, {free} bytes free")]
    BufferFull { requested: usize, free: usize },

    #[error("Cannot consume {requested} bytes, only {stored} stored")]
    ConsumeExceedsStored { requested: usize, stored: usize },
}

/// Wire format errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Packet too short: {0} bytes")]
    PacketTooShort(usize),

    #[error("Invalid magic: {0:#010x}")]
    InvalidMagic(u32),

    #[error("Payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Stream name too long: {0} bytes")]
    StreamNameTooLong(usize),

    #[error("Stream name must be ASCII without interior NUL bytes")]
    InvalidStreamName,

    #[error("Audio data size mismatch: expected {expected} bytes, got {actual}")]
    DataSizeMismatch { expected: usize, actual: usize },

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(DataType),

    #[error("Sample rate not representable: {0} Hz")]
    InvalidSampleRate(u32),
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Socket creation failed: {0}")]
    SocketCreate(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Partial send: {sent} of {expected} bytes")]
    PartialSend { expected: usize, sent: usize },

    #[error("Failed to spawn receive thread: {0}")]
    ThreadSpawn(String),
}

/// Receiver lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    #[error("Receiver already started")]
    AlreadyStarted,

    #[error("Receiver not started")]
    NotStarted,

    #[error("Operation not allowed in state {0:?}")]
    InvalidState(ReceiverState),
}

/// Chunk hand-off and sink errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Hand-off queue disconnected")]
    QueueDisconnected,

    #[error("Sink write failed: {0}")]
    SinkWrite(String),

    #[error("Invalid chunk configuration: {0}")]
    InvalidChunkConfig(String),
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
