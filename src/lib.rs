//! # VBAN Stream
//!
//! Send and receive PCM audio using the VBAN protocol over UDP.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                                 SENDER                                       │
//! │  ┌──────────────┐    ┌───────────────────────┐    ┌──────────────────────┐   │
//! │  │ PCM frames   │───▶│ Header + frame counter│───▶│ UDP socket           │   │
//! │  │ (caller)     │    │ (protocol::header)    │    │ (network::sender)    │   │
//! │  └──────────────┘    └───────────────────────┘    └──────────┬───────────┘   │
//! └─────────────────────────────────────────────────────────────┼───────────────┘
//!                                                               │ UDP :6980
//!                                                               ▼
//! ┌─────────────────────────────────────────────────────────────┼───────────────┐
//! │                                RECEIVER                      │               │
//! │  ┌──────────────────────────────────────────────────────────┴────────────┐  │
//! │  │ Receive thread (network::receiver)                                     │  │
//! │  │   recv_from ─▶ decode ─▶ filter: magic / stream / sub-protocol / codec │  │
//! │  │                                       │                                │  │
//! │  │                                       ▼                                │  │
//! │  │   PacketHandler::on_packet ─▶ ChunkPipeline (audio::pipeline)          │  │
//! │  │        ┌──────────────────────────────────────────────┐                │  │
//! │  │        │ RingBuffer (audio::buffer), mirrored 2x      │                │  │
//! │  │        │ write(payload) ─▶ readable() ─▶ consume(n)   │                │  │
//! │  │        └──────────────────────┬───────────────────────┘                │  │
//! │  └───────────────────────────────┼────────────────────────────────────────┘  │
//! │                                  │ AudioChunk (owned, fixed size)            │
//! │                                  ▼                                           │
//! │  ┌────────────────────────────────────────────────────────────────────────┐  │
//! │  │ Bounded hand-off queue (crossbeam-channel)                             │  │
//! │  └───────────────────────────────┬────────────────────────────────────────┘  │
//! │                                  ▼                                           │
//! │  ┌────────────────────────────────────────────────────────────────────────┐  │
//! │  │ Playback thread (audio::playback) ─▶ AudioSink                         │  │
//! │  └────────────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod logging;
pub mod network;
pub mod protocol;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    use std::time::Duration;

    /// Default ring buffer capacity in bytes (two maximum payloads)
    pub const DEFAULT_RING_CAPACITY: usize = 2 * 1436;

    /// Default bytes per chunk handed to the sink
    pub const DEFAULT_CHUNK_SIZE: usize = 512;

    /// Default hand-off queue depth in chunks
    pub const DEFAULT_QUEUE_CAPACITY: usize = 8;

    /// Retry delay after a would-block receive
    pub const RECV_RETRY_DELAY: Duration = Duration::from_millis(10);

    /// Retry delay after any other receive error
    pub const RECV_ERROR_RETRY_DELAY: Duration = Duration::from_millis(100);

    /// How long closing a receiver waits for its worker
    pub const DEFAULT_SHUTDOWN_GRACE_MS: u64 = 500;

    pub const DEFAULT_RECEIVER_THREAD_NAME: &str = "vban-rx";
}
