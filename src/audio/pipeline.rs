//! Payload-to-chunk reassembly
//!
//! Variable-length packet payloads go into a [`RingBuffer`]; every time at
//! least `chunk_size` bytes are stored, one fixed-size [`AudioChunk`] is cut
//! from the contiguous readable region and placed on a bounded queue for the
//! sink thread.
//!
//! Chunks are owned copies. The ring buffer is free to overwrite its storage
//! as soon as a chunk is queued, regardless of how far behind the consumer is.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use serde::{Deserialize, Serialize};

use crate::audio::buffer::RingBuffer;
use crate::constants::{DEFAULT_CHUNK_SIZE, DEFAULT_QUEUE_CAPACITY, DEFAULT_RING_CAPACITY};
use crate::error::{AudioError, BufferError, Error, Result};
use crate::network::receiver::{LoopContext, PacketHandler};
use crate::protocol::{Packet, MAX_PAYLOAD_SIZE};

/// How often a blocked enqueue re-checks whether it should give up
const ENQUEUE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// What to do with a chunk when the hand-off queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Wait for the sink; a slow sink stalls the receive loop
    #[default]
    Block,
    /// Discard the new chunk and keep receiving
    DropNewest,
}

/// Chunking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Ring buffer capacity in bytes
    pub ring_capacity: usize,
    /// Bytes per chunk handed to the sink
    pub chunk_size: usize,
    /// Hand-off queue depth in chunks
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ring_capacity: DEFAULT_RING_CAPACITY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

/// Smallest queue that can absorb one maximum-size payload plus slack
pub fn min_queue_capacity(chunk_size: usize) -> usize {
    MAX_PAYLOAD_SIZE.div_ceil(chunk_size.max(1)) + 2
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.ring_capacity == 0 {
            return Err(AudioError::InvalidChunkConfig("ring capacity must be non-zero".into()).into());
        }
        if self.chunk_size == 0 || self.chunk_size > self.ring_capacity {
            return Err(AudioError::InvalidChunkConfig(format!(
                "chunk size must be 1-{} bytes, got {}",
                self.ring_capacity, self.chunk_size
            ))
            .into());
        }
        let min_queue = min_queue_capacity(self.chunk_size);
        if self.queue_capacity < min_queue {
            return Err(AudioError::InvalidChunkConfig(format!(
                "queue capacity {} is below the minimum of {} for {}-byte chunks",
                self.queue_capacity, min_queue, self.chunk_size
            ))
            .into());
        }
        Ok(())
    }
}

/// One fixed-size block of PCM bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Position in emission order, starting at 0
    pub sequence: u64,
    pub data: Bytes,
}

impl AudioChunk {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Consumer side of the hand-off queue
pub type ChunkReceiver = Receiver<AudioChunk>;

/// Pipeline counters
#[derive(Debug, Default)]
pub struct PipelineStats {
    pub chunks_emitted: AtomicU64,
    pub chunks_dropped: AtomicU64,
    pub packets_dropped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStatsSnapshot {
    pub chunks_emitted: u64,
    pub chunks_dropped: u64,
    pub packets_dropped: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> PipelineStatsSnapshot {
        PipelineStatsSnapshot {
            chunks_emitted: self.chunks_emitted.load(Ordering::Relaxed),
            chunks_dropped: self.chunks_dropped.load(Ordering::Relaxed),
            packets_dropped: self.packets_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Payload handler feeding the ring buffer and the hand-off queue
pub struct ChunkPipeline {
    buffer: RingBuffer,
    chunk_size: usize,
    overflow: OverflowPolicy,
    tx: Sender<AudioChunk>,
    next_sequence: u64,
    stats: Arc<PipelineStats>,
}

impl ChunkPipeline {
    /// Build a pipeline and the receiving end of its queue
    pub fn new(config: &PipelineConfig) -> Result<(Self, ChunkReceiver)> {
        config.validate()?;
        if config.ring_capacity < MAX_PAYLOAD_SIZE + config.chunk_size - 1 {
            tracing::warn!(
                "Ring capacity {} cannot always hold a {}-byte payload with {}-byte chunks; \
                 large packets may be dropped",
                config.ring_capacity,
                MAX_PAYLOAD_SIZE,
                config.chunk_size
            );
        }

        let buffer = RingBuffer::new(config.ring_capacity)?;
        let (tx, rx) = bounded(config.queue_capacity);

        Ok((
            Self {
                buffer,
                chunk_size: config.chunk_size,
                overflow: config.overflow,
                tx,
                next_sequence: 0,
                stats: Arc::new(PipelineStats::default()),
            },
            rx,
        ))
    }

    /// Store a payload and emit every complete chunk.
    ///
    /// Returns the number of chunks queued. A payload that does not fit is
    /// dropped whole and reported as [`BufferError::BufferFull`].
    pub fn push_payload(&mut self, payload: &[u8]) -> Result<usize> {
        self.push_payload_while(payload, || true)
    }

    /// Like [`push_payload`](Self::push_payload), but a blocked enqueue gives
    /// up once `keep_going` returns false.
    pub fn push_payload_while(
        &mut self,
        payload: &[u8],
        keep_going: impl Fn() -> bool,
    ) -> Result<usize> {
        if let Err(e) = self.buffer.write(payload) {
            if matches!(e, BufferError::BufferFull { .. }) {
                self.stats.packets_dropped.fetch_add(1, Ordering::Relaxed);
            }
            return Err(e.into());
        }

        let mut queued = 0;
        while self.buffer.len() >= self.chunk_size {
            let region = self.buffer.readable();
            debug_assert!(region.len() >= self.chunk_size);

            let chunk = AudioChunk {
                sequence: self.next_sequence,
                data: Bytes::copy_from_slice(&region[..self.chunk_size]),
            };
            self.next_sequence += 1;

            // The chunk leaves the ring whether or not the queue took it
            let delivered = self.enqueue(chunk, &keep_going);
            self.buffer.consume(self.chunk_size)?;
            if delivered? {
                queued += 1;
            }
        }
        Ok(queued)
    }

    /// Returns whether the chunk reached the queue
    fn enqueue(&self, chunk: AudioChunk, keep_going: &impl Fn() -> bool) -> Result<bool> {
        match self.overflow {
            OverflowPolicy::DropNewest => match self.tx.try_send(chunk) {
                Ok(()) => {
                    self.stats.chunks_emitted.fetch_add(1, Ordering::Relaxed);
                    Ok(true)
                }
                Err(TrySendError::Full(chunk)) => {
                    self.stats.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!("Hand-off queue full, dropped chunk {}", chunk.sequence);
                    Ok(false)
                }
                Err(TrySendError::Disconnected(_)) => Err(AudioError::QueueDisconnected.into()),
            },
            OverflowPolicy::Block => {
                let mut chunk = chunk;
                loop {
                    match self.tx.send_timeout(chunk, ENQUEUE_POLL_INTERVAL) {
                        Ok(()) => {
                            self.stats.chunks_emitted.fetch_add(1, Ordering::Relaxed);
                            return Ok(true);
                        }
                        Err(SendTimeoutError::Timeout(pending)) => {
                            if !keep_going() {
                                self.stats.chunks_dropped.fetch_add(1, Ordering::Relaxed);
                                tracing::debug!(
                                    "Abandoned chunk {} while shutting down",
                                    pending.sequence
                                );
                                return Ok(false);
                            }
                            chunk = pending;
                        }
                        Err(SendTimeoutError::Disconnected(_)) => {
                            return Err(AudioError::QueueDisconnected.into());
                        }
                    }
                }
            }
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes waiting for a full chunk
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Shared counters, readable from other threads
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Discard partially accumulated bytes
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl PacketHandler for ChunkPipeline {
    fn on_packet(&mut self, packet: &Packet<'_>, source: SocketAddr, ctx: &LoopContext<'_>) {
        match self.push_payload_while(packet.payload, || ctx.is_running()) {
            Ok(_) => {}
            Err(Error::Buffer(BufferError::BufferFull { requested, free })) => {
                tracing::warn!(
                    "Ring buffer full, dropped frame {} from {} ({} bytes, {} free)",
                    packet.header.frame_counter,
                    source,
                    requested,
                    free
                );
            }
            Err(e) => {
                tracing::warn!("Failed to hand off frame {}: {}", packet.header.frame_counter, e);
            }
        }
    }
}
