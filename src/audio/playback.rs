//! Chunk playback into an audio sink
//!
//! A dedicated thread drains the hand-off queue and writes every chunk to
//! an [`AudioSink`]. The sink stands in for the output device driver, which
//! lives outside this crate.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::audio::pipeline::ChunkReceiver;
use crate::error::AudioError;

/// How long the playback thread waits for a chunk before re-checking its flag
const RECV_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Destination for PCM bytes
///
/// `write` may accept fewer bytes than offered; the caller retries with the
/// remainder.
pub trait AudioSink: Send + 'static {
    fn write(&mut self, data: &[u8]) -> io::Result<usize>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Adapts any `io::Write` (a file, stdout, a pipe to `aplay`)
pub struct WriterSink<W> {
    writer: W,
}

impl<W: io::Write + Send + 'static> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: io::Write + Send + 'static> AudioSink for WriterSink<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.writer.write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

/// Accepts and discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        Ok(data.len())
    }
}

/// Write a whole chunk, looping over short writes.
///
/// Returns the number of short writes encountered.
pub fn write_chunk<S: AudioSink + ?Sized>(sink: &mut S, mut data: &[u8]) -> Result<u64, AudioError> {
    let mut short_writes = 0;
    while !data.is_empty() {
        match sink.write(data) {
            Ok(0) => {
                return Err(AudioError::SinkWrite(format!(
                    "sink accepted 0 of {} bytes",
                    data.len()
                )))
            }
            Ok(n) => {
                if n < data.len() {
                    short_writes += 1;
                }
                data = &data[n.min(data.len())..];
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(AudioError::SinkWrite(e.to_string())),
        }
    }
    Ok(short_writes)
}

/// Playback counters
#[derive(Debug, Default)]
pub struct PlaybackStats {
    pub chunks_played: AtomicU64,
    pub bytes_written: AtomicU64,
    pub short_writes: AtomicU64,
    pub write_errors: AtomicU64,
}

/// Sink consumer thread
pub struct Playback {
    running: Arc<AtomicBool>,
    thread_handle: Option<JoinHandle<()>>,
    stats: Arc<PlaybackStats>,
}

impl Playback {
    /// Spawn a thread that plays every chunk from `chunks` into `sink`.
    ///
    /// The thread exits when stopped or when every sender of the queue has
    /// been dropped and the queue is drained.
    pub fn start<S: AudioSink>(chunks: ChunkReceiver, mut sink: S) -> Result<Self, AudioError> {
        let running = Arc::new(AtomicBool::new(true));
        let stats = Arc::new(PlaybackStats::default());

        let running_for_loop = Arc::clone(&running);
        let stats_for_loop = Arc::clone(&stats);

        let handle = thread::Builder::new()
            .name("vban-playback".into())
            .spawn(move || {
                while running_for_loop.load(Ordering::Relaxed) {
                    let chunk = match chunks.recv_timeout(RECV_POLL_INTERVAL) {
                        Ok(chunk) => chunk,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    };

                    match write_chunk(&mut sink, &chunk.data) {
                        Ok(short) => {
                            stats_for_loop.chunks_played.fetch_add(1, Ordering::Relaxed);
                            stats_for_loop
                                .bytes_written
                                .fetch_add(chunk.len() as u64, Ordering::Relaxed);
                            stats_for_loop.short_writes.fetch_add(short, Ordering::Relaxed);
                        }
                        Err(e) => {
                            stats_for_loop.write_errors.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!("Dropped chunk {}: {}", chunk.sequence, e);
                        }
                    }
                }

                if let Err(e) = sink.flush() {
                    tracing::warn!("Sink flush failed: {}", e);
                }
                running_for_loop.store(false, Ordering::Relaxed);
                tracing::debug!("Playback thread exiting");
            })
            .map_err(|e| AudioError::SinkWrite(format!("failed to spawn playback thread: {e}")))?;

        Ok(Self {
            running,
            thread_handle: Some(handle),
            stats,
        })
    }

    /// Stop playback and wait for the thread to exit
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);

        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    /// Wait until the queue disconnects and drains
    pub fn join(mut self) {
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> Arc<PlaybackStats> {
        Arc::clone(&self.stats)
    }
}

impl Drop for Playback {
    fn drop(&mut self) {
        self.stop();
    }
}
