//! Audio subsystem module

pub mod buffer;
pub mod pipeline;
pub mod playback;

pub use buffer::RingBuffer;
pub use pipeline::{AudioChunk, ChunkPipeline, ChunkReceiver, OverflowPolicy, PipelineConfig};
pub use playback::{AudioSink, NullSink, Playback, WriterSink};
