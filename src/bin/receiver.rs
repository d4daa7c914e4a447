//! VBAN Receiver Application
//!
//! Receives a VBAN stream, reassembles it into fixed-size chunks and plays
//! them into a sink: raw PCM on stdout, or nowhere.
//!
//! ```text
//! receiver [--port N] [--stream NAME] [--stdout] [--seconds N] [--config PATH]
//! receiver --stdout | aplay -f S16_LE -r 48000 -c 2
//! ```

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use vban_stream::{
    audio::{
        pipeline::ChunkPipeline,
        playback::{NullSink, Playback, WriterSink},
    },
    config::AppConfig,
    logging,
    network::receiver::VbanReceiver,
};

const STATS_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Parser)]
#[command(name = "receiver")]
#[command(about = "Receive a VBAN stream and play it into a sink")]
struct Args {
    /// UDP port to listen on
    #[arg(long)]
    port: Option<u16>,

    /// Only accept packets with this stream name
    #[arg(long)]
    stream: Option<String>,

    /// Write raw PCM to stdout instead of discarding it
    #[arg(long)]
    stdout: bool,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Configuration file (default: platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;

    // Logs go to stderr so stdout stays clean PCM
    logging::init(&config.log_level);
    tracing::info!("Starting VBAN Receiver");

    if let Some(port) = args.port {
        config.receiver.listen_port = port;
    }
    if let Some(stream) = args.stream {
        config.receiver.expected_stream_name = stream;
    }
    config.validate()?;

    let (pipeline, chunks) = ChunkPipeline::new(&config.pipeline)?;
    let pipeline_stats = pipeline.stats();

    let mut playback = if args.stdout {
        Playback::start(chunks, WriterSink::new(std::io::stdout()))?
    } else {
        Playback::start(chunks, NullSink)?
    };
    let playback_stats = playback.stats();

    let mut receiver = VbanReceiver::new(config.receiver.clone(), pipeline)?;
    receiver.start()?;

    tracing::info!(
        "Listening on {} ({} byte chunks, {:?} on overflow)",
        receiver.local_addr(),
        config.pipeline.chunk_size,
        config.pipeline.overflow
    );

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let mut next_report = Instant::now() + STATS_INTERVAL;

    while deadline.map_or(true, |d| Instant::now() < d) {
        thread::sleep(Duration::from_millis(100));

        if Instant::now() >= next_report {
            next_report += STATS_INTERVAL;
            let rx = receiver.stats();
            let pipe = pipeline_stats.snapshot();
            tracing::info!(
                "Stats: {} datagrams, {} accepted, {} dropped, {} size mismatches | \
                 {} chunks queued, {} chunks dropped, {} packets overflowed | {} chunks played",
                rx.datagrams_received,
                rx.packets_accepted,
                rx.dropped_total(),
                rx.size_mismatches,
                pipe.chunks_emitted,
                pipe.chunks_dropped,
                pipe.packets_dropped,
                playback_stats
                    .chunks_played
                    .load(std::sync::atomic::Ordering::Relaxed)
            );
        }
    }

    receiver.close()?;
    playback.stop();
    Ok(())
}
