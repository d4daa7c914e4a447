//! VBAN Test-Tone Sender
//!
//! Streams a sine tone to a VBAN receiver.
//!
//! ```text
//! sender [IP:PORT] [--stream NAME] [--freq HZ] [--seconds N] [--config PATH]
//! ```

use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use vban_stream::{
    config::AppConfig,
    logging,
    network::sender::{AudioFormat, VbanSender},
    protocol::{DataType, MAX_PAYLOAD_SIZE, MAX_SAMPLES_PER_FRAME},
};

#[derive(Parser)]
#[command(name = "sender")]
#[command(about = "Stream a sine test tone to a VBAN receiver")]
struct Args {
    /// Receiver address; overrides the configured destination
    target: Option<SocketAddr>,

    /// Stream name put in every packet header
    #[arg(long)]
    stream: Option<String>,

    /// Tone frequency in Hz
    #[arg(long, default_value = "440")]
    freq: f32,

    /// Stop after this many seconds
    #[arg(long)]
    seconds: Option<u64>,

    /// Configuration file (default: platform config directory)
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Append one sample in `data_type` encoding; `value` is in [-1, 1]
fn push_sample(out: &mut Vec<u8>, data_type: DataType, value: f32) {
    let value = value.clamp(-1.0, 1.0);
    match data_type {
        DataType::Uint8 => out.push((value * 127.0 + 128.0) as u8),
        DataType::Int16 => out.extend_from_slice(&((value * i16::MAX as f32) as i16).to_le_bytes()),
        DataType::Int24 => {
            let sample = (value * 8_388_607.0) as i32;
            out.extend_from_slice(&sample.to_le_bytes()[..3]);
        }
        DataType::Int32 => out.extend_from_slice(&((value as f64 * i32::MAX as f64) as i32).to_le_bytes()),
        DataType::Float32 => out.extend_from_slice(&value.to_le_bytes()),
        DataType::Float64 => out.extend_from_slice(&(value as f64).to_le_bytes()),
        // Rejected when the sender is created
        DataType::Int12 | DataType::Int10 => {}
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = AppConfig::load_or_default(args.config.as_deref())?;

    logging::init(&config.log_level);
    tracing::info!("Starting VBAN Sender");

    if let Some(target) = args.target {
        config.sender.dest_addr = target.ip().to_string();
        config.sender.dest_port = target.port();
    }
    if let Some(stream) = args.stream {
        config.sender.stream_name = stream;
    }

    let mut sender = VbanSender::new(&config.sender)?;
    let AudioFormat {
        sample_rate,
        channels,
        data_type,
    } = sender.format();

    let frame_size = sender.format().frame_size();
    let samples = (MAX_PAYLOAD_SIZE / frame_size).min(MAX_SAMPLES_PER_FRAME);
    let frame_period = Duration::from_secs_f64(samples as f64 / sample_rate as f64);

    tracing::info!(
        "Sending {:.0} Hz tone, {} samples per packet ({:.2} ms)",
        args.freq,
        samples,
        frame_period.as_secs_f64() * 1000.0
    );

    let deadline = args.seconds.map(|s| Instant::now() + Duration::from_secs(s));
    let phase_step = std::f32::consts::TAU * args.freq / sample_rate as f32;
    let mut phase = 0.0f32;
    let mut frame = Vec::with_capacity(samples * frame_size);
    let start = Instant::now();
    let mut packets: u64 = 0;

    loop {
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        frame.clear();
        for _ in 0..samples {
            let value = 0.5 * phase.sin();
            for _ in 0..channels {
                push_sample(&mut frame, data_type, value);
            }
            phase = (phase + phase_step) % std::f32::consts::TAU;
        }

        if let Err(e) = sender.send(&frame, samples) {
            tracing::warn!("Failed to send packet: {}", e);
        }
        packets += 1;

        if packets % 1000 == 0 {
            let stats = sender.stats();
            tracing::info!(
                "Stats: {} packets sent, {:.1} KB sent, {} errors",
                stats.packets_sent,
                stats.bytes_sent as f64 / 1024.0,
                stats.send_errors
            );
        }

        // Pace to real time
        let due = start + frame_period.mul_f64(packets as f64);
        if let Some(wait) = due.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }

    sender.close();
    Ok(())
}
