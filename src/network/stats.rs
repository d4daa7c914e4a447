//! Receive-side counters

use std::sync::atomic::{AtomicU64, Ordering};

/// Why a datagram was discarded before reaching the packet handler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    TooShort,
    BadMagic,
    StreamMismatch,
    SubProtocol,
    Codec,
}

/// Counters updated by the receive thread
#[derive(Debug, Default)]
pub struct ReceiverStats {
    pub datagrams_received: AtomicU64,
    pub bytes_received: AtomicU64,
    pub packets_accepted: AtomicU64,
    pub dropped_too_short: AtomicU64,
    pub dropped_bad_magic: AtomicU64,
    pub dropped_stream_mismatch: AtomicU64,
    pub dropped_sub_protocol: AtomicU64,
    pub dropped_codec: AtomicU64,
    pub size_mismatches: AtomicU64,
    pub socket_errors: AtomicU64,
}

/// Point-in-time copy of [`ReceiverStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReceiverStatsSnapshot {
    pub datagrams_received: u64,
    pub bytes_received: u64,
    pub packets_accepted: u64,
    pub dropped_too_short: u64,
    pub dropped_bad_magic: u64,
    pub dropped_stream_mismatch: u64,
    pub dropped_sub_protocol: u64,
    pub dropped_codec: u64,
    pub size_mismatches: u64,
    pub socket_errors: u64,
}

impl ReceiverStatsSnapshot {
    pub fn dropped_total(&self) -> u64 {
        self.dropped_too_short
            + self.dropped_bad_magic
            + self.dropped_stream_mismatch
            + self.dropped_sub_protocol
            + self.dropped_codec
    }
}

impl ReceiverStats {
    pub(crate) fn record_datagram(&self, len: usize) {
        self.datagrams_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(len as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self, reason: DropReason) {
        let counter = match reason {
            DropReason::TooShort => &self.dropped_too_short,
            DropReason::BadMagic => &self.dropped_bad_magic,
            DropReason::StreamMismatch => &self.dropped_stream_mismatch,
            DropReason::SubProtocol => &self.dropped_sub_protocol,
            DropReason::Codec => &self.dropped_codec,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ReceiverStatsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        ReceiverStatsSnapshot {
            datagrams_received: load(&self.datagrams_received),
            bytes_received: load(&self.bytes_received),
            packets_accepted: load(&self.packets_accepted),
            dropped_too_short: load(&self.dropped_too_short),
            dropped_bad_magic: load(&self.dropped_bad_magic),
            dropped_stream_mismatch: load(&self.dropped_stream_mismatch),
            dropped_sub_protocol: load(&self.dropped_sub_protocol),
            dropped_codec: load(&self.dropped_codec),
            size_mismatches: load(&self.size_mismatches),
            socket_errors: load(&self.socket_errors),
        }
    }
}

/// Sender counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SenderStats {
    pub packets_sent: u64,
    pub bytes_sent: u64,
    pub send_errors: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_reasons_land_in_their_counters() {
        let stats = ReceiverStats::default();
        stats.record_datagram(40);
        stats.record_datagram(10);
        stats.record_drop(DropReason::TooShort);
        stats.record_drop(DropReason::StreamMismatch);
        stats.record_drop(DropReason::StreamMismatch);

        let snap = stats.snapshot();
        assert_eq!(snap.datagrams_received, 2);
        assert_eq!(snap.bytes_received, 50);
        assert_eq!(snap.dropped_too_short, 1);
        assert_eq!(snap.dropped_stream_mismatch, 2);
        assert_eq!(snap.dropped_total(), 3);
        assert_eq!(snap.packets_accepted, 0);
    }
}
