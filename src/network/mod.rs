//! Network subsystem for VBAN over UDP

pub mod endpoint;
pub mod receiver;
pub mod sender;
pub mod stats;
pub mod udp;

pub use endpoint::{Endpoint, Role};
pub use receiver::{
    filter_datagram, FnHandler, LoopContext, PacketHandler, ReceiverBuilder, ReceiverConfig,
    ReceiverState, VbanReceiver,
};
pub use sender::{AudioFormat, SenderConfig, VbanSender};
pub use stats::{DropReason, ReceiverStats, ReceiverStatsSnapshot, SenderStats};
