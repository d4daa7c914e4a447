//! Role-tagged endpoint

use std::fmt;
use std::net::SocketAddr;

use crate::error::Result;
use crate::network::receiver::{PacketHandler, ReceiverConfig, ReceiverState, VbanReceiver};
use crate::network::sender::{SenderConfig, VbanSender};

/// Which side of a stream an endpoint serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Sender,
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Sender => write!(f, "sender"),
            Role::Receiver => write!(f, "receiver"),
        }
    }
}

/// Either a sender or a receiver, closed the same way
pub enum Endpoint {
    Sender(VbanSender),
    Receiver(VbanReceiver),
}

impl Endpoint {
    pub fn sender(config: &SenderConfig) -> Result<Self> {
        Ok(Self::Sender(VbanSender::new(config)?))
    }

    pub fn receiver<H: PacketHandler>(config: ReceiverConfig, handler: H) -> Result<Self> {
        Ok(Self::Receiver(VbanReceiver::new(config, handler)?))
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Sender(_) => Role::Sender,
            Self::Receiver(_) => Role::Receiver,
        }
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        match self {
            Self::Sender(sender) => sender.local_addr(),
            Self::Receiver(receiver) => Ok(receiver.local_addr()),
        }
    }

    /// Receiver state; `None` for senders
    pub fn receiver_state(&self) -> Option<ReceiverState> {
        match self {
            Self::Sender(_) => None,
            Self::Receiver(receiver) => Some(receiver.state()),
        }
    }

    pub fn as_sender_mut(&mut self) -> Option<&mut VbanSender> {
        match self {
            Self::Sender(sender) => Some(sender),
            Self::Receiver(_) => None,
        }
    }

    pub fn as_receiver_mut(&mut self) -> Option<&mut VbanReceiver> {
        match self {
            Self::Sender(_) => None,
            Self::Receiver(receiver) => Some(receiver),
        }
    }

    /// Release the endpoint, stopping a running receiver first
    pub fn close(self) -> Result<()> {
        match self {
            Self::Sender(sender) => {
                sender.close();
                Ok(())
            }
            Self::Receiver(receiver) => receiver.close(),
        }
    }
}

impl From<VbanSender> for Endpoint {
    fn from(sender: VbanSender) -> Self {
        Self::Sender(sender)
    }
}

impl From<VbanReceiver> for Endpoint {
    fn from(receiver: VbanReceiver) -> Self {
        Self::Receiver(receiver)
    }
}
