//! VBAN receiver
//!
//! A [`VbanReceiver`] owns a bound UDP socket and a worker thread running the
//! receive loop. Every datagram is decoded and filtered; accepted packets are
//! handed to a [`PacketHandler`] on the worker thread.
//!
//! Lifecycle:
//!
//! ```text
//!   Idle --start()--> (worker begins) Running --stop()--> Stopping --(loop exits)--> Idle
//! ```
//!
//! `stop()` only requests shutdown. It half-closes the socket so that a
//! blocked `recv_from` returns, then returns without waiting.
//! [`VbanReceiver::wait_stopped`] and [`VbanReceiver::close`] wait for the
//! worker with a bound.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_RECEIVER_THREAD_NAME, DEFAULT_SHUTDOWN_GRACE_MS, RECV_ERROR_RETRY_DELAY,
    RECV_RETRY_DELAY,
};
use crate::error::{Error, NetworkError, ProtocolError, Result, StateError};
use crate::network::stats::{DropReason, ReceiverStats, ReceiverStatsSnapshot};
use crate::network::udp;
use crate::protocol::{
    decode, Codec, Packet, StreamName, SubProtocol, DEFAULT_PORT, MAX_CONFIG_STREAM_NAME_LEN,
    MAX_PACKET_SIZE,
};

/// How often waits re-check whether the worker has exited
const WORKER_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Receiver lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReceiverState {
    Idle = 0,
    Running = 1,
    Stopping = 2,
}

impl ReceiverState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

/// Receiver configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverConfig {
    /// Only accept this stream; empty accepts every stream
    pub expected_stream_name: String,
    /// 0 selects the VBAN default port
    pub listen_port: u16,
    pub bind_addr: std::net::IpAddr,
    /// Socket read timeout; `None` blocks until a datagram or shutdown
    pub read_timeout_ms: Option<u64>,
    /// How long `close` waits for the worker to exit
    pub shutdown_grace_ms: u64,
    /// Worker stack size in bytes; platform default when unset
    pub stack_size: Option<usize>,
    pub thread_name: String,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            expected_stream_name: String::new(),
            listen_port: DEFAULT_PORT,
            bind_addr: std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            read_timeout_ms: None,
            shutdown_grace_ms: DEFAULT_SHUTDOWN_GRACE_MS,
            stack_size: None,
            thread_name: DEFAULT_RECEIVER_THREAD_NAME.to_string(),
        }
    }
}

impl ReceiverConfig {
    /// Check field ranges without touching the network
    pub fn validate(&self) -> Result<()> {
        self.stream_filter()?;
        if self.thread_name.contains('\0') {
            return Err(Error::InvalidArgument(
                "thread name must not contain NUL bytes".into(),
            ));
        }
        if self.read_timeout_ms == Some(0) {
            return Err(Error::InvalidArgument(
                "read timeout must be non-zero; omit it to block".into(),
            ));
        }
        Ok(())
    }

    /// Address the socket binds to, with port 0 mapped to the default
    pub fn listen_addr(&self) -> SocketAddr {
        let port = if self.listen_port == 0 {
            DEFAULT_PORT
        } else {
            self.listen_port
        };
        SocketAddr::new(self.bind_addr, port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout_ms.map(Duration::from_millis)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    /// The stream name to match, or `None` to accept all
    fn stream_filter(&self) -> Result<Option<StreamName>> {
        let name = &self.expected_stream_name;
        if name.is_empty() {
            return Ok(None);
        }
        if name.len() > MAX_CONFIG_STREAM_NAME_LEN {
            return Err(Error::InvalidArgument(format!(
                "expected stream name may be at most {} characters, got {}",
                MAX_CONFIG_STREAM_NAME_LEN,
                name.len()
            )));
        }
        let name = StreamName::new(name).map_err(|e: ProtocolError| {
            Error::InvalidArgument(format!("expected stream name: {e}"))
        })?;
        Ok(Some(name))
    }
}

/// State shared between the handle and its worker
#[derive(Debug, Default)]
struct Shared {
    state: AtomicU8,
    worker_active: AtomicBool,
    stats: ReceiverStats,
}

impl Shared {
    fn state(&self) -> ReceiverState {
        ReceiverState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: ReceiverState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    fn transition(&self, from: ReceiverState, to: ReceiverState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// View of the receive loop handed to every [`PacketHandler`] call
pub struct LoopContext<'a> {
    shared: &'a Shared,
}

impl LoopContext<'_> {
    /// False once a stop was requested; long-running handlers should bail out
    pub fn is_running(&self) -> bool {
        self.shared.state() == ReceiverState::Running
    }

    pub fn state(&self) -> ReceiverState {
        self.shared.state()
    }
}

/// Consumer of accepted packets
///
/// Called synchronously on the receive thread, so the socket is not drained
/// while `on_packet` runs. Implementations must not block without bound; a
/// handler that waits should poll [`LoopContext::is_running`].
pub trait PacketHandler: Send + 'static {
    fn on_packet(&mut self, packet: &Packet<'_>, source: SocketAddr, ctx: &LoopContext<'_>);
}

/// Adapts a closure into a [`PacketHandler`]
pub struct FnHandler<F>(pub F);

impl<F> PacketHandler for FnHandler<F>
where
    F: FnMut(&Packet<'_>, SocketAddr) + Send + 'static,
{
    fn on_packet(&mut self, packet: &Packet<'_>, source: SocketAddr, _ctx: &LoopContext<'_>) {
        (self.0)(packet, source)
    }
}

type SharedHandler = Arc<Mutex<Box<dyn PacketHandler>>>;

/// Decode a datagram and apply the receive filters.
///
/// `expected` of `None` accepts every stream name; otherwise all 16 raw
/// name bytes must match.
pub fn filter_datagram<'a>(
    datagram: &'a [u8],
    expected: Option<&StreamName>,
) -> std::result::Result<Packet<'a>, DropReason> {
    let packet = decode(datagram).map_err(|e| match e {
        ProtocolError::PacketTooShort(_) => DropReason::TooShort,
        _ => DropReason::BadMagic,
    })?;

    if let Some(expected) = expected {
        if packet.header.stream_name != *expected {
            return Err(DropReason::StreamMismatch);
        }
    }
    if packet.header.sub_protocol != SubProtocol::Audio {
        return Err(DropReason::SubProtocol);
    }
    if packet.header.codec != Codec::Pcm {
        return Err(DropReason::Codec);
    }
    Ok(packet)
}

/// Builder for [`VbanReceiver`]
pub struct ReceiverBuilder {
    config: ReceiverConfig,
    handler: Option<Box<dyn PacketHandler>>,
}

impl ReceiverBuilder {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            handler: None,
        }
    }

    pub fn handler<H: PacketHandler>(mut self, handler: H) -> Self {
        self.handler = Some(Box::new(handler));
        self
    }

    pub fn handler_fn<F>(self, f: F) -> Self
    where
        F: FnMut(&Packet<'_>, SocketAddr) + Send + 'static,
    {
        self.handler(FnHandler(f))
    }

    /// Validate the configuration and bind the socket.
    ///
    /// The receiver starts out Idle.
    pub fn build(self) -> Result<VbanReceiver> {
        let Some(handler) = self.handler else {
            return Err(Error::InvalidArgument(
                "receiver requires a packet handler".into(),
            ));
        };
        self.config.validate()?;
        let filter = self.config.stream_filter()?;

        let socket = udp::bind_receiver(self.config.listen_addr(), self.config.read_timeout())?;
        let local_addr = socket.local_addr().map_err(|e| {
            NetworkError::SocketCreate(format!("cannot read local address: {e}"))
        })?;

        tracing::info!(
            "VBAN receiver created on {} (stream filter: {})",
            local_addr,
            filter
                .as_ref()
                .map(|name| name.to_string())
                .unwrap_or_else(|| "any".into())
        );

        Ok(VbanReceiver {
            config: self.config,
            filter,
            local_addr,
            socket: Some(Arc::new(socket)),
            socket_spent: false,
            handler: Arc::new(Mutex::new(handler)),
            shared: Arc::new(Shared::default()),
            worker: None,
        })
    }
}

/// Receiving endpoint
pub struct VbanReceiver {
    config: ReceiverConfig,
    filter: Option<StreamName>,
    local_addr: SocketAddr,
    socket: Option<Arc<UdpSocket>>,
    /// Set once the socket has been half-closed and must be rebound
    socket_spent: bool,
    handler: SharedHandler,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl VbanReceiver {
    pub fn builder(config: ReceiverConfig) -> ReceiverBuilder {
        ReceiverBuilder::new(config)
    }

    /// Shorthand for a builder with `handler`
    pub fn new<H: PacketHandler>(config: ReceiverConfig, handler: H) -> Result<Self> {
        ReceiverBuilder::new(config).handler(handler).build()
    }

    /// Spawn the receive loop.
    ///
    /// The worker moves the state to Running once it begins executing, so a
    /// caller may briefly observe Idle after this returns.
    pub fn start(&mut self) -> Result<()> {
        match self.shared.state() {
            ReceiverState::Idle => {}
            ReceiverState::Running => return Err(StateError::AlreadyStarted.into()),
            state => return Err(StateError::InvalidState(state).into()),
        }
        if self.shared.worker_active.load(Ordering::SeqCst) {
            return Err(StateError::AlreadyStarted.into());
        }

        // The previous worker has already left its loop; reap it so it no
        // longer holds the socket
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }

        let socket = self.live_socket()?;
        let shared = Arc::clone(&self.shared);
        let handler = Arc::clone(&self.handler);
        let filter = self.filter;

        let mut builder = thread::Builder::new().name(self.config.thread_name.clone());
        if let Some(stack_size) = self.config.stack_size {
            builder = builder.stack_size(stack_size);
        }

        self.shared.worker_active.store(true, Ordering::SeqCst);
        let spawned = builder.spawn(move || {
            receive_loop(&socket, &shared, &handler, filter.as_ref());
        });

        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                tracing::info!("VBAN receiver on {} starting", self.local_addr);
                Ok(())
            }
            Err(e) => {
                self.shared.worker_active.store(false, Ordering::SeqCst);
                Err(NetworkError::ThreadSpawn(e.to_string()).into())
            }
        }
    }

    /// The bound socket, rebinding if the previous one was half-closed
    fn live_socket(&mut self) -> Result<Arc<UdpSocket>> {
        if let (Some(socket), false) = (&self.socket, self.socket_spent) {
            return Ok(Arc::clone(socket));
        }

        // Release the old port before binding it again
        self.socket = None;
        let socket = Arc::new(udp::bind_receiver(
            self.local_addr,
            self.config.read_timeout(),
        )?);
        self.socket = Some(Arc::clone(&socket));
        self.socket_spent = false;
        tracing::debug!("Rebound receiver socket on {}", self.local_addr);
        Ok(socket)
    }

    /// Request shutdown of a running receiver.
    ///
    /// Returns immediately; the worker exits once its pending receive call
    /// returns.
    pub fn stop(&mut self) -> Result<()> {
        if !self
            .shared
            .transition(ReceiverState::Running, ReceiverState::Stopping)
        {
            return Err(StateError::NotStarted.into());
        }

        if let Some(socket) = &self.socket {
            udp::half_close(socket);
        }
        self.socket_spent = true;

        tracing::info!("VBAN receiver on {} stopping", self.local_addr);
        Ok(())
    }

    /// Wait up to `timeout` for the worker to exit.
    ///
    /// Returns true when no worker is left running.
    pub fn wait_stopped(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.shared.worker_active.load(Ordering::SeqCst) {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(WORKER_POLL_INTERVAL);
        }

        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
        true
    }

    /// Stop the worker if needed and release the socket.
    ///
    /// Fails with `InvalidState(Stopping)` if the worker did not exit within
    /// the configured grace period; it is then detached.
    pub fn close(mut self) -> Result<()> {
        if self.shutdown() {
            Ok(())
        } else {
            Err(StateError::InvalidState(ReceiverState::Stopping).into())
        }
    }

    fn shutdown(&mut self) -> bool {
        let deadline = Instant::now() + self.config.shutdown_grace();
        let mut exited = true;

        loop {
            match self.shared.state() {
                ReceiverState::Running => {
                    let _ = self.stop();
                }
                _ if !self.shared.worker_active.load(Ordering::SeqCst) => break,
                // Worker is starting up or draining
                _ => {}
            }
            if Instant::now() >= deadline {
                exited = false;
                break;
            }
            thread::sleep(WORKER_POLL_INTERVAL);
        }

        if exited {
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
        } else {
            tracing::warn!(
                "VBAN receiver worker on {} did not exit within {:?}; detaching",
                self.local_addr,
                self.config.shutdown_grace()
            );
            self.worker = None;
        }

        if self.socket.take().is_some() {
            tracing::info!("VBAN receiver on {} deleted", self.local_addr);
        }
        exited
    }

    pub fn state(&self) -> ReceiverState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ReceiverState::Running
    }

    /// Actual bound address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ReceiverConfig {
        &self.config
    }

    pub fn stats(&self) -> ReceiverStatsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for VbanReceiver {
    fn drop(&mut self) {
        if self.socket.is_some() || self.worker.is_some() {
            self.shutdown();
        }
    }
}

fn receive_loop(
    socket: &UdpSocket,
    shared: &Shared,
    handler: &Mutex<Box<dyn PacketHandler>>,
    expected: Option<&StreamName>,
) {
    let mut handler = handler.lock();
    let ctx = LoopContext { shared };
    let mut buf = vec![0u8; MAX_PACKET_SIZE];

    shared.set_state(ReceiverState::Running);
    tracing::debug!("Receive loop running");

    while shared.state() == ReceiverState::Running {
        let (len, source) = match socket.recv_from(&mut buf) {
            Ok(received) => received,
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
                ) =>
            {
                thread::sleep(RECV_RETRY_DELAY);
                continue;
            }
            Err(e) => {
                if shared.state() != ReceiverState::Running {
                    break;
                }
                shared.stats.socket_errors.fetch_add(1, Ordering::Relaxed);
                tracing::error!("Receive failed: {}", e);
                thread::sleep(RECV_ERROR_RETRY_DELAY);
                continue;
            }
        };

        // A shut-down socket reports empty reads
        if len == 0 && shared.state() != ReceiverState::Running {
            break;
        }

        shared.stats.record_datagram(len);
        let packet = match filter_datagram(&buf[..len], expected) {
            Ok(packet) => packet,
            Err(reason) => {
                shared.stats.record_drop(reason);
                tracing::trace!("Dropped {}-byte datagram from {}: {:?}", len, source, reason);
                continue;
            }
        };

        if !packet.payload_len_matches() {
            shared.stats.size_mismatches.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                "Frame {} from {}: payload is {} bytes, header implies {}",
                packet.header.frame_counter,
                source,
                packet.payload.len(),
                packet.header.expected_payload_len()
            );
        }

        shared.stats.packets_accepted.fetch_add(1, Ordering::Relaxed);
        handler.on_packet(&packet, source, &ctx);
    }

    drop(handler);
    tracing::debug!("Receive loop exiting");
    shared.worker_active.store(false, Ordering::SeqCst);
    shared.set_state(ReceiverState::Idle);
}
