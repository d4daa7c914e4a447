//! UDP socket setup

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, SockRef, Socket, Type};

use crate::error::NetworkError;
use crate::protocol::MAX_PACKET_SIZE;

/// Kernel receive buffer requested for listening sockets
const RECV_BUFFER_SIZE: usize = MAX_PACKET_SIZE * 64;

fn new_socket(addr: &SocketAddr) -> Result<Socket, NetworkError> {
    Socket::new(Domain::for_address(*addr), Type::DGRAM, Some(Protocol::UDP))
        .map_err(|e| NetworkError::SocketCreate(e.to_string()))
}

/// Create a blocking socket bound to `addr` for receiving.
///
/// `read_timeout` of `None` blocks indefinitely.
pub fn bind_receiver(
    addr: SocketAddr,
    read_timeout: Option<Duration>,
) -> Result<UdpSocket, NetworkError> {
    let socket = new_socket(&addr)?;

    // No SO_REUSEADDR: an occupied port must fail to bind
    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_SIZE) {
        tracing::debug!("Could not enlarge receive buffer: {}", e);
    }

    socket
        .bind(&addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{addr}: {e}")))?;

    socket
        .set_read_timeout(read_timeout)
        .map_err(|e| NetworkError::SocketCreate(e.to_string()))?;

    Ok(socket.into())
}

/// Create a socket for sending, bound to `bind_addr` (port 0 picks any).
pub fn create_socket(bind_addr: SocketAddr) -> Result<UdpSocket, NetworkError> {
    let socket = new_socket(&bind_addr)?;
    socket
        .bind(&bind_addr.into())
        .map_err(|e| NetworkError::BindFailed(format!("{bind_addr}: {e}")))?;
    Ok(socket.into())
}

/// Address a wake-up datagram can reach for a socket bound to `local`
fn wake_address(local: SocketAddr) -> SocketAddr {
    match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), local.port())
        }
        IpAddr::V6(ip) if ip.is_unspecified() => {
            SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), local.port())
        }
        _ => local,
    }
}

/// Force a thread blocked in `recv_from` on `socket` to return.
///
/// Shuts the socket down in both directions; the socket cannot receive
/// afterwards. Some platforms refuse to shut down an unconnected datagram
/// socket, so an empty datagram is also sent to the bound address.
pub fn half_close(socket: &UdpSocket) {
    match SockRef::from(socket).shutdown(Shutdown::Both) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
        Err(e) => tracing::debug!("Socket shutdown failed: {}", e),
    }

    let Ok(local) = socket.local_addr() else {
        return;
    };
    let target = wake_address(local);
    let any = if target.is_ipv4() {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    } else {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0)
    };
    match UdpSocket::bind(any).and_then(|nudge| nudge.send_to(&[], target)) {
        Ok(_) => {}
        Err(e) => tracing::debug!("Wake-up datagram to {} failed: {}", target, e),
    }
}
