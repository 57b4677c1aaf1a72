use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use socket2::{Domain, Protocol, Socket, Type};

/// Receive buffer big enough for bursty multicast TS at high bitrates
const RECV_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// UDP socket receiving a transport stream, unicast or multicast.
pub fn create_udp_socket(sock_addr: SocketAddr) -> anyhow::Result<Socket> {
    let ip = match sock_addr.ip() {
        IpAddr::V4(v4) => v4,
        _ => anyhow::bail!("only IPv4 is supported"),
    };

    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    if let Err(e) = socket.set_recv_buffer_size(RECV_BUFFER_BYTES) {
        tracing::debug!(error = %e, "could not enlarge receive buffer");
    }
    socket.bind(&sock_addr.into())?;

    if ip.is_multicast() {
        socket.join_multicast_v4(&ip, &Ipv4Addr::UNSPECIFIED)?;
    }

    socket.set_nonblocking(true)?;
    Ok(socket)
}
