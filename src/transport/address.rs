//! Local Address Discovery

use std::net::{IpAddr, SocketAddr};

use tokio::net::UdpSocket;
use tracing::debug;

use crate::protocol::constants::FALLBACK_LOCAL_ADDRESS;
use crate::Result;

/// Any routable address works; connecting a UDP socket sends nothing.
const PROBE_TARGET: &str = "192.0.2.1:9";

/// This host's outward-facing IPv4 address, or `localhost` if there is none
pub async fn discover_local_ip() -> String {
    match probe_local_ip().await {
        Ok(ip) if is_announceable(&ip) => ip.to_string(),
        Ok(ip) => {
            debug!(%ip, "Local address probe found no usable address");
            FALLBACK_LOCAL_ADDRESS.to_string()
        }
        Err(e) => {
            debug!("Local address probe failed: {:#}", e);
            FALLBACK_LOCAL_ADDRESS.to_string()
        }
    }
}

async fn probe_local_ip() -> Result<IpAddr> {
    let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], 0))).await?;
    socket.connect(PROBE_TARGET).await?;
    Ok(socket.local_addr()?.ip())
}

fn is_announceable(ip: &IpAddr) -> bool {
    ip.is_ipv4() && !ip.is_loopback() && !ip.is_unspecified()
}

/// The part of a peer's socket address that goes into announcements
pub fn peer_address(peer: SocketAddr) -> String {
    peer.ip().to_string()
}
