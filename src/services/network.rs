//! Works out the URL other devices on the LAN can use to reach the server.

use std::net::{IpAddr, Ipv4Addr};
use tokio::net::UdpSocket;

/// Address the OS would use as source for outbound traffic.
///
/// Connecting a UDP socket only selects a route; nothing is sent.
pub async fn lan_ipv4() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await.ok()?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80)).await.ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// URL for `host:port`, resolving wildcard or named hosts to the LAN address.
pub async fn network_url(host: &str, port: u16) -> String {
    let ip = match host.parse::<IpAddr>() {
        Ok(ip) if !ip.is_unspecified() => Some(ip),
        _ => lan_ipv4().await.map(IpAddr::V4),
    };

    match ip {
        Some(IpAddr::V6(ip)) => format!("http://[{}]:{}", ip, port),
        Some(ip) => format!("http://{}:{}", ip, port),
        None => format!("http://localhost:{}", port),
    }
}
