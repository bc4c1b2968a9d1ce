//! TCP connect probing

use super::{PortProbeResult, PortState, Protocol};
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Probe one TCP port with a full connect.
///
/// A completed handshake is Open (with the connect latency captured);
/// everything else — timeout, refused, reset — is Filtered. This scan
/// deliberately does not distinguish refused-closed from
/// no-response-filtered.
pub async fn probe(addr: IpAddr, port: u16, connect_timeout: Duration) -> PortProbeResult {
    let target = SocketAddr::new(addr, port);
    let start = Instant::now();

    match timeout(connect_timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => {
            let latency = start.elapsed();
            drop(stream);
            log::debug!("{} tcp open ({:?})", target, latency);
            PortProbeResult::new(addr, port, Protocol::Tcp, PortState::Open).with_latency(latency)
        }
        Ok(Err(e)) => {
            log::debug!("{} tcp filtered: {}", target, e);
            PortProbeResult::new(addr, port, Protocol::Tcp, PortState::Filtered)
        }
        Err(_) => {
            log::debug!("{} tcp filtered: connect timeout", target);
            PortProbeResult::new(addr, port, Protocol::Tcp, PortState::Filtered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_listening_port_is_open_with_latency() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let result = probe("127.0.0.1".parse().unwrap(), port, Duration::from_secs(1)).await;
        assert_eq!(result.state, PortState::Open);
        assert!(result.latency.is_some());
    }

    #[tokio::test]
    async fn test_refused_port_is_filtered() {
        // Bind-then-drop guarantees nothing listens on the port.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let result = probe("127.0.0.1".parse().unwrap(), port, Duration::from_secs(1)).await;
        assert_eq!(result.state, PortState::Filtered);
        assert!(result.latency.is_none());
    }
}
