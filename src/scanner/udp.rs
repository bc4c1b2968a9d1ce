//! UDP datagram probing
//!
//! The socket is connected before sending so a kernel-surfaced ICMP
//! port-unreachable comes back as a refused/reset receive error, which
//! is the only positive "closed" signal UDP offers.

use super::{PortProbeResult, PortState, Protocol};
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::timeout;

/// Empty probe payload: enough to elicit a reply or an unreachable.
const PROBE_PAYLOAD: &[u8] = &[];

/// Probe one UDP port.
///
/// - a reply datagram ⇒ Open
/// - refused/reset on receive (ICMP port-unreachable) ⇒ Closed
/// - silence until the timeout ⇒ OpenFiltered
/// - anything else ⇒ Errored, logged, scan continues
///
/// `retries` re-probes the ambiguous OpenFiltered outcome; the default
/// of zero keeps the single-attempt baseline.
pub async fn probe(addr: IpAddr, port: u16, reply_timeout: Duration, retries: u32) -> PortProbeResult {
    let mut attempts = 0;
    loop {
        let result = probe_once(addr, port, reply_timeout).await;
        if result.state != PortState::OpenFiltered || attempts >= retries {
            return result;
        }
        attempts += 1;
        log::debug!(
            "{}:{} udp open|filtered, retry {}/{}",
            addr,
            port,
            attempts,
            retries
        );
    }
}

async fn probe_once(addr: IpAddr, port: u16, reply_timeout: Duration) -> PortProbeResult {
    let local: SocketAddr = match addr {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let target = SocketAddr::new(addr, port);

    let socket = match UdpSocket::bind(local).await {
        Ok(socket) => socket,
        Err(e) => return errored(addr, port, "bind", e),
    };
    if let Err(e) = socket.connect(target).await {
        return errored(addr, port, "connect", e);
    }
    let start = Instant::now();
    if let Err(e) = socket.send(PROBE_PAYLOAD).await {
        // An earlier unreachable for this peer can surface on send.
        if is_unreachable(&e) {
            return PortProbeResult::new(addr, port, Protocol::Udp, PortState::Closed);
        }
        return errored(addr, port, "send", e);
    }

    let mut buf = [0u8; 1024];
    match timeout(reply_timeout, socket.recv(&mut buf)).await {
        Ok(Ok(_)) => {
            PortProbeResult::new(addr, port, Protocol::Udp, PortState::Open)
                .with_latency(start.elapsed())
        }
        Ok(Err(e)) if is_unreachable(&e) => {
            PortProbeResult::new(addr, port, Protocol::Udp, PortState::Closed)
        }
        Ok(Err(e)) => errored(addr, port, "recv", e),
        Err(_) => PortProbeResult::new(addr, port, Protocol::Udp, PortState::OpenFiltered),
    }
}

fn is_unreachable(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
    )
}

fn errored(addr: IpAddr, port: u16, stage: &str, e: std::io::Error) -> PortProbeResult {
    log::debug!("{}:{} udp {} error: {}", addr, port, stage, e);
    PortProbeResult::new(addr, port, Protocol::Udp, PortState::Errored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replying_port_is_open() {
        let responder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = responder.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut buf = [0u8; 64];
            if let Ok((_, peer)) = responder.recv_from(&mut buf).await {
                let _ = responder.send_to(b"pong", peer).await;
            }
        });

        let result = probe(
            "127.0.0.1".parse().unwrap(),
            port,
            Duration::from_secs(1),
            0,
        )
        .await;
        assert_eq!(result.state, PortState::Open);
    }

    #[tokio::test]
    async fn test_closed_port_reports_closed() {
        // No listener: loopback generates an ICMP port-unreachable which
        // the connected socket surfaces as a refused receive.
        let placeholder = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = placeholder.local_addr().unwrap().port();
        drop(placeholder);

        let result = probe(
            "127.0.0.1".parse().unwrap(),
            port,
            Duration::from_secs(1),
            0,
        )
        .await;
        assert_eq!(result.state, PortState::Closed);
    }

    #[tokio::test]
    async fn test_silent_port_is_open_filtered() {
        // Bound but never replying: the probe times out with no signal
        // either way.
        let silent = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = silent.local_addr().unwrap().port();

        let result = probe(
            "127.0.0.1".parse().unwrap(),
            port,
            Duration::from_millis(300),
            0,
        )
        .await;
        assert_eq!(result.state, PortState::OpenFiltered);
        drop(silent);
    }
}
