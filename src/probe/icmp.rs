//! Native ICMP echo implementation
//!
//! Builds echo requests with pnet over a raw socket2 socket instead of
//! shelling out to the system `ping`. Replies are matched on source
//! address and identifier because a raw ICMP socket receives a copy of
//! every ICMP datagram delivered to the host.

use super::{EchoReply, PlatformProber};
use crate::ScanError;
use pnet::packet::icmp::echo_reply::EchoReplyPacket;
use pnet::packet::icmp::echo_request::{IcmpCodes, MutableEchoRequestPacket};
use pnet::packet::icmp::{checksum, IcmpPacket, IcmpTypes};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::Packet;
use pnet::util::MacAddr;
use rand::Rng;
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::mem::MaybeUninit;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};
use tokio::time::timeout;

const ECHO_PACKET_LEN: usize = 64;

/// ICMP echo prober backed by a raw IPv4 socket.
///
/// Stateless: each probe opens its own socket, so one prober can be
/// shared across every worker of a sweep.
#[derive(Debug, Default, Clone, Copy)]
pub struct IcmpProber;

impl IcmpProber {
    pub fn new() -> Self {
        Self
    }

    fn open_socket() -> Result<Socket, ScanError> {
        let socket = Socket::new(
            Domain::IPV4,
            Type::from(libc::SOCK_RAW),
            Some(Protocol::ICMPV4),
        )
        .map_err(|e| {
            if e.kind() == io::ErrorKind::PermissionDenied {
                ScanError::Permission("raw ICMP socket requires elevated privileges".to_string())
            } else {
                ScanError::Connectivity(e.to_string())
            }
        })?;
        socket
            .set_nonblocking(true)
            .map_err(|e| ScanError::Connectivity(e.to_string()))?;
        Ok(socket)
    }

    fn send_echo(socket: &Socket, target: Ipv4Addr, ident: u16, seq: u16) -> Result<(), ScanError> {
        let mut buf = [0u8; ECHO_PACKET_LEN];
        let mut request = MutableEchoRequestPacket::new(&mut buf)
            .ok_or_else(|| ScanError::Connectivity("echo request buffer too small".to_string()))?;

        request.set_icmp_type(IcmpTypes::EchoRequest);
        request.set_icmp_code(IcmpCodes::NoCode);
        request.set_identifier(ident);
        request.set_sequence_number(seq);
        request.set_checksum(0);

        let csum = {
            let view = IcmpPacket::new(request.packet())
                .ok_or_else(|| ScanError::Connectivity("echo request truncated".to_string()))?;
            checksum(&view)
        };
        request.set_checksum(csum);

        let dest = socket2::SockAddr::from(SocketAddr::new(IpAddr::V4(target), 0));
        socket
            .send_to(request.packet(), &dest)
            .map_err(|e| ScanError::Connectivity(e.to_string()))?;
        Ok(())
    }

    /// Poll the socket until the matching echo reply arrives. The caller
    /// bounds this with a timeout.
    async fn wait_for_reply(
        socket: &Socket,
        target: Ipv4Addr,
        ident: u16,
    ) -> Result<Option<u8>, ScanError> {
        let mut buf = vec![MaybeUninit::new(0u8); 1500];

        loop {
            match socket.recv_from(&mut buf) {
                Ok((len, _)) => {
                    let packet: Vec<u8> = buf[..len]
                        .iter()
                        .map(|b| unsafe { b.assume_init() })
                        .collect();
                    if let Some(ttl) = Self::match_reply(&packet, target, ident) {
                        return Ok(ttl);
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
                Err(e) => return Err(ScanError::Connectivity(e.to_string())),
            }
        }
    }

    /// Returns `Some(reply TTL)` when the datagram is our echo reply.
    /// The raw socket delivers the full IPv4 header, which carries the
    /// TTL needed for OS fingerprinting.
    fn match_reply(packet: &[u8], target: Ipv4Addr, ident: u16) -> Option<Option<u8>> {
        let ip = Ipv4Packet::new(packet)?;
        if ip.get_next_level_protocol() != IpNextHeaderProtocols::Icmp {
            return None;
        }
        if ip.get_source() != target {
            return None;
        }

        let icmp_offset = ip.get_header_length() as usize * 4;
        let reply = EchoReplyPacket::new(&packet[icmp_offset..])?;
        if reply.get_icmp_type() != IcmpTypes::EchoReply {
            return None;
        }
        if reply.get_identifier() != ident {
            return None;
        }

        Some(Some(ip.get_ttl()))
    }
}

#[async_trait::async_trait]
impl PlatformProber for IcmpProber {
    async fn ping(&self, addr: IpAddr, timeout_duration: Duration) -> Result<EchoReply, ScanError> {
        let target = match addr {
            IpAddr::V4(v4) => v4,
            IpAddr::V6(_) => {
                return Err(ScanError::Connectivity(
                    "ICMPv6 echo is not supported".to_string(),
                ))
            }
        };

        let socket = Self::open_socket()?;
        let ident: u16 = rand::thread_rng().gen();
        let seq: u16 = rand::thread_rng().gen();

        let start = Instant::now();
        Self::send_echo(&socket, target, ident, seq)?;

        match timeout(timeout_duration, Self::wait_for_reply(&socket, target, ident)).await {
            Ok(Ok(ttl)) => Ok(EchoReply {
                rtt: start.elapsed(),
                ttl,
            }),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(ScanError::Timeout),
        }
    }

    fn neighbor_mac(&self, addr: IpAddr) -> Option<MacAddr> {
        super::neighbor::lookup(addr)
    }
}
