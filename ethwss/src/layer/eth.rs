//! Classification of received Ethernet frames.
//!
//! The poll loop only needs to tell ARP apart from TCP over IPv4. Everything else is reported so
//! that it can be logged and dropped.
use core::fmt;

use crate::wire::{self, Checksum, EthernetAddress, EthernetProtocol, EthernetRepr, IpProtocol};
use crate::wire::{arp_packet, ethernet_frame, ipv4_packet, tcp_packet};
use crate::wire::{ArpRepr, Ipv4Address, Ipv4Repr, TcpRepr};

/// One side of a link: a hardware and a protocol address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Host {
    /// The Ethernet address.
    pub mac: EthernetAddress,
    /// The IPv4 address.
    pub ip: Ipv4Address,
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.mac)
    }
}

/// A classified frame.
#[derive(Debug, PartialEq, Eq)]
pub enum Frame<'a> {
    /// An ARP packet.
    Arp {
        /// The Ethernet header.
        eth: EthernetRepr,
        /// The ARP content.
        arp: ArpRepr,
    },
    /// A TCP segment over IPv4.
    Tcp(Segment<'a>),
    /// An IPv4 packet of another protocol.
    Ipv4 {
        /// The Ethernet header.
        eth: EthernetRepr,
        /// The IPv4 header.
        ip: Ipv4Repr,
    },
    /// Any other ethertype.
    Other(EthernetRepr),
}

/// A decoded TCP segment with its enclosing headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment<'a> {
    /// The Ethernet header.
    pub eth: EthernetRepr,
    /// The IPv4 header.
    pub ip: Ipv4Repr,
    /// The TCP header.
    pub repr: TcpRepr,
    /// The segment payload.
    pub payload: &'a [u8],
}

/// Decode the headers of a received frame.
///
/// With `Checksum::Manual` the IPv4 and TCP checksums are verified, `Checksum::Ignored` trusts a
/// device that already did so.
pub fn classify(bytes: &[u8], checksum: Checksum) -> wire::Result<Frame<'_>> {
    let frame = ethernet_frame::new_checked(bytes)?;
    let eth = EthernetRepr::parse(frame)?;
    match eth.ethertype {
        EthernetProtocol::Arp => {
            let packet = arp_packet::new_checked(frame.payload_slice())?;
            let arp = ArpRepr::parse(packet)?;
            Ok(Frame::Arp { eth, arp })
        },
        EthernetProtocol::Ipv4 => {
            let packet = ipv4_packet::new_checked(frame.payload_slice())?;
            let ip = Ipv4Repr::parse(packet, checksum)?;
            if ip.protocol != IpProtocol::Tcp {
                return Ok(Frame::Ipv4 { eth, ip });
            }
            let segment = tcp_packet::new_checked(packet.payload_slice())?;
            let repr = TcpRepr::parse(segment, ip.src_addr, ip.dst_addr, checksum)?;
            Ok(Frame::Tcp(Segment {
                eth,
                ip,
                repr,
                payload: segment.payload_slice(),
            }))
        },
        _ => Ok(Frame::Other(eth)),
    }
}

impl fmt::Display for Segment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {} {}", self.ip.src_addr, self.ip.dst_addr, self.repr)
    }
}
