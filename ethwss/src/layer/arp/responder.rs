use crate::layer::eth::Host;
use crate::layer::Result;
use crate::nic::{self, PacketSink};
use crate::wire::{arp_packet, ethernet_frame};
use crate::wire::{ArpOperation, ArpRepr, EthernetAddress, EthernetProtocol, EthernetRepr, Ipv4Address};

/// Answers ARP requests for one address.
///
/// Stateless apart from the identity it answers for. Replies are queued on the sink; flushing is
/// left to the poll loop.
#[derive(Debug, Clone, Copy)]
pub struct Responder {
    host: Host,
}

impl Responder {
    /// A responder for the given host.
    pub fn new(host: Host) -> Self {
        Responder { host }
    }

    /// The identity this responder answers for.
    pub fn host(&self) -> Host {
        self.host
    }

    /// Handle one received ARP packet.
    ///
    /// A request for our protocol address is answered. Returns the sender binding of any packet
    /// with a specified sender address, so the caller may learn the hardware address of a peer.
    ///
    /// See [RFC826] for details.
    ///
    /// [RFC826]: https://tools.ietf.org/html/rfc826
    pub fn handle_packet<S>(&self, packet: &ArpRepr, sink: &mut S) -> Result<Option<Host>>
        where S: PacketSink + ?Sized,
    {
        let ArpRepr::EthernetIpv4 {
            operation,
            source_hardware_addr,
            source_protocol_addr,
            target_hardware_addr: _,
            target_protocol_addr,
        } = *packet;

        let sender = Host { mac: source_hardware_addr, ip: source_protocol_addr };

        if operation == ArpOperation::Request && target_protocol_addr == self.host.ip {
            net_debug!("arp: answering who-has {} from {}", target_protocol_addr, sender);
            self.send(sink, source_hardware_addr, ArpRepr::EthernetIpv4 {
                operation: ArpOperation::Reply,
                source_hardware_addr: self.host.mac,
                source_protocol_addr: self.host.ip,
                target_hardware_addr: source_hardware_addr,
                target_protocol_addr: source_protocol_addr,
            })?;
        } else {
            net_trace!("arp: {:?} for {} not for us", operation, target_protocol_addr);
        }

        if source_protocol_addr.is_unspecified() {
            Ok(None)
        } else {
            Ok(Some(sender))
        }
    }

    /// Broadcast a request for the hardware address of `target`.
    pub fn send_request<S>(&self, target: Ipv4Address, sink: &mut S) -> Result<()>
        where S: PacketSink + ?Sized,
    {
        net_debug!("arp: who-has {} tell {}", target, self.host.ip);
        self.send(sink, EthernetAddress::BROADCAST, ArpRepr::EthernetIpv4 {
            operation: ArpOperation::Request,
            source_hardware_addr: self.host.mac,
            source_protocol_addr: self.host.ip,
            target_hardware_addr: EthernetAddress::UNSPECIFIED,
            target_protocol_addr: target,
        })
    }

    fn send<S>(&self, sink: &mut S, dst_addr: EthernetAddress, repr: ArpRepr) -> Result<()>
        where S: PacketSink + ?Sized,
    {
        let eth = EthernetRepr {
            src_addr: self.host.mac,
            dst_addr,
            ethertype: EthernetProtocol::Arp,
        };
        let len = ethernet_frame::buffer_len(repr.buffer_len());
        nic::send_with(sink, |buffer| {
            let buffer = buffer.get_mut(..len).ok_or(crate::layer::Error::Exhausted)?;
            let frame = ethernet_frame::new_unchecked_mut(buffer);
            eth.emit(frame);
            repr.emit(arp_packet::new_unchecked_mut(frame.payload_mut_slice()));
            Ok(Some(len))
        })?;
        Ok(())
    }
}
