//! The ARP packet for Ethernet and IPv4 of RFC 826.
use byteorder::{ByteOrder, NetworkEndian};
use core::fmt;

use super::{Error, Result};
use super::{EthernetAddress, EthernetProtocol, Ipv4Address};

enum_with_unknown! {
    /// ARP hardware type.
    pub enum Hardware(u16) {
        Ethernet = 1
    }
}

enum_with_unknown! {
    /// ARP operation type.
    pub enum Operation(u16) {
        Request = 1,
        Reply = 2
    }
}

byte_wrapper!{
    /// A byte sequence representing an ARP packet.
    #[derive(Debug, PartialEq, Eq)]
    pub struct arp([u8]);
}

// Only the Ethernet/IPv4 layout exists on our links, so all fields sit at fixed offsets.
mod field {
    use crate::wire::field::*;

    pub(crate) const HTYPE: Field = 0..2;
    pub(crate) const PTYPE: Field = 2..4;
    pub(crate) const HLEN: usize = 4;
    pub(crate) const PLEN: usize = 5;
    pub(crate) const OPER: Field = 6..8;
    pub(crate) const SHA: Field = 8..14;
    pub(crate) const SPA: Field = 14..18;
    pub(crate) const THA: Field = 18..24;
    pub(crate) const TPA: Field = 24..28;
}

impl arp {
    /// The length of an Ethernet/IPv4 ARP packet.
    pub const LEN: usize = field::TPA.end;

    /// Imbue a raw octet buffer with ARP packet structure.
    pub fn new_unchecked(buffer: &[u8]) -> &arp {
        Self::__from_macro_new_unchecked(buffer)
    }

    /// Imbue a mutable octet buffer with ARP packet structure.
    pub fn new_unchecked_mut(buffer: &mut [u8]) -> &mut arp {
        Self::__from_macro_new_unchecked_mut(buffer)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&arp> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Unwrap the packet as a raw byte slice.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Ensure that no accessor method will panic if called.
    /// Returns `Err(Error::Truncated)` if the buffer is too short.
    pub fn check_len(&self) -> Result<()> {
        if self.0.len() < Self::LEN {
            Err(Error::Truncated)
        } else {
            Ok(())
        }
    }

    /// Return the hardware type field.
    #[inline]
    pub fn hardware_type(&self) -> Hardware {
        let raw = NetworkEndian::read_u16(&self.0[field::HTYPE]);
        Hardware::from(raw)
    }

    /// Return the protocol type field.
    #[inline]
    pub fn protocol_type(&self) -> EthernetProtocol {
        let raw = NetworkEndian::read_u16(&self.0[field::PTYPE]);
        EthernetProtocol::from(raw)
    }

    /// Return the hardware length field.
    #[inline]
    pub fn hardware_len(&self) -> u8 {
        self.0[field::HLEN]
    }

    /// Return the protocol length field.
    #[inline]
    pub fn protocol_len(&self) -> u8 {
        self.0[field::PLEN]
    }

    /// Return the operation field.
    #[inline]
    pub fn operation(&self) -> Operation {
        let raw = NetworkEndian::read_u16(&self.0[field::OPER]);
        Operation::from(raw)
    }

    /// Return the source hardware address field.
    pub fn source_hardware_addr(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.0[field::SHA])
    }

    /// Return the source protocol address field.
    pub fn source_protocol_addr(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.0[field::SPA])
    }

    /// Return the target hardware address field.
    pub fn target_hardware_addr(&self) -> EthernetAddress {
        EthernetAddress::from_bytes(&self.0[field::THA])
    }

    /// Return the target protocol address field.
    pub fn target_protocol_addr(&self) -> Ipv4Address {
        Ipv4Address::from_bytes(&self.0[field::TPA])
    }

    /// Set the hardware type field.
    #[inline]
    pub fn set_hardware_type(&mut self, value: Hardware) {
        NetworkEndian::write_u16(&mut self.0[field::HTYPE], value.into())
    }

    /// Set the protocol type field.
    #[inline]
    pub fn set_protocol_type(&mut self, value: EthernetProtocol) {
        NetworkEndian::write_u16(&mut self.0[field::PTYPE], value.into())
    }

    /// Set the hardware length field.
    #[inline]
    pub fn set_hardware_len(&mut self, value: u8) {
        self.0[field::HLEN] = value
    }

    /// Set the protocol length field.
    #[inline]
    pub fn set_protocol_len(&mut self, value: u8) {
        self.0[field::PLEN] = value
    }

    /// Set the operation field.
    #[inline]
    pub fn set_operation(&mut self, value: Operation) {
        NetworkEndian::write_u16(&mut self.0[field::OPER], value.into())
    }

    /// Set the source hardware address field.
    pub fn set_source_hardware_addr(&mut self, value: EthernetAddress) {
        self.0[field::SHA].copy_from_slice(value.as_bytes())
    }

    /// Set the source protocol address field.
    pub fn set_source_protocol_addr(&mut self, value: Ipv4Address) {
        self.0[field::SPA].copy_from_slice(value.as_bytes())
    }

    /// Set the target hardware address field.
    pub fn set_target_hardware_addr(&mut self, value: EthernetAddress) {
        self.0[field::THA].copy_from_slice(value.as_bytes())
    }

    /// Set the target protocol address field.
    pub fn set_target_protocol_addr(&mut self, value: Ipv4Address) {
        self.0[field::TPA].copy_from_slice(value.as_bytes())
    }
}

impl AsRef<[u8]> for arp {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A high-level representation of an Address Resolution Protocol packet.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Repr {
    /// An Ethernet and IPv4 Address Resolution Protocol packet.
    EthernetIpv4 {
        /// Request or reply.
        operation: Operation,
        /// The hardware address of the sender.
        source_hardware_addr: EthernetAddress,
        /// The protocol address of the sender.
        source_protocol_addr: Ipv4Address,
        /// The hardware address of the target, zero in a request.
        target_hardware_addr: EthernetAddress,
        /// The protocol address being resolved or answered.
        target_protocol_addr: Ipv4Address,
    },
}

impl Repr {
    /// Parse an Address Resolution Protocol packet and return a high-level representation,
    /// or return `Err(Error::Unrecognized)` if the packet is not recognized.
    pub fn parse(packet: &arp) -> Result<Repr> {
        packet.check_len()?;
        match (
            packet.hardware_type(),
            packet.protocol_type(),
            packet.hardware_len(),
            packet.protocol_len(),
            packet.operation(),
        ) {
            (Hardware::Ethernet, EthernetProtocol::Ipv4, 6, 4, operation @ Operation::Request)
            | (Hardware::Ethernet, EthernetProtocol::Ipv4, 6, 4, operation @ Operation::Reply) => {
                Ok(Repr::EthernetIpv4 {
                    operation,
                    source_hardware_addr: packet.source_hardware_addr(),
                    source_protocol_addr: packet.source_protocol_addr(),
                    target_hardware_addr: packet.target_hardware_addr(),
                    target_protocol_addr: packet.target_protocol_addr(),
                })
            },
            _ => Err(Error::Unrecognized),
        }
    }

    /// Return the length of a packet that will be emitted from this high-level representation.
    pub fn buffer_len(&self) -> usize {
        match self {
            Repr::EthernetIpv4 { .. } => arp::LEN,
        }
    }

    /// Emit a high-level representation into an Address Resolution Protocol packet.
    pub fn emit(&self, packet: &mut arp) {
        match *self {
            Repr::EthernetIpv4 {
                operation,
                source_hardware_addr,
                source_protocol_addr,
                target_hardware_addr,
                target_protocol_addr,
            } => {
                packet.set_hardware_type(Hardware::Ethernet);
                packet.set_protocol_type(EthernetProtocol::Ipv4);
                packet.set_hardware_len(6);
                packet.set_protocol_len(4);
                packet.set_operation(operation);
                packet.set_source_hardware_addr(source_hardware_addr);
                packet.set_source_protocol_addr(source_protocol_addr);
                packet.set_target_hardware_addr(target_hardware_addr);
                packet.set_target_protocol_addr(target_protocol_addr);
            },
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Repr::EthernetIpv4 {
                operation,
                source_hardware_addr,
                source_protocol_addr,
                target_hardware_addr,
                target_protocol_addr,
            } => write!(
                f,
                "ARP type=Ethernet+IPv4 src={}/{} tgt={}/{} op={:?}",
                source_hardware_addr,
                source_protocol_addr,
                target_hardware_addr,
                target_protocol_addr,
                operation
            ),
        }
    }
}
