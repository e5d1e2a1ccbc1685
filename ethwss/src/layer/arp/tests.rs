use crate::layer::eth::{classify, Frame, Host};
use crate::layer::arp::Responder;
use crate::nic::PacketSink;
use crate::nic::external::External;
use crate::wire::{ArpOperation, ArpRepr, Checksum, EthernetAddress, EthernetProtocol, Ipv4Address};

const MAC_ADDR_HOST: EthernetAddress = EthernetAddress([0, 1, 2, 3, 4, 5]);
const MAC_ADDR_OTHER: EthernetAddress = EthernetAddress([6, 5, 4, 3, 2, 1]);

fn host() -> Host {
    Host { mac: MAC_ADDR_HOST, ip: Ipv4Address::new(10, 0, 0, 1) }
}

fn other() -> Host {
    Host { mac: MAC_ADDR_OTHER, ip: Ipv4Address::new(10, 0, 0, 2) }
}

fn request(target: Ipv4Address) -> ArpRepr {
    ArpRepr::EthernetIpv4 {
        operation: ArpOperation::Request,
        source_hardware_addr: other().mac,
        source_protocol_addr: other().ip,
        target_hardware_addr: EthernetAddress::UNSPECIFIED,
        target_protocol_addr: target,
    }
}

fn single_sent(nic: &External) -> (crate::wire::EthernetRepr, ArpRepr) {
    let mut sent = nic.take_sent();
    assert_eq!(sent.len(), 1);
    match classify(&sent.remove(0), Checksum::Manual).unwrap() {
        Frame::Arp { eth, arp } => (eth, arp),
        other => panic!("not an arp frame: {:?}", other),
    }
}

#[test]
fn simple_arp() {
    let mut nic = External::new(1514);
    let responder = Responder::new(host());

    let binding = responder.handle_packet(&request(host().ip), &mut nic).unwrap();
    assert_eq!(binding, Some(other()));
    nic.flush().unwrap();

    let (eth, arp) = single_sent(&nic);
    assert_eq!(eth.dst_addr, MAC_ADDR_OTHER);
    assert_eq!(eth.src_addr, MAC_ADDR_HOST);
    assert_eq!(eth.ethertype, EthernetProtocol::Arp);
    assert_eq!(arp, ArpRepr::EthernetIpv4 {
        operation: ArpOperation::Reply,
        source_hardware_addr: MAC_ADDR_HOST,
        source_protocol_addr: host().ip,
        target_hardware_addr: MAC_ADDR_OTHER,
        target_protocol_addr: other().ip,
    });
}

#[test]
fn ignores_foreign_requests() {
    let mut nic = External::new(1514);
    let responder = Responder::new(host());

    let binding = responder.handle_packet(&request(Ipv4Address::new(10, 0, 0, 9)), &mut nic);
    // The sender is still learned.
    assert_eq!(binding, Ok(Some(other())));
    nic.flush().unwrap();
    assert!(nic.take_sent().is_empty());
}

#[test]
fn learns_from_reply() {
    let mut nic = External::new(1514);
    let responder = Responder::new(host());
    let reply = ArpRepr::EthernetIpv4 {
        operation: ArpOperation::Reply,
        source_hardware_addr: other().mac,
        source_protocol_addr: other().ip,
        target_hardware_addr: MAC_ADDR_HOST,
        target_protocol_addr: host().ip,
    };
    assert_eq!(responder.handle_packet(&reply, &mut nic), Ok(Some(other())));
    nic.flush().unwrap();
    assert!(nic.take_sent().is_empty());
}

#[test]
fn broadcast_request() {
    let mut nic = External::new(1514);
    let responder = Responder::new(host());
    responder.send_request(other().ip, &mut nic).unwrap();
    nic.flush().unwrap();

    let (eth, arp) = single_sent(&nic);
    assert_eq!(eth.dst_addr, EthernetAddress::BROADCAST);
    assert_eq!(arp, ArpRepr::EthernetIpv4 {
        operation: ArpOperation::Request,
        source_hardware_addr: MAC_ADDR_HOST,
        source_protocol_addr: host().ip,
        target_hardware_addr: EthernetAddress::UNSPECIFIED,
        target_protocol_addr: other().ip,
    });
}

#[test]
fn too_small_device() {
    let mut nic = External::new(20);
    let responder = Responder::new(host());
    assert_eq!(
        responder.send_request(other().ip, &mut nic),
        Err(crate::layer::Error::Exhausted));
}
