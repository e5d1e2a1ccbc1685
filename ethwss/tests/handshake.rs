//! Opening a connection through the public API on an in-memory device.
use ethwss::layer::eth::{classify, Frame, Host, Segment};
use ethwss::layer::tcp::{self, Connection, Session};
use ethwss::layer::{arp, tls, ws, Error};
use ethwss::nic::external::External;
use ethwss::nic::PacketSink;
use ethwss::wire::websocket::OpCode;
use ethwss::wire::tls::{handshake, ContentType, HandshakeType, RecordHeader, RECORD_HEADER_LEN};
use ethwss::wire::{arp_packet, ethernet_frame, ipv4_packet, tcp_packet};
use ethwss::wire::{ArpOperation, ArpRepr, Checksum, EthernetAddress, EthernetProtocol};
use ethwss::wire::{EthernetRepr, IpProtocol, Ipv4Address, Ipv4Repr, TcpFlags, TcpRepr, TcpSeqNumber};
use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;

const HOST: &str = "stream.example.org";

fn local() -> Session {
    Session {
        host: Host { mac: EthernetAddress([2, 0, 0, 0, 0, 1]), ip: Ipv4Address::new(10, 0, 0, 1) },
        port: 50000,
    }
}

fn remote() -> Session {
    Session {
        host: Host { mac: EthernetAddress([2, 0, 0, 0, 0, 0xfe]), ip: Ipv4Address::new(192, 168, 1, 10) },
        port: 443,
    }
}

fn client(nic: &External) -> ws::Client<External> {
    let mut system = tls::System::from_rng(ChaCha8Rng::seed_from_u64(9));
    let connection = Connection { local: local(), remote: remote() };
    let tcp = tcp::Client::new(connection, nic.handle(), &mut system);
    ws::Client::new(ws::Config::new(HOST, "/"), tcp, system).unwrap()
}

fn sent_segments(nic: &External) -> Vec<(TcpRepr, Vec<u8>)> {
    nic.take_sent()
        .iter()
        .map(|bytes| match classify(bytes, Checksum::Manual).unwrap() {
            Frame::Tcp(segment) => {
                assert_eq!(segment.eth.dst_addr, remote().host.mac);
                assert_eq!(segment.ip.dst_addr, remote().host.ip);
                (segment.repr, segment.payload.to_vec())
            },
            other => panic!("unexpected {:?}", other),
        })
        .collect()
}

/// A segment from the server without payload.
fn server_frame(flags: TcpFlags, seq: TcpSeqNumber, ack: TcpSeqNumber) -> Vec<u8> {
    let (src, dst) = (remote(), local());
    let repr = TcpRepr {
        src_port: src.port,
        dst_port: dst.port,
        flags,
        seq_number: seq,
        ack_number: Some(ack),
        window_len: 65535,
        window_scale: None,
        max_seg_size: Some(1460),
        sack_permitted: false,
        payload_len: 0,
    };
    let ip = Ipv4Repr {
        src_addr: src.host.ip,
        dst_addr: dst.host.ip,
        protocol: IpProtocol::Tcp,
        payload_len: repr.buffer_len(),
        hop_limit: 64,
        ident: 0,
    };
    let mut bytes = vec![0; ethernet_frame::buffer_len(ip.buffer_len() + ip.payload_len)];
    let eth = ethernet_frame::new_unchecked_mut(&mut bytes);
    EthernetRepr { src_addr: src.host.mac, dst_addr: dst.host.mac, ethertype: EthernetProtocol::Ipv4 }
        .emit(eth);
    let packet = ipv4_packet::new_unchecked_mut(eth.payload_mut_slice());
    ip.emit(packet, Checksum::Manual);
    let segment = tcp_packet::new_unchecked_mut(packet.payload_mut_slice());
    repr.emit(segment);
    segment.fill_checksum(ip.src_addr, ip.dst_addr);
    bytes
}

fn deliver(client: &mut ws::Client<External>, bytes: &[u8]) -> Result<(), Error> {
    let segment: Segment = match classify(bytes, Checksum::Manual).unwrap() {
        Frame::Tcp(segment) => segment,
        other => panic!("unexpected {:?}", other),
    };
    client.process_packet(&segment)
}

#[test]
fn connection_starts_with_client_hello() {
    let nic = External::new(1514);
    let mut client = client(&nic);

    let sent = sent_segments(&nic);
    assert_eq!(sent.len(), 1);
    let syn = sent[0].0;
    assert!(syn.flags.syn());
    assert!(syn.max_seg_size.is_some());
    assert_eq!(client.tls().tcp().state(), tcp::State::Connecting);

    let server_isn = TcpSeqNumber(7000);
    let syn_ack = server_frame(TcpFlags::SYN, server_isn, syn.seq_number + 1);
    deliver(&mut client, &syn_ack).unwrap();
    assert_eq!(client.tls().tcp().state(), tcp::State::Connected);
    assert_eq!(client.next_message(), Ok(None));

    let data: Vec<u8> = sent_segments(&nic)
        .into_iter()
        .inspect(|(repr, _)| assert_eq!(repr.ack_number, Some(server_isn + 1)))
        .flat_map(|(_, payload)| payload)
        .collect();
    let header = RecordHeader::parse(&data).unwrap();
    assert_eq!(header.content_type, ContentType::Handshake);
    assert_eq!(header.record_len(), data.len());

    let hello = handshake::new_checked(&data[RECORD_HEADER_LEN..]).unwrap();
    assert_eq!(hello.msg_type(), HandshakeType::ClientHello);
    assert!(hello.body().windows(HOST.len()).any(|name| name == HOST.as_bytes()));
    assert_eq!(client.tls().state(), tls::HandshakeState::ServerHello);
    assert_eq!(client.state(), ws::State::Init);
}

#[test]
fn reset_during_connect() {
    let nic = External::new(1514);
    let mut client = client(&nic);
    let syn = sent_segments(&nic)[0].0;

    let reset = server_frame(TcpFlags::RST, TcpSeqNumber(0), syn.seq_number + 1);
    assert_eq!(deliver(&mut client, &reset), Err(Error::Reset));
    assert_eq!(client.tls().tcp().state(), tcp::State::Offline);
    assert_eq!(client.send(OpCode::Text, b"late"), Err(Error::NotConnected));
}

#[test]
fn neighbor_is_answered_on_the_shared_device() {
    let nic = External::new(1514);
    let mut client = client(&nic);
    nic.take_sent();

    let responder = arp::Responder::new(local().host);
    let asker = Host { mac: EthernetAddress([2, 0, 0, 0, 0, 0x33]), ip: Ipv4Address::new(10, 0, 0, 33) };
    let request = ArpRepr::EthernetIpv4 {
        operation: ArpOperation::Request,
        source_hardware_addr: asker.mac,
        source_protocol_addr: asker.ip,
        target_hardware_addr: EthernetAddress::UNSPECIFIED,
        target_protocol_addr: local().host.ip,
    };
    let sink = client.tls_mut().tcp_mut().sink_mut();
    assert_eq!(responder.handle_packet(&request, &mut *sink), Ok(Some(asker)));
    sink.flush().unwrap();

    let sent = nic.take_sent();
    assert_eq!(sent.len(), 1);
    let frame = ethernet_frame::new_checked(&sent[0][..]).unwrap();
    let eth = EthernetRepr::parse(frame).unwrap();
    assert_eq!(eth.dst_addr, asker.mac);
    assert_eq!(eth.ethertype, EthernetProtocol::Arp);
    let reply = ArpRepr::parse(arp_packet::new_checked(frame.payload_slice()).unwrap()).unwrap();
    let ArpRepr::EthernetIpv4 { operation, target_hardware_addr, .. } = reply;
    assert_eq!(operation, ArpOperation::Reply);
    assert_eq!(target_hardware_addr, asker.mac);
}
