//! Scripted peers for the layer tests.
//!
//! [`Peer`] plays the remote TCP endpoint on an in-memory device. [`TlsServer`] plays a TLS 1.2
//! server with a fixed X25519 key on top of the bytes exchanged through it.
use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::layer::eth::{classify, Frame, Host, Segment};
use crate::layer::tcp::{self, Connection, Session};
use crate::layer::tls::crypto::{self, KeyBlock, RecordProtection, Transcript, MASTER_SECRET_LEN};
use crate::nic::external::External;
use crate::wire::tls::{handshake, ContentType, HandshakeType, RecordHeader, Version};
use crate::wire::tls::{EXPLICIT_NONCE_LEN, RECORD_HEADER_LEN, TAG_LEN};
use crate::wire::{ethernet_frame, ipv4_packet, tcp_packet};
use crate::wire::{Checksum, EthernetAddress, EthernetProtocol, EthernetRepr, IpProtocol};
use crate::wire::{Ipv4Address, Ipv4Repr, TcpFlags, TcpRepr, TcpSeqNumber};

pub const MTU: usize = 1514;
pub const MAC_LOCAL: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 1]);
pub const MAC_GATEWAY: EthernetAddress = EthernetAddress([0x02, 0, 0, 0, 0, 0xfe]);
pub const SERVER_ISN: TcpSeqNumber = TcpSeqNumber(5000);

pub fn local() -> Session {
    Session {
        host: Host { mac: MAC_LOCAL, ip: Ipv4Address::new(10, 0, 0, 1) },
        port: 50000,
    }
}

pub fn remote() -> Session {
    Session {
        host: Host { mac: MAC_GATEWAY, ip: Ipv4Address::new(192, 168, 1, 10) },
        port: 443,
    }
}

/// Decode a frame that must be a TCP segment.
pub fn segment(bytes: &[u8]) -> Segment<'_> {
    match classify(bytes, Checksum::Manual).unwrap() {
        Frame::Tcp(segment) => segment,
        other => panic!("not a tcp frame: {:?}", other),
    }
}

/// The remote end of a TCP connection.
pub struct Peer {
    nic: External,
    seq: TcpSeqNumber,
    ack: TcpSeqNumber,
}

impl Peer {
    pub fn new(nic: &External) -> Self {
        Peer {
            nic: nic.handle(),
            seq: SERVER_ISN,
            ack: TcpSeqNumber(0),
        }
    }

    /// A TCP client on the shared device with a fixed initial sequence number.
    pub fn tcp_client(&self) -> tcp::Client<External> {
        let connection = Connection { local: local(), remote: remote() };
        tcp::Client::new(connection, self.nic.handle(), &mut ChaCha8Rng::seed_from_u64(3))
    }

    /// Answer the SYN that the client flushed.
    pub fn accept(&mut self) -> Vec<u8> {
        let sent = self.nic.take_sent();
        let syn = sent.iter()
            .map(|bytes| segment(bytes).repr)
            .find(|repr| repr.flags.syn())
            .expect("no syn was sent");
        self.ack = syn.seq_number + 1;
        let frame = self.frame(TcpFlags::SYN, b"");
        self.seq = self.seq + 1;
        frame
    }

    /// A data segment from the server, advancing our sequence number.
    pub fn segment(&mut self, payload: &[u8]) -> Vec<u8> {
        let frame = self.frame(TcpFlags::PSH, payload);
        self.seq = self.seq + payload.len();
        frame
    }

    /// The payload the client flushed since the last call, in order.
    pub fn received(&mut self) -> Vec<u8> {
        let mut data = Vec::new();
        for bytes in self.nic.take_sent() {
            let segment = segment(&bytes);
            if segment.payload.is_empty() {
                continue;
            }
            assert_eq!(segment.repr.seq_number, self.ack, "client skipped data");
            data.extend_from_slice(segment.payload);
            self.ack = self.ack + segment.payload.len();
        }
        data
    }

    /// The payload of every flushed segment, one entry per segment.
    pub fn received_segments(&mut self) -> Vec<Vec<u8>> {
        let mut segments = Vec::new();
        for bytes in self.nic.take_sent() {
            let segment = segment(&bytes);
            if segment.payload.is_empty() {
                continue;
            }
            self.ack = self.ack + segment.payload.len();
            segments.push(segment.payload.to_vec());
        }
        segments
    }

    fn frame(&self, flags: TcpFlags, payload: &[u8]) -> Vec<u8> {
        let (src, dst) = (remote(), local());
        let repr = TcpRepr {
            src_port: src.port,
            dst_port: dst.port,
            flags,
            seq_number: self.seq,
            ack_number: Some(self.ack),
            window_len: 65535,
            window_scale: None,
            max_seg_size: None,
            sack_permitted: false,
            payload_len: payload.len(),
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
        segment.payload_mut_slice().copy_from_slice(payload);
        segment.fill_checksum(ip.src_addr, ip.dst_addr);
        bytes
    }
}

/// A handshake message with its header.
pub fn message(kind: HandshakeType, body: &[u8]) -> Vec<u8> {
    let len = body.len() as u32;
    let mut bytes = vec![kind.into(), (len >> 16) as u8, (len >> 8) as u8, len as u8];
    bytes.extend_from_slice(body);
    bytes
}

/// A plaintext record.
pub fn record(content_type: ContentType, fragment: &[u8]) -> Vec<u8> {
    let mut bytes = vec![0; RECORD_HEADER_LEN + fragment.len()];
    RecordHeader {
        content_type,
        version: Version::TLS_1_2,
        length: fragment.len() as u16,
    }.emit(&mut bytes);
    bytes[RECORD_HEADER_LEN..].copy_from_slice(fragment);
    bytes
}

/// Split a byte stream into records.
pub fn records(mut bytes: &[u8]) -> Vec<(ContentType, Vec<u8>)> {
    let mut records = Vec::new();
    while !bytes.is_empty() {
        let header = RecordHeader::parse(bytes).unwrap();
        assert_eq!(header.version, Version::TLS_1_2);
        let (record, rest) = bytes.split_at(header.record_len());
        records.push((header.content_type, record[RECORD_HEADER_LEN..].to_vec()));
        bytes = rest;
    }
    records
}

/// A TLS 1.2 server without any certificate logic.
pub struct TlsServer {
    secret: StaticSecret,
    pub random: [u8; 32],
    pub extended_master_secret: bool,
    pub request_certificate: bool,
    client_random: [u8; 32],
    transcript: Transcript,
    master: [u8; MASTER_SECRET_LEN],
    read: Option<RecordProtection>,
    write: Option<RecordProtection>,
    pub client_sent_certificate: bool,
}

impl TlsServer {
    pub fn new() -> Self {
        TlsServer {
            secret: StaticSecret::from([0x4d; 32]),
            random: [0x5e; 32],
            extended_master_secret: true,
            request_certificate: false,
            client_random: [0; 32],
            transcript: Transcript::new(),
            master: [0; MASTER_SECRET_LEN],
            read: None,
            write: None,
            client_sent_certificate: false,
        }
    }

    pub fn public_key(&self) -> [u8; 32] {
        *PublicKey::from(&self.secret).as_bytes()
    }

    /// Consume the record carrying the ClientHello, returning the server name it offered.
    pub fn client_hello(&mut self, bytes: &[u8]) -> String {
        let records = records(bytes);
        assert_eq!(records.len(), 1);
        let (content_type, fragment) = &records[0];
        assert_eq!(*content_type, ContentType::Handshake);
        let hello = handshake::new_checked(fragment).unwrap();
        assert_eq!(hello.msg_type(), HandshakeType::ClientHello);
        assert_eq!(hello.as_bytes().len(), fragment.len());
        self.client_random.copy_from_slice(&hello.body()[2..34]);
        self.transcript.update(hello.as_bytes());

        // The first extension is the server name.
        let body = hello.body();
        let extensions = 2 + 32 + 1 + 4 + 2 + 2;
        let name_len = usize::from(u16::from_be_bytes([body[extensions + 7], body[extensions + 8]]));
        let name = &body[extensions + 9..extensions + 9 + name_len];
        String::from_utf8(name.to_vec()).unwrap()
    }

    pub fn server_hello(&self) -> Vec<u8> {
        let mut body = vec![0x03, 0x03];
        body.extend_from_slice(&self.random);
        body.push(0);
        body.extend_from_slice(&[0xc0, 0x2f, 0x00]);
        if self.extended_master_secret {
            body.extend_from_slice(&[0x00, 0x04, 0x00, 0x17, 0x00, 0x00]);
        }
        message(HandshakeType::ServerHello, &body)
    }

    pub fn certificate() -> Vec<u8> {
        message(HandshakeType::Certificate, &[0, 0, 7, 0, 0, 4, 0xde, 0xad, 0xbe, 0xef])
    }

    pub fn server_key_exchange(&self) -> Vec<u8> {
        let mut body = vec![0x03, 0x00, 0x1d, 0x20];
        body.extend_from_slice(&self.public_key());
        body.extend_from_slice(&[0x04, 0x01, 0x00, 0x02, 0xaa, 0xbb]);
        message(HandshakeType::ServerKeyExchange, &body)
    }

    pub fn certificate_request() -> Vec<u8> {
        message(HandshakeType::CertificateRequest, &[0x01, 0x01, 0x00, 0x02, 0x04, 0x01, 0x00, 0x00])
    }

    pub fn server_hello_done() -> Vec<u8> {
        message(HandshakeType::ServerHelloDone, &[])
    }

    /// Record the messages of the server flight in the transcript.
    pub fn hash(&mut self, messages: &[u8]) {
        self.transcript.update(messages);
    }

    /// The usual server flight as one record.
    pub fn server_flight(&mut self) -> Vec<u8> {
        let mut messages = self.server_hello();
        messages.extend(Self::certificate());
        messages.extend(self.server_key_exchange());
        if self.request_certificate {
            messages.extend(Self::certificate_request());
        }
        messages.extend(Self::server_hello_done());
        self.hash(&messages);
        record(ContentType::Handshake, &messages)
    }

    /// Check the client key exchange flight and answer with ChangeCipherSpec and Finished.
    pub fn client_flight(&mut self, bytes: &[u8]) -> Vec<u8> {
        self.absorb_client_flight(bytes);
        let verify_data = crypto::verify_data(&self.master, b"server finished", &self.transcript.current());
        let finished = message(HandshakeType::Finished, &verify_data);
        let mut reply = record(ContentType::ChangeCipherSpec, &[1]);
        reply.extend(self.seal(ContentType::Handshake, &finished));
        reply
    }

    /// Check the client flight without answering it.
    pub fn absorb_client_flight(&mut self, bytes: &[u8]) {
        let mut finished = false;
        for (content_type, mut fragment) in records(bytes) {
            match content_type {
                ContentType::Handshake if self.read.is_none() => {
                    let message = handshake::new_checked(&fragment).unwrap();
                    match message.msg_type() {
                        HandshakeType::Certificate => {
                            assert_eq!(message.body(), &[0, 0, 0]);
                            self.client_sent_certificate = true;
                            self.transcript.update(message.as_bytes());
                        },
                        HandshakeType::ClientKeyExchange => self.key_exchange(message),
                        other => panic!("unexpected {:?}", other),
                    }
                },
                ContentType::ChangeCipherSpec => {
                    assert_eq!(fragment, [1]);
                    let keys = KeyBlock::derive(&self.master, &self.client_random, &self.random);
                    self.read = Some(RecordProtection::new(&keys.client_key, keys.client_iv));
                    self.write = Some(RecordProtection::new(&keys.server_key, keys.server_iv));
                },
                ContentType::Handshake => {
                    let read = self.read.as_mut().unwrap();
                    let plain = read.open(content_type, &mut fragment).unwrap();
                    let expected = crypto::verify_data(&self.master, b"client finished", &self.transcript.current());
                    assert_eq!(plain, &message(HandshakeType::Finished, &expected)[..]);
                    self.transcript.update(plain);
                    finished = true;
                },
                other => panic!("unexpected {:?} record", other),
            }
        }
        assert!(finished, "client finished missing");
    }

    fn key_exchange(&mut self, message: &handshake) {
        let body = message.body();
        assert_eq!(body[0], 32);
        let mut public = [0; 32];
        public.copy_from_slice(&body[1..]);
        let premaster = self.secret.diffie_hellman(&PublicKey::from(public));
        self.transcript.update(message.as_bytes());
        self.master = crypto::master_secret(
            premaster.as_bytes(),
            self.extended_master_secret,
            &self.transcript.current(),
            &self.client_random,
            &self.random);
    }

    /// A protected record from the server.
    pub fn seal(&mut self, content_type: ContentType, plain: &[u8]) -> Vec<u8> {
        let fragment_len = EXPLICIT_NONCE_LEN + plain.len() + TAG_LEN;
        let mut bytes = vec![0; RECORD_HEADER_LEN + fragment_len];
        RecordHeader {
            content_type,
            version: Version::TLS_1_2,
            length: fragment_len as u16,
        }.emit(&mut bytes);
        bytes[RECORD_HEADER_LEN + EXPLICIT_NONCE_LEN..][..plain.len()].copy_from_slice(plain);
        self.write.as_mut().unwrap().seal(content_type, &mut bytes[RECORD_HEADER_LEN..]).unwrap();
        bytes
    }

    /// Decrypt all protected records from the client.
    pub fn open(&mut self, bytes: &[u8]) -> Vec<(ContentType, Vec<u8>)> {
        let read = self.read.as_mut().unwrap();
        records(bytes)
            .into_iter()
            .map(|(content_type, mut fragment)| {
                let plain = read.open(content_type, &mut fragment).unwrap().to_vec();
                (content_type, plain)
            })
            .collect()
    }
}
