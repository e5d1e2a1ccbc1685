use rand_chacha::ChaCha8Rng;
use rand_core::SeedableRng;

use crate::layer::testing::{segment, Peer, TlsServer, MTU};
use crate::layer::tls::System;
use crate::layer::Error;
use crate::nic::external::External;
use crate::wire::tls::ContentType;
use crate::wire::websocket::{apply_mask, OpCode};

use super::client::expected_accept;
use super::{Client, Config, State};

const HOST: &str = "stream.example.org";

struct Harness {
    _nic: External,
    peer: Peer,
    server: TlsServer,
    client: Client<External>,
    key: String,
}

impl Harness {
    /// A client whose upgrade request was received by the server.
    fn new(config: Config) -> Self {
        let nic = External::new(MTU);
        let mut peer = Peer::new(&nic);
        let system = System::from_rng(ChaCha8Rng::seed_from_u64(21));
        let client = Client::new(config, peer.tcp_client(), system).unwrap();
        let syn_ack = peer.accept();
        let mut harness = Harness {
            _nic: nic,
            peer,
            server: TlsServer::new(),
            client,
            key: String::new(),
        };
        harness.deliver(&syn_ack);
        assert_eq!(harness.next(), Ok(None));

        let hello = harness.peer.received();
        assert_eq!(harness.server.client_hello(&hello), HOST);
        let flight = harness.server.server_flight();
        harness.deliver_segment(&flight);
        assert_eq!(harness.next(), Ok(None));

        let client_flight = harness.peer.received();
        let reply = harness.server.client_flight(&client_flight);
        harness.deliver_segment(&reply);
        assert_eq!(harness.next(), Ok(None));
        assert!(harness.client.tls().is_handshake_complete());
        assert_eq!(harness.client.state(), State::HttpHandshake);

        let request = harness.sent_data();
        let request = String::from_utf8(request).unwrap();
        harness.key = request.lines()
            .find_map(|line| line.strip_prefix("Sec-WebSocket-Key: "))
            .unwrap()
            .to_string();
        assert_eq!(request, format!(
            "GET /feed HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade, keep-alive\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n",
            HOST, harness.key));
        harness
    }

    fn connected(config: Config) -> Self {
        let mut harness = Harness::new(config);
        let response = harness.response();
        assert_eq!(harness.feed(response.as_bytes()), vec![]);
        assert_eq!(harness.client.state(), State::Connected);
        harness
    }

    fn response(&self) -> String {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\r\n",
            expected_accept(&self.key))
    }

    fn deliver(&mut self, frame: &[u8]) {
        self.client.process_packet(&segment(frame)).unwrap();
    }

    fn deliver_segment(&mut self, payload: &[u8]) {
        let frame = self.peer.segment(payload);
        self.deliver(&frame);
    }

    fn next(&mut self) -> Result<Option<(OpCode, Vec<u8>)>, Error> {
        self.client.next_message()
            .map(|message| message.map(|message| (message.opcode, message.payload.to_vec())))
    }

    /// Send application data from the server, collecting every message on the way.
    fn feed(&mut self, data: &[u8]) -> Vec<(OpCode, Vec<u8>)> {
        let mut messages = Vec::new();
        for chunk in data.chunks(1400) {
            let record = self.server.seal(ContentType::ApplicationData, chunk);
            self.deliver_segment(&record);
            while let Some(message) = self.next().unwrap() {
                messages.push(message);
            }
        }
        messages
    }

    /// The decrypted application data the client sent.
    fn sent_data(&mut self) -> Vec<u8> {
        let bytes = self.peer.received();
        let mut data = Vec::new();
        for (content_type, plain) in self.server.open(&bytes) {
            assert_eq!(content_type, ContentType::ApplicationData);
            data.extend(plain);
        }
        data
    }
}

fn frame(first: u8, payload: &[u8]) -> Vec<u8> {
    let mut bytes = vec![first];
    match payload.len() {
        len if len <= 125 => bytes.push(len as u8),
        len if len <= 0xffff => {
            bytes.push(126);
            bytes.extend_from_slice(&(len as u16).to_be_bytes());
        },
        len => {
            bytes.push(127);
            bytes.extend_from_slice(&(len as u64).to_be_bytes());
        },
    }
    bytes.extend_from_slice(payload);
    bytes
}

#[test]
fn upgrade_with_coalesced_frame() {
    let mut harness = Harness::new(Config::new(HOST, "/feed"));
    let mut data = harness.response().into_bytes();
    data.extend(frame(0x81, b"first"));
    assert_eq!(harness.feed(&data), vec![(OpCode::Text, b"first".to_vec())]);
    assert_eq!(harness.client.state(), State::Connected);
    assert_eq!(harness.next(), Ok(None));
}

#[test]
fn partial_response() {
    let mut harness = Harness::new(Config::new(HOST, "/feed"));
    let response = harness.response();
    let (head, tail) = response.as_bytes().split_at(40);
    assert_eq!(harness.feed(head), vec![]);
    assert_eq!(harness.client.state(), State::HttpHandshake);
    assert_eq!(harness.feed(tail), vec![]);
    assert_eq!(harness.client.state(), State::Connected);
}

#[test]
fn response_without_accept() {
    let mut harness = Harness::new(Config::new(HOST, "/feed"));
    assert_eq!(harness.feed(b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n"), vec![]);
    assert_eq!(harness.client.state(), State::Connected);
}

#[test]
fn upgrade_rejected() {
    let mut harness = Harness::new(Config::new(HOST, "/feed"));
    let record = harness.server.seal(ContentType::ApplicationData, b"HTTP/1.1 403 Forbidden\r\n\r\n");
    harness.deliver_segment(&record);
    assert_eq!(harness.next(), Err(Error::UpgradeRejected));
}

#[test]
fn bad_accept_key() {
    let mut harness = Harness::new(Config::new(HOST, "/feed"));
    let response = b"HTTP/1.1 101 Switching Protocols\r\nSec-WebSocket-Accept: AAAA\r\n\r\n";
    let record = harness.server.seal(ContentType::ApplicationData, response);
    harness.deliver_segment(&record);
    assert_eq!(harness.next(), Err(Error::BadAcceptKey));
}

#[test]
fn size_classes() {
    let mut harness = Harness::connected(Config::new(HOST, "/feed"));
    let small = vec![b'a'; 10];
    let medium = vec![b'b'; 200];
    let large = vec![b'c'; 70_000];

    let mut data = frame(0x82, &small);
    data.extend(frame(0x82, &medium));
    data.extend(frame(0x82, &large));
    assert_eq!(&data[..2], &[0x82, 10]);
    assert_eq!(&data[12..16], &[0x82, 126, 0x00, 0xc8]);

    assert_eq!(harness.feed(&data), vec![
        (OpCode::Binary, small),
        (OpCode::Binary, medium),
        (OpCode::Binary, large),
    ]);
}

#[test]
fn wide_length_encodings() {
    let mut harness = Harness::connected(Config::new(HOST, "/feed"));
    let mut data = vec![0x82, 126, 0x00, 0x0a];
    data.extend_from_slice(b"0123456789");
    data.extend_from_slice(&[0x81, 127, 0, 0, 0, 0, 0, 0, 0, 0x04]);
    data.extend_from_slice(b"next");
    data.extend(frame(0x81, b"last"));

    assert_eq!(harness.feed(&data), vec![
        (OpCode::Binary, b"0123456789".to_vec()),
        (OpCode::Text, b"next".to_vec()),
        (OpCode::Text, b"last".to_vec()),
    ]);
}

#[test]
fn masked_wide_frame_is_skipped_whole() {
    let mut harness = Harness::connected(Config::new(HOST, "/feed"));
    let key = [0x11, 0x22, 0x33, 0x44];
    let mut payload = b"hidden".to_vec();
    apply_mask(key, 0, &mut payload);

    let mut data = vec![0x82, 0x80 | 126, 0x00, 0x06];
    data.extend_from_slice(&key);
    data.extend_from_slice(&payload);
    let mut wide = vec![0x82, 0x80 | 127, 0, 0, 0, 0, 0, 0, 0, 0x06];
    wide.extend_from_slice(&key);
    wide.extend_from_slice(&payload);
    data.extend(wide);
    data.extend(frame(0x81, b"after"));

    let record = harness.server.seal(ContentType::ApplicationData, &data);
    harness.deliver_segment(&record);
    assert_eq!(harness.next(), Err(Error::MaskedFrame));
    assert_eq!(harness.next(), Err(Error::MaskedFrame));
    assert_eq!(harness.next(), Ok(Some((OpCode::Text, b"after".to_vec()))));
    assert_eq!(harness.next(), Ok(None));
}

#[test]
fn masked_frame_is_rejected() {
    let mut harness = Harness::connected(Config::new(HOST, "/feed"));
    let mut masked = vec![0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d];
    let mut payload = b"hello".to_vec();
    apply_mask([0x37, 0xfa, 0x21, 0x3d], 0, &mut payload);
    masked.extend(payload);
    masked.extend(frame(0x81, b"after"));

    let record = harness.server.seal(ContentType::ApplicationData, &masked);
    harness.deliver_segment(&record);
    assert_eq!(harness.next(), Err(Error::MaskedFrame));
    assert_eq!(harness.next(), Ok(Some((OpCode::Text, b"after".to_vec()))));
}

#[test]
fn invalid_opcode() {
    let mut harness = Harness::connected(Config::new(HOST, "/feed"));
    let record = harness.server.seal(ContentType::ApplicationData, &frame(0x8b, b"x"));
    harness.deliver_segment(&record);
    assert_eq!(harness.next(), Err(Error::InvalidOpcode(0xb)));
}

#[test]
fn control_frames_are_dropped() {
    let mut harness = Harness::connected(Config::new(HOST, "/feed"));
    let mut data = frame(0x89, b"ping");
    data.extend(frame(0x8a, b"pong"));
    data.extend(frame(0x81, b"text"));
    data.extend(frame(0x88, &[0x03, 0xe8]));
    assert_eq!(harness.feed(&data), vec![(OpCode::Text, b"text".to_vec())]);
    assert!(harness.client.is_closed());
    assert_eq!(harness.sent_data(), b"");
}

#[test]
fn ping_is_answered() {
    let mut config = Config::new(HOST, "/feed");
    config.answer_pings = true;
    let mut harness = Harness::connected(config);
    assert_eq!(harness.feed(&frame(0x89, b"hi")), vec![]);
    assert_eq!(harness.sent_data(), vec![0x8a, 0x02, b'h', b'i']);
}

#[test]
fn send_unmasked() {
    let mut harness = Harness::connected(Config::new(HOST, "/feed"));
    harness.client.send(OpCode::Text, b"hello").unwrap();
    assert_eq!(harness.sent_data(), frame(0x81, b"hello"));
}

#[test]
fn send_masked() {
    let mut config = Config::new(HOST, "/feed");
    config.mask_outbound = true;
    let mut harness = Harness::connected(config);
    harness.client.send(OpCode::Binary, b"hello").unwrap();

    let data = harness.sent_data();
    assert_eq!(&data[..2], &[0x82, 0x85]);
    let mut key = [0; 4];
    key.copy_from_slice(&data[2..6]);
    let mut payload = data[6..].to_vec();
    apply_mask(key, 0, &mut payload);
    assert_eq!(payload, b"hello");
}

#[test]
fn send_before_upgrade() {
    let mut harness = Harness::new(Config::new(HOST, "/feed"));
    assert_eq!(harness.client.send(OpCode::Text, b"early"), Err(Error::NotConnected));
}
