use crate::layer::eth::Segment;
use crate::layer::tcp;
use crate::layer::{Error, Result};
use crate::nic::PacketSink;
use crate::storage::Stream;
use crate::wire::tls::{self, handshake, ContentType, HandshakeType, Version};
use crate::wire::tls::{Alert, ClientHello, ClientKeyExchange, Finished, RecordHeader};
use crate::wire::tls::{CipherSuite, NamedGroup, ServerHello, ServerKeyExchange};
use crate::wire::tls::{HANDSHAKE_HEADER_LEN, MAX_FRAGMENT_LEN, PROTECTION_OVERHEAD, RANDOM_LEN};
use crate::wire::tls::{RECORD_HEADER_LEN, X25519_KEY_LEN};

use x25519_dalek::PublicKey;

use super::crypto::{self, KeyBlock, RecordProtection, System, Transcript, MASTER_SECRET_LEN};

/// Capacity of the raw record stream and of the plaintext send buffer.
pub const STREAM_CAPACITY: usize = 20600;

/// Capacity for reassembling handshake messages, large enough for a certificate chain.
const HANDSHAKE_CAPACITY: usize = 1 << 16;

/// The progress of the handshake.
///
/// Strictly sequential. Each server state names the message we wait for next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HandshakeState {
    /// The ClientHello goes out once TCP is connected.
    ClientHelloToSend,
    /// Waiting for the ServerHello.
    ServerHello,
    /// Waiting for the server Certificate.
    ServerCertificate,
    /// Waiting for the ServerKeyExchange.
    ServerKeyExchange,
    /// Waiting for the ServerHelloDone, a CertificateRequest may come first.
    ServerHelloDone,
    /// Our key exchange flight is pending.
    ClientKeyExchange,
    /// Our Finished was sent, waiting for the server ChangeCipherSpec and Finished.
    ClientFinished,
    /// The handshake is complete.
    ServerFinished,
}

impl HandshakeState {
    fn expected(self) -> HandshakeType {
        match self {
            HandshakeState::ClientHelloToSend => HandshakeType::ClientHello,
            HandshakeState::ServerHello => HandshakeType::ServerHello,
            HandshakeState::ServerCertificate => HandshakeType::Certificate,
            HandshakeState::ServerKeyExchange => HandshakeType::ServerKeyExchange,
            HandshakeState::ServerHelloDone => HandshakeType::ServerHelloDone,
            HandshakeState::ClientKeyExchange => HandshakeType::ClientKeyExchange,
            HandshakeState::ClientFinished => HandshakeType::Finished,
            HandshakeState::ServerFinished => HandshakeType::HelloRequest,
        }
    }
}

/// The handshake context threaded through every step.
struct Handshake {
    state: HandshakeState,
    transcript: Transcript,
    client_random: [u8; RANDOM_LEN],
    server_random: [u8; RANDOM_LEN],
    extended_master_secret: bool,
    server_public: Option<[u8; X25519_KEY_LEN]>,
    certificate_requested: bool,
    master_secret: Option<[u8; MASTER_SECRET_LEN]>,
}

/// A TLS 1.2 client over a TCP client.
///
/// Offers exactly `TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256` with X25519 and does not validate the
/// server certificate. Received TCP payload is buffered until complete records are available,
/// handshake messages are reassembled across records.
pub struct Client<S>
where
    S: PacketSink,
{
    tcp: tcp::Client<S>,
    system: System,
    server_name: String,
    handshake: Handshake,
    /// Received bytes, not yet split into records.
    stream: Stream,
    /// Handshake message bytes, possibly partial.
    messages: Stream,
    /// Plaintext waiting for `flush`.
    send_buffer: Stream,
    write: Option<RecordProtection>,
    /// The server protection, waiting for its ChangeCipherSpec.
    pending_read: Option<RecordProtection>,
    read: Option<RecordProtection>,
}

impl<S: PacketSink> Client<S> {
    /// Start a handshake with `server_name` as the SNI.
    ///
    /// Opens the TCP connection. The ClientHello is sent from `receive` once it is established.
    pub fn new(server_name: &str, mut tcp: tcp::Client<S>, mut system: System) -> Result<Self> {
        tcp.connect()?;
        let client_random = system.random();
        Ok(Client {
            tcp,
            system,
            server_name: server_name.to_string(),
            handshake: Handshake {
                state: HandshakeState::ClientHelloToSend,
                transcript: Transcript::new(),
                client_random,
                server_random: [0; RANDOM_LEN],
                extended_master_secret: false,
                server_public: None,
                certificate_requested: false,
                master_secret: None,
            },
            stream: Stream::with_capacity(STREAM_CAPACITY),
            messages: Stream::with_capacity(HANDSHAKE_CAPACITY),
            send_buffer: Stream::with_capacity(STREAM_CAPACITY),
            write: None,
            pending_read: None,
            read: None,
        })
    }

    /// The handshake progress.
    pub fn state(&self) -> HandshakeState {
        self.handshake.state
    }

    /// Check if application data can flow.
    pub fn is_handshake_complete(&self) -> bool {
        self.handshake.state == HandshakeState::ServerFinished
    }

    /// The underlying TCP client.
    pub fn tcp(&self) -> &tcp::Client<S> {
        &self.tcp
    }

    /// The underlying TCP client.
    pub fn tcp_mut(&mut self) -> &mut tcp::Client<S> {
        &mut self.tcp
    }

    /// The randomness of this connection.
    pub fn system_mut(&mut self) -> &mut System {
        &mut self.system
    }

    /// Hand a received segment to TCP and buffer its payload.
    pub fn process_packet(&mut self, segment: &Segment) -> Result<()> {
        let payload = self.tcp.process_packet(segment)?;
        if !payload.is_empty() {
            self.stream.push_bytes(payload)?;
        }
        Ok(())
    }

    /// Advance the handshake and return the plaintext of the next application data record.
    ///
    /// While the handshake is incomplete all buffered records are processed and our flights are
    /// sent when due. Returns `Ok(None)` when no complete record is buffered. The plaintext is
    /// borrowed from the receive buffer until the next call.
    pub fn receive(&mut self) -> Result<Option<&[u8]>> {
        let header = loop {
            self.send_pending()?;
            let header = match self.next_record()? {
                Some(header) => header,
                None => return Ok(None),
            };
            if self.is_handshake_complete() && header.content_type == ContentType::ApplicationData {
                break header;
            }
            self.process_record(header)?;
        };

        let record = match self.stream.pop_mut(header.record_len()) {
            Some(record) => record,
            None => return Ok(None),
        };
        let read = self.read.as_mut().ok_or(Error::UnexpectedRecord(header.content_type))?;
        let plain = read.open(header.content_type, &mut record[RECORD_HEADER_LEN..])?;
        net_trace!("tls: {} bytes of application data", plain.len());
        Ok(Some(plain))
    }

    /// Buffer plaintext for sending.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.send_buffer.push_bytes(bytes)?;
        Ok(())
    }

    /// The number of plaintext bytes buffered but not yet sent.
    pub fn pending(&self) -> usize {
        self.send_buffer.len()
    }

    /// Seal and send all buffered plaintext, then flush the device.
    ///
    /// Records are sized to fit one segment each. When the peer window is full the rest stays
    /// buffered and `WindowExhausted` is returned.
    pub fn flush(&mut self) -> Result<()> {
        if !self.send_buffer.is_empty() && !self.is_handshake_complete() {
            return Err(Error::NotConnected);
        }

        while !self.send_buffer.is_empty() {
            let room = self.tcp.max_payload().min(self.tcp.send_window());
            let chunk = room
                .saturating_sub(RECORD_HEADER_LEN + PROTECTION_OVERHEAD)
                .min(MAX_FRAGMENT_LEN)
                .min(self.send_buffer.len());
            if chunk == 0 {
                self.tcp.flush()?;
                return Err(Error::WindowExhausted);
            }

            let write = self.write.as_mut().ok_or(Error::NotConnected)?;
            let plain = self.send_buffer.peek(chunk).ok_or(Error::Exhausted)?;
            let len = RECORD_HEADER_LEN + PROTECTION_OVERHEAD + chunk;
            self.tcp.send_with(len, |buffer| {
                write_protected(write, ContentType::ApplicationData, plain, buffer)
            })?;
            self.send_buffer.pop(chunk);
        }

        self.tcp.flush()
    }

    /// Send whatever flight the handshake state asks for.
    fn send_pending(&mut self) -> Result<()> {
        match self.handshake.state {
            HandshakeState::ClientHelloToSend if self.tcp.state() == tcp::State::Connected => {
                self.send_client_hello()?;
                self.handshake.state = HandshakeState::ServerHello;
            },
            HandshakeState::ClientKeyExchange => {
                self.send_client_flight()?;
                self.handshake.state = HandshakeState::ClientFinished;
            },
            _ => (),
        }
        Ok(())
    }

    /// The header of the next record, once it is completely buffered.
    fn next_record(&self) -> Result<Option<RecordHeader>> {
        let bytes = match self.stream.peek(RECORD_HEADER_LEN) {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let header = RecordHeader::parse(bytes)?;
        if header.version != Version::TLS_1_2 {
            return Err(Error::WrongVersion);
        }
        if header.record_len() > self.stream.capacity() {
            return Err(Error::Exhausted);
        }
        if self.stream.len() < header.record_len() {
            return Ok(None);
        }
        Ok(Some(header))
    }

    /// Consume one complete record that is not application data for the caller.
    fn process_record(&mut self, header: RecordHeader) -> Result<()> {
        let record = match self.stream.pop_mut(header.record_len()) {
            Some(record) => record,
            None => return Ok(()),
        };
        let fragment = &mut record[RECORD_HEADER_LEN..];
        net_trace!("tls: {:?} record of {} bytes", header.content_type, fragment.len());

        match header.content_type {
            ContentType::ChangeCipherSpec => {
                if self.handshake.state != HandshakeState::ClientFinished || self.read.is_some() {
                    return Err(Error::UnexpectedRecord(header.content_type));
                }
                if fragment[..] != [tls::CHANGE_CIPHER_SPEC] {
                    return Err(Error::Wire(crate::wire::Error::Malformed));
                }
                self.read = self.pending_read.take();
                net_debug!("tls: server changed cipher spec");
                Ok(())
            },
            ContentType::Alert => {
                let plain = match self.read.as_mut() {
                    Some(read) => &*read.open(header.content_type, fragment)?,
                    None => &*fragment,
                };
                let alert = Alert::parse(plain)?;
                net_debug!("tls: {}", alert);
                Err(Error::Alert {
                    level: alert.level,
                    description: alert.description,
                })
            },
            ContentType::Handshake => {
                let expects_plaintext = self.handshake.state < HandshakeState::ClientFinished;
                let plain = match self.read.as_mut() {
                    Some(read) => &*read.open(header.content_type, fragment)?,
                    None if expects_plaintext => &*fragment,
                    None => return Err(Error::UnexpectedRecord(header.content_type)),
                };
                self.messages.push_bytes(plain)?;
                self.process_messages()
            },
            other => Err(Error::UnexpectedRecord(other)),
        }
    }

    /// Run the state machine over all complete handshake messages.
    fn process_messages(&mut self) -> Result<()> {
        loop {
            let mut read = self.messages.read_transaction();
            let len = match read.peek(HANDSHAKE_HEADER_LEN) {
                Some(header) => handshake::new_unchecked(header).message_len(),
                None => return Ok(()),
            };
            if len > HANDSHAKE_CAPACITY {
                return Err(Error::Exhausted);
            }
            let message = match read.pop(len) {
                Some(message) => handshake::new_unchecked(message),
                None => return Ok(()),
            };
            self.handshake.process_message(message)?;
            read.commit();
        }
    }

    fn send_client_hello(&mut self) -> Result<()> {
        let hello = ClientHello {
            random: self.handshake.client_random,
            server_name: &self.server_name,
        };
        let message_len = hello.buffer_len();
        let len = RECORD_HEADER_LEN + message_len;
        let mut transcript = self.handshake.transcript.clone();

        self.tcp.send_with(len, |buffer| {
            let record = buffer.get_mut(..len).ok_or(Error::Exhausted)?;
            RecordHeader {
                content_type: ContentType::Handshake,
                version: Version::TLS_1_2,
                length: message_len as u16,
            }.emit(record);
            hello.emit(&mut record[RECORD_HEADER_LEN..]);
            transcript.update(&record[RECORD_HEADER_LEN..]);
            Ok(len)
        })?;
        self.tcp.flush()?;

        self.handshake.transcript = transcript;
        net_debug!("tls: client hello sent, server name {}", self.server_name);
        Ok(())
    }

    /// Send the optional empty Certificate, the ClientKeyExchange, ChangeCipherSpec and the
    /// protected Finished in one segment.
    ///
    /// Nothing is committed unless the segment was queued, so a full window can be retried.
    fn send_client_flight(&mut self) -> Result<()> {
        let server_public = self.handshake.server_public.ok_or(Error::BadKeyShare)?;
        let (secret, public) = self.system.dh_generate();
        let premaster = secret.diffie_hellman(&PublicKey::from(server_public));
        if !premaster.was_contributory() {
            return Err(Error::BadKeyShare);
        }

        let mut transcript = self.handshake.transcript.clone();
        let certificate = self.handshake.certificate_requested;
        if certificate {
            transcript.update(&tls::EMPTY_CERTIFICATE);
        }

        let mut key_exchange = [0; ClientKeyExchange::LEN];
        ClientKeyExchange { public_key: *public.as_bytes() }.emit(&mut key_exchange);
        transcript.update(&key_exchange);

        let master = crypto::master_secret(
            premaster.as_bytes(),
            self.handshake.extended_master_secret,
            &transcript.current(),
            &self.handshake.client_random,
            &self.handshake.server_random);
        let keys = KeyBlock::derive(&master, &self.handshake.client_random, &self.handshake.server_random);
        let mut write = RecordProtection::new(&keys.client_key, keys.client_iv);
        let read = RecordProtection::new(&keys.server_key, keys.server_iv);

        let verify_data = crypto::verify_data(&master, b"client finished", &transcript.current());
        let mut finished = [0; Finished::LEN];
        Finished { verify_data }.emit(&mut finished);
        transcript.update(&finished);

        let certificate_len = if certificate {
            RECORD_HEADER_LEN + tls::EMPTY_CERTIFICATE.len()
        } else {
            0
        };
        let len = certificate_len
            + RECORD_HEADER_LEN + ClientKeyExchange::LEN
            + RECORD_HEADER_LEN + 1
            + RECORD_HEADER_LEN + PROTECTION_OVERHEAD + Finished::LEN;
        if len > self.tcp.max_payload() {
            return Err(Error::Exhausted);
        }

        self.tcp.send_with(len, |buffer| {
            let buffer = buffer.get_mut(..len).ok_or(Error::Exhausted)?;
            let mut at = 0;
            if certificate {
                at += write_plain(ContentType::Handshake, &tls::EMPTY_CERTIFICATE, &mut buffer[at..]);
            }
            at += write_plain(ContentType::Handshake, &key_exchange, &mut buffer[at..]);
            at += write_plain(ContentType::ChangeCipherSpec, &[tls::CHANGE_CIPHER_SPEC], &mut buffer[at..]);
            at += write_protected(&mut write, ContentType::Handshake, &finished, &mut buffer[at..])?;
            Ok(at)
        })?;
        self.tcp.flush()?;

        net_debug!("tls: key exchange and finished sent, extended master secret {}",
            self.handshake.extended_master_secret);
        self.handshake.transcript = transcript;
        self.handshake.master_secret = Some(master);
        self.write = Some(write);
        self.pending_read = Some(read);
        Ok(())
    }
}

impl Handshake {
    fn process_message(&mut self, message: &handshake) -> Result<()> {
        let received = message.msg_type();
        net_trace!("tls: {:?} message in {:?}", received, self.state);

        match (self.state, received) {
            (HandshakeState::ServerHello, HandshakeType::ServerHello) => {
                let hello = ServerHello::parse(message.body())?;
                if hello.version != Version::TLS_1_2 {
                    return Err(Error::WrongVersion);
                }
                if hello.cipher_suite != CipherSuite::EcdheRsaWithAes128GcmSha256 {
                    return Err(Error::UnsupportedCipherSuite(hello.cipher_suite.into()));
                }
                if hello.compression_method != 0 {
                    return Err(Error::UnsupportedCompression(hello.compression_method));
                }
                self.server_random = hello.random;
                self.extended_master_secret = hello.extended_master_secret;
                self.state = HandshakeState::ServerCertificate;
            },
            (HandshakeState::ServerCertificate, HandshakeType::Certificate) => {
                net_debug!("tls: server certificate of {} bytes, not validated", message.body().len());
                self.state = HandshakeState::ServerKeyExchange;
            },
            (HandshakeState::ServerKeyExchange, HandshakeType::ServerKeyExchange) => {
                let exchange = ServerKeyExchange::parse(message.body())?;
                if exchange.named_group != NamedGroup::X25519 {
                    return Err(Error::UnsupportedGroup(exchange.named_group.into()));
                }
                if exchange.public_key.len() != X25519_KEY_LEN {
                    return Err(Error::BadKeyShare);
                }
                let mut public = [0; X25519_KEY_LEN];
                public.copy_from_slice(exchange.public_key);
                self.server_public = Some(public);
                net_debug!("tls: server key exchange, signature algorithm {:#06x}",
                    exchange.signature_algorithm);
                self.state = HandshakeState::ServerHelloDone;
            },
            (HandshakeState::ServerHelloDone, HandshakeType::CertificateRequest) => {
                net_debug!("tls: certificate requested, answering with none");
                self.certificate_requested = true;
            },
            (HandshakeState::ServerHelloDone, HandshakeType::ServerHelloDone) => {
                self.state = HandshakeState::ClientKeyExchange;
            },
            (HandshakeState::ClientFinished, HandshakeType::Finished) => {
                let finished = Finished::parse(message)?;
                let master = self.master_secret.as_ref().ok_or(Error::FinishedMismatch)?;
                let expected = crypto::verify_data(master, b"server finished", &self.transcript.current());
                if finished.verify_data != expected {
                    return Err(Error::FinishedMismatch);
                }
                net_debug!("tls: handshake complete");
                self.state = HandshakeState::ServerFinished;
            },
            (HandshakeState::ServerFinished, HandshakeType::HelloRequest) => {
                net_debug!("tls: ignoring renegotiation request");
                return Ok(());
            },
            (state, received) => return Err(Error::UnexpectedHandshake {
                expected: state.expected(),
                received,
            }),
        }

        self.transcript.update(message.as_bytes());
        Ok(())
    }
}

/// Write a plaintext record, returning its length.
fn write_plain(content_type: ContentType, fragment: &[u8], buffer: &mut [u8]) -> usize {
    let len = RECORD_HEADER_LEN + fragment.len();
    RecordHeader {
        content_type,
        version: Version::TLS_1_2,
        length: fragment.len() as u16,
    }.emit(buffer);
    buffer[RECORD_HEADER_LEN..len].copy_from_slice(fragment);
    len
}

/// Write a protected record, returning its length.
fn write_protected(
    protection: &mut RecordProtection,
    content_type: ContentType,
    plain: &[u8],
    buffer: &mut [u8],
) -> Result<usize> {
    let fragment_len = PROTECTION_OVERHEAD + plain.len();
    let len = RECORD_HEADER_LEN + fragment_len;
    let record = buffer.get_mut(..len).ok_or(Error::Exhausted)?;
    RecordHeader {
        content_type,
        version: Version::TLS_1_2,
        length: fragment_len as u16,
    }.emit(record);
    let fragment = &mut record[RECORD_HEADER_LEN..];
    fragment[tls::EXPLICIT_NONCE_LEN..][..plain.len()].copy_from_slice(plain);
    protection.seal(content_type, fragment)?;
    Ok(len)
}
