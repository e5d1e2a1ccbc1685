use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand_core::RngCore;
use sha1::{Digest, Sha1};

use crate::layer::eth::Segment;
use crate::layer::{tcp, tls};
use crate::layer::{Error, Result};
use crate::nic::PacketSink;
use crate::storage::Stream;
use crate::wire::websocket::{apply_mask, frame, FrameHeader, OpCode, MASK_LEN};
use crate::wire;

use super::Config;

/// Capacity of the buffer for decrypted bytes not yet consumed as frames.
pub const STREAM_CAPACITY: usize = 200_000;

const ACCEPT_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const STATUS_PREFIX: &[u8] = b"HTTP/1.1 ";
const SWITCHING_PROTOCOLS: &[u8] = b"101";
const HEADER_END: &[u8] = b"\r\n\r\n";
const KEY_LEN: usize = 16;

/// The progress of the upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Waiting for the TLS handshake before sending the upgrade request.
    Init,
    /// The request is sent, waiting for the response header.
    HttpHandshake,
    /// Frames are flowing.
    Connected,
}

/// A Text or Binary message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    /// Either `Text` or `Binary`.
    pub opcode: OpCode,
    /// The unmasked payload.
    pub payload: &'a [u8],
}

/// A WebSocket client over TLS.
pub struct Client<S>
where
    S: PacketSink,
{
    tls: tls::Client<S>,
    config: Config,
    state: State,
    stream: Stream,
    key: String,
    closed: bool,
}

/// What to do with the frame at the front of the stream.
enum Next {
    /// Hand it to the caller.
    Message {
        opcode: OpCode,
        header_len: usize,
        frame_len: usize,
    },
    /// Consumed, look at the next one.
    Consumed,
    /// Not completely buffered.
    Incomplete,
}

impl<S: PacketSink> Client<S> {
    /// Create the client and open the underlying TLS and TCP connections.
    ///
    /// The `Sec-WebSocket-Key` is drawn from `system` which then serves the TLS layer.
    pub fn new(config: Config, tcp: tcp::Client<S>, mut system: tls::System) -> Result<Self> {
        let mut nonce = [0; KEY_LEN];
        system.fill_bytes(&mut nonce);
        let key = STANDARD.encode(nonce);
        let tls = tls::Client::new(&config.host, tcp, system)?;
        Ok(Client {
            tls,
            config,
            state: State::Init,
            stream: Stream::with_capacity(STREAM_CAPACITY),
            key,
            closed: false,
        })
    }

    /// The upgrade progress.
    pub fn state(&self) -> State {
        self.state
    }

    /// Check if the server sent a Close frame.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The underlying TLS client.
    pub fn tls(&self) -> &tls::Client<S> {
        &self.tls
    }

    /// The underlying TLS client.
    pub fn tls_mut(&mut self) -> &mut tls::Client<S> {
        &mut self.tls
    }

    /// Hand a received segment down to the TLS and TCP layers.
    pub fn process_packet(&mut self, segment: &Segment) -> Result<()> {
        self.tls.process_packet(segment)
    }

    /// Advance all layers and return the next application message.
    ///
    /// All decrypted application data is moved into the frame buffer first. Control frames are
    /// consumed on the way, a Close marks the client closed. Returns `Ok(None)` when no complete
    /// message is buffered. The message borrows the buffer until the next call.
    pub fn next_message(&mut self) -> Result<Option<Message<'_>>> {
        while let Some(data) = self.tls.receive()? {
            self.stream.push_bytes(data)?;
        }

        if !self.tls.is_handshake_complete() {
            return Ok(None);
        }
        if self.tls.pending() > 0 {
            self.tls.flush()?;
        }

        match self.state {
            State::Init => {
                self.send_upgrade()?;
                return Ok(None);
            },
            State::HttpHandshake => {
                if !self.accept_upgrade()? {
                    return Ok(None);
                }
            },
            State::Connected => (),
        }

        let (opcode, header_len, frame_len) = loop {
            match self.next_frame()? {
                Next::Message { opcode, header_len, frame_len } => break (opcode, header_len, frame_len),
                Next::Consumed => continue,
                Next::Incomplete => return Ok(None),
            }
        };

        let bytes = match self.stream.pop(frame_len) {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        Ok(Some(Message {
            opcode,
            payload: &bytes[header_len..],
        }))
    }

    /// Send one unfragmented frame.
    ///
    /// The frame is buffered in the TLS layer and flushed. On `WindowExhausted` the remainder
    /// stays buffered and goes out with a later call.
    pub fn send(&mut self, opcode: OpCode, payload: &[u8]) -> Result<()> {
        if self.state != State::Connected {
            return Err(Error::NotConnected);
        }

        let mut header = FrameHeader::new(opcode, payload.len() as u64);
        if self.config.mask_outbound {
            let mut key = [0; MASK_LEN];
            self.tls.system_mut().fill_bytes(&mut key);
            header.mask = Some(key);
        }

        let header_len = header.header_len();
        let mut buffer = vec![0; header_len + payload.len()];
        header.emit(frame::new_unchecked_mut(&mut buffer));
        buffer[header_len..].copy_from_slice(payload);
        if let Some(key) = header.mask {
            apply_mask(key, 0, &mut buffer[header_len..]);
        }

        net_trace!("ws: sending {}", header);
        self.tls.push_bytes(&buffer)?;
        self.tls.flush()
    }

    fn send_upgrade(&mut self) -> Result<()> {
        let request = format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade, keep-alive\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\r\n",
            self.config.path, self.config.host, self.key);
        net_debug!("ws: upgrade request for {}{}", self.config.host, self.config.path);

        self.tls.push_bytes(request.as_bytes())?;
        self.state = State::HttpHandshake;
        self.tls.flush()
    }

    /// Consume the response header once it is complete.
    fn accept_upgrade(&mut self) -> Result<bool> {
        let end = match self.stream.search(HEADER_END) {
            Some(position) => position + HEADER_END.len(),
            None => return Ok(false),
        };
        let head = self.stream.peek(end).ok_or(Error::Exhausted)?;

        let status = head.strip_prefix(STATUS_PREFIX).ok_or(Error::UpgradeRejected)?;
        if !status.starts_with(SWITCHING_PROTOCOLS) {
            net_debug!("ws: upgrade rejected: {}", String::from_utf8_lossy(status_line(head)));
            return Err(Error::UpgradeRejected);
        }

        if let Some(accept) = header_value(head, "sec-websocket-accept") {
            if accept != expected_accept(&self.key).as_bytes() {
                return Err(Error::BadAcceptKey);
            }
        } else {
            net_warn!("ws: upgrade response without Sec-WebSocket-Accept, accepting");
        }

        self.stream.pop(end);
        self.state = State::Connected;
        net_debug!("ws: connected");
        Ok(true)
    }

    /// Classify the frame at the front of the stream, consuming it unless it is a message.
    fn next_frame(&mut self) -> Result<Next> {
        let header = match frame::new_checked(self.stream.unread()) {
            Ok(frame) => FrameHeader::parse(frame)?,
            Err(wire::Error::Truncated) => return Ok(Next::Incomplete),
            Err(err) => return Err(err.into()),
        };

        let header_len = header.header_len();
        let frame_len = header_len as u64 + header.payload_len;
        if frame_len > self.stream.capacity() as u64 {
            return Err(Error::Exhausted);
        }
        let frame_len = frame_len as usize;
        if self.stream.len() < frame_len {
            return Ok(Next::Incomplete);
        }
        net_trace!("ws: received {}", header);

        let opcode = header.opcode;
        let code = u8::from(opcode);
        if header.mask.is_some() || code > OpCode::MAX_VALID {
            self.stream.pop(frame_len);
            return Err(if header.mask.is_some() {
                Error::MaskedFrame
            } else {
                Error::InvalidOpcode(code)
            });
        }

        match opcode {
            OpCode::Text | OpCode::Binary => return Ok(Next::Message { opcode, header_len, frame_len }),
            OpCode::Close => {
                net_debug!("ws: server closed the connection");
                self.closed = true;
            },
            OpCode::Ping if self.config.answer_pings => {
                let payload = self.stream.peek(frame_len)
                    .map(|bytes| bytes[header_len..].to_vec())
                    .unwrap_or_default();
                self.stream.pop(frame_len);
                self.send(OpCode::Pong, &payload)?;
                return Ok(Next::Consumed);
            },
            other => net_debug!("ws: dropping {:?} frame", other),
        }

        self.stream.pop(frame_len);
        Ok(Next::Consumed)
    }
}

/// The value the server must return in `Sec-WebSocket-Accept`.
pub(super) fn expected_accept(key: &str) -> String {
    let mut hash = Sha1::new();
    hash.update(key.as_bytes());
    hash.update(ACCEPT_GUID.as_bytes());
    STANDARD.encode(hash.finalize())
}

fn status_line(head: &[u8]) -> &[u8] {
    head.split(|&b| b == b'\r').next().unwrap_or(head)
}

/// The trimmed value of a header field, matching the name without regard to case.
fn header_value<'a>(head: &'a [u8], name: &str) -> Option<&'a [u8]> {
    head.split(|&b| b == b'\n')
        .skip(1)
        .filter_map(|line| {
            let colon = line.iter().position(|&b| b == b':')?;
            let (field, value) = line.split_at(colon);
            if field.eq_ignore_ascii_case(name.as_bytes()) {
                Some(trim(&value[1..]))
            } else {
                None
            }
        })
        .next()
}

fn trim(mut value: &[u8]) -> &[u8] {
    while let [first, rest @ ..] = value {
        if !first.is_ascii_whitespace() {
            break;
        }
        value = rest;
    }
    while let [rest @ .., last] = value {
        if !last.is_ascii_whitespace() {
            break;
        }
        value = rest;
    }
    value
}
