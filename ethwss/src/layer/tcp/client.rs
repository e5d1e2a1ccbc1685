use rand_core::RngCore;

use crate::layer::eth::Segment;
use crate::layer::{Error, Result};
use crate::nic::{self, PacketSink};
use crate::wire::{ethernet_frame, ipv4_packet, tcp_packet};
use crate::wire::{Checksum, EthernetProtocol, EthernetRepr, IpProtocol, Ipv4Repr};
use crate::wire::{TcpFlags, TcpRepr, TcpSeqNumber};

use super::Connection;

/// The receive window we advertise.
///
/// Window scaling is offered with a shift of zero, so this is also the effective window.
pub const WINDOW_SIZE: u16 = 65535;

/// The maximum segment size announced in our SYN.
pub const MSS: u16 = 1460;

const HOP_LIMIT: u8 = 64;

/// The connection state of a [`Client`].
///
/// [`Client`]: struct.Client.html
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Not connected, either before `connect` or after the connection ended.
    Offline,
    /// A SYN was sent and we wait for the SYN-ACK.
    Connecting,
    /// The handshake completed.
    Connected,
}

/// An active-open TCP client owning the sending half of a device.
///
/// Received segments are handed in through [`process_packet`] by the poll loop. The client never
/// retransmits. Bytes stay accounted as unacknowledged until the peer acknowledges them and no
/// payload is sent that would exceed the peer's advertised window.
///
/// Dropping a connected client sends a best-effort RST.
///
/// [`process_packet`]: #method.process_packet
pub struct Client<S>
where
    S: PacketSink,
{
    sink: S,
    connection: Connection,
    state: State,
    /// The sequence number of the next byte we send.
    seq: TcpSeqNumber,
    /// The sequence number of the next byte we expect.
    ack: TcpSeqNumber,
    last_ack_number: TcpSeqNumber,
    unacknowledged: usize,
    send_wnd: usize,
    peer_window_scale: u8,
    peer_mss: Option<u16>,
    ip_ident: u16,
}

impl<S: PacketSink> Client<S> {
    /// Create an offline client for a flow.
    ///
    /// The initial sequence number and the IPv4 identification are drawn from `rng`.
    pub fn new<R>(connection: Connection, sink: S, rng: &mut R) -> Self
    where
        R: RngCore + ?Sized,
    {
        let isn = TcpSeqNumber::from_u32(rng.next_u32());
        Client {
            sink,
            connection,
            state: State::Offline,
            seq: isn,
            ack: TcpSeqNumber::default(),
            last_ack_number: isn,
            unacknowledged: 0,
            send_wnd: usize::from(WINDOW_SIZE),
            peer_window_scale: 0,
            peer_mss: None,
            ip_ident: rng.next_u32() as u16,
        }
    }

    /// The flow this client speaks on.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// The current connection state.
    pub fn state(&self) -> State {
        self.state
    }

    /// The device handle used for sending.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// The device handle used for sending.
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Bytes that may be sent before the peer has to acknowledge more.
    pub fn send_window(&self) -> usize {
        self.send_wnd.saturating_sub(self.unacknowledged)
    }

    /// The largest payload that fits into one segment.
    ///
    /// Bounded by the device capacity and by the MSS the peer announced, if any.
    pub fn max_payload(&self) -> usize {
        let headers = ethernet_frame::header_len()
            + ipv4_packet::HEADER_LEN
            + tcp_packet::MIN_HEADER_LEN;
        let room = self.sink.capacity().saturating_sub(headers);
        match self.peer_mss {
            Some(mss) => room.min(usize::from(mss)),
            None => room,
        }
    }

    /// Open the connection by sending a SYN.
    ///
    /// The SYN carries the options MSS, SACK permitted and a window scale of zero. Does nothing
    /// unless the client is offline.
    pub fn connect(&mut self) -> Result<()> {
        if self.state != State::Offline {
            net_debug!("tcp: connect while {:?}, ignored", self.state);
            return Ok(());
        }

        let repr = TcpRepr {
            flags: TcpFlags::SYN,
            ack_number: None,
            window_scale: Some(0),
            max_seg_size: Some(MSS),
            sack_permitted: true,
            ..self.control(TcpFlags::SYN)
        };
        self.transmit(repr, 0, |_| Ok(0))?;
        self.state = State::Connecting;
        net_debug!("tcp: syn sent to {}", self.connection.remote);
        self.sink.flush()
    }

    /// Handle a received segment and return its in-order payload.
    ///
    /// Segments of other flows and duplicates of already acknowledged data are ignored and yield
    /// an empty payload. Any payload and a FIN are acknowledged immediately. A FIN ends the
    /// connection.
    ///
    /// # Errors
    ///
    /// A reset, a segment that does not start at the expected sequence number, and an
    /// acknowledgement that moves backwards or covers unsent data are reported as errors. Apart
    /// from the reset, which takes the client offline, the state is not updated.
    pub fn process_packet<'a>(&mut self, segment: &Segment<'a>) -> Result<&'a [u8]> {
        let repr = &segment.repr;
        let incoming = self.connection.matches_incoming(
            (segment.ip.src_addr, repr.src_port),
            (segment.ip.dst_addr, repr.dst_port));
        if !incoming {
            net_trace!("tcp: {} not part of {}", segment, self.connection);
            return Ok(&[]);
        }

        if self.state == State::Offline {
            net_trace!("tcp: offline, dropping {}", segment);
            return Ok(&[]);
        }

        if repr.flags.rst() {
            net_debug!("tcp: reset by {}", self.connection.remote);
            self.state = State::Offline;
            return Err(Error::Reset);
        }

        let connecting = self.state == State::Connecting;
        if connecting {
            if !repr.flags.syn() || repr.ack_number.is_none() {
                net_trace!("tcp: waiting for syn-ack, dropping {}", segment);
                return Ok(&[]);
            }
        } else {
            if repr.seq_number < self.ack {
                net_trace!("tcp: duplicate {}", segment);
                return Ok(&[]);
            }
            if repr.seq_number != self.ack {
                return Err(Error::SequenceMismatch {
                    expected: self.ack,
                    received: repr.seq_number,
                });
            }
        }

        if let Some(ack_number) = repr.ack_number {
            if ack_number < self.last_ack_number {
                return Err(Error::AckRegression);
            }
            let acked = ack_number - self.last_ack_number;
            if acked > self.unacknowledged {
                return Err(Error::AckOverrun);
            }
            self.unacknowledged -= acked;
            self.last_ack_number = ack_number;
        }

        // The window of a SYN is never scaled.
        let peer_window = usize::from(repr.window_len) << self.peer_window_scale;
        if peer_window > 0 {
            self.send_wnd = peer_window;
        }

        if connecting {
            self.ack = repr.seq_number + 1;
            self.peer_window_scale = repr.window_scale.unwrap_or(0);
            self.peer_mss = repr.max_seg_size;
            self.state = State::Connected;
            net_debug!("tcp: connected {}, window scale {}", self.connection, self.peer_window_scale);
            self.send_control(TcpFlags::NONE)?;
            self.sink.flush()?;
            return Ok(&[]);
        }

        let payload = segment.payload;
        let fin = repr.flags.fin();
        if payload.is_empty() && !fin {
            return Ok(payload);
        }

        self.ack = repr.seq_number + payload.len();
        if fin {
            self.ack += 1;
        }
        self.send_control(TcpFlags::NONE)?;
        if fin {
            net_debug!("tcp: {} closed by peer", self.connection);
            self.state = State::Offline;
        }
        self.sink.flush()?;
        Ok(payload)
    }

    /// Send a payload in one segment.
    ///
    /// # Errors
    ///
    /// `Exhausted` when the payload is larger than [`max_payload`], `WindowExhausted` when the
    /// peer window can not take it right now. Nothing is sent in either case.
    ///
    /// [`max_payload`]: #method.max_payload
    pub fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > self.max_payload() {
            return Err(Error::Exhausted);
        }
        self.send_with(payload.len(), |buffer| {
            let target = buffer.get_mut(..payload.len()).ok_or(Error::Exhausted)?;
            target.copy_from_slice(payload);
            Ok(payload.len())
        })?;
        Ok(())
    }

    /// Send one segment with the payload written in place.
    ///
    /// `fill` is given a buffer of at most `limit` bytes, also bounded by [`max_payload`], and
    /// returns the number of bytes it wrote. A zero length abandons the segment. Returns the
    /// number of bytes sent. The segment is queued on the device but not flushed.
    ///
    /// [`max_payload`]: #method.max_payload
    pub fn send_with<F>(&mut self, limit: usize, fill: F) -> Result<usize>
    where
        F: FnOnce(&mut [u8]) -> Result<usize>,
    {
        if self.state != State::Connected {
            return Err(Error::NotConnected);
        }
        let limit = limit.min(self.max_payload());
        let repr = self.control(TcpFlags::PSH);
        self.transmit(repr, limit, fill)
    }

    /// Tear the connection down with a RST.
    pub fn abort(&mut self) -> Result<()> {
        let repr = match self.state {
            State::Offline => return Ok(()),
            State::Connecting => TcpRepr {
                ack_number: None,
                ..self.control(TcpFlags::RST)
            },
            State::Connected => self.control(TcpFlags::RST),
        };
        net_debug!("tcp: sending reset to {}", self.connection.remote);
        self.state = State::Offline;
        self.transmit(repr, 0, |_| Ok(0))?;
        self.sink.flush()
    }

    /// Transmit everything queued on the device.
    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush()
    }

    fn control(&self, flags: TcpFlags) -> TcpRepr {
        TcpRepr {
            src_port: self.connection.local.port,
            dst_port: self.connection.remote.port,
            flags,
            seq_number: self.seq,
            ack_number: Some(self.ack),
            window_len: WINDOW_SIZE,
            window_scale: None,
            max_seg_size: None,
            sack_permitted: false,
            payload_len: 0,
        }
    }

    fn send_control(&mut self, flags: TcpFlags) -> Result<()> {
        let repr = self.control(flags);
        self.transmit(repr, 0, |_| Ok(0))?;
        Ok(())
    }

    /// Build and queue one segment, then account for the sequence space it used.
    fn transmit<F>(&mut self, mut repr: TcpRepr, limit: usize, fill: F) -> Result<usize>
    where
        F: FnOnce(&mut [u8]) -> Result<usize>,
    {
        let connection = self.connection;
        let ident = self.ip_ident;
        let available = self.send_window();
        let header_len = ethernet_frame::header_len() + ipv4_packet::HEADER_LEN + repr.header_len();

        let sent = nic::send_with(&mut self.sink, |buffer| {
            let room = buffer.len().checked_sub(header_len).ok_or(Error::Exhausted)?;
            let limit = limit.min(room);
            let payload_len = fill(&mut buffer[header_len..header_len + limit])?;
            if payload_len > limit {
                return Err(Error::Exhausted);
            }
            if payload_len == 0 && repr.flags.psh() {
                return Ok(None);
            }
            if payload_len > available {
                return Err(Error::WindowExhausted);
            }
            repr.payload_len = payload_len;

            let ip = Ipv4Repr {
                src_addr: connection.local.host.ip,
                dst_addr: connection.remote.host.ip,
                protocol: IpProtocol::Tcp,
                payload_len: repr.buffer_len(),
                hop_limit: HOP_LIMIT,
                ident,
            };
            let len = ethernet_frame::buffer_len(ip.buffer_len() + ip.payload_len);
            let frame = ethernet_frame::new_unchecked_mut(&mut buffer[..len]);
            EthernetRepr {
                src_addr: connection.local.host.mac,
                dst_addr: connection.remote.host.mac,
                ethertype: EthernetProtocol::Ipv4,
            }.emit(frame);
            let packet = ipv4_packet::new_unchecked_mut(frame.payload_mut_slice());
            ip.emit(packet, Checksum::Manual);
            let segment = tcp_packet::new_unchecked_mut(packet.payload_mut_slice());
            repr.emit(segment);
            segment.fill_checksum(ip.src_addr, ip.dst_addr);
            Ok(Some(len))
        })?;

        if !sent {
            return Ok(0);
        }
        net_trace!("tcp: sent {}", repr);
        self.ip_ident = self.ip_ident.wrapping_add(1);
        self.seq += repr.sequence_len();
        self.unacknowledged += repr.sequence_len();
        Ok(repr.payload_len)
    }
}

impl<S: PacketSink> Drop for Client<S> {
    fn drop(&mut self) {
        if self.state == State::Connected {
            if let Err(err) = self.abort() {
                net_warn!("tcp: reset on drop failed: {}", err);
            }
        }
    }
}
