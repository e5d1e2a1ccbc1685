//! The poll loop from a network device to WebSocket messages.
//!
//! One [`Gateway`] drives one connection on one thread. Each call to [`Gateway::poll`] takes at
//! most one frame from the device and routes it: ARP to the responder, TCP through the WebSocket
//! client. Every message that becomes available is handed to the callback before `poll` returns.
//!
//! [`Gateway`]: struct.Gateway.html
//! [`Gateway::poll`]: struct.Gateway.html#method.poll
pub mod config;
pub mod timeout;

use tracing::{debug, info, trace, warn};

use ethwss::layer::eth::{classify, Frame};
use ethwss::layer::tcp::{self, Connection, Session};
use ethwss::layer::{arp, tls, ws, Result};
use ethwss::nic::{PacketSink, PacketSource};
use ethwss::time::{Clock, Instant, SystemClock};
use ethwss::wire::Checksum;

/// Everything the stack needs to know about the connection.
#[derive(Clone, Debug)]
pub struct Options {
    pub local: Session,
    pub remote: Session,
    pub ws: ws::Config,
    /// Whether received checksums are verified.
    pub checksum: Checksum,
}

/// A device wired to one WebSocket connection.
pub struct Gateway<D, S, K = SystemClock>
where
    D: PacketSource,
    S: PacketSink,
    K: Clock,
{
    source: D,
    client: ws::Client<S>,
    responder: arp::Responder,
    remote: Session,
    checksum: Checksum,
    clock: K,
    started: Instant,
    handshake_done: bool,
}

impl<D, S, K> Gateway<D, S, K>
where
    D: PacketSource,
    S: PacketSink,
    K: Clock,
{
    /// Build the stack and send the SYN.
    ///
    /// Frames are received from `source` while `sink` carries everything we send, including ARP
    /// replies.
    pub fn new(source: D, sink: S, options: &Options, mut system: tls::System, clock: K) -> Result<Self> {
        let connection = Connection { local: options.local, remote: options.remote };
        info!(%connection, host = %options.ws.host, path = %options.ws.path, "connecting");

        let tcp = tcp::Client::new(connection, sink, &mut system);
        let client = ws::Client::new(options.ws.clone(), tcp, system)?;
        let started = clock.now();
        Ok(Gateway {
            source,
            client,
            responder: arp::Responder::new(options.local.host),
            remote: options.remote,
            checksum: options.checksum,
            clock,
            started,
            handshake_done: false,
        })
    }

    /// The WebSocket client.
    pub fn client(&self) -> &ws::Client<S> {
        &self.client
    }

    /// Check if the server closed the WebSocket.
    pub fn is_closed(&self) -> bool {
        self.client.is_closed()
    }

    /// Process at most one received frame.
    ///
    /// Returns whether a frame was available. Frames that can not be decoded are logged and
    /// dropped, protocol errors of the connection are returned.
    pub fn poll<F>(&mut self, mut on_message: F) -> Result<bool>
    where
        F: FnMut(ws::Message<'_>),
    {
        let frame = match self.source.receive()? {
            Some(frame) => frame,
            None => return Ok(false),
        };
        let timestamp = frame.timestamp;

        match classify(frame.bytes, self.checksum) {
            Err(err) => warn!(%err, "dropping frame"),
            Ok(Frame::Arp { arp, .. }) => {
                let sink = self.client.tls_mut().tcp_mut().sink_mut();
                if let Some(peer) = self.responder.handle_packet(&arp, sink)? {
                    debug!(%peer, "arp binding");
                    if peer.ip == self.remote.host.ip && peer.mac != self.remote.host.mac {
                        warn!(%peer, configured = %self.remote.host.mac, "server answers from another address");
                    }
                }
                sink.flush()?;
            },
            Ok(Frame::Tcp(segment)) => {
                trace!(%segment, "tcp");
                self.client.process_packet(&segment)?;
                while let Some(message) = self.client.next_message()? {
                    on_message(message);
                }
                if !self.handshake_done && self.client.tls().is_handshake_complete() {
                    self.handshake_done = true;
                    info!(elapsed = ?(timestamp - self.started), "tls handshake complete");
                }
            },
            Ok(Frame::Ipv4 { ip, .. }) => trace!(protocol = ?ip.protocol, "ignoring ipv4 packet"),
            Ok(Frame::Other(eth)) => trace!(ethertype = ?eth.ethertype, "ignoring frame"),
        }

        Ok(true)
    }

    /// The time since the gateway was created.
    pub fn uptime(&self) -> std::time::Duration {
        self.clock.now() - self.started
    }
}
