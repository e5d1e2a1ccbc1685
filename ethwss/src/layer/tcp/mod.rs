//! The TCP client.
//!
//! A single active-open connection over a lossless link. There is no retransmission and no
//! reassembly: every segment must arrive exactly at the next expected sequence number, anything
//! else is reported as [`Error::SequenceMismatch`]. The client acknowledges every payload
//! immediately.
//!
//! [`Error::SequenceMismatch`]: ../enum.Error.html#variant.SequenceMismatch
use core::fmt;

use crate::wire::Ipv4Address;

mod client;

pub use crate::layer::eth::Host;
pub use self::client::{Client, State, WINDOW_SIZE, MSS};

/// One end of a TCP flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Session {
    /// The link and network address.
    pub host: Host,
    /// The TCP port.
    pub port: u16,
}

/// The identity of a single TCP flow.
///
/// For the remote side the hardware address is that of the next hop, usually the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Connection {
    /// Our side.
    pub local: Session,
    /// The peer.
    pub remote: Session,
}

impl Connection {
    /// Check if a segment with these addresses belongs to the flow, as seen from the receiver.
    pub fn matches_incoming(&self, src: (Ipv4Address, u16), dst: (Ipv4Address, u16)) -> bool {
        src == (self.remote.host.ip, self.remote.port)
            && dst == (self.local.host.ip, self.local.port)
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.host.ip, self.port)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} -> {}", self.local, self.remote)
    }
}
