//! The stateful protocol layers.
//!
//! ## Layering
//!
//! Each protocol is split into two parts: the packet logic contained in `wire` and the processing
//! part in this module. The layers are not generic endpoints but a single client chain. The
//! WebSocket client owns a TLS client, which owns a TCP client, which owns the device's sending
//! half. Received frames enter at the bottom through [`eth::classify`] and are handed upwards by
//! the caller as a TCP [`eth::Segment`].
//!
//! ## Errors
//!
//! Every protocol violation is reported as a variant of [`Error`] instead of aborting. Most of
//! them leave the connection in an unusable state, it is up to the poll loop to tear it down. A
//! few are transient: [`Error::WindowExhausted`] only asks the caller to retry after the peer
//! acknowledged more data, and [`Error::Wire`] for a frame that could not be decoded does not
//! touch any connection state.
//!
//! Insufficient buffered data is not an error. Operations that need more input simply return
//! `Ok(None)` and the caller polls again.
//!
//! [`eth::classify`]: eth/fn.classify.html
//! [`eth::Segment`]: eth/struct.Segment.html
//! [`Error`]: enum.Error.html
//! [`Error::WindowExhausted`]: enum.Error.html#variant.WindowExhausted
//! [`Error::Wire`]: enum.Error.html#variant.Wire
use core::fmt;

use crate::storage::BufferFull;
use crate::wire::{self, TcpSeqNumber};
use crate::wire::tls::{AlertDescription, AlertLevel, ContentType, HandshakeType};

pub mod arp;
pub mod eth;
pub mod tcp;
pub mod tls;
pub mod ws;

#[cfg(test)]
mod testing;

/// The result type of the protocol layers.
pub type Result<T> = core::result::Result<T, Error>;

/// A protocol violation or resource failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The peer reset the connection.
    Reset,

    /// A segment did not start at the next expected byte.
    ///
    /// Loss and reordering are not recovered.
    SequenceMismatch {
        /// The sequence number we were waiting for.
        expected: TcpSeqNumber,
        /// The sequence number of the segment.
        received: TcpSeqNumber,
    },

    /// The peer acknowledged less than it did before.
    AckRegression,

    /// The peer acknowledged bytes that were never sent.
    AckOverrun,

    /// The send window can not take the payload right now.
    ///
    /// Not fatal. The payload was not sent and may be retried once acknowledgements arrive.
    WindowExhausted,

    /// The operation requires an established connection.
    NotConnected,

    /// A buffer did not have the capacity for the requested data.
    Exhausted,

    /// A packet or message could not be decoded.
    Wire(wire::Error),

    /// The peer answered with a protocol version other than TLS 1.2.
    WrongVersion,

    /// A record of this type was not expected in the current state.
    UnexpectedRecord(ContentType),

    /// A handshake message arrived out of order.
    UnexpectedHandshake {
        /// The message the state machine waited for.
        expected: HandshakeType,
        /// The message that arrived.
        received: HandshakeType,
    },

    /// The server selected a cipher suite we did not offer.
    UnsupportedCipherSuite(u16),

    /// The server selected a compression method other than null.
    UnsupportedCompression(u8),

    /// The server key exchange used a group other than X25519.
    UnsupportedGroup(u16),

    /// The server public key was not a valid X25519 key.
    BadKeyShare,

    /// A protected record failed authentication.
    BadRecordMac,

    /// A record fragment was longer than TLS permits.
    RecordOverflow,

    /// The verify data of the server Finished message did not match.
    FinishedMismatch,

    /// The peer sent an alert.
    Alert {
        /// Its severity.
        level: AlertLevel,
        /// Its reason.
        description: AlertDescription,
    },

    /// The HTTP upgrade was answered with a status other than 101.
    UpgradeRejected,

    /// The `Sec-WebSocket-Accept` value did not match our key.
    BadAcceptKey,

    /// A frame from the server carried a masking key.
    MaskedFrame,

    /// A frame carried an opcode outside the defined range.
    InvalidOpcode(u8),

    /// The network device failed.
    Device,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Reset => write!(f, "connection reset by peer"),
            Error::SequenceMismatch { expected, received } => {
                write!(f, "expected sequence number {} but got {}", expected, received)
            },
            Error::AckRegression => write!(f, "acknowledgement went backwards"),
            Error::AckOverrun => write!(f, "acknowledgement of unsent data"),
            Error::WindowExhausted => write!(f, "send window exhausted"),
            Error::NotConnected => write!(f, "not connected"),
            Error::Exhausted => write!(f, "buffer capacity exhausted"),
            Error::Wire(err) => write!(f, "{}", err),
            Error::WrongVersion => write!(f, "peer does not speak TLS 1.2"),
            Error::UnexpectedRecord(kind) => write!(f, "unexpected {:?} record", kind),
            Error::UnexpectedHandshake { expected, received } => {
                write!(f, "expected {:?} handshake message but got {:?}", expected, received)
            },
            Error::UnsupportedCipherSuite(suite) => {
                write!(f, "unsupported cipher suite {:#06x}", suite)
            },
            Error::UnsupportedCompression(method) => {
                write!(f, "unsupported compression method {}", method)
            },
            Error::UnsupportedGroup(group) => write!(f, "unsupported group {:#06x}", group),
            Error::BadKeyShare => write!(f, "invalid key share"),
            Error::BadRecordMac => write!(f, "record authentication failed"),
            Error::RecordOverflow => write!(f, "record fragment too long"),
            Error::FinishedMismatch => write!(f, "server finished verify data mismatch"),
            Error::Alert { level, description } => {
                write!(f, "received {:?} alert {:?}", level, description)
            },
            Error::UpgradeRejected => write!(f, "websocket upgrade rejected"),
            Error::BadAcceptKey => write!(f, "websocket accept key mismatch"),
            Error::MaskedFrame => write!(f, "masked frame from server"),
            Error::InvalidOpcode(code) => write!(f, "invalid opcode {:#x}", code),
            Error::Device => write!(f, "network device failure"),
        }
    }
}

impl std::error::Error for Error {}

impl From<wire::Error> for Error {
    fn from(err: wire::Error) -> Self {
        Error::Wire(err)
    }
}

/// A full buffer is a capacity problem of the layer using it.
impl From<BufferFull> for Error {
    fn from(_: BufferFull) -> Self {
        Error::Exhausted
    }
}
