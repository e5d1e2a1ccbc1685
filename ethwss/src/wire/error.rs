use core::fmt;

/// The error type for parsing of the network stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Error {
    /// An incoming packet could not be parsed because it was shorter than assumed.
    ///
    /// The packet may be shorter than the minimum length specified, or declare a size longer than
    /// the actual payload. For stream formats such as TLS records this is the expected state
    /// while a message has only partially arrived.
    Truncated,

    /// An incoming packet had an incorrect checksum and was dropped.
    WrongChecksum,

    /// An incoming packet could not be recognized and was dropped.
    ///
    /// E.g. an Ethernet packet with an unknown EtherType, or an ARP packet for a hardware type
    /// other than Ethernet.
    Unrecognized,

    /// An incoming packet was recognized but was self-contradictory.
    ///
    /// Examples: a TCP option whose length does not match its kind; a ServerKeyExchange whose
    /// key length runs past the end of the message.
    Malformed,

    /// Parsing depends on information derived from a non-implemented feature.
    ///
    /// An example is a fragmented IPv4 packet.
    Unsupported,
}

/// The result type for the networking stack.
pub type Result<T> = core::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Truncated     => write!(f, "truncated packet"),
            Error::WrongChecksum => write!(f, "checksum error"),
            Error::Unrecognized  => write!(f, "unrecognized packet"),
            Error::Unsupported   => write!(f, "unsupported option"),
            Error::Malformed     => write!(f, "malformed packet"),
        }
    }
}

impl std::error::Error for Error {}
