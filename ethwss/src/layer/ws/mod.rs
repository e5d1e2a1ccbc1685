//! The WebSocket client.
//!
//! Runs over the application data of a [`tls::Client`]. Once the TLS handshake is complete the
//! HTTP upgrade request is sent, the `101` response is consumed, and from then on the decrypted
//! bytes are split into frames. Only Text and Binary frames are handed to the caller. Messages
//! fragmented into continuation frames are not reassembled.
//!
//! The server must not mask its frames. Outbound masking and automatic Pong replies are opt-in
//! through [`Config`].
//!
//! [`tls::Client`]: ../tls/struct.Client.html
//! [`Config`]: struct.Config.html
mod client;

#[cfg(test)]
mod tests;

pub use self::client::{Client, Message, State, STREAM_CAPACITY};

/// The endpoint and behavior of a WebSocket connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Config {
    /// The `Host` header, also sent as the TLS server name.
    pub host: String,
    /// The request path.
    pub path: String,
    /// Mask outbound frames with a fresh random key.
    pub mask_outbound: bool,
    /// Reply to a Ping with a Pong carrying the same payload.
    pub answer_pings: bool,
}

impl Config {
    /// A configuration that neither masks nor answers pings.
    pub fn new(host: &str, path: &str) -> Self {
        Config {
            host: host.to_string(),
            path: path.to_string(),
            mask_outbound: false,
            answer_pings: false,
        }
    }
}
