//! The TLS 1.2 client.
//!
//! A single cipher suite, `TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256` over X25519, negotiated with
//! the extended master secret when the server agrees. The server certificate and the signature of
//! its key exchange are not validated, the connection is protected against passive observers
//! only.
//!
//! The [`Client`] owns a [`tcp::Client`] and turns its byte stream into records. Handshake
//! messages are reassembled across records and fed through a strictly sequential state machine.
//! Application data is decrypted in place and handed out as a borrowed slice.
//!
//! [`Client`]: struct.Client.html
//! [`tcp::Client`]: ../tcp/struct.Client.html
mod client;
pub mod crypto;


pub use self::client::{Client, HandshakeState, STREAM_CAPACITY};
pub use self::crypto::{prf, RecordProtection, System, Transcript};
