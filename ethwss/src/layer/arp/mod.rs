//! Answering and sending ARP messages.
//!
//! The stack resolves nothing on its own: the gateway hardware address is configured. The
//! responder only makes our own address resolvable for the peer, and can broadcast a request so
//! that a caller may learn a binding from the reply.
mod responder;
#[cfg(test)]
mod tests;

pub use responder::Responder;
