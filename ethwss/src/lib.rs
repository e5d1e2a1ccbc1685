//! A userspace network path from raw Ethernet frames up to WebSocket messages.
//!
//! ## Table of contents
//!
//! 1. [Design](#design)
//! 2. [The wire module](wire/index.html)
//! 3. [The layers](layer/index.html)
//!    1. [Frame classification](layer/eth/index.html)
//!    1. [Arp](layer/arp/index.html)
//!    1. [Tcp](layer/tcp/index.html)
//!    1. [Tls](layer/tls/index.html)
//!    1. [WebSocket](layer/ws/index.html)
//! 4. [Network interfaces](nic/index.html)
//! 5. Internals
//!    1. [The storage module](storage/index.html)
//!
//! ## Design
//!
//! The stack is a chain of state machines that each own the one below. A WebSocket client owns a
//! TLS client, which owns a TCP client, which owns the sending half of a network device. Received
//! frames are pulled from a [`PacketSource`] by the caller, classified, and handed to the top of
//! the chain. Each layer consumes what it understands and leaves the rest buffered in a ring
//! buffer until the next frame arrives. Nothing blocks and nothing spawns threads; one poll loop
//! drives one connection.
//!
//! All wire formats are handled through byte wrappers over borrowed buffers (`ethernet`, `arp`,
//! `ipv4`, `tcp`, ...) and high-level `Repr` values that parse from and emit into them. Outgoing
//! packets are built directly inside the device's transmit buffer, including TLS records which
//! are encrypted in place.
//!
//! The TCP client is deliberately minimal. It assumes an in-order, lossless link and reports any
//! gap as [`layer::Error::SequenceMismatch`] instead of attempting recovery. Every protocol
//! violation is a typed error; deciding whether that ends the process is left to the caller.
//!
//! [`PacketSource`]: nic/trait.PacketSource.html
//! [`layer::Error::SequenceMismatch`]: layer/enum.Error.html#variant.SequenceMismatch
#![warn(missing_docs)]
#![warn(unreachable_pub)]

#[macro_use] mod macros;
pub mod layer;
pub mod nic;
pub mod storage;
pub mod time;
pub mod wire;
