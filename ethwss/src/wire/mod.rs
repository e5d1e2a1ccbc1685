/*! Low-level packet access and construction.

# An overview over packet representations

The `wire` module deals with the packet *representation*. It provides two levels of
functionality.

 * First, it provides functions to extract fields from sequences of octets, and to insert fields
   into sequences of octets. This happens in the lowercase structures e.g. [`ethernet`] or
   [`tcp`]. These are dynamically sized wrappers around a byte slice, so the caller keeps
   ownership of the memory, which usually belongs to a device buffer or a ring buffer.
 * Second, it provides a compact, high-level representation of header data that can be created
   from parsing and emitted into a sequence of octets. This happens through the `Repr` family of
   structs and enums, e.g. [`ArpRepr`] or [`Ipv4Repr`].

[`ethernet`]: ethernet/struct.ethernet.html
[`tcp`]: tcp/struct.tcp.html
[`ArpRepr`]: enum.ArpRepr.html
[`Ipv4Repr`]: struct.Ipv4Repr.html

The byte wrappers guarantee that, if `check_len()` returned `Ok(())`, then no field accessor or
setter method will panic. The `new_checked` constructors combine `new_unchecked` with
`check_len`; when parsing untrusted input it is *necessary* to use them. When emitting output it
is *incorrect* to use `new_checked`, a zeroed buffer may pass while a reused one does not.

In the `Repr` family, `parse()` never panics and `emit()` never panics as long as the
underlying buffer is at least `buffer_len()` octets long.

The TLS and WebSocket formats are byte streams rather than packets. Their codecs parse from a
slice that may hold only part of a message and report `Error::Truncated` until enough bytes have
been buffered.

# Examples

To emit an IP packet header into an octet buffer, and then parse it back:

```rust
use ethwss::wire::*;
let repr = Ipv4Repr {
    src_addr:    Ipv4Address::new(10, 0, 0, 1),
    dst_addr:    Ipv4Address::new(10, 0, 0, 2),
    protocol:    IpProtocol::Tcp,
    payload_len: 10,
    hop_limit:   64,
    ident:       0,
};
let mut buffer = vec![0; repr.buffer_len() + repr.payload_len];
{ // emission
    let packet = ipv4_packet::new_unchecked_mut(&mut buffer);
    repr.emit(packet, Checksum::Manual);
}
{ // parsing
    let packet = ipv4_packet::new_checked(&buffer)
        .expect("truncated packet");
    let parsed = Ipv4Repr::parse(packet, Checksum::Manual)
        .expect("malformed packet");
    assert_eq!(repr, parsed);
}
```
*/
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted. These are:
// * `arp.rs`
// * `error.rs`
// * `ethernet.rs`
// * `ipv4.rs`
// * `mod.rs` (this file)
// * `tcp.rs`

mod field {
    pub(crate) type Field = ::core::ops::Range<usize>;
    pub(crate) type Rest  = ::core::ops::RangeFrom<usize>;
}

pub mod arp;
pub mod endian;
mod error;
pub mod ethernet;
pub mod ipv4;
pub mod tcp;
pub mod tls;
pub mod websocket;

/// Describes how to handle checksums.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Checksum {
    /// Checksum must be computed or checked manually.
    Manual,

    /// The checksum field is filled or checked by the NIC.
    Ignored,
}

impl Checksum {
    /// Whether the checksum is handled in software.
    pub fn manual(self) -> bool {
        self == Checksum::Manual
    }
}

pub use self::error::{
    Error,
    Result};

pub use self::endian::{Be, U24};

pub use self::ethernet::{
    ethernet as ethernet_frame,
    EtherType as EthernetProtocol,
    Address as EthernetAddress,
    Repr as EthernetRepr};

pub use self::arp::{
    arp as arp_packet,
    Operation as ArpOperation,
    Repr as ArpRepr};

pub use self::ipv4::{
    ipv4 as ipv4_packet,
    Address as Ipv4Address,
    Protocol as IpProtocol,
    Repr as Ipv4Repr};

pub use self::tcp::{
    tcp as tcp_packet,
    Flags as TcpFlags,
    Repr as TcpRepr,
    SeqNumber as TcpSeqNumber,
    TcpOption};
