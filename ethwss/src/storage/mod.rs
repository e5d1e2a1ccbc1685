//! Byte storage shared by the stateful layers.
//!
//! Each connection layer reassembles its input in a [`Stream`], a ring buffer with a read and a
//! write cursor. Parsers that need several steps to decode one unit open a [`ReadTransaction`]
//! and only commit once every step had enough data, so that a partial unit stays buffered for
//! the next poll.
//!
//! [`Stream`]: struct.Stream.html
//! [`ReadTransaction`]: struct.ReadTransaction.html
mod stream;

pub use self::stream::{BufferFull, ReadTransaction, Stream};
