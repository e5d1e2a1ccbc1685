use core::borrow::{Borrow, BorrowMut};
use core::fmt;

/// A byte ring buffer with a read and a write cursor.
///
/// Bytes are appended at the write cursor and consumed at the read cursor. The cursors satisfy
/// `read <= write <= capacity` and both return to zero whenever the buffer runs empty, so a
/// drained stream offers its full capacity again without moving any data. When the tail has no
/// room left, the unread bytes are shifted to the front.
///
/// The storage is any byte container, by default a heap allocated vector.
///
/// ```
/// # use ethwss::storage::Stream;
/// let mut stream = Stream::with_capacity(8);
/// stream.push_bytes(b"abcd").unwrap();
/// assert_eq!(stream.pop(2), Some(&b"ab"[..]));
/// assert_eq!(stream.peek(2), Some(&b"cd"[..]));
/// assert_eq!(stream.pop(3), None);
/// ```
#[derive(Clone)]
pub struct Stream<C = Vec<u8>> {
    buffer: C,
    read: usize,
    write: usize,
}

/// A push did not fit into the free space of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferFull {
    /// The number of bytes that should have been stored.
    pub requested: usize,
    /// The number of bytes that were free.
    pub available: usize,
}

/// A speculative read of a stream.
///
/// Pops only move a private cursor. The stream itself is advanced by `commit`; dropping the
/// transaction instead leaves the stream as it was.
pub struct ReadTransaction<'a> {
    data: &'a [u8],
    consumed: usize,
    read: &'a mut usize,
    write: &'a mut usize,
}

impl Stream {
    /// Create a zeroed stream able to hold `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Stream::new(vec![0; capacity])
    }
}

impl<C: Borrow<[u8]>> Stream<C> {
    /// Use a container as storage, initially empty.
    pub fn new(buffer: C) -> Self {
        Stream { buffer, read: 0, write: 0 }
    }

    /// The number of unread bytes.
    pub fn len(&self) -> usize {
        self.write - self.read
    }

    /// Whether no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.read == self.write
    }

    /// The total number of bytes the stream can hold.
    pub fn capacity(&self) -> usize {
        self.buffer.borrow().len()
    }

    /// The number of bytes that can be pushed before the stream is full.
    pub fn free(&self) -> usize {
        self.capacity() - self.len()
    }

    /// All unread bytes.
    pub fn unread(&self) -> &[u8] {
        &self.buffer.borrow()[self.read..self.write]
    }

    /// The next `len` unread bytes, without consuming them.
    pub fn peek(&self, len: usize) -> Option<&[u8]> {
        self.unread().get(..len)
    }

    /// Consume the next `len` bytes.
    ///
    /// Returns `None` and consumes nothing if fewer bytes are buffered.
    pub fn pop(&mut self, len: usize) -> Option<&[u8]> {
        let start = self.advance(len)?;
        Some(&self.buffer.borrow()[start..start + len])
    }

    /// Find the first occurrence of `needle` in the unread bytes.
    ///
    /// The position is relative to the read cursor.
    pub fn search(&self, needle: &[u8]) -> Option<usize> {
        if needle.is_empty() {
            return Some(0);
        }
        self.unread()
            .windows(needle.len())
            .position(|window| window == needle)
    }

    /// Begin a speculative read.
    pub fn read_transaction(&mut self) -> ReadTransaction<'_> {
        let Stream { buffer, read, write } = self;
        let buffer: &[u8] = <C as Borrow<[u8]>>::borrow(buffer);
        ReadTransaction {
            data: &buffer[*read..*write],
            consumed: 0,
            read,
            write,
        }
    }

    /// Discard everything that is buffered.
    pub fn clear(&mut self) {
        self.read = 0;
        self.write = 0;
    }

    /// Move the read cursor, returning its previous value.
    fn advance(&mut self, len: usize) -> Option<usize> {
        if len > self.len() {
            return None;
        }
        let start = self.read;
        self.read += len;
        if self.read == self.write {
            self.clear();
        }
        Some(start)
    }
}

impl<C: BorrowMut<[u8]>> Stream<C> {
    /// Consume the next `len` bytes for in-place modification.
    pub fn pop_mut(&mut self, len: usize) -> Option<&mut [u8]> {
        let start = self.advance(len)?;
        Some(&mut self.buffer.borrow_mut()[start..start + len])
    }

    /// All unread bytes, for in-place modification.
    pub fn unread_mut(&mut self) -> &mut [u8] {
        &mut self.buffer.borrow_mut()[self.read..self.write]
    }

    /// Move the unread bytes to the start of the buffer.
    pub fn shift(&mut self) {
        if self.read == 0 {
            return;
        }
        let (read, write) = (self.read, self.write);
        self.buffer.borrow_mut().copy_within(read..write, 0);
        self.read = 0;
        self.write = write - read;
    }

    /// Append bytes at the write cursor.
    ///
    /// Either all bytes are stored or none are.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), BufferFull> {
        let slot = self.reserve(bytes.len())?;
        slot.copy_from_slice(bytes);
        Ok(())
    }

    /// Append `len` bytes and return them for writing.
    ///
    /// The bytes keep whatever content the buffer had before.
    pub fn reserve(&mut self, len: usize) -> Result<&mut [u8], BufferFull> {
        if len > self.free() {
            return Err(BufferFull { requested: len, available: self.free() });
        }
        if self.write + len > self.capacity() {
            self.shift();
        }
        let start = self.write;
        self.write += len;
        Ok(&mut self.buffer.borrow_mut()[start..start + len])
    }
}

impl<C: Borrow<[u8]>> fmt::Debug for Stream<C> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Stream")
            .field("read", &self.read)
            .field("write", &self.write)
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl<'a> ReadTransaction<'a> {
    /// The next `len` bytes after everything popped so far.
    pub fn peek(&self, len: usize) -> Option<&'a [u8]> {
        self.remaining_bytes().get(..len)
    }

    /// Tentatively consume `len` bytes.
    pub fn pop(&mut self, len: usize) -> Option<&'a [u8]> {
        let bytes = self.peek(len)?;
        self.consumed += len;
        Some(bytes)
    }

    /// The number of bytes not yet popped in this transaction.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.consumed
    }

    /// The number of bytes popped so far.
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Advance the stream past everything popped and return those bytes.
    pub fn commit(self) -> &'a [u8] {
        *self.read += self.consumed;
        if *self.read == *self.write {
            *self.read = 0;
            *self.write = 0;
        }
        &self.data[..self.consumed]
    }

    fn remaining_bytes(&self) -> &'a [u8] {
        &self.data[self.consumed..]
    }
}

impl fmt::Display for BufferFull {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "buffer full, {} bytes requested but {} available", self.requested, self.available)
    }
}

impl std::error::Error for BufferFull {}
