//! Encapsulates a network interface card.
//!
//! The stack talks to a device through two capabilities. A [`PacketSource`] is polled for at most
//! one received frame at a time and never blocks. A [`PacketSink`] lends out a transmit buffer,
//! takes the filled prefix of it as a frame and sends everything queued on `flush`.
//!
//! Both are usually implemented by the same device type. The TCP client owns a sink while the
//! poll loop owns the source, so devices provide a way to obtain an additional sending handle.
//!
//! [`PacketSource`]: trait.PacketSource.html
//! [`PacketSink`]: trait.PacketSink.html
pub mod external;

#[cfg(all(feature = "std", target_os = "linux"))]
#[path = "sys/mod.rs"]
mod sys_internal;

#[cfg(all(feature = "std", target_os = "linux"))]
pub use self::sys_internal::exports as sys;

pub use crate::layer::{Error, Result};
use crate::time::Instant;

/// One received Ethernet frame.
///
/// The bytes are borrowed from the device until the next call to `receive`.
#[derive(Debug)]
pub struct RawFrame<'a> {
    /// The frame, starting with the Ethernet header.
    pub bytes: &'a mut [u8],
    /// The time the frame was taken from the device.
    pub timestamp: Instant,
}

/// A non-blocking frame receiver.
pub trait PacketSource {
    /// Poll for the next frame.
    ///
    /// Returns `Ok(None)` immediately when no frame is pending.
    fn receive(&mut self) -> Result<Option<RawFrame<'_>>>;
}

/// A frame transmitter with batched sends.
pub trait PacketSink {
    /// The largest frame that fits into a send buffer.
    fn capacity(&self) -> usize;

    /// Get a buffer of `capacity()` bytes for the next frame.
    ///
    /// Repeated calls without `send_raw` in between return the same buffer. Buffer contents are
    /// unspecified.
    fn get_send_buffer(&mut self) -> Result<&mut [u8]>;

    /// Queue the first `len` bytes of the current send buffer as a frame.
    fn send_raw(&mut self, len: usize) -> Result<()>;

    /// Transmit all queued frames.
    fn flush(&mut self) -> Result<()>;
}

impl<S: PacketSource + ?Sized> PacketSource for &'_ mut S {
    fn receive(&mut self) -> Result<Option<RawFrame<'_>>> {
        (**self).receive()
    }
}

impl<S: PacketSink + ?Sized> PacketSink for &'_ mut S {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn get_send_buffer(&mut self) -> Result<&mut [u8]> {
        (**self).get_send_buffer()
    }

    fn send_raw(&mut self, len: usize) -> Result<()> {
        (**self).send_raw(len)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

impl<S: PacketSink + ?Sized> PacketSink for Box<S> {
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn get_send_buffer(&mut self) -> Result<&mut [u8]> {
        (**self).get_send_buffer()
    }

    fn send_raw(&mut self, len: usize) -> Result<()> {
        (**self).send_raw(len)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }
}

/// Build a frame in the next send buffer and queue it.
///
/// The closure returns the number of bytes it filled, or `None` to abandon the buffer.
pub fn send_with<S, F>(sink: &mut S, fill: F) -> Result<bool>
where
    S: PacketSink + ?Sized,
    F: FnOnce(&mut [u8]) -> Result<Option<usize>>,
{
    let buffer = sink.get_send_buffer()?;
    match fill(buffer)? {
        Some(len) => {
            sink.send_raw(len)?;
            Ok(true)
        },
        None => Ok(false),
    }
}
