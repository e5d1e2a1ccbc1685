// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
use core::mem;
use std::os::unix::io::{AsRawFd, RawFd};

use super::{ifreq, linux, Errno, FdResult, LibcResult, IoLenResult};

use crate::nic::{Error, PacketSink, PacketSource, RawFrame, Result};
use crate::time::{Clock, SystemClock};

/// A static descriptor for interacting with a raw socket.
///
/// Contains the file descriptor and a pre-filled `ifreq` structure with the interface name that is
/// required for `ioctl` calls. This offers the raw methods for reading and writing but does not
/// encapsulate a device. Wrap it in a [`RawSocket`] with buffers for this.
///
/// [`RawSocket`]: struct.RawSocket.html
#[derive(Debug)]
pub struct RawSocketDesc {
    lower: libc::c_int,
    ifreq: ifreq,
}

/// An `AF_PACKET` socket usable as a packet source and sink.
///
/// Receiving never blocks. Sent frames are kept in a small ring of transmit buffers until `flush`
/// or until the ring is full, at which point the queued frames are written out first.
///
/// Uses the errno principle for storing the last underlying error on a failed operation; the
/// trait methods themselves only report `Error::Device`.
#[derive(Debug)]
pub struct RawSocket<K = SystemClock> {
    inner: RawSocketDesc,
    clock: K,
    mtu: usize,
    rx: Vec<u8>,
    tx: Vec<Vec<u8>>,
    /// Length of each queued frame, in ring order.
    queued: Vec<usize>,
    last_err: Option<Errno>,
}

/// The number of frames queued before an implicit flush.
const TX_SLOTS: usize = 16;

impl AsRawFd for RawSocketDesc {
    fn as_raw_fd(&self) -> RawFd {
        self.lower
    }
}

impl<K> AsRawFd for RawSocket<K> {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl RawSocketDesc {
    /// Try to open a non-blocking socket for the named interface.
    ///
    /// Note that this does *not* yet bind the interface to the socket, it only creates the
    /// necessary structures involved in doing so. Call [`bind_interface`] afterwards.
    ///
    /// [`bind_interface`]: #method.bind_interface
    pub fn new(name: &str) -> core::result::Result<RawSocketDesc, Errno> {
        let lower = unsafe {
            libc::socket(
                libc::AF_PACKET,
                libc::SOCK_RAW | libc::SOCK_NONBLOCK,
                linux::ETH_P_ALL.to_be() as i32)
        };

        FdResult(lower).errno()?;

        Ok(RawSocketDesc {
            lower,
            ifreq: ifreq::new(name),
        })
    }

    /// Duplicate the descriptor, for an additional sending handle.
    pub fn try_clone(&self) -> core::result::Result<RawSocketDesc, Errno> {
        let lower = unsafe { libc::dup(self.lower) };
        FdResult(lower).errno()?;
        Ok(RawSocketDesc {
            lower,
            ifreq: self.ifreq,
        })
    }

    /// Query the interface MTU, as reported by the OS.
    pub fn interface_mtu(&self) -> core::result::Result<usize, Errno> {
        self.ifreq.mtu(self.lower)
            .map(|mtu| mtu as usize)
    }

    /// Bind the file descriptor to the named interface.
    ///
    /// See `bind` with `AF_PACKET` and `ETH_P_ALL` for error and a discussion of platform
    /// requirements and checks.
    pub fn bind_interface(&mut self) -> core::result::Result<(), Errno> {
        let sockaddr = libc::sockaddr_ll {
            sll_family:   libc::AF_PACKET as u16,
            sll_protocol: linux::ETH_P_ALL.to_be() as u16,
            sll_ifindex:  self.ifreq.index(self.lower)?,
            sll_hatype:   1,
            sll_pkttype:  0,
            sll_halen:    6,
            sll_addr:     [0; 8],
        };

        let res = unsafe {
            libc::bind(
                self.lower,
                &sockaddr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as u32)
        };

        FdResult(res).errno()
    }

    /// Receive a single frame into the buffer.
    ///
    /// The socket is non-blocking, an empty queue is reported as an `Errno` for which
    /// `would_block` holds.
    pub fn recv(&mut self, buffer: &mut [u8]) -> core::result::Result<usize, Errno> {
        let len = unsafe {
            libc::recv(
                self.lower,
                buffer.as_mut_ptr() as *mut libc::c_void,
                buffer.len(),
                0)
        };
        IoLenResult(len).errno()?;
        Ok(len as usize)
    }

    /// Send a single frame from a buffer.
    pub fn send(&mut self, buffer: &[u8]) -> core::result::Result<usize, Errno> {
        let len = unsafe {
            libc::send(
                self.lower,
                buffer.as_ptr() as *const libc::c_void,
                buffer.len(),
                0)
        };
        IoLenResult(len).errno()?;
        Ok(len as usize)
    }
}

impl RawSocket {
    /// Open and bind a raw socket on the named interface.
    ///
    /// Frames are sized by the interface MTU plus the Ethernet header.
    pub fn new(name: &str) -> core::result::Result<Self, Errno> {
        let mut inner = RawSocketDesc::new(name)?;
        inner.bind_interface()?;
        let mtu = inner.interface_mtu()? + crate::wire::ethernet_frame::header_len();
        Ok(Self::with_descriptor(inner, mtu, SystemClock::new()))
    }
}

impl<K: Clock> RawSocket<K> {
    /// Wrap an existing descriptor into a device.
    ///
    /// The socket needs to already be bound to the interface otherwise errors to all calls will be
    /// the consequence.
    pub fn with_descriptor(inner: RawSocketDesc, mtu: usize, clock: K) -> Self {
        RawSocket {
            inner,
            clock,
            mtu,
            rx: vec![0; mtu],
            tx: (0..TX_SLOTS).map(|_| vec![0; mtu]).collect(),
            queued: Vec::with_capacity(TX_SLOTS),
            last_err: None,
        }
    }

    /// Another device on a duplicate of the descriptor, with its own buffers.
    pub fn try_clone_with(&self, clock: K) -> core::result::Result<Self, Errno> {
        let inner = self.inner.try_clone()?;
        Ok(Self::with_descriptor(inner, self.mtu, clock))
    }

    /// Take the last io error returned by the OS.
    pub fn last_err(&mut self) -> Option<Errno> {
        self.last_err.take()
    }

    fn store_err(&mut self, err: Errno) -> Error {
        self.last_err = Some(err);
        Error::Device
    }
}

impl<K: Clock + Clone> RawSocket<K> {
    /// Another device on a duplicate of the descriptor, sharing the clock.
    pub fn try_clone(&self) -> core::result::Result<Self, Errno> {
        self.try_clone_with(self.clock.clone())
    }
}

impl<K: Clock> PacketSource for RawSocket<K> {
    fn receive(&mut self) -> Result<Option<RawFrame<'_>>> {
        match self.inner.recv(&mut self.rx) {
            Ok(len) => {
                let timestamp = self.clock.now();
                Ok(Some(RawFrame {
                    bytes: &mut self.rx[..len],
                    timestamp,
                }))
            },
            Err(ref err) if err.would_block() => Ok(None),
            Err(err) => Err(self.store_err(err)),
        }
    }
}

impl<K: Clock> PacketSink for RawSocket<K> {
    fn capacity(&self) -> usize {
        self.mtu
    }

    fn get_send_buffer(&mut self) -> Result<&mut [u8]> {
        if self.queued.len() == TX_SLOTS {
            self.flush()?;
        }
        let slot = self.queued.len();
        Ok(&mut self.tx[slot])
    }

    fn send_raw(&mut self, len: usize) -> Result<()> {
        if len > self.mtu {
            return Err(Error::Exhausted);
        }
        if self.queued.len() == TX_SLOTS {
            self.flush()?;
        }
        self.queued.push(len);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let queued = mem::replace(&mut self.queued, Vec::with_capacity(TX_SLOTS));
        for (slot, len) in queued.into_iter().enumerate() {
            if let Err(err) = self.inner.send(&self.tx[slot][..len]) {
                return Err(self.store_err(err));
            }
        }
        Ok(())
    }
}

impl Drop for RawSocketDesc {
    fn drop(&mut self) {
        unsafe { libc::close(self.lower); }
    }
}
