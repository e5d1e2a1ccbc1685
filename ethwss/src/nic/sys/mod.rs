#![allow(unsafe_code)]
// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
//
// Applies to files in this folder unless otherwise noted.
use core::fmt;
use std::io;

mod linux;
mod raw_socket;

/// Module importing all types that should be exported.
///
/// Allows keeping all the `cfg` bits inside this module by enabling a controlled glob import from
/// the super module.
pub mod exports {
    pub use super::raw_socket::{RawSocket, RawSocketDesc};
    pub use super::Errno;
}

/// An errno value.
///
/// This is used as the error representation of raw libc calls. It can be converted into a
/// `std::io::Error`, where it will consequently have much more extensive error information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Errno(pub libc::c_int);

#[derive(Clone, Copy)]
struct FdResult(pub libc::c_int);

#[derive(Clone, Copy)]
struct IoLenResult(pub libc::ssize_t);

type IoctlResult = FdResult;
#[allow(non_snake_case)] // Emulate type alias also importing constructor.
fn IoctlResult(val: libc::c_int) -> IoctlResult { FdResult(val) }

/// Base for an if ioctl request.
///
/// Contains the name of the interface.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
struct ifreq {
    ifr_name: [libc::c_char; libc::IF_NAMESIZE],
}

/// Trait for interpreting integer return values.
///
/// Failure is signalled by `-1` for all calls used here.
trait LibcResult: Copy {
    fn is_fail(self) -> bool;

    fn errno(self) -> Result<(), Errno> {
        if self.is_fail() {
            Err(Errno::last())
        } else {
            Ok(())
        }
    }
}

impl Errno {
    /// The errno of the last failed call on this thread.
    pub fn last() -> Errno {
        Errno(unsafe { *libc::__errno_location() })
    }

    /// Whether the call failed only because it would have blocked.
    pub fn would_block(&self) -> bool {
        self.0 == libc::EWOULDBLOCK || self.0 == libc::EAGAIN
    }
}

impl LibcResult for FdResult {
    fn is_fail(self) -> bool {
        self.0 == -1
    }
}

impl LibcResult for IoLenResult {
    fn is_fail(self) -> bool {
        self.0 == -1
    }
}

impl From<Errno> for io::Error {
    fn from(err: Errno) -> io::Error {
        io::Error::from_raw_os_error(err.0 as i32)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        fmt::Display::fmt(&io::Error::from(*self), f)
    }
}

impl std::error::Error for Errno {}

impl ifreq {
    /// Prepare a request for the named interface.
    ///
    /// Names longer than the kernel limit are cut so that a terminating zero always remains.
    fn new(name: &str) -> Self {
        let mut ifr_name = [0; libc::IF_NAMESIZE];

        for (slot, byte) in ifr_name.iter_mut().zip(name.as_bytes()).take(libc::IF_NAMESIZE - 1) {
            *slot = *byte as libc::c_char
        }

        ifreq {
            ifr_name,
        }
    }
}
