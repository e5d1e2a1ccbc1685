// Copyright (C) 2016 whitequark@whitequark.org
// Copyright (C) 2019 Andreas Molzer <andreas.molzer@tum.de>
//
// in large parts from `smoltcp` originally distributed under 0-clause BSD
use super::{ifreq, Errno, LibcResult, IoctlResult};

pub(crate) const ETH_P_ALL: libc::c_short = 0x0003;

const SIOCGIFMTU: libc::Ioctl = 0x8921;
const SIOCGIFINDEX: libc::Ioctl = 0x8933;

impl ifreq {
    /// The interface MTU.
    pub(crate) fn mtu(&self, fd: libc::c_int) -> Result<libc::c_int, Errno> {
        self.query_int(fd, SIOCGIFMTU)
    }

    /// The interface index, for binding a packet socket.
    pub(crate) fn index(&self, fd: libc::c_int) -> Result<libc::c_int, Errno> {
        self.query_int(fd, SIOCGIFINDEX)
    }

    /// Issue a request whose answer is a single integer following the name.
    fn query_int(&self, fd: libc::c_int, request: libc::Ioctl) -> Result<libc::c_int, Errno> {
        #[repr(C)]
        struct Request {
            interface: ifreq,
            value: libc::c_int,
        }

        let mut request_data = Request {
            interface: *self,
            value: 0,
        };

        let res = unsafe {
            libc::ioctl(fd, request, &mut request_data as *mut _)
        };

        IoctlResult(res).errno()?;

        Ok(request_data.value)
    }
}
