//! A scripted in-memory device.
//!
//! Frames to be received are queued by the test or driver, frames sent by the stack are captured
//! once flushed. Several handles can share one device so that the poll loop and the TCP client
//! each own one.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::time::{Clock, Instant, ManualClock};
use super::{Error, PacketSink, PacketSource, RawFrame, Result};

/// A handle to an in-memory device.
pub struct External {
    shared: Rc<RefCell<Shared>>,
    clock: Rc<dyn Clock>,
    /// The frame lent out by the last `receive`.
    current: Vec<u8>,
    send_buffer: Vec<u8>,
    queued: Vec<Vec<u8>>,
}

#[derive(Default)]
struct Shared {
    pending: VecDeque<Vec<u8>>,
    sent: Vec<Vec<u8>>,
    broken: bool,
}

impl External {
    /// A device for frames of up to `mtu` bytes, with a clock standing at zero.
    pub fn new(mtu: usize) -> Self {
        External::with_clock(mtu, Rc::new(ManualClock::new(Instant::from_millis(0))))
    }

    /// A device stamping received frames with the given clock.
    pub fn with_clock(mtu: usize, clock: Rc<dyn Clock>) -> Self {
        External {
            shared: Rc::new(RefCell::new(Shared::default())),
            clock,
            current: Vec::new(),
            send_buffer: vec![0; mtu],
            queued: Vec::new(),
        }
    }

    /// Another handle to the same device.
    ///
    /// Frames queued but not flushed on this handle are not shared.
    pub fn handle(&self) -> Self {
        External {
            shared: self.shared.clone(),
            clock: self.clock.clone(),
            current: Vec::new(),
            send_buffer: vec![0; self.send_buffer.len()],
            queued: Vec::new(),
        }
    }

    /// Queue a frame to be returned by `receive`.
    pub fn push_frame(&self, frame: impl Into<Vec<u8>>) {
        self.shared.borrow_mut().pending.push_back(frame.into());
    }

    /// The number of frames not yet received.
    pub fn pending(&self) -> usize {
        self.shared.borrow().pending.len()
    }

    /// Remove and return all frames that were flushed so far, in order.
    pub fn take_sent(&self) -> Vec<Vec<u8>> {
        core::mem::replace(&mut self.shared.borrow_mut().sent, Vec::new())
    }

    /// Make every following device operation fail.
    pub fn break_device(&self) {
        self.shared.borrow_mut().broken = true;
    }

    fn check(&self) -> Result<()> {
        if self.shared.borrow().broken {
            Err(Error::Device)
        } else {
            Ok(())
        }
    }
}

impl PacketSource for External {
    fn receive(&mut self) -> Result<Option<RawFrame<'_>>> {
        self.check()?;
        let next = self.shared.borrow_mut().pending.pop_front();
        match next {
            None => Ok(None),
            Some(frame) => {
                self.current = frame;
                Ok(Some(RawFrame {
                    bytes: &mut self.current,
                    timestamp: self.clock.now(),
                }))
            },
        }
    }
}

impl PacketSink for External {
    fn capacity(&self) -> usize {
        self.send_buffer.len()
    }

    fn get_send_buffer(&mut self) -> Result<&mut [u8]> {
        self.check()?;
        Ok(&mut self.send_buffer)
    }

    fn send_raw(&mut self, len: usize) -> Result<()> {
        self.check()?;
        let frame = self.send_buffer.get(..len).ok_or(Error::Exhausted)?;
        self.queued.push(frame.to_vec());
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.check()?;
        let queued = core::mem::replace(&mut self.queued, Vec::new());
        self.shared.borrow_mut().sent.extend(queued);
        Ok(())
    }
}
