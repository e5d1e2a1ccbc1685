//! A liveness guard for blocking startup calls.
//!
//! Opening an interface may hang on a misconfigured host. There is no way to cancel such a call,
//! so the operation runs on its own thread and the caller stops waiting after a deadline. The
//! thread is left behind; the expected reaction is to exit the process.
use std::fmt;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Error {
    /// The operation did not finish within the deadline.
    TimedOut(Duration),
    /// The operation panicked.
    Panicked,
}

/// Run `op` on a side thread and wait at most `timeout` for its result.
pub fn run_with_timeout<T, F>(timeout: Duration, op: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (send, recv) = mpsc::channel();
    thread::spawn(move || {
        // The receiver is gone after a timeout.
        let _ = send.send(op());
    });

    match recv.recv_timeout(timeout) {
        Ok(value) => Ok(value),
        Err(RecvTimeoutError::Timeout) => Err(Error::TimedOut(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(Error::Panicked),
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::TimedOut(after) => write!(f, "operation timed out after {:?}", after),
            Error::Panicked => write!(f, "operation panicked"),
        }
    }
}

impl std::error::Error for Error {}
