/*! Time structures.

 - [Instant] is used to represent absolute time.
 - [Duration] is used to represet relative time.
 - [Clock] is the capability of reading the current time. Nothing in this crate reads a global
   clock; devices and the poll loop are handed one explicitly.

[Instant]: struct.Instant.html
[Duration]: struct.Duration.html
[Clock]: trait.Clock.html
*/
use core::cell::Cell;
use core::{fmt, ops};
pub use core::time::Duration;

/// A representation of an absolute time value.
///
/// The `Instant` type is a wrapper around a `i64` value that represents a number of milliseconds,
/// monotonically increasing since an arbitrary moment in time, such as system startup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Instant {
    /// Milliseconds since the clock's epoch.
    pub millis: i64,
}

impl Instant {
    /// Create a new `Instant` from a number of milliseconds.
    pub fn from_millis<T: Into<i64>>(millis: T) -> Instant {
        Instant { millis: millis.into() }
    }

    /// Create a new `Instant` from a number of seconds.
    pub fn from_secs<T: Into<i64>>(secs: T) -> Instant {
        Instant { millis: secs.into() * 1000 }
    }

    /// The fractional number of milliseconds that have passed since the beginning of time.
    pub fn millis(&self) -> i64 {
        self.millis % 1000
    }

    /// The number of whole seconds that have passed since the beginning of time.
    pub fn secs(&self) -> i64 {
        self.millis / 1000
    }

    /// The total number of milliseconds that have passed since the beginning of time.
    pub fn total_millis(&self) -> i64 {
        self.millis
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}s", self.secs(), self.millis())
    }
}

impl ops::Add<Duration> for Instant {
    type Output = Instant;

    fn add(self, rhs: Duration) -> Instant {
        Instant::from_millis(self.millis + rhs.as_millis() as i64)
    }
}

impl ops::AddAssign<Duration> for Instant {
    fn add_assign(&mut self, rhs: Duration) {
        self.millis += rhs.as_millis() as i64;
    }
}

impl ops::Sub<Instant> for Instant {
    type Output = Duration;

    /// The elapsed time, saturating at zero when `rhs` is later.
    fn sub(self, rhs: Instant) -> Duration {
        Duration::from_millis(self.millis.saturating_sub(rhs.millis).max(0) as u64)
    }
}

/// A source of the current time.
pub trait Clock {
    /// Read the current time.
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for &'_ C {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// The monotonic operating system clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: std::time::Instant,
}

impl SystemClock {
    /// Start a clock whose epoch is the moment of construction.
    pub fn new() -> Self {
        SystemClock { start: std::time::Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        let elapsed = self.start.elapsed();
        Instant::from_millis(elapsed.as_millis() as i64)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<Instant>,
}

impl ManualClock {
    /// Create a clock standing at `start`.
    pub fn new(start: Instant) -> Self {
        ManualClock { now: Cell::new(start) }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Set the clock to an absolute time.
    pub fn set(&self, instant: Instant) {
        self.now.set(instant);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}
