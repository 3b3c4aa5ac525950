//! Wall-clock source for the IRRMS time window.
//!
//! - `SystemClock`: local time of the host
//! - `FixedClock`: always returns the same instant, for tests

use chrono::{Local, NaiveDateTime};

pub trait Clock: Send + Sync + 'static {
    /// Current local date and time, without zone information.
    fn now(&self) -> NaiveDateTime;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}
