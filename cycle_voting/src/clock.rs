use chrono::{DateTime, Utc};

/// The source of the current time. Nothing in this crate reads the wall
/// clock except through this trait.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock stuck at a given instant.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}
