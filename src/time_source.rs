//! Clocks used to decide when credentials need refreshing.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use time::OffsetDateTime;

/// Source of "now" for expiry decisions.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

impl<F> TimeSource for F
where
    F: Fn() -> OffsetDateTime + Send + Sync,
{
    fn now(&self) -> OffsetDateTime {
        self()
    }
}

/// Shared, type-erased time source.
pub type SharedTimeSource = Arc<dyn TimeSource>;

/// Wall clock in UTC.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualTimeSource {
    now: Arc<Mutex<OffsetDateTime>>,
}

impl ManualTimeSource {
    pub fn new(now: OffsetDateTime) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: OffsetDateTime) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: time::Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> OffsetDateTime {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for ManualTimeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ManualTimeSource").field(&self.now()).finish()
    }
}

pub(crate) fn system() -> SharedTimeSource {
    Arc::new(SystemTimeSource)
}
