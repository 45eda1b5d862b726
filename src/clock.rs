//! Sources of the current time and local time zone for history entries.

use std::cell::Cell;

use time::{Duration, OffsetDateTime, UtcOffset};

use crate::{
    Error,
    timezone::{Zone, ZoneDescriptor},
};

/// An instant in UTC and the zone that was in effect on the host at that instant.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedTime {
    /// The instant, always with a UTC offset.
    pub utc: OffsetDateTime,
    /// The local time zone at `utc`.
    pub zone: ZoneDescriptor,
}

/// Provides the time stamp for each deposit and withdrawal.
pub trait Clock {
    /// Capture the current instant and local time zone.
    fn now(&self) -> CapturedTime;

    /// The local time zone used for new history entries.
    fn zone(&self) -> Zone;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now(&self) -> CapturedTime {
        (**self).now()
    }

    fn zone(&self) -> Zone {
        (**self).zone()
    }
}

/// The system clock paired with a configured local time zone.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    zone: Zone,
}

impl SystemClock {
    /// Create a system clock for a canonical time zone name, e.g. "Pacific/Auckland".
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezoneError] if the name is not in the time
    /// zone database.
    pub fn new(canonical_timezone: &str) -> Result<Self, Error> {
        Zone::named(canonical_timezone).map(Self::with_zone)
    }

    /// Create a system clock in the host's local time zone.
    ///
    /// The host only reports its current UTC offset, so the zone is a fixed
    /// offset read once when the clock is created.
    ///
    /// # Errors
    /// Returns [Error::IndeterminateLocalOffset] if the offset cannot be read.
    pub fn local() -> Result<Self, Error> {
        Zone::local().map(Self::with_zone)
    }

    /// Create a system clock with an already resolved zone.
    pub fn with_zone(zone: Zone) -> Self {
        Self { zone }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> CapturedTime {
        let utc = OffsetDateTime::now_utc();

        CapturedTime {
            zone: ZoneDescriptor::capture(&self.zone, &utc),
            utc,
        }
    }

    fn zone(&self) -> Zone {
        self.zone
    }
}

/// A clock that only moves when told to.
///
/// Useful for tests and for reproducing a sequence of transactions.
#[derive(Debug)]
pub struct FixedClock {
    instant: Cell<OffsetDateTime>,
    zone: Zone,
}

impl FixedClock {
    /// Create a clock stopped at `instant` in `zone`.
    pub fn new(instant: OffsetDateTime, zone: Zone) -> Self {
        Self {
            instant: Cell::new(instant.to_offset(UtcOffset::UTC)),
            zone,
        }
    }

    /// Move the clock to `instant`.
    pub fn set(&self, instant: OffsetDateTime) {
        self.instant.set(instant.to_offset(UtcOffset::UTC));
    }

    /// Move the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        self.instant.set(self.instant.get() + duration);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> CapturedTime {
        let utc = self.instant.get();

        CapturedTime {
            zone: ZoneDescriptor::capture(&self.zone, &utc),
            utc,
        }
    }

    fn zone(&self) -> Zone {
        self.zone
    }
}
