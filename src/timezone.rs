//! Time zone lookup and the zone descriptors stored alongside history entries.
//!
//! A [ZoneDescriptor] records which zone was in effect when a mutation was
//! written and the offset and abbreviation at that instant. It is stored as
//! JSON text so it survives process restarts and can be turned back into a
//! [Zone] that computes offsets for arbitrary instants.

use std::fmt::{Debug, Display};

use serde::{Deserialize, Serialize};
use time::{OffsetDateTime, UtcOffset};
use time_tz::{Offset, TimeZone, Tz};

use crate::Error;

/// Get the time zone for a canonical time zone name, e.g. "Pacific/Auckland".
pub fn get_timezone(canonical_timezone: &str) -> Option<&'static Tz> {
    time_tz::timezones::get_by_name(canonical_timezone)
}

/// A time zone that can compute its UTC offset at any instant.
#[derive(Clone, Copy)]
pub enum Zone {
    /// A zone from the IANA database. The offset follows the zone's daylight
    /// saving rules, so it depends on the instant.
    Named(&'static Tz),
    /// A zone with a constant offset from UTC.
    Fixed(UtcOffset),
}

impl Zone {
    /// The UTC zone.
    pub const UTC: Zone = Zone::Fixed(UtcOffset::UTC);

    /// Look up a zone by its canonical name, e.g. "Pacific/Auckland".
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezoneError] if the name is not in the time
    /// zone database.
    pub fn named(canonical_timezone: &str) -> Result<Self, Error> {
        get_timezone(canonical_timezone)
            .map(Zone::Named)
            .ok_or_else(|| Error::InvalidTimezoneError(canonical_timezone.to_owned()))
    }

    /// The host's current UTC offset as a fixed zone.
    ///
    /// # Errors
    /// Returns [Error::IndeterminateLocalOffset] if the operating system does
    /// not report the offset, or it cannot be read safely, e.g. on some Unix
    /// platforms once the process has spawned other threads.
    pub fn local() -> Result<Self, Error> {
        UtcOffset::current_local_offset()
            .map(Zone::Fixed)
            .map_err(|_| Error::IndeterminateLocalOffset)
    }

    /// Get the UTC offset and the zone abbreviation (e.g. "PDT") in effect at `instant`.
    pub fn offset_at(&self, instant: &OffsetDateTime) -> (UtcOffset, String) {
        match self {
            Zone::Named(tz) => {
                let offset = tz.get_offset_utc(instant);
                (offset.to_utc(), offset.name().to_owned())
            }
            Zone::Fixed(offset) => (*offset, fixed_offset_abbreviation(*offset)),
        }
    }

    /// The serializable identity of the zone.
    pub fn id(&self) -> ZoneId {
        match self {
            Zone::Named(tz) => ZoneId::Named {
                name: tz.name().to_owned(),
            },
            Zone::Fixed(offset) => ZoneId::Fixed {
                offset_seconds: offset.whole_seconds(),
            },
        }
    }
}

impl Debug for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Zone::Named(tz) => f.debug_tuple("Named").field(&tz.name()).finish(),
            Zone::Fixed(offset) => f.debug_tuple("Fixed").field(offset).finish(),
        }
    }
}

impl Display for Zone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Zone::Named(tz) => f.write_str(tz.name()),
            Zone::Fixed(offset) => f.write_str(&fixed_offset_abbreviation(*offset)),
        }
    }
}

/// Name a fixed offset the way it is shown to users, e.g. "UTC+05:30".
fn fixed_offset_abbreviation(offset: UtcOffset) -> String {
    if offset.is_utc() {
        return "UTC".to_owned();
    }

    let (hours, minutes, _) = offset.as_hms();
    let sign = if offset.is_negative() { '-' } else { '+' };

    format!("UTC{sign}{:02}:{:02}", hours.unsigned_abs(), minutes.unsigned_abs())
}

/// The identity of a [Zone] in a form that can be stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ZoneId {
    /// An IANA time zone, e.g. "America/Vancouver".
    Named {
        /// The canonical name of the zone.
        name: String,
    },
    /// A constant offset from UTC.
    Fixed {
        /// The offset from UTC in seconds.
        offset_seconds: i32,
    },
}

impl ZoneId {
    /// Turn the identity back into a zone.
    ///
    /// # Errors
    /// Returns [Error::InvalidTimezoneError] if a named zone is not in the
    /// time zone database, or [Error::InvalidZoneDescriptor] if a fixed offset
    /// is out of range.
    pub fn resolve(&self) -> Result<Zone, Error> {
        match self {
            ZoneId::Named { name } => Zone::named(name),
            ZoneId::Fixed { offset_seconds } => UtcOffset::from_whole_seconds(*offset_seconds)
                .map(Zone::Fixed)
                .map_err(|error| Error::InvalidZoneDescriptor(error.to_string())),
        }
    }
}

/// The zone in effect when a history entry was written.
///
/// Besides the zone identity, the descriptor keeps the offset and abbreviation
/// that were in effect at the captured instant. Rendering falls back on these
/// so that the local time at writing is reproduced even if the time zone
/// database changes between writing and reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneDescriptor {
    /// The zone that was in effect.
    pub zone: ZoneId,
    /// The UTC offset in seconds at the captured instant.
    pub offset_seconds: i32,
    /// The zone abbreviation at the captured instant, e.g. "PDT".
    pub abbreviation: String,
}

impl ZoneDescriptor {
    /// Record `zone` as it was at `instant`.
    pub fn capture(zone: &Zone, instant: &OffsetDateTime) -> Self {
        let (offset, abbreviation) = zone.offset_at(instant);

        Self {
            zone: zone.id(),
            offset_seconds: offset.whole_seconds(),
            abbreviation,
        }
    }

    /// The offset that was in effect at the captured instant.
    ///
    /// # Errors
    /// Returns [Error::InvalidZoneDescriptor] if the stored offset is out of range.
    pub fn captured_offset(&self) -> Result<UtcOffset, Error> {
        UtcOffset::from_whole_seconds(self.offset_seconds)
            .map_err(|error| Error::InvalidZoneDescriptor(error.to_string()))
    }

    /// Turn the descriptor back into a zone that can compute offsets for any instant.
    pub fn resolve(&self) -> Result<Zone, Error> {
        self.zone.resolve()
    }

    /// Serialize the descriptor for storage.
    ///
    /// # Errors
    /// Returns [Error::JSONSerializationError] if serialization fails.
    pub fn to_json(&self) -> Result<String, Error> {
        serde_json::to_string(self)
            .map_err(|error| Error::JSONSerializationError(error.to_string()))
    }

    /// Deserialize a descriptor created by [ZoneDescriptor::to_json].
    ///
    /// # Errors
    /// Returns [Error::InvalidZoneDescriptor] if `text` is not a valid descriptor.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        serde_json::from_str(text).map_err(|error| Error::InvalidZoneDescriptor(error.to_string()))
    }
}
