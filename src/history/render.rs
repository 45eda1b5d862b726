//! Rendering history entries in the local time at which they were written.

use std::fmt::Display;

use time::{OffsetDateTime, format_description::BorrowedFormatItem, macros::format_description};

use crate::{Error, timezone::ZoneDescriptor};

use super::core::HistoryEntry;

const DISPLAY_FORMAT: &[BorrowedFormatItem<'static>] = format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:9][offset_hour sign:mandatory]:[offset_minute]"
);

/// A history entry's time in UTC and in the zone it was written in.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalTime {
    /// The instant in UTC.
    pub utc: OffsetDateTime,
    /// The same instant with the offset that was in effect where the entry was written.
    pub local: OffsetDateTime,
    /// The zone abbreviation at that instant, e.g. "PDT".
    pub abbreviation: String,
}

impl Display for LocalTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let utc = self.utc.format(DISPLAY_FORMAT).map_err(|_| std::fmt::Error)?;
        let local = self.local.format(DISPLAY_FORMAT).map_err(|_| std::fmt::Error)?;

        write!(f, "{utc}\t{local}\t{}", self.abbreviation)
    }
}

impl HistoryEntry {
    /// Decode the time zone that was in effect when the entry was written.
    ///
    /// # Errors
    /// Returns [Error::InvalidZoneDescriptor] if the stored descriptor is corrupt.
    pub fn zone(&self) -> Result<ZoneDescriptor, Error> {
        ZoneDescriptor::from_json(&self.timezone)
    }

    /// Convert the entry's time into the local time where it was written.
    ///
    /// The offset is recomputed from the stored zone for the entry's instant.
    /// If that no longer matches the offset captured when the entry was written
    /// (e.g. the time zone rules were updated since), the captured offset and
    /// abbreviation are used instead.
    ///
    /// # Errors
    /// Returns [Error::InvalidZoneDescriptor] if the stored descriptor is corrupt.
    pub fn render(&self) -> Result<LocalTime, Error> {
        let descriptor = self.zone()?;
        let captured_offset = descriptor.captured_offset()?;

        let (offset, abbreviation) = match descriptor.resolve() {
            Ok(zone) => {
                let (offset, abbreviation) = zone.offset_at(&self.time);

                if offset == captured_offset {
                    (offset, abbreviation)
                } else {
                    tracing::warn!(
                        "offset for {zone} at {} is now {offset}, using captured offset {captured_offset}",
                        self.time
                    );
                    (captured_offset, descriptor.abbreviation)
                }
            }
            Err(error) => {
                tracing::warn!("{error}, using captured offset {captured_offset}");
                (captured_offset, descriptor.abbreviation)
            }
        };

        Ok(LocalTime {
            utc: self.time,
            local: self.time.to_offset(offset),
            abbreviation,
        })
    }
}
