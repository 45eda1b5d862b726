//! Defines the history entry model and the database queries for the history table.

use rusqlite::{Connection, Row, types::Type};
use time::{
    Duration, OffsetDateTime, PrimitiveDateTime, UtcOffset,
    format_description::BorrowedFormatItem, macros::format_description,
};

use crate::{Error, account::AccountName};

/// Timestamps are stored as UTC with a fixed-width fraction so that sorting
/// the text sorts by time.
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:9]");

// ============================================================================
// MODELS
// ============================================================================

/// A single deposit or withdrawal.
///
/// Entries are only ever appended, never updated or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    /// When the mutation happened, in UTC.
    ///
    /// Unique per account.
    pub time: OffsetDateTime,
    /// The account that was changed.
    pub account: AccountName,
    /// The change in balance in minor currency units. Positive for deposits
    /// and negative for withdrawals, never zero.
    pub amount: i64,
    /// The serialized [ZoneDescriptor](crate::ZoneDescriptor) of the host's
    /// local time zone when the entry was written.
    ///
    /// It is only decoded when the entry is rendered, so one undecodable
    /// descriptor does not prevent reading the rest of the history.
    pub timezone: String,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the history table in the database.
///
/// The accounts table must be created first.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_history_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS history (
            time TIMESTAMP NOT NULL,
            account TEXT NOT NULL,
            amount INTEGER NOT NULL,
            timezone TEXT NOT NULL,
            PRIMARY KEY (time, account),
            FOREIGN KEY(account) REFERENCES accounts(name) ON UPDATE CASCADE ON DELETE RESTRICT
        )",
        (),
    )?;

    Ok(())
}

/// Format `instant` the way it is stored in the history table.
///
/// # Errors
/// Returns [Error::InvalidTimestamp] if the instant cannot be formatted, e.g.
/// the year is outside 0-9999.
pub fn format_timestamp(instant: &OffsetDateTime) -> Result<String, Error> {
    instant
        .to_offset(UtcOffset::UTC)
        .format(TIMESTAMP_FORMAT)
        .map_err(|error| Error::InvalidTimestamp(error.to_string()))
}

/// Parse a timestamp created by [format_timestamp].
pub fn parse_timestamp(text: &str) -> Result<OffsetDateTime, time::error::Parse> {
    PrimitiveDateTime::parse(text, TIMESTAMP_FORMAT).map(PrimitiveDateTime::assume_utc)
}

/// Map a database row to a history entry.
///
/// The row must contain the columns `time, account, amount, timezone` in that order.
pub fn map_row_to_history_entry(row: &Row) -> Result<HistoryEntry, rusqlite::Error> {
    let raw_time: String = row.get(0)?;
    let time = parse_timestamp(&raw_time).map_err(|error| {
        rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(error))
    })?;
    let account: String = row.get(1)?;
    let amount = row.get(2)?;
    let timezone = row.get(3)?;

    Ok(HistoryEntry {
        time,
        account: AccountName::new_unchecked(&account),
        amount,
        timezone,
    })
}

/// Append `entry` to the history table.
///
/// # Errors
/// This function will return a:
/// - [Error::DuplicateHistoryEntry] if the account already has an entry at `entry.time`,
/// - [Error::NotFound] if the account does not exist,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn insert_history_entry(entry: &HistoryEntry, connection: &Connection) -> Result<(), Error> {
    connection
        .execute(
            "INSERT INTO history (time, account, amount, timezone) VALUES (?1, ?2, ?3, ?4)",
            (
                format_timestamp(&entry.time)?,
                entry.account.as_ref(),
                entry.amount,
                &entry.timezone,
            ),
        )
        .map_err(|error| match error {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code: rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY,
                },
                _,
            ) => Error::NotFound,
            error => error.into(),
        })?;

    Ok(())
}

/// Get the time of the most recent history entry for `account`.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error or the stored time
/// cannot be parsed.
pub fn get_latest_history_time(
    account: &AccountName,
    connection: &Connection,
) -> Result<Option<OffsetDateTime>, Error> {
    let latest: Option<String> = connection.query_row(
        "SELECT MAX(time) FROM history WHERE account = ?1",
        [account.as_ref()],
        |row| row.get(0),
    )?;

    latest
        .map(|text| {
            parse_timestamp(&text).map_err(|error| {
                Error::from(rusqlite::Error::FromSqlConversionFailure(
                    0,
                    Type::Text,
                    Box::new(error),
                ))
            })
        })
        .transpose()
}

/// Pick the time for a new history entry on `account`.
///
/// Returns `captured` unless the account already has an entry at or after
/// that instant, in which case the time is moved to one nanosecond after the
/// latest entry. This keeps `(time, account)` unique and the history in
/// write order even when the clock stands still or steps backwards.
///
/// # Errors
/// Returns [Error::SqlError] if there is an SQL error.
pub fn next_history_time(
    account: &AccountName,
    captured: OffsetDateTime,
    connection: &Connection,
) -> Result<OffsetDateTime, Error> {
    let captured = captured.to_offset(UtcOffset::UTC);

    match get_latest_history_time(account, connection)? {
        Some(latest) if captured <= latest => {
            let time = latest + Duration::nanoseconds(1);
            tracing::debug!(
                "clock has not advanced for account {account}, using {time} instead of {captured}"
            );
            Ok(time)
        }
        _ => Ok(captured),
    }
}
