//! Ledger is a small bookkeeping library for named accounts.
//!
//! Balances are stored as integer minor currency units (e.g., cents) in a
//! SQLite database, together with an append-only history of every deposit and
//! withdrawal. Each history entry records the UTC instant of the mutation and
//! the time zone in effect on the writing host, so the local time of any past
//! transaction can be reconstructed later.

#![warn(missing_docs)]

mod account;
mod clock;
mod currency;
mod db;
mod history;
mod ledger;
mod timezone;

pub use account::{Account, AccountName};
pub use clock::{CapturedTime, Clock, FixedClock, SystemClock};
pub use currency::format_minor_units;
pub use db::initialize as initialize_db;
pub use history::{History, HistoryEntry, HistoryScope, LocalTime};
pub use ledger::Ledger;
pub use timezone::{Zone, ZoneDescriptor, ZoneId};

/// The errors that may occur in the ledger.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum Error {
    /// An empty string was used as an account name.
    #[error("account name cannot be empty")]
    EmptyAccountName,

    /// A new account was given a balance below zero.
    #[error("opening balance cannot be negative, got {0}")]
    NegativeOpeningBalance(i64),

    /// A deposit or withdrawal was zero or negative.
    ///
    /// No state is changed when this error is returned.
    #[error("amount must be greater than 0, got {0}")]
    NonPositiveAmount(i64),

    /// A withdrawal asked for more than the account holds.
    ///
    /// No state is changed when this error is returned.
    #[error("cannot withdraw {requested} from an account with a balance of {balance}")]
    InsufficientFunds {
        /// The amount the caller tried to withdraw.
        requested: i64,
        /// The balance of the account at the time of the withdrawal.
        balance: i64,
    },

    /// A deposit would push the balance past the largest representable amount.
    #[error("the deposit would overflow the account balance")]
    BalanceOverflow,

    /// The requested resource was not found.
    ///
    /// Internally, this error may occur when a query returns no rows.
    #[error("the requested resource could not be found")]
    NotFound,

    /// The database could not be opened.
    ///
    /// Callers should treat this as fatal, the ledger does not retry.
    #[error("could not open the database: {0}")]
    StorageUnavailable(rusqlite::Error),

    /// A history entry with the same timestamp and account already exists.
    #[error("a history entry for this account already exists at that time")]
    DuplicateHistoryEntry,

    /// An unhandled/unexpected SQL error.
    #[error("an unexpected SQL error occurred: {0}")]
    SqlError(rusqlite::Error),

    /// An error occurred while getting a time zone from a canonical time zone string.
    #[error("invalid timezone {0}")]
    InvalidTimezoneError(String),

    /// The host's UTC offset could not be determined.
    #[error("could not determine the local UTC offset")]
    IndeterminateLocalOffset,

    /// A stored time zone descriptor could not be decoded.
    #[error("could not decode time zone descriptor: {0}")]
    InvalidZoneDescriptor(String),

    /// An error occurred while serializing a struct as JSON
    #[error("could not serialize as JSON: {0}")]
    JSONSerializationError(String),

    /// A timestamp could not be formatted for storage.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}

impl Error {
    /// Whether the error is a rejected request rather than a storage fault.
    ///
    /// Validation errors are raised before anything is written, so the ledger
    /// is unchanged and the caller may carry on.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::EmptyAccountName
                | Error::NegativeOpeningBalance(_)
                | Error::NonPositiveAmount(_)
                | Error::InsufficientFunds { .. }
                | Error::BalanceOverflow
        )
    }
}

impl From<rusqlite::Error> for Error {
    fn from(value: rusqlite::Error) -> Self {
        match value {
            rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error {
                    code: _,
                    extended_code:
                        rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
                        | rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE,
                },
                Some(ref desc),
            ) if desc.contains("history.") => Error::DuplicateHistoryEntry,
            rusqlite::Error::QueryReturnedNoRows => Error::NotFound,
            error => {
                tracing::error!("an unhandled SQL error occurred: {}", error);
                Error::SqlError(error)
            }
        }
    }
}
