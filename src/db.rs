/*! This module sets up the ledger's SQLite database. */

use std::path::Path;

use rusqlite::{Connection, Transaction as SqlTransaction, TransactionBehavior};

use crate::{Error, account::create_account_table, history::create_history_table};

/// Open the database file at `path`, creating it if it does not exist.
///
/// # Errors
/// Returns [Error::StorageUnavailable] if the file cannot be opened.
pub fn open(path: &Path) -> Result<Connection, Error> {
    Connection::open(path).map_err(|error| {
        tracing::error!("could not open the database at {path:?}: {error}");
        Error::StorageUnavailable(error)
    })
}

/// Create the ledger tables if they do not exist yet.
///
/// Foreign keys are switched on for `connection` so that history entries can
/// only refer to existing accounts. Calling this on an already initialized
/// database leaves the data untouched.
///
/// # Errors
/// Returns an error if the tables cannot be created or if there is an SQL error.
pub fn initialize(connection: &Connection) -> Result<(), Error> {
    connection.pragma_update(None, "foreign_keys", true)?;

    let transaction = SqlTransaction::new_unchecked(connection, TransactionBehavior::Exclusive)?;

    create_account_table(&transaction)?;
    create_history_table(&transaction)?;

    transaction.commit()?;

    Ok(())
}
