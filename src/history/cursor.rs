//! A lazy, restartable view over the history table.

use rusqlite::{Connection, Statement};

use crate::{
    Error,
    account::{AccountName, get_account},
};

use super::core::{HistoryEntry, map_row_to_history_entry};

/// Which history entries to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryScope {
    /// The entries of a single account, oldest first.
    Account(AccountName),
    /// The entries of every account, oldest first. Entries with the same time
    /// are ordered by account name.
    All,
}

/// The history of one or all accounts.
///
/// Rows are read from the database as the iterator returned by
/// [History::entries] is advanced, and each call to [History::entries] starts
/// again from the oldest entry.
pub struct History<'conn> {
    statement: Statement<'conn>,
    account: Option<AccountName>,
}

impl<'conn> History<'conn> {
    /// Prepare the history query for `scope`.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::NotFound] if the scope names an account that does not exist,
    /// - or [Error::SqlError] if there is some other SQL error.
    pub fn new(scope: HistoryScope, connection: &'conn Connection) -> Result<Self, Error> {
        let (query, account) = match scope {
            HistoryScope::Account(account) => {
                get_account(&account, connection)?;

                (
                    "SELECT time, account, amount, timezone FROM history
                     WHERE account = ?1
                     ORDER BY time ASC",
                    Some(account),
                )
            }
            HistoryScope::All => (
                "SELECT time, account, amount, timezone FROM history
                 ORDER BY time ASC, account ASC",
                None,
            ),
        };

        Ok(Self {
            statement: connection.prepare(query)?,
            account,
        })
    }

    /// Iterate over the entries from the oldest to the newest.
    ///
    /// A row that cannot be read is yielded as an error and the iteration
    /// carries on with the next row.
    ///
    /// # Errors
    /// Returns [Error::SqlError] if the query cannot be started.
    pub fn entries(
        &mut self,
    ) -> Result<impl Iterator<Item = Result<HistoryEntry, Error>> + '_, Error> {
        let rows = match &self.account {
            Some(account) => self.statement.query([account.as_ref()])?,
            None => self.statement.query([])?,
        };

        Ok(rows
            .mapped(map_row_to_history_entry)
            .map(|maybe_entry| maybe_entry.map_err(Error::from)))
    }

    /// Read all entries into a vector.
    ///
    /// # Errors
    /// Returns the first error encountered while reading.
    pub fn to_vec(&mut self) -> Result<Vec<HistoryEntry>, Error> {
        self.entries()?.collect()
    }
}
