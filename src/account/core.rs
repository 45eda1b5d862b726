//! Defines the account model and the database queries for accounts.

use std::{fmt::Display, str::FromStr};

use rusqlite::{Connection, Row};

use crate::Error;

// ============================================================================
// MODELS
// ============================================================================

/// The name of an account, unique across the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AccountName(String);

impl AccountName {
    /// Create an account name.
    ///
    /// Surrounding whitespace is removed.
    ///
    /// # Errors
    ///
    /// This function will return an [Error::EmptyAccountName] if `name` is an empty string.
    pub fn new(name: &str) -> Result<Self, Error> {
        let name = name.trim();

        if name.is_empty() {
            Err(Error::EmptyAccountName)
        } else {
            Ok(Self(name.to_string()))
        }
    }

    /// Create an account name without validation.
    ///
    /// The caller should ensure that the string is not empty.
    pub fn new_unchecked(name: &str) -> Self {
        Self(name.to_string())
    }
}

impl AsRef<str> for AccountName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for AccountName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AccountName::new(s)
    }
}

impl Display for AccountName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named account and the money it holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// The name of the account.
    pub name: AccountName,
    /// The balance in minor currency units (e.g., cents). Never negative.
    pub balance: i64,
}

// ============================================================================
// DATABASE FUNCTIONS
// ============================================================================

/// Create the accounts table in the database.
///
/// # Errors
/// Returns an error if there is an SQL error.
pub fn create_account_table(connection: &Connection) -> Result<(), rusqlite::Error> {
    connection.execute(
        "CREATE TABLE IF NOT EXISTS accounts (
            name TEXT PRIMARY KEY NOT NULL,
            balance INTEGER NOT NULL
        )",
        (),
    )?;

    Ok(())
}

/// Map a database row to an account.
///
/// The row must contain the columns `name, balance` in that order.
pub fn map_row_to_account(row: &Row) -> Result<Account, rusqlite::Error> {
    let name: String = row.get(0)?;
    let balance = row.get(1)?;

    Ok(Account {
        name: AccountName::new_unchecked(&name),
        balance,
    })
}

/// Insert an account with `opening_balance` unless an account called `name`
/// already exists.
///
/// Returns `true` if a new account was inserted.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn insert_account_if_absent(
    name: &AccountName,
    opening_balance: i64,
    connection: &Connection,
) -> Result<bool, Error> {
    let inserted = connection.execute(
        "INSERT INTO accounts (name, balance) VALUES (?1, ?2) ON CONFLICT(name) DO NOTHING",
        (name.as_ref(), opening_balance),
    )?;

    Ok(inserted == 1)
}

/// Retrieve an account by its `name`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if there is no account called `name`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn get_account(name: &AccountName, connection: &Connection) -> Result<Account, Error> {
    let account = connection
        .prepare("SELECT name, balance FROM accounts WHERE name = :name")?
        .query_row(&[(":name", name.as_ref())], map_row_to_account)?;

    Ok(account)
}

/// Retrieve all accounts ordered by name.
///
/// # Errors
/// This function will return a [Error::SqlError] if there is an SQL error.
pub fn get_all_accounts(connection: &Connection) -> Result<Vec<Account>, Error> {
    connection
        .prepare("SELECT name, balance FROM accounts ORDER BY name ASC")?
        .query_map([], map_row_to_account)?
        .map(|maybe_account| maybe_account.map_err(Error::from))
        .collect()
}

/// Set the balance of the account called `name`.
///
/// # Errors
/// This function will return a:
/// - [Error::NotFound] if there is no account called `name`,
/// - or [Error::SqlError] if there is some other SQL error.
pub fn update_balance(
    name: &AccountName,
    balance: i64,
    connection: &Connection,
) -> Result<(), Error> {
    let updated = connection.execute(
        "UPDATE accounts SET balance = ?1 WHERE name = ?2",
        (balance, name.as_ref()),
    )?;

    if updated == 0 {
        return Err(Error::NotFound);
    }

    Ok(())
}
