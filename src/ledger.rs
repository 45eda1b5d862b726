//! The ledger: accounts, deposits, withdrawals and their history.

use std::path::Path;

use rusqlite::{Connection, TransactionBehavior};

use crate::{
    Error,
    account::{
        Account, AccountName, get_account, get_all_accounts, insert_account_if_absent,
        update_balance,
    },
    clock::Clock,
    currency::format_minor_units,
    db,
    history::{History, HistoryEntry, HistoryScope, insert_history_entry, next_history_time},
    timezone::ZoneDescriptor,
};

/// A change to an account's balance.
#[derive(Debug, Clone, Copy)]
enum Mutation {
    Deposit(i64),
    Withdrawal(i64),
}

/// Bookkeeping of named account balances and their history.
///
/// The ledger owns its database connection. Every deposit and withdrawal
/// updates the balance and appends a history entry in one transaction, so
/// either both are written or neither is.
pub struct Ledger<C> {
    connection: Connection,
    clock: C,
}

impl<C: Clock> Ledger<C> {
    /// Create a ledger from an open database connection.
    ///
    /// The ledger tables are created if they do not exist yet.
    ///
    /// # Errors
    /// Returns an error if the database cannot be initialized.
    pub fn new(connection: Connection, clock: C) -> Result<Self, Error> {
        db::initialize(&connection)?;

        Ok(Self { connection, clock })
    }

    /// Open the ledger stored in the file at `path`, creating it if needed.
    ///
    /// # Errors
    /// Returns [Error::StorageUnavailable] if the file cannot be opened, or an
    /// SQL error if the database cannot be initialized.
    pub fn open(path: impl AsRef<Path>, clock: C) -> Result<Self, Error> {
        let connection = db::open(path.as_ref())?;

        Self::new(connection, clock)
    }

    /// Create a ledger that only lives in memory.
    ///
    /// # Errors
    /// Returns [Error::StorageUnavailable] if SQLite cannot allocate the database.
    pub fn open_in_memory(clock: C) -> Result<Self, Error> {
        let connection = Connection::open_in_memory().map_err(Error::StorageUnavailable)?;

        Self::new(connection, clock)
    }

    /// Close the database connection.
    ///
    /// Dropping the ledger also closes the connection, but any error is lost.
    ///
    /// # Errors
    /// Returns [Error::SqlError] if the connection could not be closed cleanly.
    pub fn close(self) -> Result<(), Error> {
        self.connection
            .close()
            .map_err(|(_connection, error)| error.into())
    }

    /// Get the account called `name`, creating it with `opening_balance` if it
    /// does not exist.
    ///
    /// An existing account is returned unchanged and `opening_balance` is
    /// ignored, even if it is negative. The opening balance is not recorded in
    /// the history.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::EmptyAccountName] if `name` is blank,
    /// - [Error::NegativeOpeningBalance] if the account is new and
    ///   `opening_balance` is below zero,
    /// - or [Error::SqlError] if there is an SQL error.
    pub fn open_or_create_account(
        &mut self,
        name: &str,
        opening_balance: i64,
    ) -> Result<Account, Error> {
        let name = AccountName::new(name)?;

        let transaction = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let (account, created) = match get_account(&name, &transaction) {
            Ok(account) => (account, false),
            Err(Error::NotFound) if opening_balance < 0 => {
                return Err(Error::NegativeOpeningBalance(opening_balance));
            }
            Err(Error::NotFound) => {
                let created = insert_account_if_absent(&name, opening_balance, &transaction)?;
                (get_account(&name, &transaction)?, created)
            }
            Err(error) => return Err(error),
        };
        transaction.commit()?;

        if created {
            tracing::info!("Account created for {name}");
        } else {
            tracing::info!("Retrieved record for {name}");
        }
        tracing::info!(
            "Balance on account {name} is {}",
            format_minor_units(account.balance)
        );

        Ok(account)
    }

    /// Add `amount` minor units to the account called `account`.
    ///
    /// Returns the new balance.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::NonPositiveAmount] if `amount` is zero or negative,
    /// - [Error::BalanceOverflow] if the new balance is too large,
    /// - [Error::NotFound] if the account does not exist,
    /// - or [Error::SqlError] if there is an SQL error.
    ///
    /// The ledger is unchanged when an error is returned.
    pub fn deposit(&mut self, account: &str, amount: i64) -> Result<i64, Error> {
        let account = AccountName::new(account)?;

        if amount <= 0 {
            tracing::warn!("Amount must be greater than 0, got {amount}");
            return Err(Error::NonPositiveAmount(amount));
        }

        let balance = self.save_update(&account, Mutation::Deposit(amount))?;
        tracing::info!("{} deposited", format_minor_units(amount));

        Ok(balance)
    }

    /// Take `amount` minor units from the account called `account`.
    ///
    /// Returns the amount withdrawn.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::NonPositiveAmount] if `amount` is zero or negative,
    /// - [Error::InsufficientFunds] if `amount` is more than the balance,
    /// - [Error::NotFound] if the account does not exist,
    /// - or [Error::SqlError] if there is an SQL error.
    ///
    /// The ledger is unchanged when an error is returned.
    pub fn withdraw(&mut self, account: &str, amount: i64) -> Result<i64, Error> {
        let account = AccountName::new(account)?;

        if amount <= 0 {
            tracing::warn!("Amount must be greater than 0 and not exceed balance");
            return Err(Error::NonPositiveAmount(amount));
        }

        match self.save_update(&account, Mutation::Withdrawal(amount)) {
            Ok(_) => {
                tracing::info!("{} withdrawn", format_minor_units(amount));
                Ok(amount)
            }
            Err(error @ Error::InsufficientFunds { .. }) => {
                tracing::warn!("Amount must be greater than 0 and not exceed balance");
                Err(error)
            }
            Err(error) => Err(error),
        }
    }

    /// Get the balance of the account called `account`.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::NotFound] if the account does not exist,
    /// - or [Error::SqlError] if there is an SQL error.
    pub fn balance(&self, account: &str) -> Result<i64, Error> {
        let account = AccountName::new(account)?;

        get_account(&account, &self.connection).map(|account| account.balance)
    }

    /// Get every account ordered by name.
    ///
    /// # Errors
    /// Returns [Error::SqlError] if there is an SQL error.
    pub fn accounts(&self) -> Result<Vec<Account>, Error> {
        get_all_accounts(&self.connection)
    }

    /// Get the history of one or all accounts.
    ///
    /// # Errors
    /// This function will return a:
    /// - [Error::NotFound] if `scope` names an account that does not exist,
    /// - or [Error::SqlError] if there is an SQL error.
    pub fn history(&self, scope: HistoryScope) -> Result<History<'_>, Error> {
        History::new(scope, &self.connection)
    }

    /// Apply `mutation` to the balance and append it to the history.
    ///
    /// The balance is read and written inside an immediate transaction which
    /// holds the database write lock until the history entry is committed.
    fn save_update(&mut self, account: &AccountName, mutation: Mutation) -> Result<i64, Error> {
        let transaction = self
            .connection
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let balance = get_account(account, &transaction)?.balance;

        let (amount, new_balance) = match mutation {
            Mutation::Deposit(amount) => (
                amount,
                balance.checked_add(amount).ok_or(Error::BalanceOverflow)?,
            ),
            Mutation::Withdrawal(amount) if amount <= balance => (-amount, balance - amount),
            Mutation::Withdrawal(amount) => {
                return Err(Error::InsufficientFunds {
                    requested: amount,
                    balance,
                });
            }
        };

        let captured = self.clock.now();
        let time = next_history_time(account, captured.utc, &transaction)?;
        // The zone must describe the stored instant, which differs from the
        // captured one when the clock has not advanced.
        let zone = if time == captured.utc {
            captured.zone
        } else {
            ZoneDescriptor::capture(&self.clock.zone(), &time)
        };
        let entry = HistoryEntry {
            time,
            account: account.clone(),
            amount,
            timezone: zone.to_json()?,
        };

        update_balance(account, new_balance, &transaction)?;
        insert_history_entry(&entry, &transaction)?;

        transaction.commit()?;

        Ok(new_balance)
    }
}

#[cfg(test)]
mod ledger_tests {
    use time::{Duration, macros::datetime};

    use crate::{
        Error,
        account::{Account, AccountName},
        clock::FixedClock,
        history::{HistoryEntry, HistoryScope},
        timezone::Zone,
    };

    use super::Ledger;

    fn get_test_clock() -> FixedClock {
        FixedClock::new(
            datetime!(2015-10-25 0:30 UTC),
            Zone::named("America/Vancouver").unwrap(),
        )
    }

    fn get_test_ledger(clock: &FixedClock) -> Ledger<&FixedClock> {
        Ledger::open_in_memory(clock).unwrap()
    }

    fn history_of(ledger: &Ledger<&FixedClock>, name: &str) -> Vec<HistoryEntry> {
        ledger
            .history(HistoryScope::Account(AccountName::new_unchecked(name)))
            .unwrap()
            .to_vec()
            .unwrap()
    }

    #[test]
    fn create_account_with_zero_balance() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);

        let account = ledger.open_or_create_account("Rick", 0).unwrap();

        assert_eq!(
            account,
            Account {
                name: AccountName::new_unchecked("Rick"),
                balance: 0
            }
        );
        assert_eq!(ledger.balance("Rick"), Ok(0));
        assert_eq!(history_of(&ledger, "Rick"), []);
    }

    #[test]
    fn opening_balance_is_not_in_history() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);

        let account = ledger.open_or_create_account("Morty", 50000).unwrap();

        assert_eq!(account.balance, 50000);
        assert_eq!(history_of(&ledger, "Morty"), []);
    }

    #[test]
    fn reopening_account_keeps_balance() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Morty", 50000).unwrap();
        ledger.withdraw("Morty", 1000).unwrap();

        let account = ledger.open_or_create_account("Morty", 0).unwrap();

        assert_eq!(account.balance, 49000);
        assert_eq!(history_of(&ledger, "Morty").len(), 1);
    }

    #[test]
    fn invalid_account_creation_is_rejected() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);

        assert_eq!(
            ledger.open_or_create_account("   ", 0),
            Err(Error::EmptyAccountName)
        );
        assert_eq!(
            ledger.open_or_create_account("Rick", -1),
            Err(Error::NegativeOpeningBalance(-1))
        );
        assert_eq!(ledger.accounts(), Ok(vec![]));
    }

    #[test]
    fn existing_account_ignores_negative_opening_balance() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 100).unwrap();

        let account = ledger.open_or_create_account("Rick", -5).unwrap();

        assert_eq!(account.balance, 100);
        assert_eq!(ledger.balance("Rick"), Ok(100));
    }

    #[test]
    fn deposit_increases_balance_and_records_history() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 0).unwrap();

        let balance = ledger.deposit("Rick", 10010).unwrap();

        let history = history_of(&ledger, "Rick");
        assert_eq!(balance, 10010);
        assert_eq!(ledger.balance("Rick"), Ok(10010));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].amount, 10010);
        assert_eq!(history[0].time, datetime!(2015-10-25 0:30 UTC));
        assert_eq!(history[0].zone().unwrap().abbreviation, "PDT");
    }

    #[test]
    fn non_positive_deposit_is_rejected() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 100).unwrap();

        assert_eq!(ledger.deposit("Rick", 0), Err(Error::NonPositiveAmount(0)));
        assert_eq!(ledger.deposit("Rick", -5), Err(Error::NonPositiveAmount(-5)));
        assert_eq!(ledger.balance("Rick"), Ok(100));
        assert_eq!(history_of(&ledger, "Rick"), []);
    }

    #[test]
    fn deposit_overflow_is_rejected() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", i64::MAX - 1).unwrap();

        let result = ledger.deposit("Rick", 2);

        assert_eq!(result, Err(Error::BalanceOverflow));
        assert_eq!(ledger.balance("Rick"), Ok(i64::MAX - 1));
        assert_eq!(history_of(&ledger, "Rick"), []);
    }

    #[test]
    fn withdraw_decreases_balance_and_records_negative_amount() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 0).unwrap();
        ledger.deposit("Rick", 10010).unwrap();
        clock.advance(Duration::minutes(5));

        let withdrawn = ledger.withdraw("Rick", 8000).unwrap();

        let history = history_of(&ledger, "Rick");
        assert_eq!(withdrawn, 8000);
        assert_eq!(ledger.balance("Rick"), Ok(2010));
        assert_eq!(
            history.iter().map(|entry| entry.amount).collect::<Vec<_>>(),
            [10010, -8000]
        );
    }

    #[test]
    fn overdraw_is_rejected() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 0).unwrap();
        ledger.deposit("Rick", 10010).unwrap();
        ledger.withdraw("Rick", 8000).unwrap();

        let result = ledger.withdraw("Rick", 999999);

        assert_eq!(
            result,
            Err(Error::InsufficientFunds {
                requested: 999999,
                balance: 2010
            })
        );
        assert_eq!(ledger.balance("Rick"), Ok(2010));
        assert_eq!(history_of(&ledger, "Rick").len(), 2);
    }

    #[test]
    fn non_positive_withdrawal_is_rejected() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 100).unwrap();

        assert_eq!(ledger.withdraw("Rick", 0), Err(Error::NonPositiveAmount(0)));
        assert_eq!(ledger.withdraw("Rick", -1), Err(Error::NonPositiveAmount(-1)));
        assert_eq!(ledger.balance("Rick"), Ok(100));
        assert_eq!(history_of(&ledger, "Rick"), []);
    }

    #[test]
    fn withdraw_entire_balance() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Boktoktok", 2000).unwrap();

        assert_eq!(ledger.withdraw("Boktoktok", 2000), Ok(2000));
        assert_eq!(ledger.balance("Boktoktok"), Ok(0));
    }

    #[test]
    fn mutations_on_unknown_account_are_not_found() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);

        assert_eq!(ledger.deposit("Nobody", 10), Err(Error::NotFound));
        assert_eq!(ledger.withdraw("Nobody", 10), Err(Error::NotFound));
        assert_eq!(ledger.balance("Nobody"), Err(Error::NotFound));
    }

    #[test]
    fn same_instant_mutations_get_distinct_times() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 0).unwrap();

        ledger.deposit("Rick", 100).unwrap();
        ledger.deposit("Rick", 200).unwrap();
        ledger.withdraw("Rick", 50).unwrap();

        let history = history_of(&ledger, "Rick");
        assert_eq!(
            history.iter().map(|entry| entry.amount).collect::<Vec<_>>(),
            [100, 200, -50]
        );
        assert!(history.windows(2).all(|pair| pair[0].time < pair[1].time));
    }

    #[test]
    fn moved_time_is_described_in_its_own_offset() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 0).unwrap();
        clock.set(datetime!(2015-11-01 9:30 UTC));
        ledger.deposit("Rick", 100).unwrap();

        // Back to before the switch from PDT to PST.
        clock.set(datetime!(2015-11-01 8:30 UTC));
        ledger.deposit("Rick", 200).unwrap();

        let history = history_of(&ledger, "Rick");
        let zone = history[1].zone().unwrap();
        let rendered = history[1].render().unwrap();
        assert_eq!(history[1].time, datetime!(2015-11-01 9:30:00.000000001 UTC));
        assert_eq!(zone.offset_seconds, -8 * 60 * 60);
        assert_eq!(zone.abbreviation, "PST");
        assert_eq!(rendered.local, datetime!(2015-11-01 1:30:00.000000001 -8));
        assert_eq!(rendered.abbreviation, "PST");
    }

    #[test]
    fn failed_history_append_leaves_balance_unchanged() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 100).unwrap();
        ledger
            .connection
            .execute(
                "CREATE TRIGGER reject_history BEFORE INSERT ON history
                 BEGIN SELECT RAISE(ABORT, 'history is read only'); END",
                (),
            )
            .unwrap();

        let deposit = ledger.deposit("Rick", 50);
        let withdrawal = ledger.withdraw("Rick", 50);

        assert!(matches!(deposit, Err(Error::SqlError(_))));
        assert!(matches!(withdrawal, Err(Error::SqlError(_))));
        assert_eq!(ledger.balance("Rick"), Ok(100));
        assert_eq!(history_of(&ledger, "Rick"), []);
    }

    #[test]
    fn different_accounts_may_share_a_time() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 0).unwrap();
        ledger.open_or_create_account("Morty", 0).unwrap();

        ledger.deposit("Rick", 1).unwrap();
        ledger.deposit("Morty", 2).unwrap();

        let all = ledger.history(HistoryScope::All).unwrap().to_vec().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].time, all[1].time);
        assert_eq!(all[0].account.as_ref(), "Morty");
        assert_eq!(all[1].account.as_ref(), "Rick");
    }

    #[test]
    fn balance_equals_opening_plus_history() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        let openings = [("Rick", 0), ("Morty", 50000), ("Ping Pong", 10000)];
        for (name, opening) in openings {
            ledger.open_or_create_account(name, opening).unwrap();
        }

        let operations: [(&str, i64); 10] = [
            ("Rick", 10010),
            ("Rick", 49910),
            ("Morty", -1000),
            ("Rick", 5510),
            ("Ping Pong", -20000),
            ("Rick", -8000),
            ("Morty", 0),
            ("Ping Pong", -10000),
            ("Rick", -1_000_000),
            ("Morty", 250),
        ];
        for (name, amount) in operations {
            clock.advance(Duration::seconds(1));
            let _ = if amount >= 0 {
                ledger.deposit(name, amount)
            } else {
                ledger.withdraw(name, -amount)
            };
        }

        for (name, opening) in openings {
            let total: i64 = history_of(&ledger, name).iter().map(|entry| entry.amount).sum();
            assert_eq!(ledger.balance(name), Ok(opening + total), "balance of {name}");
        }
        assert_eq!(ledger.balance("Ping Pong"), Ok(0));
        assert!(
            history_of(&ledger, "Rick")
                .iter()
                .chain(history_of(&ledger, "Morty").iter())
                .all(|entry| entry.amount != 0)
        );
    }

    #[test]
    fn history_renders_in_captured_zone() {
        let clock = get_test_clock();
        let mut ledger = get_test_ledger(&clock);
        ledger.open_or_create_account("Rick", 0).unwrap();
        ledger.deposit("Rick", 100).unwrap();
        clock.set(datetime!(2015-12-01 20:00 UTC));
        ledger.deposit("Rick", 100).unwrap();

        let rendered: Vec<_> = history_of(&ledger, "Rick")
            .iter()
            .map(|entry| entry.render().unwrap())
            .collect();

        assert_eq!(rendered[0].local, datetime!(2015-10-24 17:30 -7));
        assert_eq!(rendered[0].abbreviation, "PDT");
        assert_eq!(rendered[1].local, datetime!(2015-12-01 12:00 -8));
        assert_eq!(rendered[1].abbreviation, "PST");
    }

    #[test]
    fn close_releases_connection() {
        let clock = get_test_clock();
        let ledger = get_test_ledger(&clock);

        assert_eq!(ledger.close(), Ok(()));
    }
}
