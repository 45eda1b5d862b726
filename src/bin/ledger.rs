use std::{error::Error, path::PathBuf, process::exit};

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ledger_rs::{Clock, HistoryScope, Ledger, SystemClock, Zone, format_minor_units};

/// Keep track of account balances and their transaction history.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// File path to the ledger's SQLite database.
    #[arg(long, env = "LEDGER_DB_PATH", default_value = "accounts.sqlite")]
    db_path: PathBuf,

    /// The local timezone as a canonical timezone name, e.g. "Pacific/Auckland".
    ///
    /// Defaults to the host's current UTC offset.
    #[arg(long, env = "LEDGER_TIMEZONE")]
    timezone: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Open an account, creating it if it does not exist.
    Open {
        /// The name of the account.
        name: String,
        /// The balance of a new account in cents. Ignored for existing accounts.
        #[arg(long, default_value_t = 0)]
        opening_balance: i64,
    },
    /// Deposit cents into an account.
    Deposit {
        /// The name of the account.
        name: String,
        /// The amount in cents.
        amount: i64,
    },
    /// Withdraw cents from an account.
    Withdraw {
        /// The name of the account.
        name: String,
        /// The amount in cents.
        amount: i64,
    },
    /// Show the balance of an account.
    Balance {
        /// The name of the account.
        name: String,
    },
    /// List all accounts and their balances.
    Accounts,
    /// Show the transaction history in UTC and in the local time it happened.
    History {
        /// Only show the history of this account.
        #[arg(long)]
        account: Option<String>,
    },
    /// Create the demo accounts.
    Demo,
}

fn main() {
    // Must be read before any other thread is spawned.
    let local_clock = SystemClock::local();

    setup_logging();

    let args = Args::parse();

    if let Err(error) = run(args, local_clock) {
        eprintln!("Error: {error}");
        exit(1);
    }
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn run(
    args: Args,
    local_clock: Result<SystemClock, ledger_rs::Error>,
) -> Result<(), Box<dyn Error>> {
    let clock = match args.timezone.as_deref() {
        Some(timezone) => SystemClock::new(timezone)?,
        None => local_clock.unwrap_or_else(|error| {
            tracing::warn!("{error}, falling back to UTC");
            SystemClock::with_zone(Zone::UTC)
        }),
    };
    tracing::debug!("Using time zone {}", clock.zone());
    let mut ledger = Ledger::open(&args.db_path, clock)?;
    tracing::debug!("Opened ledger at {:?}", args.db_path);

    match args.command {
        Command::Open {
            name,
            opening_balance,
        } => {
            let account = ledger.open_or_create_account(&name, opening_balance)?;
            println!(
                "Balance on account {} is {}",
                account.name,
                format_minor_units(account.balance)
            );
        }
        Command::Deposit { name, amount } => {
            let balance = ledger.deposit(&name, amount)?;
            println!(
                "{} deposited, balance is {}",
                format_minor_units(amount),
                format_minor_units(balance)
            );
        }
        Command::Withdraw { name, amount } => {
            let withdrawn = ledger.withdraw(&name, amount)?;
            println!("{} withdrawn", format_minor_units(withdrawn));
        }
        Command::Balance { name } => {
            println!("{}", format_minor_units(ledger.balance(&name)?));
        }
        Command::Accounts => {
            for account in ledger.accounts()? {
                println!("{}\t{}", account.name, format_minor_units(account.balance));
            }
        }
        Command::History { account } => {
            let scope = match account {
                Some(name) => HistoryScope::Account(name.parse()?),
                None => HistoryScope::All,
            };
            print_history(&ledger, scope)?;
        }
        Command::Demo => {
            for (name, opening_balance) in [
                ("Rick", 0),
                ("Morty", 50000),
                ("Ping Pong", 10000),
                ("Boktoktok", 2000),
            ] {
                ledger.open_or_create_account(name, opening_balance)?;
            }
        }
    }

    ledger.close()?;

    Ok(())
}

fn print_history(
    ledger: &Ledger<SystemClock>,
    scope: HistoryScope,
) -> Result<(), Box<dyn Error>> {
    let mut history = ledger.history(scope)?;

    for maybe_entry in history.entries()? {
        let entry = match maybe_entry {
            Ok(entry) => entry,
            Err(error) => {
                eprintln!("Could not read history entry: {error}");
                continue;
            }
        };

        match entry.render() {
            Ok(local_time) => println!(
                "{local_time}\t{}\t{}",
                entry.account,
                format_minor_units(entry.amount)
            ),
            Err(error) => eprintln!(
                "Could not render entry for {} at {}: {error}",
                entry.account, entry.time
            ),
        }
    }

    Ok(())
}
