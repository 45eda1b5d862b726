mod core;

pub use core::{
    Account, AccountName, create_account_table, get_account, get_all_accounts,
    insert_account_if_absent, update_balance,
};
