mod core;
mod cursor;
mod render;

pub use core::{HistoryEntry, create_history_table, insert_history_entry, next_history_time};
pub use cursor::{History, HistoryScope};
pub use render::LocalTime;
