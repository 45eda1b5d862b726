//! Display helpers for amounts stored in minor currency units.

/// Format an amount of minor units (e.g., cents) as a decimal string with two
/// fractional digits, e.g. `10010` becomes `"100.10"`.
pub fn format_minor_units(amount: i64) -> String {
    let sign = if amount < 0 { "-" } else { "" };
    let amount = amount.unsigned_abs();

    format!("{sign}{}.{:02}", amount / 100, amount % 100)
}
