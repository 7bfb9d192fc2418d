use crate::error::CliResult;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;

/// Print a value as pretty JSON on stdout.
///
/// Non-finite numbers (a percentage over a zero-area region) serialize as
/// `null`.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CliResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Empty table with dynamic column widths and the given header.
pub fn table(header: impl Into<comfy_table::Row>) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header);
    table
}

/// Fixed two-decimal rendering; NaN and infinities print as `-`.
pub fn number(value: f64) -> String {
    if value.is_finite() {
        format!("{value:.2}")
    } else {
        "-".to_string()
    }
}

pub fn optional(value: Option<f64>) -> String {
    value.map(number).unwrap_or_else(|| "-".to_string())
}
