//! Output formatting for CLI commands

use chrono::{DateTime, Local, Utc};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use repairnet_db::Stage;
use serde::Serialize;

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    print_table_colored(
        headers,
        rows.into_iter()
            .map(|row| row.into_iter().map(|text| (text, None)).collect())
            .collect(),
    );
}

/// Print a table with per-cell colors
pub fn print_table_colored(headers: &[&str], rows: Vec<Vec<(String, Option<Color>)>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        let cells: Vec<Cell> = row
            .into_iter()
            .map(|(text, color)| match color {
                Some(c) => Cell::new(text).fg(c),
                None => Cell::new(text),
            })
            .collect();
        table.add_row(cells);
    }

    println!("{}", table);
}

/// Print a `label: value` summary as a two-column table
pub fn print_summary(title: &str, pairs: &[(&str, String)]) {
    println!("{}", title);
    print_table(
        &["Field", "Value"],
        pairs
            .iter()
            .map(|(label, value)| vec![label.to_string(), value.clone()])
            .collect(),
    );
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Color for a remediation stage
pub fn color_for_stage(stage: Stage) -> Color {
    match stage {
        Stage::Initial => Color::Yellow,
        Stage::Classification | Stage::ExistenceCheck | Stage::BandwidthCheck => Color::Blue,
        Stage::PortShutdown => Color::Magenta,
        Stage::JiraCreate => Color::Green,
    }
}

/// Local wall-clock rendering of a stored timestamp
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}
