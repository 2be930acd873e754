//! Terminal tables for command output.

use comfy_table::modifiers::UTF8_ROUND_CORNERS;
use comfy_table::presets::UTF8_FULL_CONDENSED;
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use ledger_persistence::{LedgerEntry, SnapshotFormat};

use crate::commands::{CheckReport, InspectReport, MigrateReport, RecordReport};

pub fn print_inspect(report: &InspectReport) {
    println!("File: {}", report.path.display());

    let mut table = Table::new();
    table.set_header(vec![header_cell("Field"), header_cell("Value")]);
    apply_table_style(&mut table);
    table.add_row(vec![Cell::new("Ledger"), Cell::new(&report.name)]);
    table.add_row(vec![Cell::new("Format"), Cell::new(format_label(report.format))]);
    table.add_row(vec![Cell::new("Created"), Cell::new(&report.created_at)]);
    table.add_row(vec![Cell::new("Postings"), Cell::new(report.entry_count)]);
    table.add_row(vec![
        Cell::new("Balance"),
        Cell::new(format_minor(report.balance_minor)),
    ]);
    table.add_row(vec![Cell::new("Consistent"), status_cell(report.consistent)]);
    table.add_row(vec![Cell::new("SHA-256"), dim_cell(&report.digest)]);
    println!("{table}");

    if !report.accounts.is_empty() {
        let mut accounts = Table::new();
        accounts.set_header(vec![header_cell("Account"), header_cell("Balance")]);
        apply_table_style(&mut accounts);
        align_column(&mut accounts, 1, CellAlignment::Right);
        for (account, balance) in &report.accounts {
            accounts.add_row(vec![Cell::new(account), amount_cell(*balance)]);
        }
        println!("{accounts}");
    }

    if let Some(entries) = &report.entries {
        println!("{}", entries_table(entries));
    }
}

pub fn print_check(report: &CheckReport) {
    let verdict = if report.consistent {
        "consistent"
    } else {
        "INCONSISTENT"
    };
    println!(
        "{}: {} ({}, {} postings)",
        report.path.display(),
        verdict,
        format_label(report.format),
        report.entry_count
    );
}

pub fn print_migrate(report: &MigrateReport) {
    if report.skipped {
        println!(
            "{} already uses the current format; nothing to do.",
            report.input.display()
        );
        return;
    }
    println!(
        "Migrated {} ({}) -> {}",
        report.input.display(),
        format_label(report.from),
        report.output.display()
    );
    println!("SHA-256: {}", report.digest);
}

pub fn print_record(report: &RecordReport) {
    let mut table = Table::new();
    table.set_header(vec![header_cell("Field"), header_cell("Value")]);
    apply_table_style(&mut table);
    table.add_row(vec![Cell::new("File"), Cell::new(report.path.display())]);
    table.add_row(vec![Cell::new("Postings added"), Cell::new(report.added)]);
    table.add_row(vec![
        Cell::new("Last sequence"),
        Cell::new(report.last_sequence),
    ]);
    table.add_row(vec![
        Cell::new("Balance"),
        Cell::new(format_minor(report.balance_minor)),
    ]);
    table.add_row(vec![
        Cell::new("Background writes"),
        Cell::new(report.stats.saves_written),
    ]);
    table.add_row(vec![
        Cell::new("Coalesced requests"),
        Cell::new(report.stats.requests_skipped),
    ]);
    table.add_row(vec![
        Cell::new("Final explicit save"),
        status_cell(report.explicit_save),
    ]);
    println!("{table}");
}

fn entries_table(entries: &[LedgerEntry]) -> Table {
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("#"),
        header_cell("Account"),
        header_cell("Amount"),
        header_cell("Memo"),
        header_cell("Recorded"),
    ]);
    apply_table_style(&mut table);
    align_column(&mut table, 0, CellAlignment::Right);
    align_column(&mut table, 2, CellAlignment::Right);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.sequence),
            Cell::new(&entry.account),
            amount_cell(entry.amount_minor),
            entry
                .memo
                .as_deref()
                .map_or_else(|| dim_cell("-"), Cell::new),
            dim_cell(&entry.recorded_at),
        ]);
    }
    table
}

fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

fn status_cell(ok: bool) -> Cell {
    if ok {
        Cell::new("yes").fg(Color::Green)
    } else {
        Cell::new("no")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold)
    }
}

fn amount_cell(amount_minor: impl Into<i128>) -> Cell {
    let amount_minor = amount_minor.into();
    let cell = Cell::new(format_minor(amount_minor));
    if amount_minor < 0 {
        cell.fg(Color::Red)
    } else {
        cell
    }
}

fn format_label(format: SnapshotFormat) -> &'static str {
    match format {
        SnapshotFormat::Primary => "current",
        SnapshotFormat::Legacy => "legacy",
    }
}

/// Render minor units as a two-decimal amount.
pub fn format_minor(amount_minor: impl Into<i128>) -> String {
    let amount_minor: i128 = amount_minor.into();
    let sign = if amount_minor < 0 { "-" } else { "" };
    let abs = amount_minor.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}
