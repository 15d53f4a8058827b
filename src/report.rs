// src/report.rs

use crate::bill_db::BillRecord;
use crate::error::Result;
use comfy_table::{Cell, CellAlignment, Table};
use serde::Serialize;
use std::io::Write;
use std::path::Path;
use time::Date;
use time::macros::format_description;

/// One exported CSV row.
#[derive(Serialize)]
struct CsvRow<'a> {
    invoice_number: &'a str,
    company_name: &'a str,
    total_cost: f64,
    bill_date: &'a str,
}

/// Show ISO dates as DD-MM-YYYY; anything else is shown as written.
pub fn display_date(bill_date: &str) -> String {
    let iso = format_description!("[year]-[month]-[day]");
    let shown = format_description!("[day]-[month]-[year]");
    Date::parse(bill_date.trim(), iso)
        .ok()
        .and_then(|d| d.format(shown).ok())
        .unwrap_or_else(|| bill_date.to_string())
}

/// Two decimals with thousands separators, e.g. `1,234.50`.
pub fn money(amount: f64) -> String {
    let formatted = format!("{:.2}", amount.abs());
    let (whole, frac) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));

    let mut grouped = String::with_capacity(whole.len() + whole.len() / 3);
    for (i, c) in whole.chars().enumerate() {
        if i > 0 && (whole.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if amount < 0.0 && formatted != "0.00" { "-" } else { "" };
    format!("{sign}{grouped}.{frac}")
}

pub fn bills_table(bills: &[BillRecord], total: f64) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["ID", "Invoice #", "Company", "Total Cost", "Bill Date"]);
    for bill in bills {
        table.add_row(vec![
            Cell::new(bill.id),
            Cell::new(&bill.invoice_number),
            Cell::new(&bill.company_name),
            Cell::new(money(bill.total_cost)).set_alignment(CellAlignment::Right),
            Cell::new(display_date(&bill.bill_date)),
        ]);
    }
    table.add_row(vec![
        Cell::new(""),
        Cell::new(""),
        Cell::new("Total"),
        Cell::new(money(total)).set_alignment(CellAlignment::Right),
        Cell::new(""),
    ]);
    table
}

pub fn write_csv<W: Write>(writer: W, bills: &[BillRecord]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for bill in bills {
        wtr.serialize(CsvRow {
            invoice_number: &bill.invoice_number,
            company_name: &bill.company_name,
            total_cost: bill.total_cost,
            bill_date: &bill.bill_date,
        })?;
    }
    // header is only written alongside the first row
    if bills.is_empty() {
        wtr.write_record(["invoice_number", "company_name", "total_cost", "bill_date"])?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_csv(path: &Path, bills: &[BillRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    write_csv(std::fs::File::create(path)?, bills)
}
