use crate::error::{BillError, Result};
use crate::normalize::BillFields;
use rusqlite::{Connection, params};
use std::path::Path;
use std::time::Duration;
use time::macros::format_description;
use time::{OffsetDateTime, PrimitiveDateTime};
use tracing::info;

/// How long a writer waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub struct BillStore {
    conn: Connection,
}

/// A committed bill. Never updated or deleted once stored.
#[derive(Debug, Clone, PartialEq)]
pub struct BillRecord {
    pub id: i64,
    pub invoice_number: String,
    pub company_name: String,
    pub total_cost: f64,
    pub bill_date: String,
    pub created_at: OffsetDateTime,
}

impl BillStore {
    /// Open the ledger at `db_path`, creating or migrating the schema as needed.
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        let store = Self { conn };
        store.initialize()?;
        Ok(store)
    }

    /// Ensure the `bills` table exists. Safe to run on every start.
    pub fn initialize(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS bills (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                invoice_number TEXT NOT NULL,
                company_name TEXT NOT NULL,
                total_cost REAL NOT NULL,
                bill_date TEXT NOT NULL,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        // Migrate: ledgers written before bill dates were captured
        if !self.has_column("bill_date") {
            self.conn.execute(
                "ALTER TABLE bills ADD COLUMN bill_date TEXT NOT NULL DEFAULT ''",
                [],
            )?;
            info!("Migrated bills table: added bill_date");
        }
        if !self.has_column("created_at") {
            let tx = self.conn.unchecked_transaction()?;
            tx.execute("ALTER TABLE bills ADD COLUMN created_at DATETIME", [])?;
            if self.has_column("upload_date") {
                tx.execute(
                    "UPDATE bills SET created_at = COALESCE(datetime(upload_date), CURRENT_TIMESTAMP)",
                    [],
                )?;
            } else {
                tx.execute("UPDATE bills SET created_at = CURRENT_TIMESTAMP", [])?;
            }
            tx.commit()?;
            info!("Migrated bills table: added created_at");
        }

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_bills_company_name ON bills(company_name)",
            [],
        )?;

        info!("Bill ledger initialized");
        Ok(())
    }

    fn has_column(&self, column: &str) -> bool {
        self.conn
            .prepare(&format!("SELECT {column} FROM bills LIMIT 0"))
            .is_ok()
    }

    /// Append a bill and return its new id. One statement, so the row is either
    /// fully visible afterwards or not at all.
    pub fn add(
        &self,
        invoice_number: &str,
        company_name: &str,
        total_cost: f64,
        bill_date: &str,
    ) -> Result<i64> {
        if !total_cost.is_finite() {
            return Err(BillError::MalformedAmount(total_cost.to_string()));
        }

        let id: i64 = self.conn.query_row(
            "INSERT INTO bills (invoice_number, company_name, total_cost, bill_date, created_at)
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)
             RETURNING id",
            params![invoice_number, company_name, total_cost, bill_date],
            |row| row.get(0),
        )?;
        info!(id, invoice_number = %invoice_number, company = %company_name, total_cost, "Bill stored");
        Ok(id)
    }

    pub fn add_fields(&self, fields: &BillFields) -> Result<i64> {
        self.add(
            &fields.invoice_number,
            &fields.company_name,
            fields.total_cost,
            &fields.bill_date,
        )
    }

    /// Every bill, newest first.
    pub fn list_all(&self) -> Result<Vec<BillRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, invoice_number, company_name, total_cost, bill_date, created_at
             FROM bills
             ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([], |row| Self::row_to_bill(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Bills whose invoice number or company name contains `term`, ignoring case.
    /// An empty term matches every bill.
    pub fn search(&self, term: &str) -> Result<Vec<BillRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, invoice_number, company_name, total_cost, bill_date, created_at
             FROM bills
             WHERE invoice_number LIKE ?1 ESCAPE '\\'
                OR company_name LIKE ?1 ESCAPE '\\'
             ORDER BY id DESC",
        )?;
        let rows = stmt.query_map(params![like_pattern(term)], |row| Self::row_to_bill(row))?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Sum of `total_cost`, over all bills or over a search.
    pub fn total_cost_sum(&self, term: Option<&str>) -> Result<f64> {
        let sum: f64 = self.conn.query_row(
            "SELECT COALESCE(SUM(total_cost), 0.0)
             FROM bills
             WHERE invoice_number LIKE ?1 ESCAPE '\\'
                OR company_name LIKE ?1 ESCAPE '\\'",
            params![like_pattern(term.unwrap_or(""))],
            |row| row.get(0),
        )?;
        Ok(sum)
    }

    /// Helper: map a row with the 6-column bill projection to `BillRecord`.
    fn row_to_bill(row: &rusqlite::Row<'_>) -> rusqlite::Result<BillRecord> {
        let created_at: String = row.get(5)?;
        Ok(BillRecord {
            id: row.get(0)?,
            invoice_number: row.get(1)?,
            company_name: row.get(2)?,
            total_cost: row.get(3)?,
            bill_date: row.get(4)?,
            created_at: parse_timestamp(&created_at).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
            })?,
        })
    }
}

/// `%term%` with LIKE wildcards in the term escaped.
fn like_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// SQLite's `CURRENT_TIMESTAMP` format, always UTC. Fractional seconds are accepted.
fn parse_timestamp(s: &str) -> std::result::Result<OffsetDateTime, time::error::Parse> {
    let format = format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
    );
    Ok(PrimitiveDateTime::parse(s, format)?.assume_utc())
}
