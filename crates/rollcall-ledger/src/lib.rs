//! rollcall-ledger — Durable once-per-day attendance records.
//!
//! Records live in a SQLite table `attendance(identity, date, time)` with a
//! unique index on `(identity, date)`. Marking is a single conflict-ignoring
//! insert, so the "already present today?" check and the write happen in one
//! atomic statement against the current file contents, even when several
//! processes share the database.

mod migrations;
pub mod report;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rollcall_core::AttendanceLedger;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub use report::AttendanceReport;

/// Storage format of the `date` column.
pub const DATE_FORMAT: &str = "%Y-%m-%d";
/// Storage format of the `time` column.
pub const TIME_FORMAT: &str = "%H:%M:%S";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to create ledger directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("ledger schema version {found} is newer than supported version {supported}")]
    SchemaTooNew { found: i32, supported: i32 },
    #[error("corrupt {field} value {value:?} in ledger")]
    Corrupt { field: &'static str, value: String },
}

/// One identity present on one calendar day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub identity: String,
    pub date: NaiveDate,
    pub time: NaiveTime,
}

fn row_to_record(row: &Row) -> rusqlite::Result<(String, String, String)> {
    Ok((row.get("identity")?, row.get("date")?, row.get("time")?))
}

fn parse_record(
    (identity, date, time): (String, String, String),
) -> Result<AttendanceRecord, LedgerError> {
    let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|_| LedgerError::Corrupt {
        field: "date",
        value: date.clone(),
    })?;
    let time = NaiveTime::parse_from_str(&time, TIME_FORMAT).map_err(|_| LedgerError::Corrupt {
        field: "time",
        value: time.clone(),
    })?;
    Ok(AttendanceRecord { identity, date, time })
}

/// SQLite-backed attendance ledger.
pub struct Ledger {
    conn: Connection,
}

impl Ledger {
    /// Open (or create) the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut conn = Connection::open(path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            tracing::warn!(error = %err, "failed to enable WAL mode");
        }
        conn.busy_timeout(BUSY_TIMEOUT)?;
        migrations::run_migrations(&mut conn)?;

        tracing::info!(path = %path.display(), "attendance ledger opened");
        Ok(Self { conn })
    }

    /// Ledger that lives only as long as this value.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let mut conn = Connection::open_in_memory()?;
        migrations::run_migrations(&mut conn)?;
        Ok(Self { conn })
    }

    /// Record `identity` as present on the day of `now`.
    ///
    /// Returns `true` if a new record was written, `false` if the identity was
    /// already recorded that day. Storage failures are `Err`, never `false`.
    pub fn mark(&self, identity: &str, now: NaiveDateTime) -> Result<bool, LedgerError> {
        let date = now.format(DATE_FORMAT).to_string();
        let time = now.format(TIME_FORMAT).to_string();

        let inserted = self.conn.execute(
            "INSERT INTO attendance (identity, date, time)
             VALUES (?1, ?2, ?3)
             ON CONFLICT (identity, date) DO NOTHING",
            params![identity, date, time],
        )?;

        if inserted == 1 {
            tracing::debug!(identity, %date, %time, "attendance row inserted");
        }
        Ok(inserted == 1)
    }

    /// Every record, in the order it was written.
    pub fn records(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut stmt = self
            .conn
            .prepare("SELECT identity, date, time FROM attendance ORDER BY rowid ASC")?;
        let rows = stmt.query_map([], row_to_record)?;
        rows.map(|row| parse_record(row?)).collect()
    }

    /// Records of a single calendar day, in the order they were written.
    pub fn records_on(&self, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let mut stmt = self.conn.prepare(
            "SELECT identity, date, time FROM attendance
             WHERE date = ?1
             ORDER BY rowid ASC",
        )?;
        let rows = stmt.query_map(params![date.format(DATE_FORMAT).to_string()], row_to_record)?;
        rows.map(|row| parse_record(row?)).collect()
    }
}

impl AttendanceLedger for Ledger {
    type Error = LedgerError;

    fn mark(&mut self, identity: &str, now: NaiveDateTime) -> Result<bool, LedgerError> {
        Ledger::mark(self, identity, now)
    }
}
