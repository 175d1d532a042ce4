//! Attendance report: the full listing plus today's check-ins.

use crate::{AttendanceRecord, Ledger, LedgerError, DATE_FORMAT, TIME_FORMAT};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Serialize)]
pub struct AttendanceReport {
    pub date: NaiveDate,
    pub records: Vec<AttendanceRecord>,
    pub today: Vec<AttendanceRecord>,
}

impl AttendanceReport {
    /// Snapshot the ledger as seen on `date`.
    pub fn build(ledger: &Ledger, date: NaiveDate) -> Result<Self, LedgerError> {
        Ok(Self {
            date,
            records: ledger.records()?,
            today: ledger.records_on(date)?,
        })
    }

    /// Number of identities present on the report date.
    pub fn present_count(&self) -> usize {
        self.today.len()
    }
}

impl fmt::Display for AttendanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.records.is_empty() {
            return writeln!(f, "No attendance recorded yet.");
        }

        let width = self
            .records
            .iter()
            .map(|r| r.identity.chars().count())
            .max()
            .unwrap_or(0)
            .max("Name".len());

        writeln!(f, "=== ATTENDANCE ===")?;
        writeln!(f, "{:<width$}  {:<10}  {:<8}", "Name", "Date", "Time")?;
        for r in &self.records {
            writeln!(
                f,
                "{:<width$}  {}  {}",
                r.identity,
                r.date.format(DATE_FORMAT),
                r.time.format(TIME_FORMAT)
            )?;
        }

        writeln!(f)?;
        writeln!(f, "=== TODAY ({}) ===", self.date.format(DATE_FORMAT))?;
        if self.today.is_empty() {
            return writeln!(f, "Nobody has checked in today.");
        }
        writeln!(f, "{:<width$}  {:<8}", "Name", "Time")?;
        for r in &self.today {
            writeln!(f, "{:<width$}  {}", r.identity, r.time.format(TIME_FORMAT))?;
        }
        writeln!(f)?;
        writeln!(f, "Present today: {}", self.present_count())
    }
}
