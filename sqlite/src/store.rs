//! High-level import/export over one SQLite connection.
//!
//! [`PartStore`] owns the connection for a whole run. Every PART is imported
//! in its own transaction: reconcile the table, insert the records, commit.
//! A failing PART rolls back alone and is listed in the [`ImportReport`];
//! PARTs committed before it are unaffected.
//!
//! # Example
//!
//! ```
//! use ptf_sqlite::PartStore;
//!
//! let mut store = PartStore::open_in_memory().unwrap();
//! let text = "\
//! FILE_TYPE=MULTI_PHYS_TABLE;
//! PART 'PINS'
//! :PIN=IO_STD;
//! 'A1'='LVCMOS18'
//! END_PART
//! END.
//! ";
//! let report = store.import_reader(text.as_bytes()).unwrap();
//! assert_eq!(report.parts_imported, 1);
//! assert_eq!(report.rows_inserted, 1);
//!
//! let mut out = Vec::new();
//! store.export(&mut out).unwrap();
//! assert!(String::from_utf8(out).unwrap().contains("'A1'='LVCMOS18'"));
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ptf_core::{Part, PtfReader};
use rusqlite::Connection;
use tracing::{info, warn};

use crate::convert::{InsertCounts, insert_records};
use crate::error::Result;
use crate::migration::{Reconciliation, SchemaReconciler};
use crate::query::{ExportReport, export_tables};
use crate::schema::{Identifier, list_tables, read_table_spec};

/// Result of importing one PART.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartOutcome {
    pub table: String,
    pub reconciliation: Reconciliation,
    pub counts: InsertCounts,
}

/// A PART whose transaction was rolled back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartFailure {
    pub part: String,
    pub message: String,
}

/// Report of an import, accumulated over one or more documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub parts_imported: usize,
    pub rows_inserted: usize,
    /// Rows skipped because their key was already stored.
    pub rows_ignored: usize,
    pub tables_created: usize,
    pub tables_migrated: usize,
    pub failures: Vec<PartFailure>,
}

impl ImportReport {
    fn record(&mut self, outcome: &PartOutcome) {
        self.parts_imported += 1;
        self.rows_inserted += outcome.counts.inserted;
        self.rows_ignored += outcome.counts.ignored;
        match outcome.reconciliation {
            Reconciliation::Created => self.tables_created += 1,
            Reconciliation::Migrated { .. } => self.tables_migrated += 1,
            Reconciliation::Unchanged => {}
        }
    }

    /// Merges another report into this one.
    pub fn merge(&mut self, other: ImportReport) {
        self.parts_imported += other.parts_imported;
        self.rows_inserted += other.rows_inserted;
        self.rows_ignored += other.rows_ignored;
        self.tables_created += other.tables_created;
        self.tables_migrated += other.tables_migrated;
        self.failures.extend(other.failures);
    }

    /// Whether every PART was committed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Row and column counts of one stored table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatus {
    pub name: String,
    pub columns: usize,
    pub primary_columns: usize,
    pub rows: usize,
}

/// Snapshot of every PART table in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStatus {
    pub tables: Vec<TableStatus>,
}

impl StoreStatus {
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows).sum()
    }
}

/// SQLite-backed store of PART tables.
pub struct PartStore {
    conn: Connection,
}

impl PartStore {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(Connection::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::new(Connection::open_in_memory()?))
    }

    /// Imports one PART in its own transaction.
    ///
    /// # Errors
    ///
    /// Any error rolls the PART back, leaving the table as it was.
    pub fn import_part(&mut self, part: &Part) -> Result<PartOutcome> {
        let table = Identifier::table(&part.name)?;
        let tx = self.conn.transaction()?;

        let reconciliation = SchemaReconciler::inspect(&tx, table.clone())?.reconcile(&part.header)?;
        let counts = insert_records(&tx, &table, &part.header, &part.records)?;
        tx.commit()?;

        info!(
            part = %part.name,
            inserted = counts.inserted,
            ignored = counts.ignored,
            "imported PART"
        );
        Ok(PartOutcome {
            table: part.name.clone(),
            reconciliation,
            counts,
        })
    }

    /// Imports every PART of a document as it is parsed.
    ///
    /// Storage failures are collected per PART and do not stop the
    /// document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::FormatError`](crate::StoreError::FormatError)
    /// for an unsupported `FILE_TYPE` or unreadable input. PARTs committed
    /// before the error stay committed.
    pub fn import_reader<R: BufRead>(&mut self, reader: R) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        for part in PtfReader::new(reader) {
            let part = part?;
            match self.import_part(&part) {
                Ok(outcome) => report.record(&outcome),
                Err(err) => {
                    warn!(part = %part.name, error = %err, "PART import failed");
                    report.failures.push(PartFailure {
                        part: part.name,
                        message: err.to_string(),
                    });
                }
            }
        }
        Ok(report)
    }

    /// Imports the PTF file at `path`.
    pub fn import_file(&mut self, path: impl AsRef<Path>) -> Result<ImportReport> {
        let file = File::open(path)?;
        self.import_reader(BufReader::new(file))
    }

    /// Writes every stored table as one PTF document.
    pub fn export<W: Write>(&self, out: W) -> Result<ExportReport> {
        export_tables(&self.conn, out)
    }

    /// Writes the PTF export to the file at `path`, replacing it.
    pub fn export_file(&self, path: impl AsRef<Path>) -> Result<ExportReport> {
        let file = File::create(path)?;
        self.export(BufWriter::new(file))
    }

    /// Lists every PART table with its row count.
    pub fn status(&self) -> Result<StoreStatus> {
        let mut status = StoreStatus::default();
        for name in list_tables(&self.conn)? {
            let Ok(table) = Identifier::table(&name) else {
                continue;
            };
            let Some(spec) = read_table_spec(&self.conn, &table)? else {
                continue;
            };
            let rows: i64 = self.conn.query_row(
                &format!("SELECT COUNT(*) FROM {table}"),
                [],
                |row| row.get(0),
            )?;
            status.tables.push(TableStatus {
                name,
                columns: spec.data_columns().count(),
                primary_columns: spec.primary_columns().len(),
                rows: usize::try_from(rows).unwrap_or(0),
            });
        }
        Ok(status)
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consumes the store and returns the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ptf_core::{Header, Record};

    fn part(name: &str, header: Header, rows: &[&[&str]]) -> Part {
        let mut part = Part::new(name, header);
        for row in rows {
            let record = Record::from_tokens(&part.header, row.iter().map(|t| t.to_string()));
            part.records.push(record);
        }
        part
    }

    #[test]
    fn test_import_part_creates_then_migrates() {
        let mut store = PartStore::open_in_memory().unwrap();
        let first = store
            .import_part(&part("T", Header::new(["A"], ["B"]), &[&["1", "x"]]))
            .unwrap();
        assert_eq!(first.reconciliation, Reconciliation::Created);

        let second = store
            .import_part(&part("T", Header::new(["A"], ["B", "C"]), &[&["2", "y", "z"]]))
            .unwrap();
        assert_eq!(
            second.reconciliation,
            Reconciliation::Migrated {
                added: vec!["C".to_string()]
            }
        );

        let status = store.status().unwrap();
        assert_eq!(status.tables.len(), 1);
        assert_eq!(status.tables[0].columns, 3);
        assert_eq!(status.total_rows(), 2);
    }

    #[test]
    fn test_invalid_part_name_is_reported_not_fatal() {
        let mut store = PartStore::open_in_memory().unwrap();
        let text = "\
FILE_TYPE=MULTI_PHYS_TABLE;
PART 'bad name'
:A=B;
1=x
END_PART
PART 'GOOD'
:A=B;
1=x
END_PART
END.
";
        let report = store.import_reader(text.as_bytes()).unwrap();
        assert_eq!(report.parts_imported, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].part, "bad name");
        assert!(!report.is_complete());
    }

    #[test]
    fn test_report_merge() {
        let mut total = ImportReport::default();
        total.merge(ImportReport {
            parts_imported: 2,
            rows_inserted: 5,
            ..Default::default()
        });
        total.merge(ImportReport {
            parts_imported: 1,
            rows_ignored: 3,
            ..Default::default()
        });
        assert_eq!(total.parts_imported, 3);
        assert_eq!(total.rows_inserted, 5);
        assert_eq!(total.rows_ignored, 3);
    }
}
