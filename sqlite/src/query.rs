//! Read access to stored PART tables and PTF export.
//!
//! Tables are visited in lexicographic order. Each one is rendered as a
//! `PART` block whose header is rebuilt from the table's primary-key flags,
//! with the hidden key left out.

use std::io::Write;

use ptf_core::{Header, PtfWriter};
use rusqlite::Connection;
use tracing::{debug, warn};

use crate::convert::load_rows;
use crate::error::{Result, StoreError};
use crate::schema::{Identifier, list_tables, read_table_spec};

/// A stored table as it will be exported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredTable {
    pub name: String,
    pub header: Header,
    /// One value per header column, ordered by the first primary column.
    pub rows: Vec<Vec<Option<String>>>,
}

/// Summary of an export run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportReport {
    pub tables_exported: usize,
    pub rows_exported: usize,
    /// Tables that could not be expressed as a PART.
    pub tables_skipped: Vec<String>,
}

/// Loads one table with its reconstructed header.
///
/// # Errors
///
/// Returns [`StoreError::TableNotFound`] if no such table exists.
pub fn read_table(conn: &Connection, name: &str) -> Result<StoredTable> {
    let table = Identifier::table(name)?;
    let spec = read_table_spec(conn, &table)?
        .ok_or_else(|| StoreError::TableNotFound(name.to_string()))?;
    let rows = load_rows(conn, &spec)?;
    Ok(StoredTable {
        name: name.to_string(),
        header: spec.header(),
        rows,
    })
}

/// Writes every stored table to `out` as one PTF document.
///
/// Tables whose names are not valid identifiers or that have no primary
/// key cannot round-trip through PTF; they are skipped and listed in the
/// report.
pub fn export_tables<W: Write>(conn: &Connection, out: W) -> Result<ExportReport> {
    let mut writer = PtfWriter::new(out)?;
    let mut report = ExportReport::default();

    for name in list_tables(conn)? {
        let table = match read_table(conn, &name) {
            Ok(table) => table,
            Err(StoreError::InvalidIdentifier(_)) => {
                warn!(table = %name, "table or column name not representable; skipping");
                report.tables_skipped.push(name);
                continue;
            }
            Err(err) => return Err(err),
        };
        if !table.header.is_usable() {
            warn!(table = %name, "table has no primary key; skipping");
            report.tables_skipped.push(name);
            continue;
        }

        let rows = table.rows.len();
        writer.write_part(&table.name, &table.header, table.rows)?;
        debug!(table = %name, rows, "exported table");
        report.tables_exported += 1;
        report.rows_exported += rows;
    }

    writer.finish()?;
    Ok(report)
}
