//! Conversion between PTF records and SQLite rows.
//!
//! Records are written with `INSERT OR IGNORE`: a row whose hidden key or
//! primary key is already present is skipped, never overwritten. Rows are
//! read back as one optional text value per visible column.

use ptf_core::{Header, Record};
use rusqlite::{Connection, params_from_iter};

use crate::error::Result;
use crate::schema::{Identifier, TableSpec, insert_or_ignore_sql, select_rows_sql};

/// Rows written and rows skipped as duplicates by one insert batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertCounts {
    pub inserted: usize,
    pub ignored: usize,
}

/// Inserts `records` into `table`, computing each hidden key from `header`.
///
/// Columns a record lacks are written as `NULL`. The table must already
/// hold every header column (see
/// [`SchemaReconciler`](crate::SchemaReconciler)).
pub fn insert_records(
    conn: &Connection,
    table: &Identifier,
    header: &Header,
    records: &[Record],
) -> Result<InsertCounts> {
    let mut columns = Vec::with_capacity(header.len() + 1);
    columns.push(Identifier::hidden_key());
    for name in header.columns() {
        columns.push(Identifier::column(name)?);
    }

    let mut stmt = conn.prepare(&insert_or_ignore_sql(table, &columns))?;
    let mut counts = InsertCounts::default();
    for record in records {
        let key = record.hidden_key(header);
        let values = std::iter::once(Some(key.as_str()))
            .chain(header.columns().iter().map(|column| record.get(column)));
        if stmt.execute(params_from_iter(values))? == 0 {
            counts.ignored += 1;
        } else {
            counts.inserted += 1;
        }
    }
    Ok(counts)
}

/// Loads every row of `spec`'s table as values aligned with
/// [`TableSpec::header`], ordered by the first primary column.
pub(crate) fn load_rows(conn: &Connection, spec: &TableSpec) -> Result<Vec<Vec<Option<String>>>> {
    let primary = spec.primary_columns();
    let Some(first) = primary.first() else {
        return Ok(Vec::new());
    };
    let columns: Vec<Identifier> = primary
        .iter()
        .map(|c| c.name.clone())
        .chain(spec.secondary_columns().iter().map(|c| c.name.clone()))
        .collect();

    let mut stmt = conn.prepare(&select_rows_sql(&spec.name, &columns, &first.name))?;
    let width = columns.len();
    let rows = stmt
        .query_map([], |row| {
            (0..width)
                .map(|idx| row.get::<_, Option<String>>(idx))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
