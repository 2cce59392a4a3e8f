//! Typed SQL statement builder for PART tables.
//!
//! Table and column names come from PTF file content, so every name is
//! wrapped in an [`Identifier`] that has passed an allow-list check before
//! it can reach a statement. Statements are only ever built from
//! identifiers; values always travel as bound parameters.
//!
//! # Table structure
//!
//! Every PART table has the same shape:
//!
//! ```sql
//! CREATE TABLE "PINS" (
//!     "_KEY_" TEXT,
//!     "PIN" TEXT,
//!     "BANK" TEXT,
//!     "IO_STD" TEXT,
//!     PRIMARY KEY ("PIN", "BANK"),
//!     UNIQUE ("_KEY_")
//! )
//! ```
//!
//! `_KEY_` is the hidden key: the primary values joined with `,`.

use std::fmt;
use std::sync::LazyLock;

use ptf_core::Header;
use regex::Regex;
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Name of the hidden uniqueness column present in every PART table.
pub const HIDDEN_KEY_COLUMN: &str = "_KEY_";

/// Suffix of the temporary name a table is renamed to while it is rebuilt.
pub(crate) const MIGRATION_SUFFIX: &str = "__ptf_old";

const RESERVED_TABLE_PREFIX: &str = "sqlite_";

static IDENTIFIER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_$#.\-]{1,128}$").expect("static regex must compile")
});

/// A table or column name that is safe to interpolate into SQL.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identifier(String);

impl Identifier {
    /// Validates a PART name for use as a table name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidIdentifier`] for names outside the
    /// allow-list, names in SQLite's reserved `sqlite_` namespace, and names
    /// that collide with the temporary migration name.
    pub fn table(name: &str) -> Result<Self> {
        let ident = Self::checked(name)?;
        let lower = name.to_ascii_lowercase();
        if lower.starts_with(RESERVED_TABLE_PREFIX) || lower.ends_with(MIGRATION_SUFFIX) {
            return Err(StoreError::InvalidIdentifier(name.to_string()));
        }
        Ok(ident)
    }

    /// Validates a header name for use as a column name.
    ///
    /// The hidden key column name is reserved.
    pub fn column(name: &str) -> Result<Self> {
        if name.eq_ignore_ascii_case(HIDDEN_KEY_COLUMN) {
            return Err(StoreError::InvalidIdentifier(name.to_string()));
        }
        Self::checked(name)
    }

    pub(crate) fn hidden_key() -> Self {
        Self(HIDDEN_KEY_COLUMN.to_string())
    }

    fn checked(name: &str) -> Result<Self> {
        if IDENTIFIER_RE.is_match(name) {
            Ok(Self(name.to_string()))
        } else {
            Err(StoreError::InvalidIdentifier(name.to_string()))
        }
    }

    /// The temporary name used while this table is rebuilt.
    pub(crate) fn migration_alias(&self) -> Self {
        Self(format!("{}{MIGRATION_SUFFIX}", self.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// SQLite name comparison is ASCII case-insensitive.
    pub fn matches(&self, name: &str) -> bool {
        self.0.eq_ignore_ascii_case(name)
    }
}

/// Renders the identifier double-quoted, ready for SQL.
impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

/// One persisted column and its place in the primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: Identifier,
    /// 1-based position in the composite primary key, if part of it.
    pub primary_ordinal: Option<usize>,
}

impl ColumnSpec {
    pub fn is_hidden_key(&self) -> bool {
        self.name.matches(HIDDEN_KEY_COLUMN)
    }
}

/// In-memory description of a PART table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: Identifier,
    /// Columns in table order, hidden key included.
    pub columns: Vec<ColumnSpec>,
}

impl TableSpec {
    /// Layout of a fresh table for `header`: hidden key first, then one
    /// column per header entry, the first `primary_count` forming the key.
    pub fn for_header(name: Identifier, header: &Header) -> Result<Self> {
        let mut columns = vec![ColumnSpec {
            name: Identifier::hidden_key(),
            primary_ordinal: None,
        }];
        for (idx, column) in header.columns().iter().enumerate() {
            columns.push(ColumnSpec {
                name: Identifier::column(column)?,
                primary_ordinal: (idx < header.primary_count()).then_some(idx + 1),
            });
        }
        Ok(Self { name, columns })
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name.matches(name))
    }

    pub fn has_hidden_key(&self) -> bool {
        self.columns.iter().any(ColumnSpec::is_hidden_key)
    }

    /// Visible columns, in table order.
    pub fn data_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.is_hidden_key())
    }

    /// Primary-key columns ordered by key position.
    pub fn primary_columns(&self) -> Vec<&ColumnSpec> {
        let mut primary: Vec<_> = self
            .data_columns()
            .filter(|c| c.primary_ordinal.is_some())
            .collect();
        primary.sort_by_key(|c| c.primary_ordinal);
        primary
    }

    pub fn secondary_columns(&self) -> Vec<&ColumnSpec> {
        self.data_columns()
            .filter(|c| c.primary_ordinal.is_none())
            .collect()
    }

    /// Reconstructs the PTF header: primary columns in key order, then the
    /// rest in table order.
    pub fn header(&self) -> Header {
        Header::new(
            self.primary_columns().iter().map(|c| c.name.as_str()),
            self.secondary_columns().iter().map(|c| c.name.as_str()),
        )
    }

    /// `CREATE TABLE` statement for this layout.
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| format!("{} TEXT", c.name))
            .collect();
        let primary = self.primary_columns();
        if !primary.is_empty() {
            parts.push(format!("PRIMARY KEY ({})", join_idents(primary.into_iter().map(|c| &c.name))));
        }
        if self.has_hidden_key() {
            parts.push(format!("UNIQUE ({})", Identifier::hidden_key()));
        }
        format!("CREATE TABLE {} ({})", self.name, parts.join(", "))
    }
}

fn join_idents<'a>(idents: impl IntoIterator<Item = &'a Identifier>) -> String {
    idents
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `INSERT OR IGNORE` of one row into the given columns.
pub fn insert_or_ignore_sql(table: &Identifier, columns: &[Identifier]) -> String {
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    format!(
        "INSERT OR IGNORE INTO {table} ({}) VALUES ({})",
        join_idents(columns),
        placeholders.join(", ")
    )
}

pub fn rename_table_sql(from: &Identifier, to: &Identifier) -> String {
    format!("ALTER TABLE {from} RENAME TO {to}")
}

pub fn drop_table_sql(table: &Identifier) -> String {
    format!("DROP TABLE {table}")
}

/// Copies the given columns from one table into another.
pub fn copy_rows_sql(from: &Identifier, to: &Identifier, columns: &[Identifier]) -> String {
    let columns = join_idents(columns);
    format!("INSERT INTO {to} ({columns}) SELECT {columns} FROM {from}")
}

/// `SELECT` of the given columns ordered by `order_by` ascending.
pub fn select_rows_sql(table: &Identifier, columns: &[Identifier], order_by: &Identifier) -> String {
    format!(
        "SELECT {} FROM {table} ORDER BY {order_by} ASC",
        join_idents(columns)
    )
}

/// Reads the persisted layout of `table`, or `None` if it does not exist.
pub fn read_table_spec(conn: &Connection, table: &Identifier) -> Result<Option<TableSpec>> {
    let mut stmt =
        conn.prepare("SELECT name, pk FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = stmt
        .query_map([table.as_str()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    if rows.is_empty() {
        return Ok(None);
    }

    let mut columns = Vec::with_capacity(rows.len());
    for (name, pk) in rows {
        let name = if name.eq_ignore_ascii_case(HIDDEN_KEY_COLUMN) {
            Identifier::hidden_key()
        } else {
            Identifier::column(&name)?
        };
        columns.push(ColumnSpec {
            name,
            primary_ordinal: usize::try_from(pk).ok().filter(|&pk| pk > 0),
        });
    }
    Ok(Some(TableSpec {
        name: table.clone(),
        columns,
    }))
}

/// Names of all user tables, in lexicographic order.
pub fn list_tables(conn: &Connection) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type = 'table' \
         AND substr(name, 1, 7) <> 'sqlite_' ORDER BY name ASC",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(names)
}
