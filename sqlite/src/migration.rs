//! Additive schema reconciliation for PART tables.
//!
//! [`SchemaReconciler`] brings a persisted table in line with an incoming
//! [`Header`]: a missing table is created, a table lacking some header
//! columns is rebuilt with those columns added, and a table that already has
//! every column is left alone. Existing rows and their values always
//! survive.
//!
//! A rebuild renames the table aside, creates the target layout, copies the
//! old rows over and drops the renamed table. The reconciler runs on the
//! caller's transaction, so the four steps commit or roll back together.
//!
//! # Example
//!
//! ```
//! use ptf_core::Header;
//! use ptf_sqlite::{Identifier, Reconciliation, SchemaReconciler};
//! use rusqlite::Connection;
//!
//! let mut conn = Connection::open_in_memory().unwrap();
//! let table = Identifier::table("PINS").unwrap();
//!
//! let tx = conn.transaction().unwrap();
//! let mut reconciler = SchemaReconciler::inspect(&tx, table.clone()).unwrap();
//! let outcome = reconciler.reconcile(&Header::new(["PIN"], ["IO"])).unwrap();
//! assert_eq!(outcome, Reconciliation::Created);
//!
//! let mut reconciler = SchemaReconciler::inspect(&tx, table).unwrap();
//! let outcome = reconciler.reconcile(&Header::new(["PIN"], ["IO", "DRIVE"])).unwrap();
//! assert_eq!(outcome, Reconciliation::Migrated { added: vec!["DRIVE".to_string()] });
//! tx.commit().unwrap();
//! ```

use ptf_core::Header;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::{Result, StoreError};
use crate::schema::{
    ColumnSpec, Identifier, TableSpec, copy_rows_sql, drop_table_sql, read_table_spec,
    rename_table_sql,
};

/// Lifecycle of a PART table during one reconciliation.
///
/// Legal transitions: `Absent → Created → Stable` for a new table and
/// `Stable → Migrating → Stable` for a rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableState {
    /// No table of that name exists.
    Absent,
    /// The table was just created from the incoming header.
    Created,
    /// The rename/create/copy/drop rebuild is in progress.
    Migrating,
    /// The table matches every header seen so far.
    Stable,
}

impl TableState {
    fn can_become(self, next: TableState) -> bool {
        matches!(
            (self, next),
            (TableState::Absent, TableState::Created)
                | (TableState::Created, TableState::Stable)
                | (TableState::Stable, TableState::Migrating)
                | (TableState::Migrating, TableState::Stable)
        )
    }
}

/// What a reconciliation did to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reconciliation {
    Created,
    Unchanged,
    Migrated {
        /// Header columns that were added, in header order.
        added: Vec<String>,
    },
}

/// Target layout for a rebuild, computed entirely in memory before any
/// statement runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationPlan {
    pub current: TableSpec,
    pub target: TableSpec,
    pub added: Vec<String>,
}

impl MigrationPlan {
    /// Computes the target layout, or `None` when nothing is missing.
    ///
    /// Each missing column is inserted at its index in the new header
    /// (counting visible columns only) and joins the primary key when that
    /// index is below the header's primary count. Existing key columns keep
    /// their key positions; new key columns follow them in header order.
    pub fn build(current: &TableSpec, header: &Header) -> Result<Option<Self>> {
        let mut visible: Vec<ColumnSpec> = current.data_columns().cloned().collect();
        let mut next_ordinal = visible
            .iter()
            .filter_map(|c| c.primary_ordinal)
            .max()
            .unwrap_or(0)
            + 1;
        let mut added = Vec::new();

        for (idx, name) in header.columns().iter().enumerate() {
            if current.column(name).is_some() {
                continue;
            }
            let primary_ordinal = if idx < header.primary_count() {
                next_ordinal += 1;
                Some(next_ordinal - 1)
            } else {
                None
            };
            let column = ColumnSpec {
                name: Identifier::column(name)?,
                primary_ordinal,
            };
            visible.insert(idx.min(visible.len()), column);
            added.push(name.clone());
        }

        let missing_hidden_key = !current.has_hidden_key();
        if added.is_empty() && !missing_hidden_key {
            return Ok(None);
        }

        let mut columns = Vec::with_capacity(visible.len() + 1);
        columns.push(match current.columns.iter().find(|c| c.is_hidden_key()) {
            Some(hidden) => hidden.clone(),
            None => ColumnSpec {
                name: Identifier::hidden_key(),
                primary_ordinal: None,
            },
        });
        columns.extend(visible);

        Ok(Some(Self {
            current: current.clone(),
            target: TableSpec {
                name: current.name.clone(),
                columns,
            },
            added,
        }))
    }

    /// Runs the rebuild on `conn`, which should be an open transaction.
    pub fn apply(&self, conn: &Connection) -> Result<()> {
        let table = &self.target.name;
        let aside = table.migration_alias();
        let carried: Vec<Identifier> = self
            .current
            .columns
            .iter()
            .map(|c| c.name.clone())
            .collect();

        conn.execute(&rename_table_sql(table, &aside), [])
            .map_err(|e| migration_error(table, "rename table aside", e))?;
        conn.execute(&self.target.create_sql(), [])
            .map_err(|e| migration_error(table, "create target table", e))?;
        let copied = conn
            .execute(&copy_rows_sql(&aside, table, &carried), [])
            .map_err(|e| migration_error(table, "copy rows", e))?;
        conn.execute(&drop_table_sql(&aside), [])
            .map_err(|e| migration_error(table, "drop old table", e))?;

        debug!(table = table.as_str(), rows = copied, "rebuilt table");
        Ok(())
    }
}

fn migration_error(table: &Identifier, step: &str, err: rusqlite::Error) -> StoreError {
    StoreError::MigrationError(format!("failed to {step} for {}: {err}", table.as_str()))
}

/// Drives one table through [`TableState`] to match a header.
pub struct SchemaReconciler<'a> {
    conn: &'a Connection,
    table: Identifier,
    state: TableState,
    spec: Option<TableSpec>,
}

impl<'a> SchemaReconciler<'a> {
    /// Reads the current layout of `table`.
    pub fn inspect(conn: &'a Connection, table: Identifier) -> Result<Self> {
        let spec = read_table_spec(conn, &table)?;
        let state = if spec.is_some() {
            TableState::Stable
        } else {
            TableState::Absent
        };
        Ok(Self {
            conn,
            table,
            state,
            spec,
        })
    }

    pub fn state(&self) -> TableState {
        self.state
    }

    /// Layout after the last successful step.
    pub fn table_spec(&self) -> Option<&TableSpec> {
        self.spec.as_ref()
    }

    /// Creates or extends the table so that it holds every column of
    /// `header`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidIdentifier`] for unusable column names
    /// and [`StoreError::MigrationError`] when a rebuild step fails. On error
    /// the caller must roll back its transaction.
    pub fn reconcile(&mut self, header: &Header) -> Result<Reconciliation> {
        if !header.is_usable() {
            return Err(StoreError::MigrationError(format!(
                "header for {} declares no primary columns",
                self.table.as_str()
            )));
        }

        let Some(current) = self.spec.as_ref() else {
            let spec = TableSpec::for_header(self.table.clone(), header)?;
            self.conn
                .execute(&spec.create_sql(), [])
                .map_err(|e| migration_error(&self.table, "create table", e))?;
            self.transition(TableState::Created)?;
            info!(table = self.table.as_str(), columns = header.len(), "created table");
            self.spec = Some(spec);
            self.transition(TableState::Stable)?;
            return Ok(Reconciliation::Created);
        };

        let Some(plan) = MigrationPlan::build(current, header)? else {
            return Ok(Reconciliation::Unchanged);
        };

        self.transition(TableState::Migrating)?;
        plan.apply(self.conn)?;
        info!(table = self.table.as_str(), added = ?plan.added, "migrated table");
        self.spec = Some(plan.target);
        self.transition(TableState::Stable)?;
        Ok(Reconciliation::Migrated { added: plan.added })
    }

    fn transition(&mut self, next: TableState) -> Result<()> {
        if !self.state.can_become(next) {
            return Err(StoreError::MigrationError(format!(
                "illegal state change {:?} -> {:?} for {}",
                self.state,
                next,
                self.table.as_str()
            )));
        }
        self.state = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::params;

    fn table(name: &str) -> Identifier {
        Identifier::table(name).unwrap()
    }

    fn create(conn: &Connection, name: &str, header: &Header) {
        let mut reconciler = SchemaReconciler::inspect(conn, table(name)).unwrap();
        assert_eq!(reconciler.reconcile(header).unwrap(), Reconciliation::Created);
        assert_eq!(reconciler.state(), TableState::Stable);
    }

    #[test]
    fn test_state_transitions() {
        assert!(TableState::Absent.can_become(TableState::Created));
        assert!(TableState::Stable.can_become(TableState::Migrating));
        assert!(!TableState::Absent.can_become(TableState::Migrating));
        assert!(!TableState::Created.can_become(TableState::Migrating));
    }

    #[test]
    fn test_unchanged_when_header_already_covered() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn, "T", &Header::new(["A"], ["B", "C"]));

        let mut reconciler = SchemaReconciler::inspect(&conn, table("T")).unwrap();
        assert_eq!(reconciler.state(), TableState::Stable);
        let outcome = reconciler.reconcile(&Header::new(["A"], ["C"])).unwrap();
        assert_eq!(outcome, Reconciliation::Unchanged);
    }

    #[test]
    fn test_header_match_is_case_insensitive() {
        let conn = Connection::open_in_memory().unwrap();
        create(&conn, "T", &Header::new(["PIN"], ["IO"]));
        let mut reconciler = SchemaReconciler::inspect(&conn, table("T")).unwrap();
        let outcome = reconciler.reconcile(&Header::new(["pin"], ["io"])).unwrap();
        assert_eq!(outcome, Reconciliation::Unchanged);
    }

    #[test]
    fn test_plan_inserts_columns_at_header_position() {
        let current = TableSpec::for_header(table("T"), &Header::new(["A"], ["C"])).unwrap();
        let plan = MigrationPlan::build(&current, &Header::new(["A"], ["B", "C", "D"]))
            .unwrap()
            .unwrap();
        let names: Vec<&str> = plan.target.columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, ["_KEY_", "A", "B", "C", "D"]);
        assert_eq!(plan.added, ["B", "D"]);
    }

    #[test]
    fn test_plan_new_primary_column_follows_existing_key() {
        let current = TableSpec::for_header(table("T"), &Header::new(["A"], ["C"])).unwrap();
        let plan = MigrationPlan::build(&current, &Header::new(["Z", "A"], ["C"]))
            .unwrap()
            .unwrap();
        let primary: Vec<&str> = plan
            .target
            .primary_columns()
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(primary, ["A", "Z"]);
        assert_eq!(plan.target.columns[1].name.as_str(), "Z");
    }

    #[test]
    fn test_migration_preserves_rows() {
        let mut conn = Connection::open_in_memory().unwrap();
        create(&conn, "T", &Header::new(["A"], ["B"]));
        conn.execute(
            "INSERT INTO \"T\" (\"_KEY_\", \"A\", \"B\") VALUES (?1, ?2, ?3)",
            params!["1", "1", "x"],
        )
        .unwrap();

        let tx = conn.transaction().unwrap();
        let mut reconciler = SchemaReconciler::inspect(&tx, table("T")).unwrap();
        let outcome = reconciler.reconcile(&Header::new(["A"], ["B", "C"])).unwrap();
        assert_eq!(
            outcome,
            Reconciliation::Migrated {
                added: vec!["C".to_string()]
            }
        );
        tx.commit().unwrap();

        let (key, a, b, c): (String, String, String, Option<String>) = conn
            .query_row("SELECT \"_KEY_\", A, B, C FROM T", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .unwrap();
        assert_eq!((key.as_str(), a.as_str(), b.as_str()), ("1", "1", "x"));
        assert_eq!(c, None);

        let leftover: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'T__ptf_old'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(leftover, 0);
    }

    #[test]
    fn test_failed_migration_rolls_back() {
        let mut conn = Connection::open_in_memory().unwrap();
        create(&conn, "T", &Header::new(["A"], ["B"]));
        conn.execute_batch("INSERT INTO T (\"_KEY_\", A, B) VALUES ('1', '1', 'x');")
            .unwrap();
        // Occupy the temporary name so the rename step fails.
        conn.execute_batch("CREATE TABLE \"T__ptf_old\" (x TEXT);").unwrap();

        {
            let tx = conn.transaction().unwrap();
            let mut reconciler = SchemaReconciler::inspect(&tx, table("T")).unwrap();
            let err = reconciler
                .reconcile(&Header::new(["A"], ["B", "C"]))
                .unwrap_err();
            assert!(matches!(err, StoreError::MigrationError(_)));
            assert_eq!(reconciler.state(), TableState::Migrating);
        }

        let spec = read_table_spec(&conn, &table("T")).unwrap().unwrap();
        assert!(spec.column("C").is_none());
        let b: String = conn
            .query_row("SELECT B FROM T WHERE A = '1'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(b, "x");
    }

    #[test]
    fn test_reconcile_rejects_header_without_primary() {
        let conn = Connection::open_in_memory().unwrap();
        let mut reconciler = SchemaReconciler::inspect(&conn, table("T")).unwrap();
        let err = reconciler
            .reconcile(&Header::new(Vec::<String>::new(), ["B"]))
            .unwrap_err();
        assert!(matches!(err, StoreError::MigrationError(_)));
        assert_eq!(reconciler.state(), TableState::Absent);
    }
}
