//! SQLite storage for PTF parts.
//!
//! Each PART of a PTF document maps to one table holding a hidden `_KEY_`
//! column plus one TEXT column per header entry, with a composite primary
//! key over the declared primary columns. Re-importing a PART with a wider
//! header adds the new columns in place without losing rows.
//!
//! # Architecture
//!
//! The crate is organized into five modules:
//!
//! - **`schema`**: identifier allow-list and typed SQL statement builder
//! - **`migration`**: additive schema reconciliation (create / rebuild)
//! - **`convert`**: record ↔ row transformations (`INSERT OR IGNORE`)
//! - **`query`**: table reads and PTF export
//! - **`store`**: [`PartStore`], one transaction per PART
//!
//! # Quick start
//!
//! ```no_run
//! use ptf_sqlite::PartStore;
//!
//! let mut store = PartStore::open("part_table.db").unwrap();
//! let report = store.import_file("pins.ptf").unwrap();
//! println!("Imported {} part(s)", report.parts_imported);
//!
//! store.export_file("part_table.ptf").unwrap();
//! ```

mod convert;
mod error;
mod migration;
mod query;
mod schema;
mod store;

pub use convert::{InsertCounts, insert_records};
pub use error::{Result, StoreError};
pub use migration::{MigrationPlan, Reconciliation, SchemaReconciler, TableState};
pub use query::{ExportReport, StoredTable, export_tables, read_table};
pub use schema::{ColumnSpec, HIDDEN_KEY_COLUMN, Identifier, TableSpec, list_tables, read_table_spec};
pub use store::{ImportReport, PartFailure, PartOutcome, PartStore, StoreStatus, TableStatus};
