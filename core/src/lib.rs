//! Data model, tokenizer and serializer for the PTF multi-table text format.
//!
//! A PTF file is a sequence of `PART` sections, each describing one table:
//!
//! - [`Header`]: ordered, unique column names; the leading ones form the
//!   primary key.
//! - [`Record`]: one data line, keyed by column name.
//! - [`Part`] / [`Document`]: a named table and a whole file.
//!
//! [`PtfReader`] streams parts out of any buffered reader and
//! [`PtfWriter`] writes them back using the same delimiter rules (see
//! [`delimiter`]).
//!
//! # Example
//!
//! ```
//! use ptf_core::{parse_document, write_document};
//!
//! let text = "\
//! FILE_TYPE=MULTI_PHYS_TABLE;
//! PART 'PINS'
//! :PIN|BANK=IO_STD;
//! 'A1'|'0'='LVCMOS18'
//! END_PART
//! END.
//! ";
//! let doc = parse_document(text).unwrap();
//! let pins = doc.part("PINS").unwrap();
//! assert_eq!(pins.header.primary_columns(), ["PIN", "BANK"]);
//! assert_eq!(pins.records[0].get("IO_STD"), Some("'LVCMOS18'"));
//!
//! let again = parse_document(&write_document(&doc).unwrap()).unwrap();
//! assert_eq!(doc, again);
//! ```

mod config;
pub mod delimiter;
mod error;
mod serializer;
mod tokenizer;
mod types;

pub use config::{
    DEFAULT_DB_FILE, DEFAULT_EXTENSION, DEFAULT_PTF_DIR, DEFAULT_PTF_FILE, ManagerConfig,
};
pub use error::{PtfError, Result};
pub use serializer::{PtfWriter, write_document};
pub use tokenizer::{LineOutcome, ParserState, PtfReader, parse_document, tokenize_record};
pub use types::{Document, FILE_TYPE_SENTINEL, Header, Part, Record};
