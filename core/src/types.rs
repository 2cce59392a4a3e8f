//! Data model for PTF documents.
//!
//! A [`Document`] is an ordered list of [`Part`]s. Each part is one logical
//! table: a [`Header`] describing its columns and the [`Record`]s read under
//! that header.

use std::collections::BTreeMap;

use crate::delimiter::{HIDDEN_KEY_SEPARATOR, OPT_MARKER};

/// The only `FILE_TYPE` value accepted by the tokenizer.
pub const FILE_TYPE_SENTINEL: &str = "MULTI_PHYS_TABLE";

/// Column layout of a PART.
///
/// Columns are unique and ordered: the first [`primary_count`](Self::primary_count)
/// are primary-key columns, the rest are secondary (value) columns. The
/// header also keeps the declared column sequence, duplicates included,
/// because data tokens are positional against the declaration.
///
/// # Examples
///
/// ```
/// use ptf_core::Header;
///
/// let header = Header::new(["PIN", "BANK(OPT)"], ["IO", "PIN"]);
/// assert_eq!(header.columns(), ["PIN", "BANK", "IO"]);
/// assert_eq!(header.primary_count(), 2);
/// assert_eq!(header.declared().len(), 4);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Header {
    declared: Vec<String>,
    columns: Vec<String>,
    primary_count: usize,
    declared_primary: usize,
}

impl Header {
    /// Builds a header from primary and secondary column declarations.
    ///
    /// `(OPT)` markers and surrounding whitespace are stripped, empty names
    /// are dropped and a repeated name keeps only its first position.
    pub fn new<P, S>(primary: P, secondary: S) -> Self
    where
        P: IntoIterator,
        P::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        let mut header = Header::default();
        for name in primary {
            header.declare(name.as_ref());
        }
        header.primary_count = header.columns.len();
        header.declared_primary = header.declared.len();
        for name in secondary {
            header.declare(name.as_ref());
        }
        header
    }

    fn declare(&mut self, raw: &str) {
        let name = raw.replace(OPT_MARKER, "").trim().to_string();
        if !name.is_empty() && !self.columns.contains(&name) {
            self.columns.push(name.clone());
        }
        self.declared.push(name);
    }

    /// Unique column names, primary columns first.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Column names as declared, including duplicates and empty slots.
    pub fn declared(&self) -> &[String] {
        &self.declared
    }

    /// Number of leading primary-key columns.
    pub fn primary_count(&self) -> usize {
        self.primary_count
    }

    /// Number of primary slots as declared, duplicates and empty names
    /// included. Data lines carry one primary field per slot.
    pub fn declared_primary_count(&self) -> usize {
        self.declared_primary
    }

    pub fn primary_columns(&self) -> &[String] {
        &self.columns[..self.primary_count]
    }

    pub fn secondary_columns(&self) -> &[String] {
        &self.columns[self.primary_count..]
    }

    /// Position of `name` among the unique columns.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// A header can back a table only if it declares at least one primary column.
    pub fn is_usable(&self) -> bool {
        self.primary_count >= 1
    }
}

/// One data line of a PART, keyed by column name.
///
/// A record holds at most one value per header column. Columns the line did
/// not supply are simply absent and are stored as `NULL`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Record {
    values: BTreeMap<String, String>,
}

impl Record {
    /// Pairs tokens with the declared header columns positionally.
    ///
    /// Pairing stops at the shorter of the two sequences. When a column is
    /// declared twice the value at its first position wins; tokens under an
    /// empty declaration are skipped.
    pub fn from_tokens<I>(header: &Header, tokens: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut values = BTreeMap::new();
        for (column, token) in header.declared().iter().zip(tokens) {
            if column.is_empty() {
                continue;
            }
            values.entry(column.clone()).or_insert(token);
        }
        Self { values }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Storage-only uniqueness key: the primary values joined with `,`.
    ///
    /// Missing primary values contribute an empty string. The key depends on
    /// the header in effect when the record is written.
    pub fn hidden_key(&self, header: &Header) -> String {
        header
            .primary_columns()
            .iter()
            .map(|column| self.get(column).unwrap_or(""))
            .collect::<Vec<_>>()
            .join(HIDDEN_KEY_SEPARATOR)
    }
}

/// A named section of a PTF document: one logical table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub header: Header,
    pub records: Vec<Record>,
}

impl Part {
    pub fn new(name: impl Into<String>, header: Header) -> Self {
        Self {
            name: name.into(),
            header,
            records: Vec::new(),
        }
    }
}

/// A fully parsed PTF file.
///
/// Imports stream parts one at a time through
/// [`PtfReader`](crate::PtfReader); a whole document is only built by
/// [`parse_document`](crate::parse_document).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub file_type: Option<String>,
    pub parts: Vec<Part>,
}

impl Document {
    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|p| p.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_strips_opt_and_dedups() {
        let header = Header::new(["A", "B(OPT)"], ["C", "A", " D (OPT) "]);
        assert_eq!(header.columns(), ["A", "B", "C", "D"]);
        assert_eq!(header.primary_columns(), ["A", "B"]);
        assert_eq!(header.secondary_columns(), ["C", "D"]);
        assert_eq!(header.declared(), ["A", "B", "C", "A", "D"]);
    }

    #[test]
    fn test_header_duplicate_primary_counts_once() {
        let header = Header::new(["A", "A", "B"], ["C"]);
        assert_eq!(header.primary_count(), 2);
        assert_eq!(header.primary_columns(), ["A", "B"]);
    }

    #[test]
    fn test_declared_primary_count_keeps_duplicates() {
        let header = Header::new(["A", "A", "B"], ["C"]);
        assert_eq!(header.declared_primary_count(), 3);
        assert_eq!(header.primary_count(), 2);

        let header = Header::new(["A", ""], ["C"]);
        assert_eq!(header.declared_primary_count(), 2);
        assert_eq!(header.primary_count(), 1);
    }

    #[test]
    fn test_header_drops_empty_names() {
        let header = Header::new(["A"], [""]);
        assert_eq!(header.columns(), ["A"]);
        assert!(header.secondary_columns().is_empty());
        assert!(header.is_usable());
        assert!(!Header::new(Vec::<String>::new(), ["X"]).is_usable());
    }

    #[test]
    fn test_record_truncates_to_shorter_side() {
        let header = Header::new(["A"], ["B", "C"]);
        let record = Record::from_tokens(&header, vec!["1".to_string(), "x".to_string()]);
        assert_eq!(record.get("A"), Some("1"));
        assert_eq!(record.get("B"), Some("x"));
        assert_eq!(record.get("C"), None);

        let record = Record::from_tokens(
            &header,
            ["1", "x", "y", "extra"].map(String::from),
        );
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_record_duplicate_column_keeps_first_value() {
        let header = Header::new(["A"], ["B", "A"]);
        let record = Record::from_tokens(&header, ["1", "x", "2"].map(String::from));
        assert_eq!(record.get("A"), Some("1"));
    }

    #[test]
    fn test_hidden_key_joins_primary_values() {
        let header = Header::new(["A", "B"], ["C"]);
        let record = Record::from_tokens(&header, ["'1'", "'2'", "'x'"].map(String::from));
        assert_eq!(record.hidden_key(&header), "'1','2'");

        let short = Record::from_tokens(&header, ["'1'"].map(String::from));
        assert_eq!(short.hidden_key(&header), "'1',");
    }
}
