//! PTF serializer, the inverse of the tokenizer.
//!
//! Output always starts with `FILE_TYPE=MULTI_PHYS_TABLE;` and ends with
//! `END.`. Rows are written as `primaryVals=secondaryVals`, values joined by
//! `|`, with `''` standing in for missing or empty values.

use std::io::Write;

use crate::delimiter::{FIELD_SEPARATOR, KEY_SEPARATOR, render_value};
use crate::error::Result;
use crate::tokenizer::guard_data_line;
use crate::types::{Document, FILE_TYPE_SENTINEL, Header, Part};

/// Streaming writer for PTF documents.
///
/// # Examples
///
/// ```
/// use ptf_core::{Header, PtfWriter};
///
/// let header = Header::new(["K"], ["V"]);
/// let mut writer = PtfWriter::new(Vec::new()).unwrap();
/// writer
///     .write_part("T", &header, vec![vec![Some("'1'".to_string()), None]])
///     .unwrap();
/// let text = String::from_utf8(writer.finish().unwrap()).unwrap();
/// assert!(text.contains("'1'=''\n"));
/// assert!(text.ends_with("END.\n"));
/// ```
pub struct PtfWriter<W: Write> {
    out: W,
    parts_written: usize,
}

impl<W: Write> PtfWriter<W> {
    /// Starts a document by writing the `FILE_TYPE` directive.
    pub fn new(mut out: W) -> Result<Self> {
        writeln!(out, "FILE_TYPE={FILE_TYPE_SENTINEL};")?;
        Ok(Self {
            out,
            parts_written: 0,
        })
    }

    /// Writes one `PART` block.
    ///
    /// Each row holds one value per column of `header`, in column order.
    /// Short rows are padded with `''`.
    pub fn write_part<I>(&mut self, name: &str, header: &Header, rows: I) -> Result<()>
    where
        I: IntoIterator<Item = Vec<Option<String>>>,
    {
        writeln!(self.out)?;
        writeln!(self.out, "PART '{name}'")?;
        writeln!(
            self.out,
            ":{}{KEY_SEPARATOR}{};",
            join_names(header.primary_columns()),
            join_names(header.secondary_columns())
        )?;

        let separator = FIELD_SEPARATOR.to_string();
        let primary_count = header.primary_count();
        for row in rows {
            // The last value of each half is followed by `=` or the line end.
            let values: Vec<String> = (0..header.len())
                .map(|idx| {
                    let before_separator = idx + 1 != primary_count && idx + 1 != header.len();
                    render_value(row.get(idx).and_then(Option::as_deref), before_separator)
                        .into_owned()
                })
                .collect();
            let (primary, secondary) = values.split_at(primary_count);
            let line = format!(
                "{}{KEY_SEPARATOR}{}",
                primary.join(separator.as_str()),
                secondary.join(separator.as_str())
            );
            writeln!(self.out, "{}", guard_data_line(line))?;
        }

        writeln!(self.out, "END_PART")?;
        self.parts_written += 1;
        Ok(())
    }

    /// Writes a parsed [`Part`], taking values from its records.
    pub fn write_records(&mut self, part: &Part) -> Result<()> {
        let rows = part.records.iter().map(|record| {
            part.header
                .columns()
                .iter()
                .map(|column| record.get(column).map(str::to_string))
                .collect()
        });
        self.write_part(&part.name, &part.header, rows)
    }

    pub fn parts_written(&self) -> usize {
        self.parts_written
    }

    /// Writes the closing `END.` directive and returns the inner writer.
    pub fn finish(mut self) -> Result<W> {
        writeln!(self.out)?;
        writeln!(self.out, "END.")?;
        self.out.flush()?;
        Ok(self.out)
    }
}

fn join_names(names: &[String]) -> String {
    names.join(FIELD_SEPARATOR.to_string().as_str())
}

/// Serializes a whole [`Document`] into a string.
pub fn write_document(document: &Document) -> Result<String> {
    let mut writer = PtfWriter::new(Vec::new())?;
    for part in &document.parts {
        writer.write_records(part)?;
    }
    let bytes = writer.finish()?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
