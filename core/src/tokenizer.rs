//! Line-oriented PTF tokenizer.
//!
//! [`ParserState`] consumes one line at a time and reports what the line
//! was. [`PtfReader`] drives it over any [`BufRead`] and yields each
//! [`Part`] as soon as its `END_PART` is seen, so callers can flush parts to
//! storage without holding the whole document in memory.
//!
//! # Grammar
//!
//! ```text
//! FILE_TYPE=MULTI_PHYS_TABLE;
//! { block comment,
//!   ignored until a line ends with }
//! PART 'PINS'
//! :PIN|BANK=IO_STD|DRIVE(OPT);
//! 'A1'|'0'='LVCMOS18'|'12'
//! END_PART
//! END.
//! ```

use std::io::{BufRead, Lines};

use tracing::{debug, warn};

use crate::delimiter::{
    ANNOTATION_SEPARATOR, ESCAPE, FIELD_SEPARATOR, KEY_SEPARATOR, QUOTE, split_fields,
    split_key_segments, strip_annotation,
};
use crate::error::{PtfError, Result};
use crate::types::{Document, FILE_TYPE_SENTINEL, Header, Part, Record};

const FILE_TYPE_DIRECTIVE: &str = "FILE_TYPE";
const PART_DIRECTIVE: &str = "PART";
const END_PART_DIRECTIVE: &str = "END_PART";
const END_DIRECTIVE: &str = "END.";
const HEADER_PREFIX: char = ':';
const COMMENT_OPEN: char = '{';
const COMMENT_CLOSE: char = '}';

/// What a single line turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    /// Blank line, stray data, or anything read after the document ended.
    Skipped,
    /// Part of a `{ ... }` block comment.
    Comment,
    /// Accepted `FILE_TYPE` directive.
    FileType,
    PartOpened,
    HeaderDeclared,
    Record,
    /// `END_PART` closed a section; the finished part is handed over.
    PartClosed(Part),
    /// `END.` terminated the document.
    End,
}

#[derive(Debug)]
struct OpenPart {
    name: String,
    header: Option<Header>,
    records: Vec<Record>,
}

/// Explicit tokenizer state, threaded through every line of one document.
#[derive(Debug, Default)]
pub struct ParserState {
    file_type: Option<String>,
    in_comment: bool,
    finished: bool,
    line_no: usize,
    part: Option<OpenPart>,
}

impl ParserState {
    pub fn new() -> Self {
        Self::default()
    }

    /// The accepted `FILE_TYPE`, if the directive has been seen.
    pub fn file_type(&self) -> Option<&str> {
        self.file_type.as_deref()
    }

    /// Whether `END.` or a fatal error stopped the document.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Processes one raw line.
    ///
    /// # Errors
    ///
    /// Returns [`PtfError::UnsupportedFileType`] when the first `FILE_TYPE`
    /// directive names anything but `MULTI_PHYS_TABLE`. The state is
    /// finished afterwards and ignores further input.
    pub fn feed_line(&mut self, raw: &str) -> Result<LineOutcome> {
        self.line_no += 1;
        if self.finished {
            return Ok(LineOutcome::Skipped);
        }

        let line = raw.trim();
        if line.is_empty() {
            return Ok(LineOutcome::Skipped);
        }
        if line.starts_with(COMMENT_OPEN) {
            self.in_comment = true;
            return Ok(LineOutcome::Comment);
        }
        if line.ends_with(COMMENT_CLOSE) {
            self.in_comment = false;
            return Ok(LineOutcome::Comment);
        }
        if self.in_comment {
            return Ok(LineOutcome::Comment);
        }

        if line.starts_with(FILE_TYPE_DIRECTIVE) {
            return self.file_type_directive(line);
        }
        if line.starts_with(PART_DIRECTIVE) {
            return Ok(self.open_part(line));
        }
        if line.starts_with(HEADER_PREFIX) {
            return Ok(self.declare_header(line));
        }
        if line.starts_with(END_PART_DIRECTIVE) {
            return Ok(self.close_part());
        }
        if line.starts_with(END_DIRECTIVE) {
            self.finish();
            return Ok(LineOutcome::End);
        }
        Ok(self.data_line(line))
    }

    /// Ends the document, discarding any PART left open.
    pub fn finish(&mut self) {
        if let Some(part) = self.part.take() {
            warn!(
                part = %part.name,
                records = part.records.len(),
                "PART not closed by END_PART; discarding"
            );
        }
        self.finished = true;
    }

    fn file_type_directive(&mut self, line: &str) -> Result<LineOutcome> {
        if self.file_type.is_some() {
            debug!(line = self.line_no, "ignoring repeated FILE_TYPE directive");
            return Ok(LineOutcome::Skipped);
        }
        let value = line
            .split(KEY_SEPARATOR)
            .nth(1)
            .unwrap_or("")
            .trim()
            .trim_matches(';')
            .trim();
        if value != FILE_TYPE_SENTINEL {
            self.finish();
            return Err(PtfError::UnsupportedFileType(value.to_string()));
        }
        self.file_type = Some(value.to_string());
        Ok(LineOutcome::FileType)
    }

    fn open_part(&mut self, line: &str) -> LineOutcome {
        if let Some(previous) = self.part.take() {
            warn!(
                part = %previous.name,
                line = self.line_no,
                "PART opened before END_PART; discarding the previous section"
            );
        }
        let name = parse_part_name(line);
        debug!(part = %name, line = self.line_no, "opening PART");
        self.part = Some(OpenPart {
            name,
            header: None,
            records: Vec::new(),
        });
        LineOutcome::PartOpened
    }

    fn declare_header(&mut self, line: &str) -> LineOutcome {
        let Some(part) = self.part.as_mut() else {
            warn!(line = self.line_no, "header outside of a PART; ignoring");
            return LineOutcome::Skipped;
        };
        if part.header.is_some() {
            warn!(part = %part.name, line = self.line_no, "header redeclared; later records use the new header");
        }
        part.header = Some(parse_header(line));
        LineOutcome::HeaderDeclared
    }

    fn close_part(&mut self) -> LineOutcome {
        let Some(open) = self.part.take() else {
            warn!(line = self.line_no, "END_PART without an open PART");
            return LineOutcome::Skipped;
        };
        let Some(header) = open.header else {
            warn!(part = %open.name, "PART closed without a header; nothing to import");
            return LineOutcome::Skipped;
        };
        debug!(part = %open.name, records = open.records.len(), "closing PART");
        LineOutcome::PartClosed(Part {
            name: open.name,
            header,
            records: open.records,
        })
    }

    fn data_line(&mut self, line: &str) -> LineOutcome {
        let line_no = self.line_no;
        let Some(part) = self.part.as_mut() else {
            debug!(line = line_no, "data line outside of a PART; ignoring");
            return LineOutcome::Skipped;
        };
        let Some(header) = part.header.as_ref() else {
            warn!(part = %part.name, line = line_no, "data line before header; ignoring");
            return LineOutcome::Skipped;
        };
        let line = line.strip_prefix(ESCAPE).unwrap_or(line);
        let tokens = tokenize_record(line, header.declared_primary_count());
        if tokens.len() != header.declared().len() {
            debug!(
                part = %part.name,
                line = line_no,
                tokens = tokens.len(),
                columns = header.declared().len(),
                "token count differs from header; pairing truncated"
            );
        }
        let record = Record::from_tokens(header, tokens);
        part.records.push(record);
        LineOutcome::Record
    }
}

/// Makes a rendered data line read back as data.
///
/// A line that would start like a directive or a comment gets a leading
/// `\`, which the tokenizer strips from data lines; so does a line already
/// starting with `\`. A line ending in `}` gets an empty `:` annotation so
/// it is not taken for the end of a comment.
pub(crate) fn guard_data_line(line: String) -> String {
    let head = line.trim_start();
    let shadows_directive = [
        FILE_TYPE_DIRECTIVE,
        PART_DIRECTIVE,
        END_PART_DIRECTIVE,
        END_DIRECTIVE,
    ]
    .into_iter()
    .any(|directive| head.starts_with(directive))
        || head.starts_with([ESCAPE, HEADER_PREFIX, COMMENT_OPEN]);

    let mut line = if shadows_directive {
        format!("{ESCAPE}{line}")
    } else {
        line
    };
    if line.trim_end().ends_with(COMMENT_CLOSE) {
        line.push(ANNOTATION_SEPARATOR);
    }
    line
}

/// Extracts the name between the first pair of single quotes.
fn parse_part_name(line: &str) -> String {
    let mut pieces = line.split(QUOTE);
    pieces.next();
    match pieces.next() {
        Some(name) => name.trim().to_string(),
        None => line[PART_DIRECTIVE.len()..].trim().to_string(),
    }
}

/// Parses `:primary|cols=secondary|cols;` into a [`Header`].
fn parse_header(line: &str) -> Header {
    let body = line
        .trim_start_matches(HEADER_PREFIX)
        .trim_end()
        .trim_end_matches(';');
    let (primary, secondary) = body.split_once(KEY_SEPARATOR).unwrap_or((body, ""));
    Header::new(
        primary.split(FIELD_SEPARATOR),
        secondary.split(FIELD_SEPARATOR),
    )
}

/// Splits one data line into value tokens.
///
/// Fields are split on unescaped `|`. The field at position `primary_count`
/// (counting declared primary slots, duplicates included)
/// holds the last primary value and the first secondary value joined by
/// `=`, and is split further. The final token loses any `:` annotation.
///
/// ```
/// use ptf_core::tokenize_record;
///
/// let tokens = tokenize_record("'A1'|'0'='LVCMOS18'|'12':mA", 2);
/// assert_eq!(tokens, ["'A1'", "'0'", "'LVCMOS18'", "'12'"]);
/// ```
pub fn tokenize_record(line: &str, primary_count: usize) -> Vec<String> {
    let mut tokens = Vec::new();
    for (idx, field) in split_fields(line).into_iter().enumerate() {
        if idx + 1 == primary_count {
            tokens.extend(split_key_segments(&field));
        } else {
            tokens.push(field.trim().to_string());
        }
    }
    if let Some(last) = tokens.pop() {
        tokens.push(strip_annotation(&last));
    }
    tokens
}

/// Streams the [`Part`]s of a PTF document.
///
/// Iteration stops after `END.`, at end of input, or after yielding an
/// error. An unsupported `FILE_TYPE` is yielded as
/// [`PtfError::UnsupportedFileType`] and nothing else is read.
///
/// # Examples
///
/// ```
/// use ptf_core::PtfReader;
///
/// let text = "FILE_TYPE=MULTI_PHYS_TABLE;\nPART 'T'\n:K=V;\n'1'='a'\nEND_PART\nEND.\n";
/// let parts: Vec<_> = PtfReader::new(text.as_bytes())
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(parts.len(), 1);
/// assert_eq!(parts[0].records[0].get("V"), Some("'a'"));
/// ```
pub struct PtfReader<R> {
    lines: Lines<R>,
    state: ParserState,
    done: bool,
}

impl<R: BufRead> PtfReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            state: ParserState::new(),
            done: false,
        }
    }

    pub fn file_type(&self) -> Option<&str> {
        self.state.file_type()
    }
}

impl<R: BufRead> Iterator for PtfReader<R> {
    type Item = Result<Part>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err.into()));
                }
                None => {
                    self.done = true;
                    self.state.finish();
                    return None;
                }
            };
            match self.state.feed_line(&line) {
                Ok(LineOutcome::PartClosed(part)) => return Some(Ok(part)),
                Ok(LineOutcome::End) => {
                    self.done = true;
                    return None;
                }
                Ok(_) => {}
                Err(err) => {
                    self.done = true;
                    return Some(Err(err));
                }
            }
        }
    }
}

/// Parses a whole document held in memory.
///
/// # Errors
///
/// Returns [`PtfError::UnsupportedFileType`] for a foreign `FILE_TYPE`.
pub fn parse_document(text: &str) -> Result<Document> {
    let mut reader = PtfReader::new(text.as_bytes());
    let mut parts = Vec::new();
    for part in reader.by_ref() {
        parts.push(part?);
    }
    Ok(Document {
        file_type: reader.file_type().map(str::to_string),
        parts,
    })
}
