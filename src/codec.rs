//! Delimited-Text Codec
//!
//! Parses and serializes CSV and clipboard (tab/newline) text. Decoding is
//! lenient: an unterminated quote never fails, it swallows the rest of the
//! line. Encoding quotes a CSV field only when it has to.

use crate::core::Result;
use crate::tabular::TabularResult;
use std::borrow::Cow;

/// Field separator, quoting and header conventions of a text format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dialect {
    /// Character between fields
    pub separator: char,
    /// Quote character, `None` when the format has no quoting
    pub quote: Option<char>,
    /// Whether the first non-empty line read is a header rather than data
    pub header_line: bool,
}

impl Dialect {
    /// RFC-4180-like CSV: `,` separated, `"` quoted, header line.
    pub const CSV: Dialect = Dialect {
        separator: ',',
        quote: Some('"'),
        header_line: true,
    };

    /// Clipboard text: tab separated, unquoted, every line is data.
    pub const CLIPBOARD: Dialect = Dialect {
        separator: '\t',
        quote: None,
        header_line: false,
    };
}

/// One decoded row of field values, prior to any type coercion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRecord {
    fields: Vec<String>,
}

impl ParsedRecord {
    pub fn new(fields: Vec<String>) -> Self {
        ParsedRecord { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn into_fields(self) -> Vec<String> {
        self.fields
    }
}

impl From<Vec<String>> for ParsedRecord {
    fn from(fields: Vec<String>) -> Self {
        ParsedRecord::new(fields)
    }
}

impl<S: Into<String>> FromIterator<S> for ParsedRecord {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        ParsedRecord::new(iter.into_iter().map(Into::into).collect())
    }
}

/// A decoded block together with its header line, if the dialect has one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedBlock {
    pub header: Option<ParsedRecord>,
    pub records: Vec<ParsedRecord>,
}

/// Splits one line into fields.
///
/// Inside a quoted span the separator and newlines are literal and a doubled
/// quote stands for one quote character. A quote that is not doubled closes
/// the span. A span still open at the end of input takes the rest of the line.
pub fn decode_line(line: &str, dialect: &Dialect) -> ParsedRecord {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if Some(ch) == dialect.quote {
            if !in_quotes {
                in_quotes = true;
            } else if chars.peek() == Some(&ch) {
                field.push(ch);
                chars.next();
            } else {
                in_quotes = false;
            }
        } else if ch == dialect.separator && !in_quotes {
            fields.push(std::mem::take(&mut field));
        } else {
            field.push(ch);
        }
    }
    fields.push(field);

    ParsedRecord::new(fields)
}

/// Decodes every data line of `text`, dropping the header line if the dialect has one.
pub fn decode_block(text: &str, dialect: &Dialect) -> Vec<ParsedRecord> {
    decode_document(text, dialect).records
}

/// Decodes `text` line by line, skipping blank lines.
///
/// LF and CRLF line endings are both accepted.
pub fn decode_document(text: &str, dialect: &Dialect) -> DecodedBlock {
    let mut lines = text.lines().filter(|line| !line.trim().is_empty());

    let header = if dialect.header_line {
        lines.next().map(|line| decode_line(line, dialect))
    } else {
        None
    };
    let records = lines.map(|line| decode_line(line, dialect)).collect();

    DecodedBlock { header, records }
}

/// Encodes a single field, quoting it only if it contains the separator, a
/// quote or a line break. Dialects without a quote character never quote.
pub fn encode_field<'a>(value: &'a str, dialect: &Dialect) -> Cow<'a, str> {
    let Some(quote) = dialect.quote else {
        return Cow::Borrowed(value);
    };

    let needs_quoting = value
        .chars()
        .any(|ch| ch == dialect.separator || ch == quote || ch == '\n' || ch == '\r');
    if !needs_quoting {
        return Cow::Borrowed(value);
    }

    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push(quote);
    for ch in value.chars() {
        if ch == quote {
            quoted.push(quote);
        }
        quoted.push(ch);
    }
    quoted.push(quote);
    Cow::Owned(quoted)
}

/// Encodes and joins one row of fields, without a line terminator.
pub fn encode_record<I, S>(fields: I, dialect: &Dialect) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut line = String::new();
    for (i, field) in fields.into_iter().enumerate() {
        if i > 0 {
            line.push(dialect.separator);
        }
        line.push_str(&encode_field(field.as_ref(), dialect));
    }
    line
}

/// Encodes a whole result: the header row, then one line per data row.
/// Every line, including the last, ends with `\n`.
pub fn encode_block(result: &TabularResult, dialect: &Dialect) -> String {
    let mut output = encode_record(result.columns(), dialect);
    output.push('\n');
    for row in result.rows() {
        output.push_str(&encode_record(row.iter().map(|cell| cell.as_text()), dialect));
        output.push('\n');
    }
    output
}

/// Clipboard text for a selection of `(row, col)` cells.
///
/// Cells are ordered by row then column; cells sharing a row are joined by
/// tab and rows by newline. No header and no trailing newline.
pub fn encode_selection(result: &TabularResult, cells: &[(usize, usize)]) -> Result<String> {
    let mut ordered = cells.to_vec();
    ordered.sort_unstable();
    ordered.dedup();

    let mut output = String::new();
    let mut current_row = None;
    for (row, col) in ordered {
        let value = result.value_at(row, col)?;
        match current_row {
            Some(r) if r == row => output.push(Dialect::CLIPBOARD.separator),
            Some(_) => output.push('\n'),
            None => {}
        }
        current_row = Some(row);
        output.push_str(&value.as_text());
    }
    Ok(output)
}
