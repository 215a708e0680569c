//! Line-level helpers shared by every TMDL scanner
//!
//! Indentation is measured in leading whitespace characters (tab or space).
//! One nesting step is the smallest positive indentation found in the file.

use semlineage_core::{Diagnostic, DiagnosticCode};

/// Number of leading whitespace characters
pub(crate) fn indent_of(line: &str) -> usize {
    line.chars().take_while(|c| *c == ' ' || *c == '\t').count()
}

pub(crate) fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

/// Smallest positive indentation in a file, ignoring fenced blocks
pub(crate) fn indent_unit(lines: &[&str]) -> usize {
    let mut fenced = false;
    let mut unit: Option<usize> = None;

    for line in lines {
        let fences = line.matches("```").count();
        let inside = fenced;
        if fences % 2 == 1 {
            fenced = !fenced;
        }
        if inside || is_blank(line) {
            continue;
        }

        let indent = indent_of(line);
        if indent > 0 {
            unit = Some(unit.map_or(indent, |u| u.min(indent)));
        }
    }

    unit.unwrap_or(1)
}

/// Split a trimmed line into its first word and the remainder
pub(crate) fn split_first_word(trimmed: &str) -> (&str, &str) {
    match trimmed.find(|c: char| c.is_whitespace()) {
        Some(pos) => (&trimmed[..pos], trimmed[pos..].trim_start()),
        None => (trimmed, ""),
    }
}

/// Read a `'quoted name'` (with `''` escapes) from the start of `s`
///
/// Returns the unescaped name and the text after the closing quote.
pub(crate) fn read_quoted(s: &str) -> Option<(String, &str)> {
    let body = s.strip_prefix('\'')?;
    let mut name = String::new();
    let mut chars = body.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if c == '\'' {
            if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                name.push('\'');
            } else {
                return Some((name, &body[idx + 1..]));
            }
        } else {
            name.push(c);
        }
    }

    None
}

/// Split an object header remainder at its first `=` outside a quoted name
pub(crate) fn split_assignment(rest: &str) -> (&str, Option<&str>) {
    let mut in_quote = false;
    for (idx, c) in rest.char_indices() {
        match c {
            '\'' => in_quote = !in_quote,
            '=' if !in_quote => return (&rest[..idx], Some(rest[idx + 1..].trim())),
            _ => {}
        }
    }
    (rest, None)
}

/// Object name from a header remainder
///
/// A leading `'Quoted Name'` wins; otherwise everything after `=` is dropped
/// and the first bare token is used.
pub(crate) fn extract_name(rest: &str) -> String {
    let rest = rest.trim();
    if rest.starts_with('\'') {
        return match read_quoted(rest) {
            Some((name, _)) => name,
            None => rest.trim_start_matches('\'').to_string(),
        };
    }

    let head = match rest.find('=') {
        Some(pos) => &rest[..pos],
        None => rest,
    };
    head.split_whitespace().next().unwrap_or("").to_string()
}

/// Strip one level of `"..."` or `'...'` quoting from a property value
pub(crate) fn unquote(value: &str) -> String {
    let value = value.trim();
    if value.len() >= 2 {
        if value.starts_with('"') && value.ends_with('"') {
            return value[1..value.len() - 1].replace("\"\"", "\"");
        }
        if value.starts_with('\'') && value.ends_with('\'') {
            return value[1..value.len() - 1].replace("''", "'");
        }
    }
    value.to_string()
}

pub(crate) fn parse_bool(value: &str) -> bool {
    value.trim().eq_ignore_ascii_case("true")
}

/// `Table.Column` endpoint, either part optionally quoted
pub(crate) fn parse_qualified_column(value: &str) -> Option<(String, String)> {
    let value = value.trim();
    let (table, rest) = if value.starts_with('\'') {
        read_quoted(value)?
    } else {
        let dot = value.find('.')?;
        (value[..dot].to_string(), &value[dot..])
    };

    let column = rest.trim_start().strip_prefix('.')?.trim();
    let column = if column.starts_with('\'') {
        read_quoted(column)?.0
    } else {
        column.to_string()
    };

    if table.is_empty() || column.is_empty() {
        return None;
    }
    Some((table, column))
}

/// Keywords whose lines carry metadata we consume but do not model
const METADATA_KEYWORDS: &[&str] = &["annotation", "extendedProperty", "changedProperty"];

/// Shape of a line inside an object or table body
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum BodyLine<'a> {
    /// `key: value`
    Property { key: &'a str, value: &'a str },

    /// `key = <expression>` (value may continue on following lines)
    ExpressionProperty { key: &'a str, inline: &'a str },

    /// Bare `key`, a boolean flag set to true
    Flag(&'a str),

    /// `annotation X = ...`, `extendedProperty X = ...`
    Metadata { inline: Option<&'a str> },

    Other,
}

pub(crate) fn classify_body_line(trimmed: &str) -> BodyLine<'_> {
    let ident_len = trimmed
        .char_indices()
        .take_while(|(idx, c)| c.is_ascii_alphabetic() || *c == '_' || (*idx > 0 && c.is_ascii_digit()))
        .count();
    if ident_len == 0 {
        return BodyLine::Other;
    }

    let key = &trimmed[..ident_len];
    let remainder = trimmed[ident_len..].trim_start();

    if remainder.is_empty() {
        return BodyLine::Flag(key);
    }

    if METADATA_KEYWORDS.contains(&key) {
        let (_, inline) = split_assignment(remainder);
        return BodyLine::Metadata { inline };
    }

    if let Some(value) = remainder.strip_prefix(':') {
        return BodyLine::Property { key, value: value.trim() };
    }

    if let Some(inline) = remainder.strip_prefix('=') {
        return BodyLine::ExpressionProperty { key, inline: inline.trim() };
    }

    BodyLine::Other
}

/// Boolean properties TMDL writes as a bare word
const KNOWN_FLAGS: &[&str] = &[
    "isHidden",
    "isDefaultLabel",
    "isDefaultImage",
    "isKey",
    "isNullable",
    "isUnique",
    "isAvailableInMdx",
    "isPrivate",
    "isNameInferred",
    "isDataTypeInferred",
    "isActive",
    "isSimpleMeasure",
    "showAsVariationsOnly",
    "keepUniqueRows",
    "excludeFromModelRefresh",
    "discourageImplicitMeasures",
];

/// True when a trimmed line reads as a header, property or description
/// rather than expression text
///
/// A lone word is structural only when it is a known flag; `RETURN`, `in`
/// or `else` on a line of their own are expression text.
pub(crate) fn is_structural(trimmed: &str, keywords: &[&str]) -> bool {
    if trimmed.starts_with("///") {
        return true;
    }
    let (word, _) = split_first_word(trimmed);
    if keywords.contains(&word) {
        return true;
    }
    match classify_body_line(trimmed) {
        BodyLine::Other => false,
        BodyLine::Flag(key) => KNOWN_FLAGS.contains(&key),
        _ => true,
    }
}

/// Collects the text of a (possibly multi-line) expression
///
/// Continuation lines must be indented deeper than `threshold`; blank lines
/// are kept. A line holding only a triple-backtick fence switches to verbatim
/// capture until the closing fence, ignoring indentation entirely.
#[derive(Debug, Clone)]
pub(crate) struct ExpressionCapture {
    threshold: usize,
    base: usize,
    /// Set once the threshold was lowered to `base`; structural lines at or
    /// above the original threshold still end the capture
    loose_limit: Option<usize>,
    head: Option<String>,
    lines: Vec<String>,
    fenced: bool,
    was_fenced: bool,
    start_line: usize,
}

impl ExpressionCapture {
    /// Start capturing with the text found after `=` on the opening line
    pub(crate) fn open(inline: &str, threshold: usize, base: usize, start_line: usize) -> Self {
        let mut capture = Self {
            threshold,
            base,
            loose_limit: None,
            head: None,
            lines: Vec::new(),
            fenced: false,
            was_fenced: false,
            start_line,
        };

        let inline = inline.trim();
        if let Some(after) = inline.strip_prefix("```") {
            capture.was_fenced = true;
            match after.strip_suffix("```") {
                Some(closed) => capture.push_nonblank(closed),
                None => {
                    capture.fenced = true;
                    capture.push_nonblank(after);
                }
            }
        } else if !inline.is_empty() {
            capture.head = Some(inline.to_string());
        }

        capture
    }

    /// Offer the next physical line
    ///
    /// Returns false when the line does not belong to the expression; the
    /// caller then finishes the capture and processes the line itself.
    /// `structural` tells whether the line looks like a property or object
    /// header, which matters only while nothing has been captured yet.
    pub(crate) fn offer(&mut self, line: &str, structural: bool) -> bool {
        if self.fenced {
            let trimmed = line.trim_end();
            if trimmed.ends_with("```") {
                let before = &trimmed[..trimmed.len() - 3];
                self.push_nonblank(before);
                self.fenced = false;
            } else {
                self.lines.push(line.to_string());
            }
            return true;
        }

        if is_blank(line) {
            self.lines.push(String::new());
            return true;
        }

        let indent = indent_of(line);
        let trimmed = line.trim();

        if indent > self.base && trimmed.starts_with("```") && !self.was_fenced {
            let after = &trimmed[3..];
            self.was_fenced = true;
            match after.strip_suffix("```") {
                Some(closed) => self.push_nonblank(closed),
                None => {
                    self.fenced = true;
                    self.push_nonblank(after);
                }
            }
            return true;
        }

        if structural && self.loose_limit.map_or(false, |limit| indent <= limit) {
            return false;
        }

        if indent > self.threshold {
            self.lines.push(line.to_string());
            return true;
        }

        // A body indented only one step (hand-written files) is still a body
        // when nothing has been captured yet.
        if self.is_empty() && indent > self.base && !structural {
            self.loose_limit = Some(self.threshold);
            self.threshold = self.base;
            self.lines.push(line.to_string());
            return true;
        }

        false
    }

    /// True while inside an unterminated ``` block
    pub(crate) fn is_fenced(&self) -> bool {
        self.fenced
    }

    pub(crate) fn start_line(&self) -> usize {
        self.start_line
    }

    fn is_empty(&self) -> bool {
        self.head.is_none() && self.lines.iter().all(|l| is_blank(l))
    }

    fn push_nonblank(&mut self, text: &str) {
        if !is_blank(text) {
            self.lines.push(text.to_string());
        }
    }

    /// Final expression text
    ///
    /// Fenced text is kept verbatim apart from leading/trailing blank lines;
    /// otherwise continuation lines lose their common indentation.
    pub(crate) fn finish(self) -> String {
        let body = if self.was_fenced {
            let lines: Vec<&str> = self.lines.iter().map(String::as_str).collect();
            trim_blank_edges(&lines).join("\n")
        } else {
            dedent(&self.lines)
        };

        match self.head {
            Some(head) if body.is_empty() => head,
            Some(head) => format!("{}\n{}", head, body),
            None => body,
        }
    }
}

/// Remove the minimum common indentation and surrounding blank lines
pub(crate) fn dedent(lines: &[String]) -> String {
    let min = lines
        .iter()
        .filter(|l| !is_blank(l))
        .map(|l| indent_of(l))
        .min()
        .unwrap_or(0);

    let stripped: Vec<&str> = lines
        .iter()
        .map(|l| if is_blank(l) { "" } else { l[min..].trim_end() })
        .collect();

    trim_blank_edges(&stripped).join("\n")
}

fn trim_blank_edges<'a>(lines: &[&'a str]) -> Vec<&'a str> {
    let start = lines.iter().position(|l| !is_blank(l));
    let end = lines.iter().rposition(|l| !is_blank(l));
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].to_vec(),
        _ => Vec::new(),
    }
}

/// Diagnostics collector bound to one file
pub(crate) struct WarningSink<'a> {
    file: &'a str,
    out: &'a mut Vec<Diagnostic>,
}

impl<'a> WarningSink<'a> {
    pub(crate) fn new(file: &'a str, out: &'a mut Vec<Diagnostic>) -> Self {
        Self { file, out }
    }

    pub(crate) fn file(&self) -> &str {
        self.file
    }

    pub(crate) fn warn(&mut self, code: DiagnosticCode, line: usize, message: impl Into<String>) {
        let diagnostic = Diagnostic::warning_at(code, self.file, line, message);
        tracing::warn!(code = %diagnostic.code, file = self.file, line, "{}", diagnostic.message);
        self.out.push(diagnostic);
    }
}
