//! Measure, column and table reference extraction
//!
//! Handles the three reference shapes found in DAX text:
//! - `[Measure]` (bare bracket, no qualifier in front)
//! - `Table[Column]` and `'Table Name'[Column]`
//! - the first argument of table-scanning functions such as `FILTER(Sales, ...)`

use regex::Regex;
use semlineage_core::ColumnRef;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::OnceLock;

use crate::clean::clean;

/// Functions whose first argument is a table expression
pub const TABLE_FUNCTIONS: &[&str] = &[
    "ADDCOLUMNS",
    "ALL",
    "ALLEXCEPT",
    "ALLNOBLANKROW",
    "ALLSELECTED",
    "AVERAGEX",
    "CALCULATETABLE",
    "CONCATENATEX",
    "COUNTAX",
    "COUNTROWS",
    "COUNTX",
    "CROSSJOIN",
    "DISTINCT",
    "EXCEPT",
    "FILTER",
    "GENERATE",
    "GROUPBY",
    "INTERSECT",
    "MAXX",
    "MINX",
    "NATURALINNERJOIN",
    "NATURALLEFTOUTERJOIN",
    "PRODUCTX",
    "RANKX",
    "RELATEDTABLE",
    "REMOVEFILTERS",
    "SELECTCOLUMNS",
    "SUMMARIZE",
    "SUMMARIZECOLUMNS",
    "SUMX",
    "TOPN",
    "TREATAS",
    "UNION",
    "VALUES",
];

/// References found in one DAX expression, each list deduplicated in
/// order of first appearance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DaxReferences {
    /// Bare `[Name]` references (measures, or columns of the row context)
    pub measure_refs: Vec<String>,

    pub column_refs: Vec<ColumnRef>,

    /// Tables passed whole to table functions
    pub table_refs: Vec<String>,
}

impl DaxReferences {
    pub fn is_empty(&self) -> bool {
        self.measure_refs.is_empty() && self.column_refs.is_empty() && self.table_refs.is_empty()
    }

    /// Every table named by a column reference or a table function, deduplicated
    pub fn referenced_tables(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.column_refs
            .iter()
            .map(|c| c.table.as_str())
            .chain(self.table_refs.iter().map(String::as_str))
            .filter(|t| seen.insert(*t))
            .collect()
    }
}

fn column_ref_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:'((?:[^']|'')+)'|([\p{L}_][\p{L}\p{N}_]*))\[((?:[^\]]|\]\])+)\]")
            .expect("valid regex")
    })
}

fn bracket_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[((?:[^\]]|\]\])+)\]").expect("valid regex"))
}

fn table_function_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        let pattern = format!(r"(?i)\b(?:{})\s*\(", TABLE_FUNCTIONS.join("|"));
        Regex::new(&pattern).expect("valid regex")
    })
}

/// Extracts references from DAX text
pub struct DaxReferenceExtractor;

impl DaxReferenceExtractor {
    /// Extract all references from a DAX expression
    pub fn extract(dax: &str) -> DaxReferences {
        let text = clean(dax);

        DaxReferences {
            measure_refs: Self::measure_refs(&text),
            column_refs: Self::column_refs(&text),
            table_refs: Self::table_refs(&text),
        }
    }

    /// `[Name]` not qualified by a table
    ///
    /// A bracket preceded by an identifier character, a closing quote, a dot
    /// or another bracket belongs to a qualified reference.
    fn measure_refs(text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut refs = Vec::new();

        for caps in bracket_regex().captures_iter(text) {
            let Some(whole) = caps.get(0) else { continue };
            let qualified = text[..whole.start()]
                .chars()
                .next_back()
                .map_or(false, |prev| prev.is_alphanumeric() || matches!(prev, '_' | '\'' | '.' | ']'));
            if qualified {
                continue;
            }

            let name = unescape_bracket(&caps[1]);
            if seen.insert(name.clone()) {
                refs.push(name);
            }
        }

        refs
    }

    fn column_refs(text: &str) -> Vec<ColumnRef> {
        let mut seen = HashSet::new();
        let mut refs = Vec::new();

        for caps in column_ref_regex().captures_iter(text) {
            let table = match (caps.get(1), caps.get(2)) {
                (Some(quoted), _) => quoted.as_str().replace("''", "'"),
                (None, Some(bare)) => bare.as_str().to_string(),
                _ => continue,
            };
            let reference = ColumnRef::new(table, unescape_bracket(&caps[3]));
            if seen.insert(reference.clone()) {
                refs.push(reference);
            }
        }

        refs
    }

    /// First argument of a table function, when it is a plain table name
    fn table_refs(text: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut refs = Vec::new();

        for call in table_function_regex().find_iter(text) {
            if let Some(table) = table_argument(&text[call.end()..]) {
                if seen.insert(table.clone()) {
                    refs.push(table);
                }
            }
        }

        refs
    }
}

/// Read a quoted or bare table name at the start of an argument list
///
/// `ALL(Sales[Region])` names a column and `FILTER(ALL(Sales), ...)` starts
/// with a call; neither yields a table.
fn table_argument(args: &str) -> Option<String> {
    let args = args.trim_start();

    let (name, rest) = if let Some(quoted) = args.strip_prefix('\'') {
        let mut name = String::new();
        let mut chars = quoted.char_indices().peekable();
        let mut end = None;
        while let Some((idx, c)) = chars.next() {
            if c != '\'' {
                name.push(c);
            } else if matches!(chars.peek(), Some((_, '\''))) {
                chars.next();
                name.push('\'');
            } else {
                end = Some(idx + 1);
                break;
            }
        }
        (name, &quoted[end?..])
    } else {
        if !args.starts_with(|c: char| c.is_alphabetic() || c == '_') {
            return None;
        }
        let end = args
            .char_indices()
            .find(|(_, c)| !(c.is_alphanumeric() || *c == '_'))
            .map_or(args.len(), |(idx, _)| idx);
        (args[..end].to_string(), &args[end..])
    };

    let follower = rest.trim_start().chars().next();
    if name.is_empty() || matches!(follower, Some('[') | Some('(')) {
        return None;
    }
    Some(name)
}

fn unescape_bracket(name: &str) -> String {
    name.replace("]]", "]")
}
