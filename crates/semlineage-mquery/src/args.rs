//! M text scanning: comments, argument lists, `let` steps, argument shapes

use std::collections::HashMap;

use crate::parameters::ParameterTable;

/// Shape of one connector argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MArg {
    /// `"text"`, unescaped
    Literal(String),

    /// `#"Name"`, or a bare identifier naming a shared expression
    Parameter(String),

    /// `null`, `true`, `false` or an omitted argument
    Absent,

    /// Anything else (records, concatenations, nested calls we do not unwrap)
    Expression(String),
}

/// Calls that only wrap a location and are looked through
const WRAPPERS: &[&str] = &["File.Contents", "Web.Contents"];

/// Remove `//` and `/* */` comments, leaving string literals and quoted
/// identifiers intact
pub fn strip_comments(m: &str) -> String {
    let mut out = String::with_capacity(m.len());
    let mut chars = m.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                out.push(c);
                while let Some(s) = chars.next() {
                    out.push(s);
                    if s == '"' {
                        if chars.peek() == Some(&'"') {
                            chars.next();
                            out.push('"');
                        } else {
                            break;
                        }
                    }
                }
            }
            '/' if chars.peek() == Some(&'/') => {
                for s in chars.by_ref() {
                    if s == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = '\0';
                for s in chars.by_ref() {
                    if prev == '*' && s == '/' {
                        break;
                    }
                    if s == '\n' {
                        out.push('\n');
                    }
                    prev = s;
                }
                out.push(' ');
            }
            _ => out.push(c),
        }
    }

    out
}

/// Split the argument list that starts right after an opening `(`
///
/// Returns the raw argument texts and the byte length consumed up to and
/// including the closing `)`. An unterminated list runs to the end of input.
pub fn split_args(text: &str) -> (Vec<&str>, usize) {
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    let mut in_string = false;
    let mut chars = text.char_indices().peekable();

    while let Some((idx, c)) = chars.next() {
        if in_string {
            if c == '"' {
                if matches!(chars.peek(), Some((_, '"'))) {
                    chars.next();
                } else {
                    in_string = false;
                }
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth > 0 => depth -= 1,
            ')' => {
                push_arg(&mut args, &text[start..idx]);
                return (args, idx + 1);
            }
            ',' if depth == 0 => {
                push_arg(&mut args, &text[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }

    push_arg(&mut args, &text[start..]);
    (args, text.len())
}

fn push_arg<'a>(args: &mut Vec<&'a str>, raw: &'a str) {
    let raw = raw.trim();
    if !raw.is_empty() || !args.is_empty() {
        args.push(raw);
    }
}

/// `name = value` steps of the top-level `let` blocks in one M expression
#[derive(Debug, Default)]
pub struct LetSteps<'a> {
    steps: HashMap<String, &'a str>,
}

impl<'a> LetSteps<'a> {
    /// Collect steps from comment-free M text
    ///
    /// Only steps at bracket depth zero count; record fields such as
    /// `[Delimiter=","]` are not steps.
    pub fn parse(m: &'a str) -> Self {
        let mut steps = HashMap::new();
        let mut depth = 0usize;
        let mut expect_head = false;
        let mut idx = 0;

        while let Some(c) = m[idx..].chars().next() {
            let rest = &m[idx..];

            if expect_head && depth == 0 && !c.is_whitespace() {
                expect_head = false;
                if let Some((name, len)) = read_name(rest) {
                    if let Some(offset) = equals_offset(&rest[len..]) {
                        steps.insert(name, step_value(&rest[len + offset..]));
                        idx += len + offset;
                        continue;
                    }
                }
            }

            match c {
                '"' => {
                    idx += quoted_len(rest);
                    continue;
                }
                '#' if rest[1..].starts_with('"') => {
                    idx += 1 + quoted_len(&rest[1..]);
                    continue;
                }
                '(' | '[' | '{' => depth += 1,
                ')' | ']' | '}' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => expect_head = true,
                c if c.is_alphabetic() || c == '_' => {
                    let len = ident_len(rest);
                    if depth == 0 {
                        match &rest[..len] {
                            "let" => expect_head = true,
                            "in" => expect_head = false,
                            _ => {}
                        }
                    }
                    idx += len;
                    continue;
                }
                _ => {}
            }
            idx += c.len_utf8();
        }

        Self { steps }
    }

    /// Value text of step `name`
    pub fn get(&self, name: &str) -> Option<&'a str> {
        self.steps.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Classify one raw argument
///
/// Names are looked up first among the expression's own `let` steps, whose
/// values are classified in turn, then among the model's shared
/// expressions. A bare name that is neither is an opaque expression.
pub fn classify(raw: &str, steps: &LetSteps<'_>, parameters: &ParameterTable) -> MArg {
    classify_within(raw, steps, parameters, 0)
}

fn classify_within(raw: &str, steps: &LetSteps<'_>, parameters: &ParameterTable, hops: usize) -> MArg {
    let raw = raw.trim();

    if raw.is_empty() || matches!(raw, "null" | "true" | "false") {
        return MArg::Absent;
    }

    if let Some(value) = string_literal(raw) {
        return MArg::Literal(value);
    }

    let quoted = raw.strip_prefix('#').and_then(string_literal);
    let name = match quoted.clone() {
        Some(name) => Some(name),
        None if is_identifier(raw) => Some(raw.to_string()),
        None => None,
    };
    if let Some(name) = name {
        // A chain of steps longer than the step count loops
        if let Some(value) = steps.get(&name).filter(|_| hops < steps.len()) {
            return classify_within(value, steps, parameters, hops + 1);
        }
        if quoted.is_some() || parameters.is_known(&name) {
            return MArg::Parameter(name);
        }
        return MArg::Expression(name);
    }

    for wrapper in WRAPPERS {
        if let Some(rest) = raw.strip_prefix(wrapper) {
            if let Some(inner) = rest.trim_start().strip_prefix('(') {
                let (args, _) = split_args(inner);
                return args
                    .first()
                    .map_or(MArg::Absent, |first| classify_within(first, steps, parameters, hops));
            }
        }
    }

    MArg::Expression(raw.to_string())
}

/// Step name at the start of `text`: `#"Quoted"` or a bare identifier
fn read_name(text: &str) -> Option<(String, usize)> {
    if let Some(quoted) = text.strip_prefix('#').filter(|t| t.starts_with('"')) {
        let len = 1 + quoted_len(quoted);
        let name = string_literal(&text[1..len])?;
        return Some((name, len));
    }
    let len = ident_len(text);
    let first = text.chars().next()?;
    (len > 0 && (first.is_alphabetic() || first == '_')).then(|| (text[..len].to_string(), len))
}

/// Offset just past the `=` that follows a step name, if one does
fn equals_offset(text: &str) -> Option<usize> {
    let trimmed = text.trim_start();
    let skipped = text.len() - trimmed.len();
    let after = trimmed.strip_prefix('=')?;
    if after.starts_with('>') {
        return None;
    }
    Some(skipped + 1)
}

/// Step value: text up to the next top-level `,`, the closing `in`, or an
/// unmatched closing bracket
fn step_value(text: &str) -> &str {
    let mut depth = 0usize;
    let mut idx = 0;

    while let Some(c) = text[idx..].chars().next() {
        let rest = &text[idx..];
        match c {
            '"' => {
                idx += quoted_len(rest);
                continue;
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' if depth == 0 => break,
            ')' | ']' | '}' => depth -= 1,
            ',' if depth == 0 => break,
            c if c.is_alphabetic() || c == '_' => {
                let len = ident_len(rest);
                if depth == 0 && &rest[..len] == "in" {
                    break;
                }
                idx += len;
                continue;
            }
            _ => {}
        }
        idx += c.len_utf8();
    }

    text[..idx].trim()
}

/// Byte length of the `"..."` literal at the start of `text`, quotes included
fn quoted_len(text: &str) -> usize {
    let mut chars = text.char_indices().skip(1).peekable();
    while let Some((idx, c)) = chars.next() {
        if c == '"' {
            if matches!(chars.peek(), Some((_, '"'))) {
                chars.next();
            } else {
                return idx + 1;
            }
        }
    }
    text.len()
}

/// Byte length of the identifier (dotted names included) at the start of `text`
fn ident_len(text: &str) -> usize {
    text.char_indices()
        .find(|&(_, c)| !(c.is_alphanumeric() || c == '_' || c == '.'))
        .map_or(text.len(), |(idx, _)| idx)
}

/// The whole of `raw` is a single `"..."` literal
fn string_literal(raw: &str) -> Option<String> {
    let body = raw.strip_prefix('"')?.strip_suffix('"')?;
    let mut value = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '"' {
            // Only doubled quotes may appear inside the literal
            if chars.next() != Some('"') {
                return None;
            }
        }
        value.push(c);
    }

    Some(value)
}

fn is_identifier(raw: &str) -> bool {
    let mut chars = raw.chars();
    matches!(chars.next(), Some(c) if c.is_alphabetic() || c == '_')
        && chars.all(|c| c.is_alphanumeric() || c == '_' || c == '.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comments_respect_strings() {
        assert_eq!(
            strip_comments("Web.Contents(\"https://x/y\") // note\n/* a\nb */ x"),
            "Web.Contents(\"https://x/y\") \n\n  x"
        );
        assert_eq!(strip_comments("#\"A // B\""), "#\"A // B\"");
    }

    #[test]
    fn nested_argument_lists() {
        let (args, consumed) = split_args("File.Contents(\"a,b\"), null, [Delimiter=\",\"]) in x");
        assert_eq!(args, vec!["File.Contents(\"a,b\")", "null", "[Delimiter=\",\"]"]);
        assert_eq!(consumed, "File.Contents(\"a,b\"), null, [Delimiter=\",\"])".len());

        let (args, _) = split_args(")");
        assert!(args.is_empty());

        let (args, consumed) = split_args("\"srv\", \"db\"");
        assert_eq!(args, vec!["\"srv\"", "\"db\""]);
        assert_eq!(consumed, "\"srv\", \"db\"".len());
    }

    #[test]
    fn argument_shapes() {
        let none = LetSteps::default();
        let params = ParameterTable::default();
        let shape = |raw: &str| classify(raw, &none, &params);

        assert_eq!(shape("\"srv01\""), MArg::Literal("srv01".to_string()));
        assert_eq!(shape("\"say \"\"hi\"\"\"\""), MArg::Literal("say \"hi\"".to_string()));
        assert_eq!(shape("#\"Server Param\""), MArg::Parameter("Server Param".to_string()));
        assert_eq!(shape("null"), MArg::Absent);
        assert_eq!(
            shape("File.Contents(\"C:\\data\\a.xlsx\")"),
            MArg::Literal("C:\\data\\a.xlsx".to_string())
        );
        assert_eq!(shape("File.Contents(#\"Path\")"), MArg::Parameter("Path".to_string()));
        assert_eq!(shape("\"a\" & Env"), MArg::Expression("\"a\" & Env".to_string()));
    }

    #[test]
    fn bare_names_need_a_shared_expression() {
        let none = LetSteps::default();
        let params = ParameterTable::from_expressions(&[semlineage_core::Expression {
            name: "ServerName".to_string(),
            kind: "m".to_string(),
            expression: "\"srv01\" meta [IsParameterQuery=true]".to_string(),
            description: None,
        }]);

        assert_eq!(classify("ServerName", &none, &params), MArg::Parameter("ServerName".to_string()));
        assert_eq!(classify("Source", &none, &params), MArg::Expression("Source".to_string()));
    }

    #[test]
    fn let_steps_are_followed() {
        let m = "let\n    Source = File.Contents(\"C:\\data\\sales.csv\"),\n    \
                 #\"Raw Data\" = Csv.Document(Source, [Delimiter=\",\", Encoding=65001]),\n    \
                 Loop = Loop,\n    Fn = (x) => x\nin\n    #\"Raw Data\"";
        let steps = LetSteps::parse(m);
        let params = ParameterTable::default();

        assert_eq!(steps.get("Source"), Some("File.Contents(\"C:\\data\\sales.csv\")"));
        assert_eq!(
            steps.get("Raw Data"),
            Some("Csv.Document(Source, [Delimiter=\",\", Encoding=65001])")
        );
        assert_eq!(steps.get("Delimiter"), None);
        assert_eq!(steps.len(), 4);

        assert_eq!(
            classify("Source", &steps, &params),
            MArg::Literal("C:\\data\\sales.csv".to_string())
        );
        assert_eq!(classify("Loop", &steps, &params), MArg::Expression("Loop".to_string()));
    }
}
