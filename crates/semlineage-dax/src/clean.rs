//! Comment and string-literal removal
//!
//! Runs before any reference scanning so that `[Name]` inside a literal or a
//! comment is never reported. Bracketed identifiers and quoted table names
//! are copied untouched, so `//` or `"` inside them survive.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Code,
    String,
    LineComment,
    BlockComment,
    Bracket,
    Quote,
}

/// Strip `//`, `--` and `/* */` comments and empty every `"..."` literal
///
/// String literals are kept as `""` so function arity and positions of the
/// surrounding tokens do not change. Newlines are preserved.
pub fn clean(dax: &str) -> String {
    let mut out = String::with_capacity(dax.len());
    let mut chars = dax.chars().peekable();
    let mut state = State::Code;

    while let Some(c) = chars.next() {
        let next = chars.peek().copied();

        match state {
            State::Code => match (c, next) {
                ('"', _) => {
                    out.push('"');
                    state = State::String;
                }
                ('/', Some('/')) | ('-', Some('-')) => {
                    chars.next();
                    state = State::LineComment;
                }
                ('/', Some('*')) => {
                    chars.next();
                    out.push(' ');
                    state = State::BlockComment;
                }
                ('[', _) => {
                    out.push(c);
                    state = State::Bracket;
                }
                ('\'', _) => {
                    out.push(c);
                    state = State::Quote;
                }
                _ => out.push(c),
            },
            State::String => {
                if c == '"' {
                    if next == Some('"') {
                        chars.next();
                    } else {
                        out.push('"');
                        state = State::Code;
                    }
                }
            }
            State::LineComment => {
                if c == '\n' {
                    out.push('\n');
                    state = State::Code;
                }
            }
            State::BlockComment => {
                if c == '*' && next == Some('/') {
                    chars.next();
                    state = State::Code;
                } else if c == '\n' {
                    out.push('\n');
                }
            }
            State::Bracket => {
                out.push(c);
                if c == ']' {
                    if next == Some(']') {
                        chars.next();
                        out.push(']');
                    } else {
                        state = State::Code;
                    }
                }
            }
            State::Quote => {
                out.push(c);
                if c == '\'' {
                    if next == Some('\'') {
                        chars.next();
                        out.push('\'');
                    } else {
                        state = State::Code;
                    }
                }
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strings_are_emptied() {
        assert_eq!(clean(r#"IF([X] = "[Y]", 1)"#), r#"IF([X] = "", 1)"#);
        assert_eq!(clean(r#""say ""[Z]"" now""#), r#""""#);
    }

    #[test]
    fn comments_are_removed() {
        assert_eq!(clean("[A] // [B]\n+ [C]"), "[A] \n+ [C]");
        assert_eq!(clean("[A] -- [B]\n+ [C]"), "[A] \n+ [C]");
        assert_eq!(clean("[A] /* [B]\n[C] */ + [D]"), "[A]  \n + [D]");
    }

    #[test]
    fn brackets_and_quotes_are_verbatim() {
        assert_eq!(clean("[Sales // Net]"), "[Sales // Net]");
        assert_eq!(clean("'Sales -- 2024'[Amount]"), "'Sales -- 2024'[Amount]");
        assert_eq!(clean("[A]]B] // x"), "[A]]B] ");
        assert_eq!(clean("'It''s'[C]"), "'It''s'[C]");
    }

    #[test]
    fn unterminated_constructs_do_not_panic() {
        assert_eq!(clean("\"open"), "\"");
        assert_eq!(clean("/* open"), " ");
        assert_eq!(clean("[open"), "[open");
        assert_eq!(clean(""), "");
    }
}
