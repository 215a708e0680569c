//! `expressions.tmdl` scanner (shared queries and parameters)

use semlineage_core::{DiagnosticCode, Expression};

use crate::lines::{
    classify_body_line, extract_name, indent_of, indent_unit, is_blank, is_structural, split_assignment,
    split_first_word, unquote, BodyLine, ExpressionCapture, WarningSink,
};

const EXPRESSION_KEYWORDS: &[&str] = &["expression"];

pub(crate) fn parse_expressions(text: &str, mut sink: WarningSink<'_>) -> Vec<Expression> {
    let lines: Vec<&str> = text.lines().collect();
    let unit = indent_unit(&lines);

    let mut expressions = Vec::new();
    let mut current: Option<Expression> = None;
    let mut description: Vec<String> = Vec::new();
    let mut capture: Option<ExpressionCapture> = None;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;

        if let Some(active) = capture.as_mut() {
            if active.offer(line, is_structural(line.trim(), EXPRESSION_KEYWORDS)) {
                continue;
            }
            if let (Some(done), Some(expr)) = (capture.take(), current.as_mut()) {
                expr.expression = done.finish();
            }
        }

        if is_blank(line) {
            continue;
        }

        let indent = indent_of(line);
        let trimmed = line.trim();

        if let Some(doc) = trimmed.strip_prefix("///") {
            description.push(doc.trim().to_string());
            continue;
        }

        let (word, rest) = split_first_word(trimmed);
        if word == "expression" {
            expressions.extend(current.take());

            let (head, inline) = split_assignment(rest);
            current = Some(Expression {
                name: extract_name(head),
                kind: "m".to_string(),
                expression: String::new(),
                description: (!description.is_empty()).then(|| description.join("\n")),
            });
            description.clear();

            if let Some(inline) = inline {
                capture = Some(ExpressionCapture::open(inline, indent + unit, indent, line_no));
            }
            continue;
        }

        let Some(expr) = current.as_mut() else {
            continue;
        };

        match classify_body_line(trimmed) {
            BodyLine::Property { key: "kind", value } => expr.kind = unquote(value),
            BodyLine::Property { key: "description", value } => expr.description = Some(unquote(value)),
            _ => {}
        }
    }

    if let Some(done) = capture.take() {
        if done.is_fenced() {
            sink.warn(
                DiagnosticCode::TmdlUnterminatedBlock,
                done.start_line(),
                "``` block is never closed; captured to end of file",
            );
        }
        if let Some(expr) = current.as_mut() {
            expr.expression = done.finish();
        }
    }
    expressions.extend(current.take());

    expressions
}
