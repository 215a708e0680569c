//! `roles/*.tmdl` scanner

use semlineage_core::{DiagnosticCode, Role, TablePermission};

use crate::lines::{
    classify_body_line, extract_name, indent_of, indent_unit, is_blank, is_structural, split_assignment,
    split_first_word, unquote, BodyLine, ExpressionCapture, WarningSink,
};

const ROLE_KEYWORDS: &[&str] = &["role", "tablePermission", "member"];

pub(crate) fn parse_roles(text: &str, mut sink: WarningSink<'_>) -> Vec<Role> {
    let lines: Vec<&str> = text.lines().collect();
    let unit = indent_unit(&lines);

    let mut roles = Vec::new();
    let mut current: Option<Role> = None;
    let mut description: Vec<String> = Vec::new();
    let mut capture: Option<ExpressionCapture> = None;

    for (idx, line) in lines.iter().enumerate() {
        let line_no = idx + 1;

        if let Some(active) = capture.as_mut() {
            if active.offer(line, is_structural(line.trim(), ROLE_KEYWORDS)) {
                continue;
            }
            if let Some(done) = capture.take() {
                attach_filter(&mut current, done.finish());
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
        if word == "role" {
            roles.extend(current.take());
            current = Some(Role {
                name: extract_name(rest),
                description: (!description.is_empty()).then(|| description.join("\n")),
                ..Default::default()
            });
            description.clear();
            continue;
        }

        let Some(role) = current.as_mut() else {
            continue;
        };

        if word == "tablePermission" {
            let (head, inline) = split_assignment(rest);
            role.table_permissions.push(TablePermission {
                table: extract_name(head),
                filter_expression: String::new(),
            });
            if let Some(inline) = inline {
                capture = Some(ExpressionCapture::open(inline, indent + unit, indent, line_no));
            }
            continue;
        }

        match classify_body_line(trimmed) {
            BodyLine::Property { key: "filterExpression", value }
            | BodyLine::ExpressionProperty { key: "filterExpression", inline: value } => {
                if role.table_permissions.is_empty() {
                    sink.warn(
                        DiagnosticCode::TmdlOrphanObject,
                        line_no,
                        format!("filterExpression in role '{}' is not inside a tablePermission", role.name),
                    );
                    continue;
                }
                capture = Some(ExpressionCapture::open(value, indent, indent, line_no));
            }
            BodyLine::Property { key: "modelPermission", value } => {
                role.model_permission = Some(unquote(value));
            }
            BodyLine::Property { key: "description", value } => {
                role.description = Some(unquote(value));
            }
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
        attach_filter(&mut current, done.finish());
    }
    roles.extend(current.take());

    roles
}

fn attach_filter(role: &mut Option<Role>, text: String) {
    if let Some(permission) = role.as_mut().and_then(|r| r.table_permissions.last_mut()) {
        permission.filter_expression = text;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Vec<Role> {
        let mut warnings = Vec::new();
        let roles = parse_roles(text, WarningSink::new("roles/Reader.tmdl", &mut warnings));
        assert!(warnings.is_empty(), "unexpected warnings: {:?}", warnings);
        roles
    }

    #[test]
    fn inline_and_continued_permissions() {
        let roles = parse(
            "/// Regional readers\n\
             role 'West Readers'\n\
             \tmodelPermission: read\n\
             \n\
             \ttablePermission Sales = [Region] = \"West\"\n\
             \n\
             \ttablePermission 'Customer Dim' =\n\
             \t\t\t[Country] = \"US\"\n\
             \t\t\t    && [Active] = TRUE()\n\
             \n\
             \tmember alice@contoso.com\n",
        );
        assert_eq!(roles.len(), 1);
        let role = &roles[0];
        assert_eq!(role.name, "West Readers");
        assert_eq!(role.description.as_deref(), Some("Regional readers"));
        assert_eq!(role.model_permission.as_deref(), Some("read"));

        let perms: Vec<_> = role
            .table_permissions
            .iter()
            .map(|p| (p.table.as_str(), p.filter_expression.as_str()))
            .collect();
        assert_eq!(
            perms,
            vec![
                ("Sales", "[Region] = \"West\""),
                ("Customer Dim", "[Country] = \"US\"\n    && [Active] = TRUE()"),
            ]
        );
    }

    #[test]
    fn nested_filter_expression_property() {
        let roles = parse(
            "role Product\n\
             \ttablePermission Product\n\
             \t\tfilterExpression: [Color] = \"Red\"\n\
             \t\t\t&& [Size] = \"L\"\n\
             \ttablePermission Store\n\
             \t\tfilterExpression: TRUE()\n",
        );
        let perms = &roles[0].table_permissions;
        assert_eq!(perms[0].table, "Product");
        assert_eq!(perms[0].filter_expression, "[Color] = \"Red\"\n&& [Size] = \"L\"");
        assert_eq!(perms[1].filter_expression, "TRUE()");
    }
}
