//! `relationships.tmdl` scanner

use semlineage_core::{Cardinality, DiagnosticCode, Relationship};

use crate::lines::{
    classify_body_line, extract_name, is_blank, parse_bool, parse_qualified_column, split_first_word,
    unquote, BodyLine, WarningSink,
};

pub(crate) fn parse_relationships(text: &str, mut sink: WarningSink<'_>) -> Vec<Relationship> {
    let mut relationships = Vec::new();
    let mut current: Option<(Relationship, usize)> = None;

    for (idx, line) in text.lines().enumerate() {
        if is_blank(line) {
            continue;
        }
        let line_no = idx + 1;
        let trimmed = line.trim();
        let (word, rest) = split_first_word(trimmed);

        if word == "relationship" {
            if let Some((rel, start)) = current.take() {
                relationships.push(validate(rel, start, &mut sink));
            }
            current = Some((Relationship::new(extract_name(rest)), line_no));
            continue;
        }

        let Some((rel, _)) = current.as_mut() else {
            continue;
        };

        match classify_body_line(trimmed) {
            BodyLine::Property { key, value } => apply_property(rel, key, value),
            BodyLine::Flag(key) => apply_property(rel, key, "true"),
            _ => {}
        }
    }

    if let Some((rel, start)) = current.take() {
        relationships.push(validate(rel, start, &mut sink));
    }

    relationships
}

fn apply_property(rel: &mut Relationship, key: &str, value: &str) {
    match key {
        "fromColumn" => {
            if let Some((table, column)) = parse_qualified_column(value) {
                rel.from_table = table;
                rel.from_column = column;
            }
        }
        "toColumn" => {
            if let Some((table, column)) = parse_qualified_column(value) {
                rel.to_table = table;
                rel.to_column = column;
            }
        }
        "fromCardinality" => {
            if let Some(cardinality) = Cardinality::parse(value) {
                rel.from_cardinality = cardinality;
            }
        }
        "toCardinality" => {
            if let Some(cardinality) = Cardinality::parse(value) {
                rel.to_cardinality = cardinality;
            }
        }
        "crossFilteringBehavior" => rel.cross_filtering_behavior = unquote(value),
        "isActive" => rel.is_active = parse_bool(value),
        _ => {}
    }
}

/// Relationships missing an endpoint are kept but reported
fn validate(rel: Relationship, line: usize, sink: &mut WarningSink<'_>) -> Relationship {
    if rel.from_table.is_empty() || rel.to_table.is_empty() {
        sink.warn(
            DiagnosticCode::TmdlInvalidRelationship,
            line,
            format!("relationship '{}' is missing fromColumn or toColumn", rel.id),
        );
    }
    rel
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relationship_endpoints_and_defaults() {
        let mut warnings = Vec::new();
        let rels = parse_relationships(
            "relationship 3f2a\n\
             \tfromColumn: Sales.CustomerKey\n\
             \ttoColumn: Customer.CustomerKey\n\
             \n\
             relationship 'Sales to Date'\n\
             \tisActive: false\n\
             \tcrossFilteringBehavior: bothDirections\n\
             \tfromCardinality: one\n\
             \tfromColumn: 'Sales Table'.'Order Date'\n\
             \ttoColumn: 'Date'.Date\n",
            WarningSink::new("relationships.tmdl", &mut warnings),
        );
        assert!(warnings.is_empty());
        assert_eq!(rels.len(), 2);

        assert_eq!(rels[0].id, "3f2a");
        assert_eq!(rels[0].from_table, "Sales");
        assert_eq!(rels[0].to_column, "CustomerKey");
        assert_eq!(rels[0].from_cardinality, Cardinality::Many);
        assert_eq!(rels[0].to_cardinality, Cardinality::One);
        assert!(rels[0].is_active);

        assert_eq!(rels[1].id, "Sales to Date");
        assert_eq!(rels[1].from_table, "Sales Table");
        assert_eq!(rels[1].from_column, "Order Date");
        assert_eq!(rels[1].to_table, "Date");
        assert_eq!(rels[1].from_cardinality, Cardinality::One);
        assert_eq!(rels[1].cross_filtering_behavior, "bothDirections");
        assert!(!rels[1].is_active);
    }

    #[test]
    fn missing_endpoint_is_reported() {
        let mut warnings = Vec::new();
        let rels = parse_relationships(
            "relationship r1\n\tfromColumn: Sales.Key\n",
            WarningSink::new("relationships.tmdl", &mut warnings),
        );
        assert_eq!(rels.len(), 1);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].code, DiagnosticCode::TmdlInvalidRelationship);
        assert_eq!(warnings[0].line(), Some(1));
    }
}
