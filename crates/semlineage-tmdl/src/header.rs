//! `database.tmdl` and `model.tmdl` scanners

use semlineage_core::Model;

use crate::lines::{
    classify_body_line, extract_name, indent_of, indent_unit, is_blank, split_first_word, unquote,
    BodyLine,
};

/// Read the database header and its `compatibilityLevel`
pub(crate) fn parse_database(text: &str, model: &mut Model) {
    for line in text.lines().filter(|l| !is_blank(l)) {
        let trimmed = line.trim();
        let (word, rest) = split_first_word(trimmed);

        if word == "database" && indent_of(line) == 0 {
            model.database.name = extract_name(rest);
            continue;
        }

        if let BodyLine::Property { key: "compatibilityLevel", value } = classify_body_line(trimmed) {
            model.database.compatibility_level = value.trim().parse().ok();
        }
    }
}

/// Read the model header and its direct properties
///
/// Only properties one step below the header are kept; nested blocks such
/// as `dataAccessOptions` children are skipped.
pub(crate) fn parse_model(text: &str, model: &mut Model) {
    let lines: Vec<&str> = text.lines().collect();
    let unit = indent_unit(&lines);
    let mut header_indent: Option<usize> = None;

    for line in lines.iter().filter(|l| !is_blank(l)) {
        let indent = indent_of(line);
        let trimmed = line.trim();
        let (word, rest) = split_first_word(trimmed);

        if word == "model" {
            model.model.name = extract_name(rest);
            header_indent = Some(indent);
            continue;
        }

        match header_indent {
            Some(header) if indent == header + unit => {}
            Some(header) if indent <= header => {
                header_indent = None;
                continue;
            }
            _ => continue,
        }

        match classify_body_line(trimmed) {
            BodyLine::Property { key: "culture", value } => {
                model.model.culture = Some(unquote(value));
            }
            BodyLine::Property { key, value } => {
                model.model.properties.insert(key.to_string(), unquote(value));
            }
            BodyLine::Flag(key) => {
                model.model.properties.insert(key.to_string(), "true".to_string());
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_header() {
        let mut model = Model::default();
        parse_database("database 'Contoso Sales'\n\tcompatibilityLevel: 1567\n", &mut model);
        assert_eq!(model.database.name, "Contoso Sales");
        assert_eq!(model.database.compatibility_level, Some(1567));
    }

    #[test]
    fn model_properties() {
        let mut model = Model::default();
        parse_model(
            "model Model\n\
             \tculture: en-US\n\
             \tdefaultPowerBIDataSourceVersion: powerBI_V3\n\
             \tdiscourageImplicitMeasures\n\
             \n\
             \tdataAccessOptions\n\
             \t\tlegacyRedirects\n\
             \n\
             annotation __PBI_TimeIntelligenceEnabled = 0\n\
             \n\
             ref table Sales\n",
            &mut model,
        );
        assert_eq!(model.model.name, "Model");
        assert_eq!(model.model.culture.as_deref(), Some("en-US"));
        assert_eq!(
            model.model.properties.get("defaultPowerBIDataSourceVersion").map(String::as_str),
            Some("powerBI_V3")
        );
        assert_eq!(model.model.properties.get("discourageImplicitMeasures").map(String::as_str), Some("true"));
        assert_eq!(model.model.properties.get("dataAccessOptions").map(String::as_str), Some("true"));
        assert!(!model.model.properties.contains_key("legacyRedirects"));
    }
}
