//! Parameter lookup over a model's shared expressions

use semlineage_core::Expression;
use std::collections::{HashMap, HashSet};

/// Shared expressions by name, with the literal value of every text
/// parameter query
#[derive(Debug, Clone, Default)]
pub struct ParameterTable {
    literals: HashMap<String, String>,
    names: HashSet<String>,
}

impl ParameterTable {
    pub fn from_expressions(expressions: &[Expression]) -> Self {
        let mut table = Self::default();
        for expression in expressions {
            table.names.insert(expression.name.clone());
            if let Some(value) = expression.parameter_literal() {
                table.literals.insert(expression.name.clone(), value);
            }
        }
        table
    }

    /// Literal value of parameter `name`
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.literals.get(name).map(String::as_str)
    }

    /// Some shared expression is called `name`
    pub fn is_known(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.literals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.literals.is_empty()
    }
}
