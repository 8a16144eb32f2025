//! Statements and statement inputs.

use std::collections::HashMap;

use super::types::Value;
use crate::bolt::error::BoltResult;
use crate::bolt::packstream::PackStreamValue;

/// Opaque statement text, its named parameters and an optional caller tag.
///
/// The tag never reaches the server; it is carried into the statement's
/// result so a caller can find it again in a [`ResultCollection`].
///
/// [`ResultCollection`]: super::pipeline::ResultCollection
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub text: String,
    pub parameters: HashMap<String, Value>,
    pub tag: Option<String>,
}

impl Statement {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            parameters: HashMap::new(),
            tag: None,
        }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_params(mut self, params: HashMap<String, Value>) -> Self {
        self.parameters.extend(params);
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Whitespace-only text counts as empty.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub(crate) fn encoded_parameters(&self) -> BoltResult<HashMap<String, PackStreamValue>> {
        self.parameters
            .iter()
            .map(|(k, v)| Ok((k.clone(), v.to_packstream()?)))
            .collect()
    }
}

impl From<&str> for Statement {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Statement {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Something that can be queued: one statement, or an ordered stack of them.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementInput {
    Single(Statement),
    Stack(Vec<Statement>),
}

impl StatementInput {
    /// Flatten into statements in submission order.
    pub fn into_statements(self) -> Vec<Statement> {
        match self {
            StatementInput::Single(statement) => vec![statement],
            StatementInput::Stack(statements) => statements,
        }
    }
}

impl From<Statement> for StatementInput {
    fn from(statement: Statement) -> Self {
        StatementInput::Single(statement)
    }
}

impl From<Vec<Statement>> for StatementInput {
    fn from(statements: Vec<Statement>) -> Self {
        StatementInput::Stack(statements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bolt::error::BoltError;
    use crate::driver::types::Node;

    #[test]
    fn test_statement_builder() {
        let statement = Statement::new("MATCH (n) WHERE n.age > $age RETURN n")
            .with_param("age", 30)
            .with_tag("adults");
        assert_eq!(statement.parameters.get("age"), Some(&Value::Integer(30)));
        assert_eq!(statement.tag.as_deref(), Some("adults"));
        assert!(!statement.is_empty());
        assert!(Statement::new("  \n").is_empty());
    }

    #[test]
    fn test_encoded_parameters() {
        let ok = Statement::new("RETURN $x").with_param("x", "y");
        assert_eq!(
            ok.encoded_parameters().unwrap().get("x"),
            Some(&PackStreamValue::from("y"))
        );

        let node = Value::Node(Node::new(1, vec![], HashMap::new()));
        let bad = Statement::new("RETURN $n").with_param("n", node);
        assert!(matches!(bad.encoded_parameters(), Err(BoltError::Encode(_))));
    }

    #[test]
    fn test_input_flattening() {
        let stack = StatementInput::from(vec![Statement::new("A"), Statement::new("B")]);
        let texts: Vec<_> = stack.into_statements().into_iter().map(|s| s.text).collect();
        assert_eq!(texts, vec!["A", "B"]);
        assert_eq!(StatementInput::from(Statement::new("C")).into_statements().len(), 1);
    }

    #[test]
    fn test_params_macro() {
        let statement = Statement::new("CREATE (p:Person {name: $name, age: $age})")
            .with_params(crate::params! { "name" => "Alice", "age" => 42i64 });
        assert_eq!(statement.parameters.len(), 2);
        assert_eq!(statement.parameters.get("name"), Some(&Value::from("Alice")));
        let empty: HashMap<String, Value> = crate::params!();
        assert!(empty.is_empty());
    }
}
