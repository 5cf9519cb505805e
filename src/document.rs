//! Embedded document codec
//!
//! Policy documents arrive as serialized (often percent-encoded) JSON inside
//! provider payloads. They are parsed into a [`PolicyDocument`]: a version
//! string plus an ordered list of statements.

use crate::error::DocumentError;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::OnceLock;

/// Parsed policy document
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyDocument {
    /// Empty when the document carries no version
    pub version: String,
    pub statement: Vec<Statement>,
}

/// One policy statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    #[serde(default)]
    pub sid: Option<String>,
    #[serde(default)]
    pub effect: Option<String>,
    #[serde(default)]
    pub principal: Option<Value>,
    #[serde(default)]
    pub not_principal: Option<Value>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub action: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub not_action: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub resource: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many")]
    pub not_resource: Vec<String>,
    #[serde(default)]
    pub condition: Option<Value>,
}

impl Statement {
    pub fn allows(&self) -> bool {
        self.effect.as_deref() == Some("Allow")
    }

    /// Whether the statement grants every action
    pub fn is_wildcard_action(&self) -> bool {
        self.action.iter().any(|a| a == "*")
    }
}

/// Accept either a single string or a list of strings
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Null,
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
        OneOrMany::Null => Vec::new(),
    })
}

/// Process-wide document codec.
///
/// Immutable after construction and shared by every fetch.
#[derive(Debug)]
pub struct DocumentCodec {
    version_key: &'static str,
    statement_key: &'static str,
}

static CODEC: OnceLock<DocumentCodec> = OnceLock::new();

impl DocumentCodec {
    /// Get the shared codec (constructed on first access)
    pub fn global() -> &'static DocumentCodec {
        CODEC.get_or_init(|| DocumentCodec {
            version_key: "Version",
            statement_key: "Statement",
        })
    }

    /// Parse a policy document from its JSON text
    pub fn parse_policy(&self, text: &str) -> Result<PolicyDocument, DocumentError> {
        let tree: Value = serde_json::from_str(text)?;
        let Value::Object(root) = tree else {
            return Err(DocumentError::NotAnObject(json_type(&tree)));
        };

        let version = match root.get(self.version_key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        };

        let statement = match root.get(self.statement_key) {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| Statement::deserialize(entry).map_err(DocumentError::from))
                .collect::<Result<Vec<_>, _>>()?,
            Some(single) => vec![Statement::deserialize(single)?],
        };

        Ok(PolicyDocument { version, statement })
    }

    /// Parse a percent-encoded policy document, as returned by IAM
    pub fn decode_policy(&self, encoded: &str) -> Result<PolicyDocument, DocumentError> {
        let decoded = urlencoding::decode(encoded)?;
        self.parse_policy(&decoded)
    }

    /// Serialize a record into a generic tree
    pub fn to_value<T: Serialize>(&self, value: &T) -> Result<Value, DocumentError> {
        Ok(serde_json::to_value(value)?)
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> &'static DocumentCodec {
        DocumentCodec::global()
    }

    #[test]
    fn test_parse_statement_list() {
        let doc = codec()
            .parse_policy(
                r#"{"Version":"2012-10-17","Statement":[
                    {"Effect":"Allow","Action":"s3:GetObject","Resource":"*"},
                    {"Effect":"Deny","Action":["iam:*","sts:*"],
                     "Resource":["arn:aws:iam::1:role/x"]}
                ]}"#,
            )
            .unwrap();
        assert_eq!(doc.version, "2012-10-17");
        assert_eq!(doc.statement.len(), 2);
        assert_eq!(doc.statement[0].action, vec!["s3:GetObject"]);
        assert_eq!(doc.statement[1].action, vec!["iam:*", "sts:*"]);
        assert!(doc.statement[0].allows());
    }

    #[test]
    fn test_missing_statement_is_empty() {
        let doc = codec().parse_policy(r#"{"Version":"2012-10-17"}"#).unwrap();
        assert!(doc.statement.is_empty());

        let doc = codec().parse_policy(r#"{"Statement":null}"#).unwrap();
        assert!(doc.statement.is_empty());
        assert_eq!(doc.version, "");
    }

    #[test]
    fn test_single_statement_object() {
        let doc = codec()
            .parse_policy(
                r#"{"Version":"2012-10-17",
                    "Statement":{"Effect":"Allow","Action":"*","Resource":"*"}}"#,
            )
            .unwrap();
        assert_eq!(doc.statement.len(), 1);
        assert!(doc.statement[0].is_wildcard_action());
    }

    #[test]
    fn test_malformed_document_keeps_cause() {
        let err = codec().parse_policy("{not json").unwrap_err();
        assert!(matches!(err, DocumentError::Malformed(_)));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_non_object_root_fails() {
        let err = codec().parse_policy("[1, 2]").unwrap_err();
        assert!(matches!(err, DocumentError::NotAnObject("array")));
    }

    #[test]
    fn test_decode_percent_encoded() {
        let encoded = "%7B%22Version%22%3A%222012-10-17%22%2C%22Statement%22%3A%5B%5D%7D";
        let doc = codec().decode_policy(encoded).unwrap();
        assert_eq!(doc.version, "2012-10-17");
        assert!(doc.statement.is_empty());
    }
}
