//! Record normalization
//!
//! A [`Schema`] is the column descriptor of one resource type, declared once
//! and applied to every record of that type:
//!
//! - [`Convention::Attribute`]: every serialized field of the record becomes a
//!   column of the same name.
//! - [`Convention::Component`]: only the declared columns exist, each read
//!   from a path into the serialized record.
//!
//! Rows keep nested values intact so the query layer can use dotted paths,
//! bracket lookups into `attributes`, and unnesting of sequence values.

mod path;

pub use path::{display_value, PathError, PathExpr, Segment};

use crate::document::DocumentCodec;
use crate::error::{ConfigError, DocumentError};
use crate::record::ResourceType;
use serde::Serialize;
use serde_json::{Map, Value};

/// Rule deciding which attributes of a record become columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Convention {
    Attribute,
    Component,
}

/// A named column read from a path into the serialized record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub path: &'static str,
}

impl Column {
    pub const fn new(name: &'static str, path: &'static str) -> Self {
        Self { name, path }
    }
}

/// Column descriptor of a resource type
#[derive(Debug, Clone)]
pub struct Schema {
    resource_type: ResourceType,
    convention: Convention,
    columns: Vec<(Column, PathExpr)>,
}

impl Schema {
    pub fn attribute(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            convention: Convention::Attribute,
            columns: Vec::new(),
        }
    }

    /// Explicit column set; fails on the first column whose path does not parse
    pub fn component(resource_type: ResourceType, columns: &[Column]) -> Result<Self, ConfigError> {
        let columns = columns
            .iter()
            .map(|column| {
                PathExpr::parse(column.path)
                    .map(|expr| (column.clone(), expr))
                    .map_err(|source| ConfigError::InvalidColumn {
                        resource_type,
                        column: column.name,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            resource_type,
            convention: Convention::Component,
            columns,
        })
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn convention(&self) -> Convention {
        self.convention
    }

    /// Declared column names; empty for the attribute convention
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|(c, _)| c.name).collect()
    }

    /// Normalize one record into a row
    pub fn to_row<R: Serialize>(&self, record: &R) -> Result<Row, DocumentError> {
        let value = DocumentCodec::global().to_value(record)?;
        let Value::Object(fields) = value else {
            return Err(DocumentError::NotARecord);
        };

        let columns = match self.convention {
            Convention::Attribute => fields,
            Convention::Component => {
                let root = Value::Object(fields);
                self.columns
                    .iter()
                    .map(|(column, expr)| {
                        let value = expr.lookup(&root).cloned().unwrap_or(Value::Null);
                        (column.name.to_string(), value)
                    })
                    .collect()
            }
        };

        Ok(Row { columns })
    }
}

/// One normalized, queryable record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    columns: Map<String, Value>,
}

impl Row {
    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// Resolve a path expression; a missing step is `Ok(None)`
    pub fn select(&self, expr: &str) -> Result<Option<&Value>, PathError> {
        let expr = PathExpr::parse(expr)?;
        Ok(self.lookup(&expr))
    }

    pub fn lookup(&self, expr: &PathExpr) -> Option<&Value> {
        let (first, rest) = expr.segments().split_first()?;
        let Segment::Key(column) = first else {
            return None;
        };
        let start = self.columns.get(column.as_str())?;
        rest.iter().try_fold(start, |current, segment| segment.step(current))
    }

    /// A value is present when the path resolves to something other than null
    pub fn is_present(&self, expr: &str) -> Result<bool, PathError> {
        Ok(!matches!(self.select(expr)?, None | Some(Value::Null)))
    }

    /// Unnest a sequence-valued attribute into its entries
    pub fn unnest(&self, expr: &str) -> Result<Vec<&Value>, PathError> {
        Ok(match self.select(expr)? {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => Vec::new(),
        })
    }

    /// Correlated existence check over an unnested attribute
    pub fn exists<F>(&self, expr: &str, predicate: F) -> Result<bool, PathError>
    where
        F: Fn(&Value) -> bool,
    {
        Ok(self.unnest(expr)?.into_iter().any(predicate))
    }
}
