//! Path expressions into normalized rows
//!
//! Supports dot notation (`payload.properties.publicNetworkAccess`), numeric
//! segments (`payload.rules.0`), and bracket lookups (`attributes['Team']`,
//! `payload.rules[0]`). A dotted numeric segment indexes arrays and names a
//! key on objects, so `attributes.2024` reads the tag `2024`.

use serde_json::Value;

/// Malformed path expression
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("empty path expression")]
    Empty,

    #[error("empty segment at offset {0} in '{1}'")]
    EmptySegment(usize, String),

    #[error("unterminated bracket in '{0}'")]
    UnterminatedBracket(String),

    #[error("invalid bracket content '{0}'")]
    InvalidBracket(String),

    #[error("expected '.' or '[' at offset {0} in '{1}'")]
    MissingSeparator(usize, String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

impl Segment {
    /// Descend one level into `current`
    pub fn step<'v>(&self, current: &'v Value) -> Option<&'v Value> {
        match (self, current) {
            (Segment::Key(key), Value::Array(items)) => items.get(key.parse::<usize>().ok()?),
            (Segment::Key(key), _) => current.get(key.as_str()),
            (Segment::Index(idx), Value::Object(fields)) => fields.get(&idx.to_string()),
            (Segment::Index(idx), _) => current.get(*idx),
        }
    }
}

/// Parsed path expression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathExpr {
    segments: Vec<Segment>,
}

impl PathExpr {
    pub fn parse(expr: &str) -> Result<Self, PathError> {
        if expr.is_empty() {
            return Err(PathError::Empty);
        }

        let mut segments = Vec::new();
        let mut rest = expr;
        let mut offset = 0;
        let mut expect_segment = true;

        while !rest.is_empty() {
            if let Some(inner) = rest.strip_prefix('[') {
                if expect_segment && !segments.is_empty() {
                    return Err(PathError::EmptySegment(offset, expr.to_string()));
                }
                let Some(end) = inner.find(']') else {
                    return Err(PathError::UnterminatedBracket(expr.to_string()));
                };
                segments.push(parse_bracket(&inner[..end])?);
                let consumed = end + 2;
                rest = &rest[consumed..];
                offset += consumed;
                expect_segment = false;
                if !rest.is_empty() && !rest.starts_with(['.', '[']) {
                    return Err(PathError::MissingSeparator(offset, expr.to_string()));
                }
                continue;
            }

            if let Some(after_dot) = rest.strip_prefix('.') {
                if expect_segment {
                    return Err(PathError::EmptySegment(offset, expr.to_string()));
                }
                rest = after_dot;
                offset += 1;
                expect_segment = true;
                if rest.is_empty() {
                    return Err(PathError::EmptySegment(offset, expr.to_string()));
                }
                continue;
            }

            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            let part = &rest[..end];
            segments.push(Segment::Key(part.to_string()));
            rest = &rest[end..];
            offset += end;
            expect_segment = false;
        }

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Walk the path; any missing step yields `None`
    pub fn lookup<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(root, |current, segment| segment.step(current))
    }
}

fn parse_bracket(content: &str) -> Result<Segment, PathError> {
    let quoted = ['\'', '"'].iter().find_map(|q| {
        content
            .strip_prefix(*q)
            .and_then(|s| s.strip_suffix(*q))
    });
    if let Some(key) = quoted {
        return Ok(Segment::Key(key.to_string()));
    }
    content
        .parse::<usize>()
        .map(Segment::Index)
        .map_err(|_| PathError::InvalidBracket(content.to_string()))
}

/// Render a value for display
pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(arr)) => format!("[{} items]", arr.len()),
        Some(Value::Object(_)) => "[object]".to_string(),
    }
}
