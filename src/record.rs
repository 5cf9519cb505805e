//! Canonical records
//!
//! Every fetched resource ends up in one uniform envelope,
//! [`CanonicalRecord`], parameterized over the provider payload. Relationship
//! records (edges such as group membership) are plain structs implementing
//! [`Resource`] directly.

use crate::error::ConfigError;
use crate::normalize::Schema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identifier of a resource type within a query context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceType(&'static str);

impl ResourceType {
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    pub fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

impl Serialize for ResourceType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.0)
    }
}

/// A record type that can be fetched, cached and queried
pub trait Resource: Serialize + Send + Sync + 'static {
    const TYPE: ResourceType;

    /// Column descriptor, built once per resource type
    fn schema() -> Result<Schema, ConfigError> {
        Ok(Schema::attribute(Self::TYPE))
    }
}

/// Provider payload carried inside a [`CanonicalRecord`]
pub trait Payload: Serialize + Send + Sync + 'static {
    const TYPE: ResourceType;

    fn schema() -> Result<Schema, ConfigError> {
        Ok(Schema::attribute(Self::TYPE))
    }
}

impl<P: Payload> Resource for CanonicalRecord<P> {
    const TYPE: ResourceType = P::TYPE;

    fn schema() -> Result<Schema, ConfigError> {
        P::schema()
    }
}

/// Key/value side attributes of a record, typically tags.
///
/// Always present; an empty mapping stands for "no attributes" and a missing
/// key is reported as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<String, String>);

impl Attributes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl From<BTreeMap<String, String>> for Attributes {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl From<HashMap<String, String>> for Attributes {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

/// Uniform envelope for a fetched resource.
///
/// `(account_id, region, resource_id)` is unique within one resource type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord<P> {
    pub account_id: String,
    pub region: Option<String>,
    pub resource_id: String,
    pub payload: P,
    pub attributes: Attributes,
}

impl<P> CanonicalRecord<P> {
    pub fn new(
        account_id: impl Into<String>,
        region: Option<String>,
        resource_id: impl Into<String>,
        payload: P,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            region,
            resource_id: resource_id.into(),
            payload,
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(mut self, attributes: impl Into<Attributes>) -> Self {
        self.attributes = attributes.into();
        self
    }

    /// Look up a side attribute; absence is not an error
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key)
    }
}

/// Derive a resource id from an ARN-like identifier.
///
/// Returns everything after the fifth colon
/// (`arn:aws:iam::123456789012:role/admin` -> `role/admin`), or the input
/// unchanged when it has fewer than six segments.
pub fn resource_id_from_arn(arn: &str) -> &str {
    match arn.match_indices(':').nth(4) {
        Some((idx, _)) if idx + 1 < arn.len() => &arn[idx + 1..],
        _ => arn,
    }
}

/// Extract short name from a provider resource URL
/// e.g., ".../projects/my-project/zones/us-central1-a" -> "us-central1-a"
pub fn short_name(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or(url)
}
