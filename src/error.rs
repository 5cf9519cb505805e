//! Error taxonomy and classification
//!
//! Raw failures travel as [`anyhow::Error`] inside fetch routines and are
//! turned into a [`FetchError`] by [`classify`] at the innermost point where
//! the account, region, resource type and resource id are known. A failure
//! that is already a [`FetchError`] is handed back untouched, so enclosing
//! loops can classify again without nesting.

use crate::record::ResourceType;
use std::fmt;

/// Boxed cause retained on a classified error
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Kind of a classified fetch failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad or missing account/region setup
    Configuration,
    /// Authorization or validation failure reported by the provider
    PermanentProvider,
    /// Malformed embedded document
    Parsing,
    /// Anything else, wrapped with context
    Aggregation,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Configuration => "configuration error",
            Self::PermanentProvider => "permanent provider error",
            Self::Parsing => "parsing error",
            Self::Aggregation => "aggregation error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies the unit of work a failure belongs to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorContext {
    pub resource_type: Option<ResourceType>,
    pub account: Option<String>,
    pub region: Option<String>,
    pub resource_id: Option<String>,
}

impl ErrorContext {
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type: Some(resource_type),
            ..Self::default()
        }
    }

    pub fn account(mut self, account: impl Into<String>) -> Self {
        self.account = Some(account.into());
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn resource_id(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(rt) = &self.resource_type {
            parts.push(format!("resource type '{}'", rt));
        }
        if let Some(account) = &self.account {
            parts.push(format!("account '{}'", account));
        }
        if let Some(region) = &self.region {
            parts.push(format!("region '{}'", region));
        }
        if let Some(id) = &self.resource_id {
            parts.push(format!("resource '{}'", id));
        }
        if parts.is_empty() {
            f.write_str("unknown unit of work")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// A failure classified with the context of the unit of work that raised it
#[derive(Debug, thiserror::Error)]
#[error("{kind}: could not fetch {context}: {message}")]
pub struct FetchError {
    kind: ErrorKind,
    context: ErrorContext,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl FetchError {
    pub fn new(kind: ErrorKind, context: ErrorContext, message: impl Into<String>) -> Self {
        Self {
            kind,
            context,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<BoxError>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn configuration(context: ErrorContext, source: ConfigError) -> Self {
        Self::new(ErrorKind::Configuration, context, source.to_string()).with_source(source)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Number of causes below this error
    pub fn cause_depth(&self) -> usize {
        let mut depth = 0;
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            depth += 1;
            current = cause.source();
        }
        depth
    }

    /// Raw vendor failure this error was classified from
    pub fn provider_cause(&self) -> Option<&ProviderError> {
        let mut current = std::error::Error::source(self);
        while let Some(cause) = current {
            if let Some(provider) = cause.downcast_ref::<ProviderError>() {
                return Some(provider);
            }
            current = cause.source();
        }
        None
    }

    /// Provider status of the underlying failure, if one was reported
    pub fn provider_status(&self) -> Option<u16> {
        self.provider_cause().and_then(|provider| provider.status)
    }

    /// Whether the underlying provider failure was network or server-side
    pub fn is_transient(&self) -> bool {
        self.provider_cause().is_some_and(|provider| !provider.is_permanent())
    }

    /// Short user-facing message that does not expose raw provider responses
    pub fn hint(&self) -> String {
        match self.provider_status() {
            Some(403) => "Permission denied. Check the account's IAM permissions.".to_string(),
            Some(401) => "Authentication failed. Refresh the account's credentials.".to_string(),
            Some(404) => "Resource not found.".to_string(),
            Some(429) => "Rate limit exceeded. Please try again later.".to_string(),
            Some(400) => "Invalid request. Check your parameters.".to_string(),
            Some(409) => "Resource conflict.".to_string(),
            Some(status) if status >= 500 => {
                "Provider service temporarily unavailable. Please try again.".to_string()
            }
            _ => match self.kind {
                ErrorKind::Configuration => format!("Configuration problem: {}", self.message),
                ErrorKind::Parsing => format!("Could not parse a document for {}", self.context),
                _ => format!("Could not fetch {}", self.context),
            },
        }
    }
}

/// Whether a provider failure is worth retrying at a higher level
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Transient,
    Permanent,
}

/// Raw failure reported by a vendor binding
#[derive(Debug, thiserror::Error)]
#[error("{operation} failed: {message}")]
pub struct ProviderError {
    pub operation: String,
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ProviderError {
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            kind: ProviderErrorKind::Transient,
            status: None,
            message: message.into(),
        }
    }

    pub fn permanent(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            kind: ProviderErrorKind::Permanent,
            status: None,
            message: message.into(),
        }
    }

    /// Build from an HTTP status; throttling and server errors are transient
    pub fn from_status(operation: impl Into<String>, status: u16) -> Self {
        let kind = if status == 429 || status >= 500 {
            ProviderErrorKind::Transient
        } else {
            ProviderErrorKind::Permanent
        };
        Self {
            operation: operation.into(),
            kind,
            status: Some(status),
            message: format!("API request failed: {}", status),
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == ProviderErrorKind::Permanent
    }
}

/// Account, region or registration problems
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no accounts configured for provider '{0}'")]
    NoAccounts(String),

    #[error("no regions configured for account '{0}'")]
    NoRegions(String),

    #[error("account id must not be empty")]
    EmptyAccountId,

    #[error("dependency cycle between resource types: {0}")]
    DependencyCycle(String),

    #[error("resource type '{0}' is registered more than once")]
    DuplicateRegistration(ResourceType),

    #[error("alias '{0}' is registered more than once")]
    DuplicateAlias(String),

    #[error("unknown resource type '{0}'")]
    UnknownResourceType(String),

    #[error("no fetch routine registered for resource type '{0}'")]
    NoFetcher(ResourceType),

    #[error("resource type '{requested}' is not a declared dependency of '{requester}'")]
    UndeclaredDependency {
        requester: ResourceType,
        requested: ResourceType,
    },

    #[error("resource type '{0}' is already materialized in this session")]
    AlreadyMaterialized(ResourceType),

    #[error("column '{column}' of '{resource_type}' has an invalid path: {source}")]
    InvalidColumn {
        resource_type: ResourceType,
        column: &'static str,
        source: crate::normalize::PathError,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Embedded document could not be read
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("malformed document: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("document is not percent-encoded UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("document root must be an object, found {0}")]
    NotAnObject(&'static str),

    #[error("record did not serialize to an object")]
    NotARecord,
}

/// Classify a raw failure with the context of the current unit of work.
///
/// An already classified [`FetchError`] is returned unmodified.
pub fn classify(error: anyhow::Error, context: &ErrorContext) -> FetchError {
    let error = match error.downcast::<FetchError>() {
        Ok(classified) => return classified,
        Err(error) => error,
    };

    let kind = kind_of(&error);
    let message = error.to_string();
    FetchError::new(kind, context.clone(), message).with_source(error)
}

fn kind_of(error: &anyhow::Error) -> ErrorKind {
    for cause in error.chain() {
        if cause.is::<ConfigError>() {
            return ErrorKind::Configuration;
        }
        if let Some(provider) = cause.downcast_ref::<ProviderError>() {
            // Transient failures stay aggregation errors; the provider cause is kept.
            return match provider.kind {
                ProviderErrorKind::Permanent => ErrorKind::PermanentProvider,
                ProviderErrorKind::Transient => ErrorKind::Aggregation,
            };
        }
        if cause.is::<DocumentError>() || cause.is::<crate::normalize::PathError>() {
            return ErrorKind::Parsing;
        }
    }
    ErrorKind::Aggregation
}

/// Extension for attaching classification to results inside fetch loops
pub trait ClassifyExt<T> {
    fn classify(self, context: &ErrorContext) -> Result<T, FetchError>;
}

impl<T, E> ClassifyExt<T> for Result<T, E>
where
    E: Into<anyhow::Error>,
{
    fn classify(self, context: &ErrorContext) -> Result<T, FetchError> {
        self.map_err(|e| classify(e.into(), context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POLICIES: ResourceType = ResourceType::new("aws.iam.policy");

    fn ctx() -> ErrorContext {
        ErrorContext::new(POLICIES).account("222").region("us-east-1")
    }

    #[test]
    fn test_classify_is_idempotent() {
        let first = classify(anyhow::anyhow!("connection reset"), &ctx());
        let depth = first.cause_depth();

        let again = classify(anyhow::Error::new(first), &ErrorContext::new(POLICIES));
        assert_eq!(again.kind(), ErrorKind::Aggregation);
        assert_eq!(again.context().account.as_deref(), Some("222"));
        assert_eq!(again.cause_depth(), depth);
    }

    #[test]
    fn test_classify_survives_anyhow_context() {
        let first = classify(anyhow::anyhow!("boom"), &ctx());
        let wrapped = anyhow::Error::new(first).context("while listing policies");
        let again = classify(wrapped, &ErrorContext::default());
        assert_eq!(again.context().region.as_deref(), Some("us-east-1"));
    }

    #[test]
    fn test_kind_by_cause() {
        let cases: Vec<(anyhow::Error, ErrorKind)> = vec![
            (ConfigError::NoRegions("1".into()).into(), ErrorKind::Configuration),
            (ProviderError::from_status("ListPolicies", 403).into(), ErrorKind::PermanentProvider),
            (ProviderError::from_status("ListPolicies", 503).into(), ErrorKind::Aggregation),
            (DocumentError::NotAnObject("array").into(), ErrorKind::Parsing),
            (anyhow::anyhow!("something else"), ErrorKind::Aggregation),
        ];
        for (error, expected) in cases {
            assert_eq!(classify(error, &ctx()).kind(), expected);
        }
    }

    #[test]
    fn test_transient_provider_failure_is_aggregation() {
        let raw = ProviderError::transient("ListRoles", "connection reset");
        let error = classify(raw.into(), &ctx());
        assert_eq!(error.kind(), ErrorKind::Aggregation);
        assert!(error.is_transient());
        assert!(error.to_string().contains("connection reset"));
        assert_eq!(error.cause_depth(), 1);

        let permanent = classify(ProviderError::from_status("ListRoles", 403).into(), &ctx());
        assert!(!permanent.is_transient());
    }

    #[test]
    fn test_kind_found_below_context() {
        let error = anyhow::Error::new(ProviderError::from_status("GetPolicyVersion", 401))
            .context("fetching default version");
        assert_eq!(classify(error, &ctx()).kind(), ErrorKind::PermanentProvider);
    }

    #[test]
    fn test_message_names_unit_of_work() {
        let error = classify(anyhow::anyhow!("timeout"), &ctx().resource_id("policy/admin"));
        let text = error.to_string();
        assert!(text.contains("aggregation error"));
        assert!(text.contains("account '222'"));
        assert!(text.contains("region 'us-east-1'"));
        assert!(text.contains("resource 'policy/admin'"));
        assert!(text.contains("timeout"));
    }

    #[test]
    fn test_hint_uses_provider_status() {
        let error = classify(ProviderError::from_status("ListRoles", 403).into(), &ctx());
        assert!(error.hint().contains("Permission denied"));

        let error = classify(ProviderError::from_status("ListRoles", 502).into(), &ctx());
        assert!(error.hint().contains("temporarily unavailable"));
    }
}
