//! GCP Authentication
//!
//! Application Default Credentials wrapped as an account credential handle,
//! with bearer tokens cached until shortly before they expire.

use crate::account::CredentialProvider;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use gcp_auth::TokenProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Default scopes for GCP API access
pub const DEFAULT_SCOPES: &[&str] = &["https://www.googleapis.com/auth/cloud-platform"];

/// Refresh tokens this long before they expire
const TOKEN_EXPIRY_BUFFER: Duration = Duration::from_secs(60);

/// Assumed token lifetime (conservative: 30 minutes)
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(30 * 60);

/// ADC credentials with token caching
#[derive(Clone)]
pub struct GcpCredentials {
    provider: Arc<dyn TokenProvider>,
    token_cache: Arc<RwLock<Option<CachedToken>>>,
}

#[derive(Clone)]
struct CachedToken {
    token: String,
    /// Expiry with the buffer already applied
    expires_at: Instant,
}

impl CachedToken {
    fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }
}

impl GcpCredentials {
    /// Resolve Application Default Credentials
    pub async fn application_default() -> Result<Self> {
        let provider = gcp_auth::provider().await.context(
            "Failed to initialize GCP authentication. Run 'gcloud auth application-default login'",
        )?;

        Ok(Self {
            provider,
            token_cache: Arc::new(RwLock::new(None)),
        })
    }

    /// Access token for API calls; served from cache while still valid
    pub async fn get_token(&self) -> Result<String> {
        {
            let cache = self.token_cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.is_valid() {
                    return Ok(cached.token.clone());
                }
                tracing::debug!("Cached token expired, fetching new token");
            }
        }

        let token = self
            .provider
            .token(DEFAULT_SCOPES)
            .await
            .context("Failed to get access token")?;
        let token_str = token.as_str().to_string();

        let mut cache = self.token_cache.write().await;
        *cache = Some(CachedToken {
            token: token_str.clone(),
            expires_at: Instant::now() + DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER,
        });
        tracing::debug!(
            "New token cached, expires in ~{} minutes",
            (DEFAULT_TOKEN_TTL - TOKEN_EXPIRY_BUFFER).as_secs() / 60
        );

        Ok(token_str)
    }
}

impl CredentialProvider for GcpCredentials {
    fn describe(&self) -> String {
        "gcp application default credentials".to_string()
    }

    fn token(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.get_token())
    }
}

/// Validate a GCP project ID.
///
/// Project IDs are 6-30 characters of lowercase letters, digits and hyphens,
/// start with a letter and do not end with a hyphen.
pub fn is_valid_project_id(project: &str) -> bool {
    if project.len() < 6 || project.len() > 30 {
        return false;
    }
    if !project.starts_with(|c: char| c.is_ascii_lowercase()) || project.ends_with('-') {
        return false;
    }
    project
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Zone names look like `<region>-<letter>`, e.g. `us-central1-a`
pub fn is_valid_zone(zone: &str) -> bool {
    let Some((region, suffix)) = zone.rsplit_once('-') else {
        return false;
    };
    region.contains('-')
        && !suffix.is_empty()
        && suffix.chars().all(|c| c.is_ascii_lowercase())
        && region
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_id_validation() {
        assert!(is_valid_project_id("my-project-123"));
        assert!(!is_valid_project_id("short"));
        assert!(!is_valid_project_id("1starts-with-digit"));
        assert!(!is_valid_project_id("ends-with-hyphen-"));
        assert!(!is_valid_project_id("Has-Upper-Case"));
    }

    #[test]
    fn test_zone_validation() {
        assert!(is_valid_zone("us-central1-a"));
        assert!(is_valid_zone("europe-west4-c"));
        assert!(!is_valid_zone("us-central1"));
        assert!(!is_valid_zone("global"));
    }
}
