//! Account Registry
//!
//! Holds the configured accounts (AWS accounts, Azure tenants, GCP projects),
//! each with its region set and credential handle. Pure data: nothing here
//! touches the network.

use crate::error::ConfigError;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

pub type Region = String;

/// Cloud provider an account belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Aws,
    Azure,
    Gcp,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque source of credentials for one account
pub trait CredentialProvider: Send + Sync {
    /// Short description for logs; must not contain secrets
    fn describe(&self) -> String;

    /// Bearer token for REST bindings
    fn token(&self) -> BoxFuture<'_, anyhow::Result<String>>;
}

pub type CredentialHandle = Arc<dyn CredentialProvider>;

/// Fixed token, for tests and externally refreshed tokens
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialProvider for StaticToken {
    fn describe(&self) -> String {
        "static token".to_string()
    }

    fn token(&self) -> BoxFuture<'_, anyhow::Result<String>> {
        Box::pin(async move { Ok(self.0.clone()) })
    }
}

/// A configured account; immutable once built
#[derive(Clone)]
pub struct Account {
    id: String,
    provider: Provider,
    regions: BTreeSet<Region>,
    credentials: CredentialHandle,
}

impl Account {
    pub fn new<I, S>(
        id: impl Into<String>,
        provider: Provider,
        regions: I,
        credentials: CredentialHandle,
    ) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Region>,
    {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(ConfigError::EmptyAccountId);
        }
        Ok(Self {
            id,
            provider,
            regions: regions.into_iter().map(Into::into).collect(),
            credentials,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }

    pub fn credentials(&self) -> &CredentialHandle {
        &self.credentials
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("regions", &self.regions)
            .field("credentials", &self.credentials.describe())
            .finish()
    }
}

/// All accounts of a session, shared read-only across fetches
#[derive(Debug, Clone, Default)]
pub struct AccountRegistry {
    accounts: Vec<Account>,
}

impl AccountRegistry {
    pub fn new(accounts: Vec<Account>) -> Result<Self, ConfigError> {
        if accounts.is_empty() {
            return Err(ConfigError::NoAccounts("any".to_string()));
        }
        Ok(Self { accounts })
    }

    pub fn all_accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Accounts of one provider; at least one must exist
    pub fn accounts_for(&self, provider: Provider) -> Result<Vec<&Account>, ConfigError> {
        let accounts: Vec<&Account> = self
            .accounts
            .iter()
            .filter(|a| a.provider == provider)
            .collect();
        if accounts.is_empty() {
            return Err(ConfigError::NoAccounts(provider.to_string()));
        }
        Ok(accounts)
    }

    /// Configured regions of an account; never empty
    pub fn regions_of<'a>(
        &self,
        account: &'a Account,
    ) -> Result<&'a BTreeSet<Region>, ConfigError> {
        if account.regions.is_empty() {
            return Err(ConfigError::NoRegions(account.id.clone()));
        }
        Ok(&account.regions)
    }

    /// Any usable region, for account-global APIs
    pub fn any_region<'a>(&self, account: &'a Account) -> Result<&'a Region, ConfigError> {
        self.regions_of(account)?
            .iter()
            .next()
            .ok_or_else(|| ConfigError::NoRegions(account.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> CredentialHandle {
        Arc::new(StaticToken::new("t"))
    }

    #[test]
    fn test_registry_requires_accounts() {
        assert_eq!(
            AccountRegistry::new(Vec::new()).unwrap_err(),
            ConfigError::NoAccounts("any".to_string())
        );
    }

    #[test]
    fn test_account_requires_id() {
        let err = Account::new(" ", Provider::Aws, ["us-east-1"], creds()).unwrap_err();
        assert_eq!(err, ConfigError::EmptyAccountId);
    }

    #[test]
    fn test_accounts_for_provider() {
        let registry = AccountRegistry::new(vec![
            Account::new("111", Provider::Aws, ["us-east-1"], creds()).unwrap(),
            Account::new("tenant", Provider::Azure, ["westeurope"], creds()).unwrap(),
        ])
        .unwrap();

        assert_eq!(registry.accounts_for(Provider::Aws).unwrap().len(), 1);
        assert_eq!(
            registry.accounts_for(Provider::Gcp).unwrap_err(),
            ConfigError::NoAccounts("gcp".to_string())
        );
    }

    #[test]
    fn test_regions_of_and_any_region() {
        let with = Account::new("1", Provider::Aws, ["us-west-2", "eu-west-1"], creds()).unwrap();
        let without = Account::new("2", Provider::Aws, Vec::<String>::new(), creds()).unwrap();
        let registry = AccountRegistry::new(vec![with.clone(), without.clone()]).unwrap();

        assert_eq!(registry.regions_of(&with).unwrap().len(), 2);
        assert_eq!(registry.any_region(&with).unwrap(), "eu-west-1");
        assert_eq!(
            registry.regions_of(&without).unwrap_err(),
            ConfigError::NoRegions("2".to_string())
        );
    }

    #[test]
    fn test_static_token() {
        let token = tokio_test::block_on(StaticToken::new("abc").token()).unwrap();
        assert_eq!(token, "abc");
    }

    #[test]
    fn test_debug_hides_credentials() {
        let creds: CredentialHandle = Arc::new(StaticToken::new("secret"));
        let account = Account::new("1", Provider::Gcp, ["us-central1-a"], creds).unwrap();
        let text = format!("{:?}", account);
        assert!(!text.contains("secret"));
    }
}
