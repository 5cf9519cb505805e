//! Configuration Management
//!
//! Accounts, their regions and credentials, plus fetch tunables. Read from
//! YAML or JSON, validated before anything is fetched.

use crate::account::{Account, AccountRegistry, CredentialHandle, Provider, StaticToken};
use crate::connector::gcp::{auth, GcpCredentials, GcpSettings};
use crate::error::ConfigError;
use crate::orchestrator::FetchSettings;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Inventory configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    /// Account/region units fetched at the same time
    #[serde(default = "default_concurrency")]
    pub max_concurrent_accounts: usize,
    #[serde(default)]
    pub gcp: GcpSettings,
}

fn default_concurrency() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            accounts: Vec::new(),
            max_concurrent_accounts: default_concurrency(),
            gcp: GcpSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub id: String,
    pub provider: Provider,
    #[serde(default)]
    pub regions: Vec<String>,
    /// Defaults to Application Default Credentials, which only gcp accounts support
    #[serde(default)]
    pub credentials: CredentialsConfig,
}

/// How an account authenticates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsConfig {
    #[default]
    ApplicationDefault,
    /// Bearer token, read from an environment variable or given inline
    Token {
        #[serde(default)]
        env: Option<String>,
        #[serde(default)]
        value: Option<String>,
    },
}

impl Config {
    /// Default config file path
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("cloudinv").join("config.yaml"))
    }

    /// Load from `path`, or from the default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path().context("Could not determine the config directory")?,
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json(&content)?,
            _ => Self::from_yaml(&content)?,
        };
        tracing::info!("Loaded {} accounts from {}", config.accounts.len(), path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse YAML config")
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON config")
    }

    /// Check the file before any fetch starts
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.accounts.is_empty() {
            return Err(ConfigError::NoAccounts("any".to_string()));
        }
        if self.max_concurrent_accounts == 0 {
            return Err(ConfigError::Invalid(
                "max_concurrent_accounts must be at least 1".to_string(),
            ));
        }

        for account in &self.accounts {
            if account.id.trim().is_empty() {
                return Err(ConfigError::EmptyAccountId);
            }
            if account.regions.is_empty() {
                return Err(ConfigError::NoRegions(account.id.clone()));
            }
            if account.provider == Provider::Gcp && !auth::is_valid_project_id(&account.id) {
                return Err(ConfigError::Invalid(format!(
                    "'{}' is not a valid GCP project id",
                    account.id
                )));
            }
            match &account.credentials {
                CredentialsConfig::ApplicationDefault if account.provider != Provider::Gcp => {
                    return Err(ConfigError::Invalid(format!(
                        "{} account '{}' needs token credentials; \
                         application_default is only available for gcp",
                        account.provider, account.id
                    )));
                }
                CredentialsConfig::Token { env, value } if env.is_none() == value.is_none() => {
                    return Err(ConfigError::Invalid(format!(
                        "token credentials of account '{}' need exactly one of env or value",
                        account.id
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> FetchSettings {
        FetchSettings {
            max_concurrent_accounts: self.max_concurrent_accounts,
        }
    }

    /// Validate, then create every account with its credential handle.
    ///
    /// Application Default Credentials are resolved once and shared.
    pub async fn build_registry(&self) -> Result<AccountRegistry> {
        self.validate()?;

        let mut adc: Option<CredentialHandle> = None;
        let mut accounts = Vec::with_capacity(self.accounts.len());
        for account in &self.accounts {
            let credentials: CredentialHandle = match &account.credentials {
                CredentialsConfig::ApplicationDefault => match &adc {
                    Some(handle) => handle.clone(),
                    None => {
                        let handle: CredentialHandle =
                            Arc::new(GcpCredentials::application_default().await?);
                        adc = Some(handle.clone());
                        handle
                    }
                },
                CredentialsConfig::Token { env: Some(var), .. } => {
                    let token = std::env::var(var).map_err(|_| {
                        ConfigError::Invalid(format!(
                            "environment variable '{}' for account '{}' is not set",
                            var, account.id
                        ))
                    })?;
                    Arc::new(StaticToken::new(token))
                }
                CredentialsConfig::Token { value, .. } => {
                    Arc::new(StaticToken::new(value.clone().unwrap_or_default()))
                }
            };

            tracing::debug!(
                "Account {} ({}) uses {}",
                account.id,
                account.provider,
                credentials.describe()
            );
            accounts.push(Account::new(
                account.id.clone(),
                account.provider,
                account.regions.iter().cloned(),
                credentials,
            )?);
        }

        Ok(AccountRegistry::new(accounts)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
accounts:
  - id: my-project-123
    provider: gcp
    regions: [us-central1-a, us-central1-b]
    credentials:
      type: token
      value: test-token
  - id: "123456789012"
    provider: aws
    regions: [us-east-1]
    credentials:
      type: token
      value: aws-token
max_concurrent_accounts: 4
gcp:
  base_url: http://localhost:9000
"#;

    #[test]
    fn test_parse_yaml() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.accounts.len(), 2);
        assert_eq!(config.accounts[0].provider, Provider::Gcp);
        assert_eq!(config.max_concurrent_accounts, 4);
        assert_eq!(config.gcp.base_url, "http://localhost:9000");
        assert!(config.gcp.user_agent.starts_with("cloudinv/"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_json_defaults() {
        let config = Config::from_json(
            r#"{"accounts": [{"id": "t1", "provider": "azure", "regions": ["global"]}]}"#,
        )
        .unwrap();
        assert_eq!(config.max_concurrent_accounts, 1);
        assert_eq!(config.accounts[0].credentials, CredentialsConfig::ApplicationDefault);
        assert_eq!(config.gcp, GcpSettings::default());
    }

    #[test]
    fn test_validate_rejects_aws_account_without_credentials() {
        let config = Config::from_yaml(
            r#"
accounts:
  - id: "123456789012"
    provider: aws
    regions: [us-east-1]
"#,
        )
        .unwrap();
        assert_eq!(config.accounts[0].credentials, CredentialsConfig::ApplicationDefault);

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(err.to_string().contains("123456789012"));
        assert!(err.to_string().contains("only available for gcp"));
    }

    #[tokio::test]
    async fn test_build_registry_fails_before_resolving_adc_for_azure() {
        let config = Config::from_json(
            r#"{"accounts": [{"id": "t1", "provider": "azure", "regions": ["global"]}]}"#,
        )
        .unwrap();
        let err = config.build_registry().await.unwrap_err();
        assert!(err.to_string().contains("azure account 't1'"));
    }

    #[test]
    fn test_validate_rejects_empty_config() {
        assert_eq!(
            Config::default().validate(),
            Err(ConfigError::NoAccounts("any".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_account_without_regions() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.accounts[1].regions.clear();
        assert_eq!(
            config.validate(),
            Err(ConfigError::NoRegions("123456789012".to_string()))
        );
    }

    #[test]
    fn test_validate_rejects_bad_project_id() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.accounts[0].id = "Bad_Project".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_ambiguous_token() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.accounts[1].credentials = CredentialsConfig::Token {
            env: Some("AWS_TOKEN".to_string()),
            value: Some("inline".to_string()),
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[tokio::test]
    async fn test_build_registry_with_static_tokens() {
        let config = Config::from_yaml(SAMPLE).unwrap();
        let registry = config.build_registry().await.unwrap();
        assert_eq!(registry.all_accounts().len(), 2);

        let gcp = registry.accounts_for(Provider::Gcp).unwrap();
        assert_eq!(registry.regions_of(gcp[0]).unwrap().len(), 2);
        assert_eq!(gcp[0].credentials().token().await.unwrap(), "test-token");
    }

    #[tokio::test]
    async fn test_build_registry_missing_env_var() {
        let mut config = Config::from_yaml(SAMPLE).unwrap();
        config.accounts[1].credentials = CredentialsConfig::Token {
            env: Some("CLOUDINV_TEST_UNSET_TOKEN_VAR".to_string()),
            value: None,
        };
        let err = config.build_registry().await.unwrap_err();
        assert!(err.to_string().contains("CLOUDINV_TEST_UNSET_TOKEN_VAR"));
    }
}
