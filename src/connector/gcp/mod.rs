//! GCP connector
//!
//! Compute Engine over REST with Application Default Credentials.
//!
//! # Module Structure
//!
//! - [`auth`] - ADC credentials with token caching, ID validation
//! - [`http`] - HTTP client mapping status codes to provider errors
//! - [`compute`] - Compute Engine binding and fetch routines

pub mod auth;
pub mod compute;
pub mod http;

pub use auth::GcpCredentials;
pub use compute::{
    ComputeApi, FirewallFetcher, FirewallRecord, InstanceFetcher, InstanceRecord,
    RestComputeFactory,
};
pub use http::GcpHttpClient;

use crate::orchestrator::ClientFactory;
use crate::session::{QueryContextBuilder, SchemaProvider};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_BASE_URL: &str = "https://compute.googleapis.com";

/// REST endpoint settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcpSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("cloudinv/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for GcpSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            user_agent: default_user_agent(),
        }
    }
}

/// Registers the GCP resource types
pub struct GcpConnector {
    pub compute: Arc<dyn ClientFactory<dyn ComputeApi>>,
}

impl GcpConnector {
    /// Connector backed by the REST binding
    pub fn rest(settings: &GcpSettings) -> anyhow::Result<Self> {
        let http = GcpHttpClient::new(&settings.user_agent)?;
        let factory = RestComputeFactory::new(http, &settings.base_url)?;
        Ok(Self {
            compute: Arc::new(factory),
        })
    }
}

impl SchemaProvider for GcpConnector {
    fn register(&self, builder: &mut QueryContextBuilder) {
        builder
            .register_schema_object(InstanceFetcher::new(self.compute.clone()))
            .register_schema_object(FirewallFetcher::new(self.compute.clone()))
            .register_schema_object_alias::<InstanceRecord>("GcpComputeInstance")
            .register_schema_object_alias::<FirewallRecord>("GcpComputeFirewall");
    }
}
