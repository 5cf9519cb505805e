//! Compute Engine resources
//!
//! Projects are accounts and zones are regions: instances are listed per
//! zone, firewalls once per project.

use super::http::GcpHttpClient;
use crate::account::{Account, CredentialHandle, Provider};
use crate::error::{ConfigError, DocumentError, FetchError};
use crate::normalize::{Column, Schema};
use crate::orchestrator::{ClientFactory, ClientLease, FetchContext, RegionScope, ScopedClient};
use crate::paginate::{walk, Page};
use crate::record::{short_name, CanonicalRecord, Payload, ResourceType};
use crate::session::DataFetcher;
use anyhow::Context;
use futures::future::BoxFuture;
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

pub type ApiFuture<'a, T> = BoxFuture<'a, anyhow::Result<T>>;

/// Compute Engine list operations of one project
pub trait ComputeApi: ScopedClient {
    fn list_instances<'a>(
        &'a self,
        zone: &'a str,
        token: Option<String>,
    ) -> ApiFuture<'a, Page<Instance>>;

    fn list_firewalls(&self, token: Option<String>) -> ApiFuture<'_, Page<Firewall>>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub name: String,
    /// Zone URL as returned; short name once normalized
    pub zone: String,
    pub machine_type: String,
    pub status: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    #[serde(default)]
    pub creation_timestamp: Option<String>,
    #[serde(default)]
    pub deletion_protection: bool,
}

impl Instance {
    /// Replace resource URLs with their short names
    fn shorten(mut self) -> Self {
        self.zone = short_name(&self.zone).to_string();
        self.machine_type = short_name(&self.machine_type).to_string();
        for nic in &mut self.network_interfaces {
            nic.network = short_name(&nic.network).to_string();
        }
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    pub network: String,
    #[serde(rename = "networkIP", default)]
    pub network_ip: Option<String>,
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "natIP", default)]
    pub nat_ip: Option<String>,
}

impl Payload for Instance {
    const TYPE: ResourceType = ResourceType::new("gcp.compute.instance");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Firewall {
    pub id: String,
    pub name: String,
    pub network: String,
    #[serde(default)]
    pub direction: Option<String>,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub source_ranges: Vec<String>,
    #[serde(default)]
    pub allowed: Vec<FirewallRule>,
    #[serde(default)]
    pub denied: Vec<FirewallRule>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    #[serde(rename = "IPProtocol")]
    pub ip_protocol: String,
    #[serde(default)]
    pub ports: Vec<String>,
}

impl Payload for Firewall {
    const TYPE: ResourceType = ResourceType::new("gcp.compute.firewall");

    fn schema() -> Result<Schema, ConfigError> {
        Schema::component(
            Self::TYPE,
            &[
                Column::new("accountId", "accountId"),
                Column::new("resourceId", "resourceId"),
                Column::new("name", "payload.name"),
                Column::new("network", "payload.network"),
                Column::new("direction", "payload.direction"),
                Column::new("priority", "payload.priority"),
                Column::new("sourceRanges", "payload.sourceRanges"),
                Column::new("allowed", "payload.allowed"),
                Column::new("disabled", "payload.disabled"),
            ],
        )
    }
}

pub type InstanceRecord = CanonicalRecord<Instance>;
pub type FirewallRecord = CanonicalRecord<Firewall>;

/// Compute Engine list response envelope
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// REST binding for one project
pub struct RestCompute {
    http: GcpHttpClient,
    credentials: CredentialHandle,
    base_url: Url,
    project: String,
}

impl RestCompute {
    pub fn new(
        http: GcpHttpClient,
        credentials: CredentialHandle,
        base_url: Url,
        project: &str,
    ) -> Self {
        Self {
            http,
            credentials,
            base_url,
            project: project.to_string(),
        }
    }

    /// `compute/v1/projects/<project>/<path>` under the base URL
    fn compute_url(&self, path: &str, token: Option<&str>) -> anyhow::Result<Url> {
        let mut url = self
            .base_url
            .join(&format!("compute/v1/projects/{}/{}", self.project, path))
            .context("Failed to build Compute Engine URL")?;
        if let Some(token) = token {
            url.query_pairs_mut().append_pair("pageToken", token);
        }
        Ok(url)
    }

    async fn list<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: String,
        token: Option<String>,
    ) -> anyhow::Result<Page<T>> {
        let url = self.compute_url(&path, token.as_deref())?;
        let bearer = self.credentials.token().await?;
        let body = self.http.get(operation, url.as_str(), &bearer).await?;
        let response: ListResponse<T> = serde_json::from_value(body)
            .map_err(DocumentError::from)
            .with_context(|| format!("Unexpected {} response shape", operation))?;
        Ok(Page::new(response.items, response.next_page_token))
    }
}

impl ScopedClient for RestCompute {}

impl ComputeApi for RestCompute {
    fn list_instances<'a>(
        &'a self,
        zone: &'a str,
        token: Option<String>,
    ) -> ApiFuture<'a, Page<Instance>> {
        Box::pin(self.list("instances.list", format!("zones/{}/instances", zone), token))
    }

    fn list_firewalls(&self, token: Option<String>) -> ApiFuture<'_, Page<Firewall>> {
        Box::pin(self.list("firewalls.list", "global/firewalls".to_string(), token))
    }
}

/// Connects [`RestCompute`] clients sharing one HTTP client
#[derive(Clone)]
pub struct RestComputeFactory {
    http: GcpHttpClient,
    base_url: Url,
}

impl RestComputeFactory {
    pub fn new(http: GcpHttpClient, base_url: &str) -> anyhow::Result<Self> {
        let mut base_url = Url::parse(base_url)
            .with_context(|| format!("Invalid GCP base URL '{}'", base_url))?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { http, base_url })
    }
}

impl ClientFactory<dyn ComputeApi> for RestComputeFactory {
    fn connect(&self, account: &Account, _zone: &str) -> anyhow::Result<Box<dyn ComputeApi>> {
        Ok(Box::new(RestCompute::new(
            self.http.clone(),
            account.credentials().clone(),
            self.base_url.clone(),
            account.id(),
        )))
    }
}

type ComputeClients = Arc<dyn ClientFactory<dyn ComputeApi>>;

/// Instances of every configured zone; labels become attributes
pub struct InstanceFetcher {
    clients: ComputeClients,
}

impl InstanceFetcher {
    pub fn new(clients: ComputeClients) -> Self {
        Self { clients }
    }
}

impl DataFetcher for InstanceFetcher {
    type Record = InstanceRecord;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<InstanceRecord>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Gcp, RegionScope::Regional, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let instances: Vec<Instance> =
                    walk(|token| client.list_instances(unit.region, token)).try_collect().await?;
                Ok(instances
                    .into_iter()
                    .map(|instance| {
                        let instance = instance.shorten();
                        let labels = instance.labels.clone();
                        let resource_id = instance.id.clone();
                        let region = unit.record_region();
                        CanonicalRecord::new(unit.account.id(), region, resource_id, instance)
                            .with_attributes(labels)
                    })
                    .collect())
            })
        }))
    }
}

/// Project firewalls
pub struct FirewallFetcher {
    clients: ComputeClients,
}

impl FirewallFetcher {
    pub fn new(clients: ComputeClients) -> Self {
        Self { clients }
    }
}

impl DataFetcher for FirewallFetcher {
    type Record = FirewallRecord;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<FirewallRecord>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Gcp, RegionScope::Global, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let firewalls: Vec<Firewall> =
                    walk(|token| client.list_firewalls(token)).try_collect().await?;
                Ok(firewalls
                    .into_iter()
                    .map(|mut firewall| {
                        firewall.network = short_name(&firewall.network).to_string();
                        let resource_id = firewall.name.clone();
                        CanonicalRecord::new(unit.account.id(), None, resource_id, firewall)
                    })
                    .collect())
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Resource;
    use serde_json::json;

    #[test]
    fn test_instance_short_names() {
        let instance: Instance = serde_json::from_value(json!({
            "id": "42",
            "name": "web-1",
            "zone": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a",
            "machineType": "https://www.googleapis.com/compute/v1/projects/p/zones/us-central1-a/machineTypes/e2-medium",
            "status": "RUNNING",
            "networkInterfaces": [{
                "network": "https://www.googleapis.com/compute/v1/projects/p/global/networks/default",
                "networkIP": "10.0.0.2",
                "accessConfigs": [{"name": "External NAT", "natIP": "34.1.2.3"}]
            }]
        }))
        .unwrap();

        let instance = instance.shorten();
        assert_eq!(instance.zone, "us-central1-a");
        assert_eq!(instance.machine_type, "e2-medium");
        assert_eq!(instance.network_interfaces[0].network, "default");
        let nat = &instance.network_interfaces[0].access_configs[0];
        assert_eq!(nat.nat_ip.as_deref(), Some("34.1.2.3"));
    }

    #[test]
    fn test_firewall_allowed_rules_unnest() {
        let firewall: Firewall = serde_json::from_value(json!({
            "id": "7",
            "name": "allow-ssh",
            "network": "default",
            "sourceRanges": ["0.0.0.0/0"],
            "allowed": [{"IPProtocol": "tcp", "ports": ["22"]}, {"IPProtocol": "icmp"}]
        }))
        .unwrap();
        let record = CanonicalRecord::new("my-project", None, "allow-ssh", firewall);
        let row = FirewallRecord::schema().unwrap().to_row(&record).unwrap();

        assert_eq!(row.unnest("allowed").unwrap().len(), 2);
        assert!(row.exists("allowed", |rule| rule["IPProtocol"] == "icmp").unwrap());
        assert_eq!(row.get("disabled").unwrap(), false);
        assert_eq!(row.select("sourceRanges[0]").unwrap().unwrap(), "0.0.0.0/0");
    }

    #[test]
    fn test_list_response_without_items() {
        let response: ListResponse<Firewall> =
            serde_json::from_value(json!({"kind": "compute#firewallList"})).unwrap();
        assert!(response.items.is_empty());
        assert!(response.next_page_token.is_none());
    }

    #[test]
    fn test_compute_url_with_page_token() {
        let http = GcpHttpClient::new("cloudinv-test").unwrap();
        let factory = RestComputeFactory::new(http, "http://localhost:8080/api").unwrap();
        let client = RestCompute::new(
            factory.http.clone(),
            Arc::new(crate::account::StaticToken::new("t")),
            factory.base_url.clone(),
            "my-project",
        );
        let url = client.compute_url("global/firewalls", Some("abc def")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/compute/v1/projects/my-project/global/firewalls?pageToken=abc+def"
        );
    }
}
