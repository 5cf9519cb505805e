//! Azure Resource Manager connector
//!
//! Tenants are accounts. ARM listings are tenant-wide, so every fetch here
//! runs once per tenant and stamps the resource's `location` as its region.
//! Resource tags become record attributes.

use crate::account::Provider;
use crate::error::{ClassifyExt, ConfigError, FetchError};
use crate::normalize::{Column, Schema};
use crate::orchestrator::{ClientFactory, ClientLease, FetchContext, RegionScope, ScopedClient};
use crate::paginate::{walk, Page};
use crate::record::{CanonicalRecord, Payload, ResourceType};
use crate::session::{DataFetcher, QueryContextBuilder, SchemaProvider};
use futures::future::BoxFuture;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

pub type ApiFuture<'a, T> = BoxFuture<'a, anyhow::Result<T>>;

/// ARM list operations; tokens are `nextLink` values
pub trait AzureApi: ScopedClient {
    fn list_resource_groups(&self, token: Option<String>) -> ApiFuture<'_, Page<ResourceGroup>>;

    fn list_vaults<'a>(
        &'a self,
        resource_group: &'a str,
        token: Option<String>,
    ) -> ApiFuture<'a, Page<Vault>>;

    fn list_storage_accounts(&self, token: Option<String>) -> ApiFuture<'_, Page<StorageAccount>>;

    fn list_network_security_groups(
        &self,
        token: Option<String>,
    ) -> ApiFuture<'_, Page<NetworkSecurityGroup>>;
}

type AzureClients = Arc<dyn ClientFactory<dyn AzureApi>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroup {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub provisioning_state: Option<String>,
}

impl Payload for ResourceGroup {
    const TYPE: ResourceType = ResourceType::new("azure.resource_group");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vault {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    pub properties: VaultProperties,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultProperties {
    pub tenant_id: String,
    #[serde(default)]
    pub vault_uri: Option<String>,
    #[serde(default)]
    pub enable_soft_delete: Option<bool>,
    #[serde(default)]
    pub enable_purge_protection: Option<bool>,
    #[serde(default)]
    pub enable_rbac_authorization: Option<bool>,
}

/// Key vault with the resource group it was listed under
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyVault {
    pub resource_group: String,
    #[serde(flatten)]
    pub vault: Vault,
}

impl Payload for KeyVault {
    const TYPE: ResourceType = ResourceType::new("azure.key_vault");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sku {
    pub name: String,
    #[serde(default)]
    pub tier: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccount {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub sku: Option<Sku>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub properties: StorageAccountProperties,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageAccountProperties {
    #[serde(default)]
    pub supports_https_traffic_only: Option<bool>,
    #[serde(default)]
    pub minimum_tls_version: Option<String>,
    #[serde(default)]
    pub allow_blob_public_access: Option<bool>,
}

impl Payload for StorageAccount {
    const TYPE: ResourceType = ResourceType::new("azure.storage_account");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSecurityGroup {
    pub id: String,
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    #[serde(default)]
    pub security_rules: Vec<SecurityRule>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityRule {
    pub name: String,
    /// `Allow` or `Deny`
    pub access: String,
    /// `Inbound` or `Outbound`
    pub direction: String,
    pub protocol: String,
    #[serde(default)]
    pub priority: Option<u32>,
    #[serde(default)]
    pub source_address_prefix: Option<String>,
    #[serde(default)]
    pub destination_port_range: Option<String>,
}

impl Payload for NetworkSecurityGroup {
    const TYPE: ResourceType = ResourceType::new("azure.network_security_group");

    fn schema() -> Result<Schema, ConfigError> {
        Schema::component(
            Self::TYPE,
            &[
                Column::new("accountId", "accountId"),
                Column::new("region", "region"),
                Column::new("resourceId", "resourceId"),
                Column::new("name", "payload.name"),
                Column::new("securityRules", "payload.securityRules"),
                Column::new("attributes", "attributes"),
            ],
        )
    }
}

pub type ResourceGroupRecord = CanonicalRecord<ResourceGroup>;
pub type KeyVaultRecord = CanonicalRecord<KeyVault>;
pub type StorageAccountRecord = CanonicalRecord<StorageAccount>;
pub type NetworkSecurityGroupRecord = CanonicalRecord<NetworkSecurityGroup>;

/// Fields every ARM resource carries
trait ArmResource {
    fn arm_id(&self) -> &str;
    fn location(&self) -> &str;
    fn tags(&self) -> &BTreeMap<String, String>;
}

impl ArmResource for ResourceGroup {
    fn arm_id(&self) -> &str {
        &self.id
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}

impl ArmResource for KeyVault {
    fn arm_id(&self) -> &str {
        &self.vault.id
    }
    fn location(&self) -> &str {
        &self.vault.location
    }
    fn tags(&self) -> &BTreeMap<String, String> {
        &self.vault.tags
    }
}

impl ArmResource for StorageAccount {
    fn arm_id(&self) -> &str {
        &self.id
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}

impl ArmResource for NetworkSecurityGroup {
    fn arm_id(&self) -> &str {
        &self.id
    }
    fn location(&self) -> &str {
        &self.location
    }
    fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }
}

/// Region is the ARM location; tags become attributes
fn arm_record<P: ArmResource>(account_id: &str, payload: P) -> CanonicalRecord<P> {
    let id = payload.arm_id().to_string();
    let region = Some(payload.location().to_string());
    let tags = payload.tags().clone();
    CanonicalRecord::new(account_id, region, id, payload).with_attributes(tags)
}

pub struct ResourceGroupFetcher {
    clients: AzureClients,
}

impl DataFetcher for ResourceGroupFetcher {
    type Record = ResourceGroupRecord;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<ResourceGroupRecord>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Azure, RegionScope::Global, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let groups: Vec<ResourceGroup> =
                    walk(|token| client.list_resource_groups(token)).try_collect().await?;
                Ok(groups
                    .into_iter()
                    .map(|group| arm_record(unit.account.id(), group))
                    .collect())
            })
        }))
    }
}

/// Key vaults, listed per resource group of the same tenant
pub struct KeyVaultFetcher {
    clients: AzureClients,
}

impl DataFetcher for KeyVaultFetcher {
    type Record = KeyVaultRecord;

    fn dependencies(&self) -> Vec<ResourceType> {
        vec![ResourceGroup::TYPE]
    }

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<KeyVaultRecord>, FetchError>> {
        Box::pin(async move {
            let groups = ctx.get_or_fetch::<ResourceGroupRecord>().await?;
            let groups = &groups;

            ctx.for_each_account(Provider::Azure, RegionScope::Global, move |unit| {
                Box::pin(async move {
                    let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                    let mut records = Vec::new();
                    for group in groups.iter().filter(|g| g.account_id == unit.account.id()) {
                        let name = group.payload.name.as_str();
                        let vaults = walk(|token| client.list_vaults(name, token))
                            .try_collect::<Vec<Vault>>()
                            .await
                            .classify(&unit.item(group.resource_id.as_str()))?;
                        records.extend(vaults.into_iter().map(|vault| {
                            let payload = KeyVault {
                                resource_group: name.to_string(),
                                vault,
                            };
                            arm_record(unit.account.id(), payload)
                        }));
                    }
                    Ok(records)
                })
            })
            .await
        })
    }
}

pub struct StorageAccountFetcher {
    clients: AzureClients,
}

impl DataFetcher for StorageAccountFetcher {
    type Record = StorageAccountRecord;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<StorageAccountRecord>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Azure, RegionScope::Global, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let accounts: Vec<StorageAccount> =
                    walk(|token| client.list_storage_accounts(token)).try_collect().await?;
                Ok(accounts
                    .into_iter()
                    .map(|account| arm_record(unit.account.id(), account))
                    .collect())
            })
        }))
    }
}

pub struct NetworkSecurityGroupFetcher {
    clients: AzureClients,
}

impl DataFetcher for NetworkSecurityGroupFetcher {
    type Record = NetworkSecurityGroupRecord;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<NetworkSecurityGroupRecord>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Azure, RegionScope::Global, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let groups: Vec<NetworkSecurityGroup> =
                    walk(|token| client.list_network_security_groups(token)).try_collect().await?;
                Ok(groups
                    .into_iter()
                    .map(|nsg| arm_record(unit.account.id(), nsg))
                    .collect())
            })
        }))
    }
}

/// Registers the Azure resource types
pub struct AzureConnector {
    pub clients: AzureClients,
}

impl SchemaProvider for AzureConnector {
    fn register(&self, builder: &mut QueryContextBuilder) {
        let clients = &self.clients;
        builder
            .register_schema_object(ResourceGroupFetcher { clients: clients.clone() })
            .register_schema_object(KeyVaultFetcher { clients: clients.clone() })
            .register_schema_object(StorageAccountFetcher { clients: clients.clone() })
            .register_schema_object(NetworkSecurityGroupFetcher { clients: clients.clone() })
            .register_schema_object_alias::<ResourceGroupRecord>("AzureResourceGroup")
            .register_schema_object_alias::<KeyVaultRecord>("AzureKeyVault")
            .register_schema_object_alias::<StorageAccountRecord>("AzureStorageAccount")
            .register_schema_object_alias::<NetworkSecurityGroupRecord>(
                "AzureNetworkSecurityGroup",
            );
    }
}
