//! AWS IAM resource types
//!
//! IAM is account-global, so every routine here uses any configured region
//! of the account and stamps no region on its records.

use super::IamApi;
use crate::account::Provider;
use crate::document::{DocumentCodec, PolicyDocument, Statement};
use crate::error::{ClassifyExt, ConfigError, FetchError};
use crate::normalize::{Column, Schema};
use crate::orchestrator::{ClientFactory, ClientLease, FetchContext, RegionScope};
use crate::paginate::walk;
use crate::record::{resource_id_from_arn, CanonicalRecord, Payload, Resource, ResourceType};
use crate::session::DataFetcher;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

type IamClients = Arc<dyn ClientFactory<dyn IamApi>>;

/// Which policies a listing returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyScope {
    /// Customer managed policies only
    Local,
    /// AWS managed policies only
    Aws,
    All,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    pub arn: String,
    pub policy_name: String,
    pub policy_id: String,
    pub default_version_id: String,
    #[serde(default)]
    pub attachment_count: Option<u32>,
    #[serde(default)]
    pub create_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyVersion {
    /// Percent-encoded JSON document
    pub document: String,
    pub version_id: String,
    #[serde(default)]
    pub is_default_version: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub arn: String,
    pub role_name: String,
    pub role_id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub create_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub max_session_duration: Option<u32>,
    #[serde(default)]
    pub assume_role_policy_document: Option<String>,
}

impl Payload for Role {
    const TYPE: ResourceType = ResourceType::new("aws.iam.role");

    fn schema() -> Result<Schema, ConfigError> {
        Schema::component(
            Self::TYPE,
            &[
                Column::new("accountId", "accountId"),
                Column::new("resourceId", "resourceId"),
                Column::new("arn", "payload.arn"),
                Column::new("roleName", "payload.roleName"),
                Column::new("roleId", "payload.roleId"),
                Column::new("path", "payload.path"),
                Column::new("createDate", "payload.createDate"),
                Column::new("maxSessionDuration", "payload.maxSessionDuration"),
                Column::new("attributes", "attributes"),
            ],
        )
    }
}

pub type RoleRecord = CanonicalRecord<Role>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub arn: String,
    pub group_name: String,
    pub group_id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub create_date: Option<DateTime<Utc>>,
}

impl Payload for Group {
    const TYPE: ResourceType = ResourceType::new("aws.iam.group");
}

pub type GroupRecord = CanonicalRecord<Group>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub arn: String,
    pub user_name: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub create_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub password_last_used: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedPolicy {
    pub policy_name: String,
    pub policy_arn: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMfaDevice {
    pub serial_number: String,
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub enable_date: Option<DateTime<Utc>>,
}

/// Customer managed policy with its default version parsed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IamPolicy {
    pub account_id: String,
    pub arn: String,
    pub policy_name: String,
    pub policy_id: String,
    pub default_version_id: String,
    pub version: String,
    pub statement: Vec<Statement>,
}

impl IamPolicy {
    pub fn new(account_id: &str, policy: &Policy, document: PolicyDocument) -> Self {
        Self {
            account_id: account_id.to_string(),
            arn: policy.arn.clone(),
            policy_name: policy.policy_name.clone(),
            policy_id: policy.policy_id.clone(),
            default_version_id: policy.default_version_id.clone(),
            version: document.version,
            statement: document.statement,
        }
    }
}

impl Resource for IamPolicy {
    const TYPE: ResourceType = ResourceType::new("aws.iam.policy");

    fn schema() -> Result<Schema, ConfigError> {
        Schema::component(
            Self::TYPE,
            &[
                Column::new("accountId", "accountId"),
                Column::new("arn", "arn"),
                Column::new("policyName", "policyName"),
                Column::new("policyId", "policyId"),
                Column::new("defaultVersionId", "defaultVersionId"),
                Column::new("version", "version"),
                Column::new("statement", "statement"),
            ],
        )
    }
}

/// Edge between an IAM group and one of its users
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMembership {
    pub account_id: String,
    pub group_name: String,
    pub user_name: String,
    pub user_arn: String,
}

impl GroupMembership {
    pub fn from_user(account_id: &str, group_name: &str, user: &User) -> Self {
        Self {
            account_id: account_id.to_string(),
            group_name: group_name.to_string(),
            user_name: user.user_name.clone(),
            user_arn: user.arn.clone(),
        }
    }
}

impl Resource for GroupMembership {
    const TYPE: ResourceType = ResourceType::new("aws.iam.group_membership");
}

/// Edge between an IAM role and a managed policy attached to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAttachedPolicy {
    pub account_id: String,
    pub role_name: String,
    pub policy_name: String,
    pub policy_arn: String,
}

impl Resource for RoleAttachedPolicy {
    const TYPE: ResourceType = ResourceType::new("aws.iam.role_attached_policy");
}

/// Virtual MFA device with the owning user's ARN pulled up
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VirtualMfaDeviceRecord {
    pub account_id: String,
    pub serial_number: String,
    pub user: Option<User>,
    pub enable_date: Option<DateTime<Utc>>,
    pub user_arn: Option<String>,
}

impl VirtualMfaDeviceRecord {
    pub fn new(account_id: &str, device: VirtualMfaDevice) -> Self {
        let user_arn = device.user.as_ref().map(|u| u.arn.clone());
        Self {
            account_id: account_id.to_string(),
            serial_number: device.serial_number,
            user: device.user,
            enable_date: device.enable_date,
            user_arn,
        }
    }
}

impl Resource for VirtualMfaDeviceRecord {
    const TYPE: ResourceType = ResourceType::new("aws.iam.virtual_mfa_device");
}

/// Customer managed policies, each with its default version document
pub struct IamPolicyFetcher {
    clients: IamClients,
}

impl IamPolicyFetcher {
    pub fn new(clients: IamClients) -> Self {
        Self { clients }
    }
}

impl DataFetcher for IamPolicyFetcher {
    type Record = IamPolicy;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<IamPolicy>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Aws, RegionScope::Global, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let policies = walk(|token| client.list_policies(PolicyScope::Local, token));
                futures::pin_mut!(policies);

                let mut records = Vec::new();
                while let Some(policy) = policies.try_next().await? {
                    let record = async {
                        let version = client
                            .get_policy_version(&policy.arn, &policy.default_version_id)
                            .await?;
                        let document = DocumentCodec::global().decode_policy(&version.document)?;
                        anyhow::Ok(IamPolicy::new(unit.account.id(), &policy, document))
                    }
                    .await
                    .classify(&unit.item(policy.arn.as_str()))?;
                    records.push(record);
                }
                Ok(records)
            })
        }))
    }
}

/// IAM roles, keyed by the resource part of their ARN
pub struct IamRoleFetcher {
    clients: IamClients,
}

impl IamRoleFetcher {
    pub fn new(clients: IamClients) -> Self {
        Self { clients }
    }
}

impl DataFetcher for IamRoleFetcher {
    type Record = RoleRecord;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<RoleRecord>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Aws, RegionScope::Global, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let roles: Vec<Role> = walk(|token| client.list_roles(token)).try_collect().await?;
                Ok(roles
                    .into_iter()
                    .map(|role| {
                        let resource_id = resource_id_from_arn(&role.arn).to_string();
                        CanonicalRecord::new(unit.account.id(), None, resource_id, role)
                    })
                    .collect())
            })
        }))
    }
}

/// IAM groups
pub struct IamGroupFetcher {
    clients: IamClients,
}

impl IamGroupFetcher {
    pub fn new(clients: IamClients) -> Self {
        Self { clients }
    }
}

impl DataFetcher for IamGroupFetcher {
    type Record = GroupRecord;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<GroupRecord>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Aws, RegionScope::Global, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let groups: Vec<Group> =
                    walk(|token| client.list_groups(token)).try_collect().await?;
                Ok(groups
                    .into_iter()
                    .map(|group| {
                        let resource_id = resource_id_from_arn(&group.arn).to_string();
                        CanonicalRecord::new(unit.account.id(), None, resource_id, group)
                    })
                    .collect())
            })
        }))
    }
}

/// Group membership, expanded by listing the users of every group
pub struct IamGroupMembershipFetcher {
    clients: IamClients,
}

impl IamGroupMembershipFetcher {
    pub fn new(clients: IamClients) -> Self {
        Self { clients }
    }
}

impl DataFetcher for IamGroupMembershipFetcher {
    type Record = GroupMembership;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<GroupMembership>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Aws, RegionScope::Global, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let groups = walk(|token| client.list_groups(token));
                futures::pin_mut!(groups);

                let mut memberships = Vec::new();
                while let Some(group) = groups.try_next().await? {
                    let users = walk(|token| client.get_group_users(&group.group_name, token))
                        .try_collect::<Vec<User>>()
                        .await
                        .classify(&unit.item(group.group_name.as_str()))?;
                    let account_id = unit.account.id();
                    memberships.extend(users.iter().map(|user| {
                        GroupMembership::from_user(account_id, &group.group_name, user)
                    }));
                }
                Ok(memberships)
            })
        }))
    }
}

/// Managed policies attached to each role, using the session's roles
pub struct IamRoleAttachedPolicyFetcher {
    clients: IamClients,
}

impl IamRoleAttachedPolicyFetcher {
    pub fn new(clients: IamClients) -> Self {
        Self { clients }
    }
}

impl DataFetcher for IamRoleAttachedPolicyFetcher {
    type Record = RoleAttachedPolicy;

    fn dependencies(&self) -> Vec<ResourceType> {
        vec![RoleRecord::TYPE]
    }

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<RoleAttachedPolicy>, FetchError>> {
        Box::pin(async move {
            let roles = ctx.get_or_fetch::<RoleRecord>().await?;
            let roles = &roles;

            ctx.for_each_account(Provider::Aws, RegionScope::Global, move |unit| {
                Box::pin(async move {
                    let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                    let mut records = Vec::new();
                    for role in roles.iter().filter(|r| r.account_id == unit.account.id()) {
                        let role_name = role.payload.role_name.as_str();
                        let attached =
                            walk(|token| client.list_attached_role_policies(role_name, token))
                                .try_collect::<Vec<AttachedPolicy>>()
                                .await
                                .classify(&unit.item(role.resource_id.as_str()))?;
                        records.extend(attached.into_iter().map(|policy| RoleAttachedPolicy {
                            account_id: role.account_id.clone(),
                            role_name: role_name.to_string(),
                            policy_name: policy.policy_name,
                            policy_arn: policy.policy_arn,
                        }));
                    }
                    Ok(records)
                })
            })
            .await
        })
    }
}

/// Virtual MFA devices
pub struct IamVirtualMfaDeviceFetcher {
    clients: IamClients,
}

impl IamVirtualMfaDeviceFetcher {
    pub fn new(clients: IamClients) -> Self {
        Self { clients }
    }
}

impl DataFetcher for IamVirtualMfaDeviceFetcher {
    type Record = VirtualMfaDeviceRecord;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<VirtualMfaDeviceRecord>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Aws, RegionScope::Global, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let devices: Vec<VirtualMfaDevice> =
                    walk(|token| client.list_virtual_mfa_devices(token)).try_collect().await?;
                Ok(devices
                    .into_iter()
                    .map(|device| VirtualMfaDeviceRecord::new(unit.account.id(), device))
                    .collect())
            })
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::Convention;

    fn policy() -> Policy {
        Policy {
            arn: "arn:aws:iam::123456789012:policy/admin".into(),
            policy_name: "admin".into(),
            policy_id: "ANPA1".into(),
            default_version_id: "v2".into(),
            attachment_count: Some(1),
            create_date: None,
        }
    }

    #[test]
    fn test_policy_columns() {
        let document = DocumentCodec::global()
            .parse_policy(
                r#"{"Version":"2012-10-17",
                    "Statement":{"Effect":"Allow","Action":"*","Resource":"*"}}"#,
            )
            .unwrap();
        let record = IamPolicy::new("123456789012", &policy(), document);
        let schema = IamPolicy::schema().unwrap();
        assert_eq!(schema.convention(), Convention::Component);

        let row = schema.to_row(&record).unwrap();
        assert_eq!(row.columns().count(), 7);
        assert_eq!(row.select("statement[0].Effect").unwrap().unwrap(), "Allow");
        assert_eq!(row.get("version").unwrap(), "2012-10-17");
    }

    #[test]
    fn test_virtual_mfa_device_user_arn() {
        let device = VirtualMfaDevice {
            serial_number: "arn:aws:iam::1:mfa/alice".into(),
            user: Some(User {
                arn: "arn:aws:iam::1:user/alice".into(),
                user_name: "alice".into(),
                user_id: "AIDA1".into(),
                path: "/".into(),
                create_date: None,
                password_last_used: None,
            }),
            enable_date: None,
        };
        let record = VirtualMfaDeviceRecord::new("1", device);
        assert_eq!(record.user_arn.as_deref(), Some("arn:aws:iam::1:user/alice"));

        let unassigned = VirtualMfaDeviceRecord::new(
            "1",
            VirtualMfaDevice {
                serial_number: "arn:aws:iam::1:mfa/spare".into(),
                user: None,
                enable_date: None,
            },
        );
        assert_eq!(unassigned.user_arn, None);
    }

    #[test]
    fn test_role_schema_hides_trust_document() {
        let role = Role {
            arn: "arn:aws:iam::1:role/deploy".into(),
            role_name: "deploy".into(),
            role_id: "AROA1".into(),
            path: "/".into(),
            description: None,
            create_date: None,
            max_session_duration: Some(3600),
            assume_role_policy_document: Some("%7B%7D".into()),
        };
        let resource_id = resource_id_from_arn(&role.arn).to_string();
        let record = CanonicalRecord::new("1", None, resource_id, role);
        let row = RoleRecord::schema().unwrap().to_row(&record).unwrap();
        assert_eq!(row.get("resourceId").unwrap(), "role/deploy");
        assert_eq!(row.get("assumeRolePolicyDocument"), None);
    }
}
