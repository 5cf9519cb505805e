//! AWS connector
//!
//! Capability traits for the AWS APIs the fetch routines call, plus the
//! [`AwsConnector`] schema provider. The transport behind the traits (SDK
//! clients, retries, signing) is supplied by the caller through
//! [`ClientFactory`] implementations.

pub mod access_analyzer;
pub mod iam;
pub mod s3;

use crate::orchestrator::{ClientFactory, ScopedClient};
use crate::paginate::Page;
use crate::session::{QueryContextBuilder, SchemaProvider};
use futures::future::BoxFuture;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use access_analyzer::{AnalyzerRecord, AnalyzerSummary, AwsAnalyzerFetcher};
pub use iam::{
    AttachedPolicy, Group, GroupMembership, IamGroupFetcher, IamGroupMembershipFetcher,
    IamPolicy, IamPolicyFetcher, IamRoleAttachedPolicyFetcher, IamRoleFetcher,
    IamVirtualMfaDeviceFetcher, Policy, PolicyScope, PolicyVersion, Role, RoleAttachedPolicy,
    User, VirtualMfaDevice, VirtualMfaDeviceRecord,
};
pub use s3::{Bucket, BucketPolicy, BucketPolicyFetcher};

pub type ApiFuture<'a, T> = BoxFuture<'a, anyhow::Result<T>>;

/// IAM operations; IAM is account-global
pub trait IamApi: ScopedClient {
    fn list_policies(
        &self,
        scope: PolicyScope,
        token: Option<String>,
    ) -> ApiFuture<'_, Page<Policy>>;

    fn get_policy_version<'a>(
        &'a self,
        policy_arn: &'a str,
        version_id: &'a str,
    ) -> ApiFuture<'a, PolicyVersion>;

    fn list_roles(&self, token: Option<String>) -> ApiFuture<'_, Page<Role>>;

    fn list_attached_role_policies<'a>(
        &'a self,
        role_name: &'a str,
        token: Option<String>,
    ) -> ApiFuture<'a, Page<AttachedPolicy>>;

    fn list_groups(&self, token: Option<String>) -> ApiFuture<'_, Page<Group>>;

    fn get_group_users<'a>(
        &'a self,
        group_name: &'a str,
        token: Option<String>,
    ) -> ApiFuture<'a, Page<User>>;

    fn list_virtual_mfa_devices(
        &self,
        token: Option<String>,
    ) -> ApiFuture<'_, Page<VirtualMfaDevice>>;
}

/// IAM Access Analyzer operations; regional
pub trait AccessAnalyzerApi: ScopedClient {
    fn list_analyzers(&self, token: Option<String>) -> ApiFuture<'_, Page<AnalyzerSummary>>;

    fn list_tags_for_resource<'a>(&'a self, arn: &'a str)
        -> ApiFuture<'a, BTreeMap<String, String>>;
}

/// S3 operations
pub trait S3Api: ScopedClient {
    fn list_buckets(&self, token: Option<String>) -> ApiFuture<'_, Page<Bucket>>;

    /// Policy text of a bucket, `None` when the bucket has no policy
    fn get_bucket_policy<'a>(&'a self, bucket: &'a str) -> ApiFuture<'a, Option<String>>;
}

/// Registers every AWS resource type with its queryable name
pub struct AwsConnector {
    pub iam: Arc<dyn ClientFactory<dyn IamApi>>,
    pub access_analyzer: Arc<dyn ClientFactory<dyn AccessAnalyzerApi>>,
    pub s3: Arc<dyn ClientFactory<dyn S3Api>>,
}

impl SchemaProvider for AwsConnector {
    fn register(&self, builder: &mut QueryContextBuilder) {
        builder
            .register_schema_object(IamPolicyFetcher::new(self.iam.clone()))
            .register_schema_object(IamRoleFetcher::new(self.iam.clone()))
            .register_schema_object(IamGroupFetcher::new(self.iam.clone()))
            .register_schema_object(IamGroupMembershipFetcher::new(self.iam.clone()))
            .register_schema_object(IamRoleAttachedPolicyFetcher::new(self.iam.clone()))
            .register_schema_object(IamVirtualMfaDeviceFetcher::new(self.iam.clone()))
            .register_schema_object(AwsAnalyzerFetcher::new(self.access_analyzer.clone()))
            .register_schema_object(BucketPolicyFetcher::new(self.s3.clone()))
            .register_schema_object_alias::<IamPolicy>("AwsIAMPolicy")
            .register_schema_object_alias::<iam::RoleRecord>("AwsIAMRole")
            .register_schema_object_alias::<iam::GroupRecord>("AwsIAMGroup")
            .register_schema_object_alias::<GroupMembership>("AwsIAMGroupMembership")
            .register_schema_object_alias::<RoleAttachedPolicy>("AwsIAMRoleAttachedPolicy")
            .register_schema_object_alias::<VirtualMfaDeviceRecord>("AwsIAMVirtualMFADevice")
            .register_schema_object_alias::<AnalyzerRecord>("AwsAnalyzer")
            .register_schema_object_alias::<s3::BucketPolicyRecord>("AwsBucketPolicy");
    }
}
