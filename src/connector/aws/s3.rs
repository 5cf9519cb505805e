//! S3 bucket policies

use super::S3Api;
use crate::account::Provider;
use crate::document::{DocumentCodec, PolicyDocument};
use crate::error::{ClassifyExt, ConfigError, FetchError};
use crate::normalize::{Column, Schema};
use crate::orchestrator::{ClientFactory, ClientLease, FetchContext, RegionScope};
use crate::paginate::walk;
use crate::record::{CanonicalRecord, Payload, ResourceType};
use crate::session::DataFetcher;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,
    #[serde(default)]
    pub creation_date: Option<DateTime<Utc>>,
    /// Location constraint; `None` for us-east-1
    #[serde(default)]
    pub region: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketPolicy {
    pub bucket: String,
    pub policy: PolicyDocument,
}

impl Payload for BucketPolicy {
    const TYPE: ResourceType = ResourceType::new("aws.s3.bucket_policy");

    fn schema() -> Result<Schema, ConfigError> {
        Schema::component(
            Self::TYPE,
            &[
                Column::new("accountId", "accountId"),
                Column::new("region", "region"),
                Column::new("bucket", "payload.bucket"),
                Column::new("version", "payload.policy.version"),
                Column::new("statement", "payload.policy.statement"),
            ],
        )
    }
}

pub type BucketPolicyRecord = CanonicalRecord<BucketPolicy>;

/// Bucket policies; buckets without a policy produce no record
pub struct BucketPolicyFetcher {
    clients: Arc<dyn ClientFactory<dyn S3Api>>,
}

impl BucketPolicyFetcher {
    pub fn new(clients: Arc<dyn ClientFactory<dyn S3Api>>) -> Self {
        Self { clients }
    }
}

impl DataFetcher for BucketPolicyFetcher {
    type Record = BucketPolicyRecord;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<BucketPolicyRecord>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Aws, RegionScope::Global, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let buckets = walk(|token| client.list_buckets(token));
                futures::pin_mut!(buckets);

                let mut records = Vec::new();
                while let Some(bucket) = buckets.try_next().await? {
                    let item = unit.item(bucket.name.as_str());
                    let policy_text = client.get_bucket_policy(&bucket.name).await.classify(&item)?;
                    let Some(text) = policy_text else {
                        continue;
                    };
                    let policy = DocumentCodec::global().parse_policy(&text).classify(&item)?;
                    let region = bucket.region.clone().or_else(|| Some("us-east-1".to_string()));
                    records.push(CanonicalRecord::new(
                        unit.account.id(),
                        region,
                        bucket.name.clone(),
                        BucketPolicy {
                            bucket: bucket.name,
                            policy,
                        },
                    ));
                }
                Ok(records)
            })
        }))
    }
}
