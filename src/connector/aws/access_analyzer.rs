//! IAM Access Analyzer

use super::AccessAnalyzerApi;
use crate::account::Provider;
use crate::error::{ClassifyExt, FetchError};
use crate::orchestrator::{ClientFactory, ClientLease, FetchContext, RegionScope};
use crate::paginate::walk;
use crate::record::{resource_id_from_arn, CanonicalRecord, Payload, ResourceType};
use crate::session::DataFetcher;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzerSummary {
    pub arn: String,
    pub name: String,
    /// `ACCOUNT` or `ORGANIZATION`
    #[serde(rename = "type")]
    pub analyzer_type: String,
    pub status: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_resource_analyzed: Option<String>,
}

impl Payload for AnalyzerSummary {
    const TYPE: ResourceType = ResourceType::new("aws.accessanalyzer.analyzer");
}

/// Analyzer with its tags as side attributes
pub type AnalyzerRecord = CanonicalRecord<AnalyzerSummary>;

pub struct AwsAnalyzerFetcher {
    clients: Arc<dyn ClientFactory<dyn AccessAnalyzerApi>>,
}

impl AwsAnalyzerFetcher {
    pub fn new(clients: Arc<dyn ClientFactory<dyn AccessAnalyzerApi>>) -> Self {
        Self { clients }
    }
}

impl DataFetcher for AwsAnalyzerFetcher {
    type Record = AnalyzerRecord;

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<AnalyzerRecord>, FetchError>> {
        Box::pin(ctx.for_each_account(Provider::Aws, RegionScope::Regional, move |unit| {
            Box::pin(async move {
                let client = ClientLease::acquire(self.clients.as_ref(), &unit)?;
                let analyzers = walk(|token| client.list_analyzers(token));
                futures::pin_mut!(analyzers);

                let mut records = Vec::new();
                while let Some(analyzer) = analyzers.try_next().await? {
                    let resource_id = resource_id_from_arn(&analyzer.arn).to_string();
                    let tags = client
                        .list_tags_for_resource(&analyzer.arn)
                        .await
                        .classify(&unit.item(resource_id.as_str()))?;
                    let region = unit.record_region();
                    records.push(
                        CanonicalRecord::new(unit.account.id(), region, resource_id, analyzer)
                            .with_attributes(tags),
                    );
                }
                Ok(records)
            })
        }))
    }
}
