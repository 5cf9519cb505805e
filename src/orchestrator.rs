//! Fetch Orchestrator
//!
//! Shared machinery for fetch routines: account/region iteration, scoped
//! client acquisition, and classification at account level. A routine
//! supplies the per-unit work; any failure aborts the whole resource type
//! (no partial results are returned).

use crate::account::{Account, AccountRegistry, Provider};
use crate::error::{classify, ConfigError, ErrorContext, FetchError};
use crate::record::{Resource, ResourceType};
use crate::session::Session;
use futures::future::BoxFuture;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::ops::Deref;
use std::sync::Arc;
use uuid::Uuid;

/// Tunables applied to every fetch of a session
#[derive(Debug, Clone)]
pub struct FetchSettings {
    /// Account/region units processed at the same time
    pub max_concurrent_accounts: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            max_concurrent_accounts: 1,
        }
    }
}

/// How a resource type spreads over an account's regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionScope {
    /// Account-global API; any configured region will do
    Global,
    /// One listing per configured region
    Regional,
}

/// One account/region pair of work
pub struct Unit<'a> {
    pub account: &'a Account,
    pub region: &'a str,
    pub scope: RegionScope,
    /// Classification context for this unit
    pub context: ErrorContext,
}

impl Unit<'_> {
    /// Region to stamp on records; global resources carry none
    pub fn record_region(&self) -> Option<String> {
        match self.scope {
            RegionScope::Global => None,
            RegionScope::Regional => Some(self.region.to_string()),
        }
    }

    /// Context for a single item inside this unit
    pub fn item(&self, resource_id: impl Into<String>) -> ErrorContext {
        self.context.clone().resource_id(resource_id)
    }
}

/// What a fetch routine can see while it runs
pub struct FetchContext<'s> {
    session: &'s Session,
    resource_type: ResourceType,
}

impl<'s> FetchContext<'s> {
    pub(crate) fn new(session: &'s Session, resource_type: ResourceType) -> Self {
        Self {
            session,
            resource_type,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id()
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.session.context.accounts
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.session.context.settings
    }

    pub fn error_context(&self) -> ErrorContext {
        ErrorContext::new(self.resource_type)
    }

    /// Records of a declared prerequisite type, from the session cache
    pub async fn get_or_fetch<R: Resource>(&self) -> Result<Arc<Vec<R>>, FetchError> {
        if !self.session.context.graph.depends_on(self.resource_type, R::TYPE) {
            return Err(FetchError::configuration(
                self.error_context(),
                ConfigError::UndeclaredDependency {
                    requester: self.resource_type,
                    requested: R::TYPE,
                },
            ));
        }
        self.session.get_or_fetch::<R>().await
    }

    /// Account/region units for a provider, in configuration order
    pub fn units(
        &self,
        provider: Provider,
        scope: RegionScope,
    ) -> Result<Vec<Unit<'_>>, FetchError> {
        let registry = self.accounts();
        let accounts = registry
            .accounts_for(provider)
            .map_err(|e| FetchError::configuration(self.error_context(), e))?;

        let mut units = Vec::new();
        for account in accounts {
            let context = self.error_context().account(account.id());
            match scope {
                RegionScope::Global => {
                    let region = registry
                        .any_region(account)
                        .map_err(|e| FetchError::configuration(context.clone(), e))?;
                    units.push(Unit {
                        account,
                        region: region.as_str(),
                        scope,
                        context: context.region(region.as_str()),
                    });
                }
                RegionScope::Regional => {
                    let regions = registry
                        .regions_of(account)
                        .map_err(|e| FetchError::configuration(context.clone(), e))?;
                    for region in regions {
                        units.push(Unit {
                            account,
                            region: region.as_str(),
                            scope,
                            context: context.clone().region(region.as_str()),
                        });
                    }
                }
            }
        }
        Ok(units)
    }

    /// Run `work` for every account (and region, for regional types).
    ///
    /// Fails fast: the first failing unit aborts the fetch and its error,
    /// classified with the unit's account and region, is returned.
    pub async fn for_each_account<'a, T, W>(
        &'a self,
        provider: Provider,
        scope: RegionScope,
        work: W,
    ) -> Result<Vec<T>, FetchError>
    where
        T: Send + 'a,
        W: Fn(Unit<'a>) -> BoxFuture<'a, anyhow::Result<Vec<T>>> + Send + Sync + 'a,
    {
        let units = self.units(provider, scope)?;
        let limit = self.settings().max_concurrent_accounts.max(1);
        tracing::debug!(
            "Fetching {} over {} units (concurrency {})",
            self.resource_type,
            units.len(),
            limit
        );

        let pending: Vec<BoxFuture<'a, Result<Vec<T>, FetchError>>> = units
            .into_iter()
            .map(|unit| {
                let context = unit.context.clone();
                let unit_work = work(unit);
                let fut: BoxFuture<'a, Result<Vec<T>, FetchError>> = Box::pin(async move {
                    let records = unit_work.await.map_err(|e| classify(e, &context))?;
                    tracing::debug!("{}: {} records", context, records.len());
                    Ok(records)
                });
                fut
            })
            .collect();

        let batches: Vec<Vec<T>> = stream::iter(pending)
            .buffer_unordered(limit)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }
}

/// Client that must be released when its account's work ends
pub trait ScopedClient: Send + Sync {
    fn release(&mut self) {}
}

/// Creates clients for one account/region
pub trait ClientFactory<C: ?Sized>: Send + Sync {
    fn connect(&self, account: &Account, region: &str) -> anyhow::Result<Box<C>>;
}

/// Exclusively owned client, released on drop on every exit path
pub struct ClientLease<C: ?Sized + ScopedClient> {
    client: Box<C>,
    label: String,
}

impl<C: ?Sized + ScopedClient> ClientLease<C> {
    pub fn acquire<F>(factory: &F, unit: &Unit<'_>) -> anyhow::Result<Self>
    where
        F: ClientFactory<C> + ?Sized,
    {
        let client = factory.connect(unit.account, unit.region)?;
        let label = format!("{}/{}", unit.account.id(), unit.region);
        tracing::debug!("Acquired client for {}", label);
        Ok(Self { client, label })
    }
}

impl<C: ?Sized + ScopedClient> Deref for ClientLease<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.client
    }
}

impl<C: ?Sized + ScopedClient> Drop for ClientLease<C> {
    fn drop(&mut self) {
        self.client.release();
        tracing::debug!("Released client for {}", self.label);
    }
}
