//! Query context and sessions
//!
//! A [`QueryContext`] is built once from registered fetch routines, aliases
//! and accounts. Each [`Session`] memoizes fetched collections: a resource
//! type is fetched at most once per session, prerequisites are resolved
//! first, and concurrent requests for the same type wait on a single
//! in-flight fetch.

mod graph;

pub use graph::DependencyGraph;

use crate::account::AccountRegistry;
use crate::error::{classify, ConfigError, ErrorContext, ErrorKind, FetchError};
use crate::normalize::Row;
use crate::orchestrator::{FetchContext, FetchSettings};
use crate::record::{Resource, ResourceType};
use futures::future::BoxFuture;
use serde_json::Value;
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use uuid::Uuid;

/// Fetch routine of one resource type
pub trait DataFetcher: Send + Sync + 'static {
    type Record: Resource;

    /// Types that must be materialized before this one
    fn dependencies(&self) -> Vec<ResourceType> {
        Vec::new()
    }

    fn fetch<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Vec<Self::Record>, FetchError>>;
}

/// Registers a family of fetch routines and their queryable names
pub trait SchemaProvider {
    fn register(&self, builder: &mut QueryContextBuilder);
}

trait ErasedFetcher: Send + Sync {
    fn dependencies(&self) -> Vec<ResourceType>;

    fn fetch_collection<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Collection, FetchError>>;
}

struct Registered<F>(F);

impl<F: DataFetcher> ErasedFetcher for Registered<F> {
    fn dependencies(&self) -> Vec<ResourceType> {
        self.0.dependencies()
    }

    fn fetch_collection<'a>(
        &'a self,
        ctx: &'a FetchContext<'a>,
    ) -> BoxFuture<'a, Result<Collection, FetchError>> {
        Box::pin(async move {
            let records = self.0.fetch(ctx).await?;
            Collection::from_records(records)
        })
    }
}

/// Materialized records of one resource type plus their normalized rows
#[derive(Clone)]
pub struct Collection {
    resource_type: ResourceType,
    records: Arc<dyn Any + Send + Sync>,
    rows: Arc<Vec<Row>>,
}

impl Collection {
    /// Normalize records with their type's schema
    pub fn from_records<R: Resource>(records: Vec<R>) -> Result<Self, FetchError> {
        let schema =
            R::schema().map_err(|e| FetchError::configuration(ErrorContext::new(R::TYPE), e))?;
        let rows = records
            .iter()
            .map(|record| schema.to_row(record))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| classify(e.into(), &ErrorContext::new(R::TYPE)))?;

        Ok(Self {
            resource_type: R::TYPE,
            records: Arc::new(records),
            rows: Arc::new(rows),
        })
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Typed records; `None` if `R` is not the collected type
    pub fn records<R: Resource>(&self) -> Option<Arc<Vec<R>>> {
        self.records.clone().downcast::<Vec<R>>().ok()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows whose `attributes` mapping has a non-null entry for `key`
    pub fn rows_with_attribute(&self, key: &str) -> Vec<&Row> {
        self.rows
            .iter()
            .filter(|row| {
                row.get("attributes")
                    .and_then(|attributes| attributes.get(key))
                    .is_some_and(|value| !value.is_null())
            })
            .collect()
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("resource_type", &self.resource_type)
            .field("rows", &self.rows.len())
            .finish()
    }
}

/// Builder consumed once to create a [`QueryContext`]
#[derive(Default)]
pub struct QueryContextBuilder {
    accounts: AccountRegistry,
    settings: FetchSettings,
    fetchers: HashMap<ResourceType, Arc<dyn ErasedFetcher>>,
    aliases: HashMap<String, ResourceType>,
    errors: Vec<ConfigError>,
}

impl QueryContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn accounts(&mut self, accounts: AccountRegistry) -> &mut Self {
        self.accounts = accounts;
        self
    }

    pub fn settings(&mut self, settings: FetchSettings) -> &mut Self {
        self.settings = settings;
        self
    }

    pub fn register_schema_provider(&mut self, provider: &dyn SchemaProvider) -> &mut Self {
        provider.register(self);
        self
    }

    pub fn register_schema_object<F: DataFetcher>(&mut self, fetcher: F) -> &mut Self {
        let resource_type = <F::Record as Resource>::TYPE;
        if let Err(e) = <F::Record as Resource>::schema() {
            self.errors.push(e);
        } else if self.fetchers.contains_key(&resource_type) {
            self.errors.push(ConfigError::DuplicateRegistration(resource_type));
        } else {
            self.fetchers.insert(resource_type, Arc::new(Registered(fetcher)));
        }
        self
    }

    pub fn register_schema_object_alias<R: Resource>(&mut self, name: &str) -> &mut Self {
        match self.aliases.get(name) {
            Some(existing) if *existing != R::TYPE => {
                self.errors.push(ConfigError::DuplicateAlias(name.to_string()));
            }
            _ => {
                self.aliases.insert(name.to_string(), R::TYPE);
            }
        }
        self
    }

    pub fn build(&mut self) -> Result<QueryContext, ConfigError> {
        if let Some(error) = self.errors.first() {
            return Err(error.clone());
        }

        let mut graph = DependencyGraph::new();
        for (resource_type, fetcher) in &self.fetchers {
            graph.add(*resource_type, fetcher.dependencies());
        }
        graph.validate()?;

        tracing::debug!(
            "Built query context with {} fetchers and {} aliases",
            self.fetchers.len(),
            self.aliases.len()
        );

        Ok(QueryContext {
            inner: Arc::new(ContextInner {
                accounts: std::mem::take(&mut self.accounts),
                settings: self.settings.clone(),
                fetchers: std::mem::take(&mut self.fetchers),
                aliases: std::mem::take(&mut self.aliases),
                graph,
            }),
        })
    }
}

pub(crate) struct ContextInner {
    pub(crate) accounts: AccountRegistry,
    pub(crate) settings: FetchSettings,
    fetchers: HashMap<ResourceType, Arc<dyn ErasedFetcher>>,
    aliases: HashMap<String, ResourceType>,
    pub(crate) graph: DependencyGraph,
}

/// Immutable registry of fetch routines, aliases and accounts
#[derive(Clone)]
pub struct QueryContext {
    inner: Arc<ContextInner>,
}

impl QueryContext {
    pub fn builder() -> QueryContextBuilder {
        QueryContextBuilder::new()
    }

    pub fn create_session(&self) -> Session {
        let session = Session {
            id: Uuid::new_v4(),
            context: self.inner.clone(),
            cache: Mutex::new(HashMap::new()),
        };
        tracing::debug!("Created session {}", session.id);
        session
    }

    /// Resolve a queryable name or a resource type name
    pub fn resource_type(&self, name: &str) -> Option<ResourceType> {
        self.inner.resolve(name)
    }

    /// All queryable aliases, sorted
    pub fn queryable_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.inner.aliases.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn accounts(&self) -> &AccountRegistry {
        &self.inner.accounts
    }
}

impl ContextInner {
    fn resolve(&self, name: &str) -> Option<ResourceType> {
        self.aliases.get(name).copied().or_else(|| {
            self.fetchers
                .keys()
                .chain(self.aliases.values())
                .find(|rt| rt.name() == name)
                .copied()
        })
    }
}

type CacheEntry = Arc<OnceCell<Collection>>;

/// Session cache over one query execution
pub struct Session {
    id: Uuid,
    pub(crate) context: Arc<ContextInner>,
    cache: Mutex<HashMap<ResourceType, CacheEntry>>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    async fn entry(&self, resource_type: ResourceType) -> CacheEntry {
        let mut cache = self.cache.lock().await;
        cache.entry(resource_type).or_default().clone()
    }

    /// Materialized collection of a type, fetching it on first use
    pub fn collection(
        &self,
        resource_type: ResourceType,
    ) -> BoxFuture<'_, Result<Collection, FetchError>> {
        Box::pin(async move {
            let entry = self.entry(resource_type).await;
            let collection = entry
                .get_or_try_init(|| self.materialize(resource_type))
                .await?;
            Ok(collection.clone())
        })
    }

    async fn materialize(&self, resource_type: ResourceType) -> Result<Collection, FetchError> {
        let Some(fetcher) = self.context.fetchers.get(&resource_type).cloned() else {
            return Err(FetchError::configuration(
                ErrorContext::new(resource_type),
                ConfigError::NoFetcher(resource_type),
            ));
        };

        for dependency in self.context.graph.dependencies_of(resource_type) {
            self.collection(*dependency).await?;
        }

        tracing::info!("Fetching {} (session {})", resource_type, self.id);
        let ctx = FetchContext::new(self, resource_type);
        let collection = fetcher.fetch_collection(&ctx).await.inspect_err(|e| {
            tracing::warn!("Fetching {} failed: {}", resource_type, e);
        })?;
        tracing::info!("Fetched {} {} records", collection.len(), resource_type);
        Ok(collection)
    }

    /// Typed records of `R`, fetching on first use
    pub async fn get_or_fetch<R: Resource>(&self) -> Result<Arc<Vec<R>>, FetchError> {
        let collection = self.collection(R::TYPE).await?;
        collection.records::<R>().ok_or_else(|| {
            FetchError::new(
                ErrorKind::Aggregation,
                ErrorContext::new(R::TYPE),
                "cached collection holds a different record type",
            )
        })
    }

    /// Fetch by queryable name, as the query engine does
    pub async fn fetch(&self, name: &str) -> Result<Collection, FetchError> {
        let resource_type = self.context.resolve(name).ok_or_else(|| {
            FetchError::configuration(
                ErrorContext::default(),
                ConfigError::UnknownResourceType(name.to_string()),
            )
        })?;
        self.collection(resource_type).await
    }

    /// Eager mode: supply a pre-fetched collection, bypassing fetch routines
    pub async fn put<R: Resource>(&self, records: Vec<R>) -> Result<(), FetchError> {
        let collection = Collection::from_records(records)?;
        let entry = self.entry(R::TYPE).await;
        entry.set(collection).map_err(|_| {
            FetchError::configuration(
                ErrorContext::new(R::TYPE),
                ConfigError::AlreadyMaterialized(R::TYPE),
            )
        })
    }

    pub async fn is_cached(&self, resource_type: ResourceType) -> bool {
        let cache = self.cache.lock().await;
        cache
            .get(&resource_type)
            .is_some_and(|entry| entry.initialized())
    }

    /// Rows of a queryable name, for callers that only need values
    pub async fn rows(&self, name: &str) -> Result<Vec<Value>, FetchError> {
        let collection = self.fetch(name).await?;
        collection
            .rows()
            .iter()
            .map(|row| serde_json::to_value(row))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| classify(e.into(), &ErrorContext::new(collection.resource_type())))
    }
}
