//! Multi-account cloud inventory
//!
//! Fetches resources from AWS, Azure and GCP accounts, normalizes them into
//! canonical records and rows, and caches them per query session.
//!
//! # Module Structure
//!
//! - [`account`] - configured accounts, regions and credential handles
//! - [`paginate`] - token-paged listings as lazy streams
//! - [`session`] - query context, session cache and dependency resolution
//! - [`orchestrator`] - per-account fetch iteration and scoped clients
//! - [`record`], [`normalize`], [`document`] - canonical records and rows
//! - [`error`] - failure classification
//! - [`connector`] - vendor fetch routines
//! - [`config`] - configuration file

pub mod account;
pub mod config;
pub mod connector;
pub mod document;
pub mod error;
pub mod normalize;
pub mod orchestrator;
pub mod paginate;
pub mod record;
pub mod session;

pub use account::{Account, AccountRegistry, CredentialHandle, CredentialProvider, Provider, Region};
pub use error::{classify, ConfigError, ErrorContext, ErrorKind, FetchError, ProviderError};
pub use orchestrator::{
    ClientFactory, ClientLease, FetchContext, FetchSettings, RegionScope, ScopedClient,
};
pub use paginate::{walk, Page};
pub use record::{Attributes, CanonicalRecord, Payload, Resource, ResourceType};
pub use session::{
    Collection, DataFetcher, QueryContext, QueryContextBuilder, SchemaProvider, Session,
};
