//! Vendor connectors
//!
//! Each connector is a [`SchemaProvider`](crate::session::SchemaProvider)
//! registering its fetch routines and queryable names. Vendor APIs are
//! reached through capability traits so the transport can be swapped.

pub mod aws;
pub mod azure;
pub mod gcp;

pub use aws::AwsConnector;
pub use azure::AzureConnector;
pub use gcp::GcpConnector;
