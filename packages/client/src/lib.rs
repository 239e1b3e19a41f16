//! # xbus-client
//!
//! Client for the xbus configuration and service registry.
//!
//! The server owns all state. This crate turns each operation into a single
//! HTTP request, decodes the `{ok, error, result}` envelope and hands back a
//! typed snapshot or an [`Error`].
//!
//! ## Config values
//!
//! ```ignore
//! use xbus_client::{Client, ClientConfig, WatchOutcome};
//!
//! let client = Client::new(ClientConfig::new("https://xbus.example.com:4433"))?;
//! let configs = client.configs();
//!
//! configs.put("db.url", "postgres://a", 0).await?;
//! let item = configs.get("db.url").await?;
//!
//! // Compare-and-set on the version we read
//! configs.put("db.url", "postgres://b", item.version).await?;
//!
//! // Long-poll for the next change
//! match configs.watch("db.url", item.version, Some(Duration::from_secs(30)), &cancel).await? {
//!     WatchOutcome::Changed(item) => println!("now {}", item.value),
//!     WatchOutcome::Timeout => { /* poll again with the same revision */ }
//! }
//! ```
//!
//! ## Services and leases
//!
//! ```ignore
//! use xbus_client::{ServiceDescriptor, ServiceEndpoint};
//!
//! let desc = ServiceDescriptor::new("auth", "1.0", "rpc");
//! let lease = client
//!     .services()
//!     .plug_lease(&desc, &ServiceEndpoint::new("10.0.0.1:9000"), Some(Duration::from_secs(30)), None)
//!     .await?;
//!
//! // The caller drives keep-alives
//! loop {
//!     tokio::time::sleep(lease.keep_alive_interval()).await;
//!     if let Err(e) = client.leases().keep_alive(lease.lease_id).await {
//!         if e.is_lease_gone() { break; /* plug again */ }
//!     }
//! }
//! ```

pub mod client;
pub mod config;
pub mod configs;
pub mod envelope;
pub mod error;
pub mod leases;
pub mod services;
pub mod transport;
pub mod types;
pub mod watch;

// Re-export main types
pub use client::Client;
pub use config::{ClientConfig, InitialWatch};
pub use configs::{ConfigClient, ConfigItem, Revision};
pub use envelope::Reply;
pub use error::{Error, ErrorKind, Result, ServerError, TransportError};
pub use leases::{Lease, LeaseClient, LeaseId};
pub use services::{Service, ServiceClient, ServiceDescriptor, ServiceEndpoint};
pub use transport::{ReqwestTransport, Transport};
pub use types::{Method, Request, Response};
pub use watch::WatchOutcome;

// Callers need the token type to cancel watches.
pub use tokio_util::sync::CancellationToken;
