//! # chorm
//!
//! A thin entity repository for ClickHouse.
//!
//! ## Features
//!
//! - **Templated SQL**: `:name` placeholders are quoted, `{name}` placeholders are spliced raw
//! - **Entity mapping**: any `Serialize + DeserializeOwned` struct with declared columns
//! - **Diff-based updates**: only changed fields are sent, one `ALTER TABLE ... UPDATE` per entity
//! - **Awaitable mutations**: tag a mutation and poll `system.mutations` until it is done
//! - **Pluggable transport**: an HTTP transport is built in, anything implementing [`Transport`] works
//!
//! ## Repository
//!
//! ```ignore
//! use chorm::{ClickHouseClient, Criteria, HttpConnector, OrderBy, Param, Repository};
//!
//! let client = ClickHouseClient::from_env(HttpConnector);
//! let events: Repository<Event, _> = Repository::new(client);
//!
//! let recent = events
//!     .find_by(
//!         &Criteria::new().with("status", Param::literal("active")),
//!         Some(&OrderBy::new().desc("created_at")),
//!         Some(10),
//!         Some(0),
//!     )
//!     .await?;
//!
//! // Wait until ClickHouse has applied every mutation.
//! let applied = events.update(&changed, true).await?;
//! ```
//!
//! ## Raw queries
//!
//! ```ignore
//! let response = client
//!     .query_awaitable(
//!         "ALTER TABLE event DELETE WHERE status = :status",
//!         &Params::new().with("status", "stale"),
//!     )
//!     .await?;
//! response.await_done(Some(Duration::from_secs(30))).await?;
//! ```

pub mod builder;
pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod http;
pub mod mapper;
pub mod params;
pub mod repository;
pub mod response;
pub mod transport;
pub mod value;

pub use client::{ClickHouseClient, make_query_awaitable};
pub use config::{AwaitPolicy, ClickHouseConfig};
pub use entity::Entity;
pub use error::{ChormError, ChormResult};
pub use http::{HttpConnector, HttpTransport};
pub use mapper::Denormalized;
pub use params::{bind_params, resolve_query_params};
pub use repository::Repository;
pub use response::{MutationState, Response, SyncResponse};
pub use transport::{Connect, Statement, Transport};
pub use value::{Criteria, Direction, EntityId, OrderBy, Param, Params, Row};

// Re-exported so callers can hand a token to the `*_with_cancel` methods.
pub use tokio_util::sync::CancellationToken;
