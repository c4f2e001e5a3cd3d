//! SCIM 2.0 resource engine for Rust.
//!
//! Schema-driven validation, PATCH application, filter evaluation and an
//! optimistic-concurrency resource store. HTTP routing is left to the
//! caller: every operation returns a typed result whose error maps to a
//! status code and a SCIM error body.
//!
//! # Core Components
//!
//! - [`SchemaRegistry`] - Schemas and resource types, built once and shared
//! - [`schema::ResourceSchemas::validate`] - Attribute validation and normalization
//! - [`PatchApplier`] - All-or-nothing PATCH application
//! - [`filter`] - Filter parsing and evaluation
//! - [`ResourceStore`] - CRUD with version checks and uniqueness enforcement
//! - [`SchemaDiscovery`] - Schema, resource type and service provider documents
//!
//! # Quick Start
//!
//! ```rust
//! use scim_engine::{ListQuery, ResourceStore, SchemaRegistry};
//! use scim_engine::storage::InMemoryStorage;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(SchemaRegistry::with_embedded_schemas()?);
//! let store = ResourceStore::new(registry, InMemoryStorage::new());
//!
//! store
//!     .create("User", &json!({ "userName": "alice", "name": { "givenName": "Alice" } }))
//!     .await?;
//! let page = store
//!     .list("User", &ListQuery::new().with_filter(r#"userName eq "ALICE""#))
//!     .await?;
//! assert_eq!(page.total_results, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod filter;
pub mod patch;
pub mod resource;
pub mod schema;
pub mod schema_discovery;
pub mod storage;
pub mod store;

// Re-export commonly used types for convenience
pub use config::EngineConfig;
pub use error::{BuildError, ErrorKind, ScimError, ScimResult, ValidationError, ValidationErrors};
pub use filter::{FilterExpr, parse_filter};
pub use patch::{PatchApplier, PatchOperation, PatchRequest};
pub use resource::{HttpVersion, Meta, RawVersion, Resource};
pub use schema::{Schema, SchemaRegistry, ValidationContext};
pub use schema_discovery::{SchemaDiscovery, ServiceProviderConfig};
pub use store::{ListQuery, ListResponse, ResourceStore, ResourceStoreBuilder, SortOrder};
