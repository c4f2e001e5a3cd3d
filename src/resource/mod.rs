//! SCIM resource model.
//!
//! # Key Components
//!
//! * [`Resource`] - A stored resource: validated attributes plus `id`,
//!   `schemas` and `meta`
//! * [`Meta`] - Server-managed metadata (timestamps, location, version)
//! * [`version`] - Opaque version tokens and their weak ETag form, used for
//!   optimistic concurrency

pub mod meta;
pub mod resource;
pub mod version;

pub use meta::Meta;
pub use resource::Resource;
pub use version::{HttpVersion, RawVersion, ScimVersion, VersionError};
