//! SCIM filter expressions: parsing and evaluation.
//!
//! ```rust
//! use scim_engine::filter::{matches, parse_filter};
//! use scim_engine::schema::SchemaRegistry;
//! use serde_json::json;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = SchemaRegistry::with_embedded_schemas()?;
//! let schemas = registry.resource_schemas("User")?;
//! let filter = parse_filter(r#"userName eq "alice" and active eq true"#)?;
//! assert!(matches(&filter, &schemas, &json!({ "userName": "Alice", "active": true })));
//! # Ok(())
//! # }
//! ```

pub mod evaluator;
pub mod parser;

pub use evaluator::{attribute_values, matches, matches_element};
pub use parser::{CompareOp, FilterExpr, FilterParser, FilterValue, parse_filter};
