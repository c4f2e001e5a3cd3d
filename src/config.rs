//! Engine configuration.
//!
//! [`EngineConfig`] holds the settings that shape what the store returns:
//! the base URL used for `meta.location`, the protocol version segment and
//! the list page cap.

use crate::error::{BuildError, BuildResult};

/// Default and maximum number of resources in one list page.
pub const DEFAULT_MAX_RESULTS: usize = 200;

/// Settings for a [`ResourceStore`](crate::store::ResourceStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Base URL of the service, without version or endpoint.
    /// Examples: "https://scim.example.com", "https://api.company.com"
    pub base_url: String,

    /// SCIM protocol version used in URLs. Defaults to "v2".
    pub scim_version: String,

    /// Page size cap for list queries, also the page size when a query
    /// gives no `count`.
    pub max_results: usize,

    /// Published in the ServiceProviderConfig document.
    pub documentation_uri: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "https://localhost".to_string(),
            scim_version: "v2".to_string(),
            max_results: DEFAULT_MAX_RESULTS,
            documentation_uri: None,
        }
    }
}

impl EngineConfig {
    /// Location URL of a resource: `{base_url}/{scim_version}/{endpoint}/{id}`.
    ///
    /// ```rust
    /// use scim_engine::EngineConfig;
    ///
    /// let config = EngineConfig::default();
    /// assert_eq!(
    ///     config.location("/Users", "2819c223"),
    ///     "https://localhost/v2/Users/2819c223"
    /// );
    /// ```
    pub fn location(&self, endpoint: &str, resource_id: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.scim_version,
            endpoint.trim_start_matches('/'),
            resource_id
        )
    }

    pub fn validate(&self) -> BuildResult<()> {
        if self.base_url.is_empty() {
            return Err(invalid("Base URL cannot be empty"));
        }

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(invalid("Base URL must start with http:// or https://"));
        }

        if self.scim_version.is_empty() {
            return Err(invalid("SCIM version cannot be empty"));
        }

        if self.max_results == 0 {
            return Err(invalid("max_results must be greater than zero"));
        }

        Ok(())
    }
}

fn invalid(message: &str) -> BuildError {
    BuildError::InvalidConfiguration {
        message: message.to_string(),
    }
}
