//! Facade configuration.
//!
//! A facade is configured by a connection string, optional driver properties
//! and a connections limit. The limit and credentials can also be given as
//! query parameters of a URL-style connection string; [`FacadeConfig::parse`]
//! strips those reserved keys and leaves every other parameter for the driver.

use crate::db::{Facade, provider_for_connection_string};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionProperties, DatabaseKind, mask_connection_string};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Connections limit when none is configured.
pub const DEFAULT_CONNECTIONS_LIMIT: u32 = 10;

fn default_connections_limit() -> u32 {
    DEFAULT_CONNECTIONS_LIMIT
}

/// Configuration of one facade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacadeConfig {
    /// Full connection string (sensitive - masked when logged).
    pub connection_string: String,
    #[serde(default)]
    pub properties: ConnectionProperties,
    /// Maximum number of concurrently leased connections.
    #[serde(default = "default_connections_limit")]
    pub connections_limit: u32,
}

impl FacadeConfig {
    /// Query keys consumed by the configuration instead of the driver.
    const RESERVED_KEYS: &'static [&'static str] = &["connections_limit", "user", "password"];

    pub fn new(connection_string: impl Into<String>) -> Self {
        Self {
            connection_string: connection_string.into(),
            properties: ConnectionProperties::new(),
            connections_limit: DEFAULT_CONNECTIONS_LIMIT,
        }
    }

    pub fn with_properties(mut self, properties: ConnectionProperties) -> Self {
        self.properties = properties;
        self
    }

    pub fn with_connections_limit(mut self, limit: u32) -> Self {
        self.connections_limit = limit;
        self
    }

    /// Parse a connection string, extracting the reserved query keys.
    ///
    /// # Examples
    ///
    /// ```text
    /// postgres://host/app?connections_limit=4            # limit 4
    /// mysql://host/app?user=scott&password=tiger         # credentials as properties
    /// sqlite:///var/lib/app.db?mode=rwc                  # unchanged, limit 10
    /// ```
    pub fn parse(s: &str) -> DbResult<Self> {
        let mut url = Url::parse(s).map_err(|e| {
            DbError::invalid_input(format!(
                "Invalid connection string '{}': {}",
                mask_connection_string(s),
                e
            ))
        })?;
        let mut opts = Self::extract_options(&mut url, Self::RESERVED_KEYS);
        // Connection strings without reserved keys are passed on untouched.
        let connection_string = if opts.is_empty() {
            s.to_string()
        } else {
            url.to_string()
        };

        let connections_limit = match opts.remove("connections_limit") {
            Some(v) => v.parse::<u32>().map_err(|_| {
                DbError::invalid_input(format!("Invalid connections_limit '{}'", v))
            })?,
            None => DEFAULT_CONNECTIONS_LIMIT,
        };

        let mut properties = ConnectionProperties::new();
        for key in [ConnectionProperties::USER, ConnectionProperties::PASSWORD] {
            if let Some(v) = opts.remove(key) {
                properties.set(key, v);
            }
        }

        let config = Self {
            connection_string,
            properties,
            connections_limit,
        };
        config.validate()?;
        Ok(config)
    }

    /// Remove the given keys from the URL query, keeping the others for the driver.
    fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
        let mut opts = HashMap::new();
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(k, v)| {
                let key_lower = k.to_ascii_lowercase();
                if keys.contains(&key_lower.as_str()) {
                    opts.insert(key_lower, v.into_owned());
                    None
                } else {
                    Some((k.into_owned(), v.into_owned()))
                }
            })
            .collect();

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        opts
    }

    /// Check the configuration before opening a facade.
    pub fn validate(&self) -> DbResult<()> {
        if self.connections_limit == 0 {
            return Err(DbError::invalid_input(
                "connections_limit must be greater than 0",
            ));
        }
        self.kind().map(|_| ())
    }

    pub fn kind(&self) -> DbResult<DatabaseKind> {
        DatabaseKind::from_connection_string(&self.connection_string).ok_or_else(|| {
            DbError::invalid_input(format!(
                "Unsupported connection string '{}'",
                mask_connection_string(&self.connection_string)
            ))
        })
    }

    /// Open a facade through the provider of the connection string's kind.
    pub fn open(&self) -> DbResult<Facade> {
        self.validate()?;
        provider_for_connection_string(&self.connection_string)?.open_facade(
            &self.connection_string,
            self.properties.clone(),
            self.connections_limit,
        )
    }
}
