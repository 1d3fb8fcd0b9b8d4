// Catalog Core - Library catalog storage
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Catalog configuration
//!
//! Where the database lives and how the connection pool is sized.
//!
//! # Environment
//! - `CATALOG_DATABASE` - path to the SQLite file
//! - `CATALOG_MAX_CONNECTIONS` - pool size
//! - `CATALOG_BUSY_TIMEOUT_SECS` - SQLite busy timeout / pool acquire timeout
//!
//! # Default Database Location
//! - macOS: ~/Library/Application Support/Catalog/catalog.db
//! - Linux: ~/.local/share/Catalog/catalog.db
//! - Windows: %APPDATA%/Catalog/catalog.db

use crate::error::{CatalogError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable holding the database path.
pub const ENV_DATABASE: &str = "CATALOG_DATABASE";

/// Environment variable holding the pool size.
pub const ENV_MAX_CONNECTIONS: &str = "CATALOG_MAX_CONNECTIONS";

/// Environment variable holding the busy timeout in seconds.
pub const ENV_BUSY_TIMEOUT_SECS: &str = "CATALOG_BUSY_TIMEOUT_SECS";

/// Default maximum pool connections.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default busy timeout in seconds.
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 30;

const DATABASE_FILE_NAME: &str = "catalog.db";
const APP_DIR_NAME: &str = "Catalog";

/// Catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Path to the SQLite database file.
    pub database_path: PathBuf,

    /// Maximum number of pooled connections.
    pub max_connections: u32,

    /// Busy timeout in seconds, also used as the pool acquire timeout.
    pub busy_timeout_secs: u64,
}

impl CatalogConfig {
    /// Create a configuration for the given database path.
    pub fn new(database_path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: database_path.into(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout_secs: DEFAULT_BUSY_TIMEOUT_SECS,
        }
    }

    /// Set the pool size.
    pub fn with_max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Set the busy timeout.
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout_secs = timeout.as_secs();
        self
    }

    /// Busy timeout as a `Duration`.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }

    /// Build a configuration from defaults overridden by environment variables.
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` if a numeric variable does not parse or the
    /// pool size is zero.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var(ENV_DATABASE)
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_database_path());
        let mut config = Self::new(path);

        if let Ok(value) = std::env::var(ENV_MAX_CONNECTIONS) {
            config.max_connections = value.parse().map_err(|e| {
                CatalogError::InvalidConfiguration(format!("{}={}: {}", ENV_MAX_CONNECTIONS, value, e))
            })?;
        }

        if let Ok(value) = std::env::var(ENV_BUSY_TIMEOUT_SECS) {
            config.busy_timeout_secs = value.parse().map_err(|e| {
                CatalogError::InvalidConfiguration(format!("{}={}: {}", ENV_BUSY_TIMEOUT_SECS, value, e))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the pool cannot use.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(CatalogError::InvalidConfiguration(
                "max_connections must be at least 1".to_string(),
            ));
        }
        if self.database_path.as_os_str().is_empty() {
            return Err(CatalogError::InvalidConfiguration(
                "database_path must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self::new(default_database_path())
    }
}

/// Get default database path for the platform
pub fn default_database_path() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join(APP_DIR_NAME)
            .join(DATABASE_FILE_NAME)
    }

    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".local")
            .join("share")
            .join(APP_DIR_NAME)
            .join(DATABASE_FILE_NAME)
    }

    #[cfg(target_os = "windows")]
    {
        let appdata = std::env::var("APPDATA").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(appdata).join(APP_DIR_NAME).join(DATABASE_FILE_NAME)
    }

    #[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from(".").join(DATABASE_FILE_NAME)
    }
}
