//! Storage configuration types.

use serde::Deserialize;

/// Storage backend discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    #[default]
    Sqlite,
}

/// Storage configuration (discriminated union).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Storage backend discriminator.
    #[serde(rename = "type")]
    pub backend: StorageBackend,
    /// SQLite-specific configuration.
    pub sqlite: SqliteConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            sqlite: SqliteConfig::default(),
        }
    }
}

/// SQLite-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// SQLite connection URI.
    pub uri: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            uri: "sqlite://greenledger.db".to_string(),
        }
    }
}
