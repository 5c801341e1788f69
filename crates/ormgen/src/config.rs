//! Generator configuration.
//!
//! ```rust,ignore
//! let config = GeneratorConfig::from_json(r#"{"dialect": "sqlite", "pluralise_tables": false}"#)?;
//! let config = GeneratorConfig::new().dialect(Dialect::Mysql).if_not_exists(true);
//! ```

use ormgen_core::{Dialect, Error, NamingOptions, Result};
use serde::{Deserialize, Serialize};

/// Options shared by every generator stage.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Dialect used when rendering DDL and eager SELECTs ahead of a connection.
    pub dialect: Dialect,
    /// Emit `CREATE TABLE IF NOT EXISTS`.
    pub if_not_exists: bool,
    #[serde(flatten)]
    pub naming: NamingOptions,
}

impl GeneratorConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a configuration document; missing keys take their defaults.
    #[allow(clippy::result_large_err)]
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Custom(format!("invalid generator config: {e}")))
    }

    pub fn dialect(mut self, dialect: Dialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn if_not_exists(mut self, if_not_exists: bool) -> Self {
        self.if_not_exists = if_not_exists;
        self
    }

    /// Toggle pluralisation of default table names.
    pub fn pluralise_tables(mut self, pluralise: bool) -> Self {
        self.naming.pluralise_tables = pluralise;
        self
    }

    /// Separator between field and key names in generated FK columns.
    pub fn fk_separator(mut self, separator: impl Into<String>) -> Self {
        self.naming.fk_separator = separator.into();
        self
    }
}
