//! Create/drop statements for the `timescaledb` extension.

use tracing::debug;

use crate::config::CreateExtensionOptions;
use crate::error::BuildError;
use crate::sql::escape::escape_literal;

/// The extension this compiler targets; options only control CASCADE and
/// version pinning.
pub const EXTENSION_NAME: &str = "timescaledb";

/// Builder for the extension's up/down statements.
#[derive(Debug, Clone, Default)]
pub struct Extension {
    options: CreateExtensionOptions,
}

impl Extension {
    pub fn new(options: Option<CreateExtensionOptions>) -> Self {
        Extension {
            options: options.unwrap_or_default(),
        }
    }

    /// `CREATE EXTENSION IF NOT EXISTS timescaledb[ VERSION '<v>'][ CASCADE];`
    pub fn up(&self) -> Result<String, BuildError> {
        let mut stmt = format!("CREATE EXTENSION IF NOT EXISTS {EXTENSION_NAME}");

        if let Some(version) = &self.options.version {
            stmt.push_str(&format!(" VERSION {}", escape_literal(version)?));
        }

        if self.options.should_cascade {
            stmt.push_str(" CASCADE");
        }

        stmt.push(';');
        debug!(sql = %stmt, "built extension up statement");
        Ok(stmt)
    }

    /// `DROP EXTENSION IF EXISTS timescaledb[ CASCADE];`
    pub fn down(&self) -> Result<String, BuildError> {
        let cascade = if self.options.should_cascade {
            " CASCADE"
        } else {
            ""
        };
        let stmt = format!("DROP EXTENSION IF EXISTS {EXTENSION_NAME}{cascade};");
        debug!(sql = %stmt, "built extension down statement");
        Ok(stmt)
    }
}
