//! Required Python packages of the MCP server.

use serde::{Deserialize, Serialize};

/// A pip package the server needs, how to import it, and which versions are
/// acceptable. Built once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencySpec {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    import_name: Option<String>,
    /// pip version specifier, e.g. `>=3.2.0`. Empty means any version.
    #[serde(default, rename = "version")]
    version_constraint: String,
}

impl DependencySpec {
    pub fn new(name: impl Into<String>, version_constraint: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            import_name: None,
            version_constraint: version_constraint.into(),
        }
    }

    /// Use a module name that differs from the distribution name
    /// (`beautifulsoup4` → `bs4`).
    pub fn with_import_name(mut self, import_name: impl Into<String>) -> Self {
        self.import_name = Some(import_name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn import_name(&self) -> &str {
        self.import_name.as_deref().unwrap_or(&self.name)
    }

    pub fn version_constraint(&self) -> &str {
        &self.version_constraint
    }

    /// The single pip argument for this package: `vnstock>=3.2.0`.
    pub fn requirement(&self) -> String {
        format!("{}{}", self.name, self.version_constraint.trim())
    }
}

/// Whether `name` is a dotted Python module path (`dateutil`, `google.protobuf`).
/// Only such names are ever placed into `import ...`.
pub fn is_valid_import_name(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c == '_' || c.is_alphabetic())
                && chars.all(|c| c == '_' || c.is_alphanumeric())
        })
}

/// Packages the server imports at runtime, from its `install_requires`.
/// `asyncio-compat` is listed there too but the server only uses the
/// standard library `asyncio`, so it is not checked.
pub fn default_dependencies() -> Vec<DependencySpec> {
    vec![
        DependencySpec::new("vnstock", ">=3.2.0"),
        DependencySpec::new("mcp", ">=0.1.0"),
        DependencySpec::new("pandas", ">=1.5.0"),
    ]
}
