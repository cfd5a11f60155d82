//! Tool Catalog
//!
//! Pure transform from the tool server's advertised descriptors into the
//! function declarations offered to the model. One malformed descriptor
//! is dropped with a warning; it never takes the rest of the catalog
//! down with it.

use std::collections::HashSet;

use crate::services::llm::types::ToolDefinition;
use crate::services::tools::schema::{sanitize_schema, validate_schema};
use crate::services::tools::session::ToolInfo;

/// The set of tools offered to the model for one conversation, keyed by
/// unique name.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
    names: HashSet<String>,
}

impl ToolCatalog {
    /// Build a catalog from advertised descriptors.
    ///
    /// Names and descriptions pass through verbatim; schemas are sanitized
    /// for model compatibility and otherwise untouched. Descriptors with a
    /// structurally invalid schema, and descriptors whose name duplicates
    /// an earlier one, are dropped with a warning.
    pub fn build(infos: &[ToolInfo]) -> Self {
        let mut catalog = Self::default();

        for info in infos {
            if let Err(error) = validate_schema(&info.input_schema) {
                tracing::warn!(
                    tool = %info.name,
                    %error,
                    "Dropping tool with invalid input schema"
                );
                continue;
            }

            if catalog.names.contains(&info.name) {
                tracing::warn!(tool = %info.name, "Dropping tool with duplicate name");
                continue;
            }

            let mut input_schema = info.input_schema.clone();
            sanitize_schema(&mut input_schema);

            catalog.names.insert(info.name.clone());
            catalog.tools.push(ToolDefinition {
                name: info.name.clone(),
                description: info.description.clone(),
                input_schema,
            });
        }

        catalog
    }

    /// The function declarations to offer the model
    pub fn definitions(&self) -> &[ToolDefinition] {
        &self.tools
    }

    /// Membership test by tool name
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
