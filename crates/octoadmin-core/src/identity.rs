use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// The caller on whose behalf a request runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable unique identifier.
    pub id: String,

    /// Username for display/logging.
    pub name: String,

    /// Assigned roles.
    #[serde(default)]
    pub roles: Vec<String>,

    /// Additional claims for policy evaluation.
    #[serde(default)]
    pub attributes: HashMap<String, serde_json::Value>,
}

impl Identity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            roles: Vec::new(),
            attributes: HashMap::new(),
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.roles.push(role.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Returns `true` if the identity has a specific role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Gets an attribute value by key.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&serde_json::Value> {
        self.attributes.get(key)
    }
}
