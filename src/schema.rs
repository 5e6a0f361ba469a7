//! Service schema - a serializable listing of registered methods.
//!
//! The counterpart of server reflection for an in-process engine: a
//! caller (or an operator poking at a running service) can ask the
//! engine what methods exist and which shape each one speaks, as JSON.

use serde::{Deserialize, Serialize};

use crate::call::CallShape;
use crate::error::Result;

/// One registered method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Method name, e.g. `"blog.create"`.
    pub name: String,
    /// Interaction shape the method speaks.
    pub shape: CallShape,
}

/// Listing of every method an engine serves, sorted by name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceSchema {
    methods: Vec<MethodDescriptor>,
}

impl ServiceSchema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method, keeping the listing sorted by name.
    pub fn add_method(&mut self, name: &str, shape: CallShape) {
        let descriptor = MethodDescriptor {
            name: name.to_string(),
            shape,
        };
        let at = self
            .methods
            .partition_point(|existing| existing.name < descriptor.name);
        self.methods.insert(at, descriptor);
    }

    /// Look up a method by name.
    pub fn get(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods
            .binary_search_by(|m| m.name.as_str().cmp(name))
            .ok()
            .map(|i| &self.methods[i])
    }

    /// All methods, sorted by name.
    pub fn methods(&self) -> &[MethodDescriptor] {
        &self.methods
    }

    /// Number of methods.
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    /// Whether the schema is empty.
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    /// Serialize the listing as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
