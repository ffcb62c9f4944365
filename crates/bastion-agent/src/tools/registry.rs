//! Registry for managing and finding tools.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::BastionError;
use crate::tools::context::Tool;

#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool. Fails if a tool with the same name is already
    /// registered — registration is a startup-time operation, silent
    /// overwrite would hide a configuration mistake.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), BastionError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(BastionError::DuplicateTool { name });
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    pub fn get_schemas(&self) -> Vec<bastion_core::Tool> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }
}
