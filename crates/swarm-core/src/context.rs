//! Swarm Context
//!
//! Owns the tool registry handed to the middleware and agents. Applications
//! normally build one context at startup and pass it down; `global()` wraps
//! the process-wide registry for code that has no context to hand.

use crate::middleware::{Middleware, MiddlewareConfig};
use crate::registry::ToolRegistry;

/// Shared state for one swarm of agents
#[derive(Clone, Debug)]
pub struct SwarmContext {
    registry: ToolRegistry,
}

impl SwarmContext {
    /// Context with its own, initially empty registry
    pub fn new() -> Self {
        Self {
            registry: ToolRegistry::detached(),
        }
    }

    /// Context backed by the process-wide registry
    pub fn global() -> Self {
        Self {
            registry: ToolRegistry::shared(),
        }
    }

    /// Handle to this context's registry; clones share the same tools
    pub fn registry(&self) -> ToolRegistry {
        self.registry.clone()
    }

    /// Middleware routing through this context's registry
    pub fn middleware(&self, config: MiddlewareConfig) -> Middleware {
        Middleware::new(self.registry(), config)
    }
}

impl Default for SwarmContext {
    fn default() -> Self {
        Self::new()
    }
}
