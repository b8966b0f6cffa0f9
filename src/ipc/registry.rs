use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::dispatcher::Reply;

/// A channel handler. It runs to completion inside the dispatch call and
/// decides itself whether to answer through the [`Reply`]. A handler that has
/// to await spawns its own task and moves the `Reply` into it.
pub type Handler<C> = fn(Arc<C>, Value, Reply);

pub struct Route<C> {
    pub channel: &'static str,
    pub handler: Handler<C>,
}

impl<C> Clone for Route<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for Route<C> {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    Duplicate(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::Duplicate(ch) => write!(f, "channel registered twice: {}", ch),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Channel name → handler. Built once at startup and shared read-only.
pub struct Registry<C> {
    handlers: HashMap<&'static str, Handler<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self { handlers: HashMap::new() }
    }
}

impl<C> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, route: Route<C>) -> Result<(), RegistryError> {
        if self.handlers.contains_key(route.channel) {
            return Err(RegistryError::Duplicate(route.channel.to_string()));
        }
        self.handlers.insert(route.channel, route.handler);
        Ok(())
    }

    /// Registers every route; the first duplicate aborts the whole build.
    pub fn from_routes(routes: impl IntoIterator<Item = Route<C>>) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for route in routes {
            registry.register(route)?;
        }
        Ok(registry)
    }

    pub fn lookup(&self, channel: &str) -> Option<Handler<C>> {
        self.handlers.get(channel).copied()
    }

    /// Registered channel names, sorted.
    pub fn channels(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.handlers.keys().copied().collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
