//! Endpoint registry and router composition.
//!
//! Two disjoint name tables, one for actions and one for channels.  Routers
//! are registry fragments merged at startup by table union; after the app
//! freezes them into a [`Registry`] lookups are read-only and safe for
//! unsynchronized concurrent reads.

use crate::endpoint::{Endpoint, EndpointKind};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("action '{0}' is already registered")]
    DuplicateAction(String),
    #[error("channel '{0}' is already registered")]
    DuplicateChannel(String),
}

/// A mergeable registry fragment.  An action name and a channel name may
/// coexist; the wire's `type` field disambiguates.
#[derive(Default)]
pub struct Router {
    actions: HashMap<String, Arc<Endpoint>>,
    channels: HashMap<String, Arc<Endpoint>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one endpoint under its kind's table.  A collision within a
    /// kind is fatal at startup.
    pub fn register(&mut self, endpoint: Endpoint) -> Result<(), RegistryError> {
        let name = endpoint.name().to_owned();
        let table = match endpoint.kind() {
            EndpointKind::Action => &mut self.actions,
            EndpointKind::Channel => &mut self.channels,
        };
        if table.contains_key(&name) {
            return Err(match endpoint.kind() {
                EndpointKind::Action => RegistryError::DuplicateAction(name),
                EndpointKind::Channel => RegistryError::DuplicateChannel(name),
            });
        }
        table.insert(name, Arc::new(endpoint));
        Ok(())
    }

    /// Merge another router into this one by table union.
    pub fn include_router(&mut self, other: Router) -> Result<(), RegistryError> {
        for name in other.actions.keys() {
            if self.actions.contains_key(name) {
                return Err(RegistryError::DuplicateAction(name.clone()));
            }
        }
        for name in other.channels.keys() {
            if self.channels.contains_key(name) {
                return Err(RegistryError::DuplicateChannel(name.clone()));
            }
        }
        self.actions.extend(other.actions);
        self.channels.extend(other.channels);
        Ok(())
    }

    pub(crate) fn freeze(self) -> Registry {
        Registry {
            actions: self.actions,
            channels: self.channels,
        }
    }
}

/// The frozen endpoint table.  Built once at startup, never mutated.
pub(crate) struct Registry {
    actions: HashMap<String, Arc<Endpoint>>,
    channels: HashMap<String, Arc<Endpoint>>,
}

impl Registry {
    pub fn action(&self, name: &str) -> Option<&Arc<Endpoint>> {
        self.actions.get(name)
    }

    pub fn channel(&self, name: &str) -> Option<&Arc<Endpoint>> {
        self.channels.get(name)
    }

    #[cfg(test)]
    pub fn empty() -> Self {
        Router::new().freeze()
    }
}
