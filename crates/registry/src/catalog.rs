//! Component catalog: the name -> factory dispatch table.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::component::{ComponentFactory, ComponentHandle};
use crate::error::{RegistryError, RegistryResult};
use crate::loader::ModuleLease;

struct CatalogEntry {
    // Dropped before `module`, which may hold the factory's code.
    factory: Box<dyn ComponentFactory>,
    module: Option<Arc<ModuleLease>>,
}

/// A catalog of component factories keyed by their registered name.
#[derive(Default)]
pub struct ComponentCatalog {
    factories: BTreeMap<String, CatalogEntry>,
}

impl ComponentCatalog {
    /// Creates a new, empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory under `name`.
    ///
    /// The first registration of a name wins; later ones are rejected and
    /// leave the existing mapping in place.
    pub fn register<F>(&mut self, name: &str, factory: F) -> RegistryResult<()>
    where
        F: ComponentFactory + 'static,
    {
        self.register_boxed(name, Box::new(factory), None)
    }

    /// Registers a factory whose code lives in `module`, if given. Components
    /// it creates keep the module loaded.
    pub fn register_boxed(
        &mut self,
        name: &str,
        factory: Box<dyn ComponentFactory>,
        module: Option<Arc<ModuleLease>>,
    ) -> RegistryResult<()> {
        info!("found '{}'", name);
        if self.factories.contains_key(name) {
            warn!("already loaded '{}'", name);
            return Err(RegistryError::AlreadyRegistered(name.to_string()));
        }
        self.factories
            .insert(name.to_string(), CatalogEntry { factory, module });
        Ok(())
    }

    /// Runs the factory registered under `name`.
    pub fn create(&self, name: &str, config: Option<&Path>) -> RegistryResult<ComponentHandle> {
        let entry = self.factories.get(name).ok_or_else(|| {
            warn!("not found '{}'", name);
            RegistryError::NotFound(name.to_string())
        })?;
        let component = entry.factory.create(config)?;
        Ok(ComponentHandle::leased(component, entry.module.clone()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub fn clear(&mut self) {
        self.factories.clear();
    }
}
