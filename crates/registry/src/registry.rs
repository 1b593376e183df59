//! The registry facade: one context composing the component catalog, the
//! instance registry, the singleton slots, the module table and the shared
//! string/id tables.
//!
//! Setup code builds a [`Registry`], registers built-in components and loads
//! plugins, then assembles the pipeline with [`Registry::create`]. Running
//! workers only need [`Registry::shared`]. Teardown happens in
//! [`Registry::clear_all`], which also runs when the registry is dropped.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::ComponentCatalog;
use crate::component::{builtin_components, ComponentFactory, ComponentHandle};
use crate::config::RegistryConfig;
use crate::diagnostics::Diagnostics;
use crate::error::{RegistryError, RegistryResult};
use crate::instances::{InstanceRegistry, SingletonKind, SingletonSlots};
use crate::intern::{SharedTables, StringId};
use crate::loader::{ModuleLease, ModuleTable};
use crate::module::{ModuleLoader, NativeLoader, REGISTER_SYMBOL};
use crate::naming::ModuleNaming;
use crate::snapshot::{InstanceSummary, RegistrySnapshot, StringSummary};

pub struct Registry {
    config: RegistryConfig,
    naming: ModuleNaming,
    catalog: ComponentCatalog,
    instances: InstanceRegistry,
    singletons: SingletonSlots,
    modules: ModuleTable,
    loader: Box<dyn ModuleLoader>,
    /// Module whose registration entry point is running.
    loading: Option<Arc<ModuleLease>>,
    shared: Arc<SharedTables>,
}

impl Registry {
    /// Creates a registry that loads modules through the platform loader.
    pub fn new(config: RegistryConfig) -> Self {
        Self::with_loader(config, NativeLoader)
    }

    /// Creates a registry that opens modules through `loader`.
    pub fn with_loader(config: RegistryConfig, loader: impl ModuleLoader + 'static) -> Self {
        Self {
            naming: config.naming.policy(),
            instances: InstanceRegistry::new(config.default_id_prefix.clone()),
            shared: Arc::new(SharedTables::new(config.string_capacity)),
            catalog: ComponentCatalog::new(),
            singletons: SingletonSlots::default(),
            modules: ModuleTable::new(),
            loader: Box::new(loader),
            loading: None,
            config,
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn naming(&self) -> &ModuleNaming {
        &self.naming
    }

    /// Replaces the module naming policy.
    pub fn set_naming(&mut self, naming: ModuleNaming) {
        self.naming = naming;
    }

    // --- Component registration ---

    /// Registers a component factory under `name`. A name that is already
    /// taken keeps its first factory.
    ///
    /// Called from a module's registration entry point, the factory and every
    /// component it creates keep that module loaded.
    pub fn register<F>(&mut self, name: &str, factory: F) -> RegistryResult<()>
    where
        F: ComponentFactory + 'static,
    {
        self.register_boxed(name, Box::new(factory))
    }

    pub fn register_boxed(
        &mut self,
        name: &str,
        factory: Box<dyn ComponentFactory>,
    ) -> RegistryResult<()> {
        self.catalog
            .register_boxed(name, factory, self.loading.clone())
    }

    /// Registers every built-in component linked into this binary and returns
    /// how many were added.
    pub fn register_builtins(&mut self) -> usize {
        builtin_components()
            .filter(|builtin| {
                self.catalog
                    .register_boxed(builtin.name, (builtin.factory_fn)(), None)
                    .is_ok()
            })
            .count()
    }

    // --- Creation ---

    /// Creates a component of kind `name`.
    ///
    /// `name` may carry the id as `name:id` when `id` is `None`. With
    /// `auto_own` the instance is tracked under a unique id and released by
    /// [`clear_instances`](Self::clear_instances); otherwise the caller is
    /// its only owner. Requests for the event hub or clock kinds return the
    /// live singleton if there is one.
    pub fn create(
        &mut self,
        name: &str,
        config: Option<&Path>,
        auto_own: bool,
        id: Option<&str>,
    ) -> RegistryResult<ComponentHandle> {
        let (name, id) = match id {
            Some(id) => (name, Some(id)),
            None => split_name(name, self.config.id_separator)?,
        };

        let singleton = self.singleton_kind(name);
        if let Some(existing) = singleton.and_then(|kind| self.singletons.get(kind)) {
            return Ok(existing);
        }

        info!("create instance of '{}'", name);
        let handle = self.catalog.create(name, config).map_err(|e| {
            if !matches!(e, RegistryError::NotFound(_)) {
                warn!("could not create '{}': {}", name, e);
            }
            e
        })?;

        if auto_own {
            let uid = self.instances.insert(id, handle.clone());
            info!("store instance of '{}' as '{}'", name, uid);
        } else if let Some(id) = id {
            warn!("id '{}' is ignored since 'auto own' is turned off", id);
        }

        if let Some(kind) = singleton {
            self.singletons.set(kind, handle.clone());
        }

        Ok(handle)
    }

    /// The live event hub, created untracked on first use.
    pub fn event_hub(&mut self, config: Option<&Path>) -> RegistryResult<ComponentHandle> {
        let kind = self.config.event_hub_kind.clone();
        self.create(&kind, config, false, None)
    }

    /// The live execution clock, created untracked on first use.
    pub fn clock(&mut self, config: Option<&Path>) -> RegistryResult<ComponentHandle> {
        let kind = self.config.clock_kind.clone();
        self.create(&kind, config, false, None)
    }

    pub fn singleton(&self, kind: SingletonKind) -> Option<ComponentHandle> {
        self.singletons.get(kind)
    }

    fn singleton_kind(&self, name: &str) -> Option<SingletonKind> {
        if name == self.config.event_hub_kind {
            Some(SingletonKind::EventHub)
        } else if name == self.config.clock_kind {
            Some(SingletonKind::Clock)
        } else {
            None
        }
    }

    // --- Plugin modules ---

    /// Loads the module named by `raw` and lets it register its components,
    /// handing it the diagnostics sink of the calling thread.
    pub fn load(&mut self, raw: impl AsRef<Path>) -> RegistryResult<bool> {
        self.load_with(raw, &Diagnostics::current())
    }

    /// Loads the module named by `raw`.
    ///
    /// The raw path is mapped to a library file by the naming policy. A file
    /// that is already loaded is not loaded again and reports success.
    /// Otherwise the result is whatever the module's registration entry point
    /// returns.
    pub fn load_with(
        &mut self,
        raw: impl AsRef<Path>,
        diagnostics: &Diagnostics,
    ) -> RegistryResult<bool> {
        let raw = self.config.plugin_path(raw.as_ref());
        let resolved = self.naming.resolve(&raw)?;
        let name = self.naming.module_name(&raw)?;

        if self.modules.contains(&resolved) {
            info!("already loaded '{}'", resolved.display());
            return Ok(true);
        }

        let module = self.loader.open(&resolved).map_err(|e| {
            warn!("not found '{}'", resolved.display());
            debug!("{}", e);
            e
        })?;

        let Some(entry) = module.register_entry() else {
            warn!("{}() function not found '{}'", REGISTER_SYMBOL, resolved.display());
            if let Err(e) = module.close() {
                warn!("{}", e);
            }
            return Err(RegistryError::SymbolMissing {
                path: resolved,
                symbol: REGISTER_SYMBOL,
            });
        };

        let keep_mapped = self.config.unload_denylist.iter().any(|denied| denied == &name);
        let lease = self.modules.insert(resolved.clone(), module, keep_mapped);
        info!("register '{}'", resolved.display());

        // SAFETY: the lease keeps the module loaded while the entry point runs,
        // and its signature is fixed by the entry-point contract.
        let previous = self.loading.replace(lease);
        let registered = unsafe { entry(self, diagnostics) };
        self.loading = previous;
        Ok(registered)
    }

    /// Loads every module listed in the configuration and returns how many
    /// registered successfully. Failures are logged and skipped.
    pub fn load_configured_plugins(&mut self) -> usize {
        let plugins = self.config.plugins.clone();
        plugins
            .iter()
            .filter(|plugin| match self.load(plugin) {
                Ok(true) => true,
                Ok(false) => {
                    warn!("module '{}' reported a failed registration", plugin.display());
                    false
                }
                Err(_) => false,
            })
            .count()
    }

    /// Copies every loaded module's file into `target_dir`.
    pub fn export_loaded_modules(&self, target_dir: impl AsRef<Path>) -> RegistryResult<Vec<PathBuf>> {
        self.modules.export(target_dir.as_ref())
    }

    // --- Lookup ---

    pub fn instance_by_id(&self, id: &str) -> Option<ComponentHandle> {
        self.instances.get(id)
    }

    pub fn id_of_instance(&self, handle: &ComponentHandle) -> Option<String> {
        self.instances.id_of(handle).map(str::to_string)
    }

    /// Resolved paths of the loaded modules.
    pub fn module_names(&self) -> Vec<String> {
        self.modules
            .paths()
            .into_iter()
            .map(|path| path.display().to_string())
            .collect()
    }

    pub fn component_names(&self) -> Vec<String> {
        self.catalog.names()
    }

    /// Ids of tracked instances, optionally narrowed by a comma-separated
    /// filter of exact ids and `prefix*` tokens.
    pub fn instance_ids(&self, filter: Option<&str>) -> Vec<String> {
        self.instances.ids(filter)
    }

    // --- Shared tables ---

    /// Shared string table and id source for pipeline workers.
    pub fn shared(&self) -> Arc<SharedTables> {
        self.shared.clone()
    }

    pub fn add_string(&self, content: &str) -> RegistryResult<StringId> {
        self.shared.add_string(content)
    }

    pub fn string_id(&self, content: &str) -> Option<StringId> {
        self.shared.string_id(content)
    }

    pub fn get_string(&self, id: StringId) -> Option<Arc<str>> {
        self.shared.get_string(id)
    }

    pub fn unique_id(&self) -> u64 {
        self.shared.unique_id()
    }

    // --- Teardown ---

    /// Releases the singletons and every tracked instance. Factories and
    /// modules stay in place.
    pub fn clear_instances(&mut self) {
        info!("clear objects");
        self.singletons.clear();
        let released = self.instances.clear();
        debug!("released {} tracked instances", released);
    }

    /// Releases instances, forgets all factories, tears down every module and
    /// empties the string table.
    ///
    /// A module is unloaded here unless a component created from it is still
    /// held elsewhere; then it is unloaded when the last such handle drops.
    pub fn clear_all(&mut self) {
        info!("clear registry");
        self.clear_instances();
        self.catalog.clear();
        self.modules.unload_all();
        let drained = self.shared.drain_strings();
        debug!("drained {} strings", drained);
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            modules: self.module_names(),
            components: self.component_names(),
            instances: self
                .instances
                .iter()
                .map(|(id, handle)| InstanceSummary {
                    id: id.to_string(),
                    kind: handle.kind().to_string(),
                })
                .collect(),
            strings: self
                .shared
                .strings()
                .into_iter()
                .map(|(id, content)| StringSummary {
                    id,
                    content: content.to_string(),
                })
                .collect(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(RegistryConfig::default())
    }
}

impl Drop for Registry {
    fn drop(&mut self) {
        self.clear_all();
    }
}

/// Splits the `name:id` shorthand. More than one separator is an error.
fn split_name(name: &str, separator: char) -> RegistryResult<(&str, Option<&str>)> {
    let mut parts = name.split(separator);
    match (parts.next(), parts.next(), parts.next()) {
        (Some(kind), None, _) => Ok((kind, None)),
        (Some(kind), Some(id), None) => Ok((kind, Some(id).filter(|id| !id.is_empty()))),
        _ => {
            warn!("invalid object name '{}'", name);
            Err(RegistryError::InvalidName(name.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Filter", ':').unwrap(), ("Filter", None));
        assert_eq!(split_name("Filter:lp", ':').unwrap(), ("Filter", Some("lp")));
        assert_eq!(split_name("Filter:", ':').unwrap(), ("Filter", None));
        assert!(matches!(
            split_name("Filter:lp:x", ':'),
            Err(RegistryError::InvalidName(_))
        ));
        assert_eq!(split_name("Filter/lp", '/').unwrap(), ("Filter", Some("lp")));
    }
}
