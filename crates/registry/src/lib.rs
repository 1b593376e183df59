//! Component registry and plugin loading for the sensor pipeline.
//!
//! This crate is the runtime's single source of truth for which component
//! kinds exist, which instances were created from them, and which plugin
//! modules contributed them. It also owns the string table and the unique id
//! counter shared by the pipeline workers.

pub mod catalog;
pub mod component;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod instances;
pub mod intern;
pub mod loader;
#[macro_use]
pub mod macros;
pub mod module;
pub mod naming;
pub mod registry;
pub mod snapshot;


// Re-export commonly used types
pub use catalog::ComponentCatalog;
pub use component::{
    builtin_components, BuiltinComponent, Component, ComponentFactory, ComponentHandle,
    SharedComponent,
};
pub use config::{NamingConfig, RegistryConfig};
pub use diagnostics::Diagnostics;
pub use error::{RegistryError, RegistryResult};
pub use instances::{IdFilter, SingletonKind};
pub use intern::{SharedTables, StringId, UNDEFINED_STRING};
pub use loader::ModuleLease;
pub use module::{
    locate_module_file, LoadedModule, ModuleLoader, NativeLoader, RegisterEntry, StaticLoader,
    StaticModule, UnregisterEntry, REGISTER_SYMBOL, UNREGISTER_SYMBOL,
};
pub use naming::{BuildMode, ModuleNaming, Platform};
pub use registry::Registry;
pub use snapshot::{InstanceSummary, RegistrySnapshot, StringSummary};

#[doc(hidden)]
pub use inventory;
