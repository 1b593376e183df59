//! Core component trait and the factory capability used to create components

use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use crate::error::RegistryResult;
use crate::loader::ModuleLease;

/// A pluggable unit of the processing graph.
///
/// The registry never looks inside a component; it only needs the kind the
/// component was created as, for diagnostics and snapshots.
pub trait Component: AsAny + Send + Sync {
    /// The registered name this component was created under.
    fn kind(&self) -> &str;

    /// Short human-readable description.
    fn info(&self) -> &str {
        ""
    }
}

/// Downcasting support for every component type.
pub trait AsAny: Any {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any> AsAny for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Component {
    /// Recovers the concrete component type behind a handle.
    pub fn downcast_ref<T: Component>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn is<T: Component>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A component as returned by a factory.
pub type SharedComponent = Arc<dyn Component>;

/// Handle to a created component.
///
/// A component created from a plugin module keeps that module loaded for as
/// long as any clone of its handle is alive. Tracked instances are also held
/// by the registry; dropping the registry's reference is what destroying an
/// instance means.
#[derive(Clone)]
pub struct ComponentHandle {
    // Dropped before `module`: the component's drop glue lives in the module.
    component: SharedComponent,
    module: Option<Arc<ModuleLease>>,
}

impl ComponentHandle {
    /// Wraps a component whose code is linked into the host.
    pub fn new(component: SharedComponent) -> Self {
        Self {
            component,
            module: None,
        }
    }

    pub(crate) fn leased(component: SharedComponent, module: Option<Arc<ModuleLease>>) -> Self {
        Self { component, module }
    }

    /// Whether both handles refer to the same component.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::as_ptr(&a.component) as *const () == Arc::as_ptr(&b.component) as *const ()
    }

    /// Number of handles sharing this component.
    pub fn handle_count(&self) -> usize {
        Arc::strong_count(&self.component)
    }

    /// Whether this component's code comes from a loaded module.
    pub fn is_from_module(&self) -> bool {
        self.module.is_some()
    }
}

impl Deref for ComponentHandle {
    type Target = dyn Component;

    fn deref(&self) -> &Self::Target {
        &*self.component
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("kind", &self.component.kind())
            .field("from_module", &self.is_from_module())
            .finish()
    }
}

/// Creates components of one kind from an optional configuration file.
pub trait ComponentFactory: Send + Sync {
    fn create(&self, config: Option<&Path>) -> RegistryResult<SharedComponent>;
}

impl<F> ComponentFactory for F
where
    F: Fn(Option<&Path>) -> RegistryResult<SharedComponent> + Send + Sync,
{
    fn create(&self, config: Option<&Path>) -> RegistryResult<SharedComponent> {
        self(config)
    }
}

/// A struct for statically registering a built-in component factory.
///
/// ```ignore
/// inventory::submit! {
///     BuiltinComponent { name: "Console", factory_fn: || Box::new(ConsoleFactory) }
/// }
/// ```
pub struct BuiltinComponent {
    pub name: &'static str,
    pub factory_fn: fn() -> Box<dyn ComponentFactory>,
}

inventory::collect!(BuiltinComponent);

/// All built-in factories linked into this binary.
pub fn builtin_components() -> impl Iterator<Item = &'static BuiltinComponent> {
    inventory::iter::<BuiltinComponent>.into_iter()
}
