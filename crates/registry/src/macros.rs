//! Utility macros for component modules.

/// Exports the entry points a plugin module needs to be loaded by a
/// [`Registry`](crate::Registry).
///
/// `$register` is called with the host registry and returns whether every
/// component was registered. The optional `$unregister` runs right before the
/// module is unloaded. The host's diagnostics sink becomes the module's global
/// `tracing` dispatcher, and `$register` runs with it as the thread default.
///
/// # Example
///
/// ```ignore
/// fn register(registry: &mut Registry) -> bool {
///     registry.register("ToVoltage", create_to_voltage).is_ok()
/// }
///
/// fn unregister() {}
///
/// pipeline_registry::export_components!(register, unregister);
/// ```
#[macro_export]
macro_rules! export_components {
    ($register:path) => {
        #[no_mangle]
        #[allow(improper_ctypes_definitions)]
        pub unsafe extern "C" fn sp_register_components(
            registry: &mut $crate::Registry,
            diagnostics: &$crate::Diagnostics,
        ) -> bool {
            diagnostics.install_global();
            diagnostics.in_scope(|| $register(registry))
        }

        const _: $crate::RegisterEntry = sp_register_components;
    };
    ($register:path, $unregister:path) => {
        $crate::export_components!($register);

        #[no_mangle]
        pub unsafe extern "C" fn sp_unregister_components() {
            $unregister()
        }

        const _: $crate::UnregisterEntry = sp_unregister_components;
    };
}

/// Submits a factory to the set of built-in components, picked up by
/// [`Registry::register_builtins`](crate::Registry::register_builtins).
///
/// ```ignore
/// pipeline_registry::builtin_component!("EventHub", EventHubFactory);
/// ```
#[macro_export]
macro_rules! builtin_component {
    ($name:expr, $factory:expr) => {
        $crate::inventory::submit! {
            $crate::BuiltinComponent {
                name: $name,
                factory_fn: || -> ::std::boxed::Box<dyn $crate::ComponentFactory> {
                    ::std::boxed::Box::new($factory)
                },
            }
        }
    };
}
