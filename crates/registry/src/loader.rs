//! Table of loaded plugin modules.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::RegistryResult;
use crate::module::LoadedModule;

/// Vendor modules whose libraries crash when unloaded. They are torn down
/// but never closed.
pub const DEFAULT_UNLOAD_DENYLIST: &[&str] = &["sp_xsens"];

/// A loaded module shared by the module table and by everything created from
/// it. The library stays mapped until the last lease is dropped.
pub struct ModuleLease {
    resolved: PathBuf,
    keep_mapped: bool,
    module: Option<Box<dyn LoadedModule>>,
}

impl ModuleLease {
    fn teardown(&self) {
        let Some(module) = &self.module else {
            return;
        };
        match module.unregister_entry() {
            Some(unregister) => {
                info!("unregister '{}'", self.resolved.display());
                // SAFETY: the entry point comes from a module that is still loaded.
                unsafe { unregister() };
            }
            None => debug!("no teardown entry point in '{}'", self.resolved.display()),
        }
    }
}

impl Drop for ModuleLease {
    fn drop(&mut self) {
        let Some(module) = self.module.take() else {
            return;
        };
        if self.keep_mapped {
            info!(
                "keeping '{}' mapped, module is on the unload denylist",
                self.resolved.display()
            );
            std::mem::forget(module);
            return;
        }
        debug!("unload '{}'", self.resolved.display());
        if let Err(e) = module.close() {
            warn!("{}", e);
        }
    }
}

/// Loaded modules keyed by resolved path. A path is loaded at most once.
#[derive(Default)]
pub struct ModuleTable {
    modules: BTreeMap<PathBuf, Arc<ModuleLease>>,
}

impl ModuleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, resolved: &Path) -> bool {
        self.modules.contains_key(resolved)
    }

    /// Records `module` under `resolved` and returns the lease that factories
    /// and components created from it must hold. A module with `keep_mapped`
    /// set is never closed.
    pub fn insert(
        &mut self,
        resolved: PathBuf,
        module: Box<dyn LoadedModule>,
        keep_mapped: bool,
    ) -> Arc<ModuleLease> {
        let lease = Arc::new(ModuleLease {
            resolved: resolved.clone(),
            keep_mapped,
            module: Some(module),
        });
        self.modules.insert(resolved, lease.clone());
        lease
    }

    /// Resolved paths of all loaded modules.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.modules.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Calls each module's teardown entry point and releases the table's
    /// lease. A module is unloaded once no factory or component created from
    /// it is left. The table is empty afterwards.
    pub fn unload_all(&mut self) {
        let modules = std::mem::take(&mut self.modules);
        for (path, lease) in modules {
            lease.teardown();
            let remaining = Arc::strong_count(&lease) - 1;
            if remaining > 0 {
                info!(
                    "unload of '{}' deferred, {} references remain",
                    path.display(),
                    remaining
                );
            }
        }
    }

    /// Copies the file backing each loaded module into `target_dir`.
    ///
    /// Modules without a locatable file, and failed copies, are logged and
    /// skipped.
    pub fn export(&self, target_dir: &Path) -> RegistryResult<Vec<PathBuf>> {
        fs::create_dir_all(target_dir)?;

        let mut copied = Vec::new();
        for (path, lease) in &self.modules {
            let source = match lease.module.as_ref().and_then(|m| m.backing_file()) {
                Some(file) if file.is_file() => file,
                _ => {
                    warn!("could not get module file for '{}'", path.display());
                    continue;
                }
            };
            let Some(file_name) = source.file_name() else {
                warn!("could not get module file for '{}'", path.display());
                continue;
            };

            let target = target_dir.join(file_name);
            match fs::copy(source, &target) {
                Ok(_) => {
                    debug!("copied '{}' to '{}'", path.display(), target_dir.display());
                    copied.push(target);
                }
                Err(e) => warn!(
                    "could not copy '{}' to '{}': {}",
                    source.display(),
                    target.display(),
                    e
                ),
            }
        }
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RegistryError;
    use crate::module::{RegisterEntry, UnregisterEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Module double that counts closes and can point at a real file.
    struct FakeModule {
        path: PathBuf,
        file: Option<PathBuf>,
        closed: Arc<AtomicUsize>,
        fail_close: bool,
    }

    impl LoadedModule for FakeModule {
        fn path(&self) -> &Path {
            &self.path
        }

        fn register_entry(&self) -> Option<RegisterEntry> {
            None
        }

        fn unregister_entry(&self) -> Option<UnregisterEntry> {
            None
        }

        fn backing_file(&self) -> Option<&Path> {
            self.file.as_deref()
        }

        fn close(self: Box<Self>) -> RegistryResult<()> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail_close {
                return Err(RegistryError::UnloadFailure {
                    path: self.path.clone(),
                    message: "busy".to_string(),
                });
            }
            Ok(())
        }
    }

    fn fake(path: &str, closed: &Arc<AtomicUsize>) -> Box<FakeModule> {
        Box::new(FakeModule {
            path: PathBuf::from(path),
            file: None,
            closed: closed.clone(),
            fail_close: false,
        })
    }

    #[test]
    fn test_unload_skips_denylisted_modules() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut table = ModuleTable::new();
        table.insert("libsp_signal.so".into(), fake("libsp_signal.so", &closed), false);
        table.insert("libsp_xsens.so".into(), fake("libsp_xsens.so", &closed), true);
        let mut failing = fake("libsp_camera.so", &closed);
        failing.fail_close = true;
        table.insert("libsp_camera.so".into(), failing, false);
        assert_eq!(table.len(), 3);

        table.unload_all();

        assert!(table.is_empty());
        // the denylisted module is never closed; a failing close is tolerated
        assert_eq!(closed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_unload_waits_for_last_lease() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut table = ModuleTable::new();
        let lease = table.insert("libsp_signal.so".into(), fake("libsp_signal.so", &closed), false);
        let second = lease.clone();

        table.unload_all();
        assert!(table.is_empty());
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        drop(lease);
        assert_eq!(closed.load(Ordering::SeqCst), 0);
        drop(second);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_insert_keys_by_resolved_path() {
        let closed = Arc::new(AtomicUsize::new(0));
        let mut table = ModuleTable::new();
        table.insert("plugins/libsp_a.so".into(), fake("/abs/reported/libsp_a.so", &closed), false);

        assert!(table.contains(Path::new("plugins/libsp_a.so")));
        assert!(!table.contains(Path::new("/abs/reported/libsp_a.so")));
        assert_eq!(table.paths(), vec![PathBuf::from("plugins/libsp_a.so")]);
    }

    #[test]
    fn test_export_copies_backing_files() {
        let source_dir = tempfile::tempdir().unwrap();
        let target_dir = tempfile::tempdir().unwrap();
        let library = source_dir.path().join("libsp_signal.so");
        fs::write(&library, b"\x7fELF").unwrap();

        let closed = Arc::new(AtomicUsize::new(0));
        let mut table = ModuleTable::new();
        let mut with_file = fake("libsp_signal.so", &closed);
        with_file.file = Some(library);
        table.insert("libsp_signal.so".into(), with_file, false);
        table.insert("libsp_static.so".into(), fake("libsp_static.so", &closed), false);

        let export_dir = target_dir.path().join("bundle");
        let copied = table.export(&export_dir).unwrap();

        assert_eq!(copied, vec![export_dir.join("libsp_signal.so")]);
        assert_eq!(fs::read(&copied[0]).unwrap(), b"\x7fELF");
    }
}
