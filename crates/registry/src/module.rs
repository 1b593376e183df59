//! Loadable module abstraction and the entry-point contract.
//!
//! A module must export [`REGISTER_SYMBOL`] and may export
//! [`UNREGISTER_SYMBOL`]. Plugin crates normally generate both with
//! [`export_components!`](crate::export_components).

use libloading::Library;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::diagnostics::Diagnostics;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::Registry;

/// Registration entry point every module exports.
pub const REGISTER_SYMBOL: &str = "sp_register_components";

/// Optional teardown entry point, called before the module is unloaded.
pub const UNREGISTER_SYMBOL: &str = "sp_unregister_components";

/// Signature of [`REGISTER_SYMBOL`].
///
/// Host and module must be built with the same compiler and the same version
/// of this crate, since `Registry` is passed by reference across the boundary.
pub type RegisterEntry = unsafe extern "C" fn(&mut Registry, &Diagnostics) -> bool;

/// Signature of [`UNREGISTER_SYMBOL`].
pub type UnregisterEntry = unsafe extern "C" fn();

/// A module opened by a [`ModuleLoader`].
pub trait LoadedModule: Send + Sync {
    /// Resolved path the module was opened from.
    fn path(&self) -> &Path;

    fn register_entry(&self) -> Option<RegisterEntry>;

    fn unregister_entry(&self) -> Option<UnregisterEntry>;

    /// File backing the module, if it has one.
    fn backing_file(&self) -> Option<&Path> {
        Some(self.path())
    }

    /// Releases the module. Entry points obtained from it must not be used
    /// afterwards.
    fn close(self: Box<Self>) -> RegistryResult<()>;
}

/// Opens modules from resolved paths.
pub trait ModuleLoader: Send {
    fn open(&self, path: &Path) -> RegistryResult<Box<dyn LoadedModule>>;
}

/// Environment variables the platform loader searches for bare file names.
#[cfg(any(target_os = "linux", target_os = "android"))]
const LOADER_PATH_VARS: &[&str] = &["LD_LIBRARY_PATH"];
#[cfg(target_os = "macos")]
const LOADER_PATH_VARS: &[&str] = &["DYLD_LIBRARY_PATH", "DYLD_FALLBACK_LIBRARY_PATH"];
#[cfg(windows)]
const LOADER_PATH_VARS: &[&str] = &["PATH"];
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos", windows)))]
const LOADER_PATH_VARS: &[&str] = &[];

fn loader_search_dirs() -> Vec<PathBuf> {
    LOADER_PATH_VARS
        .iter()
        .filter_map(|var| std::env::var_os(var))
        .flat_map(|value| std::env::split_paths(&value).collect::<Vec<_>>())
        .collect()
}

/// Finds the file the platform loader opens for `path`.
///
/// A path with a directory part is taken as is. A bare file name is looked up
/// in `search_dirs`, in order. The result is canonical.
pub fn locate_module_file(
    path: &Path,
    search_dirs: impl IntoIterator<Item = PathBuf>,
) -> Option<PathBuf> {
    let bare = path.parent().map_or(true, |dir| dir.as_os_str().is_empty());
    let file = if bare {
        search_dirs
            .into_iter()
            .map(|dir| dir.join(path))
            .find(|candidate| candidate.is_file())?
    } else {
        path.to_path_buf()
    };
    file.canonicalize().ok().filter(|file| file.is_file())
}

/// Loads shared libraries through the platform loader.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeLoader;

impl ModuleLoader for NativeLoader {
    fn open(&self, path: &Path) -> RegistryResult<Box<dyn LoadedModule>> {
        // SAFETY: running a library's initialisers is inherently unsafe; modules
        // are trusted by the entry-point contract.
        let library = unsafe { Library::new(path) }.map_err(|e| RegistryError::LoadFailure {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let file = locate_module_file(path, loader_search_dirs());
        if file.is_none() {
            debug!("no file found on disk for '{}'", path.display());
        }
        Ok(Box::new(NativeModule {
            path: path.to_path_buf(),
            file,
            library,
        }))
    }
}

struct NativeModule {
    path: PathBuf,
    /// File located when the module was opened.
    file: Option<PathBuf>,
    library: Library,
}

impl LoadedModule for NativeModule {
    fn path(&self) -> &Path {
        &self.path
    }

    fn backing_file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    fn register_entry(&self) -> Option<RegisterEntry> {
        // SAFETY: the symbol type is fixed by the entry-point contract.
        unsafe { self.library.get::<RegisterEntry>(REGISTER_SYMBOL.as_bytes()) }
            .ok()
            .map(|symbol| *symbol)
    }

    fn unregister_entry(&self) -> Option<UnregisterEntry> {
        // SAFETY: as above.
        unsafe { self.library.get::<UnregisterEntry>(UNREGISTER_SYMBOL.as_bytes()) }
            .ok()
            .map(|symbol| *symbol)
    }

    fn close(self: Box<Self>) -> RegistryResult<()> {
        let NativeModule { path, library, .. } = *self;
        library
            .close()
            .map_err(|e| RegistryError::UnloadFailure {
                path,
                message: e.to_string(),
            })
    }
}

/// Entry points of a module linked into the host binary.
#[derive(Clone, Copy)]
pub struct StaticModule {
    pub register: Option<RegisterEntry>,
    pub unregister: Option<UnregisterEntry>,
}

impl fmt::Debug for StaticModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticModule")
            .field("register", &self.register.is_some())
            .field("unregister", &self.unregister.is_some())
            .finish()
    }
}

impl StaticModule {
    pub fn new(register: RegisterEntry) -> Self {
        Self {
            register: Some(register),
            unregister: None,
        }
    }

    pub fn with_unregister(mut self, unregister: UnregisterEntry) -> Self {
        self.unregister = Some(unregister);
        self
    }

    /// A module that exports nothing.
    pub fn empty() -> Self {
        Self {
            register: None,
            unregister: None,
        }
    }
}

/// Serves statically linked modules under resolved paths, for builds without
/// dynamic loading.
#[derive(Debug, Default, Clone)]
pub struct StaticLoader {
    modules: HashMap<PathBuf, StaticModule>,
}

impl StaticLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `module` available under the resolved path `path`.
    pub fn with_module(mut self, path: impl Into<PathBuf>, module: StaticModule) -> Self {
        self.insert(path, module);
        self
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, module: StaticModule) {
        self.modules.insert(path.into(), module);
    }
}

impl ModuleLoader for StaticLoader {
    fn open(&self, path: &Path) -> RegistryResult<Box<dyn LoadedModule>> {
        let module = self
            .modules
            .get(path)
            .copied()
            .ok_or_else(|| RegistryError::LoadFailure {
                path: path.to_path_buf(),
                message: "no static module under this path".to_string(),
            })?;
        Ok(Box::new(StaticHandle {
            path: path.to_path_buf(),
            module,
        }))
    }
}

struct StaticHandle {
    path: PathBuf,
    module: StaticModule,
}

impl LoadedModule for StaticHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn register_entry(&self) -> Option<RegisterEntry> {
        self.module.register
    }

    fn unregister_entry(&self) -> Option<UnregisterEntry> {
        self.module.unregister
    }

    fn backing_file(&self) -> Option<&Path> {
        None
    }

    fn close(self: Box<Self>) -> RegistryResult<()> {
        Ok(())
    }
}
