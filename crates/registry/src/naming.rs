//! On-disk file naming policy for plugin modules.
//!
//! Callers name a module by its logical path (`plugins/signal`); the policy
//! turns that into the file the platform loader expects
//! (`plugins/libsp_signal.so`, `plugins\sp_signald.dll`, ...). The mapping
//! is a pure function of the raw path and the policy value, so it can be
//! tested for every platform on any host.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{RegistryError, RegistryResult};

/// Build flavour a module tree was compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Debug,
    Release,
}

impl BuildMode {
    /// The flavour this binary was compiled in.
    pub fn host() -> Self {
        if cfg!(debug_assertions) {
            BuildMode::Debug
        } else {
            BuildMode::Release
        }
    }
}

/// Target platform conventions for shared libraries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Platform {
    Windows,
    MacOs,
    Linux,
    /// Modules live in the application's native library directory.
    Android { lib_dir: PathBuf },
}

impl Platform {
    /// The platform this binary was compiled for.
    pub fn host(android_lib_dir: Option<&Path>) -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "android") {
            Platform::Android {
                lib_dir: android_lib_dir.map(Path::to_path_buf).unwrap_or_default(),
            }
        } else {
            Platform::Linux
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Platform::Windows => "dll",
            Platform::MacOs => "dylib",
            Platform::Linux | Platform::Android { .. } => "so",
        }
    }

    /// File name prefix the toolchain puts in front of a shared library.
    pub fn file_prefix(&self) -> &'static str {
        match self {
            Platform::Windows => "",
            Platform::MacOs | Platform::Linux | Platform::Android { .. } => "lib",
        }
    }
}

/// Maps logical module paths to on-disk library files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleNaming {
    /// Prefix every module name carries (`sp_`).
    pub prefix: String,
    /// Appended to the module name in debug builds, if set.
    pub debug_marker: Option<String>,
    pub build: BuildMode,
    pub platform: Platform,
}

impl ModuleNaming {
    /// Policy for the running host.
    pub fn host(prefix: impl Into<String>, debug_marker: Option<String>) -> Self {
        Self {
            prefix: prefix.into(),
            debug_marker,
            build: BuildMode::host(),
            platform: Platform::host(None),
        }
    }

    /// Logical module name for `raw`: the file stem with the module prefix
    /// ensured, without debug marker, library prefix or extension.
    pub fn module_name(&self, raw: &Path) -> RegistryResult<String> {
        let stem = raw
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| RegistryError::InvalidName(raw.display().to_string()))?;

        // Accept names that already carry the platform library prefix.
        let lib_prefix = self.platform.file_prefix();
        let stem = match stem.strip_prefix(lib_prefix) {
            Some(rest) if !lib_prefix.is_empty() && rest.starts_with(&self.prefix) => rest,
            _ => stem,
        };

        if stem.starts_with(&self.prefix) {
            Ok(stem.to_string())
        } else {
            Ok(format!("{}{}", self.prefix, stem))
        }
    }

    /// Resolves `raw` to the library file the platform loader should open.
    pub fn resolve(&self, raw: &Path) -> RegistryResult<PathBuf> {
        let mut name = self.module_name(raw)?;
        if self.build == BuildMode::Debug {
            if let Some(marker) = &self.debug_marker {
                name.push_str(marker);
            }
        }

        let file_name = format!(
            "{}{}.{}",
            self.platform.file_prefix(),
            name,
            self.platform.extension()
        );

        let dir = match &self.platform {
            Platform::Android { lib_dir } => lib_dir.as_path(),
            _ => raw.parent().unwrap_or_else(|| Path::new("")),
        };
        Ok(dir.join(file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn naming(platform: Platform, build: BuildMode) -> ModuleNaming {
        ModuleNaming {
            prefix: "sp_".to_string(),
            debug_marker: Some("d".to_string()),
            build,
            platform,
        }
    }

    fn resolve(naming: &ModuleNaming, raw: &str) -> PathBuf {
        naming.resolve(Path::new(raw)).unwrap()
    }

    #[test]
    fn test_linux_release_and_debug() {
        let release = naming(Platform::Linux, BuildMode::Release);
        assert_eq!(resolve(&release, "plugins/signal"), PathBuf::from("plugins/libsp_signal.so"));
        assert_eq!(resolve(&release, "plugins/sp_signal"), PathBuf::from("plugins/libsp_signal.so"));

        let debug = naming(Platform::Linux, BuildMode::Debug);
        assert_eq!(resolve(&debug, "plugins/signal"), PathBuf::from("plugins/libsp_signald.so"));
    }

    #[test]
    fn test_windows_has_no_lib_prefix() {
        let release = naming(Platform::Windows, BuildMode::Release);
        assert_eq!(resolve(&release, "signal"), PathBuf::from("sp_signal.dll"));

        let debug = naming(Platform::Windows, BuildMode::Debug);
        assert_eq!(resolve(&debug, "sp_camera"), PathBuf::from("sp_camerad.dll"));
    }

    #[test]
    fn test_macos_extension() {
        let release = naming(Platform::MacOs, BuildMode::Release);
        assert_eq!(resolve(&release, "lib/audio"), PathBuf::from("lib/libsp_audio.dylib"));
    }

    #[test]
    fn test_android_uses_app_lib_dir() {
        let android = naming(
            Platform::Android {
                lib_dir: PathBuf::from("/data/app/lib"),
            },
            BuildMode::Release,
        );
        assert_eq!(
            resolve(&android, "anywhere/signal"),
            PathBuf::from("/data/app/lib/libsp_signal.so")
        );
    }

    #[test]
    fn test_existing_extension_and_lib_prefix_are_normalized() {
        let release = naming(Platform::Linux, BuildMode::Release);
        assert_eq!(resolve(&release, "plugins/libsp_signal.so"), PathBuf::from("plugins/libsp_signal.so"));
        assert_eq!(release.module_name(Path::new("libsp_signal")).unwrap(), "sp_signal");
        // "lib" that is part of the module name itself is kept
        assert_eq!(release.module_name(Path::new("library")).unwrap(), "sp_library");
    }

    #[test]
    fn test_missing_marker_in_debug() {
        let mut debug = naming(Platform::Linux, BuildMode::Debug);
        debug.debug_marker = None;
        assert_eq!(resolve(&debug, "signal"), PathBuf::from("libsp_signal.so"));
    }

    #[test]
    fn test_empty_path_is_rejected() {
        let release = naming(Platform::Linux, BuildMode::Release);
        assert!(matches!(
            release.resolve(Path::new("")),
            Err(RegistryError::InvalidName(_))
        ));
    }
}
