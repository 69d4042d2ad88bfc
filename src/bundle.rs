//! Where bundles come from
//!
//! A bundle directory looks like:
//!
//! ```text
//! <root>/
//!   _templates/            LICENSE.ipynb, NOTICE.ipynb, README.ipynb
//!   <name>/
//!     bundle.json          descriptor
//!     install_package/     notebooks, dashboards, files
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

pub const DESCRIPTOR_FILE: &str = "bundle.json";
pub const PACKAGE_DIR: &str = "install_package";
pub const TEMPLATES_DIR: &str = "_templates";

/// Read access to packaged bundles
pub trait BundleSource: Send + Sync {
    /// Names of the available bundles, sorted
    fn names(&self) -> Result<Vec<String>>;

    /// Raw descriptor text, `None` when the bundle does not exist
    fn descriptor(&self, name: &str) -> Result<Option<String>>;

    /// A file of the bundle's install package
    fn read(&self, name: &str, relative: &str) -> Result<Vec<u8>>;

    /// A shared template document (licence, readme), if shipped
    fn template(&self, file: &str) -> Result<Option<Vec<u8>>>;
}

/// Bundles stored as directories on disk
#[derive(Debug, Clone)]
pub struct DirectoryBundles {
    root: PathBuf,
}

impl DirectoryBundles {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Reject paths escaping the bundle directory
fn checked_relative(relative: &str) -> Result<&Path> {
    let path = Path::new(relative);
    let escapes = path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    anyhow::ensure!(!escapes, "path '{relative}' leaves the bundle");
    Ok(path)
}

impl BundleSource for DirectoryBundles {
    fn names(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("Could not read {}", self.root.display()))?
        {
            let path = entry?.path();
            if path.join(DESCRIPTOR_FILE).is_file()
                && let Some(name) = path.file_name().and_then(|n| n.to_str())
            {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn descriptor(&self, name: &str) -> Result<Option<String>> {
        let path = self.root.join(checked_relative(name)?).join(DESCRIPTOR_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read_to_string(&path)
            .map(Some)
            .with_context(|| format!("Could not read {}", path.display()))
    }

    fn read(&self, name: &str, relative: &str) -> Result<Vec<u8>> {
        let path = self
            .root
            .join(checked_relative(name)?)
            .join(PACKAGE_DIR)
            .join(checked_relative(relative)?);
        fs::read(&path).with_context(|| format!("Could not read {}", path.display()))
    }

    fn template(&self, file: &str) -> Result<Option<Vec<u8>>> {
        let path = self.root.join(TEMPLATES_DIR).join(checked_relative(file)?);
        if !path.is_file() {
            return Ok(None);
        }
        fs::read(&path)
            .map(Some)
            .with_context(|| format!("Could not read {}", path.display()))
    }
}
