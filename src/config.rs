//! Pipeline configuration types.

use crate::compiler::library::LibraryResolver;
use std::path::PathBuf;

/// Where library programs come from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LibrarySource {
    /// The libraries compiled into this crate.
    #[default]
    Bundled,
    /// `<Name>.logic` files in a directory.
    Directory(PathBuf),
}

/// Inputs for [`generate`](crate::compiler::generate).
#[derive(Debug, Clone, Default)]
pub struct GenerateConfig {
    /// Logic documents, joined in this order.
    pub logic_paths: Vec<PathBuf>,
    pub libraries: LibrarySource,
}

impl GenerateConfig {
    pub fn new(logic_paths: Vec<PathBuf>) -> Self {
        Self {
            logic_paths,
            libraries: LibrarySource::Bundled,
        }
    }

    pub fn with_libraries_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.libraries = LibrarySource::Directory(dir.into());
        self
    }

    pub fn library_resolver(&self) -> LibraryResolver {
        match &self.libraries {
            LibrarySource::Bundled => LibraryResolver::bundled(),
            LibrarySource::Directory(dir) => LibraryResolver::new(dir),
        }
    }
}
