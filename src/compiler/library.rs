//! Standard library imports.
//!
//! Libraries are ordinary programs stored as JSON documents named
//! `<Library>.logic`. Importing one splices its statements into the
//! importing program right after the import declaration.

use super::ast::{Declaration, DeclarationStatement, Program, Statement, TopLevelNode, make_program};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Libraries every program implicitly imports, in import order.
pub const STANDARD_LIBRARIES: [&str; 4] = ["Prelude", "Color", "Shadow", "TextStyle"];

const BUNDLED: [(&str, &str); 4] = [
    ("Prelude", include_str!("../../static/logic/Prelude.logic")),
    ("Color", include_str!("../../static/logic/Color.logic")),
    ("Shadow", include_str!("../../static/logic/Shadow.logic")),
    ("TextStyle", include_str!("../../static/logic/TextStyle.logic")),
];

#[derive(Debug, Error)]
pub enum LibraryError {
    #[error("library `{0}` not found")]
    NotFound(String),
    #[error("failed to read library `{name}` from {path}: {source}")]
    Io {
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to decode library `{name}`: {source}")]
    Decode {
        name: String,
        source: serde_json::Error,
    },
    #[error("library `{0}` is not a program")]
    NotAProgram(String),
}

/// A program importing every standard library.
pub fn standard_imports_program() -> Program {
    Program::new(
        STANDARD_LIBRARIES
            .iter()
            .map(|name| Statement::declaration(Declaration::import(name)))
            .collect(),
    )
}

/// Decode a library document into a program.
pub fn decode_library(name: &str, source: &str) -> Result<Program, LibraryError> {
    let node: TopLevelNode =
        serde_json::from_str(source).map_err(|source| LibraryError::Decode {
            name: name.to_string(),
            source,
        })?;
    make_program(node).ok_or_else(|| LibraryError::NotAProgram(name.to_string()))
}

#[derive(Debug, Clone)]
enum LibrarySource {
    Bundled,
    Directory(PathBuf),
}

/// Finds library programs by name.
#[derive(Debug, Clone)]
pub struct LibraryResolver {
    source: LibrarySource,
}

impl Default for LibraryResolver {
    fn default() -> Self {
        Self::bundled()
    }
}

impl LibraryResolver {
    /// Load libraries from `<dir>/<Name>.logic`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            source: LibrarySource::Directory(dir.into()),
        }
    }

    /// The libraries shipped with this crate.
    pub fn bundled() -> Self {
        Self {
            source: LibrarySource::Bundled,
        }
    }

    pub fn directory(&self) -> Option<&Path> {
        match &self.source {
            LibrarySource::Bundled => None,
            LibrarySource::Directory(dir) => Some(dir),
        }
    }

    /// Names of every library this resolver can load.
    pub fn available(&self) -> Vec<String> {
        match &self.source {
            LibrarySource::Bundled => BUNDLED.iter().map(|(name, _)| name.to_string()).collect(),
            LibrarySource::Directory(dir) => {
                let Ok(entries) = fs::read_dir(dir) else {
                    return Vec::new();
                };
                let mut names: Vec<String> = entries
                    .filter_map(|entry| entry.ok())
                    .map(|entry| entry.path())
                    .filter(|path| path.extension().is_some_and(|ext| ext == "logic"))
                    .filter_map(|path| Some(path.file_stem()?.to_str()?.to_string()))
                    .collect();
                names.sort();
                names
            }
        }
    }

    pub fn load_library(&self, name: &str) -> Result<Program, LibraryError> {
        match &self.source {
            LibrarySource::Bundled => {
                let (_, source) = BUNDLED
                    .iter()
                    .find(|(bundled, _)| *bundled == name)
                    .ok_or_else(|| LibraryError::NotFound(name.to_string()))?;
                decode_library(name, source)
            }
            LibrarySource::Directory(dir) => {
                let path = dir.join(format!("{}.logic", name));
                if !path.exists() {
                    return Err(LibraryError::NotFound(name.to_string()));
                }
                let source = fs::read_to_string(&path).map_err(|source| LibraryError::Io {
                    name: name.to_string(),
                    path: path.clone(),
                    source,
                })?;
                decode_library(name, &source)
            }
        }
    }

    /// Splice imported libraries into `program`.
    ///
    /// Libraries named in `existing` are not imported again, and every
    /// library is imported at most once. Libraries that fail to load leave
    /// their import declaration in place.
    pub fn resolve_imports(&self, program: &Program, existing: &HashSet<String>) -> Program {
        let mut imported = existing.clone();
        self.resolve_imports_into(program, &mut imported)
    }

    /// Like [`resolve_imports`](Self::resolve_imports), recording every
    /// library it imports in `imported`.
    pub fn resolve_imports_into(&self, program: &Program, imported: &mut HashSet<String>) -> Program {
        let mut block = Vec::with_capacity(program.block.len());
        for statement in &program.block {
            block.push(statement.clone());
            let Statement::Declaration(DeclarationStatement {
                content: Declaration::ImportDeclaration(import),
                ..
            }) = statement
            else {
                continue;
            };
            let name = &import.name.name;
            if imported.contains(name) {
                continue;
            }
            match self.load_library(name) {
                Ok(library) => {
                    debug!(library = %name, "importing library");
                    imported.insert(name.clone());
                    let resolved = self.resolve_imports_into(&library, imported);
                    block.extend(resolved.block);
                }
                Err(e) => warn!("failed to import library {}: {}", name, e),
            }
        }
        Program {
            id: program.id.clone(),
            block,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::Expression;
    use std::io::Write;

    fn library_json(import: Option<&str>, variable: &str) -> String {
        let mut block = Vec::new();
        if let Some(import) = import {
            block.push(Statement::declaration(Declaration::import(import)));
        }
        block.push(Statement::declaration(Declaration::variable(
            variable,
            None,
            Some(Expression::literal(crate::compiler::ast::Literal::number(1.0))),
        )));
        serde_json::to_string(&TopLevelNode::Root(
            crate::compiler::ast::Root::Program(Program::new(block)),
        ))
        .unwrap()
    }

    fn write(dir: &Path, name: &str, content: &str) {
        let mut file = fs::File::create(dir.join(format!("{}.logic", name))).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn declared_names(program: &Program) -> Vec<String> {
        program
            .block
            .iter()
            .filter_map(|statement| match statement {
                Statement::Declaration(d) => d.content.pattern().map(|p| p.name.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_standard_imports_program() {
        let program = standard_imports_program();
        assert_eq!(declared_names(&program), STANDARD_LIBRARIES.to_vec());
    }

    #[test]
    fn test_bundled_libraries_decode() {
        let resolver = LibraryResolver::bundled();
        for name in STANDARD_LIBRARIES {
            let library = resolver.load_library(name).unwrap();
            assert!(!library.block.is_empty(), "{} is empty", name);
        }
        assert!(matches!(
            resolver.load_library("Missing"),
            Err(LibraryError::NotFound(_))
        ));
    }

    #[test]
    fn test_resolve_nested_imports_once() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "A", &library_json(Some("B"), "a"));
        write(dir.path(), "B", &library_json(Some("A"), "b"));
        let resolver = LibraryResolver::new(dir.path());
        assert_eq!(resolver.available(), vec!["A", "B"]);

        let program = Program::new(vec![
            Statement::declaration(Declaration::import("A")),
            Statement::declaration(Declaration::import("B")),
        ]);
        let resolved = resolver.resolve_imports(&program, &HashSet::new());
        assert_eq!(resolved.id, program.id);
        assert_eq!(declared_names(&resolved), vec!["A", "B", "A", "b", "a", "B"]);
    }

    #[test]
    fn test_resolve_is_noop_for_existing_imports() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "A", &library_json(None, "a"));
        let resolver = LibraryResolver::new(dir.path());
        let program = Program::new(vec![Statement::declaration(Declaration::import("A"))]);
        let existing = HashSet::from(["A".to_string()]);
        assert_eq!(resolver.resolve_imports(&program, &existing), program);
    }

    #[test]
    fn test_missing_and_broken_libraries_keep_import() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "Broken", "{ not json");
        let resolver = LibraryResolver::new(dir.path());
        let program = Program::new(vec![
            Statement::declaration(Declaration::import("Missing")),
            Statement::declaration(Declaration::import("Broken")),
        ]);
        assert_eq!(resolver.resolve_imports(&program, &HashSet::new()), program);
        assert!(matches!(
            resolver.load_library("Broken"),
            Err(LibraryError::Decode { .. })
        ));
    }
}
