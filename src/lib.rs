//! Lona Logic - the core of a small declarative design-token language
//!
//! This library resolves names, infers types and lazily evaluates programs
//! given as JSON syntax trees. Start with [`compiler::compile_with_libraries`]
//! or [`compiler::generate`].

pub mod compiler;
pub mod config;
pub mod package;

// Re-export commonly used types
pub use compiler::{
    Compilation, CompileError, FileSystem, TokioFileSystem, compile, compile_with_libraries,
    generate, read_programs,
};
pub use config::{GenerateConfig, LibrarySource};
