pub mod ast;
pub mod dump;
pub mod evaluate;
pub mod intrinsics;
pub mod library;
pub mod prelude;
pub mod scope;
pub mod traversal;
pub mod types;
pub mod unify;

pub use ast::{Node, Program};
pub use evaluate::{EvaluationContext, EvaluationError, Memory, Value};
pub use intrinsics::Intrinsics;
pub use library::LibraryResolver;
pub use scope::ScopeContext;
pub use types::{Substitution, Unification};
pub use unify::{UnificationContext, UnificationError};

use crate::config::GenerateConfig;
use ast::{Declaration, TopLevelNode, join_programs, make_program};
use std::collections::HashSet;
use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info};
use traversal::{Flow, Order, reduce};

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to read {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("{} does not contain a program", path.display())]
    NotAProgram { path: PathBuf },
    #[error("type error: {0}")]
    Unification(#[from] UnificationError),
    #[error("file reader task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Everything the pipeline knows about one program.
#[derive(Debug)]
pub struct Compilation {
    pub program: Program,
    pub scope: Rc<ScopeContext>,
    pub unification: UnificationContext,
    pub substitution: Substitution,
    pub evaluation: EvaluationContext,
}

impl Compilation {
    /// Value of the node (or pattern) with `id`.
    pub fn evaluate(&self, id: &str) -> Result<Option<Rc<Value>>, EvaluationError> {
        self.evaluation.evaluate(id)
    }

    /// Value of the declaration at a dotted path, e.g. `["Colors", "primary"]`.
    pub fn evaluate_path(&self, path: &[&str]) -> Result<Option<Rc<Value>>, EvaluationError> {
        match self.scope.namespace.get(path) {
            Some(pattern) => self.evaluate(pattern),
            None => Ok(None),
        }
    }

    /// Solved type of a node, or of a pattern when `id` names one.
    pub fn type_of(&self, id: &str) -> Option<Unification> {
        self.unification
            .nodes
            .get(id)
            .or_else(|| self.unification.pattern_types.get(id))
            .map(|ty| self.substitution.apply(ty))
    }

    /// Dotted paths and pattern ids of the variables declared outside the
    /// standard library, sorted by path.
    pub fn user_variables(&self) -> Vec<(String, String)> {
        let variables = reduce(
            Node::Program(&self.program),
            Order::PreOrder,
            HashSet::new(),
            |acc: &mut HashSet<String>, node, _| match node {
                Node::Declaration(Declaration::Variable(d)) => {
                    if !self.scope.is_from_initial_scope(&d.name.id) {
                        acc.insert(d.name.id.clone());
                    }
                    Flow::SKIP_CHILDREN
                }
                Node::Declaration(Declaration::Record(_) | Declaration::Function(_)) => {
                    Flow::SKIP_CHILDREN
                }
                _ => Flow::CONTINUE,
            },
        );
        self.scope
            .namespace
            .entries()
            .into_iter()
            .filter(|(_, pattern)| variables.contains(pattern))
            .map(|(path, pattern)| (path.join("."), pattern))
            .collect()
    }
}

/// Compile a program on its own, without the standard library.
pub fn compile(program: Program) -> Result<Compilation, CompileError> {
    compile_program(program, HashSet::new(), Intrinsics::standard())
}

/// Compile a program with the standard library imported in front of it.
pub fn compile_with_libraries(
    program: Program,
    resolver: &LibraryResolver,
) -> Result<Compilation, CompileError> {
    let mut imported = HashSet::new();
    let libraries = resolver.resolve_imports_into(&library::standard_imports_program(), &mut imported);
    let initial_scope = reduce(
        Node::Program(&libraries),
        Order::PreOrder,
        HashSet::new(),
        |acc: &mut HashSet<String>, node, _| {
            if let Some(pattern) = node.pattern() {
                acc.insert(pattern.id.clone());
            }
            Flow::CONTINUE
        },
    );
    debug!(
        libraries = imported.len(),
        patterns = initial_scope.len(),
        "loaded standard library"
    );

    let user = resolver.resolve_imports_into(&program, &mut imported);
    let mut block = libraries.block;
    block.extend(user.block);
    let joined = Program {
        id: program.id,
        block,
    };
    compile_program(joined, initial_scope, Intrinsics::standard())
}

fn compile_program(
    program: Program,
    initial_scope: HashSet<String>,
    intrinsics: Intrinsics,
) -> Result<Compilation, CompileError> {
    let root = Node::Program(&program);
    let scope = Rc::new(ScopeContext::build_with_initial_scope(
        root,
        None,
        initial_scope,
    ));
    let unification = UnificationContext::build(root, &scope);
    let substitution = unify::unify(&unification.constraints)?;
    debug!(
        constraints = unification.constraints.len(),
        bindings = substitution.len(),
        "solved types"
    );
    let evaluation = EvaluationContext::build(
        root,
        Rc::clone(&scope),
        &unification,
        &substitution,
        Rc::new(intrinsics),
    );
    Ok(Compilation {
        program,
        scope,
        unification,
        substitution,
        evaluation,
    })
}

/// Source of logic documents.
pub trait FileSystem: Clone + Send + Sync + 'static {
    fn read_file(&self, path: PathBuf) -> impl Future<Output = io::Result<String>> + Send;
}

/// Reads files with `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioFileSystem;

impl FileSystem for TokioFileSystem {
    fn read_file(&self, path: PathBuf) -> impl Future<Output = io::Result<String>> + Send {
        tokio::fs::read_to_string(path)
    }
}

/// Decode one logic document.
pub fn decode_program(path: &Path, source: &str) -> Result<Program, CompileError> {
    let node: TopLevelNode = serde_json::from_str(source).map_err(|source| CompileError::Decode {
        path: path.to_path_buf(),
        source,
    })?;
    make_program(node).ok_or_else(|| CompileError::NotAProgram {
        path: path.to_path_buf(),
    })
}

/// Read every configured document concurrently and join them in
/// configuration order.
pub async fn read_programs<F: FileSystem>(
    config: &GenerateConfig,
    fs: F,
) -> Result<Program, CompileError> {
    let mut reads = JoinSet::new();
    for (index, path) in config.logic_paths.iter().cloned().enumerate() {
        let fs = fs.clone();
        reads.spawn(async move {
            let result = fs.read_file(path.clone()).await;
            (index, path, result)
        });
    }

    let mut sources: Vec<Option<(PathBuf, String)>> = vec![None; config.logic_paths.len()];
    while let Some(joined) = reads.join_next().await {
        let (index, path, result) = joined?;
        let source = result.map_err(|source| CompileError::Read {
            path: path.clone(),
            source,
        })?;
        sources[index] = Some((path, source));
    }

    let programs = sources
        .into_iter()
        .flatten()
        .map(|(path, source)| decode_program(&path, &source))
        .collect::<Result<Vec<_>, _>>()?;
    info!(files = programs.len(), "read logic files");

    Ok(join_programs(programs.into_iter().map(Some)))
}

/// Read the configured documents and compile them with the standard library.
pub async fn generate<F: FileSystem>(
    config: &GenerateConfig,
    fs: F,
) -> Result<Compilation, CompileError> {
    let program = read_programs(config, fs).await?;
    compile_with_libraries(program, &config.library_resolver())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ast::*;

    #[test]
    fn test_compile_without_libraries() {
        let program = Program::new(vec![Statement::declaration(Declaration::namespace(
            "Sizes",
            vec![Declaration::variable(
                "small",
                Some(TypeAnnotation::named("Number", vec![])),
                Some(Expression::literal(Literal::number(8.0))),
            )],
        ))]);
        let compilation = compile(program).unwrap();
        let small = compilation.evaluate_path(&["Sizes", "small"]).unwrap().unwrap();
        assert_eq!(*small, Value::number(8.0));
        assert_eq!(
            compilation.user_variables(),
            vec![(
                "Sizes.small".to_string(),
                compilation.scope.namespace.get(&["Sizes", "small"]).unwrap().to_string()
            )]
        );
        assert_eq!(compilation.evaluate_path(&["Sizes", "large"]), Ok(None));
    }

    #[test]
    fn test_type_error_is_reported() {
        let program = Program::new(vec![Statement::declaration(Declaration::variable(
            "x",
            Some(TypeAnnotation::named("Number", vec![])),
            Some(Expression::literal(Literal::string("five"))),
        ))]);
        assert!(matches!(
            compile(program),
            Err(CompileError::Unification(UnificationError::NameMismatch { .. }))
        ));
    }

    #[test]
    fn test_libraries_are_initial_scope() {
        let program = Program::new(vec![Statement::declaration(Declaration::variable(
            "flag",
            None,
            Some(Expression::literal(Literal::boolean(true))),
        ))]);
        let compilation = compile_with_libraries(program, &LibraryResolver::bundled()).unwrap();
        let shadow = compilation.scope.namespace.get(&["Shadow"]).unwrap();
        assert!(compilation.scope.is_from_initial_scope(shadow));
        let variables = compilation.user_variables();
        assert_eq!(variables.len(), 1);
        assert_eq!(variables[0].0, "flag");
        assert!(!compilation.scope.is_from_initial_scope(&variables[0].1));
    }

    #[test]
    fn test_decode_program() {
        let declaration = Declaration::variable("a", None, None);
        let json = serde_json::to_string(&declaration).unwrap();
        let program = decode_program(Path::new("a.logic"), &json).unwrap();
        assert_eq!(program.block.len(), 1);
        assert!(matches!(
            decode_program(Path::new("b.logic"), "[]"),
            Err(CompileError::Decode { .. })
        ));
    }
}
