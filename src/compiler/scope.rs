//! Name resolution.
//!
//! Resolution runs in two passes. The first registers every declaration in a
//! global namespace keyed by its dotted path, so references may point forward
//! in the document. The second walks lexical scopes and maps each identifier
//! use to the pattern it refers to.

use super::ast::{
    Declaration, EnumerationCase, Expression, FunctionParameter, GenericParameter, Identifier,
    Node, Pattern, Statement, flattened_member_expression,
};
use super::traversal::{Flow, Order, Visit, Visitor, walk};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{trace, warn};

/// Type names whose record declarations do not act as constructors.
pub const BUILT_IN_TYPE_CONSTRUCTORS: [&str; 5] = ["Boolean", "Number", "String", "Array", "Color"];

fn is_built_in_type_constructor(name: &str) -> bool {
    BUILT_IN_TYPE_CONSTRUCTORS.contains(&name)
}

/// Trie from dotted paths to pattern ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Namespace {
    pattern: Option<String>,
    children: HashMap<String, Namespace>,
}

impl Namespace {
    pub fn get<S: AsRef<str>>(&self, path: &[S]) -> Option<&str> {
        let mut node = self;
        for segment in path {
            node = node.children.get(segment.as_ref())?;
        }
        node.pattern.as_deref()
    }

    pub fn set<S: AsRef<str>>(&mut self, path: &[S], pattern_id: &str) {
        let mut node = self;
        for segment in path {
            node = node.children.entry(segment.as_ref().to_string()).or_default();
        }
        node.pattern = Some(pattern_id.to_string());
    }

    /// Every registered path, sorted.
    pub fn entries(&self) -> BTreeMap<Vec<String>, String> {
        let mut entries = BTreeMap::new();
        self.collect(&mut Vec::new(), &mut entries);
        entries
    }

    fn collect(&self, prefix: &mut Vec<String>, out: &mut BTreeMap<Vec<String>, String>) {
        if let Some(pattern) = &self.pattern {
            out.insert(prefix.clone(), pattern.clone());
        }
        for (segment, child) in &self.children {
            prefix.push(segment.clone());
            child.collect(prefix, out);
            prefix.pop();
        }
    }
}

/// Lexical frames, innermost last.
#[derive(Debug, Clone)]
pub struct ScopeStack {
    frames: Vec<HashMap<String, String>>,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self {
            frames: vec![HashMap::new()],
        }
    }
}

impl ScopeStack {
    pub fn enter_scope(&mut self) {
        self.frames.push(HashMap::new());
    }

    pub fn exit_scope(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn declare(&mut self, name: &str, pattern_id: &str) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), pattern_id.to_string());
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .map(String::as_str)
    }
}

/// Result of name resolution over one program.
#[derive(Debug, Clone, Default)]
pub struct ScopeContext {
    pub namespace: Namespace,
    /// Identifier id (or member expression id) to pattern id.
    pub identifier_to_pattern: HashMap<String, String>,
    pub pattern_to_name: HashMap<String, String>,
    pub pattern_to_type_name: HashMap<String, String>,
    /// Patterns declared by the standard library imports.
    pub initial_scope: HashSet<String>,
}

impl ScopeContext {
    /// Resolve every identifier under `root`.
    ///
    /// With a `target_id`, resolution stops at that node, leaving the lexical
    /// state of that point behind.
    pub fn build(root: Node<'_>, target_id: Option<&str>) -> Self {
        Self::build_with_initial_scope(root, target_id, HashSet::new())
    }

    pub fn build_with_initial_scope(
        root: Node<'_>,
        target_id: Option<&str>,
        initial_scope: HashSet<String>,
    ) -> Self {
        let mut declarations = NamespaceDeclarations::default();
        walk(root, Order::PreOrder, &mut declarations);

        let mut resolver = ScopeResolver {
            context: ScopeContext {
                namespace: declarations.namespace,
                initial_scope,
                ..Default::default()
            },
            pattern_names: ScopeStack::default(),
            namespace_path: Vec::new(),
            target_id,
        };
        walk(root, Order::PreOrder, &mut resolver);
        trace!(
            resolved = resolver.context.identifier_to_pattern.len(),
            "scope resolution finished"
        );
        resolver.context
    }

    /// The pattern an identifier (or member expression) refers to.
    pub fn pattern_for(&self, identifier_id: &str) -> Option<&str> {
        self.identifier_to_pattern
            .get(identifier_id)
            .map(String::as_str)
    }

    /// Whether `id` is, or resolves to, a pattern from the standard library.
    pub fn is_from_initial_scope(&self, id: &str) -> bool {
        let pattern = self.pattern_for(id).unwrap_or(id);
        self.initial_scope.contains(pattern)
    }
}

#[derive(Default)]
struct NamespaceDeclarations {
    namespace: Namespace,
    path: Vec<String>,
}

impl NamespaceDeclarations {
    fn register(&mut self, pattern: &Pattern) {
        self.path.push(pattern.name.clone());
        self.namespace.set(&self.path, &pattern.id);
        self.path.pop();
    }
}

impl<'a> Visitor<'a> for NamespaceDeclarations {
    fn visit(&mut self, node: Node<'a>, visit: Visit) -> Flow {
        let Node::Declaration(declaration) = node else {
            return Flow::CONTINUE;
        };
        match (declaration, visit) {
            (Declaration::Variable(_) | Declaration::Function(_), Visit::Enter) => Flow::REVISIT,
            (Declaration::Variable(d), Visit::Exit) => {
                self.register(&d.name);
                Flow::CONTINUE
            }
            (Declaration::Function(d), Visit::Exit) => {
                self.register(&d.name);
                Flow::CONTINUE
            }
            // Member variables stay out of the enclosing namespace.
            (Declaration::Record(_), Visit::Enter) => Flow::SKIP_CHILDREN.and_revisit(),
            (Declaration::Record(d), Visit::Exit) => {
                if !is_built_in_type_constructor(&d.name.name) {
                    self.register(&d.name);
                }
                Flow::CONTINUE
            }
            (Declaration::Enumeration(_), Visit::Enter) => Flow::REVISIT,
            (Declaration::Enumeration(d), Visit::Exit) => {
                self.path.push(d.name.name.clone());
                for case in &d.cases {
                    if let EnumerationCase::EnumerationCase(case) = case {
                        self.register(&case.name);
                    }
                }
                self.path.pop();
                Flow::CONTINUE
            }
            (Declaration::Namespace(d), Visit::Enter) => {
                self.path.push(d.name.name.clone());
                Flow::REVISIT
            }
            (Declaration::Namespace(_), Visit::Exit) => {
                self.path.pop();
                Flow::CONTINUE
            }
            _ => Flow::CONTINUE,
        }
    }
}

struct ScopeResolver<'t> {
    context: ScopeContext,
    pattern_names: ScopeStack,
    namespace_path: Vec<String>,
    target_id: Option<&'t str>,
}

impl ScopeResolver<'_> {
    fn declare(&mut self, pattern: &Pattern) {
        self.pattern_names.declare(&pattern.name, &pattern.id);
        self.context
            .pattern_to_name
            .insert(pattern.id.clone(), pattern.name.clone());
    }

    fn declare_generics(&mut self, generics: &[GenericParameter]) {
        for generic in generics {
            if let GenericParameter::Parameter { name, .. } = generic {
                self.context
                    .pattern_to_type_name
                    .insert(name.id.clone(), name.name.clone());
            }
        }
    }

    fn lookup(&self, name: &str) -> Option<String> {
        if let Some(pattern) = self.pattern_names.lookup(name) {
            return Some(pattern.to_string());
        }
        if let Some(pattern) = self.context.namespace.get(&[name]) {
            return Some(pattern.to_string());
        }
        let mut qualified = self.namespace_path.clone();
        qualified.push(name.to_string());
        self.context.namespace.get(&qualified).map(str::to_string)
    }

    fn resolve(&mut self, identifier: &Identifier) {
        if identifier.is_placeholder {
            return;
        }
        match self.lookup(&identifier.string) {
            Some(pattern) => {
                self.context
                    .identifier_to_pattern
                    .insert(identifier.id.clone(), pattern);
            }
            None => warn!(
                identifier = %identifier.string,
                id = %identifier.id,
                "failed to resolve identifier"
            ),
        }
    }

    fn enter_named_scope(&mut self, name: &str) {
        self.pattern_names.enter_scope();
        self.namespace_path.push(name.to_string());
    }

    fn exit_named_scope(&mut self) {
        self.pattern_names.exit_scope();
        self.namespace_path.pop();
    }

    fn enter_expression(&mut self, expression: &Expression) -> Flow {
        match expression {
            Expression::IdentifierExpression(e) => {
                self.resolve(&e.identifier);
                Flow::CONTINUE
            }
            Expression::MemberExpression(e) => {
                let Some(path) = flattened_member_expression(expression) else {
                    return Flow::CONTINUE;
                };
                if path.iter().any(|identifier| identifier.is_placeholder) {
                    return Flow::SKIP_CHILDREN;
                }
                let segments: Vec<&str> = path.iter().map(|i| i.string.as_str()).collect();
                match self.context.namespace.get(&segments) {
                    Some(pattern) => {
                        let pattern = pattern.to_string();
                        self.context.identifier_to_pattern.insert(e.id.clone(), pattern);
                    }
                    None => warn!(path = %segments.join("."), "failed to resolve member expression"),
                }
                Flow::SKIP_CHILDREN
            }
            _ => Flow::CONTINUE,
        }
    }

    fn enter(&mut self, node: Node<'_>) -> Flow {
        match node {
            Node::TypeAnnotation(_) => Flow::SKIP_CHILDREN,
            Node::Expression(expression) => self.enter_expression(expression),
            Node::Declaration(Declaration::Variable(_)) => Flow::REVISIT,
            Node::Declaration(Declaration::Function(d)) => {
                self.declare(&d.name);
                self.pattern_names.enter_scope();
                for parameter in &d.parameters {
                    if let FunctionParameter::Parameter(p) = parameter {
                        self.declare(&p.local_name);
                    }
                }
                self.declare_generics(&d.generic_parameters);
                Flow::REVISIT
            }
            Node::Declaration(Declaration::Record(d)) => {
                self.context
                    .pattern_to_type_name
                    .insert(d.name.id.clone(), d.name.name.clone());
                self.declare_generics(&d.generic_parameters);
                for member in &d.declarations {
                    if let Declaration::Variable(variable) = member
                        && let Some(initializer) = &variable.initializer
                        && !walk(Node::Expression(initializer), Order::PreOrder, self)
                    {
                        return Flow::STOP;
                    }
                }
                Flow::SKIP_CHILDREN.and_revisit()
            }
            Node::Declaration(Declaration::Enumeration(d)) => {
                self.context
                    .pattern_to_type_name
                    .insert(d.name.id.clone(), d.name.name.clone());
                self.enter_named_scope(&d.name.name);
                self.declare_generics(&d.generic_parameters);
                for case in &d.cases {
                    if let EnumerationCase::EnumerationCase(case) = case {
                        self.context
                            .pattern_to_name
                            .insert(case.name.id.clone(), case.name.name.clone());
                    }
                }
                Flow::REVISIT
            }
            Node::Declaration(Declaration::Namespace(d)) => {
                self.enter_named_scope(&d.name.name);
                Flow::REVISIT
            }
            Node::Statement(Statement::Loop(s)) => {
                self.pattern_names.enter_scope();
                self.declare(&s.pattern);
                Flow::REVISIT
            }
            _ => Flow::CONTINUE,
        }
    }

    fn exit(&mut self, node: Node<'_>) {
        match node {
            Node::Declaration(Declaration::Variable(d)) => self.declare(&d.name),
            Node::Declaration(Declaration::Function(_)) | Node::Statement(Statement::Loop(_)) => {
                self.pattern_names.exit_scope();
            }
            Node::Declaration(Declaration::Record(d)) => {
                if !is_built_in_type_constructor(&d.name.name) {
                    self.declare(&d.name);
                }
            }
            Node::Declaration(Declaration::Enumeration(_) | Declaration::Namespace(_)) => {
                self.exit_named_scope();
            }
            _ => {}
        }
    }
}

impl<'a> Visitor<'a> for ScopeResolver<'_> {
    fn visit(&mut self, node: Node<'a>, visit: Visit) -> Flow {
        match visit {
            Visit::Enter => {
                if self.target_id == Some(node.id()) {
                    return Flow::STOP;
                }
                self.enter(node)
            }
            Visit::Exit => {
                self.exit(node);
                Flow::CONTINUE
            }
        }
    }
}
