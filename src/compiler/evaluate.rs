//! Lazy evaluation.
//!
//! Building an [`EvaluationContext`] registers, for every node that can
//! produce a value, either the value itself or a [`Thunk`] describing how to
//! compute it from other nodes. Nothing is computed until a caller asks for a
//! node with [`EvaluationContext::evaluate`].
//!
//! Function bodies are never executed. Calls evaluate record and enum
//! constructors, and native functions from the [`Intrinsics`] registry.

use super::ast::{
    BinaryOperator, Declaration, EnumerationCase, Expression, FunctionCallArgument, Literal, Node,
    declaration_path_to,
};
use super::intrinsics::Intrinsics;
use super::scope::ScopeContext;
use super::traversal::{Flow, Order, Visit, Visitor, walk};
use super::types::{Substitution, Unification};
use super::unify::UnificationContext;
use serde::Serialize;
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error, trace, warn};

/// Runtime representation of a value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum Memory {
    Unit,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Enum { tag: String, data: Vec<Value> },
    Record(BTreeMap<String, Value>),
    Function(FunctionMemory),
}

/// What calling a function value does.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "camelCase")]
pub enum FunctionMemory {
    /// Reference to a declared function, by its dotted declaration path.
    Path(Vec<String>),
    /// Record constructor: fields in declaration order.
    RecordInit(Vec<(String, RecordField)>),
    /// Enumeration case constructor.
    EnumInit(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordField {
    #[serde(rename = "type")]
    pub ty: Unification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Value {
    #[serde(rename = "type")]
    pub ty: Unification,
    pub memory: Memory,
}

impl Value {
    pub fn new(ty: Unification, memory: Memory) -> Self {
        Self { ty, memory }
    }

    pub fn unit() -> Self {
        Self::new(Unification::void(), Memory::Unit)
    }

    pub fn bool(value: bool) -> Self {
        Self::new(Unification::boolean(), Memory::Bool(value))
    }

    pub fn number(value: f64) -> Self {
        Self::new(Unification::number(), Memory::Number(value))
    }

    pub fn string(value: &str) -> Self {
        Self::new(Unification::string(), Memory::String(value.to_string()))
    }

    /// A color is a record holding its CSS representation in `value`.
    pub fn color(css: &str) -> Self {
        let fields = BTreeMap::from([("value".to_string(), Value::string(css))]);
        Self::new(Unification::color(), Memory::Record(fields))
    }

    /// The CSS string of a color value.
    pub fn as_color(&self) -> Option<&str> {
        match (&self.ty, &self.memory) {
            (Unification::Constant { name, .. }, Memory::Record(fields)) if name == "Color" => {
                match fields.get("value").map(|value| &value.memory) {
                    Some(Memory::String(css)) => Some(css),
                    _ => None,
                }
            }
            _ => None,
        }
    }
}

/// Deferred computation of one node's value.
pub struct Thunk {
    /// Diagnostic label.
    pub label: String,
    /// Node ids whose values are passed to `compute`, in order.
    pub dependencies: Vec<String>,
    compute: Box<dyn Fn(&[Rc<Value>]) -> Result<Rc<Value>, EvaluationError>>,
}

impl Thunk {
    pub fn new(
        label: impl Into<String>,
        dependencies: Vec<String>,
        compute: impl Fn(&[Rc<Value>]) -> Result<Rc<Value>, EvaluationError> + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            dependencies,
            compute: Box::new(compute),
        }
    }

    /// A thunk whose value is the value of another node.
    pub fn alias(label: impl Into<String>, target: &str) -> Self {
        Self::new(label, vec![target.to_string()], |values| {
            values
                .first()
                .cloned()
                .ok_or_else(|| EvaluationError::Internal("alias without dependency".to_string()))
        })
    }
}

impl fmt::Debug for Thunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thunk")
            .field("label", &self.label)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("cyclic dependency while evaluating `{0}`")]
    CyclicDependency(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("`{name}` expects {expected} argument(s), got {found}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("internal evaluation error: {0}")]
    Internal(String),
}

/// Values and thunks for one program.
#[derive(Debug)]
pub struct EvaluationContext {
    values: RefCell<HashMap<String, Rc<Value>>>,
    thunks: HashMap<String, Thunk>,
    in_progress: RefCell<HashSet<String>>,
    scope: Rc<ScopeContext>,
}

impl EvaluationContext {
    pub fn new(scope: Rc<ScopeContext>) -> Self {
        Self {
            values: RefCell::new(HashMap::new()),
            thunks: HashMap::new(),
            in_progress: RefCell::new(HashSet::new()),
            scope,
        }
    }

    /// Register the values and thunks of every node under `root`.
    pub fn build(
        root: Node<'_>,
        scope: Rc<ScopeContext>,
        unification: &UnificationContext,
        substitution: &Substitution,
        intrinsics: Rc<Intrinsics>,
    ) -> Self {
        let mut builder = EvaluationBuilder {
            root,
            context: EvaluationContext::new(scope),
            unification,
            substitution,
            intrinsics,
        };
        walk(root, Order::PostOrder, &mut builder);
        trace!(
            values = builder.context.values.borrow().len(),
            thunks = builder.context.thunks.len(),
            "registered evaluation graph"
        );
        builder.context
    }

    pub fn add_value(&mut self, id: &str, value: Value) {
        self.values.get_mut().insert(id.to_string(), Rc::new(value));
    }

    pub fn add_thunk(&mut self, id: &str, thunk: Thunk) {
        self.thunks.insert(id.to_string(), thunk);
    }

    pub fn thunk(&self, id: &str) -> Option<&Thunk> {
        self.thunks.get(id)
    }

    /// Compute (or fetch the cached) value of a node.
    ///
    /// `Ok(None)` means the node cannot be evaluated: it has no thunk, or one
    /// of its dependencies has no value.
    pub fn evaluate(&self, id: &str) -> Result<Option<Rc<Value>>, EvaluationError> {
        let cached = self.values.borrow().get(id).cloned();
        if let Some(value) = cached {
            return Ok(Some(value));
        }
        let Some(thunk) = self.thunks.get(id) else {
            debug!(id, "no thunk registered");
            return Ok(None);
        };
        if !self.in_progress.borrow_mut().insert(id.to_string()) {
            return Err(EvaluationError::CyclicDependency(id.to_string()));
        }
        let result = self.run(thunk);
        self.in_progress.borrow_mut().remove(id);

        let value = result?;
        if let Some(value) = &value {
            self.values
                .borrow_mut()
                .insert(id.to_string(), Rc::clone(value));
        }
        Ok(value)
    }

    fn run(&self, thunk: &Thunk) -> Result<Option<Rc<Value>>, EvaluationError> {
        let mut values = Vec::with_capacity(thunk.dependencies.len());
        for dependency in &thunk.dependencies {
            match self.evaluate(dependency)? {
                Some(value) => values.push(value),
                None => {
                    warn!(
                        thunk = %thunk.label,
                        %dependency,
                        "failed to evaluate dependency"
                    );
                    return Ok(None);
                }
            }
        }
        (thunk.compute)(&values).map(Some)
    }

    pub fn scope(&self) -> &ScopeContext {
        &self.scope
    }

    /// Whether `id` comes from (or refers to) the standard library.
    pub fn is_from_initial_scope(&self, id: &str) -> bool {
        self.scope.is_from_initial_scope(id)
    }

    /// The pattern an identifier refers to.
    pub fn get_pattern(&self, identifier_id: &str) -> Option<&str> {
        self.scope.pattern_for(identifier_id)
    }
}

/// Pattern referenced by an identifier or member expression.
fn referenced_pattern<'s>(scope: &'s ScopeContext, expression: &Expression) -> Option<&'s str> {
    match expression {
        Expression::IdentifierExpression(e) => scope.pattern_for(&e.identifier.id),
        Expression::MemberExpression(e) => scope.pattern_for(&e.id),
        _ => None,
    }
}

fn detach(values: &[Rc<Value>]) -> Vec<Value> {
    values.iter().map(|value| (**value).clone()).collect()
}

fn compare(op: &BinaryOperator, left: &Value, right: &Value) -> Value {
    let ordering = match (&left.memory, &right.memory) {
        (Memory::Number(a), Memory::Number(b)) => a.partial_cmp(b),
        (Memory::String(a), Memory::String(b)) => Some(a.cmp(b)),
        (Memory::Bool(a), Memory::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    };
    let result = match op {
        BinaryOperator::IsEqualTo { .. } => left.memory == right.memory,
        BinaryOperator::IsNotEqualTo { .. } => left.memory != right.memory,
        BinaryOperator::IsLessThan { .. } => ordering == Some(Ordering::Less),
        BinaryOperator::IsGreaterThan { .. } => ordering == Some(Ordering::Greater),
        BinaryOperator::IsLessThanOrEqual { .. } => {
            matches!(ordering, Some(Ordering::Less | Ordering::Equal))
        }
        BinaryOperator::IsGreaterThanOrEqual { .. } => {
            matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
        }
        BinaryOperator::SetEqualTo { .. } => return Value::unit(),
    };
    Value::bool(result)
}

struct EvaluationBuilder<'a, 'c> {
    root: Node<'a>,
    context: EvaluationContext,
    unification: &'c UnificationContext,
    substitution: &'c Substitution,
    intrinsics: Rc<Intrinsics>,
}

impl EvaluationBuilder<'_, '_> {
    fn node_type(&self, id: &str) -> Unification {
        self.unification
            .nodes
            .get(id)
            .map(|ty| self.substitution.apply(ty))
            .unwrap_or_else(Unification::void)
    }

    fn pattern_type(&self, id: &str) -> Unification {
        self.unification
            .pattern_types
            .get(id)
            .map(|ty| self.substitution.apply(ty))
            .unwrap_or_else(Unification::void)
    }

    fn literal(&mut self, literal: &Literal) {
        let value = match literal {
            Literal::None { .. } => Value::unit(),
            Literal::Boolean { value, .. } => Value::bool(*value),
            Literal::Number { value, .. } => Value::number(*value),
            Literal::String { value, .. } => Value::string(value),
            Literal::Color { value, .. } => Value::color(value),
            Literal::Array { id, value } => {
                let dependencies = value
                    .iter()
                    .filter(|element| !element.is_placeholder())
                    .map(|element| element.id().to_string())
                    .collect();
                let ty = self.node_type(id);
                self.context.add_thunk(
                    id,
                    Thunk::new("array", dependencies, move |values| {
                        Ok(Rc::new(Value::new(ty.clone(), Memory::Array(detach(values)))))
                    }),
                );
                return;
            }
        };
        self.context.add_value(literal.id(), value);
    }

    fn expression(&mut self, expression: &Expression) {
        match expression {
            Expression::LiteralExpression(e) => {
                self.context
                    .add_thunk(&e.id, Thunk::alias("literal", e.literal.id()));
            }
            Expression::IdentifierExpression(e) => {
                let scope = Rc::clone(&self.context.scope);
                if let Some(pattern) = scope.pattern_for(&e.identifier.id) {
                    self.context
                        .add_thunk(&e.identifier.id, Thunk::alias("identifier", pattern));
                    self.context
                        .add_thunk(&e.id, Thunk::alias("identifierExpression", pattern));
                }
            }
            Expression::MemberExpression(e) => {
                let scope = Rc::clone(&self.context.scope);
                if let Some(pattern) = scope.pattern_for(&e.id) {
                    self.context
                        .add_thunk(&e.id, Thunk::alias("memberExpression", pattern));
                }
            }
            Expression::FunctionCallExpression(e) => self.function_call(
                &e.id,
                &e.expression,
                &e.arguments,
            ),
            Expression::BinaryExpression(e) => {
                if e.left.is_placeholder() || e.right.is_placeholder() {
                    return;
                }
                let op = e.op.clone();
                self.context.add_thunk(
                    &e.id,
                    Thunk::new(
                        format!("binaryExpression {}", op.symbol()),
                        vec![e.left.id().to_string(), e.right.id().to_string()],
                        move |values| match values {
                            [left, right] => Ok(Rc::new(compare(&op, left, right))),
                            _ => Err(EvaluationError::Internal(
                                "binary expression needs two operands".to_string(),
                            )),
                        },
                    ),
                );
            }
            Expression::Placeholder { .. } => {}
        }
    }

    fn function_call(
        &mut self,
        id: &str,
        callee: &Expression,
        arguments: &[FunctionCallArgument],
    ) {
        let callee_type = self.node_type(callee.id());
        if !callee_type.is_function() {
            warn!(id, callee = %callee_type, "callee is not a function");
            return;
        }

        let mut dependencies = vec![callee.id().to_string()];
        let mut labels = Vec::new();
        for argument in arguments {
            if let FunctionCallArgument::Argument(argument) = argument
                && !argument.expression.is_placeholder()
            {
                dependencies.push(argument.expression.id().to_string());
                labels.push(argument.label.clone());
            }
        }

        // Native functions take their arguments in parameter order.
        let parameter_order: Vec<usize> = match &callee_type {
            Unification::Function { arguments, .. } => arguments
                .iter()
                .enumerate()
                .filter_map(|(index, parameter)| match &parameter.label {
                    Some(label) => labels
                        .iter()
                        .position(|given| given.as_deref() == Some(label.as_str())),
                    None => (index < labels.len()).then_some(index),
                })
                .collect(),
            _ => Vec::new(),
        };

        let return_type = self.node_type(id);
        let from_initial_scope = referenced_pattern(&self.context.scope, callee)
            .is_some_and(|pattern| self.context.scope.is_from_initial_scope(pattern));
        let intrinsics = Rc::clone(&self.intrinsics);

        let compute = move |values: &[Rc<Value>]| -> Result<Rc<Value>, EvaluationError> {
            let Some((callee, arguments)) = values.split_first() else {
                return Err(EvaluationError::Internal("call without callee".to_string()));
            };
            let Memory::Function(function) = &callee.memory else {
                warn!(callee = %callee.ty, "called value is not a function");
                return Ok(Rc::new(Value::unit()));
            };
            match function {
                FunctionMemory::Path(path) => {
                    let name = path.join(".");
                    if let Some(intrinsic) = intrinsics.get(&name) {
                        let ordered: Vec<Value> = parameter_order
                            .iter()
                            .filter_map(|index| arguments.get(*index))
                            .map(|value| (**value).clone())
                            .collect();
                        return intrinsic.call(&name, &ordered).map(Rc::new);
                    }
                    if from_initial_scope {
                        error!(function = %name, "unknown function");
                    } else {
                        debug!(function = %name, "calls to user functions are not evaluated");
                    }
                    Ok(Rc::new(Value::unit()))
                }
                FunctionMemory::EnumInit(tag) => Ok(Rc::new(Value::new(
                    return_type.clone(),
                    Memory::Enum {
                        tag: tag.clone(),
                        data: detach(arguments),
                    },
                ))),
                FunctionMemory::RecordInit(fields) => {
                    let mut record = BTreeMap::new();
                    for (name, field) in fields {
                        let argument = labels
                            .iter()
                            .position(|label| label.as_deref() == Some(name.as_str()))
                            .and_then(|index| arguments.get(index));
                        match (argument, &field.default) {
                            (Some(value), _) => {
                                record.insert(name.clone(), (**value).clone());
                            }
                            (None, Some(default)) => {
                                record.insert(name.clone(), default.clone());
                            }
                            (None, None) => {}
                        }
                    }
                    Ok(Rc::new(Value::new(return_type.clone(), Memory::Record(record))))
                }
            }
        };
        self.context
            .add_thunk(id, Thunk::new("functionCallExpression", dependencies, compute));
    }

    fn declaration(&mut self, declaration: &Declaration) {
        match declaration {
            Declaration::Variable(d) => {
                if let Some(initializer) = &d.initializer
                    && !initializer.is_placeholder()
                {
                    self.context
                        .add_thunk(&d.name.id, Thunk::alias("variable", initializer.id()));
                }
            }
            Declaration::Function(d) => {
                let path = declaration_path_to(self.root, &d.id);
                let ty = self.pattern_type(&d.name.id);
                self.context.add_value(
                    &d.name.id,
                    Value::new(ty, Memory::Function(FunctionMemory::Path(path))),
                );
            }
            Declaration::Record(d) => {
                let mut dependencies = Vec::new();
                let mut fields = Vec::new();
                for member in &d.declarations {
                    let Declaration::Variable(variable) = member else {
                        continue;
                    };
                    let default = match &variable.initializer {
                        Some(initializer) if !initializer.is_placeholder() => {
                            dependencies.push(initializer.id().to_string());
                            Some(dependencies.len() - 1)
                        }
                        _ => None,
                    };
                    fields.push((
                        variable.name.name.clone(),
                        self.pattern_type(&variable.name.id),
                        default,
                    ));
                }
                let ty = self.pattern_type(&d.name.id);
                self.context.add_thunk(
                    &d.name.id,
                    Thunk::new(format!("record {}", d.name.name), dependencies, move |values| {
                        let fields = fields
                            .iter()
                            .map(|(name, ty, default)| {
                                let field = RecordField {
                                    ty: ty.clone(),
                                    default: default
                                        .and_then(|index| values.get(index))
                                        .map(|value| (**value).clone()),
                                };
                                (name.clone(), field)
                            })
                            .collect();
                        Ok(Rc::new(Value::new(
                            ty.clone(),
                            Memory::Function(FunctionMemory::RecordInit(fields)),
                        )))
                    }),
                );
            }
            Declaration::Enumeration(d) => {
                for case in &d.cases {
                    if let EnumerationCase::EnumerationCase(case) = case {
                        let ty = self.pattern_type(&case.name.id);
                        self.context.add_value(
                            &case.name.id,
                            Value::new(
                                ty,
                                Memory::Function(FunctionMemory::EnumInit(case.name.name.clone())),
                            ),
                        );
                    }
                }
            }
            Declaration::Namespace(_)
            | Declaration::ImportDeclaration(_)
            | Declaration::Placeholder { .. } => {}
        }
    }
}

impl<'a> Visitor<'a> for EvaluationBuilder<'_, '_> {
    fn visit(&mut self, node: Node<'a>, _visit: Visit) -> Flow {
        match node {
            Node::Literal(literal) => self.literal(literal),
            Node::Expression(expression) => self.expression(expression),
            Node::Declaration(declaration) => self.declaration(declaration),
            _ => {}
        }
        Flow::CONTINUE
    }
}
