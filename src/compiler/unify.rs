//! Type inference by unification.
//!
//! [`UnificationContext::build`] assigns a type term to every expression and
//! pattern and records equality constraints between them. [`unify`] solves
//! the constraints into a [`Substitution`].

use super::ast::{
    BinaryOperator, Declaration, EnumerationCase, Expression, FunctionCallArgument,
    FunctionParameter, GenericParameter, Identifier, Literal, Node, Statement, TypeAnnotation,
};
use super::scope::ScopeContext;
use super::traversal::{Flow, Order, Visit, Visitor, walk};
use super::types::{FunctionArgument, NameGenerator, Substitution, Unification};
use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use tracing::{trace, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct Constraint {
    pub head: Unification,
    pub tail: Unification,
}

impl Constraint {
    pub fn new(head: Unification, tail: Unification) -> Self {
        Self { head, tail }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum UnificationError {
    #[error("type mismatch: `{head}` is not `{tail}`")]
    NameMismatch { head: Unification, tail: Unification },
    #[error("kind mismatch: cannot unify `{head}` with `{tail}`")]
    KindMismatch { head: Unification, tail: Unification },
    #[error("`{head}` and `{tail}` have a different number of arguments")]
    GenericArgumentsCountMismatch { head: Unification, tail: Unification },
    #[error("`{head}` and `{tail}` mix labeled and unlabeled arguments")]
    GenericArgumentsLabelMismatch { head: Unification, tail: Unification },
    #[error("type variable `{variable}` occurs in `{ty}`")]
    InfiniteType { variable: String, ty: Unification },
}

/// Types and constraints collected from one program.
#[derive(Debug, Clone, Default)]
pub struct UnificationContext {
    /// Node id to the type of that node.
    pub nodes: HashMap<String, Unification>,
    /// Pattern id to the type of the binding.
    pub pattern_types: HashMap<String, Unification>,
    pub constraints: Vec<Constraint>,
    names: NameGenerator,
}

/// Generic parameter names in scope, paired with their generated names.
type Generics = Vec<(String, String)>;

impl UnificationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(root: Node<'_>, scope: &ScopeContext) -> Self {
        let mut builder = UnificationBuilder {
            context: UnificationContext::new(),
            scope,
        };
        walk(root, Order::PreOrder, &mut builder);
        trace!(
            nodes = builder.context.nodes.len(),
            constraints = builder.context.constraints.len(),
            "collected type constraints"
        );
        builder.context
    }

    pub fn fresh_variable(&mut self) -> Unification {
        Unification::Variable {
            name: self.names.next_name(),
        }
    }

    fn node_type(&mut self, id: &str) -> Unification {
        match self.nodes.get(id) {
            Some(ty) => ty.clone(),
            None => self.fresh_variable(),
        }
    }

    fn constrain(&mut self, head: Unification, tail: Unification) {
        self.constraints.push(Constraint::new(head, tail));
    }

    fn generics_in_scope(&mut self, parameters: &[GenericParameter]) -> Generics {
        parameters
            .iter()
            .filter_map(|parameter| match parameter {
                GenericParameter::Parameter { name, .. } => {
                    Some((name.name.clone(), self.names.next_name()))
                }
                GenericParameter::Placeholder { .. } => None,
            })
            .collect()
    }

    /// Convert a written annotation into a type term.
    pub fn unification_type(
        &mut self,
        annotation: &TypeAnnotation,
        generics: &[(String, String)],
    ) -> Unification {
        match annotation {
            TypeAnnotation::TypeIdentifier(t) => {
                if t.identifier.is_placeholder {
                    return self.fresh_variable();
                }
                if let Some((_, generated)) =
                    generics.iter().find(|(name, _)| *name == t.identifier.string)
                {
                    return Unification::generic(generated);
                }
                let parameters = t
                    .generic_arguments
                    .iter()
                    .map(|argument| self.unification_type(argument, generics))
                    .collect();
                Unification::constant(&t.identifier.string, parameters)
            }
            TypeAnnotation::FunctionType(t) => {
                let arguments = t
                    .argument_types
                    .iter()
                    .map(|argument| FunctionArgument::unlabeled(self.unification_type(argument, generics)))
                    .collect();
                let return_type = self.unification_type(&t.return_type, generics);
                Unification::function(arguments, return_type)
            }
            TypeAnnotation::Placeholder { .. } => self.fresh_variable(),
        }
    }
}

fn generic_arguments(generics: &Generics) -> Vec<Unification> {
    generics
        .iter()
        .map(|(_, generated)| Unification::generic(generated))
        .collect()
}

struct UnificationBuilder<'s> {
    context: UnificationContext,
    scope: &'s ScopeContext,
}

impl UnificationBuilder<'_> {
    fn reference_type(&mut self, identifier_id: &str) -> Unification {
        let declared = self
            .scope
            .pattern_for(identifier_id)
            .and_then(|pattern| self.context.pattern_types.get(pattern))
            .cloned();
        match declared {
            Some(ty) => ty.replace_generics_with_vars(&mut self.context.names),
            None => self.context.fresh_variable(),
        }
    }

    fn identifier_type(&mut self, identifier: &Identifier) -> Unification {
        if identifier.is_placeholder {
            return self.context.fresh_variable();
        }
        self.reference_type(&identifier.id)
    }

    fn enter(&mut self, node: Node<'_>) -> Flow {
        match node {
            Node::TypeAnnotation(_) => Flow::SKIP_CHILDREN,
            Node::Expression(Expression::MemberExpression(_)) => Flow::SKIP_CHILDREN.and_revisit(),
            Node::Declaration(Declaration::Record(record)) => {
                let generics = self.context.generics_in_scope(&record.generic_parameters);
                let mut arguments = Vec::new();
                for member in &record.declarations {
                    let Declaration::Variable(variable) = member else {
                        continue;
                    };
                    let ty = match &variable.annotation {
                        Some(annotation) => self.context.unification_type(annotation, &generics),
                        None => self.context.fresh_variable(),
                    };
                    self.context
                        .pattern_types
                        .insert(variable.name.id.clone(), ty.clone());
                    arguments.push(FunctionArgument::labeled(&variable.name.name, ty));
                }
                let record_type = Unification::function(
                    arguments,
                    Unification::constant(&record.name.name, generic_arguments(&generics)),
                );
                self.context
                    .pattern_types
                    .insert(record.name.id.clone(), record_type);
                Flow::REVISIT
            }
            Node::Declaration(Declaration::Enumeration(enumeration)) => {
                let generics = self.context.generics_in_scope(&enumeration.generic_parameters);
                let enumeration_type =
                    Unification::constant(&enumeration.name.name, generic_arguments(&generics));
                for case in &enumeration.cases {
                    let EnumerationCase::EnumerationCase(case) = case else {
                        continue;
                    };
                    let arguments = case
                        .associated_value_types
                        .iter()
                        .map(|ty| FunctionArgument::unlabeled(self.context.unification_type(ty, &generics)))
                        .collect();
                    self.context.pattern_types.insert(
                        case.name.id.clone(),
                        Unification::function(arguments, enumeration_type.clone()),
                    );
                }
                self.context
                    .pattern_types
                    .insert(enumeration.name.id.clone(), enumeration_type);
                Flow::REVISIT
            }
            Node::Declaration(Declaration::Function(function)) => {
                let generics = self.context.generics_in_scope(&function.generic_parameters);
                let mut arguments = Vec::new();
                for parameter in &function.parameters {
                    let FunctionParameter::Parameter(parameter) = parameter else {
                        continue;
                    };
                    // Parameter annotations do not see the function's generics.
                    let ty = self.context.unification_type(&parameter.annotation, &[]);
                    self.context
                        .pattern_types
                        .insert(parameter.local_name.id.clone(), ty.clone());
                    arguments.push(FunctionArgument::labeled(&parameter.local_name.name, ty));
                }
                let return_type = self.context.unification_type(&function.return_type, &generics);
                self.context.pattern_types.insert(
                    function.name.id.clone(),
                    Unification::function(arguments, return_type),
                );
                Flow::REVISIT
            }
            Node::Statement(Statement::Loop(statement)) => {
                let element = self.context.fresh_variable();
                self.context
                    .pattern_types
                    .insert(statement.pattern.id.clone(), element.clone());
                self.context.nodes.insert(statement.pattern.id.clone(), element);
                Flow::REVISIT
            }
            _ => Flow::REVISIT,
        }
    }

    fn exit(&mut self, node: Node<'_>) {
        match node {
            Node::Declaration(Declaration::Variable(variable)) => {
                let Some(initializer) = &variable.initializer else {
                    return;
                };
                let annotation = match &variable.annotation {
                    None | Some(TypeAnnotation::Placeholder { .. }) => return,
                    Some(annotation) => annotation,
                };
                // Record members were typed along with their record.
                let annotation_type = match self.context.pattern_types.get(&variable.name.id) {
                    Some(ty) => ty.clone(),
                    None => self.context.unification_type(annotation, &[]),
                };
                let initializer_type = self.context.node_type(initializer.id());
                self.context
                    .constrain(annotation_type.clone(), initializer_type);
                self.context
                    .pattern_types
                    .insert(variable.name.id.clone(), annotation_type);
            }
            Node::Statement(Statement::Loop(statement)) => {
                let element = self.context.node_type(&statement.pattern.id);
                let iterated = self.context.node_type(statement.expression.id());
                self.context
                    .constrain(iterated, Unification::array(element));
            }
            Node::Statement(Statement::Branch(statement)) => {
                let condition = self.context.node_type(statement.condition.id());
                self.context.constrain(condition, Unification::boolean());
            }
            Node::Expression(expression) => self.exit_expression(expression),
            Node::Literal(literal) => self.exit_literal(literal),
            _ => {}
        }
    }

    fn exit_expression(&mut self, expression: &Expression) {
        match expression {
            Expression::IdentifierExpression(e) => {
                let ty = self.identifier_type(&e.identifier);
                self.context
                    .nodes
                    .insert(e.identifier.id.clone(), ty.clone());
                self.context.nodes.insert(e.id.clone(), ty);
            }
            Expression::MemberExpression(e) => {
                let ty = self.reference_type(&e.id);
                self.context.nodes.insert(e.id.clone(), ty);
            }
            Expression::FunctionCallExpression(e) => {
                let callee = self.context.node_type(e.expression.id());
                let mut arguments = Vec::new();
                for argument in &e.arguments {
                    let FunctionCallArgument::Argument(argument) = argument else {
                        continue;
                    };
                    let placeholder = self.context.fresh_variable();
                    let actual = self.context.node_type(argument.expression.id());
                    self.context.constrain(placeholder.clone(), actual);
                    self.context
                        .nodes
                        .insert(argument.id.clone(), placeholder.clone());
                    arguments.push(FunctionArgument {
                        label: argument.label.clone(),
                        ty: placeholder,
                    });
                }
                let return_type = self.context.fresh_variable();
                self.context.constrain(
                    callee,
                    Unification::function(arguments, return_type.clone()),
                );
                self.context.nodes.insert(e.id.clone(), return_type);
            }
            Expression::LiteralExpression(e) => {
                let ty = self.context.node_type(e.literal.id());
                self.context.nodes.insert(e.id.clone(), ty);
            }
            Expression::BinaryExpression(e) => {
                let left = self.context.node_type(e.left.id());
                let right = self.context.node_type(e.right.id());
                self.context.constrain(left, right);
                let ty = match e.op {
                    BinaryOperator::SetEqualTo { .. } => Unification::void(),
                    _ => Unification::boolean(),
                };
                self.context.nodes.insert(e.id.clone(), ty);
            }
            Expression::Placeholder { id } => {
                let ty = self.context.fresh_variable();
                self.context.nodes.insert(id.clone(), ty);
            }
        }
    }

    fn exit_literal(&mut self, literal: &Literal) {
        let ty = match literal {
            Literal::None { .. } => Unification::void(),
            Literal::Boolean { .. } => Unification::boolean(),
            Literal::Number { .. } => Unification::number(),
            Literal::String { .. } => Unification::string(),
            Literal::Color { .. } => Unification::color(),
            Literal::Array { value, .. } => {
                let element = self.context.fresh_variable();
                for item in value {
                    let item_type = self.context.node_type(item.id());
                    self.context.constrain(element.clone(), item_type);
                }
                Unification::array(element)
            }
        };
        self.context.nodes.insert(literal.id().to_string(), ty);
    }
}

impl<'a> Visitor<'a> for UnificationBuilder<'_> {
    fn visit(&mut self, node: Node<'a>, visit: Visit) -> Flow {
        match visit {
            Visit::Enter => self.enter(node),
            Visit::Exit => {
                self.exit(node);
                Flow::CONTINUE
            }
        }
    }
}

/// Solve a list of constraints.
pub fn unify(constraints: &[Constraint]) -> Result<Substitution, UnificationError> {
    let mut substitution = Substitution::new();
    let mut pending: VecDeque<Constraint> = constraints.iter().cloned().collect();

    while let Some(Constraint { head, tail }) = pending.pop_front() {
        if head == tail {
            continue;
        }

        let binding = match (&head, &tail) {
            (
                Unification::Function {
                    arguments: head_arguments,
                    return_type: head_return,
                },
                Unification::Function {
                    arguments: tail_arguments,
                    return_type: tail_return,
                },
            ) => {
                let head_labels: Vec<&str> =
                    head_arguments.iter().filter_map(|a| a.label.as_deref()).collect();
                let tail_labels: Vec<&str> =
                    tail_arguments.iter().filter_map(|a| a.label.as_deref()).collect();

                if (!head_labels.is_empty() && tail_labels.is_empty() && !tail_arguments.is_empty())
                    || (!tail_labels.is_empty()
                        && head_labels.is_empty()
                        && !head_arguments.is_empty())
                {
                    return Err(UnificationError::GenericArgumentsLabelMismatch {
                        head: head.clone(),
                        tail: tail.clone(),
                    });
                }

                if head_labels.is_empty() && tail_labels.is_empty() {
                    if head_arguments.len() != tail_arguments.len() {
                        return Err(UnificationError::GenericArgumentsCountMismatch {
                        head: head.clone(),
                        tail: tail.clone(),
                    });
                    }
                    for (h, t) in head_arguments.iter().zip(tail_arguments) {
                        pending.push_back(Constraint::new(h.ty.clone(), t.ty.clone()));
                    }
                } else {
                    for label in head_labels.iter().filter(|label| tail_labels.contains(*label)) {
                        let h = head_arguments
                            .iter()
                            .find(|a| a.label.as_deref() == Some(*label));
                        let t = tail_arguments
                            .iter()
                            .find(|a| a.label.as_deref() == Some(*label));
                        if let (Some(h), Some(t)) = (h, t) {
                            pending.push_back(Constraint::new(h.ty.clone(), t.ty.clone()));
                        }
                    }
                }
                pending.push_back(Constraint::new(
                    (**head_return).clone(),
                    (**tail_return).clone(),
                ));
                None
            }
            (
                Unification::Constant {
                    name: head_name,
                    parameters: head_parameters,
                },
                Unification::Constant {
                    name: tail_name,
                    parameters: tail_parameters,
                },
            ) => {
                if head_name != tail_name {
                    return Err(UnificationError::NameMismatch {
                        head: head.clone(),
                        tail: tail.clone(),
                    });
                }
                if head_parameters.len() != tail_parameters.len() {
                    return Err(UnificationError::GenericArgumentsCountMismatch {
                        head: head.clone(),
                        tail: tail.clone(),
                    });
                }
                for (h, t) in head_parameters.iter().zip(tail_parameters) {
                    pending.push_back(Constraint::new(h.clone(), t.clone()));
                }
                None
            }
            (Unification::Generic { .. }, _) | (_, Unification::Generic { .. }) => {
                warn!(%head, %tail, "generic type reached unification without instantiation");
                None
            }
            (Unification::Variable { name }, other) | (other, Unification::Variable { name }) => {
                Some((name.clone(), other.clone()))
            }
            (Unification::Constant { .. }, Unification::Function { .. })
            | (Unification::Function { .. }, Unification::Constant { .. }) => {
                return Err(UnificationError::KindMismatch {
                        head: head.clone(),
                        tail: tail.clone(),
                    });
            }
        };

        if let Some((variable, ty)) = binding {
            if ty.contains_variable(&variable) {
                return Err(UnificationError::InfiniteType { variable, ty });
            }
            substitution.insert(Unification::Variable { name: variable }, ty);
        }

        for constraint in pending.iter_mut() {
            constraint.head = substitution.apply(&constraint.head);
            constraint.tail = substitution.apply(&constraint.tail);
        }
    }

    Ok(substitution)
}
