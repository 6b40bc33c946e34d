//! Logic syntax tree.
//!
//! Documents arrive as JSON produced by the editor. Every node category is an
//! adjacently tagged union (`{"type": "...", "data": {...}}`), so the types in
//! this module deserialize those documents directly. Nodes are never mutated
//! after loading; components attach their results in side-tables keyed by the
//! node id instead.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Generate an id for a synthesized node.
///
/// Ids are UUID-shaped so they mix with ids coming from documents.
pub fn fresh_id() -> String {
    let n = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    format!("{:08X}-0000-4000-8000-{:012X}", std::process::id(), n)
}

/// A binding site: the name introduced by a declaration, parameter or case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub id: String,
    pub name: String,
}

impl Pattern {
    pub fn new(name: &str) -> Self {
        Self {
            id: fresh_id(),
            name: name.to_string(),
        }
    }
}

/// A use site of a name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identifier {
    pub id: String,
    pub string: String,
    /// Synthetic hole in an incomplete program. Never resolved or typed.
    #[serde(default)]
    pub is_placeholder: bool,
}

impl Identifier {
    pub fn new(name: &str) -> Self {
        Self {
            id: fresh_id(),
            string: name.to_string(),
            is_placeholder: false,
        }
    }

    pub fn placeholder() -> Self {
        Self {
            id: fresh_id(),
            string: "_".to_string(),
            is_placeholder: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Roots
// ---------------------------------------------------------------------------

/// The canonical root: an ordered block of statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub id: String,
    pub block: Vec<Statement>,
}

impl Program {
    pub fn new(block: Vec<Statement>) -> Self {
        Self {
            id: fresh_id(),
            block,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopLevelDeclarations {
    pub id: String,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopLevelParameters {
    pub id: String,
    pub parameters: Vec<FunctionParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Root {
    Program(Program),
    TopLevelDeclarations(TopLevelDeclarations),
    TopLevelParameters(TopLevelParameters),
}

/// Anything a `.logic` document may contain at its top level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TopLevelNode {
    Root(Root),
    Statement(Statement),
    Declaration(Declaration),
}

// ---------------------------------------------------------------------------
// Statements
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Statement {
    Loop(LoopStatement),
    Branch(BranchStatement),
    Declaration(DeclarationStatement),
    Expression(ExpressionStatement),
    Placeholder { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopStatement {
    pub id: String,
    pub pattern: Pattern,
    pub expression: Expression,
    pub block: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchStatement {
    pub id: String,
    pub condition: Expression,
    pub block: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclarationStatement {
    pub id: String,
    pub content: Declaration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpressionStatement {
    pub id: String,
    pub expression: Expression,
}

impl Statement {
    pub fn id(&self) -> &str {
        match self {
            Statement::Loop(s) => &s.id,
            Statement::Branch(s) => &s.id,
            Statement::Declaration(s) => &s.id,
            Statement::Expression(s) => &s.id,
            Statement::Placeholder { id } => id,
        }
    }

    pub fn declaration(content: Declaration) -> Self {
        Statement::Declaration(DeclarationStatement {
            id: fresh_id(),
            content,
        })
    }

    pub fn expression(expression: Expression) -> Self {
        Statement::Expression(ExpressionStatement {
            id: fresh_id(),
            expression,
        })
    }
}

// ---------------------------------------------------------------------------
// Declarations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Declaration {
    Variable(VariableDeclaration),
    Function(FunctionDeclaration),
    Enumeration(EnumerationDeclaration),
    Namespace(NamespaceDeclaration),
    Record(RecordDeclaration),
    ImportDeclaration(ImportDeclaration),
    Placeholder { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDeclaration {
    pub id: String,
    pub name: Pattern,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<TypeAnnotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initializer: Option<Expression>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionDeclaration {
    pub id: String,
    pub name: Pattern,
    pub return_type: TypeAnnotation,
    #[serde(default)]
    pub generic_parameters: Vec<GenericParameter>,
    pub parameters: Vec<FunctionParameter>,
    #[serde(default)]
    pub block: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerationDeclaration {
    pub id: String,
    pub name: Pattern,
    #[serde(default)]
    pub generic_parameters: Vec<GenericParameter>,
    pub cases: Vec<EnumerationCase>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceDeclaration {
    pub id: String,
    pub name: Pattern,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordDeclaration {
    pub id: String,
    pub name: Pattern,
    #[serde(default)]
    pub generic_parameters: Vec<GenericParameter>,
    pub declarations: Vec<Declaration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportDeclaration {
    pub id: String,
    pub name: Pattern,
}

impl Declaration {
    pub fn id(&self) -> &str {
        match self {
            Declaration::Variable(d) => &d.id,
            Declaration::Function(d) => &d.id,
            Declaration::Enumeration(d) => &d.id,
            Declaration::Namespace(d) => &d.id,
            Declaration::Record(d) => &d.id,
            Declaration::ImportDeclaration(d) => &d.id,
            Declaration::Placeholder { id } => id,
        }
    }

    /// The pattern bound by this declaration, if it is not a placeholder.
    pub fn pattern(&self) -> Option<&Pattern> {
        match self {
            Declaration::Variable(d) => Some(&d.name),
            Declaration::Function(d) => Some(&d.name),
            Declaration::Enumeration(d) => Some(&d.name),
            Declaration::Namespace(d) => Some(&d.name),
            Declaration::Record(d) => Some(&d.name),
            Declaration::ImportDeclaration(d) => Some(&d.name),
            Declaration::Placeholder { .. } => None,
        }
    }

    pub fn import(library: &str) -> Self {
        Declaration::ImportDeclaration(ImportDeclaration {
            id: fresh_id(),
            name: Pattern::new(library),
        })
    }

    pub fn variable(
        name: &str,
        annotation: Option<TypeAnnotation>,
        initializer: Option<Expression>,
    ) -> Self {
        Declaration::Variable(VariableDeclaration {
            id: fresh_id(),
            name: Pattern::new(name),
            annotation,
            initializer,
        })
    }

    pub fn function(
        name: &str,
        parameters: Vec<FunctionParameter>,
        return_type: TypeAnnotation,
    ) -> Self {
        Declaration::Function(FunctionDeclaration {
            id: fresh_id(),
            name: Pattern::new(name),
            return_type,
            generic_parameters: Vec::new(),
            parameters,
            block: Vec::new(),
        })
    }

    pub fn record(name: &str, generics: &[&str], declarations: Vec<Declaration>) -> Self {
        Declaration::Record(RecordDeclaration {
            id: fresh_id(),
            name: Pattern::new(name),
            generic_parameters: generics.iter().map(|g| GenericParameter::new(g)).collect(),
            declarations,
        })
    }

    pub fn enumeration(name: &str, generics: &[&str], cases: Vec<EnumerationCase>) -> Self {
        Declaration::Enumeration(EnumerationDeclaration {
            id: fresh_id(),
            name: Pattern::new(name),
            generic_parameters: generics.iter().map(|g| GenericParameter::new(g)).collect(),
            cases,
        })
    }

    pub fn namespace(name: &str, declarations: Vec<Declaration>) -> Self {
        Declaration::Namespace(NamespaceDeclaration {
            id: fresh_id(),
            name: Pattern::new(name),
            declarations,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GenericParameter {
    Parameter { id: String, name: Pattern },
    Placeholder { id: String },
}

impl GenericParameter {
    pub fn new(name: &str) -> Self {
        GenericParameter::Parameter {
            id: fresh_id(),
            name: Pattern::new(name),
        }
    }

    pub fn id(&self) -> &str {
        match self {
            GenericParameter::Parameter { id, .. } | GenericParameter::Placeholder { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum EnumerationCase {
    EnumerationCase(EnumerationCaseDeclaration),
    Placeholder { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnumerationCaseDeclaration {
    pub id: String,
    pub name: Pattern,
    #[serde(default)]
    pub associated_value_types: Vec<TypeAnnotation>,
}

impl EnumerationCase {
    pub fn new(name: &str, associated_value_types: Vec<TypeAnnotation>) -> Self {
        EnumerationCase::EnumerationCase(EnumerationCaseDeclaration {
            id: fresh_id(),
            name: Pattern::new(name),
            associated_value_types,
        })
    }

    pub fn id(&self) -> &str {
        match self {
            EnumerationCase::EnumerationCase(c) => &c.id,
            EnumerationCase::Placeholder { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum FunctionParameter {
    Parameter(Parameter),
    Placeholder { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_name: Option<String>,
    pub local_name: Pattern,
    pub annotation: TypeAnnotation,
    pub default_value: FunctionParameterDefaultValue,
}

impl FunctionParameter {
    pub fn new(name: &str, annotation: TypeAnnotation) -> Self {
        FunctionParameter::Parameter(Parameter {
            id: fresh_id(),
            external_name: None,
            local_name: Pattern::new(name),
            annotation,
            default_value: FunctionParameterDefaultValue::None { id: fresh_id() },
        })
    }

    pub fn id(&self) -> &str {
        match self {
            FunctionParameter::Parameter(p) => &p.id,
            FunctionParameter::Placeholder { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum FunctionParameterDefaultValue {
    None { id: String },
    Value { id: String, expression: Expression },
}

impl FunctionParameterDefaultValue {
    pub fn id(&self) -> &str {
        match self {
            FunctionParameterDefaultValue::None { id }
            | FunctionParameterDefaultValue::Value { id, .. } => id,
        }
    }
}

// ---------------------------------------------------------------------------
// Type annotations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum TypeAnnotation {
    TypeIdentifier(TypeIdentifier),
    FunctionType(FunctionTypeAnnotation),
    Placeholder { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypeIdentifier {
    pub id: String,
    pub identifier: Identifier,
    #[serde(default)]
    pub generic_arguments: Vec<TypeAnnotation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionTypeAnnotation {
    pub id: String,
    pub return_type: Box<TypeAnnotation>,
    pub argument_types: Vec<TypeAnnotation>,
}

impl TypeAnnotation {
    /// `Name<arguments...>`
    pub fn named(name: &str, generic_arguments: Vec<TypeAnnotation>) -> Self {
        TypeAnnotation::TypeIdentifier(TypeIdentifier {
            id: fresh_id(),
            identifier: Identifier::new(name),
            generic_arguments,
        })
    }

    pub fn id(&self) -> &str {
        match self {
            TypeAnnotation::TypeIdentifier(t) => &t.id,
            TypeAnnotation::FunctionType(t) => &t.id,
            TypeAnnotation::Placeholder { id } => id,
        }
    }
}

// ---------------------------------------------------------------------------
// Expressions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Expression {
    BinaryExpression(BinaryExpression),
    IdentifierExpression(IdentifierExpression),
    FunctionCallExpression(FunctionCallExpression),
    LiteralExpression(LiteralExpression),
    MemberExpression(MemberExpression),
    Placeholder { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryExpression {
    pub id: String,
    pub left: Box<Expression>,
    pub right: Box<Expression>,
    pub op: BinaryOperator,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentifierExpression {
    pub id: String,
    pub identifier: Identifier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCallExpression {
    pub id: String,
    pub expression: Box<Expression>,
    pub arguments: Vec<FunctionCallArgument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiteralExpression {
    pub id: String,
    pub literal: Literal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberExpression {
    pub id: String,
    pub expression: Box<Expression>,
    pub member_name: Identifier,
}

impl Expression {
    pub fn id(&self) -> &str {
        match self {
            Expression::BinaryExpression(e) => &e.id,
            Expression::IdentifierExpression(e) => &e.id,
            Expression::FunctionCallExpression(e) => &e.id,
            Expression::LiteralExpression(e) => &e.id,
            Expression::MemberExpression(e) => &e.id,
            Expression::Placeholder { id } => id,
        }
    }

    /// True for holes, including identifier expressions wrapping a placeholder identifier.
    pub fn is_placeholder(&self) -> bool {
        match self {
            Expression::Placeholder { .. } => true,
            Expression::IdentifierExpression(e) => e.identifier.is_placeholder,
            _ => false,
        }
    }

    pub fn identifier(name: &str) -> Self {
        Expression::IdentifierExpression(IdentifierExpression {
            id: fresh_id(),
            identifier: Identifier::new(name),
        })
    }

    /// `object.member`
    pub fn member(object: Expression, member: &str) -> Self {
        Expression::MemberExpression(MemberExpression {
            id: fresh_id(),
            expression: Box::new(object),
            member_name: Identifier::new(member),
        })
    }

    /// A dotted path such as `Color.saturate`.
    pub fn path(segments: &[&str]) -> Self {
        let (first, rest) = segments
            .split_first()
            .map(|(first, rest)| (*first, rest))
            .unwrap_or(("_", &[]));
        rest.iter()
            .fold(Expression::identifier(first), |object, segment| {
                Expression::member(object, segment)
            })
    }

    pub fn call(callee: Expression, arguments: Vec<FunctionCallArgument>) -> Self {
        Expression::FunctionCallExpression(FunctionCallExpression {
            id: fresh_id(),
            expression: Box::new(callee),
            arguments,
        })
    }

    pub fn literal(literal: Literal) -> Self {
        Expression::LiteralExpression(LiteralExpression {
            id: fresh_id(),
            literal,
        })
    }

    pub fn binary(left: Expression, op: BinaryOperator, right: Expression) -> Self {
        Expression::BinaryExpression(BinaryExpression {
            id: fresh_id(),
            left: Box::new(left),
            right: Box::new(right),
            op,
        })
    }

    pub fn placeholder() -> Self {
        Expression::Placeholder { id: fresh_id() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum FunctionCallArgument {
    Argument(Argument),
    Placeholder { id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Argument {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub expression: Expression,
}

impl FunctionCallArgument {
    pub fn labeled(label: &str, expression: Expression) -> Self {
        FunctionCallArgument::Argument(Argument {
            id: fresh_id(),
            label: Some(label.to_string()),
            expression,
        })
    }

    pub fn unlabeled(expression: Expression) -> Self {
        FunctionCallArgument::Argument(Argument {
            id: fresh_id(),
            label: None,
            expression,
        })
    }

    pub fn id(&self) -> &str {
        match self {
            FunctionCallArgument::Argument(a) => &a.id,
            FunctionCallArgument::Placeholder { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum BinaryOperator {
    IsEqualTo { id: String },
    IsNotEqualTo { id: String },
    IsLessThan { id: String },
    IsGreaterThan { id: String },
    IsLessThanOrEqual { id: String },
    IsGreaterThanOrEqual { id: String },
    SetEqualTo { id: String },
}

impl BinaryOperator {
    pub fn id(&self) -> &str {
        match self {
            BinaryOperator::IsEqualTo { id }
            | BinaryOperator::IsNotEqualTo { id }
            | BinaryOperator::IsLessThan { id }
            | BinaryOperator::IsGreaterThan { id }
            | BinaryOperator::IsLessThanOrEqual { id }
            | BinaryOperator::IsGreaterThanOrEqual { id }
            | BinaryOperator::SetEqualTo { id } => id,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOperator::IsEqualTo { .. } => "==",
            BinaryOperator::IsNotEqualTo { .. } => "!=",
            BinaryOperator::IsLessThan { .. } => "<",
            BinaryOperator::IsGreaterThan { .. } => ">",
            BinaryOperator::IsLessThanOrEqual { .. } => "<=",
            BinaryOperator::IsGreaterThanOrEqual { .. } => ">=",
            BinaryOperator::SetEqualTo { .. } => "=",
        }
    }
}

// ---------------------------------------------------------------------------
// Literals
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum Literal {
    None { id: String },
    Boolean { id: String, value: bool },
    Number { id: String, value: f64 },
    String { id: String, value: String },
    Color { id: String, value: String },
    Array { id: String, value: Vec<Expression> },
}

impl Literal {
    pub fn id(&self) -> &str {
        match self {
            Literal::None { id }
            | Literal::Boolean { id, .. }
            | Literal::Number { id, .. }
            | Literal::String { id, .. }
            | Literal::Color { id, .. }
            | Literal::Array { id, .. } => id,
        }
    }

    pub fn boolean(value: bool) -> Self {
        Literal::Boolean { id: fresh_id(), value }
    }

    pub fn number(value: f64) -> Self {
        Literal::Number { id: fresh_id(), value }
    }

    pub fn string(value: &str) -> Self {
        Literal::String {
            id: fresh_id(),
            value: value.to_string(),
        }
    }

    pub fn color(value: &str) -> Self {
        Literal::Color {
            id: fresh_id(),
            value: value.to_string(),
        }
    }

    pub fn array(value: Vec<Expression>) -> Self {
        Literal::Array { id: fresh_id(), value }
    }
}

// ---------------------------------------------------------------------------
// Node view
// ---------------------------------------------------------------------------

/// A borrowed reference to any node of the tree.
///
/// Every traversal works on this view, so adding a node kind forces each
/// component to handle it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Node<'a> {
    Program(&'a Program),
    TopLevelDeclarations(&'a TopLevelDeclarations),
    TopLevelParameters(&'a TopLevelParameters),
    Statement(&'a Statement),
    Declaration(&'a Declaration),
    Expression(&'a Expression),
    Argument(&'a FunctionCallArgument),
    Parameter(&'a FunctionParameter),
    DefaultValue(&'a FunctionParameterDefaultValue),
    GenericParameter(&'a GenericParameter),
    EnumerationCase(&'a EnumerationCase),
    TypeAnnotation(&'a TypeAnnotation),
    Literal(&'a Literal),
    BinaryOperator(&'a BinaryOperator),
}

/// Immediate children of a node, in source order.
#[derive(Debug, Default)]
pub struct SubNodes<'a> {
    pub nodes: Vec<Node<'a>>,
    pub patterns: Vec<&'a Pattern>,
    pub identifiers: Vec<&'a Identifier>,
}

/// The target of a search: a node, or a pattern/identifier inside one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Found<'a> {
    Node(Node<'a>),
    Pattern(&'a Pattern),
    Identifier(&'a Identifier),
}

impl Found<'_> {
    pub fn id(&self) -> &str {
        match self {
            Found::Node(node) => node.id(),
            Found::Pattern(pattern) => &pattern.id,
            Found::Identifier(identifier) => &identifier.id,
        }
    }
}

impl<'a> Node<'a> {
    pub fn id(&self) -> &'a str {
        match *self {
            Node::Program(n) => &n.id,
            Node::TopLevelDeclarations(n) => &n.id,
            Node::TopLevelParameters(n) => &n.id,
            Node::Statement(n) => n.id(),
            Node::Declaration(n) => n.id(),
            Node::Expression(n) => n.id(),
            Node::Argument(n) => n.id(),
            Node::Parameter(n) => n.id(),
            Node::DefaultValue(n) => n.id(),
            Node::GenericParameter(n) => n.id(),
            Node::EnumerationCase(n) => n.id(),
            Node::TypeAnnotation(n) => n.id(),
            Node::Literal(n) => n.id(),
            Node::BinaryOperator(n) => n.id(),
        }
    }

    /// The JSON tag of this node kind.
    pub fn kind(&self) -> &'static str {
        match *self {
            Node::Program(_) => "program",
            Node::TopLevelDeclarations(_) => "topLevelDeclarations",
            Node::TopLevelParameters(_) => "topLevelParameters",
            Node::Statement(s) => match s {
                Statement::Loop(_) => "loop",
                Statement::Branch(_) => "branch",
                Statement::Declaration(_) => "declaration",
                Statement::Expression(_) => "expression",
                Statement::Placeholder { .. } => "placeholder",
            },
            Node::Declaration(d) => match d {
                Declaration::Variable(_) => "variable",
                Declaration::Function(_) => "function",
                Declaration::Enumeration(_) => "enumeration",
                Declaration::Namespace(_) => "namespace",
                Declaration::Record(_) => "record",
                Declaration::ImportDeclaration(_) => "importDeclaration",
                Declaration::Placeholder { .. } => "placeholder",
            },
            Node::Expression(e) => match e {
                Expression::BinaryExpression(_) => "binaryExpression",
                Expression::IdentifierExpression(_) => "identifierExpression",
                Expression::FunctionCallExpression(_) => "functionCallExpression",
                Expression::LiteralExpression(_) => "literalExpression",
                Expression::MemberExpression(_) => "memberExpression",
                Expression::Placeholder { .. } => "placeholder",
            },
            Node::Argument(a) => match a {
                FunctionCallArgument::Argument(_) => "argument",
                FunctionCallArgument::Placeholder { .. } => "placeholder",
            },
            Node::Parameter(p) => match p {
                FunctionParameter::Parameter(_) => "parameter",
                FunctionParameter::Placeholder { .. } => "placeholder",
            },
            Node::DefaultValue(v) => match v {
                FunctionParameterDefaultValue::None { .. } => "none",
                FunctionParameterDefaultValue::Value { .. } => "value",
            },
            Node::GenericParameter(g) => match g {
                GenericParameter::Parameter { .. } => "parameter",
                GenericParameter::Placeholder { .. } => "placeholder",
            },
            Node::EnumerationCase(c) => match c {
                EnumerationCase::EnumerationCase(_) => "enumerationCase",
                EnumerationCase::Placeholder { .. } => "placeholder",
            },
            Node::TypeAnnotation(t) => match t {
                TypeAnnotation::TypeIdentifier(_) => "typeIdentifier",
                TypeAnnotation::FunctionType(_) => "functionType",
                TypeAnnotation::Placeholder { .. } => "placeholder",
            },
            Node::Literal(l) => match l {
                Literal::None { .. } => "none",
                Literal::Boolean { .. } => "boolean",
                Literal::Number { .. } => "number",
                Literal::String { .. } => "string",
                Literal::Color { .. } => "color",
                Literal::Array { .. } => "array",
            },
            Node::BinaryOperator(op) => match op {
                BinaryOperator::IsEqualTo { .. } => "isEqualTo",
                BinaryOperator::IsNotEqualTo { .. } => "isNotEqualTo",
                BinaryOperator::IsLessThan { .. } => "isLessThan",
                BinaryOperator::IsGreaterThan { .. } => "isGreaterThan",
                BinaryOperator::IsLessThanOrEqual { .. } => "isLessThanOrEqual",
                BinaryOperator::IsGreaterThanOrEqual { .. } => "isGreaterThanOrEqual",
                BinaryOperator::SetEqualTo { .. } => "setEqualTo",
            },
        }
    }

    /// The binding site carried by this node, if any.
    pub fn pattern(&self) -> Option<&'a Pattern> {
        match *self {
            Node::Declaration(d) => d.pattern(),
            Node::Statement(Statement::Loop(s)) => Some(&s.pattern),
            Node::Parameter(FunctionParameter::Parameter(p)) => Some(&p.local_name),
            Node::GenericParameter(GenericParameter::Parameter { name, .. }) => Some(name),
            Node::EnumerationCase(EnumerationCase::EnumerationCase(c)) => Some(&c.name),
            _ => None,
        }
    }

    /// The name reference carried by this node, if any.
    pub fn identifier(&self) -> Option<&'a Identifier> {
        match *self {
            Node::Expression(Expression::IdentifierExpression(e)) => Some(&e.identifier),
            Node::Expression(Expression::MemberExpression(e)) => Some(&e.member_name),
            Node::TypeAnnotation(TypeAnnotation::TypeIdentifier(t)) => Some(&t.identifier),
            _ => None,
        }
    }

    pub fn sub_nodes(&self) -> SubNodes<'a> {
        let mut sub = SubNodes::default();
        match *self {
            Node::Program(program) => {
                sub.nodes.extend(program.block.iter().map(Node::Statement));
            }
            Node::TopLevelDeclarations(top) => {
                sub.nodes.extend(top.declarations.iter().map(Node::Declaration));
            }
            Node::TopLevelParameters(top) => {
                sub.nodes.extend(top.parameters.iter().map(Node::Parameter));
            }
            Node::Statement(statement) => match statement {
                Statement::Loop(s) => {
                    sub.patterns.push(&s.pattern);
                    sub.nodes.push(Node::Expression(&s.expression));
                    sub.nodes.extend(s.block.iter().map(Node::Statement));
                }
                Statement::Branch(s) => {
                    sub.nodes.push(Node::Expression(&s.condition));
                    sub.nodes.extend(s.block.iter().map(Node::Statement));
                }
                Statement::Declaration(s) => sub.nodes.push(Node::Declaration(&s.content)),
                Statement::Expression(s) => sub.nodes.push(Node::Expression(&s.expression)),
                Statement::Placeholder { .. } => {}
            },
            Node::Declaration(declaration) => {
                sub.patterns.extend(declaration.pattern());
                match declaration {
                    Declaration::Variable(d) => {
                        sub.nodes.extend(d.annotation.iter().map(Node::TypeAnnotation));
                        sub.nodes.extend(d.initializer.iter().map(Node::Expression));
                    }
                    Declaration::Function(d) => {
                        sub.nodes.push(Node::TypeAnnotation(&d.return_type));
                        sub.nodes
                            .extend(d.generic_parameters.iter().map(Node::GenericParameter));
                        sub.nodes.extend(d.parameters.iter().map(Node::Parameter));
                        sub.nodes.extend(d.block.iter().map(Node::Statement));
                    }
                    Declaration::Enumeration(d) => {
                        sub.nodes
                            .extend(d.generic_parameters.iter().map(Node::GenericParameter));
                        sub.nodes.extend(d.cases.iter().map(Node::EnumerationCase));
                    }
                    Declaration::Namespace(d) => {
                        sub.nodes.extend(d.declarations.iter().map(Node::Declaration));
                    }
                    Declaration::Record(d) => {
                        sub.nodes
                            .extend(d.generic_parameters.iter().map(Node::GenericParameter));
                        sub.nodes.extend(d.declarations.iter().map(Node::Declaration));
                    }
                    Declaration::ImportDeclaration(_) | Declaration::Placeholder { .. } => {}
                }
            }
            Node::Expression(expression) => match expression {
                Expression::BinaryExpression(e) => {
                    sub.nodes.push(Node::Expression(&e.left));
                    sub.nodes.push(Node::Expression(&e.right));
                    sub.nodes.push(Node::BinaryOperator(&e.op));
                }
                Expression::IdentifierExpression(e) => sub.identifiers.push(&e.identifier),
                Expression::FunctionCallExpression(e) => {
                    sub.nodes.push(Node::Expression(&e.expression));
                    sub.nodes.extend(e.arguments.iter().map(Node::Argument));
                }
                Expression::LiteralExpression(e) => sub.nodes.push(Node::Literal(&e.literal)),
                Expression::MemberExpression(e) => {
                    sub.nodes.push(Node::Expression(&e.expression));
                    sub.identifiers.push(&e.member_name);
                }
                Expression::Placeholder { .. } => {}
            },
            Node::Argument(argument) => {
                if let FunctionCallArgument::Argument(a) = argument {
                    sub.nodes.push(Node::Expression(&a.expression));
                }
            }
            Node::Parameter(parameter) => {
                if let FunctionParameter::Parameter(p) = parameter {
                    sub.patterns.push(&p.local_name);
                    sub.nodes.push(Node::TypeAnnotation(&p.annotation));
                    sub.nodes.push(Node::DefaultValue(&p.default_value));
                }
            }
            Node::DefaultValue(default_value) => {
                if let FunctionParameterDefaultValue::Value { expression, .. } = default_value {
                    sub.nodes.push(Node::Expression(expression));
                }
            }
            Node::GenericParameter(parameter) => {
                if let GenericParameter::Parameter { name, .. } = parameter {
                    sub.patterns.push(name);
                }
            }
            Node::EnumerationCase(case) => {
                if let EnumerationCase::EnumerationCase(c) = case {
                    sub.patterns.push(&c.name);
                    sub.nodes
                        .extend(c.associated_value_types.iter().map(Node::TypeAnnotation));
                }
            }
            Node::TypeAnnotation(annotation) => match annotation {
                TypeAnnotation::TypeIdentifier(t) => {
                    sub.identifiers.push(&t.identifier);
                    sub.nodes
                        .extend(t.generic_arguments.iter().map(Node::TypeAnnotation));
                }
                TypeAnnotation::FunctionType(t) => {
                    sub.nodes.push(Node::TypeAnnotation(&t.return_type));
                    sub.nodes
                        .extend(t.argument_types.iter().map(Node::TypeAnnotation));
                }
                TypeAnnotation::Placeholder { .. } => {}
            },
            Node::Literal(literal) => {
                if let Literal::Array { value, .. } = literal {
                    sub.nodes.extend(value.iter().map(Node::Expression));
                }
            }
            Node::BinaryOperator(_) => {}
        }
        sub
    }
}

impl<'a> From<&'a Program> for Node<'a> {
    fn from(program: &'a Program) -> Self {
        Node::Program(program)
    }
}

// ---------------------------------------------------------------------------
// Program utilities
// ---------------------------------------------------------------------------

/// Normalize a top-level document into a program.
///
/// Returns `None` for documents that cannot stand as a program (parameter lists).
pub fn make_program(node: TopLevelNode) -> Option<Program> {
    match node {
        TopLevelNode::Root(Root::Program(program)) => Some(program),
        TopLevelNode::Root(Root::TopLevelDeclarations(top)) => Some(Program {
            id: top.id,
            block: top
                .declarations
                .into_iter()
                .map(Statement::declaration)
                .collect(),
        }),
        TopLevelNode::Root(Root::TopLevelParameters(_)) => None,
        TopLevelNode::Statement(statement) => Some(Program::new(vec![statement])),
        TopLevelNode::Declaration(declaration) => {
            Some(Program::new(vec![Statement::declaration(declaration)]))
        }
    }
}

/// Concatenate the blocks of several programs into a new one.
pub fn join_programs(programs: impl IntoIterator<Item = Option<Program>>) -> Program {
    Program::new(
        programs
            .into_iter()
            .flatten()
            .flat_map(|program| program.block)
            .collect(),
    )
}

/// `A.B.C` as `[A, B, C]`, or `None` when the chain is not rooted in an identifier.
pub fn flattened_member_expression(expression: &Expression) -> Option<Vec<&Identifier>> {
    match expression {
        Expression::IdentifierExpression(e) => Some(vec![&e.identifier]),
        Expression::MemberExpression(e) => {
            let mut path = flattened_member_expression(&e.expression)?;
            path.push(&e.member_name);
            Some(path)
        }
        _ => None,
    }
}

/// The chain of nodes from `root` down to the node, pattern or identifier with `id`.
pub fn path_to<'a>(root: Node<'a>, id: &str) -> Option<Vec<Found<'a>>> {
    if root.id() == id {
        return Some(vec![Found::Node(root)]);
    }
    let sub = root.sub_nodes();
    if let Some(pattern) = sub.patterns.iter().copied().find(|p| p.id == id) {
        return Some(vec![Found::Node(root), Found::Pattern(pattern)]);
    }
    if let Some(identifier) = sub.identifiers.iter().copied().find(|i| i.id == id) {
        return Some(vec![Found::Node(root), Found::Identifier(identifier)]);
    }
    sub.nodes.into_iter().find_map(|child| {
        let mut path = path_to(child, id)?;
        path.insert(0, Found::Node(root));
        Some(path)
    })
}

pub fn find_node<'a>(root: Node<'a>, id: &str) -> Option<Found<'a>> {
    path_to(root, id)?.pop()
}

/// The node directly containing the node, pattern or identifier with `id`.
pub fn find_parent_node<'a>(root: Node<'a>, id: &str) -> Option<Node<'a>> {
    let mut path = path_to(root, id)?;
    path.pop();
    match path.pop()? {
        Found::Node(node) => Some(node),
        _ => None,
    }
}

/// Names of the declarations enclosing `id`, outermost first.
///
/// The declaration with `id` itself is included.
pub fn declaration_path_to(root: Node<'_>, id: &str) -> Vec<String> {
    path_to(root, id)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|found| match found {
            Found::Node(Node::Declaration(declaration)) => Some(
                declaration
                    .pattern()
                    .map(|pattern| pattern.name.clone())
                    .unwrap_or_default(),
            ),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point_record() -> Declaration {
        Declaration::record(
            "Point",
            &[],
            vec![
                Declaration::variable("x", Some(TypeAnnotation::named("Number", vec![])), None),
                Declaration::variable(
                    "y",
                    Some(TypeAnnotation::named("Number", vec![])),
                    Some(Expression::literal(Literal::number(0.0))),
                ),
            ],
        )
    }

    #[test]
    fn test_deserialize_program() {
        let json = r#"{
            "type": "program",
            "data": {
                "id": "p",
                "block": [{
                    "type": "declaration",
                    "data": {
                        "id": "s",
                        "content": {
                            "type": "variable",
                            "data": {
                                "id": "v",
                                "name": { "id": "x", "name": "x" },
                                "annotation": {
                                    "type": "typeIdentifier",
                                    "data": {
                                        "id": "t",
                                        "identifier": { "id": "ti", "string": "Number", "isPlaceholder": false },
                                        "genericArguments": []
                                    }
                                },
                                "initializer": {
                                    "type": "literalExpression",
                                    "data": {
                                        "id": "e",
                                        "literal": { "type": "number", "data": { "id": "l", "value": 5 } }
                                    }
                                }
                            }
                        }
                    }
                }]
            }
        }"#;
        let node: TopLevelNode = serde_json::from_str(json).unwrap();
        let program = make_program(node).unwrap();
        assert_eq!(program.id, "p");
        let Statement::Declaration(statement) = &program.block[0] else {
            panic!("expected a declaration statement");
        };
        let Declaration::Variable(variable) = &statement.content else {
            panic!("expected a variable");
        };
        assert_eq!(variable.name.name, "x");
        assert!(matches!(
            variable.initializer,
            Some(Expression::LiteralExpression(LiteralExpression {
                literal: Literal::Number { value, .. },
                ..
            })) if value == 5.0
        ));
    }

    #[test]
    fn test_make_program_from_declaration_list() {
        let json = r#"{
            "type": "topLevelDeclarations",
            "data": {
                "id": "top",
                "declarations": [
                    { "type": "importDeclaration", "data": { "id": "i", "name": { "id": "n", "name": "Color" } } },
                    { "type": "placeholder", "data": { "id": "ph" } }
                ]
            }
        }"#;
        let node: TopLevelNode = serde_json::from_str(json).unwrap();
        let program = make_program(node).unwrap();
        assert_eq!(program.block.len(), 2);
        assert!(program
            .block
            .iter()
            .all(|s| matches!(s, Statement::Declaration(_))));
    }

    #[test]
    fn test_make_program_rejects_parameters() {
        let node = TopLevelNode::Root(Root::TopLevelParameters(TopLevelParameters {
            id: "params".to_string(),
            parameters: vec![],
        }));
        assert!(make_program(node).is_none());
    }

    #[test]
    fn test_join_programs_skips_missing() {
        let a = Program::new(vec![Statement::declaration(Declaration::import("Prelude"))]);
        let b = Program::new(vec![Statement::declaration(Declaration::import("Color"))]);
        let joined = join_programs([Some(a.clone()), None, Some(b.clone())]);
        assert_eq!(joined.block.len(), 2);
        assert_ne!(joined.id, a.id);
        assert_ne!(joined.id, b.id);
    }

    #[test]
    fn test_sub_nodes_function_order() {
        let function = Declaration::Function(FunctionDeclaration {
            id: fresh_id(),
            name: Pattern::new("f"),
            return_type: TypeAnnotation::named("Number", vec![]),
            generic_parameters: vec![GenericParameter::new("T")],
            parameters: vec![FunctionParameter::new("a", TypeAnnotation::named("T", vec![]))],
            block: vec![Statement::expression(Expression::identifier("a"))],
        });
        let sub = Node::Declaration(&function).sub_nodes();
        let kinds: Vec<_> = sub.nodes.iter().map(|n| n.kind()).collect();
        assert_eq!(kinds, vec!["typeIdentifier", "parameter", "parameter", "expression"]);
        assert_eq!(sub.patterns[0].name, "f");
    }

    #[test]
    fn test_flattened_member_expression() {
        let expression = Expression::path(&["Color", "saturate"]);
        let path = flattened_member_expression(&expression).unwrap();
        let names: Vec<_> = path.iter().map(|i| i.string.as_str()).collect();
        assert_eq!(names, vec!["Color", "saturate"]);

        let call = Expression::call(Expression::identifier("f"), vec![]);
        assert!(flattened_member_expression(&Expression::member(call, "x")).is_none());
    }

    #[test]
    fn test_find_node_and_parent() {
        let record = point_record();
        let namespace = Declaration::namespace("Geometry", vec![record]);
        let program = Program::new(vec![Statement::declaration(namespace)]);

        let Statement::Declaration(statement) = &program.block[0] else { unreachable!() };
        let Declaration::Namespace(ns) = &statement.content else { unreachable!() };
        let Declaration::Record(record) = &ns.declarations[0] else { unreachable!() };
        let Declaration::Variable(y) = &record.declarations[1] else { unreachable!() };

        let found = find_node(Node::Program(&program), &y.name.id).unwrap();
        assert_eq!(found, Found::Pattern(&y.name));

        let parent = find_parent_node(Node::Program(&program), &y.name.id).unwrap();
        assert_eq!(parent.id(), y.id);

        assert_eq!(
            declaration_path_to(Node::Program(&program), &y.id),
            vec!["Geometry", "Point", "y"]
        );
        assert!(find_node(Node::Program(&program), "missing").is_none());
    }
}
