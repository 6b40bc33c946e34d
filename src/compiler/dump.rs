//! Pretty-printers for the AST, solved types and evaluated values.
//!
//! This module provides human-readable output for debugging the pipeline.

use crate::compiler::ast::{Literal, Node, Program};
use crate::compiler::evaluate::{FunctionMemory, Memory, Value};
use crate::compiler::scope::ScopeContext;
use crate::compiler::types::{Substitution, Unification};
use crate::compiler::unify::UnificationContext;
use std::collections::BTreeMap;

/// Node id to solved type.
pub type NodeTypeMap = BTreeMap<String, Unification>;

/// Solved type of every typed node.
pub fn node_types(unification: &UnificationContext, substitution: &Substitution) -> NodeTypeMap {
    unification
        .nodes
        .iter()
        .map(|(id, ty)| (id.clone(), substitution.apply(ty)))
        .collect()
}

/// Pretty-printer for the AST with optional type information.
pub struct AstPrinter<'a> {
    output: String,
    type_map: Option<&'a NodeTypeMap>,
}

impl<'a> AstPrinter<'a> {
    pub fn new() -> Self {
        Self {
            output: String::new(),
            type_map: None,
        }
    }

    pub fn with_types(mut self, type_map: &'a NodeTypeMap) -> Self {
        self.type_map = Some(type_map);
        self
    }

    pub fn print_program(&mut self, program: &Program) -> &str {
        self.print_root(Node::Program(program))
    }

    pub fn print_root(&mut self, root: Node<'_>) -> &str {
        let label = self.label(root);
        self.write(&label);
        self.newline();
        self.print_children(root, "");
        &self.output
    }

    fn print_children(&mut self, node: Node<'_>, parent_prefix: &str) {
        let children = node.sub_nodes().nodes;
        for (i, child) in children.iter().enumerate() {
            let is_last = i == children.len() - 1;
            let prefix = if is_last { "└── " } else { "├── " };
            let child_prefix = if is_last { "    " } else { "│   " };
            let label = self.label(*child);
            self.write(parent_prefix);
            self.write(prefix);
            self.write(&label);
            self.newline();
            self.print_children(*child, &format!("{}{}", parent_prefix, child_prefix));
        }
    }

    fn label(&self, node: Node<'_>) -> String {
        let mut label = node.kind().to_string();
        if let Some(pattern) = node.pattern() {
            label.push_str(&format!(" {}", pattern.name));
        } else if let Some(identifier) = node.identifier() {
            label.push_str(&format!(" {}", identifier.string));
        }
        match node {
            Node::Literal(Literal::Boolean { value, .. }) => label.push_str(&format!(" {}", value)),
            Node::Literal(Literal::Number { value, .. }) => label.push_str(&format!(" {}", value)),
            Node::Literal(Literal::String { value, .. }) => {
                label.push_str(&format!(" {:?}", value))
            }
            Node::Literal(Literal::Color { value, .. }) => label.push_str(&format!(" {}", value)),
            Node::BinaryOperator(op) => label.push_str(&format!(" {}", op.symbol())),
            _ => {}
        }
        if let Some(ty) = self.type_map.and_then(|types| types.get(node.id())) {
            label.push_str(&format!(" : {}", ty));
        }
        label
    }

    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }

    fn newline(&mut self) {
        self.output.push('\n');
    }
}

impl Default for AstPrinter<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a program as a pretty-printed AST string.
pub fn format_ast(program: &Program) -> String {
    let mut printer = AstPrinter::new();
    printer.print_program(program).to_string()
}

/// Format a program as a pretty-printed AST string with type information.
pub fn format_ast_with_types(program: &Program, type_map: &NodeTypeMap) -> String {
    let mut printer = AstPrinter::new().with_types(type_map);
    printer.print_program(program).to_string()
}

/// `name: type` for every declared pattern, sorted by name.
pub fn format_pattern_types(
    scope: &ScopeContext,
    unification: &UnificationContext,
    substitution: &Substitution,
) -> String {
    let mut lines: Vec<String> = unification
        .pattern_types
        .iter()
        .map(|(id, ty)| {
            let name = scope
                .pattern_to_name
                .get(id)
                .or_else(|| scope.pattern_to_type_name.get(id))
                .map(String::as_str)
                .unwrap_or(id.as_str());
            format!("{}: {}", name, substitution.apply(ty))
        })
        .collect();
    lines.sort();
    lines.join("\n")
}

/// Format a value the way it would be written in source.
pub fn format_value(value: &Value) -> String {
    if let Some(css) = value.as_color() {
        return css.to_string();
    }
    match &value.memory {
        Memory::Unit => "()".to_string(),
        Memory::Bool(b) => b.to_string(),
        Memory::Number(n) => n.to_string(),
        Memory::String(s) => format!("{:?}", s),
        Memory::Array(values) => {
            let values: Vec<String> = values.iter().map(format_value).collect();
            format!("[{}]", values.join(", "))
        }
        Memory::Enum { tag, data } => {
            if data.is_empty() {
                format!("{}.{}", type_name(&value.ty), tag)
            } else {
                let data: Vec<String> = data.iter().map(format_value).collect();
                format!("{}.{}({})", type_name(&value.ty), tag, data.join(", "))
            }
        }
        Memory::Record(fields) => {
            let fields: Vec<String> = fields
                .iter()
                .map(|(name, field)| format!("{}: {}", name, format_value(field)))
                .collect();
            format!("{}({})", type_name(&value.ty), fields.join(", "))
        }
        Memory::Function(FunctionMemory::Path(path)) => format!("<function {}>", path.join(".")),
        Memory::Function(FunctionMemory::RecordInit(_)) => {
            format!("<constructor {}>", value.ty)
        }
        Memory::Function(FunctionMemory::EnumInit(tag)) => format!("<case {}>", tag),
    }
}

fn type_name(ty: &Unification) -> String {
    match ty {
        Unification::Constant { name, .. } => name.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::*;
    use crate::compiler::unify::unify;

    fn sample() -> Program {
        Program::new(vec![Statement::declaration(Declaration::variable(
            "answer",
            Some(TypeAnnotation::named("Number", vec![])),
            Some(Expression::literal(Literal::number(42.0))),
        ))])
    }

    #[test]
    fn test_format_ast() {
        let output = format_ast(&sample());
        let expected = "\
program
└── declaration
    └── variable answer
        ├── typeIdentifier Number
        └── literalExpression
            └── number 42
";
        assert_eq!(output, expected);
    }

    #[test]
    fn test_format_ast_with_types() {
        let program = sample();
        let scope = ScopeContext::build(Node::Program(&program), None);
        let unification = UnificationContext::build(Node::Program(&program), &scope);
        let substitution = unify(&unification.constraints).unwrap();
        let types = node_types(&unification, &substitution);
        let output = format_ast_with_types(&program, &types);
        assert!(output.contains("literalExpression : Number"));
        assert!(output.contains("number 42 : Number"));
        assert_eq!(
            format_pattern_types(&scope, &unification, &substitution),
            "answer: Number"
        );
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(&Value::number(1.5)), "1.5");
        assert_eq!(format_value(&Value::string("hi")), "\"hi\"");
        assert_eq!(format_value(&Value::color("#FF0000")), "#FF0000");
        let some = Value::new(
            Unification::optional(Unification::number()),
            Memory::Enum {
                tag: "value".to_string(),
                data: vec![Value::number(5.0)],
            },
        );
        assert_eq!(format_value(&some), "Optional.value(5)");
        let point = Value::new(
            Unification::constant("Point", vec![]),
            Memory::Record(BTreeMap::from([
                ("x".to_string(), Value::number(1.0)),
                ("y".to_string(), Value::bool(true)),
            ])),
        );
        assert_eq!(format_value(&point), "Point(x: 1, y: true)");
    }
}
