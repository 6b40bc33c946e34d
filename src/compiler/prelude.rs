//! Which standard library declarations a node depends on.

use super::ast::{
    Declaration, EnumerationCase, EnumerationCaseDeclaration, EnumerationDeclaration, Expression,
    NamespaceDeclaration, Node, Program, RecordDeclaration, Statement, TypeAnnotation,
};
use super::library::{LibraryError, LibraryResolver};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Top-level records, enumerations and namespaces of the libraries.
#[derive(Debug, Clone, Default)]
pub struct PreludeLibraries {
    pub records: Vec<RecordDeclaration>,
    pub enumerations: Vec<EnumerationDeclaration>,
    pub namespaces: Vec<NamespaceDeclaration>,
}

/// A library declaration referenced by some node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PreludeDeclaration<'p> {
    Record(&'p RecordDeclaration),
    Enumeration(&'p EnumerationDeclaration),
    Namespace(&'p NamespaceDeclaration),
}

impl PreludeDeclaration<'_> {
    pub fn name(&self) -> &str {
        match self {
            PreludeDeclaration::Record(d) => &d.name.name,
            PreludeDeclaration::Enumeration(d) => &d.name.name,
            PreludeDeclaration::Namespace(d) => &d.name.name,
        }
    }
}

impl PreludeLibraries {
    /// Load every library the resolver knows about.
    pub fn load(resolver: &LibraryResolver) -> Result<Self, LibraryError> {
        let programs = resolver
            .available()
            .iter()
            .map(|name| resolver.load_library(name))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_programs(programs))
    }

    pub fn from_programs(programs: impl IntoIterator<Item = Program>) -> Self {
        let mut libraries = Self::default();
        for program in programs {
            for statement in program.block {
                let Statement::Declaration(statement) = statement else {
                    continue;
                };
                match statement.content {
                    Declaration::Record(d) => libraries.records.push(d),
                    Declaration::Enumeration(d) => libraries.enumerations.push(d),
                    Declaration::Namespace(d) => libraries.namespaces.push(d),
                    Declaration::ImportDeclaration(_) | Declaration::Placeholder { .. } => {}
                    other => debug!(id = other.id(), "ignoring top-level library declaration"),
                }
            }
        }
        libraries
    }

    fn record(&self, name: &str) -> Option<&RecordDeclaration> {
        self.records.iter().find(|d| d.name.name == name)
    }

    fn enumeration(&self, name: &str) -> Option<&EnumerationDeclaration> {
        self.enumerations.iter().find(|d| d.name.name == name)
    }

    fn namespace(&self, name: &str) -> Option<&NamespaceDeclaration> {
        self.namespaces.iter().find(|d| d.name.name == name)
    }

    /// Map from node id to the library declaration the node uses.
    ///
    /// Record constructors, enum cases and namespaced members are recognized
    /// by the shape of the call or member expression referencing them.
    pub fn flag_for_prelude_dependencies<'p>(
        &'p self,
        node: Node<'_>,
    ) -> HashMap<String, PreludeDeclaration<'p>> {
        let mut dependencies = HashMap::new();
        self.flag(node, &mut dependencies);
        dependencies
    }

    fn flag<'p>(&'p self, node: Node<'_>, out: &mut HashMap<String, PreludeDeclaration<'p>>) {
        match node {
            Node::Expression(Expression::FunctionCallExpression(call)) => {
                // Only the arguments are visited: the callee is handled here.
                for argument in &call.arguments {
                    self.flag(Node::Argument(argument), out);
                }
                if let Some(found) = self.call_dependency(&call.expression) {
                    out.insert(call.id.clone(), found);
                }
            }
            Node::Expression(expression @ Expression::MemberExpression(_)) => {
                if let Some(found) = self.member_dependency(expression) {
                    out.insert(expression.id().to_string(), found);
                }
            }
            _ => {
                for child in node.sub_nodes().nodes {
                    self.flag(child, out);
                }
            }
        }
    }

    fn call_dependency(&self, callee: &Expression) -> Option<PreludeDeclaration<'_>> {
        if let Expression::IdentifierExpression(e) = callee {
            if e.identifier.is_placeholder {
                return None;
            }
            return self.record(&e.identifier.string).map(PreludeDeclaration::Record);
        }
        let (object, member) = object_and_member(callee)?;

        let enumeration = self.enumeration(object);
        if let Some(enumeration) = enumeration
            && has_case(enumeration, member, |case| {
                case.associated_value_types
                    .iter()
                    .any(|ty| !matches!(ty, TypeAnnotation::Placeholder { .. }))
            })
        {
            return Some(PreludeDeclaration::Enumeration(enumeration));
        }

        let namespace = self.namespace(object);
        if let Some(namespace) = namespace
            && namespace.declarations.iter().any(|d| {
                matches!(d, Declaration::Function(f) if f.name.name == member)
            })
        {
            return Some(PreludeDeclaration::Namespace(namespace));
        }

        if enumeration.is_some() {
            warn!("couldn't find library enum case with associated values for `{}.{}`", object, member);
        }
        if namespace.is_some() {
            warn!("couldn't find library function `{}.{}`", object, member);
        }
        None
    }

    fn member_dependency(&self, expression: &Expression) -> Option<PreludeDeclaration<'_>> {
        let (object, member) = object_and_member(expression)?;

        let enumeration = self.enumeration(object);
        if let Some(enumeration) = enumeration
            && has_case(enumeration, member, |case| {
                case.associated_value_types
                    .iter()
                    .all(|ty| matches!(ty, TypeAnnotation::Placeholder { .. }))
            })
        {
            return Some(PreludeDeclaration::Enumeration(enumeration));
        }

        let namespace = self.namespace(object);
        if let Some(namespace) = namespace
            && namespace.declarations.iter().any(|d| {
                matches!(d, Declaration::Variable(v) if v.name.name == member)
            })
        {
            return Some(PreludeDeclaration::Namespace(namespace));
        }

        if enumeration.is_some() {
            warn!("couldn't find library enum case for `{}.{}`", object, member);
        }
        if namespace.is_some() {
            warn!("couldn't find library variable `{}.{}`", object, member);
        }
        None
    }
}

/// `Object.member` where both parts are written out.
fn object_and_member(expression: &Expression) -> Option<(&str, &str)> {
    let Expression::MemberExpression(member) = expression else {
        return None;
    };
    let Expression::IdentifierExpression(object) = member.expression.as_ref() else {
        return None;
    };
    if object.identifier.is_placeholder || member.member_name.is_placeholder {
        return None;
    }
    Some((&object.identifier.string, &member.member_name.string))
}

fn has_case(
    enumeration: &EnumerationDeclaration,
    name: &str,
    predicate: impl Fn(&EnumerationCaseDeclaration) -> bool,
) -> bool {
    enumeration.cases.iter().any(|case| match case {
        EnumerationCase::EnumerationCase(case) => case.name.name == name && predicate(case),
        EnumerationCase::Placeholder { .. } => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::*;

    fn libraries() -> PreludeLibraries {
        PreludeLibraries::load(&LibraryResolver::bundled()).unwrap()
    }

    #[test]
    fn test_load_bundled() {
        let libraries = libraries();
        fn names(mut names: Vec<&str>) -> Vec<&str> {
            names.sort_unstable();
            names
        }
        assert_eq!(
            names(libraries.records.iter().map(|d| d.name.name.as_str()).collect()),
            vec!["Array", "Boolean", "Color", "Number", "Shadow", "String", "TextStyle"]
        );
        assert_eq!(
            names(libraries.enumerations.iter().map(|d| d.name.name.as_str()).collect()),
            vec!["FontWeight", "Optional"]
        );
        assert_eq!(
            names(libraries.namespaces.iter().map(|d| d.name.name.as_str()).collect()),
            vec!["Boolean", "Color", "Number", "String"]
        );
    }

    #[test]
    fn test_flags_calls() {
        let libraries = libraries();
        let shadow = Expression::call(Expression::identifier("Shadow"), vec![]);
        let saturate = Expression::call(
            Expression::path(&["Color", "saturate"]),
            vec![FunctionCallArgument::labeled(
                "color",
                Expression::literal(Literal::color("#FF0000")),
            )],
        );
        let some = Expression::call(
            Expression::path(&["Optional", "value"]),
            vec![FunctionCallArgument::unlabeled(saturate.clone())],
        );
        let program = Program::new(vec![
            Statement::expression(shadow.clone()),
            Statement::expression(some.clone()),
        ]);

        let flags = libraries.flag_for_prelude_dependencies(Node::Program(&program));
        assert_eq!(flags.len(), 3);
        assert_eq!(flags[shadow.id()].name(), "Shadow");
        assert_eq!(flags[some.id()].name(), "Optional");
        assert_eq!(flags[saturate.id()].name(), "Color");
        assert!(matches!(flags[saturate.id()], PreludeDeclaration::Namespace(_)));
    }

    #[test]
    fn test_flags_static_enum_case() {
        let libraries = libraries();
        let bold = Expression::path(&["FontWeight", "bold"]);
        let flags = libraries.flag_for_prelude_dependencies(Node::Expression(&bold));
        assert!(matches!(flags[bold.id()], PreludeDeclaration::Enumeration(_)));

        // A case with associated values is only a dependency when called.
        let value = Expression::path(&["Optional", "value"]);
        assert!(libraries
            .flag_for_prelude_dependencies(Node::Expression(&value))
            .is_empty());
    }

    #[test]
    fn test_ignores_unknown_and_placeholders() {
        let libraries = libraries();
        let program = Program::new(vec![
            Statement::expression(Expression::call(Expression::identifier("Point"), vec![])),
            Statement::expression(Expression::call(Expression::placeholder(), vec![])),
            Statement::expression(Expression::path(&["Color", "missing"])),
        ]);
        assert!(libraries
            .flag_for_prelude_dependencies(Node::Program(&program))
            .is_empty());
    }
}
