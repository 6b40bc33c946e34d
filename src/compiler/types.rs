//! Types used by unification.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

/// A type term.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Unification {
    /// Unknown type to be solved.
    Variable { name: String },
    /// Quantified type parameter of a declaration.
    Generic { name: String },
    /// Nominal type with type arguments, e.g. `Array<Number>`.
    Constant {
        name: String,
        parameters: Vec<Unification>,
    },
    Function {
        arguments: Vec<FunctionArgument>,
        #[serde(rename = "returnType")]
        return_type: Box<Unification>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FunctionArgument {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(rename = "type")]
    pub ty: Unification,
}

impl FunctionArgument {
    pub fn labeled(label: &str, ty: Unification) -> Self {
        Self {
            label: Some(label.to_string()),
            ty,
        }
    }

    pub fn unlabeled(ty: Unification) -> Self {
        Self { label: None, ty }
    }
}

impl Unification {
    pub fn variable(name: &str) -> Self {
        Unification::Variable {
            name: name.to_string(),
        }
    }

    pub fn generic(name: &str) -> Self {
        Unification::Generic {
            name: name.to_string(),
        }
    }

    pub fn constant(name: &str, parameters: Vec<Unification>) -> Self {
        Unification::Constant {
            name: name.to_string(),
            parameters,
        }
    }

    pub fn function(arguments: Vec<FunctionArgument>, return_type: Unification) -> Self {
        Unification::Function {
            arguments,
            return_type: Box::new(return_type),
        }
    }

    pub fn void() -> Self {
        Self::constant("Void", vec![])
    }

    pub fn boolean() -> Self {
        Self::constant("Boolean", vec![])
    }

    pub fn number() -> Self {
        Self::constant("Number", vec![])
    }

    pub fn string() -> Self {
        Self::constant("String", vec![])
    }

    pub fn color() -> Self {
        Self::constant("Color", vec![])
    }

    pub fn shadow() -> Self {
        Self::constant("Shadow", vec![])
    }

    pub fn text_style() -> Self {
        Self::constant("TextStyle", vec![])
    }

    pub fn optional(wrapped: Unification) -> Self {
        Self::constant("Optional", vec![wrapped])
    }

    pub fn array(element: Unification) -> Self {
        Self::constant("Array", vec![element])
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Unification::Function { .. })
    }

    /// True if the variable `name` appears anywhere in this type.
    pub fn contains_variable(&self, name: &str) -> bool {
        match self {
            Unification::Variable { name: own } => own == name,
            Unification::Generic { .. } => false,
            Unification::Constant { parameters, .. } => {
                parameters.iter().any(|p| p.contains_variable(name))
            }
            Unification::Function {
                arguments,
                return_type,
            } => {
                arguments.iter().any(|a| a.ty.contains_variable(name))
                    || return_type.contains_variable(name)
            }
        }
    }

    /// Distinct generic names, in order of first appearance.
    pub fn generic_names(&self) -> Vec<String> {
        fn collect(ty: &Unification, out: &mut Vec<String>) {
            match ty {
                Unification::Variable { .. } => {}
                Unification::Generic { name } => {
                    if !out.contains(name) {
                        out.push(name.clone());
                    }
                }
                Unification::Constant { parameters, .. } => {
                    parameters.iter().for_each(|p| collect(p, out));
                }
                Unification::Function {
                    arguments,
                    return_type,
                } => {
                    arguments.iter().for_each(|a| collect(&a.ty, out));
                    collect(return_type, out);
                }
            }
        }
        let mut out = Vec::new();
        collect(self, &mut out);
        out
    }

    /// Instantiate every generic with a fresh variable.
    ///
    /// Each use of a generic declaration gets its own variables.
    pub fn replace_generics_with_vars(&self, names: &mut NameGenerator) -> Unification {
        let generics = self.generic_names();
        if generics.is_empty() {
            return self.clone();
        }
        let mut substitution = Substitution::new();
        for generic in generics {
            substitution.insert(
                Unification::Generic { name: generic },
                Unification::Variable {
                    name: names.next_name(),
                },
            );
        }
        substitution.apply(self)
    }
}

impl fmt::Display for Unification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unification::Variable { name } => write!(f, "{}", name),
            Unification::Generic { name } => write!(f, "'{}", name),
            Unification::Constant { name, parameters } => {
                write!(f, "{}", name)?;
                if !parameters.is_empty() {
                    write!(f, "<")?;
                    for (i, parameter) in parameters.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", parameter)?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            Unification::Function {
                arguments,
                return_type,
            } => {
                write!(f, "(")?;
                for (i, argument) in arguments.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    match &argument.label {
                        Some(label) => write!(f, "{}: {}", label, argument.ty)?,
                        None => write!(f, "{}", argument.ty)?,
                    }
                }
                write!(f, ") -> {}", return_type)
            }
        }
    }
}

/// Produces `?1`, `?2`, ... `?a`, ... `?10`, counting in base 36.
#[derive(Debug, Clone)]
pub struct NameGenerator {
    prefix: String,
    counter: u64,
}

impl Default for NameGenerator {
    fn default() -> Self {
        Self::new("?")
    }
}

impl NameGenerator {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            counter: 0,
        }
    }

    pub fn next_name(&mut self) -> String {
        self.counter += 1;
        format!("{}{}", self.prefix, to_base36(self.counter))
    }
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut digits = Vec::new();
    loop {
        digits.push(DIGITS[(n % 36) as usize] as char);
        n /= 36;
        if n == 0 {
            break;
        }
    }
    digits.iter().rev().collect()
}

/// Solved bindings for variables (and generics).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Substitution {
    mapping: HashMap<Unification, Unification>,
}

impl Substitution {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, var: Unification, ty: Unification) {
        self.mapping.insert(var, ty);
    }

    pub fn get(&self, var: &Unification) -> Option<&Unification> {
        self.mapping.get(var)
    }

    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }

    /// Resolve a type as far as the bindings allow.
    pub fn apply(&self, ty: &Unification) -> Unification {
        match ty {
            Unification::Variable { .. } | Unification::Generic { .. } => match self.mapping.get(ty) {
                Some(bound) if bound != ty => self.apply(bound),
                _ => ty.clone(),
            },
            Unification::Constant { name, parameters } => Unification::Constant {
                name: name.clone(),
                parameters: parameters.iter().map(|p| self.apply(p)).collect(),
            },
            Unification::Function {
                arguments,
                return_type,
            } => Unification::Function {
                arguments: arguments
                    .iter()
                    .map(|a| FunctionArgument {
                        label: a.label.clone(),
                        ty: self.apply(&a.ty),
                    })
                    .collect(),
                return_type: Box::new(self.apply(return_type)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_generator_base36() {
        let mut names = NameGenerator::default();
        let generated: Vec<_> = (0..37).map(|_| names.next_name()).collect();
        assert_eq!(generated[0], "?1");
        assert_eq!(generated[9], "?a");
        assert_eq!(generated[34], "?z");
        assert_eq!(generated[35], "?10");
        assert_eq!(generated[36], "?11");
    }

    #[test]
    fn test_display() {
        let ty = Unification::function(
            vec![
                FunctionArgument::labeled("color", Unification::color()),
                FunctionArgument::unlabeled(Unification::array(Unification::variable("?3"))),
            ],
            Unification::optional(Unification::generic("?1")),
        );
        assert_eq!(ty.to_string(), "(color: Color, Array<?3>) -> Optional<'?1>");
    }

    #[test]
    fn test_apply_follows_chains() {
        let mut substitution = Substitution::new();
        substitution.insert(
            Unification::variable("?1"),
            Unification::array(Unification::variable("?2")),
        );
        substitution.insert(Unification::variable("?2"), Unification::variable("?3"));
        substitution.insert(Unification::variable("?3"), Unification::number());
        assert_eq!(
            substitution.apply(&Unification::variable("?1")),
            Unification::array(Unification::number())
        );
        assert_eq!(
            substitution.apply(&Unification::variable("?9")),
            Unification::variable("?9")
        );
    }

    #[test]
    fn test_replace_generics_with_vars() {
        let mut names = NameGenerator::new("?");
        let generic = Unification::generic("?a");
        let ty = Unification::function(
            vec![FunctionArgument::unlabeled(generic.clone())],
            Unification::optional(generic),
        );
        let first = ty.replace_generics_with_vars(&mut names);
        let second = ty.replace_generics_with_vars(&mut names);
        assert_ne!(first, second);
        assert!(first.generic_names().is_empty());
        let Unification::Function {
            arguments,
            return_type,
        } = first
        else {
            panic!("expected a function");
        };
        assert_eq!(*return_type, Unification::optional(arguments[0].ty.clone()));
    }
}
