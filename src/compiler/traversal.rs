//! Generic tree walker.
//!
//! Visitors report what the walker should do next through the returned
//! [`Flow`]; nothing is shared between visit calls except the visitor itself.

use super::ast::Node;
use std::ops::ControlFlow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    /// Node, then children, then the node again if a revisit was requested.
    #[default]
    PreOrder,
    /// Children, then the node once.
    PostOrder,
}

/// Which call a visitor is receiving for a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    Enter,
    /// Second pre-order call after the children, when [`Flow::revisit`] was set.
    Exit,
}

/// Instructions returned from a visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Flow {
    /// Do not descend into the children of this node.
    pub ignore_children: bool,
    /// Visit nothing else anywhere in the walk.
    pub stop_traversal: bool,
    /// Call the visitor with [`Visit::Exit`] after the children (pre-order only).
    pub revisit: bool,
}

impl Flow {
    pub const CONTINUE: Flow = Flow {
        ignore_children: false,
        stop_traversal: false,
        revisit: false,
    };

    pub const STOP: Flow = Flow {
        ignore_children: false,
        stop_traversal: true,
        revisit: false,
    };

    pub const SKIP_CHILDREN: Flow = Flow {
        ignore_children: true,
        stop_traversal: false,
        revisit: false,
    };

    pub const REVISIT: Flow = Flow {
        ignore_children: false,
        stop_traversal: false,
        revisit: true,
    };

    pub fn skip_children(self) -> Self {
        Flow {
            ignore_children: true,
            ..self
        }
    }

    pub fn and_revisit(self) -> Self {
        Flow {
            revisit: true,
            ..self
        }
    }
}

pub trait Visitor<'a> {
    fn visit(&mut self, node: Node<'a>, visit: Visit) -> Flow;
}

impl<'a, F> Visitor<'a> for F
where
    F: FnMut(Node<'a>, Visit) -> Flow,
{
    fn visit(&mut self, node: Node<'a>, visit: Visit) -> Flow {
        self(node, visit)
    }
}

/// Walk the tree under `root`.
///
/// Returns `false` when a visitor stopped the traversal.
pub fn walk<'a, V>(root: Node<'a>, order: Order, visitor: &mut V) -> bool
where
    V: Visitor<'a> + ?Sized,
{
    walk_node(root, order, visitor).is_continue()
}

fn walk_node<'a, V>(node: Node<'a>, order: Order, visitor: &mut V) -> ControlFlow<()>
where
    V: Visitor<'a> + ?Sized,
{
    match order {
        Order::PreOrder => {
            let flow = visitor.visit(node, Visit::Enter);
            if flow.stop_traversal {
                return ControlFlow::Break(());
            }
            if !flow.ignore_children {
                for child in node.sub_nodes().nodes {
                    walk_node(child, order, visitor)?;
                }
            }
            if flow.revisit && visitor.visit(node, Visit::Exit).stop_traversal {
                return ControlFlow::Break(());
            }
        }
        Order::PostOrder => {
            for child in node.sub_nodes().nodes {
                walk_node(child, order, visitor)?;
            }
            if visitor.visit(node, Visit::Enter).stop_traversal {
                return ControlFlow::Break(());
            }
        }
    }
    ControlFlow::Continue(())
}

struct Fold<A, F> {
    acc: A,
    f: F,
}

impl<'a, A, F> Visitor<'a> for Fold<A, F>
where
    F: FnMut(&mut A, Node<'a>, Visit) -> Flow,
{
    fn visit(&mut self, node: Node<'a>, visit: Visit) -> Flow {
        (self.f)(&mut self.acc, node, visit)
    }
}

/// Fold every visited node into an accumulator.
pub fn reduce<'a, A, F>(root: Node<'a>, order: Order, initial: A, f: F) -> A
where
    F: FnMut(&mut A, Node<'a>, Visit) -> Flow,
{
    let mut fold = Fold { acc: initial, f };
    walk(root, order, &mut fold);
    fold.acc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ast::*;

    fn sample() -> Program {
        Program::new(vec![
            Statement::declaration(Declaration::namespace(
                "N",
                vec![Declaration::variable(
                    "a",
                    None,
                    Some(Expression::literal(Literal::number(1.0))),
                )],
            )),
            Statement::expression(Expression::identifier("a")),
        ])
    }

    fn trace(program: &Program, order: Order, flow: impl Fn(Node<'_>) -> Flow) -> Vec<String> {
        reduce(Node::Program(program), order, Vec::new(), |acc, node, visit| {
            let marker = match visit {
                Visit::Enter => "",
                Visit::Exit => "/",
            };
            acc.push(format!("{}{}", marker, node.kind()));
            match visit {
                Visit::Enter => flow(node),
                Visit::Exit => Flow::CONTINUE,
            }
        })
    }

    #[test]
    fn test_pre_order() {
        let program = sample();
        let visited = trace(&program, Order::PreOrder, |_| Flow::CONTINUE);
        assert_eq!(
            visited,
            vec![
                "program",
                "declaration",
                "namespace",
                "variable",
                "literalExpression",
                "number",
                "expression",
                "identifierExpression",
            ]
        );
    }

    #[test]
    fn test_revisit_and_skip_children() {
        let program = sample();
        let visited = trace(&program, Order::PreOrder, |node| match node {
            Node::Declaration(Declaration::Namespace(_)) => Flow::REVISIT,
            Node::Declaration(Declaration::Variable(_)) => Flow::SKIP_CHILDREN,
            _ => Flow::CONTINUE,
        });
        assert_eq!(
            visited,
            vec![
                "program",
                "declaration",
                "namespace",
                "variable",
                "/namespace",
                "expression",
                "identifierExpression",
            ]
        );
    }

    #[test]
    fn test_post_order() {
        let program = sample();
        let visited = trace(&program, Order::PostOrder, |_| Flow::REVISIT);
        assert_eq!(
            visited,
            vec![
                "number",
                "literalExpression",
                "variable",
                "namespace",
                "declaration",
                "identifierExpression",
                "expression",
                "program",
            ]
        );
    }

    #[test]
    fn test_stop_traversal() {
        let program = sample();
        let mut seen = Vec::new();
        let completed = walk(
            Node::Program(&program),
            Order::PreOrder,
            &mut |node: Node<'_>, _visit: Visit| {
                seen.push(node.kind());
                if matches!(node, Node::Declaration(Declaration::Variable(_))) {
                    Flow::STOP
                } else {
                    Flow::CONTINUE.and_revisit()
                }
            },
        );
        assert!(!completed);
        assert_eq!(seen, vec!["program", "declaration", "namespace", "variable"]);
    }
}
