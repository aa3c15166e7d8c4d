//! Syntax tree of the expression language.

use derive_more::Display;
use varsmith_core::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
pub enum RefKind {
    #[display("var")]
    Variable,
    #[display("local")]
    Local,
}

/// A reference to an input variable or a local, e.g. `var.region`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Display)]
#[display("{kind}.{name}")]
pub struct Reference {
    pub kind: RefKind,
    pub name: String,
}

impl Reference {
    pub fn variable(name: impl Into<String>) -> Self {
        Self {
            kind: RefKind::Variable,
            name: name.into(),
        }
    }

    pub fn local(name: impl Into<String>) -> Self {
        Self {
            kind: RefKind::Local,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum UnaryOp {
    #[display("!")]
    Not,
    #[display("-")]
    Negate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum BinaryOp {
    #[display("||")]
    Or,
    #[display("&&")]
    And,
    #[display("==")]
    Eq,
    #[display("!=")]
    NotEq,
    #[display("<")]
    Lt,
    #[display("<=")]
    Le,
    #[display(">")]
    Gt,
    #[display(">=")]
    Ge,
    #[display("+")]
    Add,
    #[display("-")]
    Sub,
    #[display("*")]
    Mul,
    #[display("/")]
    Div,
    #[display("%")]
    Rem,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TemplatePart {
    Literal(String),
    Interpolation(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Value),
    Template(Vec<TemplatePart>),
    Reference(Reference),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Index {
        target: Box<Expr>,
        index: Box<Expr>,
    },
    GetAttr {
        target: Box<Expr>,
        name: String,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Conditional {
        condition: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    /// Call `f` for every reference in the expression, depth first.
    pub fn visit_references(&self, f: &mut impl FnMut(&Reference)) {
        match self {
            Expr::Literal(_) => {}
            Expr::Reference(r) => f(r),
            Expr::Template(parts) => {
                for part in parts {
                    if let TemplatePart::Interpolation(expr) = part {
                        expr.visit_references(f);
                    }
                }
            }
            Expr::List(items) => items.iter().for_each(|e| e.visit_references(f)),
            Expr::Map(entries) => entries.iter().for_each(|(_, e)| e.visit_references(f)),
            Expr::Index { target, index } => {
                target.visit_references(f);
                index.visit_references(f);
            }
            Expr::GetAttr { target, .. } => target.visit_references(f),
            Expr::Call { args, .. } => args.iter().for_each(|e| e.visit_references(f)),
            Expr::Unary { operand, .. } => operand.visit_references(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.visit_references(f);
                rhs.visit_references(f);
            }
            Expr::Conditional {
                condition,
                then,
                otherwise,
            } => {
                condition.visit_references(f);
                then.visit_references(f);
                otherwise.visit_references(f);
            }
        }
    }
}
