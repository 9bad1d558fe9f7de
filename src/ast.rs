//! The type-annotatable AST the external parser hands to the core.
//!
//! Nodes are immutable after construction except for the `ty` annotation on
//! expressions, which semantic analysis sets exactly once. Feature and
//! expression kinds are closed enums matched exhaustively; there is no
//! "no expression" placeholder node, absent initializers are `Option`.

use crate::span::Loc;
use crate::symbols::Symbol;

#[derive(Debug)]
pub struct Program {
    pub classes: Vec<ClassDef>,
}

#[derive(Debug)]
pub struct ClassDef {
    pub name: Symbol,
    /// `None` only for the root class installed by the hierarchy.
    pub parent: Option<Symbol>,
    pub features: Vec<Feature>,
    pub loc: Loc,
}

impl ClassDef {
    pub fn methods(&self) -> impl Iterator<Item = &Method> {
        self.features.iter().filter_map(|f| match f {
            Feature::Method(m) => Some(m),
            Feature::Attribute(_) => None,
        })
    }

    pub fn methods_mut(&mut self) -> impl Iterator<Item = &mut Method> {
        self.features.iter_mut().filter_map(|f| match f {
            Feature::Method(m) => Some(m),
            Feature::Attribute(_) => None,
        })
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.features.iter().filter_map(|f| match f {
            Feature::Attribute(a) => Some(a),
            Feature::Method(_) => None,
        })
    }

    pub fn attributes_mut(&mut self) -> impl Iterator<Item = &mut Attribute> {
        self.features.iter_mut().filter_map(|f| match f {
            Feature::Attribute(a) => Some(a),
            Feature::Method(_) => None,
        })
    }
}

#[derive(Debug)]
pub enum Feature {
    Method(Method),
    Attribute(Attribute),
}

#[derive(Debug)]
pub struct Method {
    pub name: Symbol,
    pub formals: Vec<Formal>,
    pub return_type: Symbol,
    /// `None` only for basic-class methods, whose bodies live in the runtime.
    pub body: Option<Expr>,
    pub loc: Loc,
}

#[derive(Debug)]
pub struct Formal {
    pub name: Symbol,
    pub declared_type: Symbol,
    pub loc: Loc,
}

#[derive(Debug)]
pub struct Attribute {
    pub name: Symbol,
    pub declared_type: Symbol,
    pub init: Option<Expr>,
    pub loc: Loc,
}

/// The static type of an expression once analysis has run.
///
/// `SelfTy` is "the dynamic type of the receiver" and is resolved to the
/// enclosing class before most conformance checks. `NoTy` is the
/// non-printable error sentinel: it conforms to everything so that one
/// diagnostic never cascades into secondary ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ty {
    Named(Symbol),
    SelfTy,
    NoTy,
}

impl Ty {
    /// Resolve the polymorphic self type against the enclosing class.
    pub fn resolve(self, current_class: Symbol) -> Ty {
        match self {
            Ty::SelfTy => Ty::Named(current_class),
            other => other,
        }
    }

    pub fn is_no_ty(self) -> bool {
        matches!(self, Ty::NoTy)
    }
}

#[derive(Debug)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: u32,
    /// Set exactly once by semantic analysis; re-typing a node is a no-op.
    pub ty: Option<Ty>,
}

impl Expr {
    pub fn new(kind: ExprKind, line: u32) -> Self {
        Self { kind, line, ty: None }
    }

    /// The annotated static type. Only valid after analysis succeeded.
    pub fn ty(&self) -> Ty {
        self.ty.expect("expression not typed by semantic analysis")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Lt,
    Le,
}

#[derive(Debug)]
pub enum ExprKind {
    Assign {
        name: Symbol,
        value: Box<Expr>,
    },
    /// `recv@type_name.method(args)`
    StaticDispatch {
        recv: Box<Expr>,
        type_name: Symbol,
        method: Symbol,
        args: Vec<Expr>,
    },
    Dispatch {
        recv: Box<Expr>,
        method: Symbol,
        args: Vec<Expr>,
    },
    Cond {
        pred: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Loop {
        pred: Box<Expr>,
        body: Box<Expr>,
    },
    Case {
        scrutinee: Box<Expr>,
        branches: Vec<CaseBranch>,
    },
    Block(Vec<Expr>),
    Let {
        name: Symbol,
        declared_type: Symbol,
        init: Option<Box<Expr>>,
        body: Box<Expr>,
    },
    Arith {
        op: ArithOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Neg(Box<Expr>),
    Compare {
        op: CmpOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Eq {
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    IsVoid(Box<Expr>),
    New(Symbol),
    /// Literal text of the integer, interned; the constant pool keys off it.
    IntConst(Symbol),
    StrConst(Symbol),
    BoolConst(bool),
    Ident(Symbol),
}

#[derive(Debug)]
pub struct CaseBranch {
    pub name: Symbol,
    pub declared_type: Symbol,
    pub body: Expr,
    pub line: u32,
}
