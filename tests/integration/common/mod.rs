//! Shared AST construction helpers. The front end is out of scope, so tests
//! build parsed programs directly.
#![allow(dead_code)]

use opalc::ast::{
    ArithOp, Attribute, CaseBranch, ClassDef, CmpOp, Expr, ExprKind, Feature, Formal, Method,
    Program,
};
use opalc::span::Loc;
use opalc::symbols::{Interner, Symbol};

pub struct AstBuilder {
    pub interner: Interner,
    file: Symbol,
    next_line: u32,
}

impl AstBuilder {
    pub fn new() -> Self {
        let mut interner = Interner::new();
        let file = interner.intern("test.op");
        Self { interner, file, next_line: 0 }
    }

    pub fn sym(&mut self, name: &str) -> Symbol {
        self.interner.intern(name)
    }

    fn line(&mut self) -> u32 {
        self.next_line += 1;
        self.next_line
    }

    pub fn program(classes: Vec<ClassDef>) -> Program {
        Program { classes }
    }

    pub fn class(&mut self, name: &str, parent: &str, features: Vec<Feature>) -> ClassDef {
        let line = self.line();
        ClassDef {
            name: self.sym(name),
            parent: Some(self.sym(parent)),
            features,
            loc: Loc::new(self.file, line),
        }
    }

    pub fn method(
        &mut self,
        name: &str,
        formals: &[(&str, &str)],
        return_type: &str,
        body: Expr,
    ) -> Feature {
        let line = self.line();
        let formals = formals
            .iter()
            .map(|(n, t)| Formal {
                name: self.sym(n),
                declared_type: self.sym(t),
                loc: Loc::new(self.file, line),
            })
            .collect();
        Feature::Method(Method {
            name: self.sym(name),
            formals,
            return_type: self.sym(return_type),
            body: Some(body),
            loc: Loc::new(self.file, line),
        })
    }

    pub fn attr(&mut self, name: &str, declared_type: &str, init: Option<Expr>) -> Feature {
        let line = self.line();
        Feature::Attribute(Attribute {
            name: self.sym(name),
            declared_type: self.sym(declared_type),
            init,
            loc: Loc::new(self.file, line),
        })
    }

    fn expr(&mut self, kind: ExprKind) -> Expr {
        let line = self.line();
        Expr::new(kind, line)
    }

    pub fn int(&mut self, text: &str) -> Expr {
        let kind = ExprKind::IntConst(self.sym(text));
        self.expr(kind)
    }

    pub fn string(&mut self, text: &str) -> Expr {
        let kind = ExprKind::StrConst(self.sym(text));
        self.expr(kind)
    }

    pub fn boolean(&mut self, value: bool) -> Expr {
        self.expr(ExprKind::BoolConst(value))
    }

    pub fn ident(&mut self, name: &str) -> Expr {
        let kind = ExprKind::Ident(self.sym(name));
        self.expr(kind)
    }

    pub fn self_ref(&mut self) -> Expr {
        self.ident("self")
    }

    pub fn assign(&mut self, name: &str, value: Expr) -> Expr {
        let kind = ExprKind::Assign { name: self.sym(name), value: Box::new(value) };
        self.expr(kind)
    }

    pub fn arith(&mut self, op: ArithOp, lhs: Expr, rhs: Expr) -> Expr {
        self.expr(ExprKind::Arith { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    pub fn plus(&mut self, lhs: Expr, rhs: Expr) -> Expr {
        self.arith(ArithOp::Add, lhs, rhs)
    }

    pub fn compare(&mut self, op: CmpOp, lhs: Expr, rhs: Expr) -> Expr {
        self.expr(ExprKind::Compare { op, lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    pub fn eq(&mut self, lhs: Expr, rhs: Expr) -> Expr {
        self.expr(ExprKind::Eq { lhs: Box::new(lhs), rhs: Box::new(rhs) })
    }

    pub fn neg(&mut self, operand: Expr) -> Expr {
        self.expr(ExprKind::Neg(Box::new(operand)))
    }

    pub fn not(&mut self, operand: Expr) -> Expr {
        self.expr(ExprKind::Not(Box::new(operand)))
    }

    pub fn is_void(&mut self, operand: Expr) -> Expr {
        self.expr(ExprKind::IsVoid(Box::new(operand)))
    }

    pub fn new_obj(&mut self, type_name: &str) -> Expr {
        let kind = ExprKind::New(self.sym(type_name));
        self.expr(kind)
    }

    pub fn dispatch(&mut self, recv: Expr, method: &str, args: Vec<Expr>) -> Expr {
        let kind = ExprKind::Dispatch {
            recv: Box::new(recv),
            method: self.sym(method),
            args,
        };
        self.expr(kind)
    }

    pub fn static_dispatch(
        &mut self,
        recv: Expr,
        type_name: &str,
        method: &str,
        args: Vec<Expr>,
    ) -> Expr {
        let kind = ExprKind::StaticDispatch {
            recv: Box::new(recv),
            type_name: self.sym(type_name),
            method: self.sym(method),
            args,
        };
        self.expr(kind)
    }

    pub fn cond(&mut self, pred: Expr, then_branch: Expr, else_branch: Expr) -> Expr {
        self.expr(ExprKind::Cond {
            pred: Box::new(pred),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    pub fn while_loop(&mut self, pred: Expr, body: Expr) -> Expr {
        self.expr(ExprKind::Loop { pred: Box::new(pred), body: Box::new(body) })
    }

    pub fn block(&mut self, body: Vec<Expr>) -> Expr {
        self.expr(ExprKind::Block(body))
    }

    pub fn let_in(
        &mut self,
        name: &str,
        declared_type: &str,
        init: Option<Expr>,
        body: Expr,
    ) -> Expr {
        let kind = ExprKind::Let {
            name: self.sym(name),
            declared_type: self.sym(declared_type),
            init: init.map(Box::new),
            body: Box::new(body),
        };
        self.expr(kind)
    }

    pub fn branch(&mut self, name: &str, declared_type: &str, body: Expr) -> CaseBranch {
        let line = self.line();
        CaseBranch {
            name: self.sym(name),
            declared_type: self.sym(declared_type),
            body,
            line,
        }
    }

    pub fn case(&mut self, scrutinee: Expr, branches: Vec<CaseBranch>) -> Expr {
        self.expr(ExprKind::Case { scrutinee: Box::new(scrutinee), branches })
    }

    /// A minimal valid entry class: `class Main { main(): Int { 0 } }`.
    pub fn main_class(&mut self) -> ClassDef {
        let body = self.int("0");
        let main = self.method("main", &[], "Int", body);
        self.class("Main", "Object", vec![main])
    }
}

/// The errors a failed analysis accumulated, as display strings.
pub fn semant_errors(err: opalc::diagnostics::CompileError) -> Vec<String> {
    match err {
        opalc::diagnostics::CompileError::Semant { diagnostics } => {
            diagnostics.into_iter().map(|d| d.to_string()).collect()
        }
        other => panic!("expected semantic errors, got: {other}"),
    }
}
