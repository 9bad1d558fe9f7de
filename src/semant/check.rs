//! Expression-level type checking (pass 4).
//!
//! Each expression node is typed exactly once; re-entering an already-typed
//! node is a no-op. Errors annotate the node with the error sentinel, which
//! conforms to everything, so one violation never produces a trail of
//! secondary diagnostics.

use std::collections::HashSet;

use crate::ast::{ArithOp, Attribute, ClassDef, CmpOp, Expr, ExprKind, Feature, Method, Ty};
use crate::diagnostics::{Diagnostic, Diagnostics};
use crate::hierarchy::Hierarchy;
use crate::semant::env::ScopeStack;
use crate::semant::MethodTable;
use crate::symbols::{Interner, Symbol, WellKnown};

pub struct TypeChecker<'a> {
    hierarchy: &'a Hierarchy,
    methods: &'a MethodTable,
    interner: &'a Interner,
    wk: &'a WellKnown,
    current_class: Symbol,
    file: Symbol,
    diags: &'a mut Diagnostics,
    env: ScopeStack<Ty>,
}

impl<'a> TypeChecker<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hierarchy: &'a Hierarchy,
        methods: &'a MethodTable,
        interner: &'a Interner,
        wk: &'a WellKnown,
        current_class: Symbol,
        file: Symbol,
        diags: &'a mut Diagnostics,
    ) -> Self {
        Self {
            hierarchy,
            methods,
            interner,
            wk,
            current_class,
            file,
            diags,
            env: ScopeStack::new(),
        }
    }

    fn error(&mut self, line: u32, msg: String) {
        self.diags
            .report(Diagnostic::at(self.interner.resolve(self.file), line, msg));
    }

    fn name_of(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    fn ty_name(&self, ty: Ty) -> &str {
        match ty {
            Ty::Named(s) => self.interner.resolve(s),
            Ty::SelfTy => "SELF_TYPE",
            Ty::NoTy => "_no_type",
        }
    }

    /// Resolve a static type to the class symbol it denotes here; the error
    /// sentinel keeps its own name and is absorbed by `lca_named`.
    fn resolve_sym(&self, ty: Ty) -> Symbol {
        match ty {
            Ty::Named(s) => s,
            Ty::SelfTy => self.current_class,
            Ty::NoTy => self.wk.no_type,
        }
    }

    /// Type-check one class: seed the object environment with the receiver
    /// and every visible attribute, then walk each feature.
    pub fn check_class(&mut self, class: &mut ClassDef, attrs: &[(Symbol, Ty)]) {
        self.env.enter_scope();
        self.env.add(self.wk.self_, Ty::SelfTy);
        for &(name, ty) in attrs {
            self.env.add(name, ty);
        }

        for feature in &mut class.features {
            match feature {
                Feature::Method(method) => self.check_method(method),
                Feature::Attribute(attr) => self.check_attribute(attr),
            }
        }

        self.env.exit_scope();
    }

    fn check_method(&mut self, method: &mut Method) {
        let Some(body) = &mut method.body else { return };

        self.env.enter_scope();
        for formal in &method.formals {
            // Self-typed formals were rejected in pass 3.
            self.env.add(formal.name, Ty::Named(formal.declared_type));
        }
        self.check_expr(body);

        let declared = method.return_type;
        let body_ty = body.ty();
        let ok = if declared == self.wk.self_type {
            // An exact self-type promise is met only by a self-typed body.
            matches!(body_ty, Ty::SelfTy | Ty::NoTy)
        } else {
            match body_ty {
                Ty::NoTy => true,
                Ty::SelfTy => self.hierarchy.conforms_named(self.current_class, declared),
                Ty::Named(n) => self.hierarchy.conforms_named(n, declared),
            }
        };
        if !ok {
            let msg = format!(
                "Error: expression type \"{}\" of method \"{}\" doesn't conform to its declared type \"{}\".",
                self.ty_name(body_ty),
                self.name_of(method.name),
                self.name_of(declared)
            );
            self.error(method.loc.line, msg);
        }
        self.env.exit_scope();
    }

    fn check_attribute(&mut self, attr: &mut Attribute) {
        let Some(init) = &mut attr.init else { return };
        self.check_expr(init);

        let declared = if attr.declared_type == self.wk.self_type {
            self.current_class
        } else {
            attr.declared_type
        };
        let init_ty = self.resolve_sym(init.ty());
        if !self.hierarchy.conforms_named(init_ty, declared) {
            let msg = format!(
                "Error: init expression type \"{}\" doesn't conform to declared type \"{}\" of attribute \"{}\".",
                self.name_of(init_ty),
                self.name_of(declared),
                self.name_of(attr.name)
            );
            self.error(attr.loc.line, msg);
        }
    }

    pub fn check_expr(&mut self, expr: &mut Expr) {
        if expr.ty.is_some() {
            return;
        }
        let line = expr.line;
        let ty = match &mut expr.kind {
            ExprKind::Assign { name, value } => self.check_assign(*name, value, line),
            ExprKind::StaticDispatch { recv, type_name, method, args } => {
                self.check_static_dispatch(recv, *type_name, *method, args, line)
            }
            ExprKind::Dispatch { recv, method, args } => {
                self.check_dispatch(recv, *method, args, line)
            }
            ExprKind::Cond { pred, then_branch, else_branch } => {
                self.check_cond(pred, then_branch, else_branch, line)
            }
            ExprKind::Loop { pred, body } => self.check_loop(pred, body, line),
            ExprKind::Case { scrutinee, branches } => self.check_case(scrutinee, branches),
            ExprKind::Block(body) => self.check_block(body, line),
            ExprKind::Let { name, declared_type, init, body } => {
                self.check_let(*name, *declared_type, init, body, line)
            }
            ExprKind::Arith { op, lhs, rhs } => self.check_arith(*op, lhs, rhs, line),
            ExprKind::Neg(operand) => self.check_neg(operand, line),
            ExprKind::Compare { op, lhs, rhs } => self.check_compare(*op, lhs, rhs, line),
            ExprKind::Eq { lhs, rhs } => self.check_eq(lhs, rhs, line),
            ExprKind::Not(operand) => self.check_not(operand, line),
            ExprKind::IsVoid(operand) => {
                self.check_expr(operand);
                Ty::Named(self.wk.bool_)
            }
            ExprKind::New(type_name) => self.check_new(*type_name, line),
            ExprKind::IntConst(_) => Ty::Named(self.wk.int),
            ExprKind::StrConst(_) => Ty::Named(self.wk.string),
            ExprKind::BoolConst(_) => Ty::Named(self.wk.bool_),
            ExprKind::Ident(name) => self.check_ident(*name, line),
        };
        expr.ty = Some(ty);
    }

    fn check_assign(&mut self, name: Symbol, value: &mut Expr, line: u32) -> Ty {
        self.check_expr(value);
        if name == self.wk.self_ {
            self.error(
                line,
                "Error: assign expression to keyword \"self\" is not allowed.".to_string(),
            );
            return Ty::NoTy;
        }
        let Some(&declared) = self.env.lookup(name) else {
            let msg = format!(
                "Error: identifer \"{}\" is used without being declared.",
                self.name_of(name)
            );
            self.error(line, msg);
            return Ty::NoTy;
        };
        let rhs = self.resolve_sym(value.ty());
        let target = self.resolve_sym(declared);
        if !self.hierarchy.conforms_named(rhs, target) {
            let msg = format!(
                "Error: expression doesn't match type \"{}\" of identifer \"{}\".",
                self.name_of(target),
                self.name_of(name)
            );
            self.error(line, msg);
            return Ty::NoTy;
        }
        value.ty()
    }

    /// Shared tail of both dispatch forms once the target class is known:
    /// the method must exist there with matching arity, and every actual
    /// must conform to the corresponding formal.
    fn check_dispatch_against(
        &mut self,
        target_class: Symbol,
        method: Symbol,
        recv_ty: Ty,
        args: &mut [Expr],
        line: u32,
    ) -> Ty {
        let Some(sig) = self.methods.lookup(target_class, method) else {
            let msg = format!(
                "Error: method \"{}\" of class \"{}\" is not defined.",
                self.name_of(method),
                self.name_of(target_class)
            );
            self.error(line, msg);
            return Ty::NoTy;
        };
        let sig = sig.clone();

        if sig.formals.len() != args.len() {
            self.error(
                line,
                "Error: number of formal parameters and actual parameters does not match."
                    .to_string(),
            );
            return Ty::NoTy;
        }

        for (arg, (formal_name, formal_ty)) in args.iter().zip(sig.formals.iter()) {
            let actual = self.resolve_sym(arg.ty());
            if !self.hierarchy.conforms_named(actual, *formal_ty) {
                let msg = format!(
                    "Error: type of actual parameter \"{}\" does not conform to type \"{}\" of formal parameter \"{}\".",
                    self.name_of(actual),
                    self.name_of(*formal_ty),
                    self.name_of(*formal_name)
                );
                self.error(line, msg);
                return Ty::NoTy;
            }
        }

        if sig.return_type == self.wk.self_type {
            // Polymorphism is preserved through the receiver's own static
            // type, which stays SELF_TYPE only for a self receiver.
            recv_ty
        } else {
            Ty::Named(sig.return_type)
        }
    }

    fn check_dispatch(
        &mut self,
        recv: &mut Expr,
        method: Symbol,
        args: &mut Vec<Expr>,
        line: u32,
    ) -> Ty {
        // Every actual is typed before anything can bail out, so one broken
        // argument still yields diagnostics for the rest.
        let mut tainted = false;
        for arg in args.iter_mut() {
            self.check_expr(arg);
            tainted |= arg.ty().is_no_ty();
        }
        self.check_expr(recv);
        let recv_ty = recv.ty();
        if tainted || recv_ty.is_no_ty() {
            return Ty::NoTy;
        }
        let target_class = self.resolve_sym(recv_ty);
        self.check_dispatch_against(target_class, method, recv_ty, args, line)
    }

    fn check_static_dispatch(
        &mut self,
        recv: &mut Expr,
        type_name: Symbol,
        method: Symbol,
        args: &mut Vec<Expr>,
        line: u32,
    ) -> Ty {
        let mut tainted = false;
        for arg in args.iter_mut() {
            self.check_expr(arg);
            tainted |= arg.ty().is_no_ty();
        }
        self.check_expr(recv);
        let recv_ty = recv.ty();
        if tainted || recv_ty.is_no_ty() {
            return Ty::NoTy;
        }

        if !self.hierarchy.has_class(type_name) {
            let msg = format!(
                "Error: type \"{}\" is not defined.",
                self.name_of(type_name)
            );
            self.error(line, msg);
            return Ty::NoTy;
        }
        let recv_class = self.resolve_sym(recv_ty);
        if !self.hierarchy.conforms_named(recv_class, type_name) {
            let msg = format!(
                "Error: expression type \"{}\" should conform to dispatch type \"{}\".",
                self.name_of(recv_class),
                self.name_of(type_name)
            );
            self.error(line, msg);
            return Ty::NoTy;
        }
        self.check_dispatch_against(type_name, method, recv_ty, args, line)
    }

    fn check_cond(
        &mut self,
        pred: &mut Expr,
        then_branch: &mut Expr,
        else_branch: &mut Expr,
        line: u32,
    ) -> Ty {
        self.check_expr(pred);
        self.check_expr(then_branch);
        self.check_expr(else_branch);
        let pred_ty = pred.ty();
        if !pred_ty.is_no_ty() && pred_ty != Ty::Named(self.wk.bool_) {
            self.error(
                line,
                "Error: condition type in \"if\" statement should be Bool.".to_string(),
            );
        }
        let t0 = then_branch.ty();
        let t1 = else_branch.ty();
        // Syntactically identical arms keep their exact type, which is the
        // only way a self-typed result survives a conditional.
        if t0 == t1 {
            return t0;
        }
        Ty::Named(
            self.hierarchy
                .lca_named(self.resolve_sym(t0), self.resolve_sym(t1)),
        )
    }

    fn check_loop(&mut self, pred: &mut Expr, body: &mut Expr, line: u32) -> Ty {
        self.check_expr(pred);
        self.check_expr(body);
        let pred_ty = pred.ty();
        if !pred_ty.is_no_ty() && pred_ty != Ty::Named(self.wk.bool_) {
            self.error(
                line,
                "Error: condition type in \"while\" statement should be Bool.".to_string(),
            );
        }
        Ty::Named(self.wk.object)
    }

    fn check_case(
        &mut self,
        scrutinee: &mut Expr,
        branches: &mut Vec<crate::ast::CaseBranch>,
    ) -> Ty {
        if branches.is_empty() {
            self.error(
                scrutinee.line,
                "Error: case expression has no branches. BUG in compiler!!!".to_string(),
            );
            return Ty::NoTy;
        }
        // Branch declared types must be pairwise distinct, never the self
        // type, and must name real classes.
        let mut seen: HashSet<Symbol> = HashSet::new();
        for branch in branches.iter() {
            if !seen.insert(branch.declared_type) {
                let msg = format!(
                    "Error: duplicate branch \"{}\" in case statement.",
                    self.name_of(branch.declared_type)
                );
                self.error(branch.line, msg);
                return Ty::NoTy;
            }
            if branch.declared_type == self.wk.self_type {
                self.error(
                    branch.line,
                    "Error: \"SELF_TYPE\" is not allowed in case branch.".to_string(),
                );
                return Ty::NoTy;
            }
            if !self.hierarchy.has_class(branch.declared_type) {
                let msg = format!(
                    "Error: type \"{}\" in case branch is not defined",
                    self.name_of(branch.declared_type)
                );
                self.error(branch.line, msg);
                return Ty::NoTy;
            }
        }

        self.check_expr(scrutinee);
        let mut tainted = scrutinee.ty().is_no_ty();
        for branch in branches.iter_mut() {
            self.env.enter_scope();
            self.env.add(branch.name, Ty::Named(branch.declared_type));
            self.check_expr(&mut branch.body);
            self.env.exit_scope();
            tainted |= branch.body.ty().is_no_ty();
        }
        if tainted {
            return Ty::NoTy;
        }

        // The result generalizes the branch expression types, not the
        // declared types; a single branch keeps its exact type.
        if branches.len() == 1 {
            return branches[0].body.ty();
        }
        let mut acc = self.resolve_sym(branches[0].body.ty());
        for branch in &branches[1..] {
            acc = self
                .hierarchy
                .lca_named(acc, self.resolve_sym(branch.body.ty()));
        }
        Ty::Named(acc)
    }

    fn check_block(&mut self, body: &mut Vec<Expr>, line: u32) -> Ty {
        let mut last = None;
        for expr in body.iter_mut() {
            self.check_expr(expr);
            last = Some(expr.ty());
        }
        match last {
            Some(ty) => ty,
            None => {
                self.error(
                    line,
                    "Error: block expressions do not have a type. BUG in compiler!!!".to_string(),
                );
                Ty::NoTy
            }
        }
    }

    fn check_let(
        &mut self,
        name: Symbol,
        declared_type: Symbol,
        init: &mut Option<Box<Expr>>,
        body: &mut Expr,
        line: u32,
    ) -> Ty {
        let mut failed = false;
        let resolved_decl = if declared_type == self.wk.self_type {
            self.current_class
        } else {
            declared_type
        };
        if !self.hierarchy.has_class(resolved_decl) {
            let msg = format!(
                "Error: type \"{}\" is used without being defined.",
                self.name_of(resolved_decl)
            );
            self.error(line, msg);
            failed = true;
        }
        if name == self.wk.self_ {
            self.error(
                line,
                "Error: key word \"self\" could not be used in \"let\" statement.".to_string(),
            );
            failed = true;
        }
        // The initializer is typed in the enclosing scope; the new binding
        // is not visible to it.
        if let Some(init) = init {
            self.check_expr(init);
            let init_ty = self.resolve_sym(init.ty());
            if !self.hierarchy.conforms_named(init_ty, resolved_decl) {
                let msg = format!(
                    "Error: init expression does not match type \"{}\" of variable \"{}\".",
                    self.name_of(resolved_decl),
                    self.name_of(name)
                );
                self.error(line, msg);
                failed = true;
            }
        }

        // The body sees the declared type unresolved, so a self-typed
        // binding stays polymorphic.
        let binding = if declared_type == self.wk.self_type {
            Ty::SelfTy
        } else {
            Ty::Named(declared_type)
        };
        self.env.enter_scope();
        self.env.add(name, binding);
        self.check_expr(body);
        self.env.exit_scope();

        if failed { Ty::NoTy } else { body.ty() }
    }

    fn check_arith(&mut self, op: ArithOp, lhs: &mut Expr, rhs: &mut Expr, line: u32) -> Ty {
        self.check_expr(lhs);
        self.check_expr(rhs);
        if lhs.ty().is_no_ty() || rhs.ty().is_no_ty() {
            return Ty::NoTy;
        }
        let int = Ty::Named(self.wk.int);
        if lhs.ty() == int && rhs.ty() == int {
            int
        } else {
            let op_str = match op {
                ArithOp::Add => "+",
                ArithOp::Sub => "-",
                ArithOp::Mul => "*",
                ArithOp::Div => "/",
            };
            let msg = format!(
                "Error: expressions should have same type Int for operator \"{op_str}\"."
            );
            self.error(line, msg);
            Ty::NoTy
        }
    }

    fn check_neg(&mut self, operand: &mut Expr, line: u32) -> Ty {
        self.check_expr(operand);
        if operand.ty().is_no_ty() {
            return Ty::NoTy;
        }
        if operand.ty() != Ty::Named(self.wk.int) {
            self.error(line, "Error: expression should have type Int.".to_string());
            Ty::NoTy
        } else {
            Ty::Named(self.wk.int)
        }
    }

    fn check_compare(&mut self, op: CmpOp, lhs: &mut Expr, rhs: &mut Expr, line: u32) -> Ty {
        self.check_expr(lhs);
        self.check_expr(rhs);
        if lhs.ty().is_no_ty() || rhs.ty().is_no_ty() {
            return Ty::NoTy;
        }
        let int = Ty::Named(self.wk.int);
        if lhs.ty() == int && rhs.ty() == int {
            Ty::Named(self.wk.bool_)
        } else {
            let op_str = match op {
                CmpOp::Lt => "<",
                CmpOp::Le => "<=",
            };
            let msg = format!(
                "Error: expressions should have same type Int for operator \"{op_str}\"."
            );
            self.error(line, msg);
            Ty::NoTy
        }
    }

    /// Equality admits two shapes: both operands the same boxed primitive,
    /// or neither operand any boxed primitive.
    fn check_eq(&mut self, lhs: &mut Expr, rhs: &mut Expr, line: u32) -> Ty {
        self.check_expr(lhs);
        self.check_expr(rhs);
        let a = lhs.ty();
        let b = rhs.ty();
        if a.is_no_ty() || b.is_no_ty() {
            return Ty::NoTy;
        }
        let prim = |t: Ty| match t {
            Ty::Named(n) => self.wk.is_boxed_primitive(n),
            _ => false,
        };
        let same_prim = matches!((a, b), (Ty::Named(x), Ty::Named(y))
            if x == y && self.wk.is_boxed_primitive(x));
        if same_prim || (!prim(a) && !prim(b)) {
            Ty::Named(self.wk.bool_)
        } else {
            self.error(
                line,
                "Error: basic type (Int, String, Bool) could only compare with same basic type."
                    .to_string(),
            );
            Ty::NoTy
        }
    }

    fn check_not(&mut self, operand: &mut Expr, line: u32) -> Ty {
        self.check_expr(operand);
        if operand.ty().is_no_ty() {
            return Ty::NoTy;
        }
        if operand.ty() != Ty::Named(self.wk.bool_) {
            self.error(line, "Error: expression should have type Bool.".to_string());
            Ty::NoTy
        } else {
            Ty::Named(self.wk.bool_)
        }
    }

    fn check_new(&mut self, type_name: Symbol, line: u32) -> Ty {
        if type_name == self.wk.self_type {
            return Ty::SelfTy;
        }
        if self.hierarchy.has_class(type_name) {
            Ty::Named(type_name)
        } else {
            let msg = format!(
                "Error: type \"{}\" in \"new\" operation is not defined.",
                self.name_of(type_name)
            );
            self.error(line, msg);
            Ty::NoTy
        }
    }

    fn check_ident(&mut self, name: Symbol, line: u32) -> Ty {
        match self.env.lookup(name) {
            Some(&ty) => ty,
            None => {
                let msg = format!(
                    "Error: identifer \"{}\" is used without being declared.",
                    self.name_of(name)
                );
                self.error(line, msg);
                Ty::NoTy
            }
        }
    }
}
