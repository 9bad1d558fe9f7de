//! Code generation.
//!
//! One tree walker drives everything: it owns the calling convention, the
//! label counter, the frame-slot temporary discipline, and the scoped
//! storage environment, and calls into a `Backend` for every operation
//! group. `asm` renders target text directly; `tac` records three-address
//! instructions for later lowering. Both see exactly the same walk, so their
//! outputs agree on structure, labels, and slot usage.

pub mod asm;
pub mod tac;

use crate::ast::{ArithOp, ClassDef, CmpOp, Expr, ExprKind, CaseBranch, Ty};
use crate::hierarchy::Hierarchy;
use crate::layout::{DispatchTables, Layouts};
use crate::semant::Analysis;
use crate::semant::env::ScopeStack;
use crate::symbols::{ConstPool, Interner, IntId, StrId, Symbol, WellKnown};

pub const WORD_SIZE: u32 = 4;
/// Word offset of the dispatch-table pointer in every object header.
pub const DISPTAB_OFFSET: i32 = 2;
/// Callee-saved words: frame pointer, self, return address.
pub const SAVED_REGS: i32 = 3;

/// Which collector the emitted output wires the runtime to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GcPolicy {
    #[default]
    None,
    Scan,
    Generational,
}

impl GcPolicy {
    pub fn initializer(self) -> &'static str {
        match self {
            GcPolicy::None => "_NoGC_Init",
            GcPolicy::Scan => "_ScnGC_Init",
            GcPolicy::Generational => "_GenGC_Init",
        }
    }

    pub fn collector(self) -> &'static str {
        match self {
            GcPolicy::None => "_NoGC_Collect",
            GcPolicy::Scan => "_ScnGC_Collect",
            GcPolicy::Generational => "_GenGC_Collect",
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CodegenOptions {
    pub gc: GcPolicy,
    pub gc_test: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Base {
    /// Relative to the frame pointer: formals above, temporaries below.
    Frame,
    /// Relative to the self pointer: attribute slots.
    SelfObj,
}

/// Where a variable, formal, attribute, or spill temporary lives: a base
/// plus a word offset. Always a relation to an existing frame or object,
/// never an owned pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageLocation {
    pub base: Base,
    pub offset: i32,
}

impl StorageLocation {
    pub fn frame(offset: i32) -> Self {
        Self { base: Base::Frame, offset }
    }

    pub fn self_obj(offset: i32) -> Self {
        Self { base: Base::SelfObj, offset }
    }
}

/// The operand algebra both backends understand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    /// The accumulator; every expression leaves its value here.
    Acc,
    SelfPtr,
    Slot(StorageLocation),
    Imm(i32),
    IntConst(IntId),
    StrConst(StrId),
    BoolConst(bool),
    /// Address of a class's prototype object.
    Proto(Symbol),
    /// Address of a class's dispatch table.
    DispTab(Symbol),
}

#[derive(Debug, Clone, Copy)]
pub enum DispatchKind {
    /// Index the named class's table directly.
    Static(Symbol),
    /// Index the table the receiver carries.
    Dynamic,
}

/// One operation group per method; the walker guarantees the calls arrive
/// in a deterministic order for a given annotated program.
pub trait Backend {
    fn begin_init(&mut self, class: Symbol, n_temps: u32);
    fn begin_method(&mut self, class: Symbol, method: Symbol, n_temps: u32);
    fn end_unit(&mut self, n_temps: u32, n_args: u32);

    fn load(&mut self, src: Operand);
    fn store(&mut self, dst: StorageLocation);
    fn push_acc(&mut self);

    fn label(&mut self, l: Label);
    fn jump(&mut self, l: Label);
    fn branch_if_false(&mut self, l: Label);
    fn branch_if_nonvoid(&mut self, l: Label);

    /// acc <- box(value(lhs) op value(acc)); the walker has already copied
    /// the right operand into a fresh box via `call_copy`.
    fn arith(&mut self, op: ArithOp, lhs: StorageLocation);
    /// acc <- fresh box with its value negated; follows a `call_copy`.
    fn neg(&mut self);
    fn not(&mut self, done: Label);
    fn is_void(&mut self, done: Label);
    fn compare(&mut self, op: CmpOp, lhs: StorageLocation, done: Label);
    /// Identity fast path, then the structural runtime helper.
    fn eq_test(&mut self, lhs: StorageLocation, done: Label);

    fn load_tag(&mut self);
    fn branch_tag_outside(&mut self, lo: u32, hi: u32, miss: Label);

    fn call_dispatch(&mut self, kind: DispatchKind, slot: u32);
    fn call_init(&mut self, class: Symbol);
    fn call_copy(&mut self);
    /// Copy and initialize the prototype selected by the receiver's tag.
    fn new_self_typed(&mut self);

    fn abort_dispatch(&mut self, file: StrId, line: u32);
    fn abort_case_void(&mut self, file: StrId, line: u32);
    fn abort_case_miss(&mut self);
}

/// Static upper bound on simultaneously live frame temporaries: the max of
/// the children, plus one for every binding or held operand that must
/// survive evaluation of a sibling expression.
pub fn temporaries(expr: &Expr) -> u32 {
    match &expr.kind {
        ExprKind::Assign { value, .. } => temporaries(value),
        ExprKind::StaticDispatch { recv, args, .. } | ExprKind::Dispatch { recv, args, .. } => {
            let mut max = temporaries(recv);
            for arg in args {
                max = max.max(temporaries(arg));
            }
            max
        }
        ExprKind::Cond { pred, then_branch, else_branch } => temporaries(pred)
            .max(temporaries(then_branch))
            .max(temporaries(else_branch)),
        ExprKind::Loop { pred, body } => temporaries(pred).max(temporaries(body)),
        ExprKind::Case { scrutinee, branches } => {
            let mut max = temporaries(scrutinee);
            for branch in branches {
                max = max.max(temporaries(&branch.body) + 1);
            }
            max
        }
        ExprKind::Block(body) => body.iter().map(temporaries).max().unwrap_or(0),
        ExprKind::Let { init, body, .. } => {
            let init_temps = init.as_deref().map(temporaries).unwrap_or(0);
            init_temps.max(temporaries(body) + 1)
        }
        ExprKind::Arith { lhs, rhs, .. }
        | ExprKind::Compare { lhs, rhs, .. }
        | ExprKind::Eq { lhs, rhs } => temporaries(lhs).max(temporaries(rhs) + 1),
        ExprKind::Neg(e) | ExprKind::Not(e) | ExprKind::IsVoid(e) => temporaries(e),
        ExprKind::New(_)
        | ExprKind::IntConst(_)
        | ExprKind::StrConst(_)
        | ExprKind::BoolConst(_)
        | ExprKind::Ident(_) => 0,
    }
}

/// Everything code generation reads: the annotated program, the class tree,
/// the derived layouts and dispatch tables, and the constant pool.
pub struct CodegenCtx<'a> {
    pub analysis: &'a Analysis,
    pub interner: &'a Interner,
    pub layouts: Layouts,
    pub dispatch: DispatchTables,
    pub pool: ConstPool,
    pub opts: CodegenOptions,
}

impl<'a> CodegenCtx<'a> {
    pub fn build(analysis: &'a Analysis, interner: &'a Interner, opts: CodegenOptions) -> Self {
        let layouts = Layouts::build(&analysis.program, &analysis.hierarchy);
        let dispatch = DispatchTables::build(&analysis.program, &analysis.hierarchy);
        let mut pool = ConstPool::new();
        collect_constants(analysis, interner, &mut pool);
        Self { analysis, interner, layouts, dispatch, pool, opts }
    }

    fn hierarchy(&self) -> &Hierarchy {
        &self.analysis.hierarchy
    }

    fn wk(&self) -> &WellKnown {
        &self.analysis.wk
    }
}

/// Pool every constant the emitted output references: class names and
/// filenames, each literal in evaluation order, and the zero/empty defaults.
fn collect_constants(analysis: &Analysis, interner: &Interner, pool: &mut ConstPool) {
    for class in &analysis.program.classes {
        pool.string(interner.resolve(class.name));
        pool.string(interner.resolve(class.loc.file));
        for attr in class.attributes() {
            if let Some(init) = &attr.init {
                collect_expr_constants(init, interner, pool);
            }
        }
        for method in class.methods() {
            if let Some(body) = &method.body {
                collect_expr_constants(body, interner, pool);
            }
        }
    }
    pool.string("");
    pool.int_text("0");
}

fn collect_expr_constants(expr: &Expr, interner: &Interner, pool: &mut ConstPool) {
    match &expr.kind {
        ExprKind::IntConst(text) => {
            pool.int_text(interner.resolve(*text));
        }
        ExprKind::StrConst(text) => {
            pool.string(interner.resolve(*text));
        }
        ExprKind::BoolConst(_) | ExprKind::Ident(_) | ExprKind::New(_) => {}
        ExprKind::Assign { value, .. } => collect_expr_constants(value, interner, pool),
        ExprKind::StaticDispatch { recv, args, .. } | ExprKind::Dispatch { recv, args, .. } => {
            for arg in args {
                collect_expr_constants(arg, interner, pool);
            }
            collect_expr_constants(recv, interner, pool);
        }
        ExprKind::Cond { pred, then_branch, else_branch } => {
            collect_expr_constants(pred, interner, pool);
            collect_expr_constants(then_branch, interner, pool);
            collect_expr_constants(else_branch, interner, pool);
        }
        ExprKind::Loop { pred, body } => {
            collect_expr_constants(pred, interner, pool);
            collect_expr_constants(body, interner, pool);
        }
        ExprKind::Case { scrutinee, branches } => {
            collect_expr_constants(scrutinee, interner, pool);
            for branch in branches {
                collect_expr_constants(&branch.body, interner, pool);
            }
        }
        ExprKind::Block(body) => {
            for e in body {
                collect_expr_constants(e, interner, pool);
            }
        }
        ExprKind::Let { init, body, .. } => {
            if let Some(init) = init {
                collect_expr_constants(init, interner, pool);
            }
            collect_expr_constants(body, interner, pool);
        }
        ExprKind::Arith { lhs, rhs, .. }
        | ExprKind::Compare { lhs, rhs, .. }
        | ExprKind::Eq { lhs, rhs } => {
            collect_expr_constants(lhs, interner, pool);
            collect_expr_constants(rhs, interner, pool);
        }
        ExprKind::Neg(e) | ExprKind::Not(e) | ExprKind::IsVoid(e) => {
            collect_expr_constants(e, interner, pool);
        }
    }
}

/// The shared per-expression-kind walker.
pub struct Codegen<'a, B: Backend> {
    ctx: &'a CodegenCtx<'a>,
    backend: &'a mut B,
    env: ScopeStack<StorageLocation>,
    current_class: Symbol,
    current_file: StrId,
    labels: u32,
    temps_in_use: i32,
}

impl<'a, B: Backend> Codegen<'a, B> {
    pub fn new(ctx: &'a CodegenCtx<'a>, backend: &'a mut B) -> Self {
        let wk = ctx.wk();
        let file = ctx
            .pool
            .lookup_string(ctx.interner.resolve(wk.basic_file))
            .expect("basic filename pooled");
        Self {
            ctx,
            backend,
            env: ScopeStack::new(),
            current_class: wk.object,
            current_file: file,
            labels: 0,
            temps_in_use: 0,
        }
    }

    /// Emit every initializer, then every user-defined method, in tag order.
    pub fn gen_program(&mut self) {
        let ctx = self.ctx;
        for id in ctx.hierarchy().classes_in_tag_order() {
            let node = ctx.hierarchy().node(id);
            let class = &ctx.analysis.program.classes[node.class_index];
            let parent = node.parent.map(|p| ctx.hierarchy().node(p).name);
            self.gen_initializer(class, parent);
        }
        for id in ctx.hierarchy().classes_in_tag_order() {
            let node = ctx.hierarchy().node(id);
            if node.basic {
                continue;
            }
            let class = &ctx.analysis.program.classes[node.class_index];
            self.gen_methods(class);
        }
    }

    fn enter_class(&mut self, class: &ClassDef) {
        self.current_class = class.name;
        self.current_file = self
            .ctx
            .pool
            .lookup_string(self.ctx.interner.resolve(class.loc.file))
            .expect("filename pooled");
        self.env.enter_scope();
        for slot in self.ctx.layouts.attrs_of(class.name) {
            self.env
                .add(slot.name, StorageLocation::self_obj(slot.offset as i32));
        }
    }

    fn exit_class(&mut self) {
        self.env.exit_scope();
    }

    fn gen_initializer(&mut self, class: &ClassDef, parent: Option<Symbol>) {
        self.enter_class(class);
        let n_temps = class
            .attributes()
            .filter_map(|a| a.init.as_ref())
            .map(temporaries)
            .max()
            .unwrap_or(0);
        self.temps_in_use = 0;

        self.backend.begin_init(class.name, n_temps);
        if let Some(parent) = parent {
            self.backend.call_init(parent);
        }
        for attr in class.attributes() {
            if let Some(init) = &attr.init {
                self.gen_expr(init);
                let loc = *self.env.lookup(attr.name).expect("attribute slot bound");
                self.backend.store(loc);
            }
        }
        // Hand the object back unchanged.
        self.backend.load(Operand::SelfPtr);
        self.backend.end_unit(n_temps, 0);
        self.exit_class();
    }

    fn gen_methods(&mut self, class: &ClassDef) {
        self.enter_class(class);
        for method in class.methods() {
            let Some(body) = &method.body else { continue };
            self.env.enter_scope();
            let n_args = method.formals.len() as u32;
            for (k, formal) in method.formals.iter().enumerate() {
                let offset = SAVED_REGS + n_args as i32 - 1 - k as i32;
                self.env.add(formal.name, StorageLocation::frame(offset));
            }
            let n_temps = temporaries(body);
            self.temps_in_use = 0;

            self.backend.begin_method(class.name, method.name, n_temps);
            self.gen_expr(body);
            self.backend.end_unit(n_temps, n_args);
            self.env.exit_scope();
        }
        self.exit_class();
    }

    fn new_label(&mut self) -> Label {
        let l = Label(self.labels);
        self.labels += 1;
        l
    }

    fn alloc_temp(&mut self) -> StorageLocation {
        self.temps_in_use += 1;
        StorageLocation::frame(-self.temps_in_use)
    }

    fn free_temp(&mut self) {
        debug_assert!(self.temps_in_use > 0);
        self.temps_in_use -= 1;
    }

    fn gen_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Ident(name) => {
                if *name == self.ctx.wk().self_ {
                    self.backend.load(Operand::SelfPtr);
                } else {
                    let loc = *self.env.lookup(*name).expect("identifier bound");
                    self.backend.load(Operand::Slot(loc));
                }
            }
            ExprKind::IntConst(text) => {
                let id = self
                    .ctx
                    .pool
                    .lookup_int(self.ctx.interner.resolve(*text))
                    .expect("int literal pooled");
                self.backend.load(Operand::IntConst(id));
            }
            ExprKind::StrConst(text) => {
                let id = self
                    .ctx
                    .pool
                    .lookup_string(self.ctx.interner.resolve(*text))
                    .expect("string literal pooled");
                self.backend.load(Operand::StrConst(id));
            }
            ExprKind::BoolConst(v) => self.backend.load(Operand::BoolConst(*v)),
            ExprKind::Assign { name, value } => {
                self.gen_expr(value);
                let loc = *self.env.lookup(*name).expect("assignment target bound");
                self.backend.store(loc);
            }
            ExprKind::Dispatch { recv, method, args } => {
                let target = self.resolved_ty(recv.ty());
                self.gen_dispatch(recv, args, expr.line, DispatchKind::Dynamic, target, *method);
            }
            ExprKind::StaticDispatch { recv, type_name, method, args } => {
                self.gen_dispatch(
                    recv,
                    args,
                    expr.line,
                    DispatchKind::Static(*type_name),
                    *type_name,
                    *method,
                );
            }
            ExprKind::Cond { pred, then_branch, else_branch } => {
                let l_else = self.new_label();
                let l_end = self.new_label();
                self.gen_expr(pred);
                self.backend.branch_if_false(l_else);
                self.gen_expr(then_branch);
                self.backend.jump(l_end);
                self.backend.label(l_else);
                self.gen_expr(else_branch);
                self.backend.label(l_end);
            }
            ExprKind::Loop { pred, body } => {
                let l_start = self.new_label();
                let l_end = self.new_label();
                self.backend.label(l_start);
                self.gen_expr(pred);
                self.backend.branch_if_false(l_end);
                self.gen_expr(body);
                self.backend.jump(l_start);
                self.backend.label(l_end);
                // A loop's value is void.
                self.backend.load(Operand::Imm(0));
            }
            ExprKind::Case { scrutinee, branches } => {
                self.gen_case(scrutinee, branches, expr.line);
            }
            ExprKind::Block(body) => {
                for e in body {
                    self.gen_expr(e);
                }
            }
            ExprKind::Let { name, declared_type, init, body } => {
                match init {
                    Some(init) => self.gen_expr(init),
                    None => self.gen_default(*declared_type),
                }
                self.env.enter_scope();
                let loc = self.alloc_temp();
                self.backend.store(loc);
                self.env.add(*name, loc);
                self.gen_expr(body);
                self.free_temp();
                self.env.exit_scope();
            }
            ExprKind::Arith { op, lhs, rhs } => {
                self.gen_expr(lhs);
                let held = self.alloc_temp();
                self.backend.store(held);
                self.gen_expr(rhs);
                self.backend.call_copy();
                self.backend.arith(*op, held);
                self.free_temp();
            }
            ExprKind::Neg(operand) => {
                self.gen_expr(operand);
                self.backend.call_copy();
                self.backend.neg();
            }
            ExprKind::Compare { op, lhs, rhs } => {
                self.gen_expr(lhs);
                let held = self.alloc_temp();
                self.backend.store(held);
                self.gen_expr(rhs);
                let done = self.new_label();
                self.backend.compare(*op, held, done);
                self.free_temp();
            }
            ExprKind::Eq { lhs, rhs } => {
                self.gen_expr(lhs);
                let held = self.alloc_temp();
                self.backend.store(held);
                self.gen_expr(rhs);
                let done = self.new_label();
                self.backend.eq_test(held, done);
                self.free_temp();
            }
            ExprKind::Not(operand) => {
                self.gen_expr(operand);
                let done = self.new_label();
                self.backend.not(done);
            }
            ExprKind::IsVoid(operand) => {
                self.gen_expr(operand);
                let done = self.new_label();
                self.backend.is_void(done);
            }
            ExprKind::New(type_name) => {
                if *type_name == self.ctx.wk().self_type {
                    self.backend.new_self_typed();
                } else {
                    self.backend.load(Operand::Proto(*type_name));
                    self.backend.call_copy();
                    self.backend.call_init(*type_name);
                }
            }
        }
    }

    fn resolved_ty(&self, ty: Ty) -> Symbol {
        match ty {
            Ty::Named(s) => s,
            Ty::SelfTy => self.current_class,
            Ty::NoTy => unreachable!("error-typed expression survived analysis"),
        }
    }

    fn gen_dispatch(
        &mut self,
        recv: &Expr,
        args: &[Expr],
        line: u32,
        kind: DispatchKind,
        table_class: Symbol,
        method: Symbol,
    ) {
        for arg in args {
            self.gen_expr(arg);
            self.backend.push_acc();
        }
        self.gen_expr(recv);
        let ok = self.new_label();
        self.backend.branch_if_nonvoid(ok);
        self.backend.abort_dispatch(self.current_file, line);
        self.backend.label(ok);
        let slot = self.ctx.dispatch.slot_of(table_class, method);
        self.backend.call_dispatch(kind, slot);
    }

    fn gen_case(&mut self, scrutinee: &Expr, branches: &[CaseBranch], line: u32) {
        // Most specific first: deeper classes have larger tags, so sorting
        // by descending tag tests subclasses before their ancestors.
        let mut order: Vec<usize> = (0..branches.len()).collect();
        order.sort_by_key(|&i| {
            std::cmp::Reverse(self.ctx.hierarchy().tag(branches[i].declared_type))
        });

        let branch_labels: Vec<Label> = (0..branches.len()).map(|_| self.new_label()).collect();
        let l_abort = self.new_label();
        let l_end = self.new_label();

        self.gen_expr(scrutinee);
        self.backend.branch_if_nonvoid(branch_labels[0]);
        self.backend.abort_case_void(self.current_file, line);

        for (pos, &idx) in order.iter().enumerate() {
            let branch = &branches[idx];
            let miss = if pos + 1 < order.len() {
                branch_labels[pos + 1]
            } else {
                l_abort
            };
            self.backend.label(branch_labels[pos]);
            if pos == 0 {
                self.backend.load_tag();
            }
            let lo = self.ctx.hierarchy().tag(branch.declared_type);
            let hi = self.ctx.hierarchy().max_subtree_tag(branch.declared_type);
            self.backend.branch_tag_outside(lo, hi, miss);

            self.env.enter_scope();
            let loc = self.alloc_temp();
            self.backend.store(loc);
            self.env.add(branch.name, loc);
            self.gen_expr(&branch.body);
            self.free_temp();
            self.env.exit_scope();
            self.backend.jump(l_end);
        }

        self.backend.label(l_abort);
        self.backend.abort_case_miss();
        self.backend.label(l_end);
    }

    fn gen_default(&mut self, declared_type: Symbol) {
        let wk = self.ctx.wk();
        if declared_type == wk.int {
            let zero = self.ctx.pool.lookup_int("0").expect("zero pooled");
            self.backend.load(Operand::IntConst(zero));
        } else if declared_type == wk.bool_ {
            self.backend.load(Operand::BoolConst(false));
        } else if declared_type == wk.string {
            let empty = self.ctx.pool.lookup_string("").expect("empty string pooled");
            self.backend.load(Operand::StrConst(empty));
        } else {
            self.backend.load(Operand::Imm(0));
        }
    }
}
