//! Three-address backend.
//!
//! Records the walker's operation stream as an ordered instruction list per
//! initializer and method, over a small operand algebra, for a separate
//! lowering stage. The walk is identical to the text backend's, so labels,
//! frame slots, and control shape agree between the two outputs.

use std::fmt::Write;

use crate::ast::{ArithOp, CmpOp};
use crate::semant::Analysis;
use crate::symbols::{Interner, IntId, StrId, Symbol, WellKnown};

use super::{
    Backend, Base, Codegen, CodegenCtx, CodegenOptions, DispatchKind, GcPolicy, Label, Operand,
    StorageLocation, DISPTAB_OFFSET, WORD_SIZE,
};

/// Operands of the intermediate form: the accumulator and self, two scratch
/// registers for pointer chasing and tag tests, frame/object slots, and
/// immediates or pooled constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TacOperand {
    Acc,
    SelfPtr,
    Ptr,
    Tag,
    Slot(StorageLocation),
    Imm(i32),
    IntConst(IntId),
    StrConst(StrId),
    BoolConst(bool),
    Proto(Symbol),
    DispTab(Symbol),
    ObjTab,
}

impl From<Operand> for TacOperand {
    fn from(op: Operand) -> Self {
        match op {
            Operand::Acc => TacOperand::Acc,
            Operand::SelfPtr => TacOperand::SelfPtr,
            Operand::Slot(loc) => TacOperand::Slot(loc),
            Operand::Imm(v) => TacOperand::Imm(v),
            Operand::IntConst(id) => TacOperand::IntConst(id),
            Operand::StrConst(id) => TacOperand::StrConst(id),
            Operand::BoolConst(v) => TacOperand::BoolConst(v),
            Operand::Proto(c) => TacOperand::Proto(c),
            Operand::DispTab(c) => TacOperand::DispTab(c),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TacCmp {
    Lt,
    Le,
    Eq,
}

#[derive(Debug, Clone, Copy)]
pub enum RuntimeFn {
    EqualityTest,
    DispatchAbort,
    CaseAbortVoid,
    CaseAbortMiss,
}

impl RuntimeFn {
    pub fn symbol(self) -> &'static str {
        match self {
            RuntimeFn::EqualityTest => "equality_test",
            RuntimeFn::DispatchAbort => "_dispatch_abort",
            RuntimeFn::CaseAbortVoid => "_case_abort2",
            RuntimeFn::CaseAbortMiss => "_case_abort",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum CallTarget {
    Method(Symbol, Symbol),
    Init(Symbol),
    Runtime(RuntimeFn),
    Indirect(TacOperand),
}

#[derive(Debug, Clone, Copy)]
pub enum Instr {
    Label(Label),
    Assign { dst: TacOperand, src: TacOperand },
    Arith { op: ArithOp, dst: TacOperand, lhs: TacOperand, rhs: TacOperand },
    Compare { op: TacCmp, dst: TacOperand, lhs: TacOperand, rhs: TacOperand },
    Neg { dst: TacOperand, src: TacOperand },
    Not { dst: TacOperand, src: TacOperand },
    IsVoid { dst: TacOperand, src: TacOperand },
    /// dst <- mem[base + index words]
    Load { dst: TacOperand, base: TacOperand, index: i32 },
    Jump(Label),
    BranchZero { val: TacOperand, target: Label },
    BranchNonZero { val: TacOperand, target: Label },
    Push(TacOperand),
    Pop(TacOperand),
    Call(CallTarget),
    Return,
}

/// One initializer or method body as an instruction list plus its frame
/// requirements.
#[derive(Debug)]
pub struct TacUnit {
    pub class: Symbol,
    pub method: Option<Symbol>,
    pub n_temps: u32,
    pub n_args: u32,
    pub code: Vec<Instr>,
}

/// Per-class tag range, attribute offsets, and dispatch rows, carried along
/// with the code so the lowering stage needs nothing else.
#[derive(Debug)]
pub struct ClassTables {
    pub class: Symbol,
    pub tag: u32,
    pub max_subtree_tag: u32,
    pub object_words: u32,
    pub attrs: Vec<(Symbol, u32)>,
    pub dispatch: Vec<(Symbol, Symbol)>,
}

#[derive(Debug)]
pub struct TacProgram {
    pub gc: GcPolicy,
    pub tables: Vec<ClassTables>,
    pub units: Vec<TacUnit>,
}

pub struct TacBackend {
    wk: WellKnown,
    units: Vec<TacUnit>,
    current: Option<TacUnit>,
}

impl TacBackend {
    fn new(wk: WellKnown) -> Self {
        Self { wk, units: Vec::new(), current: None }
    }

    fn emit(&mut self, instr: Instr) {
        self.current
            .as_mut()
            .expect("instruction outside a unit")
            .code
            .push(instr);
    }
}

impl Backend for TacBackend {
    fn begin_init(&mut self, class: Symbol, n_temps: u32) {
        self.current = Some(TacUnit {
            class,
            method: None,
            n_temps,
            n_args: 0,
            code: Vec::new(),
        });
    }

    fn begin_method(&mut self, class: Symbol, method: Symbol, n_temps: u32) {
        self.current = Some(TacUnit {
            class,
            method: Some(method),
            n_temps,
            n_args: 0,
            code: Vec::new(),
        });
    }

    fn end_unit(&mut self, _n_temps: u32, n_args: u32) {
        self.emit(Instr::Return);
        let mut unit = self.current.take().expect("unit in progress");
        unit.n_args = n_args;
        self.units.push(unit);
    }

    fn load(&mut self, src: Operand) {
        if src == Operand::Acc {
            return;
        }
        self.emit(Instr::Assign { dst: TacOperand::Acc, src: src.into() });
    }

    fn store(&mut self, dst: StorageLocation) {
        self.emit(Instr::Assign { dst: TacOperand::Slot(dst), src: TacOperand::Acc });
    }

    fn push_acc(&mut self) {
        self.emit(Instr::Push(TacOperand::Acc));
    }

    fn label(&mut self, l: Label) {
        self.emit(Instr::Label(l));
    }

    fn jump(&mut self, l: Label) {
        self.emit(Instr::Jump(l));
    }

    fn branch_if_false(&mut self, l: Label) {
        self.emit(Instr::BranchZero { val: TacOperand::Acc, target: l });
    }

    fn branch_if_nonvoid(&mut self, l: Label) {
        self.emit(Instr::BranchNonZero { val: TacOperand::Acc, target: l });
    }

    fn arith(&mut self, op: ArithOp, lhs: StorageLocation) {
        self.emit(Instr::Arith {
            op,
            dst: TacOperand::Acc,
            lhs: TacOperand::Slot(lhs),
            rhs: TacOperand::Acc,
        });
    }

    fn neg(&mut self) {
        self.emit(Instr::Neg { dst: TacOperand::Acc, src: TacOperand::Acc });
    }

    fn not(&mut self, _done: Label) {
        self.emit(Instr::Not { dst: TacOperand::Acc, src: TacOperand::Acc });
    }

    fn is_void(&mut self, _done: Label) {
        self.emit(Instr::IsVoid { dst: TacOperand::Acc, src: TacOperand::Acc });
    }

    fn compare(&mut self, op: CmpOp, lhs: StorageLocation, _done: Label) {
        let op = match op {
            CmpOp::Lt => TacCmp::Lt,
            CmpOp::Le => TacCmp::Le,
        };
        self.emit(Instr::Compare {
            op,
            dst: TacOperand::Acc,
            lhs: TacOperand::Slot(lhs),
            rhs: TacOperand::Acc,
        });
    }

    fn eq_test(&mut self, lhs: StorageLocation, _done: Label) {
        self.emit(Instr::Compare {
            op: TacCmp::Eq,
            dst: TacOperand::Acc,
            lhs: TacOperand::Slot(lhs),
            rhs: TacOperand::Acc,
        });
    }

    fn load_tag(&mut self) {
        self.emit(Instr::Load { dst: TacOperand::Tag, base: TacOperand::Acc, index: 0 });
    }

    fn branch_tag_outside(&mut self, lo: u32, hi: u32, miss: Label) {
        self.emit(Instr::Compare {
            op: TacCmp::Lt,
            dst: TacOperand::Ptr,
            lhs: TacOperand::Tag,
            rhs: TacOperand::Imm(lo as i32),
        });
        self.emit(Instr::BranchNonZero { val: TacOperand::Ptr, target: miss });
        self.emit(Instr::Compare {
            op: TacCmp::Lt,
            dst: TacOperand::Ptr,
            lhs: TacOperand::Imm(hi as i32),
            rhs: TacOperand::Tag,
        });
        self.emit(Instr::BranchNonZero { val: TacOperand::Ptr, target: miss });
    }

    fn call_dispatch(&mut self, kind: DispatchKind, slot: u32) {
        match kind {
            DispatchKind::Static(class) => {
                self.emit(Instr::Load {
                    dst: TacOperand::Ptr,
                    base: TacOperand::DispTab(class),
                    index: slot as i32,
                });
            }
            DispatchKind::Dynamic => {
                self.emit(Instr::Load {
                    dst: TacOperand::Ptr,
                    base: TacOperand::Acc,
                    index: DISPTAB_OFFSET,
                });
                self.emit(Instr::Load {
                    dst: TacOperand::Ptr,
                    base: TacOperand::Ptr,
                    index: slot as i32,
                });
            }
        }
        self.emit(Instr::Call(CallTarget::Indirect(TacOperand::Ptr)));
    }

    fn call_init(&mut self, class: Symbol) {
        self.emit(Instr::Call(CallTarget::Init(class)));
    }

    fn call_copy(&mut self) {
        self.emit(Instr::Call(CallTarget::Method(self.wk.object, self.wk.copy)));
    }

    fn new_self_typed(&mut self) {
        // Index class_objTab by the receiver's tag; pairs of words per class.
        self.emit(Instr::Assign { dst: TacOperand::Ptr, src: TacOperand::ObjTab });
        self.emit(Instr::Load { dst: TacOperand::Tag, base: TacOperand::SelfPtr, index: 0 });
        self.emit(Instr::Arith {
            op: ArithOp::Mul,
            dst: TacOperand::Tag,
            lhs: TacOperand::Tag,
            rhs: TacOperand::Imm(2 * WORD_SIZE as i32),
        });
        self.emit(Instr::Arith {
            op: ArithOp::Add,
            dst: TacOperand::Ptr,
            lhs: TacOperand::Ptr,
            rhs: TacOperand::Tag,
        });
        self.emit(Instr::Load { dst: TacOperand::Acc, base: TacOperand::Ptr, index: 0 });
        self.emit(Instr::Push(TacOperand::Ptr));
        self.emit(Instr::Call(CallTarget::Method(self.wk.object, self.wk.copy)));
        self.emit(Instr::Pop(TacOperand::Ptr));
        self.emit(Instr::Load { dst: TacOperand::Ptr, base: TacOperand::Ptr, index: 1 });
        self.emit(Instr::Call(CallTarget::Indirect(TacOperand::Ptr)));
    }

    fn abort_dispatch(&mut self, file: StrId, line: u32) {
        self.emit(Instr::Assign { dst: TacOperand::Ptr, src: TacOperand::StrConst(file) });
        self.emit(Instr::Assign { dst: TacOperand::Tag, src: TacOperand::Imm(line as i32) });
        self.emit(Instr::Call(CallTarget::Runtime(RuntimeFn::DispatchAbort)));
    }

    fn abort_case_void(&mut self, file: StrId, line: u32) {
        self.emit(Instr::Assign { dst: TacOperand::Ptr, src: TacOperand::StrConst(file) });
        self.emit(Instr::Assign { dst: TacOperand::Tag, src: TacOperand::Imm(line as i32) });
        self.emit(Instr::Call(CallTarget::Runtime(RuntimeFn::CaseAbortVoid)));
    }

    fn abort_case_miss(&mut self) {
        self.emit(Instr::Call(CallTarget::Runtime(RuntimeFn::CaseAbortMiss)));
    }
}

/// Produce the three-address form of an analyzed program, plus the layout
/// and dispatch tables the lowering stage needs.
pub fn emit_program(
    analysis: &Analysis,
    interner: &Interner,
    opts: CodegenOptions,
) -> TacProgram {
    let ctx = CodegenCtx::build(analysis, interner, opts);
    let mut backend = TacBackend::new(*ctx.wk());

    {
        let mut walker = Codegen::new(&ctx, &mut backend);
        walker.gen_program();
    }

    let tables = ctx
        .hierarchy()
        .classes_in_tag_order()
        .into_iter()
        .map(|id| {
            let node = ctx.hierarchy().node(id);
            ClassTables {
                class: node.name,
                tag: node.tag,
                max_subtree_tag: node.max_subtree_tag,
                object_words: ctx.layouts.object_words(node.name),
                attrs: ctx
                    .layouts
                    .attrs_of(node.name)
                    .iter()
                    .map(|slot| (slot.name, slot.offset))
                    .collect(),
                dispatch: ctx
                    .dispatch
                    .table_of(node.name)
                    .iter()
                    .map(|e| (e.owner, e.method))
                    .collect(),
            }
        })
        .collect();

    TacProgram { gc: opts.gc, tables, units: backend.units }
}

fn render_operand(op: TacOperand, interner: &Interner) -> String {
    match op {
        TacOperand::Acc => "acc".to_string(),
        TacOperand::SelfPtr => "self".to_string(),
        TacOperand::Ptr => "ptr".to_string(),
        TacOperand::Tag => "tag".to_string(),
        TacOperand::Slot(loc) => match loc.base {
            Base::Frame => format!("fp[{}]", loc.offset),
            Base::SelfObj => format!("obj[{}]", loc.offset),
        },
        TacOperand::Imm(v) => v.to_string(),
        TacOperand::IntConst(id) => format!("int_const{}", id.0),
        TacOperand::StrConst(id) => format!("str_const{}", id.0),
        TacOperand::BoolConst(v) => {
            if v { "bool_const1".to_string() } else { "bool_const0".to_string() }
        }
        TacOperand::Proto(c) => format!("&{}_protObj", interner.resolve(c)),
        TacOperand::DispTab(c) => format!("&{}_dispTab", interner.resolve(c)),
        TacOperand::ObjTab => "&class_objTab".to_string(),
    }
}

fn render_instr(instr: &Instr, interner: &Interner) -> String {
    let op = |o: TacOperand| render_operand(o, interner);
    match instr {
        Instr::Label(l) => format!("label{}:", l.0),
        Instr::Assign { dst, src } => format!("\t{} <- {}", op(*dst), op(*src)),
        Instr::Arith { op: a, dst, lhs, rhs } => {
            let mnemonic = match a {
                ArithOp::Add => "add",
                ArithOp::Sub => "sub",
                ArithOp::Mul => "mul",
                ArithOp::Div => "div",
            };
            format!("\t{} <- {} {mnemonic} {}", op(*dst), op(*lhs), op(*rhs))
        }
        Instr::Compare { op: c, dst, lhs, rhs } => {
            let mnemonic = match c {
                TacCmp::Lt => "lt",
                TacCmp::Le => "le",
                TacCmp::Eq => "eq",
            };
            format!("\t{} <- {} {mnemonic} {}", op(*dst), op(*lhs), op(*rhs))
        }
        Instr::Neg { dst, src } => format!("\t{} <- neg {}", op(*dst), op(*src)),
        Instr::Not { dst, src } => format!("\t{} <- not {}", op(*dst), op(*src)),
        Instr::IsVoid { dst, src } => format!("\t{} <- isvoid {}", op(*dst), op(*src)),
        Instr::Load { dst, base, index } => {
            format!("\t{} <- mem[{} + {}]", op(*dst), op(*base), index)
        }
        Instr::Jump(l) => format!("\tgoto label{}", l.0),
        Instr::BranchZero { val, target } => {
            format!("\tif {} == 0 goto label{}", op(*val), target.0)
        }
        Instr::BranchNonZero { val, target } => {
            format!("\tif {} != 0 goto label{}", op(*val), target.0)
        }
        Instr::Push(v) => format!("\tpush {}", op(*v)),
        Instr::Pop(v) => format!("\tpop {}", op(*v)),
        Instr::Call(target) => match target {
            CallTarget::Method(c, m) => {
                format!("\tcall {}.{}", interner.resolve(*c), interner.resolve(*m))
            }
            CallTarget::Init(c) => format!("\tcall {}_init", interner.resolve(*c)),
            CallTarget::Runtime(f) => format!("\tcall {}", f.symbol()),
            CallTarget::Indirect(o) => format!("\tcall *{}", op(*o)),
        },
        Instr::Return => "\treturn".to_string(),
    }
}

impl TacProgram {
    pub fn render(&self, interner: &Interner) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "# gc {}", self.gc.initializer());
        let _ = writeln!(out, "# class tables");
        for t in &self.tables {
            let name = interner.resolve(t.class);
            let _ = writeln!(
                out,
                "class {name} tag={} range=[{}, {}] words={}",
                t.tag, t.tag, t.max_subtree_tag, t.object_words
            );
            for (attr, offset) in &t.attrs {
                let _ = writeln!(out, "\tattr {} @ {}", interner.resolve(*attr), offset);
            }
            for (slot, (owner, method)) in t.dispatch.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "\tmethod {slot}: {}.{}",
                    interner.resolve(*owner),
                    interner.resolve(*method)
                );
            }
        }
        let _ = writeln!(out, "# code");
        for unit in &self.units {
            let class = interner.resolve(unit.class);
            match unit.method {
                Some(m) => {
                    let _ = writeln!(
                        out,
                        "{class}.{} [temps={} args={}]:",
                        interner.resolve(m),
                        unit.n_temps,
                        unit.n_args
                    );
                }
                None => {
                    let _ = writeln!(out, "{class}_init [temps={} args={}]:", unit.n_temps, unit.n_args);
                }
            }
            for instr in &unit.code {
                let _ = writeln!(out, "{}", render_instr(instr, interner));
            }
        }
        out
    }
}
