//! Direct text emission backend.
//!
//! Renders the walker's operation stream as MIPS-flavored assembly and emits
//! the static data the runtime expects: tag words, GC selection, pooled
//! constants, the class name and object tables, dispatch tables, and
//! prototype objects. Naming conventions:
//!
//!   dispatch table      <Class>_dispTab
//!   method entry        <Class>.<method>
//!   initializer         <Class>_init
//!   prototype object    <Class>_protObj
//!   integer constant    int_const<i>
//!   string constant     str_const<i>

use crate::ast::{ArithOp, CmpOp};
use crate::semant::Analysis;
use crate::symbols::{Interner, StrId, Symbol};

use super::{
    Backend, Base, Codegen, CodegenCtx, CodegenOptions, DispatchKind, Label, Operand,
    StorageLocation, DISPTAB_OFFSET, SAVED_REGS, WORD_SIZE,
};

const ZERO: &str = "$zero";
const ACC: &str = "$a0";
const A1: &str = "$a1";
const SELF: &str = "$s0";
const T0: &str = "$t0";
const T1: &str = "$t1";
const T2: &str = "$t2";
const SP: &str = "$sp";
const FP: &str = "$fp";
const RA: &str = "$ra";

/// Word offset of the boxed value in Int, Bool, and String objects.
const VALUE_OFFSET: i32 = 3;

pub struct AsmBackend<'a> {
    out: String,
    interner: &'a Interner,
}

impl<'a> AsmBackend<'a> {
    fn new(interner: &'a Interner) -> Self {
        Self { out: String::new(), interner }
    }

    fn name(&self, sym: Symbol) -> &str {
        self.interner.resolve(sym)
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn base_reg(loc: StorageLocation) -> &'static str {
        match loc.base {
            Base::Frame => FP,
            Base::SelfObj => SELF,
        }
    }

    fn lw(&mut self, dest: &str, offset: i32, src: &str) {
        self.line(format!("\tlw\t{dest} {}({src})", offset * WORD_SIZE as i32));
    }

    fn sw(&mut self, src: &str, offset: i32, dest: &str) {
        self.line(format!("\tsw\t{src} {}({dest})", offset * WORD_SIZE as i32));
    }

    fn la(&mut self, dest: &str, address: impl AsRef<str>) {
        self.line(format!("\tla\t{dest} {}", address.as_ref()));
    }

    fn li(&mut self, dest: &str, value: i32) {
        self.line(format!("\tli\t{dest} {value}"));
    }

    fn move_(&mut self, dest: &str, src: &str) {
        self.line(format!("\tmove\t{dest} {src}"));
    }

    fn jal(&mut self, target: impl AsRef<str>) {
        self.line(format!("\tjal\t{}", target.as_ref()));
    }

    fn addiu(&mut self, dest: &str, src: &str, imm: i32) {
        self.line(format!("\taddiu\t{dest} {src} {imm}"));
    }

    fn push(&mut self, reg: &str) {
        self.sw(reg, 0, SP);
        self.addiu(SP, SP, -(WORD_SIZE as i32));
    }

    fn pop(&mut self, reg: &str) {
        self.lw(reg, 1, SP);
        self.addiu(SP, SP, WORD_SIZE as i32);
    }

    fn label_ref(l: Label) -> String {
        format!("label{}", l.0)
    }

    fn bool_ref(value: bool) -> &'static str {
        if value { "bool_const1" } else { "bool_const0" }
    }

    /// Fetch the primitive value boxed in the object `src` points at.
    fn fetch_value(&mut self, dest: &str, src: &str) {
        self.lw(dest, VALUE_OFFSET, src);
    }

    fn store_value(&mut self, src: &str, dest: &str) {
        self.sw(src, VALUE_OFFSET, dest);
    }
}

impl Backend for AsmBackend<'_> {
    fn begin_init(&mut self, class: Symbol, n_temps: u32) {
        self.line(format!("{}_init:", self.name(class)));
        prologue(self, n_temps);
    }

    fn begin_method(&mut self, class: Symbol, method: Symbol, n_temps: u32) {
        self.line(format!("{}.{}:", self.name(class), self.name(method)));
        prologue(self, n_temps);
    }

    fn end_unit(&mut self, n_temps: u32, n_args: u32) {
        self.lw(RA, 0, FP);
        self.lw(SELF, 1, FP);
        self.lw(FP, 2, FP);
        self.addiu(SP, SP, (WORD_SIZE * (SAVED_REGS as u32 + n_temps + n_args)) as i32);
        self.line(format!("\tjr\t{RA}"));
    }

    fn load(&mut self, src: Operand) {
        match src {
            Operand::Acc => {}
            Operand::SelfPtr => self.move_(ACC, SELF),
            Operand::Slot(loc) => self.lw(ACC, loc.offset, Self::base_reg(loc)),
            Operand::Imm(value) => self.li(ACC, value),
            Operand::IntConst(id) => self.la(ACC, format!("int_const{}", id.0)),
            Operand::StrConst(id) => self.la(ACC, format!("str_const{}", id.0)),
            Operand::BoolConst(value) => self.la(ACC, Self::bool_ref(value)),
            Operand::Proto(class) => {
                let address = format!("{}_protObj", self.name(class));
                self.la(ACC, address);
            }
            Operand::DispTab(class) => {
                let address = format!("{}_dispTab", self.name(class));
                self.la(ACC, address);
            }
        }
    }

    fn store(&mut self, dst: StorageLocation) {
        self.sw(ACC, dst.offset, Self::base_reg(dst));
    }

    fn push_acc(&mut self) {
        self.push(ACC);
    }

    fn label(&mut self, l: Label) {
        self.line(format!("{}:", Self::label_ref(l)));
    }

    fn jump(&mut self, l: Label) {
        self.line(format!("\tb\t{}", Self::label_ref(l)));
    }

    fn branch_if_false(&mut self, l: Label) {
        self.fetch_value(T0, ACC);
        self.line(format!("\tbeqz\t{T0} {}", Self::label_ref(l)));
    }

    fn branch_if_nonvoid(&mut self, l: Label) {
        self.line(format!("\tbne\t{ACC} {ZERO} {}", Self::label_ref(l)));
    }

    fn arith(&mut self, op: ArithOp, lhs: StorageLocation) {
        self.lw(T0, lhs.offset, Self::base_reg(lhs));
        self.fetch_value(T1, T0);
        self.fetch_value(T2, ACC);
        let mnemonic = match op {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
        };
        self.line(format!("\t{mnemonic}\t{T1} {T1} {T2}"));
        self.store_value(T1, ACC);
    }

    fn neg(&mut self) {
        self.fetch_value(T0, ACC);
        self.line(format!("\tneg\t{T0} {T0}"));
        self.store_value(T0, ACC);
    }

    fn not(&mut self, done: Label) {
        self.fetch_value(T0, ACC);
        self.la(ACC, Self::bool_ref(true));
        self.line(format!("\tbeqz\t{T0} {}", Self::label_ref(done)));
        self.la(ACC, Self::bool_ref(false));
        self.label(done);
    }

    fn is_void(&mut self, done: Label) {
        self.move_(T0, ACC);
        self.la(ACC, Self::bool_ref(true));
        self.line(format!("\tbeqz\t{T0} {}", Self::label_ref(done)));
        self.la(ACC, Self::bool_ref(false));
        self.label(done);
    }

    fn compare(&mut self, op: CmpOp, lhs: StorageLocation, done: Label) {
        self.lw(T0, lhs.offset, Self::base_reg(lhs));
        self.fetch_value(T1, T0);
        self.fetch_value(T2, ACC);
        self.la(ACC, Self::bool_ref(true));
        let mnemonic = match op {
            CmpOp::Lt => "blt",
            CmpOp::Le => "ble",
        };
        self.line(format!("\t{mnemonic}\t{T1} {T2} {}", Self::label_ref(done)));
        self.la(ACC, Self::bool_ref(false));
        self.label(done);
    }

    fn eq_test(&mut self, lhs: StorageLocation, done: Label) {
        self.lw(T1, lhs.offset, Self::base_reg(lhs));
        self.move_(T2, ACC);
        self.la(ACC, Self::bool_ref(true));
        self.line(format!("\tbeq\t{T1} {T2} {}", Self::label_ref(done)));
        self.la(A1, Self::bool_ref(false));
        self.jal("equality_test");
        self.label(done);
    }

    fn load_tag(&mut self) {
        self.lw(T2, 0, ACC);
    }

    fn branch_tag_outside(&mut self, lo: u32, hi: u32, miss: Label) {
        self.line(format!("\tblt\t{T2} {lo} {}", Self::label_ref(miss)));
        self.line(format!("\tbgt\t{T2} {hi} {}", Self::label_ref(miss)));
    }

    fn call_dispatch(&mut self, kind: DispatchKind, slot: u32) {
        match kind {
            DispatchKind::Static(class) => {
                let address = format!("{}_dispTab", self.name(class));
                self.la(T0, address);
            }
            DispatchKind::Dynamic => self.lw(T0, DISPTAB_OFFSET, ACC),
        }
        self.lw(T0, slot as i32, T0);
        self.line(format!("\tjalr\t{T0}"));
    }

    fn call_init(&mut self, class: Symbol) {
        let target = format!("{}_init", self.name(class));
        self.jal(target);
    }

    fn call_copy(&mut self) {
        self.jal("Object.copy");
    }

    fn new_self_typed(&mut self) {
        // Index class_objTab by the receiver's tag: each class contributes a
        // prototype/initializer pair, hence the doubling shift.
        self.la(T1, "class_objTab");
        self.lw(T2, 0, SELF);
        self.line(format!("\tsll\t{T2} {T2} 3"));
        self.line(format!("\taddu\t{T1} {T1} {T2}"));
        self.lw(ACC, 0, T1);
        self.push(T1);
        self.jal("Object.copy");
        self.pop(T1);
        self.lw(T1, 1, T1);
        self.line(format!("\tjalr\t{T1}"));
    }

    fn abort_dispatch(&mut self, file: StrId, line: u32) {
        self.la(ACC, format!("str_const{}", file.0));
        self.li(T1, line as i32);
        self.jal("_dispatch_abort");
    }

    fn abort_case_void(&mut self, file: StrId, line: u32) {
        self.la(ACC, format!("str_const{}", file.0));
        self.li(T1, line as i32);
        self.jal("_case_abort2");
    }

    fn abort_case_miss(&mut self) {
        self.jal("_case_abort");
    }
}

fn prologue(b: &mut AsmBackend<'_>, n_temps: u32) {
    b.sw(FP, 0, SP);
    b.sw(SELF, -1, SP);
    b.sw(RA, -2, SP);
    b.addiu(FP, SP, -((SAVED_REGS - 1) * WORD_SIZE as i32));
    b.addiu(SP, SP, -((WORD_SIZE * (SAVED_REGS as u32 + n_temps)) as i32));
    b.move_(SELF, ACC);
}

/// Emit the complete assembly stream for an analyzed program.
pub fn emit_program(
    analysis: &Analysis,
    interner: &Interner,
    opts: CodegenOptions,
) -> String {
    let ctx = CodegenCtx::build(analysis, interner, opts);
    let mut backend = AsmBackend::new(interner);

    backend.line("# start of generated code");
    emit_global_data(&mut backend, &ctx);
    emit_gc_selection(&mut backend, &ctx);
    emit_constants(&mut backend, &ctx);
    emit_class_name_table(&mut backend, &ctx);
    emit_class_obj_table(&mut backend, &ctx);
    emit_dispatch_tables(&mut backend, &ctx);
    emit_prototypes(&mut backend, &ctx);
    emit_global_text(&mut backend);

    let mut walker = Codegen::new(&ctx, &mut backend);
    walker.gen_program();

    backend.line("\n# end of generated code");
    backend.out
}

fn word(b: &mut AsmBackend<'_>, value: impl AsRef<str>) {
    b.line(format!("\t.word\t{}", value.as_ref()));
}

fn global(b: &mut AsmBackend<'_>, name: impl AsRef<str>) {
    b.line(format!("\t.globl\t{}", name.as_ref()));
}

fn emit_global_data(b: &mut AsmBackend<'_>, ctx: &CodegenCtx<'_>) {
    let wk = ctx.wk();
    b.line("\t.data");
    b.line("\t.align\t2");
    global(b, "class_nameTab");
    global(b, "Main_protObj");
    global(b, "Int_protObj");
    global(b, "String_protObj");
    global(b, "bool_const0");
    global(b, "bool_const1");
    global(b, "_int_tag");
    global(b, "_bool_tag");
    global(b, "_string_tag");
    b.line("_int_tag:");
    word(b, ctx.hierarchy().tag(wk.int).to_string());
    b.line("_bool_tag:");
    word(b, ctx.hierarchy().tag(wk.bool_).to_string());
    b.line("_string_tag:");
    word(b, ctx.hierarchy().tag(wk.string).to_string());
}

fn emit_gc_selection(b: &mut AsmBackend<'_>, ctx: &CodegenCtx<'_>) {
    global(b, "_MemMgr_INITIALIZER");
    b.line("_MemMgr_INITIALIZER:");
    word(b, ctx.opts.gc.initializer());
    global(b, "_MemMgr_COLLECTOR");
    b.line("_MemMgr_COLLECTOR:");
    word(b, ctx.opts.gc.collector());
    global(b, "_MemMgr_TEST");
    b.line("_MemMgr_TEST:");
    word(b, if ctx.opts.gc_test { "1" } else { "0" });
}

fn emit_constants(b: &mut AsmBackend<'_>, ctx: &CodegenCtx<'_>) {
    let wk = ctx.wk();
    let string_tag = ctx.hierarchy().tag(wk.string);
    let int_tag = ctx.hierarchy().tag(wk.int);
    let bool_tag = ctx.hierarchy().tag(wk.bool_);

    for (id, value) in ctx.pool.strings() {
        let len_ref = ctx
            .pool
            .lookup_int(&value.len().to_string())
            .expect("length pooled with the string");
        word(b, "-1");
        b.line(format!("str_const{}:", id.0));
        word(b, string_tag.to_string());
        let words = 4 + (value.len() as u32 + 4) / 4;
        word(b, words.to_string());
        word(b, "String_dispTab");
        word(b, format!("int_const{}", len_ref.0));
        emit_string_bytes(b, value);
        b.line("\t.align\t2");
    }

    for (id, text) in ctx.pool.ints() {
        word(b, "-1");
        b.line(format!("int_const{}:", id.0));
        word(b, int_tag.to_string());
        word(b, "4");
        word(b, "Int_dispTab");
        word(b, text);
    }

    for value in [false, true] {
        word(b, "-1");
        b.line(format!("{}:", AsmBackend::bool_ref(value)));
        word(b, bool_tag.to_string());
        word(b, "4");
        word(b, "Bool_dispTab");
        word(b, if value { "1" } else { "0" });
    }
}

/// Printable characters go out as escaped `.ascii` runs; anything else as a
/// raw byte. A terminating zero byte follows.
fn emit_string_bytes(b: &mut AsmBackend<'_>, value: &str) {
    let mut run = String::new();
    let flush = |b: &mut AsmBackend<'_>, run: &mut String| {
        if !run.is_empty() {
            b.line(format!("\t.ascii\t\"{run}\""));
            run.clear();
        }
    };
    for byte in value.bytes() {
        match byte {
            b'\n' => run.push_str("\\n"),
            b'\t' => run.push_str("\\t"),
            b'\\' => run.push_str("\\\\"),
            b'"' => run.push_str("\\\""),
            0x20..=0x7e => run.push(byte as char),
            other => {
                flush(b, &mut run);
                b.line(format!("\t.byte\t{other}"));
            }
        }
    }
    flush(b, &mut run);
    b.line("\t.byte\t0");
}

fn emit_class_name_table(b: &mut AsmBackend<'_>, ctx: &CodegenCtx<'_>) {
    b.line("class_nameTab:");
    for id in ctx.hierarchy().classes_in_tag_order() {
        let name = ctx.hierarchy().node(id).name;
        let str_id = ctx
            .pool
            .lookup_string(ctx.interner.resolve(name))
            .expect("class name pooled");
        word(b, format!("str_const{}", str_id.0));
    }
}

fn emit_class_obj_table(b: &mut AsmBackend<'_>, ctx: &CodegenCtx<'_>) {
    b.line("class_objTab:");
    for id in ctx.hierarchy().classes_in_tag_order() {
        let name = ctx.interner.resolve(ctx.hierarchy().node(id).name).to_string();
        word(b, format!("{name}_protObj"));
        word(b, format!("{name}_init"));
    }
}

fn emit_dispatch_tables(b: &mut AsmBackend<'_>, ctx: &CodegenCtx<'_>) {
    for id in ctx.hierarchy().classes_in_tag_order() {
        let class = ctx.hierarchy().node(id).name;
        b.line(format!("{}_dispTab:", ctx.interner.resolve(class)));
        for entry in ctx.dispatch.table_of(class) {
            word(
                b,
                format!(
                    "{}.{}",
                    ctx.interner.resolve(entry.owner),
                    ctx.interner.resolve(entry.method)
                ),
            );
        }
    }
}

fn emit_prototypes(b: &mut AsmBackend<'_>, ctx: &CodegenCtx<'_>) {
    let wk = ctx.wk();
    for id in ctx.hierarchy().classes_in_tag_order() {
        let node = ctx.hierarchy().node(id);
        let name = ctx.interner.resolve(node.name).to_string();
        word(b, "-1");
        b.line(format!("{name}_protObj:"));
        word(b, node.tag.to_string());
        word(b, ctx.layouts.object_words(node.name).to_string());
        word(b, format!("{name}_dispTab"));
        for slot in ctx.layouts.attrs_of(node.name) {
            if slot.declared_type == wk.int {
                let zero = ctx.pool.lookup_int("0").expect("zero pooled");
                word(b, format!("int_const{}", zero.0));
            } else if slot.declared_type == wk.bool_ {
                word(b, "bool_const0");
            } else if slot.declared_type == wk.string {
                let empty = ctx.pool.lookup_string("").expect("empty string pooled");
                word(b, format!("str_const{}", empty.0));
            } else {
                word(b, "0");
            }
        }
    }
}

fn emit_global_text(b: &mut AsmBackend<'_>) {
    global(b, "heap_start");
    b.line("heap_start:");
    word(b, "0");
    b.line("\t.text");
    global(b, "Main_init");
    global(b, "Int_init");
    global(b, "String_init");
    global(b, "Bool_init");
    global(b, "Main.main");
}
