mod common;

use common::AstBuilder;
use opalc::layout::{DispatchTables, Layouts, HEADER_WORDS};
use opalc::semant::Analysis;

fn analyze(b: &mut AstBuilder, classes: Vec<opalc::ast::ClassDef>) -> Analysis {
    opalc::analyze(AstBuilder::program(classes), &mut b.interner).unwrap()
}

/// Object -> A(a1, a2) -> B(b1) -> C(c1), everything Int-typed.
fn deep_program(b: &mut AstBuilder) -> Analysis {
    let a1 = b.attr("a1", "Int", None);
    let a2 = b.attr("a2", "Int", None);
    let a = b.class("A", "Object", vec![a1, a2]);
    let b1 = b.attr("b1", "Int", None);
    let bb = b.class("B", "A", vec![b1]);
    let c1 = b.attr("c1", "Int", None);
    let cc = b.class("C", "B", vec![c1]);
    let main = b.main_class();
    analyze(b, vec![a, bb, cc, main])
}

#[test]
fn attribute_offsets_are_prefix_stable() {
    let mut b = AstBuilder::new();
    let analysis = deep_program(&mut b);
    let layouts = Layouts::build(&analysis.program, &analysis.hierarchy);

    let (a, bs, c) = (b.sym("A"), b.sym("B"), b.sym("C"));
    let a_attrs = layouts.attrs_of(a);
    let b_attrs = layouts.attrs_of(bs);
    let c_attrs = layouts.attrs_of(c);

    // Every ancestor slot keeps its offset in every descendant.
    for (i, slot) in a_attrs.iter().enumerate() {
        assert_eq!(b_attrs[i].name, slot.name);
        assert_eq!(b_attrs[i].offset, slot.offset);
        assert_eq!(c_attrs[i].name, slot.name);
        assert_eq!(c_attrs[i].offset, slot.offset);
    }
    for (i, slot) in b_attrs.iter().enumerate() {
        assert_eq!(c_attrs[i].offset, slot.offset);
    }

    // Own attributes append after the header and inherited prefix.
    assert_eq!(a_attrs[0].offset, HEADER_WORDS);
    assert_eq!(a_attrs[1].offset, HEADER_WORDS + 1);
    assert_eq!(b_attrs[2].offset, HEADER_WORDS + 2);
    assert_eq!(c_attrs[3].offset, HEADER_WORDS + 3);

    assert_eq!(layouts.object_words(a), HEADER_WORDS + 2);
    assert_eq!(layouts.object_words(bs), HEADER_WORDS + 3);
    assert_eq!(layouts.object_words(c), HEADER_WORDS + 4);
}

#[test]
fn basic_class_layouts() {
    let mut b = AstBuilder::new();
    let main = b.main_class();
    let analysis = analyze(&mut b, vec![main]);
    let layouts = Layouts::build(&analysis.program, &analysis.hierarchy);

    let object = b.sym("Object");
    assert_eq!(layouts.attrs_of(object).len(), 0);
    assert_eq!(layouts.object_words(object), HEADER_WORDS);

    let int = b.sym("Int");
    let int_attrs = layouts.attrs_of(int);
    assert_eq!(int_attrs.len(), 1);
    assert_eq!(int_attrs[0].offset, HEADER_WORDS);

    let string = b.sym("String");
    let s_attrs = layouts.attrs_of(string);
    assert_eq!(s_attrs.len(), 2);
    assert_eq!(s_attrs[0].offset, HEADER_WORDS);
    assert_eq!(s_attrs[1].offset, HEADER_WORDS + 1);
}

#[test]
fn object_methods_occupy_first_slots() {
    let mut b = AstBuilder::new();
    let main = b.main_class();
    let analysis = analyze(&mut b, vec![main]);
    let tables = DispatchTables::build(&analysis.program, &analysis.hierarchy);

    let object = b.sym("Object");
    assert_eq!(tables.table_of(object).len(), 3);
    assert_eq!(tables.slot_of(object, b.sym("abort")), 0);
    assert_eq!(tables.slot_of(object, b.sym("type_name")), 1);
    assert_eq!(tables.slot_of(object, b.sym("copy")), 2);
}

#[test]
fn method_slots_stable_across_subclasses() {
    let mut b = AstBuilder::new();
    let body = b.int("1");
    let f = b.method("f", &[], "Int", body);
    let body = b.int("2");
    let g = b.method("g", &[], "Int", body);
    let base = b.class("Base", "Object", vec![f, g]);
    let derived = b.class("Derived", "Base", vec![]);
    let main = b.main_class();
    let analysis = analyze(&mut b, vec![base, derived, main]);
    let tables = DispatchTables::build(&analysis.program, &analysis.hierarchy);

    let (base, derived) = (b.sym("Base"), b.sym("Derived"));
    let (f, g) = (b.sym("f"), b.sym("g"));
    assert_eq!(tables.slot_of(base, f), tables.slot_of(derived, f));
    assert_eq!(tables.slot_of(base, g), tables.slot_of(derived, g));
    // Inherited methods keep the ancestor as owner.
    let slot = tables.slot_of(derived, f) as usize;
    assert_eq!(tables.table_of(derived)[slot].owner, base);
}

#[test]
fn override_keeps_slot_and_changes_owner() {
    let mut b = AstBuilder::new();
    let body = b.int("1");
    let f = b.method("f", &[], "Int", body);
    let base = b.class("Base", "Object", vec![f]);
    let body = b.int("2");
    let f2 = b.method("f", &[], "Int", body);
    let derived = b.class("Derived", "Base", vec![f2]);
    let main = b.main_class();
    let analysis = analyze(&mut b, vec![base, derived, main]);
    let tables = DispatchTables::build(&analysis.program, &analysis.hierarchy);

    let (base, derived) = (b.sym("Base"), b.sym("Derived"));
    let f = b.sym("f");
    let base_slot = tables.slot_of(base, f);
    let derived_slot = tables.slot_of(derived, f);
    assert_eq!(base_slot, derived_slot);
    assert_eq!(tables.table_of(base)[base_slot as usize].owner, base);
    assert_eq!(tables.table_of(derived)[derived_slot as usize].owner, derived);
}

#[test]
fn inherited_io_methods_keep_io_slots() {
    let mut b = AstBuilder::new();
    let term = b.class("Term", "IO", vec![]);
    let main = b.main_class();
    let analysis = analyze(&mut b, vec![term, main]);
    let tables = DispatchTables::build(&analysis.program, &analysis.hierarchy);

    let (io, term) = (b.sym("IO"), b.sym("Term"));
    for m in ["out_string", "out_int", "in_string", "in_int"] {
        let m = b.sym(m);
        assert_eq!(tables.slot_of(io, m), tables.slot_of(term, m));
    }
    // Object's methods come first in IO's table too.
    assert_eq!(tables.slot_of(io, b.sym("abort")), 0);
}
