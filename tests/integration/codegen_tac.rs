mod common;

use common::AstBuilder;
use opalc::codegen::{CodegenOptions, GcPolicy};
use opalc::semant::Analysis;

fn analyze(b: &mut AstBuilder, classes: Vec<opalc::ast::ClassDef>) -> Analysis {
    opalc::analyze(AstBuilder::program(classes), &mut b.interner).unwrap()
}

fn sample_program(b: &mut AstBuilder) -> Analysis {
    let init = b.int("42");
    let x = b.attr("x", "Int", Some(init));
    let n = b.ident("n");
    let xv = b.ident("x");
    let sum = b.plus(n, xv);
    let f = b.method("f", &[("n", "Int")], "Int", sum);
    let a = b.class("A", "Object", vec![x, f]);

    let recv = b.new_obj("A");
    let one = b.int("1");
    let call = b.dispatch(recv, "f", vec![one]);
    let main_m = b.method("main", &[], "Int", call);
    let main = b.class("Main", "IO", vec![main_m]);
    analyze(b, vec![a, main])
}

#[test]
fn rendering_is_deterministic() {
    let mut b = AstBuilder::new();
    let analysis = sample_program(&mut b);
    let opts = CodegenOptions::default();
    let first = opalc::emit_tac(&analysis, &b.interner, opts).render(&b.interner);
    let second = opalc::emit_tac(&analysis, &b.interner, opts).render(&b.interner);
    assert_eq!(first, second);
}

#[test]
fn units_cover_every_initializer_and_user_method() {
    let mut b = AstBuilder::new();
    let analysis = sample_program(&mut b);
    let tac = opalc::emit_tac(&analysis, &b.interner, CodegenOptions::default());

    // One initializer per class, basics included, in tag order: the root
    // comes first.
    let inits: Vec<_> = tac.units.iter().filter(|u| u.method.is_none()).collect();
    assert_eq!(inits.len(), 7);
    assert_eq!(b.interner.resolve(inits[0].class), "Object");

    // Only user methods get bodies.
    let methods: Vec<_> = tac.units.iter().filter(|u| u.method.is_some()).collect();
    assert_eq!(methods.len(), 2);
    let names: Vec<String> = methods
        .iter()
        .map(|u| {
            format!(
                "{}.{}",
                b.interner.resolve(u.class),
                b.interner.resolve(u.method.unwrap())
            )
        })
        .collect();
    assert!(names.contains(&"A.f".to_string()));
    assert!(names.contains(&"Main.main".to_string()));
}

#[test]
fn frame_requirements_are_recorded() {
    let mut b = AstBuilder::new();
    let analysis = sample_program(&mut b);
    let tac = opalc::emit_tac(&analysis, &b.interner, CodegenOptions::default());
    let f_sym = b.sym("f");
    let f = tac
        .units
        .iter()
        .find(|u| u.method == Some(f_sym))
        .expect("A.f emitted");
    // n + x holds one operand across the right-hand side.
    assert_eq!(f.n_temps, 1);
    assert_eq!(f.n_args, 1);
}

#[test]
fn class_tables_carry_tags_layouts_and_dispatch() {
    let mut b = AstBuilder::new();
    let analysis = sample_program(&mut b);
    let tac = opalc::emit_tac(&analysis, &b.interner, CodegenOptions::default());

    let a_sym = b.sym("A");
    let table = tac.tables.iter().find(|t| t.class == a_sym).unwrap();
    assert_eq!(table.tag, analysis.hierarchy.tag(a_sym));
    assert_eq!(table.max_subtree_tag, analysis.hierarchy.max_subtree_tag(a_sym));
    // Header plus the one attribute.
    assert_eq!(table.object_words, 4);
    assert_eq!(table.attrs.len(), 1);
    assert_eq!(table.attrs[0].1, 3);
    // Object's three methods precede f.
    assert_eq!(table.dispatch.len(), 4);
    let f_sym = b.sym("f");
    assert_eq!(table.dispatch[3].1, f_sym);
    assert_eq!(table.dispatch[3].0, a_sym);
}

#[test]
fn rendered_form_shows_code_and_tables() {
    let mut b = AstBuilder::new();
    let analysis = sample_program(&mut b);
    let text = opalc::emit_tac(&analysis, &b.interner, CodegenOptions::default())
        .render(&b.interner);

    for needle in [
        "# gc _NoGC_Init",
        "# class tables",
        "# code",
        "Object_init [temps=0 args=0]:",
        "A.f [temps=1 args=1]:",
        "Main.main [temps=0 args=0]:",
        "\tcall Object.copy",
        "\tcall A_init",
        "\tacc <- fp[-1] add acc",
        "\tcall _dispatch_abort",
        "\treturn",
    ] {
        assert!(text.contains(needle), "missing {needle:?} in:\n{text}");
    }
    // Dynamic dispatch chases the receiver's table.
    assert!(text.contains("\tptr <- mem[acc + 2]"));
    assert!(text.contains("\tcall *ptr"));
}

#[test]
fn gc_policy_is_recorded() {
    let mut b = AstBuilder::new();
    let analysis = sample_program(&mut b);
    let tac = opalc::emit_tac(
        &analysis,
        &b.interner,
        CodegenOptions { gc: GcPolicy::Scan, gc_test: false },
    );
    assert_eq!(tac.gc, GcPolicy::Scan);
    let text = tac.render(&b.interner);
    assert!(text.contains("# gc _ScnGC_Init"));
}

#[test]
fn case_emits_tag_range_tests() {
    let mut b = AstBuilder::new();
    let base = b.class("Base", "Object", vec![]);
    let derived = b.class("Derived", "Base", vec![]);
    let scrut = b.new_obj("Derived");
    let body1 = b.int("1");
    let br1 = b.branch("x", "Base", body1);
    let body2 = b.int("2");
    let br2 = b.branch("y", "Derived", body2);
    let case = b.case(scrut, vec![br1, br2]);
    let f = b.method("f", &[], "Int", case);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let analysis = analyze(&mut b, vec![base, derived, a, main]);
    let text = opalc::emit_tac(&analysis, &b.interner, CodegenOptions::default())
        .render(&b.interner);

    assert!(text.contains("\ttag <- mem[acc + 0]"));
    assert!(text.contains("\tptr <- tag lt"));
    assert!(text.contains("\tif ptr != 0 goto label"));
    assert!(text.contains("\tcall _case_abort2"));
    assert!(text.contains("\tcall _case_abort"));
}

#[test]
fn both_backends_agree_on_label_count() {
    // The same walk drives both backends, so the highest label index used
    // in the text output matches the three-address output.
    let mut b = AstBuilder::new();
    let analysis = sample_program(&mut b);
    let opts = CodegenOptions::default();
    let asm = opalc::emit_asm(&analysis, &b.interner, opts);
    let tac = opalc::emit_tac(&analysis, &b.interner, opts).render(&b.interner);

    let max_label = |text: &str| {
        text.split("label")
            .skip(1)
            .filter_map(|rest| {
                let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
                digits.parse::<u32>().ok()
            })
            .max()
    };
    assert_eq!(max_label(&asm), max_label(&tac));
}
