mod common;

use common::{semant_errors, AstBuilder};
use opalc::ast::{CmpOp, Ty};
use opalc::semant::Analysis;

fn body_ty(b: &mut AstBuilder, analysis: &Analysis, class: &str, method: &str) -> Ty {
    let class_sym = b.sym(class);
    let method_sym = b.sym(method);
    let class = analysis
        .program
        .classes
        .iter()
        .find(|c| c.name == class_sym)
        .expect("class present");
    let method = class
        .methods()
        .find(|m| m.name == method_sym)
        .expect("method present");
    method.body.as_ref().expect("user method has a body").ty()
}

#[test]
fn int_plus_bool_is_one_error() {
    // f(x: Int): Int { x + true }
    let mut b = AstBuilder::new();
    let x = b.ident("x");
    let t = b.boolean(true);
    let sum = b.plus(x, t);
    let f = b.method("f", &[("x", "Int")], "Int", sum);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("same type Int for operator \"+\""), "{errs:?}");
}

#[test]
fn cond_branches_join_at_lca() {
    // if true then new B else new C fi, where B and C both inherit A.
    let mut b = AstBuilder::new();
    let a = b.class("A", "Object", vec![]);
    let bb = b.class("B", "A", vec![]);
    let cc = b.class("C", "A", vec![]);
    let pred = b.boolean(true);
    let nb = b.new_obj("B");
    let nc = b.new_obj("C");
    let cond = b.cond(pred, nb, nc);
    let f = b.method("f", &[], "A", cond);
    let d = b.class("D", "Object", vec![f]);
    let main = b.main_class();
    let analysis = opalc::analyze(
        AstBuilder::program(vec![a, bb, cc, d, main]),
        &mut b.interner,
    )
    .unwrap();
    let a_sym = b.sym("A");
    assert_eq!(body_ty(&mut b, &analysis, "D", "f"), Ty::Named(a_sym));
}

#[test]
fn cond_with_identical_self_typed_arms_stays_polymorphic() {
    // if true then self else self fi : SELF_TYPE
    let mut b = AstBuilder::new();
    let pred = b.boolean(true);
    let s1 = b.self_ref();
    let s2 = b.self_ref();
    let cond = b.cond(pred, s1, s2);
    let f = b.method("f", &[], "SELF_TYPE", cond);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let analysis =
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap();
    assert_eq!(body_ty(&mut b, &analysis, "A", "f"), Ty::SelfTy);
}

#[test]
fn cond_with_mixed_self_typed_arm_resolves() {
    // if true then self else new A fi : A (self resolved to the current class)
    let mut b = AstBuilder::new();
    let pred = b.boolean(true);
    let s = b.self_ref();
    let na = b.new_obj("A");
    let cond = b.cond(pred, s, na);
    let f = b.method("f", &[], "A", cond);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let analysis =
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap();
    let a_sym = b.sym("A");
    assert_eq!(body_ty(&mut b, &analysis, "A", "f"), Ty::Named(a_sym));
}

#[test]
fn non_bool_predicate_is_reported() {
    let mut b = AstBuilder::new();
    let pred = b.int("1");
    let t = b.int("2");
    let e = b.int("3");
    let cond = b.cond(pred, t, e);
    let f = b.method("f", &[], "Int", cond);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("condition type in \"if\" statement should be Bool"), "{errs:?}");
}

#[test]
fn loop_types_to_object() {
    let mut b = AstBuilder::new();
    let pred = b.boolean(false);
    let body = b.int("1");
    let lp = b.while_loop(pred, body);
    let f = b.method("f", &[], "Object", lp);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let analysis =
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap();
    let object = b.sym("Object");
    assert_eq!(body_ty(&mut b, &analysis, "A", "f"), Ty::Named(object));
}

#[test]
fn assign_to_self_is_rejected() {
    let mut b = AstBuilder::new();
    let v = b.int("1");
    let assign = b.assign("self", v);
    let f = b.method("f", &[], "Int", assign);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert!(errs.iter().any(|e| e.contains("assign expression to keyword \"self\"")), "{errs:?}");
}

#[test]
fn assign_types_to_rhs_and_checks_conformance() {
    let mut b = AstBuilder::new();
    let a = b.class("A", "Object", vec![]);
    let bb = b.class("B", "A", vec![]);
    let attr = b.attr("x", "A", None);
    let nb = b.new_obj("B");
    let assign = b.assign("x", nb);
    let f = b.method("f", &[], "B", assign);
    let c = b.class("C", "Object", vec![attr, f]);
    let main = b.main_class();
    let analysis = opalc::analyze(
        AstBuilder::program(vec![a, bb, c, main]),
        &mut b.interner,
    )
    .unwrap();
    let b_sym = b.sym("B");
    assert_eq!(body_ty(&mut b, &analysis, "C", "f"), Ty::Named(b_sym));
}

#[test]
fn assign_nonconforming_rhs_is_rejected() {
    let mut b = AstBuilder::new();
    let attr = b.attr("x", "Int", None);
    let v = b.string("oops");
    let assign = b.assign("x", v);
    let f = b.method("f", &[], "Object", assign);
    let a = b.class("A", "Object", vec![attr, f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("doesn't match type \"Int\" of identifer \"x\""), "{errs:?}");
}

#[test]
fn undeclared_identifier_is_rejected() {
    let mut b = AstBuilder::new();
    let x = b.ident("ghost");
    let f = b.method("f", &[], "Object", x);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("identifer \"ghost\" is used without being declared"), "{errs:?}");
}

#[test]
fn let_binding_visible_in_body_not_in_init() {
    let mut b = AstBuilder::new();
    // let x: Int <- x in x  : the init's x is undeclared.
    let init = b.ident("x");
    let body = b.ident("x");
    let le = b.let_in("x", "Int", Some(init), body);
    let f = b.method("f", &[], "Int", le);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("identifer \"x\" is used without being declared"), "{errs:?}");
}

#[test]
fn let_self_binding_is_rejected() {
    let mut b = AstBuilder::new();
    let body = b.int("1");
    let le = b.let_in("self", "Int", None, body);
    let f = b.method("f", &[], "Int", le);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert!(errs.iter().any(|e| e.contains("could not be used in \"let\"")), "{errs:?}");
}

#[test]
fn self_typed_let_stays_polymorphic() {
    // let x: SELF_TYPE <- self in x, declared return SELF_TYPE.
    let mut b = AstBuilder::new();
    let init = b.self_ref();
    let body = b.ident("x");
    let le = b.let_in("x", "SELF_TYPE", Some(init), body);
    let f = b.method("f", &[], "SELF_TYPE", le);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let analysis =
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap();
    assert_eq!(body_ty(&mut b, &analysis, "A", "f"), Ty::SelfTy);
}

#[test]
fn case_duplicate_branch_is_rejected() {
    let mut b = AstBuilder::new();
    let scrut = b.int("1");
    let body1 = b.int("1");
    let br1 = b.branch("x", "Int", body1);
    let body2 = b.int("2");
    let br2 = b.branch("y", "Int", body2);
    let case = b.case(scrut, vec![br1, br2]);
    let f = b.method("f", &[], "Int", case);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("duplicate branch \"Int\" in case statement"), "{errs:?}");
}

#[test]
fn case_self_type_branch_is_rejected() {
    let mut b = AstBuilder::new();
    let scrut = b.int("1");
    let body = b.int("1");
    let br = b.branch("x", "SELF_TYPE", body);
    let case = b.case(scrut, vec![br]);
    let f = b.method("f", &[], "Int", case);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert!(errs.iter().any(|e| e.contains("\"SELF_TYPE\" is not allowed in case branch")), "{errs:?}");
}

#[test]
fn single_branch_case_keeps_exact_type() {
    let mut b = AstBuilder::new();
    let scrut = b.int("1");
    let body = b.ident("x");
    let br = b.branch("x", "Int", body);
    let case = b.case(scrut, vec![br]);
    let f = b.method("f", &[], "Int", case);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let analysis =
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap();
    let int = b.sym("Int");
    assert_eq!(body_ty(&mut b, &analysis, "A", "f"), Ty::Named(int));
}

#[test]
fn multi_branch_case_joins_expression_types() {
    // Branch declared types are Int and Bool but both bodies are new C and
    // new D with a shared ancestor: result follows the bodies.
    let mut b = AstBuilder::new();
    let base = b.class("Base", "Object", vec![]);
    let cc = b.class("C", "Base", vec![]);
    let dd = b.class("D", "Base", vec![]);
    let scrut = b.int("1");
    let body1 = b.new_obj("C");
    let br1 = b.branch("x", "Int", body1);
    let body2 = b.new_obj("D");
    let br2 = b.branch("y", "Bool", body2);
    let case = b.case(scrut, vec![br1, br2]);
    let f = b.method("f", &[], "Base", case);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let analysis = opalc::analyze(
        AstBuilder::program(vec![base, cc, dd, a, main]),
        &mut b.interner,
    )
    .unwrap();
    let base_sym = b.sym("Base");
    assert_eq!(body_ty(&mut b, &analysis, "A", "f"), Ty::Named(base_sym));
}

#[test]
fn dispatch_to_missing_method_is_rejected() {
    let mut b = AstBuilder::new();
    let recv = b.self_ref();
    let call = b.dispatch(recv, "ghost", vec![]);
    let f = b.method("f", &[], "Object", call);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("method \"ghost\" of class \"A\" is not defined"), "{errs:?}");
}

#[test]
fn dispatch_arity_mismatch_is_rejected() {
    let mut b = AstBuilder::new();
    let body = b.int("1");
    let g = b.method("g", &[("a", "Int")], "Int", body);
    let recv = b.self_ref();
    let call = b.dispatch(recv, "g", vec![]);
    let f = b.method("f", &[], "Int", call);
    let a = b.class("A", "Object", vec![g, f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("number of formal parameters and actual parameters"), "{errs:?}");
}

#[test]
fn dispatch_argument_conformance_is_checked() {
    let mut b = AstBuilder::new();
    let body = b.int("1");
    let g = b.method("g", &[("a", "Int")], "Int", body);
    let recv = b.self_ref();
    let arg = b.string("no");
    let call = b.dispatch(recv, "g", vec![arg]);
    let f = b.method("f", &[], "Int", call);
    let a = b.class("A", "Object", vec![g, f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("does not conform to type \"Int\" of formal parameter \"a\""), "{errs:?}");
}

#[test]
fn self_type_return_follows_receiver() {
    // (new B).copy() has static type B.
    let mut b = AstBuilder::new();
    let bb = b.class("B", "Object", vec![]);
    let recv = b.new_obj("B");
    let call = b.dispatch(recv, "copy", vec![]);
    let f = b.method("f", &[], "B", call);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let analysis = opalc::analyze(
        AstBuilder::program(vec![bb, a, main]),
        &mut b.interner,
    )
    .unwrap();
    let b_sym = b.sym("B");
    assert_eq!(body_ty(&mut b, &analysis, "A", "f"), Ty::Named(b_sym));
}

#[test]
fn static_dispatch_receiver_must_conform() {
    let mut b = AstBuilder::new();
    let body = b.int("1");
    let g = b.method("g", &[], "Int", body);
    let base = b.class("Base", "Object", vec![g]);
    let other = b.class("Other", "Object", vec![]);
    let recv = b.new_obj("Other");
    let call = b.static_dispatch(recv, "Base", "g", vec![]);
    let f = b.method("f", &[], "Int", call);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(
            AstBuilder::program(vec![base, other, a, main]),
            &mut b.interner,
        )
        .unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("should conform to dispatch type \"Base\""), "{errs:?}");
}

#[test]
fn static_dispatch_through_ancestor_is_accepted() {
    let mut b = AstBuilder::new();
    let body = b.int("1");
    let g = b.method("g", &[], "Int", body);
    let base = b.class("Base", "Object", vec![g]);
    let derived = b.class("Derived", "Base", vec![]);
    let recv = b.new_obj("Derived");
    let call = b.static_dispatch(recv, "Base", "g", vec![]);
    let f = b.method("f", &[], "Int", call);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let analysis = opalc::analyze(
        AstBuilder::program(vec![base, derived, a, main]),
        &mut b.interner,
    )
    .unwrap();
    let int = b.sym("Int");
    assert_eq!(body_ty(&mut b, &analysis, "A", "f"), Ty::Named(int));
}

#[test]
fn equality_between_distinct_primitives_is_rejected() {
    let mut b = AstBuilder::new();
    let l = b.int("1");
    let r = b.string("one");
    let eq = b.eq(l, r);
    let f = b.method("f", &[], "Bool", eq);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("basic type (Int, String, Bool)"), "{errs:?}");
}

#[test]
fn equality_between_objects_is_accepted() {
    let mut b = AstBuilder::new();
    let c = b.class("C", "Object", vec![]);
    let l = b.new_obj("C");
    let r = b.new_obj("Object");
    let eq = b.eq(l, r);
    let f = b.method("f", &[], "Bool", eq);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    opalc::analyze(AstBuilder::program(vec![c, a, main]), &mut b.interner).unwrap();
}

#[test]
fn comparison_requires_ints() {
    let mut b = AstBuilder::new();
    let l = b.boolean(true);
    let r = b.int("1");
    let cmp = b.compare(CmpOp::Le, l, r);
    let f = b.method("f", &[], "Bool", cmp);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("operator \"<=\""), "{errs:?}");
}

#[test]
fn isvoid_is_bool_for_any_operand() {
    let mut b = AstBuilder::new();
    let operand = b.new_obj("Object");
    let iv = b.is_void(operand);
    let f = b.method("f", &[], "Bool", iv);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let analysis =
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap();
    let bool_sym = b.sym("Bool");
    assert_eq!(body_ty(&mut b, &analysis, "A", "f"), Ty::Named(bool_sym));
}

#[test]
fn self_typed_body_cannot_meet_plain_promise_reversed() {
    // Declared SELF_TYPE with a plain body is rejected.
    let mut b = AstBuilder::new();
    let body = b.new_obj("A");
    let f = b.method("f", &[], "SELF_TYPE", body);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("doesn't conform to its declared type \"SELF_TYPE\""), "{errs:?}");
}

#[test]
fn self_typed_body_meets_ancestor_promise() {
    // Declared A with body self inside A is fine.
    let mut b = AstBuilder::new();
    let body = b.self_ref();
    let f = b.method("f", &[], "A", body);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap();
}

#[test]
fn method_body_must_conform_to_return_type() {
    let mut b = AstBuilder::new();
    let body = b.string("no");
    let f = b.method("f", &[], "Int", body);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("expression type \"String\" of method \"f\""), "{errs:?}");
}

#[test]
fn attribute_init_must_conform() {
    let mut b = AstBuilder::new();
    let init = b.string("no");
    let attr = b.attr("x", "Int", Some(init));
    let a = b.class("A", "Object", vec![attr]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("doesn't conform to declared type \"Int\" of attribute \"x\""), "{errs:?}");
}

#[test]
fn inherited_attribute_visible_in_subclass_body() {
    let mut b = AstBuilder::new();
    let attr = b.attr("count", "Int", None);
    let base = b.class("Base", "Object", vec![attr]);
    let body = b.ident("count");
    let f = b.method("f", &[], "Int", body);
    let derived = b.class("Derived", "Base", vec![f]);
    let main = b.main_class();
    opalc::analyze(
        AstBuilder::program(vec![base, derived, main]),
        &mut b.interner,
    )
    .unwrap();
}

#[test]
fn one_error_does_not_cascade() {
    // The undeclared identifier poisons the sum, which stays silent.
    let mut b = AstBuilder::new();
    let ghost = b.ident("ghost");
    let one = b.int("1");
    let sum = b.plus(ghost, one);
    let f = b.method("f", &[], "Int", sum);
    let a = b.class("A", "Object", vec![f]);
    let main = b.main_class();
    let errs = semant_errors(
        opalc::analyze(AstBuilder::program(vec![a, main]), &mut b.interner).unwrap_err(),
    );
    assert_eq!(errs.len(), 1, "{errs:?}");
    assert!(errs[0].contains("\"ghost\""), "{errs:?}");
}
