//! Semantic analysis: four ordered passes over the parsed program.
//!
//! Pass 1 validates each class in isolation and collects its own method
//! signatures. Pass 2 walks every leaf-to-root chain checking attribute
//! shadowing and override signatures. Pass 3 resolves declared types,
//! builds the global method table, and finds the entry point. Pass 4 types
//! every expression. Each pass is a gate: if it reports any error the later
//! passes do not run and the pipeline stops.

pub mod check;
pub mod env;

use std::collections::{HashMap, HashSet};

use crate::ast::{ClassDef, Program, Ty};
use crate::diagnostics::{CompileError, Diagnostic, Diagnostics};
use crate::hierarchy::{self, Hierarchy};
use crate::symbols::{Interner, Symbol, WellKnown};

/// A method's shape as seen by dispatch checking: the class whose definition
/// is in effect, the formals in order, and the declared return type.
#[derive(Debug, Clone)]
pub struct MethodSig {
    pub owner: Symbol,
    pub formals: Vec<(Symbol, Symbol)>,
    pub return_type: Symbol,
}

/// Per-class view of every method reachable by dispatch, built by walking
/// each class's ancestor chain nearest-first so overrides shadow ancestor
/// definitions.
#[derive(Debug, Default)]
pub struct MethodTable {
    by_class: HashMap<Symbol, HashMap<Symbol, MethodSig>>,
}

impl MethodTable {
    pub fn lookup(&self, class: Symbol, method: Symbol) -> Option<&MethodSig> {
        self.by_class.get(&class)?.get(&method)
    }

    pub fn methods_of(&self, class: Symbol) -> Option<&HashMap<Symbol, MethodSig>> {
        self.by_class.get(&class)
    }
}

/// Everything semantic analysis produces: the program with the basic classes
/// installed and every expression annotated, the class tree, and the global
/// method table.
#[derive(Debug)]
pub struct Analysis {
    pub program: Program,
    pub hierarchy: Hierarchy,
    pub methods: MethodTable,
    pub wk: WellKnown,
}

/// Attribute environments per class: name paired with the type it binds to
/// in method bodies. A self-typed attribute binds to its declaring class.
type AttrEnv = HashMap<Symbol, Vec<(Symbol, Ty)>>;

struct OwnFeatures {
    methods: HashMap<Symbol, Vec<(Symbol, MethodSig)>>,
    attrs: HashMap<Symbol, Vec<Symbol>>,
}

pub fn analyze(
    mut program: Program,
    interner: &Interner,
    wk: WellKnown,
) -> Result<Analysis, CompileError> {
    hierarchy::install_basic_classes(&mut program, &wk, interner).map_err(CompileError::Fatal)?;
    let hierarchy =
        Hierarchy::build(&program, &wk, interner).map_err(CompileError::Fatal)?;

    let mut diags = Diagnostics::new();
    let own = pass1_local_checks(&program, interner, &wk, &mut diags);
    gate(&mut diags)?;

    pass2_override_checks(&program, &hierarchy, &own, interner, &mut diags);
    gate(&mut diags)?;

    let methods = pass3_types_and_main(&program, &hierarchy, &own, interner, &wk, &mut diags);
    gate(&mut diags)?;

    let attr_env = build_attr_envs(&program, &hierarchy, &wk);
    pass4_type_check(&mut program, &hierarchy, &methods, &attr_env, interner, &wk, &mut diags);
    gate(&mut diags)?;

    Ok(Analysis { program, hierarchy, methods, wk })
}

fn gate(diags: &mut Diagnostics) -> Result<(), CompileError> {
    if diags.is_empty() {
        Ok(())
    } else {
        Err(CompileError::Semant { diagnostics: std::mem::take(diags).into_vec() })
    }
}

fn diag(interner: &Interner, file: Symbol, line: u32, msg: String) -> Diagnostic {
    Diagnostic::at(interner.resolve(file), line, msg)
}

/// Pass 1: per-class local validation. Feature names share one namespace per
/// class; formals must be distinct and never the receiver identifier.
fn pass1_local_checks(
    program: &Program,
    interner: &Interner,
    wk: &WellKnown,
    diags: &mut Diagnostics,
) -> OwnFeatures {
    let mut own = OwnFeatures { methods: HashMap::new(), attrs: HashMap::new() };

    for class in &program.classes {
        let mut seen_methods: HashSet<Symbol> = HashSet::new();
        let mut seen_attrs: HashSet<Symbol> = HashSet::new();
        let mut method_list: Vec<(Symbol, MethodSig)> = Vec::new();
        let mut attr_list: Vec<Symbol> = Vec::new();

        for method in class.methods() {
            let mut seen_formals: HashSet<Symbol> = HashSet::new();
            for formal in &method.formals {
                if formal.name == wk.self_ {
                    diags.report(diag(
                        interner,
                        class.loc.file,
                        formal.loc.line,
                        format!(
                            "Error: keyword \"self\" could not be used as formal in method \"{}\" of class \"{}\".",
                            interner.resolve(method.name),
                            interner.resolve(class.name)
                        ),
                    ));
                }
                if !seen_formals.insert(formal.name) {
                    diags.report(diag(
                        interner,
                        class.loc.file,
                        formal.loc.line,
                        format!(
                            "Error: formal \"{}\" of method \"{}\" is redefined.",
                            interner.resolve(formal.name),
                            interner.resolve(method.name)
                        ),
                    ));
                }
            }
            if seen_attrs.contains(&method.name) {
                diags.report(diag(
                    interner,
                    class.loc.file,
                    method.loc.line,
                    format!(
                        "Error: feature name \"{}\" is used for both a method and an attribute.",
                        interner.resolve(method.name)
                    ),
                ));
                continue;
            }
            if !seen_methods.insert(method.name) {
                diags.report(diag(
                    interner,
                    class.loc.file,
                    method.loc.line,
                    format!(
                        "Error: class method \"{}\" is redefined.",
                        interner.resolve(method.name)
                    ),
                ));
                continue;
            }
            method_list.push((
                method.name,
                MethodSig {
                    owner: class.name,
                    formals: method
                        .formals
                        .iter()
                        .map(|f| (f.name, f.declared_type))
                        .collect(),
                    return_type: method.return_type,
                },
            ));
        }

        for attr in class.attributes() {
            if attr.name == wk.self_ {
                diags.report(diag(
                    interner,
                    class.loc.file,
                    attr.loc.line,
                    format!(
                        "Error: keyword \"self\" could not be used as class attribute in class \"{}\".",
                        interner.resolve(class.name)
                    ),
                ));
            }
            if seen_methods.contains(&attr.name) {
                diags.report(diag(
                    interner,
                    class.loc.file,
                    attr.loc.line,
                    format!(
                        "Error: feature name \"{}\" is used for both a method and an attribute.",
                        interner.resolve(attr.name)
                    ),
                ));
                continue;
            }
            if !seen_attrs.insert(attr.name) {
                diags.report(diag(
                    interner,
                    class.loc.file,
                    attr.loc.line,
                    format!(
                        "Error: local class attribute \"{}\" is redefined.",
                        interner.resolve(attr.name)
                    ),
                ));
                continue;
            }
            attr_list.push(attr.name);
        }

        own.methods.insert(class.name, method_list);
        own.attrs.insert(class.name, attr_list);
    }

    own
}

/// Pass 2: cross-hierarchy validation from every leaf up to the root.
/// Shadowing an ancestor's attribute is an error; overriding a method with a
/// changed signature is an error, reported once, at the overriding class.
fn pass2_override_checks(
    program: &Program,
    hierarchy: &Hierarchy,
    own: &OwnFeatures,
    interner: &Interner,
    diags: &mut Diagnostics,
) {
    let class_of: HashMap<Symbol, &ClassDef> =
        program.classes.iter().map(|c| (c.name, c)).collect();
    let mut reported_attrs: HashSet<(Symbol, Symbol)> = HashSet::new();
    let mut reported_methods: HashSet<(Symbol, Symbol)> = HashSet::new();

    for leaf in hierarchy.leaves() {
        let chain = hierarchy.ancestry(leaf);

        // Attributes: first sight along the chain is the most-derived
        // declaration; seeing the name again higher up means it shadows.
        let mut seen_attrs: HashMap<Symbol, Symbol> = HashMap::new();
        for &class_name in &chain {
            for &attr in &own.attrs[&class_name] {
                match seen_attrs.get(&attr) {
                    None => {
                        seen_attrs.insert(attr, class_name);
                    }
                    Some(&shadower) => {
                        if reported_attrs.insert((shadower, attr)) {
                            let class = class_of[&shadower];
                            diags.report(diag(
                                interner,
                                class.loc.file,
                                class.loc.line,
                                format!(
                                    "Error: attribute \"{}\" in class \"{}\" is overwritten.",
                                    interner.resolve(attr),
                                    interner.resolve(shadower)
                                ),
                            ));
                        }
                    }
                }
            }
        }

        let mut seen_methods: HashMap<Symbol, (&MethodSig, Symbol)> = HashMap::new();
        for &class_name in &chain {
            for (name, sig) in &own.methods[&class_name] {
                match seen_methods.get(name) {
                    None => {
                        seen_methods.insert(*name, (sig, class_name));
                    }
                    Some(&(sub_sig, sub_class)) => {
                        // `sig` is the ancestor definition, `sub_sig` the
                        // override further down the chain.
                        if let Some(msg) =
                            override_mismatch(sig, sub_sig, *name, sub_class, interner)
                        {
                            if reported_methods.insert((sub_class, *name)) {
                                let class = class_of[&sub_class];
                                diags.report(diag(
                                    interner,
                                    class.loc.file,
                                    class.loc.line,
                                    msg,
                                ));
                            }
                        }
                    }
                }
            }
        }
    }
}

fn override_mismatch(
    super_sig: &MethodSig,
    sub_sig: &MethodSig,
    method: Symbol,
    sub_class: Symbol,
    interner: &Interner,
) -> Option<String> {
    if super_sig.return_type != sub_sig.return_type {
        return Some(format!(
            "Error: method \"{}\" in class \"{}\" is overwritten with different return type.",
            interner.resolve(method),
            interner.resolve(sub_class)
        ));
    }
    if super_sig.formals.len() != sub_sig.formals.len() {
        return Some(format!(
            "Error: method \"{}\" in class \"{}\" is overwritten with different number of formals.",
            interner.resolve(method),
            interner.resolve(sub_class)
        ));
    }
    for ((super_name, super_ty), (_, sub_ty)) in
        super_sig.formals.iter().zip(sub_sig.formals.iter())
    {
        if super_ty != sub_ty {
            return Some(format!(
                "Error: type of formal \"{}\" in method \"{}\" of class \"{}\" is changed when overwriting method in subclass.",
                interner.resolve(*super_name),
                interner.resolve(method),
                interner.resolve(sub_class)
            ));
        }
    }
    None
}

/// Pass 3: every declared type must name a real class (the self type is
/// allowed everywhere except formals), the entry class and method must
/// exist, and the global method table is assembled nearest-first.
fn pass3_types_and_main(
    program: &Program,
    hierarchy: &Hierarchy,
    own: &OwnFeatures,
    interner: &Interner,
    wk: &WellKnown,
    diags: &mut Diagnostics,
) -> MethodTable {
    let mut table = MethodTable::default();
    let mut main_found = false;

    for class in &program.classes {
        let mut all: HashMap<Symbol, MethodSig> = HashMap::new();
        for ancestor in hierarchy.ancestry(class.name) {
            for (name, sig) in &own.methods[&ancestor] {
                all.entry(*name).or_insert_with(|| sig.clone());
            }
        }
        table.by_class.insert(class.name, all);

        for method in class.methods() {
            if class.name == wk.main_class && method.name == wk.main_method {
                main_found = true;
            }
            for formal in &method.formals {
                if formal.declared_type == wk.self_type {
                    diags.report(diag(
                        interner,
                        class.loc.file,
                        formal.loc.line,
                        "Error: \"SELF_TYPE\" could not be used in formal declaration."
                            .to_string(),
                    ));
                } else if !hierarchy.has_class(formal.declared_type) {
                    diags.report(diag(
                        interner,
                        class.loc.file,
                        formal.loc.line,
                        format!(
                            "Error: type \"{}\" is used without being defined.",
                            interner.resolve(formal.declared_type)
                        ),
                    ));
                }
            }
            let return_type = if method.return_type == wk.self_type {
                class.name
            } else {
                method.return_type
            };
            if !hierarchy.has_class(return_type) {
                diags.report(diag(
                    interner,
                    class.loc.file,
                    method.loc.line,
                    format!(
                        "Error: type \"{}\" is used without being defined.",
                        interner.resolve(return_type)
                    ),
                ));
            }
        }

        for attr in class.attributes() {
            if attr.declared_type != wk.self_type && !hierarchy.has_class(attr.declared_type) {
                diags.report(diag(
                    interner,
                    class.loc.file,
                    attr.loc.line,
                    format!(
                        "Error: type \"{}\" is used without being defined.",
                        interner.resolve(attr.declared_type)
                    ),
                ));
            }
        }
    }

    if !main_found {
        diags.report(Diagnostic::global("Class Main is not defined."));
    }

    table
}

/// Per-class object environments for pass 4: the attributes each class sees,
/// declared plus inherited. Pass 2 guarantees the names are distinct along
/// any chain.
fn build_attr_envs(program: &Program, hierarchy: &Hierarchy, wk: &WellKnown) -> AttrEnv {
    let class_of: HashMap<Symbol, &ClassDef> =
        program.classes.iter().map(|c| (c.name, c)).collect();
    let mut envs: AttrEnv = HashMap::new();
    for class in &program.classes {
        let mut bindings = Vec::new();
        for ancestor in hierarchy.ancestry(class.name) {
            for attr in class_of[&ancestor].attributes() {
                let ty = if attr.declared_type == wk.self_type {
                    Ty::Named(ancestor)
                } else {
                    Ty::Named(attr.declared_type)
                };
                bindings.push((attr.name, ty));
            }
        }
        envs.insert(class.name, bindings);
    }
    envs
}

/// Pass 4: expression-level type checking of every user class.
fn pass4_type_check(
    program: &mut Program,
    hierarchy: &Hierarchy,
    methods: &MethodTable,
    attr_env: &AttrEnv,
    interner: &Interner,
    wk: &WellKnown,
    diags: &mut Diagnostics,
) {
    for class in &mut program.classes {
        if hierarchy.is_basic(class.name) {
            continue;
        }
        let bindings = &attr_env[&class.name];
        let mut checker = check::TypeChecker::new(
            hierarchy,
            methods,
            interner,
            wk,
            class.name,
            class.loc.file,
            diags,
        );
        checker.check_class(class, bindings);
    }
}
