//! Symbol interning and constant pooling.
//!
//! The parser hands the core plain strings; everything downstream works on
//! `Symbol` handles so that name comparisons are integer comparisons. The
//! interner and the constant pool are constructed by the caller and passed by
//! reference wherever they are needed; there are no process globals.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// An interned identifier. Two symbols are equal exactly when the strings
/// they were interned from are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(u32);

#[derive(Debug, Default)]
pub struct Interner {
    ids: HashMap<String, u32>,
    strings: Vec<String>,
}

impl Interner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> Symbol {
        if let Some(&id) = self.ids.get(s) {
            return Symbol(id);
        }
        let id = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.ids.insert(s.to_string(), id);
        Symbol(id)
    }

    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.strings[sym.0 as usize]
    }

    /// Lookup without inserting. Used by tests and the wire-format reader.
    pub fn get(&self, s: &str) -> Option<Symbol> {
        self.ids.get(s).copied().map(Symbol)
    }
}

/// The reserved symbols the analyzer and code generator refer to by name:
/// basic classes, the polymorphic self type, the error sentinel, the entry
/// class/method, and the names of the built-in methods and attributes.
#[derive(Debug, Clone, Copy)]
pub struct WellKnown {
    pub object: Symbol,
    pub io: Symbol,
    pub int: Symbol,
    pub bool_: Symbol,
    pub string: Symbol,
    pub self_type: Symbol,
    pub no_type: Symbol,
    pub prim_slot: Symbol,
    pub self_: Symbol,
    pub main_class: Symbol,
    pub main_method: Symbol,

    pub abort: Symbol,
    pub type_name: Symbol,
    pub copy: Symbol,
    pub out_string: Symbol,
    pub out_int: Symbol,
    pub in_string: Symbol,
    pub in_int: Symbol,
    pub length: Symbol,
    pub concat: Symbol,
    pub substr: Symbol,
    pub val: Symbol,
    pub str_field: Symbol,
    pub arg: Symbol,
    pub arg2: Symbol,

    /// Filename attached to the installed basic classes.
    pub basic_file: Symbol,
}

impl WellKnown {
    pub fn install(interner: &mut Interner) -> Self {
        Self {
            object: interner.intern("Object"),
            io: interner.intern("IO"),
            int: interner.intern("Int"),
            bool_: interner.intern("Bool"),
            string: interner.intern("String"),
            self_type: interner.intern("SELF_TYPE"),
            no_type: interner.intern("_no_type"),
            prim_slot: interner.intern("_prim_slot"),
            self_: interner.intern("self"),
            main_class: interner.intern("Main"),
            main_method: interner.intern("main"),
            abort: interner.intern("abort"),
            type_name: interner.intern("type_name"),
            copy: interner.intern("copy"),
            out_string: interner.intern("out_string"),
            out_int: interner.intern("out_int"),
            in_string: interner.intern("in_string"),
            in_int: interner.intern("in_int"),
            length: interner.intern("length"),
            concat: interner.intern("concat"),
            substr: interner.intern("substr"),
            val: interner.intern("_val"),
            str_field: interner.intern("_str_field"),
            arg: interner.intern("arg"),
            arg2: interner.intern("arg2"),
            basic_file: interner.intern("<basic class>"),
        }
    }

    /// The three boxed primitive classes. Final: inheriting from them is a
    /// fatal hierarchy error, and equality treats them specially.
    pub fn is_boxed_primitive(&self, name: Symbol) -> bool {
        name == self.int || name == self.bool_ || name == self.string
    }

    pub fn is_basic_class(&self, name: Symbol) -> bool {
        name == self.object
            || name == self.io
            || name == self.int
            || name == self.bool_
            || name == self.string
    }
}

/// Index of a pooled string constant. The assembly backend names the
/// definition `str_const<index>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrId(pub u32);

/// Index of a pooled integer constant (`int_const<index>`). Integers are
/// pooled by their literal text, so `007` and `7` are distinct entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntId(pub u32);

/// Constant pool shared by both code generation backends. Entries are
/// assigned indices in first-insertion order, so a deterministic walk of the
/// program yields a deterministic pool.
#[derive(Debug, Default)]
pub struct ConstPool {
    strings: Vec<String>,
    string_ids: HashMap<String, u32>,
    ints: Vec<String>,
    int_ids: HashMap<String, u32>,
}

impl ConstPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string(&mut self, s: &str) -> StrId {
        if let Some(&id) = self.string_ids.get(s) {
            return StrId(id);
        }
        let id = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.string_ids.insert(s.to_string(), id);
        // Every string object definition references its length as an
        // integer constant, so pool it eagerly.
        self.int_text(&s.len().to_string());
        StrId(id)
    }

    pub fn int_text(&mut self, text: &str) -> IntId {
        if let Some(&id) = self.int_ids.get(text) {
            return IntId(id);
        }
        let id = self.ints.len() as u32;
        self.ints.push(text.to_string());
        self.int_ids.insert(text.to_string(), id);
        IntId(id)
    }

    pub fn lookup_string(&self, s: &str) -> Option<StrId> {
        self.string_ids.get(s).copied().map(StrId)
    }

    pub fn lookup_int(&self, text: &str) -> Option<IntId> {
        self.int_ids.get(text).copied().map(IntId)
    }

    pub fn string_value(&self, id: StrId) -> &str {
        &self.strings[id.0 as usize]
    }

    pub fn int_value(&self, id: IntId) -> &str {
        &self.ints[id.0 as usize]
    }

    pub fn strings(&self) -> impl Iterator<Item = (StrId, &str)> {
        self.strings
            .iter()
            .enumerate()
            .map(|(i, s)| (StrId(i as u32), s.as_str()))
    }

    pub fn ints(&self) -> impl Iterator<Item = (IntId, &str)> {
        self.ints
            .iter()
            .enumerate()
            .map(|(i, s)| (IntId(i as u32), s.as_str()))
    }
}
