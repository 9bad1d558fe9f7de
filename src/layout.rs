//! Object layouts and dispatch tables, derived purely from the class tree.
//!
//! Layouts are parent-prefix stable: a subclass never moves or reuses a slot
//! an ancestor assigned, so any object can be viewed through any ancestor's
//! layout. Dispatch tables give every method one slot index that is the same
//! in every class that can dispatch to it; an override replaces the owner in
//! place and keeps the index.

use std::collections::HashMap;

use crate::ast::Program;
use crate::hierarchy::Hierarchy;
use crate::symbols::Symbol;

/// Words occupied by the object header: tag, size, dispatch table pointer.
pub const HEADER_WORDS: u32 = 3;

#[derive(Debug, Clone)]
pub struct AttrSlot {
    pub name: Symbol,
    pub declared_type: Symbol,
    pub owner: Symbol,
    /// Word offset from the start of the object.
    pub offset: u32,
}

#[derive(Debug, Clone)]
pub struct DispatchEntry {
    /// The class whose definition the slot resolves to.
    pub owner: Symbol,
    pub method: Symbol,
}

#[derive(Debug, Default)]
pub struct Layouts {
    attrs: HashMap<Symbol, Vec<AttrSlot>>,
}

impl Layouts {
    /// Lay out every class, parent first, appending the class's own
    /// attributes in declaration order after the inherited prefix.
    pub fn build(program: &Program, hierarchy: &Hierarchy) -> Layouts {
        let mut layouts = Layouts::default();
        for id in hierarchy.classes_in_tag_order() {
            let node = hierarchy.node(id);
            let class = &program.classes[node.class_index];
            let mut slots: Vec<AttrSlot> = match node.parent {
                Some(parent) => layouts.attrs[&hierarchy.node(parent).name].clone(),
                None => Vec::new(),
            };
            for attr in class.attributes() {
                let offset = HEADER_WORDS + slots.len() as u32;
                slots.push(AttrSlot {
                    name: attr.name,
                    declared_type: attr.declared_type,
                    owner: class.name,
                    offset,
                });
            }
            layouts.attrs.insert(class.name, slots);
        }
        layouts
    }

    pub fn attrs_of(&self, class: Symbol) -> &[AttrSlot] {
        &self.attrs[&class]
    }

    /// Object size in words, header included.
    pub fn object_words(&self, class: Symbol) -> u32 {
        HEADER_WORDS + self.attrs[&class].len() as u32
    }
}

#[derive(Debug, Default)]
pub struct DispatchTables {
    tables: HashMap<Symbol, Vec<DispatchEntry>>,
    slots: HashMap<(Symbol, Symbol), u32>,
}

impl DispatchTables {
    /// Build each class's table root-first: start from the parent's table,
    /// then for each own method either overwrite the inherited slot's owner
    /// or append a new slot. The side table records the resolved slot for
    /// every (class, method) pair for static dispatch.
    pub fn build(program: &Program, hierarchy: &Hierarchy) -> DispatchTables {
        let mut tables = DispatchTables::default();
        for id in hierarchy.classes_in_tag_order() {
            let node = hierarchy.node(id);
            let class = &program.classes[node.class_index];
            let mut table: Vec<DispatchEntry> = match node.parent {
                Some(parent) => tables.tables[&hierarchy.node(parent).name].clone(),
                None => Vec::new(),
            };
            for method in class.methods() {
                match table.iter_mut().find(|e| e.method == method.name) {
                    Some(entry) => entry.owner = class.name,
                    None => table.push(DispatchEntry {
                        owner: class.name,
                        method: method.name,
                    }),
                }
            }
            for (slot, entry) in table.iter().enumerate() {
                tables
                    .slots
                    .insert((class.name, entry.method), slot as u32);
            }
            tables.tables.insert(class.name, table);
        }
        tables
    }

    pub fn table_of(&self, class: Symbol) -> &[DispatchEntry] {
        &self.tables[&class]
    }

    pub fn slot_of(&self, class: Symbol, method: Symbol) -> u32 {
        *self
            .slots
            .get(&(class, method))
            .expect("dispatch slot resolved during analysis")
    }
}
