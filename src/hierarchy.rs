//! The single-inheritance class tree.
//!
//! Classes live in an arena indexed by `ClassId`; parent and child relations
//! are arena indices, never owned pointers. Construction installs the basic
//! classes, validates the user program's inheritance edges (every violation
//! is fatal and stops construction), verifies the edge set forms a tree
//! rooted at Object, and assigns preorder tags so that a class and its
//! transitive subclasses occupy one contiguous tag range.

use std::collections::HashMap;

use crate::ast::{Attribute, ClassDef, Feature, Formal, Method, Program, Ty};
use crate::diagnostics::Diagnostic;
use crate::span::Loc;
use crate::symbols::{Interner, Symbol, WellKnown};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClassId(pub u32);

#[derive(Debug)]
pub struct ClassNode {
    pub name: Symbol,
    pub parent: Option<ClassId>,
    pub children: Vec<ClassId>,
    /// True for the compiler-installed classes whose methods have no bodies.
    pub basic: bool,
    pub tag: u32,
    pub max_subtree_tag: u32,
    /// Index of the backing `ClassDef` in `Program::classes`.
    pub class_index: usize,
}

#[derive(Debug)]
pub struct Hierarchy {
    nodes: Vec<ClassNode>,
    by_name: HashMap<Symbol, ClassId>,
    wk: WellKnown,
    root: ClassId,
}

fn basic_method(name: Symbol, formals: Vec<Formal>, return_type: Symbol, loc: Loc) -> Feature {
    Feature::Method(Method { name, formals, return_type, body: None, loc })
}

fn basic_attr(name: Symbol, declared_type: Symbol, loc: Loc) -> Feature {
    Feature::Attribute(Attribute { name, declared_type, init: None, loc })
}

/// Install the five basic classes at the front of the program.
///
/// Object has no parent and the runtime methods abort/type_name/copy; IO
/// carries the stream methods; Int and Bool box a primitive slot; String
/// boxes a length and the character data. Redefining any reserved class
/// name is fatal.
pub fn install_basic_classes(
    program: &mut Program,
    wk: &WellKnown,
    interner: &Interner,
) -> Result<(), Diagnostic> {
    for class in &program.classes {
        if class.name == wk.self_type || wk.is_basic_class(class.name) && class.name != wk.io {
            return Err(Diagnostic::at(
                interner.resolve(class.loc.file),
                class.loc.line,
                format!(
                    "Fatal error: redefinition of basic class \"{}\".",
                    interner.resolve(class.name)
                ),
            ));
        }
    }

    let loc = Loc::new(wk.basic_file, 0);
    let object_class = ClassDef {
        name: wk.object,
        parent: None,
        features: vec![
            basic_method(wk.abort, vec![], wk.object, loc),
            basic_method(wk.type_name, vec![], wk.string, loc),
            basic_method(wk.copy, vec![], wk.self_type, loc),
        ],
        loc,
    };
    let io_class = ClassDef {
        name: wk.io,
        parent: Some(wk.object),
        features: vec![
            basic_method(
                wk.out_string,
                vec![Formal { name: wk.arg, declared_type: wk.string, loc }],
                wk.self_type,
                loc,
            ),
            basic_method(
                wk.out_int,
                vec![Formal { name: wk.arg, declared_type: wk.int, loc }],
                wk.self_type,
                loc,
            ),
            basic_method(wk.in_string, vec![], wk.string, loc),
            basic_method(wk.in_int, vec![], wk.int, loc),
        ],
        loc,
    };
    let int_class = ClassDef {
        name: wk.int,
        parent: Some(wk.object),
        features: vec![basic_attr(wk.val, wk.prim_slot, loc)],
        loc,
    };
    let bool_class = ClassDef {
        name: wk.bool_,
        parent: Some(wk.object),
        features: vec![basic_attr(wk.val, wk.prim_slot, loc)],
        loc,
    };
    let string_class = ClassDef {
        name: wk.string,
        parent: Some(wk.object),
        features: vec![
            basic_attr(wk.val, wk.int, loc),
            basic_attr(wk.str_field, wk.prim_slot, loc),
            basic_method(wk.length, vec![], wk.int, loc),
            basic_method(
                wk.concat,
                vec![Formal { name: wk.arg, declared_type: wk.string, loc }],
                wk.string,
                loc,
            ),
            basic_method(
                wk.substr,
                vec![
                    Formal { name: wk.arg, declared_type: wk.int, loc },
                    Formal { name: wk.arg2, declared_type: wk.int, loc },
                ],
                wk.string,
                loc,
            ),
        ],
        loc,
    };

    let mut classes = vec![object_class, io_class, int_class, bool_class, string_class];
    classes.append(&mut program.classes);
    program.classes = classes;
    Ok(())
}

impl Hierarchy {
    /// Validate inheritance edges and build the tree. The first violation
    /// aborts construction; the caller must not proceed to analysis.
    pub fn build(
        program: &Program,
        wk: &WellKnown,
        interner: &Interner,
    ) -> Result<Hierarchy, Diagnostic> {
        let fatal = |class: &ClassDef, msg: String| {
            Diagnostic::at(interner.resolve(class.loc.file), class.loc.line, msg)
        };

        let mut by_name: HashMap<Symbol, ClassId> = HashMap::new();
        for (idx, class) in program.classes.iter().enumerate() {
            if by_name.insert(class.name, ClassId(idx as u32)).is_some() {
                return Err(fatal(class, "Fatal error: class name redefined.".to_string()));
            }
        }

        let mut nodes: Vec<ClassNode> = program
            .classes
            .iter()
            .enumerate()
            .map(|(idx, class)| ClassNode {
                name: class.name,
                parent: None,
                children: Vec::new(),
                basic: wk.is_basic_class(class.name),
                tag: 0,
                max_subtree_tag: 0,
                class_index: idx,
            })
            .collect();

        for (idx, class) in program.classes.iter().enumerate() {
            let Some(parent) = class.parent else { continue };
            if parent == class.name {
                return Err(fatal(class, "Fatal error: class inherited from itself.".to_string()));
            }
            if wk.is_boxed_primitive(parent) || parent == wk.self_type {
                return Err(fatal(
                    class,
                    format!(
                        "Fatal error: class \"{}\" cannot inherit from class \"{}\".",
                        interner.resolve(class.name),
                        interner.resolve(parent)
                    ),
                ));
            }
            let Some(&parent_id) = by_name.get(&parent) else {
                return Err(fatal(
                    class,
                    format!(
                        "Fatal error: unknown parent of class {}",
                        interner.resolve(class.name)
                    ),
                ));
            };
            nodes[idx].parent = Some(parent_id);
            nodes[parent_id.0 as usize].children.push(ClassId(idx as u32));
        }

        let root = *by_name
            .get(&wk.object)
            .ok_or_else(|| Diagnostic::global("Fatal error: root class is missing."))?;

        // Tree check: every node's ancestor walk must terminate at the root
        // within |nodes| steps, and each non-root contributes exactly one
        // edge, so the edge count is already |nodes| - 1.
        for start in 0..nodes.len() {
            let mut cur = ClassId(start as u32);
            let mut steps = 0;
            while let Some(parent) = nodes[cur.0 as usize].parent {
                cur = parent;
                steps += 1;
                if steps > nodes.len() {
                    return Err(Diagnostic::global(
                        "Fatal error: class inheritance graph has a circle.",
                    ));
                }
            }
            if cur != root {
                return Err(Diagnostic::global(
                    "Fatal error: class inheritance graph has a circle.",
                ));
            }
        }

        let mut hierarchy = Hierarchy { nodes, by_name, wk: *wk, root };
        hierarchy.assign_tags();
        Ok(hierarchy)
    }

    /// Single preorder walk: each node receives the next sequential tag and,
    /// once its subtree is visited, the maximum tag seen below it. The tags
    /// of a class and its transitive subclasses are exactly the interval
    /// [tag, max_subtree_tag].
    fn assign_tags(&mut self) {
        fn walk(nodes: &mut Vec<ClassNode>, id: ClassId, next: &mut u32) -> u32 {
            let tag = *next;
            *next += 1;
            nodes[id.0 as usize].tag = tag;
            let children = nodes[id.0 as usize].children.clone();
            let mut max_tag = tag;
            for child in children {
                max_tag = max_tag.max(walk(nodes, child, next));
            }
            nodes[id.0 as usize].max_subtree_tag = max_tag;
            max_tag
        }
        let mut next = 0;
        walk(&mut self.nodes, self.root, &mut next);
    }

    pub fn root(&self) -> ClassId {
        self.root
    }

    pub fn node(&self, id: ClassId) -> &ClassNode {
        &self.nodes[id.0 as usize]
    }

    pub fn id_of(&self, name: Symbol) -> Option<ClassId> {
        self.by_name.get(&name).copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether `name` denotes a known type. The primitive slot type is known
    /// to the code generator without being part of the tree.
    pub fn has_class(&self, name: Symbol) -> bool {
        self.by_name.contains_key(&name) || name == self.wk.prim_slot
    }

    pub fn is_basic(&self, name: Symbol) -> bool {
        self.id_of(name).map(|id| self.node(id).basic).unwrap_or(false)
    }

    pub fn parent_of(&self, name: Symbol) -> Option<Symbol> {
        let id = self.id_of(name)?;
        self.node(id).parent.map(|p| self.node(p).name)
    }

    pub fn leaves(&self) -> Vec<Symbol> {
        self.nodes
            .iter()
            .filter(|n| n.children.is_empty())
            .map(|n| n.name)
            .collect()
    }

    pub fn is_leaf(&self, name: Symbol) -> bool {
        self.id_of(name)
            .map(|id| self.node(id).children.is_empty())
            .unwrap_or(false)
    }

    /// The chain from `name` up to and including the root.
    pub fn ancestry(&self, name: Symbol) -> Vec<Symbol> {
        let mut chain = Vec::new();
        let Some(mut id) = self.id_of(name) else { return chain };
        loop {
            chain.push(self.node(id).name);
            match self.node(id).parent {
                Some(parent) => id = parent,
                None => break,
            }
        }
        chain
    }

    pub fn tag(&self, name: Symbol) -> u32 {
        self.node(self.id_of(name).expect("tag of unknown class")).tag
    }

    pub fn max_subtree_tag(&self, name: Symbol) -> u32 {
        self.node(self.id_of(name).expect("tag of unknown class")).max_subtree_tag
    }

    /// Class ids sorted by tag, i.e. root-first preorder. Code generation
    /// emits every per-class table in this order.
    pub fn classes_in_tag_order(&self) -> Vec<ClassId> {
        let mut ids: Vec<ClassId> = (0..self.nodes.len() as u32).map(ClassId).collect();
        ids.sort_by_key(|id| self.node(*id).tag);
        ids
    }

    /// Subtype test on resolved class names. The error sentinel conforms to
    /// everything so that tainted expressions never produce a second
    /// diagnostic; nothing conforms to the sentinel itself.
    pub fn conforms_named(&self, a: Symbol, b: Symbol) -> bool {
        if a == self.wk.no_type {
            return true;
        }
        if b == self.wk.no_type {
            return false;
        }
        if b == self.wk.object {
            return true;
        }
        let Some(mut id) = self.id_of(a) else { return false };
        loop {
            if self.node(id).name == b {
                return true;
            }
            match self.node(id).parent {
                Some(parent) => id = parent,
                None => return false,
            }
        }
    }

    /// Subtype test on static types. The polymorphic self type conforms to
    /// everything; call sites resolve it against the current class first
    /// whenever the target side matters.
    pub fn conforms(&self, a: Ty, b: Ty) -> bool {
        match (a, b) {
            (Ty::NoTy, _) | (Ty::SelfTy, _) => true,
            (_, Ty::NoTy) | (_, Ty::SelfTy) => false,
            (Ty::Named(a), Ty::Named(b)) => self.conforms_named(a, b),
        }
    }

    fn depth(&self, mut id: ClassId) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.node(id).parent {
            id = parent;
            depth += 1;
        }
        depth
    }

    /// Least common ancestor: climb the deeper node to equal depth, then
    /// ascend both in lockstep until they coincide. The error sentinel is
    /// absorbed by the other side.
    pub fn lca_named(&self, a: Symbol, b: Symbol) -> Symbol {
        if a == self.wk.no_type {
            return b;
        }
        if b == self.wk.no_type {
            return a;
        }
        let mut u = self.id_of(a).expect("lca of unknown class");
        let mut v = self.id_of(b).expect("lca of unknown class");
        let mut du = self.depth(u);
        let mut dv = self.depth(v);
        while du > dv {
            u = self.node(u).parent.expect("depth accounting broken");
            du -= 1;
        }
        while dv > du {
            v = self.node(v).parent.expect("depth accounting broken");
            dv -= 1;
        }
        while u != v {
            u = self.node(u).parent.expect("lca walk escaped the root");
            v = self.node(v).parent.expect("lca walk escaped the root");
        }
        self.node(u).name
    }
}
