//! Namespace registry: a tree of hierarchical namespaces, each owning a
//! function table and a variable table, chained for single-inheritance
//! method lookup.

use hashbrown::HashMap;

use crate::function::FunctionEntry;
use crate::hash::H32;
use crate::value::VarType;
use crate::variable::{VarFlags, VariableEntry};

/// One namespace: name, parent link, function table and variable table.
pub struct Namespace {
    pub name: H32,
    pub parent: H32,
    pub functions: HashMap<H32, FunctionEntry>,
    pub variables: HashMap<H32, VariableEntry>,
}

impl Namespace {
    fn new(name: H32, parent: H32) -> Self {
        Namespace {
            name,
            parent,
            functions: HashMap::new(),
            variables: HashMap::new(),
        }
    }
}

/// Owns every [`Namespace`] in a context, keyed by its name hash. The root
/// namespace (`H32::NONE`) holds global functions and globals.
pub struct NamespaceRegistry {
    namespaces: HashMap<H32, Namespace>,
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        let mut reg = NamespaceRegistry {
            namespaces: HashMap::new(),
        };
        reg.namespaces
            .insert(H32::NONE, Namespace::new(H32::NONE, H32::NONE));
        reg
    }
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the namespace named `name`, creating it (parented under
    /// `parent`, defaulting to the root) if it does not yet exist.
    pub fn find_or_create(&mut self, name: H32, parent: H32) -> H32 {
        self.namespaces
            .entry(name)
            .or_insert_with(|| Namespace::new(name, parent));
        name
    }

    pub fn get(&self, name: H32) -> Option<&Namespace> {
        self.namespaces.get(&name)
    }

    pub fn get_mut(&mut self, name: H32) -> Option<&mut Namespace> {
        self.namespaces.get_mut(&name)
    }

    /// Links `child` under `parent`, rejecting the change if it would
    /// introduce a cycle in the parent chain.
    pub fn link(&mut self, child: H32, parent: H32) -> Result<(), &'static str> {
        if child == parent {
            return Err("namespace cannot be its own parent");
        }
        // Walk from `parent` upward; if we encounter `child`, linking would
        // create a cycle.
        let mut cursor = parent;
        let mut guard = 0usize;
        while !cursor.is_none() {
            if cursor == child {
                return Err("linking would introduce a cycle");
            }
            cursor = self.namespaces.get(&cursor).map(|ns| ns.parent).unwrap_or(H32::NONE);
            guard += 1;
            if guard > self.namespaces.len() + 1 {
                return Err("parent chain is already cyclic");
            }
        }
        if let Some(ns) = self.namespaces.get_mut(&child) {
            ns.parent = parent;
            Ok(())
        } else {
            Err("unknown child namespace")
        }
    }

    /// Looks up a function by name, walking the parent chain from `ns`
    /// child-to-parent and stopping at the first match, unless
    /// `walk_parents` is false.
    pub fn lookup_function(&self, ns: H32, name: H32, walk_parents: bool) -> Option<&FunctionEntry> {
        let mut cursor = ns;
        loop {
            let Some(namespace) = self.namespaces.get(&cursor) else {
                return None;
            };
            if let Some(fe) = namespace.functions.get(&name) {
                return Some(fe);
            }
            if !walk_parents || namespace.parent.is_none() {
                return None;
            }
            cursor = namespace.parent;
        }
    }

    /// Looks up a member variable declaration by name, walking the parent
    /// chain the same way as [`NamespaceRegistry::lookup_function`].
    pub fn lookup_member(&self, ns: H32, name: H32, walk_parents: bool) -> Option<&VariableEntry> {
        let mut cursor = ns;
        loop {
            let Some(namespace) = self.namespaces.get(&cursor) else {
                return None;
            };
            if let Some(ve) = namespace.variables.get(&name) {
                return Some(ve);
            }
            if !walk_parents || namespace.parent.is_none() {
                return None;
            }
            cursor = namespace.parent;
        }
    }

    /// Returns the variable `name` declared directly on `ns`, creating a
    /// dynamic scalar VE of `var_type` on first write if it does not yet
    /// exist: a namespace's variable table grows lazily as script assigns
    /// new globals/members.
    pub fn get_or_create_variable(&mut self, ns: H32, name: H32, var_type: VarType) -> &mut VariableEntry {
        let namespace = self
            .namespaces
            .entry(ns)
            .or_insert_with(|| Namespace::new(ns, H32::NONE));
        namespace
            .variables
            .entry(name)
            .or_insert_with(|| VariableEntry::scalar(name, var_type, VarFlags::DYNAMIC, ns))
    }

    /// Declares (or replaces) `name` on `ns` as a fixed `len`-element array
    /// VE of `var_type`, each slot zero-valued. Unlike
    /// [`NamespaceRegistry::get_or_create_variable`]'s lazy scalar
    /// creation, this is how a host (or a compiler front-end) declares an
    /// array global/member up front so `PushArrayElement`/
    /// `PopToArrayElement` can index into it at any offset.
    pub fn declare_array_variable(&mut self, ns: H32, name: H32, var_type: VarType, len: usize) -> &mut VariableEntry {
        let namespace = self
            .namespaces
            .entry(ns)
            .or_insert_with(|| Namespace::new(ns, H32::NONE));
        namespace
            .variables
            .insert(name, VariableEntry::array(name, var_type, len, VarFlags::DYNAMIC, ns));
        namespace.variables.get_mut(&name).unwrap()
    }

    /// `true` if `candidate` is `target` or one of `target`'s ancestors,
    /// i.e. an instance of `candidate`'s class `is-a target`.
    pub fn is_a(&self, candidate: H32, target: H32) -> bool {
        let mut cursor = candidate;
        loop {
            if cursor == target {
                return true;
            }
            let Some(namespace) = self.namespaces.get(&cursor) else {
                return false;
            };
            if namespace.parent.is_none() {
                return false;
            }
            cursor = namespace.parent;
        }
    }
}
