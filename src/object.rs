//! Object registry: maps a 32-bit object-id to a (host pointer, namespace
//! chain) pair.

use hashbrown::HashMap;

use crate::hash::H32;
use crate::value::VarType;
use crate::variable::{VarFlags, VariableEntry};

/// Who is responsible for an object's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Owner {
    /// Created from script; the runtime owns it and calls the registered
    /// destructor on `destroy`.
    ScriptCreated,
    /// Registered by the host; the host releases it, this registry only
    /// deregisters the id.
    HostRegistered,
}

/// A factory/destructor pair the host registers per class namespace so
/// `create_scripted` can allocate concrete host objects.
pub type Factory = fn() -> usize;
pub type Destructor = fn(usize);

/// One live (or formerly live) object: its host pointer, class namespace,
/// owner discriminator, optional name, dynamic variable table and group
/// membership.
pub struct ObjectEntry {
    pub id: u32,
    pub host_ptr: usize,
    pub namespace: H32,
    pub owner: Owner,
    pub name: H32,
    pub dynamic_vars: HashMap<H32, VariableEntry>,
    /// Child object-ids, populated when this object is used as a group.
    pub group_members: Vec<u32>,
    alive: bool,
}

/// Maps object-ids to [`ObjectEntry`]s. Ids are monotonically assigned and,
/// once destroyed, are never reused within the context's lifetime. Id `0`
/// is reserved and never allocated.
pub struct ObjectRegistry {
    objects: HashMap<u32, ObjectEntry>,
    by_name: HashMap<H32, u32>,
    next_id: u32,
    destructors: HashMap<H32, Destructor>,
    factories: HashMap<H32, Factory>,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        ObjectRegistry {
            objects: HashMap::new(),
            by_name: HashMap::new(),
            next_id: 1,
            destructors: HashMap::new(),
            factories: HashMap::new(),
        }
    }
}

impl ObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the constructor/destructor pair the host provides for a
    /// scriptable class namespace.
    pub fn register_class_factory(&mut self, class_ns: H32, factory: Factory, destructor: Destructor) {
        self.factories.insert(class_ns, factory);
        self.destructors.insert(class_ns, destructor);
    }

    fn allocate_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Creates a script-owned object of `class_ns` via the host factory
    /// registered for that class. Returns `None` if no factory is
    /// registered.
    pub fn create_scripted(&mut self, class_ns: H32, name: H32) -> Option<u32> {
        let factory = *self.factories.get(&class_ns)?;
        let ptr = factory();
        let id = self.allocate_id();
        self.objects.insert(
            id,
            ObjectEntry {
                id,
                host_ptr: ptr,
                namespace: class_ns,
                owner: Owner::ScriptCreated,
                name,
                dynamic_vars: HashMap::new(),
                group_members: Vec::new(),
                alive: true,
            },
        );
        if !name.is_none() {
            self.by_name.insert(name, id);
        }
        Some(id)
    }

    /// Registers a host-owned object that already exists.
    pub fn register_host(&mut self, host_ptr: usize, class_ns: H32, name: H32) -> u32 {
        let id = self.allocate_id();
        self.objects.insert(
            id,
            ObjectEntry {
                id,
                host_ptr,
                namespace: class_ns,
                owner: Owner::HostRegistered,
                name,
                dynamic_vars: HashMap::new(),
                group_members: Vec::new(),
                alive: true,
            },
        );
        if !name.is_none() {
            self.by_name.insert(name, id);
        }
        id
    }

    /// Destroys `id`. Calls the registered destructor only for
    /// script-created objects; host-registered objects are merely
    /// deregistered. Returns `false` if `id` is unknown or already dead.
    ///
    /// Use [`ObjectRegistry::destroy_with_string_release`] instead when the
    /// object's dynamic-variable table may hold live string-handle refs that
    /// need releasing back to the string table.
    pub fn destroy(&mut self, id: u32) -> bool {
        self.destroy_with_string_release(id, |_| {})
    }

    /// Same as [`ObjectRegistry::destroy`], but calls `on_string_handle` for
    /// every string-handle cell held in the object's dynamic-variable table
    /// before it is dropped, so the caller can `refdec` it: destroying a
    /// script-created object releases every string-handle VE it holds,
    /// matching the frame-cleanup invariant applied on a normal return.
    pub fn destroy_with_string_release(&mut self, id: u32, mut on_string_handle: impl FnMut(H32)) -> bool {
        let Some(entry) = self.objects.get_mut(&id) else {
            return false;
        };
        if !entry.alive {
            return false;
        }
        entry.alive = false;
        for ve in entry.dynamic_vars.values() {
            if ve.var_type == VarType::StringHandle {
                if let Some(value) = ve.inline_value() {
                    on_string_handle(value.as_string_handle());
                }
            }
        }
        entry.dynamic_vars.clear();
        if entry.owner == Owner::ScriptCreated {
            if let Some(dtor) = self.destructors.get(&entry.namespace) {
                dtor(entry.host_ptr);
            }
        }
        if !entry.name.is_none() {
            self.by_name.remove(&entry.name);
        }
        true
    }

    pub fn get(&self, id: u32) -> Option<&ObjectEntry> {
        self.objects.get(&id).filter(|e| e.alive)
    }

    pub fn get_mut(&mut self, id: u32) -> Option<&mut ObjectEntry> {
        self.objects.get_mut(&id).filter(|e| e.alive)
    }

    /// Returns `id`'s dynamic variable `member`, creating it as a scalar VE
    /// of `var_type` on first access. Returns `None` if `id` is not alive.
    pub fn get_or_create_dynamic_var(&mut self, id: u32, member: H32, var_type: VarType) -> Option<&mut VariableEntry> {
        let entry = self.objects.get_mut(&id).filter(|e| e.alive)?;
        Some(
            entry
                .dynamic_vars
                .entry(member)
                .or_insert_with(|| VariableEntry::scalar(member, var_type, VarFlags::DYNAMIC | VarFlags::MEMBER, H32::NONE)),
        )
    }

    pub fn find_by_name(&self, name: H32) -> Option<u32> {
        self.by_name.get(&name).copied()
    }

    pub fn is_alive(&self, id: u32) -> bool {
        self.objects.get(&id).map(|e| e.alive).unwrap_or(false)
    }
}
