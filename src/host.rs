//! Host embedding surface: registering native functions, classes and POD
//! types, plus a couple of reference native functions (`StringCat`,
//! `mul2`) used by the integration tests.

use crate::function::{FunctionEntry, FunctionKind, ParamSlot};
use crate::hash::H32;
use crate::object::{Destructor, Factory};
use crate::types::{OpOverride, PodMember};
use crate::value::{Cell, VarType};
use crate::vm::ExecutionEngine;

use crate::error::TinResult;

/// Registers a native global function callable from script by name.
pub fn register_function(
    engine: &mut ExecutionEngine,
    name: &str,
    params: &[(&str, VarType)],
    return_type: VarType,
    dispatcher: crate::function::NativeDispatcher,
) {
    let name_hash = engine.strings.intern(name);
    let mut slots = vec![ParamSlot {
        name: H32::NONE,
        var_type: return_type,
    }];
    for (pname, ty) in params {
        slots.push(ParamSlot {
            name: engine.strings.intern(pname),
            var_type: *ty,
        });
    }
    let fe = FunctionEntry::native(name_hash, H32::NONE, FunctionKind::NativeGlobal, slots, dispatcher);
    engine
        .namespaces
        .get_mut(H32::NONE)
        .expect("root namespace always exists")
        .functions
        .insert(name_hash, fe);
}

/// Registers a native method on `class_ns`, found by `is_a` chain lookup
/// from any instance/derived namespace.
pub fn register_method(
    engine: &mut ExecutionEngine,
    class_ns: &str,
    name: &str,
    params: &[(&str, VarType)],
    return_type: VarType,
    dispatcher: crate::function::NativeDispatcher,
) {
    let ns_hash = engine.strings.intern(class_ns);
    let name_hash = engine.strings.intern(name);
    engine.namespaces.find_or_create(ns_hash, H32::NONE);
    let mut slots = vec![ParamSlot {
        name: H32::NONE,
        var_type: return_type,
    }];
    for (pname, ty) in params {
        slots.push(ParamSlot {
            name: engine.strings.intern(pname),
            var_type: *ty,
        });
    }
    let fe = FunctionEntry::native(name_hash, ns_hash, FunctionKind::NativeMethod, slots, dispatcher);
    engine.namespaces.get_mut(ns_hash).unwrap().functions.insert(name_hash, fe);
}

/// Registers the constructor/destructor the object registry uses for
/// `create_scripted` on `class_ns`, optionally linked under `parent_ns`.
pub fn register_class(engine: &mut ExecutionEngine, class_ns: &str, parent_ns: Option<&str>, factory: Factory, destructor: Destructor) -> H32 {
    let ns_hash = engine.strings.intern(class_ns);
    let parent_hash = parent_ns.map(|p| engine.strings.intern(p)).unwrap_or(H32::NONE);
    engine.namespaces.find_or_create(ns_hash, parent_hash);
    engine.objects.register_class_factory(ns_hash, factory, destructor);
    ns_hash
}

/// Declares a global variable with a default zero value of `var_type`.
pub fn register_global(engine: &mut ExecutionEngine, name: &str, var_type: VarType) {
    let hash = engine.strings.intern(name);
    engine.namespaces.get_or_create_variable(H32::NONE, hash, var_type);
}

/// Declares a fixed-size global array of `len` elements, each zero-valued
/// of `var_type`. Unlike `register_global`, this builds a real
/// [`crate::variable::Storage::HeapArray`] VE rather than a scalar one, so
/// `PushArrayElement`/`PopToArrayElement` can index it at any offset in
/// `0..len`.
pub fn register_global_array(engine: &mut ExecutionEngine, name: &str, var_type: VarType, len: usize) {
    let hash = engine.strings.intern(name);
    engine.namespaces.declare_array_variable(H32::NONE, hash, var_type, len);
}

/// Registers a new POD value type (mirroring `register_class`'s shape for
/// object classes): its `to_string`/`from_string` pair, an optional binary
/// operator override handler, and its member table (name, member type,
/// byte offset within the 16-byte cell). This is the host's only way to
/// add a POD type beyond the built-in `vector3f` — `vector3f` itself is
/// wired up the same way internally by `TypeRegistry::with_builtins`.
pub fn register_pod_type(
    engine: &mut ExecutionEngine,
    var_type: VarType,
    to_string: fn(&Cell) -> String,
    from_string: fn(&str) -> Option<Cell>,
    op_override: Option<OpOverride>,
    members: &[(&str, VarType, usize)],
) {
    engine.types.register_to_string(var_type, to_string);
    engine.types.register_from_string(var_type, from_string);
    if let Some(handler) = op_override {
        engine.types.register_op_override(var_type, handler);
    }
    for (name, member_type, offset) in members {
        let name_hash = engine.strings.intern(name);
        engine.types.register_pod_member(
            var_type,
            name_hash,
            PodMember {
                var_type: *member_type,
                offset: *offset,
            },
        );
    }
}

/// Sets the host's print callback.
pub fn set_print_callback(engine: &mut ExecutionEngine, callback: fn(&str)) {
    engine.host.print = Some(callback);
}

/// Sets the host's assert callback, invoked by script-level `assert`
/// statements; returning `false` raises [`crate::error::TinError::HostAssert`].
pub fn set_assert_callback(engine: &mut ExecutionEngine, callback: fn(&str) -> bool) {
    engine.host.assert = Some(callback);
}

/// Stringifies its argument (of any type — the parameter is declared
/// `Escape` so no conversion is forced) and returns it as a string handle.
/// A common pattern in test scripts: `gResult = StringCat(<expr>);`.
pub fn string_cat(engine: &mut ExecutionEngine, args: &mut [Cell]) -> TinResult<()> {
    let s = engine.cell_to_display_string(&args[1]);
    args[0] = engine.intern_to_cell(&s);
    Ok(())
}

/// Registers `StringCat(any) -> string` as a global native function.
pub fn register_string_cat(engine: &mut ExecutionEngine) {
    register_function(
        engine,
        "StringCat",
        &[("value", VarType::Escape)],
        VarType::StringHandle,
        string_cat,
    );
}

/// A sample `mul2(int) -> int` native function used in integration tests.
pub fn mul2(_engine: &mut ExecutionEngine, args: &mut [Cell]) -> TinResult<()> {
    args[0] = Cell::from_int(args[1].as_int() * 2);
    Ok(())
}

pub fn register_mul2(engine: &mut ExecutionEngine) {
    register_function(engine, "mul2", &[("value", VarType::Int32)], VarType::Int32, mul2);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_cat_stringifies_a_string_argument() {
        let mut engine = ExecutionEngine::new();
        register_string_cat(&mut engine);
        let a = engine.intern_to_cell("Hello World");
        let result = engine.call_function(H32::new("StringCat"), &[a]).unwrap();
        assert_eq!(engine.cell_to_display_string(&result), "Hello World");
    }

    #[test]
    fn string_cat_stringifies_a_numeric_argument() {
        let mut engine = ExecutionEngine::new();
        register_string_cat(&mut engine);
        let result = engine.call_function(H32::new("StringCat"), &[Cell::from_int(7)]).unwrap();
        assert_eq!(engine.cell_to_display_string(&result), "7");
    }

    #[test]
    fn mul2_doubles_its_argument() {
        let mut engine = ExecutionEngine::new();
        register_mul2(&mut engine);
        let result = engine.call_function(H32::new("mul2"), &[Cell::from_int(21)]).unwrap();
        assert_eq!(result.as_int(), 42);
    }

    fn point2f_to_string(c: &Cell) -> String {
        let bytes = c.raw_bytes();
        let x = f32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let y = f32::from_le_bytes(bytes[4..8].try_into().unwrap());
        format!("({x:.1}, {y:.1})")
    }

    fn point2f_from_string(s: &str) -> Option<Cell> {
        let mut parts = s.split(',').filter_map(|p| p.trim().parse::<f32>().ok());
        let x = parts.next()?;
        let y = parts.next()?;
        let mut cell = Cell::default_for(VarType::Escape);
        cell.raw_bytes_mut()[0..4].copy_from_slice(&x.to_le_bytes());
        cell.raw_bytes_mut()[4..8].copy_from_slice(&y.to_le_bytes());
        Some(cell)
    }

    /// A host embedding the runtime with a POD type of its own (here a 2D
    /// point) beyond the built-in `vector3f`, registered the same way a
    /// host registers a new class via `register_class`.
    #[test]
    fn register_pod_type_adds_a_new_pod_beyond_vector3f() {
        let mut engine = ExecutionEngine::new();
        register_pod_type(
            &mut engine,
            VarType::Escape,
            point2f_to_string,
            point2f_from_string,
            None,
            &[("x", VarType::Float32, 0), ("y", VarType::Float32, 4)],
        );

        let cell = point2f_from_string("3, 4").unwrap();
        assert_eq!(engine.types.to_string(&cell), "(3.0, 4.0)");

        let x = engine.strings.intern("x");
        let member = engine.types.pod_member(VarType::Escape, x).unwrap();
        assert_eq!(member.offset, 0);
        assert_eq!(member.var_type, VarType::Float32);
    }
}
