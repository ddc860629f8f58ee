//! Type registry: per-[`VarType`] conversion tables, binary-operator
//! overrides, and POD member tables.

use hashbrown::HashMap;

use crate::error::{TinError, TypeErrorKind};
use crate::hash::H32;
use crate::value::{Cell, VarType};

/// Binary operator tags the registry dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    And,
    Or,
    Xor,
    BoolAnd,
    BoolOr,
    CompareEqual,
    CompareNotEqual,
    CompareLess,
    CompareLessEqual,
    CompareGreater,
    CompareGreaterEqual,
}

/// A per-type operator override handler.
///
/// Mirrors the source's `Vector3fOpOverrides` signature: given the op and
/// both (possibly-converted) operands, produce a result cell or decline by
/// returning `None` so the VM falls back to the default numeric coercion.
pub type OpOverride = fn(op: BinOp, lhs: &Cell, rhs: &Cell) -> Option<Cell>;

/// A conversion from one `VarType` to another.
pub type Converter = fn(&Cell) -> Option<Cell>;

/// A POD member: its type and byte offset within the value's 16-byte cell.
#[derive(Debug, Clone, Copy)]
pub struct PodMember {
    pub var_type: VarType,
    pub offset: usize,
}

#[derive(Default)]
struct TypeEntry {
    to_string: Option<fn(&Cell) -> String>,
    from_string: Option<fn(&str) -> Option<Cell>>,
    convert_to: HashMap<VarType, Converter>,
    op_override: Option<OpOverride>,
    pod_members: HashMap<H32, PodMember>,
}

/// Holds, for every [`VarType`], its name/size (carried on the enum itself)
/// plus conversion, operator-override and POD-member tables.
pub struct TypeRegistry {
    entries: HashMap<VarType, TypeEntry>,
    member_names: HashMap<H32, &'static str>,
}

impl TypeRegistry {
    /// Builds the registry with every built-in [`VarType`] registered,
    /// including the `vector3f` POD table (`x`,`y`,`z` at offsets 0,4,8).
    pub fn with_builtins(member_hash: impl Fn(&str) -> H32) -> Self {
        let mut reg = TypeRegistry {
            entries: HashMap::new(),
            member_names: HashMap::new(),
        };
        reg.register_numeric_conversions();
        reg.register_string_conversions();
        reg.register_vector3f(member_hash);
        reg
    }

    fn entry_mut(&mut self, ty: VarType) -> &mut TypeEntry {
        self.entries.entry(ty).or_default()
    }

    fn entry(&self, ty: VarType) -> Option<&TypeEntry> {
        self.entries.get(&ty)
    }

    /// Registers `converter` as the way to turn a `from`-typed cell into a
    /// `to`-typed one.
    pub fn register_conversion(&mut self, from: VarType, to: VarType, converter: Converter) {
        self.entry_mut(from).convert_to.insert(to, converter);
    }

    /// Registers the binary-op override handler for `ty`.
    pub fn register_op_override(&mut self, ty: VarType, handler: OpOverride) {
        self.entry_mut(ty).op_override = Some(handler);
    }

    /// Registers `ty`'s `to_string` rendering, used by the VM's string
    /// concatenation rule and by `Self::to_string`.
    pub fn register_to_string(&mut self, ty: VarType, f: fn(&Cell) -> String) {
        self.entry_mut(ty).to_string = Some(f);
    }

    /// Registers `ty`'s `from_string` parser, used by `Self::from_string`.
    pub fn register_from_string(&mut self, ty: VarType, f: fn(&str) -> Option<Cell>) {
        self.entry_mut(ty).from_string = Some(f);
    }

    /// Registers a POD member `name` of `ty` at `offset` within the value.
    pub fn register_pod_member(&mut self, ty: VarType, name: H32, member: PodMember) {
        self.entry_mut(ty).pod_members.insert(name, member);
    }

    /// Converts `cell` to `to`, returning a fresh cell, or `None` if no
    /// conversion path is registered (a `TypeError` at the call site).
    pub fn convert(&self, cell: &Cell, to: VarType) -> Option<Cell> {
        if cell.kind() == to {
            return Some(*cell);
        }
        // `Escape` is the host-opaque "accept anything" parameter type used
        // by natives like `StringCat` that take a value of any type and
        // stringify it themselves; it has no conversion table of its own,
        // it is an identity target.
        if to == VarType::Escape {
            return Some(*cell);
        }
        self.entry(cell.kind())
            .and_then(|e| e.convert_to.get(&to))
            .and_then(|f| f(cell))
    }

    /// Converts or raises a [`TinError::Type`].
    pub fn convert_or_err(&self, cell: &Cell, to: VarType) -> Result<Cell, TinError> {
        self.convert(cell, to).ok_or_else(|| {
            TinError::Type(TypeErrorKind::NoConversion {
                from: cell.kind().name(),
                to: to.name(),
            })
        })
    }

    /// Looks up the op-override handler registered for `ty`, if any.
    pub fn op_override(&self, ty: VarType) -> Option<OpOverride> {
        self.entry(ty).and_then(|e| e.op_override)
    }

    /// Looks up a POD member by name on `ty`.
    pub fn pod_member(&self, ty: VarType, name: H32) -> Option<PodMember> {
        self.entry(ty).and_then(|e| e.pod_members.get(&name)).copied()
    }

    /// Stringifies `cell` using its registered `to_string`, falling back to
    /// a generic numeric/bool rendering for built-ins without one.
    pub fn to_string(&self, cell: &Cell) -> String {
        if let Some(f) = self.entry(cell.kind()).and_then(|e| e.to_string) {
            return f(cell);
        }
        match cell.kind() {
            VarType::Void => String::new(),
            VarType::Bool => cell.as_bool().to_string(),
            VarType::Int32 => cell.as_int().to_string(),
            VarType::Float32 => format!("{:.4}", cell.as_float()),
            _ => String::new(),
        }
    }

    /// Parses `s` into a cell of type `ty` using its registered
    /// `from_string`, falling back to a generic numeric/bool parse.
    pub fn from_string(&self, ty: VarType, s: &str) -> Option<Cell> {
        if let Some(f) = self.entry(ty).and_then(|e| e.from_string) {
            return f(s);
        }
        match ty {
            VarType::Bool => s.parse::<bool>().ok().map(Cell::from_bool),
            VarType::Int32 => s.trim().parse::<i32>().ok().map(Cell::from_int),
            VarType::Float32 => s.trim().parse::<f32>().ok().map(Cell::from_float),
            _ => None,
        }
    }

    fn register_numeric_conversions(&mut self) {
        self.register_conversion(VarType::Int32, VarType::Float32, |c| {
            Some(Cell::from_float(c.as_int() as f32))
        });
        self.register_conversion(VarType::Float32, VarType::Int32, |c| {
            Some(Cell::from_int(c.as_float() as i32))
        });
        self.register_conversion(VarType::Bool, VarType::Int32, |c| {
            Some(Cell::from_int(c.as_bool() as i32))
        });
        self.register_conversion(VarType::Int32, VarType::Bool, |c| {
            Some(Cell::from_bool(c.as_int() != 0))
        });
    }

    fn register_string_conversions(&mut self) {
        // string -> * conversions are handled by the VM via `from_string`
        // for the `+` concatenation rule; only the numeric -> string
        // direction is a registered `Converter`.
    }

    fn register_vector3f(&mut self, member_hash: impl Fn(&str) -> H32) {
        let entry = self.entry_mut(VarType::Vector3f);
        entry.to_string = Some(|c| {
            let (x, y, z) = c.as_vector3f();
            format!("{x:.4} {y:.4} {z:.4}")
        });
        entry.from_string = Some(|s| {
            let s = s.trim();
            if s.is_empty() {
                return Some(Cell::from_vector3f(0.0, 0.0, 0.0));
            }
            let parts: Vec<f32> = s
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|p| !p.is_empty())
                .filter_map(|p| p.parse::<f32>().ok())
                .collect();
            if parts.len() == 3 {
                Some(Cell::from_vector3f(parts[0], parts[1], parts[2]))
            } else {
                None
            }
        });
        self.register_op_override(VarType::Vector3f, vector3f_op_override);

        let x = member_hash("x");
        let y = member_hash("y");
        let z = member_hash("z");
        self.member_names.insert(x, "x");
        self.member_names.insert(y, "y");
        self.member_names.insert(z, "z");
        self.register_pod_member(
            VarType::Vector3f,
            x,
            PodMember {
                var_type: VarType::Float32,
                offset: 0,
            },
        );
        self.register_pod_member(
            VarType::Vector3f,
            y,
            PodMember {
                var_type: VarType::Float32,
                offset: 4,
            },
        );
        self.register_pod_member(
            VarType::Vector3f,
            z,
            PodMember {
                var_type: VarType::Float32,
                offset: 8,
            },
        );
    }
}

/// Reads `cell` as a scalar (`int32` or `float32`) for the vector3f scale
/// overrides; any other type declines.
fn as_scalar(cell: &Cell) -> Option<f32> {
    match cell.kind() {
        VarType::Float32 => Some(cell.as_float()),
        VarType::Int32 => Some(cell.as_int() as f32),
        _ => None,
    }
}

/// vector3f supports `+`/`-` between two vector3f (component-wise),
/// equality/inequality between two vector3f, and `*`/`/` between a
/// vector3f and a scalar (`Vector3fScale` in the original source). `*` is
/// commutative (`vector3f * scalar` or `scalar * vector3f`); `/` only
/// accepts the vector3f on the left, matching the source's comment that
/// "division is a scalar, but the order is relevant".
///
/// Equality is intentionally inverted from the usual truthy convention:
/// `CompareEqual` pushes `0` when equal and `1` when not. This is
/// deliberately **not** normalized away.
fn vector3f_op_override(op: BinOp, lhs: &Cell, rhs: &Cell) -> Option<Cell> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::CompareEqual | BinOp::CompareNotEqual
            if lhs.kind() == VarType::Vector3f && rhs.kind() == VarType::Vector3f =>
        {
            let (lx, ly, lz) = lhs.as_vector3f();
            let (rx, ry, rz) = rhs.as_vector3f();
            match op {
                BinOp::Add => Some(Cell::from_vector3f(lx + rx, ly + ry, lz + rz)),
                BinOp::Sub => Some(Cell::from_vector3f(lx - rx, ly - ry, lz - rz)),
                BinOp::CompareEqual => {
                    let equal = lx == rx && ly == ry && lz == rz;
                    Some(Cell::from_int(if equal { 0 } else { 1 }))
                }
                BinOp::CompareNotEqual => {
                    let equal = lx == rx && ly == ry && lz == rz;
                    Some(Cell::from_int(if equal { 1 } else { 0 }))
                }
                _ => unreachable!(),
            }
        }
        BinOp::Mul => {
            if lhs.kind() == VarType::Vector3f {
                let (x, y, z) = lhs.as_vector3f();
                let s = as_scalar(rhs)?;
                Some(Cell::from_vector3f(x * s, y * s, z * s))
            } else if rhs.kind() == VarType::Vector3f {
                let (x, y, z) = rhs.as_vector3f();
                let s = as_scalar(lhs)?;
                Some(Cell::from_vector3f(x * s, y * s, z * s))
            } else {
                None
            }
        }
        BinOp::Div if lhs.kind() == VarType::Vector3f => {
            let (x, y, z) = lhs.as_vector3f();
            let s = as_scalar(rhs)?;
            Some(Cell::from_vector3f(x / s, y / s, z / s))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::H32;

    #[test]
    fn numeric_round_trip_within_equal_range() {
        let reg = TypeRegistry::with_builtins(H32::new);
        let i = Cell::from_int(7);
        let f = reg.convert(&i, VarType::Float32).unwrap();
        let back = reg.convert(&f, VarType::Int32).unwrap();
        assert_eq!(back.as_int(), 7);
    }

    #[test]
    fn vector3f_member_offsets() {
        let reg = TypeRegistry::with_builtins(H32::new);
        let x = reg.pod_member(VarType::Vector3f, H32::new("x")).unwrap();
        let z = reg.pod_member(VarType::Vector3f, H32::new("z")).unwrap();
        assert_eq!(x.offset, 0);
        assert_eq!(z.offset, 8);
    }

    #[test]
    fn vector3f_equality_is_inverted() {
        let a = Cell::from_vector3f(1.0, 2.0, 3.0);
        let b = Cell::from_vector3f(1.0, 2.0, 3.0);
        let result = vector3f_op_override(BinOp::CompareEqual, &a, &b).unwrap();
        assert_eq!(result.as_int(), 0, "equal vectors push 0, not 1");
    }

    #[test]
    fn vector3f_scales_by_scalar_either_order() {
        let v = Cell::from_vector3f(1.0, 2.0, 3.0);
        let scaled = vector3f_op_override(BinOp::Mul, &v, &Cell::from_float(2.0)).unwrap();
        assert_eq!(scaled.as_vector3f(), (2.0, 4.0, 6.0));
        let scaled_reversed = vector3f_op_override(BinOp::Mul, &Cell::from_int(2), &v).unwrap();
        assert_eq!(scaled_reversed.as_vector3f(), (2.0, 4.0, 6.0));
    }

    #[test]
    fn vector3f_division_only_accepts_vector_on_the_left() {
        let v = Cell::from_vector3f(2.0, 4.0, 8.0);
        let divided = vector3f_op_override(BinOp::Div, &v, &Cell::from_float(2.0)).unwrap();
        assert_eq!(divided.as_vector3f(), (1.0, 2.0, 4.0));
        assert!(vector3f_op_override(BinOp::Div, &Cell::from_float(2.0), &v).is_none());
    }

    #[test]
    fn vector3f_parses_comma_or_space_delimited() {
        let reg = TypeRegistry::with_builtins(H32::new);
        let a = reg.from_string(VarType::Vector3f, "1, 2, 3").unwrap();
        let b = reg.from_string(VarType::Vector3f, "4 5 6").unwrap();
        assert_eq!(a.as_vector3f(), (1.0, 2.0, 3.0));
        assert_eq!(b.as_vector3f(), (4.0, 5.0, 6.0));
    }
}
