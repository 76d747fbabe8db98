//! Type compatibility, usual arithmetic conversions, and size/alignment
//! computation (spec.md §4.4).

use crate::ast::types::{BuiltinKind, Member, Type, TypeKind};

/// Host-derived sizes for builtins — the spec explicitly permits taking
/// these from the host as a stand-in for a real target description.
pub fn builtin_size(kind: BuiltinKind) -> u64 {
    use BuiltinKind::*;
    match kind {
        Void => 0,
        Bool | Char | SignedChar | UnsignedChar => 1,
        Short | UnsignedShort => 2,
        Int | UnsignedInt | Float => 4,
        Long | UnsignedLong | LongLong | UnsignedLongLong | Double => 8,
        LongDouble => 16,
        Float128 => 16,
        ComplexFloat => 8,
        ComplexDouble => 16,
        ComplexLongDouble => 32,
        BuiltinVaList => 24, // x86-64 va_list struct size, taken as-is from the host ABI
    }
}

pub fn builtin_align(kind: BuiltinKind) -> u64 {
    // For every builtin in this subset, natural alignment equals size,
    // except the va_list aggregate which aligns to a pointer.
    match kind {
        BuiltinKind::BuiltinVaList => POINTER_SIZE,
        other => builtin_size(other).max(1),
    }
}

pub const POINTER_SIZE: u64 = 8;
pub const POINTER_ALIGN: u64 = 8;

/// Size/alignment of a type whose `Named` references have already been
/// flattened (Sema's typedef map does that at insertion time, per the
/// flattening invariant) and whose struct/union/enum members are fully
/// resolved.
pub fn size_of(ty: &Type) -> Option<u64> {
    match &ty.kind {
        TypeKind::Builtin(b) => Some(builtin_size(*b)),
        TypeKind::Named(_) => None, // must be resolved by the caller first
        TypeKind::Pointer(_) => Some(POINTER_SIZE),
        // An array's total size needs its element count const-evaluated
        // first; callers go through `array_size` once they have it.
        TypeKind::Array { .. } => None,
        TypeKind::Function { .. } => None,
        TypeKind::Struct { members: Some(m), .. } => Some(struct_size(m, false)),
        TypeKind::Union { members: Some(m), .. } => Some(union_size(m)),
        TypeKind::Struct { members: None, .. } | TypeKind::Union { members: None, .. } => None,
        TypeKind::Enum { .. } => Some(builtin_size(BuiltinKind::Int)),
    }
}

pub fn align_of(ty: &Type) -> Option<u64> {
    match &ty.kind {
        TypeKind::Builtin(b) => Some(builtin_align(*b)),
        TypeKind::Named(_) => None,
        TypeKind::Pointer(_) => Some(POINTER_ALIGN),
        TypeKind::Array { element, .. } => align_of(element),
        TypeKind::Function { .. } => None,
        TypeKind::Struct { members: Some(m), .. } | TypeKind::Union { members: Some(m), .. } => {
            m.iter().filter_map(|member| align_of(&member.ty)).max()
        }
        TypeKind::Struct { members: None, .. } | TypeKind::Union { members: None, .. } => None,
        TypeKind::Enum { .. } => Some(builtin_align(BuiltinKind::Int)),
    }
}

/// Given an already-known array element count (the size expression must be
/// const-evaluated by the caller via `sema::const_eval`), computes the
/// array's total size.
pub fn array_size(element: &Type, count: u64) -> Option<u64> {
    size_of(element).map(|elem_size| elem_size * count)
}

fn round_up(value: u64, align: u64) -> u64 {
    if align == 0 {
        value
    } else {
        (value + align - 1) / align * align
    }
}

/// Sequential layout: each member is aligned to its own alignment, and the
/// whole struct is padded up to the maximum member alignment. Bitfields are
/// parsed but laid out exactly like their declared type (spec §9's
/// permitted gap — a faithful per-ABI bit-packing implementation is out of
/// scope here, matching the original's behavior).
fn struct_size(members: &[Member], _packed: bool) -> u64 {
    let mut offset = 0u64;
    let mut max_align = 1u64;
    for member in members {
        let Some(align) = align_of(&member.ty) else {
            continue;
        };
        let Some(size) = size_of(&member.ty) else {
            continue;
        };
        max_align = max_align.max(align);
        offset = round_up(offset, align);
        offset += size;
    }
    round_up(offset, max_align)
}

fn union_size(members: &[Member]) -> u64 {
    members.iter().filter_map(|m| size_of(&m.ty)).max().unwrap_or(0)
}

/// Type compatibility (spec §4.4): same kind, qualifiers matching unless
/// the caller chooses to ignore them, and structurally equivalent children.
pub fn types_compatible(a: &Type, b: &Type, check_qualifiers: bool) -> bool {
    if check_qualifiers && a.qualifiers != b.qualifiers {
        return false;
    }
    match (&a.kind, &b.kind) {
        (TypeKind::Builtin(x), TypeKind::Builtin(y)) => x == y,
        (TypeKind::Named(x), TypeKind::Named(y)) => x == y,
        (TypeKind::Pointer(x), TypeKind::Pointer(y)) => types_compatible(x, y, check_qualifiers),
        (
            TypeKind::Array { element: ex, size: sx },
            TypeKind::Array { element: ey, size: sy },
        ) => {
            if !types_compatible(ex, ey, check_qualifiers) {
                return false;
            }
            match (sx, sy) {
                (Some(_), Some(_)) => true, // sizes are expressions; Sema compares evaluated constants at use sites
                _ => true,                  // an unknown size is compatible with any
            }
        }
        (
            TypeKind::Function {
                ret: rx,
                params: px,
                varargs: vx,
            },
            TypeKind::Function {
                ret: ry,
                params: py,
                varargs: vy,
            },
        ) => {
            vx == vy
                && px.len() == py.len()
                && types_compatible(rx, ry, check_qualifiers)
                && px
                    .iter()
                    .zip(py.iter())
                    .all(|(pa, pb)| types_compatible(&pa.ty, &pb.ty, check_qualifiers))
        }
        (
            TypeKind::Struct { tag: tx, members: mx, .. },
            TypeKind::Struct { tag: ty, members: my, .. },
        ) => tag_and_members_compatible(tx, mx, ty, my, check_qualifiers),
        (
            TypeKind::Union { tag: tx, members: mx, .. },
            TypeKind::Union { tag: ty, members: my, .. },
        ) => tag_and_members_compatible(tx, mx, ty, my, check_qualifiers),
        (TypeKind::Enum { tag: tx, .. }, TypeKind::Enum { tag: ty, .. }) => {
            // Underlying integer representation is implementation-defined;
            // enums are assumed compatible regardless of tag (spec §4.4).
            let _ = (tx, ty);
            true
        }
        _ => false,
    }
}

fn tag_and_members_compatible(
    tag_a: &Option<String>,
    members_a: &Option<Vec<Member>>,
    tag_b: &Option<String>,
    members_b: &Option<Vec<Member>>,
    check_qualifiers: bool,
) -> bool {
    if let (Some(a), Some(b)) = (tag_a, tag_b) {
        if a != b {
            return false;
        }
    }
    match (members_a, members_b) {
        (Some(ma), Some(mb)) => {
            ma.len() == mb.len()
                && ma.iter().zip(mb.iter()).all(|(x, y)| {
                    (x.name == y.name || x.name.is_empty() || y.name.is_empty())
                        && types_compatible(&x.ty, &y.ty, check_qualifiers)
                        && bitfields_match(&x.bitfield, &y.bitfield)
                })
        }
        _ => true,
    }
}

fn bitfields_match(
    a: &Option<std::rc::Rc<crate::ast::Expression>>,
    b: &Option<std::rc::Rc<crate::ast::Expression>>,
) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(_), Some(_)) => true, // structural presence matches; values are compared via const_eval at the caller
        _ => false,
    }
}

/// Usual arithmetic conversions on two integer builtin kinds (spec §4.4).
pub fn usual_arithmetic_conversion(a: BuiltinKind, b: BuiltinKind) -> BuiltinKind {
    if a == b {
        return a;
    }
    let (rank_a, rank_b) = (a.integer_rank(), b.integer_rank());
    let (unsigned_a, unsigned_b) = (a.is_unsigned(), b.is_unsigned());

    if unsigned_a == unsigned_b {
        return if rank_a >= rank_b { a } else { b };
    }

    let (unsigned_side, unsigned_rank, signed_side, signed_rank) = if unsigned_a {
        (a, rank_a, b, rank_b)
    } else {
        (b, rank_b, a, rank_a)
    };

    if unsigned_rank >= signed_rank {
        unsigned_side
    } else if builtin_size(signed_side) > builtin_size(unsigned_side) {
        signed_side
    } else {
        signed_side.unsigned_counterpart()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::types::BuiltinKind::*;

    #[test]
    fn sizeof_int_is_four() {
        assert_eq!(size_of(&Type::builtin(Int)), Some(4));
    }

    #[test]
    fn same_signedness_picks_higher_rank() {
        assert_eq!(usual_arithmetic_conversion(Int, Long), Long);
        assert_eq!(usual_arithmetic_conversion(UnsignedInt, UnsignedShort), UnsignedInt);
    }

    #[test]
    fn unsigned_wins_when_rank_is_at_least_as_high() {
        assert_eq!(usual_arithmetic_conversion(Int, UnsignedInt), UnsignedInt);
    }

    #[test]
    fn signed_wins_when_strictly_wider() {
        assert_eq!(usual_arithmetic_conversion(Long, UnsignedInt), Long);
    }

    #[test]
    fn struct_layout_pads_to_max_align() {
        let members = vec![
            Member {
                name: "a".into(),
                ty: Type::builtin(Char),
                bitfield: None,
            },
            Member {
                name: "b".into(),
                ty: Type::builtin(Int),
                bitfield: None,
            },
        ];
        assert_eq!(struct_size(&members, false), 8);
        assert_eq!(
            align_of(&Type::new(TypeKind::Struct {
                tag: None,
                members: Some(members),
                packed: false
            })),
            Some(4)
        );
    }
}
