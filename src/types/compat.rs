//! Pure pairwise compatibility predicates.
//!
//! Everything here is a side-effect-free classifier over pairs of
//! [`SemanticType`]s. Feasibility checking is strictly separated from
//! adapter construction: callers run [`can_pairwise_convert`] first and
//! build only if it passes, because construction may insert into
//! process-wide caches and must never be attempted on a shape pair that
//! could fail partway.

use crate::signature::Signature;
use crate::types::{wrapper_class, SemanticType};

/// True if no runtime action is needed to pass a `src` value where `dst`
/// is expected: identical types, or widening reference assignability.
pub fn is_null_conversion(src: &SemanticType, dst: &SemanticType) -> bool {
    if src == dst {
        return true;
    }
    match (src, dst) {
        (SemanticType::Ref(s), SemanticType::Ref(d)) => d.is_assignable_from(s),
        _ => false,
    }
}

/// Null conversion for the return position. Discarding a value (converting
/// any return to `void`) needs no runtime action; producing a value out of
/// a `void` target is never possible.
pub fn is_null_return_conversion(src: &SemanticType, dst: &SemanticType) -> bool {
    if *dst == SemanticType::Void {
        return true;
    }
    is_null_conversion(src, dst)
}

/// True iff a direct primitive cast from `src` to `dst` is supported:
/// both primitive, not equal, and in the same category (floating with
/// floating, integral with integral). Cross-category casts are not
/// supported directly; they must route through boxing.
pub fn can_prim_cast(src: &SemanticType, dst: &SemanticType) -> bool {
    match (src, dst) {
        (SemanticType::Prim(s), SemanticType::Prim(d)) if s != d => {
            (s.is_floating() && d.is_floating()) || (s.is_integral() && d.is_integral())
        }
        _ => false,
    }
}

/// True iff a primitive `src` may be boxed to satisfy reference `dst`:
/// `dst` must be the corresponding wrapper class or a supertype of it.
pub fn can_box_argument(src: &SemanticType, dst: &SemanticType) -> bool {
    match (src, dst) {
        (SemanticType::Prim(s), SemanticType::Ref(d)) => d.is_assignable_from(wrapper_class(*s)),
        _ => false,
    }
}

/// True iff a reference `src` may be unboxed to satisfy primitive `dst`:
/// `src` must be the corresponding wrapper class or a supertype of one
/// (the supertype case takes a runtime check).
pub fn can_unbox_argument(src: &SemanticType, dst: &SemanticType) -> bool {
    match (src, dst) {
        (SemanticType::Ref(s), SemanticType::Prim(d)) => {
            let w = wrapper_class(*d);
            s == w || s.is_assignable_from(w)
        }
        _ => false,
    }
}

/// Whether a `src` value may be substituted for `dst` under normal type
/// safety: unchecked reference widening only.
pub fn can_pass_unchecked(src: &SemanticType, dst: &SemanticType) -> bool {
    is_null_conversion(src, dst)
}

/// Whether a `src` value may be reinterpreted as `dst` under the raw
/// calling mode: two primitives of equal bit-width, or any two references.
/// Raw mode exists for trusted internal call paths only and is never a
/// public default.
pub(crate) fn can_pass_raw(src: &SemanticType, dst: &SemanticType) -> bool {
    if src == dst {
        return true;
    }
    match (src, dst) {
        (SemanticType::Ref(_), SemanticType::Ref(_)) => true,
        (SemanticType::Prim(s), SemanticType::Prim(d)) => s.bit_width() == d.bit_width(),
        _ => false,
    }
}

/// Feasibility of converting one argument from `src` (what the caller
/// passes) to `dst` (what the target wants). Mirrors the classification
/// used by pairwise synthesis: null conversion, checked reference cast,
/// same-category primitive cast, unbox, or box.
pub fn can_convert_argument(src: &SemanticType, dst: &SemanticType) -> bool {
    if is_null_conversion(src, dst) {
        return true;
    }
    match (src, dst) {
        // A checked downcast is always encodable between references.
        (SemanticType::Ref(_), SemanticType::Ref(_)) => true,
        (SemanticType::Prim(_), SemanticType::Prim(_)) => can_prim_cast(src, dst),
        (SemanticType::Ref(_), SemanticType::Prim(_)) => can_unbox_argument(src, dst),
        (SemanticType::Prim(_), SemanticType::Ref(_)) => can_box_argument(src, dst),
        _ => false,
    }
}

/// Feasibility for the return position: the target produces `src`, the
/// caller expects `dst`.
pub fn can_convert_return(src: &SemanticType, dst: &SemanticType) -> bool {
    if *dst == SemanticType::Void {
        // The result is discarded.
        return true;
    }
    if *src == SemanticType::Void {
        return false;
    }
    can_convert_argument(src, dst)
}

/// Pairwise conversion feasibility between whole shapes: the target of
/// shape `old` can be adapted to present shape `new` iff the return type
/// and every parameter are pairwise convertible. Short-circuits on the
/// first incompatibility; returns the offending parameter index
/// (`None` for a return/arity mismatch) so callers can report it.
pub fn pairwise_incompatibility(new: &Signature, old: &Signature) -> Result<(), Option<usize>> {
    if new.param_count() != old.param_count() {
        return Err(None);
    }
    if !can_convert_return(old.return_type(), new.return_type()) {
        return Err(None);
    }
    for i in 0..new.param_count() {
        if !can_convert_argument(new.param(i), old.param(i)) {
            return Err(Some(i));
        }
    }
    Ok(())
}

/// Boolean form of [`pairwise_incompatibility`].
pub fn can_pairwise_convert(new: &Signature, old: &Signature) -> bool {
    pairwise_incompatibility(new, old).is_ok()
}
