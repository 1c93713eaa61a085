use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::{
    fmt::{self, Debug, Display, Formatter},
    sync::Arc,
};

use crate::error::AdaptError;
use crate::types::{PrimKind, SemanticType};

pub mod form;

/// A call shape: ordered parameter types plus one return type.
///
/// Signatures are immutable and interned: structurally identical shapes map
/// to the same `Arc<Signature>`, so caches keyed by signature can compare by
/// pointer. All structural edits produce new interned instances.
#[derive(PartialEq, Eq, Hash)]
pub struct Signature {
    params: Box<[SemanticType]>,
    ret: SemanticType,
}

#[derive(PartialEq, Eq, Hash)]
struct SigKey(Vec<SemanticType>, SemanticType);

static INTERNED: Lazy<DashMap<SigKey, Arc<Signature>>> = Lazy::new(DashMap::new);

impl Signature {
    /// Intern the shape with the given parameters and return type.
    ///
    /// `void` is a zero-width pseudo-type and is rejected in parameter
    /// position.
    pub fn of(
        params: impl Into<Vec<SemanticType>>,
        ret: SemanticType,
    ) -> Result<Arc<Signature>, AdaptError> {
        let params = params.into();
        if let Some(i) = params.iter().position(|p| *p == SemanticType::Void) {
            return Err(AdaptError::bad_argument(format!(
                "void is not a parameter type (position {i})"
            )));
        }
        Ok(Self::intern(params, ret))
    }

    fn intern(params: Vec<SemanticType>, ret: SemanticType) -> Arc<Signature> {
        let key = SigKey(params, ret);
        if let Some(existing) = INTERNED.get(&key) {
            return existing.clone();
        }
        let SigKey(params, ret) = key;
        INTERNED
            .entry(SigKey(params.clone(), ret.clone()))
            .or_insert_with(|| {
                Arc::new(Signature {
                    params: params.into_boxed_slice(),
                    ret,
                })
            })
            .clone()
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    pub fn param(&self, i: usize) -> &SemanticType {
        &self.params[i]
    }

    pub fn params(&self) -> &[SemanticType] {
        &self.params
    }

    pub fn return_type(&self) -> &SemanticType {
        &self.ret
    }

    /// Erasure: every reference parameter and return collapses to the
    /// `Object` marker; primitives and `void` are unchanged. Idempotent.
    pub fn erase(self: &Arc<Self>) -> Arc<Signature> {
        if self.is_erased() {
            return self.clone();
        }
        Self::intern(
            self.params.iter().map(SemanticType::erase).collect(),
            self.ret.erase(),
        )
    }

    pub fn is_erased(&self) -> bool {
        self.params.iter().all(SemanticType::is_erased) && self.ret.is_erased()
    }

    /// The fully generic form: every parameter and the return become
    /// `Object`. (Unlike erasure, this also forgets primitives.)
    pub fn generic(self: &Arc<Self>) -> Arc<Signature> {
        Self::intern(
            vec![SemanticType::object(); self.params.len()],
            SemanticType::object(),
        )
    }

    pub fn is_generic(&self) -> bool {
        let obj = SemanticType::object();
        self.ret == obj && self.params.iter().all(|p| *p == obj)
    }

    /// Primitive-category counts:
    /// `(param_count, prim_count, wide_count, return_is_prim, return_is_wide)`.
    pub fn prim_category_counts(&self) -> (usize, usize, usize, bool, bool) {
        let prims = self.params.iter().filter(|p| p.is_prim()).count();
        let wides = self.params.iter().filter(|p| p.is_wide()).count();
        (
            self.params.len(),
            prims,
            wides,
            self.ret.is_prim(),
            self.ret.is_wide(),
        )
    }

    /// Total slots occupied by the parameter list: wide primitives take
    /// two units, everything else one.
    pub fn param_slot_count(&self) -> usize {
        self.params.iter().map(SemanticType::slot_width).sum()
    }

    /// Slots contributed by the return value; a `void` return contributes
    /// zero.
    pub fn return_slot_count(&self) -> usize {
        self.ret.slot_width()
    }

    /// Slot depth at which parameter `i` begins.
    pub fn slot_of(&self, i: usize) -> usize {
        self.params[..i].iter().map(SemanticType::slot_width).sum()
    }

    /// Inverse of [`Signature::slot_of`]: which parameter occupies slot
    /// `depth`? `None` if `depth` is past the last slot or falls on the
    /// second unit of a wide primitive's pair.
    pub fn param_at_slot(&self, depth: usize) -> Option<usize> {
        let mut at = 0;
        for (i, p) in self.params.iter().enumerate() {
            if at == depth {
                return Some(i);
            }
            at += p.slot_width();
            if at > depth {
                return None;
            }
        }
        None
    }

    /// Stable 3-way bucket permutation: references first, then narrow
    /// primitives, then wide primitives. Returns `None` when the shape is
    /// already in that order; callers must treat `None` as an explicit
    /// identity signal, distinct from an empty permutation.
    ///
    /// `perm[new_position] == old_position`.
    pub fn canonical_reorder(&self) -> Option<Vec<usize>> {
        fn bucket(t: &SemanticType) -> usize {
            match t {
                SemanticType::Ref(_) => 0,
                SemanticType::Prim(k) if !k.is_wide() => 1,
                _ => 2,
            }
        }
        let mut perm: Vec<usize> = (0..self.params.len()).collect();
        perm.sort_by_key(|&i| (bucket(&self.params[i]), i));
        if perm.iter().enumerate().all(|(n, &o)| n == o) {
            None
        } else {
            Some(perm)
        }
    }

    /// The shape with parameters permuted into the canonical 3-bucket
    /// order, or `self` when already canonical.
    pub fn prims_at_end(self: &Arc<Self>) -> Arc<Signature> {
        match self.canonical_reorder() {
            None => self.clone(),
            Some(perm) => Self::intern(
                perm.iter().map(|&o| self.params[o].clone()).collect(),
                self.ret.clone(),
            ),
        }
    }

    /// Every one-slot primitive forgotten to `int`, every two-slot
    /// primitive forgotten to `long`. References unchanged.
    pub fn prims_as_ints(self: &Arc<Self>) -> Arc<Signature> {
        self.map_prims(PrimKind::as_raw)
    }

    /// Every primitive forgotten to `long`.
    pub fn prims_as_longs(self: &Arc<Self>) -> Arc<Signature> {
        self.map_prims(|_| PrimKind::Long)
    }

    fn map_prims(self: &Arc<Self>, f: impl Fn(PrimKind) -> PrimKind) -> Arc<Signature> {
        let map = |t: &SemanticType| match t {
            SemanticType::Prim(k) => SemanticType::Prim(f(*k)),
            other => other.clone(),
        };
        let params: Vec<SemanticType> = self.params.iter().map(map).collect();
        Self::intern(params, map(&self.ret))
    }

    // Structural edits used by synthesis. Each interns a fresh shape.

    pub fn change_param(self: &Arc<Self>, i: usize, t: SemanticType) -> Arc<Signature> {
        let mut params = self.params.to_vec();
        params[i] = t;
        Self::intern(params, self.ret.clone())
    }

    pub fn change_return(self: &Arc<Self>, t: SemanticType) -> Arc<Signature> {
        Self::intern(self.params.to_vec(), t)
    }

    pub fn insert_params(
        self: &Arc<Self>,
        at: usize,
        types: &[SemanticType],
    ) -> Arc<Signature> {
        let mut params = self.params.to_vec();
        params.splice(at..at, types.iter().cloned());
        Self::intern(params, self.ret.clone())
    }

    pub fn drop_params(self: &Arc<Self>, range: std::ops::Range<usize>) -> Arc<Signature> {
        let mut params = self.params.to_vec();
        params.drain(range);
        Self::intern(params, self.ret.clone())
    }
}

impl Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            Display::fmt(p, f)?;
        }
        write!(f, ")->{}", self.ret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::class_named;

    fn prim(k: PrimKind) -> SemanticType {
        SemanticType::Prim(k)
    }

    fn sig(params: Vec<SemanticType>, ret: SemanticType) -> Arc<Signature> {
        Signature::of(params, ret).unwrap()
    }

    #[test]
    fn interning_gives_pointer_equality() {
        let a = sig(vec![prim(PrimKind::Int)], SemanticType::Void);
        let b = sig(vec![prim(PrimKind::Int)], SemanticType::Void);
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn void_params_rejected() {
        assert!(Signature::of(vec![SemanticType::Void], SemanticType::Void).is_err());
    }

    #[test]
    fn erasure_is_idempotent() {
        let widget = SemanticType::Ref(class_named("Widget", None));
        let s = sig(vec![widget, prim(PrimKind::Long)], SemanticType::object());
        let e = s.erase();
        assert!(Arc::ptr_eq(&e, &e.erase()));
        assert_eq!(e.param(0), &SemanticType::object());
        assert_eq!(e.param(1), &prim(PrimKind::Long));
    }

    #[test]
    fn generic_forgets_primitives() {
        let s = sig(vec![prim(PrimKind::Int), SemanticType::object()], prim(PrimKind::Long));
        let g = s.generic();
        assert!(g.is_generic());
        assert_eq!(g.param_count(), 2);
    }

    #[test]
    fn slot_arithmetic() {
        let s = sig(
            vec![
                SemanticType::object(),
                prim(PrimKind::Long),
                prim(PrimKind::Int),
                prim(PrimKind::Double),
            ],
            SemanticType::Void,
        );
        assert_eq!(s.param_slot_count(), 6);
        assert_eq!(s.return_slot_count(), 0);
        assert_eq!(s.slot_of(0), 0);
        assert_eq!(s.slot_of(1), 1);
        assert_eq!(s.slot_of(2), 3);
        assert_eq!(s.slot_of(3), 4);
        assert_eq!(s.param_at_slot(0), Some(0));
        assert_eq!(s.param_at_slot(1), Some(1));
        // second unit of the long's pair
        assert_eq!(s.param_at_slot(2), None);
        assert_eq!(s.param_at_slot(3), Some(2));
        assert_eq!(s.param_at_slot(4), Some(3));
        assert_eq!(s.param_at_slot(6), None);
        // sum of widths equals the slot count
        let total: usize = s.params().iter().map(SemanticType::slot_width).sum();
        assert_eq!(total, s.param_slot_count());
    }

    #[test]
    fn canonical_reorder_identity_is_none() {
        let s = sig(
            vec![SemanticType::object(), prim(PrimKind::Int), prim(PrimKind::Long)],
            SemanticType::Void,
        );
        assert_eq!(s.canonical_reorder(), None);
        assert!(Arc::ptr_eq(&s.prims_at_end(), &s));
    }

    #[test]
    fn canonical_reorder_buckets() {
        let s = sig(
            vec![
                prim(PrimKind::Long),
                SemanticType::object(),
                prim(PrimKind::Int),
                SemanticType::object(),
            ],
            SemanticType::Void,
        );
        // refs first (stable), then narrow prims, then wide prims
        assert_eq!(s.canonical_reorder(), Some(vec![1, 3, 2, 0]));
        let r = s.prims_at_end();
        assert_eq!(r.param(0), &SemanticType::object());
        assert_eq!(r.param(1), &SemanticType::object());
        assert_eq!(r.param(2), &prim(PrimKind::Int));
        assert_eq!(r.param(3), &prim(PrimKind::Long));
    }

    #[test]
    fn raw_forms() {
        let s = sig(
            vec![prim(PrimKind::Bool), prim(PrimKind::Float), prim(PrimKind::Double)],
            prim(PrimKind::Int),
        );
        let ints = s.prims_as_ints();
        assert_eq!(ints.param(0), &prim(PrimKind::Int));
        assert_eq!(ints.param(1), &prim(PrimKind::Int));
        assert_eq!(ints.param(2), &prim(PrimKind::Long));
        let longs = s.prims_as_longs();
        assert!(longs.params().iter().all(|p| *p == prim(PrimKind::Long)));
    }

    #[test]
    fn structural_edits() {
        let s = sig(vec![prim(PrimKind::Int)], SemanticType::Void);
        let t = s.insert_params(1, &[SemanticType::object(), prim(PrimKind::Long)]);
        assert_eq!(t.param_count(), 3);
        let u = t.drop_params(1..3);
        assert!(Arc::ptr_eq(&u, &s));
        let v = s.change_param(0, SemanticType::object());
        assert_eq!(v.param(0), &SemanticType::object());
        let w = s.change_return(prim(PrimKind::Int));
        assert_eq!(w.return_type(), &prim(PrimKind::Int));
    }
}
