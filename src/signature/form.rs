//! Per-erased-shape cached metadata.
//!
//! All shapes with the same erasure share one `SignatureForm`, interned
//! in a process-wide table. The form carries eagerly computed category
//! counts and write-once lazily filled derived structures: the generic
//! boundary prototypes, the spread prototypes per expansion count, and
//! the invoker stubs. Races fill a cell at most once; losers adopt the
//! winner's value.

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use std::sync::Arc;

use crate::error::AdaptError;
use crate::generic::{
    from_generic::{box_result, convert_from_object, FromGeneric},
    spread::SpreadGeneric,
    to_generic::ToGeneric,
};
use crate::handle::{method_handle_class, HandleOps, MethodHandle};
use crate::signature::Signature;
use crate::types::SemanticType;
use crate::value::Value;

static FORMS: Lazy<DashMap<Arc<Signature>, Arc<SignatureForm>>> = Lazy::new(DashMap::new);

pub struct SignatureForm {
    erased: Arc<Signature>,
    param_count: usize,
    prim_count: usize,
    wide_count: usize,
    return_is_prim: bool,
    return_is_wide: bool,
    param_slots: usize,
    to_generic: OnceCell<Arc<ToGeneric>>,
    from_generic: OnceCell<Arc<FromGeneric>>,
    spread: DashMap<usize, Arc<SpreadGeneric>>,
    invokers: OnceCell<Arc<Invokers>>,
}

impl SignatureForm {
    /// The form shared by every shape erasing to `shape.erase()`.
    pub fn of(shape: &Arc<Signature>) -> Arc<SignatureForm> {
        let erased = shape.erase();
        if let Some(f) = FORMS.get(&erased) {
            return f.clone();
        }
        FORMS
            .entry(erased.clone())
            .or_insert_with(|| {
                let (param_count, prim_count, wide_count, return_is_prim, return_is_wide) =
                    erased.prim_category_counts();
                Arc::new(SignatureForm {
                    param_slots: erased.param_slot_count(),
                    erased,
                    param_count,
                    prim_count,
                    wide_count,
                    return_is_prim,
                    return_is_wide,
                    to_generic: OnceCell::new(),
                    from_generic: OnceCell::new(),
                    spread: DashMap::new(),
                    invokers: OnceCell::new(),
                })
            })
            .clone()
    }

    pub fn erased_type(&self) -> &Arc<Signature> {
        &self.erased
    }

    pub fn param_count(&self) -> usize {
        self.param_count
    }

    pub fn primitive_param_count(&self) -> usize {
        self.prim_count
    }

    pub fn wide_param_count(&self) -> usize {
        self.wide_count
    }

    pub fn return_is_primitive(&self) -> bool {
        self.return_is_prim
    }

    pub fn return_is_wide(&self) -> bool {
        self.return_is_wide
    }

    pub fn param_slot_count(&self) -> usize {
        self.param_slots
    }

    pub fn to_generic(&self) -> Arc<ToGeneric> {
        self.to_generic.get_or_init(|| ToGeneric::of(self)).clone()
    }

    pub fn from_generic(&self) -> Arc<FromGeneric> {
        self.from_generic
            .get_or_init(|| FromGeneric::of(self))
            .clone()
    }

    /// The spread prototype expanding the last `count` parameters.
    pub fn spread_generic(&self, count: usize) -> Arc<SpreadGeneric> {
        if let Some(g) = self.spread.get(&count) {
            return g.clone();
        }
        self.spread
            .entry(count)
            .or_insert_with(|| SpreadGeneric::of(self, count))
            .clone()
    }

    pub fn invokers(&self) -> Arc<Invokers> {
        self.invokers
            .get_or_init(|| Arc::new(Invokers::new(self.erased.clone())))
            .clone()
    }
}

/// Invoker stubs for one erased shape: handles that take a leading
/// handle argument (as an opaque reference) and invoke it over the
/// remaining arguments.
pub struct Invokers {
    erased: Arc<Signature>,
    exact: OnceCell<Arc<MethodHandle>>,
    generic: OnceCell<Arc<MethodHandle>>,
}

impl Invokers {
    fn new(erased: Arc<Signature>) -> Invokers {
        Invokers {
            erased,
            exact: OnceCell::new(),
            generic: OnceCell::new(),
        }
    }

    /// Shape `(MethodHandle, A...)->R`: the leading handle must have
    /// exactly this erased shape and is invoked with no conversions.
    pub fn exact_invoker(&self) -> Arc<MethodHandle> {
        self.exact
            .get_or_init(|| {
                let erased = self.erased.clone();
                let shape = self
                    .erased
                    .insert_params(0, &[SemanticType::Ref(method_handle_class())]);
                MethodHandle::from_fn(shape, move |args| {
                    let mh = leading_handle(args)?;
                    if !Arc::ptr_eq(&mh.shape().erase(), &erased) {
                        return Err(AdaptError::WrongType {
                            expected: erased.to_string(),
                            found: mh.shape().to_string(),
                            arg: 0,
                        });
                    }
                    mh.invoke(&args[1..])
                })
            })
            .clone()
    }

    /// Shape `(MethodHandle, Object...)->Object`: the leading handle may
    /// have any shape of the right arity; arguments are lowered from the
    /// generic convention to its parameter types and the result boxed.
    pub fn generic_invoker(&self) -> Arc<MethodHandle> {
        self.generic
            .get_or_init(|| {
                let arity = self.erased.param_count();
                let shape = self
                    .erased
                    .generic()
                    .insert_params(0, &[SemanticType::Ref(method_handle_class())]);
                MethodHandle::from_fn(shape, move |args| {
                    let mh = leading_handle(args)?;
                    let want = mh.shape().clone();
                    if want.param_count() != arity {
                        return Err(AdaptError::WrongArity {
                            shape: want.to_string(),
                            given: arity,
                        });
                    }
                    let mut lowered = Vec::with_capacity(arity);
                    for (i, (v, t)) in args[1..].iter().zip(want.params()).enumerate() {
                        lowered.push(convert_from_object(v, t, i + 1)?);
                    }
                    box_result(mh.invoke(&lowered)?)
                })
            })
            .clone()
    }
}

fn leading_handle(args: &[Value]) -> Result<Arc<MethodHandle>, AdaptError> {
    let wrong = || AdaptError::WrongType {
        expected: method_handle_class().name().to_string(),
        found: args[0].type_name(),
        arg: 0,
    };
    match &args[0] {
        Value::Ref(r) => r.downcast_opaque::<MethodHandle>().ok_or_else(wrong),
        _ => Err(wrong()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{class_named, PrimKind};
    use crate::value::{box_value, unbox_value};

    fn prim(k: PrimKind) -> SemanticType {
        SemanticType::Prim(k)
    }

    fn sig(params: Vec<SemanticType>, ret: SemanticType) -> Arc<Signature> {
        Signature::of(params, ret).unwrap()
    }

    #[test]
    fn forms_are_shared_across_erasure() {
        let widget = SemanticType::Ref(class_named("Widget", None));
        let refined = sig(vec![widget, prim(PrimKind::Long)], SemanticType::Void);
        let erased = sig(
            vec![SemanticType::object(), prim(PrimKind::Long)],
            SemanticType::Void,
        );
        let a = SignatureForm::of(&refined);
        let b = SignatureForm::of(&erased);
        assert!(Arc::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(a.erased_type(), &erased));
    }

    #[test]
    fn counts_are_precomputed() {
        let s = sig(
            vec![SemanticType::object(), prim(PrimKind::Int), prim(PrimKind::Double)],
            prim(PrimKind::Long),
        );
        let f = SignatureForm::of(&s);
        assert_eq!(f.param_count(), 3);
        assert_eq!(f.primitive_param_count(), 2);
        assert_eq!(f.wide_param_count(), 1);
        assert_eq!(f.param_slot_count(), 4);
        assert!(f.return_is_primitive());
        assert!(f.return_is_wide());
    }

    #[test]
    fn lazy_prototypes_fill_once() {
        let s = sig(vec![prim(PrimKind::Int)], SemanticType::Void);
        let f = SignatureForm::of(&s);
        assert!(Arc::ptr_eq(&f.to_generic(), &f.to_generic()));
        assert!(Arc::ptr_eq(&f.from_generic(), &f.from_generic()));
        assert!(Arc::ptr_eq(&f.spread_generic(1), &f.spread_generic(1)));
        assert!(!Arc::ptr_eq(&f.invokers().exact_invoker(), &f.invokers().generic_invoker()));
    }

    #[test]
    fn racing_lookups_share_one_form() {
        use std::thread;
        let s = sig(
            vec![
                prim(PrimKind::Double),
                SemanticType::object(),
                prim(PrimKind::Long),
                SemanticType::object(),
            ],
            prim(PrimKind::Long),
        );
        let mut handles = vec![];
        for _ in 0..8 {
            let s = s.clone();
            handles.push(thread::spawn(move || {
                let f = SignatureForm::of(&s);
                let g = f.to_generic();
                let sp = f.spread_generic(2);
                (f, g, sp)
            }));
        }
        let f0 = SignatureForm::of(&s);
        let g0 = f0.to_generic();
        let sp0 = f0.spread_generic(2);
        for h in handles {
            let (f, g, sp) = h.join().unwrap();
            assert!(Arc::ptr_eq(&f, &f0));
            assert!(Arc::ptr_eq(&g, &g0));
            assert!(Arc::ptr_eq(&sp, &sp0));
        }
    }

    #[test]
    fn exact_invoker_invokes_the_leading_handle() {
        let s = sig(vec![prim(PrimKind::Int); 2], prim(PrimKind::Int));
        let inv = SignatureForm::of(&s).invokers().exact_invoker();
        assert_eq!(inv.shape().param_count(), 3);
        let target = MethodHandle::from_fn(s, |args| match (&args[0], &args[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a * b)),
            _ => unreachable!(),
        });
        let r = inv
            .invoke(&[target.as_value(), Value::Int(6), Value::Int(7)])
            .unwrap();
        assert_eq!(r, Value::Int(42));
    }

    #[test]
    fn exact_invoker_rejects_other_shapes() {
        let s = sig(vec![prim(PrimKind::Int)], prim(PrimKind::Int));
        let inv = SignatureForm::of(&s).invokers().exact_invoker();
        let other = MethodHandle::from_fn(
            sig(vec![prim(PrimKind::Long)], prim(PrimKind::Int)),
            |_| Ok(Value::Int(0)),
        );
        assert!(matches!(
            inv.invoke(&[other.as_value(), Value::Int(1)]),
            Err(AdaptError::WrongType { arg: 0, .. })
        ));
        // a plain opaque object is not a handle
        assert!(matches!(
            inv.invoke(&[Value::null(), Value::Int(1)]),
            Err(AdaptError::WrongType { arg: 0, .. })
        ));
    }

    #[test]
    fn generic_invoker_lowers_and_boxes() {
        let s = sig(vec![prim(PrimKind::Int); 2], prim(PrimKind::Int));
        let inv = SignatureForm::of(&s).invokers().generic_invoker();
        let target = MethodHandle::from_fn(s, |args| match (&args[0], &args[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a - b)),
            _ => unreachable!(),
        });
        let a = box_value(Value::Int(50)).unwrap();
        let b = box_value(Value::Int(8)).unwrap();
        let r = inv.invoke(&[target.as_value(), a, b]).unwrap();
        assert_eq!(unbox_value(&r, PrimKind::Int, 0).unwrap(), Value::Int(42));
    }
}
