//! Generic shape over a typed target.
//!
//! The mirror image of [`to_generic`](crate::generic::to_generic): the
//! adapter presents the all-`Object` shape, lowers each argument to the
//! target's parameter type (unboxing primitives, casting refined
//! references) and lifts the result back into a box. Lowering is checked;
//! a box of the wrong kind or a reference of the wrong class is a caller
//! error, not an engine bug.

use std::sync::Arc;

use crate::error::AdaptError;
use crate::handle::{check_arguments, HandleOps, MethodHandle};
use crate::signature::{form::SignatureForm, Signature};
use crate::types::SemanticType;
use crate::value::{box_value, checked_cast, unbox_value, Value};

pub struct FromGeneric {
    entry_type: Arc<Signature>,
    generic_type: Arc<Signature>,
}

impl FromGeneric {
    pub(crate) fn of(form: &SignatureForm) -> Arc<FromGeneric> {
        let entry = form.erased_type().clone();
        Arc::new(FromGeneric {
            generic_type: entry.generic(),
            entry_type: entry,
        })
    }

    pub(crate) fn make_instance(self: &Arc<Self>, target: &Arc<MethodHandle>) -> Arc<MethodHandle> {
        debug_assert!(Arc::ptr_eq(&target.shape().erase(), &self.entry_type));
        Arc::new(MethodHandle::FromGenericInstance(FromGenericInstance {
            shape: self.generic_type.clone(),
            target: target.clone(),
        }))
    }
}

/// Present `target` under the fully generic shape of its arity. A target
/// that is already generic is returned unchanged.
pub fn make_from_generic(target: &Arc<MethodHandle>) -> Arc<MethodHandle> {
    if target.shape().is_generic() {
        return target.clone();
    }
    SignatureForm::of(target.shape())
        .from_generic()
        .make_instance(target)
}

/// Lower one generic argument to the type the target wants. `at` is the
/// argument position reported in errors.
pub(crate) fn convert_from_object(
    v: &Value,
    want: &SemanticType,
    at: usize,
) -> Result<Value, AdaptError> {
    match want {
        SemanticType::Prim(k) => unbox_value(v, *k, at),
        SemanticType::Ref(c) if c.is_object() => Ok(v.clone()),
        SemanticType::Ref(c) => checked_cast(v, c, at),
        SemanticType::Void => Err(AdaptError::internal(
            "void in argument position".to_string(),
        )),
    }
}

/// Lift a typed result into the generic convention: primitives are
/// boxed, references pass through, and `void` becomes null.
pub(crate) fn box_result(v: Value) -> Result<Value, AdaptError> {
    match v {
        Value::Void => Ok(Value::null()),
        Value::Ref(_) => Ok(v),
        prim => box_value(prim),
    }
}

pub struct FromGenericInstance {
    shape: Arc<Signature>,
    target: Arc<MethodHandle>,
}

impl HandleOps for FromGenericInstance {
    fn shape(&self) -> &Arc<Signature> {
        &self.shape
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, AdaptError> {
        check_arguments(&self.shape, args)?;
        let want = self.target.shape();
        let mut lowered = Vec::with_capacity(args.len());
        for (i, (v, t)) in args.iter().zip(want.params()).enumerate() {
            lowered.push(convert_from_object(v, t, i)?);
        }
        box_result(self.target.invoke(&lowered)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{class_named, PrimKind};
    use crate::value::Reference;

    fn prim(k: PrimKind) -> SemanticType {
        SemanticType::Prim(k)
    }

    fn typed_summer() -> Arc<MethodHandle> {
        let shape = Signature::of(vec![prim(PrimKind::Int); 2], prim(PrimKind::Int)).unwrap();
        MethodHandle::from_fn(shape, |args| match (&args[0], &args[1]) {
            (Value::Int(a), Value::Int(b)) => Ok(Value::Int(a + b)),
            _ => unreachable!(),
        })
    }

    #[test]
    fn generic_view_unboxes_and_boxes() {
        let h = make_from_generic(&typed_summer());
        assert!(h.shape().is_generic());
        let a = box_value(Value::Int(40)).unwrap();
        let b = box_value(Value::Int(2)).unwrap();
        assert_eq!(
            h.invoke(&[a, b]).unwrap(),
            box_value(Value::Int(42)).unwrap()
        );
    }

    #[test]
    fn wrong_box_kind_is_a_cast_failure() {
        let h = make_from_generic(&typed_summer());
        let a = box_value(Value::Int(1)).unwrap();
        let b = box_value(Value::Long(2)).unwrap();
        assert!(matches!(
            h.invoke(&[a, b]),
            Err(AdaptError::CastFailed { arg: 1, .. })
        ));
    }

    #[test]
    fn null_unbox_reports_position() {
        let h = make_from_generic(&typed_summer());
        let a = box_value(Value::Int(1)).unwrap();
        assert_eq!(
            h.invoke(&[a, Value::null()]),
            Err(AdaptError::NullReference(1))
        );
    }

    #[test]
    fn refined_params_are_cast_checked() {
        let widget = class_named("Widget", None);
        let gadget = class_named("Gadget", Some(&widget));
        let shape = Signature::of(vec![SemanticType::Ref(gadget)], SemanticType::Void).unwrap();
        let t = MethodHandle::from_fn(shape, |_| Ok(Value::Void));
        let h = make_from_generic(&t);
        let w = Value::Ref(Reference::opaque(widget, Arc::new(())));
        assert!(matches!(
            h.invoke(&[w]),
            Err(AdaptError::CastFailed { arg: 0, .. })
        ));
        // void result surfaces as null under the generic shape
        assert_eq!(h.invoke(&[Value::null()]).unwrap(), Value::null());
    }

    #[test]
    fn already_generic_is_identity() {
        let shape = Signature::of(vec![SemanticType::object()], SemanticType::object()).unwrap();
        let g = MethodHandle::from_fn(shape, |args| Ok(args[0].clone()));
        let same = make_from_generic(&g);
        assert!(Arc::ptr_eq(&same, &g));
    }

    #[test]
    fn round_trip_through_both_boundaries() {
        let typed = typed_summer();
        let generic = make_from_generic(&typed);
        let back =
            crate::generic::to_generic::make_to_generic(&generic, &typed.shape().clone()).unwrap();
        assert_eq!(
            back.invoke(&[Value::Int(20), Value::Int(22)]).unwrap(),
            Value::Int(42)
        );
    }
}
