//! Typed shape over a generic target.
//!
//! A `ToGeneric` prototype is computed once per erased shape family and
//! records which template entry point (if any) serves the family and how
//! the generic result is converted back. Instances bind a concrete typed
//! shape and a generic target to the prototype; binding is cheap.

use std::sync::Arc;

use crate::error::AdaptError;
use crate::generic::{
    box_arg, compute_return_conversion, find_template, AdapterTemplate, ReturnConversion,
};
use crate::handle::{check_arguments, HandleOps, MethodHandle};
use crate::signature::{form::SignatureForm, Signature};
use crate::value::Value;

pub struct ToGeneric {
    /// The erased shape this family serves.
    entry_type: Arc<Signature>,
    /// The canonicalized shape whose template was selected; equal to
    /// `entry_type` on the exact tier and on the interpreted fallback.
    raw_entry_type: Arc<Signature>,
    template: Option<&'static AdapterTemplate>,
    ret_conv: ReturnConversion,
}

impl ToGeneric {
    /// Select the entry path for one erased family, trying the template
    /// tiers in order: exact layout, primitives-at-end, primitives as
    /// int/long, everything as long, interpreted fallback.
    pub(crate) fn of(form: &SignatureForm) -> Arc<ToGeneric> {
        let entry = form.erased_type().clone();
        let (template, raw) = Self::select(&entry);
        let ret_conv = compute_return_conversion(entry.return_type(), raw.return_type(), false);
        Arc::new(ToGeneric {
            entry_type: entry,
            raw_entry_type: raw,
            template,
            ret_conv,
        })
    }

    fn select(entry: &Arc<Signature>) -> (Option<&'static AdapterTemplate>, Arc<Signature>) {
        if let Some(t) = find_template(entry) {
            return (Some(t), entry.clone());
        }
        let canon = entry.prims_at_end();
        if let Some(t) = find_template(&canon) {
            return (Some(t), canon);
        }
        let ints = canon.prims_as_ints();
        if let Some(t) = find_template(&ints) {
            return (Some(t), ints);
        }
        let longs = canon.prims_as_longs();
        if let Some(t) = find_template(&longs) {
            return (Some(t), longs);
        }
        (None, entry.clone())
    }

    pub(crate) fn has_template(&self) -> bool {
        self.template.is_some()
    }

    /// Bind a concrete typed shape of this family to a generic target.
    pub(crate) fn make_instance(
        self: &Arc<Self>,
        shape: &Arc<Signature>,
        target: &Arc<MethodHandle>,
    ) -> Result<Arc<MethodHandle>, AdaptError> {
        if !Arc::ptr_eq(&shape.erase(), &self.entry_type) {
            return Err(AdaptError::internal(format!(
                "{shape} does not belong to the family of {}",
                self.entry_type
            )));
        }
        // A shape refined below the family's erasure needs its own return
        // leg: the erased family may pass `Object` through unchecked where
        // the refined shape requires a cast.
        let ret_conv = if Arc::ptr_eq(shape, &self.entry_type) {
            self.ret_conv.clone()
        } else {
            compute_return_conversion(shape.return_type(), self.raw_entry_type.return_type(), true)
        };
        Ok(Arc::new(MethodHandle::ToGenericInstance(
            ToGenericInstance {
                shape: shape.clone(),
                plan: self.clone(),
                target: target.clone(),
                ret_conv,
            },
        )))
    }
}

/// Adapt a generic (all-`Object`) target so it can be invoked under the
/// typed shape `new_shape` of the same arity.
pub fn make_to_generic(
    target: &Arc<MethodHandle>,
    new_shape: &Arc<Signature>,
) -> Result<Arc<MethodHandle>, AdaptError> {
    let old = target.shape();
    if !old.is_generic() || old.param_count() != new_shape.param_count() {
        return Err(AdaptError::shape_incompatible(new_shape, old, None));
    }
    if Arc::ptr_eq(new_shape, old) {
        return Ok(target.clone());
    }
    SignatureForm::of(new_shape)
        .to_generic()
        .make_instance(new_shape, target)
}

pub struct ToGenericInstance {
    shape: Arc<Signature>,
    plan: Arc<ToGeneric>,
    target: Arc<MethodHandle>,
    ret_conv: ReturnConversion,
}

impl HandleOps for ToGenericInstance {
    fn shape(&self) -> &Arc<Signature> {
        &self.shape
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, AdaptError> {
        check_arguments(&self.shape, args)?;
        let boxed = match self.plan.template {
            Some(t) => t.box_arguments(args)?,
            None => args.iter().map(box_arg).collect::<Result<Vec<_>, _>>()?,
        };
        let result = self.target.invoke(&boxed)?;
        self.ret_conv.apply(result, args.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{class_named, PrimKind, SemanticType};
    use crate::value::{box_value, unbox_value, Reference};

    fn prim(k: PrimKind) -> SemanticType {
        SemanticType::Prim(k)
    }

    /// A generic target summing the two boxed ints it receives.
    fn generic_summer() -> Arc<MethodHandle> {
        let shape = Signature::of(
            vec![SemanticType::object(), SemanticType::object()],
            SemanticType::object(),
        )
        .unwrap();
        MethodHandle::from_fn(shape, |args| {
            let a = unbox_value(&args[0], PrimKind::Int, 0)?;
            let b = unbox_value(&args[1], PrimKind::Int, 1)?;
            match (a, b) {
                (Value::Int(a), Value::Int(b)) => box_value(Value::Int(a + b)),
                _ => unreachable!(),
            }
        })
    }

    #[test]
    fn typed_view_boxes_and_unboxes() {
        let typed = Signature::of(vec![prim(PrimKind::Int); 2], prim(PrimKind::Int)).unwrap();
        let h = make_to_generic(&generic_summer(), &typed).unwrap();
        assert!(Arc::ptr_eq(h.shape(), &typed));
        assert_eq!(h.invoke(&[Value::Int(40), Value::Int(2)]).unwrap(), Value::Int(42));
    }

    #[test]
    fn generic_shape_is_identity() {
        let g = generic_summer();
        let same = make_to_generic(&g, &g.shape().clone()).unwrap();
        assert!(Arc::ptr_eq(&same, &g));
    }

    #[test]
    fn arity_mismatch_rejected() {
        let typed = Signature::of(vec![prim(PrimKind::Int)], prim(PrimKind::Int)).unwrap();
        assert!(matches!(
            make_to_generic(&generic_summer(), &typed),
            Err(AdaptError::ShapeIncompatible { .. })
        ));
    }

    #[test]
    fn non_generic_target_rejected() {
        let typed = Signature::of(vec![prim(PrimKind::Int); 2], prim(PrimKind::Int)).unwrap();
        let t = MethodHandle::from_fn(typed.clone(), |_| Ok(Value::Int(0)));
        assert!(matches!(
            make_to_generic(&t, &typed),
            Err(AdaptError::ShapeIncompatible { .. })
        ));
    }

    #[test]
    fn refined_return_is_cast_checked() {
        let widget = class_named("Widget", None);
        let gadget = class_named("Gadget", Some(&widget));
        let shape = Signature::of(vec![], SemanticType::object()).unwrap();
        let escapee = widget.clone();
        let g = MethodHandle::from_fn(shape, move |_| {
            Ok(Value::Ref(Reference::opaque(escapee.clone(), Arc::new(()))))
        });
        let refined = Signature::of(vec![], SemanticType::Ref(gadget)).unwrap();
        let h = make_to_generic(&g, &refined).unwrap();
        // the target produced a Widget where a Gadget was promised
        assert!(matches!(h.invoke(&[]), Err(AdaptError::CastFailed { .. })));
    }

    #[test]
    fn void_view_discards_result() {
        let shape = Signature::of(vec![], SemanticType::object()).unwrap();
        let g = MethodHandle::from_fn(shape, |_| box_value(Value::Int(9)));
        let v = Signature::of(vec![], SemanticType::Void).unwrap();
        let h = make_to_generic(&g, &v).unwrap();
        assert_eq!(h.invoke(&[]).unwrap(), Value::Void);
    }

    #[test]
    fn prototype_is_shared_per_family() {
        let typed = Signature::of(vec![prim(PrimKind::Int); 2], prim(PrimKind::Int)).unwrap();
        let a = SignatureForm::of(&typed).to_generic();
        let b = SignatureForm::of(&typed).to_generic();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(a.has_template());
    }

    #[test]
    fn mixed_prims_fall_through_tiers() {
        // float between refs: exact tier misses, canonicalization recovers
        let typed = Signature::of(
            vec![prim(PrimKind::Float), SemanticType::object()],
            prim(PrimKind::Float),
        )
        .unwrap();
        let plan = SignatureForm::of(&typed).to_generic();
        assert!(plan.has_template());
    }
}
