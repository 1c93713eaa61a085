//! Single-step adapter handles and pairwise conversion synthesis.
//!
//! Each adapter wraps a target handle plus exactly one packed conversion
//! descriptor; pipelines are built by chaining adapters. Synthesis is
//! strictly check-then-build: feasibility is established with the pure
//! predicates in [`crate::types::compat`] before any adapter is
//! constructed, so a failed request never half-builds a chain (and never
//! touches the process-wide caches).

use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use crate::error::AdaptError;
use crate::handle::descriptor::{BasicType, ConvOp, ConversionStep, RETURN_ARG};
use crate::handle::{check_arguments, HandleOps, MethodHandle};
use crate::signature::Signature;
use crate::types::{compat, SemanticType};
use crate::value::{
    box_value, checked_cast, prim_cast, retype_raw, unbox_value, Value,
};

/// A handle that performs one conversion step, then invokes its wrapped
/// target. The advertised shape is always the *new* type; the target's
/// shape is the *old* type.
pub struct AdapterHandle {
    shape: Arc<Signature>,
    target: Arc<MethodHandle>,
    conv: u64,
}

impl AdapterHandle {
    /// Wrap `target` with one conversion step. The step is validated and
    /// packed; shape consistency between `shape`, the step, and the
    /// target's shape is the caller's contract (all callers are in this
    /// crate).
    pub(crate) fn make(
        shape: Arc<Signature>,
        target: Arc<MethodHandle>,
        step: ConversionStep,
    ) -> Result<Arc<MethodHandle>, AdaptError> {
        let conv = step.encode()?;
        Ok(Arc::new(MethodHandle::AdapterHandle(AdapterHandle {
            shape,
            target,
            conv,
        })))
    }

    /// The decoded conversion policy of this adapter.
    pub fn conversion(&self) -> ConversionStep {
        // The word was produced by `encode`, so decoding cannot fail.
        ConversionStep::decode(self.conv).unwrap()
    }

    pub fn target(&self) -> &Arc<MethodHandle> {
        &self.target
    }

    fn convert_argument(
        &self,
        v: &Value,
        op: ConvOp,
        dst: &SemanticType,
        arg: usize,
    ) -> Result<Value, AdaptError> {
        match op {
            ConvOp::CheckCast => {
                let class = dst.class().ok_or_else(|| {
                    AdaptError::internal(format!("checked cast to non-reference {dst}"))
                })?;
                checked_cast(v, class, arg)
            }
            ConvOp::PrimCast => {
                let kind = dst.prim_kind().ok_or_else(|| {
                    AdaptError::internal(format!("prim cast to non-primitive {dst}"))
                })?;
                prim_cast(v, kind)
            }
            ConvOp::RefToPrim => {
                let kind = dst.prim_kind().ok_or_else(|| {
                    AdaptError::internal(format!("unbox to non-primitive {dst}"))
                })?;
                unbox_value(v, kind, arg)
            }
            ConvOp::PrimToRef => {
                let boxed = box_value(v.clone())?;
                if let Some(class) = dst.class() {
                    checked_cast(&boxed, class, arg)
                } else {
                    Err(AdaptError::internal(format!("box to non-reference {dst}")))
                }
            }
            other => Err(AdaptError::internal(format!(
                "{} is not an argument conversion",
                other.name()
            ))),
        }
    }
}

impl HandleOps for AdapterHandle {
    fn shape(&self) -> &Arc<Signature> {
        &self.shape
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, AdaptError> {
        check_arguments(&self.shape, args)?;
        let step = self.conversion();
        let old = self.target.shape().clone();
        match step.op {
            ConvOp::RetypeOnly => {
                // Pure reshape: arguments pass through (erasure/widening
                // only); a void return discards the target's result.
                let result = self.target.invoke(args)?;
                if *self.shape.return_type() == SemanticType::Void {
                    Ok(Value::Void)
                } else {
                    Ok(result)
                }
            }
            ConvOp::RetypeRaw => {
                let mut out = args.to_vec();
                for i in 0..old.param_count() {
                    if self.shape.param(i) != old.param(i) {
                        out[i] = retype_raw(&out[i], old.param(i))?;
                    }
                }
                let result = self.target.invoke(&out)?;
                let ret = self.shape.return_type();
                if ret == old.return_type() || *ret == SemanticType::Void {
                    if *ret == SemanticType::Void {
                        return Ok(Value::Void);
                    }
                    Ok(result)
                } else {
                    retype_raw(&result, ret)
                }
            }
            ConvOp::CheckCast | ConvOp::PrimCast | ConvOp::RefToPrim | ConvOp::PrimToRef => {
                if step.arg == RETURN_ARG {
                    let result = self.target.invoke(args)?;
                    self.convert_argument(&result, step.op, self.shape.return_type(), args.len())
                } else {
                    let i = step.arg as usize;
                    let mut out = args.to_vec();
                    out[i] = self.convert_argument(&args[i], step.op, old.param(i), i)?;
                    self.target.invoke(&out)
                }
            }
            ConvOp::Swap => {
                let i = step.arg as usize;
                let mut out = args.to_vec();
                out.swap(i, i + 1);
                self.target.invoke(&out)
            }
            ConvOp::Rotate => {
                let i = step.arg as usize;
                let span = step.delta as usize;
                let mut out = args.to_vec();
                out[i..i + span].rotate_right(1);
                self.target.invoke(&out)
            }
            ConvOp::Dup => {
                let i = step.arg as usize;
                let mut out = args.to_vec();
                out.push(out[i].clone());
                self.target.invoke(&out)
            }
            ConvOp::Drop => {
                let i = step.arg as usize;
                let count = self.shape.param_count() - old.param_count();
                let mut out = args.to_vec();
                out.drain(i..i + count);
                self.target.invoke(&out)
            }
            ConvOp::Spread | ConvOp::Collect => Err(AdaptError::internal(format!(
                "{} does not execute as a plain adapter",
                step.op.name()
            ))),
        }
    }
}

impl Debug for AdapterHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let step = self.conversion();
        write!(
            f,
            "adapt[{}@{}]{} -> {:?}",
            step.op.name(),
            step.arg,
            self.shape,
            self.target
        )
    }
}

/// Walk an adapter chain outward-in, collecting the decoded steps.
/// Non-adapter handles terminate the walk.
pub fn adapter_steps(handle: &MethodHandle) -> Vec<ConversionStep> {
    let mut steps = Vec::new();
    let mut cursor = handle;
    while let MethodHandle::AdapterHandle(a) = cursor {
        steps.push(a.conversion());
        cursor = a.target();
    }
    steps
}

fn classify_argument(src: &SemanticType, dst: &SemanticType) -> Result<ConvOp, AdaptError> {
    match (src, dst) {
        (SemanticType::Ref(_), SemanticType::Ref(_)) => Ok(ConvOp::CheckCast),
        (SemanticType::Prim(_), SemanticType::Prim(_)) => Ok(ConvOp::PrimCast),
        (SemanticType::Ref(_), SemanticType::Prim(_)) => Ok(ConvOp::RefToPrim),
        (SemanticType::Prim(_), SemanticType::Ref(_)) => Ok(ConvOp::PrimToRef),
        _ => Err(AdaptError::internal(format!(
            "unclassifiable conversion {src} -> {dst}"
        ))),
    }
}

fn step_for(op: ConvOp, arg: u32, src: &SemanticType, dst: &SemanticType) -> ConversionStep {
    let (s, d) = (BasicType::of(src), BasicType::of(dst));
    ConversionStep {
        op,
        arg,
        src: s,
        dst: d,
        delta: (d.slot_width() - s.slot_width()) as i32,
    }
}

/// Synthesize the pairwise-conversion chain adapting `target` to
/// `new_shape`. Per-argument conversions cover retypes, reference casts,
/// primitive casts, boxing, and unboxing.
///
/// Fast path: identical shapes return the target unchanged. Feasibility is
/// checked before anything is built; positions whose conversion is a null
/// conversion get no step at all, so the chain length equals the number of
/// genuinely differing positions (plus at most one trailing retype-only
/// step covering pure erasure differences).
pub fn make_pairwise_convert(
    target: &Arc<MethodHandle>,
    new_shape: &Arc<Signature>,
) -> Result<Arc<MethodHandle>, AdaptError> {
    let old = target.shape().clone();
    if Arc::ptr_eq(new_shape, &old) {
        return Ok(target.clone());
    }
    if let Err(arg) = compat::pairwise_incompatibility(new_shape, &old) {
        return Err(AdaptError::shape_incompatible(new_shape, &old, arg));
    }

    let n = new_shape.param_count();
    let last_real = (0..n)
        .rev()
        .find(|&i| !compat::is_null_conversion(new_shape.param(i), old.param(i)));

    let mut mid = target.clone();
    if let Some(last) = last_real {
        for i in 0..=last {
            let (src, dst) = (new_shape.param(i), old.param(i));
            if compat::is_null_conversion(src, dst) {
                continue;
            }
            let op = classify_argument(src, dst)?;
            let shape = mid.shape().change_param(i, src.clone());
            mid = AdapterHandle::make(shape, mid, step_for(op, i as u32, src, dst))?;
        }
    }

    // Return conversion: the target produces old's return, the caller
    // expects new's.
    let (old_ret, new_ret) = (old.return_type(), new_shape.return_type());
    if !compat::is_null_return_conversion(old_ret, new_ret) {
        let op = classify_argument(old_ret, new_ret)?;
        let shape = mid.shape().change_return(new_ret.clone());
        mid = AdapterHandle::make(shape, mid, step_for(op, RETURN_ARG, old_ret, new_ret))?;
    }

    // Final retype, covering positions that differed only by erasure or
    // widening. By construction it can only be needed here, after the
    // last real conversion; anything non-trivial remaining is a bug.
    if !Arc::ptr_eq(mid.shape(), new_shape) {
        let mid_shape = mid.shape().clone();
        for i in 0..n {
            if !compat::is_null_conversion(new_shape.param(i), mid_shape.param(i)) {
                return Err(AdaptError::internal(format!(
                    "retype-only step would hide a real conversion at argument {i}: {new_shape} vs {mid_shape}"
                )));
            }
        }
        if !compat::is_null_return_conversion(mid_shape.return_type(), new_shape.return_type()) {
            return Err(AdaptError::internal(format!(
                "retype-only step would hide a return conversion: {new_shape} vs {mid_shape}"
            )));
        }
        let step = ConversionStep {
            op: ConvOp::RetypeOnly,
            arg: 0,
            src: BasicType::Ref,
            dst: BasicType::Ref,
            delta: 0,
        };
        mid = AdapterHandle::make(new_shape.clone(), mid, step)?;
    }
    Ok(mid)
}

/// Insert ignored parameters at `position`: the result's shape gains
/// `dropped` there, and invocation discards those arguments. Dropping
/// nothing returns the target unchanged.
pub fn make_drop_arguments(
    target: &Arc<MethodHandle>,
    position: usize,
    dropped: &[SemanticType],
) -> Result<Arc<MethodHandle>, AdaptError> {
    let old = target.shape().clone();
    if position > old.param_count() {
        return Err(AdaptError::bad_argument(format!(
            "drop position {position} out of range for {old}"
        )));
    }
    if let Some(i) = dropped.iter().position(|t| *t == SemanticType::Void) {
        return Err(AdaptError::bad_argument(format!(
            "void is not a parameter type (position {i})"
        )));
    }
    if dropped.is_empty() {
        return Ok(target.clone());
    }
    let new_shape = old.insert_params(position, dropped);
    let slots: usize = dropped.iter().map(SemanticType::slot_width).sum();
    let step = ConversionStep {
        op: ConvOp::Drop,
        arg: position as u32,
        src: BasicType::Void,
        dst: BasicType::Void,
        delta: -(slots as i32),
    };
    AdapterHandle::make(new_shape, target.clone(), step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{class_named, PrimKind};

    fn int() -> SemanticType {
        SemanticType::Prim(PrimKind::Int)
    }

    fn obj() -> SemanticType {
        SemanticType::object()
    }

    fn identity_obj() -> Arc<MethodHandle> {
        let shape = Signature::of(vec![obj()], obj()).unwrap();
        MethodHandle::from_fn(shape, |args| Ok(args[0].clone()))
    }

    #[test]
    fn identity_adaptation_returns_same_handle() {
        let h = identity_obj();
        let adapted = make_pairwise_convert(&h, h.shape()).unwrap();
        assert!(Arc::ptr_eq(&h, &adapted));
    }

    #[test]
    fn boxing_scenario_int_to_object() {
        // shape (int)->Object adapted to target (Object)->Object
        let h = identity_obj();
        let new_shape = Signature::of(vec![int()], obj()).unwrap();
        let adapted = make_pairwise_convert(&h, &new_shape).unwrap();
        assert!(Arc::ptr_eq(adapted.shape(), &new_shape));
        let steps = adapter_steps(&adapted);
        let real: Vec<_> = steps
            .iter()
            .filter(|s| s.op != ConvOp::RetypeOnly)
            .collect();
        assert_eq!(real.len(), 1);
        assert_eq!(real[0].op, ConvOp::PrimToRef);
        assert_eq!(real[0].arg, 0);
        let result = adapted.invoke(&[Value::Int(7)]).unwrap();
        assert_eq!(result, box_value(Value::Int(7)).unwrap());
    }

    #[test]
    fn unbox_return_conversion() {
        // target (Object)->Object adapted to (Object)->int
        let h = identity_obj();
        let new_shape = Signature::of(vec![obj()], int()).unwrap();
        let adapted = make_pairwise_convert(&h, &new_shape).unwrap();
        let boxed = box_value(Value::Int(9)).unwrap();
        assert_eq!(adapted.invoke(&[boxed]).unwrap(), Value::Int(9));
    }

    #[test]
    fn single_position_diff_has_single_descriptor() {
        let shape = Signature::of(vec![obj(), int(), obj()], obj()).unwrap();
        let h = MethodHandle::from_fn(shape, |args| box_value(args[1].clone()));
        let new_shape = Signature::of(vec![obj(), SemanticType::Prim(PrimKind::Short), obj()], obj())
            .unwrap();
        let adapted = make_pairwise_convert(&h, &new_shape).unwrap();
        let steps = adapter_steps(&adapted);
        let real: Vec<_> = steps
            .iter()
            .filter(|s| s.op != ConvOp::RetypeOnly)
            .collect();
        assert_eq!(real.len(), 1);
        assert_eq!(real[0].op, ConvOp::PrimCast);
        assert_eq!(real[0].arg, 1);
        assert_eq!(
            adapted
                .invoke(&[Value::null(), Value::Short(5), Value::null()])
                .unwrap(),
            box_value(Value::Int(5)).unwrap()
        );
    }

    #[test]
    fn incompatible_category_reports_shape_incompatible() {
        let shape = Signature::of(vec![int()], obj()).unwrap();
        let h = MethodHandle::from_fn(shape, |args| Ok(args[0].clone()));
        let new_shape = Signature::of(vec![SemanticType::Prim(PrimKind::Float)], obj()).unwrap();
        assert!(matches!(
            make_pairwise_convert(&h, &new_shape),
            Err(AdaptError::ShapeIncompatible { arg: Some(0), .. })
        ));
    }

    #[test]
    fn feasibility_and_build_agree() {
        let types = [
            int(),
            SemanticType::Prim(PrimKind::Float),
            SemanticType::Prim(PrimKind::Long),
            obj(),
            SemanticType::Ref(class_named("Widget", None)),
        ];
        let ret = obj();
        for a in &types {
            for b in &types {
                let old = Signature::of(vec![b.clone()], ret.clone()).unwrap();
                let h = MethodHandle::from_fn(old.clone(), |_| Ok(Value::null()));
                let new = Signature::of(vec![a.clone()], ret.clone()).unwrap();
                let feasible = compat::can_pairwise_convert(&new, &old);
                let built = make_pairwise_convert(&h, &new);
                assert_eq!(feasible, built.is_ok(), "{new} -> {old}");
                if let Ok(handle) = built {
                    assert!(Arc::ptr_eq(handle.shape(), &new));
                }
            }
        }
    }

    #[test]
    fn erasure_only_difference_is_one_retype() {
        let widget = SemanticType::Ref(class_named("Widget", None));
        let old = Signature::of(vec![obj()], obj()).unwrap();
        let h = MethodHandle::from_fn(old, |args| Ok(args[0].clone()));
        let new = Signature::of(vec![widget], obj()).unwrap();
        let adapted = make_pairwise_convert(&h, &new).unwrap();
        let steps = adapter_steps(&adapted);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].op, ConvOp::RetypeOnly);
    }

    #[test]
    fn drop_arguments_scenario() {
        // target (Object)->Object, desired (Object,Object,Object)->Object
        let h = identity_obj();
        let adapted = make_drop_arguments(&h, 1, &[obj(), obj()]).unwrap();
        assert_eq!(adapted.shape().param_count(), 3);
        let steps = adapter_steps(&adapted);
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].op, ConvOp::Drop);
        assert_eq!(steps[0].delta, -2);
        let a = box_value(Value::Int(1)).unwrap();
        let b = box_value(Value::Int(2)).unwrap();
        let c = box_value(Value::Int(3)).unwrap();
        assert_eq!(adapted.invoke(&[a.clone(), b, c]).unwrap(), a);
    }

    #[test]
    fn drop_slot_count_tracks_wide_prims() {
        let shape = Signature::of(vec![], obj()).unwrap();
        let h = MethodHandle::from_fn(shape, |_| Ok(Value::null()));
        let adapted =
            make_drop_arguments(&h, 0, &[SemanticType::Prim(PrimKind::Long), int()]).unwrap();
        let steps = adapter_steps(&adapted);
        assert_eq!(steps[0].delta, -3);
        assert_eq!(
            adapted.invoke(&[Value::Long(1), Value::Int(2)]).unwrap(),
            Value::null()
        );
    }

    #[test]
    fn void_return_discard() {
        let old = Signature::of(vec![], int()).unwrap();
        let h = MethodHandle::from_fn(old, |_| Ok(Value::Int(1)));
        let new = Signature::of(vec![], SemanticType::Void).unwrap();
        let adapted = make_pairwise_convert(&h, &new).unwrap();
        assert_eq!(adapted.invoke(&[]).unwrap(), Value::Void);
    }
}
