//! Trailing-aggregate expansion.
//!
//! A spread adapter presents a shape whose last parameter is an array
//! aggregate; invoking it expands the aggregate's elements over the
//! target's trailing parameters. The expansion count is fixed at
//! synthesis time, so an aggregate of the wrong length is an invocation
//! error. Prototypes are cached per erased target family and expansion
//! count; instances bind the concrete shapes and target.

use std::sync::Arc;

use crate::error::AdaptError;
use crate::handle::descriptor::{BasicType, ConvOp, ConversionStep};
use crate::handle::{check_arguments, HandleOps, MethodHandle};
use crate::signature::{form::SignatureForm, Signature};
use crate::types::{compat, ClassRef, SemanticType};
use crate::value::Value;

pub struct SpreadGeneric {
    /// The erased target-side shape of the family.
    entry_type: Arc<Signature>,
    /// How many trailing parameters the aggregate replaces.
    spread_count: usize,
}

impl SpreadGeneric {
    pub(crate) fn of(form: &SignatureForm, spread_count: usize) -> Arc<SpreadGeneric> {
        let entry = form.erased_type().clone();
        debug_assert!(spread_count <= entry.param_count());
        Arc::new(SpreadGeneric {
            entry_type: entry,
            spread_count,
        })
    }

    pub(crate) fn spread_count(&self) -> usize {
        self.spread_count
    }

    /// The descriptor for this expansion: the aggregate at `spread_pos`
    /// becomes `spread_count` discrete arguments; the stack grows by the
    /// expansion's slots minus the aggregate's own slot.
    fn descriptor(&self, elem: &SemanticType) -> ConversionStep {
        let spread_pos = self.entry_type.param_count() - self.spread_count;
        let slots: usize = self.entry_type.params()[spread_pos..]
            .iter()
            .map(SemanticType::slot_width)
            .sum();
        ConversionStep {
            op: ConvOp::Spread,
            arg: spread_pos as u32,
            src: BasicType::Ref,
            dst: BasicType::of(elem),
            delta: slots as i32 - 1,
        }
    }

    fn make_instance(
        self: &Arc<Self>,
        shape: Arc<Signature>,
        target: Arc<MethodHandle>,
    ) -> Result<Arc<MethodHandle>, AdaptError> {
        let spread_pos = shape.param_count() - 1;
        let elem = shape
            .param(spread_pos)
            .class()
            .and_then(ClassRef::element_type)
            .cloned()
            .ok_or_else(|| {
                AdaptError::internal(format!("{shape} has no trailing aggregate"))
            })?;
        let conv = self.descriptor(&elem).encode()?;
        Ok(Arc::new(MethodHandle::SpreadInstance(SpreadInstance {
            shape,
            target,
            plan: self.clone(),
            conv,
        })))
    }
}

/// Adapt `target` to `new_shape`, whose trailing parameter is an array
/// aggregate spread over the target's trailing parameters. A shape-only
/// operation: the leading parameters and the return must match exactly,
/// and the element type must be passable to every replaced position with
/// no runtime action.
pub fn make_spread(
    target: &Arc<MethodHandle>,
    new_shape: &Arc<Signature>,
) -> Result<Arc<MethodHandle>, AdaptError> {
    let old = target.shape();
    if new_shape.param_count() == 0 {
        return Err(AdaptError::bad_argument(format!(
            "{new_shape} has no trailing aggregate to spread"
        )));
    }
    let spread_pos = new_shape.param_count() - 1;
    if spread_pos > old.param_count() {
        return Err(AdaptError::shape_incompatible(new_shape, old, None));
    }
    for j in 0..spread_pos {
        if new_shape.param(j) != old.param(j) {
            return Err(AdaptError::shape_incompatible(new_shape, old, Some(j)));
        }
    }
    if new_shape.return_type() != old.return_type() {
        return Err(AdaptError::shape_incompatible(new_shape, old, None));
    }
    let elem = new_shape
        .param(spread_pos)
        .class()
        .and_then(ClassRef::element_type)
        .ok_or_else(|| {
            AdaptError::bad_argument(format!(
                "parameter {spread_pos} of {new_shape} is not an array type"
            ))
        })?;
    let count = old.param_count() - spread_pos;
    for k in 0..count {
        if !compat::is_null_conversion(elem, old.param(spread_pos + k)) {
            return Err(AdaptError::shape_incompatible(
                new_shape,
                old,
                Some(spread_pos),
            ));
        }
    }
    SignatureForm::of(old)
        .spread_generic(count)
        .make_instance(new_shape.clone(), target.clone())
}

pub struct SpreadInstance {
    shape: Arc<Signature>,
    target: Arc<MethodHandle>,
    plan: Arc<SpreadGeneric>,
    conv: u64,
}

impl SpreadInstance {
    /// The decoded expansion descriptor.
    pub fn conversion(&self) -> Result<ConversionStep, AdaptError> {
        ConversionStep::decode(self.conv)
    }
}

impl HandleOps for SpreadInstance {
    fn shape(&self) -> &Arc<Signature> {
        &self.shape
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, AdaptError> {
        check_arguments(&self.shape, args)?;
        let pos = self.shape.param_count() - 1;
        let aggregate = match &args[pos] {
            Value::Ref(r) => r,
            other => {
                return Err(AdaptError::internal(format!(
                    "aggregate position holds {}",
                    other.type_name()
                )))
            }
        };
        if aggregate.is_null() {
            return Err(AdaptError::NullReference(pos));
        }
        let elements = aggregate.as_array().ok_or_else(|| AdaptError::CastFailed {
            wanted: self.shape.param(pos).to_string(),
            found: args[pos].type_name(),
            arg: pos,
        })?;
        let count = self.plan.spread_count();
        if elements.len() != count {
            return Err(AdaptError::bad_argument(format!(
                "aggregate holds {} elements but {} trailing parameters are expanded",
                elements.len(),
                count
            )));
        }
        let want = self.target.shape();
        let mut full = Vec::with_capacity(pos + count);
        full.extend_from_slice(&args[..pos]);
        for (k, e) in elements.iter().enumerate() {
            if !e.conforms_to(want.param(pos + k)) {
                return Err(AdaptError::WrongType {
                    expected: want.to_string(),
                    found: e.type_name(),
                    arg: pos + k,
                });
            }
            full.push(e.clone());
        }
        self.target.invoke(&full)
    }
}
