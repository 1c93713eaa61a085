use enum_dispatch::enum_dispatch;
use std::{
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use crate::error::AdaptError;
use crate::signature::Signature;
use crate::types::{class_named, compat, ClassRef, SemanticType};
use crate::value::Value;

pub mod adapter;
pub mod descriptor;
pub mod permute;

pub use adapter::AdapterHandle;
use crate::generic::{
    from_generic::FromGenericInstance, spread::SpreadInstance, to_generic::ToGenericInstance,
};

/// The host boundary: an opaque, directly-callable entry point bound to a
/// resolved method, field accessor, or constructor. Executing one is the
/// only operation that crosses into host territory; the engine treats it
/// as a black box that consumes a fully materialized argument list
/// matching its exact declared shape.
pub trait RawCallable: Send + Sync {
    fn call(&self, args: &[Value]) -> Result<Value, AdaptError>;
}

impl<F> RawCallable for F
where
    F: Fn(&[Value]) -> Result<Value, AdaptError> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> Result<Value, AdaptError> {
        self(args)
    }
}

/// Operations common to every handle kind.
#[enum_dispatch]
pub trait HandleOps {
    /// The advertised call shape.
    fn shape(&self) -> &Arc<Signature>;
    /// Invoke with a fully materialized argument list matching the
    /// advertised shape exactly.
    fn invoke(&self, args: &[Value]) -> Result<Value, AdaptError>;
}

/// A method handle: a typed, directly-callable reference, possibly
/// wrapped in a pipeline of adapters. Adapters chain by wrapping an inner
/// target handle; construction only ever wraps existing handles, so a
/// chain cannot cycle.
#[enum_dispatch(HandleOps)]
pub enum MethodHandle {
    DirectHandle,
    BoundHandle,
    AdapterHandle,
    ToGenericInstance,
    FromGenericInstance,
    SpreadInstance,
}

impl Debug for MethodHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let kind = match self {
            MethodHandle::DirectHandle(_) => "direct",
            MethodHandle::BoundHandle(_) => "bound",
            MethodHandle::AdapterHandle(a) => return a.fmt(f),
            MethodHandle::ToGenericInstance(_) => "to-generic",
            MethodHandle::FromGenericInstance(_) => "from-generic",
            MethodHandle::SpreadInstance(_) => "spread",
        };
        write!(f, "{kind}{}", self.shape())
    }
}

impl MethodHandle {
    /// Wrap a host entry point as a direct handle.
    pub fn direct(shape: Arc<Signature>, callable: Arc<dyn RawCallable>) -> Arc<MethodHandle> {
        Arc::new(MethodHandle::DirectHandle(DirectHandle { shape, callable }))
    }

    /// Convenience: a direct handle over a closure.
    pub fn from_fn<F>(shape: Arc<Signature>, f: F) -> Arc<MethodHandle>
    where
        F: Fn(&[Value]) -> Result<Value, AdaptError> + Send + Sync + 'static,
    {
        Self::direct(shape, Arc::new(f))
    }

    /// Wrap the handle as an opaque reference value, e.g. for passing as
    /// the leading argument of an invoker stub.
    pub fn as_value(self: &Arc<Self>) -> Value {
        Value::Ref(crate::value::Reference::opaque(
            method_handle_class(),
            self.clone(),
        ))
    }
}

/// The class under which handles travel as opaque reference values (e.g.
/// as the leading argument of an invoker stub).
pub fn method_handle_class() -> ClassRef {
    class_named("MethodHandle", None)
}

/// Reject an argument list that does not match `shape` exactly.
pub fn check_arguments(shape: &Arc<Signature>, args: &[Value]) -> Result<(), AdaptError> {
    if args.len() != shape.param_count() {
        return Err(AdaptError::WrongArity {
            shape: shape.to_string(),
            given: args.len(),
        });
    }
    for (i, (v, t)) in args.iter().zip(shape.params()).enumerate() {
        if !v.conforms_to(t) {
            return Err(AdaptError::WrongType {
                expected: shape.to_string(),
                found: v.type_name(),
                arg: i,
            });
        }
    }
    Ok(())
}

/// Check that a produced result conforms to the declared return type;
/// a violation is an engine bug, not a caller error.
pub(crate) fn check_return(shape: &Arc<Signature>, v: &Value) -> Result<(), AdaptError> {
    let ok = match shape.return_type() {
        SemanticType::Void => matches!(v, Value::Void),
        t => v.conforms_to(t),
    };
    if ok {
        Ok(())
    } else {
        Err(AdaptError::internal(format!(
            "result {} does not conform to {}",
            v.type_name(),
            shape
        )))
    }
}

/// A handle directly bound to a host entry point.
pub struct DirectHandle {
    shape: Arc<Signature>,
    callable: Arc<dyn RawCallable>,
}

impl HandleOps for DirectHandle {
    fn shape(&self) -> &Arc<Signature> {
        &self.shape
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, AdaptError> {
        check_arguments(&self.shape, args)?;
        let result = self.callable.call(args)?;
        check_return(&self.shape, &result)?;
        Ok(result)
    }
}

/// A handle with one argument pre-inserted: invoking it splices the bound
/// value into the target's argument list at the bound position.
pub struct BoundHandle {
    shape: Arc<Signature>,
    target: Arc<MethodHandle>,
    position: usize,
    value: Value,
}

impl HandleOps for BoundHandle {
    fn shape(&self) -> &Arc<Signature> {
        &self.shape
    }

    fn invoke(&self, args: &[Value]) -> Result<Value, AdaptError> {
        check_arguments(&self.shape, args)?;
        let mut full = Vec::with_capacity(args.len() + 1);
        full.extend_from_slice(&args[..self.position]);
        full.push(self.value.clone());
        full.extend_from_slice(&args[self.position..]);
        self.target.invoke(&full)
    }
}

// Public combinator surface.

/// Adapt `target` to present `new_shape` by pairwise argument conversion.
/// Identity adaptation returns the same handle (no wrapping).
pub fn adapt(
    target: &Arc<MethodHandle>,
    new_shape: &Arc<Signature>,
) -> Result<Arc<MethodHandle>, AdaptError> {
    adapter::make_pairwise_convert(target, new_shape)
}

/// Whether `adapt` could succeed between the two shapes. Pure; never
/// touches any cache.
pub fn is_convertible(new_shape: &Signature, old_shape: &Signature) -> bool {
    compat::can_pairwise_convert(new_shape, old_shape)
}

/// Pre-insert `value` at parameter `position` of `target`. The value must
/// conform to the bound parameter's type.
pub fn bind(
    target: &Arc<MethodHandle>,
    position: usize,
    value: Value,
) -> Result<Arc<MethodHandle>, AdaptError> {
    let old = target.shape();
    if position >= old.param_count() {
        return Err(AdaptError::bad_argument(format!(
            "bind position {position} out of range for {old}"
        )));
    }
    if !value.conforms_to(old.param(position)) {
        return Err(AdaptError::bad_argument(format!(
            "bound value {} does not conform to parameter {position} of {old}",
            value.type_name()
        )));
    }
    let shape = old.drop_params(position..position + 1);
    Ok(Arc::new(MethodHandle::BoundHandle(BoundHandle {
        shape,
        target: target.clone(),
        position,
        value,
    })))
}

/// Present extra, ignored parameters: the new shape inserts `dropped` at
/// `position`, and invoking the result discards those arguments before
/// calling `target`. A shape-only operation; no conversion piggy-backs.
pub fn drop_arguments(
    target: &Arc<MethodHandle>,
    position: usize,
    dropped: &[SemanticType],
) -> Result<Arc<MethodHandle>, AdaptError> {
    adapter::make_drop_arguments(target, position, dropped)
}

/// Adapt to `new_shape`, whose trailing parameter is an array aggregate
/// that is spread over the target's trailing parameters.
pub fn spread_arguments(
    target: &Arc<MethodHandle>,
    new_shape: &Arc<Signature>,
) -> Result<Arc<MethodHandle>, AdaptError> {
    crate::generic::spread::make_spread(target, new_shape)
}

/// Reorder arguments: outgoing position `j` takes incoming argument
/// `reorder[j]`. The map may drop (index absent) or duplicate (index
/// repeated) incoming arguments; no conversions are applied.
pub fn permute_arguments(
    target: &Arc<MethodHandle>,
    new_shape: &Arc<Signature>,
    reorder: &[usize],
) -> Result<Arc<MethodHandle>, AdaptError> {
    permute::make_permute_arguments(target, new_shape, reorder)
}
