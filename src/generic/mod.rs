//! Adapters across the generic boundary.
//!
//! The generic calling convention is the all-`Object` shape: every
//! argument travels boxed and so does the result. Typed code meets
//! generic code through three adapter families, each cached per erased
//! shape on its [`SignatureForm`](crate::signature::form::SignatureForm):
//!
//! - [`to_generic`]: present a typed shape over a generic target
//!   (box arguments going in, convert the result coming out);
//! - [`from_generic`]: present the generic shape over a typed target
//!   (unbox and cast arguments, box the result);
//! - [`spread`]: expand a trailing array aggregate into the target's
//!   trailing parameters.
//!
//! Entry-point selection works against a table of pre-generated
//! templates keyed by argument layout. A shape whose exact layout has no
//! template is canonicalized in tiers (primitives moved to the end, then
//! forgotten to int/long, then everything to long) until a template fits;
//! if none does, the interpreted fallback carries the call. Selection
//! never changes semantics, only which entry path runs.

use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use crate::error::AdaptError;
use crate::types::{ClassRef, PrimKind, SemanticType};
use crate::value::{box_value, checked_cast, rebox_raw, unbox_value, RefData, Value};

pub mod from_generic;
pub mod spread;
pub mod to_generic;

/// Raw return category of a template entry point. Narrow integral kinds
/// fold to `Int`; `Float` and `Double` keep their own categories because
/// the value leaves in a register of its own kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RawReturn {
    Ref,
    Int,
    Long,
    Float,
    Double,
    Void,
}

impl RawReturn {
    const ALL: [RawReturn; 6] = [
        RawReturn::Ref,
        RawReturn::Int,
        RawReturn::Long,
        RawReturn::Float,
        RawReturn::Double,
        RawReturn::Void,
    ];

    fn of(t: &SemanticType) -> RawReturn {
        match t {
            SemanticType::Void => RawReturn::Void,
            SemanticType::Ref(_) => RawReturn::Ref,
            SemanticType::Prim(PrimKind::Long) => RawReturn::Long,
            SemanticType::Prim(PrimKind::Float) => RawReturn::Float,
            SemanticType::Prim(PrimKind::Double) => RawReturn::Double,
            SemanticType::Prim(_) => RawReturn::Int,
        }
    }
}

/// The argument layout a pre-generated entry point accepts: references
/// first, then `ints` one-slot primitives, then `longs` two-slot
/// primitives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TemplateKey {
    pub arity: usize,
    pub ret: RawReturn,
    pub ints: usize,
    pub longs: usize,
}

type Boxer = fn(&[Value]) -> Result<Vec<Value>, AdaptError>;

/// One pre-generated entry point: a fixed argument layout plus the boxing
/// routine that lifts a typed argument list into the generic convention.
pub struct AdapterTemplate {
    pub key: TemplateKey,
    boxer: Boxer,
}

impl AdapterTemplate {
    pub(crate) fn box_arguments(&self, args: &[Value]) -> Result<Vec<Value>, AdaptError> {
        (self.boxer)(args)
    }
}

/// Highest arity covered by the template table; beyond it every call goes
/// through the interpreted fallback.
const MAX_TEMPLATE_ARITY: usize = 10;

static TEMPLATES: Lazy<FxHashMap<TemplateKey, AdapterTemplate>> = Lazy::new(|| {
    let mut table = FxHashMap::default();
    let mut put = |arity: usize, ints: usize, longs: usize| {
        for ret in RawReturn::ALL {
            let key = TemplateKey {
                arity,
                ret,
                ints,
                longs,
            };
            table.insert(
                key,
                AdapterTemplate {
                    key,
                    boxer: boxer_for(arity),
                },
            );
        }
    };
    for arity in 0..=MAX_TEMPLATE_ARITY {
        // Primitive coverage thins out as arity grows; high arities are
        // covered in the all-reference layout only.
        let prim_budget = match arity {
            0..=3 => arity,
            4..=5 => 2,
            _ => 0,
        };
        for ints in 0..=prim_budget {
            for longs in 0..=(prim_budget - ints) {
                put(arity, ints, longs);
            }
        }
    }
    table
});

/// Look up a template whose layout matches `sig` exactly: the parameters
/// must already be in canonical bucket order (references, then narrow
/// primitives, then wide primitives).
pub(crate) fn find_template(
    sig: &crate::signature::Signature,
) -> Option<&'static AdapterTemplate> {
    if sig.canonical_reorder().is_some() {
        return None;
    }
    let (arity, prims, wides, _, _) = sig.prim_category_counts();
    TEMPLATES.get(&TemplateKey {
        arity,
        ret: RawReturn::of(sig.return_type()),
        ints: prims - wides,
        longs: wides,
    })
}

fn boxer_for(arity: usize) -> Boxer {
    // Low arities get unrolled entry points.
    match arity {
        0 => box0,
        1 => box1,
        2 => box2,
        _ => box_n,
    }
}

/// Lift one value into the generic convention: primitives are boxed,
/// references pass unchanged.
pub(crate) fn box_arg(v: &Value) -> Result<Value, AdaptError> {
    match v {
        Value::Ref(_) => Ok(v.clone()),
        prim => box_value(prim.clone()),
    }
}

fn box0(_args: &[Value]) -> Result<Vec<Value>, AdaptError> {
    Ok(Vec::new())
}

fn box1(args: &[Value]) -> Result<Vec<Value>, AdaptError> {
    Ok(vec![box_arg(&args[0])?])
}

fn box2(args: &[Value]) -> Result<Vec<Value>, AdaptError> {
    Ok(vec![box_arg(&args[0])?, box_arg(&args[1])?])
}

fn box_n(args: &[Value]) -> Result<Vec<Value>, AdaptError> {
    args.iter().map(box_arg).collect()
}

/// How a generic (`Object`) result is turned back into a typed one.
#[derive(Clone, Debug)]
pub(crate) enum ReturnConversion {
    /// The caller expects `Object`; pass through.
    Identity,
    /// The caller expects `void`; the result is dropped.
    Discard,
    /// Checked cast to a refined reference type.
    Cast(ClassRef),
    /// Unbox to exactly this primitive kind.
    Unbox(PrimKind),
    /// Unbox on a raw template path: the box may carry the cooked kind or
    /// its int/long-canonicalized raw kind, whose bits are re-cooked.
    UnboxRaw(PrimKind),
}

/// Classify the return leg for a cooked return type served through a raw
/// entry whose return is `raw`. `must_cast` forces a checked cast even
/// for shapes whose erasure would need none (instances refined below
/// their family's erased type).
pub(crate) fn compute_return_conversion(
    cooked: &SemanticType,
    raw: &SemanticType,
    must_cast: bool,
) -> ReturnConversion {
    match cooked {
        SemanticType::Void => ReturnConversion::Discard,
        SemanticType::Ref(c) => {
            if c.is_object() && !must_cast {
                ReturnConversion::Identity
            } else {
                ReturnConversion::Cast(c.clone())
            }
        }
        SemanticType::Prim(k) => {
            if raw.prim_kind() == Some(*k) {
                ReturnConversion::Unbox(*k)
            } else {
                ReturnConversion::UnboxRaw(*k)
            }
        }
    }
}

impl ReturnConversion {
    /// Apply to a generic result. `at` is the position reported in errors
    /// (one past the last argument, i.e. the return position).
    pub(crate) fn apply(&self, v: Value, at: usize) -> Result<Value, AdaptError> {
        match self {
            ReturnConversion::Identity => Ok(v),
            ReturnConversion::Discard => Ok(Value::Void),
            ReturnConversion::Cast(c) => checked_cast(&v, c, at),
            ReturnConversion::Unbox(k) => unbox_value(&v, *k, at),
            ReturnConversion::UnboxRaw(k) => {
                let inner = unbox_any(&v, at)?;
                match inner.prim_kind() {
                    Some(s) if s == *k => Ok(inner),
                    Some(s) if s == k.as_raw() => rebox_raw(&inner, *k),
                    _ => Err(AdaptError::CastFailed {
                        wanted: k.name().to_string(),
                        found: v.type_name(),
                        arg: at,
                    }),
                }
            }
        }
    }
}

/// Inner payload of a box of any primitive kind.
fn unbox_any(v: &Value, at: usize) -> Result<Value, AdaptError> {
    match v {
        Value::Ref(r) => {
            if r.is_null() {
                return Err(AdaptError::NullReference(at));
            }
            match r.data() {
                Some(RefData::Boxed(b)) => Ok(b.clone()),
                _ => Err(AdaptError::CastFailed {
                    wanted: "boxed primitive".to_string(),
                    found: v.type_name(),
                    arg: at,
                }),
            }
        }
        other => Err(AdaptError::internal(format!(
            "unbox of non-reference {}",
            other.type_name()
        ))),
    }
}
