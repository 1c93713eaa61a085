//! Materialized argument and return values.
//!
//! The engine moves values between call shapes, so the model is a tagged
//! enum over the primitive kinds plus a reference payload. References are
//! immutable `Arc` data: a boxed primitive, an array aggregate (for
//! spread), or an opaque host object. There is nothing mutable to trace,
//! so sharing is plain reference counting.

use std::{
    any::Any,
    fmt::{self, Debug, Formatter},
    sync::Arc,
};

use crate::error::AdaptError;
use crate::types::{
    array_class, wrapper_class, ClassRef, PrimKind, SemanticType,
};

/// A single runtime value. `Void` appears only as the result of a
/// void-returning handle; it is rejected in argument lists.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Ref(Reference),
}

/// A reference value; `Reference(None)` is null.
#[derive(Clone)]
pub struct Reference(Option<Arc<RefValue>>);

pub struct RefValue {
    class: ClassRef,
    data: RefData,
}

pub enum RefData {
    /// A boxed primitive; the payload is always a primitive [`Value`].
    Boxed(Value),
    /// An array aggregate, used by spread adapters.
    Array(Vec<Value>),
    /// An opaque host object.
    Opaque(Arc<dyn Any + Send + Sync>),
}

impl Reference {
    pub fn null() -> Reference {
        Reference(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    pub fn class(&self) -> Option<&ClassRef> {
        self.0.as_ref().map(|v| &v.class)
    }

    pub fn data(&self) -> Option<&RefData> {
        self.0.as_ref().map(|v| &v.data)
    }

    /// Wrap an opaque host object under the given class.
    pub fn opaque(class: ClassRef, data: Arc<dyn Any + Send + Sync>) -> Reference {
        Reference(Some(Arc::new(RefValue {
            class,
            data: RefData::Opaque(data),
        })))
    }

    /// Build an array aggregate of class `elem[]`.
    pub fn array(elem: &SemanticType, values: Vec<Value>) -> Result<Reference, AdaptError> {
        for (i, v) in values.iter().enumerate() {
            if !v.conforms_to(elem) {
                return Err(AdaptError::bad_argument(format!(
                    "array element {i} is {} but the element type is {elem}",
                    v.type_name()
                )));
            }
        }
        Ok(Reference(Some(Arc::new(RefValue {
            class: array_class(elem),
            data: RefData::Array(values),
        }))))
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self.data() {
            Some(RefData::Array(v)) => Some(v),
            _ => None,
        }
    }

    pub fn downcast_opaque<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self.data() {
            Some(RefData::Opaque(o)) => o.clone().downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) || boxed_eq(a, b),
            _ => false,
        }
    }
}

fn boxed_eq(a: &RefValue, b: &RefValue) -> bool {
    match (&a.data, &b.data) {
        (RefData::Boxed(x), RefData::Boxed(y)) => a.class == b.class && x == y,
        (RefData::Array(x), RefData::Array(y)) => a.class == b.class && x == y,
        _ => false,
    }
}

impl Debug for Reference {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.0 {
            None => f.write_str("null"),
            Some(v) => match &v.data {
                RefData::Boxed(b) => write!(f, "{}({b:?})", v.class),
                RefData::Array(a) => write!(f, "{}{a:?}", v.class),
                RefData::Opaque(_) => write!(f, "{}@{:p}", v.class, Arc::as_ptr(v)),
            },
        }
    }
}

impl Value {
    pub fn null() -> Value {
        Value::Ref(Reference::null())
    }

    pub fn prim_kind(&self) -> Option<PrimKind> {
        match self {
            Value::Bool(_) => Some(PrimKind::Bool),
            Value::Byte(_) => Some(PrimKind::Byte),
            Value::Short(_) => Some(PrimKind::Short),
            Value::Char(_) => Some(PrimKind::Char),
            Value::Int(_) => Some(PrimKind::Int),
            Value::Long(_) => Some(PrimKind::Long),
            Value::Float(_) => Some(PrimKind::Float),
            Value::Double(_) => Some(PrimKind::Double),
            Value::Void | Value::Ref(_) => None,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Void => "void".to_string(),
            Value::Ref(r) => match r.class() {
                Some(c) => c.name().to_string(),
                None => "null".to_string(),
            },
            other => other.prim_kind().unwrap().name().to_string(),
        }
    }

    /// Does this value satisfy the given semantic type exactly?
    /// Null satisfies any reference type; a non-null reference satisfies a
    /// reference type when its class is assignable to it.
    pub fn conforms_to(&self, t: &SemanticType) -> bool {
        match (self, t) {
            (Value::Void, SemanticType::Void) => true,
            (Value::Ref(r), SemanticType::Ref(c)) => match r.class() {
                None => true,
                Some(rc) => c.is_assignable_from(rc),
            },
            (v, SemanticType::Prim(k)) => v.prim_kind() == Some(*k),
            _ => false,
        }
    }
}

// Conversion kernel. Each function is one runtime conversion primitive;
// adapters compose them according to their descriptors.

/// Box a primitive value into its wrapper class.
pub fn box_value(v: Value) -> Result<Value, AdaptError> {
    match v.prim_kind() {
        Some(k) => Ok(Value::Ref(Reference(Some(Arc::new(RefValue {
            class: wrapper_class(k).clone(),
            data: RefData::Boxed(v),
        }))))),
        None => Err(AdaptError::internal(format!(
            "box of non-primitive {}",
            v.type_name()
        ))),
    }
}

/// Checked unbox: the reference must be a non-null box of exactly `kind`.
pub fn unbox_value(v: &Value, kind: PrimKind, arg: usize) -> Result<Value, AdaptError> {
    let r = match v {
        Value::Ref(r) => r,
        other => {
            return Err(AdaptError::internal(format!(
                "unbox of non-reference {}",
                other.type_name()
            )))
        }
    };
    if r.is_null() {
        return Err(AdaptError::NullReference(arg));
    }
    match r.data() {
        Some(RefData::Boxed(b)) if b.prim_kind() == Some(kind) => Ok(b.clone()),
        _ => Err(AdaptError::CastFailed {
            wanted: kind.name().to_string(),
            found: v.type_name(),
            arg,
        }),
    }
}

/// Same-category primitive cast (widening or narrowing).
/// Cross-category pairs are rejected by feasibility checking and are an
/// internal error here.
pub fn prim_cast(v: &Value, dst: PrimKind) -> Result<Value, AdaptError> {
    let src = v
        .prim_kind()
        .ok_or_else(|| AdaptError::internal(format!("prim cast of {}", v.type_name())))?;
    if src == dst {
        return Ok(v.clone());
    }
    if src.is_floating() != dst.is_floating() {
        return Err(AdaptError::internal(format!(
            "cross-category cast {} -> {}",
            src.name(),
            dst.name()
        )));
    }
    if src.is_floating() {
        let wide = match v {
            Value::Float(x) => *x as f64,
            Value::Double(x) => *x,
            _ => unreachable!(),
        };
        return Ok(match dst {
            PrimKind::Float => Value::Float(wide as f32),
            PrimKind::Double => Value::Double(wide),
            _ => unreachable!(),
        });
    }
    // Integral: widen through i64, then truncate to the destination.
    let wide = match *v {
        Value::Bool(x) => x as i64,
        Value::Byte(x) => x as i64,
        Value::Short(x) => x as i64,
        Value::Char(x) => x as i64,
        Value::Int(x) => x as i64,
        Value::Long(x) => x,
        _ => unreachable!(),
    };
    Ok(from_integral_bits(wide, dst))
}

/// Reinterpret an integral bit pattern as the destination kind, truncating
/// high bits. Booleans keep only the low bit.
fn from_integral_bits(bits: i64, dst: PrimKind) -> Value {
    match dst {
        PrimKind::Bool => Value::Bool(bits & 1 != 0),
        PrimKind::Byte => Value::Byte(bits as i8),
        PrimKind::Short => Value::Short(bits as i16),
        PrimKind::Char => Value::Char(bits as u16),
        PrimKind::Int => Value::Int(bits as i32),
        PrimKind::Long => Value::Long(bits),
        PrimKind::Float | PrimKind::Double => unreachable!(),
    }
}

/// Raw bit-level reinterpretation between equal-width primitives, or a
/// reference passed through unchanged. Trusted internal call paths only.
pub(crate) fn retype_raw(v: &Value, dst: &SemanticType) -> Result<Value, AdaptError> {
    match (v, dst) {
        (Value::Ref(_), SemanticType::Ref(_)) => Ok(v.clone()),
        (_, SemanticType::Prim(d)) => {
            let s = v.prim_kind().ok_or_else(|| {
                AdaptError::internal(format!("raw retype of {}", v.type_name()))
            })?;
            if s.bit_width() != d.bit_width() {
                return Err(AdaptError::internal(format!(
                    "raw retype width mismatch {} -> {}",
                    s.name(),
                    d.name()
                )));
            }
            Ok(match (v, d) {
                (Value::Int(x), PrimKind::Float) => Value::Float(f32::from_bits(*x as u32)),
                (Value::Float(x), PrimKind::Int) => Value::Int(x.to_bits() as i32),
                (Value::Long(x), PrimKind::Double) => Value::Double(f64::from_bits(*x as u64)),
                (Value::Double(x), PrimKind::Long) => Value::Long(x.to_bits() as i64),
                (Value::Short(x), PrimKind::Char) => Value::Char(*x as u16),
                (Value::Char(x), PrimKind::Short) => Value::Short(*x as i16),
                _ if v.prim_kind() == Some(*d) => v.clone(),
                _ => {
                    return Err(AdaptError::internal(format!(
                        "raw retype {} -> {}",
                        v.type_name(),
                        d.name()
                    )))
                }
            })
        }
        _ => Err(AdaptError::internal(format!(
            "raw retype {} -> {dst}",
            v.type_name()
        ))),
    }
}

/// Re-box a raw int/long-canonicalized value as the cooked primitive kind.
/// A one-slot kind arrives as `Int`, a two-slot kind as `Long` (or, on the
/// longs-only template path, everything as `Long`); the cooked value is
/// recovered from the raw bits.
pub(crate) fn rebox_raw(v: &Value, cooked: PrimKind) -> Result<Value, AdaptError> {
    let bits = match *v {
        Value::Int(x) => x as i64,
        Value::Long(x) => x,
        _ => {
            return Err(AdaptError::internal(format!(
                "rebox of non-raw {}",
                v.type_name()
            )))
        }
    };
    Ok(match cooked {
        PrimKind::Float => Value::Float(f32::from_bits(bits as u32)),
        PrimKind::Double => Value::Double(f64::from_bits(bits as u64)),
        _ => from_integral_bits(bits, cooked),
    })
}

/// Checked reference cast: null passes, otherwise the value's class must be
/// assignable to `wanted`.
pub fn checked_cast(v: &Value, wanted: &ClassRef, arg: usize) -> Result<Value, AdaptError> {
    match v {
        Value::Ref(r) => match r.class() {
            None => Ok(v.clone()),
            Some(c) if wanted.is_assignable_from(c) => Ok(v.clone()),
            Some(_) => Err(AdaptError::CastFailed {
                wanted: wanted.name().to_string(),
                found: v.type_name(),
                arg,
            }),
        },
        other => Err(AdaptError::internal(format!(
            "checked cast of non-reference {}",
            other.type_name()
        ))),
    }
}
