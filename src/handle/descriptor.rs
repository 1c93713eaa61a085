//! Packed conversion descriptors.
//!
//! One descriptor records one argument-level (or whole-call) conversion as
//! an explicit tagged struct, packed into a single `u64` for compact
//! storage inside adapters and fast dispatch:
//!
//! ```text
//! 63      60 59   56 55   52 51                20 19           0
//! +---------+-------+-------+--------------------+--------------+
//! |  op (4) | src(4)| dst(4)|   arg index (32)   |  delta (20)  |
//! +---------+-------+-------+--------------------+--------------+
//! ```
//!
//! `delta` is a signed 20-bit field. For type-changing ops it must equal
//! `slot_width(dst) - slot_width(src)`; for shape-changing ops it carries
//! the explicit slot count (negative for `Drop`, the expansion minus the
//! aggregate's own slot for `Spread`); for `Rotate` it carries the span in
//! argument positions; for `Dup` the slot width of the duplicated argument.

use crate::error::AdaptError;
use crate::types::{PrimKind, SemanticType};

/// The erased basic-type categories carried by a descriptor. The narrow
/// integral kinds fold to `I` at the raw level but keep their own codes so
/// primitive-cast steps stay precise.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BasicType {
    Ref = 0,
    Bool = 1,
    Byte = 2,
    Short = 3,
    Char = 4,
    Int = 5,
    Long = 6,
    Float = 7,
    Double = 8,
    Void = 9,
}

impl BasicType {
    pub const ALL: [BasicType; 10] = [
        BasicType::Ref,
        BasicType::Bool,
        BasicType::Byte,
        BasicType::Short,
        BasicType::Char,
        BasicType::Int,
        BasicType::Long,
        BasicType::Float,
        BasicType::Double,
        BasicType::Void,
    ];

    pub fn of(t: &SemanticType) -> BasicType {
        match t {
            SemanticType::Void => BasicType::Void,
            SemanticType::Ref(_) => BasicType::Ref,
            SemanticType::Prim(k) => match k {
                PrimKind::Bool => BasicType::Bool,
                PrimKind::Byte => BasicType::Byte,
                PrimKind::Short => BasicType::Short,
                PrimKind::Char => BasicType::Char,
                PrimKind::Int => BasicType::Int,
                PrimKind::Long => BasicType::Long,
                PrimKind::Float => BasicType::Float,
                PrimKind::Double => BasicType::Double,
            },
        }
    }

    pub fn slot_width(self) -> isize {
        match self {
            BasicType::Void => 0,
            BasicType::Long | BasicType::Double => 2,
            _ => 1,
        }
    }

    fn from_code(code: u8) -> Option<BasicType> {
        BasicType::ALL.get(code as usize).copied()
    }
}

/// Operation kinds. `Collect` (the reverse of `Spread`) is recognized but
/// not implemented by this engine; encoding it is a hard error so that
/// downstream dispatch can assume every encoded descriptor is executable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConvOp {
    /// Pure reshape: erasure/widening only, no runtime action.
    RetypeOnly = 0,
    /// Raw bit-level reinterpretation (trusted internal paths only).
    RetypeRaw = 1,
    /// Checked reference cast at one argument.
    CheckCast = 2,
    /// Same-category primitive cast at one argument.
    PrimCast = 3,
    /// Unbox a reference into a primitive.
    RefToPrim = 4,
    /// Box a primitive into a reference.
    PrimToRef = 5,
    /// Exchange the argument with its right neighbor.
    Swap = 6,
    /// Rotate a contiguous span of arguments right by one.
    Rotate = 7,
    /// Append a copy of the argument at the top of the list.
    Dup = 8,
    /// Remove a contiguous run of arguments.
    Drop = 9,
    /// Expand a trailing array aggregate into discrete arguments.
    Spread = 10,
    /// Collect trailing arguments into an aggregate. Unimplemented.
    Collect = 11,
}

impl ConvOp {
    pub const ALL: [ConvOp; 12] = [
        ConvOp::RetypeOnly,
        ConvOp::RetypeRaw,
        ConvOp::CheckCast,
        ConvOp::PrimCast,
        ConvOp::RefToPrim,
        ConvOp::PrimToRef,
        ConvOp::Swap,
        ConvOp::Rotate,
        ConvOp::Dup,
        ConvOp::Drop,
        ConvOp::Spread,
        ConvOp::Collect,
    ];

    /// The table of operations implemented by this engine.
    pub fn is_implemented(self) -> bool {
        !matches!(self, ConvOp::Collect)
    }

    /// Type-changing ops obey the slot-delta invariant
    /// `delta == slot_width(dst) - slot_width(src)`.
    pub fn is_type_conversion(self) -> bool {
        matches!(
            self,
            ConvOp::RetypeOnly
                | ConvOp::RetypeRaw
                | ConvOp::CheckCast
                | ConvOp::PrimCast
                | ConvOp::RefToPrim
                | ConvOp::PrimToRef
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ConvOp::RetypeOnly => "retype-only",
            ConvOp::RetypeRaw => "retype-raw",
            ConvOp::CheckCast => "checked-cast",
            ConvOp::PrimCast => "prim-cast",
            ConvOp::RefToPrim => "unbox",
            ConvOp::PrimToRef => "box",
            ConvOp::Swap => "swap",
            ConvOp::Rotate => "rotate",
            ConvOp::Dup => "dup",
            ConvOp::Drop => "drop",
            ConvOp::Spread => "spread",
            ConvOp::Collect => "collect",
        }
    }

    fn from_code(code: u8) -> Option<ConvOp> {
        ConvOp::ALL.get(code as usize).copied()
    }
}

/// Sentinel argument index addressing the return value instead of a
/// parameter.
pub const RETURN_ARG: u32 = u32::MAX;

const DELTA_BITS: u32 = 20;
const DELTA_MAX: i32 = (1 << (DELTA_BITS - 1)) - 1;
const DELTA_MIN: i32 = -(1 << (DELTA_BITS - 1));

/// One decoded conversion step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversionStep {
    pub op: ConvOp,
    pub arg: u32,
    pub src: BasicType,
    pub dst: BasicType,
    pub delta: i32,
}

impl ConversionStep {
    /// Pack into the fixed-width word, validating the field ranges, the
    /// implemented-ops table, and the slot-delta invariant.
    pub fn encode(&self) -> Result<u64, AdaptError> {
        if !self.op.is_implemented() {
            return Err(AdaptError::UnsupportedConversion(self.op.name()));
        }
        if self.op.is_type_conversion() {
            let expect = self.dst.slot_width() - self.src.slot_width();
            if self.delta as isize != expect {
                return Err(AdaptError::internal(format!(
                    "{} stack delta {} != {} for {:?} -> {:?}",
                    self.op.name(),
                    self.delta,
                    expect,
                    self.src,
                    self.dst
                )));
            }
        }
        if self.delta > DELTA_MAX || self.delta < DELTA_MIN {
            return Err(AdaptError::bad_argument(format!(
                "stack delta {} out of range",
                self.delta
            )));
        }
        let delta = (self.delta as u32) & ((1 << DELTA_BITS) - 1);
        Ok(((self.op as u64) << 60)
            | ((self.src as u64) << 56)
            | ((self.dst as u64) << 52)
            | ((self.arg as u64) << DELTA_BITS)
            | delta as u64)
    }

    /// Unpack a word produced by [`ConversionStep::encode`].
    pub fn decode(word: u64) -> Result<ConversionStep, AdaptError> {
        let op = ConvOp::from_code((word >> 60) as u8)
            .ok_or_else(|| AdaptError::internal(format!("bad op code in {word:#x}")))?;
        let src = BasicType::from_code(((word >> 56) & 0xF) as u8)
            .ok_or_else(|| AdaptError::internal(format!("bad src code in {word:#x}")))?;
        let dst = BasicType::from_code(((word >> 52) & 0xF) as u8)
            .ok_or_else(|| AdaptError::internal(format!("bad dst code in {word:#x}")))?;
        let arg = ((word >> DELTA_BITS) & 0xFFFF_FFFF) as u32;
        let raw = (word & ((1 << DELTA_BITS) - 1)) as u32;
        // sign-extend the 20-bit field
        let delta = ((raw << (32 - DELTA_BITS)) as i32) >> (32 - DELTA_BITS);
        Ok(ConversionStep {
            op,
            arg,
            src,
            dst,
            delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_all_type_conversions() {
        for op in ConvOp::ALL {
            if !op.is_implemented() || !op.is_type_conversion() {
                continue;
            }
            for src in BasicType::ALL {
                for dst in BasicType::ALL {
                    for arg in [0u32, 1, 7, 0xFFFF_FFFE, RETURN_ARG] {
                        let step = ConversionStep {
                            op,
                            arg,
                            src,
                            dst,
                            delta: (dst.slot_width() - src.slot_width()) as i32,
                        };
                        let word = step.encode().unwrap();
                        assert_eq!(ConversionStep::decode(word).unwrap(), step);
                    }
                }
            }
        }
    }

    #[test]
    fn round_trip_shape_ops() {
        for (op, delta) in [
            (ConvOp::Drop, -7),
            (ConvOp::Drop, -1),
            (ConvOp::Spread, 5),
            (ConvOp::Spread, -1),
            (ConvOp::Rotate, 4),
            (ConvOp::Swap, 0),
            (ConvOp::Dup, 2),
        ] {
            let step = ConversionStep {
                op,
                arg: 3,
                src: BasicType::Ref,
                dst: BasicType::Ref,
                delta,
            };
            let word = step.encode().unwrap();
            assert_eq!(ConversionStep::decode(word).unwrap(), step);
        }
    }

    #[test]
    fn delta_sign_extension() {
        let step = ConversionStep {
            op: ConvOp::Drop,
            arg: 0,
            src: BasicType::Void,
            dst: BasicType::Void,
            delta: DELTA_MIN,
        };
        assert_eq!(
            ConversionStep::decode(step.encode().unwrap()).unwrap().delta,
            DELTA_MIN
        );
        let step = ConversionStep { delta: DELTA_MAX, ..step };
        assert_eq!(
            ConversionStep::decode(step.encode().unwrap()).unwrap().delta,
            DELTA_MAX
        );
    }

    #[test]
    fn collect_is_a_hard_error() {
        let step = ConversionStep {
            op: ConvOp::Collect,
            arg: 0,
            src: BasicType::Ref,
            dst: BasicType::Ref,
            delta: 0,
        };
        assert_eq!(
            step.encode(),
            Err(AdaptError::UnsupportedConversion("collect"))
        );
    }

    #[test]
    fn slot_delta_invariant_enforced() {
        let step = ConversionStep {
            op: ConvOp::PrimCast,
            arg: 0,
            src: BasicType::Int,
            dst: BasicType::Long,
            delta: 0, // must be +1
        };
        assert!(matches!(
            step.encode(),
            Err(AdaptError::InternalInconsistency(_))
        ));
    }
}
