//! Error vocabulary of the adaptation engine.
//!
//! Synthesis-time failures (`ShapeIncompatible`, `UnsupportedConversion`,
//! `BadArgument`) mean no adapter was built; invocation-time failures
//! (`WrongType`, `WrongArity`, `NullReference`, `CastFailed`) mean the
//! caller handed a chain something it cannot carry. `InternalInconsistency`
//! is reserved for states the engine promises never to reach.

use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::signature::Signature;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdaptError {
    #[error("cannot adapt {new} to {old}{}", FmtArg(.arg))]
    ShapeIncompatible {
        new: String,
        old: String,
        arg: Option<usize>,
    },
    #[error("conversion {0} is not implemented")]
    UnsupportedConversion(&'static str),
    #[error("{0}")]
    BadArgument(String),
    #[error("internal inconsistency: {0}")]
    InternalInconsistency(String),
    #[error("expected {expected} but argument {arg} is {found}")]
    WrongType {
        expected: String,
        found: String,
        arg: usize,
    },
    #[error("{shape} invoked with {given} arguments")]
    WrongArity { shape: String, given: usize },
    #[error("null reference at argument {0}")]
    NullReference(usize),
    #[error("cannot cast {found} to {wanted} at argument {arg}")]
    CastFailed {
        wanted: String,
        found: String,
        arg: usize,
    },
    #[error("call site {0} has no target")]
    UnboundCallSite(String),
}

impl AdaptError {
    pub(crate) fn shape_incompatible(
        new: &Signature,
        old: &Signature,
        arg: Option<usize>,
    ) -> AdaptError {
        AdaptError::ShapeIncompatible {
            new: new.to_string(),
            old: old.to_string(),
            arg,
        }
    }

    pub(crate) fn bad_argument(msg: impl Into<String>) -> AdaptError {
        AdaptError::BadArgument(msg.into())
    }

    pub(crate) fn internal(msg: impl Into<String>) -> AdaptError {
        AdaptError::InternalInconsistency(msg.into())
    }
}

struct FmtArg<'a>(&'a Option<usize>);

impl Display for FmtArg<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(i) => write!(f, " at argument {i}"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_incompatibility_names_the_argument() {
        let e = AdaptError::ShapeIncompatible {
            new: "(int)->void".to_string(),
            old: "(long)->void".to_string(),
            arg: Some(0),
        };
        assert_eq!(e.to_string(), "cannot adapt (int)->void to (long)->void at argument 0");
        let e = AdaptError::ShapeIncompatible {
            new: "()->int".to_string(),
            old: "()->void".to_string(),
            arg: None,
        };
        assert_eq!(e.to_string(), "cannot adapt ()->int to ()->void");
    }

    #[test]
    fn invocation_errors_render() {
        assert_eq!(
            AdaptError::NullReference(2).to_string(),
            "null reference at argument 2"
        );
        assert_eq!(
            AdaptError::UnboundCallSite("probe".to_string()).to_string(),
            "call site probe has no target"
        );
    }
}
