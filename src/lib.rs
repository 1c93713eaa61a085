//! Call-shape adaptation and dispatch for method handles.
//!
//! A method handle is a typed, directly-callable reference to an entry
//! point. This crate synthesizes the adapters that let a handle of one
//! call shape be invoked under another: pairwise argument and return
//! conversion, argument binding, dropping, reordering, spreading, and
//! the boxing bridges across the generic (all-`Object`) calling
//! convention. Mutable [`CallSite`]s layer relinkable dispatch on top.
//!
//! Shapes are interned [`Signature`]s; adapters chain single conversion
//! steps, each encoded in a packed descriptor word, around an innermost
//! direct handle that crosses into host territory.

pub mod callsite;
pub mod error;
pub mod generic;
pub mod handle;
pub mod signature;
pub mod types;
pub mod utils;
pub mod value;

pub use callsite::CallSite;
pub use error::AdaptError;
pub use handle::{
    adapt, bind, drop_arguments, is_convertible, permute_arguments, spread_arguments, HandleOps,
    MethodHandle, RawCallable,
};
pub use signature::{form::SignatureForm, Signature};
pub use types::{ClassRef, PrimKind, SemanticType};
pub use value::Value;
