//! Mutable dispatch sites.
//!
//! A call site is a named dispatch point with a fixed shape and a
//! swappable target. Callers invoke through the site; relinking swaps
//! the target atomically under the site's lock, and the new target takes
//! effect for subsequent invocations. The target's shape must equal the
//! site's shape exactly; adaptation happens before linking, not at the
//! site.

use std::sync::Arc;

use crate::error::AdaptError;
use crate::handle::{HandleOps, MethodHandle};
use crate::signature::Signature;
use crate::utils::sync::RwLock;
use crate::value::Value;

pub struct CallSite {
    name: String,
    shape: Arc<Signature>,
    target: RwLock<Option<Arc<MethodHandle>>>,
}

impl CallSite {
    /// An unlinked site; invoking it fails until a target is set.
    pub fn new(name: impl Into<String>, shape: Arc<Signature>) -> CallSite {
        CallSite {
            name: name.into(),
            shape,
            target: RwLock::new(None),
        }
    }

    /// A site linked to its initial target in one step.
    pub fn bootstrap(
        name: impl Into<String>,
        shape: Arc<Signature>,
        target: Arc<MethodHandle>,
    ) -> Result<CallSite, AdaptError> {
        let site = CallSite::new(name, shape);
        site.set_target(target)?;
        Ok(site)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Arc<Signature> {
        &self.shape
    }

    /// Relink the site. The target's shape must equal the site's shape
    /// exactly.
    pub fn set_target(&self, target: Arc<MethodHandle>) -> Result<(), AdaptError> {
        if !Arc::ptr_eq(target.shape(), &self.shape) {
            return Err(AdaptError::shape_incompatible(
                &self.shape,
                target.shape(),
                None,
            ));
        }
        *self.target.write() = Some(target);
        Ok(())
    }

    pub fn get_target(&self) -> Option<Arc<MethodHandle>> {
        self.target.read().clone()
    }

    /// Invoke the current target.
    pub fn invoke(&self, args: &[Value]) -> Result<Value, AdaptError> {
        let target = self
            .get_target()
            .ok_or_else(|| AdaptError::UnboundCallSite(self.name.clone()))?;
        target.invoke(args)
    }
}
