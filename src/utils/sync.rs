//! Basic synchronization primitives.
//!
//! A unified interface over the locking primitives that works across
//! both single-threaded and multi-threaded configurations. Low-level
//! modules can depend on this without caring which configuration is
//! active.
#[cfg(not(feature = "multithreading"))]
pub mod compat {
    use std::sync::{self, RwLockReadGuard, RwLockWriteGuard};
    #[derive(Debug, Default)]
    pub struct RwLock<T>(sync::RwLock<T>);
    impl<T> RwLock<T> {
        pub fn new(t: T) -> Self {
            Self(sync::RwLock::new(t))
        }
        pub fn read(&self) -> RwLockReadGuard<'_, T> {
            self.0.read().unwrap()
        }
        pub fn write(&self) -> RwLockWriteGuard<'_, T> {
            self.0.write().unwrap()
        }
    }
}

pub use std::sync::Arc;

#[cfg(feature = "multithreading")]
pub use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

#[cfg(not(feature = "multithreading"))]
pub use compat::*;
#[cfg(not(feature = "multithreading"))]
pub use std::sync::{RwLockReadGuard, RwLockWriteGuard};
