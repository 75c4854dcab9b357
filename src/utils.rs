//!
//! # Shared Pointer & Error-Helper Utilities
//!

// Std-lib
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, RwLock};

// Crates.io
use by_address::ByAddress;

///
/// # Ptr
///
/// Internal type-alias for layout and netlist handles.
/// All are thread-safe and reference-counted "smart pointers".
///
/// Attribute access is largely forwarded through [Deref] calls,
/// allowing for fairly natural syntax after grabbing `read()` or `write()` access:
///
/// ```text
/// let layout = ptr.read()?;
/// let name = layout.cell_name(key);
/// ```
///
/// [Ptr] uses the [ByAddress] struct to allow for comparisons and hashes
/// *by address* (i.e. pointer value). Layout-handles in particular serve as
/// identity tokens when deciding whether two traversals refer to the same
/// source data.
///
#[derive(Debug, Default)]
pub struct Ptr<T: ?Sized>(ByAddress<Arc<RwLock<T>>>);

impl<T> Ptr<T> {
    /// Pointer Constructor
    pub fn new(i: T) -> Self {
        Self(ByAddress(Arc::new(RwLock::new(i))))
    }
    /// Get an opaque identity token for the pointed-to allocation.
    /// Equal tokens imply the same underlying data; the token also
    /// provides the total order required for map keys and comparators.
    pub fn addr(&self) -> usize {
        Arc::as_ptr(&self.0 .0) as *const () as usize
    }
}
impl<T> From<T> for Ptr<T> {
    fn from(t: T) -> Self {
        Self::new(t)
    }
}
impl<T> Deref for Ptr<T> {
    type Target = ByAddress<Arc<RwLock<T>>>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
impl<T> DerefMut for Ptr<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}
// Having a [Deref] implementation seems to screw with the auto-`derive`d implementations
// of a few key traits. Conveniently, they're all quite short.
impl<T> Clone for Ptr<T> {
    fn clone(&self) -> Self {
        Self(ByAddress::clone(&self.0))
    }
}
impl<T> PartialEq for Ptr<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0.eq(&other.0)
    }
}
impl<T> Eq for Ptr<T> {}
impl<T> Hash for Ptr<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

///
/// # ErrorHelper
///
/// Helper trait for re-use among the stateful tree-walkers (hierarchy
/// builder, device extractor). Each implementer generally has some internal
/// state to report upon failure, which it injects in the
/// implementation-required `err` method. The remaining methods, provided by
/// default, route [Option]s and boolean assertions through `err`.
///
pub trait ErrorHelper {
    type Error;

    /// Create and return a [Self::Error] value.
    fn err(&self, msg: impl Into<String>) -> Self::Error;
    /// Return failure
    fn fail<T>(&self, msg: impl Into<String>) -> Result<T, Self::Error> {
        Err(self.err(msg))
    }
    /// Unwrap the [Option] `opt` if it is [Some], and return our error if not.
    fn unwrap<T>(&self, opt: Option<T>, msg: impl Into<String>) -> Result<T, Self::Error> {
        match opt {
            Some(val) => Ok(val),
            None => self.fail(msg),
        }
    }
    /// Assert a boolean condition. Returns through `self.fail` if it is not satisfied.
    fn assert(&self, b: bool, msg: impl Into<String>) -> Result<(), Self::Error> {
        match b {
            true => Ok(()),
            false => self.fail(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ptr() {
        let p1 = Ptr::new(43);
        let p2 = Ptr::new(43);
        assert_ne!(p1, p2);
        assert_ne!(p1.addr(), p2.addr());

        let p3 = p1.clone();
        assert_ne!(p3, p2);
        assert_eq!(p3, p1);
        assert_eq!(p3.addr(), p1.addr());
    }
}
