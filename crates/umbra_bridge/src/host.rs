//! Host-native faults.

use std::error::Error;
use std::fmt;
use umbra_core::Termination;

/// Boxed host error
pub type BoxedHostError = Box<dyn Error + Send + Sync + 'static>;

/// A fault produced by the host runtime or by the sandbox's own machinery
///
/// Any host error type can be carried. The boxed value is moved, never
/// cloned, so the value handed back at the boundary is the very allocation
/// that was raised. A host fault never encloses another host fault: nested
/// layers are flattened on construction.
pub struct HostFault {
    inner: BoxedHostError,
}

impl HostFault {
    /// Create a host fault from any error value
    #[must_use]
    pub fn new<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        Self::from_boxed(Box::new(error))
    }

    /// Create a host fault from an already boxed error
    #[must_use]
    pub fn from_boxed(inner: BoxedHostError) -> Self {
        match inner.downcast::<HostFault>() {
            Ok(layer) => *layer,
            Err(inner) => Self { inner },
        }
    }

    /// Check whether the underlying error is of type `E`
    #[must_use]
    pub fn is<E: Error + 'static>(&self) -> bool {
        self.inner.is::<E>()
    }

    /// Borrow the underlying error as `E`
    #[must_use]
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.inner.downcast_ref::<E>()
    }

    /// The termination reason, if this fault came from the sandbox machinery
    #[must_use]
    pub fn termination(&self) -> Option<&Termination> {
        self.downcast_ref::<Termination>()
    }

    /// Borrow the underlying error
    #[must_use]
    pub fn as_error(&self) -> &(dyn Error + Send + Sync + 'static) {
        self.inner.as_ref()
    }

    /// Take back the underlying error
    #[must_use]
    pub fn into_inner(self) -> BoxedHostError {
        self.inner
    }
}

impl From<Termination> for HostFault {
    fn from(termination: Termination) -> Self {
        Self::new(termination)
    }
}

impl fmt::Debug for HostFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostFault").field(&self.inner).finish()
    }
}

impl fmt::Display for HostFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}

impl Error for HostFault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.inner.source()
    }
}
