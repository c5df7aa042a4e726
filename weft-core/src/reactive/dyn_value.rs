//! Polymorphic payloads.
//!
//! [`DynValue`] wraps a value of any type. Whether it can be copied is
//! decided when it is wrapped, so copying an unclonable payload is a
//! reported error rather than a compile-time bound.

use std::any::{type_name, Any};
use std::fmt;

use super::property::Property;
use crate::error::{ReactiveError, Result};

type CloneFn = fn(&dyn Any) -> Box<dyn Any>;

fn clone_boxed<T: Any + Clone>(value: &dyn Any) -> Box<dyn Any> {
    let value = value
        .downcast_ref::<T>()
        .expect("clone function matches the payload type");
    Box::new(value.clone())
}

/// A dynamically typed payload.
pub struct DynValue {
    value: Box<dyn Any>,
    type_name: &'static str,
    clone_fn: Option<CloneFn>,
}

impl DynValue {
    /// Wrap a clonable value.
    pub fn new<T: Any + Clone>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
            clone_fn: Some(clone_boxed::<T>),
        }
    }

    /// Wrap a value that cannot be copied.
    pub fn new_unclonable<T: Any>(value: T) -> Self {
        Self {
            value: Box::new(value),
            type_name: type_name::<T>(),
            clone_fn: None,
        }
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut()
    }

    pub fn is<T: Any>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Name of the payload type.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is_clonable(&self) -> bool {
        self.clone_fn.is_some()
    }

    /// Copy the payload.
    pub fn try_clone(&self) -> Result<Self> {
        let clone_fn = self.clone_fn.ok_or(ReactiveError::NotClonable {
            wrapper: type_name::<Self>(),
            payload: self.type_name,
        })?;
        Ok(Self {
            value: clone_fn(self.value.as_ref()),
            type_name: self.type_name,
            clone_fn: self.clone_fn,
        })
    }
}

impl fmt::Debug for DynValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DynValue<{}>", self.type_name)
    }
}

impl Property<DynValue> {
    /// A new, unbound property holding a copy of the current payload.
    ///
    /// Fails with [`ReactiveError::NotClonable`] if the payload was wrapped
    /// with [`DynValue::new_unclonable`].
    pub fn try_copied(&self) -> Result<Self> {
        let copy = self.value_cell().borrow().try_clone()?;
        Ok(Property::opaque(copy))
    }
}
