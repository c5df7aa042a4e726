//! Operator Forwarding
//!
//! Operators on properties forward to the payload. Read-only operators go
//! through [`Property::get`] or [`Property::with`], so they register a
//! dependency like any other read. Mutating operators go through
//! [`Property::apply`] or a [`WriteGuard`], so dependents are always
//! notified.

use std::cell::RefMut;
use std::cmp::Ordering;
use std::ops::{
    Add, AddAssign, BitAnd, BitAndAssign, BitOr, BitOrAssign, BitXor, BitXorAssign, Deref,
    DerefMut, Div, DivAssign, Index, Mul, MulAssign, Neg, Not, Rem, RemAssign, Shl, ShlAssign,
    Shr, ShrAssign, Sub, SubAssign,
};

use super::property::Property;
use super::runtime;
use crate::graph::NodeId;

macro_rules! binary_op {
    ($Trait:ident, $method:ident) => {
        impl<'a, T> $Trait<&'a Property<T>> for &'a Property<T>
        where
            T: $Trait<Output = T> + Clone + 'static,
        {
            type Output = T;

            fn $method(self, rhs: &'a Property<T>) -> T {
                self.get().$method(rhs.get())
            }
        }

        impl<'a, T> $Trait<T> for &'a Property<T>
        where
            T: $Trait<Output = T> + Clone + 'static,
        {
            type Output = T;

            fn $method(self, rhs: T) -> T {
                self.get().$method(rhs)
            }
        }
    };
}

binary_op!(Add, add);
binary_op!(Sub, sub);
binary_op!(Mul, mul);
binary_op!(Div, div);
binary_op!(Rem, rem);
binary_op!(BitAnd, bitand);
binary_op!(BitOr, bitor);
binary_op!(BitXor, bitxor);
binary_op!(Shl, shl);
binary_op!(Shr, shr);

macro_rules! assign_op {
    ($Trait:ident, $method:ident) => {
        impl<T> $Trait<T> for Property<T>
        where
            T: $Trait + 'static,
        {
            fn $method(&mut self, rhs: T) {
                self.apply(|value| value.$method(rhs));
            }
        }
    };
}

assign_op!(AddAssign, add_assign);
assign_op!(SubAssign, sub_assign);
assign_op!(MulAssign, mul_assign);
assign_op!(DivAssign, div_assign);
assign_op!(RemAssign, rem_assign);
assign_op!(BitAndAssign, bitand_assign);
assign_op!(BitOrAssign, bitor_assign);
assign_op!(BitXorAssign, bitxor_assign);
assign_op!(ShlAssign, shl_assign);
assign_op!(ShrAssign, shr_assign);

impl<T> Neg for &Property<T>
where
    T: Neg<Output = T> + Clone + 'static,
{
    type Output = T;

    fn neg(self) -> T {
        -self.get()
    }
}

impl<T> Not for &Property<T>
where
    T: Not<Output = T> + Clone + 'static,
{
    type Output = T;

    fn not(self) -> T {
        !self.get()
    }
}

impl<T: PartialEq + 'static> PartialEq<T> for Property<T> {
    fn eq(&self, other: &T) -> bool {
        self.with(|value| value == other)
    }
}

impl<T: PartialOrd + 'static> PartialOrd<T> for Property<T> {
    fn partial_cmp(&self, other: &T) -> Option<Ordering> {
        self.with(|value| value.partial_cmp(other))
    }
}

impl<T: 'static> Property<T> {
    /// Subscript read: `payload[index]`, cloned out.
    pub fn at<I>(&self, index: I) -> <T as Index<I>>::Output
    where
        T: Index<I>,
        <T as Index<I>>::Output: Clone + Sized,
    {
        self.with(|value| value[index].clone())
    }

    /// Call a callable payload. Payloads taking several arguments receive
    /// them as one tuple.
    pub fn invoke<A, R>(&self, args: A) -> R
    where
        T: Fn(A) -> R,
    {
        self.with(|callable| callable(args))
    }

    /// Borrow the value mutably. Dependents are notified when the guard is
    /// dropped.
    pub fn borrow_mut(&self) -> WriteGuard<'_, T> {
        WriteGuard {
            value: Some(self.value_cell().borrow_mut()),
            node: self.id(),
        }
    }
}

/// Mutable access to a property's value that notifies on drop.
pub struct WriteGuard<'a, T> {
    value: Option<RefMut<'a, T>>,
    node: NodeId,
}

impl<T> Deref for WriteGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value.as_deref().expect("write guard holds the value until dropped")
    }
}

impl<T> DerefMut for WriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        self.value
            .as_deref_mut()
            .expect("write guard holds the value until dropped")
    }
}

impl<T> Drop for WriteGuard<'_, T> {
    fn drop(&mut self) {
        // Release the borrow before dependents read the value.
        self.value.take();
        runtime::write_notify(self.node);
    }
}
