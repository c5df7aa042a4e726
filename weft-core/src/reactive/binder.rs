//! Function Binder
//!
//! The binder adapts a plain closure plus a tuple of explicit dependencies
//! into the canonical updater stored by a cell.
//!
//! # How Binding Works
//!
//! 1. Every dependency in the tuple contributes one explicit relation, in
//!    tuple order. Positions matter: the relation at index `i` feeds the
//!    closure's `i`-th argument.
//!
//! 2. The annotated type of each closure parameter decides how the argument
//!    is fetched and whether the relation is required:
//!
//!    | parameter            | argument             | edge     |
//!    |----------------------|----------------------|----------|
//!    | `A`                  | cloned payload       | required |
//!    | `Option<A>`          | cloned payload       | optional |
//!    | `Property<A>`        | the cell             | required |
//!    | `Option<Property<A>>`| the cell             | optional |
//!
//! 3. On every update the adapted closure fetches its arguments from the
//!    current explicit relations. A required argument that can no longer be
//!    fetched turns the update into [`UpdateResult::Unbind`].
//!
//! Count or type mismatches between the tuple and the closure are rejected
//! at compile time: no binder trait is implemented for the pair.
//!
//! # Example
//!
//! ```rust,ignore
//! let width = Property::new(3);
//! let height = Property::new(4);
//!
//! // Generator: returns the new value
//! let area = Property::bound((&width, &height), |w: i32, h: i32| w * h);
//!
//! // Updater: mutates in place and reports
//! let log = Property::with_updater(Vec::new(), (&area,), |log: &mut Vec<i32>, a: i32| {
//!     log.push(a);
//!     UpdateResult::Changed
//! });
//! ```

use std::marker::PhantomData;

use serde::Serialize;
use smallvec::smallvec;

use super::property::Property;
use super::runtime;
use crate::graph::{NodeId, Relation, Relations};

/// What an updater reports back to its cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UpdateResult {
    /// Nothing changed; dependents are not notified.
    Unchanged,

    /// The value changed; dependents are notified.
    Changed,

    /// Drop the updater and keep the last value.
    Unbind,
}

/// Generator form: computes a fresh value from the explicit relations.
///
/// `None` means a required argument was missing.
pub type Generate<T> = Box<dyn FnMut(&[Relation]) -> Option<T>>;

/// Updater form: mutates the value in place.
pub type Apply<T> = Box<dyn FnMut(&mut T, &[Relation]) -> UpdateResult>;

/// Reaction form: runs for its side effects.
pub type React = Box<dyn FnMut(&[Relation]) -> UpdateResult>;

/// An adapted updater together with the explicit relations it reads.
pub struct Binding<U> {
    pub(crate) updater: U,
    pub(crate) dependencies: Relations,
}

impl<U> Binding<U> {
    /// The explicit relations, in argument order.
    pub fn dependencies(&self) -> &[Relation] {
        &self.dependencies
    }
}

/// Something that can be named as an explicit dependency.
pub trait Dependency {
    /// Payload type of the dependency cell.
    type Payload: 'static;

    fn property(&self) -> &Property<Self::Payload>;

    fn dependency_id(&self) -> NodeId {
        self.property().id()
    }
}

impl<A: 'static> Dependency for &Property<A> {
    type Payload = A;

    fn property(&self) -> &Property<A> {
        self
    }
}

/// How a closure argument is produced from an explicit relation to a cell
/// holding `A`.
pub trait FromDependency<A>: Sized {
    /// Whether losing the dependency unbinds the holder.
    const REQUIRED: bool;

    /// Produce the argument, or `None` when a required argument is missing.
    fn fetch(relation: &Relation) -> Option<Self>;

    /// Produce the argument from a live cell.
    fn from_property(property: &Property<A>) -> Self;
}

fn resolve_property<A: 'static>(relation: &Relation) -> Option<Property<A>> {
    let node = runtime::resolve(relation.target()?)?;
    Property::from_node(node)
}

impl<A: Clone + 'static> FromDependency<A> for A {
    const REQUIRED: bool = true;

    fn fetch(relation: &Relation) -> Option<Self> {
        resolve_property::<A>(relation).map(|property| property.get_untracked())
    }

    fn from_property(property: &Property<A>) -> Self {
        property.get_untracked()
    }
}

impl<A: Clone + 'static> FromDependency<A> for Option<A> {
    const REQUIRED: bool = false;

    fn fetch(relation: &Relation) -> Option<Self> {
        Some(resolve_property::<A>(relation).map(|property| property.get_untracked()))
    }

    fn from_property(property: &Property<A>) -> Self {
        Some(property.get_untracked())
    }
}

impl<A: 'static> FromDependency<A> for Property<A> {
    const REQUIRED: bool = true;

    fn fetch(relation: &Relation) -> Option<Self> {
        resolve_property(relation)
    }

    fn from_property(property: &Property<A>) -> Self {
        property.clone()
    }
}

impl<A: 'static> FromDependency<A> for Option<Property<A>> {
    const REQUIRED: bool = false;

    fn fetch(relation: &Relation) -> Option<Self> {
        Some(resolve_property(relation))
    }

    fn from_property(property: &Property<A>) -> Self {
        Some(property.clone())
    }
}

/// Result type accepted from reaction closures.
pub trait ReactionOutput {
    fn into_result(self) -> UpdateResult;
}

impl ReactionOutput for () {
    fn into_result(self) -> UpdateResult {
        UpdateResult::Unchanged
    }
}

impl ReactionOutput for UpdateResult {
    fn into_result(self) -> UpdateResult {
        self
    }
}

/// Marker for reaction closures returning `R` and taking parameters `P`.
pub struct Reacting<R, P>(PhantomData<(R, P)>);

/// Closures `FnMut(P...) -> T` over the dependency tuple `D`.
pub trait IntoGenerator<T, D, P> {
    fn into_generator(self, dependencies: D) -> Binding<Generate<T>>;

    /// Evaluate once with arguments taken from the dependency handles, then
    /// adapt. The handles are borrowed for the call, so every argument is
    /// available.
    fn into_seeded(self, dependencies: D) -> (T, Binding<Generate<T>>);
}

/// Closures `FnMut(&mut T, P...) -> UpdateResult` over the dependency tuple
/// `D`.
pub trait IntoUpdater<T, D, P> {
    fn into_updater(self, dependencies: D) -> Binding<Apply<T>>;
}

/// Closures `FnMut(P...) -> R` where `R` is `()` or [`UpdateResult`].
pub trait IntoReaction<D, M> {
    fn into_reaction(self, dependencies: D) -> Binding<React>;
}

macro_rules! impl_binder {
    ($(($D:ident, $P:ident, $dep:ident, $arg:ident, $index:tt)),*) => {
        impl<T, F, $($D, $P),*> IntoGenerator<T, ($($D,)*), ($($P,)*)> for F
        where
            T: 'static,
            F: FnMut($($P),*) -> T + 'static,
            $($D: Dependency, $P: FromDependency<<$D as Dependency>::Payload> + 'static,)*
        {
            #[allow(unused_variables)]
            fn into_generator(self, dependencies: ($($D,)*)) -> Binding<Generate<T>> {
                let ($($dep,)*) = dependencies;
                let explicit: Relations = smallvec![$(Relation::new(
                    Some($dep.dependency_id()),
                    <$P as FromDependency<<$D as Dependency>::Payload>>::REQUIRED,
                )),*];
                let mut compute = self;
                Binding {
                    updater: Box::new(move |relations: &[Relation]| {
                        $(let $arg = relations
                            .get($index)
                            .and_then(<$P as FromDependency<<$D as Dependency>::Payload>>::fetch)?;)*
                        Some(compute($($arg),*))
                    }),
                    dependencies: explicit,
                }
            }

            fn into_seeded(self, dependencies: ($($D,)*)) -> (T, Binding<Generate<T>>) {
                let mut compute = self;
                let first = {
                    let ($($dep,)*) = &dependencies;
                    compute($(<$P as FromDependency<<$D as Dependency>::Payload>>::from_property(
                        $dep.property(),
                    )),*)
                };
                let binding =
                    <F as IntoGenerator<T, ($($D,)*), ($($P,)*)>>::into_generator(compute, dependencies);
                (first, binding)
            }
        }

        impl<T, F, $($D, $P),*> IntoUpdater<T, ($($D,)*), ($($P,)*)> for F
        where
            T: 'static,
            F: FnMut(&mut T, $($P),*) -> UpdateResult + 'static,
            $($D: Dependency, $P: FromDependency<<$D as Dependency>::Payload> + 'static,)*
        {
            #[allow(unused_variables)]
            fn into_updater(self, dependencies: ($($D,)*)) -> Binding<Apply<T>> {
                let ($($dep,)*) = dependencies;
                let explicit: Relations = smallvec![$(Relation::new(
                    Some($dep.dependency_id()),
                    <$P as FromDependency<<$D as Dependency>::Payload>>::REQUIRED,
                )),*];
                let mut compute = self;
                Binding {
                    updater: Box::new(move |value: &mut T, relations: &[Relation]| {
                        $(let Some($arg) = relations
                            .get($index)
                            .and_then(<$P as FromDependency<<$D as Dependency>::Payload>>::fetch)
                        else {
                            return UpdateResult::Unbind;
                        };)*
                        compute(value, $($arg),*)
                    }),
                    dependencies: explicit,
                }
            }
        }

        impl<R, F, $($D, $P),*> IntoReaction<($($D,)*), Reacting<R, ($($P,)*)>> for F
        where
            R: ReactionOutput + 'static,
            F: FnMut($($P),*) -> R + 'static,
            $($D: Dependency, $P: FromDependency<<$D as Dependency>::Payload> + 'static,)*
        {
            #[allow(unused_variables)]
            fn into_reaction(self, dependencies: ($($D,)*)) -> Binding<React> {
                let ($($dep,)*) = dependencies;
                let explicit: Relations = smallvec![$(Relation::new(
                    Some($dep.dependency_id()),
                    <$P as FromDependency<<$D as Dependency>::Payload>>::REQUIRED,
                )),*];
                let mut compute = self;
                Binding {
                    updater: Box::new(move |relations: &[Relation]| {
                        $(let Some($arg) = relations
                            .get($index)
                            .and_then(<$P as FromDependency<<$D as Dependency>::Payload>>::fetch)
                        else {
                            return UpdateResult::Unbind;
                        };)*
                        compute($($arg),*).into_result()
                    }),
                    dependencies: explicit,
                }
            }
        }
    };
}

impl_binder!();
impl_binder!((D0, P0, d0, a0, 0));
impl_binder!((D0, P0, d0, a0, 0), (D1, P1, d1, a1, 1));
impl_binder!((D0, P0, d0, a0, 0), (D1, P1, d1, a1, 1), (D2, P2, d2, a2, 2));
impl_binder!(
    (D0, P0, d0, a0, 0),
    (D1, P1, d1, a1, 1),
    (D2, P2, d2, a2, 2),
    (D3, P3, d3, a3, 3)
);
impl_binder!(
    (D0, P0, d0, a0, 0),
    (D1, P1, d1, a1, 1),
    (D2, P2, d2, a2, 2),
    (D3, P3, d3, a3, 3),
    (D4, P4, d4, a4, 4)
);
impl_binder!(
    (D0, P0, d0, a0, 0),
    (D1, P1, d1, a1, 1),
    (D2, P2, d2, a2, 2),
    (D3, P3, d3, a3, 3),
    (D4, P4, d4, a4, 4),
    (D5, P5, d5, a5, 5)
);
impl_binder!(
    (D0, P0, d0, a0, 0),
    (D1, P1, d1, a1, 1),
    (D2, P2, d2, a2, 2),
    (D3, P3, d3, a3, 3),
    (D4, P4, d4, a4, 4),
    (D5, P5, d5, a5, 5),
    (D6, P6, d6, a6, 6)
);
impl_binder!(
    (D0, P0, d0, a0, 0),
    (D1, P1, d1, a1, 1),
    (D2, P2, d2, a2, 2),
    (D3, P3, d3, a3, 3),
    (D4, P4, d4, a4, 4),
    (D5, P5, d5, a5, 5),
    (D6, P6, d6, a6, 6),
    (D7, P7, d7, a7, 7)
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parameter_types_select_edge_kinds() {
        let a = Property::new(1);
        let b = Property::new(2);
        let c = Property::new(3);
        let d = Property::new(4);

        let binding = (|_: i32, _: Option<i32>, _: Property<i32>, _: Option<Property<i32>>| 0)
            .into_generator((&a, &b, &c, &d));
        let required: Vec<bool> = binding
            .dependencies()
            .iter()
            .map(Relation::is_required)
            .collect();
        assert_eq!(required, vec![true, false, true, false]);
        assert!(binding.dependencies()[0].points_to(a.id()));
        assert!(binding.dependencies()[3].points_to(d.id()));
    }

    #[test]
    fn generator_reads_current_payloads() {
        let a = Property::new(2);
        let b = Property::new(5);

        let mut binding = (|x: i32, y: i32| x * y).into_generator((&a, &b));
        let relations = binding.dependencies.clone();
        assert_eq!((binding.updater)(&relations), Some(10));

        a.set(3);
        assert_eq!((binding.updater)(&relations), Some(15));
    }

    #[test]
    fn seeded_generator_evaluates_from_handles() {
        let a = Property::new(3);
        let b = Property::new(4);

        let (first, mut binding) =
            (|x: i32, y: Option<Property<i32>>| x * y.map_or(1, |y| y.get_untracked()))
                .into_seeded((&a, &b));
        assert_eq!(first, 12);

        b.set(5);
        let relations = binding.dependencies.clone();
        assert_eq!((binding.updater)(&relations), Some(15));
    }

    #[test]
    fn missing_required_argument_yields_none() {
        let a = Property::new(2);
        let mut binding = (|x: i32, y: Option<i32>| x + y.unwrap_or(0)).into_generator((&a, &a));

        let nulled = [Relation::new(None, true), Relation::new(None, false)];
        assert_eq!((binding.updater)(&nulled), None);

        let lenient = [Relation::required(a.id()), Relation::new(None, false)];
        assert_eq!((binding.updater)(&lenient), Some(2));
    }

    #[test]
    fn updater_reports_unbind_for_missing_argument() {
        let a = Property::new(1);
        let mut binding = (|value: &mut i32, x: i32| {
            *value += x;
            UpdateResult::Changed
        })
        .into_updater((&a,));

        let mut value = 10;
        let relations = binding.dependencies.clone();
        assert_eq!((binding.updater)(&mut value, &relations), UpdateResult::Changed);
        assert_eq!(value, 11);

        let nulled = [Relation::new(None, true)];
        assert_eq!((binding.updater)(&mut value, &nulled), UpdateResult::Unbind);
        assert_eq!(value, 11);
    }

    #[test]
    fn reaction_outputs() {
        let mut unit = (|| ()).into_reaction(());
        assert_eq!((unit.updater)(&[]), UpdateResult::Unchanged);

        let mut reported = (|| UpdateResult::Unbind).into_reaction(());
        assert_eq!((reported.updater)(&[]), UpdateResult::Unbind);
        assert!(reported.dependencies().is_empty());
    }
}
