//! Projections into sum-typed (enum) fields.
//!
//! A sum-typed field `equipped` contributes two kinds of index: the
//! discriminant `equipped__type` and one per narrowed variant field, e.g.
//! `equipped__Orb__name`. Narrowed projections are unknown for atoms holding
//! a different variant or no value at all.

use crate::atom::types::DslValue;
use crate::query::expr::Field;
use std::marker::PhantomData;
use std::sync::Arc;

pub trait SumType: Send + Sync + 'static {
    type Tag: DslValue;

    fn tag(&self) -> Self::Tag;
}

pub trait Variant<U: SumType>: Sized + 'static {
    const NAME: &'static str;

    fn narrow(sum: &U) -> Option<&Self>;
}

type UnionGetter<E, U> = Arc<dyn for<'a> Fn(&'a E) -> Option<&'a U> + Send + Sync>;

pub struct UnionField<E, U> {
    name: Arc<str>,
    getter: UnionGetter<E, U>,
}

impl<E, U> Clone for UnionField<E, U> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            getter: self.getter.clone(),
        }
    }
}

impl<E: 'static, U: SumType> UnionField<E, U> {
    pub fn new<F>(name: &str, get: F) -> Self
    where
        F: for<'a> Fn(&'a E) -> Option<&'a U> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            getter: Arc::new(get),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The discriminant, indexed as `<field>__type`.
    pub fn tag(&self) -> Field<E, U::Tag> {
        let getter = self.getter.clone();
        Field::from_getter(
            &format!("{}__type", self.name),
            Arc::new(move |atom: &E| getter(atom).map(|sum| sum.tag().into_value())),
        )
    }

    pub fn narrow<V: Variant<U>>(&self) -> Narrowed<E, U, V> {
        Narrowed {
            union: self.clone(),
            _variant: PhantomData,
        }
    }
}

/// A union field seen as one of its variants.
pub struct Narrowed<E, U, V> {
    union: UnionField<E, U>,
    _variant: PhantomData<fn() -> V>,
}

impl<E: 'static, U: SumType, V: Variant<U>> Narrowed<E, U, V> {
    fn path(&self, field: &str) -> String {
        format!("{}__{}__{}", self.union.name, V::NAME, field)
    }

    pub fn field<T, F>(&self, name: &str, get: F) -> Field<E, T>
    where
        T: DslValue,
        F: Fn(&V) -> T + Send + Sync + 'static,
    {
        let getter = self.union.getter.clone();
        Field::from_getter(
            &self.path(name),
            Arc::new(move |atom: &E| {
                getter(atom)
                    .and_then(V::narrow)
                    .map(|variant| get(variant).into_value())
            }),
        )
    }

    pub fn optional_field<T, F>(&self, name: &str, get: F) -> Field<E, T>
    where
        T: DslValue,
        F: Fn(&V) -> Option<T> + Send + Sync + 'static,
    {
        let getter = self.union.getter.clone();
        Field::from_getter(
            &self.path(name),
            Arc::new(move |atom: &E| {
                getter(atom)
                    .and_then(V::narrow)
                    .and_then(|variant| get(variant))
                    .map(DslValue::into_value)
            }),
        )
    }
}
