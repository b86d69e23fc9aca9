pub mod types;

use crate::query::expr::{Field, FieldRef};
use serde::Serialize;
use serde::de::DeserializeOwned;
use types::{DslValue, Value, ValueType};

/// Engine-assigned bookkeeping carried by every atom.
///
/// Never serialized and never part of an atom's logical identity: any two
/// `AtomMeta` values compare equal.
#[derive(Debug, Clone, Copy)]
pub struct AtomMeta {
    /// Storage row id, `-1` until the atom has been persisted.
    pub rowid: i64,
    /// Logical clock of the transaction that last produced this value.
    pub changes_timestamp: i64,
}

impl Default for AtomMeta {
    fn default() -> Self {
        Self {
            rowid: -1,
            changes_timestamp: 0,
        }
    }
}

impl PartialEq for AtomMeta {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for AtomMeta {}

/// A persisted entity type.
///
/// Implementations are usually generated: they name the primary table, list
/// the secondary indexes and expose the logical primary key. The commit
/// protocol and the planner are driven entirely by this trait.
pub trait Atom: Clone + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static {
    const TABLE: &'static str;

    fn indexes() -> Vec<IndexField<Self>>;

    /// Column affinities of `__pk0..`, in key order.
    fn primary_key_columns() -> &'static [ValueType];

    fn primary_key(&self) -> Vec<Value>;

    fn meta(&self) -> &AtomMeta;

    fn meta_mut(&mut self) -> &mut AtomMeta;

    fn rowid(&self) -> i64 {
        self.meta().rowid
    }

    fn changes_timestamp(&self) -> i64 {
        self.meta().changes_timestamp
    }
}

/// A secondary index backed by the table `<TABLE>__<name>`.
pub struct IndexField<E> {
    pub(crate) field: FieldRef<E>,
    pub(crate) unique: bool,
}

impl<E> IndexField<E> {
    pub fn new<T: DslValue>(field: Field<E, T>) -> Self {
        Self {
            field: field.into_ref(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.field.name
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub(crate) fn value_of(&self, atom: &E) -> Option<Value> {
        self.field.get(atom)
    }
}

impl<E> Clone for IndexField<E> {
    fn clone(&self) -> Self {
        Self {
            field: self.field.clone(),
            unique: self.unique,
        }
    }
}

impl<E> std::fmt::Debug for IndexField<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexField")
            .field("name", &self.field.name)
            .field("unique", &self.unique)
            .finish()
    }
}

/// How a single atom is addressed: by storage row id or by logical key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKey {
    RowId(i64),
    PrimaryKey(Vec<Value>),
}

impl ObjectKey {
    /// Row id when the atom is persisted, logical key otherwise.
    pub fn of<E: Atom>(atom: &E) -> Self {
        if atom.rowid() >= 0 {
            ObjectKey::RowId(atom.rowid())
        } else {
            ObjectKey::PrimaryKey(atom.primary_key())
        }
    }
}
