//! Transaction-scoped cache of the authoritative in-flight value per row.
//!
//! A transaction never observes two different values for one row id: the
//! first value seen (fetched or written) wins until the transaction itself
//! writes a newer one.

use crate::atom::Atom;
use crate::atom::types::Value;
use std::any::{Any, TypeId};
use std::collections::HashMap;

enum Slot<E> {
    Fetched(E),
    Updated(E),
    Deleted,
}

struct AtomTable<E> {
    rows: HashMap<i64, Slot<E>>,
    primary_keys: HashMap<Vec<Value>, i64>,
}

impl<E> Default for AtomTable<E> {
    fn default() -> Self {
        Self {
            rows: HashMap::new(),
            primary_keys: HashMap::new(),
        }
    }
}

/// What the repository knows about one row.
#[derive(Debug, PartialEq)]
pub enum Cached<'a, E> {
    Present(&'a E),
    Deleted,
}

#[derive(Default)]
pub struct ObjectRepository {
    tables: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl ObjectRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn table<E: Atom>(&self) -> Option<&AtomTable<E>> {
        self.tables
            .get(&TypeId::of::<E>())
            .and_then(|table| table.downcast_ref())
    }

    fn table_mut<E: Atom>(&mut self) -> &mut AtomTable<E> {
        let table = self
            .tables
            .entry(TypeId::of::<E>())
            .or_insert_with(|| Box::new(AtomTable::<E>::default()));
        match table.downcast_mut() {
            Some(table) => table,
            // Entries are keyed by the type they hold.
            None => unreachable!("repository table stored under a foreign TypeId"),
        }
    }

    pub fn get<E: Atom>(&self, rowid: i64) -> Option<Cached<'_, E>> {
        match self.table::<E>()?.rows.get(&rowid)? {
            Slot::Fetched(atom) | Slot::Updated(atom) => Some(Cached::Present(atom)),
            Slot::Deleted => Some(Cached::Deleted),
        }
    }

    pub fn rowid_for<E: Atom>(&self, primary_key: &[Value]) -> Option<i64> {
        self.table::<E>()?.primary_keys.get(primary_key).copied()
    }

    /// Registers a value read from storage and returns the authoritative one:
    /// an earlier fetched or updated value for the same row wins.
    pub fn register_fetched<E: Atom>(&mut self, atom: E) -> Option<E> {
        let rowid = atom.rowid();
        let table = self.table_mut::<E>();
        match table.rows.get(&rowid) {
            Some(Slot::Fetched(existing)) | Some(Slot::Updated(existing)) => {
                Some(existing.clone())
            }
            Some(Slot::Deleted) => None,
            None => {
                table.primary_keys.insert(atom.primary_key(), rowid);
                table.rows.insert(rowid, Slot::Fetched(atom.clone()));
                Some(atom)
            }
        }
    }

    pub fn record_updated<E: Atom>(&mut self, atom: E) {
        let rowid = atom.rowid();
        let table = self.table_mut::<E>();
        if let Some(Slot::Fetched(old) | Slot::Updated(old)) = table.rows.get(&rowid) {
            let old_key = old.primary_key();
            if table.primary_keys.get(&old_key) == Some(&rowid) {
                table.primary_keys.remove(&old_key);
            }
        }
        table.primary_keys.insert(atom.primary_key(), rowid);
        table.rows.insert(rowid, Slot::Updated(atom));
    }

    pub fn record_deleted<E: Atom>(&mut self, rowid: i64, primary_key: &[Value]) {
        let table = self.table_mut::<E>();
        if table.primary_keys.get(primary_key) == Some(&rowid) {
            table.primary_keys.remove(primary_key);
        }
        table.rows.insert(rowid, Slot::Deleted);
    }

    /// Number of rows tracked for `E`, deleted ones included.
    pub fn len<E: Atom>(&self) -> usize {
        self.table::<E>().map(|t| t.rows.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
