//! Change requests and the diff-based commit protocol.
//!
//! A request stages one create, update or delete for a single atom. Commit
//! writes the primary row and only the index rows whose value changed, then
//! records the new authoritative value in the transaction's repository.

pub mod tx;

use crate::atom::{Atom, IndexField};
use crate::codec::encode;
use crate::error::AtomError;
use crate::query::expr::index_table_name;
use crate::repository::ObjectRepository;
use crate::storage::{quote_ident, schema};
use rusqlite::{Connection, ToSql, params};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeRequestType {
    Creation,
    Update,
    Deletion,
    /// Terminal: the request has been committed.
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdatedObject<E> {
    Inserted(E),
    Updated(E),
    /// The update changed nothing; no rows were written.
    Identity(E),
    Deleted(i64),
}

/// What a commit needs from the enclosing transaction.
pub struct PersistenceToolbox<'t> {
    pub(crate) conn: &'t Connection,
    pub(crate) repository: &'t mut ObjectRepository,
    /// Index tables known to exist, per primary table.
    pub(crate) present: &'t mut HashMap<&'static str, Vec<String>>,
    pub(crate) timestamp: i64,
    pub(crate) wrote: bool,
}

impl PersistenceToolbox<'_> {
    pub(crate) fn present_indexes<E: Atom>(&mut self) -> Result<Vec<IndexField<E>>, AtomError> {
        if let Some(names) = self.present.get(E::TABLE) {
            return Ok(E::indexes()
                .into_iter()
                .filter(|index| names.iter().any(|n| n == index.name()))
                .collect());
        }
        let present = schema::present_indexes::<E>(self.conn)?;
        self.present.insert(
            E::TABLE,
            present.iter().map(|index| index.name().to_string()).collect(),
        );
        Ok(present)
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

pub struct ChangeRequest<E: Atom> {
    kind: ChangeRequestType,
    original: Option<E>,
    value: E,
}

impl<E: Atom> ChangeRequest<E> {
    pub fn creation(value: E) -> Self {
        Self {
            kind: ChangeRequestType::Creation,
            original: None,
            value,
        }
    }

    pub(crate) fn update(original: E, mut value: E) -> Self {
        *value.meta_mut() = *original.meta();
        Self {
            kind: ChangeRequestType::Update,
            original: Some(original),
            value,
        }
    }

    pub(crate) fn deletion(original: E) -> Self {
        Self {
            kind: ChangeRequestType::Deletion,
            value: original.clone(),
            original: Some(original),
        }
    }

    pub fn kind(&self) -> ChangeRequestType {
        self.kind
    }

    /// The authoritative value this request was staged against.
    pub fn original(&self) -> Option<&E> {
        self.original.as_ref()
    }

    pub fn rowid(&self) -> i64 {
        self.value.rowid()
    }

    /// Turns a pending update into a deletion of the same row.
    pub fn delete(&mut self) {
        if self.kind == ChangeRequestType::Update {
            self.kind = ChangeRequestType::Deletion;
        }
    }

    pub fn commit(&mut self, toolbox: &mut PersistenceToolbox<'_>) -> Result<UpdatedObject<E>, AtomError> {
        let outcome = match self.kind {
            ChangeRequestType::None => {
                return Err(AtomError::AlreadyCommitted {
                    table: E::TABLE.to_string(),
                });
            }
            ChangeRequestType::Creation => {
                let inserted = insert(toolbox, &self.value)?;
                self.value = inserted.clone();
                UpdatedObject::Inserted(inserted)
            }
            ChangeRequestType::Update => {
                let Some(original) = &self.original else {
                    return Err(AtomError::NotFound {
                        table: E::TABLE.to_string(),
                        rowid: self.value.rowid(),
                    });
                };
                if *original == self.value {
                    UpdatedObject::Identity(original.clone())
                } else {
                    let updated = update(toolbox, original, &self.value)?;
                    self.value = updated.clone();
                    UpdatedObject::Updated(updated)
                }
            }
            ChangeRequestType::Deletion => {
                let original = self.original.as_ref().unwrap_or(&self.value);
                UpdatedObject::Deleted(delete(toolbox, original)?)
            }
        };
        self.kind = ChangeRequestType::None;
        Ok(outcome)
    }
}

impl<E: Atom> Deref for ChangeRequest<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.value
    }
}

impl<E: Atom> DerefMut for ChangeRequest<E> {
    fn deref_mut(&mut self) -> &mut E {
        &mut self.value
    }
}

impl<E: Atom + std::fmt::Debug> std::fmt::Debug for ChangeRequest<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeRequest")
            .field("kind", &self.kind)
            .field("rowid", &self.value.rowid())
            .field("value", &self.value)
            .finish()
    }
}

fn pk_columns(len: usize) -> Vec<String> {
    (0..len).map(|i| quote_ident(&format!("__pk{i}"))).collect()
}

fn insert<E: Atom>(toolbox: &mut PersistenceToolbox<'_>, value: &E) -> Result<E, AtomError> {
    let primary_key = value.primary_key();
    let blob = encode(value)?;
    let mut columns = pk_columns(primary_key.len());
    columns.push("p".to_string());
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(E::TABLE),
        columns.join(", "),
        placeholders.join(", ")
    );
    let mut binds: Vec<&dyn ToSql> = primary_key.iter().map(|v| v as &dyn ToSql).collect();
    binds.push(&blob);
    toolbox
        .conn
        .prepare_cached(&sql)?
        .execute(binds.as_slice())
        .map_err(|e| AtomError::from_write(e, E::TABLE))?;
    let rowid = toolbox.conn.last_insert_rowid();

    for index in toolbox.present_indexes::<E>()? {
        write_index_row(toolbox.conn, &index, rowid, value, false)?;
    }

    let mut stored = value.clone();
    let meta = stored.meta_mut();
    meta.rowid = rowid;
    meta.changes_timestamp = toolbox.timestamp;
    toolbox.repository.record_updated(stored.clone());
    toolbox.wrote = true;
    Ok(stored)
}

fn update<E: Atom>(toolbox: &mut PersistenceToolbox<'_>, original: &E, value: &E) -> Result<E, AtomError> {
    let rowid = original.rowid();
    let primary_key = value.primary_key();
    let blob = encode(value)?;
    let mut assignments: Vec<String> = pk_columns(primary_key.len())
        .into_iter()
        .enumerate()
        .map(|(i, column)| format!("{column} = ?{}", i + 1))
        .collect();
    assignments.push(format!("p = ?{}", primary_key.len() + 1));
    let sql = format!(
        "UPDATE {} SET {} WHERE rowid = ?{}",
        quote_ident(E::TABLE),
        assignments.join(", "),
        primary_key.len() + 2
    );
    let mut binds: Vec<&dyn ToSql> = primary_key.iter().map(|v| v as &dyn ToSql).collect();
    binds.push(&blob);
    binds.push(&rowid);
    let changed = toolbox
        .conn
        .prepare_cached(&sql)?
        .execute(binds.as_slice())
        .map_err(|e| AtomError::from_write(e, E::TABLE))?;
    if changed == 0 {
        return Err(AtomError::NotFound {
            table: E::TABLE.to_string(),
            rowid,
        });
    }

    for index in toolbox.present_indexes::<E>()? {
        if index.value_of(original) != index.value_of(value) {
            write_index_row(toolbox.conn, &index, rowid, value, true)?;
        }
    }

    let mut stored = value.clone();
    let meta = stored.meta_mut();
    meta.rowid = rowid;
    meta.changes_timestamp = toolbox.timestamp;
    toolbox.repository.record_updated(stored.clone());
    toolbox.wrote = true;
    Ok(stored)
}

fn write_index_row<E: Atom>(
    conn: &Connection,
    index: &IndexField<E>,
    rowid: i64,
    value: &E,
    replace: bool,
) -> Result<(), AtomError> {
    let index_table = index_table_name(E::TABLE, index.name());
    let column = quote_ident(index.name());
    let mut sql = format!(
        "INSERT INTO {} (rowid, {column}) VALUES (?1, ?2)",
        quote_ident(&index_table)
    );
    if replace {
        sql.push_str(&format!(
            " ON CONFLICT(rowid) DO UPDATE SET {column} = excluded.{column}"
        ));
    }
    conn.prepare_cached(&sql)?
        .execute(params![rowid, index.value_of(value)])
        .map_err(|e| AtomError::from_write(e, &index_table))?;
    Ok(())
}

fn delete<E: Atom>(toolbox: &mut PersistenceToolbox<'_>, original: &E) -> Result<i64, AtomError> {
    let rowid = original.rowid();
    toolbox
        .conn
        .prepare_cached(&format!("DELETE FROM {} WHERE rowid = ?1", quote_ident(E::TABLE)))?
        .execute([rowid])?;
    for index in E::indexes() {
        let index_table = index_table_name(E::TABLE, index.name());
        let deleted = toolbox
            .conn
            .prepare_cached(&format!("DELETE FROM {} WHERE rowid = ?1", quote_ident(&index_table)))
            .and_then(|mut stmt| stmt.execute([rowid]));
        if let Err(err) = deleted {
            debug!(table = %index_table, rowid, error = %err, "index row not deleted");
        }
    }
    toolbox
        .repository
        .record_deleted::<E>(rowid, &original.primary_key());
    toolbox.wrote = true;
    Ok(rowid)
}
