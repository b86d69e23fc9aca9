use crate::atom::{Atom, ObjectKey};
use crate::commit::{ChangeRequest, PersistenceToolbox, UpdatedObject};
use crate::error::AtomError;
use crate::query::executor::{FetchedResult, execute, explain};
use crate::query::plan::Query;
use crate::query::planner::ScanPlan;
use crate::repository::{Cached, ObjectRepository};
use crate::storage::schema::{self, ReindexReport};
use rusqlite::Transaction;
use std::collections::{HashMap, HashSet};
use tracing::debug;

/// The handle a transaction handler works through.
///
/// Owns the write transaction and its object repository. Every submitted
/// change request runs in its own savepoint.
pub struct TransactionContext<'conn> {
    tx: Transaction<'conn>,
    repository: ObjectRepository,
    present: HashMap<&'static str, Vec<String>>,
    published: HashSet<&'static str>,
    set_up: HashSet<&'static str>,
    timestamp: i64,
    wrote: bool,
}

impl<'conn> TransactionContext<'conn> {
    pub(crate) fn new(tx: Transaction<'conn>, published: HashSet<&'static str>, timestamp: i64) -> Self {
        Self {
            tx,
            repository: ObjectRepository::new(),
            present: HashMap::new(),
            published,
            set_up: HashSet::new(),
            timestamp,
            wrote: false,
        }
    }

    /// Logical clock value this transaction commits at.
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    fn ensure_set_up<E: Atom>(&mut self) -> Result<(), AtomError> {
        if self.published.contains(E::TABLE) || self.set_up.contains(E::TABLE) {
            return Ok(());
        }
        schema::set_up::<E>(&self.tx)?;
        self.present.remove(E::TABLE);
        self.set_up.insert(E::TABLE);
        Ok(())
    }

    pub fn submit<E: Atom>(
        &mut self,
        request: &mut ChangeRequest<E>,
    ) -> Result<UpdatedObject<E>, AtomError> {
        self.ensure_set_up::<E>()?;
        let savepoint = self.tx.savepoint()?;
        let mut toolbox = PersistenceToolbox {
            conn: &savepoint,
            repository: &mut self.repository,
            present: &mut self.present,
            timestamp: self.timestamp,
            wrote: false,
        };
        match request.commit(&mut toolbox) {
            Ok(outcome) => {
                let wrote = toolbox.wrote;
                savepoint.commit()?;
                self.wrote |= wrote;
                Ok(outcome)
            }
            Err(err) => {
                debug!(table = E::TABLE, error = %err, "change request rolled back");
                drop(savepoint);
                Err(err)
            }
        }
    }

    pub fn fetch<E: Atom>(&mut self, query: &Query<E>) -> Result<FetchedResult<E>, AtomError> {
        self.ensure_set_up::<E>()?;
        let items = execute(
            &self.tx,
            query,
            self.timestamp - 1,
            Some(&mut self.repository),
        )?;
        Ok(FetchedResult::new(items, query.clone(), self.timestamp - 1))
    }

    pub fn explain<E: Atom>(&mut self, query: &Query<E>) -> Result<Option<ScanPlan>, AtomError> {
        self.ensure_set_up::<E>()?;
        explain(&self.tx, query)
    }

    /// The authoritative value of one atom: in-flight first, then storage.
    pub fn object<E: Atom>(&mut self, key: ObjectKey) -> Result<Option<E>, AtomError> {
        self.ensure_set_up::<E>()?;
        let rowid = match &key {
            ObjectKey::RowId(rowid) => Some(*rowid),
            ObjectKey::PrimaryKey(values) => self.repository.rowid_for::<E>(values),
        };
        if let Some(rowid) = rowid {
            match self.repository.get::<E>(rowid) {
                Some(Cached::Present(atom)) => return Ok(Some(atom.clone())),
                Some(Cached::Deleted) => return Ok(None),
                None => {}
            }
        }
        let loaded = schema::load::<E>(&self.tx, &key, self.timestamp - 1)?;
        Ok(loaded.and_then(|atom| self.repository.register_fetched(atom)))
    }

    /// Stages an update of `atom`, starting from its current field values.
    /// `None` when the atom no longer exists.
    pub fn change_request<E: Atom>(&mut self, atom: &E) -> Result<Option<ChangeRequest<E>>, AtomError> {
        let current = self.object::<E>(ObjectKey::of(atom))?;
        Ok(current.map(|original| ChangeRequest::update(original.clone(), original)))
    }

    pub fn deletion_request<E: Atom>(&mut self, atom: &E) -> Result<Option<ChangeRequest<E>>, AtomError> {
        let current = self.object::<E>(ObjectKey::of(atom))?;
        Ok(current.map(ChangeRequest::deletion))
    }

    /// Update when an atom with the same primary key exists, creation
    /// otherwise.
    pub fn upsert_request<E: Atom>(&mut self, atom: E) -> Result<ChangeRequest<E>, AtomError> {
        let existing = self.object::<E>(ObjectKey::PrimaryKey(atom.primary_key()))?;
        Ok(match existing {
            Some(original) => ChangeRequest::update(original, atom),
            None => ChangeRequest::creation(atom),
        })
    }

    pub fn reindex<E: Atom>(&mut self) -> Result<ReindexReport, AtomError> {
        let report = schema::reindex::<E>(&self.tx)?;
        self.present.remove(E::TABLE);
        self.set_up.insert(E::TABLE);
        Ok(report)
    }

    /// Ends the handler without committing: `return txn.abort();`.
    pub fn abort<T>(&mut self) -> Result<T, AtomError> {
        Err(AtomError::Aborted)
    }

    pub fn repository(&self) -> &ObjectRepository {
        &self.repository
    }

    /// Persists the clock and commits. Returns the tables whose schema this
    /// transaction set up and whether the clock advanced.
    pub(crate) fn finish(self) -> Result<(HashSet<&'static str>, bool), AtomError> {
        if self.wrote {
            schema::write_clock(&self.tx, self.timestamp)?;
        }
        self.tx.commit()?;
        Ok((self.set_up, self.wrote))
    }
}
