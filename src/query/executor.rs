use crate::atom::Atom;
use crate::atom::types::Value;
use crate::codec::EncodedAtom;
use crate::error::AtomError;
use crate::query::expr::{Evaluable, IndexUsefulness};
use crate::query::plan::{Order, OrderBy, Query};
use crate::query::planner::{ScanPlan, plan, touched_indexes};
use crate::repository::{Cached, ObjectRepository};
use crate::storage::schema;
use rusqlite::{Connection, params_from_iter};
use std::cmp::Ordering;
use std::ops::Deref;
use tracing::debug;

/// Atoms returned by a query, in query order, with the query that produced
/// them and the logical clock they were read at.
pub struct FetchedResult<E> {
    items: Vec<E>,
    query: Query<E>,
    changes_timestamp: i64,
}

impl<E> FetchedResult<E> {
    pub(crate) fn new(items: Vec<E>, query: Query<E>, changes_timestamp: i64) -> Self {
        Self {
            items,
            query,
            changes_timestamp,
        }
    }

    pub fn query(&self) -> &Query<E> {
        &self.query
    }

    pub fn changes_timestamp(&self) -> i64 {
        self.changes_timestamp
    }

    pub fn into_vec(self) -> Vec<E> {
        self.items
    }
}

impl<E> Deref for FetchedResult<E> {
    type Target = [E];

    fn deref(&self) -> &[E] {
        &self.items
    }
}

impl<'a, E> IntoIterator for &'a FetchedResult<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl<E: std::fmt::Debug> std::fmt::Debug for FetchedResult<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedResult")
            .field("items", &self.items)
            .field("changes_timestamp", &self.changes_timestamp)
            .finish()
    }
}

/// An admitted row with its ordering keys computed once.
pub(crate) struct Ranked<E> {
    keys: Vec<Option<Value>>,
    rowid: i64,
    atom: E,
}

impl<E> Ranked<E> {
    pub(crate) fn new(atom: E, rowid: i64, order_by: &[OrderBy<E>]) -> Self {
        let keys = order_by.iter().map(|o| o.field.get(&atom)).collect();
        Self { keys, rowid, atom }
    }
}

fn compare_ranked<E>(lhs: &Ranked<E>, rhs: &Ranked<E>, order_by: &[OrderBy<E>]) -> Ordering {
    for (i, order) in order_by.iter().enumerate() {
        let ordering = match (&lhs.keys[i], &rhs.keys[i]) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(a), Some(b)) => a.sql_cmp(b),
        };
        let ordering = match order.order {
            Order::Asc => ordering,
            Order::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    lhs.rowid.cmp(&rhs.rowid)
}

/// Binary-search insertion; ties on every ordering key fall back to row id.
pub(crate) fn insert_sorted<E>(window: &mut Vec<Ranked<E>>, candidate: Ranked<E>, order_by: &[OrderBy<E>]) {
    let position =
        window.partition_point(|held| compare_ranked(held, &candidate, order_by) == Ordering::Less);
    window.insert(position, candidate);
}

/// Plans `query` against the live index tables; `None` when the primary
/// table does not exist.
pub(crate) fn explain<E: Atom>(conn: &Connection, query: &Query<E>) -> Result<Option<ScanPlan>, AtomError> {
    query.validate_depth()?;
    let Some(survey) = schema::survey::<E>(conn, &touched_indexes(query))? else {
        return Ok(None);
    };
    Ok(Some(plan(E::TABLE, query, &survey)))
}

/// Runs `query`. Inside a transaction the repository supplies in-flight
/// values and records every returned row.
pub(crate) fn execute<E: Atom>(
    conn: &Connection,
    query: &Query<E>,
    timestamp: i64,
    mut repository: Option<&mut ObjectRepository>,
) -> Result<Vec<E>, AtomError> {
    let Some(plan) = explain(conn, query)? else {
        return Ok(Vec::new());
    };
    if query.filter.is_some() && plan.usefulness != IndexUsefulness::Full {
        debug!(
            table = E::TABLE,
            usefulness = ?plan.usefulness,
            "filter not fully indexed, scanning primary table"
        );
    }

    let window = if plan.limit_pushed { None } else { query.window() };
    let filter = query.filter.as_ref().filter(|_| plan.refine_in_memory);

    let mut stmt = conn.prepare_cached(&plan.sql)?;
    let mut rows = stmt.query(params_from_iter(plan.params.iter()))?;
    let mut kept: Vec<Ranked<E>> = Vec::new();
    let mut scanned = 0usize;
    while let Some(row) = rows.next()? {
        scanned += 1;
        let rowid: i64 = row.get(0)?;
        let in_flight = match repository.as_deref().and_then(|r| r.get::<E>(rowid)) {
            Some(Cached::Deleted) => continue,
            Some(Cached::Present(atom)) => Some(atom.clone()),
            None => None,
        };
        let atom = match in_flight {
            Some(atom) => {
                if let Some(filter) = filter
                    && !filter.evaluate(Evaluable::Object(&atom))?.admits()
                {
                    continue;
                }
                atom
            }
            None => {
                let encoded = EncodedAtom::<E>::new(row.get(1)?);
                if let Some(filter) = filter
                    && !filter.evaluate(Evaluable::Encoded(&encoded))?.admits()
                {
                    continue;
                }
                let mut atom = encoded.into_atom()?;
                let meta = atom.meta_mut();
                meta.rowid = rowid;
                meta.changes_timestamp = timestamp;
                atom
            }
        };

        let ranked = Ranked::new(atom, rowid, &query.order_by);
        if plan.sort_in_memory {
            insert_sorted(&mut kept, ranked, &query.order_by);
            if let Some(window) = window
                && kept.len() > window
            {
                kept.pop();
            }
        } else {
            kept.push(ranked);
            // Rows arrive in final order; nothing later can displace them.
            if let Some(window) = window
                && kept.len() >= window
            {
                break;
            }
        }
    }

    if !plan.limit_pushed {
        kept.drain(..query.offset.min(kept.len()));
        if let Some(limit) = query.limit {
            kept.truncate(limit);
        }
    }
    debug!(
        table = E::TABLE,
        scanned,
        returned = kept.len(),
        "query executed"
    );

    let mut items = Vec::with_capacity(kept.len());
    for ranked in kept {
        match repository.as_deref_mut() {
            Some(repository) => items.extend(repository.register_fetched(ranked.atom)),
            None => items.push(ranked.atom),
        }
    }
    Ok(items)
}
