//! Physical layout: one primary table per atom type, one table per
//! secondary index, and a metadata table for the logical clock.
//!
//! Primary: `(rowid INTEGER PRIMARY KEY AUTOINCREMENT, __pk0.., p BLOB,
//! UNIQUE(__pk0..))`. Index: `<table>__<index> (rowid INTEGER PRIMARY KEY,
//! <index> <affinity>)` with `index__<table>__<index>` on the value column.

use crate::atom::{Atom, IndexField, ObjectKey};
use crate::codec::decode;
use crate::error::AtomError;
use crate::query::expr::index_table_name;
use crate::query::planner::{IndexCoverage, IndexSurvey};
use crate::storage::quote_ident;
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::{debug, info};

const META_TABLE: &str = "__atomstore_meta";
const CLOCK_KEY: &str = "changes_timestamp";

pub(crate) fn ensure_meta(conn: &Connection) -> Result<(), AtomError> {
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {META_TABLE} (key TEXT PRIMARY KEY, value INTEGER NOT NULL);"
    ))?;
    Ok(())
}

pub(crate) fn read_clock(conn: &Connection) -> Result<i64, AtomError> {
    let value = conn
        .prepare_cached(&format!("SELECT value FROM {META_TABLE} WHERE key = ?1"))?
        .query_row([CLOCK_KEY], |row| row.get(0))
        .optional()?;
    Ok(value.unwrap_or(0))
}

pub(crate) fn write_clock(conn: &Connection, value: i64) -> Result<(), AtomError> {
    conn.prepare_cached(&format!(
        "INSERT INTO {META_TABLE} (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value"
    ))?
    .execute(params![CLOCK_KEY, value])?;
    Ok(())
}

pub(crate) fn table_exists(conn: &Connection, name: &str) -> Result<bool, AtomError> {
    let found = conn
        .prepare_cached("SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1")?
        .query_row([name], |_| Ok(()))
        .optional()?;
    Ok(found.is_some())
}

fn primary_table_ddl<E: Atom>() -> String {
    let table = quote_ident(E::TABLE);
    let pk_columns: Vec<String> = (0..E::primary_key_columns().len())
        .map(|i| quote_ident(&format!("__pk{i}")))
        .collect();
    let mut columns = vec!["rowid INTEGER PRIMARY KEY AUTOINCREMENT".to_string()];
    for (name, affinity) in pk_columns.iter().zip(E::primary_key_columns()) {
        columns.push(format!("{name} {}", affinity.affinity()));
    }
    columns.push("p BLOB".to_string());
    if !pk_columns.is_empty() {
        columns.push(format!("UNIQUE({})", pk_columns.join(", ")));
    }
    format!("CREATE TABLE IF NOT EXISTS {table} ({});", columns.join(", "))
}

fn index_table_ddl<E>(table: &str, index: &IndexField<E>) -> String {
    let name = index.name();
    let index_table = index_table_name(table, name);
    format!(
        "CREATE TABLE IF NOT EXISTS {} (rowid INTEGER PRIMARY KEY, {} {});
         CREATE {}INDEX IF NOT EXISTS {} ON {} ({});",
        quote_ident(&index_table),
        quote_ident(name),
        index.field.value_type.affinity(),
        if index.is_unique() { "UNIQUE " } else { "" },
        quote_ident(&format!("index__{index_table}")),
        quote_ident(&index_table),
        quote_ident(name),
    )
}

/// Creates the primary table and every index table that does not exist yet.
pub(crate) fn set_up<E: Atom>(conn: &Connection) -> Result<(), AtomError> {
    conn.execute_batch(&primary_table_ddl::<E>())?;
    for index in E::indexes() {
        conn.execute_batch(&index_table_ddl(E::TABLE, &index))?;
    }
    debug!(table = E::TABLE, "schema set up");
    Ok(())
}

/// Declared indexes whose table currently exists.
pub(crate) fn present_indexes<E: Atom>(conn: &Connection) -> Result<Vec<IndexField<E>>, AtomError> {
    let mut present = Vec::new();
    for index in E::indexes() {
        if table_exists(conn, &index_table_name(E::TABLE, index.name()))? {
            present.push(index);
        } else {
            debug!(table = E::TABLE, index = index.name(), "index table missing, skipped");
        }
    }
    Ok(present)
}

fn table_stats(conn: &Connection, table: &str) -> Result<(i64, Option<i64>), AtomError> {
    let sql = format!("SELECT COUNT(*), MAX(rowid) FROM {}", quote_ident(table));
    let stats = conn
        .prepare_cached(&sql)?
        .query_row([], |row| Ok((row.get(0)?, row.get(1)?)))?;
    Ok(stats)
}

/// Classifies the named index tables of `E`. `None` when the primary table
/// does not exist yet.
pub(crate) fn survey<E: Atom>(
    conn: &Connection,
    names: &[String],
) -> Result<Option<IndexSurvey>, AtomError> {
    if !table_exists(conn, E::TABLE)? {
        return Ok(None);
    }
    let primary = table_stats(conn, E::TABLE)?;
    let mut survey = IndexSurvey::new();
    for name in names {
        let index_table = index_table_name(E::TABLE, name);
        let coverage = if !table_exists(conn, &index_table)? {
            IndexCoverage::Unavailable
        } else if table_stats(conn, &index_table)? == primary {
            IndexCoverage::Full
        } else {
            IndexCoverage::Partial
        };
        survey.record(name.as_str(), coverage);
    }
    Ok(Some(survey))
}

pub(crate) fn decode_row<E: Atom>(rowid: i64, blob: &[u8], timestamp: i64) -> Result<E, AtomError> {
    let mut atom: E = decode(blob)?;
    let meta = atom.meta_mut();
    meta.rowid = rowid;
    meta.changes_timestamp = timestamp;
    Ok(atom)
}

/// Loads one atom straight from storage, bypassing any repository.
pub(crate) fn load<E: Atom>(
    conn: &Connection,
    key: &ObjectKey,
    timestamp: i64,
) -> Result<Option<E>, AtomError> {
    if !table_exists(conn, E::TABLE)? {
        return Ok(None);
    }
    let table = quote_ident(E::TABLE);
    let row: Option<(i64, Vec<u8>)> = match key {
        ObjectKey::RowId(rowid) => conn
            .prepare_cached(&format!("SELECT rowid, p FROM {table} WHERE rowid = ?1"))?
            .query_row([rowid], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?,
        ObjectKey::PrimaryKey(values) => {
            let predicate: Vec<String> = (0..values.len())
                .map(|i| format!("{} = ?{}", quote_ident(&format!("__pk{i}")), i + 1))
                .collect();
            let sql = format!(
                "SELECT rowid, p FROM {table} WHERE {}",
                predicate.join(" AND ")
            );
            conn.prepare_cached(&sql)?
                .query_row(params_from_iter(values.iter()), |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .optional()?
        }
    };
    row.map(|(rowid, blob)| decode_row(rowid, &blob, timestamp))
        .transpose()
}

/// Outcome of [`reindex`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReindexReport {
    pub created_tables: Vec<String>,
    pub removed_rows: usize,
    pub inserted_rows: usize,
}

/// Brings every index table of `E` back in line with the primary table.
pub(crate) fn reindex<E: Atom>(conn: &Connection) -> Result<ReindexReport, AtomError> {
    let mut report = ReindexReport::default();
    let mut missing = Vec::new();
    for index in E::indexes() {
        let index_table = index_table_name(E::TABLE, index.name());
        if !table_exists(conn, &index_table)? {
            missing.push(index_table);
        }
    }
    set_up::<E>(conn)?;
    report.created_tables = missing;

    let table = quote_ident(E::TABLE);
    for index in E::indexes() {
        let index_table = quote_ident(&index_table_name(E::TABLE, index.name()));
        report.removed_rows += conn.execute(
            &format!("DELETE FROM {index_table} WHERE rowid NOT IN (SELECT rowid FROM {table})"),
            [],
        )?;

        let unindexed: Vec<(i64, Vec<u8>)> = conn
            .prepare(&format!(
                "SELECT rowid, p FROM {table} WHERE rowid NOT IN (SELECT rowid FROM {index_table})"
            ))?
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<_, _>>()?;
        let mut insert = conn.prepare(&format!(
            "INSERT INTO {index_table} (rowid, {}) VALUES (?1, ?2)",
            quote_ident(index.name())
        ))?;
        for (rowid, blob) in unindexed {
            let atom: E = decode_row(rowid, &blob, 0)?;
            insert
                .execute(params![rowid, index.value_of(&atom)])
                .map_err(|e| AtomError::from_write(e, E::TABLE))?;
            report.inserted_rows += 1;
        }
    }
    info!(
        table = E::TABLE,
        created = report.created_tables.len(),
        removed = report.removed_rows,
        inserted = report.inserted_rows,
        "reindex finished"
    );
    Ok(report)
}
