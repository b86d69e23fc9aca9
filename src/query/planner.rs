use crate::atom::types::Value;
use crate::query::expr::{FieldRef, IndexUsefulness, index_table_name};
use crate::query::plan::{Order, Query};
use crate::storage::quote_ident;
use std::collections::{HashMap, HashSet};

/// Coverage of one index table relative to its primary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexCoverage {
    /// Table exists and holds a row for every primary row.
    Full,
    /// Table exists but some rows are missing.
    Partial,
    Unavailable,
}

/// Per-query classification of the index tables a query touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexSurvey {
    coverage: HashMap<String, IndexCoverage>,
    full: HashSet<String>,
}

impl IndexSurvey {
    pub fn new() -> Self {
        Self::default()
    }

    /// A survey where every named index is fully populated.
    pub fn all_full<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut survey = Self::new();
        for name in names {
            survey.record(name, IndexCoverage::Full);
        }
        survey
    }

    pub fn record(&mut self, name: impl Into<String>, coverage: IndexCoverage) {
        let name = name.into();
        if coverage == IndexCoverage::Full {
            self.full.insert(name.clone());
        } else {
            self.full.remove(&name);
        }
        self.coverage.insert(name, coverage);
    }

    pub fn coverage(&self, name: &str) -> IndexCoverage {
        self.coverage
            .get(name)
            .copied()
            .unwrap_or(IndexCoverage::Unavailable)
    }

    pub fn is_full(&self, name: &str) -> bool {
        self.full.contains(name)
    }

    /// Names the planner may push work into.
    pub fn available(&self) -> &HashSet<String> {
        &self.full
    }
}

/// The storage scan chosen for a query, plus what is left to do in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPlan {
    pub table: &'static str,
    pub sql: String,
    pub params: Vec<Value>,
    pub usefulness: IndexUsefulness,
    /// The filter was compiled into the `WHERE` clause.
    pub filter_pushed: bool,
    /// Scanned rows are re-evaluated against the filter in memory.
    pub refine_in_memory: bool,
    pub sort_in_memory: bool,
    /// `LIMIT`/`OFFSET` are applied by storage.
    pub limit_pushed: bool,
    pub joined_indexes: Vec<String>,
}

/// Index names a query reads: filter fields first, then ordering fields.
pub(crate) fn touched_indexes<E>(query: &Query<E>) -> Vec<String> {
    let mut fields: Vec<&FieldRef<E>> = Vec::new();
    if let Some(filter) = &query.filter {
        filter.node.collect_fields(&mut fields);
    }
    let mut names: Vec<String> = fields.iter().map(|f| f.name.to_string()).collect();
    for order in &query.order_by {
        if !names.iter().any(|n| n.as_str() == order.field.name.as_ref()) {
            names.push(order.field.name.to_string());
        }
    }
    names
}

pub fn plan<E>(table: &'static str, query: &Query<E>, survey: &IndexSurvey) -> ScanPlan {
    let usefulness = query
        .filter
        .as_ref()
        .map(|f| f.can_use_partial_index(survey.available()))
        .unwrap_or(IndexUsefulness::Full);
    let filter_pushed = query.filter.is_some() && usefulness == IndexUsefulness::Full;
    let refine_in_memory = match &query.filter {
        Some(filter) => usefulness != IndexUsefulness::Full || filter.use_scan_to_refine(),
        None => false,
    };

    let mut joined: Vec<String> = Vec::new();
    let mut params = Vec::new();
    let mut where_clause = None;
    if filter_pushed && let Some(filter) = &query.filter {
        let mut fields = Vec::new();
        filter.node.collect_fields(&mut fields);
        joined.extend(fields.iter().map(|f| f.name.to_string()));
        where_clause = Some(filter.node.to_sql(table, &mut params));
    }

    // Native ordering covers the leading index-backed terms; the first term
    // without a full index hands the whole ordering to memory.
    let mut order_terms = Vec::new();
    let mut sort_in_memory = false;
    for order in &query.order_by {
        if !survey.is_full(&order.field.name) {
            sort_in_memory = true;
            break;
        }
        if !joined.iter().any(|n| n.as_str() == order.field.name.as_ref()) {
            joined.push(order.field.name.to_string());
        }
        let direction = match order.order {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        };
        order_terms.push(format!("{} {direction}", order.field.column_sql(table)));
    }

    let quoted = quote_ident(table);
    order_terms.push(format!("{quoted}.rowid"));

    let mut sql = format!("SELECT {quoted}.rowid, {quoted}.p FROM {quoted}");
    for index in &joined {
        let index_table = quote_ident(&index_table_name(table, index));
        sql.push_str(&format!(
            " LEFT JOIN {index_table} ON {quoted}.rowid = {index_table}.rowid"
        ));
    }
    if let Some(clause) = where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(&clause);
    }
    sql.push_str(" ORDER BY ");
    sql.push_str(&order_terms.join(", "));

    let limit_pushed = !refine_in_memory && !sort_in_memory;
    if limit_pushed {
        match (query.limit, query.offset) {
            (Some(limit), 0) => sql.push_str(&format!(" LIMIT {limit}")),
            (Some(limit), offset) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (None, 0) => {}
            (None, offset) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
        }
    }

    ScanPlan {
        table,
        sql,
        params,
        usefulness,
        filter_pushed,
        refine_in_memory,
        sort_in_memory,
        limit_pushed,
        joined_indexes: joined,
    }
}

#[cfg(test)]
mod tests {
    use super::{IndexCoverage, IndexSurvey, plan, touched_indexes};
    use crate::query::expr::{Field, IndexUsefulness};
    use crate::query::plan::Query;

    struct Monster {
        mana: i32,
        hp: i32,
    }

    fn mana() -> Field<Monster, i32> {
        Field::new("mana", |m: &Monster| m.mana)
    }

    fn hp() -> Field<Monster, i32> {
        Field::new("hp", |m: &Monster| m.hp)
    }

    #[test]
    fn fully_indexed_query_pushes_filter_order_and_limit() {
        let survey = IndexSurvey::all_full(["mana", "hp"]);
        let query = Query::filter(mana().lt(100))
            .order_by(hp().descending())
            .limit(2)
            .offset(1);
        let plan = plan("monster", &query, &survey);
        assert_eq!(
            plan.sql,
            "SELECT \"monster\".rowid, \"monster\".p FROM \"monster\" \
             LEFT JOIN \"monster__mana\" ON \"monster\".rowid = \"monster__mana\".rowid \
             LEFT JOIN \"monster__hp\" ON \"monster\".rowid = \"monster__hp\".rowid \
             WHERE (\"monster__mana\".\"mana\" < ?1) \
             ORDER BY \"monster__hp\".\"hp\" DESC, \"monster\".rowid LIMIT 2 OFFSET 1"
        );
        assert_eq!(plan.usefulness, IndexUsefulness::Full);
        assert!(plan.filter_pushed && plan.limit_pushed);
        assert!(!plan.refine_in_memory && !plan.sort_in_memory);
    }

    #[test]
    fn missing_index_degrades_to_full_scan() {
        let mut survey = IndexSurvey::all_full(["hp"]);
        survey.record("mana", IndexCoverage::Partial);
        let query = Query::filter(mana().lt(100))
            .order_by(mana().ascending())
            .limit(2);
        let plan = plan("monster", &query, &survey);
        assert_eq!(
            plan.sql,
            "SELECT \"monster\".rowid, \"monster\".p FROM \"monster\" ORDER BY \"monster\".rowid"
        );
        assert_eq!(plan.usefulness, IndexUsefulness::None);
        assert!(plan.refine_in_memory && plan.sort_in_memory);
        assert!(!plan.limit_pushed);
    }

    #[test]
    fn partial_usefulness_scans_everything() {
        let survey = IndexSurvey::all_full(["hp"]);
        let query = Query::filter(hp().gt(1).and(mana().lt(5)));
        let plan = plan("monster", &query, &survey);
        assert_eq!(plan.usefulness, IndexUsefulness::Partial);
        assert!(!plan.filter_pushed);
        assert!(plan.params.is_empty());
    }

    #[test]
    fn in_memory_sort_keeps_limit_in_memory() {
        let survey = IndexSurvey::all_full(["hp"]);
        let query = Query::filter(hp().gt(1))
            .order_by(mana().ascending())
            .offset(4);
        let plan = plan("monster", &query, &survey);
        assert!(plan.filter_pushed);
        assert!(plan.sort_in_memory);
        assert!(!plan.sql.contains("OFFSET"));
    }

    #[test]
    fn arithmetic_filters_are_pushed_and_refined() {
        let survey = IndexSurvey::all_full(["hp", "mana"]);
        let query = Query::filter((hp() + mana()).gt(10)).limit(3);
        let plan = plan("monster", &query, &survey);
        assert!(plan.filter_pushed);
        assert!(plan.refine_in_memory);
        assert!(!plan.limit_pushed);
        assert!(plan.sql.contains("typeof"));
    }

    #[test]
    fn offset_without_limit_uses_unbounded_limit() {
        let query = Query::<Monster>::all().offset(3);
        let plan = plan("monster", &query, &IndexSurvey::new());
        assert!(plan.sql.ends_with("ORDER BY \"monster\".rowid LIMIT -1 OFFSET 3"));
    }

    #[test]
    fn touched_indexes_are_deduplicated() {
        let query = Query::filter(mana().gt(1).or(mana().lt(0))).order_by(mana().ascending());
        assert_eq!(touched_indexes(&query), vec!["mana".to_string()]);
    }
}
